//! Query-language parser.
//!
//! Grammar (informal):
//!
//! ```text
//! query    := operator | term*                 -- bare terms get the model's default operator
//! operator := "#" name ["/" n] "(" arg* ")"
//! arg      := operator | term | weight arg     -- weights only inside #wand / #wsum
//! term     := text ["." field]
//! ```
//!
//! Operators: `#and #or #syn #sum #wand #wsum #near/n #window/n` (case-insensitive).
//! Whitespace and commas separate arguments.

use crate::model::RetrievalModel;
use crate::query::node::{QueryNode, Weighted};
use crate::tokenizer::Tokenizer;

/// Query syntax errors. A parse failure aborts only the query being parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The query string was empty.
    #[error("empty query")]
    EmptyQuery,
    /// Parentheses do not balance.
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    /// A `(` that does not open an operator.
    #[error("'(' without an operator")]
    StrayOpenParen,
    /// An operator token not followed by `(`.
    #[error("operator {0} is not followed by '('")]
    MissingOpenParen(String),
    /// Unrecognized `#operator`.
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    /// `#near/n` or `#window/n` with a missing or non-numeric distance.
    #[error("invalid proximity distance in {0}")]
    InvalidDistance(String),
    /// A weighted operator expected a weight but found something else.
    #[error("invalid weight {0:?}")]
    InvalidWeight(String),
    /// A nested operator inside `#wand`/`#wsum` had no preceding weight.
    #[error("weighted operator argument without a weight")]
    MissingWeight,
    /// A weight was the last token of a weighted operator.
    #[error("weight without an argument")]
    DanglingWeight,
    /// A term appeared outside every operator.
    #[error("term {0:?} outside an operator")]
    TermOutsideOperator(String),
    /// Tokens remained after the outermost operator closed.
    #[error("unexpected tokens after the end of the query")]
    TrailingTokens,
    /// A score-producing operator inside `#syn`, `#near` or `#window`.
    #[error("{0} has no positions and cannot be an argument of a positional operator")]
    NotPositional(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Word(&'a str),
}

fn lex(query: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in query.char_indices() {
        let delim = match c {
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            ',' => None,
            c if c.is_whitespace() => None,
            _ => {
                start.get_or_insert(i);
                continue;
            }
        };
        if let Some(s) = start.take() {
            tokens.push(Token::Word(&query[s..i]));
        }
        if let Some(t) = delim {
            tokens.push(t);
        }
    }
    if let Some(s) = start {
        tokens.push(Token::Word(&query[s..]));
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OpKind {
    Syn,
    And,
    Or,
    Sum,
    WAnd,
    WSum,
    Near(u32),
    Window(u32),
}

impl OpKind {
    fn parse(token: &str) -> Result<Self, ParseError> {
        let lower = token.to_ascii_lowercase();
        let (name, suffix) = match lower.split_once('/') {
            Some((name, d)) => (name, Some(d)),
            None => (lower.as_str(), None),
        };
        let distance = || -> Result<u32, ParseError> {
            suffix
                .and_then(|d| d.parse::<u32>().ok())
                .ok_or_else(|| ParseError::InvalidDistance(token.to_string()))
        };
        match name {
            "#near" => Ok(Self::Near(distance()?)),
            "#window" => Ok(Self::Window(distance()?)),
            _ if suffix.is_some() => Err(ParseError::UnknownOperator(token.to_string())),
            "#and" => Ok(Self::And),
            "#or" => Ok(Self::Or),
            "#syn" => Ok(Self::Syn),
            "#sum" => Ok(Self::Sum),
            "#wand" => Ok(Self::WAnd),
            "#wsum" => Ok(Self::WSum),
            _ => Err(ParseError::UnknownOperator(token.to_string())),
        }
    }

    fn is_weighted(self) -> bool {
        matches!(self, Self::WAnd | Self::WSum)
    }

    fn is_positional(self) -> bool {
        matches!(self, Self::Syn | Self::Near(_) | Self::Window(_))
    }
}

#[derive(Debug)]
struct Frame {
    kind: OpKind,
    children: Vec<QueryNode>,
    weighted: Vec<Weighted>,
    pending_weight: Option<f64>,
}

impl Frame {
    fn new(kind: OpKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            weighted: Vec::new(),
            pending_weight: None,
        }
    }

    fn expects_weight(&self) -> bool {
        self.kind.is_weighted() && self.pending_weight.is_none()
    }

    fn attach(&mut self, node: QueryNode) -> Result<(), ParseError> {
        if self.kind.is_positional() && !node.produces_inverted_list() {
            return Err(ParseError::NotPositional(node.to_string()));
        }
        if self.kind.is_weighted() {
            let weight = self.pending_weight.take().ok_or(ParseError::MissingWeight)?;
            self.weighted.push(Weighted::new(weight, node));
        } else {
            self.children.push(node);
        }
        Ok(())
    }

    // Drop the argument being read; for weighted operators its weight goes with it.
    fn skip_argument(&mut self) {
        self.pending_weight = None;
    }

    fn finish(self) -> Result<QueryNode, ParseError> {
        if self.pending_weight.is_some() {
            return Err(ParseError::DanglingWeight);
        }
        Ok(match self.kind {
            OpKind::Syn => QueryNode::Syn(self.children),
            OpKind::And => QueryNode::And(self.children),
            OpKind::Or => QueryNode::Or(self.children),
            OpKind::Sum => QueryNode::Sum(self.children),
            OpKind::WAnd => QueryNode::WAnd(self.weighted),
            OpKind::WSum => QueryNode::WSum(self.weighted),
            OpKind::Near(distance) => QueryNode::Near {
                distance,
                children: self.children,
            },
            OpKind::Window(distance) => QueryNode::Window {
                distance,
                children: self.children,
            },
        })
    }
}

fn check_balance(tokens: &[Token<'_>]) -> Result<(), ParseError> {
    let mut depth = 0usize;
    for t in tokens {
        match t {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(ParseError::UnbalancedParens)?;
            }
            Token::Word(_) => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ParseError::UnbalancedParens)
    }
}

/// Whether `query` is exactly one operator expression, `#op( ... )`, with nothing after it.
fn is_single_operator(query: &str) -> bool {
    let tokens = lex(query);
    match tokens.as_slice() {
        [Token::Word(w), Token::Open, rest @ ..] if w.starts_with('#') => {
            let mut depth = 1usize;
            for (i, t) in rest.iter().enumerate() {
                match t {
                    Token::Open => depth += 1,
                    Token::Close => {
                        depth -= 1;
                        if depth == 0 {
                            return i == rest.len() - 1;
                        }
                    }
                    Token::Word(_) => {}
                }
            }
            false
        }
        _ => false,
    }
}

/// Wrap `query` in the model's default operator.
///
/// Boolean models use `#or` unless the query already is a single operator expression;
/// BM25 always uses `#sum`; Indri and learning-to-rank always use `#and`.
pub fn wrap_default(query: &str, model: &RetrievalModel) -> String {
    let query = query.trim();
    match model {
        RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => {
            if is_single_operator(query) {
                query.to_string()
            } else {
                format!("#or({query})")
            }
        }
        RetrievalModel::Bm25(_) => format!("#sum({query})"),
        RetrievalModel::Indri(_) | RetrievalModel::LearningToRank(_) => format!("#and({query})"),
    }
}

/// Shift-reduce parser from query text to [`QueryNode`] trees.
pub struct QueryParser<'a> {
    tokenizer: &'a dyn Tokenizer,
}

impl<'a> QueryParser<'a> {
    /// Parser normalizing terms with `tokenizer`.
    pub fn new(tokenizer: &'a dyn Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Parse `raw` after wrapping it in `model`'s default operator.
    pub fn parse(&self, raw: &str, model: &RetrievalModel) -> Result<QueryNode, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        self.parse_structured(&wrap_default(raw, model))
    }

    /// Parse a fully structured query (outermost token must be an operator).
    pub fn parse_structured(&self, query: &str) -> Result<QueryNode, ParseError> {
        let tokens = lex(query);
        check_balance(&tokens)?;
        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<QueryNode> = None;

        let mut i = 0;
        while i < tokens.len() {
            if root.is_some() {
                return Err(ParseError::TrailingTokens);
            }
            match tokens[i] {
                Token::Word(w) if w.starts_with('#') => {
                    let kind = OpKind::parse(w)?;
                    if tokens.get(i + 1) != Some(&Token::Open) {
                        return Err(ParseError::MissingOpenParen(w.to_string()));
                    }
                    stack.push(Frame::new(kind));
                    i += 2;
                    continue;
                }
                Token::Open => return Err(ParseError::StrayOpenParen),
                Token::Close => {
                    let node = stack.pop().ok_or(ParseError::UnbalancedParens)?.finish()?;
                    match stack.last_mut() {
                        Some(parent) if node.is_empty_operator() => parent.skip_argument(),
                        Some(parent) => parent.attach(node)?,
                        None => root = Some(node),
                    }
                }
                Token::Word(w) => {
                    let top = stack
                        .last_mut()
                        .ok_or_else(|| ParseError::TermOutsideOperator(w.to_string()))?;
                    if top.expects_weight() {
                        let weight = w
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| ParseError::InvalidWeight(w.to_string()))?;
                        top.pending_weight = Some(weight);
                    } else {
                        match self.term(w) {
                            Some(node) => top.attach(node)?,
                            None => top.skip_argument(),
                        }
                    }
                }
            }
            i += 1;
        }

        if !stack.is_empty() {
            return Err(ParseError::UnbalancedParens);
        }
        root.ok_or(ParseError::EmptyQuery)
    }

    // `text` or `text.field`; `None` when the text normalizes to nothing (a stopword).
    fn term(&self, token: &str) -> Option<QueryNode> {
        let (text, field) = match token.split_once('.') {
            Some((text, field)) => (text, Some(field.to_string())),
            None => (token, None),
        };
        let stem = self.tokenizer.tokenize(text).into_iter().next()?;
        Some(QueryNode::Term { stem, field })
    }
}

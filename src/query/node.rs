//! The query operator tree.

use std::fmt;

/// A child of a weighted operator together with its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighted {
    /// Combination weight.
    pub weight: f64,
    /// The weighted argument.
    pub node: QueryNode,
}

impl Weighted {
    /// Pair `weight` with `node`.
    pub fn new(weight: f64, node: QueryNode) -> Self {
        Self { weight, node }
    }
}

/// One node of a parsed query.
///
/// Term, SYN, NEAR and WINDOW produce inverted lists; every other operator produces a score
/// list. Nodes are immutable once built: all evaluation state lives in the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// A stem, optionally restricted to a field (default `body`).
    Term {
        /// Normalized stem.
        stem: String,
        /// Field, or `None` for the default field.
        field: Option<String>,
    },
    /// Positional union: documents matching any child, positions merged.
    Syn(Vec<QueryNode>),
    /// Conjunction (boolean) or geometric mean (Indri).
    And(Vec<QueryNode>),
    /// Disjunction.
    Or(Vec<QueryNode>),
    /// Ordered proximity: each child within `distance` positions after the previous one.
    Near {
        /// Maximum forward distance.
        distance: u32,
        /// Ordered arguments.
        children: Vec<QueryNode>,
    },
    /// Unordered proximity: all children inside a span of `distance` positions.
    Window {
        /// Maximum span.
        distance: u32,
        /// Arguments.
        children: Vec<QueryNode>,
    },
    /// Unweighted sum of child scores.
    Sum(Vec<QueryNode>),
    /// Weighted geometric mean `Π score_i ^ weight_i`.
    WAnd(Vec<Weighted>),
    /// Weighted arithmetic mean `Σ weight_i * score_i`.
    WSum(Vec<Weighted>),
    /// Turns an inverted list into a score list with the active model.
    Score(Box<QueryNode>),
}

impl QueryNode {
    /// Term in the default field.
    pub fn term(stem: impl Into<String>) -> Self {
        Self::Term {
            stem: stem.into(),
            field: None,
        }
    }

    /// Term in `field`.
    pub fn term_in(stem: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Term {
            stem: stem.into(),
            field: Some(field.into()),
        }
    }

    /// Whether evaluation yields an inverted list rather than a score list.
    pub fn produces_inverted_list(&self) -> bool {
        matches!(
            self,
            Self::Term { .. } | Self::Syn(_) | Self::Near { .. } | Self::Window { .. }
        )
    }

    /// Number of direct children (0 for terms, 1 for SCORE).
    pub fn arity(&self) -> usize {
        match self {
            Self::Term { .. } => 0,
            Self::Score(_) => 1,
            Self::Syn(c) | Self::And(c) | Self::Or(c) | Self::Sum(c) => c.len(),
            Self::Near { children, .. } | Self::Window { children, .. } => children.len(),
            Self::WAnd(w) | Self::WSum(w) => w.len(),
        }
    }

    /// An operator left without arguments (e.g. every term was a stopword).
    pub fn is_empty_operator(&self) -> bool {
        !matches!(self, Self::Term { .. }) && self.arity() == 0
    }

    /// Stems of every term leaf, left to right. Operator names, distances, weights and field
    /// qualifiers are not terms.
    pub fn stems(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_stems(&mut out);
        out
    }

    fn collect_stems(&self, out: &mut Vec<String>) {
        match self {
            Self::Term { stem, .. } => out.push(stem.clone()),
            Self::Score(inner) => inner.collect_stems(out),
            Self::Syn(c) | Self::And(c) | Self::Or(c) | Self::Sum(c) => {
                c.iter().for_each(|n| n.collect_stems(out));
            }
            Self::Near { children, .. } | Self::Window { children, .. } => {
                children.iter().for_each(|n| n.collect_stems(out));
            }
            Self::WAnd(w) | Self::WSum(w) => w.iter().for_each(|w| w.node.collect_stems(out)),
        }
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[QueryNode]) -> fmt::Result {
    for (i, c) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

fn write_weighted(f: &mut fmt::Formatter<'_>, children: &[Weighted]) -> fmt::Result {
    for (i, w) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{} {}", w.weight, w.node)?;
    }
    Ok(())
}

/// Query-language rendering; parsing it back yields an equivalent tree.
///
/// SCORE has no surface syntax and renders as its argument.
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term { stem, field: None } => f.write_str(stem),
            Self::Term {
                stem,
                field: Some(field),
            } => write!(f, "{stem}.{field}"),
            Self::Score(inner) => write!(f, "{inner}"),
            Self::Syn(c) => {
                f.write_str("#syn(")?;
                write_children(f, c)?;
                f.write_str(")")
            }
            Self::And(c) => {
                f.write_str("#and(")?;
                write_children(f, c)?;
                f.write_str(")")
            }
            Self::Or(c) => {
                f.write_str("#or(")?;
                write_children(f, c)?;
                f.write_str(")")
            }
            Self::Sum(c) => {
                f.write_str("#sum(")?;
                write_children(f, c)?;
                f.write_str(")")
            }
            Self::Near { distance, children } => {
                write!(f, "#near/{distance}(")?;
                write_children(f, children)?;
                f.write_str(")")
            }
            Self::Window { distance, children } => {
                write!(f, "#window/{distance}(")?;
                write_children(f, children)?;
                f.write_str(")")
            }
            Self::WAnd(w) => {
                f.write_str("#wand(")?;
                write_weighted(f, w)?;
                f.write_str(")")
            }
            Self::WSum(w) => {
                f.write_str("#wsum(")?;
                write_weighted(f, w)?;
                f.write_str(")")
            }
        }
    }
}

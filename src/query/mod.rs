//! Query language: the operator tree, its parser and its evaluator.

mod eval;
mod node;
mod parser;

pub use eval::{
    geometric_mean, near_positions, weighted_product, weighted_sum, window_positions,
    DefaultScore, Evaluator, QryResult, Scored,
};
pub use node::{QueryNode, Weighted};
pub use parser::{wrap_default, ParseError, QueryParser};

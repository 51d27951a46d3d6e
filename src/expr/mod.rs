//! Constant-expression language used by non-literal column values: AST,
//! token parser with bounded depth/backtracking, and a constant evaluator
//! with parameter bind-points for template replay.

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{BinOp, Expr, UnOp};
pub use eval::{evaluate, EvalContext};
pub use parser::parse_expression;

//! The property expression language: a small, side-effect free subset of
//! Python expressions evaluated against a report scope.

pub mod ast;
pub mod decimal;
pub mod error;
pub mod eval;
pub mod format;
pub mod parser;
pub mod value;

pub use decimal::Decimal;
pub use error::ExprError;
pub use eval::{Evaluator, LiteralScope, Scope};
pub use parser::parse_expression;
pub use value::{Namespace, Value};

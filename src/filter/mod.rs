//! Boolean filter expressions
//!
//! The expression tree in [`expr`] is shared by population filters, derived
//! flags and category predicates. [`parser`] turns the textual form used in
//! study definitions into that tree.

pub mod expr;
pub mod parser;

pub use expr::{CmpOp, Expr, Operand, eq_filter, range_filter};
pub use parser::{ParseError, Precedence, parse_expression};

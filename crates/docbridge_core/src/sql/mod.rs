//! The statement language understood by the in-memory datastore.

mod ast;
mod lexer;
mod parser;

pub use ast::{field_of, value_to_id, CmpOp, Cond, Data, Expr, Projection, Statement, Target, Vars};
pub use lexer::{tokenize, Token};
pub use parser::{parse, parse_target};

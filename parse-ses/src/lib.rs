//! Strict-mode parser for the SES-core JavaScript subset.
//!
//! This crate is the front-end consumed by `vm-ses`: it turns source text into a plain-enum AST
//! and reports failures as [`SyntaxError`] values carrying byte offsets. It has no knowledge of
//! the heap or the VM.
//!
//! Every script is parsed as if it began with `"use strict"`. Constructs outside the supported
//! subset (`with`, template literals, regular expression literals, classes, generators, async)
//! are rejected at parse time.

mod ast;
mod error;
mod lexer;
mod loc;
mod parser;
mod token;

pub use crate::ast::AssignOp;
pub use crate::ast::BinaryOp;
pub use crate::ast::CatchClause;
pub use crate::ast::DeclMode;
pub use crate::ast::Expr;
pub use crate::ast::Func;
pub use crate::ast::LogicalOp;
pub use crate::ast::MemberKey;
pub use crate::ast::PropKey;
pub use crate::ast::Stmt;
pub use crate::ast::SwitchCase;
pub use crate::ast::UnaryOp;
pub use crate::ast::UpdateOp;
pub use crate::error::SyntaxError;
pub use crate::loc::Loc;

/// Parses `source` as a strict-mode script.
///
/// Returns the top-level statement list, or the first [`SyntaxError`] encountered.
pub fn parse(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
  parser::Parser::new(source)?.parse_script()
}

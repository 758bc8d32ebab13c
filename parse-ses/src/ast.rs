//! Plain-enum AST for the supported subset.
//!
//! Nodes are owned trees with no parent links or ids; the evaluator walks them directly.
//! Function bodies are wrapped in `Rc` so closures can share them without cloning the tree.

use crate::loc::Loc;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
  Null,
  Undefined,
  Bool(bool),
  Number(f64),
  Str(String),
  Ident(String),
  This,
  Array(Vec<Expr>),
  /// Object literal; entries are evaluated in source order.
  Object(Vec<(PropKey, Expr)>),
  Function(Rc<Func>),
  Arrow(Rc<Func>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Logical(LogicalOp, Box<Expr>, Box<Expr>),
  Cond(Box<Expr>, Box<Expr>, Box<Expr>),
  /// `target op value`; target is an `Ident` or `Member` expression (checked by the parser).
  Assign(AssignOp, Box<Expr>, Box<Expr>),
  /// `++x` / `x--`; the flag is true for prefix forms.
  Update(UpdateOp, bool, Box<Expr>),
  Member(Box<Expr>, MemberKey),
  Call(Box<Expr>, Vec<Expr>),
  New(Box<Expr>, Vec<Expr>),
  /// Comma operator.
  Seq(Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropKey {
  Ident(String),
  Str(String),
  Number(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MemberKey {
  /// `obj.name`
  Static(String),
  /// `obj[expr]`
  Computed(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Plus,
  Not,
  BitNot,
  Typeof,
  Void,
  Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
  Inc,
  Dec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Eq,
  NotEq,
  StrictEq,
  StrictNotEq,
  Lt,
  Gt,
  LtEq,
  GtEq,
  BitAnd,
  BitOr,
  BitXor,
  Shl,
  Shr,
  UShr,
  In,
  Instanceof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
  Assign,
  Add,
  Sub,
  Mul,
  Div,
  Rem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclMode {
  Var,
  Let,
  Const,
}

/// A function literal: declaration, expression, or arrow.
///
/// Arrow expression bodies are desugared by the parser into a single `return` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Func {
  pub name: Option<String>,
  pub params: Vec<String>,
  pub body: Vec<Stmt>,
  /// Arrows have lexical `this` and are not constructable.
  pub is_arrow: bool,
  pub loc: Loc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
  Expr(Expr),
  Decl {
    mode: DeclMode,
    decls: Vec<(String, Option<Expr>)>,
  },
  Function(Rc<Func>),
  Block(Vec<Stmt>),
  If(Expr, Box<Stmt>, Option<Box<Stmt>>),
  While(Expr, Box<Stmt>),
  DoWhile(Box<Stmt>, Expr),
  For {
    init: Option<Box<Stmt>>,
    test: Option<Expr>,
    update: Option<Expr>,
    body: Box<Stmt>,
  },
  /// `for (decl name in obj)`; iterates own enumerable keys only.
  ForIn {
    decl: Option<DeclMode>,
    name: String,
    object: Expr,
    body: Box<Stmt>,
  },
  /// `for (decl name of arr)`; arrays only.
  ForOf {
    decl: Option<DeclMode>,
    name: String,
    iterable: Expr,
    body: Box<Stmt>,
  },
  Switch {
    discriminant: Expr,
    cases: Vec<SwitchCase>,
  },
  Return(Option<Expr>),
  Throw(Expr),
  Try {
    block: Vec<Stmt>,
    catch: Option<CatchClause>,
    finally: Option<Vec<Stmt>>,
  },
  Break,
  Continue,
  Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
  /// `None` for the `default` clause.
  pub test: Option<Expr>,
  pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
  /// `None` for the binding-less `catch {}` form.
  pub param: Option<String>,
  pub body: Vec<Stmt>,
}

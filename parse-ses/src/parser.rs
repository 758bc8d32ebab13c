use crate::ast::{
  AssignOp, BinaryOp, CatchClause, DeclMode, Expr, Func, LogicalOp, MemberKey, PropKey, Stmt,
  SwitchCase, UnaryOp, UpdateOp,
};
use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::loc::Loc;
use crate::token::{Keyword, Token, TokenKind};
use std::rc::Rc;

/// Recursive-descent parser producing the `ast` types.
///
/// The grammar is parsed as if every script begins with `"use strict"`; the strict-mode early
/// errors (assignment to `eval`/`arguments`, duplicate parameter names, `with`, `delete` of an
/// unqualified name) are enforced here so the evaluator never sees them.
pub struct Parser<'a> {
  lexer: Lexer<'a>,
  cur: Token,
}

/// Saved parser position used for bounded lookahead (arrow parameter lists, `for…in` heads).
struct Snapshot {
  pos: usize,
  cur: Token,
}

impl<'a> Parser<'a> {
  pub fn new(source: &'a str) -> Result<Self, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let cur = lexer.next_token()?;
    Ok(Self { lexer, cur })
  }

  fn snapshot(&self) -> Snapshot {
    Snapshot {
      pos: self.lexer.pos(),
      cur: self.cur.clone(),
    }
  }

  fn restore(&mut self, snapshot: Snapshot) {
    self.lexer.set_pos(snapshot.pos);
    self.cur = snapshot.cur;
  }

  fn bump(&mut self) -> Result<Token, SyntaxError> {
    let next = self.lexer.next_token()?;
    Ok(std::mem::replace(&mut self.cur, next))
  }

  fn eat(&mut self, kind: &TokenKind) -> Result<bool, SyntaxError> {
    if &self.cur.kind == kind {
      self.bump()?;
      Ok(true)
    } else {
      Ok(false)
    }
  }

  fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), SyntaxError> {
    if &self.cur.kind == kind {
      self.bump()?;
      Ok(())
    } else {
      Err(self.unexpected(what))
    }
  }

  fn eat_keyword(&mut self, kw: Keyword) -> Result<bool, SyntaxError> {
    if self.cur.kind == TokenKind::Keyword(kw) {
      self.bump()?;
      Ok(true)
    } else {
      Ok(false)
    }
  }

  fn unexpected(&self, what: &str) -> SyntaxError {
    SyntaxError::new(format!("expected {what}"), self.cur.loc)
  }

  fn err(&self, message: impl Into<String>) -> SyntaxError {
    SyntaxError::new(message, self.cur.loc)
  }

  /// Statement terminator with automatic semicolon insertion: an explicit `;`, or a `}` / EOF /
  /// line break before the next token.
  fn eat_semi(&mut self) -> Result<(), SyntaxError> {
    if self.eat(&TokenKind::Semicolon)? {
      return Ok(());
    }
    match self.cur.kind {
      TokenKind::RBrace | TokenKind::Eof => Ok(()),
      _ if self.cur.newline_before => Ok(()),
      _ => Err(self.unexpected("`;`")),
    }
  }

  fn check_binding_name(&self, name: &str, loc: Loc) -> Result<(), SyntaxError> {
    if name == "eval" || name == "arguments" {
      return Err(SyntaxError::new(
        format!("cannot bind `{name}` in strict mode"),
        loc,
      ));
    }
    Ok(())
  }

  fn ident_name(&mut self, what: &str) -> Result<String, SyntaxError> {
    match self.cur.kind.clone() {
      TokenKind::Ident(name) => {
        self.bump()?;
        Ok(name)
      }
      TokenKind::Keyword(Keyword::Reserved) | TokenKind::Keyword(Keyword::Class) => {
        Err(self.err("reserved word cannot be used as an identifier"))
      }
      _ => Err(self.unexpected(what)),
    }
  }

  // ---------------------------------------------------------------------------------------------
  // Statements
  // ---------------------------------------------------------------------------------------------

  pub fn parse_script(mut self) -> Result<Vec<Stmt>, SyntaxError> {
    // A leading `"use strict"` directive is accepted and ignored; scripts are always strict.
    if let TokenKind::Str(s) = &self.cur.kind {
      if s == "use strict" {
        self.bump()?;
        self.eat_semi()?;
      }
    }

    let mut stmts = Vec::new();
    while self.cur.kind != TokenKind::Eof {
      stmts.push(self.parse_stmt()?);
    }
    Ok(stmts)
  }

  fn parse_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    match &self.cur.kind {
      TokenKind::Semicolon => {
        self.bump()?;
        Ok(Stmt::Empty)
      }
      TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
      TokenKind::Keyword(kw) => match kw {
        Keyword::Var | Keyword::Let | Keyword::Const => self.parse_decl_stmt(),
        Keyword::Function => {
          self.bump()?;
          let func = self.parse_function_rest(true)?;
          Ok(Stmt::Function(Rc::new(func)))
        }
        Keyword::If => self.parse_if(),
        Keyword::While => self.parse_while(),
        Keyword::Do => self.parse_do_while(),
        Keyword::For => self.parse_for(),
        Keyword::Switch => self.parse_switch(),
        Keyword::Return => {
          self.bump()?;
          let arg = if matches!(self.cur.kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
            || self.cur.newline_before
          {
            None
          } else {
            Some(self.parse_expr()?)
          };
          self.eat_semi()?;
          Ok(Stmt::Return(arg))
        }
        Keyword::Throw => {
          self.bump()?;
          if self.cur.newline_before {
            return Err(self.err("newline not allowed after `throw`"));
          }
          let arg = self.parse_expr()?;
          self.eat_semi()?;
          Ok(Stmt::Throw(arg))
        }
        Keyword::Try => self.parse_try(),
        Keyword::Break => {
          self.bump()?;
          self.eat_semi()?;
          Ok(Stmt::Break)
        }
        Keyword::Continue => {
          self.bump()?;
          self.eat_semi()?;
          Ok(Stmt::Continue)
        }
        Keyword::With => Err(self.err("`with` is not allowed in strict mode")),
        Keyword::Class => Err(self.err("classes are not supported")),
        Keyword::Reserved => Err(self.err("reserved word")),
        _ => self.parse_expr_stmt(),
      },
      _ => self.parse_expr_stmt(),
    }
  }

  fn parse_expr_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let expr = self.parse_expr()?;
    self.eat_semi()?;
    Ok(Stmt::Expr(expr))
  }

  fn parse_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
    self.expect(&TokenKind::LBrace, "`{`")?;
    let mut stmts = Vec::new();
    while !self.eat(&TokenKind::RBrace)? {
      if self.cur.kind == TokenKind::Eof {
        return Err(self.unexpected("`}`"));
      }
      stmts.push(self.parse_stmt()?);
    }
    Ok(stmts)
  }

  fn decl_mode(&mut self) -> Result<Option<DeclMode>, SyntaxError> {
    let mode = match self.cur.kind {
      TokenKind::Keyword(Keyword::Var) => DeclMode::Var,
      TokenKind::Keyword(Keyword::Let) => DeclMode::Let,
      TokenKind::Keyword(Keyword::Const) => DeclMode::Const,
      _ => return Ok(None),
    };
    self.bump()?;
    Ok(Some(mode))
  }

  fn parse_decl_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let mode = self.decl_mode()?.expect("caller checked decl keyword");
    let mut decls = Vec::new();
    loop {
      let loc = self.cur.loc;
      let name = self.ident_name("binding name")?;
      self.check_binding_name(&name, loc)?;
      let init = if self.eat(&TokenKind::Assign)? {
        Some(self.parse_assign()?)
      } else {
        if mode == DeclMode::Const {
          return Err(self.err("missing initializer in const declaration"));
        }
        None
      };
      decls.push((name, init));
      if !self.eat(&TokenKind::Comma)? {
        break;
      }
    }
    self.eat_semi()?;
    Ok(Stmt::Decl { mode, decls })
  }

  fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    self.expect(&TokenKind::LParen, "`(`")?;
    let test = self.parse_expr()?;
    self.expect(&TokenKind::RParen, "`)`")?;
    let cons = Box::new(self.parse_stmt()?);
    let alt = if self.eat_keyword(Keyword::Else)? {
      Some(Box::new(self.parse_stmt()?))
    } else {
      None
    };
    Ok(Stmt::If(test, cons, alt))
  }

  fn parse_while(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    self.expect(&TokenKind::LParen, "`(`")?;
    let test = self.parse_expr()?;
    self.expect(&TokenKind::RParen, "`)`")?;
    let body = Box::new(self.parse_stmt()?);
    Ok(Stmt::While(test, body))
  }

  fn parse_do_while(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    let body = Box::new(self.parse_stmt()?);
    if !self.eat_keyword(Keyword::While)? {
      return Err(self.unexpected("`while`"));
    }
    self.expect(&TokenKind::LParen, "`(`")?;
    let test = self.parse_expr()?;
    self.expect(&TokenKind::RParen, "`)`")?;
    // The trailing semicolon after `do … while (…)` is optional.
    let _ = self.eat(&TokenKind::Semicolon)?;
    Ok(Stmt::DoWhile(body, test))
  }

  /// Parses `for (…)` heads. `for…in` / `for…of` heads are recognized by bounded lookahead:
  /// `[var|let|const] name (in|of)`.
  fn parse_for(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    self.expect(&TokenKind::LParen, "`(`")?;

    let snapshot = self.snapshot();
    let decl = self.decl_mode()?;
    if let TokenKind::Ident(name) = self.cur.kind.clone() {
      let name_loc = self.cur.loc;
      self.bump()?;
      let iteration = if self.eat_keyword(Keyword::In)? {
        Some(true)
      } else if self.eat_keyword(Keyword::Of)? {
        Some(false)
      } else {
        None
      };
      if let Some(is_in) = iteration {
        if decl.is_some() {
          self.check_binding_name(&name, name_loc)?;
        }
        let head = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = Box::new(self.parse_stmt()?);
        return Ok(if is_in {
          Stmt::ForIn {
            decl,
            name,
            object: head,
            body,
          }
        } else {
          Stmt::ForOf {
            decl,
            name,
            iterable: head,
            body,
          }
        });
      }
    }
    self.restore(snapshot);

    // Classic three-clause head.
    let init = if self.eat(&TokenKind::Semicolon)? {
      None
    } else if matches!(
      self.cur.kind,
      TokenKind::Keyword(Keyword::Var) | TokenKind::Keyword(Keyword::Let) | TokenKind::Keyword(Keyword::Const)
    ) {
      // `parse_decl_stmt` consumes the `;` via ASI rules.
      Some(Box::new(self.parse_decl_stmt()?))
    } else {
      let expr = self.parse_expr()?;
      self.expect(&TokenKind::Semicolon, "`;`")?;
      Some(Box::new(Stmt::Expr(expr)))
    };

    let test = if self.cur.kind == TokenKind::Semicolon {
      None
    } else {
      Some(self.parse_expr()?)
    };
    self.expect(&TokenKind::Semicolon, "`;`")?;

    let update = if self.cur.kind == TokenKind::RParen {
      None
    } else {
      Some(self.parse_expr()?)
    };
    self.expect(&TokenKind::RParen, "`)`")?;

    let body = Box::new(self.parse_stmt()?);
    Ok(Stmt::For {
      init,
      test,
      update,
      body,
    })
  }

  fn parse_switch(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    self.expect(&TokenKind::LParen, "`(`")?;
    let discriminant = self.parse_expr()?;
    self.expect(&TokenKind::RParen, "`)`")?;
    self.expect(&TokenKind::LBrace, "`{`")?;

    let mut cases = Vec::new();
    let mut seen_default = false;
    while !self.eat(&TokenKind::RBrace)? {
      let test = if self.eat_keyword(Keyword::Case)? {
        let test = self.parse_expr()?;
        Some(test)
      } else if self.eat_keyword(Keyword::Default)? {
        if seen_default {
          return Err(self.err("duplicate `default` clause"));
        }
        seen_default = true;
        None
      } else {
        return Err(self.unexpected("`case` or `default`"));
      };
      self.expect(&TokenKind::Colon, "`:`")?;

      let mut body = Vec::new();
      while !matches!(
        self.cur.kind,
        TokenKind::RBrace | TokenKind::Keyword(Keyword::Case) | TokenKind::Keyword(Keyword::Default)
      ) {
        if self.cur.kind == TokenKind::Eof {
          return Err(self.unexpected("`}`"));
        }
        body.push(self.parse_stmt()?);
      }
      cases.push(SwitchCase { test, body });
    }
    Ok(Stmt::Switch {
      discriminant,
      cases,
    })
  }

  fn parse_try(&mut self) -> Result<Stmt, SyntaxError> {
    self.bump()?;
    let block = self.parse_block()?;

    let catch = if self.eat_keyword(Keyword::Catch)? {
      let param = if self.eat(&TokenKind::LParen)? {
        let loc = self.cur.loc;
        let name = self.ident_name("catch binding")?;
        self.check_binding_name(&name, loc)?;
        self.expect(&TokenKind::RParen, "`)`")?;
        Some(name)
      } else {
        None
      };
      Some(CatchClause {
        param,
        body: self.parse_block()?,
      })
    } else {
      None
    };

    let finally = if self.eat_keyword(Keyword::Finally)? {
      Some(self.parse_block()?)
    } else {
      None
    };

    if catch.is_none() && finally.is_none() {
      return Err(self.err("missing `catch` or `finally` after `try`"));
    }
    Ok(Stmt::Try {
      block,
      catch,
      finally,
    })
  }

  fn parse_function_rest(&mut self, require_name: bool) -> Result<Func, SyntaxError> {
    let start = self.cur.loc;
    let name = if let TokenKind::Ident(_) = self.cur.kind {
      let loc = self.cur.loc;
      let name = self.ident_name("function name")?;
      self.check_binding_name(&name, loc)?;
      Some(name)
    } else if require_name {
      return Err(self.unexpected("function name"));
    } else {
      None
    };

    let params = self.parse_params()?;
    let body = self.parse_block()?;
    Ok(Func {
      name,
      params,
      body,
      is_arrow: false,
      loc: start,
    })
  }

  fn parse_params(&mut self) -> Result<Vec<String>, SyntaxError> {
    self.expect(&TokenKind::LParen, "`(`")?;
    let mut params: Vec<String> = Vec::new();
    while !self.eat(&TokenKind::RParen)? {
      let loc = self.cur.loc;
      let name = self.ident_name("parameter name")?;
      self.check_binding_name(&name, loc)?;
      if params.iter().any(|p| p == &name) {
        return Err(SyntaxError::new(
          format!("duplicate parameter name `{name}`"),
          loc,
        ));
      }
      params.push(name);
      if !self.eat(&TokenKind::Comma)? && self.cur.kind != TokenKind::RParen {
        return Err(self.unexpected("`,` or `)`"));
      }
    }
    Ok(params)
  }

  // ---------------------------------------------------------------------------------------------
  // Expressions
  // ---------------------------------------------------------------------------------------------

  pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
    let mut expr = self.parse_assign()?;
    while self.eat(&TokenKind::Comma)? {
      let rhs = self.parse_assign()?;
      expr = Expr::Seq(Box::new(expr), Box::new(rhs));
    }
    Ok(expr)
  }

  fn parse_assign(&mut self) -> Result<Expr, SyntaxError> {
    // Arrow with a parenthesized parameter list, e.g. `() => {}` / `(a, b) => a + b`.
    if self.cur.kind == TokenKind::LParen {
      if let Some(arrow) = self.try_parse_paren_arrow()? {
        return Ok(arrow);
      }
    }

    let target_loc = self.cur.loc;
    let lhs = self.parse_cond()?;

    // Arrow with a bare parameter, e.g. `x => x + 1`.
    if self.cur.kind == TokenKind::Arrow && !self.cur.newline_before {
      if let Expr::Ident(name) = &lhs {
        let name = name.clone();
        self.check_binding_name(&name, target_loc)?;
        self.bump()?;
        return self.parse_arrow_rest(vec![name], target_loc);
      }
      return Err(self.err("invalid arrow function parameter list"));
    }

    let op = match self.cur.kind {
      TokenKind::Assign => AssignOp::Assign,
      TokenKind::PlusAssign => AssignOp::Add,
      TokenKind::MinusAssign => AssignOp::Sub,
      TokenKind::StarAssign => AssignOp::Mul,
      TokenKind::SlashAssign => AssignOp::Div,
      TokenKind::PercentAssign => AssignOp::Rem,
      _ => return Ok(lhs),
    };
    self.bump()?;

    match &lhs {
      Expr::Ident(name) => self.check_binding_name(name, target_loc)?,
      Expr::Member(..) => {}
      _ => return Err(SyntaxError::new("invalid assignment target", target_loc)),
    }
    let rhs = self.parse_assign()?;
    Ok(Expr::Assign(op, Box::new(lhs), Box::new(rhs)))
  }

  /// Attempts `( params ) =>` with bounded lookahead; restores the parser on failure.
  fn try_parse_paren_arrow(&mut self) -> Result<Option<Expr>, SyntaxError> {
    let snapshot = self.snapshot();
    let start = self.cur.loc;
    let params = match self.parse_params() {
      Ok(params) => params,
      Err(_) => {
        self.restore(snapshot);
        return Ok(None);
      }
    };
    if self.cur.kind == TokenKind::Arrow && !self.cur.newline_before {
      self.bump()?;
      return Ok(Some(self.parse_arrow_rest(params, start)?));
    }
    self.restore(snapshot);
    Ok(None)
  }

  fn parse_arrow_rest(&mut self, params: Vec<String>, start: Loc) -> Result<Expr, SyntaxError> {
    let body = if self.cur.kind == TokenKind::LBrace {
      self.parse_block()?
    } else {
      // Expression body desugars to a single `return`.
      let expr = self.parse_assign()?;
      vec![Stmt::Return(Some(expr))]
    };
    Ok(Expr::Arrow(Rc::new(Func {
      name: None,
      params,
      body,
      is_arrow: true,
      loc: start,
    })))
  }

  fn parse_cond(&mut self) -> Result<Expr, SyntaxError> {
    let test = self.parse_binary(0)?;
    if !self.eat(&TokenKind::Question)? {
      return Ok(test);
    }
    let cons = self.parse_assign()?;
    self.expect(&TokenKind::Colon, "`:`")?;
    let alt = self.parse_assign()?;
    Ok(Expr::Cond(Box::new(test), Box::new(cons), Box::new(alt)))
  }

  fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, SyntaxError> {
    let mut lhs = self.parse_unary()?;
    loop {
      let Some((op, bp)) = binary_op(&self.cur.kind) else {
        return Ok(lhs);
      };
      if bp < min_bp {
        return Ok(lhs);
      }
      self.bump()?;
      let rhs = self.parse_binary(bp + 1)?;
      lhs = match op {
        BinOrLogical::Binary(op) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        BinOrLogical::Logical(op) => Expr::Logical(op, Box::new(lhs), Box::new(rhs)),
      };
    }
  }

  fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
    let op = match &self.cur.kind {
      TokenKind::Not => Some(UnaryOp::Not),
      TokenKind::Minus => Some(UnaryOp::Neg),
      TokenKind::Plus => Some(UnaryOp::Plus),
      TokenKind::Tilde => Some(UnaryOp::BitNot),
      TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
      TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
      TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
      TokenKind::PlusPlus => {
        self.bump()?;
        let target = self.parse_unary()?;
        self.check_update_target(&target)?;
        return Ok(Expr::Update(UpdateOp::Inc, true, Box::new(target)));
      }
      TokenKind::MinusMinus => {
        self.bump()?;
        let target = self.parse_unary()?;
        self.check_update_target(&target)?;
        return Ok(Expr::Update(UpdateOp::Dec, true, Box::new(target)));
      }
      _ => None,
    };

    if let Some(op) = op {
      let loc = self.cur.loc;
      self.bump()?;
      let operand = self.parse_unary()?;
      if op == UnaryOp::Delete && !matches!(operand, Expr::Member(..)) {
        return Err(SyntaxError::new(
          "`delete` of an unqualified name is not allowed in strict mode",
          loc,
        ));
      }
      return Ok(Expr::Unary(op, Box::new(operand)));
    }

    let mut expr = self.parse_postfix()?;

    // Postfix `++` / `--` are restricted productions: a preceding newline terminates the
    // expression instead.
    if !self.cur.newline_before {
      if self.cur.kind == TokenKind::PlusPlus {
        self.bump()?;
        self.check_update_target(&expr)?;
        expr = Expr::Update(UpdateOp::Inc, false, Box::new(expr));
      } else if self.cur.kind == TokenKind::MinusMinus {
        self.bump()?;
        self.check_update_target(&expr)?;
        expr = Expr::Update(UpdateOp::Dec, false, Box::new(expr));
      }
    }
    Ok(expr)
  }

  fn check_update_target(&self, target: &Expr) -> Result<(), SyntaxError> {
    match target {
      Expr::Ident(_) | Expr::Member(..) => Ok(()),
      _ => Err(self.err("invalid increment/decrement target")),
    }
  }

  fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
    let mut expr = if self.cur.kind == TokenKind::Keyword(Keyword::New) {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };

    loop {
      match &self.cur.kind {
        TokenKind::Dot => {
          self.bump()?;
          let name = self.ident_name("property name")?;
          expr = Expr::Member(Box::new(expr), MemberKey::Static(name));
        }
        TokenKind::LBracket => {
          self.bump()?;
          let key = self.parse_expr()?;
          self.expect(&TokenKind::RBracket, "`]`")?;
          expr = Expr::Member(Box::new(expr), MemberKey::Computed(Box::new(key)));
        }
        TokenKind::LParen => {
          let args = self.parse_args()?;
          expr = Expr::Call(Box::new(expr), args);
        }
        _ => return Ok(expr),
      }
    }
  }

  fn parse_new(&mut self) -> Result<Expr, SyntaxError> {
    self.bump()?;
    // The callee of `new` is a member expression: property accesses bind tighter than the
    // argument list, calls do not.
    let mut callee = if self.cur.kind == TokenKind::Keyword(Keyword::New) {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };
    loop {
      match &self.cur.kind {
        TokenKind::Dot => {
          self.bump()?;
          let name = self.ident_name("property name")?;
          callee = Expr::Member(Box::new(callee), MemberKey::Static(name));
        }
        TokenKind::LBracket => {
          self.bump()?;
          let key = self.parse_expr()?;
          self.expect(&TokenKind::RBracket, "`]`")?;
          callee = Expr::Member(Box::new(callee), MemberKey::Computed(Box::new(key)));
        }
        _ => break,
      }
    }
    let args = if self.cur.kind == TokenKind::LParen {
      self.parse_args()?
    } else {
      Vec::new()
    };
    Ok(Expr::New(Box::new(callee), args))
  }

  fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
    self.expect(&TokenKind::LParen, "`(`")?;
    let mut args = Vec::new();
    while !self.eat(&TokenKind::RParen)? {
      args.push(self.parse_assign()?);
      if !self.eat(&TokenKind::Comma)? && self.cur.kind != TokenKind::RParen {
        return Err(self.unexpected("`,` or `)`"));
      }
    }
    Ok(args)
  }

  fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
    match self.cur.kind.clone() {
      TokenKind::Number(n) => {
        self.bump()?;
        Ok(Expr::Number(n))
      }
      TokenKind::Str(s) => {
        self.bump()?;
        Ok(Expr::Str(s))
      }
      TokenKind::Ident(name) => {
        self.bump()?;
        Ok(Expr::Ident(name))
      }
      TokenKind::Keyword(kw) => match kw {
        Keyword::Null => {
          self.bump()?;
          Ok(Expr::Null)
        }
        Keyword::Undefined => {
          self.bump()?;
          Ok(Expr::Undefined)
        }
        Keyword::True => {
          self.bump()?;
          Ok(Expr::Bool(true))
        }
        Keyword::False => {
          self.bump()?;
          Ok(Expr::Bool(false))
        }
        Keyword::This => {
          self.bump()?;
          Ok(Expr::This)
        }
        Keyword::Function => {
          self.bump()?;
          let func = self.parse_function_rest(false)?;
          Ok(Expr::Function(Rc::new(func)))
        }
        _ => Err(self.unexpected("an expression")),
      },
      TokenKind::LParen => {
        self.bump()?;
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(expr)
      }
      TokenKind::LBracket => self.parse_array_literal(),
      TokenKind::LBrace => self.parse_object_literal(),
      TokenKind::Slash => Err(self.err("regular expression literals are not supported")),
      _ => Err(self.unexpected("an expression")),
    }
  }

  fn parse_array_literal(&mut self) -> Result<Expr, SyntaxError> {
    self.bump()?;
    let mut elems = Vec::new();
    while !self.eat(&TokenKind::RBracket)? {
      if self.cur.kind == TokenKind::Comma {
        // `[1, , 3]` would create a hole, which the subset forbids.
        return Err(self.err("array holes are not supported"));
      }
      elems.push(self.parse_assign()?);
      if !self.eat(&TokenKind::Comma)? && self.cur.kind != TokenKind::RBracket {
        return Err(self.unexpected("`,` or `]`"));
      }
    }
    Ok(Expr::Array(elems))
  }

  fn parse_object_literal(&mut self) -> Result<Expr, SyntaxError> {
    self.bump()?;
    let mut props = Vec::new();
    while !self.eat(&TokenKind::RBrace)? {
      let key = match self.cur.kind.clone() {
        TokenKind::Ident(name) => {
          self.bump()?;
          PropKey::Ident(name)
        }
        TokenKind::Str(s) => {
          self.bump()?;
          PropKey::Str(s)
        }
        TokenKind::Number(n) => {
          self.bump()?;
          PropKey::Number(n)
        }
        _ => return Err(self.unexpected("a property key")),
      };

      let value = if self.eat(&TokenKind::Colon)? {
        self.parse_assign()?
      } else if let PropKey::Ident(name) = &key {
        // Shorthand `{ x }`.
        Expr::Ident(name.clone())
      } else {
        return Err(self.unexpected("`:`"));
      };
      props.push((key, value));

      if !self.eat(&TokenKind::Comma)? && self.cur.kind != TokenKind::RBrace {
        return Err(self.unexpected("`,` or `}`"));
      }
    }
    Ok(Expr::Object(props))
  }
}

enum BinOrLogical {
  Binary(BinaryOp),
  Logical(LogicalOp),
}

/// Binding powers, lowest first; mirrors the ECMAScript precedence table for the subset.
fn binary_op(kind: &TokenKind) -> Option<(BinOrLogical, u8)> {
  use BinOrLogical::{Binary, Logical};
  Some(match kind {
    TokenKind::PipePipe => (Logical(LogicalOp::Or), 1),
    TokenKind::AmpAmp => (Logical(LogicalOp::And), 2),
    TokenKind::Pipe => (Binary(BinaryOp::BitOr), 3),
    TokenKind::Caret => (Binary(BinaryOp::BitXor), 4),
    TokenKind::Amp => (Binary(BinaryOp::BitAnd), 5),
    TokenKind::EqEq => (Binary(BinaryOp::Eq), 6),
    TokenKind::NotEq => (Binary(BinaryOp::NotEq), 6),
    TokenKind::EqEqEq => (Binary(BinaryOp::StrictEq), 6),
    TokenKind::NotEqEq => (Binary(BinaryOp::StrictNotEq), 6),
    TokenKind::Lt => (Binary(BinaryOp::Lt), 7),
    TokenKind::Gt => (Binary(BinaryOp::Gt), 7),
    TokenKind::LtEq => (Binary(BinaryOp::LtEq), 7),
    TokenKind::GtEq => (Binary(BinaryOp::GtEq), 7),
    TokenKind::Keyword(Keyword::In) => (Binary(BinaryOp::In), 7),
    TokenKind::Keyword(Keyword::Instanceof) => (Binary(BinaryOp::Instanceof), 7),
    TokenKind::Shl => (Binary(BinaryOp::Shl), 8),
    TokenKind::Shr => (Binary(BinaryOp::Shr), 8),
    TokenKind::UShr => (Binary(BinaryOp::UShr), 8),
    TokenKind::Plus => (Binary(BinaryOp::Add), 9),
    TokenKind::Minus => (Binary(BinaryOp::Sub), 9),
    TokenKind::Star => (Binary(BinaryOp::Mul), 10),
    TokenKind::Slash => (Binary(BinaryOp::Div), 10),
    TokenKind::Percent => (Binary(BinaryOp::Rem), 10),
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse;

  #[test]
  fn precedence_and_associativity() {
    let stmts = parse("1 + 2 * 3;").unwrap();
    let Stmt::Expr(Expr::Binary(BinaryOp::Add, _, rhs)) = &stmts[0] else {
      panic!("expected Add at the top: {stmts:?}");
    };
    assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, _, _)));
  }

  #[test]
  fn arrow_functions() {
    let stmts = parse("var f = (a, b) => a + b; var g = x => { return x; };").unwrap();
    assert_eq!(stmts.len(), 2);
    let Stmt::Decl { decls, .. } = &stmts[0] else {
      panic!("expected decl");
    };
    let Some(Expr::Arrow(func)) = &decls[0].1 else {
      panic!("expected arrow");
    };
    assert_eq!(func.params, vec!["a".to_owned(), "b".to_owned()]);
    assert!(matches!(func.body[0], Stmt::Return(Some(_))));
  }

  #[test]
  fn parenthesized_expr_is_not_an_arrow() {
    let stmts = parse("(a);").unwrap();
    assert!(matches!(&stmts[0], Stmt::Expr(Expr::Ident(name)) if name == "a"));
  }

  #[test]
  fn for_in_and_for_of_heads() {
    let stmts = parse("for (var k in o) {} for (const v of xs) {}").unwrap();
    assert!(matches!(&stmts[0], Stmt::ForIn { decl: Some(DeclMode::Var), .. }));
    assert!(matches!(&stmts[1], Stmt::ForOf { decl: Some(DeclMode::Const), .. }));
  }

  #[test]
  fn asi_inserts_at_newline_and_brace() {
    assert!(parse("var a = 1\nvar b = 2").is_ok());
    assert!(parse("{ var a = 1 }").is_ok());
    assert!(parse("var a = 1 var b = 2").is_err());
  }

  #[test]
  fn strict_mode_early_errors() {
    assert!(parse("with (o) {}").is_err());
    assert!(parse("var eval = 1;").is_err());
    assert!(parse("arguments = 1;").is_err());
    assert!(parse("function f(a, a) {}").is_err());
    assert!(parse("delete x;").is_err());
    assert!(parse("012;").is_err());
  }

  #[test]
  fn new_binds_member_access_tighter_than_calls() {
    let stmts = parse("new a.b(1)(2);").unwrap();
    let Stmt::Expr(Expr::Call(callee, _)) = &stmts[0] else {
      panic!("expected outer call");
    };
    assert!(matches!(**callee, Expr::New(..)));
  }

  #[test]
  fn object_literal_shorthand_and_keys() {
    let stmts = parse("({ a: 1, 'b c': 2, 3: 4, d });").unwrap();
    let Stmt::Expr(Expr::Object(props)) = &stmts[0] else {
      panic!("expected object literal");
    };
    assert_eq!(props.len(), 4);
  }

  #[test]
  fn const_requires_initializer() {
    assert!(parse("const x;").is_err());
  }

  #[test]
  fn regex_literals_are_rejected() {
    assert!(parse("var r = /ab/g;").is_err());
  }
}

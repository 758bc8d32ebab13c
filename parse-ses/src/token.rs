use crate::loc::Loc;

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: Loc,
  /// Whether at least one line terminator appeared between the previous token and this one.
  /// Drives the restricted productions (`return`, `throw`, `++`/`--`) and semicolon insertion.
  pub newline_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
  Eof,

  Ident(String),
  Number(f64),
  Str(String),

  // Keywords of the subset. Reserved words that the subset does not implement (`class`, `super`,
  // `yield`, ...) lex as `Keyword` too so the parser can reject them uniformly.
  Keyword(Keyword),

  // Punctuators.
  LBrace,
  RBrace,
  LParen,
  RParen,
  LBracket,
  RBracket,
  Semicolon,
  Comma,
  Dot,
  Arrow,
  Question,
  Colon,

  Assign,
  PlusAssign,
  MinusAssign,
  StarAssign,
  SlashAssign,
  PercentAssign,

  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  PlusPlus,
  MinusMinus,

  EqEq,
  NotEq,
  EqEqEq,
  NotEqEq,
  Lt,
  Gt,
  LtEq,
  GtEq,

  AmpAmp,
  PipePipe,
  Not,

  Amp,
  Pipe,
  Caret,
  Tilde,
  Shl,
  Shr,
  UShr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
  Break,
  Case,
  Catch,
  Const,
  Continue,
  Default,
  Delete,
  Do,
  Else,
  False,
  Finally,
  For,
  Function,
  If,
  In,
  Instanceof,
  Let,
  New,
  Null,
  Of,
  Return,
  Switch,
  This,
  Throw,
  True,
  Try,
  Typeof,
  Undefined,
  Var,
  Void,
  While,
  // Recognized only to be rejected: the subset reserves these without implementing them.
  Class,
  With,
  Reserved,
}

pub fn keyword(ident: &str) -> Option<Keyword> {
  Some(match ident {
    "break" => Keyword::Break,
    "case" => Keyword::Case,
    "catch" => Keyword::Catch,
    "const" => Keyword::Const,
    "continue" => Keyword::Continue,
    "default" => Keyword::Default,
    "delete" => Keyword::Delete,
    "do" => Keyword::Do,
    "else" => Keyword::Else,
    "false" => Keyword::False,
    "finally" => Keyword::Finally,
    "for" => Keyword::For,
    "function" => Keyword::Function,
    "if" => Keyword::If,
    "in" => Keyword::In,
    "instanceof" => Keyword::Instanceof,
    "let" => Keyword::Let,
    "new" => Keyword::New,
    "null" => Keyword::Null,
    "of" => Keyword::Of,
    "return" => Keyword::Return,
    "switch" => Keyword::Switch,
    "this" => Keyword::This,
    "throw" => Keyword::Throw,
    "true" => Keyword::True,
    "try" => Keyword::Try,
    "typeof" => Keyword::Typeof,
    "undefined" => Keyword::Undefined,
    "var" => Keyword::Var,
    "void" => Keyword::Void,
    "while" => Keyword::While,
    "class" => Keyword::Class,
    "with" => Keyword::With,
    "async" | "await" | "debugger" | "enum" | "export" | "extends" | "import" | "super"
    | "yield" | "implements" | "interface" | "package" | "private" | "protected" | "public"
    | "static" => Keyword::Reserved,
    _ => return None,
  })
}

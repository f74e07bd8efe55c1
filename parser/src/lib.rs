pub mod ast;
pub mod constraint;
pub mod span;
pub mod visit;

use std::fmt;
use std::iter;

use itertools::{Itertools, MultiPeek, PeekingNext};
use span::{Positioned, Span};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
  pub message: String,
  pub span: Span,
}

impl SyntaxError {
  pub fn new(message: String, span: Span) -> Self {
    SyntaxError {
      message,
      span,
    }
  }

  fn unexpected(token: &Positioned<Token>, expected: &str) -> Self {
    SyntaxError::new(format!("unexpected {}, expected {}", token.value, expected), token.span)
  }
}

impl fmt::Display for SyntaxError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}: {}", self.span.line, self.span.column, self.message)
  }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
  ParenOpen,
  ParenClose,
  BracketOpen,
  BracketClose,
  BraceOpen,
  BraceClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  Break,
  Case,
  Chan,
  Const,
  Continue,
  Default,
  Defer,
  Else,
  Fallthrough,
  For,
  Func,
  Go,
  Goto,
  If,
  Import,
  Interface,
  Map,
  Package,
  Range,
  Return,
  Select,
  Struct,
  Switch,
  Type,
  Var,
}

impl Keyword {
  fn lookup(ident: &str) -> Option<Keyword> {
    Some(match ident {
      "break" => Keyword::Break,
      "case" => Keyword::Case,
      "chan" => Keyword::Chan,
      "const" => Keyword::Const,
      "continue" => Keyword::Continue,
      "default" => Keyword::Default,
      "defer" => Keyword::Defer,
      "else" => Keyword::Else,
      "fallthrough" => Keyword::Fallthrough,
      "for" => Keyword::For,
      "func" => Keyword::Func,
      "go" => Keyword::Go,
      "goto" => Keyword::Goto,
      "if" => Keyword::If,
      "import" => Keyword::Import,
      "interface" => Keyword::Interface,
      "map" => Keyword::Map,
      "package" => Keyword::Package,
      "range" => Keyword::Range,
      "return" => Keyword::Return,
      "select" => Keyword::Select,
      "struct" => Keyword::Struct,
      "switch" => Keyword::Switch,
      "type" => Keyword::Type,
      "var" => Keyword::Var,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
  Add,
  Sub,
  Mul,
  Quo,
  Rem,
  And,
  Or,
  Xor,
  Shl,
  Shr,
  AndNot,
  LAnd,
  LOr,
  Arrow,
  Inc,
  Dec,
  Eql,
  Neq,
  Lss,
  Leq,
  Gtr,
  Geq,
  Not,
  Tilde,
}

impl Operator {
  /// Binary precedence, 0 for operators that are never binary.
  pub fn precedence(&self) -> u8 {
    match self {
      Operator::LOr => 1,
      Operator::LAnd => 2,
      Operator::Eql | Operator::Neq | Operator::Lss | Operator::Leq | Operator::Gtr | Operator::Geq => 3,
      Operator::Add | Operator::Sub | Operator::Or | Operator::Xor => 4,
      Operator::Mul | Operator::Quo | Operator::Rem | Operator::Shl | Operator::Shr | Operator::And | Operator::AndNot => 5,
      _ => 0,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Operator::Add => "+",
      Operator::Sub => "-",
      Operator::Mul => "*",
      Operator::Quo => "/",
      Operator::Rem => "%",
      Operator::And => "&",
      Operator::Or => "|",
      Operator::Xor => "^",
      Operator::Shl => "<<",
      Operator::Shr => ">>",
      Operator::AndNot => "&^",
      Operator::LAnd => "&&",
      Operator::LOr => "||",
      Operator::Arrow => "<-",
      Operator::Inc => "++",
      Operator::Dec => "--",
      Operator::Eql => "==",
      Operator::Neq => "!=",
      Operator::Lss => "<",
      Operator::Leq => "<=",
      Operator::Gtr => ">",
      Operator::Geq => ">=",
      Operator::Not => "!",
      Operator::Tilde => "~",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comment {
  Line(String),
  Block(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Ident(String),
  Keyword(Keyword),
  Int(String),
  Float(String),
  Imag(String),
  Char(char),
  String(String),
  Delimiter(Delimiter),
  Operator(Operator),
  AssignOp(Operator),
  Assign,
  Define,
  Comma,
  Semi,
  Colon,
  Dot,
  Ellipsis,

  Comment(Comment),
}

impl Token {
  fn terminates_line(&self) -> bool {
    matches!(
      self,
      Token::Ident(_)
        | Token::Int(_)
        | Token::Float(_)
        | Token::Imag(_)
        | Token::Char(_)
        | Token::String(_)
        | Token::Keyword(Keyword::Break | Keyword::Continue | Keyword::Fallthrough | Keyword::Return)
        | Token::Operator(Operator::Inc | Operator::Dec)
        | Token::Delimiter(Delimiter::ParenClose | Delimiter::BracketClose | Delimiter::BraceClose)
    )
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Ident(name) => write!(f, "name {}", name),
      Token::Keyword(keyword) => write!(f, "keyword {}", format!("{:?}", keyword).to_lowercase()),
      Token::Int(lit) | Token::Float(lit) | Token::Imag(lit) => write!(f, "literal {}", lit),
      Token::Char(ch) => write!(f, "literal {:?}", ch),
      Token::String(value) => write!(f, "literal {:?}", value),
      Token::Delimiter(delimiter) => f.write_str(match delimiter {
        Delimiter::ParenOpen => "(",
        Delimiter::ParenClose => ")",
        Delimiter::BracketOpen => "[",
        Delimiter::BracketClose => "]",
        Delimiter::BraceOpen => "{",
        Delimiter::BraceClose => "}",
      }),
      Token::Operator(op) => f.write_str(op.as_str()),
      Token::AssignOp(op) => write!(f, "{}=", op.as_str()),
      Token::Assign => f.write_str("="),
      Token::Define => f.write_str(":="),
      Token::Comma => f.write_str("comma"),
      Token::Semi => f.write_str("newline"),
      Token::Colon => f.write_str(":"),
      Token::Dot => f.write_str("."),
      Token::Ellipsis => f.write_str("..."),
      Token::Comment(_) => f.write_str("comment"),
    }
  }
}

trait PeekNum<'a, T: Iterator<Item = (usize, char)>> {
  fn peek_num(&mut self, n: usize) -> String;
  fn consume_num(&mut self, n: usize);
}

impl<'a, T: Iterator<Item = (usize, char)>> PeekNum<'a, T> for MultiPeek<T> {
  fn peek_num(&mut self, n: usize) -> String {
    let mut buffer = String::new();
    for _ in 0..n {
      match self.peek() {
        Some(&(_, c)) => buffer.push(c),
        None => break,
      }
    }
    self.reset_peek();

    buffer
  }

  fn consume_num(&mut self, n: usize) {
    for _ in 0..n {
      if self.next().is_none() {
        break;
      }
    }
  }
}

/// Maps char offsets to 1-based line/column pairs.
struct LineIndex {
  starts: Vec<usize>,
}

impl LineIndex {
  fn new(input: &str) -> Self {
    let starts = iter::once(0)
      .chain(input.chars().enumerate().filter(|(_, ch)| *ch == '\n').map(|(pos, _)| pos + 1))
      .collect_vec();
    LineIndex { starts }
  }

  fn span(&self, start: usize, end: usize) -> Span {
    let line = self.starts.partition_point(|&it| it <= start);
    let column = start - self.starts[line - 1] + 1;
    Span { start, end, line, column }
  }
}

fn unescape(iter: &mut MultiPeek<impl Iterator<Item = (usize, char)>>, quote: char, start: usize, lines: &LineIndex) -> Result<char, SyntaxError> {
  let error = |message: &str| SyntaxError::new(message.to_owned(), lines.span(start, start));
  let (_, ch) = iter.next().ok_or_else(|| error("escape sequence not terminated"))?;
  let mut read_hex = |n: usize| -> Result<char, SyntaxError> {
    let digits = iter::from_fn(|| iter.by_ref().peeking_next(|(_, c)| c.is_ascii_hexdigit()).map(|(_, c)| c))
      .take(n)
      .collect::<String>();
    if digits.len() != n {
      return Err(error("invalid escape sequence"));
    }
    u32::from_str_radix(&digits, 16)
      .ok()
      .and_then(char::from_u32)
      .ok_or_else(|| error("escape sequence is invalid Unicode code point"))
  };

  Ok(match ch {
    'a' => '\u{07}',
    'b' => '\u{08}',
    'f' => '\u{0c}',
    'n' => '\n',
    'r' => '\r',
    't' => '\t',
    'v' => '\u{0b}',
    '\\' => '\\',
    'x' => read_hex(2)?,
    'u' => read_hex(4)?,
    'U' => read_hex(8)?,
    '0'..='7' => {
      let digits = iter::once(ch)
        .chain(iter::from_fn(|| iter.by_ref().peeking_next(|(_, c)| ('0'..='7').contains(c)).map(|(_, c)| c)).take(2))
        .collect::<String>();
      u32::from_str_radix(&digits, 8)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| error("invalid octal escape"))?
    }
    ch if ch == quote => ch,
    _ => return Err(error("unknown escape sequence")),
  })
}

/// Splits Go source into tokens, inserting the semicolons the Go grammar
/// implies at line ends. Comments are kept in the stream.
pub fn tokenizer(input: &str) -> Result<Vec<Positioned<Token>>, SyntaxError> {
  let lines = LineIndex::new(input);
  let mut tokens: Vec<Positioned<Token>> = Vec::new();
  let mut iter = itertools::multipeek(input.chars().enumerate());
  let mut needs_semi = false;

  macro_rules! push {
    ($token:expr, $start:expr, $end:expr) => {{
      let token = $token;
      needs_semi = token.terminates_line();
      tokens.push(Positioned::new(token, lines.span($start, $end)));
    }};
  }

  while let Some((pos, ch)) = iter.next() {
    if ch == '\n' {
      if needs_semi {
        tokens.push(Positioned::new(Token::Semi, lines.span(pos, pos)));
        needs_semi = false;
      }
      continue;
    }
    if ch.is_whitespace() {
      continue;
    }

    if ch == '/' && iter.peek_num(1) == "/" {
      iter.consume_num(1);
      let text = iter::from_fn(|| iter.by_ref().peeking_next(|(_, c)| *c != '\n').map(|(_, c)| c))
        .collect::<String>();
      let end = pos + 2 + text.chars().count();
      let text = text.trim_end_matches('\r').to_owned();
      tokens.push(Positioned::new(Token::Comment(Comment::Line(text)), lines.span(pos, end)));
      continue;
    }

    if ch == '/' && iter.peek_num(1) == "*" {
      iter.consume_num(1);
      let mut text = String::new();
      let mut end = None;
      while let Some((at, c)) = iter.next() {
        if c == '*' && iter.peek_num(1) == "/" {
          iter.consume_num(1);
          end = Some(at + 2);
          break;
        }
        text.push(c);
      }
      let end = end.ok_or_else(|| SyntaxError::new("comment not terminated".to_owned(), lines.span(pos, pos)))?;
      if text.contains('\n') && needs_semi {
        tokens.push(Positioned::new(Token::Semi, lines.span(pos, pos)));
        needs_semi = false;
      }
      tokens.push(Positioned::new(Token::Comment(Comment::Block(text)), lines.span(pos, end)));
      continue;
    }

    match ch {
      '(' => push!(Token::Delimiter(Delimiter::ParenOpen), pos, pos + 1),
      ')' => push!(Token::Delimiter(Delimiter::ParenClose), pos, pos + 1),
      '[' => push!(Token::Delimiter(Delimiter::BracketOpen), pos, pos + 1),
      ']' => push!(Token::Delimiter(Delimiter::BracketClose), pos, pos + 1),
      '{' => push!(Token::Delimiter(Delimiter::BraceOpen), pos, pos + 1),
      '}' => push!(Token::Delimiter(Delimiter::BraceClose), pos, pos + 1),
      ',' => push!(Token::Comma, pos, pos + 1),
      ';' => push!(Token::Semi, pos, pos + 1),
      ':' if iter.peek_num(1) == "=" => {
        iter.consume_num(1);
        push!(Token::Define, pos, pos + 2)
      }
      ':' => push!(Token::Colon, pos, pos + 1),
      '.' if iter.peek_num(2) == ".." => {
        iter.consume_num(2);
        push!(Token::Ellipsis, pos, pos + 3)
      }
      '.' if iter.peek_num(1).chars().all(|c| c.is_ascii_digit()) && !iter.peek_num(1).is_empty() => {
        let s = read_number(&mut iter, ch);
        let end = pos + s.chars().count();
        push!(classify_number(s), pos, end)
      }
      '.' => push!(Token::Dot, pos, pos + 1),
      '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '<' | '>' | '=' | '!' | '~' => {
        let (token, len) = read_operator(&mut iter, ch);
        push!(token, pos, pos + len)
      }
      '"' => {
        let mut value = String::new();
        let end = loop {
          match iter.next() {
            Some((at, '"')) => break at + 1,
            Some((at, '\\')) => value.push(unescape(&mut iter, '"', at, &lines)?),
            Some((_, '\n')) | None => return Err(SyntaxError::new("string literal not terminated".to_owned(), lines.span(pos, pos))),
            Some((_, c)) => value.push(c),
          }
        };
        push!(Token::String(value), pos, end)
      }
      '`' => {
        let mut value = String::new();
        let end = loop {
          match iter.next() {
            Some((at, '`')) => break at + 1,
            Some((_, '\r')) => {}
            Some((_, c)) => value.push(c),
            None => return Err(SyntaxError::new("raw string literal not terminated".to_owned(), lines.span(pos, pos))),
          }
        };
        push!(Token::String(value), pos, end)
      }
      '\'' => {
        let value = match iter.next() {
          Some((at, '\\')) => unescape(&mut iter, '\'', at, &lines)?,
          Some((_, c)) if c != '\'' && c != '\n' => c,
          _ => return Err(SyntaxError::new("empty rune literal or unescaped ' in rune literal".to_owned(), lines.span(pos, pos))),
        };
        match iter.next() {
          Some((at, '\'')) => push!(Token::Char(value), pos, at + 1),
          _ => return Err(SyntaxError::new("rune literal not terminated".to_owned(), lines.span(pos, pos))),
        }
      }
      '0'..='9' => {
        let s = read_number(&mut iter, ch);
        let end = pos + s.chars().count();
        push!(classify_number(s), pos, end)
      }
      ch if ch.is_alphabetic() || ch == '_' => {
        let s = iter::once(ch)
          .chain(iter::from_fn(|| {
            iter.by_ref().peeking_next(|(_, s)| s.is_alphanumeric() || *s == '_').map(|(_, c)| c)
          }))
          .collect::<String>();

        let end = pos + s.chars().count();
        match Keyword::lookup(&s) {
          Some(keyword) => push!(Token::Keyword(keyword), pos, end),
          None => push!(Token::Ident(s), pos, end),
        }
      }
      _ => return Err(SyntaxError::new(format!("invalid character {:?}", ch), lines.span(pos, pos))),
    }
  }

  if needs_semi {
    let end = input.chars().count();
    tokens.push(Positioned::new(Token::Semi, lines.span(end, end)));
  }

  trace!("tokenized {} tokens", tokens.len());
  Ok(tokens)
}

fn read_number(iter: &mut MultiPeek<impl Iterator<Item = (usize, char)>>, first: char) -> String {
  let mut s = String::from(first);
  let hex = first == '0' && matches!(iter.peek_num(1).as_str(), "x" | "X");
  loop {
    let next = iter.peek_num(2);
    let mut chars = next.chars();
    let (Some(c), lookahead) = (chars.next(), chars.next()) else {
      break;
    };
    let exponent = if hex { matches!(s.chars().last(), Some('p' | 'P')) } else { matches!(s.chars().last(), Some('e' | 'E')) };
    let accept = match c {
      c if c.is_ascii_alphanumeric() || c == '_' => true,
      '.' => !s.contains('.') && lookahead != Some('.'),
      '+' | '-' => exponent,
      _ => false,
    };
    if !accept {
      break;
    }
    s.push(c);
    iter.consume_num(1);
  }

  s
}

fn classify_number(s: String) -> Token {
  let lower = s.to_ascii_lowercase();
  let hex = lower.starts_with("0x");
  if lower.ends_with('i') {
    Token::Imag(s)
  } else if lower.contains('.') || (hex && lower.contains('p')) || (!hex && lower.contains('e')) {
    Token::Float(s)
  } else {
    Token::Int(s)
  }
}

fn read_operator(iter: &mut MultiPeek<impl Iterator<Item = (usize, char)>>, first: char) -> (Token, usize) {
  let lookahead = iter.peek_num(2);
  let candidates: &[(&str, Token)] = &[
    ("<<=", Token::AssignOp(Operator::Shl)),
    (">>=", Token::AssignOp(Operator::Shr)),
    ("&^=", Token::AssignOp(Operator::AndNot)),
    ("&^", Token::Operator(Operator::AndNot)),
    ("<<", Token::Operator(Operator::Shl)),
    (">>", Token::Operator(Operator::Shr)),
    ("&&", Token::Operator(Operator::LAnd)),
    ("||", Token::Operator(Operator::LOr)),
    ("<-", Token::Operator(Operator::Arrow)),
    ("++", Token::Operator(Operator::Inc)),
    ("--", Token::Operator(Operator::Dec)),
    ("==", Token::Operator(Operator::Eql)),
    ("!=", Token::Operator(Operator::Neq)),
    ("<=", Token::Operator(Operator::Leq)),
    (">=", Token::Operator(Operator::Geq)),
    ("+=", Token::AssignOp(Operator::Add)),
    ("-=", Token::AssignOp(Operator::Sub)),
    ("*=", Token::AssignOp(Operator::Mul)),
    ("/=", Token::AssignOp(Operator::Quo)),
    ("%=", Token::AssignOp(Operator::Rem)),
    ("&=", Token::AssignOp(Operator::And)),
    ("|=", Token::AssignOp(Operator::Or)),
    ("^=", Token::AssignOp(Operator::Xor)),
  ];

  let text = format!("{}{}", first, lookahead);
  for (candidate, token) in candidates {
    if text.starts_with(candidate) {
      let len = candidate.chars().count();
      iter.consume_num(len - 1);
      return (token.clone(), len);
    }
  }

  let token = match first {
    '+' => Token::Operator(Operator::Add),
    '-' => Token::Operator(Operator::Sub),
    '*' => Token::Operator(Operator::Mul),
    '/' => Token::Operator(Operator::Quo),
    '%' => Token::Operator(Operator::Rem),
    '&' => Token::Operator(Operator::And),
    '|' => Token::Operator(Operator::Or),
    '^' => Token::Operator(Operator::Xor),
    '<' => Token::Operator(Operator::Lss),
    '>' => Token::Operator(Operator::Gtr),
    '!' => Token::Operator(Operator::Not),
    '~' => Token::Operator(Operator::Tilde),
    _ => Token::Assign,
  };
  (token, 1)
}

macro_rules! consume_token {
  ($parser:expr, $token:pat) => {{
    let token = $parser.next()?;
    match &token.value {
      $token => token,
      _ => return Err(SyntaxError::unexpected(token, stringify!($token))),
    }
  }};
}

macro_rules! consume_ident {
  ($parser:expr) => {{
    let token = $parser.next()?;
    match &token.value {
      Token::Ident(value) => token.span.wrap(ast::Identifier(value.to_owned())),
      _ => return Err(SyntaxError::unexpected(token, "name")),
    }
  }};
}

mod parse;

pub use parse::{parse_expr, parse_file};

use crate::span::Positioned;
use crate::{Keyword, Operator};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub String);

impl Identifier {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_exported(&self) -> bool {
    self.0.chars().next().is_some_and(|ch| ch.is_uppercase())
  }
}

/// One comment line with the `//` or `/* */` markers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLit(pub String);

/// Joins a comment group the way godoc presents it.
pub fn comment_text(comments: &[CommentLit]) -> String {
  comments
    .iter()
    .map(|it| it.0.strip_prefix(' ').unwrap_or(&it.0).trim_end())
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_owned()
}

#[derive(Debug, Clone)]
pub struct File {
  pub package: Positioned<Identifier>,
  pub doc: Vec<CommentLit>,
  /// Raw `//go:build` and `// +build` lines found above the package clause.
  pub build_constraints: Vec<String>,
  pub imports: Vec<ImportSpec>,
  pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
  pub name: Option<Positioned<Identifier>>,
  pub path: Positioned<String>,
}

#[derive(Debug, Clone)]
pub enum Decl {
  Type(Vec<TypeSpec>),
  Const(Vec<ValueSpec>),
  Var(Vec<ValueSpec>),
  Func(FuncDecl),
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
  pub name: Positioned<Identifier>,
  pub alias: bool,
  pub ty: TypeExpr,
  pub doc: Vec<CommentLit>,
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
  pub names: Vec<Positioned<Identifier>>,
  pub ty: Option<TypeExpr>,
  /// For constants without an explicit value list this holds the repeated
  /// list of the previous spec in the group.
  pub values: Vec<Expr>,
  pub iota: i64,
  pub doc: Vec<CommentLit>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
  pub recv: Option<Field>,
  pub name: Positioned<Identifier>,
  pub signature: Signature,
  pub body: Option<Block>,
  pub doc: Vec<CommentLit>,
}

impl FuncDecl {
  /// Receiver base type name and whether it is a pointer receiver.
  pub fn recv_type(&self) -> Option<(&str, bool)> {
    let recv = self.recv.as_ref()?;
    match &recv.ty.value {
      TypeKind::Pointer(inner) => match &inner.value {
        TypeKind::Name { pkg: None, name } => Some((name.as_str(), true)),
        _ => None,
      },
      TypeKind::Name { pkg: None, name } => Some((name.as_str(), false)),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
  pub params: Vec<Field>,
  pub results: Vec<Field>,
}

impl Signature {
  pub fn is_variadic(&self) -> bool {
    self.params.last().is_some_and(|it| matches!(it.ty.value, TypeKind::Ellipsis(_)))
  }
}

#[derive(Debug, Clone)]
pub struct Field {
  pub names: Vec<Positioned<Identifier>>,
  pub ty: TypeExpr,
  pub tag: Option<String>,
  pub doc: Vec<CommentLit>,
  pub comment: Vec<CommentLit>,
}

pub type TypeExpr = Positioned<TypeKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
  Both,
  Send,
  Recv,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
  Name { pkg: Option<Identifier>, name: Identifier },
  Pointer(Box<TypeExpr>),
  Slice(Box<TypeExpr>),
  /// `len` is `None` for `[...]T`.
  Array { len: Option<Box<Expr>>, elem: Box<TypeExpr> },
  Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
  Chan { dir: ChanDir, elem: Box<TypeExpr> },
  Func(Signature),
  Struct(Vec<Field>),
  Interface(Vec<InterfaceElem>),
  Ellipsis(Box<TypeExpr>),
}

#[derive(Debug, Clone)]
pub enum InterfaceElem {
  Method {
    name: Positioned<Identifier>,
    signature: Signature,
    doc: Vec<CommentLit>,
    comment: Vec<CommentLit>,
  },
  Embedded(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BasicLit {
  Int(String),
  Float(String),
  Imag(String),
  Char(char),
  String(String),
}

impl BasicLit {
  /// Value of an integer literal in any of Go's bases.
  pub fn int_value(&self) -> Option<i128> {
    match self {
      BasicLit::Int(lit) => parse_int(lit),
      BasicLit::Char(ch) => Some(*ch as i128),
      _ => None,
    }
  }

  pub fn float_value(&self) -> Option<f64> {
    match self {
      BasicLit::Float(lit) => lit.replace('_', "").parse().ok(),
      BasicLit::Int(lit) => parse_int(lit).map(|it| it as f64),
      _ => None,
    }
  }
}

fn parse_int(lit: &str) -> Option<i128> {
  let lit = lit.replace('_', "");
  let lower = lit.to_ascii_lowercase();
  let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
    (rest.to_owned(), 16)
  } else if let Some(rest) = lower.strip_prefix("0o") {
    (rest.to_owned(), 8)
  } else if let Some(rest) = lower.strip_prefix("0b") {
    (rest.to_owned(), 2)
  } else if lower.len() > 1 && lower.starts_with('0') {
    (lower[1..].to_owned(), 8)
  } else {
    (lower, 10)
  };
  i128::from_str_radix(&digits, radix).ok()
}

pub type Expr = Positioned<ExprKind>;

#[derive(Debug, Clone)]
pub enum ExprKind {
  Ident(Identifier),
  BasicLit(BasicLit),
  CompositeLit { ty: Option<Box<Expr>>, elts: Vec<Expr> },
  FuncLit { signature: Signature, body: Block },
  Paren(Box<Expr>),
  Selector { x: Box<Expr>, sel: Positioned<Identifier> },
  Index { x: Box<Expr>, index: Box<Expr> },
  Slice { x: Box<Expr>, low: Option<Box<Expr>>, high: Option<Box<Expr>>, max: Option<Box<Expr>> },
  /// `ty` is `None` for the `x.(type)` guard of a type switch.
  TypeAssert { x: Box<Expr>, ty: Option<TypeExpr> },
  Call { fun: Box<Expr>, args: Vec<Expr>, ellipsis: bool },
  Unary { op: Operator, x: Box<Expr> },
  Binary { op: Operator, x: Box<Expr>, y: Box<Expr> },
  KeyValue { key: Box<Expr>, value: Box<Expr> },
  Type(Box<TypeExpr>),
}

impl ExprKind {
  pub fn unparen(&self) -> &ExprKind {
    match self {
      ExprKind::Paren(inner) => inner.value.unparen(),
      _ => self,
    }
  }
}

pub type Block = Vec<Stmt>;

pub type Stmt = Positioned<StmtKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
  Assign,
  Define,
  Op(Operator),
}

#[derive(Debug, Clone)]
pub struct CaseClause {
  /// Empty for `default`.
  pub list: Vec<Expr>,
  pub body: Block,
}

#[derive(Debug, Clone)]
pub struct CommClause {
  /// `None` for `default`.
  pub comm: Option<Box<Stmt>>,
  pub body: Block,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
  Decl(Decl),
  Labeled { label: Identifier, stmt: Box<Stmt> },
  Expr(Expr),
  Send { chan: Expr, value: Expr },
  IncDec { x: Expr, op: Operator },
  Assign { lhs: Vec<Expr>, op: AssignKind, rhs: Vec<Expr> },
  Go(Expr),
  Defer(Expr),
  Return(Vec<Expr>),
  Branch { keyword: Keyword, label: Option<Identifier> },
  Block(Block),
  If { init: Option<Box<Stmt>>, cond: Expr, then: Block, els: Option<Box<Stmt>> },
  Switch { init: Option<Box<Stmt>>, tag: Option<Expr>, clauses: Vec<CaseClause> },
  TypeSwitch { init: Option<Box<Stmt>>, assign: Box<Stmt>, clauses: Vec<CaseClause> },
  Select { clauses: Vec<CommClause> },
  For { init: Option<Box<Stmt>>, cond: Option<Expr>, post: Option<Box<Stmt>>, body: Block },
  Range { key: Option<Expr>, value: Option<Expr>, define: bool, x: Expr, body: Block },
  Empty,
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  #[test]
  fn int_literals_in_every_base() {
    assert_eq!(BasicLit::Int("0x1F".to_owned()).int_value(), Some(31));
    assert_eq!(BasicLit::Int("0o17".to_owned()).int_value(), Some(15));
    assert_eq!(BasicLit::Int("017".to_owned()).int_value(), Some(15));
    assert_eq!(BasicLit::Int("0b101".to_owned()).int_value(), Some(5));
    assert_eq!(BasicLit::Int("1_000".to_owned()).int_value(), Some(1000));
    assert_eq!(BasicLit::Int("0".to_owned()).int_value(), Some(0));
    assert_eq!(BasicLit::Char('a').int_value(), Some(97));
    assert_eq!(BasicLit::String("1".to_owned()).int_value(), None);
  }

  #[test]
  fn comment_groups_join_lines() {
    let comments = vec![CommentLit(" Create makes a user.".to_owned()), CommentLit(" @type:\"repeat\"".to_owned())];
    assert_eq!(comment_text(&comments), "Create makes a user.\n@type:\"repeat\"");
  }
}

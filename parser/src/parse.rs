use std::collections::HashMap;
use std::slice::Iter;

use itertools::MultiPeek;
use tracing::{debug, trace};

use crate::ast::{
  self, AssignKind, BasicLit, Block, CaseClause, ChanDir, CommClause, CommentLit, Decl, Expr, ExprKind, Field, File,
  FuncDecl, ImportSpec, InterfaceElem, Signature, Stmt, StmtKind, TypeExpr, TypeKind, TypeSpec, ValueSpec,
};
use crate::span::{Positioned, Span};
use crate::{tokenizer, Comment, Delimiter, Keyword, Operator, SyntaxError, Token};

struct CommentEntry {
  start_line: usize,
  lines: Vec<CommentLit>,
  own_line: bool,
}

/// Comments split off the token stream, addressable by source line.
#[derive(Default)]
struct CommentTable {
  entries: Vec<CommentEntry>,
  by_end_line: HashMap<usize, usize>,
  by_start_line: HashMap<usize, usize>,
}

impl CommentTable {
  fn push(&mut self, token: &Positioned<Token>, own_line: bool) {
    let lines = match &token.value {
      Token::Comment(Comment::Line(text)) => vec![CommentLit(text.to_owned())],
      Token::Comment(Comment::Block(text)) => text
        .lines()
        .map(|line| CommentLit(line.trim_start().trim_start_matches('*').to_owned()))
        .collect(),
      _ => return,
    };
    let end_line = token.span.line + lines.len().saturating_sub(1);
    let index = self.entries.len();
    self.by_end_line.insert(end_line, index);
    self.by_start_line.entry(token.span.line).or_insert(index);
    self.entries.push(CommentEntry { start_line: token.span.line, lines, own_line });
  }

  /// Comment group ending on the line right above `line`.
  fn doc(&self, line: usize) -> Vec<CommentLit> {
    let mut groups = Vec::new();
    let mut cursor = line.saturating_sub(1);
    while let Some(&index) = self.by_end_line.get(&cursor) {
      let entry = &self.entries[index];
      if !entry.own_line {
        break;
      }
      groups.push(entry.lines.clone());
      if entry.start_line == 0 {
        break;
      }
      cursor = entry.start_line - 1;
    }
    groups.into_iter().rev().flatten().collect()
  }

  fn trailing(&self, line: usize) -> Vec<CommentLit> {
    match self.by_start_line.get(&line) {
      Some(&index) if !self.entries[index].own_line => self.entries[index].lines.clone(),
      _ => Vec::new(),
    }
  }
}

pub(crate) struct Parser<'a> {
  input: MultiPeek<Iter<'a, Positioned<Token>>>,
  comments: CommentTable,
  last_span: Span,
  /// Below zero while parsing control clause headers, where `T {` opens a
  /// block instead of a composite literal.
  expr_lev: i32,
}

pub fn parse_file(source: &str) -> Result<File, SyntaxError> {
  let tokens = tokenizer(source)?;
  let mut comments = CommentTable::default();
  let mut code = Vec::with_capacity(tokens.len());
  let mut last_code_line = 0;
  for token in &tokens {
    match &token.value {
      Token::Comment(_) => comments.push(token, token.span.line != last_code_line),
      _ => {
        last_code_line = token.span.line;
        code.push(token.clone());
      }
    }
  }

  let mut parser = Parser::new(&code, comments);
  parser.file()
}

/// Parses a standalone expression.
pub fn parse_expr(source: &str) -> Result<Expr, SyntaxError> {
  let tokens = tokenizer(source)?
    .into_iter()
    .filter(|it| !matches!(it.value, Token::Comment(_)))
    .collect::<Vec<_>>();
  let mut parser = Parser::new(&tokens, CommentTable::default());
  let expr = parser.expr()?;
  parser.eat(&Token::Semi);
  match parser.peek() {
    Some(token) => Err(SyntaxError::unexpected(token, "end of expression")),
    None => Ok(expr),
  }
}

fn starts_type(token: &Token) -> bool {
  matches!(
    token,
    Token::Ident(_)
      | Token::Operator(Operator::Mul | Operator::Arrow)
      | Token::Delimiter(Delimiter::BracketOpen | Delimiter::ParenOpen)
      | Token::Keyword(Keyword::Map | Keyword::Chan | Keyword::Func | Keyword::Struct | Keyword::Interface)
  )
}

enum ParamEntry {
  Named(Positioned<ast::Identifier>, TypeExpr),
  Unnamed(TypeExpr),
}

impl<'a> Parser<'a> {
  fn new(tokens: &'a [Positioned<Token>], comments: CommentTable) -> Self {
    Parser {
      input: itertools::multipeek(tokens.iter()),
      comments,
      last_span: Span::identity(),
      expr_lev: 0,
    }
  }

  fn peek(&mut self) -> Option<&'a Positioned<Token>> {
    self.input.reset_peek();
    let token = self.input.peek().copied();
    self.input.reset_peek();
    token
  }

  fn peek_nth(&mut self, n: usize) -> Option<&'a Positioned<Token>> {
    self.input.reset_peek();
    for _ in 0..n {
      self.input.peek();
    }
    let token = self.input.peek().copied();
    self.input.reset_peek();
    token
  }

  fn next(&mut self) -> Result<&'a Positioned<Token>, SyntaxError> {
    match self.input.next() {
      Some(token) => {
        self.last_span = token.span;
        Ok(token)
      }
      None => Err(SyntaxError::new("unexpected end of file".to_owned(), self.last_span)),
    }
  }

  fn bump(&mut self) {
    if let Some(token) = self.input.next() {
      self.last_span = token.span;
    }
  }

  fn at(&mut self, token: &Token) -> bool {
    self.peek().is_some_and(|it| &it.value == token)
  }

  fn eat(&mut self, token: &Token) -> bool {
    if self.at(token) {
      self.bump();
      true
    } else {
      false
    }
  }

  fn start_span(&mut self) -> Span {
    self.peek().map(|it| it.span).unwrap_or(self.last_span)
  }

  fn finish<T>(&self, start: Span, value: T) -> Positioned<T> {
    start.between(self.last_span).wrap(value)
  }

  /// Statement and spec terminator. Go allows omitting it before a closing
  /// `)` or `}`.
  fn semi(&mut self) -> Result<(), SyntaxError> {
    match self.peek() {
      None => Ok(()),
      Some(token) => match &token.value {
        Token::Semi => {
          self.bump();
          Ok(())
        }
        Token::Delimiter(Delimiter::ParenClose | Delimiter::BraceClose) => Ok(()),
        _ => Err(SyntaxError::unexpected(token, "newline")),
      },
    }
  }

  fn file(&mut self) -> Result<File, SyntaxError> {
    let start = self.start_span();
    let build_constraints = self
      .comments
      .entries
      .iter()
      .filter(|it| it.start_line < start.line)
      .flat_map(|it| it.lines.iter())
      .filter(|it| it.0.starts_with("go:build") || it.0.trim_start().starts_with("+build"))
      .map(|it| it.0.to_owned())
      .collect::<Vec<_>>();
    let doc = self.comments.doc(start.line);

    consume_token!(self, Token::Keyword(Keyword::Package));
    let package = consume_ident!(self);
    self.semi()?;
    trace!("package {:?}", package);

    let mut imports = Vec::new();
    while self.at(&Token::Keyword(Keyword::Import)) {
      self.next()?;
      self.group(|parser| {
        imports.push(parser.import_spec()?);
        Ok(())
      })?;
      self.semi()?;
    }

    let mut decls = Vec::new();
    while let Some(token) = self.peek() {
      let line = token.span.line;
      match &token.value {
        Token::Semi => {
          self.next()?;
          continue;
        }
        Token::Keyword(Keyword::Func) => {
          let doc = self.comments.doc(line);
          decls.push(Decl::Func(self.func_decl(doc)?));
        }
        Token::Keyword(Keyword::Type | Keyword::Const | Keyword::Var) => decls.push(self.gen_decl()?),
        Token::Keyword(Keyword::Import) => {
          return Err(SyntaxError::new("imports must appear before other declarations".to_owned(), token.span))
        }
        _ => return Err(SyntaxError::unexpected(token, "declaration")),
      }
      self.semi()?;
    }

    debug!("parsed package {} with {} declarations", package.value.0, decls.len());
    Ok(File {
      package,
      doc,
      build_constraints,
      imports,
      decls,
    })
  }

  /// Runs `spec` once, or once per entry of a parenthesised group.
  fn group<F>(&mut self, mut spec: F) -> Result<(), SyntaxError>
  where
    F: FnMut(&mut Parser<'a>) -> Result<(), SyntaxError>,
  {
    if self.eat(&Token::Delimiter(Delimiter::ParenOpen)) {
      while !self.at(&Token::Delimiter(Delimiter::ParenClose)) {
        if self.eat(&Token::Semi) {
          continue;
        }
        spec(self)?;
        self.semi()?;
      }
      consume_token!(self, Token::Delimiter(Delimiter::ParenClose));
      Ok(())
    } else {
      spec(self)
    }
  }

  fn import_spec(&mut self) -> Result<ImportSpec, SyntaxError> {
    let token = self.next()?;
    let name = match &token.value {
      Token::Ident(name) => Some(token.span.wrap(ast::Identifier(name.to_owned()))),
      Token::Dot => Some(token.span.wrap(ast::Identifier(".".to_owned()))),
      Token::String(path) => return Ok(ImportSpec { name: None, path: token.span.wrap(path.to_owned()) }),
      _ => return Err(SyntaxError::unexpected(token, "import path")),
    };
    let token = self.next()?;
    match &token.value {
      Token::String(path) => Ok(ImportSpec { name, path: token.span.wrap(path.to_owned()) }),
      _ => Err(SyntaxError::unexpected(token, "import path")),
    }
  }

  fn gen_decl(&mut self) -> Result<Decl, SyntaxError> {
    let keyword = self.next()?;
    let decl_doc = self.comments.doc(keyword.span.line);
    let grouped = self.at(&Token::Delimiter(Delimiter::ParenOpen));

    match keyword.value {
      Token::Keyword(Keyword::Type) => {
        let mut specs = Vec::new();
        self.group(|parser| {
          let doc = if grouped { parser.doc_here() } else { decl_doc.clone() };
          specs.push(parser.type_spec(doc)?);
          Ok(())
        })?;
        Ok(Decl::Type(specs))
      }
      Token::Keyword(Keyword::Const) => {
        let mut specs: Vec<ValueSpec> = Vec::new();
        let mut iota = 0;
        self.group(|parser| {
          let doc = if grouped { parser.doc_here() } else { decl_doc.clone() };
          let previous = specs.last().map(|it| (it.ty.clone(), it.values.clone()));
          specs.push(parser.value_spec(doc, iota, previous)?);
          iota += 1;
          Ok(())
        })?;
        Ok(Decl::Const(specs))
      }
      _ => {
        let mut specs = Vec::new();
        self.group(|parser| {
          let doc = if grouped { parser.doc_here() } else { decl_doc.clone() };
          specs.push(parser.value_spec(doc, 0, None)?);
          Ok(())
        })?;
        Ok(Decl::Var(specs))
      }
    }
  }

  fn doc_here(&mut self) -> Vec<CommentLit> {
    let line = self.start_span().line;
    self.comments.doc(line)
  }

  fn type_spec(&mut self, doc: Vec<CommentLit>) -> Result<TypeSpec, SyntaxError> {
    let name = consume_ident!(self);
    if self.at(&Token::Delimiter(Delimiter::BracketOpen)) {
      let is_generic = matches!(self.peek_nth(1).map(|it| &it.value), Some(Token::Ident(_)))
        && !matches!(self.peek_nth(2).map(|it| &it.value), Some(Token::Delimiter(Delimiter::BracketClose)));
      if is_generic {
        return Err(SyntaxError::new(format!("type parameters are not supported (type {})", name.value.0), name.span));
      }
    }
    let alias = self.eat(&Token::Assign);
    let ty = self.ty()?;
    Ok(TypeSpec { name, alias, ty, doc })
  }

  fn value_spec(&mut self, doc: Vec<CommentLit>, iota: i64, previous: Option<(Option<TypeExpr>, Vec<Expr>)>) -> Result<ValueSpec, SyntaxError> {
    let mut names = vec![consume_ident!(self)];
    while self.eat(&Token::Comma) {
      names.push(consume_ident!(self));
    }

    let mut ty = None;
    if !self.at(&Token::Assign) && self.peek().is_some_and(|it| starts_type(&it.value)) {
      ty = Some(self.ty()?);
    }
    let mut values = Vec::new();
    if self.eat(&Token::Assign) {
      values = self.expr_list()?;
    } else if ty.is_none() {
      if let Some((previous_ty, previous_values)) = previous {
        ty = previous_ty;
        values = previous_values;
      }
    }

    Ok(ValueSpec { names, ty, values, iota, doc })
  }

  fn func_decl(&mut self, doc: Vec<CommentLit>) -> Result<FuncDecl, SyntaxError> {
    consume_token!(self, Token::Keyword(Keyword::Func));
    let mut recv = None;
    if self.at(&Token::Delimiter(Delimiter::ParenOpen)) {
      let mut fields = self.params()?;
      if fields.len() != 1 {
        return Err(SyntaxError::new("method has multiple receivers".to_owned(), self.last_span));
      }
      recv = fields.pop();
    }
    let name = consume_ident!(self);
    if self.at(&Token::Delimiter(Delimiter::BracketOpen)) {
      return Err(SyntaxError::new(format!("type parameters are not supported (func {})", name.value.0), name.span));
    }
    let signature = self.signature()?;
    let body = if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
      Some(self.block()?)
    } else {
      None
    };

    Ok(FuncDecl { recv, name, signature, body, doc })
  }

  fn signature(&mut self) -> Result<Signature, SyntaxError> {
    let params = self.params()?;
    let results = match self.peek() {
      Some(token) if token.value == Token::Delimiter(Delimiter::ParenOpen) => self.params()?,
      Some(token) if starts_type(&token.value) => {
        let ty = self.ty()?;
        vec![Field { names: Vec::new(), ty, tag: None, doc: Vec::new(), comment: Vec::new() }]
      }
      _ => Vec::new(),
    };
    Ok(Signature { params, results })
  }

  fn params(&mut self) -> Result<Vec<Field>, SyntaxError> {
    consume_token!(self, Token::Delimiter(Delimiter::ParenOpen));
    let mut entries = Vec::new();
    while !self.at(&Token::Delimiter(Delimiter::ParenClose)) {
      let named = matches!(self.peek().map(|it| &it.value), Some(Token::Ident(_)))
        && !matches!(
          self.peek_nth(1).map(|it| &it.value),
          Some(Token::Comma | Token::Dot | Token::Delimiter(Delimiter::ParenClose))
        );
      if named {
        let name = consume_ident!(self);
        let ty = self.param_type()?;
        entries.push(ParamEntry::Named(name, ty));
      } else {
        entries.push(ParamEntry::Unnamed(self.param_type()?));
      }
      if !self.eat(&Token::Comma) {
        break;
      }
    }
    consume_token!(self, Token::Delimiter(Delimiter::ParenClose));

    let field = |names, ty| Field { names, ty, tag: None, doc: Vec::new(), comment: Vec::new() };
    if !entries.iter().any(|it| matches!(it, ParamEntry::Named(..))) {
      return Ok(entries
        .into_iter()
        .filter_map(|it| match it {
          ParamEntry::Unnamed(ty) => Some(field(Vec::new(), ty)),
          ParamEntry::Named(..) => None,
        })
        .collect());
    }

    let mut fields = Vec::new();
    let mut pending = Vec::new();
    for entry in entries {
      match entry {
        ParamEntry::Unnamed(ty) => match ty.value {
          TypeKind::Name { pkg: None, name } => pending.push(ty.span.wrap(name)),
          _ => return Err(SyntaxError::new("mixed named and unnamed parameters".to_owned(), ty.span)),
        },
        ParamEntry::Named(name, ty) => {
          pending.push(name);
          fields.push(field(std::mem::take(&mut pending), ty));
        }
      }
    }
    if let Some(name) = pending.first() {
      return Err(SyntaxError::new("mixed named and unnamed parameters".to_owned(), name.span));
    }
    Ok(fields)
  }

  fn param_type(&mut self) -> Result<TypeExpr, SyntaxError> {
    let start = self.start_span();
    if self.eat(&Token::Ellipsis) {
      let elem = self.ty()?;
      return Ok(self.finish(start, TypeKind::Ellipsis(Box::new(elem))));
    }
    self.ty()
  }

  pub(crate) fn ty(&mut self) -> Result<TypeExpr, SyntaxError> {
    let start = self.start_span();
    let token = self.next()?;
    let kind = match &token.value {
      Token::Ident(name) => {
        let first = ast::Identifier(name.to_owned());
        let kind = if self.eat(&Token::Dot) {
          let name = consume_ident!(self);
          TypeKind::Name { pkg: Some(first), name: name.value }
        } else {
          TypeKind::Name { pkg: None, name: first }
        };
        if self.expr_lev >= 0 && self.at(&Token::Delimiter(Delimiter::BracketOpen)) && self.generic_instance_ahead() {
          return Err(SyntaxError::new("generic type instantiation is not supported".to_owned(), token.span));
        }
        kind
      }
      Token::Operator(Operator::Mul) => TypeKind::Pointer(Box::new(self.ty()?)),
      Token::Delimiter(Delimiter::BracketOpen) => {
        if self.eat(&Token::Delimiter(Delimiter::BracketClose)) {
          TypeKind::Slice(Box::new(self.ty()?))
        } else if self.eat(&Token::Ellipsis) {
          consume_token!(self, Token::Delimiter(Delimiter::BracketClose));
          TypeKind::Array { len: None, elem: Box::new(self.ty()?) }
        } else {
          self.expr_lev += 1;
          let len = self.expr()?;
          self.expr_lev -= 1;
          consume_token!(self, Token::Delimiter(Delimiter::BracketClose));
          TypeKind::Array { len: Some(Box::new(len)), elem: Box::new(self.ty()?) }
        }
      }
      Token::Keyword(Keyword::Map) => {
        consume_token!(self, Token::Delimiter(Delimiter::BracketOpen));
        let key = self.ty()?;
        consume_token!(self, Token::Delimiter(Delimiter::BracketClose));
        TypeKind::Map { key: Box::new(key), value: Box::new(self.ty()?) }
      }
      Token::Keyword(Keyword::Chan) => {
        let dir = if self.eat(&Token::Operator(Operator::Arrow)) { ChanDir::Send } else { ChanDir::Both };
        TypeKind::Chan { dir, elem: Box::new(self.ty()?) }
      }
      Token::Operator(Operator::Arrow) => {
        consume_token!(self, Token::Keyword(Keyword::Chan));
        TypeKind::Chan { dir: ChanDir::Recv, elem: Box::new(self.ty()?) }
      }
      Token::Keyword(Keyword::Func) => TypeKind::Func(self.signature()?),
      Token::Keyword(Keyword::Struct) => TypeKind::Struct(self.struct_fields()?),
      Token::Keyword(Keyword::Interface) => TypeKind::Interface(self.interface_elems()?),
      Token::Delimiter(Delimiter::ParenOpen) => {
        let inner = self.ty()?;
        consume_token!(self, Token::Delimiter(Delimiter::ParenClose));
        return Ok(inner);
      }
      _ => return Err(SyntaxError::unexpected(token, "type")),
    };
    Ok(self.finish(start, kind))
  }

  /// `Name[` in a type position is an instantiation when the bracket holds
  /// something other than an array length followed by an element type.
  fn generic_instance_ahead(&mut self) -> bool {
    !matches!(self.peek_nth(1).map(|it| &it.value), Some(Token::Delimiter(Delimiter::BracketClose)))
  }

  fn struct_fields(&mut self) -> Result<Vec<Field>, SyntaxError> {
    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    let mut fields = Vec::new();
    loop {
      if self.eat(&Token::Semi) {
        continue;
      }
      let Some(token) = self.peek() else {
        break;
      };
      if token.value == Token::Delimiter(Delimiter::BraceClose) {
        break;
      }
      let line = token.span.line;
      let doc = self.comments.doc(line);

      let embedded = match &token.value {
        Token::Operator(Operator::Mul) => true,
        Token::Ident(_) => matches!(
          self.peek_nth(1).map(|it| &it.value),
          Some(Token::Dot | Token::Semi | Token::String(_) | Token::Delimiter(Delimiter::BraceClose))
        ),
        _ => return Err(SyntaxError::unexpected(token, "field name or embedded type")),
      };

      let (names, ty) = if embedded {
        (Vec::new(), self.ty()?)
      } else {
        let mut names = vec![consume_ident!(self)];
        while self.eat(&Token::Comma) {
          names.push(consume_ident!(self));
        }
        (names, self.ty()?)
      };

      let mut tag = None;
      if let Some(token) = self.peek() {
        if let Token::String(value) = &token.value {
          tag = Some(value.to_owned());
          self.next()?;
        }
      }

      let comment = self.comments.trailing(line);
      fields.push(Field { names, ty, tag, doc, comment });
      self.semi()?;
    }
    consume_token!(self, Token::Delimiter(Delimiter::BraceClose));
    Ok(fields)
  }

  fn interface_elems(&mut self) -> Result<Vec<InterfaceElem>, SyntaxError> {
    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    let mut elems = Vec::new();
    loop {
      if self.eat(&Token::Semi) {
        continue;
      }
      let Some(token) = self.peek() else {
        break;
      };
      if token.value == Token::Delimiter(Delimiter::BraceClose) {
        break;
      }
      let line = token.span.line;
      match &token.value {
        Token::Ident(_) if matches!(self.peek_nth(1).map(|it| &it.value), Some(Token::Delimiter(Delimiter::ParenOpen))) => {
          let doc = self.comments.doc(line);
          let name = consume_ident!(self);
          let signature = self.signature()?;
          let comment = self.comments.trailing(line);
          elems.push(InterfaceElem::Method { name, signature, doc, comment });
        }
        Token::Ident(_) => {
          elems.push(InterfaceElem::Embedded(self.ty()?));
          if let Some(token) = self.peek() {
            if token.value == Token::Operator(Operator::Or) {
              return Err(SyntaxError::new("type constraints are not supported".to_owned(), token.span));
            }
          }
        }
        Token::Operator(Operator::Tilde) => {
          return Err(SyntaxError::new("type constraints are not supported".to_owned(), token.span))
        }
        _ => return Err(SyntaxError::unexpected(token, "method or embedded interface")),
      }
      self.semi()?;
    }
    consume_token!(self, Token::Delimiter(Delimiter::BraceClose));
    Ok(elems)
  }

  fn expr_list(&mut self) -> Result<Vec<Expr>, SyntaxError> {
    let mut list = vec![self.expr()?];
    while self.eat(&Token::Comma) {
      list.push(self.expr()?);
    }
    Ok(list)
  }

  pub(crate) fn expr(&mut self) -> Result<Expr, SyntaxError> {
    self.binary_expr(1)
  }

  fn binary_expr(&mut self, precedence: u8) -> Result<Expr, SyntaxError> {
    let start = self.start_span();
    let mut x = self.unary_expr()?;
    loop {
      let op = match self.peek().map(|it| &it.value) {
        Some(Token::Operator(op)) if op.precedence() >= precedence => *op,
        _ => return Ok(x),
      };
      self.next()?;
      let y = self.binary_expr(op.precedence() + 1)?;
      x = self.finish(start, ExprKind::Binary { op, x: Box::new(x), y: Box::new(y) });
    }
  }

  fn unary_expr(&mut self) -> Result<Expr, SyntaxError> {
    let start = self.start_span();
    match self.peek().map(|it| &it.value) {
      Some(Token::Operator(
        op @ (Operator::Add | Operator::Sub | Operator::Not | Operator::Xor | Operator::Mul | Operator::And | Operator::Arrow | Operator::Tilde),
      )) => {
        let op = *op;
        self.next()?;
        if op == Operator::Arrow && self.at(&Token::Keyword(Keyword::Chan)) {
          self.next()?;
          let elem = self.ty()?;
          let ty = self.finish(start, TypeKind::Chan { dir: ChanDir::Recv, elem: Box::new(elem) });
          return Ok(self.finish(start, ExprKind::Type(Box::new(ty))));
        }
        let x = self.unary_expr()?;
        Ok(self.finish(start, ExprKind::Unary { op, x: Box::new(x) }))
      }
      _ => self.primary_expr(),
    }
  }

  fn primary_expr(&mut self) -> Result<Expr, SyntaxError> {
    let start = self.start_span();
    let mut x = self.operand()?;
    loop {
      let Some(token) = self.peek() else {
        return Ok(x);
      };
      match &token.value {
        Token::Dot => {
          self.next()?;
          let token = self.next()?;
          match &token.value {
            Token::Ident(name) => {
              let sel = token.span.wrap(ast::Identifier(name.to_owned()));
              x = self.finish(start, ExprKind::Selector { x: Box::new(x), sel });
            }
            Token::Delimiter(Delimiter::ParenOpen) => {
              let ty = if self.eat(&Token::Keyword(Keyword::Type)) { None } else { Some(self.ty()?) };
              consume_token!(self, Token::Delimiter(Delimiter::ParenClose));
              x = self.finish(start, ExprKind::TypeAssert { x: Box::new(x), ty });
            }
            _ => return Err(SyntaxError::unexpected(token, "name or (")),
          }
        }
        Token::Delimiter(Delimiter::BracketOpen) => {
          self.next()?;
          self.expr_lev += 1;
          let low = if self.at(&Token::Colon) { None } else { Some(Box::new(self.expr()?)) };
          if self.eat(&Token::Colon) {
            let high = if self.at(&Token::Colon) || self.at(&Token::Delimiter(Delimiter::BracketClose)) {
              None
            } else {
              Some(Box::new(self.expr()?))
            };
            let max = if self.eat(&Token::Colon) { Some(Box::new(self.expr()?)) } else { None };
            self.expr_lev -= 1;
            consume_token!(self, Token::Delimiter(Delimiter::BracketClose));
            x = self.finish(start, ExprKind::Slice { x: Box::new(x), low, high, max });
          } else {
            self.expr_lev -= 1;
            consume_token!(self, Token::Delimiter(Delimiter::BracketClose));
            let index = low.ok_or_else(|| SyntaxError::new("expected operand".to_owned(), self.last_span))?;
            x = self.finish(start, ExprKind::Index { x: Box::new(x), index });
          }
        }
        Token::Delimiter(Delimiter::ParenOpen) => {
          self.next()?;
          self.expr_lev += 1;
          let mut args = Vec::new();
          let mut ellipsis = false;
          while !self.at(&Token::Delimiter(Delimiter::ParenClose)) {
            args.push(self.expr()?);
            if self.eat(&Token::Ellipsis) {
              ellipsis = true;
            }
            if !self.eat(&Token::Comma) {
              break;
            }
          }
          self.expr_lev -= 1;
          consume_token!(self, Token::Delimiter(Delimiter::ParenClose));
          x = self.finish(start, ExprKind::Call { fun: Box::new(x), args, ellipsis });
        }
        Token::Delimiter(Delimiter::BraceOpen) if self.literal_allowed(&x) => {
          let elts = self.literal_value()?;
          x = self.finish(start, ExprKind::CompositeLit { ty: Some(Box::new(x)), elts });
        }
        _ => return Ok(x),
      }
    }
  }

  fn literal_allowed(&self, x: &Expr) -> bool {
    match &x.value {
      ExprKind::Ident(_) => self.expr_lev >= 0,
      ExprKind::Selector { x, .. } => self.expr_lev >= 0 && matches!(x.value, ExprKind::Ident(_)),
      ExprKind::Type(ty) => matches!(ty.value, TypeKind::Array { .. } | TypeKind::Slice(_) | TypeKind::Map { .. } | TypeKind::Struct(_)),
      _ => false,
    }
  }

  fn literal_value(&mut self) -> Result<Vec<Expr>, SyntaxError> {
    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    self.expr_lev += 1;
    let mut elts = Vec::new();
    while !self.at(&Token::Delimiter(Delimiter::BraceClose)) {
      let start = self.start_span();
      let key = self.element()?;
      if self.eat(&Token::Colon) {
        let value = self.element()?;
        elts.push(self.finish(start, ExprKind::KeyValue { key: Box::new(key), value: Box::new(value) }));
      } else {
        elts.push(key);
      }
      if !self.eat(&Token::Comma) {
        break;
      }
    }
    self.expr_lev -= 1;
    self.eat(&Token::Semi);
    consume_token!(self, Token::Delimiter(Delimiter::BraceClose));
    Ok(elts)
  }

  fn element(&mut self) -> Result<Expr, SyntaxError> {
    if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
      let start = self.start_span();
      let elts = self.literal_value()?;
      return Ok(self.finish(start, ExprKind::CompositeLit { ty: None, elts }));
    }
    self.expr()
  }

  fn operand(&mut self) -> Result<Expr, SyntaxError> {
    let start = self.start_span();
    let token = self.peek().ok_or_else(|| SyntaxError::new("unexpected end of file".to_owned(), self.last_span))?;
    let kind = match &token.value {
      Token::Int(lit) => BasicLit::Int(lit.to_owned()),
      Token::Float(lit) => BasicLit::Float(lit.to_owned()),
      Token::Imag(lit) => BasicLit::Imag(lit.to_owned()),
      Token::Char(ch) => BasicLit::Char(*ch),
      Token::String(value) => BasicLit::String(value.to_owned()),
      Token::Ident(name) => {
        self.next()?;
        return Ok(token.span.wrap(ExprKind::Ident(ast::Identifier(name.to_owned()))));
      }
      Token::Delimiter(Delimiter::ParenOpen) => {
        self.next()?;
        self.expr_lev += 1;
        let inner = self.expr()?;
        self.expr_lev -= 1;
        consume_token!(self, Token::Delimiter(Delimiter::ParenClose));
        return Ok(self.finish(start, ExprKind::Paren(Box::new(inner))));
      }
      Token::Keyword(Keyword::Func) => {
        self.next()?;
        let signature = self.signature()?;
        if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
          self.expr_lev += 1;
          let body = self.block()?;
          self.expr_lev -= 1;
          return Ok(self.finish(start, ExprKind::FuncLit { signature, body }));
        }
        let ty = self.finish(start, TypeKind::Func(signature));
        return Ok(self.finish(start, ExprKind::Type(Box::new(ty))));
      }
      Token::Delimiter(Delimiter::BracketOpen)
      | Token::Keyword(Keyword::Map | Keyword::Chan | Keyword::Struct | Keyword::Interface) => {
        let ty = self.ty()?;
        return Ok(self.finish(start, ExprKind::Type(Box::new(ty))));
      }
      _ => return Err(SyntaxError::unexpected(token, "expression")),
    };
    self.next()?;
    Ok(token.span.wrap(ExprKind::BasicLit(kind)))
  }

  fn block(&mut self) -> Result<Block, SyntaxError> {
    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    let outer = self.expr_lev;
    self.expr_lev = 0;
    let stmts = self.stmt_list()?;
    self.expr_lev = outer;
    consume_token!(self, Token::Delimiter(Delimiter::BraceClose));
    Ok(stmts)
  }

  fn stmt_list(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
    let mut stmts = Vec::new();
    loop {
      match self.peek().map(|it| &it.value) {
        None
        | Some(Token::Delimiter(Delimiter::BraceClose))
        | Some(Token::Keyword(Keyword::Case | Keyword::Default)) => return Ok(stmts),
        Some(Token::Semi) => {
          self.next()?;
        }
        _ => {
          stmts.push(self.stmt()?);
          self.semi()?;
        }
      }
    }
  }

  fn stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    let token = self.peek().ok_or_else(|| SyntaxError::new("unexpected end of file".to_owned(), self.last_span))?;
    let kind = match &token.value {
      Token::Keyword(Keyword::Const | Keyword::Var | Keyword::Type) => StmtKind::Decl(self.gen_decl()?),
      Token::Keyword(Keyword::Return) => {
        self.next()?;
        let results = match self.peek().map(|it| &it.value) {
          None | Some(Token::Semi | Token::Delimiter(Delimiter::BraceClose)) => Vec::new(),
          _ => self.expr_list()?,
        };
        StmtKind::Return(results)
      }
      Token::Keyword(Keyword::Go) => {
        self.next()?;
        StmtKind::Go(self.expr()?)
      }
      Token::Keyword(Keyword::Defer) => {
        self.next()?;
        StmtKind::Defer(self.expr()?)
      }
      Token::Keyword(keyword @ (Keyword::Break | Keyword::Continue | Keyword::Goto | Keyword::Fallthrough)) => {
        let keyword = *keyword;
        self.next()?;
        let mut label = None;
        if let Some(token) = self.peek() {
          if let Token::Ident(name) = &token.value {
            label = Some(ast::Identifier(name.to_owned()));
            self.next()?;
          }
        }
        StmtKind::Branch { keyword, label }
      }
      Token::Delimiter(Delimiter::BraceOpen) => StmtKind::Block(self.block()?),
      Token::Keyword(Keyword::If) => return self.if_stmt(),
      Token::Keyword(Keyword::Switch) => return self.switch_stmt(),
      Token::Keyword(Keyword::Select) => return self.select_stmt(),
      Token::Keyword(Keyword::For) => return self.for_stmt(),
      Token::Semi => StmtKind::Empty,
      _ => return self.simple_stmt(true),
    };
    Ok(self.finish(start, kind))
  }

  fn simple_stmt(&mut self, labeled: bool) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    let lhs = self.expr_list()?;
    self.simple_stmt_with(start, lhs, labeled)
  }

  fn simple_stmt_with(&mut self, start: Span, mut lhs: Vec<Expr>, labeled: bool) -> Result<Stmt, SyntaxError> {
    let Some(token) = self.peek() else {
      return self.expr_stmt(start, lhs);
    };
    let kind = match &token.value {
      Token::Define | Token::Assign | Token::AssignOp(_) => {
        let op = match &token.value {
          Token::Define => AssignKind::Define,
          Token::AssignOp(op) => AssignKind::Op(*op),
          _ => AssignKind::Assign,
        };
        self.next()?;
        let rhs = self.expr_list()?;
        StmtKind::Assign { lhs, op, rhs }
      }
      Token::Colon if labeled && lhs.len() == 1 && matches!(lhs[0].value, ExprKind::Ident(_)) => {
        self.next()?;
        let label = match lhs.remove(0).value {
          ExprKind::Ident(label) => label,
          _ => return Err(SyntaxError::new("invalid label".to_owned(), token.span)),
        };
        let stmt = if self.at(&Token::Delimiter(Delimiter::BraceClose)) {
          self.finish(self.last_span, StmtKind::Empty)
        } else {
          self.stmt()?
        };
        StmtKind::Labeled { label, stmt: Box::new(stmt) }
      }
      Token::Operator(Operator::Arrow) => {
        self.next()?;
        let value = self.expr()?;
        StmtKind::Send { chan: lhs.remove(0), value }
      }
      Token::Operator(op @ (Operator::Inc | Operator::Dec)) => {
        let op = *op;
        self.next()?;
        StmtKind::IncDec { x: lhs.remove(0), op }
      }
      _ => return self.expr_stmt(start, lhs),
    };
    Ok(self.finish(start, kind))
  }

  fn expr_stmt(&mut self, start: Span, mut lhs: Vec<Expr>) -> Result<Stmt, SyntaxError> {
    if lhs.len() != 1 {
      return Err(SyntaxError::new("expected 1 expression".to_owned(), start));
    }
    Ok(self.finish(start, StmtKind::Expr(lhs.remove(0))))
  }

  fn header_expr(stmt: Stmt) -> Result<Expr, SyntaxError> {
    match stmt.value {
      StmtKind::Expr(expr) => Ok(expr),
      _ => Err(SyntaxError::new("expected boolean expression".to_owned(), stmt.span)),
    }
  }

  fn if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    consume_token!(self, Token::Keyword(Keyword::If));
    let outer = self.expr_lev;
    self.expr_lev = -1;
    let mut init = None;
    let cond = if self.eat(&Token::Semi) {
      self.expr()?
    } else {
      let stmt = self.simple_stmt(false)?;
      if self.eat(&Token::Semi) {
        init = Some(Box::new(stmt));
        self.expr()?
      } else {
        Self::header_expr(stmt)?
      }
    };
    self.expr_lev = outer;
    let then = self.block()?;
    let els = if self.eat(&Token::Keyword(Keyword::Else)) {
      if self.at(&Token::Keyword(Keyword::If)) {
        Some(Box::new(self.if_stmt()?))
      } else {
        let start = self.start_span();
        let block = self.block()?;
        Some(Box::new(self.finish(start, StmtKind::Block(block))))
      }
    } else {
      None
    };
    Ok(self.finish(start, StmtKind::If { init, cond, then, els }))
  }

  fn is_type_switch_guard(stmt: &Stmt) -> bool {
    let guard = |expr: &Expr| matches!(expr.value, ExprKind::TypeAssert { ty: None, .. });
    match &stmt.value {
      StmtKind::Expr(expr) => guard(expr),
      StmtKind::Assign { op: AssignKind::Define, rhs, .. } => rhs.len() == 1 && guard(&rhs[0]),
      _ => false,
    }
  }

  fn switch_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    consume_token!(self, Token::Keyword(Keyword::Switch));
    let outer = self.expr_lev;
    self.expr_lev = -1;
    let mut init = None;
    let mut tag = None;
    if !self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
      if !self.at(&Token::Semi) {
        tag = Some(self.simple_stmt(false)?);
      }
      if self.eat(&Token::Semi) {
        init = tag.take().map(Box::new);
        if !self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
          tag = Some(self.simple_stmt(false)?);
        }
      }
    }
    self.expr_lev = outer;

    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    let mut clauses = Vec::new();
    loop {
      if self.eat(&Token::Semi) {
        continue;
      }
      let token = self.next()?;
      let list = match &token.value {
        Token::Keyword(Keyword::Case) => self.expr_list()?,
        Token::Keyword(Keyword::Default) => Vec::new(),
        Token::Delimiter(Delimiter::BraceClose) => break,
        _ => return Err(SyntaxError::unexpected(token, "case or default or }")),
      };
      consume_token!(self, Token::Colon);
      let body = self.stmt_list()?;
      clauses.push(CaseClause { list, body });
    }

    let kind = match tag {
      Some(stmt) if Self::is_type_switch_guard(&stmt) => StmtKind::TypeSwitch { init, assign: Box::new(stmt), clauses },
      Some(stmt) => StmtKind::Switch { init, tag: Some(Self::header_expr(stmt)?), clauses },
      None => StmtKind::Switch { init, tag: None, clauses },
    };
    Ok(self.finish(start, kind))
  }

  fn select_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    consume_token!(self, Token::Keyword(Keyword::Select));
    consume_token!(self, Token::Delimiter(Delimiter::BraceOpen));
    let mut clauses = Vec::new();
    loop {
      if self.eat(&Token::Semi) {
        continue;
      }
      let token = self.next()?;
      let comm = match &token.value {
        Token::Keyword(Keyword::Case) => Some(Box::new(self.simple_stmt(false)?)),
        Token::Keyword(Keyword::Default) => None,
        Token::Delimiter(Delimiter::BraceClose) => break,
        _ => return Err(SyntaxError::unexpected(token, "case or default or }")),
      };
      consume_token!(self, Token::Colon);
      let body = self.stmt_list()?;
      clauses.push(CommClause { comm, body });
    }
    Ok(self.finish(start, StmtKind::Select { clauses }))
  }

  fn for_stmt(&mut self) -> Result<Stmt, SyntaxError> {
    let start = self.start_span();
    consume_token!(self, Token::Keyword(Keyword::For));
    let outer = self.expr_lev;
    self.expr_lev = -1;

    if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
      self.expr_lev = outer;
      let body = self.block()?;
      return Ok(self.finish(start, StmtKind::For { init: None, cond: None, post: None, body }));
    }

    if self.eat(&Token::Keyword(Keyword::Range)) {
      let x = self.expr()?;
      self.expr_lev = outer;
      let body = self.block()?;
      return Ok(self.finish(start, StmtKind::Range { key: None, value: None, define: false, x, body }));
    }

    let mut init = None;
    if !self.at(&Token::Semi) {
      let header_start = self.start_span();
      let mut lhs = self.expr_list()?;
      let is_range = matches!(self.peek().map(|it| &it.value), Some(Token::Define | Token::Assign))
        && matches!(self.peek_nth(1).map(|it| &it.value), Some(Token::Keyword(Keyword::Range)));
      if is_range {
        let define = self.next()?.value == Token::Define;
        self.next()?;
        let x = self.expr()?;
        self.expr_lev = outer;
        let body = self.block()?;
        let value = if lhs.len() > 1 { Some(lhs.remove(1)) } else { None };
        let key = Some(lhs.remove(0));
        return Ok(self.finish(start, StmtKind::Range { key, value, define, x, body }));
      }

      let stmt = self.simple_stmt_with(header_start, lhs, false)?;
      if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
        self.expr_lev = outer;
        let cond = Self::header_expr(stmt)?;
        let body = self.block()?;
        return Ok(self.finish(start, StmtKind::For { init: None, cond: Some(cond), post: None, body }));
      }
      init = Some(Box::new(stmt));
    }

    consume_token!(self, Token::Semi);
    let cond = if self.at(&Token::Semi) { None } else { Some(self.expr()?) };
    consume_token!(self, Token::Semi);
    let post = if self.at(&Token::Delimiter(Delimiter::BraceOpen)) {
      None
    } else {
      Some(Box::new(self.simple_stmt(false)?))
    };
    self.expr_lev = outer;
    let body = self.block()?;
    Ok(self.finish(start, StmtKind::For { init, cond, post, body }))
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;
  use tracing::{debug, info};

  use super::*;

  const SERVICE: &str = r#"// Package app is a fixture.
package app

import (
  "context"
  stdjson "encoding/json"
)

// App is the service contract.
type App interface {
  // Create makes a user.
  Create(ctx context.Context, name string, data []byte) error
  Get(ctx context.Context, id int, opts ...string) (user *User, err error)
  Embedded
}

type (
  User struct {
    ID   int    `json:"id"`
    Name string `json:"name,omitempty"` // display name
    *Base
    Meta map[string][]stdjson.RawMessage
  }
  Alias = User
)

const (
  KindA Kind = iota + 1
  KindB
  KindC
)

var defaultName, otherName = "a", "b"

func (s *service) Create(ctx context.Context, name string, data []byte) error {
  if name == "" {
    return &NotFound{}
  }
  for i := 0; i < len(data); i++ {
    switch {
    case data[i] == 0:
      continue
    default:
    }
  }
  for _, v := range data {
    _ = v
  }
  switch e := err.(type) {
  case *NotFound, nil:
    return e
  }
  return nil
}
"#;

  #[test]
  fn parses_declarations() {
    let file = parse_file(SERVICE).unwrap();
    info!("{:?}", file);

    assert_eq!(file.package.value.0, "app");
    assert_eq!(file.imports.len(), 2);
    assert_eq!(file.imports[1].name.as_ref().unwrap().value.0, "stdjson");
    assert_eq!(file.imports[1].path.value, "encoding/json");
    assert_eq!(ast::comment_text(&file.doc), "Package app is a fixture.");
    assert_eq!(file.decls.len(), 5);

    let Decl::Type(specs) = &file.decls[0] else { panic!("expected type decl") };
    assert_eq!(ast::comment_text(&specs[0].doc), "App is the service contract.");
    let TypeKind::Interface(elems) = &specs[0].ty.value else { panic!("expected interface") };
    assert_eq!(elems.len(), 3);
    let InterfaceElem::Method { name, signature, doc, .. } = &elems[0] else { panic!("expected method") };
    assert_eq!(name.value.0, "Create");
    assert_eq!(ast::comment_text(doc), "Create makes a user.");
    assert_eq!(signature.params.len(), 3);
    assert_eq!(signature.results.len(), 1);
    let InterfaceElem::Method { signature, .. } = &elems[1] else { panic!("expected method") };
    assert!(signature.is_variadic());
    assert_eq!(signature.results[0].names[0].value.0, "user");
    assert!(matches!(elems[2], InterfaceElem::Embedded(_)));

    let Decl::Type(specs) = &file.decls[1] else { panic!("expected grouped type decl") };
    assert_eq!(specs.len(), 2);
    assert!(specs[1].alias);
    let TypeKind::Struct(fields) = &specs[0].ty.value else { panic!("expected struct") };
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0].tag.as_deref(), Some("json:\"id\""));
    assert_eq!(ast::comment_text(&fields[1].comment), "display name");
    assert!(fields[2].names.is_empty());
    assert!(matches!(fields[3].ty.value, TypeKind::Map { .. }));
  }

  #[test]
  fn const_groups_repeat_previous_values() {
    let file = parse_file(SERVICE).unwrap();
    let Decl::Const(specs) = &file.decls[2] else { panic!("expected const decl") };
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[2].iota, 2);
    assert_eq!(specs[2].values.len(), 1);
    assert!(matches!(specs[2].values[0].value, ExprKind::Binary { op: Operator::Add, .. }));
    assert!(specs[2].ty.is_some());

    let Decl::Var(specs) = &file.decls[3] else { panic!("expected var decl") };
    assert_eq!(specs[0].names.len(), 2);
    assert_eq!(specs[0].values.len(), 2);
  }

  #[test]
  fn parses_method_bodies() {
    let file = parse_file(SERVICE).unwrap();
    let Decl::Func(func) = &file.decls[4] else { panic!("expected func decl") };
    assert_eq!(func.recv_type(), Some(("service", true)));
    let body = func.body.as_ref().unwrap();
    for stmt in body {
      debug!("{:?}", stmt);
    }
    assert_eq!(body.len(), 5);
    assert!(matches!(body[0].value, StmtKind::If { .. }));
    assert!(matches!(body[1].value, StmtKind::For { .. }));
    assert!(matches!(body[2].value, StmtKind::Range { define: true, .. }));
    assert!(matches!(body[3].value, StmtKind::TypeSwitch { .. }));
    assert!(matches!(body[4].value, StmtKind::Return(_)));
  }

  #[test]
  fn composite_literal_not_allowed_in_if_header() {
    let file = parse_file("package a\nfunc f() {\n  if x == y {\n    return\n  }\n  _ = T{A: 1}\n}\n").unwrap();
    let Decl::Func(func) = &file.decls[0] else { panic!("expected func decl") };
    let body = func.body.as_ref().unwrap();
    let StmtKind::If { cond, then, .. } = &body[0].value else { panic!("expected if") };
    assert!(matches!(cond.value, ExprKind::Binary { op: Operator::Eql, .. }));
    assert_eq!(then.len(), 1);
    let StmtKind::Assign { rhs, .. } = &body[1].value else { panic!("expected assign") };
    assert!(matches!(rhs[0].value, ExprKind::CompositeLit { .. }));
  }

  #[test]
  fn build_constraints_are_collected() {
    let file = parse_file("//go:build swipe\n// +build swipe\n\npackage app\n").unwrap();
    assert_eq!(file.build_constraints, vec!["go:build swipe".to_owned(), " +build swipe".to_owned()]);
    assert!(file.doc.is_empty());
  }

  #[test]
  fn parses_options_expression() {
    let expr = parse_expr(r#"Build(Service(Interface((*App)(nil), "", ClientName("x")), MethodOptions(App.Create, RESTPath("/a/{id}"), RESTQueryVars([]string{"a", "b"}))))"#).unwrap();
    let ExprKind::Call { fun, args, ellipsis } = &expr.value else { panic!("expected call") };
    assert!(matches!(&fun.value, ExprKind::Ident(name) if name.0 == "Build"));
    assert_eq!(args.len(), 1);
    assert!(!ellipsis);

    let ExprKind::Call { args, .. } = &args[0].value else { panic!("expected call") };
    let ExprKind::Call { args: iface_args, .. } = &args[0].value else { panic!("expected call") };
    let ExprKind::Call { fun, args: conv_args, .. } = &iface_args[0].value else { panic!("expected conversion") };
    assert!(matches!(fun.value.unparen(), ExprKind::Unary { op: Operator::Mul, .. }));
    assert!(matches!(&conv_args[0].value, ExprKind::Ident(name) if name.0 == "nil"));

    let ExprKind::Call { args: method_args, .. } = &args[1].value else { panic!("expected call") };
    assert!(matches!(method_args[0].value, ExprKind::Selector { .. }));
    let ExprKind::Call { args: query_args, .. } = &method_args[2].value else { panic!("expected call") };
    let ExprKind::CompositeLit { ty: Some(ty), elts } = &query_args[0].value else { panic!("expected literal") };
    assert!(matches!(&ty.value, ExprKind::Type(ty) if matches!(ty.value, TypeKind::Slice(_))));
    assert_eq!(elts.len(), 2);
  }

  #[test]
  fn binary_precedence() {
    let expr = parse_expr("1 + 2*3 - 4").unwrap();
    let ExprKind::Binary { op: Operator::Sub, x, .. } = &expr.value else { panic!("expected subtraction") };
    let ExprKind::Binary { op: Operator::Add, y, .. } = &x.value else { panic!("expected addition") };
    assert!(matches!(y.value, ExprKind::Binary { op: Operator::Mul, .. }));
  }

  #[test]
  fn rejects_type_parameters() {
    let err = parse_file("package a\n\ntype List[T any] struct{}\n").unwrap_err();
    assert_eq!(err.span.line, 3);
    assert!(err.message.contains("type parameters"));

    let err = parse_file("package a\n\nfunc Map[T any](x T) T { return x }\n").unwrap_err();
    assert!(err.message.contains("type parameters"));
  }

  #[test]
  fn array_types_are_not_generics() {
    let file = parse_file("package a\n\nconst N = 4\n\ntype Block [N]byte\n").unwrap();
    let Decl::Type(specs) = &file.decls[1] else { panic!("expected type decl") };
    assert!(matches!(specs[0].ty.value, TypeKind::Array { len: Some(_), .. }));
  }

  #[test]
  fn reports_unexpected_tokens() {
    let err = parse_file("package a\n\nfunc f() {\n  x := \n}\n").unwrap_err();
    assert_eq!(err.span.line, 5);
    assert_eq!(err.message, "unexpected }, expected expression");
  }
}

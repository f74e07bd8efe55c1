//! Static discovery of the transport errors a service method can return.
//!
//! An error type is any named type of the loaded source with an
//! `ErrorCode() int` (JSON-RPC) or `StatusCode() int` (REST) method whose
//! body returns a constant. Method bodies of the types implementing a
//! service interface are searched for `return` statements yielding such a
//! type, following calls into the same package and into interface fields of
//! the receiver one level deep.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use swipe_parser::ast::{Block, Decl, Expr, ExprKind, FuncDecl, Stmt, StmtKind, TypeKind};
use swipe_parser::visit::{self, Visitor};
use swipe_parser::Operator;
use tracing::{debug, trace};

use crate::error::SwipeError;
use crate::loader::consts;
use crate::loader::{FileScope, Loader, Package, SourceFile};
use crate::model::{IfaceType, NamedId, ObjectKey, Type};
use crate::normalize::Normalizer;

const MAX_DEPTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
  Rest,
  JsonRpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorDef {
  pub id: NamedId,
  pub name: String,
  pub pkg_path: String,
  /// Returned as `&T{}` rather than `T{}`.
  pub pointer: bool,
  pub kind: ErrorKind,
  pub code: i64,
}

/// Collects `return` statements, leaving closures alone.
#[derive(Default)]
struct Returns<'ast>(Vec<&'ast Expr>);

impl<'ast> Visitor<'ast> for Returns<'ast> {
  fn visit_stmt(&mut self, stmt: &'ast Stmt) -> bool {
    if let StmtKind::Return(results) = &stmt.value {
      self.0.extend(results.last());
      return false;
    }
    true
  }

  fn visit_expr(&mut self, expr: &'ast Expr) -> bool {
    !matches!(expr.value, ExprKind::FuncLit { .. })
  }
}

fn returns(body: &Block) -> Vec<&Expr> {
  let mut collector = Returns::default();
  visit::walk_block(&mut collector, body);
  collector.0
}

/// Method body being searched, with its receiver variable.
struct Frame<'a> {
  pkg: &'a Package,
  file: &'a SourceFile,
  recv: Option<(NamedId, String)>,
  body: &'a Block,
}

pub struct ErrorFinder<'c, 'a> {
  loader: &'a Loader,
  normalizer: &'c mut Normalizer<'a>,
  codes: HashMap<ObjectKey, Vec<(ErrorKind, i64)>>,
  /// Named types with methods, the candidates for implementing interfaces.
  candidates: Vec<(&'a Package, String, NamedId)>,
}

impl<'c, 'a> ErrorFinder<'c, 'a> {
  pub fn new(loader: &'a Loader, normalizer: &'c mut Normalizer<'a>) -> Result<Self, SwipeError> {
    let mut codes: HashMap<ObjectKey, Vec<(ErrorKind, i64)>> = HashMap::new();
    let mut candidates = Vec::new();
    for pkg in loader.packages().iter().filter(|it| !it.std && !it.opaque) {
      for file in &pkg.files {
        for decl in &file.ast.decls {
          let Decl::Func(func) = decl else { continue };
          let Some((recv, _)) = func.recv_type() else { continue };
          let kind = match func.name.value.as_str() {
            "ErrorCode" => ErrorKind::JsonRpc,
            "StatusCode" => ErrorKind::Rest,
            _ => continue,
          };
          if let Some(code) = constant_code(loader, pkg, file, func) {
            trace!("{}.{} has {:?} code {}", pkg.path, recv, kind, code);
            codes.entry(ObjectKey::new(&pkg.path, recv)).or_default().push((kind, code));
          }
        }
      }
      for name in pkg.types.keys() {
        if pkg.methods_of(name).next().is_some() {
          let id = normalizer.named(&pkg.path, name)?;
          candidates.push((pkg, name.clone(), id));
        }
      }
    }
    Ok(ErrorFinder { loader, normalizer, codes, candidates })
  }

  fn implementers(&self, iface: &IfaceType) -> Vec<(&'a Package, String, NamedId)> {
    let universe = self.normalizer.universe();
    self.candidates.iter().filter(|(_, _, id)| universe.implements(*id, iface)).cloned().collect()
  }

  /// Declared errors per method name of `iface`, over every implementation.
  pub fn find(&mut self, iface: &IfaceType) -> Result<BTreeMap<String, Vec<ErrorDef>>, SwipeError> {
    let implementers = self.implementers(iface);
    let mut result = BTreeMap::new();
    for method in &iface.methods {
      let mut errors = Vec::new();
      for (pkg, type_name, id) in &implementers {
        if let Some(frame) = method_frame(pkg, type_name, *id, &method.name.value) {
          self.search(&frame, 0, &mut errors)?;
        }
      }
      let mut seen = HashSet::new();
      errors.retain(|it: &ErrorDef| seen.insert((it.id, it.kind)));
      if !errors.is_empty() {
        debug!("{} returns {} declared errors", method.name, errors.len());
        result.insert(method.name.value.clone(), errors);
      }
    }
    Ok(result)
  }

  fn search(&mut self, frame: &Frame<'a>, depth: usize, out: &mut Vec<ErrorDef>) -> Result<(), SwipeError> {
    for expr in returns(frame.body) {
      self.resolve(frame, expr, depth, out)?;
    }
    Ok(())
  }

  fn resolve(&mut self, frame: &Frame<'a>, expr: &'a Expr, depth: usize, out: &mut Vec<ErrorDef>) -> Result<(), SwipeError> {
    let (expr, pointer) = match expr.value.unparen() {
      ExprKind::Unary { op: Operator::And, x } => (x.as_ref(), true),
      _ => (expr, false),
    };
    match expr.value.unparen() {
      ExprKind::CompositeLit { ty: Some(ty), .. } => {
        if let Some((pkg_path, name)) = type_name(frame, ty) {
          self.record(&pkg_path, &name, pointer, out)?;
        }
      }
      ExprKind::Ident(name) => {
        if let Some(value) = package_var(frame.pkg, name.as_str()) {
          let var_frame = Frame { pkg: frame.pkg, file: value.0, recv: None, body: frame.body };
          self.resolve(&var_frame, value.1, depth, out)?;
        }
      }
      ExprKind::Call { fun, .. } if depth < MAX_DEPTH => {
        for callee in self.callees(frame, fun) {
          self.search(&callee, depth + 1, out)?;
        }
      }
      _ => {}
    }
    Ok(())
  }

  fn record(&mut self, pkg_path: &str, name: &str, pointer: bool, out: &mut Vec<ErrorDef>) -> Result<(), SwipeError> {
    let Some(codes) = self.codes.get(&ObjectKey::new(pkg_path, name)).cloned() else {
      return Ok(());
    };
    let id = self.normalizer.named(pkg_path, name)?;
    for (kind, code) in codes {
      out.push(ErrorDef { id, name: name.to_owned(), pkg_path: pkg_path.to_owned(), pointer, kind, code });
    }
    Ok(())
  }

  /// Bodies reached by the call `fun` from within `frame`.
  fn callees(&self, frame: &Frame<'a>, fun: &Expr) -> Vec<Frame<'a>> {
    let loader = self.loader;
    match fun.value.unparen() {
      ExprKind::Ident(name) => func_frame(frame.pkg, name.as_str()).into_iter().collect(),
      ExprKind::Selector { x, sel } => match x.value.unparen() {
        ExprKind::Ident(qualifier) => {
          if let Some((id, recv_var)) = &frame.recv {
            if recv_var == qualifier.as_str() {
              let universe = self.normalizer.universe();
              let type_name = universe.get(*id).name.value.clone();
              return method_frame(frame.pkg, &type_name, *id, sel.value.as_str()).into_iter().collect();
            }
          }
          let Some(pkg) = frame.file.imports.get(qualifier.as_str()).and_then(|it| loader.package(it)) else {
            return Vec::new();
          };
          func_frame(pkg, sel.value.as_str()).into_iter().collect()
        }
        ExprKind::Selector { x: inner, sel: field } => {
          let (ExprKind::Ident(qualifier), Some((id, recv_var))) = (&inner.value, &frame.recv) else {
            return Vec::new();
          };
          if recv_var != qualifier.as_str() {
            return Vec::new();
          }
          self.field_callees(*id, field.value.as_str(), sel.value.as_str())
        }
        _ => Vec::new(),
      },
      _ => Vec::new(),
    }
  }

  /// Implementations of `method` behind the receiver field `field`.
  fn field_callees(&self, id: NamedId, field: &str, method: &str) -> Vec<Frame<'a>> {
    let universe = self.normalizer.universe();
    let Type::Struct(st) = &universe.get(id).underlying else {
      return Vec::new();
    };
    let Some(field) = st.fields.iter().find(|it| it.var.name.value == field) else {
      return Vec::new();
    };
    let ty = &field.var.ty;
    if let Some(iface) = universe.iface_of(ty) {
      return self
        .implementers(iface)
        .into_iter()
        .filter_map(|(pkg, type_name, id)| method_frame(pkg, &type_name, id, method))
        .collect();
    }
    let Some(named) = ty.named(universe) else {
      return Vec::new();
    };
    self
      .candidates
      .iter()
      .find(|(_, _, id)| *id == named.id)
      .and_then(|(pkg, type_name, id)| method_frame(pkg, type_name, *id, method))
      .into_iter()
      .collect()
  }
}

fn method_frame<'a>(pkg: &'a Package, type_name: &str, id: NamedId, method: &str) -> Option<Frame<'a>> {
  let (file, func) = pkg.func(&format!("{}.{}", type_name, method))?;
  let recv_var = func.recv.as_ref().and_then(|it| it.names.first()).map(|it| it.value.0.clone());
  Some(Frame { pkg, file, recv: recv_var.map(|it| (id, it)), body: func.body.as_ref()? })
}

fn func_frame<'a>(pkg: &'a Package, name: &str) -> Option<Frame<'a>> {
  let (file, func) = pkg.func(name)?;
  Some(Frame { pkg, file, recv: None, body: func.body.as_ref()? })
}

/// Value expression of a top-level `var name = ...`.
fn package_var<'a>(pkg: &'a Package, name: &str) -> Option<(&'a SourceFile, &'a Expr)> {
  pkg.files.iter().find_map(|file| {
    file.ast.decls.iter().find_map(|decl| match decl {
      Decl::Var(specs) => specs.iter().find_map(|spec| {
        let index = spec.names.iter().position(|it| it.value.as_str() == name)?;
        spec.values.get(index).map(|value| (file, value))
      }),
      _ => None,
    })
  })
}

/// Package path and name of the type of a composite literal.
fn type_name(frame: &Frame, ty: &Expr) -> Option<(String, String)> {
  match &ty.value {
    ExprKind::Ident(name) => Some((frame.pkg.path.clone(), name.0.clone())),
    ExprKind::Selector { x, sel } => {
      let ExprKind::Ident(qualifier) = &x.value else { return None };
      Some((frame.file.imports.get(qualifier.as_str())?.clone(), sel.value.0.clone()))
    }
    ExprKind::Type(ty) => match &ty.value {
      TypeKind::Name { pkg: None, name } => Some((frame.pkg.path.clone(), name.0.clone())),
      TypeKind::Name { pkg: Some(qualifier), name } => {
        Some((frame.file.imports.get(qualifier.as_str())?.clone(), name.0.clone()))
      }
      _ => None,
    },
    _ => None,
  }
}

/// Code of an `ErrorCode() int` / `StatusCode() int` method that returns a
/// single constant.
fn constant_code(loader: &Loader, pkg: &Package, file: &SourceFile, func: &FuncDecl) -> Option<i64> {
  let sig = &func.signature;
  let int_result = match sig.results.as_slice() {
    [result] if result.names.len() <= 1 => matches!(&result.ty.value, TypeKind::Name { pkg: None, name } if name.as_str() == "int"),
    _ => false,
  };
  if !sig.params.is_empty() || !int_result {
    return None;
  }
  let [stmt] = func.body.as_deref()? else { return None };
  let StmtKind::Return(values) = &stmt.value else { return None };
  let [value] = values.as_slice() else { return None };
  let mut scope = FileScope { loader, pkg, file };
  consts::eval(value, 0, &mut scope)?.as_int().and_then(|it| i64::try_from(it).ok())
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::testutil;

  const APP: &str = r#"package app

import (
	"context"

	"example.com/app/errs"
)

type Service interface {
	Create(ctx context.Context, name string) error
	Get(ctx context.Context, id int) (string, error)
	Delete(ctx context.Context, id int) error
}

type Repo interface {
	Find(id int) (string, error)
}

type NotFound struct{}

func (*NotFound) Error() string { return "not found" }
func (*NotFound) StatusCode() int { return 404 }
func (*NotFound) ErrorCode() int { return -32001 }

var ErrConflict = errs.Conflict{}

type service struct {
	repo Repo
}

func (s *service) Create(ctx context.Context, name string) error {
	if name == "" {
		return s.invalid()
	}
	return ErrConflict
}

func (s *service) invalid() error {
	return &errs.Invalid{}
}

func (s *service) Get(ctx context.Context, id int) (string, error) {
	go func() error { return &NotFound{} }()
	return s.repo.Find(id)
}

func (s *service) Delete(ctx context.Context, id int) error {
	return nil
}

type repo struct{}

func (repo) Find(id int) (string, error) {
	return "", &NotFound{}
}
"#;

  const ERRS: &str = r#"package errs

const conflictCode = 409

type Conflict struct{}

func (Conflict) Error() string { return "conflict" }
func (Conflict) StatusCode() int { return conflictCode }

type Invalid struct{}

func (*Invalid) Error() string { return "invalid" }
func (*Invalid) StatusCode() int {
	code := 400
	return code
}
func (*Invalid) ErrorCode() int { return -32602 }
"#;

  #[test]
  fn harvests_declared_errors() {
    let (_dir, loader) = testutil::load(&[("app.go", APP), ("errs/errs.go", ERRS)]);
    let mut normalizer = Normalizer::new(&loader);
    let id = normalizer.named("example.com/app", "Service").unwrap();
    let iface = normalizer.universe().iface_of(&Type::Named(crate::model::NamedRef { id, pointer: false })).unwrap().clone();
    let mut finder = ErrorFinder::new(&loader, &mut normalizer).unwrap();
    let found = finder.find(&iface).unwrap();

    let create = found["Create"].iter().map(|it| (it.name.as_str(), it.kind, it.code, it.pointer)).collect::<Vec<_>>();
    assert_eq!(create, vec![("Invalid", ErrorKind::JsonRpc, -32602, true), ("Conflict", ErrorKind::Rest, 409, false)]);
    assert_eq!(found["Create"][1].pkg_path, "example.com/app/errs");

    let get = found["Get"].iter().map(|it| (it.name.as_str(), it.kind, it.code)).collect::<Vec<_>>();
    assert_eq!(get, vec![("NotFound", ErrorKind::Rest, 404), ("NotFound", ErrorKind::JsonRpc, -32001)]);
    assert!(!found.contains_key("Delete"));
  }
}

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use swipe_parser::ast::{self, ChanDir as AstChanDir, Field, InterfaceElem, Signature, TypeExpr, TypeKind};
use swipe_parser::span::Span;
use tracing::trace;

use crate::error::SwipeError;
use crate::loader::consts::{self, ConstValue};
use crate::loader::{FileScope, Loader, Package, SourceFile};
use crate::model::{
  zero_value, ArrayType, BasicType, ChanDir, ChanType, FieldType, FuncType, IfaceType, MapType, NameString, NamedId,
  NamedRef, ObjectKey, PackageType, SignType, SliceType, StructType, Tags, Type, Universe, VarType,
};

lazy_static! {
  static ref PARAM_COMMENT: Regex = Regex::new(r"(?s)^@([a-zA-Z0-9_]*) (.*)").unwrap();
}

/// Splits doc lines into the method comment and `@param text` entries.
pub fn parse_method_comments(lines: &[String]) -> (String, HashMap<String, String>) {
  let mut comment = Vec::new();
  let mut params = HashMap::new();
  for line in lines {
    let line = line.trim();
    if line.starts_with('@') {
      if let Some(captures) = PARAM_COMMENT.captures(line) {
        params.insert(captures[1].to_owned(), captures[2].trim().to_owned());
      }
      continue;
    }
    comment.push(line);
  }
  (comment.join("\n").trim().to_owned(), params)
}

/// Folds the loader's declarations into the [`Universe`] based model.
pub struct Normalizer<'a> {
  loader: &'a Loader,
  universe: Universe,
}

impl<'a> Normalizer<'a> {
  pub fn new(loader: &'a Loader) -> Self {
    let mut normalizer = Normalizer { loader, universe: Universe::new() };
    normalizer.predeclare_error();
    normalizer
  }

  pub fn universe(&self) -> &Universe {
    &self.universe
  }

  pub fn into_universe(self) -> Universe {
    self.universe
  }

  fn predeclare_error(&mut self) {
    let id = self.universe.reserve(ObjectKey::new("", "error"), PackageType::universe());
    let string = Type::Basic(BasicType { name: "string".to_owned(), kind: crate::model::BasicKind::String, pointer: false });
    let method = FuncType {
      pkg: PackageType::universe(),
      full_name: "(error).Error".to_owned(),
      name: NameString::new("Error"),
      exported: true,
      sig: SignType { results: vec![self.var("r1", string, false)], ..Default::default() },
      comment: String::new(),
    };
    let named = self.universe.get_mut(id);
    named.underlying = Type::Iface(IfaceType {
      methods: vec![method.clone()],
      explicit_methods: vec![method.clone()],
      embeddeds: Vec::new(),
      origin: Some(ObjectKey::new("", "error")),
    });
    named.methods = vec![method];
  }

  fn var(&self, name: &str, ty: Type, is_field: bool) -> VarType {
    let name = NameString::new(name);
    VarType {
      exported: name.value.chars().next().is_some_and(|ch| ch.is_uppercase()),
      is_context: ty.is_context(&self.universe),
      zero: zero_value(&ty, &self.universe),
      name,
      embedded: false,
      is_field,
      is_variadic: false,
      ty,
      comment: String::new(),
    }
  }

  pub fn package_type(&self, pkg: &Package) -> PackageType {
    PackageType { name: pkg.name.clone(), path: pkg.path.clone(), module: pkg.module.clone() }
  }

  fn undefined(file: &SourceFile, span: Span, name: &str) -> SwipeError {
    SwipeError::Load { path: file.path.clone(), position: span, message: format!("undefined: {}", name) }
  }

  /// Resolves the named type `name` declared in `pkg_path`.
  pub fn named(&mut self, pkg_path: &str, name: &str) -> Result<NamedId, SwipeError> {
    if let Some(id) = self.universe.lookup(pkg_path, name) {
      return Ok(id);
    }
    let loader = self.loader;
    let pkg = loader.package(pkg_path).ok_or_else(|| SwipeError::Load {
      path: loader.work_dir().to_path_buf(),
      position: Span::identity(),
      message: format!("package {} is not loaded", pkg_path),
    })?;
    let key = ObjectKey::new(pkg_path, name);

    if pkg.opaque {
      return Ok(self.universe.reserve(key, self.package_type(pkg)));
    }
    let Some((file, spec)) = pkg.type_spec(name) else {
      return Err(SwipeError::Load {
        path: pkg.dir.clone(),
        position: Span::identity(),
        message: format!("undefined: {}.{}", pkg.name, name),
      });
    };

    trace!("normalizing {}.{}", pkg_path, name);
    let id = self.universe.reserve(key.clone(), self.package_type(pkg));
    let resolved = self.type_expr(pkg, file, &spec.ty)?;
    let mut underlying = resolved.underlying(&self.universe).clone().with_pointer(false);
    if let Type::Iface(iface) = &mut underlying {
      iface.origin = Some(key);
    }
    let comment = ast::comment_text(&spec.doc);

    let methods = match &underlying {
      Type::Iface(iface) => iface.methods.clone(),
      _ => {
        let mut methods = Vec::new();
        for (method_file, func) in pkg.methods_of(name) {
          let pointer = func.recv_type().is_some_and(|(_, pointer)| pointer);
          let recv = Type::Named(NamedRef { id, pointer });
          let doc = loader.comment_func(&format!("{}.{}.{}", pkg.path, name, func.name.value.0));
          let full_name = format!("({}{}.{}).{}", if pointer { "*" } else { "" }, pkg.path, name, func.name.value.0);
          methods.push(self.func_type(pkg, method_file, &func.name.value.0, full_name, &func.signature, Some(recv), doc)?);
        }
        methods
      }
    };

    let named = self.universe.get_mut(id);
    named.underlying = underlying;
    named.methods = methods;
    named.comment = comment;
    Ok(id)
  }

  /// Normalizes a top-level function declaration.
  pub fn func(&mut self, pkg: &Package, name: &str) -> Result<Option<FuncType>, SwipeError> {
    let Some((file, func)) = pkg.func(name) else {
      return Ok(None);
    };
    let loader = self.loader;
    let doc = loader.comment_func(&format!("{}.{}", pkg.path, name));
    let full_name = format!("{}.{}", pkg.path, name);
    self.func_type(pkg, file, name, full_name, &func.signature, None, doc).map(Some)
  }

  #[allow(clippy::too_many_arguments)]
  fn func_type(
    &mut self,
    pkg: &Package,
    file: &SourceFile,
    name: &str,
    full_name: String,
    signature: &Signature,
    recv: Option<Type>,
    doc: &[String],
  ) -> Result<FuncType, SwipeError> {
    let (comment, params) = parse_method_comments(doc);
    let sig = self.signature(pkg, file, signature, recv, &params)?;
    let name = NameString::new(name);
    Ok(FuncType {
      pkg: self.package_type(pkg),
      full_name,
      exported: name.value.chars().next().is_some_and(|ch| ch.is_uppercase()),
      name,
      sig,
      comment,
    })
  }

  pub fn signature(
    &mut self,
    pkg: &Package,
    file: &SourceFile,
    signature: &Signature,
    recv: Option<Type>,
    comments: &HashMap<String, String>,
  ) -> Result<SignType, SwipeError> {
    let mut sig = SignType { is_variadic: signature.is_variadic(), recv, ..Default::default() };

    for field in &signature.params {
      let variadic = matches!(field.ty.value, TypeKind::Ellipsis(_));
      let ty = self.type_expr(pkg, file, &field.ty)?;
      let names = field_names(field);
      for name in names {
        let index = sig.params.len();
        let name = match name {
          Some(name) if name != "_" => name,
          _ => format!("p{}", index),
        };
        let mut var = self.var(&name, ty.clone(), false);
        var.is_variadic = variadic;
        var.comment = comments.get(&name).cloned().unwrap_or_default();
        sig.params.push(var);
      }
    }

    for field in &signature.results {
      let ty = self.type_expr(pkg, file, &field.ty)?;
      for name in field_names(field) {
        let index = sig.results.len();
        let name = match name {
          Some(name) if name != "_" => {
            sig.is_named = true;
            name
          }
          _ => format!("r{}", index + 1),
        };
        let mut var = self.var(&name, ty.clone(), false);
        var.comment = comments.get(&name).cloned().unwrap_or_default();
        sig.results.push(var);
      }
    }
    Ok(sig)
  }

  /// Resolves a type expression written in `file` of `pkg`.
  pub fn type_expr(&mut self, pkg: &Package, file: &SourceFile, ty: &TypeExpr) -> Result<Type, SwipeError> {
    Ok(match &ty.value {
      TypeKind::Name { pkg: None, name } => self.local_name(pkg, file, ty.span, name.as_str())?,
      TypeKind::Name { pkg: Some(qualifier), name } => {
        let loader = self.loader;
        let path = file
          .imports
          .get(qualifier.as_str())
          .ok_or_else(|| Self::undefined(file, ty.span, qualifier.as_str()))?;
        let dep = loader.package(path).ok_or_else(|| Self::undefined(file, ty.span, qualifier.as_str()))?;
        match dep.type_spec(name.as_str()) {
          Some((alias_file, spec)) if spec.alias => self.type_expr(dep, alias_file, &spec.ty)?,
          _ => Type::Named(NamedRef { id: self.named(path, name.as_str())?, pointer: false }),
        }
      }
      TypeKind::Pointer(elem) => self.type_expr(pkg, file, elem)?.with_pointer(true),
      TypeKind::Slice(elem) | TypeKind::Ellipsis(elem) => {
        Type::Slice(SliceType { value: Box::new(self.type_expr(pkg, file, elem)?), pointer: false })
      }
      TypeKind::Array { len, elem } => {
        let value = Box::new(self.type_expr(pkg, file, elem)?);
        let len = match len {
          Some(len) => {
            let mut scope = FileScope { loader: self.loader, pkg, file };
            consts::eval(len, 0, &mut scope).and_then(|it| it.as_int()).unwrap_or_default() as i64
          }
          None => 0,
        };
        Type::Array(ArrayType { value, len, pointer: false })
      }
      TypeKind::Map { key, value } => Type::Map(MapType {
        key: Box::new(self.type_expr(pkg, file, key)?),
        value: Box::new(self.type_expr(pkg, file, value)?),
        pointer: false,
      }),
      TypeKind::Chan { dir, elem } => Type::Chan(ChanType {
        value: Box::new(self.type_expr(pkg, file, elem)?),
        dir: match dir {
          AstChanDir::Both => ChanDir::Both,
          AstChanDir::Send => ChanDir::Send,
          AstChanDir::Recv => ChanDir::Recv,
        },
        pointer: false,
      }),
      TypeKind::Func(signature) => Type::Func(Box::new(self.signature(pkg, file, signature, None, &HashMap::new())?)),
      TypeKind::Struct(fields) => Type::Struct(self.struct_type(pkg, file, fields)?),
      TypeKind::Interface(elems) => Type::Iface(self.iface_type(pkg, file, elems)?),
    })
  }

  fn local_name(&mut self, pkg: &Package, file: &SourceFile, span: Span, name: &str) -> Result<Type, SwipeError> {
    if let Some((alias_file, spec)) = pkg.type_spec(name) {
      if spec.alias {
        return self.type_expr(pkg, alias_file, &spec.ty);
      }
      return Ok(Type::Named(NamedRef { id: self.named(&pkg.path, name)?, pointer: false }));
    }
    if let Some(basic) = BasicType::new(name) {
      return Ok(Type::Basic(basic));
    }
    let loader = self.loader;
    let dotted = file.dot_imports.iter().filter_map(|path| loader.package(path)).find(|dep| dep.type_spec(name).is_some());
    if let Some(dep) = dotted {
      if let Some((alias_file, spec)) = dep.type_spec(name) {
        if spec.alias {
          return self.type_expr(dep, alias_file, &spec.ty);
        }
      }
      return Ok(Type::Named(NamedRef { id: self.named(&dep.path, name)?, pointer: false }));
    }
    match name {
      "error" => Ok(Type::Named(NamedRef { id: self.named("", "error")?, pointer: false })),
      "any" | "comparable" => Ok(Type::Iface(IfaceType::default())),
      _ => Err(Self::undefined(file, span, name)),
    }
  }

  fn struct_type(&mut self, pkg: &Package, file: &SourceFile, fields: &[Field]) -> Result<StructType, SwipeError> {
    let mut result = StructType::default();
    for field in fields {
      let ty = self.type_expr(pkg, file, &field.ty)?;
      let tags = field.tag.as_deref().map(Tags::parse).unwrap_or_default();
      let comment = if field.comment.is_empty() { ast::comment_text(&field.doc) } else { ast::comment_text(&field.comment) };
      if field.names.is_empty() {
        let name = embedded_name(&field.ty).unwrap_or_default();
        let mut var = self.var(&name, ty, true);
        var.embedded = true;
        var.comment = comment;
        result.fields.push(FieldType { var, tags });
        continue;
      }
      for name in &field.names {
        let mut var = self.var(name.value.as_str(), ty.clone(), true);
        var.comment = comment.clone();
        result.fields.push(FieldType { var, tags: tags.clone() });
      }
    }
    Ok(result)
  }

  fn iface_type(&mut self, pkg: &Package, file: &SourceFile, elems: &[InterfaceElem]) -> Result<IfaceType, SwipeError> {
    let mut iface = IfaceType::default();
    for elem in elems {
      match elem {
        InterfaceElem::Method { name, signature, doc, comment } => {
          let lines = doc.iter().chain(comment).map(|it| it.0.trim().to_owned()).collect::<Vec<_>>();
          let full_name = format!("{}.{}", pkg.path, name.value.0);
          let method = self.func_type(pkg, file, &name.value.0, full_name, signature, None, &lines)?;
          iface.explicit_methods.push(method);
        }
        InterfaceElem::Embedded(ty) => {
          let embedded = self.type_expr(pkg, file, ty)?;
          iface.embeddeds.push(embedded);
        }
      }
    }

    let mut methods = iface.explicit_methods.clone();
    for embedded in &iface.embeddeds {
      if let Some(inner) = self.universe.iface_of(embedded) {
        for method in &inner.methods {
          if !methods.iter().any(|it| it.name.value == method.name.value) {
            methods.push(method.clone());
          }
        }
      }
    }
    methods.sort_by(|a, b| a.name.value.cmp(&b.name.value));
    iface.methods = methods;
    Ok(iface)
  }

  /// Constant value of `name` as seen from `file`, qualified or local.
  pub fn constant(&self, pkg: &Package, file: &SourceFile, qualifier: Option<&str>, name: &str) -> Option<ConstValue> {
    match qualifier {
      None => pkg.consts.get(name).cloned(),
      Some(qualifier) => self.loader.package(file.imports.get(qualifier)?)?.consts.get(name).cloned(),
    }
  }
}

fn field_names(field: &Field) -> Vec<Option<String>> {
  if field.names.is_empty() {
    vec![None]
  } else {
    field.names.iter().map(|it| Some(it.value.0.clone())).collect()
  }
}

fn embedded_name(ty: &TypeExpr) -> Option<String> {
  match &ty.value {
    TypeKind::Name { name, .. } => Some(name.0.clone()),
    TypeKind::Pointer(inner) => embedded_name(inner),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::fs;
  use std::path::Path;

  use test_log::test;

  use super::*;

  fn load(files: &[(&str, &str)]) -> (tempfile::TempDir, Loader) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();
    for (name, content) in files {
      let path = dir.path().join(name);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, content).unwrap();
    }
    let env = BTreeMap::from([("GOMODCACHE".to_owned(), "/nonexistent".to_owned())]);
    let loader = Loader::load(Path::new(dir.path()), &env, &["./...".to_owned()]).unwrap();
    (dir, loader)
  }

  const APP: &str = r#"package app

import (
	"context"
	"time"
)

// Node is a tree node.
type Node struct {
	Name     string `json:"name"`
	Children []*Node
	Parent   *Node // up link
}

type Ints [4]int

type Alias = Node

type Service interface {
	// Create makes a node.
	// @name node name
	Create(ctx context.Context, name string, opts ...string) (*Node, error)
	Touch(context.Context, time.Duration) (n int, err error)
}

type impl struct{}

func (s *impl) Create(ctx context.Context, name string, opts ...string) (*Node, error) { return nil, nil }
func (s *impl) Touch(ctx context.Context, d time.Duration) (n int, err error)        { return 0, nil }
"#;

  #[test]
  fn recursive_types_share_one_record() {
    let (_dir, loader) = load(&[("app.go", APP)]);
    let mut normalizer = Normalizer::new(&loader);
    let id = normalizer.named("example.com/app", "Node").unwrap();
    let universe = normalizer.into_universe();
    let node = universe.get(id);
    assert_eq!(node.comment, "Node is a tree node.");
    let Type::Struct(fields) = &node.underlying else { panic!("not a struct") };
    assert_eq!(fields.fields[0].json_name(), "name");
    assert_eq!(fields.fields[1].json_name(), "children");
    let Type::Slice(children) = &fields.fields[1].var.ty else { panic!("not a slice") };
    assert_eq!(*children.value, Type::Named(NamedRef { id, pointer: true }));
    assert_eq!(fields.fields[2].var.comment, "up link");
    assert_eq!(fields.fields[2].var.zero, "nil");
  }

  #[test]
  fn signatures_name_unnamed_vars() {
    let (_dir, loader) = load(&[("app.go", APP)]);
    let mut normalizer = Normalizer::new(&loader);
    let id = normalizer.named("example.com/app", "Service").unwrap();
    let universe = normalizer.into_universe();
    let Type::Iface(iface) = &universe.get(id).underlying else { panic!("not an interface") };
    assert_eq!(iface.origin, Some(ObjectKey::new("example.com/app", "Service")));

    let create = &iface.methods[0];
    assert_eq!(create.name.value, "Create");
    assert_eq!(create.comment, "Create makes a node.");
    assert!(create.sig.is_variadic);
    assert!(create.sig.params[0].is_context);
    assert_eq!(create.sig.params[1].comment, "node name");
    assert!(create.sig.params[2].is_variadic);
    assert_eq!(create.sig.results[0].name.value, "r1");
    assert!(create.sig.results[1].ty.is_error(&universe));
    assert!(!create.sig.is_named);

    let touch = &iface.methods[1];
    assert_eq!(touch.sig.params[0].name.value, "p0");
    assert_eq!(touch.sig.params[1].name.value, "p1");
    assert!(touch.sig.is_named);
    assert_eq!(touch.sig.results[0].zero, "0");
  }

  #[test]
  fn implements_uses_pointer_methods() {
    let (_dir, loader) = load(&[("app.go", APP)]);
    let mut normalizer = Normalizer::new(&loader);
    let service = normalizer.named("example.com/app", "Service").unwrap();
    let imp = normalizer.named("example.com/app", "impl").unwrap();
    let node = normalizer.named("example.com/app", "Node").unwrap();
    let universe = normalizer.into_universe();
    let Type::Iface(iface) = &universe.get(service).underlying else { panic!("not an interface") };
    assert!(universe.implements(imp, iface));
    assert!(!universe.implements(node, iface));
  }

  #[test]
  fn arrays_aliases_and_opaque_packages() {
    let (_dir, loader) = load(&[("app.go", APP)]);
    let mut normalizer = Normalizer::new(&loader);
    let ints = normalizer.named("example.com/app", "Ints").unwrap();
    let duration = normalizer.named("time", "Duration").unwrap();
    let pkg = loader.package("example.com/app").unwrap();
    let alias = normalizer.local_name(pkg, &pkg.files[0], Span::identity(), "Alias").unwrap();
    let universe = normalizer.into_universe();
    assert!(matches!(&universe.get(ints).underlying, Type::Array(it) if it.len == 4));
    assert_eq!(zero_value(&Type::Named(NamedRef { id: ints, pointer: false }), &universe), "{}");
    assert!(matches!(alias, Type::Named(NamedRef { pointer: false, .. })));
    assert_eq!(alias.named(&universe).unwrap().name.value, "Node");
    assert_eq!(universe.get(duration).methods.len(), 2);
  }

  #[test]
  fn method_comments_split_params() {
    let (comment, params) =
      parse_method_comments(&["Get loads a user.".to_owned(), "@id user id".to_owned(), "Fast.".to_owned()]);
    assert_eq!(comment, "Get loads a user.\nFast.");
    assert_eq!(params["id"], "user id");
  }
}

use std::collections::BTreeMap;

use swipe_parser::ast::{BasicLit, Expr, ExprKind, Identifier, TypeKind};
use swipe_parser::span::{Positioned, Span};
use swipe_parser::visit::{self, Visitor};
use swipe_parser::Operator;
use tracing::{debug, trace};

use super::schema::Schema;
use super::{Build, FuncRef, Module, OptionValue};
use crate::error::SwipeError;
use crate::loader::consts::{self, ConstValue};
use crate::loader::{FileScope, Loader, Package, SourceFile};
use crate::model::{BasicType, Type};
use crate::normalize::Normalizer;
use crate::plugin;

const BUILTINS: &[&str] = &["append", "cap", "len", "make", "new", "string", "error"];

/// Source location being decoded.
struct Site<'a> {
  pkg: &'a Package,
  file: &'a SourceFile,
}

/// Options package a `Build` call refers to.
struct Target<'a> {
  pkg: &'a Package,
  schema: &'static Schema,
}

struct OptionSignature {
  names: Vec<String>,
  variadic: bool,
  repeat: bool,
}

impl OptionSignature {
  fn param_at(&self, index: usize) -> Option<&str> {
    match self.names.get(index) {
      Some(name) => Some(name),
      None if self.variadic => self.names.last().map(|it| it.as_str()),
      None => None,
    }
  }
}

/// Collects `x.Build(...)` and dot-imported `Build(...)` calls without
/// descending into them.
#[derive(Default)]
struct BuildCalls<'ast>(Vec<&'ast Expr>);

impl<'ast> Visitor<'ast> for BuildCalls<'ast> {
  fn visit_expr(&mut self, expr: &'ast Expr) -> bool {
    if let ExprKind::Call { fun, .. } = &expr.value {
      let found = match fun.value.unparen() {
        ExprKind::Selector { x, sel } => sel.value.as_str() == "Build" && matches!(x.value, ExprKind::Ident(_)),
        ExprKind::Ident(name) => name.as_str() == "Build",
        _ => false,
      };
      if found {
        self.0.push(expr);
        return false;
      }
    }
    true
  }
}

/// `@type:"repeat"` or `@type "repeat"`.
fn is_repeat(lines: &[String]) -> bool {
  lines.iter().any(|line| {
    line
      .trim()
      .strip_prefix("@type")
      .is_some_and(|rest| rest.trim_start_matches(':').trim().trim_matches('"') == "repeat")
  })
}

fn literal(lit: &BasicLit) -> Option<OptionValue> {
  match lit {
    BasicLit::Int(_) | BasicLit::Char(_) => lit.int_value().and_then(|it| i64::try_from(it).ok()).map(OptionValue::Int),
    BasicLit::Float(_) => lit.float_value().map(OptionValue::Float),
    BasicLit::String(value) => Some(OptionValue::String(value.clone())),
    BasicLit::Imag(_) => None,
  }
}

fn constant(value: ConstValue) -> OptionValue {
  match value {
    ConstValue::Int(value) => match i64::try_from(value) {
      Ok(value) => OptionValue::Int(value),
      Err(_) => OptionValue::Float(value as f64),
    },
    ConstValue::Float(value) => OptionValue::Float(value),
    ConstValue::String(value) => OptionValue::String(value),
    ConstValue::Bool(value) => OptionValue::Bool(value),
  }
}

fn error(site: &Site, span: Span, message: impl Into<String>) -> SwipeError {
  SwipeError::Decode { path: site.file.path.clone(), position: span, message: message.into() }
}

/// Finds every `Build(...)` call of a registered options package and
/// reifies its arguments into an [`OptionValue`] tree.
pub struct Decoder<'a, 'n> {
  loader: &'a Loader,
  normalizer: &'n mut Normalizer<'a>,
}

impl<'a, 'n> Decoder<'a, 'n> {
  pub fn new(loader: &'a Loader, normalizer: &'n mut Normalizer<'a>) -> Self {
    Decoder { loader, normalizer }
  }

  /// Builds grouped by module. A failing build is reported and skipped.
  pub fn decode(mut self) -> (Vec<Module>, Vec<SwipeError>) {
    let loader = self.loader;
    let root = loader.module().module.clone();
    let mut modules: BTreeMap<String, Module> = BTreeMap::new();
    let mut errs = Vec::new();

    for pkg in loader.packages() {
      if pkg.std || pkg.opaque {
        continue;
      }
      let Some(module) = &pkg.module else { continue };
      for file in &pkg.files {
        let mut calls = BuildCalls::default();
        visit::walk_file(&mut calls, &file.ast);
        for call in calls.0 {
          let ExprKind::Call { fun, args, .. } = &call.value else { continue };
          let Some(target) = self.options_package(file, fun) else { continue };
          let site = Site { pkg, file };
          trace!("decoding {} build in {}", target.schema.id, file.path.display());
          match self.decode_call(&site, &target, "Build", args) {
            Ok(tree) => {
              debug!("found {} build in package {}", target.schema.id, pkg.path);
              let build = Build {
                pkg: self.normalizer.package_type(pkg),
                base_path: pkg.dir.clone(),
                options: vec![(target.schema.id.to_owned(), tree)],
              };
              modules
                .entry(module.path.clone())
                .or_insert_with(|| Module { path: module.path.clone(), external: module.path != root, builds: Vec::new() })
                .builds
                .push(build);
            }
            Err(err) => errs.push(err),
          }
        }
      }
    }
    (modules.into_values().collect(), errs)
  }

  fn options_package(&self, file: &SourceFile, fun: &Expr) -> Option<Target<'a>> {
    let loader = self.loader;
    let target = |path: &str| {
      let pkg = loader.package(path)?;
      let schema = plugin::schema(plugin::id_for_package(&pkg.name)?)?;
      Some(Target { pkg, schema })
    };
    match fun.value.unparen() {
      ExprKind::Selector { x, .. } => {
        let ExprKind::Ident(qualifier) = &x.value else { return None };
        target(file.imports.get(qualifier.as_str())?)
      }
      ExprKind::Ident(_) => file.dot_imports.iter().find_map(|path| target(path)),
      _ => None,
    }
  }

  /// Name of the option function `fun` calls, if it lives in `target`.
  fn option_name(&self, site: &Site, target: &Target, fun: &Expr) -> Option<String> {
    match fun.value.unparen() {
      ExprKind::Selector { x, sel } => {
        let ExprKind::Ident(qualifier) = &x.value else { return None };
        (site.file.imports.get(qualifier.as_str())? == &target.pkg.path).then(|| sel.value.0.clone())
      }
      ExprKind::Ident(name) if site.pkg.path == target.pkg.path => Some(name.0.clone()),
      ExprKind::Ident(name) if site.file.dot_imports.contains(&target.pkg.path) => {
        let name = name.as_str();
        let local = site.pkg.types.contains_key(name) || site.pkg.funcs.contains_key(name);
        let builtin = BasicType::new(name).is_some() || BUILTINS.contains(&name);
        (self.signature(target, name).is_some() || !(local || builtin)).then(|| name.to_owned())
      }
      _ => None,
    }
  }

  fn signature(&self, target: &Target, name: &str) -> Option<OptionSignature> {
    if let Some((_, func)) = target.pkg.func(name) {
      let names = func
        .signature
        .params
        .iter()
        .flat_map(|field| {
          if field.names.is_empty() {
            vec![String::new()]
          } else {
            field.names.iter().map(|it| it.value.0.clone()).collect()
          }
        })
        .collect();
      let repeat = is_repeat(self.loader.comment_func(&format!("{}.{}", target.pkg.path, name)));
      return Some(OptionSignature { names, variadic: func.signature.is_variadic(), repeat });
    }
    let func = target.schema.func(name)?;
    Some(OptionSignature { names: func.param_names(), variadic: func.opts.is_some(), repeat: func.repeat })
  }

  fn decode_call(&mut self, site: &Site<'a>, target: &Target<'a>, name: &str, args: &[Expr]) -> Result<OptionValue, SwipeError> {
    let signature = self
      .signature(target, name)
      .ok_or_else(|| error(site, args.first().map(|it| it.span).unwrap_or_default(), format!("unknown option {}", name)))?;
    let mut result = OptionValue::map();

    for (index, arg) in args.iter().enumerate() {
      if let ExprKind::Call { fun, args: inner, .. } = &arg.value {
        if let Some(option) = self.option_name(site, target, fun) {
          let nested = self.signature(target, &option).ok_or_else(|| error(site, arg.span, format!("unknown option {}", option)))?;
          let value = self.decode_call(site, target, &option, inner)?;
          if nested.repeat {
            result.push_repeat(&option, value);
          } else {
            result.insert(&option, value);
          }
          continue;
        }
      }
      let param = match signature.param_at(index) {
        Some(param) if !param.is_empty() => param.to_owned(),
        _ => return Err(error(site, arg.span, "failed params name")),
      };
      let value = self.decode_value(site, arg)?;
      result.insert(&param, value);
    }
    Ok(result)
  }

  fn decode_value(&mut self, site: &Site<'a>, expr: &Expr) -> Result<OptionValue, SwipeError> {
    match &expr.value {
      ExprKind::Paren(inner) => self.decode_value(site, inner),
      ExprKind::BasicLit(lit) => literal(lit).ok_or_else(|| error(site, expr.span, "unsupported literal")),
      ExprKind::Ident(name) => self.decode_ident(site, expr.span, name),
      ExprKind::Selector { x, sel } => self.decode_selector(site, expr.span, x, sel.value.as_str()),
      ExprKind::Unary { op: Operator::Mul | Operator::And, x } => Ok(match self.decode_value(site, x)? {
        OptionValue::Type(ty) => OptionValue::Type(ty.with_pointer(true)),
        other => other,
      }),
      ExprKind::Call { fun, .. } => match self.decode_value(site, fun) {
        Ok(OptionValue::Type(ty)) => Ok(OptionValue::Type(ty)),
        _ => self.fold(site, expr),
      },
      ExprKind::CompositeLit { ty: Some(ty), elts } => self.decode_composite(site, ty, elts),
      ExprKind::Type(ty) => Ok(OptionValue::Type(self.normalizer.type_expr(site.pkg, site.file, ty)?)),
      _ => self.fold(site, expr),
    }
  }

  fn fold(&self, site: &Site<'a>, expr: &Expr) -> Result<OptionValue, SwipeError> {
    let mut scope = FileScope { loader: self.loader, pkg: site.pkg, file: site.file };
    consts::eval(expr, 0, &mut scope)
      .map(constant)
      .ok_or_else(|| error(site, expr.span, "unsupported expression"))
  }

  fn named_type(&mut self, site: &Site<'a>, span: Span, qualifier: Option<&str>, name: &str) -> Result<OptionValue, SwipeError> {
    let ty = Positioned::new(
      TypeKind::Name { pkg: qualifier.map(|it| Identifier(it.to_owned())), name: Identifier(name.to_owned()) },
      span,
    );
    Ok(OptionValue::Type(self.normalizer.type_expr(site.pkg, site.file, &ty)?))
  }

  fn decode_ident(&mut self, site: &Site<'a>, span: Span, name: &Identifier) -> Result<OptionValue, SwipeError> {
    let name = name.as_str();
    match name {
      "true" => return Ok(OptionValue::Bool(true)),
      "false" => return Ok(OptionValue::Bool(false)),
      "nil" => return Ok(OptionValue::Nil),
      _ => {}
    }
    if let Some(value) = site.pkg.consts.get(name) {
      return Ok(constant(value.clone()));
    }
    let loader = self.loader;
    let dotted = site.file.dot_imports.iter().filter_map(|path| loader.package(path)).find_map(|dep| dep.consts.get(name));
    if let Some(value) = dotted {
      return Ok(constant(value.clone()));
    }
    if site.pkg.types.contains_key(name) || BasicType::new(name).is_some() || name == "error" {
      return self.named_type(site, span, None, name);
    }
    if site.pkg.funcs.contains_key(name) {
      if let Some(func) = self.normalizer.func(site.pkg, name)? {
        return Ok(OptionValue::Method(FuncRef { recv: None, func }));
      }
    }
    Err(error(site, span, format!("undefined: {}", name)))
  }

  fn decode_selector(&mut self, site: &Site<'a>, span: Span, x: &Expr, sel: &str) -> Result<OptionValue, SwipeError> {
    if let ExprKind::Ident(qualifier) = &x.value {
      let local = site.pkg.types.contains_key(qualifier.as_str()) || site.pkg.consts.contains_key(qualifier.as_str());
      if let (false, Some(path)) = (local, site.file.imports.get(qualifier.as_str())) {
        let loader = self.loader;
        let dep = loader.package(path).ok_or_else(|| error(site, span, format!("undefined: {}", qualifier.as_str())))?;
        if let Some(value) = dep.consts.get(sel) {
          return Ok(constant(value.clone()));
        }
        if dep.types.contains_key(sel) || dep.opaque {
          return self.named_type(site, span, Some(qualifier.as_str()), sel);
        }
        if dep.funcs.contains_key(sel) {
          if let Some(func) = self.normalizer.func(dep, sel)? {
            return Ok(OptionValue::Method(FuncRef { recv: None, func }));
          }
        }
        return Err(error(site, span, format!("undefined: {}.{}", qualifier.as_str(), sel)));
      }
    }

    let OptionValue::Type(ty) = self.decode_value(site, x)? else {
      return Err(error(site, span, "unsupported expression"));
    };
    let universe = self.normalizer.universe();
    let Some(named) = ty.named(universe) else {
      return Err(error(site, span, format!("method expression on unnamed type: {}", sel)));
    };
    let method = match &named.underlying {
      Type::Iface(iface) => iface.methods.iter().find(|it| it.name.value == sel),
      _ => named.method(sel),
    };
    match method {
      Some(func) => Ok(OptionValue::Method(FuncRef { recv: Some(named.id), func: func.clone() })),
      None => Err(error(site, span, format!("{}.{} undefined (type has no method {})", named.name.value, sel, sel))),
    }
  }

  fn decode_composite(&mut self, site: &Site<'a>, ty: &Expr, elts: &[Expr]) -> Result<OptionValue, SwipeError> {
    if let ExprKind::Type(lit_ty) = &ty.value {
      match &lit_ty.value {
        TypeKind::Slice(_) | TypeKind::Array { .. } => {
          let items = elts.iter().map(|it| self.decode_value(site, it)).collect::<Result<Vec<_>, _>>()?;
          return Ok(OptionValue::List(items));
        }
        TypeKind::Map { .. } => {
          let mut result = OptionValue::map();
          for elt in elts {
            let ExprKind::KeyValue { key, value } = &elt.value else {
              return Err(error(site, elt.span, "missing key in map literal"));
            };
            let key = match self.decode_value(site, key)? {
              OptionValue::String(key) => key,
              OptionValue::Int(key) => key.to_string(),
              _ => return Err(error(site, elt.span, "unsupported map key")),
            };
            let value = self.decode_value(site, value)?;
            result.insert(&key, value);
          }
          return Ok(result);
        }
        _ => {}
      }
    }
    self.decode_value(site, ty)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::fs;
  use std::path::Path;

  use test_log::test;

  use super::*;
  use crate::option::FuncRef;

  fn load(swipe: &str) -> (tempfile::TempDir, Loader) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();
    fs::write(
      dir.path().join("app.go"),
      "package app\n\nimport \"context\"\n\ntype App interface {\n\tCreate(ctx context.Context, name string) error\n\tGet(ctx context.Context, id int) (string, error)\n}\n\ntype Cfg struct {\n\tPort int\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("swipe.go"), swipe).unwrap();
    let env = BTreeMap::from([("GOMODCACHE".to_owned(), "/nonexistent".to_owned())]);
    let loader = Loader::load(Path::new(dir.path()), &env, &["./...".to_owned()]).unwrap();
    (dir, loader)
  }

  fn decode(loader: &Loader) -> (Vec<Module>, Vec<SwipeError>) {
    let mut normalizer = Normalizer::new(loader);
    Decoder::new(loader, &mut normalizer).decode()
  }

  const SWIPE: &str = r#"//go:build swipe

package app

import "example.com/app/pkg/swipe/swipegokit"

const prefix = "/api"

func Swipe() {
	swipegokit.Build(
		swipegokit.HTTPServer(),
		swipegokit.Interface((*App)(nil), "app", swipegokit.ClientName("Remote")),
		swipegokit.MethodOptions(App.Create,
			swipegokit.RESTMethod("POST"),
			swipegokit.RESTPath(prefix+"/items/{id}"),
			swipegokit.RESTQueryVars([]string{"filter", "q"}),
			swipegokit.Logging(true),
		),
		swipegokit.MethodOptions(App.Get, swipegokit.RESTMultipartMaxMemory(32<<20)),
		swipegokit.OpenapiTags([]interface{}{App.Create, App.Get}, []string{"items"}),
	)
}
"#;

  #[test]
  fn reifies_nested_options() {
    let (_dir, loader) = load(SWIPE);
    let (modules, errs) = decode(&loader);
    assert!(errs.is_empty(), "{:?}", errs);
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].path, "example.com/app");
    assert!(!modules[0].external);

    let build = &modules[0].builds[0];
    assert_eq!(build.pkg.path, "example.com/app");
    assert_eq!(build.options[0].0, "Gokit");
    let tree = &build.options[0].1;
    assert_eq!(tree.get("HTTPServer"), Some(&OptionValue::map()));

    let Some(OptionValue::List(ifaces)) = tree.get("Interface") else { panic!("Interface is not repeated") };
    assert_eq!(ifaces.len(), 1);
    assert_eq!(ifaces[0].get("ns"), Some(&OptionValue::String("app".to_owned())));
    let Some(OptionValue::Type(Type::Named(iface))) = ifaces[0].get("iface") else { panic!("iface is not a type") };
    assert!(iface.pointer);
    assert_eq!(
      ifaces[0].get("ClientName").and_then(|it| it.get("value")),
      Some(&OptionValue::String("Remote".to_owned()))
    );

    let Some(OptionValue::List(methods)) = tree.get("MethodOptions") else { panic!("MethodOptions is not repeated") };
    assert_eq!(methods.len(), 2);
    let Some(OptionValue::Method(FuncRef { recv: Some(recv), func })) = methods[0].get("signature") else {
      panic!("signature is not a method")
    };
    assert_eq!(*recv, iface.id);
    assert_eq!(func.name.value, "Create");
    assert_eq!(
      methods[0].get("RESTPath").and_then(|it| it.get("value")),
      Some(&OptionValue::String("/api/items/{id}".to_owned()))
    );
    assert_eq!(
      methods[0].get("RESTQueryVars").and_then(|it| it.get("value")),
      Some(&OptionValue::List(vec![OptionValue::String("filter".to_owned()), OptionValue::String("q".to_owned())]))
    );
    assert_eq!(methods[0].get("Logging").and_then(|it| it.get("value")), Some(&OptionValue::Bool(true)));
    assert_eq!(
      methods[1].get("RESTMultipartMaxMemory").and_then(|it| it.get("value")),
      Some(&OptionValue::Int(32 << 20))
    );

    let Some(OptionValue::List(tags)) = tree.get("OpenapiTags") else { panic!("OpenapiTags is not repeated") };
    let Some(OptionValue::List(tagged)) = tags[0].get("methods") else { panic!("methods is not a list") };
    assert!(matches!(&tagged[1], OptionValue::Method(it) if it.func.name.value == "Get"));
  }

  #[test]
  fn dot_imported_builds_match_qualified_ones() {
    let (_dir, loader) = load(
      r#"//go:build swipe

package app

import . "example.com/app/pkg/swipe/swipegokit"

func Swipe() {
	Build(
		HTTPServer(),
		Interface((*App)(nil), "app"),
		MethodOptions(App.Create, RESTMethod("POST"), Logging(true)),
	)
}
"#,
    );
    let (modules, errs) = decode(&loader);
    assert!(errs.is_empty(), "{:?}", errs);
    assert_eq!(modules.len(), 1);
    let build = &modules[0].builds[0];
    assert_eq!(build.options[0].0, "Gokit");
    let tree = &build.options[0].1;
    assert_eq!(tree.get("HTTPServer"), Some(&OptionValue::map()));
    let Some(OptionValue::List(ifaces)) = tree.get("Interface") else { panic!("Interface is not repeated") };
    assert_eq!(ifaces[0].get("ns"), Some(&OptionValue::String("app".to_owned())));
    let Some(OptionValue::List(methods)) = tree.get("MethodOptions") else { panic!("MethodOptions is not repeated") };
    assert_eq!(
      methods[0].get("RESTMethod").and_then(|it| it.get("value")),
      Some(&OptionValue::String("POST".to_owned()))
    );
    assert_eq!(methods[0].get("Logging").and_then(|it| it.get("value")), Some(&OptionValue::Bool(true)));
  }

  #[test]
  fn unknown_dot_imported_options_are_fatal() {
    let (_dir, loader) = load(
      "//go:build swipe\n\npackage app\n\nimport . \"example.com/app/pkg/swipe/swipegokit\"\n\nfunc Swipe() {\n\tBuild(Bogus())\n}\n",
    );
    let (modules, errs) = decode(&loader);
    assert!(modules.is_empty());
    assert_eq!(errs.len(), 1);
    assert!(errs[0].to_string().ends_with("unknown option Bogus"), "{}", errs[0]);
  }

  #[test]
  fn unknown_options_are_fatal() {
    let (_dir, loader) = load(
      "//go:build swipe\n\npackage app\n\nimport \"example.com/app/pkg/swipe/swipegokit\"\n\nfunc Swipe() {\n\tswipegokit.Build(swipegokit.Bogus())\n}\n",
    );
    let (modules, errs) = decode(&loader);
    assert!(modules.is_empty());
    assert_eq!(errs.len(), 1);
    assert!(errs[0].to_string().ends_with("8:19: unknown option Bogus"), "{}", errs[0]);
  }

  #[test]
  fn surplus_arguments_have_no_name() {
    let (_dir, loader) = load(
      "//go:build swipe\n\npackage app\n\nimport \"example.com/app/pkg/swipe/swipegokit\"\n\nfunc Swipe() {\n\tswipegokit.Build(swipegokit.HTTPServer(1))\n}\n",
    );
    let (_, errs) = decode(&loader);
    assert!(errs[0].to_string().ends_with("failed params name"), "{}", errs[0]);
  }

  #[test]
  fn type_literals_decode_to_types() {
    let (_dir, loader) = load(
      "//go:build swipe\n\npackage app\n\nimport \"example.com/app/pkg/swipe/swipeconfig\"\n\nfunc Swipe() {\n\tswipeconfig.Build(swipeconfig.ConfigEnv(&Cfg{}, swipeconfig.FuncName(\"Load\")))\n}\n",
    );
    let (modules, errs) = decode(&loader);
    assert!(errs.is_empty(), "{:?}", errs);
    let tree = &modules[0].builds[0].options[0];
    assert_eq!(tree.0, "Config");
    let env = tree.1.get("ConfigEnv").unwrap();
    assert!(matches!(env.get("structType"), Some(OptionValue::Type(Type::Named(named))) if named.pointer));
    assert_eq!(env.get("FuncName").and_then(|it| it.get("value")), Some(&OptionValue::String("Load".to_owned())));
  }

  #[test]
  fn repeat_annotation_forms() {
    assert!(is_repeat(&["@type:\"repeat\"".to_owned()]));
    assert!(is_repeat(&["Interface ...".to_owned(), "@type \"repeat\"".to_owned()]));
    assert!(!is_repeat(&["@type:\"once\"".to_owned()]));
  }
}

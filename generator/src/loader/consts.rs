use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use swipe_parser::ast::{BasicLit, Decl, Expr, ExprKind, TypeKind};
use swipe_parser::Operator;
use tracing::trace;

use super::Package;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
  Int(i128),
  Float(f64),
  String(String),
  Bool(bool),
}

impl ConstValue {
  pub fn as_int(&self) -> Option<i128> {
    match self {
      ConstValue::Int(value) => Some(*value),
      ConstValue::Float(value) if value.fract() == 0.0 => Some(*value as i128),
      _ => None,
    }
  }

  fn as_float(&self) -> Option<f64> {
    match self {
      ConstValue::Int(value) => Some(*value as f64),
      ConstValue::Float(value) => Some(*value),
      _ => None,
    }
  }
}

impl Display for ConstValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConstValue::Int(value) => write!(f, "{}", value),
      ConstValue::Float(value) => write!(f, "{}", value),
      ConstValue::String(value) => write!(f, "{:?}", value),
      ConstValue::Bool(value) => write!(f, "{}", value),
    }
  }
}

/// Name resolution used while folding an expression.
pub trait ConstScope {
  /// Constant declared in the package being evaluated.
  fn local(&mut self, name: &str) -> Option<ConstValue>;
  /// Constant `pkg.name` where `pkg` is an import name of the current file.
  fn qualified(&mut self, pkg: &str, name: &str) -> Option<ConstValue>;
}

/// Folds a constant expression; `None` when it is not constant.
pub fn eval(expr: &Expr, iota: i64, scope: &mut dyn ConstScope) -> Option<ConstValue> {
  match expr.value.unparen() {
    ExprKind::BasicLit(lit) => match lit {
      BasicLit::Int(_) | BasicLit::Char(_) => lit.int_value().map(ConstValue::Int),
      BasicLit::Float(_) => lit.float_value().map(ConstValue::Float),
      BasicLit::String(value) => Some(ConstValue::String(value.to_owned())),
      BasicLit::Imag(_) => None,
    },
    ExprKind::Ident(ident) => match ident.as_str() {
      "iota" => Some(ConstValue::Int(iota as i128)),
      "true" => Some(ConstValue::Bool(true)),
      "false" => Some(ConstValue::Bool(false)),
      name => scope.local(name),
    },
    ExprKind::Selector { x, sel } => match x.value.unparen() {
      ExprKind::Ident(pkg) => scope.qualified(pkg.as_str(), sel.value.as_str()),
      _ => None,
    },
    ExprKind::Unary { op, x } => {
      let x = eval(x, iota, scope)?;
      match (op, x) {
        (Operator::Add, value @ (ConstValue::Int(_) | ConstValue::Float(_))) => Some(value),
        (Operator::Sub, ConstValue::Int(value)) => Some(ConstValue::Int(-value)),
        (Operator::Sub, ConstValue::Float(value)) => Some(ConstValue::Float(-value)),
        (Operator::Not, ConstValue::Bool(value)) => Some(ConstValue::Bool(!value)),
        (Operator::Xor, ConstValue::Int(value)) => Some(ConstValue::Int(!value)),
        _ => None,
      }
    }
    ExprKind::Binary { op, x, y } => {
      let x = eval(x, iota, scope)?;
      let y = eval(y, iota, scope)?;
      binary(*op, x, y)
    }
    // Conversions `T(x)` keep the value.
    ExprKind::Call { fun, args, ellipsis: false } if args.len() == 1 && is_type_like(fun) => eval(&args[0], iota, scope),
    _ => None,
  }
}

fn is_type_like(fun: &Expr) -> bool {
  match fun.value.unparen() {
    ExprKind::Ident(_) => true,
    ExprKind::Selector { x, .. } => matches!(x.value.unparen(), ExprKind::Ident(_)),
    ExprKind::Type(ty) => matches!(ty.value, TypeKind::Name { .. }),
    _ => false,
  }
}

fn binary(op: Operator, x: ConstValue, y: ConstValue) -> Option<ConstValue> {
  use ConstValue::*;

  match (op, &x, &y) {
    (Operator::LAnd, Bool(a), Bool(b)) => return Some(Bool(*a && *b)),
    (Operator::LOr, Bool(a), Bool(b)) => return Some(Bool(*a || *b)),
    (Operator::Add, String(a), String(b)) => return Some(String(format!("{}{}", a, b))),
    (Operator::Eql, String(a), String(b)) => return Some(Bool(a == b)),
    (Operator::Neq, String(a), String(b)) => return Some(Bool(a != b)),
    (Operator::Eql, Bool(a), Bool(b)) => return Some(Bool(a == b)),
    (Operator::Neq, Bool(a), Bool(b)) => return Some(Bool(a != b)),
    _ => {}
  }

  if let (Int(a), Int(b)) = (&x, &y) {
    let (a, b) = (*a, *b);
    return match op {
      Operator::Add => a.checked_add(b).map(Int),
      Operator::Sub => a.checked_sub(b).map(Int),
      Operator::Mul => a.checked_mul(b).map(Int),
      Operator::Quo => a.checked_div(b).map(Int),
      Operator::Rem => a.checked_rem(b).map(Int),
      Operator::And => Some(Int(a & b)),
      Operator::Or => Some(Int(a | b)),
      Operator::Xor => Some(Int(a ^ b)),
      Operator::AndNot => Some(Int(a & !b)),
      Operator::Shl => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)).map(Int),
      Operator::Shr => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)).map(Int),
      Operator::Eql => Some(Bool(a == b)),
      Operator::Neq => Some(Bool(a != b)),
      Operator::Lss => Some(Bool(a < b)),
      Operator::Leq => Some(Bool(a <= b)),
      Operator::Gtr => Some(Bool(a > b)),
      Operator::Geq => Some(Bool(a >= b)),
      _ => None,
    };
  }

  let (a, b) = (x.as_float()?, y.as_float()?);
  match op {
    Operator::Add => Some(Float(a + b)),
    Operator::Sub => Some(Float(a - b)),
    Operator::Mul => Some(Float(a * b)),
    Operator::Quo if b != 0.0 => Some(Float(a / b)),
    Operator::Eql => Some(Bool(a == b)),
    Operator::Neq => Some(Bool(a != b)),
    Operator::Lss => Some(Bool(a < b)),
    Operator::Leq => Some(Bool(a <= b)),
    Operator::Gtr => Some(Bool(a > b)),
    Operator::Geq => Some(Bool(a >= b)),
    _ => None,
  }
}

struct Site<'a> {
  file: usize,
  expr: Option<&'a Expr>,
  iota: i64,
}

struct PackageScope<'a, F> {
  pkg: &'a Package,
  sites: HashMap<&'a str, Site<'a>>,
  memo: HashMap<String, Option<ConstValue>>,
  visiting: HashSet<String>,
  file: usize,
  external: F,
}

impl<'a, F> PackageScope<'a, F>
where
  F: Fn(&str, &str) -> Option<ConstValue>,
{
  fn resolve(&mut self, name: &str) -> Option<ConstValue> {
    if let Some(value) = self.memo.get(name) {
      return value.clone();
    }
    if !self.visiting.insert(name.to_owned()) {
      return None;
    }
    let site = self.sites.get(name)?;
    let (file, expr, iota) = (site.file, site.expr, site.iota);
    let saved = std::mem::replace(&mut self.file, file);
    let value = expr.and_then(|expr| eval(expr, iota, self));
    self.file = saved;
    self.visiting.remove(name);
    self.memo.insert(name.to_owned(), value.clone());
    value
  }
}

impl<'a, F> ConstScope for PackageScope<'a, F>
where
  F: Fn(&str, &str) -> Option<ConstValue>,
{
  fn local(&mut self, name: &str) -> Option<ConstValue> {
    self.resolve(name)
  }

  fn qualified(&mut self, pkg: &str, name: &str) -> Option<ConstValue> {
    let path = self.pkg.files.get(self.file)?.imports.get(pkg)?;
    (self.external)(path, name)
  }
}

/// Constants of a package and the enum members grouped by their named type.
#[derive(Debug, Clone, Default)]
pub struct Evaluated {
  pub consts: BTreeMap<String, ConstValue>,
  pub enums: BTreeMap<String, Vec<(String, ConstValue)>>,
}

/// Folds every package-level constant. `external` answers qualified
/// references into packages that were evaluated earlier.
pub fn evaluate_package<F>(pkg: &Package, external: F) -> Evaluated
where
  F: Fn(&str, &str) -> Option<ConstValue>,
{
  let mut sites = HashMap::new();
  let mut typed = Vec::new();
  for (index, file) in pkg.files.iter().enumerate() {
    for decl in &file.ast.decls {
      let Decl::Const(specs) = decl else { continue };
      for spec in specs {
        let ty = spec.ty.as_ref().and_then(|ty| match &ty.value {
          TypeKind::Name { pkg: None, name } => Some(name.as_str().to_owned()),
          _ => None,
        });
        for (position, name) in spec.names.iter().enumerate() {
          if name.value.as_str() == "_" {
            continue;
          }
          sites.insert(name.value.as_str(), Site { file: index, expr: spec.values.get(position), iota: spec.iota });
          if let Some(ty) = &ty {
            typed.push((ty.clone(), name.value.as_str().to_owned()));
          }
        }
      }
    }
  }

  let names: Vec<&str> = sites.keys().copied().collect();
  let mut scope = PackageScope { pkg, sites, memo: HashMap::new(), visiting: HashSet::new(), file: 0, external };
  let mut evaluated = Evaluated::default();
  for name in names {
    if let Some(value) = scope.resolve(name) {
      evaluated.consts.insert(name.to_owned(), value);
    } else {
      trace!("constant {}.{} is not foldable", pkg.path, name);
    }
  }
  for (ty, name) in typed {
    if let Some(value) = evaluated.consts.get(&name) {
      evaluated.enums.entry(ty).or_default().push((name, value.clone()));
    }
  }
  evaluated
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  struct NoScope;

  impl ConstScope for NoScope {
    fn local(&mut self, _: &str) -> Option<ConstValue> {
      None
    }

    fn qualified(&mut self, pkg: &str, name: &str) -> Option<ConstValue> {
      (pkg == "http" && name == "StatusNotFound").then_some(ConstValue::Int(404))
    }
  }

  fn fold(source: &str, iota: i64) -> Option<ConstValue> {
    let expr = swipe_parser::parse_expr(source).unwrap();
    eval(&expr, iota, &mut NoScope)
  }

  #[test]
  fn folds_arithmetic() {
    assert_eq!(fold("1 << 10", 0), Some(ConstValue::Int(1024)));
    assert_eq!(fold("iota * 10 + 5", 3), Some(ConstValue::Int(35)));
    assert_eq!(fold("(7 - 2) % 3", 0), Some(ConstValue::Int(2)));
    assert_eq!(fold("-0x10", 0), Some(ConstValue::Int(-16)));
    assert_eq!(fold("1.5 * 2", 0), Some(ConstValue::Float(3.0)));
    assert_eq!(fold("\"a\" + \"b\"", 0), Some(ConstValue::String("ab".to_owned())));
    assert_eq!(fold("1 < 2 && !false", 0), Some(ConstValue::Bool(true)));
    assert_eq!(fold("int64(http.StatusNotFound)", 0), Some(ConstValue::Int(404)));
    assert_eq!(fold("10 / 0", 0), None);
    assert_eq!(fold("unknown + 1", 0), None);
  }

  fn package(source: &str) -> Package {
    let ast = swipe_parser::parse_file(source).unwrap();
    let mut pkg = Package::new("app", "example.com/app", Default::default());
    pkg.files.push(crate::loader::SourceFile { path: "app.go".into(), ast, imports: BTreeMap::new(), dot_imports: Vec::new() });
    pkg
  }

  #[test]
  fn evaluates_groups_out_of_order() {
    let pkg = package(
      r#"package app

const Total = Last + 1

type Level int

const (
	Debug Level = iota + 1
	Info
	Warn
	Last = Warn * 10
)
"#,
    );
    let evaluated = evaluate_package(&pkg, |_, _| None);
    assert_eq!(evaluated.consts["Debug"], ConstValue::Int(1));
    assert_eq!(evaluated.consts["Warn"], ConstValue::Int(3));
    assert_eq!(evaluated.consts["Last"], ConstValue::Int(30));
    assert_eq!(evaluated.consts["Total"], ConstValue::Int(31));
    let levels = &evaluated.enums["Level"];
    assert_eq!(levels.iter().map(|it| it.0.as_str()).collect::<Vec<_>>(), vec!["Debug", "Info", "Warn"]);
  }

  #[test]
  fn cycles_do_not_fold() {
    let pkg = package("package app\n\nconst A = B\nconst B = A\n");
    assert!(evaluate_package(&pkg, |_, _| None).consts.is_empty());
  }
}

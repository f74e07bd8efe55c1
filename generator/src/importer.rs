use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;

use crate::model::{ChanDir, SignType, Type, Universe, VarType};
use crate::option::FuncRef;

const KEYWORDS: &[&str] = &[
  "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough", "for", "func", "go", "goto",
  "if", "import", "interface", "map", "package", "range", "return", "select", "struct", "switch", "type", "var",
];

/// Locals the emitters declare in generated bodies.
const LOCALS: &[&str] = &[
  "err", "ctx", "req", "resp", "request", "response", "opts", "ep", "ecm", "logger", "now", "begin", "tgt", "u", "q",
  "b", "r", "w", "c", "s", "data", "vars", "handler", "cfg", "body", "writer", "part", "params", "form", "kv",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportInfo {
  name: String,
  differs: bool,
}

/// Imports of one output file, with names made unique against each other
/// and against identifiers visible in the target package.
pub struct Importer<'u> {
  pkg_path: String,
  universe: &'u Universe,
  scope: HashSet<String>,
  imports: BTreeMap<String, ImportInfo>,
}

impl<'u> Importer<'u> {
  pub fn new(pkg_path: &str, universe: &'u Universe) -> Self {
    Importer { pkg_path: pkg_path.to_owned(), universe, scope: HashSet::new(), imports: BTreeMap::new() }
  }

  /// Top-level names of the target package that an import must not shadow.
  pub fn with_scope(mut self, names: impl IntoIterator<Item = String>) -> Self {
    self.scope.extend(names);
    self
  }

  pub fn universe(&self) -> &'u Universe {
    self.universe
  }

  pub fn pkg_path(&self) -> &str {
    &self.pkg_path
  }

  /// Registers `path` and returns the name to qualify it with, or an empty
  /// string for the file's own package.
  pub fn import(&mut self, name: &str, path: &str) -> String {
    let path = unvendor(path);
    if path == self.pkg_path {
      return String::new();
    }
    if let Some(info) = self.imports.get(path) {
      return info.name.clone();
    }
    let name = if name.is_empty() { path.rsplit('/').next().unwrap_or(path) } else { name };
    let unique = self.disambiguate(name);
    self.imports.insert(path.to_owned(), ImportInfo { differs: unique != name, name: unique.clone() });
    unique
  }

  fn collides(&self, name: &str) -> bool {
    KEYWORDS.contains(&name)
      || LOCALS.contains(&name)
      || self.scope.contains(name)
      || self.imports.values().any(|it| it.name == name)
  }

  fn disambiguate(&self, name: &str) -> String {
    let mut name = name.replace(['.', '-'], "_");
    if !self.collides(&name) {
      return name;
    }
    if name.ends_with(|ch: char| ch.is_ascii_digit()) {
      name.push('_');
    }
    (2..).map(|n| format!("{}{}", name, n)).find(|it| !self.collides(it)).unwrap_or(name)
  }

  pub fn has_imports(&self) -> bool {
    !self.imports.is_empty()
  }

  /// `(alias, path)` pairs sorted by path; the alias is set when the name
  /// differs from the package's own.
  pub fn sorted_imports(&self) -> Vec<(Option<String>, String)> {
    self
      .imports
      .iter()
      .map(|(path, info)| (info.differs.then(|| info.name.clone()), path.clone()))
      .collect()
  }

  fn qualified(&mut self, pkg_name: &str, pkg_path: &str, name: &str) -> String {
    if pkg_path.is_empty() {
      return name.to_owned();
    }
    match self.import(pkg_name, pkg_path) {
      qualifier if qualifier.is_empty() => name.to_owned(),
      qualifier => format!("{}.{}", qualifier, name),
    }
  }

  /// Go spelling of `ty` as seen from the file's package.
  pub fn type_string(&mut self, ty: &Type) -> String {
    let star = if ty.is_pointer() { "*" } else { "" };
    match ty {
      Type::Basic(basic) => format!("{}{}", star, basic.name),
      Type::Named(named) => {
        let universe = self.universe;
        let named = universe.get(named.id);
        format!("{}{}", star, self.qualified(&named.pkg.name, &named.pkg.path, &named.name.value))
      }
      Type::Struct(st) => {
        if st.fields.is_empty() {
          return format!("{}struct{{}}", star);
        }
        let fields = st
          .fields
          .iter()
          .map(|field| {
            let ty = self.type_string(&field.var.ty);
            let decl = if field.var.embedded { ty } else { format!("{} {}", field.var.name.value, ty) };
            if field.tags.0.is_empty() {
              return decl;
            }
            let tags = field
              .tags
              .0
              .iter()
              .map(|tag| {
                let value = std::iter::once(tag.name.as_str()).chain(tag.options.iter().map(|it| it.as_str())).join(",");
                format!("{}:{:?}", tag.key, value)
              })
              .join(" ");
            format!("{} `{}`", decl, tags)
          })
          .join("; ");
        format!("{}struct{{ {} }}", star, fields)
      }
      Type::Iface(iface) => {
        if iface.methods.is_empty() {
          return "interface{}".to_owned();
        }
        let methods = iface
          .methods
          .iter()
          .map(|method| format!("{}{}", method.name.value, self.signature(&method.sig, false)))
          .join("; ");
        format!("interface{{ {} }}", methods)
      }
      Type::Func(sig) => format!("func{}", self.signature(sig, false)),
      Type::Map(map) => format!("{}map[{}]{}", star, self.type_string(&map.key), self.type_string(&map.value)),
      Type::Slice(slice) => format!("{}[]{}", star, self.type_string(&slice.value)),
      Type::Array(array) => format!("{}[{}]{}", star, array.len, self.type_string(&array.value)),
      Type::Chan(chan) => {
        let value = self.type_string(&chan.value);
        match chan.dir {
          ChanDir::Both => format!("{}chan {}", star, value),
          ChanDir::Send => format!("{}chan<- {}", star, value),
          ChanDir::Recv => format!("{}<-chan {}", star, value),
        }
      }
      Type::Opaque => "interface{}".to_owned(),
    }
  }

  fn var_type(&mut self, var: &VarType, variadic: bool) -> String {
    match (&var.ty, variadic) {
      (Type::Slice(slice), true) => format!("...{}", self.type_string(&slice.value)),
      _ => self.type_string(&var.ty),
    }
  }

  /// Parameter list, with names.
  pub fn params(&mut self, sig: &SignType) -> String {
    let last = sig.params.len().saturating_sub(1);
    sig
      .params
      .iter()
      .enumerate()
      .map(|(index, param)| {
        let ty = self.var_type(param, sig.is_variadic && index == last);
        format!("{} {}", param.name.value, ty)
      })
      .join(", ")
  }

  /// Result list; names are kept when `named` is set or the source named them.
  pub fn results(&mut self, sig: &SignType, named: bool) -> String {
    let named = named || sig.is_named;
    match sig.results.as_slice() {
      [] => String::new(),
      [single] if !named => self.type_string(&single.ty),
      results => {
        let list = results
          .iter()
          .map(|it| {
            let ty = self.type_string(&it.ty);
            if named {
              format!("{} {}", it.name.value, ty)
            } else {
              ty
            }
          })
          .join(", ");
        format!("({})", list)
      }
    }
  }

  /// `(params) results` suffix of a function or method declaration.
  pub fn signature(&mut self, sig: &SignType, named_results: bool) -> String {
    let results = self.results(sig, named_results);
    if results.is_empty() {
      format!("({})", self.params(sig))
    } else {
      format!("({}) {}", self.params(sig), results)
    }
  }

  /// Expression naming a user function or method value, e.g. `app.Encode`.
  pub fn func_ref(&mut self, func: &FuncRef) -> String {
    match func.recv {
      Some(id) => {
        let universe = self.universe;
        let named = universe.get(id);
        let recv = self.qualified(&named.pkg.name, &named.pkg.path, &named.name.value);
        format!("{}.{}", recv, func.func.name.value)
      }
      None => self.qualified(&func.func.pkg.name, &func.func.pkg.path, &func.func.name.value),
    }
  }
}

fn unvendor(path: &str) -> &str {
  const VENDOR: &str = "vendor/";
  match path.rfind(VENDOR) {
    Some(index) if index == 0 || path.as_bytes()[index - 1] == b'/' => &path[index + VENDOR.len()..],
    _ => path,
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::model::{BasicType, MapType, NameString, NamedRef, ObjectKey, PackageType, SliceType};

  fn var(name: &str, ty: Type) -> VarType {
    VarType {
      name: NameString::new(name),
      embedded: false,
      exported: false,
      is_field: false,
      is_variadic: false,
      is_context: false,
      ty,
      zero: String::new(),
      comment: String::new(),
    }
  }

  fn basic(name: &str) -> Type {
    Type::Basic(BasicType::new(name).unwrap())
  }

  #[test]
  fn renames_clashing_packages() {
    let universe = Universe::new();
    let mut importer = Importer::new("example.com/app", &universe).with_scope(["mux".to_owned()]);
    assert_eq!(importer.import("http", "net/http"), "http");
    assert_eq!(importer.import("http", "github.com/go-kit/kit/transport/http"), "http2");
    assert_eq!(importer.import("http", "net/http"), "http");
    assert_eq!(importer.import("mux", "github.com/gorilla/mux"), "mux2");
    assert_eq!(importer.import("err", "example.com/err"), "err2");
    assert_eq!(importer.import("v1", "example.com/api/v1"), "v1");
    assert_eq!(importer.import("v1", "example.com/other/v1"), "v1_2");
    assert_eq!(importer.import("app", "example.com/app"), "");
    assert_eq!(importer.import("uuid", "example.com/app/vendor/github.com/google/uuid"), "uuid");

    assert_eq!(
      importer.sorted_imports(),
      vec![
        (None, "example.com/api/v1".to_owned()),
        (Some("err2".to_owned()), "example.com/err".to_owned()),
        (Some("v1_2".to_owned()), "example.com/other/v1".to_owned()),
        (Some("http2".to_owned()), "github.com/go-kit/kit/transport/http".to_owned()),
        (None, "github.com/google/uuid".to_owned()),
        (Some("mux2".to_owned()), "github.com/gorilla/mux".to_owned()),
        (None, "net/http".to_owned()),
      ]
    );
  }

  #[test]
  fn renders_types_and_signatures() {
    let mut universe = Universe::new();
    let pkg = PackageType { name: "model".to_owned(), path: "example.com/app/model".to_owned(), module: None };
    let user = universe.reserve(ObjectKey::new(&pkg.path, "User"), pkg.clone());
    let local = universe.reserve(
      ObjectKey::new("example.com/app", "Filter"),
      PackageType { name: "app".to_owned(), path: "example.com/app".to_owned(), module: None },
    );
    let mut importer = Importer::new("example.com/app", &universe);

    let users = Type::Map(MapType {
      key: Box::new(basic("string")),
      value: Box::new(Type::Named(NamedRef { id: user, pointer: true })),
      pointer: false,
    });
    assert_eq!(importer.type_string(&users), "map[string]*model.User");
    assert_eq!(importer.type_string(&Type::Named(NamedRef { id: local, pointer: false })), "Filter");

    let sig = SignType {
      params: vec![
        var("name", basic("string")),
        var("tags", Type::Slice(SliceType { value: Box::new(basic("string")), pointer: false })),
      ],
      results: vec![var("r1", basic("int")), var("r2", basic("bool"))],
      is_variadic: true,
      ..Default::default()
    };
    assert_eq!(importer.signature(&sig, false), "(name string, tags ...string) (int, bool)");
    assert_eq!(importer.signature(&sig, true), "(name string, tags ...string) (r1 int, r2 bool)");
    assert_eq!(importer.signature(&SignType::default(), false), "()");
    assert_eq!(importer.sorted_imports(), vec![(None, "example.com/app/model".to_owned())]);
  }
}

use std::collections::HashMap;

use heck::{ToLowerCamelCase, ToUpperCamelCase};
use serde::{Deserialize, Serialize};

/// Identifier with its camel-case spellings precomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameString {
  pub value: String,
  pub upper: String,
  pub lower: String,
}

impl NameString {
  pub fn new(value: impl Into<String>) -> Self {
    let value = value.into();
    NameString { upper: value.to_upper_camel_case(), lower: value.to_lower_camel_case(), value }
  }
}

impl std::fmt::Display for NameString {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.value)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleType {
  pub path: String,
  pub version: String,
  pub dir: String,
  pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageType {
  pub name: String,
  pub path: String,
  pub module: Option<ModuleType>,
}

impl PackageType {
  /// The package of predeclared identifiers.
  pub fn universe() -> Self {
    PackageType::default()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicKind {
  Bool,
  Int,
  Int8,
  Int16,
  Int32,
  Int64,
  Uint,
  Uint8,
  Uint16,
  Uint32,
  Uint64,
  Uintptr,
  Float32,
  Float64,
  Complex64,
  Complex128,
  String,
  UnsafePointer,
}

impl BasicKind {
  /// Kind of a predeclared basic type name; `byte` and `rune` are aliases.
  pub fn lookup(name: &str) -> Option<BasicKind> {
    Some(match name {
      "bool" => BasicKind::Bool,
      "int" => BasicKind::Int,
      "int8" => BasicKind::Int8,
      "int16" => BasicKind::Int16,
      "int32" | "rune" => BasicKind::Int32,
      "int64" => BasicKind::Int64,
      "uint" => BasicKind::Uint,
      "uint8" | "byte" => BasicKind::Uint8,
      "uint16" => BasicKind::Uint16,
      "uint32" => BasicKind::Uint32,
      "uint64" => BasicKind::Uint64,
      "uintptr" => BasicKind::Uintptr,
      "float32" => BasicKind::Float32,
      "float64" => BasicKind::Float64,
      "complex64" => BasicKind::Complex64,
      "complex128" => BasicKind::Complex128,
      "string" => BasicKind::String,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasicType {
  pub name: String,
  pub kind: BasicKind,
  pub pointer: bool,
}

impl BasicType {
  pub fn new(name: &str) -> Option<Self> {
    Some(BasicType { name: name.to_owned(), kind: BasicKind::lookup(name)?, pointer: false })
  }

  pub fn bit_size(&self) -> &'static str {
    match self.kind {
      BasicKind::Int8 | BasicKind::Uint8 => "8",
      BasicKind::Int16 | BasicKind::Uint16 => "16",
      BasicKind::Int32 | BasicKind::Uint32 | BasicKind::Float32 => "32",
      _ => "64",
    }
  }

  pub fn is_string(&self) -> bool {
    self.kind == BasicKind::String
  }

  pub fn is_numeric(&self) -> bool {
    self.is_any_int() || self.is_any_uint() || self.is_any_float()
  }

  pub fn is_any_int(&self) -> bool {
    matches!(self.kind, BasicKind::Int | BasicKind::Int8 | BasicKind::Int16 | BasicKind::Int32 | BasicKind::Int64)
  }

  pub fn is_int(&self) -> bool {
    self.kind == BasicKind::Int
  }

  pub fn is_int64(&self) -> bool {
    self.kind == BasicKind::Int64
  }

  pub fn is_any_uint(&self) -> bool {
    matches!(
      self.kind,
      BasicKind::Uint | BasicKind::Uint8 | BasicKind::Uint16 | BasicKind::Uint32 | BasicKind::Uint64
    )
  }

  pub fn is_uint64(&self) -> bool {
    self.kind == BasicKind::Uint64
  }

  pub fn is_any_float(&self) -> bool {
    matches!(self.kind, BasicKind::Float32 | BasicKind::Float64)
  }

  pub fn is_float64(&self) -> bool {
    self.kind == BasicKind::Float64
  }

  pub fn is_bool(&self) -> bool {
    self.kind == BasicKind::Bool
  }

  pub fn is_byte(&self) -> bool {
    self.kind == BasicKind::Uint8
  }
}

pub type NamedId = usize;

/// Reference to a named type in the [`Universe`], with the pointer flag of
/// the place it is used at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedRef {
  pub id: NamedId,
  pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
  pub pkg: String,
  pub name: String,
}

impl ObjectKey {
  pub fn new(pkg: &str, name: &str) -> Self {
    ObjectKey { pkg: pkg.to_owned(), name: name.to_owned() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedType {
  pub id: NamedId,
  pub obj: ObjectKey,
  pub name: NameString,
  pub pkg: PackageType,
  pub underlying: Type,
  /// Value and pointer receiver methods, in declaration order.
  pub methods: Vec<FuncType>,
  pub comment: String,
}

impl NamedType {
  pub fn method(&self, name: &str) -> Option<&FuncType> {
    self.methods.iter().find(|it| it.name.value == name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
  pub key: String,
  pub name: String,
  pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tags(pub Vec<Tag>);

impl Tags {
  /// Parses a struct tag using the `key:"value" key2:"value2"` convention.
  /// Malformed tails are ignored.
  pub fn parse(tag: &str) -> Tags {
    let mut tags = Vec::new();
    let mut rest = tag.trim_start();
    while !rest.is_empty() {
      let Some(colon) = rest.find(':') else { break };
      let key = &rest[..colon];
      if key.is_empty() || key.contains(|ch: char| ch.is_whitespace() || ch == '"') {
        break;
      }
      let after = &rest[colon + 1..];
      if !after.starts_with('"') {
        break;
      }
      let mut end = None;
      let mut escaped = false;
      for (index, ch) in after.char_indices().skip(1) {
        match ch {
          '\\' if !escaped => escaped = true,
          '"' if !escaped => {
            end = Some(index);
            break;
          }
          _ => escaped = false,
        }
      }
      let Some(end) = end else { break };
      let value = after[1..end].replace("\\\"", "\"");
      let mut parts = value.split(',');
      let name = parts.next().unwrap_or_default().to_owned();
      tags.push(Tag { key: key.to_owned(), name, options: parts.map(|it| it.to_owned()).collect() });
      rest = after[end + 1..].trim_start();
    }
    Tags(tags)
  }

  pub fn get(&self, key: &str) -> Option<&Tag> {
    self.0.iter().find(|it| it.key == key)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarType {
  pub name: NameString,
  pub embedded: bool,
  pub exported: bool,
  pub is_field: bool,
  pub is_variadic: bool,
  pub is_context: bool,
  pub ty: Type,
  pub zero: String,
  pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
  pub var: VarType,
  pub tags: Tags,
}

impl FieldType {
  /// Key used for the field in JSON documents.
  pub fn json_name(&self) -> String {
    match self.tags.get("json") {
      Some(tag) if !tag.name.is_empty() => tag.name.clone(),
      _ => self.var.name.lower.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
  pub fields: Vec<FieldType>,
  pub pointer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignType {
  pub params: Vec<VarType>,
  pub results: Vec<VarType>,
  pub is_variadic: bool,
  pub is_named: bool,
  pub recv: Option<Type>,
}

impl SignType {
  /// Parameter and result types match, ignoring names and receivers.
  pub fn same_shape(&self, other: &SignType) -> bool {
    self.is_variadic == other.is_variadic
      && self.params.len() == other.params.len()
      && self.results.len() == other.results.len()
      && self.params.iter().zip(&other.params).all(|(a, b)| a.ty == b.ty)
      && self.results.iter().zip(&other.results).all(|(a, b)| a.ty == b.ty)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncType {
  pub pkg: PackageType,
  pub full_name: String,
  pub name: NameString,
  pub exported: bool,
  pub sig: SignType,
  pub comment: String,
}

impl FuncType {
  pub fn id(&self) -> String {
    format!("{}.{}", self.pkg.path, self.name.value)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IfaceType {
  /// Full method set with embedded interfaces flattened.
  pub methods: Vec<FuncType>,
  pub embeddeds: Vec<Type>,
  pub explicit_methods: Vec<FuncType>,
  pub origin: Option<ObjectKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapType {
  pub key: Box<Type>,
  pub value: Box<Type>,
  pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceType {
  pub value: Box<Type>,
  pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayType {
  pub value: Box<Type>,
  pub len: i64,
  pub pointer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanDir {
  Both,
  Send,
  Recv,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChanType {
  pub value: Box<Type>,
  pub dir: ChanDir,
  pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
  Basic(BasicType),
  Named(NamedRef),
  Struct(StructType),
  Iface(IfaceType),
  Func(Box<SignType>),
  Map(MapType),
  Slice(SliceType),
  Array(ArrayType),
  Chan(ChanType),
  /// Underlying structure of a package without source, or a placeholder
  /// for a named type still being resolved.
  Opaque,
}

impl Type {
  pub fn is_pointer(&self) -> bool {
    match self {
      Type::Basic(it) => it.pointer,
      Type::Named(it) => it.pointer,
      Type::Struct(it) => it.pointer,
      Type::Map(it) => it.pointer,
      Type::Slice(it) => it.pointer,
      Type::Array(it) => it.pointer,
      Type::Chan(it) => it.pointer,
      Type::Iface(_) | Type::Func(_) | Type::Opaque => false,
    }
  }

  pub fn with_pointer(mut self, pointer: bool) -> Type {
    match &mut self {
      Type::Basic(it) => it.pointer = pointer,
      Type::Named(it) => it.pointer = pointer,
      Type::Struct(it) => it.pointer = pointer,
      Type::Map(it) => it.pointer = pointer,
      Type::Slice(it) => it.pointer = pointer,
      Type::Array(it) => it.pointer = pointer,
      Type::Chan(it) => it.pointer = pointer,
      Type::Iface(_) | Type::Func(_) | Type::Opaque => {}
    }
    self
  }

  pub fn named<'u>(&self, universe: &'u Universe) -> Option<&'u NamedType> {
    match self {
      Type::Named(it) => Some(universe.get(it.id)),
      _ => None,
    }
  }

  /// The structural type behind any chain of named types.
  pub fn underlying<'a>(&'a self, universe: &'a Universe) -> &'a Type {
    match self {
      Type::Named(it) => universe.get(it.id).underlying.underlying(universe),
      _ => self,
    }
  }

  pub fn is_error(&self, universe: &Universe) -> bool {
    self.named(universe).is_some_and(|it| it.pkg.path.is_empty() && it.name.value == "error")
  }

  pub fn is_context(&self, universe: &Universe) -> bool {
    self.named(universe).is_some_and(|it| it.pkg.path == "context" && it.name.value == "Context")
  }

  pub fn is_named(&self, pkg: &str, name: &str, universe: &Universe) -> bool {
    self.named(universe).is_some_and(|it| it.pkg.path == pkg && it.name.value == name)
  }

  pub fn is_byte_slice(&self, universe: &Universe) -> bool {
    match self.underlying(universe) {
      Type::Slice(it) => matches!(it.value.underlying(universe), Type::Basic(basic) if basic.is_byte()),
      _ => false,
    }
  }

  pub fn basic<'a>(&'a self, universe: &'a Universe) -> Option<&'a BasicType> {
    match self.underlying(universe) {
      Type::Basic(it) => Some(it),
      _ => None,
    }
  }
}

/// Literal zero expression of a type as it appears in a `return` statement.
pub fn zero_value(ty: &Type, universe: &Universe) -> String {
  if ty.is_pointer() {
    return "nil".to_owned();
  }
  match ty.underlying(universe) {
    Type::Basic(basic) => match basic.kind {
      BasicKind::Bool => "false".to_owned(),
      BasicKind::String => "\"\"".to_owned(),
      BasicKind::UnsafePointer => "nil".to_owned(),
      _ => "0".to_owned(),
    },
    Type::Struct(_) | Type::Array(_) => "{}".to_owned(),
    Type::Opaque => match ty {
      Type::Named(_) => "{}".to_owned(),
      _ => "nil".to_owned(),
    },
    _ => "nil".to_owned(),
  }
}

/// Arena owning every named type met while normalizing the loaded packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
  named: Vec<NamedType>,
  #[serde(skip)]
  index: HashMap<ObjectKey, NamedId>,
}

impl Universe {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: NamedId) -> &NamedType {
    &self.named[id]
  }

  pub fn get_mut(&mut self, id: NamedId) -> &mut NamedType {
    &mut self.named[id]
  }

  pub fn lookup(&self, pkg: &str, name: &str) -> Option<NamedId> {
    self.index.get(&ObjectKey::new(pkg, name)).copied()
  }

  /// Allocates the record for `key` before its underlying type is known so
  /// that recursive references resolve to it.
  pub fn reserve(&mut self, key: ObjectKey, pkg: PackageType) -> NamedId {
    if let Some(id) = self.index.get(&key) {
      return *id;
    }
    let id = self.named.len();
    self.named.push(NamedType {
      id,
      name: NameString::new(key.name.clone()),
      obj: key.clone(),
      pkg,
      underlying: Type::Opaque,
      methods: Vec::new(),
      comment: String::new(),
    });
    self.index.insert(key, id);
    id
  }

  pub fn len(&self) -> usize {
    self.named.len()
  }

  pub fn is_empty(&self) -> bool {
    self.named.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &NamedType> {
    self.named.iter()
  }

  /// Method set of an interface type, named or literal.
  pub fn iface_of<'a>(&'a self, ty: &'a Type) -> Option<&'a IfaceType> {
    match ty.underlying(self) {
      Type::Iface(it) => Some(it),
      _ => None,
    }
  }

  /// Whether `*T` satisfies `iface`: every interface method exists on the
  /// type, by name and signature.
  pub fn implements(&self, id: NamedId, iface: &IfaceType) -> bool {
    let named = self.get(id);
    if matches!(named.underlying, Type::Iface(_)) {
      return false;
    }
    iface.methods.iter().all(|method| {
      named.method(&method.name.value).is_some_and(|candidate| candidate.sig.same_shape(&method.sig))
    })
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  fn basic(name: &str) -> Type {
    Type::Basic(BasicType::new(name).unwrap())
  }

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

  fn method(name: &str, results: Vec<VarType>) -> FuncType {
    FuncType {
      pkg: PackageType::default(),
      full_name: name.to_owned(),
      name: NameString::new(name),
      exported: true,
      sig: SignType { results, ..Default::default() },
      comment: String::new(),
    }
  }

  #[test]
  fn name_spellings() {
    let name = NameString::new("user_id");
    assert_eq!(name.upper, "UserId");
    assert_eq!(name.lower, "userId");
    assert_eq!(NameString::new("GetUser").lower, "getUser");
    assert_eq!(NameString::new("r1").upper, "R1");
  }

  #[test]
  fn parses_struct_tags() {
    let tags = Tags::parse(r#"json:"port,omitempty" env:"PORT,required,desc:listen port""#);
    assert_eq!(tags.get("json").unwrap().name, "port");
    assert_eq!(tags.get("json").unwrap().options, vec!["omitempty"]);
    let env = tags.get("env").unwrap();
    assert_eq!(env.name, "PORT");
    assert_eq!(env.options, vec!["required", "desc:listen port"]);
    assert!(tags.get("flag").is_none());
    assert!(Tags::parse("json:port").0.is_empty());
  }

  #[test]
  fn zero_values_by_kind() {
    let mut universe = Universe::new();
    let id = universe.reserve(ObjectKey::new("app", "User"), PackageType::default());
    universe.get_mut(id).underlying = Type::Struct(StructType::default());
    let user = Type::Named(NamedRef { id, pointer: false });

    assert_eq!(zero_value(&basic("string"), &universe), "\"\"");
    assert_eq!(zero_value(&basic("bool"), &universe), "false");
    assert_eq!(zero_value(&basic("float64"), &universe), "0");
    assert_eq!(zero_value(&user, &universe), "{}");
    assert_eq!(zero_value(&user.clone().with_pointer(true), &universe), "nil");
    let slice = Type::Slice(SliceType { value: Box::new(basic("byte")), pointer: false });
    assert_eq!(zero_value(&slice, &universe), "nil");
    assert!(slice.is_byte_slice(&universe));
  }

  #[test]
  fn reserve_returns_the_same_record() {
    let mut universe = Universe::new();
    let first = universe.reserve(ObjectKey::new("app", "Node"), PackageType::default());
    let again = universe.reserve(ObjectKey::new("app", "Node"), PackageType::default());
    assert_eq!(first, again);
    assert_eq!(universe.len(), 1);
    assert_eq!(universe.lookup("app", "Node"), Some(first));
  }

  #[test]
  fn implements_compares_signatures() {
    let mut universe = Universe::new();
    let id = universe.reserve(ObjectKey::new("app", "NotFound"), PackageType::default());
    universe.get_mut(id).underlying = Type::Struct(StructType::default());
    universe.get_mut(id).methods.push(method("StatusCode", vec![var("r1", basic("int"))]));

    let status = IfaceType { methods: vec![method("StatusCode", vec![var("", basic("int"))])], ..Default::default() };
    let code = IfaceType { methods: vec![method("ErrorCode", vec![var("", basic("int"))])], ..Default::default() };
    let wrong = IfaceType { methods: vec![method("StatusCode", vec![var("", basic("string"))])], ..Default::default() };
    assert!(universe.implements(id, &status));
    assert!(!universe.implements(id, &code));
    assert!(!universe.implements(id, &wrong));
  }
}

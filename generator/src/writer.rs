//! Append-only Go source buffer with the recurring code shapes of the
//! emitters: error checks, defers, struct declarations and the string
//! conversions used by HTTP and environment bindings.

use std::ops::{Deref, DerefMut};

use heck::ToUpperCamelCase;
use itertools::Itertools;

use crate::importer::Importer;
use crate::model::{BasicKind, BasicType, Type, VarType};

/// Where a failed conversion goes.
#[derive(Debug, Clone, Copy)]
pub enum OnError<'a> {
  /// `return <values>, fmt.Errorf(...)`.
  Return(&'a [&'a str]),
  /// `<slice> = append(<slice>, fmt.Errorf(...))`.
  Append(&'a str),
}

#[derive(Debug, Default)]
pub struct GoWriter {
  builder: String,
}

impl Deref for GoWriter {
  type Target = String;

  fn deref(&self) -> &String {
    &self.builder
  }
}

impl DerefMut for GoWriter {
  fn deref_mut(&mut self) -> &mut String {
    &mut self.builder
  }
}

impl GoWriter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn into_string(self) -> String {
    self.builder
  }

  pub fn write_check_err(&mut self, err: &str, body: impl FnOnce(&mut Self)) {
    self.push_str(&format!("if {} != nil {{\n", err));
    body(self);
    self.push_str("}\n");
  }

  pub fn write_defer(&mut self, params: &[String], calls: &[String], body: impl FnOnce(&mut Self)) {
    self.push_str(&format!("defer func({}) {{\n", params.join(", ")));
    body(self);
    self.push_str(&format!("}}({})\n", calls.join(", ")));
  }

  /// `type <name> struct {...}` from `(field, type)` pairs; the type part may
  /// carry a tag.
  pub fn write_type_struct(&mut self, name: &str, fields: &[(String, String)]) {
    self.push_str(&format!("type {} struct ", name));
    self.write_struct_defined(fields);
    self.push_str("\n\n");
  }

  pub fn write_struct_defined(&mut self, fields: &[(String, String)]) {
    self.push_str("{\n");
    for (name, ty) in fields {
      self.push_str(&format!("{} {}\n", name, ty));
    }
    self.push_str("}");
  }

  pub fn write_struct_assign(&mut self, fields: &[(String, String)]) {
    let body = fields.iter().map(|(name, value)| format!("{}: {}", name, value)).join(", ");
    self.push_str(&format!("{{{}}}", body));
  }

  pub fn write_func(&mut self, name: &str, recv: Option<&str>, signature: &str, body: impl FnOnce(&mut Self)) {
    match recv {
      Some(recv) => self.push_str(&format!("func ({}) {}{} {{\n", recv, name, signature)),
      None => self.push_str(&format!("func {}{} {{\n", name, signature)),
    }
    body(self);
    self.push_str("}\n\n");
  }

  fn write_on_error(&mut self, importer: &mut Importer, on_error: OnError, message: &str) {
    self.push_str("if err != nil {\n");
    self.write_error_body(importer, on_error, message);
    self.push_str("}\n");
  }

  fn write_error_body(&mut self, importer: &mut Importer, on_error: OnError, message: &str) {
    let fmt = importer.import("fmt", "fmt");
    let message = format!("{:?}", format!("{}: %w", message));
    match on_error {
      OnError::Return(values) => {
        let values = values.iter().map(|it| format!("{}, ", it)).join("");
        self.push_str(&format!("return {}{}.Errorf({}, err)\n", values, fmt, message));
      }
      OnError::Append(slice) => {
        self.push_str(&format!("{0} = append({0}, {1}.Errorf({2}, err))\n", slice, fmt, message));
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn write_convert_basic(
    &mut self,
    importer: &mut Importer,
    name: &str,
    assign_to: &str,
    from: &str,
    basic: &BasicType,
    target: &Type,
    on_error: OnError,
    message: &str,
  ) {
    let target_str = importer.type_string(&target.clone().with_pointer(false));
    let tmp = format!("{}{}", name, basic.name.to_upper_camel_case());
    let parsed = match basic.kind {
      BasicKind::Int => Some(("Atoi(%s)".to_owned(), "int")),
      BasicKind::Int8 | BasicKind::Int16 | BasicKind::Int32 | BasicKind::Int64 => {
        Some((format!("ParseInt(%s, 10, {})", basic.bit_size()), "int64"))
      }
      BasicKind::Uint | BasicKind::Uint8 | BasicKind::Uint16 | BasicKind::Uint32 | BasicKind::Uint64 | BasicKind::Uintptr => {
        Some((format!("ParseUint(%s, 10, {})", basic.bit_size()), "uint64"))
      }
      BasicKind::Float32 | BasicKind::Float64 => Some((format!("ParseFloat(%s, {})", basic.bit_size()), "float64")),
      BasicKind::Bool => Some(("ParseBool(%s)".to_owned(), "bool")),
      _ => None,
    };
    let value = match parsed {
      Some((call, output)) => {
        let strconv = importer.import("strconv", "strconv");
        self.push_str(&format!("{}, err := {}.{}\n", tmp, strconv, call.replace("%s", from)));
        self.write_on_error(importer, on_error, message);
        if target_str == output {
          tmp
        } else {
          format!("{}({})", target_str, tmp)
        }
      }
      None if target_str == "string" => from.to_owned(),
      None => format!("{}({})", target_str, from),
    };
    self.write_assign(name, assign_to, &value, target.is_pointer());
  }

  fn write_assign(&mut self, name: &str, assign_to: &str, value: &str, pointer: bool) {
    if pointer {
      let ptr = format!("ptr{}", name.to_upper_camel_case());
      self.push_str(&format!("{} := {}\n", ptr, value));
      self.push_str(&format!("{} = &{}\n", assign_to, ptr));
    } else {
      self.push_str(&format!("{} = {}\n", assign_to, value));
    }
  }

  /// Parses the string expression `from` into `assign_to`, which has the
  /// type of `var`.
  pub fn write_convert_type(
    &mut self,
    importer: &mut Importer,
    assign_to: &str,
    from: &str,
    var: &VarType,
    on_error: OnError,
    message: &str,
  ) {
    let message = if message.is_empty() { "convert error" } else { message };
    let universe = importer.universe();
    let name = var.name.lower.as_str();
    let ty = &var.ty;

    if let Some(named) = ty.named(universe) {
      let special = match (named.pkg.path.as_str(), named.name.value.as_str()) {
        ("net/url", "URL") => Some(("URL", "Parse(%s)", true)),
        ("github.com/google/uuid", "UUID") => Some(("UUID", "Parse(%s)", true)),
        ("github.com/satori/go.uuid", "UUID") => Some(("UUID", "FromString(%s)", true)),
        ("github.com/pborman/uuid", "UUID") => Some(("UUID", "Parse(%s)", false)),
        ("time", "Duration") => Some(("Dur", "ParseDuration(%s)", true)),
        ("time", "Time") => Some(("Time", "Parse(%p.RFC3339, %s)", true)),
        _ => None,
      };
      if let Some((suffix, call, fallible)) = special {
        let pkg = importer.import(&named.pkg.name, &named.pkg.path);
        let tmp = format!("{}{}", name, suffix);
        let call = call.replace("%p", &pkg).replace("%s", from);
        if fallible {
          self.push_str(&format!("{}, err := {}.{}\n", tmp, pkg, call));
          self.write_on_error(importer, on_error, message);
        } else {
          self.push_str(&format!("{} := {}.{}\n", tmp, pkg, call));
        }
        // url.Parse is the only parser returning a pointer.
        let value = match (suffix, ty.is_pointer()) {
          ("URL", true) => tmp,
          ("URL", false) => format!("*{}", tmp),
          (_, true) => format!("&{}", tmp),
          (_, false) => tmp,
        };
        self.push_str(&format!("{} = {}\n", assign_to, value));
        return;
      }
    }

    match ty.underlying(universe) {
      Type::Basic(basic) => {
        let basic = basic.clone();
        self.write_convert_basic(importer, name, assign_to, from, &basic, ty, on_error, message);
      }
      Type::Slice(slice) if slice.value.basic(universe).is_some() && !ty.is_byte_slice(universe) => {
        let strings = importer.import("strings", "strings");
        let elem = (*slice.value).clone();
        let basic = elem.basic(universe).cloned();
        let slice_str = importer.type_string(&ty.clone().with_pointer(false));
        match basic {
          Some(basic) if basic.is_string() && matches!(elem, Type::Basic(_)) => {
            self.write_assign(name, assign_to, &format!("{}.Split({}, \",\")", strings, from), ty.is_pointer());
          }
          Some(basic) => {
            let parts = format!("parts{}", name.to_upper_camel_case());
            self.push_str(&format!("{} := {}.Split({}, \",\")\n", parts, strings, from));
            self.push_str(&format!("{} = make({}, len({}))\n", assign_to, slice_str, parts));
            self.push_str(&format!("for i, s := range {} {{\n", parts));
            self.write_convert_basic(importer, "item", &format!("{}[i]", assign_to), "s", &basic, &elem, on_error, message);
            self.push_str("}\n");
          }
          None => {}
        }
      }
      Type::Map(map) if map.key.basic(universe).is_some_and(|it| it.is_string()) && map.value.basic(universe).is_some() => {
        let strings = importer.import("strings", "strings");
        let value_ty = (*map.value).clone();
        let key_ty = importer.type_string(&map.key);
        let map_str = importer.type_string(&ty.clone().with_pointer(false));
        let parts = format!("parts{}", name.to_upper_camel_case());
        self.push_str(&format!("{} := {}.Split({}, \",\")\n", parts, strings, from));
        self.push_str(&format!("{} = make({}, len({}))\n", assign_to, map_str, parts));
        self.push_str(&format!("for _, s := range {} {{\n", parts));
        self.push_str(&format!("kv := {}.SplitN(s, \"=\", 2)\n", strings));
        self.push_str("if len(kv) == 2 {\n");
        let key = if key_ty == "string" { "kv[0]".to_owned() } else { format!("{}(kv[0])", key_ty) };
        if let Some(basic) = value_ty.basic(universe).cloned() {
          self.write_convert_basic(importer, "value", &format!("{}[{}]", assign_to, key), "kv[1]", &basic, &value_ty, on_error, message);
        }
        self.push_str("}\n");
        self.push_str("}\n");
      }
      _ => {
        let json = importer.import("json", "encoding/json");
        self.push_str(&format!("if err := {}.Unmarshal([]byte({}), &{}); err != nil {{\n", json, from, assign_to));
        self.write_error_body(importer, on_error, message);
        self.push_str("}\n");
      }
    }
  }

  /// Declares `assign_to` holding the string form of `value`.
  pub fn write_format_type(&mut self, importer: &mut Importer, assign_to: &str, value: &str, var: &VarType) {
    let universe = importer.universe();
    let ty = &var.ty;
    match ty.underlying(universe) {
      Type::Slice(slice) if !ty.is_byte_slice(universe) && format_expr(importer, "it", &slice.value).is_some() => {
        let elem = (*slice.value).clone();
        let strings = importer.import("strings", "strings");
        let parts = format!("{}Parts", assign_to);
        let item = format_expr(importer, "it", &elem).unwrap_or_default();
        self.push_str(&format!("{} := make([]string, 0, len({}))\n", parts, value));
        self.push_str(&format!("for _, it := range {} {{\n", value));
        self.push_str(&format!("{0} = append({0}, {1})\n", parts, item));
        self.push_str("}\n");
        self.push_str(&format!("{} := {}.Join({}, \",\")\n", assign_to, strings, parts));
      }
      _ => match format_expr(importer, value, ty) {
        Some(expr) => self.push_str(&format!("{} := {}\n", assign_to, expr)),
        None => {
          let fmt = importer.import("fmt", "fmt");
          self.push_str(&format!("{} := {}.Sprint({})\n", assign_to, fmt, value));
        }
      },
    }
  }
}

/// String expression for a scalar value, if the type has a known text form.
pub fn format_expr(importer: &mut Importer, value: &str, ty: &Type) -> Option<String> {
  let universe = importer.universe();
  let deref = if ty.is_pointer() { format!("*{}", value) } else { value.to_owned() };
  if let Some(named) = ty.named(universe) {
    match (named.pkg.path.as_str(), named.name.value.as_str()) {
      ("net/url", "URL") | ("time", "Duration") => return Some(format!("{}.String()", value)),
      (_, "UUID") if named.pkg.path.contains("uuid") => return Some(format!("{}.String()", value)),
      ("time", "Time") => {
        let time = importer.import("time", "time");
        return Some(format!("{}.Format({}.RFC3339)", value, time));
      }
      _ => {}
    }
  }
  let basic = ty.basic(universe)?;
  Some(match basic.kind {
    BasicKind::String => match ty {
      Type::Basic(_) => deref,
      _ => format!("string({})", deref),
    },
    BasicKind::Int | BasicKind::Int8 | BasicKind::Int16 | BasicKind::Int32 | BasicKind::Int64 => {
      format!("{}.FormatInt(int64({}), 10)", importer.import("strconv", "strconv"), deref)
    }
    BasicKind::Uint | BasicKind::Uint8 | BasicKind::Uint16 | BasicKind::Uint32 | BasicKind::Uint64 | BasicKind::Uintptr => {
      format!("{}.FormatUint(uint64({}), 10)", importer.import("strconv", "strconv"), deref)
    }
    BasicKind::Float32 | BasicKind::Float64 => format!(
      "{}.FormatFloat(float64({}), 'g', -1, {})",
      importer.import("strconv", "strconv"),
      deref,
      basic.bit_size()
    ),
    BasicKind::Bool => format!("{}.FormatBool(bool({}))", importer.import("strconv", "strconv"), deref),
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::model::{MapType, NameString, NamedRef, ObjectKey, PackageType, SliceType, Universe};

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
  fn converts_basic_types() {
    let universe = Universe::new();
    let mut importer = Importer::new("example.com/app", &universe);
    let mut w = GoWriter::new();
    w.write_convert_type(&mut importer, "req.ID", "vars[\"id\"]", &var("id", basic("int")), OnError::Return(&["nil"]), "");
    w.write_convert_type(&mut importer, "req.Size", "q.Get(\"size\")", &var("size", basic("int32")), OnError::Return(&["nil"]), "");
    w.write_convert_type(&mut importer, "req.Name", "q.Get(\"name\")", &var("name", basic("string")), OnError::Return(&["nil"]), "");
    let out = w.into_string();
    assert!(out.contains("idInt, err := strconv.Atoi(vars[\"id\"])\n"));
    assert!(out.contains("return nil, fmt.Errorf(\"convert error: %w\", err)\n"));
    assert!(out.contains("req.ID = idInt\n"));
    assert!(out.contains("sizeInt32, err := strconv.ParseInt(q.Get(\"size\"), 10, 32)\n"));
    assert!(out.contains("req.Size = int32(sizeInt32)\n"));
    assert!(out.contains("req.Name = q.Get(\"name\")\n"));
  }

  #[test]
  fn converts_into_an_error_slice() {
    let universe = Universe::new();
    let mut importer = Importer::new("example.com/app", &universe);
    let mut w = GoWriter::new();
    let port = var("port", basic("uint16").with_pointer(true));
    w.write_convert_type(&mut importer, "cfg.Port", "s", &port, OnError::Append("errs"), "convert PORT error");
    let out = w.into_string();
    assert!(out.contains("portUint16, err := strconv.ParseUint(s, 10, 16)\n"));
    assert!(out.contains("errs = append(errs, fmt.Errorf(\"convert PORT error: %w\", err))\n"));
    assert!(out.contains("ptrPort := uint16(portUint16)\ncfg.Port = &ptrPort\n"));
  }

  #[test]
  fn converts_lists_maps_and_well_known_types() {
    let mut universe = Universe::new();
    let time = PackageType { name: "time".to_owned(), path: "time".to_owned(), module: None };
    let duration = universe.reserve(ObjectKey::new("time", "Duration"), time);
    let mut importer = Importer::new("example.com/app", &universe);
    let mut w = GoWriter::new();

    let ids = var("ids", Type::Slice(SliceType { value: Box::new(basic("int64")), pointer: false }));
    w.write_convert_type(&mut importer, "req.IDs", "v", &ids, OnError::Return(&["nil"]), "");
    let labels = var(
      "labels",
      Type::Map(MapType { key: Box::new(basic("string")), value: Box::new(basic("string")), pointer: false }),
    );
    w.write_convert_type(&mut importer, "req.Labels", "v", &labels, OnError::Return(&["nil"]), "");
    let timeout = var("timeout", Type::Named(NamedRef { id: duration, pointer: false }));
    w.write_convert_type(&mut importer, "req.Timeout", "v", &timeout, OnError::Return(&["nil"]), "");
    let out = w.into_string();

    assert!(out.contains("partsIds := strings.Split(v, \",\")\nreq.IDs = make([]int64, len(partsIds))\n"));
    assert!(out.contains("itemInt64, err := strconv.ParseInt(s, 10, 64)\n"));
    assert!(out.contains("req.IDs[i] = itemInt64\n"));
    assert!(out.contains("kv := strings.SplitN(s, \"=\", 2)\n"));
    assert!(out.contains("req.Labels[kv[0]] = kv[1]\n"));
    assert!(out.contains("timeoutDur, err := time.ParseDuration(v)\nif err != nil {\n"));
    assert!(out.contains("req.Timeout = timeoutDur\n"));
  }

  #[test]
  fn formats_values_back_to_strings() {
    let mut universe = Universe::new();
    let time = PackageType { name: "time".to_owned(), path: "time".to_owned(), module: None };
    let at = universe.reserve(ObjectKey::new("time", "Time"), time);
    let mut importer = Importer::new("example.com/app", &universe);
    let mut w = GoWriter::new();
    w.write_format_type(&mut importer, "idStr", "req.ID", &var("id", basic("int")));
    w.write_format_type(&mut importer, "atStr", "req.At", &var("at", Type::Named(NamedRef { id: at, pointer: false })));
    w.write_format_type(
      &mut importer,
      "tagsStr",
      "req.Tags",
      &var("tags", Type::Slice(SliceType { value: Box::new(basic("string")), pointer: false })),
    );
    w.write_format_type(&mut importer, "okStr", "req.Ok", &var("ok", basic("bool").with_pointer(true)));
    let out = w.into_string();
    assert!(out.contains("idStr := strconv.FormatInt(int64(req.ID), 10)\n"));
    assert!(out.contains("atStr := req.At.Format(time.RFC3339)\n"));
    assert!(out.contains("tagsStrParts = append(tagsStrParts, it)\n"));
    assert!(out.contains("tagsStr := strings.Join(tagsStrParts, \",\")\n"));
    assert!(out.contains("okStr := strconv.FormatBool(bool(*req.Ok))\n"));
  }

  #[test]
  fn struct_helpers() {
    let mut w = GoWriter::new();
    w.write_type_struct("pair", &[("A".to_owned(), "int".to_owned()), ("B".to_owned(), "string `json:\"b\"`".to_owned())]);
    w.write_struct_assign(&[("A".to_owned(), "1".to_owned())]);
    w.write_check_err("err", |w| w.push_str("return err\n"));
    assert_eq!(w.as_str(), "type pair struct {\nA int\nB string `json:\"b\"`\n}\n\n{A: 1}if err != nil {\nreturn err\n}\n");
  }
}

//! Example values, JSON schemas and JSDoc types of Go types, used by the
//! documentation emitters.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::model::{BasicKind, FieldType, NamedId, StructType, Type, Universe};

const UUID_PACKAGES: &[&str] = &["github.com/google/uuid", "github.com/satori/go.uuid", "github.com/pborman/uuid", "github.com/gofrs/uuid"];

/// Values with a fixed textual JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
  Time,
  Uuid,
  Bytes,
  Raw,
}

fn special(ty: &Type, universe: &Universe) -> Option<Special> {
  if ty.is_named("encoding/json", "RawMessage", universe) {
    return Some(Special::Raw);
  }
  if ty.is_named("time", "Time", universe) {
    return Some(Special::Time);
  }
  if let Some(named) = ty.named(universe) {
    if named.name.value == "UUID" && UUID_PACKAGES.contains(&named.pkg.path.as_str()) {
      return Some(Special::Uuid);
    }
  }
  if ty.is_byte_slice(universe) {
    return Some(Special::Bytes);
  }
  None
}

/// Exported fields as they appear in JSON, embedded structs flattened.
pub(crate) fn json_fields<'u>(st: &'u StructType, universe: &'u Universe) -> Vec<&'u FieldType> {
  let mut fields = Vec::new();
  for field in &st.fields {
    if field.tags.get("json").is_some_and(|it| it.name == "-") {
      continue;
    }
    if field.var.embedded && field.tags.get("json").map_or(true, |it| it.name.is_empty()) {
      if let Type::Struct(inner) = field.var.ty.underlying(universe) {
        fields.extend(json_fields(inner, universe));
        continue;
      }
    }
    if field.var.exported {
      fields.push(field);
    }
  }
  fields
}

/// Deterministic example value of `ty`.
pub(crate) fn sample(ty: &Type, universe: &Universe) -> Value {
  sample_in(ty, universe, &mut Vec::new())
}

fn sample_in(ty: &Type, universe: &Universe, seen: &mut Vec<NamedId>) -> Value {
  match special(ty, universe) {
    Some(Special::Time) => return json!("1970-01-01T00:00:00Z"),
    Some(Special::Uuid) => return json!("00000000-0000-0000-0000-000000000000"),
    Some(Special::Bytes) => return json!("Ynl0ZXM="),
    Some(Special::Raw) => return json!({}),
    None => {}
  }
  if let Type::Named(named) = ty {
    if seen.contains(&named.id) {
      return Value::Null;
    }
    seen.push(named.id);
    let value = sample_in(&universe.get(named.id).underlying, universe, seen);
    seen.pop();
    return value;
  }
  match ty {
    Type::Basic(basic) => match basic.kind {
      BasicKind::Bool => json!(true),
      BasicKind::String => json!("string"),
      BasicKind::Float32 | BasicKind::Float64 => json!(1.5),
      BasicKind::Complex64 | BasicKind::Complex128 | BasicKind::UnsafePointer => Value::Null,
      _ => json!(1),
    },
    Type::Struct(st) => {
      let mut object = Map::new();
      for field in json_fields(st, universe) {
        object.insert(field.json_name(), sample_in(&field.var.ty, universe, seen));
      }
      Value::Object(object)
    }
    Type::Slice(it) => json!([sample_in(&it.value, universe, seen)]),
    Type::Array(it) => json!([sample_in(&it.value, universe, seen)]),
    Type::Map(it) => json!({ "key": sample_in(&it.value, universe, seen) }),
    _ => Value::Null,
  }
}

/// Whether `ty` gets its own JSDoc `@typedef`.
pub(crate) fn has_typedef(ty: &Type, universe: &Universe) -> bool {
  special(ty, universe).is_none()
    && ty.named(universe).is_some_and(|it| matches!(it.underlying, Type::Struct(_) | Type::Map(_) | Type::Slice(_)))
}

/// JSDoc spelling of `ty`.
pub(crate) fn js_type(ty: &Type, universe: &Universe) -> String {
  match special(ty, universe) {
    Some(Special::Raw) => return "*".to_owned(),
    Some(_) => return "string".to_owned(),
    None => {}
  }
  if has_typedef(ty, universe) {
    if let Some(named) = ty.named(universe) {
      return named.name.value.clone();
    }
  }
  match ty.underlying(universe) {
    Type::Basic(basic) if basic.is_bool() => "boolean".to_owned(),
    Type::Basic(basic) if basic.is_string() => "string".to_owned(),
    Type::Basic(basic) if basic.is_numeric() => "number".to_owned(),
    Type::Slice(it) => format!("Array<{}>", js_type(&it.value, universe)),
    Type::Array(it) => format!("Array<{}>", js_type(&it.value, universe)),
    Type::Map(it) => format!("Object<{}, {}>", js_type(&it.key, universe), js_type(&it.value, universe)),
    Type::Struct(_) => "Object".to_owned(),
    _ => "*".to_owned(),
  }
}

/// OpenAPI schemas; named structs become `$ref`s collected in `defs`.
#[derive(Debug, Default)]
pub(crate) struct Schemas {
  pub defs: BTreeMap<String, Value>,
}

impl Schemas {
  pub fn schema(&mut self, ty: &Type, universe: &Universe) -> Value {
    match special(ty, universe) {
      Some(Special::Time) => return json!({"type": "string", "format": "date-time"}),
      Some(Special::Uuid) => return json!({"type": "string", "format": "uuid"}),
      Some(Special::Bytes) => return json!({"type": "string", "format": "byte"}),
      Some(Special::Raw) => return json!({}),
      None => {}
    }
    if let Some(named) = ty.named(universe) {
      if let Type::Struct(st) = &named.underlying {
        let name = named.name.value.clone();
        if !self.defs.contains_key(&name) {
          self.defs.insert(name.clone(), Value::Null);
          let schema = self.object(st, universe);
          self.defs.insert(name.clone(), schema);
        }
        return json!({ "$ref": format!("#/components/schemas/{}", name) });
      }
    }
    match ty.underlying(universe) {
      Type::Basic(basic) => match basic.kind {
        BasicKind::Bool => json!({"type": "boolean"}),
        BasicKind::String => json!({"type": "string"}),
        BasicKind::Float32 => json!({"type": "number", "format": "float"}),
        BasicKind::Float64 => json!({"type": "number", "format": "double"}),
        BasicKind::Int8 | BasicKind::Int16 | BasicKind::Int32 | BasicKind::Uint8 | BasicKind::Uint16 | BasicKind::Uint32 => {
          json!({"type": "integer", "format": "int32"})
        }
        BasicKind::Int | BasicKind::Int64 | BasicKind::Uint | BasicKind::Uint64 | BasicKind::Uintptr => {
          json!({"type": "integer", "format": "int64"})
        }
        BasicKind::Complex64 | BasicKind::Complex128 | BasicKind::UnsafePointer => json!({}),
      },
      Type::Struct(st) => self.object(st, universe),
      Type::Slice(it) => json!({"type": "array", "items": self.schema(&it.value, universe)}),
      Type::Array(it) => json!({"type": "array", "items": self.schema(&it.value, universe)}),
      Type::Map(it) => json!({"type": "object", "additionalProperties": self.schema(&it.value, universe)}),
      _ => json!({}),
    }
  }

  fn object(&mut self, st: &StructType, universe: &Universe) -> Value {
    let mut properties = Map::new();
    for field in json_fields(st, universe) {
      properties.insert(field.json_name(), self.schema(&field.var.ty, universe));
    }
    json!({"type": "object", "properties": properties})
  }

  /// Object schema of named values, e.g. the parameters of a method.
  pub fn properties<'v>(&mut self, vars: impl IntoIterator<Item = (String, &'v Type)>, universe: &Universe) -> Value {
    let mut properties = Map::new();
    for (name, ty) in vars {
      properties.insert(name, self.schema(ty, universe));
    }
    json!({"type": "object", "properties": properties})
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::model::{BasicType, SliceType};

  fn basic(name: &str) -> Type {
    Type::Basic(BasicType::new(name).unwrap())
  }

  fn slice(of: Type) -> Type {
    Type::Slice(SliceType { value: Box::new(of), pointer: false })
  }

  #[test]
  fn samples_are_stable() {
    let universe = Universe::new();
    assert_eq!(sample(&basic("string"), &universe), json!("string"));
    assert_eq!(sample(&basic("int32"), &universe), json!(1));
    assert_eq!(sample(&basic("float64"), &universe), json!(1.5));
    assert_eq!(sample(&slice(basic("byte")), &universe), json!("Ynl0ZXM="));
    assert_eq!(sample(&slice(basic("bool")), &universe), json!([true]));
  }

  #[test]
  fn schemas_carry_formats() {
    let universe = Universe::new();
    let mut schemas = Schemas::default();
    assert_eq!(schemas.schema(&basic("int"), &universe), json!({"type": "integer", "format": "int64"}));
    assert_eq!(schemas.schema(&basic("uint16"), &universe), json!({"type": "integer", "format": "int32"}));
    assert_eq!(schemas.schema(&basic("float32"), &universe), json!({"type": "number", "format": "float"}));
    assert_eq!(
      schemas.schema(&slice(basic("string")), &universe),
      json!({"type": "array", "items": {"type": "string"}})
    );
    assert_eq!(js_type(&slice(basic("int")), &universe), "Array<number>");
    assert!(schemas.defs.is_empty());
  }
}

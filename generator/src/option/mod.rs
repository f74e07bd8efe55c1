pub mod decoder;
pub mod schema;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SwipeError;
use crate::model::{FuncType, NamedId, PackageType, Type};

pub use decoder::Decoder;

/// Reference to a function or method named in the options, e.g. `App.Create`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncRef {
  /// Named type of a method expression.
  pub recv: Option<NamedId>,
  pub func: FuncType,
}

/// Reified option tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OptionValue {
  /// Keys in first-insertion order.
  Map(Vec<(String, OptionValue)>),
  List(Vec<OptionValue>),
  String(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  Nil,
  Type(Type),
  Method(FuncRef),
}

impl OptionValue {
  pub fn map() -> Self {
    OptionValue::Map(Vec::new())
  }

  pub fn get(&self, key: &str) -> Option<&OptionValue> {
    match self {
      OptionValue::Map(entries) => entries.iter().find(|(name, _)| name == key).map(|(_, value)| value),
      _ => None,
    }
  }

  /// Sets `key`, replacing a previous value in place.
  pub fn insert(&mut self, key: &str, value: OptionValue) {
    if let OptionValue::Map(entries) = self {
      match entries.iter_mut().find(|(name, _)| name == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key.to_owned(), value)),
      }
    }
  }

  /// Appends to the list stored under `key`.
  pub fn push_repeat(&mut self, key: &str, value: OptionValue) {
    if let OptionValue::Map(entries) = self {
      match entries.iter_mut().find(|(name, _)| name == key) {
        Some((_, OptionValue::List(items))) => items.push(value),
        Some(entry) => entry.1 = OptionValue::List(vec![value]),
        None => entries.push((key.to_owned(), OptionValue::List(vec![value]))),
      }
    }
  }

  /// JSON view consumed by plugin configs through serde. Types and
  /// functions become `{"$type": …}` and `{"$method": …}` markers.
  pub fn to_json(&self) -> Result<Value, serde_json::Error> {
    Ok(match self {
      OptionValue::Map(entries) => {
        let mut object = serde_json::Map::new();
        for (key, value) in entries {
          object.insert(key.clone(), value.to_json()?);
        }
        Value::Object(object)
      }
      OptionValue::List(items) => Value::Array(items.iter().map(|it| it.to_json()).collect::<Result<_, _>>()?),
      OptionValue::String(value) => Value::String(value.clone()),
      OptionValue::Int(value) => json!(value),
      OptionValue::Float(value) => json!(value),
      OptionValue::Bool(value) => Value::Bool(*value),
      OptionValue::Nil => Value::Null,
      OptionValue::Type(ty) => json!({ "$type": serde_json::to_value(ty)? }),
      OptionValue::Method(func) => json!({ "$method": serde_json::to_value(func)? }),
    })
  }
}

/// Deserialization target for an option argument holding a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeValue {
  #[serde(rename = "$type")]
  pub ty: Type,
}

/// Deserialization target for an option argument holding a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodValue {
  #[serde(rename = "$method")]
  pub method: FuncRef,
}

/// Arguments of a one-parameter option, e.g. `RESTPath("/items")`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Single<T> {
  pub value: T,
}

/// Zero-parameter option such as `HTTPServer()`; set when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Flag {}

/// Deserializes the option tree of `plugin` into its typed configuration.
pub fn from_tree<T: DeserializeOwned>(plugin: &str, tree: &OptionValue) -> Result<T, SwipeError> {
  let value = tree.to_json().map_err(|err| SwipeError::configure(plugin, err.to_string()))?;
  serde_json::from_value(value).map_err(|err| SwipeError::configure(plugin, err.to_string()))
}

/// One `Build(...)` call.
#[derive(Debug, Clone, Serialize)]
pub struct Build {
  pub pkg: PackageType,
  /// Directory of the package holding the call.
  pub base_path: PathBuf,
  /// Option tree per plugin id.
  pub options: Vec<(String, OptionValue)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Module {
  pub path: String,
  pub external: bool,
  pub builds: Vec<Build>,
}

//! Typed view of the Gokit option tree and the per-method settings derived
//! from it.

use heck::ToKebabCase;
use serde::{Deserialize, Serialize};

use crate::importer::Importer;
use crate::model::{zero_value, Type};
use crate::option::{Flag, FuncRef, MethodValue, OptionValue, Single, TypeValue};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Options {
  #[serde(rename = "HTTPServer")]
  pub http_server: Option<Flag>,
  #[serde(rename = "HTTPFast")]
  pub http_fast: Option<Flag>,
  #[serde(rename = "ClientsEnable")]
  pub clients_enable: Option<Langs>,
  #[serde(rename = "ClientOutput")]
  pub client_output: Option<Single<String>>,
  #[serde(rename = "CURLEnable")]
  pub curl_enable: Option<Flag>,
  #[serde(rename = "CURLOutput")]
  pub curl_output: Option<Single<String>>,
  #[serde(rename = "CURLURL")]
  pub curl_url: Option<Single<String>>,
  #[serde(rename = "JSONRPCEnable")]
  pub jsonrpc_enable: Option<Flag>,
  #[serde(rename = "JSONRPCPath")]
  pub jsonrpc_path: Option<Single<String>>,
  #[serde(rename = "JSONRPCDocEnable")]
  pub jsonrpc_doc_enable: Option<Flag>,
  #[serde(rename = "JSONRPCDocOutput")]
  pub jsonrpc_doc_output: Option<Single<String>>,
  #[serde(rename = "Interface", default)]
  pub interfaces: Vec<InterfaceOptions>,
  #[serde(rename = "OpenapiEnable")]
  pub openapi_enable: Option<Flag>,
  #[serde(rename = "OpenapiTags", default)]
  pub openapi_tags: Vec<OpenapiTags>,
  #[serde(rename = "OpenapiOutput")]
  pub openapi_output: Option<Single<String>>,
  #[serde(rename = "OpenapiInfo")]
  pub openapi_info: Option<OpenapiInfo>,
  #[serde(rename = "OpenapiContact")]
  pub openapi_contact: Option<OpenapiContact>,
  #[serde(rename = "OpenapiLicence")]
  pub openapi_licence: Option<OpenapiLicence>,
  #[serde(rename = "OpenapiServer", default)]
  pub openapi_servers: Vec<OpenapiServer>,
  #[serde(rename = "MethodOptions", default)]
  pub method_options: Vec<MethodSettings>,
  #[serde(rename = "MethodDefaultOptions")]
  pub method_default_options: Option<MethodSettings>,
  #[serde(rename = "ServerErrorEncoder")]
  pub server_error_encoder: Option<Single<MethodValue>>,
  #[serde(rename = "Labels", default)]
  pub labels: Vec<ContextValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Langs {
  #[serde(default)]
  pub langs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InterfaceOptions {
  pub iface: TypeValue,
  #[serde(default)]
  pub ns: String,
  #[serde(rename = "ClientName")]
  pub client_name: Option<Single<String>>,
  #[serde(rename = "Gateway")]
  pub gateway: Option<Flag>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OpenapiTags {
  pub methods: Vec<MethodValue>,
  pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OpenapiInfo {
  pub title: String,
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub description: String,
  pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OpenapiContact {
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub name: String,
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub email: String,
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OpenapiLicence {
  pub name: String,
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OpenapiServer {
  #[serde(skip_serializing_if = "String::is_empty", default)]
  pub description: String,
  pub url: String,
}

/// `LoggingParams(includes, excludes)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoggingParams {
  #[serde(default)]
  pub includes: Vec<String>,
  #[serde(default)]
  pub excludes: Vec<String>,
}

/// Key of a `context.Context` value as written in the options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContextKey {
  Type(TypeValue),
  String(String),
  Int(i64),
}

/// `LoggingContext(key, name)` and `Labels(key, name)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ContextValue {
  pub key: ContextKey,
  pub name: String,
}

/// Method level options; `signature` is set for `MethodOptions` entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MethodSettings {
  pub signature: Option<MethodValue>,
  #[serde(rename = "Instrumenting")]
  pub instrumenting: Option<Single<bool>>,
  #[serde(rename = "Logging")]
  pub logging: Option<Single<bool>>,
  #[serde(rename = "LoggingParams")]
  pub logging_params: Option<LoggingParams>,
  #[serde(rename = "LoggingContext", default)]
  pub logging_context: Vec<ContextValue>,
  #[serde(rename = "RESTMethod")]
  pub rest_method: Option<Single<String>>,
  #[serde(rename = "RESTWrapResponse")]
  pub rest_wrap_response: Option<Single<String>>,
  #[serde(rename = "RESTWrapRequest")]
  pub rest_wrap_request: Option<Single<String>>,
  #[serde(rename = "RESTPath")]
  pub rest_path: Option<Single<String>>,
  #[serde(rename = "RESTMultipartMaxMemory")]
  pub rest_multipart_max_memory: Option<Single<i64>>,
  #[serde(rename = "RESTHeaderVars")]
  pub rest_header_vars: Option<Single<Vec<String>>>,
  #[serde(rename = "RESTQueryVars")]
  pub rest_query_vars: Option<Single<Vec<String>>>,
  #[serde(rename = "RESTQueryValues")]
  pub rest_query_values: Option<Single<Vec<String>>>,
  #[serde(rename = "RESTBodyType")]
  pub rest_body_type: Option<Single<String>>,
  #[serde(rename = "ServerEncodeResponse")]
  pub server_encode_response: Option<Single<MethodValue>>,
  #[serde(rename = "ServerDecodeRequest")]
  pub server_decode_request: Option<Single<MethodValue>>,
  #[serde(rename = "ClientEncodeRequest")]
  pub client_encode_request: Option<Single<MethodValue>>,
  #[serde(rename = "ClientDecodeResponse")]
  pub client_decode_response: Option<Single<MethodValue>>,
  #[serde(rename = "ClientErrorDecode")]
  pub client_error_decode: Option<Single<MethodValue>>,
  #[serde(rename = "Exclude")]
  pub exclude: Option<Single<bool>>,
}

/// Lifts the entries of the `Service(...)` wrapper to the root, appending
/// repeated options.
pub(crate) fn flatten_service(tree: &OptionValue) -> OptionValue {
  let mut root = OptionValue::map();
  let OptionValue::Map(entries) = tree else {
    return tree.clone();
  };
  for (key, value) in entries {
    match (key.as_str(), value) {
      ("Service", OptionValue::Map(inner)) => {
        for (key, value) in inner {
          match value {
            OptionValue::List(items) => {
              for item in items {
                root.push_repeat(key, item.clone());
              }
            }
            _ => root.insert(key, value.clone()),
          }
        }
      }
      (_, OptionValue::List(items)) if root.get(key).is_some() => {
        for item in items {
          root.push_repeat(key, item.clone());
        }
      }
      _ => root.insert(key, value.clone()),
    }
  }
  root
}

pub(crate) const DEFAULT_MULTIPART_MAX_MEMORY: i64 = 67108864;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum BodyType {
  #[default]
  Json,
  FormData,
  UrlEncoded,
}

/// One `(paramName, externalName)` binding of a query or header var.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarPair {
  /// Parameter name, or the literal of a constant.
  pub param: String,
  pub external: String,
  pub required: bool,
  pub constant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathVar {
  pub name: String,
  pub regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
  Lit(String),
  Var(PathVar),
}

/// Route path with its `{name[:regex]}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathTemplate {
  raw: String,
  parts: Vec<Part>,
}

impl PathTemplate {
  /// Splits `path`; `None` when the braces do not balance.
  pub fn parse(path: &str) -> Option<PathTemplate> {
    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut chars = path.chars();
    while let Some(ch) = chars.next() {
      match ch {
        '{' => {
          let mut depth = 1;
          let mut inner = String::new();
          for ch in chars.by_ref() {
            match ch {
              '{' => depth += 1,
              '}' => depth -= 1,
              _ => {}
            }
            if depth == 0 {
              break;
            }
            inner.push(ch);
          }
          if depth != 0 {
            return None;
          }
          if !lit.is_empty() {
            parts.push(Part::Lit(std::mem::take(&mut lit)));
          }
          let var = match inner.split_once(':') {
            Some((name, regex)) => PathVar { name: name.trim().to_owned(), regex: Some(regex.to_owned()) },
            None => PathVar { name: inner.trim().to_owned(), regex: None },
          };
          parts.push(Part::Var(var));
        }
        '}' => return None,
        _ => lit.push(ch),
      }
    }
    if !lit.is_empty() {
      parts.push(Part::Lit(lit));
    }
    Some(PathTemplate { raw: path.to_owned(), parts })
  }

  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn vars(&self) -> impl Iterator<Item = &PathVar> {
    self.parts.iter().filter_map(|it| match it {
      Part::Var(var) => Some(var),
      Part::Lit(_) => None,
    })
  }

  fn render(&self, var: impl Fn(&PathVar) -> String) -> String {
    self
      .parts
      .iter()
      .map(|part| match part {
        Part::Lit(lit) => lit.clone(),
        Part::Var(it) => var(it),
      })
      .collect()
  }

  /// `fmt.Sprintf` format with a `%s` per placeholder.
  pub fn format_string(&self) -> String {
    self.render(|_| "%s".to_owned()).replace('%', "%%").replace("%%s", "%s")
  }

  /// Placeholders without their patterns, as in OpenAPI paths.
  pub fn plain(&self) -> String {
    self.render(|var| format!("{{{}}}", var.name))
  }

  /// Placeholders in the `<name:regex>` form of fasthttp-routing.
  pub fn angled(&self) -> String {
    self.render(|var| match &var.regex {
      Some(regex) => format!("<{}:{}>", var.name, regex),
      None => format!("<{}>", var.name),
    })
  }

  /// Path with every placeholder replaced by `value(var)`.
  pub fn fill(&self, value: impl Fn(&PathVar) -> String) -> String {
    self.render(value)
  }
}

/// Effective options of one interface method.
#[derive(Debug, Clone)]
pub(crate) struct MethodOption {
  pub exclude: bool,
  pub logging: bool,
  pub log_params: LoggingParams,
  pub log_context: Vec<ContextValue>,
  pub instrumenting: bool,
  pub rest_method: String,
  pub path: PathTemplate,
  pub header_vars: Vec<VarPair>,
  pub query_vars: Vec<VarPair>,
  pub query_values: Vec<(String, String)>,
  pub multipart_max_memory: i64,
  pub body_type: BodyType,
  pub wrap_response: Vec<String>,
  pub wrap_request: Vec<String>,
  pub server_encode_response: Option<FuncRef>,
  pub server_decode_request: Option<FuncRef>,
  pub client_encode_request: Option<FuncRef>,
  pub client_decode_response: Option<FuncRef>,
  pub client_error_decode: Option<FuncRef>,
}

/// Error raised while resolving the options of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MergeError {
  Template(String),
  Invalid(String),
}

fn pick<'s, T>(
  own: Option<&'s MethodSettings>,
  default: Option<&'s MethodSettings>,
  field: impl Fn(&'s MethodSettings) -> Option<&'s T>,
) -> Option<&'s T> {
  own.and_then(&field).or_else(|| default.and_then(&field))
}

fn wrap_path(value: Option<&Single<String>>) -> Vec<String> {
  value
    .map(|it| it.value.split('.').filter(|it| !it.is_empty()).map(|it| it.to_owned()).collect())
    .unwrap_or_default()
}

fn func_of(value: Option<&Single<MethodValue>>) -> Option<FuncRef> {
  value.map(|it| it.value.method.clone())
}

/// Parses `(param, external)` pairs; `!external` is required, `:param` a
/// constant.
pub(crate) fn var_pairs(option: &str, values: &[String]) -> Result<Vec<VarPair>, MergeError> {
  if values.len() % 2 != 0 {
    return Err(MergeError::Invalid(format!("{}: expected (param, name) pairs", option)));
  }
  Ok(
    values
      .chunks(2)
      .map(|pair| {
        let (param, constant) = match pair[0].strip_prefix(':') {
          Some(literal) => (literal.to_owned(), true),
          None => (pair[0].clone(), false),
        };
        let (external, required) = match pair[1].strip_prefix('!') {
          Some(name) => (name.to_owned(), true),
          None => (pair[1].clone(), false),
        };
        VarPair { param, external, required, constant }
      })
      .collect(),
  )
}

/// `/ns/path` with empty segments dropped.
fn join_path(ns: &str, path: &str) -> String {
  let segments = ns.split('/').chain(path.split('/')).filter(|it| !it.is_empty());
  format!("/{}", segments.collect::<Vec<_>>().join("/"))
}

impl MethodOption {
  /// Resolves the options of `method` in `ns`: per-method values win over
  /// `default`, which wins over the built-in defaults.
  pub fn merge(
    ns: &str,
    method: &str,
    own: Option<&MethodSettings>,
    default: Option<&MethodSettings>,
    json_rpc: bool,
  ) -> Result<MethodOption, MergeError> {
    let path = match pick(own, default, |it| it.rest_path.as_ref()) {
      Some(path) => join_path(ns, &path.value),
      None => join_path(ns, &method.to_kebab_case()),
    };
    let path = PathTemplate::parse(&path).ok_or_else(|| MergeError::Template(path.clone()))?;

    let pairs = |field: fn(&MethodSettings) -> Option<&Single<Vec<String>>>, option: &str| match pick(own, default, field) {
      Some(values) => var_pairs(option, &values.value),
      None => Ok(Vec::new()),
    };
    let header_vars = pairs(|it| it.rest_header_vars.as_ref(), "RESTHeaderVars")?;
    let query_vars = pairs(|it| it.rest_query_vars.as_ref(), "RESTQueryVars")?;
    let query_values = match pick(own, default, |it| it.rest_query_values.as_ref()) {
      Some(values) if values.value.len() % 2 != 0 => {
        return Err(MergeError::Invalid("RESTQueryValues: expected (name, value) pairs".to_owned()))
      }
      Some(values) => values.value.chunks(2).map(|it| (it[0].clone(), it[1].clone())).collect(),
      None => Vec::new(),
    };
    let body_type = match pick(own, default, |it| it.rest_body_type.as_ref()).map(|it| it.value.as_str()) {
      None | Some("json") => BodyType::Json,
      Some("form-data") => BodyType::FormData,
      Some("x-www-form-urlencoded") => BodyType::UrlEncoded,
      Some(other) => return Err(MergeError::Invalid(format!("RESTBodyType: unknown body type {:?}", other))),
    };
    let log_context = match own.map(|it| &it.logging_context) {
      Some(values) if !values.is_empty() => values.clone(),
      _ => default.map(|it| it.logging_context.clone()).unwrap_or_default(),
    };
    let rest_method = pick(own, default, |it| it.rest_method.as_ref())
      .map(|it| it.value.to_uppercase())
      .unwrap_or_else(|| if json_rpc { "POST" } else { "GET" }.to_owned());

    Ok(MethodOption {
      exclude: pick(own, default, |it| it.exclude.as_ref()).is_some_and(|it| it.value),
      logging: pick(own, default, |it| it.logging.as_ref()).is_some_and(|it| it.value),
      log_params: pick(own, default, |it| it.logging_params.as_ref()).cloned().unwrap_or_default(),
      log_context,
      instrumenting: pick(own, default, |it| it.instrumenting.as_ref()).is_some_and(|it| it.value),
      rest_method,
      path,
      header_vars,
      query_vars,
      query_values,
      multipart_max_memory: pick(own, default, |it| it.rest_multipart_max_memory.as_ref())
        .map_or(DEFAULT_MULTIPART_MAX_MEMORY, |it| it.value),
      body_type,
      wrap_response: wrap_path(pick(own, default, |it| it.rest_wrap_response.as_ref())),
      wrap_request: wrap_path(pick(own, default, |it| it.rest_wrap_request.as_ref())),
      server_encode_response: func_of(pick(own, default, |it| it.server_encode_response.as_ref())),
      server_decode_request: func_of(pick(own, default, |it| it.server_decode_request.as_ref())),
      client_encode_request: func_of(pick(own, default, |it| it.client_encode_request.as_ref())),
      client_decode_response: func_of(pick(own, default, |it| it.client_decode_response.as_ref())),
      client_error_decode: func_of(pick(own, default, |it| it.client_error_decode.as_ref())),
    })
  }

  /// Whether the verb carries a request body.
  pub fn has_body(&self) -> bool {
    matches!(self.rest_method.as_str(), "POST" | "PUT" | "PATCH")
  }

  /// Parameter names bound to the path, query or headers.
  pub fn bound(&self) -> Vec<&str> {
    let path = self.path.vars().map(|it| it.name.as_str());
    let pairs = self.query_vars.iter().chain(&self.header_vars).filter(|it| !it.constant).map(|it| it.param.as_str());
    path.chain(pairs).collect()
  }
}

/// Go expression of a context key.
pub(crate) fn context_key(key: &ContextKey, importer: &mut Importer) -> String {
  match key {
    ContextKey::String(value) => format!("{:?}", value),
    ContextKey::Int(value) => value.to_string(),
    ContextKey::Type(value) => {
      let universe = importer.universe();
      let ty = value.ty.clone().with_pointer(false);
      let name = importer.type_string(&ty);
      match ty.underlying(universe) {
        Type::Struct(_) => format!("{}{{}}", name),
        _ => format!("{}({})", name, zero_value(&ty, universe)),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::option::from_tree;

  fn settings(json: serde_json::Value) -> MethodSettings {
    serde_json::from_value(json).unwrap()
  }

  #[test]
  fn scans_path_templates() {
    let path = PathTemplate::parse("/items/{id:[0-9]{3}}/tags/{tag}").unwrap();
    let vars = path.vars().map(|it| (it.name.as_str(), it.regex.as_deref())).collect::<Vec<_>>();
    assert_eq!(vars, vec![("id", Some("[0-9]{3}")), ("tag", None)]);
    assert_eq!(path.format_string(), "/items/%s/tags/%s");
    assert_eq!(path.plain(), "/items/{id}/tags/{tag}");
    assert_eq!(path.angled(), "/items/<id:[0-9]{3}>/tags/<tag>");
    assert_eq!(PathTemplate::parse("/100%/{id}").unwrap().format_string(), "/100%%/%s");
    assert!(PathTemplate::parse("/items/{id").is_none());
    assert!(PathTemplate::parse("/items/id}").is_none());
  }

  #[test]
  fn method_values_win_over_defaults() {
    let default = settings(serde_json::json!({"Exclude": {"value": true}, "Logging": {"value": true}}));
    let own = settings(serde_json::json!({"Exclude": {"value": false}, "RESTMethod": {"value": "post"}}));
    let merged = MethodOption::merge("b", "CreateItem", Some(&own), Some(&default), false).unwrap();
    assert!(!merged.exclude);
    assert!(merged.logging);
    assert_eq!(merged.rest_method, "POST");
    assert_eq!(merged.path.raw(), "/b/create-item");
    assert_eq!(merged.multipart_max_memory, DEFAULT_MULTIPART_MAX_MEMORY);

    let merged = MethodOption::merge("", "Get", None, Some(&default), true).unwrap();
    assert!(merged.exclude);
    assert_eq!(merged.rest_method, "POST");
    assert_eq!(merged.path.raw(), "/get");
  }

  #[test]
  fn explicit_paths_join_the_namespace() {
    let own = settings(serde_json::json!({"RESTPath": {"value": "/items/{id}"}}));
    let merged = MethodOption::merge("app", "Get", Some(&own), None, false).unwrap();
    assert_eq!(merged.path.raw(), "/app/items/{id}");
    let own = settings(serde_json::json!({"RESTPath": {"value": "items//{id}/"}}));
    assert_eq!(MethodOption::merge("", "Get", Some(&own), None, false).unwrap().path.raw(), "/items/{id}");
    assert_eq!(MethodOption::merge("app", "GetItem", None, None, false).unwrap().path.raw(), "/app/get-item");
  }

  #[test]
  fn parses_var_pairs() {
    let pairs = var_pairs("RESTQueryVars", &["filter".into(), "!q".into(), ":v1".into(), "version".into()]).unwrap();
    assert_eq!(
      pairs,
      vec![
        VarPair { param: "filter".into(), external: "q".into(), required: true, constant: false },
        VarPair { param: "v1".into(), external: "version".into(), required: false, constant: true },
      ]
    );
    assert!(var_pairs("RESTQueryVars", &["filter".into()]).is_err());

    let own = settings(serde_json::json!({"RESTPath": {"value": "/items/{id"}}));
    assert_eq!(
      MethodOption::merge("", "Get", Some(&own), None, false).unwrap_err(),
      MergeError::Template("/items/{id".to_owned())
    );
  }

  #[test]
  fn lifts_the_service_wrapper() {
    let mut inner = OptionValue::map();
    inner.insert("HTTPServer", OptionValue::map());
    inner.push_repeat("Interface", OptionValue::String("a".to_owned()));
    let mut tree = OptionValue::map();
    tree.insert("Service", inner);
    tree.push_repeat("Interface", OptionValue::String("b".to_owned()));
    let flat = flatten_service(&tree);
    assert_eq!(flat.get("HTTPServer"), Some(&OptionValue::map()));
    assert_eq!(
      flat.get("Interface"),
      Some(&OptionValue::List(vec![OptionValue::String("a".to_owned()), OptionValue::String("b".to_owned())]))
    );
    let options: Options = from_tree("Gokit", &OptionValue::map()).unwrap();
    assert!(options.interfaces.is_empty());
  }
}

use serde_json::{json, Map, Value};

use crate::error::SwipeError;
use crate::finder::{ErrorDef, ErrorKind};
use crate::importer::Importer;
use crate::model::Universe;
use crate::plugin::Generator;

use super::options::BodyType;
use super::samples::Schemas;
use super::service::{Method, Response, Service};
use super::{Config, OpenapiConfig};

const FILENAME: &str = "openapi.json";

/// Codes every JSON-RPC 2.0 server may answer with.
const RPC_ERRORS: &[(i64, &str)] = &[
  (-32700, "ParseError"),
  (-32600, "InvalidRequestError"),
  (-32601, "MethodNotFoundError"),
  (-32602, "InvalidParamsError"),
  (-32603, "InternalError"),
];

/// OpenAPI 3 document of the REST or JSON-RPC surface.
pub(crate) struct OpenapiGenerator<'a> {
  pub cfg: &'a Config,
  pub openapi: &'a OpenapiConfig,
}

fn object(properties: Map<String, Value>) -> Value {
  json!({"type": "object", "properties": properties})
}

fn wrap(keys: &[String], inner: Value) -> Value {
  keys.iter().rev().fold(inner, |acc, key| {
    let mut properties = Map::new();
    properties.insert(key.clone(), acc);
    object(properties)
  })
}

fn json_content(schema: Value) -> Value {
  json!({"application/json": {"schema": schema}})
}

fn schema_ref(name: &str) -> Value {
  json!({"$ref": format!("#/components/schemas/{}", name)})
}

fn rpc_error_schema(code: i64) -> Value {
  json!({
    "type": "object",
    "properties": {
      "jsonrpc": {"type": "string", "example": "2.0"},
      "id": {"type": "string", "example": "1"},
      "error": {
        "type": "object",
        "properties": {
          "code": {"type": "integer", "example": code},
          "message": {"type": "string"},
          "data": {"type": "object"},
        },
      },
    },
  })
}

fn rest_error_schema() -> Value {
  json!({
    "type": "object",
    "properties": {
      "error": {"type": "string"},
      "data": {"type": "object"},
    },
  })
}

struct Document<'u> {
  universe: &'u Universe,
  schemas: Schemas,
  paths: Map<String, Value>,
  excluded: Map<String, Value>,
}

impl Document<'_> {
  fn params_schema(&mut self, vars: &[&crate::model::VarType]) -> Value {
    let vars = vars.iter().map(|it| (it.name.lower.clone(), &it.ty)).collect::<Vec<_>>();
    self.schemas.properties(vars, self.universe)
  }

  fn result_schema(&mut self, method: &Method) -> Option<Value> {
    match method.response() {
      Response::None => None,
      Response::Single(var) => Some(self.schemas.schema(&var.ty, self.universe)),
      Response::Struct => {
        let results = method.results.iter().collect::<Vec<_>>();
        Some(self.params_schema(&results))
      }
    }
  }

  fn base_operation(&self, svc: &Service, method: &Method) -> Map<String, Value> {
    let mut op = Map::new();
    op.insert("operationId".to_owned(), json!(format!("{}.{}", svc.name, method.name)));
    if let Some(summary) = method.func.comment.lines().map(str::trim).find(|it| !it.is_empty()) {
      op.insert("summary".to_owned(), json!(summary));
    }
    if !method.tags.is_empty() {
      op.insert("tags".to_owned(), json!(method.tags));
    }
    op
  }

  fn declared_error(&mut self, error: &ErrorDef, schema: Value) -> Value {
    self.schemas.defs.entry(error.name.clone()).or_insert(schema);
    json!({"description": error.name, "content": json_content(schema_ref(&error.name))})
  }

  fn rest_operation(&mut self, svc: &Service, method: &Method) -> (String, String, Value) {
    let mut op = self.base_operation(svc, method);
    let mut parameters = Vec::new();
    for var in method.opt.path.vars() {
      if let Some(param) = method.param(&var.name) {
        let schema = self.schemas.schema(&param.ty, self.universe);
        parameters.push(json!({"in": "path", "name": var.name, "required": true, "schema": schema}));
      }
    }
    for (place, pairs) in [("query", &method.opt.query_vars), ("header", &method.opt.header_vars)] {
      for pair in pairs.iter().filter(|it| !it.constant) {
        if let Some(param) = method.param(&pair.param) {
          let schema = self.schemas.schema(&param.ty, self.universe);
          parameters.push(json!({"in": place, "name": pair.external, "required": pair.required, "schema": schema}));
        }
      }
    }
    if !parameters.is_empty() {
      op.insert("parameters".to_owned(), Value::Array(parameters));
    }

    let body = method.body_params();
    if method.opt.has_body() && !body.is_empty() {
      let schema = wrap(&method.opt.wrap_request, self.params_schema(&body));
      let content_type = match method.opt.body_type {
        BodyType::Json => "application/json",
        BodyType::FormData => "multipart/form-data",
        BodyType::UrlEncoded => "application/x-www-form-urlencoded",
      };
      let mut content = Map::new();
      content.insert(content_type.to_owned(), json!({"schema": schema}));
      op.insert("requestBody".to_owned(), json!({"content": content}));
    }

    let mut responses = Map::new();
    match self.result_schema(method) {
      Some(schema) => {
        let schema = wrap(&method.opt.wrap_response, schema);
        responses.insert("200".to_owned(), json!({"description": "OK", "content": json_content(schema)}));
      }
      None => {
        responses.insert("201".to_owned(), json!({"description": "Created"}));
      }
    }
    for error in method.errors_of(ErrorKind::Rest) {
      let response = self.declared_error(error, rest_error_schema());
      responses.insert(error.code.to_string(), response);
    }
    op.insert("responses".to_owned(), Value::Object(responses));
    (method.opt.path.plain(), method.opt.rest_method.to_lowercase(), Value::Object(op))
  }

  fn rpc_operation(&mut self, svc: &Service, method: &Method) -> (String, String, Value) {
    let mut op = self.base_operation(svc, method);
    let rpc_name = method.rpc_name(svc);
    let params = self.params_schema(&method.params.iter().collect::<Vec<_>>());
    let params = wrap(&method.opt.wrap_request, params);
    let request = json!({
      "type": "object",
      "properties": {
        "jsonrpc": {"type": "string", "example": "2.0"},
        "id": {"type": "string", "example": "1"},
        "method": {"type": "string", "enum": [rpc_name]},
        "params": params,
      },
    });
    op.insert("requestBody".to_owned(), json!({"content": json_content(request)}));

    let result = self.result_schema(method).unwrap_or_else(|| json!({"type": "object", "nullable": true}));
    let result = wrap(&method.opt.wrap_response, result);
    let mut responses = Map::new();
    let success = json!({
      "type": "object",
      "properties": {
        "jsonrpc": {"type": "string", "example": "2.0"},
        "id": {"type": "string", "example": "1"},
        "result": result,
      },
    });
    responses.insert("200".to_owned(), json!({"description": "OK", "content": json_content(success)}));
    for (code, name) in RPC_ERRORS {
      self.schemas.defs.entry((*name).to_owned()).or_insert_with(|| rpc_error_schema(*code));
      responses.insert(format!("x{}", code), json!({"description": name, "content": json_content(schema_ref(name))}));
    }
    for error in method.errors_of(ErrorKind::JsonRpc) {
      let response = self.declared_error(error, rpc_error_schema(error.code));
      responses.insert(format!("x{}", error.code), response);
    }
    op.insert("responses".to_owned(), Value::Object(responses));
    (format!("/{}", rpc_name), "post".to_owned(), Value::Object(op))
  }
}

fn insert_operation(paths: &mut Map<String, Value>, path: String, verb: String, op: Value) {
  let entry = paths.entry(path).or_insert_with(|| json!({}));
  if let Value::Object(verbs) = entry {
    verbs.insert(verb, op);
  }
}

impl Generator for OpenapiGenerator<'_> {
  fn filename(&self) -> &str {
    FILENAME
  }

  fn output_dir(&self) -> &str {
    &self.openapi.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut doc = Document {
      universe: importer.universe(),
      schemas: Schemas::default(),
      paths: Map::new(),
      excluded: Map::new(),
    };
    for svc in &self.cfg.services {
      for method in &svc.methods {
        let (path, verb, op) = if self.cfg.json_rpc {
          doc.rpc_operation(svc, method)
        } else {
          doc.rest_operation(svc, method)
        };
        let target = if method.opt.exclude { &mut doc.excluded } else { &mut doc.paths };
        insert_operation(target, path, verb, op);
      }
    }

    let info = &self.openapi.info;
    let mut info_json = json!({"title": info.title, "description": info.description, "version": info.version});
    if let Some(contact) = &self.openapi.contact {
      info_json["contact"] = json!({"name": contact.name, "email": contact.email, "url": contact.url});
    }
    if let Some(licence) = &self.openapi.licence {
      info_json["license"] = json!({"name": licence.name, "url": licence.url});
    }
    let servers = self
      .openapi
      .servers
      .iter()
      .map(|it| json!({"description": it.description, "url": it.url}))
      .collect::<Vec<_>>();

    let mut root = json!({
      "openapi": "3.0.0",
      "info": info_json,
      "servers": servers,
      "paths": doc.paths,
      "components": {"schemas": doc.schemas.defs},
    });
    if !doc.excluded.is_empty() {
      root["x-excluded"] = Value::Object(doc.excluded);
    }
    serde_json::to_string_pretty(&root).map_err(|err| SwipeError::emit(FILENAME, err.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::Value;
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  fn document(files: &std::collections::BTreeMap<String, String>) -> Value {
    serde_json::from_str(&files["swipe_gen_gokit_openapi.json"]).unwrap()
  }

  #[test]
  fn rest_paths_carry_parameters_and_errors() {
    let files = fixtures::emit(
      r#"HTTPServer(), OpenapiEnable(), OpenapiInfo("items", "", "1.0.0"), Interface((*App)(nil), ""),
      MethodOptions(App.Get, RESTPath("/items/{id:[0-9]+}"), RESTQueryVars([]string{"filter", "q"}), RESTWrapResponse("data.value")),
      OpenapiTags([]interface{}{App.Get}, []string{"items"}),"#,
    );
    let doc = document(&files);
    assert_eq!(doc["openapi"], "3.0.0");
    assert_eq!(doc["info"]["title"], "items");
    let get = &doc["paths"]["/items/{id}"]["get"];
    assert_eq!(get["tags"][0], "items");
    assert_eq!(get["parameters"][0]["in"], "path");
    assert_eq!(get["parameters"][0]["name"], "id");
    assert_eq!(get["parameters"][0]["schema"]["format"], "int64");
    assert_eq!(get["parameters"][1]["in"], "query");
    assert_eq!(get["parameters"][1]["name"], "q");
    let schema = &get["responses"]["200"]["content"]["application/json"]["schema"];
    assert_eq!(schema["properties"]["data"]["properties"]["value"]["$ref"], "#/components/schemas/Item");
    assert_eq!(get["responses"]["404"]["content"]["application/json"]["schema"]["$ref"], "#/components/schemas/NotFound");
    assert!(doc["components"]["schemas"]["NotFound"].is_object());
    assert_eq!(doc["components"]["schemas"]["Item"]["properties"]["tags"]["type"], "array");

    let create = &doc["paths"]["/create"]["post"];
    assert!(create.is_null());
    let create = &doc["paths"]["/create"]["get"];
    assert_eq!(create["responses"]["201"]["description"], "Created");
    assert_eq!(create["responses"]["400"]["content"]["application/json"]["schema"]["$ref"], "#/components/schemas/Invalid");
  }

  #[test]
  fn posted_bodies_become_request_bodies() {
    let files = fixtures::emit(
      "HTTPServer(), OpenapiEnable(), Interface((*App)(nil), \"\"), MethodOptions(App.Create, RESTMethod(\"POST\")),",
    );
    let doc = document(&files);
    let schema = &doc["paths"]["/create"]["post"]["requestBody"]["content"]["application/json"]["schema"];
    assert_eq!(schema["properties"]["name"]["type"], "string");
    assert_eq!(schema["properties"]["data"]["format"], "byte");
    assert_eq!(doc["paths"]["/create"]["post"]["summary"], "Create stores a new item.");
  }

  #[test]
  fn excluded_rpc_methods_are_listed_apart() {
    let files = fixtures::emit_source(
      fixtures::TWO,
      r#"HTTPServer(), JSONRPCEnable(), ClientsEnable([]string{"go"}), OpenapiEnable(),
      Interface((*InterfaceA)(nil), "a", Gateway()), Interface((*InterfaceB)(nil), "b", Gateway()),
      MethodDefaultOptions(Exclude(true)), MethodOptions(InterfaceB.Create, Exclude(false)),"#,
    );
    let doc = document(&files);
    let paths = doc["paths"].as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    assert_eq!(paths, vec!["/b.create"]);
    let excluded = doc["x-excluded"].as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    assert_eq!(excluded, vec!["/a.create", "/a.get", "/b.delete"]);
    let op = &doc["paths"]["/b.create"]["post"];
    let request = &op["requestBody"]["content"]["application/json"]["schema"];
    assert_eq!(request["properties"]["method"]["enum"][0], "b.create");
    assert_eq!(op["responses"]["x-32700"]["content"]["application/json"]["schema"]["$ref"], "#/components/schemas/ParseError");
  }
}

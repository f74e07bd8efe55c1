use serde_json::{json, Map, Value};

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::model::{Universe, VarType};
use crate::plugin::Generator;

use super::options::BodyType;
use super::samples::sample;
use super::service::{Method, Service};
use super::Config;

/// Markdown page with one `curl` call per exposed method.
pub(crate) struct CurlGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
  pub url: &'a str,
}

fn text(value: &Value) -> String {
  match value {
    Value::String(it) => it.clone(),
    other => other.to_string(),
  }
}

fn body_object(vars: &[&VarType], universe: &Universe) -> Map<String, Value> {
  vars.iter().map(|it| (it.name.lower.clone(), sample(&it.ty, universe))).collect()
}

fn wrap(keys: &[String], inner: Value) -> Value {
  keys.iter().rev().fold(inner, |acc, key| {
    let mut object = Map::new();
    object.insert(key.clone(), acc);
    Value::Object(object)
  })
}

impl CurlGenerator<'_> {
  fn rest_command(&self, universe: &Universe, method: &Method) -> Vec<String> {
    let value_of = |name: &str| method.param(name).map(|it| text(&sample(&it.ty, universe))).unwrap_or_default();
    let mut url = format!("{}{}", self.url.trim_end_matches('/'), method.opt.path.fill(|var| value_of(&var.name)));
    let mut query = Vec::new();
    for pair in &method.opt.query_vars {
      let value = if pair.constant { pair.param.clone() } else { value_of(&pair.param) };
      query.push(format!("{}={}", pair.external, value));
    }
    query.extend(method.opt.query_values.iter().map(|(key, value)| format!("{}={}", key, value)));
    if !query.is_empty() {
      url.push('?');
      url.push_str(&query.join("&"));
    }

    let mut lines = vec![format!("curl -X {} '{}'", method.opt.rest_method, url)];
    for pair in &method.opt.header_vars {
      let value = if pair.constant { pair.param.clone() } else { value_of(&pair.param) };
      lines.push(format!("-H '{}: {}'", pair.external, value));
    }
    let body = method.body_params();
    if method.opt.has_body() && !body.is_empty() {
      match method.opt.body_type {
        BodyType::Json => {
          let object = wrap(&method.opt.wrap_request, Value::Object(body_object(&body, universe)));
          lines.push("-H 'Content-Type: application/json'".to_owned());
          lines.push(format!("-d '{}'", object));
        }
        BodyType::FormData => {
          for var in &body {
            lines.push(format!("-F '{}={}'", var.name.lower, text(&sample(&var.ty, universe))));
          }
        }
        BodyType::UrlEncoded => {
          for var in &body {
            lines.push(format!("--data-urlencode '{}={}'", var.name.lower, text(&sample(&var.ty, universe))));
          }
        }
      }
    }
    lines
  }

  fn rpc_command(&self, universe: &Universe, svc: &Service, method: &Method) -> Vec<String> {
    let params = method.params.iter().collect::<Vec<_>>();
    let params = wrap(&method.opt.wrap_request, Value::Object(body_object(&params, universe)));
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": method.rpc_name(svc), "params": params});
    vec![
      format!("curl -X POST '{}{}'", self.url.trim_end_matches('/'), self.cfg.jsonrpc_path),
      "-H 'Content-Type: application/json'".to_owned(),
      format!("-d '{}'", request),
    ]
  }
}

impl Generator for CurlGenerator<'_> {
  fn filename(&self) -> &str {
    "curl.md"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let universe = importer.universe();
    let mut out = format!("# {} cURL examples\n", self.cfg.app_name);
    for svc in &self.cfg.services {
      out.push_str(&format!("\n## {}\n", svc.name));
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        out.push_str(&format!("\n### {}\n\n", method.name));
        if !method.func.comment.is_empty() {
          out.push_str(&format!("{}\n\n", method.func.comment));
        }
        let lines = if self.cfg.json_rpc {
          self.rpc_command(universe, svc, method)
        } else {
          self.rest_command(universe, method)
        };
        out.push_str("```sh\n");
        out.push_str(&lines.join(" \\\n  "));
        out.push_str("\n```\n");
      }
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn rest_calls_use_sample_values() {
    let files = fixtures::emit(
      r#"HTTPServer(), CURLEnable(), Interface((*App)(nil), ""),
      MethodOptions(App.Create, RESTMethod("POST")),
      MethodOptions(App.Get, RESTPath("/items/{id:[0-9]+}"), RESTQueryVars([]string{"filter", "q"})),"#,
    );
    let out = &files["swipe_gen_gokit_curl.md"];
    assert!(out.starts_with("# App cURL examples\n\n## App\n"));
    assert!(out.contains(
      "### Create\n\nCreate stores a new item.\n\n```sh\ncurl -X POST 'http://localhost:8080/create' \\\n  -H 'Content-Type: application/json' \\\n  -d '{\"data\":\"Ynl0ZXM=\",\"name\":\"string\"}'\n```\n"
    ));
    assert!(out.contains("curl -X GET 'http://localhost:8080/items/1?q=string'\n"));
  }

  #[test]
  fn rpc_calls_post_envelopes() {
    let files = fixtures::emit(
      r#"HTTPServer(), JSONRPCEnable(), CURLEnable(), CURLURL("https://api.example.com/"), CURLOutput("docs"), Interface((*App)(nil), "app"),"#,
    );
    let out = &files["docs/swipe_gen_gokit_curl.md"];
    assert!(out.contains(
      "curl -X POST 'https://api.example.com/' \\\n  -H 'Content-Type: application/json' \\\n  -d '{\"id\":1,\"jsonrpc\":\"2.0\",\"method\":\"app.get\",\"params\":{\"filter\":\"string\",\"id\":1}}'\n"
    ));
  }
}

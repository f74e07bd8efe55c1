use std::collections::{BTreeMap, HashSet};

use crate::error::SwipeError;
use crate::finder::ErrorKind;
use crate::importer::Importer;
use crate::model::{NamedId, Type, Universe};
use crate::plugin::Generator;

use super::samples::{has_typedef, js_type, json_fields};
use super::service::{Method, Response, Service};
use super::Config;

const PRELUDE: &str = r#"export class JSONRPCError extends Error {
  constructor(message, name, code, data) {
    super(message);
    this.name = name;
    this.code = code;
    this.data = data;
  }
}

/**
 * Sends every request scheduled in the same microtask as one batch.
 */
export class JSONRPCScheduler {
  /**
   * @param {function(Array<Object>): PromiseLike<Array<Object>>} transport
   */
  constructor(transport) {
    this._transport = transport;
    this._requestID = 0;
    this._scheduled = {};
    this._commitScheduled = false;
    this._beforeRequest = null;
  }

  /**
   * @param {function(Array<Object>): Array<Object>} fn
   */
  beforeRequest(fn) {
    this._beforeRequest = fn;
  }

  __scheduleCommit() {
    if (this._commitScheduled) {
      return;
    }
    this._commitScheduled = true;
    queueMicrotask(() => {
      this._commitScheduled = false;
      const scheduled = this._scheduled;
      this._scheduled = {};
      let requests = Object.values(scheduled).map((it) => it.request);
      if (this._beforeRequest) {
        requests = this._beforeRequest(requests);
      }
      this.__commit(requests, scheduled);
    });
  }

  __scheduleRequest(method, params) {
    const request = { jsonrpc: "2.0", id: ++this._requestID, method: method, params: params };
    return new Promise((resolve, reject) => {
      this._scheduled[request.id] = { request: request, resolve: resolve, reject: reject };
      this.__scheduleCommit();
    });
  }

  __commit(requests, scheduled) {
    this._transport(requests)
      .then((responses) => {
        for (const response of responses) {
          const entry = scheduled[response.id];
          if (!entry) {
            continue;
          }
          if (response.error) {
            entry.reject(response.error);
          } else {
            entry.resolve(response.result);
          }
        }
      })
      .catch((e) => {
        for (const key in scheduled) {
          scheduled[key].reject(e);
        }
      });
  }
}

/**
 * @param {string} url
 * @param {Object<string, string>} headers
 */
export function httpTransport(url, headers = {}) {
  return (requests) =>
    fetch(url, {
      method: "POST",
      headers: { "Content-Type": "application/json", ...headers },
      body: JSON.stringify(requests),
    }).then((response) => response.json());
}
"#;

/// JavaScript JSON-RPC client with JSDoc types.
pub(crate) struct JsClientGenerator<'a> {
  pub cfg: &'a Config,
}

fn error_class(name: &str) -> String {
  if name.ends_with("Error") {
    name.to_owned()
  } else {
    format!("{}Error", name)
  }
}

/// Named struct, map and slice types reachable from the exposed methods.
#[derive(Default)]
struct Typedefs {
  seen: HashSet<NamedId>,
  order: Vec<NamedId>,
}

impl Typedefs {
  fn collect(&mut self, ty: &Type, universe: &Universe) {
    if has_typedef(ty, universe) {
      let Some(named) = ty.named(universe) else { return };
      if !self.seen.insert(named.id) {
        return;
      }
      self.order.push(named.id);
      self.children(&named.underlying, universe);
    } else if ty.named(universe).is_none() {
      self.children(ty, universe);
    }
  }

  fn children(&mut self, ty: &Type, universe: &Universe) {
    match ty {
      Type::Struct(st) => {
        for field in json_fields(st, universe) {
          self.collect(&field.var.ty, universe);
        }
      }
      Type::Slice(it) => self.collect(&it.value, universe),
      Type::Array(it) => self.collect(&it.value, universe),
      Type::Map(it) => {
        self.collect(&it.key, universe);
        self.collect(&it.value, universe);
      }
      _ => {}
    }
  }

  fn render(&self, out: &mut String, universe: &Universe) {
    for id in &self.order {
      let named = universe.get(*id);
      out.push_str("/**\n");
      match &named.underlying {
        Type::Struct(st) => {
          out.push_str(&format!(" * @typedef {{Object}} {}\n", named.name));
          for field in json_fields(st, universe) {
            out.push_str(&format!(" * @property {{{}}} {}\n", js_type(&field.var.ty, universe), field.json_name()));
          }
        }
        underlying => out.push_str(&format!(" * @typedef {{{}}} {}\n", js_type(underlying, universe), named.name)),
      }
      out.push_str(" */\n\n");
    }
  }
}

impl JsClientGenerator<'_> {
  fn write_convert_error(&self, out: &mut String, svc: &Service, method: &Method) {
    out.push_str(&format!("function {}{}ConvertError(e) {{\n", svc.lc, method.name.upper));
    out.push_str("  switch (e.code) {\n");
    out.push_str("    default:\n");
    out.push_str("      return new JSONRPCError(e.message, \"UnknownError\", e.code, e.data);\n");
    for error in method.errors_of(ErrorKind::JsonRpc) {
      out.push_str(&format!("    case {}:\n", error.code));
      out.push_str(&format!("      return new {}(e.message, e.data);\n", error_class(&error.name)));
    }
    out.push_str("  }\n}\n\n");
  }

  fn write_method(&self, out: &mut String, universe: &Universe, svc: &Service, method: &Method) {
    let result = match method.response() {
      Response::None => "void".to_owned(),
      Response::Single(var) => js_type(&var.ty, universe),
      Response::Struct => {
        let fields = method
          .results
          .iter()
          .map(|it| format!("{}: {}", it.name.lower, js_type(&it.ty, universe)))
          .collect::<Vec<_>>();
        format!("{{{}}}", fields.join(", "))
      }
    };
    out.push_str("  /**\n");
    for line in method.func.comment.lines() {
      if line.is_empty() {
        out.push_str("   *\n");
      } else {
        out.push_str(&format!("   * {}\n", line));
      }
    }
    for param in &method.params {
      out.push_str(&format!("   * @param {{{}}} {}\n", js_type(&param.ty, universe), param.name.lower));
    }
    out.push_str(&format!("   * @return {{PromiseLike<{}>}}\n", result));
    out.push_str("   */\n");

    let args = method.params.iter().map(|it| it.name.lower.clone()).collect::<Vec<_>>();
    let fields = args.iter().map(|it| format!("{0}: {0}", it)).collect::<Vec<_>>();
    let params = method
      .opt
      .wrap_request
      .iter()
      .rev()
      .fold(
        if fields.is_empty() { "{}".to_owned() } else { format!("{{ {} }}", fields.join(", ")) },
        |acc, key| format!("{{ {}: {} }}", key, acc),
      );
    out.push_str(&format!("  {}({}) {{\n", method.name.lower, args.join(", ")));
    out.push_str(&format!("    return this.scheduler\n      .__scheduleRequest({:?}, {})\n", method.rpc_name(svc), params));
    if !method.opt.wrap_response.is_empty() {
      let selector = method.opt.wrap_response.iter().map(|it| format!(".{}", it)).collect::<String>();
      out.push_str(&format!("      .then((result) => result{})\n", selector));
    }
    out.push_str("      .catch((e) => {\n");
    out.push_str(&format!("        throw {}{}ConvertError(e);\n", svc.lc, method.name.upper));
    out.push_str("      });\n");
    out.push_str("  }\n\n");
  }
}

impl Generator for JsClientGenerator<'_> {
  fn filename(&self) -> &str {
    "jsonrpc_client.js"
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let universe = importer.universe();
    let mut out = String::new();
    out.push_str(PRELUDE);
    out.push('\n');

    let classes = self
      .cfg
      .services
      .iter()
      .flat_map(|it| &it.methods)
      .filter(|it| !it.opt.exclude)
      .flat_map(|it| it.errors_of(ErrorKind::JsonRpc))
      .map(|it| (error_class(&it.name), it.code))
      .collect::<BTreeMap<_, _>>();
    for (class, code) in &classes {
      out.push_str(&format!("export class {} extends JSONRPCError {{\n", class));
      out.push_str("  constructor(message, data) {\n");
      out.push_str(&format!("    super(message, {:?}, {}, data);\n", class, code));
      out.push_str("  }\n}\n\n");
    }

    let mut typedefs = Typedefs::default();
    for svc in &self.cfg.services {
      let methods = svc.methods.iter().filter(|it| !it.opt.exclude).collect::<Vec<_>>();
      for method in &methods {
        for var in method.params.iter().chain(&method.results) {
          typedefs.collect(&var.ty, universe);
        }
        self.write_convert_error(&mut out, svc, method);
      }
      out.push_str(&format!("export class JSONRPCClient{} {{\n", svc.uc));
      out.push_str("  /**\n   * @param {JSONRPCScheduler} scheduler\n   */\n");
      out.push_str("  constructor(scheduler) {\n    this.scheduler = scheduler;\n  }\n\n");
      for method in &methods {
        self.write_method(&mut out, universe, svc, method);
      }
      out.truncate(out.trim_end().len());
      out.push_str("\n}\n\n");
    }

    if self.cfg.services.len() > 1 {
      out.push_str("export class JSONRPCClient {\n");
      out.push_str("  /**\n   * @param {function(Array<Object>): PromiseLike<Array<Object>>} transport\n   */\n");
      out.push_str("  constructor(transport) {\n");
      out.push_str("    this.scheduler = new JSONRPCScheduler(transport);\n");
      for svc in &self.cfg.services {
        out.push_str(&format!("    this.{} = new JSONRPCClient{}(this.scheduler);\n", svc.lc, svc.uc));
      }
      out.push_str("  }\n}\n\n");
    }

    typedefs.render(&mut out, universe);
    out.truncate(out.trim_end().len());
    out.push('\n');
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn schedules_namespaced_requests() {
    let files = fixtures::emit(
      r#"HTTPServer(), JSONRPCEnable(), ClientsEnable([]string{"js"}), Interface((*App)(nil), "app"),
      MethodOptions(App.Get, RESTWrapResponse("data")),"#,
    );
    let out = &files["swipe_gen_gokit_jsonrpc_client.js"];
    assert!(out.starts_with("export class JSONRPCError extends Error {\n"));
    assert!(out.contains("export class NotFoundError extends JSONRPCError {\n  constructor(message, data) {\n    super(message, \"NotFoundError\", -32001, data);\n"));
    assert!(out.contains("export class JSONRPCClientApp {\n"));
    assert!(out.contains("   * Create stores a new item.\n   * @param {string} name\n   * @param {string} data\n   * @return {PromiseLike<void>}\n"));
    assert!(out.contains("  get(id, filter) {\n    return this.scheduler\n      .__scheduleRequest(\"app.get\", { id: id, filter: filter })\n      .then((result) => result.data)\n"));
    assert!(out.contains("    case -32001:\n      return new NotFoundError(e.message, e.data);\n"));
    assert!(out.contains("   * @return {PromiseLike<{r1: Array<Item>, r2: number}>}\n"));
    assert!(out.contains(" * @typedef {Object} Item\n * @property {number} id\n * @property {string} name\n * @property {Array<string>} tags\n"));
    assert!(!out.contains("export class JSONRPCClient {"));
  }

  #[test]
  fn composite_client_spans_interfaces() {
    let files = fixtures::emit_source(
      fixtures::TWO,
      r#"HTTPServer(), JSONRPCEnable(), ClientsEnable([]string{"js"}), Interface((*InterfaceA)(nil), "a"), Interface((*InterfaceB)(nil), "b"),"#,
    );
    let out = &files["swipe_gen_gokit_jsonrpc_client.js"];
    assert!(out.contains("    this.interfaceA = new JSONRPCClientInterfaceA(this.scheduler);\n"));
    assert!(out.contains("    this.interfaceB = new JSONRPCClientInterfaceB(this.scheduler);\n"));
    assert!(out.contains(".__scheduleRequest(\"b.delete\", { id: id })"));
  }
}

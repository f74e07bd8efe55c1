use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::service::{wrap_selector, wrap_struct, Method, Service};
use super::{check_func, Config};

const FILENAME: &str = "jsonrpc_server.go";

/// Endpoint codecs keyed by JSON-RPC method name and the HTTP handler
/// serving them.
pub(crate) struct JsonRpcServerGenerator<'a> {
  pub cfg: &'a Config,
}

impl JsonRpcServerGenerator<'_> {
  fn write_codec(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) -> Result<(), SwipeError> {
    let context = importer.import("context", "context");
    let json = importer.import("json", "encoding/json");
    let fmt = importer.import("fmt", "fmt");
    let jsonrpc = self.cfg.server_transport(importer);

    w.push_str(&format!("ecm[{:?}] = {}.EndpointCodec{{\n", method.rpc_name(svc), jsonrpc));
    w.push_str(&format!("Endpoint: ep.{},\n", method.endpoint_field()));

    match &method.opt.server_decode_request {
      Some(func) => {
        check_func(FILENAME, "ServerDecodeRequest", func, 2, 2)?;
        w.push_str(&format!("Decode: {},\n", importer.func_ref(func)));
      }
      None => {
        w.push_str(&format!("Decode: func(_ {}.Context, msg {}.RawMessage) (interface{{}}, error) {{\n", context, json));
        if method.has_request() {
          let request = method.request(svc);
          let keys = &method.opt.wrap_request;
          let target = if keys.is_empty() { "req" } else { "body" };
          w.push_str(&format!("var {} {}\n", target, wrap_struct(keys, &request)));
          w.push_str(&format!("if err := {}.Unmarshal(msg, &{}); err != nil {{\n", json, target));
          w.push_str(&format!("return nil, {}.Errorf(\"couldn't unmarshal body to {}: %w\", err)\n", fmt, request));
          w.push_str("}\n");
          if keys.is_empty() {
            w.push_str("return &req, nil\n");
          } else {
            w.push_str(&format!("req := body{}\n", wrap_selector(keys)));
            w.push_str("return &req, nil\n");
          }
        } else {
          w.push_str("return nil, nil\n");
        }
        w.push_str("},\n");
      }
    }

    match &method.opt.server_encode_response {
      Some(func) => {
        check_func(FILENAME, "ServerEncodeResponse", func, 2, 2)?;
        w.push_str(&format!("Encode: {},\n", importer.func_ref(func)));
      }
      None => {
        w.push_str(&format!("Encode: func(_ {}.Context, result interface{{}}) ({}.RawMessage, error) {{\n", context, json));
        let payload = method
          .opt
          .wrap_response
          .iter()
          .rev()
          .fold("result".to_owned(), |acc, key| format!("map[string]interface{{}}{{{:?}: {}}}", key, acc));
        w.push_str(&format!("b, err := {}.Marshal({})\n", json, payload));
        w.write_check_err("err", |w| {
          w.push_str(&format!("return nil, {}.Errorf(\"couldn't marshal response: %w\", err)\n", fmt))
        });
        w.push_str("return b, nil\n");
        w.push_str("},\n");
      }
    }
    w.push_str("}\n");
    Ok(())
  }
}

impl Generator for JsonRpcServerGenerator<'_> {
  fn filename(&self) -> &str {
    FILENAME
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let jsonrpc = self.cfg.server_transport(importer);
    let codec_map = format!("{}.EndpointCodecMap", jsonrpc);

    for svc in self.cfg.services.iter().filter(|it| it.is_active()) {
      let mut body = GoWriter::new();
      body.push_str(&format!("ecm := {}{{}}\n", codec_map));
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        self.write_codec(&mut body, importer, svc, method)?;
      }
      body.push_str("return ecm\n");
      let body = body.into_string();
      let signature = format!("(ep {}) {}", svc.endpoint_set(), codec_map);
      w.write_func(&format!("make{}EndpointCodecMap", svc.uc), None, &signature, |w| w.push_str(&body));
    }

    w.write_func("mergeEndpointCodecMaps", None, &format!("(ecms ...{0}) {0}", codec_map), |w| {
      w.push_str(&format!("merged := {}{{}}\n", codec_map));
      w.push_str("for _, ecm := range ecms {\nfor key, codec := range ecm {\nmerged[key] = codec\n}\n}\n");
      w.push_str("return merged\n");
    });

    let mut params = self
      .cfg
      .services
      .iter()
      .map(|svc| format!("{} {}", svc.svc_arg(), svc.iface_type()))
      .collect::<Vec<_>>();
    params.push("options ...ServerOption".to_owned());
    let (result, router) = if self.cfg.http_fast {
      let fasthttp = importer.import("fasthttp", "github.com/valyala/fasthttp");
      let routing = importer.import("routing", "github.com/qiangxue/fasthttp-routing");
      (format!("{}.RequestHandler", fasthttp), format!("{}.New()", routing))
    } else {
      let http = importer.import("http", "net/http");
      let mux = importer.import("mux", "github.com/gorilla/mux");
      (format!("{}.Handler", http), format!("{}.NewRouter()", mux))
    };

    let mut body = GoWriter::new();
    body.push_str("opts := &serverOpts{}\n");
    body.push_str("for _, o := range options {\no(opts)\n}\n");
    let mut maps = Vec::new();
    for svc in self.cfg.services.iter().filter(|it| it.is_active()) {
      let set = format!("{}Endpoints", svc.lc);
      body.push_str(&format!("{} := Make{}({})\n", set, svc.endpoint_set(), svc.svc_arg()));
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        body.push_str(&format!(
          "{0}.{1} = middlewareChain(append(opts.genericEndpointMiddleware, opts.{2}EndpointMiddleware...))({0}.{1})\n",
          set,
          method.endpoint_field(),
          method.option_field(svc)
        ));
      }
      maps.push(format!("make{}EndpointCodecMap({})", svc.uc, set));
    }
    body.push_str(&format!("r := {}\n", router));
    body.push_str(&format!(
      "handler := {}.NewServer(mergeEndpointCodecMaps({}), opts.genericServerOption...)\n",
      jsonrpc,
      maps.join(", ")
    ));
    if self.cfg.http_fast {
      body.push_str(&format!("r.To(\"POST\", {:?}, handler.RouterHandle())\n", self.cfg.jsonrpc_path));
      body.push_str("return r.HandleRequest\n");
    } else {
      body.push_str(&format!("r.Methods(\"POST\").Path({:?}).Handler(handler)\n", self.cfg.jsonrpc_path));
      body.push_str("return r\n");
    }
    let body = body.into_string();
    w.write_func("MakeHandlerJSONRPC", None, &format!("({}) {}", params.join(", "), result), |w| w.push_str(&body));
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn codecs_are_keyed_by_namespace() {
    let files = fixtures::emit(
      "HTTPServer(), JSONRPCEnable(), JSONRPCPath(\"/rpc\"), Interface((*App)(nil), \"app\"), MethodOptions(App.List, Exclude(true)), MethodOptions(App.Get, RESTWrapResponse(\"data\")),",
    );
    let out = &files["swipe_gen_gokit_jsonrpc_server.go"];
    assert!(out.contains("func makeAppEndpointCodecMap(ep AppEndpointSet) jsonrpc.EndpointCodecMap {\n"));
    assert!(out.contains("ecm[\"app.create\"] = jsonrpc.EndpointCodec{\nEndpoint: ep.CreateEndpoint,\n"));
    assert!(out.contains("var req AppCreateRequest\nif err := json.Unmarshal(msg, &req); err != nil {\n"));
    assert!(out.contains("b, err := json.Marshal(map[string]interface{}{\"data\": result})\n"));
    assert!(!out.contains("app.list"));
    assert!(out.contains("handler := jsonrpc.NewServer(mergeEndpointCodecMaps(makeAppEndpointCodecMap(appEndpoints)), opts.genericServerOption...)\n"));
    assert!(out.contains("r.Methods(\"POST\").Path(\"/rpc\").Handler(handler)\n"));
    assert!(!files.contains_key("swipe_gen_gokit_rest.go"));
  }
}

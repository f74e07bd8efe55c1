use crate::error::SwipeError;
use crate::finder::ErrorKind;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::service::{error_value, wrap_selector, wrap_struct, Method, Response, Service};
use super::{check_func, Config};

const FILENAME: &str = "jsonrpc_client.go";

/// JSON-RPC `jsonrpc.Client` wiring of every interface method.
pub(crate) struct JsonRpcClientGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
}

impl JsonRpcClientGenerator<'_> {
  fn write_constructor(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service) -> Result<(), SwipeError> {
    let strings = importer.import("strings", "strings");
    let net = importer.import("net", "net");

    let mut b = GoWriter::new();
    b.push_str("opts := &clientOpts{}\n");
    b.push_str(&format!("c := &{}{{}}\n", svc.client()));
    b.push_str("for _, o := range options {\no(opts)\n}\n");
    b.push_str(&format!("if {}.HasPrefix(tgt, \"[\") {{\n", strings));
    b.push_str(&format!("host, port, err := {}.SplitHostPort(tgt)\n", net));
    b.write_check_err("err", |w| w.push_str("return nil, err\n"));
    b.push_str(&format!("tgt = {}.JoinHostPort(host, port)\n", net));
    b.push_str("}\n");
    b.push_str(&format!("if !{}.Contains(tgt, \"://\") {{\ntgt = \"https://\" + tgt\n}}\n", strings));
    if svc.methods.iter().any(|it| !it.opt.exclude) {
      let url = importer.import("url", "net/url");
      b.push_str(&format!("u, err := {}.Parse(tgt)\n", url));
      b.write_check_err("err", |w| w.push_str("return nil, err\n"));
      if self.cfg.jsonrpc_path != "/" {
        b.push_str(&format!("u.Path += {:?}\n", self.cfg.jsonrpc_path));
      }
    }

    for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
      let field = method.option_field(svc);
      let prefix = method.option_prefix(svc);
      let encode = match &method.opt.client_encode_request {
        Some(func) => {
          check_func(FILENAME, "ClientEncodeRequest", func, 2, 2)?;
          importer.func_ref(func)
        }
        None => format!("encode{}Request", prefix),
      };
      let decode = match &method.opt.client_decode_response {
        Some(func) => {
          check_func(FILENAME, "ClientDecodeResponse", func, 2, 2)?;
          importer.func_ref(func)
        }
        None => format!("decode{}Response", prefix),
      };
      let endpoint = format!("c.{}", method.endpoint_field());
      let jsonrpc = self.cfg.client_transport(importer);
      b.push_str(&format!("{} = {}.NewClient(\nu,\n{:?},\n", endpoint, jsonrpc, method.rpc_name(svc)));
      b.push_str(&format!("append([]{}.ClientOption{{\n", jsonrpc));
      b.push_str(&format!("{}.ClientRequestEncoder({}),\n", jsonrpc, encode));
      b.push_str(&format!("{}.ClientResponseDecoder({}),\n", jsonrpc, decode));
      b.push_str(&format!("}}, append(opts.genericClientOption, opts.{}ClientOption...)...)...,\n", field));
      b.push_str(").Endpoint()\n");
      b.push_str(&format!(
        "{0} = middlewareChain(append(opts.genericEndpointMiddleware, opts.{1}EndpointMiddleware...))({0})\n",
        endpoint, field
      ));
    }
    b.push_str("return c, nil\n");

    let body = b.into_string();
    let signature = format!("(tgt string, options ...ClientOption) (*{}, error)", svc.client());
    w.write_func(&format!("NewClientJSONRPC{}", svc.uc), None, &signature, |w| w.push_str(&body));
    Ok(())
  }

  fn write_encoder(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) {
    let context = importer.import("context", "context");
    let json = importer.import("json", "encoding/json");
    let signature = format!("(_ {}.Context, obj interface{{}}) ({}.RawMessage, error)", context, json);

    let mut b = GoWriter::new();
    if method.has_request() {
      let fmt = importer.import("fmt", "fmt");
      let request = method.request(svc);
      b.push_str(&format!("req, ok := obj.(*{})\n", request));
      b.push_str(&format!(
        "if !ok {{\nreturn nil, {}.Errorf(\"couldn't assert request as *{}, got %T\", obj)\n}}\n",
        fmt, request
      ));
      let payload = method
        .opt
        .wrap_request
        .iter()
        .rev()
        .fold("req".to_owned(), |acc, key| format!("map[string]interface{{}}{{{:?}: {}}}", key, acc));
      b.push_str(&format!("b, err := {}.Marshal({})\n", json, payload));
      b.write_check_err("err", |w| {
        w.push_str(&format!("return nil, {}.Errorf(\"couldn't marshal request %T: %w\", obj, err)\n", fmt))
      });
      b.push_str("return b, nil\n");
    } else {
      b.push_str("return nil, nil\n");
    }
    let body = b.into_string();
    w.write_func(&format!("encode{}Request", method.option_prefix(svc)), None, &signature, |w| w.push_str(&body));
  }

  fn write_decoder(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) -> Result<(), SwipeError> {
    let context = importer.import("context", "context");
    let jsonrpc = self.cfg.client_transport(importer);
    let error_decode = match &method.opt.client_error_decode {
      Some(func) => {
        check_func(FILENAME, "ClientErrorDecode", func, 2, 1)?;
        importer.func_ref(func)
      }
      None => method.error_decode(svc),
    };

    let mut b = GoWriter::new();
    b.push_str(&format!(
      "if response.Error != nil {{\nreturn nil, {}(response.Error.Code, response.Error.Message)\n}}\n",
      error_decode
    ));
    let inner = match method.response() {
      Response::None => None,
      Response::Single(var) => Some(importer.type_string(&var.ty)),
      Response::Struct => Some(method.response_type(svc)),
    };
    match inner {
      None => b.push_str("return nil, nil\n"),
      Some(inner) => {
        let json = importer.import("json", "encoding/json");
        let fmt = importer.import("fmt", "fmt");
        let keys = &method.opt.wrap_response;
        b.push_str(&format!("var resp {}\n", wrap_struct(keys, &inner)));
        b.push_str(&format!("if err := {}.Unmarshal(response.Result, &resp); err != nil {{\n", json));
        b.push_str(&format!("return nil, {}.Errorf(\"couldn't unmarshal body to {}: %w\", err)\n", fmt, inner));
        b.push_str("}\n");
        let value = format!("resp{}", wrap_selector(keys));
        if method.response() == Response::Struct {
          b.push_str(&format!("return &{}, nil\n", value));
        } else {
          b.push_str(&format!("return {}, nil\n", value));
        }
      }
    }

    let body = b.into_string();
    let signature = format!("(_ {}.Context, response {}.Response) (interface{{}}, error)", context, jsonrpc);
    w.write_func(&format!("decode{}Response", method.option_prefix(svc)), None, &signature, |w| w.push_str(&body));
    Ok(())
  }

  fn write_error_decode(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) {
    let cases = method
      .errors_of(ErrorKind::JsonRpc)
      .map(|error| (error.code, error_value(importer, error)))
      .collect::<Vec<_>>();
    w.write_func(&method.error_decode(svc), None, "(code int, message string) (err error)", |w| {
      w.push_str("switch code {\n");
      w.push_str("default:\nerr = &rpcError{code: code, message: message}\n");
      for (code, value) in cases {
        w.push_str(&format!("case {}:\nerr = {}\n", code, value));
      }
      w.push_str("}\n");
      w.push_str("return\n");
    });
  }
}

impl Generator for JsonRpcClientGenerator<'_> {
  fn filename(&self) -> &str {
    FILENAME
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    w.write_type_struct(
      "rpcError",
      &[("code".to_owned(), "int".to_owned()), ("message".to_owned(), "string".to_owned())],
    );
    w.write_func("Error", Some("e *rpcError"), "() string", |w| w.push_str("return e.message\n"));
    w.write_func("ErrorCode", Some("e *rpcError"), "() int", |w| w.push_str("return e.code\n"));

    for svc in &self.cfg.services {
      self.write_constructor(&mut w, importer, svc)?;
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        if method.opt.client_encode_request.is_none() {
          self.write_encoder(&mut w, importer, svc, method);
        }
        if method.opt.client_decode_response.is_none() {
          self.write_decoder(&mut w, importer, svc, method)?;
        }
        if method.opt.client_error_decode.is_none() {
          self.write_error_decode(&mut w, importer, svc, method);
        }
      }
    }

    if self.cfg.services.len() > 1 {
      let app_client = self.cfg.app_client();
      let signature = format!("(tgt string, options ...ClientOption) (*{}, error)", app_client);
      w.write_func("NewClientJSONRPC", None, &signature, |w| {
        w.push_str(&format!("c := &{}{{}}\n", app_client));
        w.push_str("var err error\n");
        for svc in &self.cfg.services {
          w.push_str(&format!("c.{}, err = NewClientJSONRPC{}(tgt, options...)\n", svc.client(), svc.uc));
          w.write_check_err("err", |w| w.push_str("return nil, err\n"));
        }
        w.push_str("return c, nil\n");
      });
    }
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn calls_methods_by_rpc_name() {
    let files = fixtures::emit(
      "HTTPServer(), JSONRPCEnable(), JSONRPCPath(\"/rpc\"), ClientsEnable([]string{\"go\"}), Interface((*App)(nil), \"\"),",
    );
    let out = &files["swipe_gen_gokit_jsonrpc_client.go"];
    assert!(out.contains("func NewClientJSONRPCApp(tgt string, options ...ClientOption) (*AppClient, error) {\n"));
    assert!(out.contains("u.Path += \"/rpc\"\n"));
    assert!(out.contains(
      "c.GetEndpoint = jsonrpc.NewClient(\nu,\n\"get\",\nappend([]jsonrpc.ClientOption{\njsonrpc.ClientRequestEncoder(encodeAppGetRequest),\n"
    ));
    assert!(out.contains("func encodeAppListRequest(_ context.Context, obj interface{}) (json.RawMessage, error) {\nreturn nil, nil\n}\n"));
    assert!(out.contains("if response.Error != nil {\nreturn nil, appGetErrorDecode(response.Error.Code, response.Error.Message)\n}\n"));
    assert!(out.contains("var resp AppListResponse\n"));
    assert!(out.contains("return &resp, nil\n"));
  }

  #[test]
  fn excluded_interfaces_skip_the_target_url() {
    let files = fixtures::emit_source(
      fixtures::TWO,
      r#"HTTPServer(), JSONRPCEnable(), JSONRPCPath("/rpc"), ClientsEnable([]string{"go"}), Interface((*InterfaceA)(nil), "a"), Interface((*InterfaceB)(nil), "b"),
      MethodDefaultOptions(Exclude(true)), MethodOptions(InterfaceB.Create, Exclude(false)),"#,
    );
    let out = &files["swipe_gen_gokit_jsonrpc_client.go"];
    let constructor = |name: &str| {
      out.split(&format!("func {}(", name)).nth(1).and_then(|it| it.split("\nfunc ").next()).unwrap().to_owned()
    };
    let a = constructor("NewClientJSONRPCInterfaceA");
    assert!(!a.contains("u, err :="));
    assert!(!a.contains("u.Path"));
    let b = constructor("NewClientJSONRPCInterfaceB");
    assert!(b.contains("u, err := url.Parse(tgt)\n"));
    assert!(b.contains("u.Path += \"/rpc\"\n"));
    assert!(b.contains("c.CreateEndpoint = jsonrpc.NewClient(\nu,\n\"b.create\",\n"));
  }

  #[test]
  fn decodes_declared_error_codes() {
    let files = fixtures::emit("HTTPServer(), JSONRPCEnable(), ClientsEnable([]string{\"go\"}), Interface((*App)(nil), \"\"),");
    let out = &files["swipe_gen_gokit_jsonrpc_client.go"];
    assert!(out.contains(
      "func appGetErrorDecode(code int, message string) (err error) {\nswitch code {\ndefault:\nerr = &rpcError{code: code, message: message}\ncase -32001:\nerr = &errs.NotFound{}\n"
    ));
    assert!(out.contains("case -32602:\nerr = &errs.Invalid{}\n"));
  }
}

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::model::VarType;
use crate::plugin::Generator;
use crate::writer::{GoWriter, OnError};

use super::options::{BodyType, VarPair};
use super::service::{field_name, wrap_struct, wrap_selector, Method, Service};
use super::{check_func, Config};

const FILENAME: &str = "rest.go";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Router, request decoders and response encoders of the REST transport.
pub(crate) struct RestServerGenerator<'a> {
  pub cfg: &'a Config,
}

/// Go spellings that differ between net/http and fasthttp.
struct Flavor {
  fast: bool,
  transport: String,
}

impl Flavor {
  fn request(&self, importer: &mut Importer) -> String {
    if self.fast {
      format!("*{}.RequestCtx", importer.import("fasthttp", "github.com/valyala/fasthttp"))
    } else {
      format!("*{}.Request", importer.import("http", "net/http"))
    }
  }

  fn response(&self, importer: &mut Importer) -> String {
    if self.fast {
      format!("*{}.Response", importer.import("fasthttp", "github.com/valyala/fasthttp"))
    } else {
      format!("{}.ResponseWriter", importer.import("http", "net/http"))
    }
  }

  fn query(&self, name: &str) -> String {
    if self.fast {
      format!("string(q.Peek({:?}))", name)
    } else {
      format!("q.Get({:?})", name)
    }
  }

  fn header(&self, name: &str) -> String {
    if self.fast {
      format!("string(r.Request.Header.Peek({:?}))", name)
    } else {
      format!("r.Header.Get({:?})", name)
    }
  }

  fn set_header(&self, writer: &str, key: &str, value: &str) -> String {
    if self.fast {
      format!("{}.Header.Set({}, {})\n", writer, key, value)
    } else {
      format!("{}.Header().Set({}, {})\n", writer, key, value)
    }
  }

  fn status(&self, writer: &str, code: &str) -> String {
    if self.fast {
      format!("{}.SetStatusCode({})\n", writer, code)
    } else {
      format!("{}.WriteHeader({})\n", writer, code)
    }
  }
}

impl RestServerGenerator<'_> {
  fn write_handler(&self, w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor) -> Result<(), SwipeError> {
    let transport = &flavor.transport;
    let mut params = self
      .cfg
      .services
      .iter()
      .map(|svc| format!("{} {}", svc.svc_arg(), svc.iface_type()))
      .collect::<Vec<_>>();
    params.push("options ...ServerOption".to_owned());
    let result = if flavor.fast {
      format!("{}.RequestHandler", importer.import("fasthttp", "github.com/valyala/fasthttp"))
    } else {
      format!("{}.Handler", importer.import("http", "net/http"))
    };
    let error_encoder = match &self.cfg.server_error_encoder {
      Some(func) => {
        check_func(FILENAME, "ServerErrorEncoder", func, 3, 0)?;
        importer.func_ref(func)
      }
      None => "defaultErrorEncoder".to_owned(),
    };
    let router = if flavor.fast {
      format!("{}.New()", importer.import("routing", "github.com/qiangxue/fasthttp-routing"))
    } else {
      format!("{}.NewRouter()", importer.import("mux", "github.com/gorilla/mux"))
    };

    let mut body = GoWriter::new();
    body.push_str("opts := &serverOpts{}\n");
    body.push_str("for _, o := range options {\no(opts)\n}\n");
    body.push_str(&format!(
      "opts.genericServerOption = append([]{0}.ServerOption{{{0}.ServerErrorEncoder({1})}}, opts.genericServerOption...)\n",
      transport, error_encoder
    ));
    body.push_str(&format!("r := {}\n", router));
    for svc in self.cfg.services.iter().filter(|it| it.is_active()) {
      let set = format!("{}Endpoints", svc.lc);
      body.push_str(&format!("{} := Make{}({})\n", set, svc.endpoint_set(), svc.svc_arg()));
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        let field = method.option_field(svc);
        let endpoint = format!("{}.{}", set, method.endpoint_field());
        body.push_str(&format!(
          "{0} = middlewareChain(append(opts.genericEndpointMiddleware, opts.{1}EndpointMiddleware...))({0})\n",
          endpoint, field
        ));
        let decode = match &method.opt.server_decode_request {
          Some(func) => {
            check_func(FILENAME, "ServerDecodeRequest", func, 2, 2)?;
            importer.func_ref(func)
          }
          None => format!("decode{}Request", method.option_prefix(svc)),
        };
        let encode = match &method.opt.server_encode_response {
          Some(func) => {
            check_func(FILENAME, "ServerEncodeResponse", func, 3, 1)?;
            importer.func_ref(func)
          }
          None => format!("encode{}Response", method.option_prefix(svc)),
        };
        let server = format!(
          "{}.NewServer(\n{},\n{},\n{},\nappend(opts.genericServerOption, opts.{}ServerOption...)...,\n)",
          transport, endpoint, decode, encode, field
        );
        if flavor.fast {
          body.push_str(&format!(
            "r.To({:?}, {:?}, {}.RouterHandle())\n",
            method.opt.rest_method,
            method.opt.path.angled(),
            server
          ));
        } else {
          body.push_str(&format!(
            "r.Methods({:?}).Path({:?}).Handler({})\n",
            method.opt.rest_method,
            method.opt.path.raw(),
            server
          ));
        }
      }
    }
    body.push_str(if flavor.fast { "return r.HandleRequest\n" } else { "return r\n" });

    let body = body.into_string();
    w.write_func("MakeHandlerREST", None, &format!("({}) {}", params.join(", "), result), |w| w.push_str(&body));
    Ok(())
  }

  fn write_decoder(&self, w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor, svc: &Service, method: &Method) {
    let context = importer.import("context", "context");
    let request = flavor.request(importer);
    let name = format!("decode{}Request", method.option_prefix(svc));
    let signature = format!("(ctx {}.Context, r {}) (interface{{}}, error)", context, request);
    if !method.has_request() {
      w.write_func(&name, None, &signature, |w| w.push_str("return nil, nil\n"));
      return;
    }

    let mut b = GoWriter::new();
    let req_type = method.request(svc);
    b.push_str(&format!("var req {}\n", req_type));

    let body_params = method.body_params();
    if !body_params.is_empty() && method.opt.has_body() {
      match method.opt.body_type {
        BodyType::Json => write_json_body(&mut b, importer, flavor, method, &req_type),
        BodyType::FormData | BodyType::UrlEncoded => write_form_body(&mut b, importer, flavor, method, &body_params),
      }
    }

    let path_vars = method.opt.path.vars().filter_map(|var| method.param(&var.name)).collect::<Vec<_>>();
    if !path_vars.is_empty() {
      if flavor.fast {
        let routing = importer.import("routing", "github.com/qiangxue/fasthttp-routing");
        b.push_str(&format!("rctx, ok := ctx.Value({}.ContextKeyRouter).(*{}.Context)\n", flavor.transport, routing));
        b.push_str("if !ok {\n");
        let errors = importer.import("errors", "errors");
        b.push_str(&format!("return nil, {}.New(\"router context not found\")\n", errors));
        b.push_str("}\n");
      } else {
        let mux = importer.import("mux", "github.com/gorilla/mux");
        b.push_str(&format!("vars := {}.Vars(r)\n", mux));
      }
      for var in path_vars {
        let from = if flavor.fast {
          format!("rctx.Param({:?})", var.name.value)
        } else {
          format!("vars[{:?}]", var.name.value)
        };
        let message = format!("convert path var {} error", var.name.value);
        b.write_convert_type(importer, &format!("req.{}", field_name(var)), &from, var, OnError::Return(&["nil"]), &message);
      }
    }

    let query = bound_vars(method, &method.opt.query_vars);
    if !query.is_empty() {
      if flavor.fast {
        b.push_str("q := r.QueryArgs()\n");
      } else {
        b.push_str("q := r.URL.Query()\n");
      }
      for (pair, var) in query {
        write_optional(&mut b, importer, &flavor.query(&pair.external), pair, var, "query");
      }
    }
    for (pair, var) in bound_vars(method, &method.opt.header_vars) {
      write_optional(&mut b, importer, &flavor.header(&pair.external), pair, var, "header");
    }
    b.push_str("return &req, nil\n");

    let body = b.into_string();
    w.write_func(&name, None, &signature, |w| w.push_str(&body));
  }

  fn write_encoder(&self, w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor, svc: &Service, method: &Method) {
    let context = importer.import("context", "context");
    let json = importer.import("json", "encoding/json");
    let writer = if flavor.fast { "r" } else { "w" };
    let signature = format!(
      "(ctx {}.Context, {} {}, response interface{{}}) error",
      context,
      writer,
      flavor.response(importer)
    );
    w.write_func(&format!("encode{}Response", method.option_prefix(svc)), None, &signature, |w| {
      w.push_str(&flavor.set_header(writer, "\"Content-Type\"", &format!("{:?}", CONTENT_TYPE)));
      w.push_str("if response == nil {\n");
      w.push_str(&flavor.status(writer, "201"));
      w.push_str("return nil\n");
      w.push_str("}\n");
      if !method.opt.wrap_response.is_empty() {
        let wrapped = method
          .opt
          .wrap_response
          .iter()
          .rev()
          .fold("response".to_owned(), |acc, key| format!("map[string]interface{{}}{{{:?}: {}}}", key, acc));
        w.push_str(&format!("response = {}\n", wrapped));
      }
      if flavor.fast {
        w.push_str(&format!("data, err := {}.Marshal(response)\n", json));
        w.write_check_err("err", |w| w.push_str("return err\n"));
        w.push_str("r.SetBody(data)\n");
        w.push_str("return nil\n");
      } else {
        w.push_str(&format!("return {}.NewEncoder(w).Encode(response)\n", json));
      }
    });
  }

  fn write_error_encoder(&self, w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor) {
    let context = importer.import("context", "context");
    let json = importer.import("json", "encoding/json");
    let writer = if flavor.fast { "r" } else { "w" };
    w.write_type_struct(
      "errorResponse",
      &[
        ("Error".to_owned(), "string `json:\"error\"`".to_owned()),
        ("Data".to_owned(), "interface{} `json:\"data,omitempty\"`".to_owned()),
      ],
    );
    let signature = format!("(_ {}.Context, err error, {} {})", context, writer, flavor.response(importer));
    let headers = format!("{}.Header", importer.import("http", "net/http"));
    w.write_func("defaultErrorEncoder", None, &signature, |w| {
      w.push_str(&flavor.set_header(writer, "\"Content-Type\"", &format!("{:?}", CONTENT_TYPE)));
      w.push_str(&format!("if headerer, ok := err.(interface{{ Headers() {} }}); ok {{\n", headers));
      w.push_str("for k, values := range headerer.Headers() {\n");
      w.push_str("for _, v := range values {\n");
      if flavor.fast {
        w.push_str(&format!("{}.Header.Add(k, v)\n", writer));
      } else {
        w.push_str(&format!("{}.Header().Add(k, v)\n", writer));
      }
      w.push_str("}\n}\n}\n");
      w.push_str("code := 500\n");
      w.push_str("if sc, ok := err.(interface{ StatusCode() int }); ok {\ncode = sc.StatusCode()\n}\n");
      w.push_str("resp := errorResponse{Error: err.Error()}\n");
      w.push_str("if e, ok := err.(interface{ ErrorData() interface{} }); ok {\nresp.Data = e.ErrorData()\n}\n");
      w.push_str(&flavor.status(writer, "code"));
      if flavor.fast {
        w.push_str(&format!("if data, err := {}.Marshal(resp); err == nil {{\nr.SetBody(data)\n}}\n", json));
      } else {
        w.push_str(&format!("_ = {}.NewEncoder(w).Encode(resp)\n", json));
      }
    });
  }
}

/// Query or header bindings paired with the parameters they fill.
fn bound_vars<'m>(method: &'m Method, pairs: &'m [VarPair]) -> Vec<(&'m VarPair, &'m VarType)> {
  pairs
    .iter()
    .filter(|it| !it.constant)
    .filter_map(|pair| method.param(&pair.param).map(|var| (pair, var)))
    .collect()
}

fn write_optional(w: &mut GoWriter, importer: &mut Importer, from: &str, pair: &VarPair, var: &VarType, kind: &str) {
  w.push_str(&format!("if s := {}; s != \"\" {{\n", from));
  let message = format!("convert {} {} error", kind, pair.external);
  w.write_convert_type(importer, &format!("req.{}", field_name(var)), "s", var, OnError::Return(&["nil"]), &message);
  if pair.required {
    let errors = importer.import("errors", "errors");
    w.push_str("} else {\n");
    w.push_str(&format!("return nil, {}.New({:?})\n", errors, format!("{} {} required", kind, pair.external)));
  }
  w.push_str("}\n");
}

fn write_json_body(w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor, method: &Method, req_type: &str) {
  let json = importer.import("json", "encoding/json");
  let fmt = importer.import("fmt", "fmt");
  let wrapped = !method.opt.wrap_request.is_empty();
  let target = if wrapped {
    w.push_str(&format!("var body {}\n", wrap_struct(&method.opt.wrap_request, req_type)));
    "&body"
  } else {
    "&req"
  };
  let message = format!("{:?}", format!("couldn't unmarshal body to {}: %w", req_type));
  if flavor.fast {
    w.push_str("if data := r.Request.Body(); len(data) > 0 {\n");
    w.push_str(&format!("if err := {}.Unmarshal(data, {}); err != nil {{\n", json, target));
    w.push_str(&format!("return nil, {}.Errorf({}, err)\n", fmt, message));
    w.push_str("}\n}\n");
  } else {
    let io = importer.import("io", "io");
    w.push_str(&format!("if err := {}.NewDecoder(r.Body).Decode({}); err != nil && err != {}.EOF {{\n", json, target, io));
    w.push_str(&format!("return nil, {}.Errorf({}, err)\n", fmt, message));
    w.push_str("}\n");
  }
  if wrapped {
    w.push_str(&format!("req = body{}\n", wrap_selector(&method.opt.wrap_request)));
  }
}

fn write_form_body(w: &mut GoWriter, importer: &mut Importer, flavor: &Flavor, method: &Method, params: &[&VarType]) {
  let fmt = importer.import("fmt", "fmt");
  let multipart = method.opt.body_type == BodyType::FormData;
  if !flavor.fast {
    if multipart {
      w.push_str(&format!("if err := r.ParseMultipartForm({}); err != nil {{\n", method.opt.multipart_max_memory));
    } else {
      w.push_str("if err := r.ParseForm(); err != nil {\n");
    }
    w.push_str(&format!("return nil, {}.Errorf(\"couldn't parse form: %w\", err)\n", fmt));
    w.push_str("}\n");
  }
  let universe = importer.universe();
  for var in params {
    let key = var.name.lower.as_str();
    let assign_to = format!("req.{}", field_name(var));
    if multipart && var.ty.is_byte_slice(universe) {
      let io = importer.import("io", "io");
      if flavor.fast {
        w.push_str(&format!("if fh, err := r.FormFile({:?}); err == nil {{\n", key));
        w.push_str("f, err := fh.Open()\n");
        w.write_check_err("err", |w| w.push_str(&format!("return nil, {}.Errorf(\"couldn't open {}: %w\", err)\n", fmt, key)));
      } else {
        w.push_str(&format!("if f, _, err := r.FormFile({:?}); err == nil {{\n", key));
      }
      w.push_str(&format!("b, err := {}.ReadAll(f)\n", io));
      w.push_str("_ = f.Close()\n");
      w.write_check_err("err", |w| w.push_str(&format!("return nil, {}.Errorf(\"couldn't read {}: %w\", err)\n", fmt, key)));
      w.push_str(&format!("{} = b\n", assign_to));
      w.push_str("}\n");
      continue;
    }
    let from = if flavor.fast { format!("string(r.FormValue({:?}))", key) } else { format!("r.FormValue({:?})", key) };
    w.push_str(&format!("if s := {}; s != \"\" {{\n", from));
    if var.ty.is_byte_slice(universe) {
      w.push_str(&format!("{} = []byte(s)\n", assign_to));
    } else {
      let message = format!("convert form {} error", key);
      w.write_convert_type(importer, &assign_to, "s", var, OnError::Return(&["nil"]), &message);
    }
    w.push_str("}\n");
  }
}

impl Generator for RestServerGenerator<'_> {
  fn filename(&self) -> &str {
    FILENAME
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let flavor = Flavor { fast: self.cfg.http_fast, transport: self.cfg.server_transport(importer) };
    let mut w = GoWriter::new();
    self.write_handler(&mut w, importer, &flavor)?;
    for svc in &self.cfg.services {
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        if method.opt.server_decode_request.is_none() {
          self.write_decoder(&mut w, importer, &flavor, svc, method);
        }
        if method.opt.server_encode_response.is_none() {
          self.write_encoder(&mut w, importer, &flavor, svc, method);
        }
      }
    }
    if self.cfg.server_error_encoder.is_none() {
      self.write_error_encoder(&mut w, importer, &flavor);
    }
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::plugin::gokit::fixtures;
  use crate::testutil;

  #[test]
  fn registers_posted_json_bodies() {
    let files = fixtures::emit("HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.Create, RESTMethod(\"POST\")),");
    let out = &files["swipe_gen_gokit_rest.go"];
    assert!(out.contains("func MakeHandlerREST(svcApp appInterface, options ...ServerOption) http.Handler {\n"));
    assert!(out.contains("opts.genericServerOption = append([]kithttp.ServerOption{kithttp.ServerErrorEncoder(defaultErrorEncoder)}, opts.genericServerOption...)\n"));
    assert!(out.contains("r.Methods(\"POST\").Path(\"/create\").Handler(kithttp.NewServer(\nappEndpoints.CreateEndpoint,\ndecodeAppCreateRequest,\nencodeAppCreateResponse,\n"));
    assert!(out.contains("if err := json.NewDecoder(r.Body).Decode(&req); err != nil && err != io.EOF {\n"));
    assert!(out.contains("r.Methods(\"GET\").Path(\"/get\")"));
    assert!(out.contains("w.WriteHeader(201)\n"));
    assert!(out.contains("w.Header().Set(\"Content-Type\", \"application/json; charset=utf-8\")\n"));
    assert!(out.contains("func defaultErrorEncoder(_ context.Context, err error, w http.ResponseWriter) {\n"));
    assert!(out.contains("if sc, ok := err.(interface{ StatusCode() int }); ok {\n"));
  }

  #[test]
  fn binds_path_and_query_vars() {
    let files = fixtures::emit(
      "HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.Get, RESTMethod(\"GET\"), RESTPath(\"/items/{id:[0-9]+}\"), RESTQueryVars([]string{\"filter\", \"q\"}), RESTHeaderVars([]string{\"filter\", \"!X-Filter\"})),",
    );
    let out = &files["swipe_gen_gokit_rest.go"];
    assert!(out.contains("r.Methods(\"GET\").Path(\"/items/{id:[0-9]+}\")"));
    assert!(out.contains("vars := mux.Vars(r)\nidInt, err := strconv.Atoi(vars[\"id\"])\n"));
    assert!(out.contains("req.Id = idInt\n"));
    assert!(out.contains("q := r.URL.Query()\nif s := q.Get(\"q\"); s != \"\" {\nreq.Filter = s\n}\n"));
    assert!(out.contains("if s := r.Header.Get(\"X-Filter\"); s != \"\" {\nreq.Filter = s\n} else {\nreturn nil, errors.New(\"header X-Filter required\")\n}\n"));
    assert!(!out.contains("json.NewDecoder(r.Body).Decode(&req)\n"));
  }

  #[test]
  fn wraps_responses() {
    let files = fixtures::emit(
      "HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.Get, RESTWrapResponse(\"data.value\")),",
    );
    let out = &files["swipe_gen_gokit_rest.go"];
    assert!(out.contains(
      "response = map[string]interface{}{\"data\": map[string]interface{}{\"value\": response}}\nreturn json.NewEncoder(w).Encode(response)\n"
    ));
  }

  #[test]
  fn fast_servers_use_angled_routes() {
    let files = fixtures::emit(
      "HTTPServer(), HTTPFast(), Interface((*App)(nil), \"app\"), MethodOptions(App.Get, RESTPath(\"/items/{id:[0-9]+}\")),",
    );
    let out = &files["swipe_gen_gokit_rest.go"];
    assert!(out.contains("func MakeHandlerREST(svcApp appInterface, options ...ServerOption) fasthttp.RequestHandler {\n"));
    assert!(out.contains("r := routing.New()\n"));
    assert!(out.contains("r.To(\"GET\", \"/app/items/<id:[0-9]+>\", kitfasthttp.NewServer(\n"));
    assert!(out.contains("r.To(\"GET\", \"/app/create\""));
    assert!(out.contains("rctx, ok := ctx.Value(kitfasthttp.ContextKeyRouter).(*routing.Context)\n"));
    assert!(out.contains("return r.HandleRequest\n"));
  }

  #[test]
  fn user_functions_are_checked() {
    let app = format!(
      "{}\nfunc EncodeGet(ctx context.Context) error {{ return nil }}\n",
      fixtures::APP
    );
    let swipe = fixtures::swipe("HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.Get, ServerEncodeResponse(EncodeGet)),");
    let (_dir, loader) = fixtures::load(&[("app.go", app.as_str()), ("errs/errs.go", fixtures::ERRS), ("swipe.go", swipe.as_str())]);
    let (files, errs) = testutil::emit_with_errors(&loader);
    assert!(!files.contains_key("swipe_gen_gokit_rest.go"));
    assert!(
      errs.iter().any(|it| matches!(it, SwipeError::Emit { file, .. } if file == FILENAME)),
      "{:?}",
      errs
    );
  }
}

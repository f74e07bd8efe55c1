//! go-kit service scaffold: endpoints, middlewares, REST and JSON-RPC
//! transports, clients and their documentation.

mod client_struct;
mod curl;
mod endpoint;
mod gateway;
mod helpers;
mod instrumenting;
mod interface;
mod js_client;
mod jsonrpc_client;
mod jsonrpc_doc;
mod jsonrpc_server;
mod logging;
mod openapi;
mod options;
mod rest_client;
mod rest_server;
mod samples;
mod service;

use std::collections::BTreeMap;
use std::fs;

use heck::ToUpperCamelCase;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SwipeError;
use crate::finder::ErrorFinder;
use crate::importer::Importer;
use crate::model::IfaceType;
use crate::option::schema::{param, OptionFn, Schema};
use crate::option::{from_tree, FuncRef, OptionValue};
use crate::plugin::{ConfigureContext, Generator, Plugin};

use options::{flatten_service, ContextValue, MergeError, MethodOption, OpenapiContact, OpenapiInfo, OpenapiLicence, OpenapiServer, Options};
use service::{Method, Service};

pub const ID: &str = "Gokit";

const ROOT: &str = "GokitOption";
const IFACE: &str = "InterfaceOption";
const METHOD: &str = "MethodOption";

pub static SCHEMA: Schema = Schema {
  id: ID,
  funcs: &[
    OptionFn::new("Service", ROOT).opts(ROOT),
    OptionFn::new("HTTPServer", ROOT),
    OptionFn::new("HTTPFast", ROOT),
    OptionFn::new("ClientsEnable", ROOT).params(&[param("langs", "[]string")]),
    OptionFn::new("ClientOutput", ROOT).params(&[param("value", "string")]),
    OptionFn::new("CURLEnable", ROOT),
    OptionFn::new("CURLOutput", ROOT).params(&[param("value", "string")]),
    OptionFn::new("CURLURL", ROOT).params(&[param("value", "string")]),
    OptionFn::new("JSONRPCEnable", ROOT),
    OptionFn::new("JSONRPCPath", ROOT).params(&[param("value", "string")]),
    OptionFn::new("JSONRPCDocEnable", ROOT),
    OptionFn::new("JSONRPCDocOutput", ROOT).params(&[param("value", "string")]),
    OptionFn::new("Interface", ROOT).params(&[param("iface", "interface{}"), param("ns", "string")]).opts(IFACE).repeat(),
    OptionFn::new("ClientName", IFACE).params(&[param("value", "string")]),
    OptionFn::new("Gateway", IFACE),
    OptionFn::new("OpenapiEnable", ROOT),
    OptionFn::new("OpenapiTags", ROOT).params(&[param("methods", "[]interface{}"), param("tags", "[]string")]).repeat(),
    OptionFn::new("OpenapiOutput", ROOT).params(&[param("value", "string")]),
    OptionFn::new("OpenapiInfo", ROOT).params(&[
      param("title", "string"),
      param("description", "string"),
      param("version", "string"),
    ]),
    OptionFn::new("OpenapiContact", ROOT).params(&[param("name", "string"), param("email", "string"), param("url", "string")]),
    OptionFn::new("OpenapiLicence", ROOT).params(&[param("name", "string"), param("url", "string")]),
    OptionFn::new("OpenapiServer", ROOT).params(&[param("description", "string"), param("url", "string")]).repeat(),
    OptionFn::new("MethodOptions", ROOT).params(&[param("signature", "interface{}")]).opts(METHOD).repeat(),
    OptionFn::new("MethodDefaultOptions", ROOT).opts(METHOD),
    OptionFn::new("ServerErrorEncoder", ROOT).params(&[param("value", "interface{}")]),
    OptionFn::new("Labels", ROOT).params(&[param("key", "interface{}"), param("name", "string")]).repeat(),
    OptionFn::new("Instrumenting", METHOD).params(&[param("value", "bool")]),
    OptionFn::new("Logging", METHOD).params(&[param("value", "bool")]),
    OptionFn::new("LoggingParams", METHOD).params(&[param("includes", "[]string"), param("excludes", "[]string")]),
    OptionFn::new("LoggingContext", METHOD).params(&[param("key", "interface{}"), param("name", "string")]).repeat(),
    OptionFn::new("RESTMethod", METHOD).params(&[param("value", "string")]),
    OptionFn::new("RESTWrapResponse", METHOD).params(&[param("value", "string")]),
    OptionFn::new("RESTWrapRequest", METHOD).params(&[param("value", "string")]),
    OptionFn::new("RESTPath", METHOD).params(&[param("value", "string")]),
    OptionFn::new("RESTMultipartMaxMemory", METHOD).params(&[param("value", "int64")]),
    OptionFn::new("RESTHeaderVars", METHOD).params(&[param("value", "[]string")]),
    OptionFn::new("RESTQueryVars", METHOD).params(&[param("value", "[]string")]),
    OptionFn::new("RESTQueryValues", METHOD).params(&[param("value", "[]string")]),
    OptionFn::new("RESTBodyType", METHOD).params(&[param("value", "string")]),
    OptionFn::new("ServerEncodeResponse", METHOD).params(&[param("value", "interface{}")]),
    OptionFn::new("ServerDecodeRequest", METHOD).params(&[param("value", "interface{}")]),
    OptionFn::new("ClientEncodeRequest", METHOD).params(&[param("value", "interface{}")]),
    OptionFn::new("ClientDecodeResponse", METHOD).params(&[param("value", "interface{}")]),
    OptionFn::new("ClientErrorDecode", METHOD).params(&[param("value", "interface{}")]),
    OptionFn::new("Exclude", METHOD).params(&[param("value", "bool")]),
  ],
};

pub fn new() -> Box<dyn Plugin> {
  Box::<GokitPlugin>::default()
}

const DEFAULT_CURL_URL: &str = "http://localhost:8080";
const DEFAULT_JSONRPC_PATH: &str = "/";

#[derive(Debug, Clone)]
pub(crate) struct OpenapiConfig {
  pub output: String,
  pub info: OpenapiInfo,
  pub contact: Option<OpenapiContact>,
  pub licence: Option<OpenapiLicence>,
  pub servers: Vec<OpenapiServer>,
}

/// Everything the emitters need, resolved from the options of one build.
#[derive(Debug, Clone, Default)]
pub(crate) struct Config {
  pub app_name: String,
  pub http_server: bool,
  pub http_fast: bool,
  pub json_rpc: bool,
  pub go_client: bool,
  pub js_client: bool,
  pub client_output: String,
  pub curl: Option<(String, String)>,
  pub jsonrpc_path: String,
  pub jsonrpc_doc: Option<String>,
  pub openapi: Option<OpenapiConfig>,
  pub services: Vec<Service>,
  pub server_error_encoder: Option<FuncRef>,
  pub labels: Vec<ContextValue>,
  /// NPM package name of the JavaScript client.
  pub js_pkg: Option<String>,
  pub logging: bool,
  pub instrumenting: bool,
  pub gateway: bool,
}

impl Config {
  /// Go package of the server side go-kit transport.
  pub fn server_transport(&self, importer: &mut Importer) -> String {
    match (self.json_rpc, self.http_fast) {
      (true, true) => importer.import("jsonrpc", "github.com/l-vitaly/go-kit/transport/fasthttp/jsonrpc"),
      (true, false) => importer.import("jsonrpc", "github.com/l-vitaly/go-kit/transport/http/jsonrpc"),
      (false, true) => importer.import("kitfasthttp", "github.com/l-vitaly/go-kit/transport/fasthttp"),
      (false, false) => importer.import("kithttp", "github.com/go-kit/kit/transport/http"),
    }
  }

  /// Go package of the client side transport; clients always use net/http.
  pub fn client_transport(&self, importer: &mut Importer) -> String {
    if self.json_rpc {
      importer.import("jsonrpc", "github.com/l-vitaly/go-kit/transport/http/jsonrpc")
    } else {
      importer.import("kithttp", "github.com/go-kit/kit/transport/http")
    }
  }

  /// Name of the composite client spanning every interface.
  pub fn app_client(&self) -> String {
    let name = format!("{}Client", self.app_name);
    if self.services.iter().any(|it| it.client() == name) {
      format!("{}AppClient", self.app_name)
    } else {
      name
    }
  }

  fn client_separate(&self) -> bool {
    !self.client_output.is_empty() || !self.http_server
  }
}

#[derive(Debug, Default)]
pub struct GokitPlugin {
  config: Option<Config>,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
  name: String,
}

impl Plugin for GokitPlugin {
  fn id(&self) -> &'static str {
    ID
  }

  fn configure(&mut self, ctx: &mut ConfigureContext, options: &OptionValue) -> Result<(), Vec<SwipeError>> {
    let options: Options = from_tree(ID, &flatten_service(options)).map_err(|err| vec![err])?;
    let mut errs = Vec::new();
    let json_rpc = options.jsonrpc_enable.is_some();
    let langs = options.clients_enable.as_ref().map(|it| it.langs.as_slice()).unwrap_or_default();

    let mut config = Config {
      app_name: ctx.module.path.rsplit('/').next().unwrap_or_default().to_upper_camel_case(),
      http_server: options.http_server.is_some(),
      http_fast: options.http_fast.is_some(),
      json_rpc,
      go_client: langs.iter().any(|it| it == "go"),
      js_client: langs.iter().any(|it| it == "js"),
      client_output: options.client_output.map(|it| it.value).unwrap_or_default(),
      curl: options.curl_enable.map(|_| {
        let output = options.curl_output.map(|it| it.value).unwrap_or_default();
        let url = options.curl_url.map(|it| it.value).unwrap_or_else(|| DEFAULT_CURL_URL.to_owned());
        (output, url)
      }),
      jsonrpc_path: options.jsonrpc_path.map(|it| it.value).unwrap_or_else(|| DEFAULT_JSONRPC_PATH.to_owned()),
      jsonrpc_doc: options.jsonrpc_doc_enable.map(|_| options.jsonrpc_doc_output.map(|it| it.value).unwrap_or_default()),
      openapi: options.openapi_enable.map(|_| OpenapiConfig {
        output: options.openapi_output.map(|it| it.value).unwrap_or_default(),
        info: options.openapi_info.unwrap_or_default(),
        contact: options.openapi_contact,
        licence: options.openapi_licence,
        servers: options.openapi_servers,
      }),
      server_error_encoder: options.server_error_encoder.map(|it| it.value.method),
      labels: options.labels,
      ..Config::default()
    };

    let mut ifaces: Vec<IfaceType> = Vec::new();
    {
      let universe = ctx.normalizer.universe();
      for entry in &options.interfaces {
        let named = entry.iface.ty.named(universe);
        let iface = universe.iface_of(&entry.iface.ty);
        let (Some(named), Some(iface)) = (named, iface) else {
          let name = named.map(|it| it.name.value.clone()).unwrap_or_else(|| "type".to_owned());
          errs.push(SwipeError::configure(ID, format!("Interface: {} is not an interface", name)));
          continue;
        };
        let client_name = entry.client_name.as_ref().map(|it| it.value.as_str());
        let mut svc = Service::new(named.id, named.name.clone(), client_name, &entry.ns, entry.gateway.is_some());

        for func in &iface.methods {
          let own = options.method_options.iter().find(|it| {
            it.signature.as_ref().is_some_and(|sig| sig.method.recv == Some(named.id) && sig.method.func.name == func.name)
          });
          let method_name = format!("{}.{}", named.name, func.name);
          let opt = match MethodOption::merge(&entry.ns, &func.name.value, own, options.method_default_options.as_ref(), json_rpc) {
            Ok(opt) => opt,
            Err(MergeError::Template(path)) => {
              errs.push(SwipeError::PathTemplate { method: method_name, path });
              continue;
            }
            Err(MergeError::Invalid(message)) => {
              errs.push(SwipeError::configure(ID, format!("{}: {}", method_name, message)));
              continue;
            }
          };
          let method = Method::new(func, opt, universe);
          for name in method.opt.bound() {
            if method.param(name).is_none() {
              errs.push(SwipeError::configure(ID, format!("{}: unknown parameter {:?}", method_name, name)));
            }
          }
          svc.methods.push(method);
        }
        ifaces.push(iface.clone());
        config.services.push(svc);
      }

      for entry in &options.method_options {
        let Some(sig) = &entry.signature else {
          errs.push(SwipeError::configure(ID, "MethodOptions: signature is required"));
          continue;
        };
        let message = match sig.method.recv {
          None => "must be an interface method",
          Some(id) if !config.services.iter().any(|it| it.id == id) => "is not a method of a declared interface",
          Some(_) => continue,
        };
        errs.push(SwipeError::configure(ID, format!("MethodOptions: {} {}", sig.method.func.name, message)));
      }
    }

    for entry in &options.openapi_tags {
      for method in &entry.methods {
        let target = config
          .services
          .iter_mut()
          .filter(|it| Some(it.id) == method.method.recv)
          .flat_map(|it| it.methods.iter_mut())
          .find(|it| it.name == method.method.func.name);
        if let Some(target) = target {
          target.tags.extend(entry.tags.iter().cloned());
        }
      }
    }

    if !errs.is_empty() {
      return Err(errs);
    }

    attach_errors(ctx, &ifaces, &mut config.services);

    let package_json = ctx.build.base_path.join("package.json");
    if let Ok(source) = fs::read_to_string(&package_json) {
      match serde_json::from_str::<PackageJson>(&source) {
        Ok(pkg) => config.js_pkg = Some(pkg.name),
        Err(err) => warn!("{}: {}", package_json.display(), err),
      }
    }

    let (logging, instrumenting) = config
      .services
      .iter()
      .flat_map(|it| &it.methods)
      .fold((false, false), |(log, ins), it| (log || it.opt.logging, ins || it.opt.instrumenting));
    config.logging = logging;
    config.instrumenting = instrumenting;
    config.gateway = config.services.iter().any(|it| it.gateway);
    debug!(
      "gokit {} serves {} interfaces, json-rpc: {}, fast: {}",
      config.app_name,
      config.services.len(),
      config.json_rpc,
      config.http_fast
    );
    self.config = Some(config);
    Ok(())
  }

  fn generators(&self) -> Vec<Box<dyn Generator + '_>> {
    let Some(cfg) = &self.config else {
      return Vec::new();
    };
    let mut generators: Vec<Box<dyn Generator + '_>> = Vec::new();
    if let Some((output, url)) = &cfg.curl {
      generators.push(Box::new(curl::CurlGenerator { cfg, output, url }));
    }
    if cfg.http_server {
      let client_here = cfg.go_client && !cfg.client_separate();
      generators.push(Box::new(helpers::HelpersGenerator { cfg, server: true, client: client_here, output: "" }));
      generators.push(Box::new(endpoint::EndpointGenerator { cfg, output: "" }));
      generators.push(Box::new(interface::InterfaceGenerator { cfg, output: "" }));
      if cfg.logging {
        generators.push(Box::new(logging::LoggingGenerator { cfg }));
      }
      if cfg.instrumenting {
        generators.push(Box::new(instrumenting::InstrumentingGenerator { cfg }));
      }
      if let Some(openapi) = &cfg.openapi {
        generators.push(Box::new(openapi::OpenapiGenerator { cfg, openapi }));
      }
      if cfg.gateway {
        generators.push(Box::new(gateway::GatewayGenerator { cfg }));
      }
      if cfg.json_rpc {
        generators.push(Box::new(jsonrpc_server::JsonRpcServerGenerator { cfg }));
        if cfg.js_client {
          generators.push(Box::new(js_client::JsClientGenerator { cfg }));
        }
        if let Some(output) = &cfg.jsonrpc_doc {
          generators.push(Box::new(jsonrpc_doc::JsonRpcDocGenerator { cfg, output }));
        }
      } else {
        generators.push(Box::new(rest_server::RestServerGenerator { cfg }));
      }
    }
    if cfg.go_client {
      let output = cfg.client_output.as_str();
      if cfg.client_separate() {
        generators.push(Box::new(helpers::HelpersGenerator { cfg, server: false, client: true, output }));
        generators.push(Box::new(endpoint::EndpointGenerator { cfg, output }));
        generators.push(Box::new(interface::InterfaceGenerator { cfg, output }));
      }
      generators.push(Box::new(client_struct::ClientStructGenerator { cfg, output }));
      if cfg.json_rpc {
        generators.push(Box::new(jsonrpc_client::JsonRpcClientGenerator { cfg, output }));
      } else {
        generators.push(Box::new(rest_client::RestClientGenerator { cfg, output }));
      }
    }
    generators
  }
}

/// Fills the declared errors of every method from the implementations found
/// in the loaded source.
fn attach_errors(ctx: &mut ConfigureContext, ifaces: &[IfaceType], services: &mut [Service]) {
  let mut finder = match ErrorFinder::new(ctx.loader, &mut *ctx.normalizer) {
    Ok(finder) => finder,
    Err(err) => {
      warn!("error discovery skipped: {}", err);
      return;
    }
  };
  for (iface, svc) in ifaces.iter().zip(services.iter_mut()) {
    let mut found: BTreeMap<String, Vec<_>> = match finder.find(iface) {
      Ok(found) => found,
      Err(err) => {
        warn!("error discovery for {} skipped: {}", svc.name, err);
        continue;
      }
    };
    for method in &mut svc.methods {
      method.errors = found.remove(&method.name.value).unwrap_or_default();
    }
  }
}

/// Checks that a user function passed for `option` has the expected arity.
pub(crate) fn check_func(file: &str, option: &str, func: &FuncRef, params: usize, results: usize) -> Result<(), SwipeError> {
  let sig = &func.func.sig;
  if sig.params.len() != params || sig.results.len() != results {
    return Err(SwipeError::emit(
      file,
      format!(
        "{} {} has an incompatible signature, want {} params and {} results",
        option, func.func.name, params, results
      ),
    ));
  }
  Ok(())
}

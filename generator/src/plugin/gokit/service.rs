//! Interfaces exposed by the Gokit plugin and the names generated for them.

use heck::{ToLowerCamelCase, ToUpperCamelCase};

use crate::finder::{ErrorDef, ErrorKind};
use crate::importer::Importer;
use crate::model::{FuncType, NameString, NamedId, NamedRef, Type, Universe, VarType};

use super::options::MethodOption;

#[derive(Debug, Clone)]
pub(crate) struct Service {
  pub id: NamedId,
  pub name: NameString,
  /// Upper camel prefix of generated identifiers.
  pub uc: String,
  /// Lower camel prefix of unexported identifiers.
  pub lc: String,
  pub ns: String,
  pub gateway: bool,
  pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub(crate) struct Method {
  pub name: NameString,
  /// Signature with the error result named `err` unless the source named it.
  pub func: FuncType,
  pub opt: MethodOption,
  pub ctx: Option<VarType>,
  pub params: Vec<VarType>,
  pub results: Vec<VarType>,
  pub err: Option<VarType>,
  pub errors: Vec<ErrorDef>,
  pub tags: Vec<String>,
}

/// What an endpoint hands back for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Response<'m> {
  None,
  Single(&'m VarType),
  Struct,
}

impl Service {
  pub fn new(id: NamedId, name: NameString, client_name: Option<&str>, ns: &str, gateway: bool) -> Self {
    let uc = match client_name {
      Some(client) if !client.is_empty() => client.to_upper_camel_case(),
      _ => name.upper.clone(),
    };
    Service { id, lc: uc.to_lower_camel_case(), uc, name, ns: ns.to_owned(), gateway, methods: Vec::new() }
  }

  pub fn iface_type(&self) -> String {
    format!("{}Interface", self.lc)
  }

  pub fn middleware(&self) -> String {
    format!("{}Middleware", self.uc)
  }

  pub fn endpoint_set(&self) -> String {
    format!("{}EndpointSet", self.uc)
  }

  pub fn client(&self) -> String {
    format!("{}Client", self.uc)
  }

  /// Handler argument carrying the implementation.
  pub fn svc_arg(&self) -> String {
    format!("svc{}", self.uc)
  }

  pub fn is_active(&self) -> bool {
    self.methods.iter().any(|it| !it.opt.exclude)
  }
}

impl Method {
  pub fn new(func: &FuncType, opt: MethodOption, universe: &Universe) -> Self {
    let mut func = func.clone();
    let mut ctx = None;
    let mut params = Vec::new();
    for (index, param) in func.sig.params.iter().enumerate() {
      if index == 0 && param.ty.is_context(universe) {
        ctx = Some(param.clone());
      } else {
        params.push(param.clone());
      }
    }
    if !func.sig.is_named {
      if let Some(err) = func.sig.results.iter_mut().rev().find(|it| it.ty.is_error(universe)) {
        err.name = NameString::new("err");
      }
    }
    let mut results = Vec::new();
    let mut err = None;
    for result in &func.sig.results {
      if result.ty.is_error(universe) {
        err = Some(result.clone());
      } else {
        results.push(result.clone());
      }
    }
    Method { name: func.name.clone(), func, opt, ctx, params, results, err, errors: Vec::new(), tags: Vec::new() }
  }

  pub fn is_variadic(&self) -> bool {
    self.func.sig.is_variadic
  }

  pub fn response(&self) -> Response<'_> {
    match self.results.as_slice() {
      [] => Response::None,
      [single] => Response::Single(single),
      _ => Response::Struct,
    }
  }

  pub fn has_request(&self) -> bool {
    !self.params.is_empty()
  }

  pub fn request(&self, svc: &Service) -> String {
    format!("{}{}Request", svc.uc, self.name.upper)
  }

  pub fn response_type(&self, svc: &Service) -> String {
    format!("{}{}Response", svc.uc, self.name.upper)
  }

  pub fn make_endpoint(&self, svc: &Service) -> String {
    format!("Make{}{}Endpoint", svc.uc, self.name.upper)
  }

  pub fn endpoint_field(&self) -> String {
    format!("{}Endpoint", self.name.upper)
  }

  /// Prefix of the per-method option helpers, e.g. `AppCreate`.
  pub fn option_prefix(&self, svc: &Service) -> String {
    format!("{}{}", svc.uc, self.name.upper)
  }

  /// Prefix of the per-method option fields, e.g. `appCreate`.
  pub fn option_field(&self, svc: &Service) -> String {
    format!("{}{}", svc.lc, self.name.upper)
  }

  pub fn error_decode(&self, svc: &Service) -> String {
    format!("{}{}ErrorDecode", svc.lc, self.name.upper)
  }

  /// JSON-RPC method name, `<ns>.<lowerCamel>` or just `<lowerCamel>`.
  pub fn rpc_name(&self, svc: &Service) -> String {
    if svc.ns.is_empty() {
      self.name.lower.clone()
    } else {
      format!("{}.{}", svc.ns, self.name.lower)
    }
  }

  pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorDef> {
    self.errors.iter().filter(move |it| it.kind == kind)
  }

  pub fn param(&self, name: &str) -> Option<&VarType> {
    self.params.iter().find(|it| it.name.value == name)
  }

  /// Parameters not bound to the path, query or headers.
  pub fn body_params(&self) -> Vec<&VarType> {
    let bound = self.opt.bound();
    self.params.iter().filter(|it| !bound.contains(&it.name.value.as_str())).collect()
  }

  /// Arguments forwarding the method's parameters, `...` included; the
  /// context parameter is passed as `ctx`.
  pub fn call_args(&self, ctx: &str, value: impl Fn(&VarType) -> String) -> String {
    let last = self.func.sig.params.len().saturating_sub(1);
    let has_ctx = self.ctx.is_some();
    self
      .func
      .sig
      .params
      .iter()
      .enumerate()
      .map(|(index, param)| {
        let arg = if has_ctx && index == 0 { ctx.to_owned() } else { value(param) };
        if self.is_variadic() && index == last {
          format!("{}...", arg)
        } else {
          arg
        }
      })
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Exported field name of a parameter or result.
pub(crate) fn field_name(var: &VarType) -> String {
  var.name.upper.clone()
}

/// `(field, type with json tag)` pairs of a request or response struct.
pub(crate) fn struct_fields(importer: &mut Importer, vars: &[&VarType]) -> Vec<(String, String)> {
  vars
    .iter()
    .map(|var| (field_name(var), format!("{} `json:\"{}\"`", importer.type_string(&var.ty), var.name.lower)))
    .collect()
}

/// The `error` expression of a declared error, e.g. `&errs.NotFound{}`.
pub(crate) fn error_value(importer: &mut Importer, error: &ErrorDef) -> String {
  let name = importer.type_string(&Type::Named(NamedRef { id: error.id, pointer: false }));
  if error.pointer {
    format!("&{}{{}}", name)
  } else {
    format!("{}{{}}", name)
  }
}

/// Nested anonymous struct reading a wrapped response, e.g.
/// `struct { Data struct { Value T `json:"value"` } `json:"data"` }`.
pub(crate) fn wrap_struct(keys: &[String], inner: &str) -> String {
  keys.iter().rev().fold(inner.to_owned(), |acc, key| {
    format!("struct {{\n{} {} `json:\"{}\"`\n}}", key.to_upper_camel_case(), acc, key)
  })
}

/// Selector reaching into a wrapped value, e.g. `.Data.Value`.
pub(crate) fn wrap_selector(keys: &[String]) -> String {
  keys.iter().map(|it| format!(".{}", it.to_upper_camel_case())).collect()
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  #[test]
  fn names_follow_the_client_name() {
    let svc = Service::new(0, NameString::new("InterfaceB"), Some("remote"), "b", false);
    assert_eq!(svc.uc, "Remote");
    assert_eq!(svc.iface_type(), "remoteInterface");
    assert_eq!(svc.endpoint_set(), "RemoteEndpointSet");
    let svc = Service::new(0, NameString::new("App"), None, "", false);
    assert_eq!(svc.client(), "AppClient");
    assert_eq!(svc.svc_arg(), "svcApp");
  }

  #[test]
  fn wraps_nest_from_the_outside_in() {
    let keys = vec!["data".to_owned(), "value".to_owned()];
    assert_eq!(
      wrap_struct(&keys, "int"),
      "struct {\nData struct {\nValue int `json:\"value\"`\n} `json:\"data\"`\n}"
    );
    assert_eq!(wrap_selector(&keys), ".Data.Value");
  }
}

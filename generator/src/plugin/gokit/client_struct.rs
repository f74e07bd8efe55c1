use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::service::{field_name, Method, Response, Service};
use super::Config;

/// Client structs implementing each interface over its endpoints.
pub(crate) struct ClientStructGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
}

fn write_method(w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) {
  let signature = importer.signature(&method.func.sig, true);
  let recv = format!("c *{}", svc.client());
  let ctx = match &method.ctx {
    Some(ctx) => ctx.name.value.clone(),
    None => format!("{}.Background()", importer.import("context", "context")),
  };
  let err = method.err.as_ref().map(|it| it.name.value.as_str());

  w.write_func(&method.name.value, Some(&recv), &signature, |w| {
    if method.opt.exclude {
      if let Some(err) = err {
        w.push_str(&format!("{} = ErrMethodExcluded\n", err));
      }
      w.push_str("return\n");
      return;
    }
    let request = if method.has_request() {
      let fields = method.params.iter().map(|it| (field_name(it), it.name.value.clone())).collect::<Vec<_>>();
      let mut request = format!("&{}", method.request(svc));
      let mut assign = GoWriter::new();
      assign.write_struct_assign(&fields);
      request.push_str(&assign);
      request
    } else {
      "nil".to_owned()
    };
    let call = format!("c.{}({}, {})", method.endpoint_field(), ctx, request);
    let (resp, op) = if method.response() == Response::None { ("_", "=") } else { ("resp", ":=") };
    match err {
      Some(err) => {
        w.push_str(&format!("{}, {} {} {}\n", resp, err, op, call));
        w.write_check_err(err, |w| w.push_str("return\n"));
      }
      None => w.push_str(&format!("{}, _ {} {}\n", resp, op, call)),
    }
    match method.response() {
      Response::None => {}
      Response::Single(result) => {
        let ty = importer.type_string(&result.ty);
        w.push_str(&format!("if value, ok := resp.({}); ok {{\n{} = value\n}}\n", ty, result.name.value));
      }
      Response::Struct => {
        w.push_str(&format!("if value, ok := resp.(*{}); ok {{\n", method.response_type(svc)));
        for result in &method.results {
          w.push_str(&format!("{} = value.{}\n", result.name.value, field_name(result)));
        }
        w.push_str("}\n");
      }
    }
    w.push_str("return\n");
  });
}

impl Generator for ClientStructGenerator<'_> {
  fn filename(&self) -> &str {
    "client_struct.go"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let endpoint = importer.import("endpoint", "github.com/go-kit/kit/endpoint");
    let excluded = self.cfg.services.iter().flat_map(|it| &it.methods).any(|it| it.opt.exclude);
    if excluded {
      let errors = importer.import("errors", "errors");
      w.push_str(&format!("var ErrMethodExcluded = {}.New(\"method excluded\")\n\n", errors));
    }

    for svc in &self.cfg.services {
      let fields = svc
        .methods
        .iter()
        .map(|it| (it.endpoint_field(), format!("{}.Endpoint", endpoint)))
        .collect::<Vec<_>>();
      w.write_type_struct(&svc.client(), &fields);
      for method in &svc.methods {
        write_method(&mut w, importer, svc, method);
      }
    }

    if self.cfg.services.len() > 1 {
      w.push_str(&format!("type {} struct {{\n", self.cfg.app_client()));
      for svc in &self.cfg.services {
        w.push_str(&format!("*{}\n", svc.client()));
      }
      w.push_str("}\n\n");
    }
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn clients_call_their_endpoints() {
    let files = fixtures::emit(
      "ClientsEnable([]string{\"go\"}), Interface((*App)(nil), \"\"), MethodOptions(App.List, Exclude(true)),",
    );
    let out = &files["swipe_gen_gokit_client_struct.go"];
    assert!(out.contains("var ErrMethodExcluded = errors.New(\"method excluded\")\n"));
    assert!(out.contains("func (c *AppClient) Create(ctx context.Context, name string, data []byte) (err error) {\n_, err = c.CreateEndpoint(ctx, &AppCreateRequest{Name: name, Data: data})\n"));
    assert!(out.contains("resp, err := c.GetEndpoint(ctx, &AppGetRequest{Id: id, Filter: filter})\nif err != nil {\nreturn\n}\nif value, ok := resp.(*Item); ok {\nitem = value\n}\n"));
    assert!(out.contains("(r1 []Item, r2 int, err error) {\nerr = ErrMethodExcluded\nreturn\n}\n"));
  }
}

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::service::{field_name, struct_fields, Method, Response, Service};
use super::Config;

/// Request and response envelopes, endpoint sets and their constructors.
pub(crate) struct EndpointGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
}

impl Generator for EndpointGenerator<'_> {
  fn filename(&self) -> &str {
    "endpoint.go"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let endpoint = importer.import("endpoint", "github.com/go-kit/kit/endpoint");

    for svc in &self.cfg.services {
      for method in &svc.methods {
        if method.has_request() {
          let fields = struct_fields(importer, &method.params.iter().collect::<Vec<_>>());
          w.write_type_struct(&method.request(svc), &fields);
        }
        if method.response() == Response::Struct {
          let fields = struct_fields(importer, &method.results.iter().collect::<Vec<_>>());
          w.write_type_struct(&method.response_type(svc), &fields);
        }
      }

      let fields = svc
        .methods
        .iter()
        .map(|it| (it.endpoint_field(), format!("{}.Endpoint", endpoint)))
        .collect::<Vec<_>>();
      w.write_type_struct(&svc.endpoint_set(), &fields);

      w.write_func(&format!("Make{}", svc.endpoint_set()), None, &format!("(svc {}) {}", svc.iface_type(), svc.endpoint_set()), |w| {
        w.push_str(&format!("return {}{{\n", svc.endpoint_set()));
        for method in &svc.methods {
          w.push_str(&format!("{}: {}(svc),\n", method.endpoint_field(), method.make_endpoint(svc)));
        }
        w.push_str("}\n");
      });

      for method in &svc.methods {
        write_make_endpoint(&mut w, importer, &endpoint, svc, method);
      }
    }
    Ok(w.into_string())
  }
}

fn write_make_endpoint(w: &mut GoWriter, importer: &mut Importer, endpoint: &str, svc: &Service, method: &Method) {
  let context = importer.import("context", "context");
  let signature = format!("(s {}) {}.Endpoint", svc.iface_type(), endpoint);
  w.write_func(&method.make_endpoint(svc), None, &signature, |w| {
    let request = if method.has_request() { "request" } else { "_" };
    w.push_str(&format!("return func(ctx {}.Context, {} interface{{}}) (interface{{}}, error) {{\n", context, request));
    if method.has_request() {
      w.push_str(&format!("req := request.(*{})\n", method.request(svc)));
    }
    let args = method.call_args("ctx", |param| format!("req.{}", field_name(param)));
    let results = method.func.sig.results.iter().map(|it| it.name.value.clone()).collect::<Vec<_>>();
    if results.is_empty() {
      w.push_str(&format!("s.{}({})\n", method.name, args));
    } else {
      w.push_str(&format!("{} := s.{}({})\n", results.join(", "), method.name, args));
    }
    if let Some(err) = &method.err {
      w.write_check_err(&err.name.value, |w| w.push_str(&format!("return nil, {}\n", err.name.value)));
    }
    match method.response() {
      Response::None => w.push_str("return nil, nil\n"),
      Response::Single(result) => w.push_str(&format!("return {}, nil\n", result.name.value)),
      Response::Struct => {
        w.push_str(&format!("return &{}", method.response_type(svc)));
        let fields = method.results.iter().map(|it| (field_name(it), it.name.value.clone())).collect::<Vec<_>>();
        w.write_struct_assign(&fields);
        w.push_str(", nil\n");
      }
    }
    w.push_str("}\n");
  });
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn endpoints_call_the_service() {
    let files = fixtures::emit("HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.List, Exclude(true)),");
    let out = &files["swipe_gen_gokit_endpoint.go"];
    assert!(out.contains("type AppCreateRequest struct {\nName string `json:\"name\"`\nData []byte `json:\"data\"`\n}\n"));
    assert!(out.contains("type AppListResponse struct {\nR1 []Item `json:\"r1\"`\nR2 int `json:\"r2\"`\n}\n"));
    assert!(out.contains("ListEndpoint: MakeAppListEndpoint(svc),\n"));
    assert!(out.contains("func MakeAppGetEndpoint(s appInterface) endpoint.Endpoint {\n"));
    assert!(out.contains("req := request.(*AppGetRequest)\nitem, err := s.Get(ctx, req.Id, req.Filter)\n"));
    assert!(out.contains("if err != nil {\nreturn nil, err\n}\nreturn item, nil\n"));
    assert!(out.contains("return func(ctx context.Context, _ interface{}) (interface{}, error) {\n"));
    assert!(out.contains("return &AppListResponse{R1: r1, R2: r2}, nil\n"));
  }
}

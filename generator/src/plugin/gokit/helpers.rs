use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::Config;

/// Functional options of the servers and clients plus `middlewareChain`.
pub(crate) struct HelpersGenerator<'a> {
  pub cfg: &'a Config,
  pub server: bool,
  pub client: bool,
  pub output: &'a str,
}

impl HelpersGenerator<'_> {
  fn write_opts(&self, w: &mut GoWriter, side: &str, kit_option: &str, middleware: &str) {
    let upper = if side == "server" { "Server" } else { "Client" };
    let opts = format!("{}Opts", side);
    let option = format!("{}Option", upper);

    let mut fields = vec![
      (format!("generic{}Option", upper), format!("[]{}", kit_option)),
      ("genericEndpointMiddleware".to_owned(), format!("[]{}", middleware)),
    ];
    for svc in &self.cfg.services {
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        let field = method.option_field(svc);
        fields.push((format!("{}{}Option", field, upper), format!("[]{}", kit_option)));
        fields.push((format!("{}EndpointMiddleware", field), format!("[]{}", middleware)));
      }
    }
    w.write_type_struct(&opts, &fields);
    w.push_str(&format!("type {} func(*{})\n\n", option, opts));

    let setter = |w: &mut GoWriter, name: String, field: String, ty: &str| {
      w.write_func(&name, None, &format!("(opt ...{}) {}", ty, option), |w| {
        w.push_str(&format!("return func(c *{}) {{ c.{} = opt }}\n", opts, field));
      });
    };
    setter(w, format!("Generic{}Options", upper), format!("generic{}Option", upper), kit_option);
    setter(w, format!("Generic{}EndpointMiddlewares", upper), "genericEndpointMiddleware".to_owned(), middleware);
    for svc in &self.cfg.services {
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        let prefix = method.option_prefix(svc);
        let field = method.option_field(svc);
        setter(w, format!("{}{}Options", prefix, upper), format!("{}{}Option", field, upper), kit_option);
        setter(w, format!("{}{}EndpointMiddlewares", prefix, upper), format!("{}EndpointMiddleware", field), middleware);
      }
    }
  }
}

impl Generator for HelpersGenerator<'_> {
  fn filename(&self) -> &str {
    "helpers.go"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let endpoint = importer.import("endpoint", "github.com/go-kit/kit/endpoint");
    let middleware = format!("{}.Middleware", endpoint);

    if self.server {
      let transport = self.cfg.server_transport(importer);
      self.write_opts(&mut w, "server", &format!("{}.ServerOption", transport), &middleware);
    }
    if self.client {
      let transport = self.cfg.client_transport(importer);
      self.write_opts(&mut w, "client", &format!("{}.ClientOption", transport), &middleware);
    }

    w.write_func("middlewareChain", None, &format!("(middlewares []{0}) {0}", middleware), |w| {
      w.push_str(&format!("return func(next {0}.Endpoint) {0}.Endpoint {{\n", endpoint));
      w.push_str("if len(middlewares) == 0 {\nreturn next\n}\n");
      w.push_str("outer := middlewares[0]\n");
      w.push_str("others := middlewares[1:]\n");
      w.push_str("for i := len(others) - 1; i >= 0; i-- {\nnext = others[i](next)\n}\n");
      w.push_str("return outer(next)\n");
      w.push_str("}\n");
    });
    Ok(w.into_string())
  }
}

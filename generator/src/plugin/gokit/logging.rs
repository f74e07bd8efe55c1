use crate::error::SwipeError;
use crate::importer::Importer;
use crate::model::{Type, VarType};
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::options::{context_key, MethodOption};
use super::service::{Method, Service};
use super::Config;

pub(crate) struct LoggingGenerator<'a> {
  pub cfg: &'a Config,
}

fn logged(opt: &MethodOption, name: &str) -> bool {
  let params = &opt.log_params;
  (params.includes.is_empty() || params.includes.iter().any(|it| it == name))
    && !params.excludes.iter().any(|it| it == name)
}

/// Value logged for `var`, `None` for values with no useful log form.
fn log_value(importer: &Importer, var: &VarType) -> Option<String> {
  let universe = importer.universe();
  let name = &var.name.value;
  if let Some(named) = var.ty.named(universe) {
    if named.method("String").is_some_and(|it| it.sig.params.is_empty() && it.sig.results.len() == 1) {
      return Some(format!("{}.String()", name));
    }
  }
  match var.ty.underlying(universe) {
    Type::Slice(_) | Type::Array(_) | Type::Map(_) | Type::Chan(_) => Some(format!("len({})", name)),
    Type::Struct(_) | Type::Func(_) => None,
    _ => Some(name.clone()),
  }
}

fn write_method(w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) {
  let recv = format!("s *{}LoggingMiddleware", svc.lc);
  let signature = importer.signature(&method.func.sig, true);
  let ctx_name = method.ctx.as_ref().map(|it| it.name.value.clone()).unwrap_or_default();
  let args = method.call_args(&ctx_name, |it| it.name.value.clone());
  let call = format!("s.next.{}({})", method.name, args);

  w.write_func(&method.name.value, Some(&recv), &signature, |w| {
    if method.opt.logging {
      let time = importer.import("time", "time");
      w.write_defer(&[format!("now {}.Time", time)], &[format!("{}.Now()", time)], |w| {
        let mut pairs = vec![format!("{:?}", "method"), format!("{:?}", method.name.value)];
        pairs.push(format!("{:?}", "took"));
        pairs.push(format!("{}.Since(now)", time));
        if method.ctx.is_some() {
          for value in &method.opt.log_context {
            let key = context_key(&value.key, importer);
            pairs.push(format!("{:?}", value.name));
            pairs.push(format!("{}.Value({})", ctx_name, key));
          }
        }
        for var in method.params.iter().chain(&method.results) {
          if !logged(&method.opt, &var.name.value) {
            continue;
          }
          if let Some(value) = log_value(importer, var) {
            pairs.push(format!("{:?}", var.name.value));
            pairs.push(value);
          }
        }
        if let Some(err) = &method.err {
          w.push_str(&format!("logErr := {}\n", err.name.value));
          w.push_str(&format!("if e, ok := {}.(interface{{ LogError() error }}); ok {{\n", err.name.value));
          w.push_str("logErr = e.LogError()\n");
          w.push_str("}\n");
          pairs.push(format!("{:?}", "err"));
          pairs.push("logErr".to_owned());
        }
        w.push_str(&format!("_ = s.logger.Log({})\n", pairs.join(", ")));
      });
    }
    if method.func.sig.results.is_empty() {
      w.push_str(&format!("{}\n", call));
    } else {
      w.push_str(&format!("return {}\n", call));
    }
  });
}

impl Generator for LoggingGenerator<'_> {
  fn filename(&self) -> &str {
    "logging.go"
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let log = importer.import("log", "github.com/go-kit/kit/log");
    for svc in &self.cfg.services {
      let name = format!("{}LoggingMiddleware", svc.lc);
      w.write_type_struct(
        &name,
        &[("next".to_owned(), svc.iface_type()), ("logger".to_owned(), format!("{}.Logger", log))],
      );
      for method in &svc.methods {
        write_method(&mut w, importer, svc, method);
      }
      w.write_func(&format!("Logging{}", svc.middleware()), None, &format!("(logger {}.Logger) {}", log, svc.middleware()), |w| {
        w.push_str(&format!("return func(next {0}) {0} {{\n", svc.iface_type()));
        w.push_str(&format!("return &{}{{next: next, logger: logger}}\n", name));
        w.push_str("}\n");
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
  fn logs_everything_but_the_excluded_params() {
    let files = fixtures::emit(
      "HTTPServer(), Interface((*App)(nil), \"\"), MethodOptions(App.Create, RESTMethod(\"POST\"), Logging(true), LoggingParams([]string{}, []string{\"data\"}), LoggingContext(\"request-id\", \"requestID\")), MethodOptions(App.List, Logging(true)),",
    );
    let out = &files["swipe_gen_gokit_logging.go"];
    assert!(out.contains("func (s *appLoggingMiddleware) Create(ctx context.Context, name string, data []byte) (err error) {\n"));
    assert!(out.contains("defer func(now time.Time) {\n"));
    assert!(out.contains(
      "_ = s.logger.Log(\"method\", \"Create\", \"took\", time.Since(now), \"requestID\", ctx.Value(\"request-id\"), \"name\", name, \"err\", logErr)\n"
    ));
    assert!(out.contains("}(time.Now())\nreturn s.next.Create(ctx, name, data)\n"));
    assert!(out.contains("\"r1\", len(r1), \"r2\", r2"));
    assert!(out.contains("if e, ok := err.(interface{ LogError() error }); ok {\n"));
    assert!(out.contains("func (s *appLoggingMiddleware) Get(ctx context.Context, id int, filter string) (item *Item, err error) {\nreturn s.next.Get(ctx, id, filter)\n}\n"));
    assert!(out.contains("func LoggingAppMiddleware(logger log.Logger) AppMiddleware {\n"));
  }
}

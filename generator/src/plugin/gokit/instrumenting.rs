use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::options::context_key;
use super::service::{Method, Service};
use super::Config;

/// Prometheus request counters and latency summaries per method.
pub(crate) struct InstrumentingGenerator<'a> {
  pub cfg: &'a Config,
}

impl InstrumentingGenerator<'_> {
  fn write_method(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service, method: &Method) {
    let recv = format!("s *{}InstrumentingMiddleware", svc.lc);
    let signature = importer.signature(&method.func.sig, true);
    let ctx_name = method.ctx.as_ref().map(|it| it.name.value.clone()).unwrap_or_default();
    let call = format!("s.next.{}({})", method.name, method.call_args(&ctx_name, |it| it.name.value.clone()));

    w.write_func(&method.name.value, Some(&recv), &signature, |w| {
      if method.opt.instrumenting {
        let time = importer.import("time", "time");
        let mut labels = vec![format!("{:?}", "method"), format!("{:?}", method.name.value)];
        for label in &self.cfg.labels {
          labels.push(format!("{:?}", label.name));
          if method.ctx.is_some() {
            let fmt = importer.import("fmt", "fmt");
            let key = context_key(&label.key, importer);
            labels.push(format!("{}.Sprint({}.Value({}))", fmt, ctx_name, key));
          } else {
            labels.push("\"\"".to_owned());
          }
        }
        let labels = labels.join(", ");
        w.write_defer(&[format!("begin {}.Time", time)], &[format!("{}.Now()", time)], |w| {
          w.push_str(&format!("s.requestCount.With({}).Add(1)\n", labels));
          w.push_str(&format!("s.requestLatency.With({}).Observe({}.Since(begin).Seconds())\n", labels, time));
        });
      }
      if method.func.sig.results.is_empty() {
        w.push_str(&format!("{}\n", call));
      } else {
        w.push_str(&format!("return {}\n", call));
      }
    });
  }
}

impl Generator for InstrumentingGenerator<'_> {
  fn filename(&self) -> &str {
    "instrumenting.go"
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let metrics = importer.import("metrics", "github.com/go-kit/kit/metrics");
    let kitprometheus = importer.import("kitprometheus", "github.com/go-kit/kit/metrics/prometheus");
    let stdprometheus = importer.import("stdprometheus", "github.com/prometheus/client_golang/prometheus");
    let label_names = std::iter::once("method")
      .chain(self.cfg.labels.iter().map(|it| it.name.as_str()))
      .map(|it| format!("{:?}", it))
      .collect::<Vec<_>>()
      .join(", ");

    for svc in &self.cfg.services {
      let name = format!("{}InstrumentingMiddleware", svc.lc);
      w.write_type_struct(
        &name,
        &[
          ("next".to_owned(), svc.iface_type()),
          ("requestCount".to_owned(), format!("{}.Counter", metrics)),
          ("requestLatency".to_owned(), format!("{}.Histogram", metrics)),
        ],
      );
      for method in &svc.methods {
        self.write_method(&mut w, importer, svc, method);
      }

      let signature = format!(
        "(namespace, subsystem string, requestCount {0}.Counter, requestLatency {0}.Histogram) {1}",
        metrics,
        svc.middleware()
      );
      w.write_func(&format!("Instrumenting{}", svc.middleware()), None, &signature, |w| {
        w.push_str(&format!("return func(next {0}) {0} {{\n", svc.iface_type()));
        w.push_str("if requestCount == nil {\n");
        w.push_str(&format!("requestCount = {}.NewCounterFrom({}.CounterOpts{{\n", kitprometheus, stdprometheus));
        w.push_str("Namespace: namespace,\nSubsystem: subsystem,\n");
        w.push_str("Name: \"request_count\",\nHelp: \"Number of requests received.\",\n");
        w.push_str(&format!("}}, []string{{{}}})\n", label_names));
        w.push_str("}\n");
        w.push_str("if requestLatency == nil {\n");
        w.push_str(&format!("requestLatency = {}.NewSummaryFrom({}.SummaryOpts{{\n", kitprometheus, stdprometheus));
        w.push_str("Namespace: namespace,\nSubsystem: subsystem,\n");
        w.push_str("Name: \"request_latency_microseconds\",\nHelp: \"Total duration of requests in microseconds.\",\n");
        w.push_str(&format!("}}, []string{{{}}})\n", label_names));
        w.push_str("}\n");
        w.push_str(&format!("return &{}{{next: next, requestCount: requestCount, requestLatency: requestLatency}}\n", name));
        w.push_str("}\n");
      });
    }
    Ok(w.into_string())
  }
}

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::service::Service;
use super::Config;

/// Load balanced endpoint sets over service discovery for `Gateway()`
/// interfaces.
pub(crate) struct GatewayGenerator<'a> {
  pub cfg: &'a Config,
}

impl GatewayGenerator<'_> {
  fn write_service(&self, w: &mut GoWriter, importer: &mut Importer, svc: &Service) {
    let sd = importer.import("sd", "github.com/go-kit/kit/sd");
    let lb = importer.import("lb", "github.com/go-kit/kit/sd/lb");
    let log = importer.import("log", "github.com/go-kit/log");
    let endpoint = importer.import("endpoint", "github.com/go-kit/kit/endpoint");
    let io = importer.import("io", "io");
    let methods = svc.methods.iter().filter(|it| !it.opt.exclude).collect::<Vec<_>>();

    let option = format!("{}Option", svc.uc);
    let mut fields = vec![
      ("Instancer".to_owned(), format!("{}.Instancer", sd)),
      ("Factory".to_owned(), format!("func(string) ({}, error)", svc.iface_type())),
    ];
    fields.extend(methods.iter().map(|it| (it.endpoint_field(), "EndpointOption".to_owned())));
    w.write_type_struct(&option, &fields);

    let signature = format!("(opt {}, logger {}.Logger) {}", option, log, svc.endpoint_set());
    w.write_func(&format!("Make{}Gateway", svc.uc), None, &signature, |w| {
      w.push_str(&format!("var endpoints {}\n", svc.endpoint_set()));
      for method in &methods {
        let field = format!("opt.{}", method.endpoint_field());
        w.push_str("{\n");
        w.push_str(&format!(
          "endpointer := {}.NewEndpointer(opt.Instancer, func(instance string) ({}.Endpoint, {}.Closer, error) {{\n",
          sd, endpoint, io
        ));
        w.push_str("c, err := opt.Factory(instance)\n");
        w.write_check_err("err", |w| w.push_str("return nil, nil, err\n"));
        w.push_str(&format!("return {}(c), nil, nil\n", method.make_endpoint(svc)));
        w.push_str("}, logger)\n");
        w.push_str(&format!("if {0}.Balancer == nil {{\n{0}.Balancer = {1}.NewRoundRobin\n}}\n", field, lb));
        w.push_str(&format!("if {0}.RetryMax == 0 {{\n{0}.RetryMax = defaultRetryMax\n}}\n", field));
        w.push_str(&format!("if {0}.RetryTimeout == 0 {{\n{0}.RetryTimeout = defaultRetryTimeout\n}}\n", field));
        w.push_str(&format!(
          "endpoints.{} = {}.Retry({1}.RetryMax, {1}.RetryTimeout, {1}.Balancer(endpointer))\n",
          method.endpoint_field(),
          field
        ));
        w.push_str("}\n");
      }
      w.push_str("return endpoints\n");
    });
  }
}

impl Generator for GatewayGenerator<'_> {
  fn filename(&self) -> &str {
    "gateway.go"
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    let sd = importer.import("sd", "github.com/go-kit/kit/sd");
    let lb = importer.import("lb", "github.com/go-kit/kit/sd/lb");
    let time = importer.import("time", "time");

    w.push_str(&format!("const (\ndefaultRetryMax = 1\ndefaultRetryTimeout = 10 * {}.Second\n)\n\n", time));
    w.push_str(&format!("type BalancerFactory func(s {}.Endpointer) {}.Balancer\n\n", sd, lb));
    w.write_type_struct(
      "EndpointOption",
      &[
        ("Balancer".to_owned(), "BalancerFactory".to_owned()),
        ("RetryMax".to_owned(), "int".to_owned()),
        ("RetryTimeout".to_owned(), format!("{}.Duration", time)),
      ],
    );
    for svc in self.cfg.services.iter().filter(|it| it.gateway) {
      self.write_service(&mut w, importer, svc);
    }
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn balances_active_methods() {
    let files = fixtures::emit_source(
      fixtures::TWO,
      r#"HTTPServer(), JSONRPCEnable(), Interface((*InterfaceA)(nil), "a"), Interface((*InterfaceB)(nil), "b", Gateway()),
      MethodOptions(InterfaceB.Delete, Exclude(true)),"#,
    );
    let out = &files["swipe_gen_gokit_gateway.go"];
    assert!(out.contains("type BalancerFactory func(s sd.Endpointer) lb.Balancer\n"));
    assert!(out.contains("type InterfaceBOption struct {\nInstancer sd.Instancer\nFactory func(string) (interfaceBInterface, error)\nCreateEndpoint EndpointOption\n}\n"));
    assert!(out.contains("func MakeInterfaceBGateway(opt InterfaceBOption, logger log.Logger) InterfaceBEndpointSet {\n"));
    assert!(out.contains("return MakeInterfaceBCreateEndpoint(c), nil, nil\n"));
    assert!(out.contains("endpoints.CreateEndpoint = lb.Retry(opt.CreateEndpoint.RetryMax, opt.CreateEndpoint.RetryTimeout, opt.CreateEndpoint.Balancer(endpointer))\n"));
    assert!(!out.contains("InterfaceAOption"));
    assert!(!out.contains("DeleteEndpoint"));
  }
}

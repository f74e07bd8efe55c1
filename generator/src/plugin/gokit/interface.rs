use crate::error::SwipeError;
use crate::importer::Importer;
use crate::plugin::Generator;
use crate::writer::GoWriter;

use super::Config;

pub(crate) struct InterfaceGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
}

impl Generator for InterfaceGenerator<'_> {
  fn filename(&self) -> &str {
    "interface.go"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let mut w = GoWriter::new();
    for svc in &self.cfg.services {
      w.push_str(&format!("type {} interface {{\n", svc.iface_type()));
      for method in &svc.methods {
        w.push_str(&format!("{}{}\n", method.name, importer.signature(&method.func.sig, true)));
      }
      w.push_str("}\n\n");
      w.push_str(&format!("type {} func({}) {}\n\n", svc.middleware(), svc.iface_type(), svc.iface_type()));
    }
    Ok(w.into_string())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use crate::plugin::gokit::fixtures;

  #[test]
  fn interfaces_name_their_results() {
    let files = fixtures::emit("HTTPServer(), Interface((*App)(nil), \"\", ClientName(\"items\")),");
    let out = &files["swipe_gen_gokit_interface.go"];
    assert!(out.contains("type itemsInterface interface {\n"));
    assert!(out.contains("Create(ctx context.Context, name string, data []byte) (err error)\n"));
    assert!(out.contains("Get(ctx context.Context, id int, filter string) (item *Item, err error)\n"));
    assert!(out.contains("List(ctx context.Context) (r1 []Item, r2 int, err error)\n"));
    assert!(out.contains("type ItemsMiddleware func(itemsInterface) itemsInterface\n"));
  }
}

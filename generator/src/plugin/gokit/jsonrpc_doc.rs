use crate::error::SwipeError;
use crate::finder::ErrorKind;
use crate::importer::Importer;
use crate::model::{Universe, VarType};
use crate::plugin::Generator;

use super::samples::js_type;
use super::service::{Method, Service};
use super::Config;

/// Markdown reference of the JSON-RPC methods.
pub(crate) struct JsonRpcDocGenerator<'a> {
  pub cfg: &'a Config,
  pub output: &'a str,
}

fn anchor(name: &str) -> String {
  name.chars().filter(|it| it.is_alphanumeric() || *it == '-' || *it == '_').collect::<String>().to_lowercase()
}

fn var_table(out: &mut String, universe: &Universe, vars: &[VarType]) {
  out.push_str("| Name | Type | Description |\n|------|------|-------------|\n");
  for var in vars {
    out.push_str(&format!(
      "| {} | `{}` | {} |\n",
      var.name.lower,
      js_type(&var.ty, universe),
      var.comment.replace('\n', " ")
    ));
  }
}

impl JsonRpcDocGenerator<'_> {
  fn write_method(&self, out: &mut String, universe: &Universe, svc: &Service, method: &Method) {
    out.push_str(&format!("\n### {}\n\n", method.rpc_name(svc)));
    if !method.func.comment.is_empty() {
      out.push_str(&format!("{}\n\n", method.func.comment));
    }
    out.push_str("**Parameters**\n\n");
    if method.params.is_empty() {
      out.push_str("None.\n\n");
    } else {
      var_table(out, universe, &method.params);
      out.push('\n');
    }
    out.push_str("**Result**\n\n");
    if method.results.is_empty() {
      out.push_str("None.\n");
    } else {
      var_table(out, universe, &method.results);
    }
    let errors = method.errors_of(ErrorKind::JsonRpc).collect::<Vec<_>>();
    if !errors.is_empty() {
      out.push_str("\n**Errors**\n\n| Code | Name |\n|------|------|\n");
      for error in errors {
        out.push_str(&format!("| {} | {} |\n", error.code, error.name));
      }
    }
  }
}

impl Generator for JsonRpcDocGenerator<'_> {
  fn filename(&self) -> &str {
    "jsonrpc_doc.md"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let universe = importer.universe();
    let mut out = format!("# {} JSON-RPC Client\n", self.cfg.app_name);

    if let Some(pkg) = &self.cfg.js_pkg {
      out.push_str("\n## Getting Started\n\n");
      out.push_str(&format!("Install the client:\n\n```sh\nnpm install {}\n```\n\n", pkg));
      let client = if self.cfg.services.len() > 1 {
        "JSONRPCClient".to_owned()
      } else {
        self.cfg.services.first().map(|it| format!("JSONRPCClient{}", it.uc)).unwrap_or_default()
      };
      out.push_str(&format!(
        "```js\nimport {{ {}, JSONRPCScheduler, httpTransport }} from \"{}\";\n```\n",
        client, pkg
      ));
    }

    out.push_str("\n## Methods\n\n");
    for svc in &self.cfg.services {
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        let name = method.rpc_name(svc);
        out.push_str(&format!("- [{}](#{})\n", name, anchor(&name)));
      }
    }
    for svc in &self.cfg.services {
      out.push_str(&format!("\n## {}\n", svc.name));
      let comment = &universe.get(svc.id).comment;
      if !comment.is_empty() {
        out.push_str(&format!("\n{}\n", comment));
      }
      for method in svc.methods.iter().filter(|it| !it.opt.exclude) {
        self.write_method(&mut out, universe, svc, method);
      }
    }
    Ok(out)
  }
}

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::model::{NamedId, NamedRef, Type};
use crate::plugin::config::EnvField;
use crate::plugin::Generator;
use crate::writer::{GoWriter, OnError};

pub(super) struct LoaderGenerator<'p> {
  pub struct_id: NamedId,
  pub func_name: &'p str,
  pub with_string: bool,
  pub fields: &'p [EnvField],
}

impl LoaderGenerator<'_> {
  fn write_required(&self, w: &mut GoWriter, importer: &mut Importer, field: &EnvField) {
    let errors = importer.import("errors", "errors");
    let message = format!("{} {} required", field.kind(), field.name());
    w.push_str(&format!("errs = append(errs, {}.New({:?}))\n", errors, message));
  }

  fn write_check_zero(&self, w: &mut GoWriter, importer: &mut Importer, field: &EnvField) {
    if !field.required || field.use_zero || field.var.zero == "{}" || field.var.zero.is_empty() {
      return;
    }
    w.push_str(&format!("if cfg.{} == {} {{\n", field.path, field.var.zero));
    self.write_required(w, importer, field);
    w.push_str("}\n");
  }

  fn write_env(&self, w: &mut GoWriter, importer: &mut Importer, field: &EnvField) {
    let os = importer.import("os", "os");
    w.push_str(&format!("if s, ok := {}.LookupEnv({:?}); ok {{\n", os, field.env));
    let message = format!("convert {} error", field.env);
    w.write_convert_type(importer, &format!("cfg.{}", field.path), "s", &field.var, OnError::Append("errs"), &message);
    match &field.flag {
      Some(flag) => w.push_str(&format!("seen[{:?}] = struct{{}}{{}}\n", flag)),
      None => self.write_check_zero(w, importer, field),
    }
    w.push_str("}");
    if field.required && field.flag.is_none() {
      w.push_str(" else {\n");
      self.write_required(w, importer, field);
      w.push_str("}\n");
    } else {
      w.push_str("\n");
    }
  }

  fn write_flag(&self, w: &mut GoWriter, importer: &mut Importer, field: &EnvField, name: &str) {
    let flag = importer.import("flag", "flag");
    let simple = match &field.var.ty {
      Type::Basic(basic) if !basic.pointer => match basic.name.as_str() {
        "string" => Some("StringVar"),
        "int" => Some("IntVar"),
        "int64" => Some("Int64Var"),
        "uint" => Some("UintVar"),
        "uint64" => Some("Uint64Var"),
        "float64" => Some("Float64Var"),
        "bool" => Some("BoolVar"),
        _ => None,
      },
      _ => None,
    };
    match simple {
      Some(func) => {
        w.push_str(&format!("{0}.{1}(&cfg.{2}, {3:?}, cfg.{2}, {4:?})\n", flag, func, field.path, name, field.desc));
      }
      None => {
        w.push_str(&format!("{}.Func({:?}, {:?}, func(s string) error {{\n", flag, name, field.desc));
        let message = format!("convert {} error", name);
        w.write_convert_type(importer, &format!("cfg.{}", field.path), "s", &field.var, OnError::Return(&[]), &message);
        w.push_str("return nil\n");
        w.push_str("})\n");
      }
    }
  }

  fn write_string(&self, w: &mut GoWriter, importer: &mut Importer, type_name: &str) {
    let strings = importer.import("strings", "strings");
    let fmt = importer.import("fmt", "fmt");
    w.write_func("String", Some(&format!("cfg *{}", type_name)), "() string", |w| {
      w.push_str(&format!("var b {}.Builder\n", strings));
      for field in self.fields {
        let key = match &field.flag {
          Some(flag) => format!("--{} ", flag),
          None => format!("{}=", field.env),
        };
        let desc = if field.desc.is_empty() { String::new() } else { format!(" ; {}", field.desc) };
        let format = format!("{}%v{}\n", key, desc);
        w.push_str(&format!("{}.Fprintf(&b, {:?}, cfg.{})\n", fmt, format, field.path));
      }
      w.push_str("return b.String()\n");
    });
  }
}

impl Generator for LoaderGenerator<'_> {
  fn filename(&self) -> &str {
    "config.go"
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let type_name = importer.type_string(&Type::Named(NamedRef { id: self.struct_id, pointer: false }));
    let flags = self.fields.iter().filter(|it| it.flag.is_some()).collect::<Vec<_>>();
    let mut w = GoWriter::new();

    w.write_func(self.func_name, None, &format!("() (cfg *{}, errs []error)", type_name), |w| {
      w.push_str(&format!("cfg = &{}{{}}\n", type_name));
      if !flags.is_empty() {
        w.push_str("seen := map[string]struct{}{}\n");
      }
      for field in self.fields {
        self.write_env(w, importer, field);
      }
      if !flags.is_empty() {
        for field in &flags {
          self.write_flag(w, importer, field, field.name());
        }
        let flag = importer.import("flag", "flag");
        w.push_str(&format!("{}.Parse()\n", flag));
        w.push_str(&format!("{0}.Visit(func(f *{0}.Flag) {{ seen[f.Name] = struct{{}}{{}} }})\n", flag));
        for field in flags.iter().filter(|it| it.required) {
          w.push_str(&format!("if _, ok := seen[{:?}]; !ok {{\n", field.name()));
          self.write_required(w, importer, field);
          w.push_str("}");
          if field.use_zero || field.var.zero == "{}" {
            w.push_str("\n");
          } else {
            w.push_str(" else {\n");
            self.write_check_zero(w, importer, field);
            w.push_str("}\n");
          }
        }
      }
      w.push_str("return\n");
    });

    if self.with_string {
      self.write_string(&mut w, importer, &type_name);
    }
    Ok(w.into_string())
  }
}

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::model::{Type, Universe};
use crate::plugin::config::EnvField;
use crate::plugin::Generator;

pub(super) struct DocGenerator<'p> {
  pub output: &'p str,
  pub fields: &'p [EnvField],
}

fn yes_no(value: bool) -> &'static str {
  if value {
    "yes"
  } else {
    "no"
  }
}

fn type_name(ty: &Type, universe: &Universe) -> String {
  match ty {
    Type::Basic(basic) => basic.name.clone(),
    Type::Named(named) => universe.get(named.id).name.value.clone(),
    Type::Slice(slice) => format!("[]{}", type_name(&slice.value, universe)),
    Type::Array(array) => format!("[{}]{}", array.len, type_name(&array.value, universe)),
    Type::Map(map) => format!("map[{}]{}", type_name(&map.key, universe), type_name(&map.value, universe)),
    _ => String::new(),
  }
}

impl DocGenerator<'_> {
  fn write_table<'f>(&self, builder: &mut String, universe: &Universe, title: &str, fields: impl Iterator<Item = &'f EnvField>) {
    builder.push_str(&format!("## {}\n\n", title));
    builder.push_str("| Name | Type | Description | Required | Use Zero |\n|------|------|------|------|------|\n");
    for field in fields {
      let desc = if field.desc.is_empty() { " " } else { field.desc.as_str() };
      builder.push_str(&format!(
        "|{}|<code>{}</code>|{}|{}|{}|\n",
        field.name(),
        type_name(&field.var.ty, universe),
        desc,
        yes_no(field.required),
        yes_no(field.use_zero)
      ));
    }
    builder.push('\n');
  }
}

impl Generator for DocGenerator<'_> {
  fn filename(&self) -> &str {
    "config_doc.md"
  }

  fn output_dir(&self) -> &str {
    self.output
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError> {
    let universe = importer.universe();
    let mut builder = String::from("# Config\n\n");
    if self.fields.iter().any(|it| it.flag.is_none()) {
      self.write_table(&mut builder, universe, "Environment variables", self.fields.iter().filter(|it| it.flag.is_none()));
    }
    if self.fields.iter().any(|it| it.flag.is_some()) {
      self.write_table(&mut builder, universe, "Flags", self.fields.iter().filter(|it| it.flag.is_some()));
    }
    Ok(builder)
  }
}

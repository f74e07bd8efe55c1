//! Static description of a plugin's options DSL, used both to decode calls
//! whose declarations are not on disk and to render the `swipe<id>` stub
//! package written by `swipe gen --init`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
  pub name: &'static str,
  pub ty: &'static str,
}

pub const fn param(name: &'static str, ty: &'static str) -> Param {
  Param { name, ty }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionFn {
  pub name: &'static str,
  pub params: &'static [Param],
  /// Type of the trailing `opts ...` parameter, if the option nests others.
  pub opts: Option<&'static str>,
  pub returns: &'static str,
  pub repeat: bool,
}

impl OptionFn {
  pub const fn new(name: &'static str, returns: &'static str) -> Self {
    OptionFn { name, params: &[], opts: None, returns, repeat: false }
  }

  pub const fn params(self, params: &'static [Param]) -> Self {
    OptionFn { params, ..self }
  }

  pub const fn opts(self, opts: &'static str) -> Self {
    OptionFn { opts: Some(opts), ..self }
  }

  pub const fn repeat(self) -> Self {
    OptionFn { repeat: true, ..self }
  }

  /// Formal parameter names; a trailing `opts` stands for the variadic.
  pub fn param_names(&self) -> Vec<String> {
    let mut names = self.params.iter().map(|it| it.name.to_owned()).collect::<Vec<_>>();
    if self.opts.is_some() {
      names.push("opts".to_owned());
    }
    names
  }
}

#[derive(Debug)]
pub struct Schema {
  pub id: &'static str,
  pub funcs: &'static [OptionFn],
}

impl Schema {
  /// Name of the Go package carrying the options, e.g. `swipegokit`.
  pub fn package_name(&self) -> String {
    format!("swipe{}", self.id.to_lowercase())
  }

  pub fn root_option(&self) -> String {
    format!("{}Option", self.id)
  }

  /// The `Build` entry point followed by every option function.
  pub fn func(&self, name: &str) -> Option<OptionFn> {
    if name == "Build" {
      return Some(OptionFn { name: "Build", params: &[], opts: None, returns: "", repeat: false });
    }
    self.funcs.iter().find(|it| it.name == name).copied()
  }

  /// Go source of the options stub package.
  pub fn render(&self) -> String {
    let root = self.root_option();
    let mut builder = String::new();
    builder.push_str("//go:build swipe\n");
    builder.push_str("// +build swipe\n\n");
    builder.push_str("// Code generated by swipe. DO NOT EDIT.\n\n");
    builder.push_str(&format!("// Package {} declares the {} options.\n", self.package_name(), self.id));
    builder.push_str(&format!("package {}\n\n", self.package_name()));

    builder.push_str("// Build marks a package for generation.\n");
    builder.push_str(&format!("func Build(opts ...{}) {{}}\n\n", root));

    let mut types = vec![root.as_str()];
    builder.push_str(&format!("// {} ...\ntype {} string\n", root, root));
    for func in self.funcs {
      for ty in [Some(func.returns), func.opts].into_iter().flatten() {
        if !types.contains(&ty) {
          types.push(ty);
          builder.push_str(&format!("\n// {} ...\ntype {} string\n", ty, ty));
        }
      }
    }

    for func in self.funcs {
      let mut params = func.params.iter().map(|it| format!("{} {}", it.name, it.ty)).collect::<Vec<_>>();
      if let Some(opts) = func.opts {
        params.push(format!("opts ...{}", opts));
      }
      builder.push_str(&format!("\n// {} ...\n", func.name));
      if func.repeat {
        builder.push_str("// @type:\"repeat\"\n");
      }
      builder.push_str(&format!(
        "func {}({}) {} {{\n\treturn \"implementation not generated, run swipe\"\n}}\n",
        func.name,
        params.join(", "),
        func.returns
      ));
    }
    builder
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  const FUNCS: &[OptionFn] = &[
    OptionFn::new("Enable", "DemoOption"),
    OptionFn::new("Item", "DemoOption").params(&[param("name", "string")]).opts("ItemOption").repeat(),
    OptionFn::new("Label", "ItemOption").params(&[param("value", "string")]),
  ];

  const DEMO: Schema = Schema { id: "Demo", funcs: FUNCS };

  #[test]
  fn renders_a_parsable_stub() {
    let source = DEMO.render();
    assert!(source.starts_with("//go:build swipe\n"));
    assert!(source.contains("package swipedemo\n"));
    assert!(source.contains("func Build(opts ...DemoOption) {}"));
    assert!(source.contains("// @type:\"repeat\"\nfunc Item(name string, opts ...ItemOption) DemoOption {"));
    assert_eq!(source.matches("type ItemOption string").count(), 1);

    let file = swipe_parser::parse_file(&source).unwrap();
    assert_eq!(file.package.value.0, "swipedemo");
    assert_eq!(file.build_constraints.len(), 2);
  }

  #[test]
  fn looks_up_functions() {
    assert_eq!(DEMO.func("Item").unwrap().param_names(), vec!["name", "opts"]);
    assert!(DEMO.func("Build").is_some());
    assert!(DEMO.func("Missing").is_none());
    assert_eq!(DEMO.package_name(), "swipedemo");
  }
}

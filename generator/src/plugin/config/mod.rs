//! Environment and flag loader for a configuration struct.

mod doc;
mod loader;

use heck::{ToKebabCase, ToShoutySnakeCase};
use serde::Deserialize;
use tracing::debug;

use crate::error::SwipeError;
use crate::model::{NamedId, Type, Universe, VarType};
use crate::option::schema::{param, OptionFn, Schema};
use crate::option::{from_tree, Flag, OptionValue, Single, TypeValue};
use crate::plugin::{ConfigureContext, Generator, Plugin};

pub const ID: &str = "Config";

const DEFAULT_FUNC_NAME: &str = "LoadConfig";

pub static SCHEMA: Schema = Schema {
  id: ID,
  funcs: &[
    OptionFn::new("ConfigEnv", "ConfigOption").params(&[param("structType", "interface{}")]).opts("ConfigEnvOption"),
    OptionFn::new("FuncName", "ConfigEnvOption").params(&[param("value", "string")]),
    OptionFn::new("EnableDoc", "ConfigEnvOption"),
    OptionFn::new("OutputDoc", "ConfigEnvOption").params(&[param("value", "string")]),
  ],
};

pub fn new() -> Box<dyn Plugin> {
  Box::<ConfigPlugin>::default()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
  #[serde(rename = "ConfigEnv")]
  config_env: Option<ConfigEnvOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigEnvOptions {
  #[serde(rename = "structType")]
  struct_type: TypeValue,
  #[serde(rename = "FuncName")]
  func_name: Option<Single<String>>,
  #[serde(rename = "EnableDoc")]
  enable_doc: Option<Flag>,
  #[serde(rename = "OutputDoc")]
  output_doc: Option<Single<String>>,
}

/// A leaf of the configuration struct bound to an env var or a flag.
#[derive(Debug, Clone)]
pub(crate) struct EnvField {
  /// Env var name.
  pub env: String,
  /// Flag name, set for `use_flag` fields.
  pub flag: Option<String>,
  /// Selector from the struct root, e.g. `DB.Host`.
  pub path: String,
  pub var: VarType,
  pub desc: String,
  pub required: bool,
  pub use_zero: bool,
}

impl EnvField {
  pub fn name(&self) -> &str {
    self.flag.as_deref().unwrap_or(&self.env)
  }

  pub fn kind(&self) -> &'static str {
    if self.flag.is_some() {
      "flag"
    } else {
      "env"
    }
  }
}

#[derive(Debug, Default)]
pub struct ConfigPlugin {
  struct_id: Option<NamedId>,
  func_name: String,
  doc_output: Option<String>,
  same_package: bool,
  has_string: bool,
  fields: Vec<EnvField>,
}

impl Plugin for ConfigPlugin {
  fn id(&self) -> &'static str {
    ID
  }

  fn configure(&mut self, ctx: &mut ConfigureContext, options: &OptionValue) -> Result<(), Vec<SwipeError>> {
    let options: Options = from_tree(ID, options).map_err(|err| vec![err])?;
    let Some(env) = options.config_env else {
      return Err(vec![SwipeError::configure(ID, "ConfigEnv option is required")]);
    };
    let universe = ctx.normalizer.universe();
    let Some(named) = env.struct_type.ty.named(universe) else {
      return Err(vec![SwipeError::configure(ID, "ConfigEnv: structType must be a named struct")]);
    };
    let Type::Struct(_) = &named.underlying else {
      return Err(vec![SwipeError::configure(ID, format!("ConfigEnv: {} is not a struct", named.name))]);
    };

    self.struct_id = Some(named.id);
    self.same_package = named.pkg.path == ctx.build.pkg.path;
    self.has_string = named.method("String").is_some();
    self.func_name = env.func_name.map(|it| it.value).unwrap_or_else(|| DEFAULT_FUNC_NAME.to_owned());
    self.doc_output = env.enable_doc.map(|_| env.output_doc.map(|it| it.value).unwrap_or_default());
    self.fields = walk(universe, named.id, self.same_package);
    debug!("config {} binds {} fields", named.name, self.fields.len());
    Ok(())
  }

  fn generators(&self) -> Vec<Box<dyn Generator + '_>> {
    let Some(struct_id) = self.struct_id else {
      return Vec::new();
    };
    let mut generators: Vec<Box<dyn Generator + '_>> = vec![Box::new(loader::LoaderGenerator {
      struct_id,
      func_name: &self.func_name,
      with_string: self.same_package && !self.has_string,
      fields: &self.fields,
    })];
    if let Some(output) = &self.doc_output {
      generators.push(Box::new(doc::DocGenerator { output, fields: &self.fields }));
    }
    generators
  }
}

struct Prefix {
  env: String,
  flag: String,
  path: String,
}

/// Flattens the struct into its env-bound leaves in field order.
pub(crate) fn walk(universe: &Universe, id: NamedId, all_fields: bool) -> Vec<EnvField> {
  let mut fields = Vec::new();
  let mut stack = vec![id];
  walk_struct(universe, &universe.get(id).underlying, None, all_fields, &mut stack, &mut fields);
  fields
}

fn walk_struct(
  universe: &Universe,
  ty: &Type,
  prefix: Option<&Prefix>,
  all_fields: bool,
  stack: &mut Vec<NamedId>,
  out: &mut Vec<EnvField>,
) {
  let Type::Struct(st) = ty.underlying(universe) else { return };
  for field in &st.fields {
    let var = &field.var;
    if !var.exported && !all_fields {
      continue;
    }
    let env_tag = field.tags.get("env");
    let options = env_tag.map(|it| it.options.as_slice()).unwrap_or_default();
    let mut env = match env_tag {
      Some(tag) if !tag.name.is_empty() => tag.name.clone(),
      _ => var.name.value.to_shouty_snake_case(),
    };
    let mut flag = match field.tags.get("flag") {
      Some(tag) if !tag.name.is_empty() => tag.name.clone(),
      _ => var.name.value.to_kebab_case(),
    };
    let mut path = var.name.value.clone();
    if let Some(prefix) = prefix {
      env = format!("{}_{}", prefix.env, env);
      flag = format!("{}-{}", prefix.flag, flag);
      path = format!("{}.{}", prefix.path, path);
    }

    let nested = match &var.ty {
      Type::Struct(st) if !st.pointer => true,
      Type::Named(named) if !named.pointer && !is_leaf_named(universe, named.id) => {
        matches!(universe.get(named.id).underlying, Type::Struct(_))
      }
      _ => false,
    };
    if nested {
      let named_id = var.ty.named(universe).map(|it| it.id);
      if named_id.is_some_and(|id| stack.contains(&id)) {
        continue;
      }
      stack.extend(named_id);
      let prefix = Prefix { env, flag, path };
      walk_struct(universe, &var.ty, Some(&prefix), all_fields, stack, out);
      if named_id.is_some() {
        stack.pop();
      }
      continue;
    }

    let desc = options.iter().find_map(|it| it.strip_prefix("desc:")).unwrap_or_default().to_owned();
    out.push(EnvField {
      env,
      flag: options.iter().any(|it| it == "use_flag").then_some(flag),
      path,
      var: var.clone(),
      desc,
      required: options.iter().any(|it| it == "required"),
      use_zero: options.iter().any(|it| it == "use_zero"),
    });
  }
}

/// Struct types parsed from a single string rather than walked.
fn is_leaf_named(universe: &Universe, id: NamedId) -> bool {
  let named = universe.get(id);
  matches!(
    (named.pkg.path.as_str(), named.name.value.as_str()),
    ("time", "Time")
      | ("time", "Duration")
      | ("net/url", "URL")
      | ("github.com/google/uuid", "UUID")
      | ("github.com/satori/go.uuid", "UUID")
      | ("github.com/pborman/uuid", "UUID")
  )
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::testutil;

  const APP: &str = r#"package app

import "time"

type DB struct {
	Host string `env:",required"`
	Port int
}

type Cfg struct {
	Port    int           `env:"PORT,required"`
	Host    string        `env:"HOST,use_flag"`
	Debug   bool          `env:"DEBUG,use_zero,required,desc:verbose output"`
	Timeout time.Duration
	Tags    []string
	DB      DB
	secret  string
}
"#;

  const SWIPE: &str = r#"//go:build swipe

package app

import "example.com/app/pkg/swipe/swipeconfig"

func Swipe() {
	swipeconfig.Build(swipeconfig.ConfigEnv(&Cfg{}, swipeconfig.FuncName("LoadConfig"), swipeconfig.EnableDoc()))
}
"#;

  #[test]
  fn flattens_nested_structs() {
    let (_dir, loader) = testutil::load(&[("app.go", APP)]);
    let mut normalizer = crate::normalize::Normalizer::new(&loader);
    let id = normalizer.named("example.com/app", "Cfg").unwrap();
    let fields = walk(normalizer.universe(), id, true);
    let names = fields.iter().map(|it| (it.name().to_owned(), it.path.clone())).collect::<Vec<_>>();
    assert_eq!(
      names,
      vec![
        ("PORT".to_owned(), "Port".to_owned()),
        ("host".to_owned(), "Host".to_owned()),
        ("DEBUG".to_owned(), "Debug".to_owned()),
        ("TIMEOUT".to_owned(), "Timeout".to_owned()),
        ("TAGS".to_owned(), "Tags".to_owned()),
        ("DB_HOST".to_owned(), "DB.Host".to_owned()),
        ("DB_PORT".to_owned(), "DB.Port".to_owned()),
        ("SECRET".to_owned(), "secret".to_owned()),
      ]
    );
    assert_eq!(fields[1].env, "HOST");
    assert_eq!(fields[2].desc, "verbose output");
    assert!(fields[2].use_zero && fields[2].required);
    assert!(fields[5].required);
    assert_eq!(walk(normalizer.universe(), id, false).len(), 7);
  }

  #[test]
  fn generates_the_loader() {
    let (_dir, loader) = testutil::load(&[("app.go", APP), ("swipe.go", SWIPE)]);
    let files = testutil::emit(&loader);
    let out = &files["swipe_gen_config_config.go"];

    assert!(out.contains("func LoadConfig() (cfg *Cfg, errs []error) {\ncfg = &Cfg{}\n"));
    assert!(out.contains("if s, ok := os.LookupEnv(\"PORT\"); ok {\nportInt, err := strconv.Atoi(s)\n"));
    assert!(out.contains("errs = append(errs, fmt.Errorf(\"convert PORT error: %w\", err))\n"));
    assert!(out.contains("if cfg.Port == 0 {\nerrs = append(errs, errors.New(\"env PORT required\"))\n}\n"));
    assert!(out.contains("} else {\nerrs = append(errs, errors.New(\"env PORT required\"))\n}\n"));
    assert!(!out.contains("if cfg.Debug == false"));
    assert!(out.contains("cfg.Host = s\nseen[\"host\"] = struct{}{}\n"));
    assert!(out.contains("flag.StringVar(&cfg.Host, \"host\", cfg.Host, \"\")\n"));
    assert!(out.contains("flag.Parse()\n"));
    assert!(out.contains("timeoutDur, err := time.ParseDuration(s)\n"));
    assert!(out.contains("os.LookupEnv(\"DB_HOST\")"));
    assert!(out.contains("func (cfg *Cfg) String() string {\n"));
    assert!(out.contains("fmt.Fprintf(&b, \"DEBUG=%v ; verbose output\\n\", cfg.Debug)\n"));
    assert!(out.contains("fmt.Fprintf(&b, \"--host %v\\n\", cfg.Host)\n"));

    let doc = &files["swipe_gen_config_config_doc.md"];
    assert!(doc.starts_with("# Config\n\n## Environment variables\n\n"));
    assert!(doc.contains("|PORT|<code>int</code>| |yes|no|\n"));
    assert!(doc.contains("|DEBUG|<code>bool</code>|verbose output|yes|yes|\n"));
    assert!(doc.contains("## Flags\n\n"));
    assert!(doc.contains("|host|<code>string</code>| |no|no|\n"));
  }

  #[test]
  fn rejects_non_struct_types() {
    let swipe = SWIPE.replace("&Cfg{}", "Level(\"\")");
    let app = format!("{}\ntype Level string\n", APP);
    let (_dir, loader) = testutil::load(&[("app.go", app.as_str()), ("swipe.go", swipe.as_str())]);
    let (_, errs) = testutil::emit_with_errors(&loader);
    assert!(errs.iter().any(|it| it.to_string() == "Config: ConfigEnv: Level is not a struct"), "{:?}", errs);
  }
}

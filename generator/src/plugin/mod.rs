//! Registry of the plugins that turn decoded option trees into files.

pub mod config;
pub mod gokit;

use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::trace;

use crate::error::SwipeError;
use crate::importer::Importer;
use crate::loader::Loader;
use crate::normalize::Normalizer;
use crate::option::schema::Schema;
use crate::option::{Build, Module, OptionValue};

/// One output file of a plugin.
pub trait Generator {
  /// Base name without the `swipe_gen_<plugin>_` prefix.
  fn filename(&self) -> &str;

  /// Directory relative to the build package, empty for the package itself.
  fn output_dir(&self) -> &str {
    ""
  }

  /// Go package clause override for files written outside the build package.
  fn package(&self) -> Option<&str> {
    None
  }

  fn generate(&self, importer: &mut Importer) -> Result<String, SwipeError>;
}

/// State shared with a plugin while it configures itself for one build.
pub struct ConfigureContext<'c, 'a> {
  pub loader: &'a Loader,
  pub normalizer: &'c mut Normalizer<'a>,
  pub module: &'c Module,
  pub build: &'c Build,
}

pub trait Plugin {
  fn id(&self) -> &'static str;

  fn configure(&mut self, ctx: &mut ConfigureContext, options: &OptionValue) -> Result<(), Vec<SwipeError>>;

  /// Emitters in output order. Only valid after a successful `configure`.
  fn generators(&self) -> Vec<Box<dyn Generator + '_>>;
}

#[derive(Clone, Copy)]
pub struct PluginEntry {
  pub id: &'static str,
  pub schema: &'static Schema,
  pub factory: fn() -> Box<dyn Plugin>,
}

static PLUGINS: Lazy<RwLock<Vec<PluginEntry>>> = Lazy::new(|| {
  RwLock::new(vec![
    PluginEntry { id: gokit::ID, schema: &gokit::SCHEMA, factory: gokit::new },
    PluginEntry { id: config::ID, schema: &config::SCHEMA, factory: config::new },
  ])
});

/// Adds a plugin. Ids compare case-insensitively since they also name the
/// options package.
pub fn register(entry: PluginEntry) -> Result<(), SwipeError> {
  let mut plugins = PLUGINS.write().unwrap_or_else(PoisonError::into_inner);
  if plugins.iter().any(|it| it.id.eq_ignore_ascii_case(entry.id)) {
    return Err(SwipeError::DuplicatePlugin(entry.id.to_owned()));
  }
  trace!("registered plugin {}", entry.id);
  plugins.push(entry);
  Ok(())
}

pub fn lookup(id: &str) -> Option<PluginEntry> {
  PLUGINS.read().unwrap_or_else(PoisonError::into_inner).iter().find(|it| it.id == id).copied()
}

/// Fresh plugin instance for one build.
pub fn create(id: &str) -> Result<Box<dyn Plugin>, SwipeError> {
  lookup(id).map(|it| (it.factory)()).ok_or_else(|| SwipeError::UnknownPlugin(id.to_owned()))
}

/// Plugin id of an options package name such as `swipegokit`.
pub fn id_for_package(pkg_name: &str) -> Option<&'static str> {
  let suffix = pkg_name.strip_prefix("swipe")?;
  PLUGINS
    .read()
    .unwrap_or_else(PoisonError::into_inner)
    .iter()
    .find(|it| it.id.eq_ignore_ascii_case(suffix))
    .map(|it| it.id)
}

pub fn schema(id: &str) -> Option<&'static Schema> {
  lookup(id).map(|it| it.schema)
}

pub fn schemas() -> Vec<&'static Schema> {
  PLUGINS.read().unwrap_or_else(PoisonError::into_inner).iter().map(|it| it.schema).collect()
}

/// Generated options package for an import path ending in `swipe<id>`.
pub fn options_stub(import_path: &str) -> Option<String> {
  let name = import_path.rsplit('/').next()?;
  id_for_package(name).and_then(schema).map(|it| it.render())
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  struct Echo;

  impl Plugin for Echo {
    fn id(&self) -> &'static str {
      "Echo"
    }

    fn configure(&mut self, _ctx: &mut ConfigureContext, _options: &OptionValue) -> Result<(), Vec<SwipeError>> {
      Ok(())
    }

    fn generators(&self) -> Vec<Box<dyn Generator + '_>> {
      Vec::new()
    }
  }

  static ECHO: Schema = Schema { id: "Echo", funcs: &[] };

  #[test]
  fn builtins_are_registered() {
    assert_eq!(id_for_package("swipegokit"), Some("Gokit"));
    assert_eq!(id_for_package("swipeconfig"), Some("Config"));
    assert_eq!(id_for_package("gokit"), None);
    assert!(schemas().len() >= 2);
    assert!(create("Gokit").is_ok());
    assert!(matches!(create("Nope"), Err(SwipeError::UnknownPlugin(_))));
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let entry = PluginEntry { id: "GOKIT", schema: &ECHO, factory: || Box::new(Echo) };
    assert!(matches!(register(entry), Err(SwipeError::DuplicatePlugin(id)) if id == "GOKIT"));

    let entry = PluginEntry { id: "Echo", schema: &ECHO, factory: || Box::new(Echo) };
    register(entry).unwrap();
    assert_eq!(create("Echo").unwrap().id(), "Echo");
    assert!(register(entry).is_err());
  }

  #[test]
  fn stubs_follow_the_last_path_segment() {
    let stub = options_stub("example.com/app/pkg/swipe/swipegokit").unwrap();
    assert!(stub.contains("package swipegokit"));
    assert!(stub.contains("func HTTPServer() GokitOption"));
    assert!(options_stub("example.com/app/pkg/other").is_none());
  }
}

//! Drives a whole run: clean, load, decode, configure, emit and frame.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use heck::ToSnakeCase;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::SwipeError;
use crate::frame;
use crate::importer::Importer;
use crate::loader::{normalize_path, Loader};
use crate::normalize::Normalizer;
use crate::option::{Build, Decoder, Module};
use crate::plugin::{self, ConfigureContext, Plugin};

pub const DEFAULT_PREFIX: &str = "swipe_gen_";

#[derive(Debug, Clone)]
pub struct Config {
  pub work_dir: PathBuf,
  pub env: BTreeMap<String, String>,
  pub patterns: Vec<String>,
  /// File name prefix of every generated file; also what the pre-clean removes.
  pub prefix: String,
}

impl Config {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Config {
      work_dir: work_dir.into(),
      env: std::env::vars().collect(),
      patterns: vec!["./...".to_owned()],
      prefix: DEFAULT_PREFIX.to_owned(),
    }
  }
}

#[derive(Debug)]
pub struct GenerateResult {
  pub pkg_path: String,
  pub output_path: PathBuf,
  pub content: String,
  pub errs: Vec<SwipeError>,
}

#[derive(Debug, Default)]
pub struct Output {
  pub results: Vec<GenerateResult>,
  /// Errors not tied to one output file.
  pub errs: Vec<SwipeError>,
}

impl Output {
  pub fn has_fatal(&self) -> bool {
    self.errs.iter().chain(self.results.iter().flat_map(|it| &it.errs)).any(|it| !it.is_warn())
  }
}

/// An emitted file before framing.
#[derive(Debug)]
pub(crate) struct Emitted {
  pub pkg_path: String,
  pub pkg_name: String,
  pub output_path: PathBuf,
  pub body: Result<String, SwipeError>,
  pub imports: Vec<(Option<String>, String)>,
}

pub struct Swipe {
  config: Config,
}

impl Swipe {
  pub fn new(config: Config) -> Self {
    Swipe { config }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Runs the pipeline and returns the framed files; nothing is written
  /// except for the removal of stale generated files.
  pub fn generate(&self) -> Output {
    let mut output = Output::default();
    match clean(&self.config.work_dir, &self.config.prefix) {
      Ok(removed) if removed > 0 => debug!("removed {} stale files", removed),
      Ok(_) => {}
      Err(err) => {
        error!("{}", err);
        output.errs.push(err);
      }
    }

    let loader = match Loader::load(&self.config.work_dir, &self.config.env, &self.config.patterns) {
      Ok(loader) => loader,
      Err(errs) => {
        for err in &errs {
          error!("{}", err);
        }
        output.errs.extend(errs);
        return output;
      }
    };

    let (emitted, errs) = emit(&loader, &self.config.prefix);
    output.errs.extend(errs);
    for file in emitted {
      let mut errs = Vec::new();
      let filename = file.output_path.file_name().map(|it| it.to_string_lossy().into_owned()).unwrap_or_default();
      let content = file
        .body
        .and_then(|body| frame::frame(&filename, &file.pkg_name, &file.imports, &body))
        .unwrap_or_else(|err| {
          errs.push(err);
          String::new()
        });
      output.results.push(GenerateResult { pkg_path: file.pkg_path, output_path: file.output_path, content, errs });
    }
    output
  }

  /// Writes every result without errors, attaching I/O failures to it.
  pub fn write(results: &mut [GenerateResult]) {
    for result in results.iter_mut().filter(|it| it.errs.is_empty()) {
      let written = result
        .output_path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(&result.output_path, &result.content));
      match written {
        Ok(()) => info!("generated {}", result.output_path.display()),
        Err(source) => result.errs.push(SwipeError::File { path: result.output_path.clone(), source }),
      }
    }
  }

  /// Writes the options stub package of every plugin below
  /// `<work_dir>/<swipe_pkg>/swipe`.
  pub fn init(&self, swipe_pkg: &str) -> Result<Vec<PathBuf>, SwipeError> {
    let mut written = Vec::new();
    for schema in plugin::schemas() {
      let dir = self.config.work_dir.join(swipe_pkg).join("swipe").join(schema.package_name());
      fs::create_dir_all(&dir).map_err(|source| SwipeError::File { path: dir.clone(), source })?;
      let path = dir.join("swipe.go");
      fs::write(&path, schema.render()).map_err(|source| SwipeError::File { path: path.clone(), source })?;
      info!("wrote options for {} to {}", schema.id, path.display());
      written.push(path);
    }
    Ok(written)
  }
}

/// Package patterns listed in a `pkgs` file, one per line; blank lines and
/// `#` comments are skipped. A missing file yields `None`.
pub fn read_patterns(path: &Path) -> Result<Option<Vec<String>>, SwipeError> {
  let source = match fs::read_to_string(path) {
    Ok(source) => source,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(source) => return Err(SwipeError::File { path: path.to_path_buf(), source }),
  };
  let patterns = source
    .lines()
    .map(str::trim)
    .filter(|it| !it.is_empty() && !it.starts_with('#'))
    .map(str::to_owned)
    .collect();
  Ok(Some(patterns))
}

/// Removes files named `<prefix>*` below `work_dir`, skipping vendored code.
pub fn clean(work_dir: &Path, prefix: &str) -> Result<usize, SwipeError> {
  let mut removed = 0;
  let walker = WalkDir::new(work_dir).into_iter().filter_entry(|entry| {
    entry.depth() == 0 || !(entry.file_type().is_dir() && matches!(entry.file_name().to_str(), Some("vendor" | ".git")))
  });
  for entry in walker {
    let entry = entry.map_err(|err| SwipeError::Io(err.into()))?;
    if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().starts_with(prefix) {
      continue;
    }
    fs::remove_file(entry.path()).map_err(|source| SwipeError::File { path: entry.path().to_path_buf(), source })?;
    removed += 1;
  }
  Ok(removed)
}

/// Decodes every build of the loaded root module and runs its plugins.
pub(crate) fn emit(loader: &Loader, prefix: &str) -> (Vec<Emitted>, Vec<SwipeError>) {
  let mut normalizer = Normalizer::new(loader);
  let (modules, mut errs) = Decoder::new(loader, &mut normalizer).decode();
  let mut emitted = Vec::new();

  for module in modules.iter().filter(|it| !it.external) {
    for build in &module.builds {
      let (files, build_errs) = emit_build(loader, &mut normalizer, module, build, prefix);
      emitted.extend(files);
      errs.extend(build_errs);
    }
  }
  for err in &errs {
    if err.is_warn() {
      warn!("{}", err);
    } else {
      error!("{}", err);
    }
  }
  (emitted, errs)
}

fn emit_build<'a>(
  loader: &'a Loader,
  normalizer: &mut Normalizer<'a>,
  module: &Module,
  build: &Build,
  prefix: &str,
) -> (Vec<Emitted>, Vec<SwipeError>) {
  let mut errs = Vec::new();
  let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();

  for (id, tree) in &build.options {
    if let Ok(json) = tree.to_json() {
      debug!("{} options for {}: {}", id, build.pkg.path, json);
    }
    let mut plugin = match plugin::create(id) {
      Ok(plugin) => plugin,
      Err(err) => {
        errs.push(err);
        continue;
      }
    };
    let mut ctx = ConfigureContext { loader, normalizer: &mut *normalizer, module, build };
    match plugin.configure(&mut ctx, tree) {
      Ok(()) => plugins.push(plugin),
      Err(plugin_errs) => errs.extend(plugin_errs),
    }
  }

  let universe = normalizer.universe();
  let mut emitted = Vec::new();
  for plugin in &plugins {
    for generator in plugin.generators() {
      let dir = normalize_path(&build.base_path.join(generator.output_dir()));
      let (pkg_path, default_name) = if dir == build.base_path {
        (build.pkg.path.clone(), build.pkg.name.clone())
      } else {
        package_of(loader, &dir)
      };
      let pkg_name = generator.package().map(|it| it.to_owned()).unwrap_or(default_name);
      let filename = format!("{}{}_{}", prefix, plugin.id().to_snake_case(), generator.filename());

      let scope = loader
        .package(&pkg_path)
        .map(|pkg| {
          let funcs = pkg.funcs.keys().filter(|it| !it.contains('.')).cloned();
          pkg.types.keys().cloned().chain(funcs).chain(pkg.consts.keys().cloned()).collect::<Vec<_>>()
        })
        .unwrap_or_default();
      let mut importer = Importer::new(&pkg_path, universe).with_scope(scope);
      let body = generator.generate(&mut importer);
      debug!("emitted {} for {}", filename, pkg_path);
      emitted.push(Emitted {
        pkg_path,
        pkg_name,
        output_path: dir.join(&filename),
        body,
        imports: importer.sorted_imports(),
      });
    }
  }
  (emitted, errs)
}

/// Import path and package name of a directory inside the root module.
fn package_of(loader: &Loader, dir: &Path) -> (String, String) {
  let name = dir
    .file_name()
    .map(|it| it.to_string_lossy().replace(['-', '.'], "_"))
    .unwrap_or_else(|| "main".to_owned());
  let module = loader.module();
  let path = match dir.strip_prefix(&module.dir) {
    Ok(rel) if rel.as_os_str().is_empty() => module.module.clone(),
    Ok(rel) => {
      let rel = rel.components().map(|it| it.as_os_str().to_string_lossy().into_owned()).collect::<Vec<_>>();
      format!("{}/{}", module.module, rel.join("/"))
    }
    Err(_) => name.clone(),
  };
  match loader.package(&path) {
    Some(pkg) => (path, pkg.name.clone()),
    None => (path, name),
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::testutil;

  #[test]
  fn clean_skips_vendor() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("vendor/x")).unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::write(dir.path().join("vendor/x/swipe_gen_a.go"), "").unwrap();
    fs::write(dir.path().join("app/swipe_gen_b.go"), "").unwrap();
    fs::write(dir.path().join("app/b.go"), "").unwrap();
    assert_eq!(clean(dir.path(), DEFAULT_PREFIX).unwrap(), 1);
    assert!(dir.path().join("vendor/x/swipe_gen_a.go").exists());
    assert!(!dir.path().join("app/swipe_gen_b.go").exists());
    assert!(dir.path().join("app/b.go").exists());
  }

  #[test]
  fn pkgs_file_lists_patterns() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(read_patterns(&dir.path().join("pkgs")).unwrap(), None);
    fs::write(dir.path().join("pkgs"), "# services\n./app/...\n\n  ./cmd/api  \n").unwrap();
    assert_eq!(
      read_patterns(&dir.path().join("pkgs")).unwrap(),
      Some(vec!["./app/...".to_owned(), "./cmd/api".to_owned()])
    );
  }

  #[test]
  fn unknown_plugins_are_warnings() {
    let (_dir, loader) = testutil::load(&[]);
    let mut normalizer = Normalizer::new(&loader);
    let build = Build {
      pkg: Default::default(),
      base_path: loader.work_dir().to_path_buf(),
      options: vec![("Nope".to_owned(), crate::option::OptionValue::map())],
    };
    let module = Module { path: "example.com/app".to_owned(), external: false, builds: Vec::new() };
    let (files, errs) = emit_build(&loader, &mut normalizer, &module, &build, DEFAULT_PREFIX);
    assert!(files.is_empty());
    assert_eq!(errs.len(), 1);
    assert!(errs[0].is_warn());
  }

  #[test]
  fn packages_outside_the_build() {
    let (dir, loader) = testutil::load(&[]);
    let (path, name) = package_of(&loader, &dir.path().join("pkg/http-client"));
    assert_eq!(path, "example.com/app/pkg/http-client");
    assert_eq!(name, "http_client");
  }

  #[test]
  fn init_writes_stubs() {
    let dir = tempfile::tempdir().unwrap();
    let swipe = Swipe::new(Config::new(dir.path()));
    let written = swipe.init("pkg").unwrap();
    assert!(written.contains(&dir.path().join("pkg/swipe/swipegokit/swipe.go")));
    assert!(written.contains(&dir.path().join("pkg/swipe/swipeconfig/swipe.go")));
    let source = fs::read_to_string(dir.path().join("pkg/swipe/swipeconfig/swipe.go")).unwrap();
    assert!(source.contains("func ConfigEnv(structType interface{}, opts ...ConfigEnvOption) ConfigOption {"));
  }
}

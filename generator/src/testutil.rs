//! Fixture helpers shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use tempfile::TempDir;

use crate::error::SwipeError;
use crate::loader::Loader;
use crate::swipe::{self, DEFAULT_PREFIX};

/// Module `example.com/app` holding `files`, loaded with every package.
pub fn load(files: &[(&str, &str)]) -> (TempDir, Loader) {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();
  for (path, content) in files {
    let path = dir.path().join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
  let env = BTreeMap::from([("GOMODCACHE".to_owned(), "/nonexistent".to_owned())]);
  let loader = Loader::load(dir.path(), &env, &["./...".to_owned()]).unwrap();
  (dir, loader)
}

/// Unframed bodies keyed by their path relative to the module root.
pub fn emit_with_errors(loader: &Loader) -> (BTreeMap<String, String>, Vec<SwipeError>) {
  let (emitted, mut errs) = swipe::emit(loader, DEFAULT_PREFIX);
  let mut files = BTreeMap::new();
  for file in emitted {
    let rel = file.output_path.strip_prefix(loader.work_dir()).unwrap().to_string_lossy().into_owned();
    match file.body {
      Ok(body) => {
        files.insert(rel, body);
      }
      Err(err) => errs.push(err),
    }
  }
  (files, errs)
}

pub fn emit(loader: &Loader) -> BTreeMap<String, String> {
  let (files, errs) = emit_with_errors(loader);
  assert!(errs.is_empty(), "{:?}", errs);
  files
}

pub fn names(files: &BTreeMap<String, String>) -> BTreeSet<&str> {
  files.keys().map(|it| it.as_str()).collect()
}

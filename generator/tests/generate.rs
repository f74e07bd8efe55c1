use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use test_log::test;

use swipe::frame::header;
use swipe::{Config, Swipe};

const APP: &str = r#"package app

import "context"

type Item struct {
	ID   int    `json:"id"`
	Name string `json:"name"`
}

// Store keeps items.
type Store interface {
	// Put saves an item.
	Put(ctx context.Context, name string) (id int, err error)
	Get(ctx context.Context, id int) (*Item, error)
}
"#;

const APP_SWIPE: &str = r#"//go:build swipe

package app

import . "example.com/app/pkg/swipe/swipegokit"

func Swipe() {
	Build(
		HTTPServer(),
		ClientsEnable([]string{"go"}),
		CURLEnable(),
		OpenapiEnable(),
		OpenapiOutput("docs"),
		Interface((*Store)(nil), ""),
		MethodOptions(Store.Put, RESTMethod("POST"), Logging(true)),
		MethodOptions(Store.Get, RESTPath("/items/{id}")),
	)
}
"#;

const CONFIG: &str = r#"package config

type Config struct {
	Port int    `env:"PORT,required"`
	Host string `env:"HOST,use_flag"`
}
"#;

const CONFIG_SWIPE: &str = r#"//go:build swipe

package config

import "example.com/app/pkg/swipe/swipeconfig"

func Swipe() {
	swipeconfig.Build(swipeconfig.ConfigEnv(&Config{}, swipeconfig.EnableDoc()))
}
"#;

fn module() -> tempfile::TempDir {
  let dir = tempfile::tempdir().unwrap();
  for (path, content) in [
    ("go.mod", "module example.com/app\n\ngo 1.21\n"),
    ("app.go", APP),
    ("swipe.go", APP_SWIPE),
    ("config/config.go", CONFIG),
    ("config/swipe.go", CONFIG_SWIPE),
  ] {
    let path = dir.path().join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
  dir
}

fn config(dir: &Path) -> Config {
  let mut config = Config::new(dir);
  config.env = BTreeMap::from([("GOMODCACHE".to_owned(), "/nonexistent".to_owned())]);
  config
}

/// Writes one run and returns the written files keyed by relative path.
fn run(dir: &Path) -> BTreeMap<String, String> {
  let swipe = Swipe::new(config(dir));
  let mut output = swipe.generate();
  assert!(!output.has_fatal(), "{:?}", output);
  Swipe::write(&mut output.results);
  output
    .results
    .iter()
    .map(|it| {
      assert!(it.errs.is_empty(), "{:?}", it.errs);
      let rel = it.output_path.strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/");
      (rel, fs::read_to_string(&it.output_path).unwrap())
    })
    .collect()
}

#[test]
fn writes_every_output_with_its_header() {
  let dir = module();
  let files = run(dir.path());
  let names = files.keys().map(|it| it.as_str()).collect::<Vec<_>>();
  for name in [
    "swipe_gen_gokit_curl.md",
    "swipe_gen_gokit_endpoint.go",
    "swipe_gen_gokit_helpers.go",
    "swipe_gen_gokit_interface.go",
    "swipe_gen_gokit_logging.go",
    "swipe_gen_gokit_rest.go",
    "swipe_gen_gokit_rest_client.go",
    "swipe_gen_gokit_client_struct.go",
    "docs/swipe_gen_gokit_openapi.json",
    "config/swipe_gen_config_config.go",
    "config/swipe_gen_config_config_doc.md",
  ] {
    assert!(names.contains(&name), "{} missing from {:?}", name, names);
  }

  for (name, content) in &files {
    assert!(!content.is_empty(), "{} is empty", name);
    if name.ends_with(".go") {
      assert!(content.starts_with(&format!("{}\n\n//go:build !swipe\n", header())), "{}", name);
    } else if name.ends_with(".js") {
      assert!(content.starts_with(&header()), "{}", name);
    }
  }
  assert!(files["swipe_gen_gokit_rest.go"].contains("package app\n"));
  assert!(files["config/swipe_gen_config_config.go"].contains("package config\n"));
  let openapi: serde_json::Value = serde_json::from_str(&files["docs/swipe_gen_gokit_openapi.json"]).unwrap();
  assert_eq!(openapi["openapi"], "3.0.0");
}

#[test]
fn second_run_is_identical_and_cleans_stale_files() {
  let dir = module();
  let first = run(dir.path());
  assert!(!first.is_empty());
  assert!(first.contains_key("swipe_gen_gokit_rest.go"));
  assert!(first.contains_key("config/swipe_gen_config_config.go"));

  let stale = dir.path().join("config/swipe_gen_config_removed.go");
  fs::write(&stale, "package config\n\nthis is not go\n").unwrap();
  let second = run(dir.path());

  assert!(!stale.exists());
  assert_eq!(first, second);
}

#[test]
fn clean_removes_only_prefixed_files() {
  let dir = module();
  run(dir.path());
  let removed = swipe::swipe::clean(dir.path(), swipe::swipe::DEFAULT_PREFIX).unwrap();
  assert!(removed >= 11);
  assert!(!dir.path().join("swipe_gen_gokit_rest.go").exists());
  assert!(dir.path().join("app.go").exists());
  assert!(dir.path().join("config/swipe.go").exists());
}

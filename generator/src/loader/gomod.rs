use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SwipeError;
use swipe_parser::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
  pub path: String,
  pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceTarget {
  /// Local directory, relative to the module root when not absolute.
  Dir(PathBuf),
  Module { path: String, version: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
  pub path: String,
  pub version: Option<String>,
  pub target: ReplaceTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoMod {
  pub module: String,
  pub go: Option<String>,
  pub dir: PathBuf,
  pub requires: Vec<Require>,
  pub replaces: Vec<Replace>,
}

/// Walks up from `start` to the first directory holding a `go.mod`.
pub fn find(start: &Path) -> Result<GoMod, SwipeError> {
  let mut dir = Some(start);
  while let Some(current) = dir {
    let candidate = current.join("go.mod");
    if candidate.is_file() {
      debug!("found module file {:?}", candidate);
      let source = fs::read_to_string(&candidate).map_err(|source| SwipeError::File { path: candidate.clone(), source })?;
      let mut gomod = parse(&source).map_err(|(line, message)| SwipeError::Load {
        path: candidate.clone(),
        position: Span { start: 0, end: 0, line, column: 1 },
        message,
      })?;
      gomod.dir = current.to_path_buf();
      return Ok(gomod);
    }
    dir = current.parent();
  }
  Err(SwipeError::Pattern {
    pattern: start.display().to_string(),
    message: "go mod not found, run go mod init".to_owned(),
  })
}

fn strip_comment(line: &str) -> &str {
  match line.find("//") {
    Some(index) => &line[..index],
    None => line,
  }
  .trim()
}

fn unquote(value: &str) -> String {
  value.trim_matches(|ch| ch == '"' || ch == '`').to_owned()
}

fn is_local(path: &str) -> bool {
  path.starts_with("./") || path.starts_with("../") || path.starts_with('/') || path == "." || path == ".."
}

fn parse_replace(fields: &[&str]) -> Option<Replace> {
  let arrow = fields.iter().position(|it| *it == "=>")?;
  let (old, new) = (&fields[..arrow], &fields[arrow + 1..]);
  let path = unquote(old.first()?);
  let version = old.get(1).map(|it| unquote(it));
  let target_path = unquote(new.first()?);
  let target = if is_local(&target_path) {
    ReplaceTarget::Dir(PathBuf::from(target_path))
  } else {
    ReplaceTarget::Module { path: target_path, version: unquote(new.get(1)?) }
  };
  Some(Replace { path, version, target })
}

/// Parses the directives the loader needs. Errors carry the 1-based line.
pub fn parse(source: &str) -> Result<GoMod, (usize, String)> {
  let mut gomod = GoMod::default();
  let mut block: Option<String> = None;

  for (index, raw) in source.lines().enumerate() {
    let line_no = index + 1;
    let line = strip_comment(raw);
    if line.is_empty() {
      continue;
    }
    if block.is_some() && line == ")" {
      block = None;
      continue;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let (verb, args) = match &block {
      Some(verb) => (verb.as_str(), &fields[..]),
      None => {
        if fields.len() == 2 && fields[1] == "(" {
          block = Some(fields[0].to_owned());
          continue;
        }
        (fields[0], &fields[1..])
      }
    };

    match verb {
      "module" => {
        let path = args.first().ok_or((line_no, "usage: module module/path".to_owned()))?;
        gomod.module = unquote(path);
      }
      "go" => gomod.go = args.first().map(|it| (*it).to_owned()),
      "require" => {
        if args.len() < 2 {
          return Err((line_no, "usage: require module/path v1.2.3".to_owned()));
        }
        gomod.requires.push(Require { path: unquote(args[0]), version: unquote(args[1]) });
      }
      "replace" => {
        let replace = parse_replace(args).ok_or((line_no, "usage: replace module/path [v1.2.3] => other/module v1.4".to_owned()))?;
        gomod.replaces.push(replace);
      }
      _ => {}
    }
  }

  if gomod.module.is_empty() {
    return Err((1, "no module declaration in go.mod".to_owned()));
  }
  Ok(gomod)
}

/// Case-encodes a module path the way the module cache stores it.
pub fn escape_path(path: &str) -> String {
  let mut escaped = String::with_capacity(path.len());
  for ch in path.chars() {
    if ch.is_ascii_uppercase() {
      escaped.push('!');
      escaped.push(ch.to_ascii_lowercase());
    } else {
      escaped.push(ch);
    }
  }
  escaped
}

impl GoMod {
  /// Longest `require`d module path that prefixes `import_path`.
  pub fn require_for(&self, import_path: &str) -> Option<&Require> {
    self
      .requires
      .iter()
      .filter(|it| is_prefix(&it.path, import_path))
      .max_by_key(|it| it.path.len())
  }

  pub fn replace_for(&self, import_path: &str) -> Option<&Replace> {
    self
      .replaces
      .iter()
      .filter(|it| is_prefix(&it.path, import_path))
      .max_by_key(|it| it.path.len())
  }

  pub fn contains(&self, import_path: &str) -> bool {
    is_prefix(&self.module, import_path)
  }
}

/// Whether `module` is `path` or one of its parent paths.
pub fn is_prefix(module: &str, path: &str) -> bool {
  path == module || (path.starts_with(module) && path[module.len()..].starts_with('/'))
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  const GO_MOD: &str = r#"module github.com/acme/app

go 1.21

require github.com/google/uuid v1.6.0 // indirect

require (
	github.com/go-kit/kit v0.13.0
	github.com/BurntSushi/toml v1.3.2
)

replace github.com/acme/shared => ../shared
replace (
	github.com/go-kit/kit v0.13.0 => github.com/acme/kit v0.13.1
)
"#;

  #[test]
  fn parses_directives() {
    let gomod = parse(GO_MOD).unwrap();
    assert_eq!(gomod.module, "github.com/acme/app");
    assert_eq!(gomod.go.as_deref(), Some("1.21"));
    assert_eq!(gomod.requires.len(), 3);
    assert_eq!(gomod.requires[0], Require { path: "github.com/google/uuid".to_owned(), version: "v1.6.0".to_owned() });
    assert_eq!(gomod.replaces[0].target, ReplaceTarget::Dir(PathBuf::from("../shared")));
    assert_eq!(
      gomod.replaces[1].target,
      ReplaceTarget::Module { path: "github.com/acme/kit".to_owned(), version: "v0.13.1".to_owned() }
    );
    assert_eq!(gomod.replaces[1].version.as_deref(), Some("v0.13.0"));
  }

  #[test]
  fn resolves_longest_prefix() {
    let gomod = parse(GO_MOD).unwrap();
    assert_eq!(gomod.require_for("github.com/go-kit/kit/endpoint").unwrap().version, "v0.13.0");
    assert!(gomod.require_for("github.com/go-kit/kitten").is_none());
    assert!(gomod.contains("github.com/acme/app/pkg/service"));
    assert!(!gomod.contains("github.com/acme/application"));
    assert!(gomod.replace_for("github.com/acme/shared/errors").is_some());
  }

  #[test]
  fn escapes_upper_case() {
    assert_eq!(escape_path("github.com/BurntSushi/toml"), "github.com/!burnt!sushi/toml");
  }

  #[test]
  fn rejects_missing_module() {
    assert_eq!(parse("go 1.21\n").unwrap_err().0, 1);
    assert_eq!(parse("module x\nrequire foo\n").unwrap_err().0, 2);
  }
}

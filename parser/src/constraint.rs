use std::collections::HashSet;
use std::iter;

use itertools::{Itertools, PeekingNext};

use crate::span::Span;
use crate::SyntaxError;

const KNOWN_OS: &[&str] = &[
  "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux", "nacl", "netbsd", "openbsd",
  "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
  "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle", "mips64", "mips64le",
  "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv", "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
  "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux", "netbsd", "openbsd", "solaris",
];

/// Tags satisfied while loading sources for generation.
pub fn tags(goos: &str, goarch: &str, extra: &[&str]) -> HashSet<String> {
  let mut tags = HashSet::from([goos.to_owned(), goarch.to_owned(), "gc".to_owned()]);
  if UNIX_OS.contains(&goos) {
    tags.insert("unix".to_owned());
  }
  tags.extend((1..=99).map(|minor| format!("go1.{}", minor)));
  tags.extend(extra.iter().map(|it| (*it).to_owned()));
  tags
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
  Tag(String),
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
}

impl Expr {
  fn eval(&self, tags: &HashSet<String>) -> bool {
    match self {
      Expr::Tag(tag) => tags.contains(tag),
      Expr::Not(x) => !x.eval(tags),
      Expr::And(x, y) => x.eval(tags) && y.eval(tags),
      Expr::Or(x, y) => x.eval(tags) || y.eval(tags),
    }
  }
}

fn error(line: &str) -> SyntaxError {
  SyntaxError::new(format!("invalid build constraint: {}", line), Span::identity())
}

fn lex(text: &str) -> Result<Vec<String>, SyntaxError> {
  let mut tokens = Vec::new();
  let mut chars = itertools::multipeek(text.chars());
  while let Some(ch) = chars.next() {
    match ch {
      ch if ch.is_whitespace() => {}
      '(' | ')' | '!' => tokens.push(ch.to_string()),
      '&' | '|' => {
        if chars.next() != Some(ch) {
          return Err(error(text));
        }
        tokens.push(format!("{}{}", ch, ch));
      }
      ch if ch.is_alphanumeric() || ch == '_' || ch == '.' => {
        let tag = iter::once(ch)
          .chain(iter::from_fn(|| chars.by_ref().peeking_next(|c| c.is_alphanumeric() || *c == '_' || *c == '.')))
          .collect::<String>();
        tokens.push(tag);
      }
      _ => return Err(error(text)),
    }
  }
  Ok(tokens)
}

struct ExprParser<'a> {
  tokens: &'a [String],
  pos: usize,
  text: &'a str,
}

impl<'a> ExprParser<'a> {
  fn peek(&self) -> Option<&str> {
    self.tokens.get(self.pos).map(|it| it.as_str())
  }

  fn or(&mut self) -> Result<Expr, SyntaxError> {
    let mut x = self.and()?;
    while self.peek() == Some("||") {
      self.pos += 1;
      x = Expr::Or(Box::new(x), Box::new(self.and()?));
    }
    Ok(x)
  }

  fn and(&mut self) -> Result<Expr, SyntaxError> {
    let mut x = self.not()?;
    while self.peek() == Some("&&") {
      self.pos += 1;
      x = Expr::And(Box::new(x), Box::new(self.not()?));
    }
    Ok(x)
  }

  fn not(&mut self) -> Result<Expr, SyntaxError> {
    match self.peek() {
      Some("!") => {
        self.pos += 1;
        Ok(Expr::Not(Box::new(self.not()?)))
      }
      Some("(") => {
        self.pos += 1;
        let x = self.or()?;
        if self.peek() != Some(")") {
          return Err(error(self.text));
        }
        self.pos += 1;
        Ok(x)
      }
      Some(tag) if tag != ")" && tag != "&&" && tag != "||" => {
        let tag = tag.to_owned();
        self.pos += 1;
        Ok(Expr::Tag(tag))
      }
      _ => Err(error(self.text)),
    }
  }
}

fn parse_go_build(text: &str) -> Result<Expr, SyntaxError> {
  let tokens = lex(text)?;
  let mut parser = ExprParser { tokens: &tokens, pos: 0, text };
  let expr = parser.or()?;
  if parser.pos != tokens.len() {
    return Err(error(text));
  }
  Ok(expr)
}

fn eval_plus_build(text: &str, tags: &HashSet<String>) -> bool {
  text.split_whitespace().any(|option| {
    option.split(',').all(|term| match term.strip_prefix('!') {
      Some(tag) => !tags.contains(tag),
      None => tags.contains(term),
    })
  })
}

/// Evaluates the constraint lines of a file. A `//go:build` line takes
/// precedence over `// +build` lines; files without either always match.
pub fn matches(lines: &[String], tags: &HashSet<String>) -> Result<bool, SyntaxError> {
  if let Some(line) = lines.iter().find(|it| it.starts_with("go:build")) {
    let expr = parse_go_build(line["go:build".len()..].trim())?;
    return Ok(expr.eval(tags));
  }

  Ok(lines
    .iter()
    .filter_map(|it| it.trim_start().strip_prefix("+build"))
    .all(|it| eval_plus_build(it, tags)))
}

/// Applies the `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file name suffixes.
pub fn file_name_matches(name: &str, tags: &HashSet<String>) -> bool {
  let stem = name.strip_suffix(".go").unwrap_or(name);
  let parts = stem.split('_').collect_vec();
  if parts.len() < 2 {
    return true;
  }
  let last = parts[parts.len() - 1];
  let before = parts[parts.len() - 2];
  if parts.len() >= 3 && KNOWN_OS.contains(&before) && KNOWN_ARCH.contains(&last) {
    return tags.contains(before) && tags.contains(last);
  }
  if KNOWN_OS.contains(&last) || KNOWN_ARCH.contains(&last) {
    return tags.contains(last);
  }
  true
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  fn lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|it| (*it).to_owned()).collect()
  }

  #[test]
  fn swipe_tag_is_visible() {
    let tags = tags("linux", "amd64", &["swipe"]);
    assert!(matches(&lines(&["go:build swipe"]), &tags).unwrap());
    assert!(!matches(&lines(&["go:build !swipe"]), &tags).unwrap());
    assert!(matches(&lines(&[" +build swipe"]), &tags).unwrap());
    assert!(!matches(&lines(&[" +build !swipe"]), &tags).unwrap());
    assert!(matches(&[], &tags).unwrap());
  }

  #[test]
  fn go_build_expressions() {
    let tags = tags("linux", "amd64", &[]);
    assert!(matches(&lines(&["go:build (linux || darwin) && !windows"]), &tags).unwrap());
    assert!(!matches(&lines(&["go:build windows && amd64"]), &tags).unwrap());
    assert!(matches(&lines(&["go:build unix && go1.18"]), &tags).unwrap());
    assert!(matches(&lines(&["go:build linux", " +build windows"]), &tags).unwrap());
    assert!(matches(&lines(&["go:build linux && (arm || "]), &tags).is_err());
  }

  #[test]
  fn plus_build_lines_are_anded() {
    let tags = tags("darwin", "arm64", &[]);
    assert!(matches(&lines(&[" +build linux darwin", " +build arm64,!cgo"]), &tags).unwrap());
    assert!(!matches(&lines(&[" +build linux darwin", " +build amd64"]), &tags).unwrap());
  }

  #[test]
  fn file_name_suffixes() {
    let tags = tags("linux", "amd64", &[]);
    assert!(file_name_matches("service.go", &tags));
    assert!(file_name_matches("service_linux.go", &tags));
    assert!(!file_name_matches("service_windows.go", &tags));
    assert!(file_name_matches("service_linux_amd64.go", &tags));
    assert!(!file_name_matches("service_linux_arm64.go", &tags));
    assert!(file_name_matches("swipe_gen_gokit_rest.go", &tags));
  }
}

//! Final shaping of emitted files: headers, package clause, import block and
//! indentation for Go sources, a banner for JavaScript.

use crate::error::SwipeError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn header() -> String {
  format!("// Code generated by swipe v{}. DO NOT EDIT.", VERSION)
}

/// Wraps `body` for writing to `filename`.
pub fn frame(filename: &str, pkg_name: &str, imports: &[(Option<String>, String)], body: &str) -> Result<String, SwipeError> {
  match filename.rsplit_once('.').map(|(_, ext)| ext) {
    Some("go") => {
      let mut builder = String::new();
      builder.push_str(&header());
      builder.push_str("\n\n//go:build !swipe\n// +build !swipe\n\n");
      builder.push_str(&format!("package {}\n\n", pkg_name));
      builder.push_str(&import_block(imports));
      builder.push_str(body);
      format_go(&builder).map_err(|message| SwipeError::emit(filename, message))
    }
    Some("js") => Ok(format!("{}\n\n{}", header(), body.trim_start())),
    _ => Ok(body.to_owned()),
  }
}

fn is_std(path: &str) -> bool {
  !path.split('/').next().is_some_and(|it| it.contains('.'))
}

fn import_block(imports: &[(Option<String>, String)]) -> String {
  if imports.is_empty() {
    return String::new();
  }
  let line = |(alias, path): &(Option<String>, String)| match alias {
    Some(alias) => format!("{} {:?}\n", alias, path),
    None => format!("{:?}\n", path),
  };
  let std = imports.iter().filter(|it| is_std(&it.1)).map(line).collect::<String>();
  let other = imports.iter().filter(|it| !is_std(&it.1)).map(line).collect::<String>();
  let separator = if std.is_empty() || other.is_empty() { "" } else { "\n" };
  format!("import (\n{}{}{})\n\n", std, separator, other)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexical {
  Code,
  RawString,
  BlockComment,
}

fn closer_of(open: char) -> char {
  match open {
    '(' => ')',
    '[' => ']',
    _ => '}',
  }
}

/// Re-indents Go source with tabs by bracket depth, collapsing blank runs.
/// Lines continuing a raw string are left untouched.
pub fn format_go(source: &str) -> Result<String, String> {
  // Open brackets; the flag marks the bracket that indents following lines.
  let mut stack: Vec<(char, bool)> = Vec::new();
  let mut state = Lexical::Code;
  let mut out = String::with_capacity(source.len() + source.len() / 4);
  let mut blank = false;

  for (number, raw_line) in source.lines().enumerate() {
    if state == Lexical::RawString {
      out.push_str(raw_line);
      out.push('\n');
      state = scan(raw_line, state, &mut stack, number).map_err(|it| it.to_string())?.0;
      blank = false;
      continue;
    }
    let line = raw_line.trim();
    if line.is_empty() {
      if !blank && !out.is_empty() {
        out.push('\n');
      }
      blank = true;
      continue;
    }
    blank = false;

    let mut depth_at = stack.len();
    if state == Lexical::Code {
      for ch in line.chars() {
        match ch {
          ')' | ']' | '}' => depth_at = depth_at.saturating_sub(1),
          _ => break,
        }
      }
    }
    let mut indent = stack[..depth_at].iter().filter(|it| it.1).count();
    if state == Lexical::Code && (line.starts_with("case ") || line.starts_with("default:")) {
      indent = indent.saturating_sub(1);
    }
    let before = stack.len();
    let (next, floor) = scan(line, state, &mut stack, number).map_err(|it| it.to_string())?;
    state = next;
    if stack.len() > floor.min(before) {
      if let Some(last) = stack.last_mut() {
        last.1 = true;
      }
    }

    if state != Lexical::BlockComment || line.starts_with("/*") {
      out.push_str(&"\t".repeat(indent));
    }
    out.push_str(line);
    out.push('\n');
  }

  if !stack.is_empty() {
    return Err("unbalanced braces".to_owned());
  }
  while out.ends_with("\n\n") {
    out.pop();
  }
  Ok(out)
}

/// Updates the bracket stack for one line. Returns the state at the end of
/// the line and the lowest stack depth reached while scanning it.
fn scan(line: &str, mut state: Lexical, stack: &mut Vec<(char, bool)>, number: usize) -> Result<(Lexical, usize), String> {
  let mut chars = line.chars().peekable();
  let mut floor = stack.len();
  while let Some(ch) = chars.next() {
    match state {
      Lexical::RawString => {
        if ch == '`' {
          state = Lexical::Code;
        }
      }
      Lexical::BlockComment => {
        if ch == '*' && chars.peek() == Some(&'/') {
          chars.next();
          state = Lexical::Code;
        }
      }
      Lexical::Code => match ch {
        '`' => state = Lexical::RawString,
        '/' if chars.peek() == Some(&'/') => break,
        '/' if chars.peek() == Some(&'*') => {
          chars.next();
          state = Lexical::BlockComment;
        }
        '"' | '\'' => {
          let mut escaped = false;
          for inner in chars.by_ref() {
            match inner {
              '\\' if !escaped => escaped = true,
              _ if inner == ch && !escaped => break,
              _ => escaped = false,
            }
          }
        }
        '(' | '[' | '{' => stack.push((ch, false)),
        ')' | ']' | '}' => match stack.pop() {
          Some((open, _)) if closer_of(open) == ch => floor = floor.min(stack.len()),
          _ => return Err(format!("unbalanced braces at line {}", number + 1)),
        },
        _ => {}
      },
    }
  }
  Ok((state, floor))
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  #[test]
  fn frames_go_files() {
    let imports = vec![
      (Some("http2".to_owned()), "github.com/go-kit/kit/transport/http".to_owned()),
      (None, "net/http".to_owned()),
    ];
    let out = frame("swipe_gen_gokit_rest.go", "app", &imports, "func A() {\nreturn\n}\n").unwrap();
    let expected = format!(
      "{}\n\n//go:build !swipe\n// +build !swipe\n\npackage app\n\nimport (\n\t\"net/http\"\n\n\thttp2 \"github.com/go-kit/kit/transport/http\"\n)\n\nfunc A() {{\n\treturn\n}}\n",
      header()
    );
    assert_eq!(out, expected);
  }

  #[test]
  fn indents_by_bracket_depth() {
    let source = "func A() {\nfoo(func() {\nx := map[string]int{\n\"a\": 1,\n}\n})\nswitch x {\ncase 1:\nreturn \"}\"\ndefault:\n}\n}\n";
    let expected = "func A() {\n\tfoo(func() {\n\t\tx := map[string]int{\n\t\t\t\"a\": 1,\n\t\t}\n\t})\n\tswitch x {\n\tcase 1:\n\t\treturn \"}\"\n\tdefault:\n\t}\n}\n";
    assert_eq!(format_go(source).unwrap(), expected);
  }

  #[test]
  fn keeps_raw_strings_and_collapses_blank_lines() {
    let source = "var doc = `\n  {raw\n`\n\n\n\nfunc B() {}\n\n";
    assert_eq!(format_go(source).unwrap(), "var doc = `\n  {raw\n`\n\nfunc B() {}\n");
  }

  #[test]
  fn rejects_unbalanced_braces() {
    assert!(format_go("func A() {\n").is_err());
    assert!(format_go("}\n").is_err());
    let err = frame("swipe_gen_gokit_endpoint.go", "app", &[], "func A() (\n}\n").unwrap_err();
    assert!(err.to_string().starts_with("swipe_gen_gokit_endpoint.go: unbalanced braces"), "{}", err);
  }

  #[test]
  fn passes_other_files_through() {
    assert_eq!(frame("swipe_gen_gokit_openapi.json", "app", &[], "{}").unwrap(), "{}");
    assert!(frame("swipe_gen_gokit_jsonrpc_client.js", "app", &[], "\nexport default 1;\n")
      .unwrap()
      .ends_with("DO NOT EDIT.\n\nexport default 1;\n"));
  }
}

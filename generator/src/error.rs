use std::path::PathBuf;

use swipe_parser::span::Span;
use swipe_parser::SyntaxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwipeError {
  #[error("{pattern}: {message}")]
  Pattern { pattern: String, message: String },

  #[error("{}:{position}: {message}", path.display())]
  Load { path: PathBuf, position: Span, message: String },

  #[error("{}:{source}", path.display())]
  Syntax {
    path: PathBuf,
    #[source]
    source: SyntaxError,
  },

  #[error("{}:{position}: {message}", path.display())]
  Decode { path: PathBuf, position: Span, message: String },

  #[error("plugin {0:?} not found")]
  UnknownPlugin(String),

  #[error("plugin {0:?} already registered")]
  DuplicatePlugin(String),

  #[error("{plugin}: {message}")]
  Configure { plugin: String, message: String },

  #[error("{method}: unbalanced braces in {path:?}")]
  PathTemplate { method: String, path: String },

  #[error("{file}: {message}")]
  Emit { file: String, message: String },

  #[error("{}: {source}", path.display())]
  File {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl SwipeError {
  /// Warnings are reported but never fail the run.
  pub fn is_warn(&self) -> bool {
    matches!(self, SwipeError::UnknownPlugin(_))
  }

  pub fn configure(plugin: &str, message: impl Into<String>) -> Self {
    SwipeError::Configure { plugin: plugin.to_owned(), message: message.into() }
  }

  pub fn emit(file: &str, message: impl Into<String>) -> Self {
    SwipeError::Emit { file: file.to_owned(), message: message.into() }
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  #[test]
  fn only_unknown_plugin_is_a_warning() {
    assert!(SwipeError::UnknownPlugin("Echo".to_owned()).is_warn());
    assert!(!SwipeError::configure("Gokit", "type is not an interface").is_warn());
    assert!(!SwipeError::PathTemplate { method: "Get".to_owned(), path: "/a/{id".to_owned() }.is_warn());
  }

  #[test]
  fn messages_carry_positions() {
    let err = SwipeError::Decode {
      path: PathBuf::from("app/swipe.go"),
      position: Span { start: 0, end: 0, line: 12, column: 5 },
      message: "failed params name".to_owned(),
    };
    assert_eq!(err.to_string(), "app/swipe.go:12:5: failed params name");
    assert_eq!(
      SwipeError::PathTemplate { method: "Get".to_owned(), path: "/a/{id".to_owned() }.to_string(),
      "Get: unbalanced braces in \"/a/{id\""
    );
  }
}

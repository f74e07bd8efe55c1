use std::fmt::{self, Debug, Display};

/// Char-offset range in a source file. `line` and `column` are 1-based and
/// point at `start`.
#[derive(Clone, Copy, PartialEq, Debug, Eq, Hash, Default)]
pub struct Span {
  pub start: usize,
  pub end: usize,
  pub line: usize,
  pub column: usize,
}

impl Span {
  pub fn identity() -> Self {
    Self::default()
  }

  pub fn between(&self, to: Self) -> Self {
    Span {
      start: self.start,
      end: to.end.max(self.end),
      line: self.line,
      column: self.column,
    }
  }

  pub fn wrap<T>(self, value: T) -> Positioned<T> {
    Positioned { value, span: self }
  }
}

impl Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Positioned<T> {
  pub value: T,
  pub span: Span,
}

impl<T> Positioned<T> {
  pub fn new(value: T, span: Span) -> Positioned<T> {
    Positioned { value, span }
  }

  pub fn identity(value: T) -> Positioned<T> {
    Positioned { value, span: Span::identity() }
  }

  pub fn between<U>(&self, value: &Positioned<U>) -> Span {
    self.span.between(value.span)
  }

  pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Positioned<U> {
    self.span.wrap(f(self.value))
  }
}

impl<T: Debug> Debug for Positioned<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self.value)
  }
}

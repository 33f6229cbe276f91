//! The unit of transmission.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

/// Errors from [`Line::checked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    /// The text contains `\n` or `\r`, which would split it on the wire.
    #[error("line contains a line terminator")]
    EmbeddedTerminator,
}

/// One newline-free line of text.
///
/// Cloning is a reference-count bump, so a single broadcast shares one
/// allocation between all recipients. The content is opaque: sender names,
/// timestamps and the like are payload, not structure.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Line(Arc<str>);

impl Line {
    /// Wrap text as a line without validation.
    ///
    /// Used for text that came off the wire through a line decoder and so
    /// cannot contain a terminator.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Wrap text as a line, rejecting embedded `\n` / `\r`.
    pub fn checked(text: impl Into<Arc<str>>) -> Result<Self, LineError> {
        let text = text.into();
        if text.contains(['\n', '\r']) {
            return Err(LineError::EmbeddedTerminator);
        }
        Ok(Self(text))
    }

    /// The line's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether two lines share the same allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for Line {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<String> for Line {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&str> for Line {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_allocation() {
        let a = Line::from("hello");
        let b = a.clone();
        assert!(Line::ptr_eq(&a, &b));
    }

    #[test]
    fn equal_text_different_allocation() {
        let a = Line::from("hello");
        let b = Line::from("hello");
        assert_eq!(a, b);
        assert!(!Line::ptr_eq(&a, &b));
    }

    #[test]
    fn checked_rejects_terminators() {
        assert_eq!(
            Line::checked("two\nlines"),
            Err(LineError::EmbeddedTerminator)
        );
        assert_eq!(Line::checked("cr\r"), Err(LineError::EmbeddedTerminator));
        assert_eq!(Line::checked("fine").unwrap().as_str(), "fine");
    }

    #[test]
    fn line_error_is_a_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(LineError::EmbeddedTerminator);
        assert_eq!(err.to_string(), "line contains a line terminator");
    }

    #[test]
    fn empty_line_is_valid() {
        let line = Line::checked("").unwrap();
        assert!(line.is_empty());
    }

    #[test]
    fn debug_shows_quoted_text() {
        assert_eq!(format!("{:?}", Line::from("hi")), "\"hi\"");
    }
}

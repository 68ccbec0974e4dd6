//! Reply Shapes
//!
//! A request answered by the engine produces exactly one of three shapes:
//!
//! - **Null**: the key is absent (or expired)
//! - **Error**: the request failed, with a human-readable message
//! - **Bulk string**: the value's string rendering, or a count
//!
//! The engine never encodes these for a wire protocol. Transports implement
//! [`Responder`] to put them wherever they need to go.

use crate::error::StoreError;
use crate::value::Value;
use std::fmt;

/// One reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Absent key.
    Null,

    /// A failed request. The message carries an `ERR` prefix.
    Error(String),

    /// A value rendering or a count.
    Bulk(String),
}

impl Reply {
    /// Creates an error reply, adding the `ERR` prefix.
    ///
    /// # Example
    /// ```
    /// use polykv::protocol::Reply;
    /// let reply = Reply::error("unknown database");
    /// assert_eq!(reply, Reply::Error("ERR unknown database".to_string()));
    /// ```
    pub fn error(msg: impl fmt::Display) -> Self {
        Reply::Error(format!("ERR {}", msg))
    }

    pub fn bulk(s: impl Into<String>) -> Self {
        Reply::Bulk(s.into())
    }

    /// Bulk reply holding a count.
    pub fn count(n: usize) -> Self {
        Reply::Bulk(n.to_string())
    }

    /// Renders a value, or an error if the value has no string form.
    pub fn from_value(value: &dyn Value) -> Self {
        match value.as_string() {
            Some(s) => Reply::Bulk(s),
            None => Reply::error(format!(
                "value of category '{}' has no string rendering",
                value.category()
            )),
        }
    }

    /// Maps an engine error onto a reply. A missing key is not an error from
    /// the caller's point of view, it is a null.
    pub fn from_error(err: &StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(_) => Reply::Null,
            other => Reply::error(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// The bulk string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Bulk(s) => Some(s),
            _ => None,
        }
    }

    /// Hands this reply to a responder.
    pub fn write_to<R: Responder + ?Sized>(&self, out: &mut R) {
        match self {
            Reply::Null => out.write_null(),
            Reply::Error(msg) => out.write_error(msg),
            Reply::Bulk(s) => out.write_bulk_string(s),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Null => write!(f, "(nil)"),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
            Reply::Bulk(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<StoreError> for Reply {
    fn from(err: StoreError) -> Self {
        Reply::from_error(&err)
    }
}

/// Sink for replies. One call per reply.
pub trait Responder {
    fn write_null(&mut self);
    fn write_error(&mut self, msg: &str);
    fn write_bulk_string(&mut self, s: &str);
}

/// Collects replies in order.
impl Responder for Vec<Reply> {
    fn write_null(&mut self) {
        self.push(Reply::Null);
    }

    fn write_error(&mut self, msg: &str) {
        self.push(Reply::Error(msg.to_string()));
    }

    fn write_bulk_string(&mut self, s: &str) {
        self.push(Reply::Bulk(s.to_string()));
    }
}

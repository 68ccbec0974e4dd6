//! Command Handler
//!
//! The only path through which outside producers mutate stored values.
//! A request goes through three steps:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ validate()  │───>│  execute()  │───>│  handle()   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                  │             │
//! │                            ▼                  ▼             │
//! │                         Engine              Reply           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Missing keys
//!
//! `Update` never creates a key. What it does on an absent (or expired) key
//! depends on [`MissingKeyPolicy`]:
//!
//! - `Ignore` (default): nothing is mutated, the request succeeds, the reply
//!   is null.
//! - `Strict`: the request fails with `KeyNotFound`, which also replies null.

use crate::commands::request::{UpdateOp, UpdateRequest};
use crate::config::MissingKeyPolicy;
use crate::error::{Result, StoreError};
use crate::protocol::{Reply, Responder};
use crate::storage::{Database, DatabaseId, Engine};
use crate::value::{Payload, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// What a successfully executed request did.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A fresh value was stored.
    Stored(Arc<dyn Value>),
    /// The payload was merged, or the key was absent and nothing happened.
    Updated(Option<Arc<dyn Value>>),
    /// Number of keys removed (0 or 1).
    Deleted(usize),
}

impl Outcome {
    /// The reply for this outcome.
    pub fn reply(&self) -> Reply {
        match self {
            Outcome::Stored(value) | Outcome::Updated(Some(value)) => Reply::from_value(&**value),
            Outcome::Updated(None) => Reply::Null,
            Outcome::Deleted(n) => Reply::count(*n),
        }
    }
}

/// Executes update requests and reads against an engine.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    engine: Engine,
}

impl CommandHandler {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Merges `payload` into the value stored at `key`.
    ///
    /// An expired key is treated as absent and reclaimed. For an absent key
    /// the engine's [`MissingKeyPolicy`] decides between `Ok(None)` and
    /// `KeyNotFound`. Errors from [`Value::update`] are passed through as-is.
    pub fn apply_update(
        &self,
        db: &Database,
        key: &[u8],
        payload: &Payload,
    ) -> Result<Option<Arc<dyn Value>>> {
        let Some(value) = db.update_existing(key, payload)? else {
            return match self.engine.config().missing_key_policy {
                MissingKeyPolicy::Ignore => {
                    trace!(
                        database = db.id(),
                        key = %String::from_utf8_lossy(key),
                        "Update on absent key ignored"
                    );
                    Ok(None)
                }
                MissingKeyPolicy::Strict => Err(StoreError::key_not_found(key)),
            };
        };

        Ok(Some(value))
    }

    /// Validates and executes one request.
    pub fn execute(&self, request: UpdateRequest) -> Result<Outcome> {
        request.validate(self.engine.config().databases)?;

        let db = self.engine.database(request.database);
        // A ttl past the representable range stores no deadline.
        let expires_at = request.ttl().and_then(|ttl| Instant::now().checked_add(ttl));

        match request.op {
            UpdateOp::Set(payload) => {
                let value = payload.into_value();
                db.set(request.key, Arc::clone(&value), expires_at);
                Ok(Outcome::Stored(value))
            }
            UpdateOp::Update(payload) => self
                .apply_update(&db, &request.key, &payload)
                .map(Outcome::Updated),
            UpdateOp::Delete => Ok(Outcome::Deleted(db.delete(&[request.key]))),
        }
    }

    /// Executes a request and maps the result onto a reply.
    pub fn handle(&self, request: UpdateRequest) -> Reply {
        let database = request.database;
        let op = request.op.name();
        match self.execute(request) {
            Ok(outcome) => outcome.reply(),
            Err(err) => {
                debug!(database = database, op = op, error = %err, "Request failed");
                Reply::from_error(&err)
            }
        }
    }

    /// Executes a request and writes its reply to `out`.
    pub fn respond<R: Responder>(&self, request: UpdateRequest, out: &mut R) {
        self.handle(request).write_to(out);
    }

    /// Reads `key` from database `id`. Absent and expired keys reply null.
    pub fn get(&self, id: DatabaseId, key: &[u8]) -> Reply {
        let databases = self.engine.config().databases;
        if id >= databases {
            return Reply::error(StoreError::invalid(format!(
                "database {} out of range (0..{})",
                id, databases
            )));
        }

        match self.engine.database(id).get_or_expire(key, true) {
            Some(value) => Reply::from_value(&*value),
            None => Reply::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::value::{Counter, Metric, StringItem};
    use bytes::Bytes;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Engine::default())
    }

    fn strict_handler() -> CommandHandler {
        let config = EngineConfig::default().with_missing_key_policy(MissingKeyPolicy::Strict);
        CommandHandler::new(Engine::new(config).unwrap())
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let reply = handler.handle(UpdateRequest::set(0, "key", "value"));
        assert_eq!(reply, Reply::bulk("value"));

        assert_eq!(handler.get(0, b"key"), Reply::bulk("value"));
        assert_eq!(handler.get(1, b"key"), Reply::Null);
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        assert_eq!(handler.get(0, b"nonexistent"), Reply::Null);
    }

    #[test]
    fn test_get_unknown_database() {
        let handler = create_handler();
        assert!(handler.get(16, b"key").is_error());
        assert_eq!(handler.engine().database_count(), 0);
    }

    #[test]
    fn test_set_builds_variant_from_payload() {
        let handler = create_handler();

        handler.handle(UpdateRequest::set(0, "s", "text"));
        handler.handle(UpdateRequest::set(0, "f", 2.5));
        handler.handle(UpdateRequest::set(0, "i", 7i64));

        let db = handler.engine().database(0);
        assert_eq!(db.get(b"s").unwrap().category(), "analytics_string");
        assert_eq!(db.get(b"f").unwrap().category(), "metric");
        assert_eq!(db.get(b"i").unwrap().category(), "counter");
        assert_eq!(handler.get(0, b"f"), Reply::bulk("2.500000"));
    }

    #[test]
    fn test_set_with_ttl() {
        let handler = create_handler();

        handler.handle(UpdateRequest::set(2, "session", "abc").with_ttl_ms(60_000));
        let db = handler.engine().database(2);
        assert!(db.expires(b"session"));
        assert!(db.ttl(b"session").is_some());

        // A zero ttl is already expired.
        handler.handle(UpdateRequest::set(2, "gone", "x").with_ttl_ms(0));
        assert_eq!(handler.get(2, b"gone"), Reply::Null);
        assert!(!db.exists(b"gone"));
    }

    #[test]
    fn test_set_with_largest_ttl() {
        let handler = create_handler();

        let reply = handler.handle(UpdateRequest::set(0, "long", "v").with_ttl_ms(i64::MAX));
        assert_eq!(reply, Reply::bulk("v"));
        assert_eq!(handler.get(0, b"long"), Reply::bulk("v"));
    }

    #[test]
    fn test_metric_updates_accumulate() {
        let handler = create_handler();
        let db = handler.engine().database(0);
        db.set(Bytes::from("m1"), Arc::new(Metric::new("bytes", 10.0)), None);

        handler.apply_update(&db, b"m1", &Payload::Float(5.0)).unwrap();
        let m1 = handler
            .apply_update(&db, b"m1", &Payload::Float(5.0))
            .unwrap()
            .unwrap();

        assert_eq!(m1.raw_value(), Payload::Float(20.0));
        assert_eq!(m1.frequency(), 2);
    }

    #[test]
    fn test_type_mismatch_surfaces_verbatim() {
        let handler = create_handler();
        let db = handler.engine().database(0);
        db.set(Bytes::from("c1"), Arc::new(Counter::default()), None);

        handler.apply_update(&db, b"c1", &Payload::Int(3)).unwrap();
        let err = handler
            .apply_update(&db, b"c1", &Payload::from("not-a-number"))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::UnsupportedType {
                expected: "integer",
                found: "string",
            }
        );
        assert_eq!(db.get(b"c1").unwrap().raw_value(), Payload::Int(3));

        let reply = handler.handle(UpdateRequest::update(0, "c1", "nope"));
        assert!(reply.is_error());
    }

    #[test]
    fn test_update_absent_key_ignored() {
        let handler = create_handler();
        let db = handler.engine().database(0);

        assert!(handler
            .apply_update(&db, b"missing", &Payload::Int(1))
            .unwrap()
            .is_none());
        assert!(!db.exists(b"missing"));

        let reply = handler.handle(UpdateRequest::update(0, "missing", 1i64));
        assert_eq!(reply, Reply::Null);
        assert!(!db.exists(b"missing"));
    }

    #[test]
    fn test_update_absent_key_strict() {
        let handler = strict_handler();
        let db = handler.engine().database(0);

        assert!(matches!(
            handler.apply_update(&db, b"missing", &Payload::Int(1)),
            Err(StoreError::KeyNotFound(k)) if k == "missing"
        ));
        // KeyNotFound still reads as a null reply.
        assert_eq!(
            handler.handle(UpdateRequest::update(0, "missing", 1i64)),
            Reply::Null
        );
    }

    #[test]
    fn test_update_expired_key_is_absent() {
        let handler = strict_handler();
        let db = handler.engine().database(0);
        db.set(
            Bytes::from("old"),
            Arc::new(StringItem::new("v")),
            Some(Instant::now() - Duration::from_secs(1)),
        );

        assert!(matches!(
            handler.apply_update(&db, b"old", &Payload::from("new")),
            Err(StoreError::KeyNotFound(_))
        ));
        assert!(!db.exists(b"old"));
        assert_eq!(handler.engine().stats().expired, 1);
    }

    #[test]
    fn test_update_reply_renders_new_value() {
        let handler = create_handler();
        handler.handle(UpdateRequest::set(1, "hits", 1i64));

        let reply = handler.handle(UpdateRequest::update(1, "hits", 41i64));
        assert_eq!(reply, Reply::bulk("42"));
    }

    #[test]
    fn test_delete() {
        let handler = create_handler();
        handler.handle(UpdateRequest::set(0, "key1", "value1"));

        assert_eq!(
            handler.handle(UpdateRequest::delete(0, "key1")),
            Reply::count(1)
        );
        assert_eq!(
            handler.handle(UpdateRequest::delete(0, "key1")),
            Reply::count(0)
        );
        assert_eq!(handler.get(0, b"key1"), Reply::Null);
    }

    #[test]
    fn test_invalid_request_touches_nothing() {
        let handler = create_handler();

        let reply = handler.handle(UpdateRequest::set(99, "k", "v"));
        assert!(reply.is_error());
        assert!(matches!(
            handler.execute(UpdateRequest::delete(0, "k").with_ttl_ms(5)),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(handler.engine().database_count(), 0);
    }

    #[test]
    fn test_respond_writes_one_reply_per_request() {
        let handler = create_handler();
        let mut out: Vec<Reply> = Vec::new();

        handler.respond(UpdateRequest::set(0, "a", "1"), &mut out);
        handler.respond(UpdateRequest::update(0, "b", "2"), &mut out);
        handler.respond(UpdateRequest::set(0, "", "3"), &mut out);
        handler.respond(UpdateRequest::delete(0, "a"), &mut out);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0], Reply::bulk("1"));
        assert_eq!(out[1], Reply::Null);
        assert!(out[2].is_error());
        assert_eq!(out[3], Reply::count(1));
    }
}

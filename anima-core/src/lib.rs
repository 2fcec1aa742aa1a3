//! Anima Core
//!
//! A reactive object runtime: plain structured records become *live*
//! objects whose reads are tracked, whose writes are gated by a
//! transactional change scope, whose nested records are bound to exactly
//! one owning root, and whose mutations are validated against a declared
//! structural schema before they commit.
//!
//! # Architecture
//!
//! - [`reactive`]: signals, read-dependency capture, emission batching,
//!   effects
//! - [`object`]: the value model, object identity, the reactive wrappers
//!   ([`Obj`], [`List`]) and the ownership graph
//! - [`schema`]: structural schemas, per-path assertion, sub-schema
//!   stamping
//! - [`Runtime`]: the explicit instance owning all shared state, plus the
//!   [`change`] / [`subscribe`] boundaries
//! - [`clone_object`] / [`to_json`]: structural copy and the canonical
//!   JSON projection
//!
//! # Example
//!
//! ```rust,ignore
//! use anima_core::{change, subscribe, Runtime, Schema, Value};
//!
//! let rt = Runtime::new();
//! let doc = rt.create_object(
//!     Schema::object("Doc", [
//!         ("title", Schema::String),
//!         ("settings", Schema::record([("theme", Schema::String)])),
//!     ]),
//!     [
//!         ("title", Value::from("hello")),
//!         ("settings", Value::record([("theme", "dark")])),
//!     ],
//! )?;
//!
//! let _sub = subscribe(&doc, || println!("doc changed"));
//!
//! // Writes happen inside a change scope; N writes, one notification.
//! change(&doc, |d| {
//!     let settings = d.get("settings").unwrap().as_object().unwrap();
//!     settings.set("theme", "light")
//! })?;
//!
//! // Reads never need a scope.
//! let settings = doc.get("settings").unwrap().as_object().unwrap();
//! assert_eq!(settings.get("theme").unwrap().as_str(), Some("light"));
//! ```

mod context;
pub mod error;
pub mod object;
pub mod reactive;
mod runtime;
pub mod schema;
mod serialize;

pub use error::{Error, Result, MAX_OWNER_DEPTH};
pub use object::{List, Obj, ObjectId, Ref, Value};
pub use reactive::{Effect, ReadScope, Signal, SubscriberId, Subscription};
pub use runtime::{change, subscribe, CreateOptions, Runtime};
pub use schema::{ObjectSchema, Schema};
pub use serialize::{clone_object, to_json, CloneOptions};

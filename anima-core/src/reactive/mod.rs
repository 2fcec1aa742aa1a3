//! Reactive Primitives
//!
//! This module implements the notification substrate the object runtime
//! sits on: signals, read-dependency capture, emission batching, and
//! effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a value-less notification cell. Every reactive object
//! carries a pair of them: a *value* signal (fires when a property's value
//! changes) and a *structure* signal (fires when the key set changes).
//! Keeping the two channels separate means a consumer watching "does key X
//! exist" is not invalidated by unrelated value writes, and vice versa.
//!
//! ## Read scopes
//!
//! Reads performed inside a [`ReadScope`] capture the signals they touch.
//! This is how fine-grained dependencies are established: an [`Effect`]
//! subscribes to exactly the signals its last run consulted.
//!
//! ## Batching
//!
//! Mutation paths route emissions through a batcher so that N writes
//! inside one change scope produce one emission per touched signal, in
//! first-touch order.

mod batch;
mod effect;
mod scope;
mod signal;

pub use effect::Effect;
pub use scope::ReadScope;
pub use signal::{Signal, SubscriberId, Subscription};

pub(crate) use batch::Batcher;

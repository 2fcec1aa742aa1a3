//! Runtime
//!
//! The [`Runtime`] owns every piece of shared mutable state in the system:
//! the change-context slot, the pending-notification collections, the
//! ownership side-table and the weak target registry. It is an explicit
//! value — created by the caller, threaded into every object it creates —
//! not a hidden global, so tests run against isolated runtimes and nothing
//! can mutate the shared state except through the manager that owns it.
//!
//! # Change scopes
//!
//! [`change`] is the mutation boundary. For an object whose ultimate root
//! is initialized it runs the full transaction sequence: enter the context
//! for the root, run the callback inside an emission batch, and on the
//! outermost exit fire exactly one notification on the root (if a write
//! earned one) followed by one per distinct owner-chain ancestor, in
//! first-encounter order. Loose objects are not gated; their callback runs
//! directly.
//!
//! A scope must not be held across an asynchronous suspension point: the
//! context slot is runtime-wide, and holding it open would block every
//! other mutation scope until resumption. Re-enter a fresh scope after
//! resuming instead.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::context::ChangeContext;
use crate::error::{Error, Result};
use crate::object::owner::ResolvedRoot;
use crate::object::{
    AnyTarget, Obj, ObjectId, Ref, RootIdentity, TargetHandle, TargetKey, Value,
};
use crate::reactive::{Batcher, SubscriberId, Subscription};
use crate::schema::{self, Schema};

/// Shared state behind a [`Runtime`] and every object it created.
pub(crate) struct RuntimeState {
    pub(crate) context: ChangeContext,
    pub(crate) batcher: Batcher,
    /// Ownership side-table: child target -> containing target.
    pub(crate) owners: DashMap<TargetKey, TargetKey>,
    /// Weak handles to every live target, keyed by identity. Entries are
    /// removed by the target's Drop; the registry never keeps one alive.
    pub(crate) registry: DashMap<TargetKey, AnyTarget>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            context: ChangeContext::new(),
            batcher: Batcher::new(),
            owners: DashMap::new(),
            registry: DashMap::new(),
        }
    }

    /// Gate a mutation on `key`: resolve its ultimate root and, if that
    /// root is initialized, require it to be the active change context.
    /// Returns the root key to queue notifications against, or `None` for
    /// ungated (loose) targets.
    pub(crate) fn ensure_in_context(
        &self,
        key: TargetKey,
        op: &'static str,
    ) -> Result<Option<TargetKey>> {
        match self.resolve_root(key)? {
            ResolvedRoot::Root(root) => {
                let root_key = root.key();
                if self.context.is_active_key(root_key) {
                    Ok(Some(root_key))
                } else {
                    Err(Error::MutationOutsideScope { op })
                }
            }
            ResolvedRoot::Loose(_) => Ok(None),
        }
    }

    /// Run `f` as a change scope rooted at `root`.
    pub(crate) fn run_change<R>(
        &self,
        root: &Obj,
        subject: &Obj,
        f: impl FnOnce(&Obj) -> Result<R>,
    ) -> Result<R> {
        let root_key = root.key();
        tracing::trace!(?root_key, "change scope opened");
        let guard = self.context.enter(root_key);
        let result = self.batcher.batch(|| f(subject));
        let completed = guard.release();
        if completed {
            // Writes that committed before an error still notify; there is
            // no per-scope rollback.
            let (primary, owners) = self.context.take_pending();
            if let Some(key) = primary {
                if let Some(TargetHandle::Obj(obj)) = self.resolve_handle(key) {
                    obj.emit_changed();
                }
            }
            for key in owners {
                if let Some(TargetHandle::Obj(obj)) = self.resolve_handle(key) {
                    obj.emit_changed();
                }
            }
            tracing::trace!(?root_key, "change scope closed");
        }
        result
    }
}

/// Options for object creation.
#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    /// Caller-supplied id, validated against the id format. A fresh id is
    /// generated when absent.
    pub id: Option<String>,
    /// Initial metadata record.
    pub meta: Option<IndexMap<String, Value>>,
}

impl CreateOptions {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn meta<K, V, I>(mut self, entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.meta = Some(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// The reactive object runtime. Cloning shares state.
#[derive(Clone)]
pub struct Runtime {
    state: Arc<RuntimeState>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RuntimeState::new()),
        }
    }

    /// Create a schema-validated root object with a fresh id.
    pub fn create_object<K, V, I>(&self, schema: Schema, props: I) -> Result<Obj>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.create_object_opts(schema, props, CreateOptions::default())
    }

    /// Create a schema-validated root object with explicit options.
    pub fn create_object_opts<K, V, I>(
        &self,
        schema: Schema,
        props: I,
        options: CreateOptions,
    ) -> Result<Obj>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.create_inner(schema, props, options, None, None)
    }

    /// Create a relation root: a schema-validated object carrying source
    /// and target endpoints, both of which must be identified roots.
    pub fn create_relation<K, V, I>(
        &self,
        schema: Schema,
        props: I,
        source: &Obj,
        target: &Obj,
    ) -> Result<Obj>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let source = source.id_untracked().ok_or(Error::RelationEndpoint)?;
        let target = target.id_untracked().ok_or(Error::RelationEndpoint)?;
        self.create_inner(
            schema,
            props,
            CreateOptions::default(),
            Some(Ref::to(source)),
            Some(Ref::to(target)),
        )
    }

    /// Create a loose record: no schema, no identity, no gating. Useful as
    /// scratch state outside the transactional discipline.
    pub fn loose_object<K, V, I>(&self, props: I) -> Obj
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: IndexMap<String, Value> = props
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Obj::from_map(&self.state, map)
    }

    fn create_inner<K, V, I>(
        &self,
        schema: Schema,
        props: I,
        options: CreateOptions,
        source: Option<Ref>,
        target: Option<Ref>,
    ) -> Result<Obj>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let type_name = schema.validate_root()?.name.clone();
        let id = match &options.id {
            Some(raw) => ObjectId::parse(raw)?,
            None => ObjectId::random(),
        };

        // The target is built through the ordinary write path; it is not
        // yet initialized, so none of this requires a scope, but adoption
        // and ownership admission run for every initial property.
        let obj = Obj::new_raw(&self.state);
        for (key, value) in props {
            obj.define(&key.into(), value.into())?;
        }

        let schema = Arc::new(schema);
        schema::assert_value(&schema, &Value::Object(obj.clone()), "")?;
        schema::stamp_value(&Value::Object(obj.clone()), &schema);

        if let Some(meta) = options.meta {
            let meta_obj = Obj::from_map(&self.state, meta);
            self.state.owners.insert(meta_obj.key(), obj.key());
            obj.set_meta(meta_obj);
        }

        obj.initialize_root(RootIdentity {
            id: id.clone(),
            type_name,
            source,
            target,
        });
        tracing::debug!(id = %id, "object created");
        Ok(obj)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// The mutation boundary.
///
/// Resolves `obj`'s ultimate root; if it is an initialized object, the
/// callback runs inside a change scope for that root and subscribers are
/// notified exactly once when the outermost scope closes. Otherwise the
/// callback runs directly against the object.
pub fn change<R, F>(obj: &Obj, f: F) -> Result<R>
where
    F: FnOnce(&Obj) -> Result<R>,
{
    let rt = Arc::clone(obj.runtime());
    match rt.resolve_root(obj.key())? {
        ResolvedRoot::Root(root) => rt.run_change(&root, obj, f),
        ResolvedRoot::Loose(_) => f(obj),
    }
}

/// The subscription boundary.
///
/// The callback fires once per completed change scope that touched `obj`,
/// either as the scope's primary target or through the owner chain. An
/// object without event capability yields an inert subscription.
pub fn subscribe<F>(obj: &Obj, callback: F) -> Subscription
where
    F: Fn() + Send + Sync + 'static,
{
    if obj.is_root_untracked() {
        let signal = obj.changed_signal();
        let id = SubscriberId::new();
        signal.subscribe(id, callback);
        Subscription::new(signal, id)
    } else {
        Subscription::none()
    }
}

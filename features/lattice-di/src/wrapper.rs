//! Per token descriptor and its context keyed instance cache.
//!
//! Wrappers live in a [`WrapperArena`] owned by the container and reference each other by
//! [`WrapperId`]. The dependency edges recorded on a wrapper are filled lazily by the injector
//! the first time each dependency is resolved.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use futures_channel::oneshot;

use crate::{
    context::{ContextId, HostComponentInfo},
    errors::InjectError,
    module::ModuleId,
    provider::{Constructor, Dependency, PropertyDependency, Provider, ResolvedArgs},
    types::{DynError, Instance, Scope, Token},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(pub(crate) usize);

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which map of its module a wrapper was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Providers,
    Injectables,
    Controllers,
    Middlewares,
}

/// Resolves once the owner of a pending slot settled it
pub type DoneSignal = Shared<oneshot::Receiver<Result<(), InjectError>>>;

/// A snapshot of one cache entry
#[derive(Clone)]
pub struct InstancePerContext {
    pub instance: Option<Instance>,
    pub is_resolved: bool,
    pub is_pending: bool,
    pub done: Option<DoneSignal>,
}

/// Addresses one cache entry of a wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SlotKey {
    pub(crate) context: ContextId,
    /// Only set for transient wrappers consumed by a known inquirer
    pub(crate) inquirer: Option<WrapperId>,
}

/// One cache entry of one wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SlotRef {
    pub(crate) wrapper: WrapperId,
    pub(crate) key: SlotKey,
}

#[derive(Clone)]
enum Slot {
    Unresolved,
    Pending(PendingSlot),
    Resolved(Option<Instance>),
}

#[derive(Clone)]
struct PendingSlot {
    done: DoneSignal,
    /// Entries the owner of this slot is currently waiting on
    refs: HashSet<SlotRef>,
}

pub(crate) enum Metatype {
    Class(Constructor),
    Factory(Constructor),
    Value,
}

pub(crate) enum Settlement<'a> {
    Resolved(Option<Instance>),
    Pending(DoneSignal),
    Claimed(SettlementSignal<'a>),
}

/// Held by the single task allowed to instantiate a slot
///
/// Dropping it unsettled resets the slot, waiters observe an aborted settlement.
pub(crate) struct SettlementSignal<'a> {
    wrapper: &'a InstanceWrapper,
    key: SlotKey,
    tx: Option<oneshot::Sender<Result<(), InjectError>>>,
}

impl SettlementSignal<'_> {
    pub(crate) fn key(&self) -> &SlotKey {
        &self.key
    }

    pub(crate) fn complete(mut self, instance: Option<Instance>) {
        self.wrapper
            .replace_slot(&self.key, Slot::Resolved(instance));
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Resets the slot so the next attempt retries, and hands `error` to every waiter
    pub(crate) fn error(mut self, error: InjectError) {
        self.wrapper.replace_slot(&self.key, Slot::Unresolved);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}

impl Drop for SettlementSignal<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.wrapper.replace_slot(&self.key, Slot::Unresolved);
        }
    }
}

struct WrapperState {
    forward_ref: bool,
    values: HashMap<ContextId, Slot>,
    transient_map: HashMap<WrapperId, HashMap<ContextId, Slot>>,
    ctor_metadata: Vec<Option<WrapperId>>,
    properties_metadata: Vec<(String, WrapperId)>,
    enhancers: Vec<WrapperId>,
    is_tree_static: Option<bool>,
    is_tree_durable: Option<bool>,
}

impl WrapperState {
    fn slot(&self, key: &SlotKey) -> Option<&Slot> {
        match key.inquirer {
            Some(inquirer) => self.transient_map.get(&inquirer)?.get(&key.context),
            None => self.values.get(&key.context),
        }
    }

    fn existing_slot_mut(&mut self, key: &SlotKey) -> Option<&mut Slot> {
        match key.inquirer {
            Some(inquirer) => self.transient_map.get_mut(&inquirer)?.get_mut(&key.context),
            None => self.values.get_mut(&key.context),
        }
    }

    fn slot_mut(&mut self, key: &SlotKey) -> &mut Slot {
        match key.inquirer {
            Some(inquirer) => self
                .transient_map
                .entry(inquirer)
                .or_default()
                .entry(key.context.clone())
                .or_insert(Slot::Unresolved),
            None => self
                .values
                .entry(key.context.clone())
                .or_insert(Slot::Unresolved),
        }
    }
}

pub struct InstanceWrapper {
    id: WrapperId,
    name: String,
    token: Token,
    scope: Scope,
    durable: bool,
    host: ModuleId,
    collection: Collection,
    metatype: Metatype,
    inject: Vec<Dependency>,
    properties: Vec<PropertyDependency>,
    is_alias: bool,
    state: Mutex<WrapperState>,
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("host", &self.host)
            .finish()
    }
}

impl InstanceWrapper {
    pub(crate) fn new(
        id: WrapperId,
        host: ModuleId,
        collection: Collection,
        provider: Provider,
    ) -> Self {
        let mut is_alias = false;
        let mut static_slot = Slot::Unresolved;
        let (token, name, scope, durable, metatype, inject, properties) = match provider {
            Provider::Class(p) => (
                p.token,
                p.class.to_string(),
                p.scope,
                p.durable,
                Metatype::Class(p.constructor),
                p.inject,
                p.properties,
            ),
            Provider::Factory(p) => {
                let name = p.token.to_string();
                (p.token, name, p.scope, p.durable, Metatype::Factory(p.factory), p.inject, Vec::new())
            }
            Provider::Value(p) => {
                static_slot = Slot::Resolved(Some(p.value));
                let name = p.token.to_string();
                (p.token, name, Scope::Singleton, false, Metatype::Value, Vec::new(), Vec::new())
            }
            Provider::Existing(p) => {
                is_alias = true;
                let name = p.token.to_string();
                let inject = vec![Dependency::token(p.alias_of)];
                (p.token, name, Scope::Singleton, false, Metatype::Factory(alias_factory()), inject, Vec::new())
            }
        };

        InstanceWrapper {
            id,
            name,
            token,
            scope,
            durable,
            host,
            collection,
            metatype,
            inject,
            properties,
            is_alias,
            state: Mutex::new(WrapperState {
                forward_ref: false,
                values: HashMap::from([(ContextId::static_context(), static_slot)]),
                transient_map: HashMap::new(),
                ctor_metadata: Vec::new(),
                properties_metadata: Vec::new(),
                enhancers: Vec::new(),
                is_tree_static: None,
                is_tree_durable: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WrapperState> {
        // State is never left half written, a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn host(&self) -> ModuleId {
        self.host
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn inject(&self) -> &[Dependency] {
        &self.inject
    }

    pub fn properties(&self) -> &[PropertyDependency] {
        &self.properties
    }

    pub fn is_transient(&self) -> bool {
        self.scope == Scope::Transient
    }

    pub fn is_alias(&self) -> bool {
        self.is_alias
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.metatype, Metatype::Factory(_))
    }

    pub(crate) fn constructor(&self) -> Option<&Constructor> {
        match &self.metatype {
            Metatype::Class(constructor) | Metatype::Factory(constructor) => Some(constructor),
            Metatype::Value => None,
        }
    }

    pub fn is_forward_ref(&self) -> bool {
        self.lock().forward_ref
    }

    pub(crate) fn mark_forward_ref(&self) {
        self.lock().forward_ref = true;
    }

    /// What a durable strategy gets to see about this wrapper
    pub(crate) fn host_component_info(&self, arena: &WrapperArena) -> HostComponentInfo {
        HostComponentInfo {
            token: self.token.clone(),
            is_tree_durable: self.is_dependency_tree_durable(arena),
        }
    }

    // ##################################################
    // Dependency metadata

    pub fn add_ctor_metadata(&self, index: usize, wrapper: WrapperId) {
        let mut state = self.lock();
        if state.ctor_metadata.len() <= index {
            state.ctor_metadata.resize(index + 1, None);
        }
        state.ctor_metadata[index] = Some(wrapper);
    }

    pub fn add_properties_metadata(&self, key: &str, wrapper: WrapperId) {
        let mut state = self.lock();
        match state.properties_metadata.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = wrapper,
            None => state.properties_metadata.push((key.to_string(), wrapper)),
        }
    }

    pub fn add_enhancer_metadata(&self, wrapper: WrapperId) {
        let mut state = self.lock();
        if !state.enhancers.contains(&wrapper) {
            state.enhancers.push(wrapper);
        }
    }

    /// Recorded constructor dependencies, `None` until every parameter has been resolved once
    pub fn ctor_metadata(&self) -> Option<Vec<WrapperId>> {
        let state = self.lock();
        if state.ctor_metadata.len() != self.inject.len() {
            return None;
        }
        state.ctor_metadata.iter().copied().collect()
    }

    pub fn properties_metadata(&self) -> Vec<(String, WrapperId)> {
        self.lock().properties_metadata.clone()
    }

    pub fn enhancers_metadata(&self) -> Vec<WrapperId> {
        self.lock().enhancers.clone()
    }

    pub(crate) fn recorded_ctor_dependency(&self, index: usize) -> Option<WrapperId> {
        self.lock().ctor_metadata.get(index).copied().flatten()
    }

    pub(crate) fn recorded_property_dependency(&self, key: &str) -> Option<WrapperId> {
        self.lock()
            .properties_metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, id)| *id)
    }

    fn is_metadata_complete(&self, state: &WrapperState) -> bool {
        state.ctor_metadata.len() == self.inject.len()
            && state.ctor_metadata.iter().all(Option::is_some)
            && state.properties_metadata.len() == self.properties.len()
    }

    /// Every wrapper this one depends on, as far as it is known yet
    fn edges(&self) -> (Vec<WrapperId>, bool) {
        let state = self.lock();
        let edges = state
            .ctor_metadata
            .iter()
            .flatten()
            .copied()
            .chain(state.properties_metadata.iter().map(|(_, id)| *id))
            .chain(state.enhancers.iter().copied())
            .collect();
        (edges, self.is_metadata_complete(&state))
    }

    // ##################################################
    // Tree introspection

    /// No request scoped provider anywhere in this wrapper's dependency tree
    pub fn is_dependency_tree_static(&self, arena: &WrapperArena) -> bool {
        self.introspect_static(arena, &[]).0
    }

    /// Returns (is static, may be cached)
    fn introspect_static(&self, arena: &WrapperArena, registry: &[WrapperId]) -> (bool, bool) {
        if let Some(cached) = self.lock().is_tree_static {
            return (cached, true);
        }
        if self.scope == Scope::Request {
            self.lock().is_tree_static = Some(false);
            tracing::debug!("{} introspected as request-scoped", self.name);
            return (false, true);
        }
        // Cycle, treated as static
        if registry.contains(&self.id) {
            return (true, false);
        }

        let registry = [registry, &[self.id]].concat();
        let (edges, complete) = self.edges();
        let mut cacheable = complete;
        let mut is_static = true;
        for edge in edges {
            let (edge_static, edge_cacheable) = arena.get(edge).introspect_static(arena, &registry);
            cacheable &= edge_cacheable;
            if !edge_static {
                // A non static edge is final no matter what else is unknown
                is_static = false;
                cacheable = edge_cacheable;
                break;
            }
        }

        if cacheable {
            self.lock().is_tree_static = Some(is_static);
        }
        (is_static, cacheable)
    }

    /// Every request scoped provider in this wrapper's tree is durable
    pub fn is_dependency_tree_durable(&self, arena: &WrapperArena) -> bool {
        self.introspect_durable(arena, &[]).0
    }

    fn introspect_durable(&self, arena: &WrapperArena, registry: &[WrapperId]) -> (bool, bool) {
        if let Some(cached) = self.lock().is_tree_durable {
            return (cached, true);
        }
        if self.scope == Scope::Request {
            self.lock().is_tree_durable = Some(self.durable);
            if self.durable {
                tracing::debug!("{} introspected as durable", self.name);
            }
            return (self.durable, true);
        }
        if self.is_dependency_tree_static(arena) {
            return (false, false);
        }
        if registry.contains(&self.id) {
            return (true, false);
        }

        let registry = [registry, &[self.id]].concat();
        let (edges, mut cacheable) = self.edges();
        let mut is_durable = true;
        for edge in edges {
            let edge = arena.get(edge);
            if edge.is_dependency_tree_static(arena) {
                continue;
            }
            let (edge_durable, edge_cacheable) = edge.introspect_durable(arena, &registry);
            cacheable &= edge_cacheable;
            if !edge_durable {
                is_durable = false;
                break;
            }
        }

        if cacheable {
            self.lock().is_tree_durable = Some(is_durable);
            if is_durable {
                tracing::debug!("{} introspected as durable", self.name);
            }
        }
        (is_durable, cacheable)
    }

    // ##################################################
    // Context cache

    /// The cache entry an instance for (`context`, `inquirer`) lives in
    ///
    /// Transient wrappers consumed by an inquirer get one entry per inquirer. Otherwise a
    /// context without an entry either shares the static entry, when the tree is static, or
    /// gets a fresh unresolved placeholder.
    pub(crate) fn slot_key(
        &self,
        context: &ContextId,
        inquirer: Option<WrapperId>,
        arena: &WrapperArena,
    ) -> SlotKey {
        if let (Scope::Transient, Some(inquirer)) = (self.scope, inquirer) {
            let key = SlotKey {
                context: context.clone(),
                inquirer: Some(inquirer),
            };
            self.lock().slot_mut(&key);
            return key;
        }

        let key = SlotKey {
            context: context.clone(),
            inquirer: None,
        };
        if context.is_static() || self.lock().values.contains_key(context) {
            return key;
        }
        if self.is_dependency_tree_static(arena) {
            return SlotKey {
                context: ContextId::static_context(),
                inquirer: None,
            };
        }

        self.lock().slot_mut(&key);
        key
    }

    pub fn get_instance_by_context_id(
        &self,
        context: &ContextId,
        inquirer: Option<WrapperId>,
        arena: &WrapperArena,
    ) -> InstancePerContext {
        let key = self.slot_key(context, inquirer, arena);
        self.snapshot(&key)
    }

    pub(crate) fn snapshot(&self, key: &SlotKey) -> InstancePerContext {
        match self.lock().slot(key) {
            None | Some(Slot::Unresolved) => InstancePerContext {
                instance: None,
                is_resolved: false,
                is_pending: false,
                done: None,
            },
            Some(Slot::Pending(pending)) => InstancePerContext {
                instance: None,
                is_resolved: false,
                is_pending: true,
                done: Some(pending.done.clone()),
            },
            Some(Slot::Resolved(instance)) => InstancePerContext {
                instance: instance.clone(),
                is_resolved: true,
                is_pending: false,
                done: None,
            },
        }
    }

    /// The singleton instance, if any
    pub fn instance(&self) -> Option<Instance> {
        match self.lock().values.get(&ContextId::static_context()) {
            Some(Slot::Resolved(instance)) => instance.clone(),
            _ => None,
        }
    }

    /// Checks the slot and, if nobody works on it yet, claims it for the caller
    pub(crate) fn begin_settlement(&self, key: &SlotKey) -> Settlement<'_> {
        let mut state = self.lock();
        let slot = state.slot_mut(key);
        match slot {
            Slot::Resolved(instance) => Settlement::Resolved(instance.clone()),
            Slot::Pending(pending) => Settlement::Pending(pending.done.clone()),
            Slot::Unresolved => {
                let (tx, rx) = oneshot::channel();
                *slot = Slot::Pending(PendingSlot {
                    done: rx.shared(),
                    refs: HashSet::new(),
                });
                Settlement::Claimed(SettlementSignal {
                    wrapper: self,
                    key: key.clone(),
                    tx: Some(tx),
                })
            }
        }
    }

    /// Records that the owner of the pending slot `key` now waits on `dependency`
    pub(crate) fn insert_settlement_ref(&self, key: &SlotKey, dependency: SlotRef) {
        if let Some(Slot::Pending(pending)) = self.lock().existing_slot_mut(key) {
            pending.refs.insert(dependency);
        }
    }

    /// What the owner of the slot `key` waits on, empty unless the slot is pending
    pub(crate) fn pending_refs(&self, key: &SlotKey) -> Vec<SlotRef> {
        match self.lock().slot(key) {
            Some(Slot::Pending(pending)) => pending.refs.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Released contexts stay released, only the static entry is recreated
    fn replace_slot(&self, key: &SlotKey, slot: Slot) {
        let mut state = self.lock();
        if key.context.is_static() {
            *state.slot_mut(key) = slot;
        } else if let Some(current) = state.existing_slot_mut(key) {
            *current = slot;
        }
    }

    pub fn set_instance_by_context_id(&self, context: &ContextId, instance: Instance) {
        self.lock()
            .values
            .insert(context.clone(), Slot::Resolved(Some(instance)));
    }

    pub fn set_instance_by_inquirer_id(
        &self,
        context: &ContextId,
        inquirer: WrapperId,
        instance: Instance,
    ) {
        self.lock()
            .transient_map
            .entry(inquirer)
            .or_default()
            .insert(context.clone(), Slot::Resolved(Some(instance)));
    }

    /// Drops every entry keyed by `context`, the static entry is never released
    pub fn release_context(&self, context: &ContextId) {
        if context.is_static() {
            return;
        }
        let mut state = self.lock();
        state.values.remove(context);
        state.transient_map.retain(|_, per_context| {
            per_context.remove(context);
            !per_context.is_empty()
        });
    }

    /// Number of contexts holding an entry, the static one included
    pub fn context_count(&self) -> usize {
        let state = self.lock();
        state.values.len() + state.transient_map.values().map(HashMap::len).sum::<usize>()
    }

    // ##################################################
    // Instantiation predicates, at most one holds for a (wrapper, context, inquirer) triple

    /// A singleton (or a transient consumed by a static singleton) built at bootstrap
    pub fn is_static(
        &self,
        context: &ContextId,
        inquirer: Option<&InstanceWrapper>,
        arena: &WrapperArena,
    ) -> bool {
        let is_inquirer_request_scoped =
            inquirer.is_some_and(|inquirer| !inquirer.is_dependency_tree_static(arena));
        let is_static_transient = self.is_transient() && !is_inquirer_request_scoped;

        self.is_dependency_tree_static(arena)
            && context.is_static()
            && (!self.is_transient()
                || (is_static_transient && inquirer.is_some_and(|inquirer| !inquirer.is_transient())))
    }

    /// Something in the tree is request scoped and a real context is given
    pub fn is_in_request_scope(
        &self,
        context: &ContextId,
        inquirer: Option<&InstanceWrapper>,
        arena: &WrapperArena,
    ) -> bool {
        !self.is_dependency_tree_static(arena)
            && !context.is_static()
            && (!self.is_transient() || inquirer.is_some())
    }

    /// A static transient consumed by a request scoped tree, fresh for every request
    pub fn is_lazy_transient(
        &self,
        context: &ContextId,
        inquirer: Option<&InstanceWrapper>,
        arena: &WrapperArena,
    ) -> bool {
        self.is_transient()
            && !context.is_static()
            && self.is_dependency_tree_static(arena)
            && inquirer.is_some_and(|inquirer| !inquirer.is_dependency_tree_static(arena))
    }

    /// Asked for directly (through `resolve`) or by a static transient
    pub fn is_explicitly_requested(
        &self,
        context: &ContextId,
        inquirer: Option<&InstanceWrapper>,
        arena: &WrapperArena,
    ) -> bool {
        let is_self_requested = inquirer.is_some_and(|inquirer| inquirer.id == self.id);
        let is_static_transient_inquirer = inquirer.is_some_and(|inquirer| {
            inquirer.is_transient() && inquirer.is_dependency_tree_static(arena)
        });

        self.is_dependency_tree_static(arena)
            && !context.is_static()
            && (is_self_requested || is_static_transient_inquirer)
    }

    pub fn is_in_context(
        &self,
        context: &ContextId,
        inquirer: Option<&InstanceWrapper>,
        arena: &WrapperArena,
    ) -> bool {
        self.is_static(context, inquirer, arena)
            || self.is_in_request_scope(context, inquirer, arena)
            || self.is_lazy_transient(context, inquirer, arena)
            || self.is_explicitly_requested(context, inquirer, arena)
    }
}

fn alias_factory() -> Constructor {
    Arc::new(|args: ResolvedArgs| -> BoxFuture<'static, Result<Instance, DynError>> {
        let aliased = args
            .instance(0)
            .cloned()
            .ok_or_else(|| DynError::from(format!("alias target of {:?} is not available", args.product)));
        async move { aliased }.boxed()
    })
}

/// Owns every wrapper of a container, indexed by [`WrapperId`]
#[derive(Default)]
pub struct WrapperArena {
    wrappers: Vec<InstanceWrapper>,
}

impl WrapperArena {
    pub(crate) fn insert(
        &mut self,
        host: ModuleId,
        collection: Collection,
        provider: Provider,
    ) -> WrapperId {
        let id = WrapperId(self.wrappers.len());
        self.wrappers
            .push(InstanceWrapper::new(id, host, collection, provider));
        id
    }

    /// Ids are only handed out by this arena, an unknown id is a bug
    pub fn get(&self, id: WrapperId) -> &InstanceWrapper {
        &self.wrappers[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceWrapper> {
        self.wrappers.iter()
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

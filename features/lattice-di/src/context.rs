//! Context ids key every scoped instance cache.
//!
//! A [`ContextId`] is an identity: clones compare equal, two separately created ids never do.
//! The [`ContextId::static_context`] sentinel keys the process wide singleton instances.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::types::{Instance, Token};

const STATIC_CONTEXT_ID: u64 = 1;
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(STATIC_CONTEXT_ID + 1);

/// What the injector tells a durable strategy about the wrapper it is resolving
#[derive(Debug, Clone)]
pub struct HostComponentInfo {
    pub token: Token,
    /// Whether every request scoped provider in the wrapper's tree is durable
    pub is_tree_durable: bool,
}

/// Maps a request context onto the context a wrapper should actually be cached under
pub type ContextIdResolver = Arc<dyn Fn(&HostComponentInfo) -> ContextId + Send + Sync>;

#[derive(Clone)]
pub struct ContextId(Arc<ContextIdInner>);

struct ContextIdInner {
    id: u64,
    payload: Option<Instance>,
    parent: Option<ContextIdResolver>,
}

impl ContextId {
    /// The singleton context
    pub fn static_context() -> ContextId {
        ContextId(Arc::new(ContextIdInner {
            id: STATIC_CONTEXT_ID,
            payload: None,
            parent: None,
        }))
    }

    pub(crate) fn create(payload: Option<Instance>) -> ContextId {
        ContextId(Arc::new(ContextIdInner {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            payload,
            parent: None,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_static(&self) -> bool {
        self.0.id == STATIC_CONTEXT_ID
    }

    /// The request (or any other value) this context was created for
    pub fn payload(&self) -> Option<&Instance> {
        self.0.payload.as_ref()
    }

    /// Same identity, but every wrapper lookup goes through `resolver` first
    pub fn with_parent_resolver(&self, resolver: ContextIdResolver) -> ContextId {
        ContextId(Arc::new(ContextIdInner {
            id: self.0.id,
            payload: self.0.payload.clone(),
            parent: Some(resolver),
        }))
    }

    /// The context a wrapper is cached under for this request
    pub fn effective_for(&self, info: &HostComponentInfo) -> ContextId {
        match &self.0.parent {
            Some(resolver) => resolver(info),
            None => self.clone(),
        }
    }

    pub fn has_parent_resolver(&self) -> bool {
        self.0.parent.is_some()
    }
}

impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for ContextId {}
impl Hash for ContextId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}
impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            return f.write_str("ContextId(STATIC)");
        }
        f.debug_tuple("ContextId").field(&self.0.id).finish()
    }
}

/// Lets the host application partition request contexts, e.g. one durable context per tenant
pub trait ContextIdStrategy: Send + Sync {
    /// Returns the resolver substituting durable contexts for `context_id`, if any
    fn attach(&self, context_id: &ContextId, request: &Instance) -> Option<ContextIdResolver>;
}

/// Creates context ids, applying the application's durable strategy
///
/// Owned by the application context rather than living in a global so that several
/// containers can coexist in one process.
#[derive(Clone, Default)]
pub struct ContextIdFactory {
    strategy: Option<Arc<dyn ContextIdStrategy>>,
}

impl ContextIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(strategy: Arc<dyn ContextIdStrategy>) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }

    pub fn apply(&mut self, strategy: Arc<dyn ContextIdStrategy>) {
        self.strategy = Some(strategy);
    }

    /// A fresh synthetic context without payload
    pub fn create(&self) -> ContextId {
        ContextId::create(None)
    }

    /// A fresh context for an incoming request
    pub fn get_by_request(&self, request: Instance) -> ContextId {
        let context_id = ContextId::create(Some(request.clone()));
        let Some(strategy) = &self.strategy else {
            return context_id;
        };

        match strategy.attach(&context_id, &request) {
            Some(resolver) => context_id.with_parent_resolver(resolver),
            None => context_id,
        }
    }
}

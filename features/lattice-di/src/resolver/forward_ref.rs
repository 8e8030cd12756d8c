use std::{
    fmt::{self, Debug},
    sync::{Arc, OnceLock},
};

use crate::{
    context::ContextId,
    errors::{InjectError, RequireError},
    injector::Injector,
    module::ModuleId,
    provider::downcast,
    types::{Injectable, Instance},
    wrapper::WrapperId,
};

/// Where a forward referenced dependency will live once it settled
#[derive(Clone)]
pub(crate) struct DeferredInstance {
    pub(crate) injector: Injector,
    pub(crate) wrapper: WrapperId,
    pub(crate) module: ModuleId,
    pub(crate) context: ContextId,
    pub(crate) inquirer: Option<WrapperId>,
}

impl DeferredInstance {
    /// The target instance, if it has settled already
    pub(crate) fn current(&self) -> Option<Instance> {
        self.injector
            .settled_instance(self.wrapper, &self.context, self.inquirer)
    }

    pub(crate) async fn load(&self) -> Result<Instance, InjectError> {
        self.injector.load_deferred(self).await
    }
}

/// Forward referenced dependency
///
/// The container hands these out instead of waiting for the target, which allows two
/// providers to depend on each other. The target is usually settled once the constructor
/// that received the handle has returned.
///
/// Note:
///
/// Reading the handle inside the constructor that received it usually yields nothing, the
/// target may well be waiting on that very constructor.
pub struct ForwardRef<T: Injectable>(Arc<ForwardRefInner<T>>);

struct ForwardRefInner<T: Injectable> {
    once: OnceLock<Arc<T>>,
    deferred: Option<DeferredInstance>,
}

impl<T: Injectable> Clone for ForwardRef<T> {
    fn clone(&self) -> Self {
        ForwardRef(self.0.clone())
    }
}

impl<T: Injectable + Debug> Debug for ForwardRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(instance) => f.debug_tuple("ForwardRef").field(instance).finish(),
            None => f.debug_tuple("ForwardRef").field(&"<unsettled>").finish(),
        }
    }
}

impl<T: Injectable> ForwardRef<T> {
    pub(crate) fn deferred(deferred: DeferredInstance) -> Self {
        ForwardRef(Arc::new(ForwardRefInner {
            once: OnceLock::new(),
            deferred: Some(deferred),
        }))
    }

    pub(crate) fn settled(instance: Arc<T>) -> Self {
        let once = OnceLock::new();
        let _ = once.set(instance);
        ForwardRef(Arc::new(ForwardRefInner {
            once,
            deferred: None,
        }))
    }

    /// Accesses the dependency, `None` while the target has not settled
    pub fn get(&self) -> Option<&Arc<T>> {
        if let Some(instance) = self.0.once.get() {
            return Some(instance);
        }

        let instance = self.0.deferred.as_ref()?.current()?;
        let instance = downcast::<T>(&instance).ok()?;
        // Another reader may have won, both saw the same settled instance
        Some(self.0.once.get_or_init(|| instance))
    }

    /// Like [`ForwardRef::get`], failing with [`RequireError::NotResolved`] instead
    pub fn try_get(&self) -> Result<&Arc<T>, InjectError> {
        self.get()
            .ok_or_else(|| RequireError::NotResolved(std::any::type_name::<T>().to_string()).into())
    }

    /// Loads the target if needed
    ///
    /// Must not be awaited during the construction of a provider the target depends on.
    pub async fn resolve(&self) -> Result<Arc<T>, InjectError> {
        if let Some(instance) = self.get() {
            return Ok(instance.clone());
        }
        let Some(deferred) = &self.0.deferred else {
            return Err(RequireError::NotResolved(std::any::type_name::<T>().to_string()).into());
        };

        let instance = downcast::<T>(&deferred.load().await?)?;
        Ok(self.0.once.get_or_init(|| instance).clone())
    }

    pub fn is_settled(&self) -> bool {
        self.get().is_some()
    }
}

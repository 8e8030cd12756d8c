use std::sync::Arc;

use crate::{
    container::DiContainer,
    context::{ContextId, ContextIdFactory, ContextIdStrategy},
    declaration::ModuleDef,
    errors::{InitError, RequireError},
    injector::Injector,
    links_host::InstanceLinksHost,
    module::ModuleId,
    resolver::{GetOrResolveOptions, InstanceResolver},
    types::{Injectable, Instance, TypeInfo},
};

/// The bootstrapped application
///
/// Lookups are not strict by default, they search every module of the application.
///
/// ```ignore
/// let app = ApplicationBuilder::new::<AppModule>().build().await?;
/// let service = app.get::<CatsService>()?;
///
/// let request = app.begin_request(HttpRequest::new("/cats"));
/// let handler = app.resolve::<CatsController>(request.context_id()).await?;
/// ```
#[derive(Clone)]
pub struct ApplicationContext {
    injector: Injector,
    links: Arc<InstanceLinksHost>,
    root: ModuleId,
    context_ids: ContextIdFactory,
}

impl ApplicationContext {
    pub(crate) fn new(container: Arc<DiContainer>, root: ModuleId, context_ids: ContextIdFactory) -> Self {
        let links = Arc::new(InstanceLinksHost::new(&container));
        ApplicationContext {
            injector: Injector::new(container),
            links,
            root,
            context_ids,
        }
    }

    pub fn container(&self) -> &DiContainer {
        self.injector.container()
    }

    pub fn root(&self) -> ModuleId {
        self.root
    }

    /// A [`ModuleRef`] whose strict lookups stay inside module `M`
    pub fn select<M: ModuleDef>(&self) -> Result<ModuleRef, InitError> {
        let info = TypeInfo::of::<M>();
        let module = self
            .container()
            .module_by_type(&info)
            .ok_or_else(|| InitError::UnknownModule(info.to_string()))?;
        Ok(ModuleRef {
            injector: self.injector.clone(),
            links: self.links.clone(),
            module: module.id(),
        })
    }

    /// Makes `request` the value of the request token for `context`
    pub fn register_request_by_context_id<R: Injectable>(
        &self,
        request: R,
        context: &ContextId,
    ) -> Result<(), RequireError> {
        self.container()
            .register_request_provider(Instance::new(request), context)
    }

    /// Opens a request context for `request`
    ///
    /// Every instance created for the context is released when the returned scope drops.
    pub fn begin_request<R: Injectable>(&self, request: R) -> RequestScope {
        let request = Instance::new(request);
        let context = self.context_ids.get_by_request(request.clone());
        if let Err(error) = self.container().register_request_provider(request, &context) {
            tracing::warn!("Request payload was not registered: {error}");
        }
        RequestScope {
            injector: self.injector.clone(),
            context,
        }
    }

    /// Drops every instance cached for `context`
    pub fn release_context(&self, context: &ContextId) {
        self.container().release_context(context);
    }

    pub fn context_id_factory(&self) -> &ContextIdFactory {
        &self.context_ids
    }

    /// A fresh context without request payload
    pub fn create_context_id(&self) -> ContextId {
        self.context_ids.create()
    }

    /// Replaces the durable strategy used by [`ApplicationContext::begin_request`]
    pub fn use_context_id_strategy(&mut self, strategy: Arc<dyn ContextIdStrategy>) {
        self.context_ids.apply(strategy);
    }
}

impl InstanceResolver for ApplicationContext {
    fn injector(&self) -> &Injector {
        &self.injector
    }

    fn instance_links_host(&self) -> &InstanceLinksHost {
        &self.links
    }

    fn strict_module(&self) -> Option<ModuleId> {
        Some(self.root)
    }
}

/// Handle on a single module, lookups are strict to it by default
#[derive(Clone)]
pub struct ModuleRef {
    injector: Injector,
    links: Arc<InstanceLinksHost>,
    module: ModuleId,
}

impl ModuleRef {
    pub fn id(&self) -> ModuleId {
        self.module
    }

    pub fn name(&self) -> String {
        self.injector.container().module(self.module).name()
    }
}

impl InstanceResolver for ModuleRef {
    fn injector(&self) -> &Injector {
        &self.injector
    }

    fn instance_links_host(&self) -> &InstanceLinksHost {
        &self.links
    }

    fn strict_module(&self) -> Option<ModuleId> {
        Some(self.module)
    }

    fn default_options(&self) -> GetOrResolveOptions {
        GetOrResolveOptions::strict()
    }
}

/// A live request context, released on drop
pub struct RequestScope {
    injector: Injector,
    context: ContextId,
}

impl RequestScope {
    pub fn context_id(&self) -> &ContextId {
        &self.context
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.injector.container().release_context(&self.context);
    }
}

use std::{sync::Arc, time::Duration};

use crate::{
    application::ApplicationContext,
    config::ApplicationConfig,
    container::DiContainer,
    context::{ContextIdFactory, ContextIdStrategy},
    declaration::{ModuleDeclaration, ModuleDef},
    errors::InitError,
    injector::Injector,
    instance_loader::InstanceLoader,
    scanner::DependenciesScanner,
};

/// Bootstraps an application from its root module
///
/// Bootstrapping happens in two phases:
/// 1. The module tree is scanned into a container and its import graph is checked
/// 2. Every singleton whose dependency tree is static is created, deepest module first
///
/// Failures run through an exceptions zone, which aborts the process unless
/// [`ApplicationConfig::abort_on_error`] is turned off.
pub struct ApplicationBuilder {
    root: ModuleDeclaration,
    config: ApplicationConfig,
    context_ids: ContextIdFactory,
}

impl ApplicationBuilder {
    pub fn new<M: ModuleDef>() -> Self {
        Self::from_declaration(ModuleDeclaration::of::<M>())
    }

    /// Starts from a dynamic root module
    pub fn from_declaration(root: impl Into<ModuleDeclaration>) -> Self {
        ApplicationBuilder {
            root: root.into(),
            config: ApplicationConfig::default(),
            context_ids: ContextIdFactory::new(),
        }
    }

    pub fn config(mut self, config: ApplicationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn abort_on_error(mut self, abort_on_error: bool) -> Self {
        self.config.abort_on_error = abort_on_error;
        self
    }

    pub fn context_id_strategy(mut self, strategy: Arc<dyn ContextIdStrategy>) -> Self {
        self.context_ids.apply(strategy);
        self
    }

    pub async fn build(self) -> Result<ApplicationContext, InitError> {
        let timeout = self.config.init_timeout;
        self.initiate(timeout).await
    }

    pub async fn build_timeout(self, timeout: Duration) -> Result<ApplicationContext, InitError> {
        self.initiate(Some(timeout)).await
    }

    async fn initiate(self, timeout: Option<Duration>) -> Result<ApplicationContext, InitError> {
        let ApplicationBuilder {
            root,
            config,
            context_ids,
        } = self;

        let result: Result<ApplicationContext, InitError> = async {
            let mut container = DiContainer::new();
            let root = DependenciesScanner::new(&mut container).scan(&root)?;

            let container = Arc::new(container);
            InstanceLoader::new(Injector::new(container.clone()))
                .create_instances_of_dependencies(timeout)
                .await?;
            Ok(ApplicationContext::new(container, root, context_ids))
        }
        .await;

        result.map_err(|error| exceptions_zone(error, config.abort_on_error))
    }
}

/// Logs a failed bootstrap and aborts unless told otherwise
fn exceptions_zone(error: InitError, abort_on_error: bool) -> InitError {
    tracing::error!("{error}");
    if abort_on_error {
        std::process::abort();
    }
    error
}

use std::sync::Arc;

use crate::{
    context::ContextId,
    errors::{InjectError, RequireError},
    injector::Injector,
    links_host::{InstanceLink, InstanceLinksHost},
    module::ModuleId,
    types::{Injectable, Instance, Scope, Token},
};

pub mod forward_ref;

/// Options of `get` and `resolve` style lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOrResolveOptions {
    /// Only consider registrations of the resolver's own module
    pub strict: bool,
    /// Every registration instead of the most recent one
    pub each: bool,
}

impl GetOrResolveOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            each: false,
        }
    }
}

/// Token based access to instances, shared by the application context and module references
///
/// `get` only returns singletons settled at bootstrap, `resolve` loads scoped providers for
/// a given context.
pub trait InstanceResolver {
    fn injector(&self) -> &Injector;

    fn instance_links_host(&self) -> &InstanceLinksHost;

    /// The module strict lookups are restricted to
    fn strict_module(&self) -> Option<ModuleId>;

    /// Options used by the token-less shortcuts like [`InstanceResolver::get`]
    fn default_options(&self) -> GetOrResolveOptions {
        GetOrResolveOptions::default()
    }

    /// Settled singletons for `token`
    fn find(&self, token: &Token, options: GetOrResolveOptions) -> Result<Vec<Instance>, RequireError> {
        self.links(token, options)?
            .into_iter()
            .map(|link| self.static_instance(link))
            .collect()
    }

    /// Loads `token` for `context` unless it is a plain singleton
    #[allow(async_fn_in_trait)]
    async fn resolve_per_context(
        &self,
        token: &Token,
        context: &ContextId,
        options: GetOrResolveOptions,
    ) -> Result<Vec<Instance>, InjectError> {
        let mut instances = Vec::new();
        for link in self.links(token, options)? {
            let container = self.injector().container();
            let wrapper = container.wrapper(link.wrapper);
            if wrapper.is_dependency_tree_static(container.wrappers()) && !wrapper.is_transient() {
                instances.push(self.static_instance(link)?);
                continue;
            }

            let instance = self
                .injector()
                .load_per_context(link.wrapper, context)
                .await?
                .ok_or_else(|| RequireError::UnknownElement(token.to_string()))?;
            instances.push(instance);
        }
        Ok(instances)
    }

    fn get<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        self.get_token(Token::of::<T>(), self.default_options())
    }

    fn get_token<T: Injectable>(
        &self,
        token: impl Into<Token>,
        options: GetOrResolveOptions,
    ) -> Result<Arc<T>, RequireError> {
        let token = token.into();
        let options = GetOrResolveOptions {
            each: false,
            ..options
        };
        let instance = self
            .find(&token, options)?
            .pop()
            .ok_or_else(|| RequireError::UnknownElement(token.to_string()))?;
        downcast(&instance)
    }

    fn get_each<T: Injectable>(&self, token: impl Into<Token>) -> Result<Vec<Arc<T>>, RequireError> {
        let options = GetOrResolveOptions {
            each: true,
            ..self.default_options()
        };
        self.find(&token.into(), options)?
            .iter()
            .map(downcast)
            .collect()
    }

    #[allow(async_fn_in_trait)]
    async fn resolve<T: Injectable>(&self, context: &ContextId) -> Result<Arc<T>, InjectError> {
        self.resolve_token(Token::of::<T>(), context, self.default_options())
            .await
    }

    #[allow(async_fn_in_trait)]
    async fn resolve_token<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
        options: GetOrResolveOptions,
    ) -> Result<Arc<T>, InjectError> {
        let token = token.into();
        let options = GetOrResolveOptions {
            each: false,
            ..options
        };
        let instance = self
            .resolve_per_context(&token, context, options)
            .await?
            .pop()
            .ok_or_else(|| RequireError::UnknownElement(token.to_string()))?;
        Ok(downcast(&instance)?)
    }

    #[allow(async_fn_in_trait)]
    async fn resolve_each<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
    ) -> Result<Vec<Arc<T>>, InjectError> {
        let options = GetOrResolveOptions {
            each: true,
            ..self.default_options()
        };
        let instances = self
            .resolve_per_context(&token.into(), context, options)
            .await?;
        Ok(instances
            .iter()
            .map(downcast)
            .collect::<Result<_, _>>()?)
    }

    #[doc(hidden)]
    fn links(&self, token: &Token, options: GetOrResolveOptions) -> Result<Vec<InstanceLink>, RequireError> {
        let module = match options.strict {
            true => self.strict_module(),
            false => None,
        };
        let host = self.instance_links_host();
        match options.each {
            true => Ok(host.get_each(token, module)?.into_iter().cloned().collect()),
            false => Ok(vec![host.get(token, module)?.clone()]),
        }
    }

    /// The bootstrap instance, refusing scoped providers
    #[doc(hidden)]
    fn static_instance(&self, link: InstanceLink) -> Result<Instance, RequireError> {
        let container = self.injector().container();
        let wrapper = container.wrapper(link.wrapper);
        let scope = match wrapper.scope() {
            Scope::Singleton if !wrapper.is_dependency_tree_static(container.wrappers()) => Scope::Request,
            scope => scope,
        };
        if scope != Scope::Singleton {
            return Err(RequireError::InvalidClassScope {
                token: link.token.to_string(),
                scope,
            });
        }

        wrapper
            .instance()
            .ok_or_else(|| RequireError::NotResolved(link.token.to_string()))
    }
}

fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, RequireError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| RequireError::DowncastFailed {
            required_type: std::any::type_name::<T>(),
            actual_type,
        })
}

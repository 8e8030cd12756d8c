//! Resolution of instance wrappers against a frozen container.
//!
//! Every (wrapper, context, inquirer) entry is instantiated at most once: the first caller
//! claims the entry, later callers await its done signal. Before awaiting an entry the caller
//! checks whether that entry transitively waits on the caller itself, which would otherwise
//! never settle.

use std::{collections::HashSet, sync::Arc};

use futures::{
    future::{try_join_all, BoxFuture},
    FutureExt,
};

use crate::{
    container::DiContainer,
    context::ContextId,
    core_module::Inquirer,
    errors::{InjectError, RequireError},
    module::{Module, ModuleId},
    provider::{Dependency, DependencyPosition, Injected, ResolvedArgs},
    resolver::forward_ref::DeferredInstance,
    types::{Instance, Token},
    wrapper::{InstanceWrapper, Settlement, SlotRef, WrapperId},
};

/// Loads instances and their dependencies
///
/// Cheap to clone, every clone shares the same container.
#[derive(Clone)]
pub struct Injector {
    container: Arc<DiContainer>,
}

impl Injector {
    pub fn new(container: Arc<DiContainer>) -> Self {
        Injector { container }
    }

    pub fn container(&self) -> &DiContainer {
        &self.container
    }

    /// The context `wrapper` is cached under, after durable substitution
    pub fn context_for(&self, context: &ContextId, wrapper: &InstanceWrapper) -> ContextId {
        if !context.has_parent_resolver() {
            return context.clone();
        }
        context.effective_for(&wrapper.host_component_info(self.container.wrappers()))
    }

    /// Makes sure `wrapper` has settled for (`context`, `inquirer`)
    ///
    /// Dependencies are looked up from `module`, which is the wrapper's host for every caller
    /// inside this crate.
    pub fn load_instance(
        &self,
        wrapper: WrapperId,
        module: ModuleId,
        context: &ContextId,
        inquirer: Option<WrapperId>,
    ) -> BoxFuture<'static, Result<(), InjectError>> {
        self.load_awaited_by(wrapper, module, context.clone(), inquirer, None)
    }

    /// Looks every dependency up once, so tree introspection sees complete metadata before
    /// anything is built
    ///
    /// Lookup failures are left to the load of the failing wrapper to report.
    pub(crate) fn record_dependency_edges(&self) {
        for wrapper in self.container.wrappers().iter() {
            let ctor = wrapper
                .inject()
                .iter()
                .enumerate()
                .map(|(index, dependency)| (DependencyPosition::Index(index), dependency));
            let properties = wrapper
                .properties()
                .iter()
                .map(|property| (DependencyPosition::Property(property.key.clone()), &property.dependency));

            for (position, dependency) in ctor.chain(properties) {
                let Some(token) = dependency.resolve_token() else {
                    continue;
                };
                if token != Token::of::<Inquirer>() {
                    let _ = self.lookup_component(wrapper.host(), &token, wrapper, &position);
                }
            }
        }
    }

    /// Loads `wrapper` as if it was requested directly, then its enhancers under the same context
    pub async fn load_per_context(
        &self,
        wrapper: WrapperId,
        context: &ContextId,
    ) -> Result<Option<Instance>, InjectError> {
        let host = self.container.wrapper(wrapper).host();
        self.load_instance(wrapper, host, context, Some(wrapper)).await?;
        self.load_enhancers_per_context(wrapper, context, Some(wrapper)).await?;
        Ok(self.settled_instance(wrapper, context, Some(wrapper)))
    }

    pub async fn load_enhancers_per_context(
        &self,
        wrapper: WrapperId,
        context: &ContextId,
        inquirer: Option<WrapperId>,
    ) -> Result<(), InjectError> {
        let enhancers = self.container.wrapper(wrapper).enhancers_metadata();
        try_join_all(enhancers.into_iter().map(|enhancer| {
            let host = self.container.wrapper(enhancer).host();
            self.load_instance(enhancer, host, context, inquirer)
        }))
        .await?;
        Ok(())
    }

    /// The instance settled for (`context`, `inquirer`), if any
    pub fn settled_instance(
        &self,
        wrapper: WrapperId,
        context: &ContextId,
        inquirer: Option<WrapperId>,
    ) -> Option<Instance> {
        let arena = self.container.wrappers();
        let wrapper = arena.get(wrapper);
        wrapper
            .get_instance_by_context_id(&self.context_for(context, wrapper), inquirer, arena)
            .instance
    }

    pub(crate) async fn load_deferred(&self, deferred: &DeferredInstance) -> Result<Instance, InjectError> {
        self.resolve_component_host(deferred.wrapper, &deferred.context, deferred.inquirer, None)
            .await?
            .ok_or_else(|| {
                let name = self.container.wrapper(deferred.wrapper).name();
                RequireError::NotResolved(name.to_string()).into()
            })
    }

    fn load_awaited_by(
        &self,
        id: WrapperId,
        module: ModuleId,
        context: ContextId,
        inquirer: Option<WrapperId>,
        waiter: Option<SlotRef>,
    ) -> BoxFuture<'static, Result<(), InjectError>> {
        let injector = self.clone();
        async move {
            let arena = injector.container.wrappers();
            let wrapper = arena.get(id);
            let key = wrapper.slot_key(&injector.context_for(&context, wrapper), inquirer, arena);

            let signal = match wrapper.begin_settlement(&key) {
                Settlement::Resolved(_) => return Ok(()),
                Settlement::Pending(done) => {
                    let awaited = SlotRef { wrapper: id, key };
                    if let Some(waiter) = &waiter {
                        if injector.is_cycle(awaited, waiter) {
                            return Err(InjectError::CircularDependency(format!("\"{}\"", wrapper.name())));
                        }
                    }
                    return match done.await {
                        Ok(settled) => settled,
                        Err(_) => Err(InjectError::SettlementAborted(wrapper.name().to_string())),
                    };
                }
                Settlement::Claimed(signal) => signal,
            };

            let slot = SlotRef {
                wrapper: id,
                key: signal.key().clone(),
            };
            match injector
                .instantiate_with_dependencies(wrapper, module, &context, inquirer, &slot)
                .await
            {
                Ok((instance, deferred)) => {
                    signal.complete(instance);
                    injector.load_forward_targets(deferred).await
                }
                Err(error) => {
                    signal.error(error.clone());
                    Err(error)
                }
            }
        }
        .boxed()
    }

    /// Whether `awaited` transitively waits on `waiter`
    fn is_cycle(&self, awaited: SlotRef, waiter: &SlotRef) -> bool {
        let arena = self.container.wrappers();
        let mut visited = HashSet::new();
        let mut stack = vec![awaited];
        while let Some(current) = stack.pop() {
            if current == *waiter {
                return true;
            }
            let refs = arena.get(current.wrapper).pending_refs(&current.key);
            if visited.insert(current) {
                stack.extend(refs);
            }
        }
        false
    }

    /// Resolves constructor and property dependencies side by side, then instantiates
    ///
    /// Returns the instance, if one belongs into this context, plus every forward reference
    /// that was handed out unsettled.
    async fn instantiate_with_dependencies(
        &self,
        wrapper: &InstanceWrapper,
        module: ModuleId,
        context: &ContextId,
        inquirer: Option<WrapperId>,
        slot: &SlotRef,
    ) -> Result<(Option<Instance>, Vec<DeferredInstance>), InjectError> {
        let ctor = wrapper
            .inject()
            .iter()
            .enumerate()
            .map(|(index, dependency)| {
                let position = DependencyPosition::Index(index);
                self.resolve_param(wrapper, module, dependency, position, context, inquirer, slot)
            });
        let properties = wrapper.properties().iter().map(|property| async move {
            let position = DependencyPosition::Property(property.key.clone());
            let injected = self
                .resolve_param(wrapper, module, &property.dependency, position, context, inquirer, slot)
                .await?;
            Ok::<_, InjectError>((property.key.clone(), injected))
        });
        let (ctor, properties) = futures::try_join!(try_join_all(ctor), try_join_all(properties))?;

        let deferred = ctor
            .iter()
            .chain(properties.iter().map(|(_, injected)| injected))
            .filter_map(|injected| match injected {
                Injected::Deferred(deferred) => Some(deferred.clone()),
                _ => None,
            })
            .collect();

        let instance = self
            .instantiate_class(wrapper, ctor, properties.into_iter().collect(), context, inquirer)
            .await?;
        Ok((instance, deferred))
    }

    /// Calls the constructor if one of the scope predicates places an instance in this context
    async fn instantiate_class(
        &self,
        wrapper: &InstanceWrapper,
        ctor: Vec<Injected>,
        properties: std::collections::HashMap<String, Injected>,
        context: &ContextId,
        inquirer: Option<WrapperId>,
    ) -> Result<Option<Instance>, InjectError> {
        let arena = self.container.wrappers();
        let inquirer = inquirer.map(|id| arena.get(id));
        if !wrapper.is_in_context(context, inquirer, arena) {
            return Ok(None);
        }
        let Some(constructor) = wrapper.constructor() else {
            return Ok(wrapper.instance());
        };

        let args = ResolvedArgs {
            product: wrapper.name().to_string(),
            ctor,
            properties,
            context: context.clone(),
            inquirer: inquirer
                .filter(|inquirer| inquirer.id() != wrapper.id())
                .map(|inquirer| inquirer.token().clone()),
        };
        constructor(args)
            .await
            .map(Some)
            .map_err(|error| InjectError::FactoryFailed {
                product: wrapper.name().to_string(),
                error: Arc::new(error),
            })
    }

    /// Loads forward referenced targets nobody is working on yet
    async fn load_forward_targets(&self, deferred: Vec<DeferredInstance>) -> Result<(), InjectError> {
        let arena = self.container.wrappers();
        for target in deferred {
            let wrapper = arena.get(target.wrapper);
            let key = wrapper.slot_key(&self.context_for(&target.context, wrapper), target.inquirer, arena);
            let snapshot = wrapper.snapshot(&key);
            if snapshot.is_resolved || snapshot.is_pending {
                continue;
            }
            self.load_awaited_by(target.wrapper, target.module, target.context.clone(), target.inquirer, None)
                .await?;
        }
        Ok(())
    }

    /// Resolves one dependency of `wrapper`
    ///
    /// Optional dependencies only swallow failures to find their own token, a failing
    /// construction further down still propagates.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_param(
        &self,
        wrapper: &InstanceWrapper,
        module: ModuleId,
        dependency: &Dependency,
        position: DependencyPosition,
        context: &ContextId,
        inquirer: Option<WrapperId>,
        slot: &SlotRef,
    ) -> Result<Injected, InjectError> {
        let arena = self.container.wrappers();
        let token = dependency.resolve_token();
        if token == Some(Token::of::<Inquirer>()) {
            let inquirer = inquirer.filter(|inquirer| *inquirer != wrapper.id());
            return Ok(match inquirer {
                Some(inquirer) => Injected::Instance(Instance::new(arena.get(inquirer).token().clone())),
                None => Injected::Absent,
            });
        }

        // Dependencies of a transient are resolved on behalf of whoever consumes it
        let dependency_inquirer = match inquirer {
            Some(parent) if wrapper.is_transient() => Some(parent),
            _ => Some(wrapper.id()),
        };

        let target = match self.find_dependency(wrapper, module, token, dependency, &position, context) {
            Ok(target) => target,
            Err(_) if dependency.is_optional() => return Ok(Injected::Absent),
            Err(error) => return Err(error),
        };

        if dependency.is_forward_ref() {
            let target_wrapper = arena.get(target);
            let effective = self.context_for(context, target_wrapper);
            let key = target_wrapper.slot_key(&effective, dependency_inquirer, arena);
            return Ok(match target_wrapper.snapshot(&key).instance {
                Some(instance) => Injected::Instance(instance),
                None => Injected::Deferred(DeferredInstance {
                    injector: self.clone(),
                    wrapper: target,
                    module: target_wrapper.host(),
                    context: context.clone(),
                    inquirer: dependency_inquirer,
                }),
            });
        }

        let instance = self
            .resolve_component_host(target, context, dependency_inquirer, Some(slot))
            .await?;
        Ok(instance.map_or(Injected::Absent, Injected::Instance))
    }

    /// The wrapper a dependency points at, reusing edges recorded by earlier resolutions
    fn find_dependency(
        &self,
        wrapper: &InstanceWrapper,
        module: ModuleId,
        token: Option<Token>,
        dependency: &Dependency,
        position: &DependencyPosition,
        context: &ContextId,
    ) -> Result<WrapperId, InjectError> {
        if !context.is_static() {
            let recorded = match position {
                DependencyPosition::Index(index) => wrapper.recorded_ctor_dependency(*index),
                DependencyPosition::Property(key) => wrapper.recorded_property_dependency(key),
            };
            if let Some(recorded) = recorded {
                return Ok(recorded);
            }
        }

        let Some(token) = token else {
            let host = self.container.module(module);
            return Err(InjectError::UndefinedDependency {
                dependent: wrapper.name().to_string(),
                signature: signature(wrapper, position),
                position: position.clone(),
                module: host.name(),
            });
        };
        if dependency.is_forward_ref() {
            wrapper.mark_forward_ref();
        }

        tracing::debug!("Resolving dependency {token} in the {} provider", wrapper.name());
        self.lookup_component(module, &token, wrapper, position)
    }

    /// Looks `token` up in `module`, then through its imports
    pub fn lookup_component(
        &self,
        module: ModuleId,
        token: &Token,
        wrapper: &InstanceWrapper,
        position: &DependencyPosition,
    ) -> Result<WrapperId, InjectError> {
        let host = self.container.module(module);
        let unknown = || InjectError::UnknownDependencies {
            dependent: wrapper.name().to_string(),
            signature: signature(wrapper, position),
            token: token.to_string(),
            position: position.clone(),
            module: host.name(),
        };
        // A provider can't depend on itself
        if wrapper.token() == token {
            return Err(unknown());
        }

        tracing::debug!("Looking for {token} in {}", host.name());
        let found = match host.get_provider_by_key(token) {
            Some(found) => {
                tracing::debug!("Found {token} in {}", host.name());
                Some(found)
            }
            None => self.lookup_component_in_imports(host, token, &mut Vec::new(), false),
        };

        let found = found.ok_or_else(unknown)?;
        match position {
            DependencyPosition::Index(index) => wrapper.add_ctor_metadata(*index, found),
            DependencyPosition::Property(key) => wrapper.add_properties_metadata(key, found),
        }
        Ok(found)
    }

    /// Searches the imports of `module` for an exported `token`
    ///
    /// Below the first level only imports that the module re-exports are searched.
    fn lookup_component_in_imports(
        &self,
        module: &Module,
        token: &Token,
        registry: &mut Vec<ModuleId>,
        is_traversing: bool,
    ) -> Option<WrapperId> {
        let children: Vec<&Module> = module
            .imports()
            .iter()
            .map(|id| self.container.module(*id))
            .filter(|child| !is_traversing || module.exports().contains(&Token::Type(child.metatype())))
            .collect();

        for child in children {
            if registry.contains(&child.id()) {
                continue;
            }
            registry.push(child.id());
            tracing::debug!("Looking for {token} in {}", child.name());

            match child.get_provider_by_key(token) {
                Some(found) if child.exports().contains(token) => {
                    tracing::debug!("Found {token} in {}", child.name());
                    return Some(found);
                }
                _ => {
                    if let Some(found) = self.lookup_component_in_imports(child, token, registry, true) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Loads `target` unless it has settled already and returns its instance
    async fn resolve_component_host(
        &self,
        target: WrapperId,
        context: &ContextId,
        inquirer: Option<WrapperId>,
        waiter: Option<&SlotRef>,
    ) -> Result<Option<Instance>, InjectError> {
        let arena = self.container.wrappers();
        let wrapper = arena.get(target);
        let key = wrapper.slot_key(&self.context_for(context, wrapper), inquirer, arena);

        if !wrapper.snapshot(&key).is_resolved {
            if let Some(waiter) = waiter {
                let awaited = SlotRef {
                    wrapper: target,
                    key: key.clone(),
                };
                arena
                    .get(waiter.wrapper)
                    .insert_settlement_ref(&waiter.key, awaited);
            }
            self.load_awaited_by(target, wrapper.host(), context.clone(), inquirer, waiter.cloned())
                .await?;
        }
        Ok(wrapper.snapshot(&key).instance)
    }
}

/// Constructor signature with the failing position marked, e.g. `Repository, ?`
fn signature(wrapper: &InstanceWrapper, position: &DependencyPosition) -> String {
    let parts: Vec<String> = match position {
        DependencyPosition::Index(failing) => wrapper
            .inject()
            .iter()
            .enumerate()
            .map(|(index, dependency)| match index == *failing {
                true => "?".to_string(),
                false => format!("{dependency:?}"),
            })
            .collect(),
        DependencyPosition::Property(failing) => wrapper
            .properties()
            .iter()
            .map(|property| match &property.key == failing {
                true => format!("{}: ?", property.key),
                false => format!("{}: {:?}", property.key, property.dependency),
            })
            .collect(),
    };
    parts.join(", ")
}

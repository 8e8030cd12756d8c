use std::fmt::Debug;

use indexmap::{IndexMap, IndexSet};

use crate::{
    context::ContextId,
    declaration::{ModuleDeclaration, ModuleMetadata},
    errors::{InitError, RequireError},
    module::{Module, ModuleId},
    provider::{ClassProvider, Provider},
    token_factory::ModuleCompiler,
    types::{Instance, Token, TypeInfo},
    wrapper::{InstanceWrapper, WrapperArena, WrapperId},
};

/// Container holding every module and every instance wrapper
///
/// Mutated only while scanning, afterwards it is frozen behind an `Arc` and shared by the
/// injector and the application context.
#[derive(Default)]
pub struct DiContainer {
    modules: Vec<Module>,
    module_ids: IndexMap<String, ModuleId>,
    global_modules: IndexSet<ModuleId>,
    wrappers: WrapperArena,
    compiler: ModuleCompiler,
    core_module: Option<ModuleId>,
}

impl Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("DiContainer");
        for module in &self.modules {
            let providers: Vec<&str> = module
                .providers()
                .values()
                .map(|id| self.wrappers.get(*id).name())
                .collect();
            map.field(&module.name(), &providers);
        }
        map.finish()
    }
}

/// Result of [`DiContainer::add_module`]
pub struct AddedModule {
    pub id: ModuleId,
    /// The merged metadata, `None` when the module had been added before
    pub metadata: Option<ModuleMetadata>,
}

impl DiContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module unless one with the same token exists already
    pub fn add_module(&mut self, declaration: &ModuleDeclaration) -> AddedModule {
        let compiled = self.compiler.compile(declaration);
        if let Some(id) = self.module_ids.get(&compiled.token) {
            return AddedModule {
                id: *id,
                metadata: None,
            };
        }

        let id = ModuleId(self.modules.len());
        let is_global = compiled.metadata.global;
        self.modules.push(Module::new(
            id,
            compiled.token.clone(),
            compiled.module_type.info,
            is_global,
        ));
        self.module_ids.insert(compiled.token, id);
        if is_global {
            self.global_modules.insert(id);
        }

        AddedModule {
            id,
            metadata: Some(compiled.metadata),
        }
    }

    /// Adds the internal core module, imported by every other module
    pub(crate) fn add_core_module(&mut self, declaration: &ModuleDeclaration) -> AddedModule {
        let added = self.add_module(declaration);
        let module = &mut self.modules[added.id.0];
        module.mark_internal();
        module.set_distance(usize::MAX);
        self.core_module = Some(added.id);
        added
    }

    /// Wires `module` to import `related`, which must have been added already
    pub fn add_import(&mut self, related: &ModuleDeclaration, module: ModuleId) -> Result<ModuleId, InitError> {
        let token = self.compiler.token(related);
        let Some(related_id) = self.module_ids.get(&token).copied() else {
            return Err(InitError::UnknownModule(related.module_type().info.to_string()));
        };
        self.modules[module.0].add_import(related_id);
        Ok(related_id)
    }

    pub fn add_provider(&mut self, provider: Provider, module: ModuleId) -> WrapperId {
        let Self {
            modules, wrappers, ..
        } = self;
        modules[module.0].add_provider(provider, wrappers)
    }

    pub fn add_injectable(&mut self, provider: Provider, module: ModuleId, host: Option<&Token>) -> WrapperId {
        let Self {
            modules, wrappers, ..
        } = self;
        modules[module.0].add_injectable(provider, host, wrappers)
    }

    pub fn add_controller(&mut self, controller: ClassProvider, module: ModuleId) -> WrapperId {
        let Self {
            modules, wrappers, ..
        } = self;
        modules[module.0].add_controller(controller, wrappers)
    }

    pub fn add_middleware(&mut self, middleware: ClassProvider, module: ModuleId) -> WrapperId {
        let Self {
            modules, wrappers, ..
        } = self;
        modules[module.0].add_middleware(middleware, wrappers)
    }

    /// Validated against the providers and imports known at call time
    pub fn add_exported_token(&mut self, token: Token, module: ModuleId) -> Result<(), InitError> {
        let imported: Vec<TypeInfo> = self.modules[module.0]
            .imports()
            .iter()
            .map(|id| self.modules[id.0].metatype())
            .collect();
        self.modules[module.0].add_exported_token(token, &imported)
    }

    /// Adds every global module as an import of every other module
    ///
    /// Must run once the whole graph has been scanned.
    pub fn bind_global_scope(&mut self) {
        let globals: Vec<ModuleId> = self.global_modules.iter().copied().collect();
        for module in &mut self.modules {
            if module.is_internal() {
                continue;
            }
            for global in &globals {
                module.add_import(*global);
            }
        }
    }

    /// Seeds the request payload for `context`
    pub fn register_request_provider(&self, request: Instance, context: &ContextId) -> Result<(), RequireError> {
        let token = Token::of::<crate::core_module::Request>();
        let wrapper = self
            .core_module
            .and_then(|core| self.modules[core.0].get_provider_by_key(&token))
            .ok_or_else(|| RequireError::UnknownElement(token.to_string()))?;
        self.wrappers
            .get(wrapper)
            .set_instance_by_context_id(context, request);
        Ok(())
    }

    /// Drops every cache entry keyed by `context`
    pub fn release_context(&self, context: &ContextId) {
        for wrapper in self.wrappers.iter() {
            wrapper.release_context(context);
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    pub fn module_by_type(&self, info: &TypeInfo) -> Option<&Module> {
        self.modules
            .iter()
            .find(|module| module.metatype() == *info && !module.is_internal())
    }

    pub fn global_modules(&self) -> &IndexSet<ModuleId> {
        &self.global_modules
    }

    pub fn core_module(&self) -> Option<ModuleId> {
        self.core_module
    }

    pub fn wrappers(&self) -> &WrapperArena {
        &self.wrappers
    }

    pub fn wrapper(&self, id: WrapperId) -> &InstanceWrapper {
        self.wrappers.get(id)
    }
}

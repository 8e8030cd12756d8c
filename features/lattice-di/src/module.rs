use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::{
    errors::InitError,
    provider::{ClassProvider, Provider},
    types::{Token, TypeInfo},
    wrapper::{Collection, WrapperArena, WrapperId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named collection of providers with import and export edges
///
/// The wrappers themselves live in the container's arena, a module only maps tokens to
/// wrapper ids. Maps keep insertion order so bootstrap order is deterministic.
pub struct Module {
    id: ModuleId,
    token: String,
    metatype: TypeInfo,
    is_global: bool,
    is_internal: bool,
    distance: usize,
    imports: IndexSet<ModuleId>,
    providers: IndexMap<Token, WrapperId>,
    injectables: IndexMap<Token, WrapperId>,
    controllers: IndexMap<Token, WrapperId>,
    middlewares: IndexMap<Token, WrapperId>,
    exports: IndexSet<Token>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("distance", &self.distance)
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl Module {
    pub(crate) fn new(id: ModuleId, token: String, metatype: TypeInfo, is_global: bool) -> Self {
        Module {
            id,
            token,
            metatype,
            is_global,
            is_internal: false,
            distance: 0,
            imports: IndexSet::new(),
            providers: IndexMap::new(),
            injectables: IndexMap::new(),
            controllers: IndexMap::new(),
            middlewares: IndexMap::new(),
            exports: IndexSet::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn name(&self) -> String {
        self.metatype.to_string()
    }

    pub fn metatype(&self) -> TypeInfo {
        self.metatype
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub(crate) fn mark_internal(&mut self) {
        self.is_internal = true;
    }

    /// Shortest import path from the root module
    pub fn distance(&self) -> usize {
        self.distance
    }

    pub(crate) fn set_distance(&mut self, distance: usize) {
        self.distance = distance;
    }

    pub fn imports(&self) -> &IndexSet<ModuleId> {
        &self.imports
    }

    pub fn providers(&self) -> &IndexMap<Token, WrapperId> {
        &self.providers
    }

    pub fn injectables(&self) -> &IndexMap<Token, WrapperId> {
        &self.injectables
    }

    pub fn controllers(&self) -> &IndexMap<Token, WrapperId> {
        &self.controllers
    }

    pub fn middlewares(&self) -> &IndexMap<Token, WrapperId> {
        &self.middlewares
    }

    pub fn exports(&self) -> &IndexSet<Token> {
        &self.exports
    }

    pub fn collection(&self, collection: Collection) -> &IndexMap<Token, WrapperId> {
        match collection {
            Collection::Providers => &self.providers,
            Collection::Injectables => &self.injectables,
            Collection::Controllers => &self.controllers,
            Collection::Middlewares => &self.middlewares,
        }
    }

    pub fn has_provider(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    pub fn get_provider_by_key(&self, token: &Token) -> Option<WrapperId> {
        self.providers.get(token).copied()
    }

    /// Registers a provider, a later registration of the same token replaces the earlier one
    pub(crate) fn add_provider(&mut self, provider: Provider, arena: &mut WrapperArena) -> WrapperId {
        let token = provider.token().clone();
        let id = arena.insert(self.id, Collection::Providers, provider);
        self.providers.insert(token, id);
        id
    }

    /// Registers an enhancer and links it to its host provider or controller, if any
    pub(crate) fn add_injectable(
        &mut self,
        provider: Provider,
        host: Option<&Token>,
        arena: &mut WrapperArena,
    ) -> WrapperId {
        let id = match self.injectables.get(provider.token()) {
            Some(existing) => *existing,
            None => {
                let token = provider.token().clone();
                let id = arena.insert(self.id, Collection::Injectables, provider);
                self.injectables.insert(token, id);
                id
            }
        };

        let host = host.and_then(|host| {
            self.providers
                .get(host)
                .or_else(|| self.controllers.get(host))
        });
        if let Some(host) = host {
            arena.get(*host).add_enhancer_metadata(id);
        }
        id
    }

    pub(crate) fn add_controller(&mut self, controller: ClassProvider, arena: &mut WrapperArena) -> WrapperId {
        let token = controller.token.clone();
        let id = arena.insert(self.id, Collection::Controllers, Provider::Class(controller));
        self.controllers.insert(token, id);
        id
    }

    pub(crate) fn add_middleware(&mut self, middleware: ClassProvider, arena: &mut WrapperArena) -> WrapperId {
        let token = middleware.token.clone();
        let id = arena.insert(self.id, Collection::Middlewares, Provider::Class(middleware));
        self.middlewares.insert(token, id);
        id
    }

    /// Exports a local provider or re-exports an imported module
    ///
    /// `imported` are the types of the modules this module imports.
    pub(crate) fn add_exported_token(&mut self, token: Token, imported: &[TypeInfo]) -> Result<(), InitError> {
        self.validate_exported_token(&token, imported)?;
        self.exports.insert(token);
        Ok(())
    }

    fn validate_exported_token(&self, token: &Token, imported: &[TypeInfo]) -> Result<(), InitError> {
        if self.providers.contains_key(token) {
            return Ok(());
        }
        let is_imported_module = matches!(token, Token::Type(info) if imported.contains(info));
        if is_imported_module {
            return Ok(());
        }

        Err(InitError::UnknownExport {
            token: token.to_string(),
            module: self.name(),
        })
    }

    /// Adds an import edge
    pub(crate) fn add_import(&mut self, module: ModuleId) {
        if module != self.id {
            self.imports.insert(module);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        provider::{Component, ResolvedArgs},
        types::DynError,
    };

    struct CatsModule;
    struct DogsModule;

    struct CatsService;
    impl Component for CatsService {
        async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
            Ok(CatsService)
        }
    }

    struct LoggingGuard;
    impl Component for LoggingGuard {
        async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
            Ok(LoggingGuard)
        }
    }

    fn module() -> (Module, WrapperArena) {
        let token = "cats".to_string();
        (
            Module::new(ModuleId(0), token, TypeInfo::of::<CatsModule>(), false),
            WrapperArena::default(),
        )
    }

    #[test]
    fn exports_must_be_local_or_imported() {
        let (mut module, mut arena) = module();
        module.add_provider(Provider::class::<CatsService>(), &mut arena);

        assert!(module
            .add_exported_token(Token::of::<CatsService>(), &[])
            .is_ok());
        assert!(module
            .add_exported_token(Token::of::<DogsModule>(), &[TypeInfo::of::<DogsModule>()])
            .is_ok());

        let err = module
            .add_exported_token(Token::name("DOGS"), &[])
            .unwrap_err();
        assert!(matches!(err, InitError::UnknownExport { ref token, ref module } if token == "DOGS" && module == "CatsModule"));
        assert_eq!(module.exports().len(), 2);
    }

    #[test]
    fn injectables_link_to_their_host() {
        let (mut module, mut arena) = module();
        let host = module.add_provider(Provider::class::<CatsService>(), &mut arena);
        let guard = module.add_injectable(
            Provider::class::<LoggingGuard>(),
            Some(&Token::of::<CatsService>()),
            &mut arena,
        );

        assert_eq!(arena.get(host).enhancers_metadata(), vec![guard]);
        assert_eq!(arena.get(guard).collection(), Collection::Injectables);

        // Registering the same enhancer again reuses the wrapper
        let again = module.add_injectable(Provider::class::<LoggingGuard>(), None, &mut arena);
        assert_eq!(again, guard);
    }

    #[test]
    fn later_provider_replaces_earlier() {
        let (mut module, mut arena) = module();
        let first = module.add_provider(Provider::value("PORT", 1_u16), &mut arena);
        let second = module.add_provider(Provider::value("PORT", 2_u16), &mut arena);
        assert_ne!(first, second);
        assert_eq!(module.get_provider_by_key(&Token::name("PORT")), Some(second));
    }
}

//! Declarative module tree handed to the scanner.

use std::{fmt, sync::Arc};

use crate::{
    provider::{ClassProvider, Component, Provider},
    types::{Token, TypeInfo},
};

/// A module type, the replacement for a decorated module class
///
/// ```ignore
/// struct CatsModule;
/// impl ModuleDef for CatsModule {
///     fn metadata() -> ModuleMetadata {
///         ModuleMetadata::new()
///             .provider(Provider::class::<CatsService>())
///             .export(Token::of::<CatsService>())
///     }
/// }
/// ```
pub trait ModuleDef: 'static {
    fn metadata() -> ModuleMetadata;
}

/// Imports, providers and exports of a module
#[derive(Clone, Default)]
pub struct ModuleMetadata {
    pub imports: Vec<Import>,
    pub providers: Vec<Provider>,
    pub controllers: Vec<ClassProvider>,
    /// Enhancers, optionally attached to the provider or controller registered under the host token
    pub injectables: Vec<(Provider, Option<Token>)>,
    pub middlewares: Vec<ClassProvider>,
    pub exports: Vec<Token>,
    /// Global modules are imported by every other module
    pub global: bool,
}

impl ModuleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import<M: ModuleDef>(mut self) -> Self {
        self.imports.push(Import::Module(ModuleDeclaration::of::<M>()));
        self
    }

    pub fn import_dynamic(mut self, module: DynamicModule) -> Self {
        self.imports.push(Import::Module(module.into()));
        self
    }

    /// An import only looked up when the scanner reaches it, breaks import cycles
    pub fn forward_import(
        mut self,
        thunk: impl Fn() -> Option<ModuleDeclaration> + Send + Sync + 'static,
    ) -> Self {
        self.imports.push(Import::ForwardRef(Arc::new(thunk)));
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn controller<C: Component>(mut self) -> Self {
        self.controllers.push(ClassProvider::of::<C>());
        self
    }

    pub fn injectable(mut self, provider: Provider, host: Option<Token>) -> Self {
        self.injectables.push((provider, host));
        self
    }

    pub fn middleware<M: Component>(mut self) -> Self {
        self.middlewares.push(ClassProvider::of::<M>());
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(token.into());
        self
    }

    /// Re-exports an imported module
    pub fn export_module<M: ModuleDef>(mut self) -> Self {
        self.exports.push(Token::of::<M>());
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// `other` appended to `self`, global if either is
    pub(crate) fn merge(mut self, other: ModuleMetadata) -> Self {
        self.imports.extend(other.imports);
        self.providers.extend(other.providers);
        self.controllers.extend(other.controllers);
        self.injectables.extend(other.injectables);
        self.middlewares.extend(other.middlewares);
        self.exports.extend(other.exports);
        self.global |= other.global;
        self
    }
}

/// A lazily resolved import
pub type ModuleThunk = Arc<dyn Fn() -> Option<ModuleDeclaration> + Send + Sync>;

#[derive(Clone)]
pub enum Import {
    Module(ModuleDeclaration),
    ForwardRef(ModuleThunk),
}

impl fmt::Debug for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Import::Module(declaration) => write!(f, "{declaration:?}"),
            Import::ForwardRef(_) => f.write_str("forwardRef(..)"),
        }
    }
}

/// The type half of a module declaration
#[derive(Clone, Copy)]
pub struct ModuleType {
    pub info: TypeInfo,
    metadata: fn() -> ModuleMetadata,
}

impl ModuleType {
    pub fn of<M: ModuleDef>() -> Self {
        ModuleType {
            info: TypeInfo::of::<M>(),
            metadata: M::metadata,
        }
    }

    pub fn metadata(&self) -> ModuleMetadata {
        (self.metadata)()
    }

    pub fn token(&self) -> Token {
        Token::Type(self.info)
    }
}

/// A module type plus metadata decided at runtime
#[derive(Clone)]
pub struct DynamicModule {
    pub module: ModuleType,
    pub metadata: ModuleMetadata,
    /// Extra identity, two dynamic modules only collapse when their options match too
    pub options: Option<serde_json::Value>,
}

impl DynamicModule {
    pub fn new<M: ModuleDef>(metadata: ModuleMetadata) -> Self {
        DynamicModule {
            module: ModuleType::of::<M>(),
            metadata,
            options: None,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Clone)]
pub enum ModuleDeclaration {
    Static(ModuleType),
    Dynamic(DynamicModule),
}

impl ModuleDeclaration {
    pub fn of<M: ModuleDef>() -> Self {
        ModuleDeclaration::Static(ModuleType::of::<M>())
    }

    pub fn module_type(&self) -> ModuleType {
        match self {
            ModuleDeclaration::Static(module) => *module,
            ModuleDeclaration::Dynamic(dynamic) => dynamic.module,
        }
    }

    /// The static metadata with the dynamic part merged on top
    pub fn metadata(&self) -> ModuleMetadata {
        match self {
            ModuleDeclaration::Static(module) => module.metadata(),
            ModuleDeclaration::Dynamic(dynamic) => {
                dynamic.module.metadata().merge(dynamic.metadata.clone())
            }
        }
    }
}

impl From<DynamicModule> for ModuleDeclaration {
    fn from(module: DynamicModule) -> Self {
        ModuleDeclaration::Dynamic(module)
    }
}

impl From<ModuleType> for ModuleDeclaration {
    fn from(module: ModuleType) -> Self {
        ModuleDeclaration::Static(module)
    }
}

impl fmt::Debug for ModuleDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleDeclaration::Static(module) => write!(f, "{}", module.info),
            ModuleDeclaration::Dynamic(dynamic) => write!(f, "{} (dynamic)", dynamic.module.info),
        }
    }
}

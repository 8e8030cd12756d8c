//! Module based dependency injection for async Rust.
//!
//! An application is a graph of modules. Each module declares providers, imports other
//! modules and exports a subset of its providers to its importers. Bootstrapping scans the
//! graph into a [`DiContainer`] and creates every singleton up front, request and transient
//! scoped providers are created on demand for a [`ContextId`].
//!
//! ```ignore
//! struct CatsService { repository: Arc<CatsRepository> }
//!
//! impl Component for CatsService {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::on::<CatsRepository>()]
//!     }
//!
//!     async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
//!         Ok(CatsService { repository: args.get(0)? })
//!     }
//! }
//!
//! struct CatsModule;
//! impl ModuleDef for CatsModule {
//!     fn metadata() -> ModuleMetadata {
//!         ModuleMetadata::new()
//!             .provider(Provider::class::<CatsRepository>())
//!             .provider(Provider::class::<CatsService>())
//!             .export(Token::of::<CatsService>())
//!     }
//! }
//!
//! let app = ApplicationBuilder::new::<CatsModule>().build().await?;
//! let cats = app.get::<CatsService>()?;
//! ```

mod application;
mod builder;
mod config;
mod container;
mod context;
mod core_module;
mod declaration;
mod errors;
mod graph;
mod injector;
mod instance_loader;
mod links_host;
mod module;
mod provider;
mod resolver;
mod scanner;
mod token_factory;
mod types;
mod wrapper;

pub use application::{ApplicationContext, ModuleRef, RequestScope};
pub use builder::ApplicationBuilder;
pub use config::ApplicationConfig;
pub use container::{AddedModule, DiContainer};
pub use context::{ContextId, ContextIdFactory, ContextIdResolver, ContextIdStrategy, HostComponentInfo};
pub use core_module::{Inquirer, Request};
pub use declaration::{DynamicModule, Import, ModuleDeclaration, ModuleDef, ModuleMetadata, ModuleThunk, ModuleType};
pub use errors::{InitError, InjectError, RequireError};
pub use graph::{ModuleGraph, ModuleGraphError, ModuleGraphErrors};
pub use injector::Injector;
pub use links_host::{InstanceLink, InstanceLinksHost};
pub use module::{Module, ModuleId};
pub use provider::{
    ClassProvider, Component, Constructor, Dependency, DependencyPosition, ExistingProvider, FactoryProvider,
    PropertyDependency, Provider, ResolvedArgs, ValueProvider,
};
pub use resolver::{forward_ref::ForwardRef, GetOrResolveOptions, InstanceResolver};
pub use token_factory::{CompiledModule, ModuleCompiler, ModuleTokenFactory};
pub use types::{DynError, Injectable, Instance, Scope, Symbol, Token, TypeInfo};
pub use wrapper::{Collection, InstanceWrapper, WrapperArena, WrapperId};

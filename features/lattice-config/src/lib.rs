//! Lattice Config provides a global registry of configs that can be injected in the rest of the
//! modules.
//!
//! Lattice Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs and turn it into a module
//! 2. Config<T>: A wrapper type to read configs from resolved constructor arguments
//!
//! # Examples
//!
//! ```ignore
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let mut configs = ConfigProvider::new();
//! configs.add_config(AppConfig { host: "localhost".to_string(), port: 8080 })?;
//!
//! struct AppModule;
//! impl ModuleDef for AppModule {
//!     fn metadata() -> ModuleMetadata {
//!         ModuleMetadata::new().provider(Provider::class::<Server>())
//!     }
//! }
//!
//! let root = DynamicModule::new::<AppModule>(ModuleMetadata::new().import_dynamic(configs.into_module()));
//! let app = ApplicationBuilder::from_declaration(root).build().await?;
//! ```

pub mod config;
pub mod errors;
pub mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use provider::{ConfigModule, ConfigProvider};

use std::{any::TypeId, sync::Arc};

use indexmap::IndexMap;
use lattice_di::{
    DynamicModule, Injectable, Instance, ModuleDef, ModuleMetadata, Provider, Token, TypeInfo, ValueProvider,
};
use serde::de::DeserializeOwned;

use crate::errors::ConfigError;

/// A provider to register all configs.
///
/// Configs are registered and retrieved by type. Once complete the registry is turned into a
/// global module with [`ConfigProvider::into_module`], making every config injectable under
/// its type.
#[derive(Default)]
pub struct ConfigProvider {
    configs: IndexMap<TypeId, (TypeInfo, Instance)>,
}

/// Host module of the configs, only ever imported dynamically
pub struct ConfigModule;

impl ModuleDef for ConfigModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type.
    pub fn get_config<T: Injectable>(&self) -> Result<Arc<T>, ConfigError> {
        let missing = || ConfigError::Missing(TypeInfo::of::<T>());
        let (_, instance) = self.configs.get(&TypeId::of::<T>()).ok_or_else(missing)?;
        instance.downcast().map_err(|_| missing())
    }

    /// Add a config to the registry.
    ///
    /// Fails with [`ConfigError::AlreadyRegistered`] if the config type is already registered
    pub fn add_config<T: Injectable>(&mut self, config: T) -> Result<&mut Self, ConfigError> {
        let info = TypeInfo::of::<T>();
        if self.configs.contains_key(&info.type_id) {
            return Err(ConfigError::AlreadyRegistered(info));
        }

        self.configs.insert(info.type_id, (info, Instance::new(config)));
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Injectable>(&mut self, config: Option<T>) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    /// Deserializes a config from JSON and adds it
    pub fn add_json_config<T: Injectable + DeserializeOwned>(&mut self, json: &str) -> Result<&mut Self, ConfigError> {
        let config = serde_json::from_str::<T>(json).map_err(|e| ConfigError::Deserialize {
            config: TypeInfo::of::<T>(),
            message: e.to_string(),
        })?;
        self.add_config(config)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// A global module providing and exporting every config under its type
    pub fn into_module(self) -> DynamicModule {
        let names: Vec<&str> = self.configs.values().map(|(info, _)| info.type_name).collect();

        let metadata = self
            .configs
            .into_values()
            .fold(ModuleMetadata::new().global(), |metadata, (info, value)| {
                metadata
                    .provider(Provider::Value(ValueProvider {
                        token: Token::Type(info),
                        value,
                    }))
                    .export(Token::Type(info))
            });

        DynamicModule::new::<ConfigModule>(metadata).with_options(serde_json::json!({ "configs": names }))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ServerConfig {
        host: String,
        port: u16,
    }

    struct FeatureFlags {
        beta: bool,
    }

    #[test]
    fn configs_are_retrieved_by_type() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(FeatureFlags { beta: true })
            .unwrap()
            .maybe_add_config(None::<String>)
            .unwrap();

        assert!(provider.get_config::<FeatureFlags>().unwrap().beta);
        assert!(matches!(
            provider.get_config::<String>(),
            Err(ConfigError::Missing(info)) if info == TypeInfo::of::<String>()
        ));
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn configs_are_registered_once() {
        let mut provider = ConfigProvider::new();
        provider.add_config(FeatureFlags { beta: true }).unwrap();

        let err = provider.add_config(FeatureFlags { beta: false }).err().unwrap();
        assert!(matches!(err, ConfigError::AlreadyRegistered(_)));
        assert!(provider.get_config::<FeatureFlags>().unwrap().beta);
    }

    #[test]
    fn json_configs_are_deserialized() {
        let mut provider = ConfigProvider::new();
        provider
            .add_json_config::<ServerConfig>(r#"{ "host": "localhost", "port": 8080 }"#)
            .unwrap();
        assert_eq!(
            *provider.get_config::<ServerConfig>().unwrap(),
            ServerConfig {
                host: "localhost".to_string(),
                port: 8080,
            }
        );

        let err = provider
            .add_json_config::<ServerConfig>(r#"{ "host": "localhost", "port": "eighty" }"#)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Deserialize { .. }));
    }

    #[test]
    fn module_exports_every_config() {
        let mut provider = ConfigProvider::new();
        provider.add_config(FeatureFlags { beta: true }).unwrap();
        provider.add_config(8080_u16).unwrap();

        let module = provider.into_module();
        assert!(module.metadata.global);
        assert_eq!(module.metadata.providers.len(), 2);
        assert_eq!(
            module.metadata.exports,
            vec![Token::of::<FeatureFlags>(), Token::of::<u16>()]
        );
    }
}

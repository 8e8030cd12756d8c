use std::{any::TypeId, collections::HashMap};

use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use crate::{
    declaration::{Import, ModuleDeclaration, ModuleMetadata, ModuleType},
    provider::Provider,
};

/// Computes the opaque token a module is registered under
///
/// A static module always maps to the same token. Dynamic modules hash their type together
/// with their metadata, so two identical configurations of one module collapse into one.
#[derive(Default)]
pub struct ModuleTokenFactory {
    static_tokens: HashMap<TypeId, String>,
}

impl ModuleTokenFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, declaration: &ModuleDeclaration) -> String {
        match declaration {
            ModuleDeclaration::Static(module) => self.static_token(module),
            ModuleDeclaration::Dynamic(dynamic) => {
                let metadata = self.metadata_to_json(&dynamic.metadata);
                hash(&json!({
                    "id": module_identity(&dynamic.module),
                    "metadata": metadata,
                    "options": dynamic.options,
                }))
            }
        }
    }

    fn static_token(&mut self, module: &ModuleType) -> String {
        self.static_tokens
            .entry(module.info.type_id)
            .or_insert_with(|| hash(&json!({ "id": module_identity(module) })))
            .clone()
    }

    /// Values are opaque and left out, use the dynamic module options to tell them apart
    fn metadata_to_json(&mut self, metadata: &ModuleMetadata) -> Value {
        let imports: Vec<Value> = metadata
            .imports
            .iter()
            .map(|import| match import {
                Import::Module(declaration) => Value::String(self.create(declaration)),
                Import::ForwardRef(_) => Value::String("forwardRef".to_string()),
            })
            .collect();
        let providers: Vec<Value> = metadata.providers.iter().map(provider_to_json).collect();
        let controllers: Vec<String> = metadata
            .controllers
            .iter()
            .map(|controller| controller.class.type_name.to_string())
            .collect();
        let injectables: Vec<Value> = metadata
            .injectables
            .iter()
            .map(|(provider, host)| {
                json!({
                    "provider": provider_to_json(provider),
                    "host": host.as_ref().map(|host| format!("{host:?}")),
                })
            })
            .collect();
        let middlewares: Vec<String> = metadata
            .middlewares
            .iter()
            .map(|middleware| middleware.class.type_name.to_string())
            .collect();
        let exports: Vec<String> = metadata.exports.iter().map(|token| format!("{token:?}")).collect();

        json!({
            "imports": imports,
            "providers": providers,
            "controllers": controllers,
            "injectables": injectables,
            "middlewares": middlewares,
            "exports": exports,
            "global": metadata.global,
        })
    }
}

fn module_identity(module: &ModuleType) -> String {
    format!("{}:{:?}", module.info.type_name, module.info.type_id)
}

fn provider_to_json(provider: &Provider) -> Value {
    let token = format!("{:?}", provider.token());
    match provider {
        Provider::Class(p) => json!({
            "token": token,
            "class": p.class.type_name,
            "scope": p.scope.to_string(),
            "durable": p.durable,
        }),
        Provider::Value(p) => json!({ "token": token, "value": p.value.info.type_name }),
        Provider::Factory(p) => json!({
            "token": token,
            "inject": p.inject.iter().map(|dependency| format!("{dependency:?}")).collect::<Vec<_>>(),
            "scope": p.scope.to_string(),
            "durable": p.durable,
        }),
        Provider::Existing(p) => json!({ "token": token, "alias": format!("{:?}", p.alias_of) }),
    }
}

fn hash(value: &Value) -> String {
    let mut hasher = Sha1::new();
    hasher.update(value.to_string());
    format!("{:x}", hasher.finalize())
}

/// A declaration reduced to what the container stores
pub struct CompiledModule {
    pub module_type: ModuleType,
    pub metadata: ModuleMetadata,
    pub token: String,
}

/// Resolves declarations into their type, merged metadata and token
#[derive(Default)]
pub struct ModuleCompiler {
    token_factory: ModuleTokenFactory,
}

impl ModuleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, declaration: &ModuleDeclaration) -> CompiledModule {
        CompiledModule {
            module_type: declaration.module_type(),
            metadata: declaration.metadata(),
            token: self.token_factory.create(declaration),
        }
    }

    /// Only the token, without evaluating metadata
    pub fn token(&mut self, declaration: &ModuleDeclaration) -> String {
        self.token_factory.create(declaration)
    }
}

use std::sync::Arc;

use futures::FutureExt;

use crate::{
    declaration::{ModuleDef, ModuleMetadata},
    provider::{FactoryProvider, Provider, ResolvedArgs},
    types::{DynError, Scope, Token},
};

/// Token of the payload the current context was created for
///
/// Depending on it makes a provider request scoped. The instance handed out is the payload
/// itself, so `args.get::<MyRequest>(index)` downcasts straight to the payload type.
pub struct Request;

/// Token of the consumer a transient provider is being built for
///
/// Resolves to that consumer's [`Token`], or to nothing when there is none.
pub struct Inquirer;

/// Imported by every module, provides [`Request`]
pub(crate) struct InternalCoreModule;

impl ModuleDef for InternalCoreModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(request_provider())
            .export(Token::of::<Request>())
            .global()
    }
}

fn request_provider() -> Provider {
    Provider::Factory(FactoryProvider {
        token: Token::of::<Request>(),
        inject: Vec::new(),
        factory: Arc::new(|args: ResolvedArgs| {
            let payload = args
                .context()
                .payload()
                .cloned()
                .ok_or_else(|| DynError::from("no request payload is registered for this context"));
            async move { payload }.boxed()
        }),
        scope: Scope::Request,
        durable: false,
    })
}

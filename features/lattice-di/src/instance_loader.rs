use std::{
    thread::{self, sleep},
    time::Duration,
};

use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use futures_channel::oneshot;

use crate::{
    context::ContextId,
    errors::{InitError, InjectError},
    injector::Injector,
    module::ModuleId,
    wrapper::Collection,
};

/// Creates every static instance of a scanned container
pub(crate) struct InstanceLoader {
    injector: Injector,
}

impl InstanceLoader {
    pub(crate) fn new(injector: Injector) -> Self {
        InstanceLoader { injector }
    }

    /// Loads modules deepest first, all instances of one module concurrently
    pub(crate) async fn create_instances_of_dependencies(&self, timeout: Option<Duration>) -> Result<(), InitError> {
        // Never completes while the sender is held
        let (timeout_tx, mut timeout_rx) = oneshot::channel::<()>();
        let _keep_alive = match timeout {
            Some(timeout) => {
                // The thread is not joined, it dies after the timeout
                thread::spawn(move || {
                    sleep(timeout);
                    let _ = timeout_tx.send(());
                });
                None
            }
            None => Some(timeout_tx),
        };

        let container = self.injector.container();
        let mut modules: Vec<ModuleId> = container.modules().iter().map(|module| module.id()).collect();
        modules.sort_by_key(|id| std::cmp::Reverse(container.module(*id).distance()));

        self.injector.record_dependency_edges();
        tracing::debug!("Initializing {} modules", modules.len());
        for module in modules {
            let mut pending = self.load_module(module);
            let total = pending.len();

            loop {
                tracing::debug!(
                    "Waiting for instances of {} [{} of {total} complete]",
                    container.module(module).name(),
                    total - pending.len()
                );
                futures::select! {
                    result = pending.next() => match result {
                        Some(result) => result?,
                        None => break,
                    },
                    _ = timeout_rx => {
                        return Err(InitError::Timeout)
                    }
                }
            }
            tracing::info!("{} dependencies initialized", container.module(module).name());
        }
        Ok(())
    }

    fn load_module(&self, module: ModuleId) -> FuturesUnordered<BoxFuture<'static, Result<(), InjectError>>> {
        let container = self.injector.container();
        let host = container.module(module);
        let context = ContextId::static_context();

        [
            Collection::Providers,
            Collection::Injectables,
            Collection::Controllers,
            Collection::Middlewares,
        ]
        .into_iter()
        .flat_map(|collection| host.collection(collection).values().copied())
        .map(|wrapper| self.injector.load_instance(wrapper, module, &context, None))
        .collect()
    }
}

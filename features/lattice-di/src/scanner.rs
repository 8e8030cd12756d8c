use crate::{
    container::DiContainer,
    core_module::InternalCoreModule,
    declaration::{Import, ModuleDeclaration, ModuleMetadata},
    errors::InitError,
    graph::ModuleGraph,
    module::ModuleId,
};

/// A module whose declaration has been read but not inserted yet
struct ScannedModule {
    id: ModuleId,
    metadata: ModuleMetadata,
    imports: Vec<ModuleDeclaration>,
}

/// Walks the declaration tree from the root module and fills the container
///
/// Runs in two passes. The first one adds every reachable module and checks the import
/// graph, the second one inserts imports first, then the providers, and the exports last so
/// they are validated against complete modules.
pub(crate) struct DependenciesScanner<'a> {
    container: &'a mut DiContainer,
    graph: ModuleGraph,
    scanned: Vec<ScannedModule>,
}

impl<'a> DependenciesScanner<'a> {
    pub(crate) fn new(container: &'a mut DiContainer) -> Self {
        DependenciesScanner {
            container,
            graph: ModuleGraph::new(),
            scanned: Vec::new(),
        }
    }

    /// Scans `root` and returns its module id
    pub(crate) fn scan(mut self, root: &ModuleDeclaration) -> Result<ModuleId, InitError> {
        let core = self
            .container
            .add_core_module(&ModuleDeclaration::of::<InternalCoreModule>());
        if let Some(metadata) = core.metadata {
            self.scanned.push(ScannedModule {
                id: core.id,
                metadata,
                imports: Vec::new(),
            });
        }

        let root = self.scan_for_modules(root, &mut Vec::new())?;
        self.graph.check()?;

        self.scan_modules_for_dependencies()?;
        self.container.bind_global_scope();
        self.calculate_distance(root, 1, &mut Vec::new());
        tracing::debug!("Scanned {} modules", self.container.modules().len());
        Ok(root)
    }

    fn scan_for_modules(
        &mut self,
        declaration: &ModuleDeclaration,
        scope: &mut Vec<String>,
    ) -> Result<ModuleId, InitError> {
        let added = self.container.add_module(declaration);
        let token = self.container.module(added.id).token().to_string();
        let name = self.container.module(added.id).name();
        self.graph.add_module(&token, &name);

        // Seen before, its imports are being or have been scanned
        let Some(metadata) = added.metadata else {
            return Ok(added.id);
        };

        scope.push(name);
        let mut imports = Vec::with_capacity(metadata.imports.len());
        for (index, import) in metadata.imports.iter().enumerate() {
            let (related, lazy) = match import {
                Import::Module(related) => (related.clone(), false),
                Import::ForwardRef(thunk) => {
                    let related = thunk().ok_or_else(|| InitError::UndefinedForwardRef {
                        scope: scope.clone(),
                        index,
                    })?;
                    (related, true)
                }
            };

            let related_id = self.scan_for_modules(&related, scope)?;
            let related_token = self.container.module(related_id).token().to_string();
            self.graph.add_import(&token, &related_token, lazy);
            imports.push(related);
        }
        scope.pop();

        self.scanned.push(ScannedModule {
            id: added.id,
            metadata,
            imports,
        });
        Ok(added.id)
    }

    fn scan_modules_for_dependencies(&mut self) -> Result<(), InitError> {
        let scanned = std::mem::take(&mut self.scanned);

        for module in &scanned {
            for related in &module.imports {
                self.container.add_import(related, module.id)?;
            }
        }

        for module in scanned {
            let ScannedModule { id, metadata, .. } = module;
            for provider in metadata.providers {
                self.container.add_provider(provider, id);
            }
            for controller in metadata.controllers {
                self.container.add_controller(controller, id);
            }
            // After controllers, so enhancers find their host
            for (injectable, host) in metadata.injectables {
                self.container.add_injectable(injectable, id, host.as_ref());
            }
            for middleware in metadata.middlewares {
                self.container.add_middleware(middleware, id);
            }
            for token in metadata.exports {
                self.container.add_exported_token(token, id)?;
            }
        }
        Ok(())
    }

    /// Longest import path from the root, the internal core module keeps its maximum
    fn calculate_distance(&mut self, module: ModuleId, distance: usize, path: &mut Vec<ModuleId>) {
        let current = self.container.module(module);
        if current.is_internal() || path.contains(&module) || current.distance() >= distance {
            return;
        }
        let imports: Vec<ModuleId> = current.imports().iter().copied().collect();
        self.container.module_mut(module).set_distance(distance);

        path.push(module);
        for related in imports {
            self.calculate_distance(related, distance + 1, path);
        }
        path.pop();
    }
}

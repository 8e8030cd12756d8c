use std::collections::HashMap;

use crate::{
    container::DiContainer,
    errors::RequireError,
    module::ModuleId,
    types::Token,
    wrapper::{Collection, WrapperId},
};

/// Where one registration of a token lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLink {
    pub token: Token,
    pub wrapper: WrapperId,
    pub collection: Collection,
    pub module: ModuleId,
}

/// Flat index from token to every registration of it, built once after bootstrap
#[derive(Debug, Default)]
pub struct InstanceLinksHost {
    links: HashMap<Token, Vec<InstanceLink>>,
}

impl InstanceLinksHost {
    pub fn new(container: &DiContainer) -> Self {
        let mut links: HashMap<Token, Vec<InstanceLink>> = HashMap::new();
        for module in container.modules() {
            for collection in [
                Collection::Providers,
                Collection::Injectables,
                Collection::Controllers,
                Collection::Middlewares,
            ] {
                for (token, wrapper) in module.collection(collection) {
                    links.entry(token.clone()).or_default().push(InstanceLink {
                        token: token.clone(),
                        wrapper: *wrapper,
                        collection,
                        module: module.id(),
                    });
                }
            }
        }
        InstanceLinksHost { links }
    }

    /// The registration in `module`, or the most recent one when no module is given
    pub fn get(&self, token: &Token, module: Option<ModuleId>) -> Result<&InstanceLink, RequireError> {
        let links = self.links_for(token)?;
        let link = match module {
            Some(module) => links.iter().find(|link| link.module == module),
            None => links.last(),
        };
        link.ok_or_else(|| RequireError::UnknownElement(token.to_string()))
    }

    /// Every registration, restricted to `module` when given
    pub fn get_each(&self, token: &Token, module: Option<ModuleId>) -> Result<Vec<&InstanceLink>, RequireError> {
        let links: Vec<&InstanceLink> = self
            .links_for(token)?
            .iter()
            .filter(|link| module.map_or(true, |module| link.module == module))
            .collect();
        if links.is_empty() {
            return Err(RequireError::UnknownElement(token.to_string()));
        }
        Ok(links)
    }

    fn links_for(&self, token: &Token) -> Result<&[InstanceLink], RequireError> {
        self.links
            .get(token)
            .map(Vec::as_slice)
            .ok_or_else(|| RequireError::UnknownElement(token.to_string()))
    }
}

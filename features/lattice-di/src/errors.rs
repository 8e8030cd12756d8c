use std::sync::Arc;

use thiserror::Error;

use crate::{
    graph::ModuleGraphErrors,
    provider::DependencyPosition,
    types::{DynError, Scope},
};

/// Errors while resolving a provider and its dependencies
#[derive(Error, Debug, Clone)]
pub enum InjectError {
    /// Could not require the type
    #[error(transparent)]
    RequireError(#[from] RequireError),

    /// A dependency token is not reachable from the requesting module
    #[error(
        "Can't resolve dependencies of {dependent} ({signature}). \
         Please make sure that the argument {token} at {position} is available in the {module} context."
    )]
    UnknownDependencies {
        dependent: String,
        signature: String,
        token: String,
        position: DependencyPosition,
        module: String,
    },

    /// The metadata producer could not tell which token a parameter needs
    #[error(
        "Can't resolve dependencies of {dependent} ({signature}). \
         The dependency at {position} in the {module} context is undefined."
    )]
    UndefinedDependency {
        dependent: String,
        signature: String,
        position: DependencyPosition,
        module: String,
    },

    /// Two providers wait on each other without a forward reference
    #[error("A circular dependency has been detected inside {0}. Use a forward reference on one side of the cycle.")]
    CircularDependency(String),

    /// A constructor or factory failed
    #[error("Factory for '{product}' failed - error: {error}")]
    FactoryFailed {
        product: String,
        error: Arc<DynError>,
    },

    /// The task owning an in-flight resolution went away without settling it
    #[error("Resolution of '{0}' was abandoned before it settled")]
    SettlementAborted(String),
}

/// Errors when trying to require a certain instance
#[derive(thiserror::Error, Debug, Clone)]
pub enum RequireError {
    /// The token is not part of the instance index
    #[error("Could not find {0} element (this provider does not exist in the current context)")]
    UnknownElement(String),

    /// `get` was used on a token that only exists per context
    #[error("{token} is marked as a scoped provider ({scope}). Request and transient-scoped providers can't be used in combination with `get`. Please use `resolve` instead.")]
    InvalidClassScope { token: String, scope: Scope },

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },

    /// The token is known but has no settled instance for the asked context
    #[error("{0} has not been resolved for this context yet")]
    NotResolved(String),
}

/// Errors while building the module graph and initiating instances
#[derive(thiserror::Error, Debug, Clone)]
pub enum InitError {
    /// Import cycles without forward references
    #[error(transparent)]
    ModuleGraph(#[from] ModuleGraphErrors),

    /// A forward referenced import did not yield a module
    #[error("Cannot create the module instance. The module at index [{index}] of the {} imports is undefined. Scope [{}]", .scope.last().map(String::as_str).unwrap_or("root"), .scope.join(" -> "))]
    UndefinedForwardRef { scope: Vec<String>, index: usize },

    /// A module was selected or wired that is not part of the container
    #[error("Could not select the given module ({0})")]
    UnknownModule(String),

    /// A module exports a token it neither declares nor imports
    #[error("Cannot export a provider/module that is not a part of the currently processed module ({module}). Please verify whether the exported {token} is available in this particular context.")]
    UnknownExport { token: String, module: String },

    /// Instances could not be created
    #[error(transparent)]
    InjectError(#[from] InjectError),

    /// Initiation timed out
    #[error("Initiation timed out")]
    Timeout,
}

impl From<RequireError> for InitError {
    fn from(error: RequireError) -> Self {
        InitError::InjectError(error.into())
    }
}

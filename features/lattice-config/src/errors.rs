use lattice_di::TypeInfo;

/// Errors when registering or acquiring a config
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// A config of this type was registered before
    #[error("The config type {0} is already registered")]
    AlreadyRegistered(TypeInfo),

    /// No config of this type is known
    #[error("The config type {0} is not known")]
    Missing(TypeInfo),

    /// The JSON source did not match the config type
    #[error("Could not deserialize the config type {config}: {message}")]
    Deserialize { config: TypeInfo, message: String },
}

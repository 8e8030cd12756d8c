use std::{ops::Deref, sync::Arc};

use lattice_di::{Dependency, InjectError, Injectable, ResolvedArgs};

/// A wrapper type to allow for config injections
///
/// Configs registered in a [`crate::provider::ConfigProvider`] are provided under their own
/// type, `Config<T>` reads them back from the resolved constructor arguments.
///
/// # Example
/// ```ignore
/// pub struct MyServiceConfig {
///     enabled: bool,
/// }
///
/// pub struct MyService {
///     config: Config<MyServiceConfig>,
/// }
///
/// impl Component for MyService {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Config::<MyServiceConfig>::dependency()]
///     }
///
///     async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
///         Ok(MyService { config: Config::from_args(&args, 0)? })
///     }
/// }
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}

impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// The dependency to declare for a `Config<T>` constructor argument
    pub fn dependency() -> Dependency {
        Dependency::on::<T>()
    }

    /// Reads the config resolved at `index`
    pub fn from_args(args: &ResolvedArgs, index: usize) -> Result<Self, InjectError> {
        Ok(Config {
            inner: args.get::<T>(index)?,
        })
    }

    /// Reads an optional config resolved at `index`
    pub fn maybe_from_args(args: &ResolvedArgs, index: usize) -> Result<Option<Self>, InjectError> {
        Ok(args.optional::<T>(index)?.map(|inner| Config { inner }))
    }
}

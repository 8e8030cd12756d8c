use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    context::ContextId,
    errors::{InjectError, RequireError},
    resolver::forward_ref::{DeferredInstance, ForwardRef},
    types::{DynError, Injectable, Instance, Scope, Token, TypeInfo},
};

/// Builds an instance from its resolved dependencies
pub type Constructor =
    Arc<dyn Fn(ResolvedArgs) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;

/// A type the container can construct
///
/// This is the explicit replacement for constructor reflection: the type lists the tokens it
/// needs, and receives them resolved, in the same order, in [`Component::construct`].
pub trait Component: Injectable + Sized {
    /// Constructor dependencies, in parameter order
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Dependencies injected by name rather than by position
    fn properties() -> Vec<PropertyDependency> {
        Vec::new()
    }

    fn scope() -> Scope {
        Scope::Singleton
    }

    /// Request scoped components marked durable are cached per durable context
    fn durable() -> bool {
        false
    }

    /// Constructs a new instance
    ///
    /// Returns the constructed instance, or an error if the instantiation failed
    fn construct(args: ResolvedArgs) -> impl Future<Output = Result<Self, DynError>> + Send;
}

fn component_constructor<T: Component>() -> Constructor {
    Arc::new(|args: ResolvedArgs| {
        // Forward the call to the specific implementation
        async move { T::construct(args).await.map(Instance::new) }.boxed()
    })
}

/// A provider declaration, exactly one variant per registration
#[derive(Clone)]
pub enum Provider {
    Class(ClassProvider),
    Value(ValueProvider),
    Factory(FactoryProvider),
    Existing(ExistingProvider),
}

#[derive(Clone)]
pub struct ClassProvider {
    pub token: Token,
    pub class: TypeInfo,
    pub inject: Vec<Dependency>,
    pub properties: Vec<PropertyDependency>,
    pub constructor: Constructor,
    pub scope: Scope,
    pub durable: bool,
}

#[derive(Clone)]
pub struct ValueProvider {
    pub token: Token,
    pub value: Instance,
}

#[derive(Clone)]
pub struct FactoryProvider {
    pub token: Token,
    pub inject: Vec<Dependency>,
    pub factory: Constructor,
    pub scope: Scope,
    pub durable: bool,
}

#[derive(Clone)]
pub struct ExistingProvider {
    pub token: Token,
    pub alias_of: Token,
}

impl ClassProvider {
    /// `T` registered under its own type
    pub fn of<T: Component>() -> Self {
        Self::with_token::<T>(Token::of::<T>())
    }

    /// `T` registered under another token
    pub fn with_token<T: Component>(token: Token) -> Self {
        ClassProvider {
            token,
            class: TypeInfo::of::<T>(),
            inject: T::dependencies(),
            properties: T::properties(),
            constructor: component_constructor::<T>(),
            scope: T::scope(),
            durable: T::durable(),
        }
    }
}

impl Provider {
    pub fn class<T: Component>() -> Provider {
        Provider::Class(ClassProvider::of::<T>())
    }

    pub fn use_class<T: Component>(token: impl Into<Token>) -> Provider {
        Provider::Class(ClassProvider::with_token::<T>(token.into()))
    }

    pub fn value<T: Injectable>(token: impl Into<Token>, value: T) -> Provider {
        Provider::Value(ValueProvider {
            token: token.into(),
            value: Instance::new(value),
        })
    }

    /// A factory called with the resolved `inject` list
    pub fn factory<T, E, F, Fut>(token: impl Into<Token>, inject: Vec<Dependency>, factory: F) -> Provider
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(ResolvedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let factory: Constructor = Arc::new(move |args| {
            let fut = factory(args);
            async move { fut.await.map(Instance::new).map_err(Into::into) }.boxed()
        });

        Provider::Factory(FactoryProvider {
            token: token.into(),
            inject,
            factory,
            scope: Scope::Singleton,
            durable: false,
        })
    }

    /// `token` resolves to whatever `alias_of` resolves to
    pub fn existing(token: impl Into<Token>, alias_of: impl Into<Token>) -> Provider {
        Provider::Existing(ExistingProvider {
            token: token.into(),
            alias_of: alias_of.into(),
        })
    }

    pub fn token(&self) -> &Token {
        match self {
            Provider::Class(p) => &p.token,
            Provider::Value(p) => &p.token,
            Provider::Factory(p) => &p.token,
            Provider::Existing(p) => &p.token,
        }
    }

    /// Overrides the scope; values and aliases ignore it
    pub fn with_scope(mut self, scope: Scope) -> Self {
        match &mut self {
            Provider::Class(p) => p.scope = scope,
            Provider::Factory(p) => p.scope = scope,
            Provider::Value(_) | Provider::Existing(_) => {}
        }
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        match &mut self {
            Provider::Class(p) => p.durable = durable,
            Provider::Factory(p) => p.durable = durable,
            Provider::Value(_) | Provider::Existing(_) => {}
        }
        self
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Class(p) => write!(f, "Class({} => {})", p.token, p.class),
            Provider::Value(p) => write!(f, "Value({})", p.token),
            Provider::Factory(p) => write!(f, "Factory({})", p.token),
            Provider::Existing(p) => write!(f, "Existing({} => {})", p.token, p.alias_of),
        }
    }
}

/// Information about a single dependency of a provider
#[derive(Clone)]
pub struct Dependency {
    pub(crate) kind: DependencyKind,
    /// If it is optional or required
    pub(crate) optional: bool,
}

#[derive(Clone)]
pub(crate) enum DependencyKind {
    Token(Token),
    /// Resolved lazily, breaks declaration cycles
    ForwardRef(Arc<dyn Fn() -> Token + Send + Sync>),
    /// The metadata producer did not know the parameter type
    Undefined,
}

impl Dependency {
    pub fn on<T: 'static + ?Sized>() -> Self {
        Self::token(Token::of::<T>())
    }

    pub fn token(token: impl Into<Token>) -> Self {
        Dependency {
            kind: DependencyKind::Token(token.into()),
            optional: false,
        }
    }

    /// The target is only looked up when the dependency is resolved, and injected as a
    /// [`ForwardRef`] handle instead of being awaited
    pub fn forward_ref(thunk: impl Fn() -> Token + Send + Sync + 'static) -> Self {
        Dependency {
            kind: DependencyKind::ForwardRef(Arc::new(thunk)),
            optional: false,
        }
    }

    /// Placeholder for a parameter whose token could not be determined
    pub fn undefined() -> Self {
        Dependency {
            kind: DependencyKind::Undefined,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_forward_ref(&self) -> bool {
        matches!(self.kind, DependencyKind::ForwardRef(_))
    }

    /// The token this dependency points at, invoking the forward reference thunk if needed
    pub fn resolve_token(&self) -> Option<Token> {
        match &self.kind {
            DependencyKind::Token(token) => Some(token.clone()),
            DependencyKind::ForwardRef(thunk) => Some(thunk()),
            DependencyKind::Undefined => None,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DependencyKind::Token(token) => write!(f, "{token}")?,
            DependencyKind::ForwardRef(thunk) => write!(f, "forwardRef({})", thunk())?,
            DependencyKind::Undefined => f.write_str("undefined")?,
        }
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// A dependency injected by key
#[derive(Clone, Debug)]
pub struct PropertyDependency {
    pub key: String,
    pub dependency: Dependency,
}

impl PropertyDependency {
    pub fn new(key: impl Into<String>, dependency: Dependency) -> Self {
        Self {
            key: key.into(),
            dependency,
        }
    }
}

/// Where a dependency sits on its dependent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyPosition {
    Index(usize),
    Property(String),
}

impl fmt::Display for DependencyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyPosition::Index(index) => write!(f, "index [{index}]"),
            DependencyPosition::Property(key) => write!(f, "property '{key}'"),
        }
    }
}

pub(crate) enum Injected {
    Instance(Instance),
    Deferred(DeferredInstance),
    Absent,
}

/// The resolved dependencies handed to a constructor or factory
pub struct ResolvedArgs {
    pub(crate) product: String,
    pub(crate) ctor: Vec<Injected>,
    pub(crate) properties: HashMap<String, Injected>,
    pub(crate) context: ContextId,
    pub(crate) inquirer: Option<Token>,
}

impl ResolvedArgs {
    /// The required dependency at `index`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>, InjectError> {
        self.optional(index)?
            .ok_or_else(|| self.not_resolved(DependencyPosition::Index(index)))
    }

    /// The dependency at `index`, `None` if it was optional and not found
    pub fn optional<T: Injectable>(&self, index: usize) -> Result<Option<Arc<T>>, InjectError> {
        let position = DependencyPosition::Index(index);
        extract(self.ctor.get(index), || self.not_resolved(position))
    }

    /// A forward referenced dependency at `index`
    pub fn forward<T: Injectable>(&self, index: usize) -> Result<ForwardRef<T>, InjectError> {
        let position = DependencyPosition::Index(index);
        forward(self.ctor.get(index), || self.not_resolved(position))
    }

    pub fn property<T: Injectable>(&self, key: &str) -> Result<Arc<T>, InjectError> {
        self.optional_property(key)?
            .ok_or_else(|| self.not_resolved(DependencyPosition::Property(key.to_string())))
    }

    pub fn optional_property<T: Injectable>(&self, key: &str) -> Result<Option<Arc<T>>, InjectError> {
        let position = DependencyPosition::Property(key.to_string());
        extract(self.properties.get(key), || self.not_resolved(position))
    }

    pub fn forward_property<T: Injectable>(&self, key: &str) -> Result<ForwardRef<T>, InjectError> {
        let position = DependencyPosition::Property(key.to_string());
        forward(self.properties.get(key), || self.not_resolved(position))
    }

    /// The raw instance at `index`, if it was resolved eagerly
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        match self.ctor.get(index) {
            Some(Injected::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.ctor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctor.is_empty()
    }

    /// The context this instance is being built for
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// The token of the consumer this (transient) instance is being built for
    pub fn inquirer(&self) -> Option<&Token> {
        self.inquirer.as_ref()
    }

    fn not_resolved(&self, position: DependencyPosition) -> InjectError {
        RequireError::NotResolved(format!("{position} of {}", self.product)).into()
    }
}

fn extract<T: Injectable>(
    injected: Option<&Injected>,
    missing: impl FnOnce() -> InjectError,
) -> Result<Option<Arc<T>>, InjectError> {
    match injected {
        Some(Injected::Instance(instance)) => downcast(instance).map(Some),
        Some(Injected::Deferred(deferred)) => match deferred.current() {
            Some(instance) => downcast(&instance).map(Some),
            None => Err(missing()),
        },
        Some(Injected::Absent) => Ok(None),
        None => Err(missing()),
    }
}

fn forward<T: Injectable>(
    injected: Option<&Injected>,
    missing: impl FnOnce() -> InjectError,
) -> Result<ForwardRef<T>, InjectError> {
    match injected {
        Some(Injected::Deferred(deferred)) => Ok(ForwardRef::deferred(deferred.clone())),
        Some(Injected::Instance(instance)) => Ok(ForwardRef::settled(downcast(instance)?)),
        Some(Injected::Absent) | None => Err(missing()),
    }
}

pub(crate) fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, InjectError> {
    instance.downcast::<T>().map_err(|actual_type| {
        RequireError::DowncastFailed {
            required_type: std::any::type_name::<T>(),
            actual_type,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repository;

    #[test]
    fn dependency_debug_marks_optional_and_forward() {
        let dep = Dependency::on::<Repository>().optional();
        assert_eq!(format!("{dep:?}"), "Repository?");

        let dep = Dependency::forward_ref(|| Token::name("CATS"));
        assert!(dep.is_forward_ref());
        assert_eq!(format!("{dep:?}"), "forwardRef(CATS)");
        assert_eq!(dep.resolve_token(), Some(Token::name("CATS")));

        assert_eq!(Dependency::undefined().resolve_token(), None);
    }

    #[test]
    fn with_scope_applies_to_factories_only_when_meaningful() {
        let provider = Provider::factory("CONN", vec![], |_| async { Ok::<_, DynError>(1_u8) })
            .with_scope(Scope::Request);
        match provider {
            Provider::Factory(p) => assert_eq!(p.scope, Scope::Request),
            _ => panic!("expected a factory provider"),
        }

        let provider = Provider::value("PORT", 8080_u16).with_scope(Scope::Transient);
        assert!(matches!(provider, Provider::Value(_)));
        assert_eq!(provider.token(), &Token::name("PORT"));
    }

    #[test]
    fn resolved_args_extracts_by_position_and_key() {
        let args = ResolvedArgs {
            product: "Service".to_string(),
            ctor: vec![Injected::Instance(Instance::new(3_u8)), Injected::Absent],
            properties: HashMap::from([("name".to_string(), Injected::Instance(Instance::new("n".to_string())))]),
            context: ContextId::static_context(),
            inquirer: None,
        };

        assert_eq!(*args.get::<u8>(0).unwrap(), 3);
        assert!(args.optional::<u8>(1).unwrap().is_none());
        assert!(args.get::<u8>(1).is_err());
        assert!(args.get::<u8>(7).is_err());
        assert!(matches!(
            args.get::<u16>(0),
            Err(InjectError::RequireError(RequireError::DowncastFailed { .. }))
        ));
        assert_eq!(args.property::<String>("name").unwrap().as_str(), "n");
    }
}

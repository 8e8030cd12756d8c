use std::{
    any::{Any, TypeId},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// All errors must be clone
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Instance of a Provider
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}

impl Instance {
    pub fn new<ExistingInstance: Injectable>(instance: ExistingInstance) -> Self {
        Instance {
            info: TypeInfo::of::<ExistingInstance>(),
            instance: Arc::new(instance),
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    /// True if both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the last path segment, `my_app::users::UsersService` reads as `UsersService`
        let (path, generics) = match self.type_name.find('<') {
            Some(at) => self.type_name.split_at(at),
            None => (self.type_name, ""),
        };
        let short = path.rsplit("::").next().unwrap_or(path);
        write!(f, "{short}{generics}")
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Identity key under which a provider is registered and looked up
///
/// Tokens compare by identity: two `Type` tokens are equal when they name the same
/// Rust type, two `Symbol` tokens only when they come from the same [`Token::symbol`] call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A concrete type (the "class reference")
    Type(TypeInfo),
    /// A string token
    Name(Arc<str>),
    /// A unique symbol
    Symbol(Symbol),
}

impl Token {
    pub fn of<T: 'static + ?Sized>() -> Token {
        Token::Type(TypeInfo::of::<T>())
    }

    pub fn name(name: impl Into<Arc<str>>) -> Token {
        Token::Name(name.into())
    }

    /// Allocates a new symbol, never equal to any other symbol
    pub fn symbol(description: &'static str) -> Token {
        static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);
        Token::Symbol(Symbol {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(info) => write!(f, "{info}"),
            Token::Name(name) => f.write_str(name),
            Token::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
        }
    }
}

impl From<TypeInfo> for Token {
    fn from(info: TypeInfo) -> Self {
        Token::Type(info)
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::Name(name.into())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}
impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Symbol {}
impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl Symbol {
    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// Lifetime policy of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One instance for the lifetime of the process
    #[default]
    Singleton,
    /// One instance per context id
    Request,
    /// One instance per consumer
    Transient,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => f.write_str("singleton"),
            Scope::Request => f.write_str("request"),
            Scope::Transient => f.write_str("transient"),
        }
    }
}

//! Boots a small application and serves two requests against it.
//!
//! Run with `RUST_LOG=debug` to follow the module scan and instance loading.
//! `LATTICE_INIT_TIMEOUT_MS` bounds the bootstrap.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::executor::block_on;
use lattice_di::{
    ApplicationBuilder, ApplicationConfig, Component, Dependency, DynError, InstanceResolver, Inquirer, ModuleDef,
    ModuleMetadata, Provider, Request, ResolvedArgs, Scope, Token,
};
use tracing_subscriber::EnvFilter;

struct HttpRequest {
    user: &'static str,
}

struct Database {
    queries: AtomicUsize,
}

impl Component for Database {
    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        tracing::info!("connecting to the database");
        Ok(Database {
            queries: AtomicUsize::new(0),
        })
    }
}

struct DatabaseModule;
impl ModuleDef for DatabaseModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Database>())
            .export(Token::of::<Database>())
            .global()
    }
}

/// Transient, every consumer gets a logger named after itself
struct Logger {
    context: String,
}

impl Component for Logger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Inquirer>().optional()]
    }

    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        let context = args
            .optional::<Token>(0)?
            .map_or_else(|| "root".to_string(), |owner| owner.to_string());
        Ok(Logger { context })
    }
}

impl Logger {
    fn log(&self, message: &str) {
        tracing::info!(context = %self.context, "{message}");
    }
}

/// Request scoped through its dependency on the request
struct CatsService {
    request: Arc<HttpRequest>,
    database: Arc<Database>,
    logger: Arc<Logger>,
}

impl Component for CatsService {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::on::<Request>(),
            Dependency::on::<Database>(),
            Dependency::on::<Logger>(),
        ]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(CatsService {
            request: args.get(0)?,
            database: args.get(1)?,
            logger: args.get(2)?,
        })
    }
}

impl CatsService {
    fn list(&self) -> Vec<&'static str> {
        let query = self.database.queries.fetch_add(1, Ordering::SeqCst) + 1;
        self.logger
            .log(&format!("query #{query} listing cats for {}", self.request.user));
        vec!["Tom", "Garfield"]
    }
}

struct CatsModule;
impl ModuleDef for CatsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Logger>())
            .provider(Provider::class::<CatsService>())
    }
}

struct AppModule;
impl ModuleDef for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().import::<DatabaseModule>().import::<CatsModule>()
    }
}

fn main() -> Result<(), DynError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    block_on(async {
        let app = ApplicationBuilder::new::<AppModule>()
            .config(ApplicationConfig::from_env())
            .build()
            .await?;

        for user in ["alice", "bob"] {
            let request = app.begin_request(HttpRequest { user });
            let cats = app.resolve::<CatsService>(request.context_id()).await?;
            tracing::info!(user, cats = ?cats.list(), "request served");
        }

        let database = app.get::<Database>()?;
        tracing::info!(queries = database.queries.load(Ordering::SeqCst), "done");
        Ok::<_, DynError>(())
    })
}

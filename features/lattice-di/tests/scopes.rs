use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::executor::block_on;
use lattice_di::{
    Component, Dependency, DynError, InstanceResolver, Inquirer, ModuleDef, ModuleMetadata, Provider, Request,
    RequireError, ResolvedArgs, Scope, Token,
};

mod common;

struct HttpRequest {
    path: &'static str,
}

struct Config;
impl Component for Config {
    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Config)
    }
}

struct RequestLogger {
    request: Arc<HttpRequest>,
    config: Arc<Config>,
}
impl Component for RequestLogger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Request>(), Dependency::on::<Config>()]
    }

    fn scope() -> Scope {
        Scope::Request
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(RequestLogger {
            request: args.get(0)?,
            config: args.get(1)?,
        })
    }
}

static HELPERS: AtomicUsize = AtomicUsize::new(0);

struct Helper {
    id: usize,
}
impl Component for Helper {
    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Helper {
            id: HELPERS.fetch_add(1, Ordering::SeqCst),
        })
    }
}

struct UsersService {
    helper: Arc<Helper>,
}
impl Component for UsersService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Helper>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(UsersService { helper: args.get(0)? })
    }
}

struct PostsService {
    helper: Arc<Helper>,
}
impl Component for PostsService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Helper>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(PostsService { helper: args.get(0)? })
    }
}

struct ScopesModule;
impl ModuleDef for ScopesModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Config>())
            .provider(Provider::class::<RequestLogger>())
            .provider(Provider::class::<Helper>())
            .provider(Provider::class::<UsersService>())
            .provider(Provider::class::<PostsService>())
    }
}

static CLOCKS: AtomicUsize = AtomicUsize::new(0);

struct Clock;
impl Component for Clock {
    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        CLOCKS.fetch_add(1, Ordering::SeqCst);
        Ok(Clock)
    }
}

struct ClockModule;
impl ModuleDef for ClockModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(Provider::class::<Clock>())
    }
}

#[test]
fn singletons_are_created_once_at_bootstrap() {
    let app = common::bootstrap::<ClockModule>().unwrap();
    assert_eq!(CLOCKS.load(Ordering::SeqCst), 1);

    let first = app.get::<Clock>().unwrap();
    let second = app.get::<Clock>().unwrap();
    let resolved = block_on(app.resolve::<Clock>(&app.create_context_id())).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &resolved));
    assert_eq!(CLOCKS.load(Ordering::SeqCst), 1);
}

#[test]
fn transients_are_created_per_consumer() {
    let app = common::bootstrap::<ScopesModule>().unwrap();

    let users = app.get::<UsersService>().unwrap();
    let posts = app.get::<PostsService>().unwrap();
    assert!(!Arc::ptr_eq(&users.helper, &posts.helper));
    assert_ne!(users.helper.id, posts.helper.id);
}

#[test]
fn request_scoped_providers_are_created_per_context() {
    let app = common::bootstrap::<ScopesModule>().unwrap();
    let first = app.begin_request(HttpRequest { path: "/users" });
    let second = app.begin_request(HttpRequest { path: "/posts" });

    block_on(async {
        let logger = app.resolve::<RequestLogger>(first.context_id()).await.unwrap();
        let again = app.resolve::<RequestLogger>(first.context_id()).await.unwrap();
        let other = app.resolve::<RequestLogger>(second.context_id()).await.unwrap();

        assert!(Arc::ptr_eq(&logger, &again));
        assert!(!Arc::ptr_eq(&logger, &other));
        assert_eq!(logger.request.path, "/users");
        assert_eq!(other.request.path, "/posts");

        // The singleton dependency is shared, not rebuilt per request
        assert!(Arc::ptr_eq(&logger.config, &app.get::<Config>().unwrap()));
    });
}

#[test]
fn resolved_transients_are_cached_per_context() {
    let app = common::bootstrap::<ScopesModule>().unwrap();
    let first = app.create_context_id();
    let second = app.create_context_id();

    block_on(async {
        let helper = app.resolve::<Helper>(&first).await.unwrap();
        let again = app.resolve::<Helper>(&first).await.unwrap();
        let other = app.resolve::<Helper>(&second).await.unwrap();

        assert!(Arc::ptr_eq(&helper, &again));
        assert!(!Arc::ptr_eq(&helper, &other));
    });
}

#[test]
fn get_refuses_scoped_providers() {
    let app = common::bootstrap::<ScopesModule>().unwrap();

    let err = app.get::<RequestLogger>().err().unwrap();
    assert!(matches!(err, RequireError::InvalidClassScope { scope: Scope::Request, .. }));

    let err = app.get::<Helper>().err().unwrap();
    assert!(matches!(err, RequireError::InvalidClassScope { scope: Scope::Transient, .. }));
}

#[test]
fn dropping_the_request_scope_releases_its_instances() {
    let app = common::bootstrap::<ScopesModule>().unwrap();
    let link = app
        .instance_links_host()
        .get(&Token::of::<RequestLogger>(), None)
        .unwrap()
        .clone();
    let wrapper = app.container().wrapper(link.wrapper);
    assert_eq!(wrapper.context_count(), 1);

    let request = app.begin_request(HttpRequest { path: "/users" });
    let logger = block_on(app.resolve::<RequestLogger>(request.context_id())).unwrap();
    assert_eq!(wrapper.context_count(), 2);

    drop(request);
    assert_eq!(wrapper.context_count(), 1);
    // Handed out instances outlive the context
    assert_eq!(logger.request.path, "/users");
}

#[test]
fn resolve_without_registered_request_fails() {
    let app = common::bootstrap::<ScopesModule>().unwrap();
    let context = app.create_context_id();

    let result = block_on(app.resolve::<RequestLogger>(&context));
    assert!(result.is_err());
}

struct TaggedLogger {
    owner: Option<Arc<Token>>,
}
impl Component for TaggedLogger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Inquirer>().optional()]
    }

    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(TaggedLogger { owner: args.optional(0)? })
    }
}

struct CatsService {
    logger: Arc<TaggedLogger>,
}
impl Component for CatsService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<TaggedLogger>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(CatsService { logger: args.get(0)? })
    }
}

struct InquirerModule;
impl ModuleDef for InquirerModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<TaggedLogger>())
            .provider(Provider::class::<CatsService>())
    }
}

#[test]
fn transients_know_who_asked_for_them() {
    let app = common::bootstrap::<InquirerModule>().unwrap();
    let cats = app.get::<CatsService>().unwrap();

    let owner = cats.logger.owner.as_deref();
    assert_eq!(owner, Some(&Token::of::<CatsService>()));

    // Asked for directly there is no consumer
    let logger = block_on(app.resolve::<TaggedLogger>(&app.create_context_id())).unwrap();
    assert!(logger.owner.is_none());
}

static PARTS: AtomicUsize = AtomicUsize::new(0);

struct Part;
impl Component for Part {
    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        PARTS.fetch_add(1, Ordering::SeqCst);
        Ok(Part)
    }
}

struct Assembly {
    left: Arc<Part>,
    right: Arc<Part>,
}
impl Component for Assembly {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Part>(), Dependency::on::<Part>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Assembly {
            left: args.get(0)?,
            right: args.get(1)?,
        })
    }
}

struct AssemblyModule;
impl ModuleDef for AssemblyModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Part>())
            .provider(Provider::class::<Assembly>())
    }
}

#[test]
fn transient_injected_twice_into_one_consumer_is_shared() {
    let app = common::bootstrap::<AssemblyModule>().unwrap();
    let assembly = app.get::<Assembly>().unwrap();

    assert!(Arc::ptr_eq(&assembly.left, &assembly.right));
    assert_eq!(PARTS.load(Ordering::SeqCst), 1);
}

static TOOLS: AtomicUsize = AtomicUsize::new(0);

struct Tool;
impl Component for Tool {
    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        TOOLS.fetch_add(1, Ordering::SeqCst);
        Ok(Tool)
    }
}

struct Bench {
    _tool: Arc<Tool>,
}
impl Component for Bench {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Tool>()]
    }

    fn scope() -> Scope {
        Scope::Request
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Bench { _tool: args.get(0)? })
    }
}

struct BenchModule;
impl ModuleDef for BenchModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Tool>())
            .provider(Provider::class::<Bench>())
    }
}

#[test]
fn transients_of_request_scoped_consumers_wait_for_the_request() {
    let app = common::bootstrap::<BenchModule>().unwrap();
    assert_eq!(TOOLS.load(Ordering::SeqCst), 0);

    let request = app.begin_request(HttpRequest { path: "/bench" });
    block_on(app.resolve::<Bench>(request.context_id())).unwrap();
    assert_eq!(TOOLS.load(Ordering::SeqCst), 1);
}

static WRENCHES: AtomicUsize = AtomicUsize::new(0);

struct Wrench;
impl Component for Wrench {
    fn scope() -> Scope {
        Scope::Transient
    }

    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        WRENCHES.fetch_add(1, Ordering::SeqCst);
        Ok(Wrench)
    }
}

/// The request dependency comes after the transient one
struct Workshop {
    _wrench: Arc<Wrench>,
    request: Arc<HttpRequest>,
}
impl Component for Workshop {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Wrench>(), Dependency::on::<Request>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Workshop {
            _wrench: args.get(0)?,
            request: args.get(1)?,
        })
    }
}

struct WorkshopModule;
impl ModuleDef for WorkshopModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Wrench>())
            .provider(Provider::class::<Workshop>())
    }
}

#[test]
fn later_request_dependencies_keep_transients_out_of_bootstrap() {
    let app = common::bootstrap::<WorkshopModule>().unwrap();
    assert_eq!(WRENCHES.load(Ordering::SeqCst), 0);

    let request = app.begin_request(HttpRequest { path: "/workshop" });
    let workshop = block_on(app.resolve::<Workshop>(request.context_id())).unwrap();
    assert_eq!(workshop.request.path, "/workshop");
    assert_eq!(WRENCHES.load(Ordering::SeqCst), 1);
}

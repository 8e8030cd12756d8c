use std::sync::Arc;

use futures::executor::block_on;
use lattice_di::{
    Component, Dependency, DynError, DynamicModule, GetOrResolveOptions, InitError, InjectError, InstanceResolver,
    ModuleDeclaration, ModuleDef, ModuleMetadata, PropertyDependency, Provider, RequireError, ResolvedArgs, Token,
};

mod common;

struct Database {
    url: String,
}

struct CatsRepository {
    database: Arc<Database>,
}
impl Component for CatsRepository {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Database>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(CatsRepository { database: args.get(0)? })
    }
}

struct DatabaseModule;
impl ModuleDef for DatabaseModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::value(Token::of::<Database>(), Database {
                url: "postgres://localhost".to_string(),
            }))
            .export(Token::of::<Database>())
    }
}

/// Re-exports the database module to whoever imports it
struct CoreModule;
impl ModuleDef for CoreModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<DatabaseModule>()
            .export_module::<DatabaseModule>()
    }
}

struct CatsModule;
impl ModuleDef for CatsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<CoreModule>()
            .provider(Provider::class::<CatsRepository>())
    }
}

#[test]
fn exports_are_visible_through_re_exported_modules() {
    let app = common::bootstrap::<CatsModule>().unwrap();
    let repository = app.get::<CatsRepository>().unwrap();
    assert_eq!(repository.database.url, "postgres://localhost");
}

struct HiddenModule;
impl ModuleDef for HiddenModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(Provider::value(Token::of::<Database>(), Database {
            url: "hidden".to_string(),
        }))
    }
}

struct LeakingModule;
impl ModuleDef for LeakingModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<HiddenModule>()
            .provider(Provider::class::<CatsRepository>())
    }
}

#[test]
fn unexported_providers_are_not_visible() {
    let err = common::bootstrap::<LeakingModule>().err().unwrap();
    let InitError::InjectError(InjectError::UnknownDependencies {
        dependent,
        signature,
        token,
        module,
        ..
    }) = &err
    else {
        panic!("expected unknown dependencies, got {err:?}");
    };
    assert_eq!(dependent, "CatsRepository");
    assert_eq!(signature, "?");
    assert_eq!(token, "Database");
    assert_eq!(module, "LeakingModule");
    assert!(err.to_string().contains("Please make sure that the argument Database at index [0]"));
}

struct SettingsModule;
impl ModuleDef for SettingsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::value("SETTINGS", "global settings"))
            .export("SETTINGS")
            .global()
    }
}

struct Greeter {
    settings: Arc<&'static str>,
}
impl Component for Greeter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::token("SETTINGS")]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Greeter { settings: args.get(0)? })
    }
}

struct GreeterModule;
impl ModuleDef for GreeterModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(Provider::class::<Greeter>())
    }
}

struct GlobalRootModule;
impl ModuleDef for GlobalRootModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<SettingsModule>()
            .import::<GreeterModule>()
    }
}

#[test]
fn global_modules_are_visible_without_import() {
    let app = common::bootstrap::<GlobalRootModule>().unwrap();
    let greeter = app.get::<Greeter>().unwrap();
    assert_eq!(*greeter.settings, "global settings");
}

struct ConnectionModule;
impl ModuleDef for ConnectionModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

impl ConnectionModule {
    fn for_url(url: &str) -> DynamicModule {
        DynamicModule::new::<ConnectionModule>(
            ModuleMetadata::new()
                .provider(Provider::value(Token::of::<Database>(), Database { url: url.to_string() }))
                .export(Token::of::<Database>()),
        )
        .with_options(serde_json::json!({ "url": url }))
    }
}

struct ConnectionsRootModule;
impl ModuleDef for ConnectionsRootModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import_dynamic(ConnectionModule::for_url("postgres://primary"))
            .import_dynamic(ConnectionModule::for_url("postgres://primary"))
            .import_dynamic(ConnectionModule::for_url("postgres://replica"))
    }
}

#[test]
fn identical_dynamic_modules_collapse() {
    let app = common::bootstrap::<ConnectionsRootModule>().unwrap();

    let connections = app
        .container()
        .modules()
        .iter()
        .filter(|module| module.name() == "ConnectionModule")
        .count();
    assert_eq!(connections, 2);

    let mut urls: Vec<String> = app
        .get_each::<Database>(Token::of::<Database>())
        .unwrap()
        .iter()
        .map(|database| database.url.clone())
        .collect();
    urls.sort();
    assert_eq!(urls, vec!["postgres://primary", "postgres://replica"]);

    // Non strict lookups see the most recent registration
    assert_eq!(app.get::<Database>().unwrap().url, "postgres://replica");
}

struct DogsRepository;
impl Component for DogsRepository {
    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        Ok(DogsRepository)
    }
}

struct DogsModule;
impl ModuleDef for DogsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new().provider(Provider::class::<DogsRepository>())
    }
}

struct PetsModule;
impl ModuleDef for PetsModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<DogsModule>()
            .import::<CatsModule>()
    }
}

#[test]
fn selected_modules_resolve_strictly() {
    let app = common::bootstrap::<PetsModule>().unwrap();

    let dogs = app.select::<DogsModule>().unwrap();
    assert_eq!(dogs.name(), "DogsModule");
    assert!(dogs.get::<DogsRepository>().is_ok());
    assert!(matches!(
        dogs.get::<CatsRepository>(),
        Err(RequireError::UnknownElement(_))
    ));

    // Strictness can be turned off per call
    let loose = GetOrResolveOptions::default();
    assert!(dogs.get_token::<CatsRepository>(Token::of::<CatsRepository>(), loose).is_ok());

    // The application itself searches everything by default
    assert!(app.get::<CatsRepository>().is_ok());
    assert!(app
        .get_token::<CatsRepository>(Token::of::<CatsRepository>(), GetOrResolveOptions::strict())
        .is_err());

    assert!(matches!(
        app.select::<GlobalRootModule>(),
        Err(InitError::UnknownModule(name)) if name == "GlobalRootModule"
    ));
}

struct Mailer {
    transport: Option<Arc<String>>,
    audit: Option<Arc<String>>,
}
impl Component for Mailer {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::token("TRANSPORT").optional()]
    }

    fn properties() -> Vec<PropertyDependency> {
        vec![PropertyDependency::new("audit", Dependency::token("AUDIT").optional())]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Mailer {
            transport: args.optional(0)?,
            audit: args.optional_property("audit")?,
        })
    }
}

struct MailModule;
impl ModuleDef for MailModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Mailer>())
            .provider(Provider::value("AUDIT", "audit-log".to_string()))
    }
}

#[test]
fn optional_dependencies_may_be_missing() {
    let app = common::bootstrap::<MailModule>().unwrap();
    let mailer = app.get::<Mailer>().unwrap();
    assert!(mailer.transport.is_none());
    assert_eq!(mailer.audit.as_deref().map(String::as_str), Some("audit-log"));
}

struct Broken;
impl Component for Broken {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Database>(), Dependency::undefined()]
    }

    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        Ok(Broken)
    }
}

struct BrokenModule;
impl ModuleDef for BrokenModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<DatabaseModule>()
            .provider(Provider::class::<Broken>())
    }
}

#[test]
fn undefined_dependencies_are_reported_with_their_position() {
    let err = common::bootstrap::<BrokenModule>().err().unwrap();
    assert!(matches!(
        err,
        InitError::InjectError(InjectError::UndefinedDependency { ref signature, .. }) if signature == "Database, ?"
    ));
}

struct Alias;
impl ModuleDef for Alias {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<DatabaseModule>()
            .provider(Provider::existing("DB", Token::of::<Database>()))
            .provider(Provider::factory(
                "DB_URL",
                vec![Dependency::token("DB")],
                |args: ResolvedArgs| async move {
                    let database = args.get::<Database>(0)?;
                    Ok::<_, InjectError>(database.url.clone())
                },
            ))
    }
}

#[test]
fn aliases_and_factories_resolve_through_their_targets() {
    let app = common::bootstrap::<Alias>().unwrap();

    let alias = app.get_token::<Database>("DB", GetOrResolveOptions::default()).unwrap();
    let original = app.get::<Database>().unwrap();
    assert!(Arc::ptr_eq(&alias, &original));

    let url = app.get_token::<String>("DB_URL", GetOrResolveOptions::default()).unwrap();
    assert_eq!(*url, "postgres://localhost");

    let resolved = block_on(app.resolve_token::<String>(
        "DB_URL",
        &app.create_context_id(),
        GetOrResolveOptions::default(),
    ))
    .unwrap();
    assert!(Arc::ptr_eq(&url, &resolved));
}

#[test]
fn bootstrapping_a_dynamic_root() {
    common::init_tracing();
    let root: ModuleDeclaration = ConnectionModule::for_url("sqlite://memory").into();
    let app = block_on(
        lattice_di::ApplicationBuilder::from_declaration(root)
            .abort_on_error(false)
            .build(),
    )
    .unwrap();
    assert_eq!(app.get::<Database>().unwrap().url, "sqlite://memory");
}

struct AuthGuard;
impl Component for AuthGuard {
    async fn construct(_: ResolvedArgs) -> Result<Self, DynError> {
        Ok(AuthGuard)
    }
}

struct CatsController {
    repository: Arc<CatsRepository>,
}
impl Component for CatsController {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<CatsRepository>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(CatsController { repository: args.get(0)? })
    }
}

struct CatsHttpModule;
impl ModuleDef for CatsHttpModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<DatabaseModule>()
            .provider(Provider::class::<CatsRepository>())
            .controller::<CatsController>()
            .injectable(Provider::class::<AuthGuard>(), Some(Token::of::<CatsController>()))
    }
}

#[test]
fn controllers_and_their_enhancers_are_created() {
    let app = common::bootstrap::<CatsHttpModule>().unwrap();

    let controller = app.get::<CatsController>().unwrap();
    assert_eq!(controller.repository.database.url, "postgres://localhost");
    assert!(app.get::<AuthGuard>().is_ok());

    let links = app.instance_links_host();
    let controller = links.get(&Token::of::<CatsController>(), None).unwrap();
    let guard = links.get(&Token::of::<AuthGuard>(), None).unwrap();
    assert_eq!(controller.collection, lattice_di::Collection::Controllers);
    assert_eq!(guard.collection, lattice_di::Collection::Injectables);
    assert_eq!(
        app.container().wrapper(controller.wrapper).enhancers_metadata(),
        vec![guard.wrapper]
    );
}

struct LeftName(&'static str);
struct RightName(&'static str);

struct LeftGreeter {
    neighbour: Arc<RightName>,
}
impl Component for LeftGreeter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<RightName>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(LeftGreeter { neighbour: args.get(0)? })
    }
}

struct RightGreeter {
    neighbour: Arc<LeftName>,
}
impl Component for RightGreeter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<LeftName>()]
    }

    async fn construct(args: ResolvedArgs) -> Result<Self, DynError> {
        Ok(RightGreeter { neighbour: args.get(0)? })
    }
}

struct LeftModule;
impl ModuleDef for LeftModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .forward_import(|| Some(ModuleDeclaration::of::<RightModule>()))
            .provider(Provider::value(Token::of::<LeftName>(), LeftName("left")))
            .provider(Provider::class::<LeftGreeter>())
            .export(Token::of::<LeftName>())
    }
}

struct RightModule;
impl ModuleDef for RightModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import::<LeftModule>()
            .provider(Provider::value(Token::of::<RightName>(), RightName("right")))
            .provider(Provider::class::<RightGreeter>())
            .export(Token::of::<RightName>())
    }
}

#[test]
fn providers_resolve_across_forward_imported_modules() {
    let app = common::bootstrap::<LeftModule>().unwrap();

    let left = app.get::<LeftGreeter>().unwrap();
    let right = app.get::<RightGreeter>().unwrap();
    assert_eq!(left.neighbour.0, "right");
    assert_eq!(right.neighbour.0, "left");
}

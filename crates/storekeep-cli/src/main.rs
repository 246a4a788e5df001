//! Operator CLI for the storekeep metadata cache.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use storekeep_core::api::ConnectClient;
use storekeep_core::backup::{
    CacheBackup, CacheMirror, GithubContentsRemote, NoopBackup, PersistOutcome, RestoreOutcome,
};
use storekeep_core::config::SyncConfig;
use storekeep_core::models::{
    Attribute, AttributeChanges, CoreError, NewStore, Platform, Store, StoreCredentials, StoreId,
    UserId,
};
use storekeep_core::persistence::{CatalogStore, StoreRegistry, UserStore};
use storekeep_core::sqlite::SqliteStore;
use storekeep_core::sync::{
    PatchRequest, SyncEngine, SyncReport, SyncTarget, WriteOutcome,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "storekeep")]
#[command(about = "Keeps a local cache of app store metadata in step with the vendor API")]
#[command(version)]
struct Cli {
    /// JSON configuration file; STOREKEEP_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache database path (overrides configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct StoreArg {
    /// Store id
    #[arg(long)]
    store: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the local cache with the remote backup copy
    Restore,
    /// Push the local cache to the remote backup
    Backup,
    /// Store credential management
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Refresh the cache from the vendor API
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// List cached apps of a store
    Apps {
        #[command(flatten)]
        store: StoreArg,
    },
    /// List the locales cached for one app
    Locales {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
    },
    /// Drop the cached listing rows of one app so the next refresh starts clean
    Forget {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
    },
    /// Print cached values of one attribute, or the cached screenshots
    Show {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
        /// Attribute name (e.g. subtitle, whats_new) or "screenshots"
        #[arg(long, value_parser = parse_target)]
        attribute: SyncTarget,
        #[arg(long, value_parser = parse_platform)]
        platform: Option<Platform>,
    },
    /// Change one attribute of one localization remotely, then refresh it
    Set {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
        #[arg(long, value_parser = parse_attribute)]
        attribute: Attribute,
        #[arg(long)]
        localization: String,
        #[arg(long)]
        value: String,
        #[arg(long, value_parser = parse_platform)]
        platform: Option<Platform>,
    },
    /// User and grant management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Register vendor API credentials
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        issuer_id: String,
        #[arg(long)]
        key_id: String,
        /// Path to the PEM private key
        #[arg(long)]
        key_file: PathBuf,
    },
    /// List registered stores
    List,
    /// Remove a store and everything cached for it
    Remove {
        #[command(flatten)]
        store: StoreArg,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Refresh every app of a store and drop apps no longer listed
    All {
        #[command(flatten)]
        store: StoreArg,
    },
    /// Refresh a single app
    App {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
    },
    /// Refresh only the scope owning one attribute
    Attribute {
        #[command(flatten)]
        store: StoreArg,
        #[arg(long)]
        app: String,
        #[arg(long, value_parser = parse_target)]
        attribute: SyncTarget,
        #[arg(long, value_parser = parse_platform)]
        platform: Option<Platform>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        admin: bool,
    },
    Grant {
        #[arg(long)]
        user: i64,
        #[command(flatten)]
        store: StoreArg,
    },
    Revoke {
        #[arg(long)]
        user: i64,
        #[command(flatten)]
        store: StoreArg,
    },
}

struct Workspace {
    config: SyncConfig,
    cache: Arc<SqliteStore>,
}

impl Workspace {
    fn open(cli: &Cli) -> Result<Self> {
        let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;
        let cache = Arc::new(SqliteStore::new(&config.database_path));
        cache.migrate_to_latest()?;
        Ok(Self { config, cache })
    }

    fn store(&self, store_id: i64) -> Result<Store> {
        self.cache
            .store(StoreId(store_id))?
            .with_context(|| format!("store {store_id} is not registered"))
    }

    fn mirror(&self) -> Option<CacheMirror> {
        let github = self.config.github.clone()?;
        let remote = GithubContentsRemote::new(github, self.config.backup_timeout());
        Some(CacheMirror::new(
            &self.config.database_path,
            Arc::new(remote),
            self.config.min_backup_bytes,
        ))
    }

    fn backup(&self) -> Arc<dyn CacheBackup> {
        match self.mirror() {
            Some(mirror) => Arc::new(mirror),
            None => Arc::new(NoopBackup),
        }
    }

    fn engine(&self, runtime: &tokio::runtime::Runtime) -> SyncEngine {
        let api = Arc::new(ConnectClient::new(self.config.client_config()));
        SyncEngine::new(api, self.cache.clone(), self.backup(), runtime.handle().clone())
            .with_screenshot_workers(self.config.screenshot_workers)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("error: {}", core.user_message()),
                None => eprintln!("error: {error:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storekeep=info,storekeep_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(file: Option<&Path>, db: Option<&Path>) -> Result<SyncConfig> {
    let base = match file {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    let mut config = base.with_overrides(|key| std::env::var(key).ok())?;
    if let Some(db) = db {
        config.database_path = db.to_path_buf();
    }
    tracing::debug!(
        database = %config.database_path.display(),
        backup = config.github.is_some(),
        "configuration loaded"
    );
    Ok(config)
}

/// The engine blocks on this runtime from the main thread, so it is built
/// by hand rather than through `#[tokio::main]`.
fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("storekeep-worker")
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Restore = cli.command {
        return restore(&cli);
    }

    let workspace = Workspace::open(&cli)?;
    match cli.command {
        Commands::Restore => Ok(()),
        Commands::Backup => {
            let outcome = workspace.backup().persist();
            print_persist(&outcome);
            if let PersistOutcome::Failed(error) = outcome {
                return Err(error.into());
            }
            Ok(())
        }
        Commands::Store { command } => store_command(&workspace, command),
        Commands::Sync { command } => sync_command(&workspace, command),
        Commands::Apps { store } => {
            let store = workspace.store(store.store)?;
            print_json(&workspace.cache.list_apps(store.id)?)
        }
        Commands::Locales { store, app } => {
            let store = workspace.store(store.store)?;
            print_json(&workspace.cache.locales(store.id, &app)?)
        }
        Commands::Forget { store, app } => {
            let store = workspace.store(store.store)?;
            if workspace.cache.app(store.id, &app)?.is_none() {
                bail!("app '{app}' is not cached for store {}", store.id);
            }
            workspace.cache.delete_app_rows(store.id, &app)?;
            tracing::info!(store_id = %store.id, app_id = %app, "cached rows dropped");
            print_persist(&workspace.backup().persist());
            Ok(())
        }
        Commands::Show {
            store,
            app,
            attribute,
            platform,
        } => {
            let store = workspace.store(store.store)?;
            match attribute {
                SyncTarget::Attribute(attribute) => print_json(
                    &workspace
                        .cache
                        .attribute_values(attribute, store.id, &app, platform)?,
                ),
                SyncTarget::Screenshots => {
                    print_json(&workspace.cache.screenshots(store.id, &app, platform)?)
                }
            }
        }
        Commands::Set {
            store,
            app,
            attribute,
            localization,
            value,
            platform,
        } => {
            let store = workspace.store(store.store)?;
            let runtime = build_runtime()?;
            let request = PatchRequest {
                app_id: app,
                localization_id: localization,
                changes: AttributeChanges::single(attribute, Some(value)),
                platform,
            };
            let outcome = workspace.engine(&runtime).patch_and_refresh(&store, &request)?;
            match outcome {
                WriteOutcome::Reconciled { ref backup } => {
                    println!("{}", outcome.user_message());
                    print_persist(backup);
                    Ok(())
                }
                WriteOutcome::SavedStale { .. } => bail!(outcome.user_message()),
            }
        }
        Commands::User { command } => user_command(&workspace, command),
    }
}

fn restore(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;
    let Some(github) = config.github.clone() else {
        bail!("no remote backup is configured (set STOREKEEP_GITHUB_TOKEN and STOREKEEP_GITHUB_REPO)");
    };
    let remote = GithubContentsRemote::new(github, config.backup_timeout());
    let mirror = CacheMirror::new(&config.database_path, Arc::new(remote), config.min_backup_bytes);

    let outcome = mirror.restore();
    tracing::info!(outcome = ?outcome, "startup restore finished");
    // The cache must be usable whatever the outcome.
    SqliteStore::new(&config.database_path).migrate_to_latest()?;

    match outcome {
        RestoreOutcome::NoRemoteCopy => println!("no remote copy; local cache kept"),
        RestoreOutcome::Restored { bytes } => println!("restored {bytes} bytes from remote copy"),
        RestoreOutcome::RejectedEmptyBlob => println!("remote copy is empty; local cache kept"),
        RestoreOutcome::RevertedToBackup { reason } => {
            println!("remote copy was corrupt ({reason}); local cache kept")
        }
        RestoreOutcome::DiscardedCorrupt { reason } => {
            println!("remote copy was corrupt ({reason}); started an empty cache")
        }
        RestoreOutcome::Unavailable(error) => return Err(error.into()),
    }
    Ok(())
}

fn store_command(workspace: &Workspace, command: StoreCommands) -> Result<()> {
    match command {
        StoreCommands::Add {
            name,
            issuer_id,
            key_id,
            key_file,
        } => {
            let private_key = std::fs::read_to_string(&key_file)
                .with_context(|| format!("failed to read {}", key_file.display()))?;
            let id = workspace.cache.add_store(&NewStore {
                name,
                credentials: StoreCredentials {
                    issuer_id,
                    key_id,
                    private_key,
                },
            })?;
            println!("{id}");
            Ok(())
        }
        StoreCommands::List => {
            let stores: Vec<_> = workspace
                .cache
                .list_stores()?
                .into_iter()
                .map(|store| {
                    json!({
                        "store_id": store.id,
                        "name": store.name,
                        "issuer_id": store.credentials.issuer_id,
                        "key_id": store.credentials.key_id,
                    })
                })
                .collect();
            print_json(&stores)
        }
        StoreCommands::Remove { store } => {
            if !workspace.cache.delete_store(StoreId(store.store))? {
                bail!("store {} is not registered", store.store);
            }
            print_persist(&workspace.backup().persist());
            Ok(())
        }
    }
}

fn sync_command(workspace: &Workspace, command: SyncCommands) -> Result<()> {
    let runtime = build_runtime()?;
    let engine = workspace.engine(&runtime);

    match command {
        SyncCommands::All { store } => {
            let store = workspace.store(store.store)?;
            let report = engine.sync_all_apps(&store)?;
            print_json(&sync_report_json(&report))?;
            if !report.is_success() {
                bail!("no app of store {} could be refreshed", store.id);
            }
            Ok(())
        }
        SyncCommands::App { store, app } => {
            let store = workspace.store(store.store)?;
            let outcome = engine.sync_one_app(&store, &app)?;
            print_json(&json!({
                "app": outcome.app,
                "info_localizations": outcome.rows.info_localizations,
                "versions": outcome.rows.versions,
                "version_localizations": outcome.rows.version_localizations,
                "screenshots": outcome.rows.screenshots,
                "warnings": outcome.warnings,
                "backup": persist_label(&outcome.backup),
            }))
        }
        SyncCommands::Attribute {
            store,
            app,
            attribute,
            platform,
        } => {
            let store = workspace.store(store.store)?;
            let refresh = engine.sync_attribute(&store, attribute, &app, platform)?;
            print_json(&json!({
                "target": attribute.to_string(),
                "info_localizations": refresh.rows.info_localizations,
                "versions": refresh.rows.versions,
                "version_localizations": refresh.rows.version_localizations,
                "screenshots": refresh.rows.screenshots,
                "warnings": refresh.warnings,
                "backup": persist_label(&refresh.backup),
            }))
        }
    }
}

fn user_command(workspace: &Workspace, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add {
            username,
            password,
            admin,
        } => {
            let id = workspace.cache.add_user(&username, &password, admin)?;
            println!("{}", id.0);
        }
        UserCommands::Grant { user, store } => {
            workspace.cache.grant_store(UserId(user), StoreId(store.store))?;
        }
        UserCommands::Revoke { user, store } => {
            if !workspace.cache.revoke_store(UserId(user), StoreId(store.store))? {
                bail!("user {user} had no grant for store {}", store.store);
            }
        }
    }
    print_persist(&workspace.backup().persist());
    Ok(())
}

fn sync_report_json(report: &SyncReport) -> serde_json::Value {
    json!({
        "store_id": report.store_id,
        "apps_listed": report.apps_listed,
        "succeeded": report.succeeded,
        "failed": report
            .failed
            .iter()
            .map(|failure| json!({"app_id": failure.app_id, "error": failure.error.user_message()}))
            .collect::<Vec<_>>(),
        "orphans_removed": report.orphans_removed,
        "warnings": report.warnings,
        "backup": persist_label(&report.backup),
    })
}

fn persist_label(outcome: &PersistOutcome) -> String {
    match outcome {
        PersistOutcome::Disabled => "disabled".to_string(),
        PersistOutcome::Uploaded { bytes, created } => {
            format!("uploaded {bytes} bytes{}", if *created { " (new)" } else { "" })
        }
        PersistOutcome::Skipped(reason) => format!("skipped: {reason:?}"),
        PersistOutcome::Failed(error) => format!("failed: {}", error.user_message()),
    }
}

fn print_persist(outcome: &PersistOutcome) {
    if !matches!(outcome, PersistOutcome::Disabled) {
        eprintln!("backup: {}", persist_label(outcome));
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_platform(raw: &str) -> Result<Platform, String> {
    raw.to_ascii_uppercase()
        .parse::<Platform>()
        .map_err(|()| format!("unknown platform '{raw}' (expected IOS or MAC_OS)"))
}

fn parse_attribute(raw: &str) -> Result<Attribute, String> {
    raw.parse::<Attribute>().map_err(|()| {
        let names: Vec<&str> = Attribute::ALL.iter().map(|attribute| attribute.as_str()).collect();
        format!("unknown attribute '{raw}' (expected one of {})", names.join(", "))
    })
}

fn parse_target(raw: &str) -> Result<SyncTarget, String> {
    raw.parse::<SyncTarget>()
        .map_err(|()| format!("unknown attribute '{raw}' (expected an attribute name or 'screenshots')"))
}

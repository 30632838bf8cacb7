//! `approute`: resolve service endpoints and manage the router cache from
//! the command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use approute_client::config::{ModuleConfig, RouterConfig, DEFAULT_APP_ROUTER_URL};
use approute_client::{RouterCacheKind, RouterModule};
use approute_core::{AppId, FallbackResolver, Module};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "approute", version)]
#[command(about = "Service endpoint router for backend-as-a-service applications", long_about = None)]
struct Cli {
    /// Directory of the persistent router cache (in-memory when unset)
    #[arg(long, env = "APPROUTE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// App router endpoint
    #[arg(long, env = "APPROUTE_APP_ROUTER_URL", default_value = DEFAULT_APP_ROUTER_URL)]
    app_router_url: String,

    /// Fixed RTM router endpoint (derived from the app router when unset)
    #[arg(long, env = "APPROUTE_RTM_ROUTER_URL")]
    rtm_router_url: Option<String>,

    /// Upper bound for one remote fetch, in seconds
    #[arg(long, env = "APPROUTE_FETCH_TIMEOUT", default_value_t = 15)]
    timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the server URL of a module
    Resolve { app_id: String, module: Module },
    /// Resolve the RTM server group of an application
    Rtm { app_id: String },
    /// Clear cached routing data of an application
    Clean {
        app_id: String,
        #[arg(long, value_enum, default_value_t = CacheKind::App)]
        kind: CacheKind,
    },
    /// Run one eviction pass over the query and file caches
    Sweep {
        /// Override the query-cache expiration, in days (0 disables)
        #[arg(long)]
        query_days: Option<u32>,
        /// Override the file-cache expiration, in days (0 disables)
        #[arg(long)]
        file_days: Option<u32>,
    },
    /// Print the fallback URL of a module without any network access
    Fallback { app_id: String, module: Module },
}

#[derive(Clone, Copy, ValueEnum)]
enum CacheKind {
    App,
    Rtm,
}

impl From<CacheKind> for RouterCacheKind {
    fn from(kind: CacheKind) -> Self {
        match kind {
            CacheKind::App => RouterCacheKind::App,
            CacheKind::Rtm => RouterCacheKind::Rtm,
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "approute=info,approute_client=info,approute_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let mut config = ModuleConfig {
        cache_dir: cli.cache_dir,
        router: RouterConfig {
            app_router_url: cli.app_router_url,
            rtm_router_url: cli.rtm_router_url,
            fetch_timeout: Duration::from_secs(cli.timeout_secs),
            ..RouterConfig::default()
        },
        ..ModuleConfig::default()
    };

    match cli.command {
        Commands::Fallback { app_id, module } => {
            let app_id = AppId::parse(app_id)?;
            println!("{}", FallbackResolver::resolve(&app_id, module));
        }
        Commands::Resolve { app_id, module } => {
            let router_module = RouterModule::open(config)?;
            let url = router_module.app_router().url_for(&app_id, module).await?;
            println!("{url}");
        }
        Commands::Rtm { app_id } => {
            let module = RouterModule::open(config)?;
            let doc = module
                .rtm_router()
                .rtm_server(&app_id)
                .await
                .with_context(|| format!("RTM lookup for {app_id} failed"))?;
            println!("{}", serde_json::to_string_pretty(doc.as_ref())?);
        }
        Commands::Clean { app_id, kind } => {
            let module = RouterModule::open(config)?;
            let removed = module.clean_cache(&app_id, kind.into())?;
            println!("{}", if removed { "removed" } else { "nothing cached" });
        }
        Commands::Sweep {
            query_days,
            file_days,
        } => {
            let settings = &mut config.scheduler.settings;
            if let Some(days) = query_days {
                settings.query_cache_expiration_days = days;
            }
            if let Some(days) = file_days {
                settings.file_cache_expiration_days = days;
            }
            let module = RouterModule::open(config)?;
            let report = module.sweep_now().await?;
            println!("deleted {} entries, {} failures", report.deleted, report.failed);
        }
    }

    Ok(())
}

//! Lumos - export orchestration for the multi-agent builder
//!
//! Runs the export API (scheduler, provisioner, tunnel lookup), the
//! path-prefix reverse proxy in front of exported instances, and a few
//! inspection commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumos_api::{ApiServer, ApiServerConfig};
use lumos_proto::{DEFAULT_ROUTE_TABLE_PATH, DEFAULT_TUNNEL_API};
use lumos_provision::{DockerProvisioner, ProvisionerConfig};
use lumos_proxy::{ProxyConfig, ProxyServer};
use lumos_router::RouteTableStore;
use lumos_scheduler::{ExportScheduler, SchedulerConfig};
use lumos_tunnel::{HttpTunnelResolver, TunnelAgent, TunnelResolver, TunnelResolverConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

/// Lumos - export multi-agent projects as publicly reachable runtimes
#[derive(Parser, Debug)]
#[command(name = "lumos")]
#[command(about = "Export multi-agent projects as publicly reachable runtimes", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the export API
    Serve {
        /// Route table file shared with the reverse proxy
        #[arg(long, env = "LUMOS_ROUTE_TABLE", default_value = DEFAULT_ROUTE_TABLE_PATH)]
        route_table: PathBuf,

        /// Tunnel agent control endpoint
        #[arg(long, env = "LUMOS_TUNNEL_API", default_value = DEFAULT_TUNNEL_API)]
        tunnel_api: String,

        /// Address to bind the API server
        #[arg(long, env = "LUMOS_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Maximum exports provisioning at once
        #[arg(long, env = "LUMOS_MAX_CONCURRENT", default_value = "3")]
        max_concurrent: usize,

        /// Maximum exports waiting for a slot
        #[arg(long, env = "LUMOS_MAX_QUEUE", default_value = "32")]
        max_queue: usize,

        /// Per-export timeout in seconds
        #[arg(long, env = "LUMOS_JOB_TIMEOUT", default_value = "300")]
        job_timeout: u64,

        /// Runtime image tag
        #[arg(long, env = "LUMOS_IMAGE", default_value = "simple-ui-app")]
        image: String,

        /// Runtime image build context
        #[arg(long, env = "LUMOS_BUILD_CONTEXT", default_value = "./ui_app")]
        build_context: PathBuf,

        /// Directory for per-instance launch logs
        #[arg(long, env = "LUMOS_LOG_DIR", default_value = ".")]
        log_dir: PathBuf,

        /// Rebuild the runtime image for every export
        #[arg(long)]
        rebuild_per_job: bool,

        /// Keep instances and routes of failed exports
        #[arg(long)]
        no_rollback: bool,

        /// Allowed CORS origins (comma separated)
        #[arg(
            long = "cors-origin",
            env = "LUMOS_CORS_ORIGINS",
            value_delimiter = ',',
            default_value = "http://localhost:5173"
        )]
        cors_origins: Vec<String>,
    },

    /// Run the reverse proxy in front of exported instances
    Proxy {
        /// Route table file written by the export API
        #[arg(long, env = "LUMOS_ROUTE_TABLE", default_value = DEFAULT_ROUTE_TABLE_PATH)]
        route_table: PathBuf,

        /// Address to bind the proxy
        #[arg(long, env = "LUMOS_PROXY_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Largest request body forwarded, in bytes
        #[arg(long, default_value = "10485760")]
        max_body_bytes: usize,

        /// Seconds to wait for an instance to answer
        #[arg(long, env = "LUMOS_UPSTREAM_TIMEOUT", default_value = "60")]
        upstream_timeout: u64,

        /// Tunnel agent to start alongside the proxy (e.g. "ngrok http 8080")
        #[arg(long, env = "LUMOS_TUNNEL_COMMAND")]
        tunnel_command: Option<String>,
    },

    /// Inspect or edit the route table
    Routes {
        /// Route table file
        #[arg(long, env = "LUMOS_ROUTE_TABLE", default_value = DEFAULT_ROUTE_TABLE_PATH)]
        route_table: PathBuf,

        #[command(subcommand)]
        action: RoutesAction,
    },

    /// Print the public URL reported by the tunnel agent
    Tunnel {
        /// Tunnel agent control endpoint
        #[arg(long, env = "LUMOS_TUNNEL_API", default_value = DEFAULT_TUNNEL_API)]
        tunnel_api: String,

        /// Number of attempts
        #[arg(long, default_value = "6")]
        attempts: u32,
    },
}

#[derive(Subcommand, Debug)]
enum RoutesAction {
    /// List every published route
    List,
    /// Remove one route
    Remove {
        /// Instance name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            route_table,
            tunnel_api,
            bind,
            max_concurrent,
            max_queue,
            job_timeout,
            image,
            build_context,
            log_dir,
            rebuild_per_job,
            no_rollback,
            cors_origins,
        } => {
            let scheduler_config = SchedulerConfig::default()
                .with_max_concurrent(max_concurrent)
                .with_max_queue_depth(max_queue)
                .with_job_timeout(Duration::from_secs(job_timeout))
                .with_rollback_on_failure(!no_rollback);
            let provisioner_config = ProvisionerConfig::default()
                .with_image(image)
                .with_build_context(build_context)
                .with_log_dir(log_dir)
                .with_rebuild_per_job(rebuild_per_job);
            let resolver_config = TunnelResolverConfig::default().with_control_url(tunnel_api);
            let api_config = ApiServerConfig::default()
                .with_bind_addr(bind)
                .with_cors_origins(cors_origins);

            handle_serve(
                route_table,
                scheduler_config,
                provisioner_config,
                resolver_config,
                api_config,
            )
            .await
        }
        Commands::Proxy {
            route_table,
            bind,
            max_body_bytes,
            upstream_timeout,
            tunnel_command,
        } => {
            let config = ProxyConfig::default()
                .with_bind_addr(bind)
                .with_max_body_bytes(max_body_bytes)
                .with_upstream_timeout(Duration::from_secs(upstream_timeout));
            handle_proxy(route_table, config, tunnel_command).await
        }
        Commands::Routes {
            route_table,
            action,
        } => handle_routes(route_table, action).await,
        Commands::Tunnel {
            tunnel_api,
            attempts,
        } => handle_tunnel(tunnel_api, attempts).await,
    }
}

async fn handle_serve(
    route_table: PathBuf,
    scheduler_config: SchedulerConfig,
    provisioner_config: ProvisionerConfig,
    resolver_config: TunnelResolverConfig,
    api_config: ApiServerConfig,
) -> Result<()> {
    info!("Lumos export API starting...");
    info!("Route table: {}", route_table.display());

    let routes = Arc::new(RouteTableStore::new(route_table));
    let existing = routes
        .load_all()
        .await
        .context("Failed to read route table")?;
    info!("{} existing route(s)", existing.len());

    let provisioner =
        Arc::new(DockerProvisioner::new(provisioner_config).with_reserved_names(existing.into_keys()));
    let resolver =
        Arc::new(HttpTunnelResolver::new(resolver_config).context("Failed to create tunnel resolver")?);

    let scheduler = ExportScheduler::start(scheduler_config, provisioner, routes, resolver);
    let server = ApiServer::new(api_config, scheduler.clone());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = server.start() => {
            result.context("API server failed")?;
        }
    }

    scheduler.shutdown();
    let pending = scheduler.stats();
    if !pending.is_idle() {
        info!(
            "Waiting for {} queued and {} running export(s)",
            pending.queued, pending.active
        );
        if tokio::time::timeout(scheduler.config().job_timeout, scheduler.drain())
            .await
            .is_err()
        {
            warn!("Exports still running at exit");
        }
    }

    info!("Lumos export API stopped");
    Ok(())
}

async fn handle_proxy(
    route_table: PathBuf,
    config: ProxyConfig,
    tunnel_command: Option<String>,
) -> Result<()> {
    info!("Lumos reverse proxy starting...");
    info!("Route table: {}", route_table.display());

    let agent = match tunnel_command {
        Some(command) => Some(TunnelAgent::spawn(&command).context("Failed to start tunnel agent")?),
        None => None,
    };

    let routes = Arc::new(RouteTableStore::new(route_table));
    let server = ProxyServer::new(config, routes);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        result = server.start() => result.context("Reverse proxy failed"),
    };

    if let Some(mut agent) = agent {
        if !agent.is_running() {
            warn!(
                "Tunnel agent `{}` exited before the proxy stopped",
                agent.command()
            );
        }
        if let Err(e) = agent.stop().await {
            error!("{}", e);
        }
    }

    info!("Lumos reverse proxy stopped");
    result
}

async fn handle_routes(route_table: PathBuf, action: RoutesAction) -> Result<()> {
    let routes = RouteTableStore::new(&route_table);

    match action {
        RoutesAction::List => {
            let table = routes
                .load_all()
                .await
                .with_context(|| format!("Failed to read {}", route_table.display()))?;

            if table.is_empty() {
                println!("No routes published in {}", route_table.display());
            }
            for (name, url) in table {
                println!("/{:<12} -> {}", name, url);
            }
        }
        RoutesAction::Remove { name } => {
            match routes
                .remove(&name)
                .await
                .with_context(|| format!("Failed to update {}", route_table.display()))?
            {
                Some(url) => println!("Removed /{} ({})", name, url),
                None => println!("No route named {}", name),
            }
        }
    }

    Ok(())
}

async fn handle_tunnel(tunnel_api: String, attempts: u32) -> Result<()> {
    let config = TunnelResolverConfig::default()
        .with_control_url(tunnel_api)
        .with_attempts(attempts);
    let resolver = HttpTunnelResolver::new(config).context("Failed to create tunnel resolver")?;

    let tunnel = resolver.resolve().await?;
    println!("{}", tunnel.public_url);
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

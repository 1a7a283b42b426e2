//! Cruntime CLI Entry Point
//!
//! Drives the node's container runtime through the runtime adapter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cruntime_agent::cli::config::{Config, LoggingConfig};
use cruntime_agent::cli::style::Style;
use cruntime_agent::runtime::adapter::{
    CgroupDriver, ContainerState, ListContainersOptions, ListImagesOptions, PreloadOutcome,
    RuntimeAdapter,
};
use cruntime_agent::runtime::new_runtime;
use cruntime_agent::sysinit::{ServiceManager, Systemd};

#[derive(Parser)]
#[command(name = "cruntime")]
#[command(author, version, about = "Manage a cluster node's container runtime")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CRUNTIME_CONFIG", default_value = "/etc/cruntime/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure and start the runtime
    Enable {
        /// Cgroup driver (cgroupfs, systemd)
        #[arg(long)]
        cgroup_driver: Option<CgroupDriver>,

        /// Run in a user namespace
        #[arg(long)]
        rootless: bool,

        /// Leave other runtimes running
        #[arg(long)]
        keep_others: bool,
    },
    /// Stop the runtime
    Disable,
    /// Restart the runtime service
    Restart,
    /// Show runtime status
    Status,
    /// Show runtime version
    Version,
    /// List cached images
    Images,
    /// Pull an image
    Pull { image: String },
    /// Remove an image
    Rmi { image: String },
    /// Check whether an image is cached
    ImageExists {
        name: String,

        /// Image checksum that must also be present
        #[arg(long, default_value = "")]
        sha: String,
    },
    /// Pull the control-plane images unless already cached
    Preload,
    /// List container IDs
    Ps {
        #[arg(long, value_enum, default_value_t = StateArg::All)]
        state: StateArg,

        /// Container name filter
        #[arg(long)]
        name: Option<String>,

        /// Kubernetes namespace (repeatable)
        #[arg(long = "namespace")]
        namespaces: Vec<String>,
    },
    /// Pause containers
    Pause {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Resume paused containers
    Unpause {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Stop containers
    Stop {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Forcibly remove containers
    Kill {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the command that shows runtime or container logs
    Logs {
        /// Number of log lines
        #[arg(short = 'n', long, default_value = "60")]
        lines: usize,

        /// Container ID; the runtime's own log when omitted
        #[arg(long)]
        container: Option<String>,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
    /// Show the kubelet flags for this runtime
    KubeletOptions,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    All,
    Running,
    Paused,
}

impl From<StateArg> for ContainerState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::All => ContainerState::All,
            StateArg::Running => ContainerState::Running,
            StateArg::Paused => ContainerState::Paused,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging, cli.verbose)?;

    let runner = config
        .command_runner()
        .context("Failed to set up command executor")?;
    let init: Arc<dyn ServiceManager> = Arc::new(Systemd::new(runner.clone()));
    let runtime = new_runtime(config.runtime_config()?, runner, init)
        .context("Failed to initialize runtime adapter")?;
    info!(runtime = runtime.name(), socket = runtime.socket_path(), "Runtime adapter ready");

    let style = Style::for_runtime(runtime.name());
    let prefix = style.prefix(runtime.name());

    match cli.command {
        Commands::Enable {
            cgroup_driver,
            rootless,
            keep_others,
        } => {
            let mut options = config.enable_options();
            if let Some(driver) = cgroup_driver {
                options.cgroup_driver = driver;
            }
            options.rootless |= rootless;
            options.disable_others &= !keep_others;

            let report = runtime.enable(&options).await?;
            for warning in &report.warnings {
                println!("{} {} {}", prefix, "warning:".yellow(), warning);
            }
            println!("{} {}", prefix, "enabled".green());
        }
        Commands::Disable => {
            runtime.disable().await?;
            println!("{} {}", prefix, "disabled".dimmed());
        }
        Commands::Restart => {
            runtime.restart().await?;
            println!("{} {}", prefix, "restarted".green());
        }
        Commands::Status => {
            show_status(runtime.as_ref(), &prefix).await;
        }
        Commands::Version => {
            println!("{} {}", prefix, runtime.version().await?);
        }
        Commands::Images => {
            show_images(runtime.as_ref()).await?;
        }
        Commands::Pull { image } => {
            runtime.pull_image(&image).await?;
            println!("{} pulled {}", prefix, image);
        }
        Commands::Rmi { image } => {
            runtime.remove_image(&image).await?;
            println!("{} removed {}", prefix, image);
        }
        Commands::ImageExists { name, sha } => {
            if runtime.image_exists(&name, &sha).await {
                println!("{} {} {}", prefix, name, "present".green());
            } else {
                println!("{} {} {}", prefix, name, "missing".red());
                std::process::exit(1);
            }
        }
        Commands::Preload => {
            let cluster = config.cluster_config()?;
            match runtime.preload(&cluster).await? {
                PreloadOutcome::AlreadyPreloaded => {
                    println!("{} images already preloaded", prefix)
                }
                PreloadOutcome::Pulled(count) => println!("{} pulled {} images", prefix, count),
            }
        }
        Commands::Ps {
            state,
            name,
            namespaces,
        } => {
            let options = ListContainersOptions {
                state: state.into(),
                name,
                namespaces,
            };
            for id in runtime.list_containers(&options).await? {
                println!("{}", id);
            }
        }
        Commands::Pause { ids } => {
            runtime.pause_containers(&ids).await?;
            println!("{} paused {} containers", prefix, ids.len());
        }
        Commands::Unpause { ids } => {
            runtime.unpause_containers(&ids).await?;
            println!("{} resumed {} containers", prefix, ids.len());
        }
        Commands::Stop { ids } => {
            runtime.stop_containers(&ids).await?;
            println!("{} stopped {} containers", prefix, ids.len());
        }
        Commands::Kill { ids } => {
            runtime.kill_containers(&ids).await?;
            println!("{} killed {} containers", prefix, ids.len());
        }
        Commands::Logs {
            lines,
            container,
            follow,
        } => {
            let cmd = match container {
                Some(id) => runtime.container_log_cmd(&id, lines, follow).await,
                None => runtime.system_log_cmd(lines),
            };
            println!("{}", cmd);
        }
        Commands::KubeletOptions => {
            for (key, value) in runtime.kubelet_options() {
                println!("--{}={}", key, value);
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

async fn show_status(runtime: &dyn RuntimeAdapter, prefix: &str) {
    println!("{}", prefix);
    println!("  State:         {}", runtime.state().await);

    match runtime.version().await {
        Ok(version) => println!("  Version:       {}", version),
        Err(e) => println!("  Version:       {} - {}", "error".red(), e),
    }

    println!("  Socket:        {}", runtime.socket_path());

    match runtime.cgroup_driver() {
        Ok(driver) => println!("  Cgroup driver: {}", driver),
        Err(e) => println!("  Cgroup driver: {} - {}", "error".red(), e),
    }

    match runtime.available().await {
        Ok(()) => println!("  Available:     {}", "yes".green()),
        Err(e) => println!("  Available:     {} - {}", "no".red(), e),
    }
}

async fn show_images(runtime: &dyn RuntimeAdapter) -> Result<()> {
    let images = runtime.list_images(&ListImagesOptions::default()).await?;

    if images.is_empty() {
        println!("{}", "No images found.".dimmed());
        return Ok(());
    }

    println!(
        "{:<15} {:<60} {:>12}",
        "IMAGE ID".dimmed(),
        "TAGS".dimmed(),
        "SIZE".dimmed()
    );
    for image in &images {
        let tags = if image.repo_tags.is_empty() {
            "<none>".to_string()
        } else {
            image.repo_tags.join(", ")
        };
        println!("{:<15} {:<60} {:>12}", image.short_id(), tags, image.size);
    }

    Ok(())
}

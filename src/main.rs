use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tokio::sync::mpsc;
use ward::{
    adapters::{FileConfigProvider, InMemoryWorkQueueStore},
    config::{WardConfig, WardConfigValidator},
    core::{
        failover::{FailoverStrategy, FailoverStrategyFactory, SynchronizedFailoverStrategy},
        work_queue::{WorkQueueExecutorManager, WorkQueueReconciler},
    },
    ports::config_provider::ConfigProvider,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

type FailoverGroups = HashMap<String, SynchronizedFailoverStrategy<String>>;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "ward.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "ward.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "ward.toml")]
        config: String,
    },
    /// Run the work queue service (default)
    Run {
        /// Configuration file to use
        #[clap(short, long, default_value = "ward.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Run { config }) => run(&config).await,
        None => run(&args.config).await,
    }
}

async fn run(config_path: &str) -> Result<()> {
    let config_provider: Arc<dyn ConfigProvider> = Arc::new(
        FileConfigProvider::new(config_path).context("Failed to create config provider")?,
    );

    let config = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;
    WardConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;

    tracing_setup::init_from_config(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let keep_alive = config.executor.keep_alive()?;
    let shutdown_timeout = config.executor.shutdown_timeout()?;

    let store = Arc::new(InMemoryWorkQueueStore::new(config.work_queues.clone()));
    let manager = Arc::new(WorkQueueExecutorManager::with_keep_alive(
        store.clone(),
        keep_alive,
    ));
    let reconciler = WorkQueueReconciler::new(manager.clone());
    tracing::info!(
        work_queues = store.len(),
        keep_alive = %humantime::format_duration(keep_alive),
        "Work queues registered; executors start on first use"
    );

    let failover_groups = Arc::new(ArcSwap::from_pointee(build_failover_groups(&config)?));

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {}", e);
            }
        })
    };

    let file_events = config_provider.watch();
    let hangups = shutdown.reload_requests();
    let watcher_handle = {
        let config_path = config_path.to_string();
        let failover_groups = failover_groups.clone();
        let store = store.clone();
        tokio::spawn(async move {
            watch_config(
                config_provider,
                file_events,
                hangups,
                |new_config| {
                    let groups = build_failover_groups(&new_config)?;
                    failover_groups.store(Arc::new(groups));
                    reconciler.apply(&store.replace_all(new_config.work_queues));
                    Ok(())
                },
                &config_path,
            )
            .await;
        })
    };

    let reason = shutdown.wait_for_shutdown_signal().await;
    tracing::info!(
        ?reason,
        failover_groups = failover_groups.load().len(),
        "Stopping work queue executors"
    );
    watcher_handle.abort();
    signal_handle.abort();

    let drained = tokio::task::spawn_blocking({
        let manager = manager.clone();
        move || manager.shutdown_all(shutdown_timeout)
    })
    .await
    .context("Executor shutdown task panicked")?;

    if drained {
        tracing::info!("All work queues drained");
    } else {
        tracing::warn!(
            timeout = %humantime::format_duration(shutdown_timeout),
            "Some work queues were still busy at the shutdown deadline"
        );
    }
    Ok(())
}

fn build_failover_groups(config: &WardConfig) -> Result<FailoverGroups> {
    let mut groups = HashMap::with_capacity(config.failover.len());
    for (name, group) in &config.failover {
        let kind = group
            .kind()
            .with_context(|| format!("Failover group '{name}'"))?;
        let probe_interval = group
            .probe_interval()
            .with_context(|| format!("Failover group '{name}' probe_interval"))?;
        let strategy =
            FailoverStrategyFactory::create(kind, group.servers.clone(), probe_interval)
                .with_context(|| format!("Failover group '{name}'"))?;

        tracing::info!(
            group = %name,
            strategy = strategy.name(),
            description = strategy.description(),
            servers = ?group.servers,
            "Failover group ready"
        );
        groups.insert(name.clone(), SynchronizedFailoverStrategy::new(strategy));
    }
    Ok(groups)
}

/// Reload the configuration on file changes or SIGHUP, at most once per
/// debounce period. A configuration that fails to load or validate is logged
/// and the running one is kept.
async fn watch_config<F>(
    config_provider: Arc<dyn ConfigProvider>,
    file_events: Option<mpsc::Receiver<()>>,
    hangups: Option<mpsc::Receiver<()>>,
    mut apply: F,
    config_path: &str,
) where
    F: FnMut(WardConfig) -> Result<()>,
{
    let debounce_duration = Duration::from_secs(2);
    let (tx, mut reloads) = mpsc::channel::<()>(1);
    for mut source in [file_events, hangups].into_iter().flatten() {
        let tx = tx.clone();
        tokio::spawn(async move {
            while source.recv().await.is_some() {
                let _ = tx.try_send(());
            }
        });
    }
    drop(tx);

    tracing::info!("Config watcher task started.");
    let mut last_reload_attempt_time = tokio::time::Instant::now();
    last_reload_attempt_time = last_reload_attempt_time
        .checked_sub(debounce_duration)
        .unwrap_or(last_reload_attempt_time);

    while reloads.recv().await.is_some() {
        if last_reload_attempt_time.elapsed() < debounce_duration {
            tracing::debug!("Debouncing config reload event. Still within cooldown period.");
            while reloads.try_recv().is_ok() {}
            continue;
        }
        last_reload_attempt_time = tokio::time::Instant::now();

        tracing::info!("Attempting to reload configuration from {}", config_path);

        let new_config = match config_provider.load_config().await {
            Ok(new_config) => new_config,
            Err(e) => {
                tracing::error!(
                    "Failed to reload configuration: {:#}. Keeping old configuration.",
                    e
                );
                continue;
            }
        };
        if let Err(e) = WardConfigValidator::validate(&new_config) {
            tracing::error!("Reloaded configuration is invalid, keeping old configuration: {e}");
            continue;
        }
        match apply(new_config) {
            Ok(()) => tracing::info!("Configuration reloaded"),
            Err(e) => tracing::error!("Failed to apply reloaded configuration: {:#}", e),
        }
    }
    tracing::info!("Config watcher task stopped.");
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use ward::config::loader::load_config;

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match WardConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Log Level: {}", config.logging.level);
            println!("   • Work Queues: {}", config.work_queues.len());
            for work_queue in &config.work_queues {
                println!(
                    "       - {} (id {}): {} threads, queue {}, {}",
                    work_queue.name,
                    work_queue.id,
                    work_queue.thread_pool_max,
                    work_queue.max_queue_size,
                    work_queue.reject_policy
                );
            }
            println!("   • Failover Groups: {}", config.failover.len());
            for (name, group) in &config.failover {
                println!(
                    "       - {name}: {} over {} servers",
                    group.strategy,
                    group.servers.len()
                );
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Give every work queue a unique id and name");
            println!("   • Use thread_pool_max and max_queue_size of at least 1");
            println!(
                "   • Pick a strategy from: {}",
                FailoverStrategyFactory::strategies()
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("   • Write durations with units, e.g. '60s' or '15m'");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Ward Configuration

[logging]
# EnvFilter directive, e.g. "info" or "ward=debug"
level = "info"
json = false
# Include span context in JSON events
spans = false

[executor]
# Idle worker threads exit after this long
keep_alive = "60s"
# How long to wait for queued work on shutdown
shutdown_timeout = "30s"

# Work queues: bounded thread pools created on first use
[[work_queues]]
id = 1
name = "audit"
thread_pool_max = 8
max_queue_size = 100
# fail_immediately | caller_blocks
reject_policy = "fail_immediately"

# Failover groups: strategy is one of ordered, sticky, robin, random
[failover.backends]
strategy = "ordered"
servers = ["10.0.0.1:8443", "10.0.0.2:8443"]
# probe_interval = "15m"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'ward run --config {config_path}' to start");
    Ok(())
}

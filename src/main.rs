//! Binary entrypoint for the particles wallpaper.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use particles_wallpaper::config::Configuration;
use particles_wallpaper::settings::SettingsRepository;
use particles_wallpaper::{host, watch};

#[derive(Debug, Parser)]
#[command(name = "particles-wallpaper", version, about = "Animated particle background")]
struct Cli {
    /// Path to YAML config file
    #[arg(value_name = "CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured frame delay (ms)
    #[arg(long, value_name = "MILLIS")]
    frame_delay_ms: Option<u64>,

    /// Do not reload settings when the config file changes
    #[arg(long)]
    no_watch: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = match verbosity {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            };
            EnvFilter::new(format!("particles_wallpaper={level}"))
                .add_directive("wgpu=warn".parse()?)
                .add_directive("winit=warn".parse()?)
        }
    };
    fmt().with_env_filter(filter).with_target(true).compact().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if let Some(ms) = cli.frame_delay_ms {
        cfg.settings.frame_delay_ms = ms;
    }
    tracing::info!("Loaded configuration from {}:\n{:#?}", cli.config.display(), cfg);

    let settings = SettingsRepository::new(&cfg.settings);
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();
    if cli.no_watch {
        tracing::debug!("settings watcher disabled");
    } else {
        let path = cli.config.clone();
        let settings = settings.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            watch::run(path, settings, cancel)
                .await
                .context("settings watcher failed")
        });
    }

    // The window runs on the main thread; this returns when it closes.
    if let Err(e) = host::run_windowed(cfg, settings, cancel.clone(), Handle::current())
        .context("wallpaper failed")
    {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use clientscript::config::{Config, ConfigError};
use clientscript::host::SimulatedHost;
use clientscript::logging::init_logging;
use clientscript::scripting::{ScriptRunner, SessionEnd};
use clientscript::scripts::create_registry;

#[derive(Parser)]
#[command(version, about = "Run client scripts against a simulated game client", long_about = None)]
pub struct Cli {
    /// Enables debug mode (-dd for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script to launch (repeatable); defaults to `scripting.enabled_scripts`
    #[arg(short, long = "script")]
    scripts: Vec<String>,

    /// Stop after this many rounds
    #[arg(short, long)]
    rounds: Option<u64>,

    /// Run rounds back to back instead of at the configured tick rate
    #[arg(long)]
    fast: bool,

    /// List the built-in scripts and exit
    #[arg(long)]
    list: bool,

    /// Write a config file with default settings and exit
    #[arg(long)]
    write_config: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, ConfigError> {
    let result = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match result {
        Err(ConfigError::NotFound(path)) => {
            eprintln!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
        other => other,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.list {
        let registry = create_registry::<SimulatedHost>();
        for id in registry.available_scripts() {
            if let Some(script) = registry.create(&id) {
                println!("{:<12} {}: {}", id, script.name(), script.description());
            }
        }
        return Ok(());
    }

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::config_path()?,
        };
        Config::default().save_to(&path)?;
        eprintln!("Config file created at: {}", path.display());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_ref())?;

    let default_filter = match cli.debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _guard = init_logging("cli", config.logging.file, default_filter)?;

    if !config.scripting.enabled {
        warn!("Scripting is disabled in the config, nothing to run");
        return Ok(());
    }

    if cli.rounds.is_some() {
        config.scheduler.max_rounds = cli.rounds;
    }
    let scripts = if cli.scripts.is_empty() {
        config.scripting.enabled_scripts.clone()
    } else {
        cli.scripts.clone()
    };
    if scripts.is_empty() {
        warn!("No scripts to run; pass --script <id> or set scripting.enabled_scripts");
        return Ok(());
    }

    let host = SimulatedHost::new().with_chat_logging();
    let mut runner = ScriptRunner::from_config(host, create_registry(), &config);

    info!("Launching {} script(s)...", scripts.len());
    if runner.launch_enabled(&scripts) == 0 {
        error!("None of the requested scripts could be launched");
        return Ok(());
    }

    let summary = if cli.fast {
        runner.run_until_idle()?
    } else {
        runner
            .run_paced(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await?
    };

    let position = runner.scheduler().with_host(|host| host.position())?;
    info!(
        "Player ended at {} {} {} after {} tick(s)",
        position.x, position.y, position.z, summary.ticks
    );

    if summary.end == SessionEnd::Stalled {
        warn!("Some threads never resumed");
    }

    Ok(())
}

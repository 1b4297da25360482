use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pde_core::activity_log::TeeSink;
use pde_core::paths::settings_path;
use pde_core::{
    ActivityLog, Backend, BackendChoice, MemorySink, PdeSettings, ProtectionLevel, Session,
    StdoutSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod shell;

const HISTORY_CAPACITY: usize = 500;

#[derive(Parser, Debug)]
#[command(name = "pde")]
#[command(version, about = "Protect files, folders and text with device data protection", long_about = None)]
struct Cli {
    /// Protection provider: auto, platform, emulated or disabled
    #[arg(long, global = true)]
    backend: Option<BackendChoice>,

    /// Settings file (defaults to $PDE_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether protected data is expected to stay available
    Status,

    /// Protect a single file
    ProtectFile {
        path: PathBuf,
        /// while-unlocked (l2) or after-first-unlock (l1)
        #[arg(short, long)]
        level: Option<ProtectionLevel>,
    },

    /// Remove protection from a single file
    UnprotectFile { path: PathBuf },

    /// Protect a folder, then everything inside it
    ProtectFolder {
        path: PathBuf,
        #[arg(short, long)]
        level: Option<ProtectionLevel>,
        /// Upper bound on concurrent protection calls
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Remove protection from a folder and everything inside it
    UnprotectFolder {
        path: PathBuf,
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Protect text and print its token
    ProtectBuffer {
        text: String,
        #[arg(short, long)]
        level: Option<ProtectionLevel>,
    },

    /// Recover text from a token
    UnprotectBuffer { token: String },

    /// Log availability changes until Ctrl-C
    Watch,

    /// Interactive session reading commands from stdin
    Shell,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_ref())?;
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }
    apply_overrides(&mut settings, &cli.command)?;
    debug!(?settings, "effective settings");

    let history = MemorySink::new(HISTORY_CAPACITY);
    let (log, _consumer) = ActivityLog::spawn(TeeSink(StdoutSink, history.clone()));
    let mut session = Session::start(
        Backend::open(settings.backend),
        log.clone(),
        settings.traversal(),
    );

    let outcome = run(cli.command, &mut session, &settings, &history).await;
    log.flush().await;

    match outcome {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_settings(explicit: Option<&PathBuf>) -> Result<PdeSettings> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => settings_path()?,
    };
    if explicit.is_some() && !path.exists() {
        return Err(anyhow!("settings file {} not found", path.display()));
    }
    Ok(PdeSettings::load(&path)?)
}

fn apply_overrides(settings: &mut PdeSettings, command: &Commands) -> Result<()> {
    let max_in_flight = match command {
        Commands::ProtectFolder { max_in_flight, .. }
        | Commands::UnprotectFolder { max_in_flight, .. } => *max_in_flight,
        _ => None,
    };
    if let Some(n) = max_in_flight {
        settings.max_in_flight = n;
        settings.validate()?;
    }
    Ok(())
}

/// `Ok(false)` when the action ran but something in it did not succeed.
async fn run(
    command: Commands,
    session: &mut Session,
    settings: &PdeSettings,
    history: &MemorySink,
) -> Result<bool> {
    let level_or_default = |level: Option<ProtectionLevel>| level.unwrap_or(settings.default_level);

    match command {
        Commands::Status => {
            session.log_availability()?;
            Ok(true)
        }
        Commands::ProtectFile { path, level } => {
            session.select_file(&path)?;
            let outcome = session
                .protect_selected_file(level_or_default(level))
                .await?;
            Ok(outcome.map(|o| o.succeeded()).unwrap_or(false))
        }
        Commands::UnprotectFile { path } => {
            session.select_file(&path)?;
            let outcome = session.protect_selected_file(ProtectionLevel::Always).await?;
            Ok(outcome.map(|o| o.succeeded()).unwrap_or(false))
        }
        Commands::ProtectFolder { path, level, .. } => {
            protect_folder(session, path, level_or_default(level)).await
        }
        Commands::UnprotectFolder { path, .. } => {
            protect_folder(session, path, ProtectionLevel::Always).await
        }
        Commands::ProtectBuffer { text, level } => {
            let token = session.protect_buffer(&text, level_or_default(level)).await?;
            Ok(token.is_some())
        }
        Commands::UnprotectBuffer { token } => {
            let result = session.unprotect_buffer(&token).await?;
            Ok(matches!(
                result,
                Some(pde_core::BufferUnprotectResult::Succeeded(_))
            ))
        }
        Commands::Watch => {
            session.log_availability()?;
            info!("watching availability changes");
            signal::ctrl_c().await?;
            Ok(true)
        }
        Commands::Shell => {
            shell::run(session, settings, history).await?;
            Ok(true)
        }
    }
}

async fn protect_folder(
    session: &mut Session,
    path: PathBuf,
    level: ProtectionLevel,
) -> Result<bool> {
    session.select_folder(&path)?;
    let Some(report) = session.protect_selected_folder(level).await? else {
        return Ok(false);
    };
    session.log().line(format!(
        "Folder protection finished: {} of {} items protected, {} unreadable",
        report.succeeded,
        report.attempted,
        report.enumeration_errors.len()
    ));
    Ok(report.failed.is_empty() && report.enumeration_errors.is_empty())
}

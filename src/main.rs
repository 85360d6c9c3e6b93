use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use notes_backup::cli::{
    build_pipeline, handle_config_command, handle_daemon, handle_init, handle_list, handle_prune,
    handle_run, ConfigCommands, InitArgs,
};
use notes_backup::config::{AppPaths, JsonFileStore};
use notes_backup::logging::init_tracing;

#[derive(Parser)]
#[command(
    name = "notes-backup",
    author = "Kaylee Beyene",
    version,
    about = "Scheduled, retention-managed backups of a notes profile",
    long_about = "notes-backup exports your notebooks and profile data into a backup \
                  directory, optionally compressing and encrypting them with 7-Zip, \
                  and keeps a configurable number of backup sets."
)]
struct Cli {
    /// Directory holding settings.json
    #[arg(long, global = true, env = "NOTES_BACKUP_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default settings
    Init(InitArgs),

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },

    /// Take a backup now
    Run {
        /// Only print errors
        #[arg(short, long)]
        quiet: bool,
    },

    /// Take backups on the configured interval until interrupted
    Daemon,

    /// List retained backup sets
    #[command(alias = "ls")]
    List,

    /// Delete backup sets beyond the retention count
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let run_log = init_tracing(cli.verbose);

    let paths = match cli.config_dir {
        Some(dir) => AppPaths::with_base_dir(dir),
        None => AppPaths::new()?,
    };
    let store = Arc::new(JsonFileStore::new(paths.settings_file()));

    match cli.command {
        Some(Commands::Init(args)) => handle_init(&paths, &store, args)?,
        Some(Commands::Config { action }) => handle_config_command(&paths, &store, action)?,
        Some(Commands::Run { quiet }) => {
            let pipeline = build_pipeline(store, run_log, quiet)?;
            if handle_run(&pipeline).await.is_err() {
                // The notifier has already printed the reason
                std::process::exit(1);
            }
        }
        Some(Commands::Daemon) => {
            let pipeline = build_pipeline(store, run_log, false)?;
            handle_daemon(&pipeline, &paths.settings_file()).await?;
        }
        Some(Commands::List) => handle_list(&store)?,
        Some(Commands::Prune) => handle_prune(&store)?,
        None => {
            println!("notes-backup - backups for your notes");
            println!();
            println!("Run 'notes-backup --help' for usage information.");
            println!("Run 'notes-backup init' to get started.");
        }
    }

    Ok(())
}

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use romsmith_core::error::Error;
use romsmith_core::organizer::{ExistingPolicy, Resolution};
use romsmith_core::store::Store;
use romsmith_core::{Session, Settings};
use tracing_subscriber::EnvFilter;

/// romsmith: identify ROM files against DAT catalogs and organize them
#[derive(Parser)]
#[command(name = "romsmith", version, about)]
struct Cli {
    /// Path to the library database
    #[arg(long, default_value_t = default_db_path())]
    db: String,

    /// Saved collection to work on
    #[arg(long, default_value = "default")]
    collection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage loaded DAT catalogs
    Dat {
        #[command(subcommand)]
        action: Option<DatAction>,
    },
    /// Scan a directory and identify its files
    Scan {
        /// Directory to scan
        path: PathBuf,
        /// Hash files on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Do not descend into subdirectories
        #[arg(long)]
        no_recurse: bool,
    },
    /// Show catalogs and completeness
    Status,
    /// List catalog entries with no matching file
    Missing {
        /// Only entries of this catalog
        #[arg(long)]
        catalog: Option<String>,
    },
    /// List scanned files that matched no catalog
    Unidentified,
    /// List available organization strategies
    Strategies,
    /// Preview how identified files would be organized
    Plan {
        /// Strategy id, or several joined with `+` (e.g. system+region)
        strategy: String,
        /// Output directory
        output: PathBuf,
        /// Move files instead of copying them
        #[arg(long = "move")]
        move_files: bool,
    },
    /// Execute the last plan
    Organize {
        /// How to settle destinations claimed by several files
        #[arg(long, value_enum)]
        resolve: Option<ResolveArg>,
        /// What to do when a destination already exists
        #[arg(long, value_enum, default_value_t = ExistingArg::Fail)]
        on_existing: ExistingArg,
    },
    /// Revert the most recent organize
    Undo,
    /// Forget the undo history
    Commit,
    /// Show or change settings
    Config {
        /// Setting name (omit to list all)
        key: Option<String>,
        /// New value
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum DatAction {
    /// Load a DAT file (.dat, .xml or a .zip containing one)
    Add {
        /// Path to the catalog
        path: PathBuf,
    },
    /// Unload a catalog by id
    Rm {
        /// Catalog id as shown by `romsmith dat`
        id: String,
    },
    /// Write a loaded catalog out as Logiqx XML
    Export {
        /// Catalog id as shown by `romsmith dat`
        id: String,
        /// Destination file
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolveArg {
    Overwrite,
    Skip,
    Rename,
}

impl From<ResolveArg> for Resolution {
    fn from(arg: ResolveArg) -> Self {
        match arg {
            ResolveArg::Overwrite => Resolution::Overwrite,
            ResolveArg::Skip => Resolution::Skip,
            ResolveArg::Rename => Resolution::Rename,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExistingArg {
    Fail,
    Skip,
    Overwrite,
    Rename,
}

impl From<ExistingArg> for ExistingPolicy {
    fn from(arg: ExistingArg) -> Self {
        match arg {
            ExistingArg::Fail => ExistingPolicy::Fail,
            ExistingArg::Skip => ExistingPolicy::Skip,
            ExistingArg::Overwrite => ExistingPolicy::Overwrite,
            ExistingArg::Rename => ExistingPolicy::Rename,
        }
    }
}

fn default_db_path() -> String {
    dirs_path().to_string_lossy().to_string()
}

fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".romsmith").join("library.db")
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("ROMSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_session(store: &Store, collection: &str) -> Result<Session> {
    let settings = Settings::load(store)?;
    let mut session = match store.load_collection(collection) {
        Ok(state) => Session::restore(state, settings),
        Err(Error::CollectionNotFound(_)) => Session::new(settings),
        Err(err) => return Err(err.into()),
    };
    for (id, err) in session.reload_catalogs() {
        eprintln!("warning: catalog {id} could not be reloaded: {err}");
    }
    Ok(session)
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    tracing::debug!(db = %cli.db, collection = %cli.collection, "opening library");
    let store = Store::open(&PathBuf::from(&cli.db))?;

    if let Commands::Config { key, value } = &cli.command {
        return commands::config::run(&store, key.as_deref(), value.as_deref());
    }

    let mut session = open_session(&store, &cli.collection)?;

    match cli.command {
        Commands::Dat { action } => match action {
            None => commands::dat::list(&session)?,
            Some(DatAction::Add { path }) => commands::dat::add(&mut session, &store, &path)?,
            Some(DatAction::Rm { id }) => commands::dat::rm(&mut session, &store, &id)?,
            Some(DatAction::Export { id, output }) => {
                commands::dat::export(&session, &id, &output)?
            }
        },
        Commands::Scan {
            path,
            parallel,
            no_recurse,
        } => commands::scan::run(&mut session, &path, parallel, !no_recurse)?,
        Commands::Status => commands::status::run(&session)?,
        Commands::Missing { catalog } => commands::status::missing(&session, catalog.as_deref())?,
        Commands::Unidentified => commands::status::unidentified(&session)?,
        Commands::Strategies => commands::organize::strategies(),
        Commands::Plan {
            strategy,
            output,
            move_files,
        } => commands::organize::plan(&mut session, &strategy, &output, move_files)?,
        Commands::Organize {
            resolve,
            on_existing,
        } => commands::organize::execute(
            &mut session,
            resolve.map(Resolution::from),
            on_existing.into(),
        )?,
        Commands::Undo => commands::organize::undo(&mut session)?,
        Commands::Commit => commands::organize::commit(&mut session),
        Commands::Config { .. } => {}
    }

    store.save_collection(&cli.collection, session.state())?;
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use holostore::models::{Address, ChainId, CredentialService};
use holostore::query::search_store;
use holostore::store::CacheStore;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "holostore-cli",
    about = "Inspect a holo cache database without contacting any chain."
)]
struct Cli {
    /// Path of the cache SQLite database.
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    db_path: PathBuf,

    /// Chain tables to open (repeat or comma-separate).
    #[arg(short, long, value_delimiter = ',', required = true)]
    chain: Vec<String>,

    /// Minimum log level to display.
    #[arg(long, default_value_t = LogLevelArg::Warn, value_enum)]
    log_level: LogLevelArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the cached record for one address on one chain.
    Get { chain: String, address: String },
    /// List every address with a record on any opened chain.
    Addresses,
    /// Case-insensitive text search across all opened chains.
    Search { needle: String },
    /// Find the address holding a credential, from the cache only.
    Credential { service: String, credentials: String },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default());
    logger.filter_level(LevelFilter::from(cli.log_level));
    let _ = logger.try_init();

    if !cli.db_path.exists() {
        bail!("Cache database '{}' does not exist", cli.db_path.display());
    }
    let chains = cli
        .chain
        .iter()
        .map(|raw| ChainId::parse(raw))
        .collect::<holostore::errors::Result<Vec<_>>>()?;
    let store = CacheStore::open(&cli.db_path, chains).context("failed to open cache")?;

    match cli.command {
        Commands::Get { chain, address } => {
            let chain = ChainId::parse(&chain)?;
            let address = Address::parse(&address)?;
            match store.get(&chain, &address)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No record for {} on {}.", address, chain),
            }
        }
        Commands::Addresses => {
            for address in store.all_known_addresses()? {
                println!("{address}");
            }
        }
        Commands::Search { needle } => {
            let matches = search_store(&store, &needle)?;
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Credential {
            service,
            credentials,
        } => {
            let service: CredentialService = service.parse()?;
            match store.address_for_credential(service, &credentials)? {
                Some(address) => println!("{address}"),
                None => println!("No cached address for {} credentials '{}'.", service, credentials),
            }
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use lease_ledger::application::executor::AllocationExecutor;
use lease_ledger::config::EngineConfig;
use lease_ledger::domain::ids::LeaseId;
use lease_ledger::domain::ports::{LedgerImport, LedgerStore};
use lease_ledger::domain::waterfall::WaterfallOrder;
use lease_ledger::infrastructure::in_memory::InMemoryLedger;
#[cfg(feature = "storage-rocksdb")]
use lease_ledger::infrastructure::rocksdb::RocksDBLedger;
use lease_ledger::interfaces::csv::ledger_reader::LedgerReader;
use lease_ledger::interfaces::csv::request_reader::RequestReader;
use lease_ledger::interfaces::csv::writer::{AllocationWriter, ChargeWriter};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Leases CSV to import before running the command
    #[arg(long, global = true)]
    leases: Option<PathBuf>,

    /// Payments CSV to import before running the command
    #[arg(long, global = true)]
    payments: Option<PathBuf>,

    /// Charges CSV to import before running the command
    #[arg(long, global = true)]
    charges: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import the seed files and report what was loaded
    Import,
    /// Allocate every payment listed in a requests CSV
    Allocate {
        /// Requests CSV: payment,lease,amount,external_id,order,manual
        requests: PathBuf,
    },
    /// Print the outstanding charges of a lease in payment order
    Outstanding {
        lease: u64,
        /// Waterfall order, e.g. rent,late_fee
        #[arg(long)]
        order: Option<WaterfallOrder>,
    },
}

#[derive(Debug, Default)]
struct ImportCounts {
    leases: usize,
    payments: usize,
    charges: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };

    if let Some(db_path) = &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = Arc::new(RocksDBLedger::open(db_path).into_diagnostic()?);
            return run(&cli, store, config).await;
        }

        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    run(&cli, Arc::new(InMemoryLedger::new()), config).await
}

async fn run<S>(cli: &Cli, store: Arc<S>, config: EngineConfig) -> Result<()>
where
    S: LedgerStore + LedgerImport + 'static,
{
    let counts = import_seeds(cli, store.as_ref()).await?;
    let executor = AllocationExecutor::new(store, config);

    match &cli.command {
        Command::Import => {
            eprintln!(
                "Imported {} leases, {} payments, {} charges",
                counts.leases, counts.payments, counts.charges
            );
        }
        Command::Allocate { requests } => {
            let file = File::open(requests).into_diagnostic()?;
            let mut writer = AllocationWriter::new(io::stdout());
            for request in RequestReader::new(file).requests() {
                let request = match request {
                    Ok(request) => request,
                    Err(e) => {
                        eprintln!("Error reading request: {}", e);
                        continue;
                    }
                };
                let payment = request.payment_id;
                match executor.allocate_payment(request).await {
                    Ok(outcome) => writer.write_outcome(&outcome).into_diagnostic()?,
                    Err(e) => eprintln!("Error allocating payment {}: {}", payment, e),
                }
            }
            writer.flush().into_diagnostic()?;
        }
        Command::Outstanding { lease, order } => {
            let charges = executor
                .outstanding_charges(LeaseId(*lease), order.as_ref())
                .await
                .into_diagnostic()?;
            ChargeWriter::new(io::stdout())
                .write_charges(&charges)
                .into_diagnostic()?;
        }
    }

    Ok(())
}

async fn import_seeds<S: LedgerImport>(cli: &Cli, store: &S) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    if let Some(path) = &cli.leases {
        for lease in open(path)?.leases() {
            match lease {
                Ok(lease) => {
                    store.put_lease(lease).await.into_diagnostic()?;
                    counts.leases += 1;
                }
                Err(e) => eprintln!("Error reading lease: {}", e),
            }
        }
    }
    if let Some(path) = &cli.payments {
        for payment in open(path)?.payments() {
            match payment {
                Ok(payment) => {
                    store.put_payment(payment).await.into_diagnostic()?;
                    counts.payments += 1;
                }
                Err(e) => eprintln!("Error reading payment: {}", e),
            }
        }
    }
    if let Some(path) = &cli.charges {
        for charge in open(path)?.charges() {
            match charge {
                Ok(charge) => {
                    store.put_charge(charge).await.into_diagnostic()?;
                    counts.charges += 1;
                }
                Err(e) => eprintln!("Error reading charge: {}", e),
            }
        }
    }

    info!(
        leases = counts.leases,
        payments = counts.payments,
        charges = counts.charges,
        "seed data imported"
    );
    Ok(counts)
}

fn open(path: &Path) -> Result<LedgerReader<File>> {
    let file = File::open(path).into_diagnostic()?;
    Ok(LedgerReader::new(file))
}

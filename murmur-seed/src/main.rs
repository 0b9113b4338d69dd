use anyhow::{Context, Result};
use clap::Parser;
use murmur_server::db::{repositories::AccountRepository, Database, Schema};
use murmur_server::seed::{sample_accounts, SeedOutcome, SeedPipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Murmur Seed Utility
///
/// Creates the schema if needed and loads the sample accounts in a single
/// transaction. Fails, leaving the database untouched, when any of them
/// already exists.
#[derive(Parser, Debug)]
#[command(name = "murmur-seed")]
#[command(about = "Load the Murmur sample accounts into a database", long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "./murmur.db")]
    database: String,

    /// Check the batch inside a transaction that is rolled back
    #[arg(short = 'n', long)]
    dry_run: bool,
}

/// Open the database and make sure the schema exists
fn connect_database(path: &str) -> Result<Database> {
    println!("Connecting to database: {}", path);

    let db = Database::new(path, Schema::social())
        .context("Failed to open database connection")?;
    db.initialize()
        .context("Failed to initialize database schema")?;

    Ok(db)
}

fn run(args: &Args) -> Result<SeedOutcome> {
    let db = connect_database(&args.database)?;
    let pipeline = SeedPipeline::new(AccountRepository::new(db));

    let outcome = if args.dry_run {
        pipeline.dry_run(&sample_accounts())
    } else {
        pipeline.run_samples()
    };
    outcome.context("Failed to seed data")
}

/// Display the seed result
fn display_outcome(outcome: &SeedOutcome) {
    println!();
    println!("Seed Summary");
    println!("============");
    println!();
    match outcome {
        SeedOutcome::Seeded(accounts) => {
            for account in accounts {
                println!("  {} <{}> {}", account.username, account.email, account.id);
            }
            println!();
            println!("Successfully seeded {} users", accounts.len());
        }
        SeedOutcome::Checked(count) => {
            println!("{} users would be created.", count);
            println!("This was a dry run - no changes were made to the database.");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!("Murmur Seed Utility");
    println!("===================");
    println!();
    println!("Database: {}", args.database);
    println!("Dry run: {}", args.dry_run);

    let outcome = run(&args)?;
    display_outcome(&outcome);

    Ok(())
}

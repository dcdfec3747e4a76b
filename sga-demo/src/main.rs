use clap::Parser;
use sga_server::ServerConfig;
use sga_sqlite::{Database, db};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), db::Error> {
    // By convention, the server and store crates instrument their
    // operations with `tracing`; subscribe so the events reach stdio.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::import();

    match args {
        Ok(args) => {
            let database = Database::open(args.database.as_ref())?;

            let config = ServerConfig {
                bind_address: ([0, 0, 0, 0], args.api_port).into(),
                worker_concurrency: args.worker_concurrency,
                testmode: args.testmode,
                ..ServerConfig::default()
            };

            sga_server::start(config, database).await;
        }
        Err(e) => {
            let _ = e.print();
        }
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The port to listen on
    #[arg(long, default_value_t = 8080, env = "API_PORT")]
    pub api_port: u16,

    /// The location of the auction database (if omitted, use an in-memory db)
    #[arg(long, env = "DATABASE")]
    pub database: Option<std::path::PathBuf>,

    /// How many scheduler jobs may run concurrently
    #[arg(long, default_value_t = 50, env = "WORKER_CONCURRENCY")]
    pub worker_concurrency: usize,

    /// Mount the test-only top-up route. Never enable in production.
    #[arg(long, env = "TESTMODE")]
    pub testmode: bool,
}

impl Args {
    pub fn import() -> Result<Self, clap::Error> {
        // Attempt to load a .env file, but don't sweat it if one is not found.
        let _ = dotenvy::dotenv();
        Self::try_parse()
    }
}

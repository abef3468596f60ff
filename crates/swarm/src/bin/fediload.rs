//! Fediload CLI
//!
//! Runs a swarm of simulated users against a Mastodon instance, or checks a
//! credential file before a run.

use clap::{Parser, Subcommand};
use fediload_swarm::{check_pool, ConfigFile, CredentialPool, MastodonClient, Swarm, SwarmConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fediload")]
#[command(about = "Simulated-user load generator for Mastodon instances")]
#[command(version)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. "info", "fediload_swarm=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated users against an instance
    Run {
        /// Base URL of the instance under test
        #[arg(long)]
        host: Option<String>,

        /// Credential CSV from the provisioning script
        #[arg(short, long)]
        credentials: Option<PathBuf>,

        /// TOML config file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of concurrent users
        #[arg(short, long)]
        users: Option<usize>,

        /// Users started per second
        #[arg(long)]
        spawn_rate: Option<f64>,

        /// How long to run (e.g., "30s", "5m", "1h")
        #[arg(short = 't', long)]
        run_time: Option<humantime::Duration>,

        /// Minimum pause between actions
        #[arg(long)]
        wait_min: Option<humantime::Duration>,

        /// Maximum pause between actions
        #[arg(long)]
        wait_max: Option<humantime::Duration>,

        /// Per-request timeout
        #[arg(long)]
        request_timeout: Option<humantime::Duration>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Wait for the instance to be ready before starting
        #[arg(long)]
        wait_ready: bool,
    },

    /// Check a credential file for duplicates and, optionally, rejected tokens
    Check {
        /// Credential CSV from the provisioning script
        #[arg(short, long, default_value = "test_users.csv")]
        credentials: PathBuf,

        /// Call verify_credentials for every account on this instance
        #[arg(long)]
        host: Option<String>,

        /// Per-request timeout
        #[arg(long, default_value = "30s")]
        request_timeout: humantime::Duration,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            host,
            credentials,
            config,
            users,
            spawn_rate,
            run_time,
            wait_min,
            wait_max,
            request_timeout,
            seed,
            wait_ready,
        } => {
            let mut swarm_config = SwarmConfig::default();
            if let Some(path) = config {
                swarm_config = swarm_config.apply_file(ConfigFile::load(path)?)?;
            }

            if let Some(host) = host {
                swarm_config.host = host;
            }
            if let Some(path) = credentials {
                swarm_config.credentials_path = path;
            }
            if let Some(users) = users {
                swarm_config = swarm_config.with_users(users);
            }
            if let Some(rate) = spawn_rate {
                swarm_config = swarm_config.with_spawn_rate(rate);
            }
            if let Some(run_time) = run_time {
                swarm_config = swarm_config.with_run_time(*run_time);
            }
            let min = wait_min.map_or(swarm_config.wait_min, |d| *d);
            let max = wait_max.map_or(swarm_config.wait_max, |d| *d);
            swarm_config = swarm_config.with_wait_time(min, max);
            if let Some(timeout) = request_timeout {
                swarm_config = swarm_config.with_request_timeout(*timeout);
            }
            if let Some(seed) = seed {
                swarm_config = swarm_config.with_seed(seed);
            }
            if wait_ready && swarm_config.wait_ready.is_none() {
                swarm_config = swarm_config.with_wait_ready(Duration::from_secs(60));
            }

            let swarm = Swarm::new(swarm_config)?;

            if let Some(timeout) = swarm.config().wait_ready {
                println!("Waiting for instance to be ready...");
                swarm.wait_for_ready(timeout).await?;
                println!("Instance ready.");
            }

            println!("Starting swarm for {:?}...", swarm.config().run_time);
            let report = swarm.run().await?;
            report.print();
        }

        Commands::Check {
            credentials,
            host,
            request_timeout,
        } => {
            let pool = CredentialPool::load_csv(&credentials)?;
            let client = host
                .map(|host| MastodonClient::new(&host, *request_timeout))
                .transpose()?;

            let report = check_pool(&pool, client.as_ref()).await;
            report.print();

            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

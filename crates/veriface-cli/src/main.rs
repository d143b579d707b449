use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use veriface_client::{HealthPoller, RecognitionClient};
use veriface_core::{DeviceInfo, GeoLocation, Orchestrator, VerificationLogEntry};
use veriface_store::Ledger;

mod capture;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface identity verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check backend health and report connectivity
    Health {
        /// Probe every candidate endpoint individually
        #[arg(long)]
        probe: bool,
    },
    /// Verify a face image, live against the backend or simulated locally
    Verify {
        /// Path to the image file
        #[arg(short, long)]
        image: PathBuf,
        /// Officer id recorded in the audit log
        #[arg(long)]
        officer: Option<String>,
        /// Latitude recorded in the audit log
        #[arg(long)]
        latitude: Option<f64>,
        /// Longitude recorded in the audit log
        #[arg(long)]
        longitude: Option<f64>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
        /// Skip writing the attempt to the audit log
        #[arg(long)]
        no_log: bool,
    },
    /// List the entities the backend can recognize
    Roster,
    /// Show the verification audit log
    Logs {
        /// Remove all entries instead of listing
        #[arg(long)]
        clear: bool,
    },
    /// Upload a new enrollment to the backend
    Enroll {
        /// Person's name
        #[arg(short, long)]
        name: String,
        /// Path to the image file
        #[arg(short, long)]
        image: PathBuf,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Monitor backend availability until interrupted
    Watch {
        /// Seconds between checks
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let client = RecognitionClient::new(config.client_config())
        .context("failed to build recognition client")?;

    match cli.command {
        Commands::Health { probe } => run_health(&client, probe).await,
        Commands::Verify {
            image,
            officer,
            latitude,
            longitude,
            json,
            no_log,
        } => run_verify(&config, client, &image, officer, latitude, longitude, json, no_log).await,
        Commands::Roster => run_roster(&client).await,
        Commands::Logs { clear } => run_logs(&config, clear),
        Commands::Enroll {
            name,
            image,
            role,
            department,
        } => run_enroll(&client, &name, &image, role, department).await,
        Commands::Watch { interval } => run_watch(client, interval).await,
    }
}

async fn run_health(client: &RecognitionClient, probe: bool) -> Result<()> {
    client.check_health().await;
    let status = client.status();
    println!("available:          {}", status.available);
    println!(
        "last good endpoint: {}",
        status
            .last_good
            .map(|u| u.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("reconnect attempts: {}", status.reconnect_attempts);
    if status.cooldown_active {
        println!("automatic rechecks paused (cooldown)");
    }
    if probe {
        println!();
        for p in client.probe_endpoints().await {
            match p.error {
                None => println!("{}  ok, ready={} ({} ms)", p.endpoint, p.ready, p.latency_ms),
                Some(err) => println!("{}  failed after {} ms: {err}", p.endpoint, p.latency_ms),
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_verify(
    config: &Config,
    client: RecognitionClient,
    image_path: &Path,
    officer: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    json: bool,
    no_log: bool,
) -> Result<()> {
    let payload = capture::load_image(image_path)
        .with_context(|| format!("failed to load image {}", image_path.display()))?;
    tracing::info!(bytes = payload.len(), "image payload encoded");

    let orchestrator = Orchestrator::new(client);
    let outcome = orchestrator.verify(&payload).await;

    if outcome.matched {
        let name = outcome
            .identity
            .as_ref()
            .map(|i| i.full_name.as_str())
            .unwrap_or("unknown");
        println!(
            "verified: {name} (confidence {:.2})",
            outcome.confidence.unwrap_or(0.0)
        );
    } else {
        println!(
            "not verified: {}",
            outcome.reason.as_deref().unwrap_or("no reason given")
        );
    }
    if let Some(ms) = outcome.processing_time_ms {
        println!("processing time: {ms} ms");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    if !no_log {
        let location = match (latitude, longitude) {
            (None, None) => None,
            (lat, lon) => Some(GeoLocation {
                latitude: lat,
                longitude: lon,
                address: None,
            }),
        };
        let entry = VerificationLogEntry::record(
            outcome,
            Some(officer.unwrap_or_else(|| config.officer_id.clone())),
            location,
            DeviceInfo::new(config.user_agent()),
        );
        let entry_id = entry.id.clone();
        let ledger = Ledger::open(&config.db_path).context("failed to open audit ledger")?;
        ledger.append(entry).context("failed to record attempt")?;
        tracing::info!(id = %entry_id, "attempt recorded in audit log");
    }
    Ok(())
}

async fn run_roster(client: &RecognitionClient) -> Result<()> {
    let roster = client.known_entities().await;
    if roster.entities.is_empty() {
        println!("no known entities (backend unreachable or empty)");
        return Ok(());
    }
    println!("{} known entities:", roster.count);
    for member in &roster.entities {
        let mut line = format!("  {}", member.name);
        if let Some(role) = &member.role {
            line.push_str(&format!(" - {role}"));
        }
        if let Some(dept) = &member.department {
            line.push_str(&format!(" ({dept})"));
        }
        println!("{line}");
    }
    Ok(())
}

fn run_logs(config: &Config, clear: bool) -> Result<()> {
    let ledger = Ledger::open(&config.db_path).context("failed to open audit ledger")?;
    if clear {
        ledger.clear()?;
        println!("audit log cleared");
        return Ok(());
    }
    let entries = ledger.list()?;
    if entries.is_empty() {
        println!("no verification attempts recorded");
        return Ok(());
    }
    for entry in &entries {
        let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        let verdict = if entry.result.matched {
            "match"
        } else {
            "no-match"
        };
        let who = entry
            .result
            .identity
            .as_ref()
            .map(|i| i.full_name.as_str())
            .unwrap_or("-");
        println!(
            "{when}  {verdict:<8}  {who:<24}  officer={}  id={}",
            entry.officer_id.as_deref().unwrap_or("-"),
            entry.id
        );
    }
    Ok(())
}

async fn run_enroll(
    client: &RecognitionClient,
    name: &str,
    image_path: &Path,
    role: Option<String>,
    department: Option<String>,
) -> Result<()> {
    let payload = capture::load_image(image_path)
        .with_context(|| format!("failed to load image {}", image_path.display()))?;
    let team_data = serde_json::json!({
        "role": role,
        "department": department,
    });
    let ack = client
        .enroll(name, &payload, team_data)
        .await
        .context("enrollment upload failed")?;
    if ack.success {
        println!("enrolled {name}: {}", ack.message);
        if let Some(total) = ack.total_members {
            println!("backend now knows {total} members");
        }
    } else {
        println!("enrollment rejected: {}", ack.message);
    }
    Ok(())
}

async fn run_watch(client: RecognitionClient, interval: Option<u64>) -> Result<()> {
    let interval = match interval {
        Some(secs) => Duration::from_secs(secs),
        None => client.config().poll_interval,
    };
    println!(
        "monitoring backend every {} s, ctrl-c to stop",
        interval.as_secs()
    );
    let poller = HealthPoller::start(client.clone(), interval);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_available: Option<bool> = None;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let status = client.status();
                if last_available != Some(status.available) {
                    let when = chrono::Local::now().format("%H:%M:%S");
                    if status.available {
                        let endpoint = status
                            .last_good
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        println!("[{when}] backend available via {endpoint}");
                    } else {
                        println!(
                            "[{when}] backend unavailable (attempts: {})",
                            status.reconnect_attempts
                        );
                    }
                    last_available = Some(status.available);
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
    poller.stop().await;
    println!("monitor stopped");
    Ok(())
}

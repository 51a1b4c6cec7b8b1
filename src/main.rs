//! Athenos - Entry Point
//!
//! Modes:
//! - Default: read JSON-lines events from stdin, mine in the background
//!   until EOF or Ctrl-C, then print the report
//! - --demo / -d: feed a synthetic event stream through the full pipeline

use anyhow::Context;
use athenos_core::agent::Agent;
use athenos_core::observer::{EventKind, ObservedEvent};
use athenos_core::policy::ActionOutcome;
use athenos_core::privacy::{Capability, ConsentKernel, FileStore, PassphraseKeyStore, SecureStore};
use athenos_core::sandbox::MemoryEnvironment;
use athenos_core::{AgentReport, Config};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SALT_BLOB: &str = "key_salt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let json_mode = args.iter().any(|a| a == "--json" || a == "-j");
    let demo_mode = args.iter().any(|a| a == "--demo" || a == "-d");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Athenos v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: athenos [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --demo, -d          Run a synthetic session and print the report");
        println!("  --json, -j          Log as JSON to stderr");
        println!("  --grant <cap>       Grant a capability before starting");
        println!("  --revoke <cap>      Revoke a capability before starting");
        println!("  --help, -h          Show this help");
        println!();
        println!("Default: read JSON-lines events from stdin until EOF or Ctrl-C");
        println!();
        println!("Capabilities: behavioral_logging, emotional_sensing, cloud_reasoning, auto_execution");
        println!();
        println!("Environment variables:");
        println!("  ATHENOS_CONFIG       TOML config file");
        println!("  ATHENOS_DATA_DIR     Sealed ledger directory");
        println!("  ATHENOS_PASSPHRASE   Passphrase for persistent encryption keys");
        println!("  RUST_LOG             Log filter (default: info)");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_mode {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Athenos v{}", env!("CARGO_PKG_VERSION"));

    if demo_mode {
        let report = run_demo().await?;
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let config = Config::from_env().context("loading configuration")?;
    let (consent, store) = open_consent(&config)?;

    for (flag, value) in args.iter().zip(args.iter().skip(1)) {
        let grant = match flag.as_str() {
            "--grant" => true,
            "--revoke" => false,
            _ => continue,
        };
        let capability =
            Capability::parse(value).with_context(|| format!("unknown capability '{}'", value))?;
        if grant {
            consent.grant(capability);
        } else {
            consent.revoke(capability, Some("revoked from command line".to_string()));
        }
    }

    let mut agent = Agent::new(config, consent, Arc::new(MemoryEnvironment::new()));
    if let Some(store) = store {
        agent = agent.with_store(store);
    }
    let agent = Arc::new(agent);
    agent.persist()?;
    agent.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<ObservedEvent>(&line) {
                        Ok(event) => {
                            agent.record(event);
                        }
                        Err(e) => warn!("Skipping malformed event: {}", e),
                    },
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    agent.run_cycle().await?;
    agent.shutdown().await?;
    println!("{}", agent.report().summary());
    Ok(())
}

/// Consent kernel backed by the data dir when a passphrase is configured,
/// otherwise process-lifetime keys and no persistence
fn open_consent(config: &Config) -> anyhow::Result<(Arc<ConsentKernel>, Option<Arc<dyn SecureStore>>)> {
    let Ok(passphrase) = std::env::var("ATHENOS_PASSPHRASE") else {
        warn!("ATHENOS_PASSPHRASE not set, consent will not persist across runs");
        return Ok((Arc::new(ConsentKernel::ephemeral()), None));
    };

    let store: Arc<dyn SecureStore> = Arc::new(
        FileStore::new(config.data_dir.clone())
            .with_context(|| format!("opening {}", config.data_dir.display()))?,
    );

    let keys = match store.get(SALT_BLOB)? {
        Some(bytes) => {
            let salt: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("stored key salt is corrupted"))?;
            PassphraseKeyStore::with_salt(&passphrase, salt)
        }
        None => {
            let keys = PassphraseKeyStore::new(&passphrase);
            store.put(SALT_BLOB, &keys.salt())?;
            keys
        }
    };

    let consent = ConsentKernel::restore(Arc::new(keys), store.as_ref())
        .context("restoring consent ledger")?;
    Ok((Arc::new(consent), Some(store)))
}

/// Synthetic session: a repeated three-app workflow, a switching burst and
/// a debugging loop
async fn run_demo() -> anyhow::Result<AgentReport> {
    let mut config = Config::default();
    config.background.enabled = false;
    config.policy.rl_seed = Some(7);

    let consent = Arc::new(ConsentKernel::ephemeral());
    consent.grant(Capability::BehavioralLogging);
    consent.grant(Capability::AutoExecution);

    let agent = Agent::new(config, consent, Arc::new(MemoryEnvironment::new()));
    let mut t = Utc::now() - Duration::hours(2);

    for _ in 0..4 {
        for app in ["Editor", "Terminal", "Browser"] {
            t += Duration::minutes(3);
            agent.record(ObservedEvent::at(EventKind::AppSwitch, app, t));
        }
    }
    for app in ["Slack", "Mail", "Slack", "Mail", "Slack", "Mail"] {
        t += Duration::seconds(2);
        agent.record(ObservedEvent::at(EventKind::WindowFocus, app, t));
    }
    for _ in 0..3 {
        t += Duration::minutes(1);
        agent.record(
            ObservedEvent::at(EventKind::KeyPress, "Terminal", t).with_payload("action", "copy_error"),
        );
    }

    let decisions = agent.run_cycle().await?;
    for decision in &decisions {
        info!("{} -> {} ({})", decision.proposal_id, decision.state.as_str(), decision.why);
    }

    if let Some(first) = decisions.first() {
        agent.record_outcome(first.proposal_id, ActionOutcome::accepted(5.0))?;
    }
    for pending in agent.synthesizer().pending_approvals() {
        agent.synthesizer().withdraw(pending.id)?;
    }
    if let Some(rolled_back) = agent.synthesizer().rollback_last().await? {
        info!("Rolled back {}", rolled_back);
    }

    Ok(agent.report())
}

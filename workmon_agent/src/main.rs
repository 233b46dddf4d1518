//! workmon_agent: samples a workload endpoint on a fixed cadence for hours,
//! checkpointing every sample so an interrupted run can be resumed.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use workmon_agent::checkpoint::CheckpointStore;
use workmon_agent::clock::Clock;
use workmon_agent::collector::Collector;
use workmon_agent::config::{config_path, load_file_config, parse_args, AgentConfig, ConfigError};
use workmon_agent::demo::DemoSource;
use workmon_agent::output::write_output;
use workmon_agent::scheduler::{Scheduler, Startup};
use workmon_agent::session::{MonitoringSession, Outcome, SessionStatus};
use workmon_agent::source::MetricSource;
use workmon_agent::ws::WsSource;

// ---------- Exit codes ----------

const EXIT_FAILED: u8 = 1;
const EXIT_SETUP: u8 = 2;
const EXIT_INTERRUPTED: u8 = 3;

const SLOW_PREFLIGHT: Duration = Duration::from_secs(2);

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(ConfigError::Help(usage)) => {
            println!("{usage}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}\n{}", workmon_agent::config::USAGE);
            return ExitCode::from(EXIT_SETUP);
        }
    };
    init_tracing();

    let cfg = match load_file_config(&config_path())
        .and_then(|file| AgentConfig::resolve(parsed, file, |k| env::var(k).ok()))
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_SETUP);
        }
    };
    for w in cfg.warnings() {
        warn!("{w}");
    }

    let result = if cfg.demo {
        drive(&cfg, DemoSource::new()).await
    } else {
        match WsSource::new(&cfg.identity.target, cfg.credentials.as_ref()) {
            Ok(source) => drive(&cfg, source).await,
            Err(e) => Err(anyhow::anyhow!("bad target {}: {e}", cfg.identity.target)),
        }
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

async fn drive<S: MetricSource>(cfg: &AgentConfig, mut source: S) -> anyhow::Result<ExitCode> {
    let collector = Collector::new(cfg.timeout);
    if cfg.check {
        return Ok(preflight(&collector, &mut source).await);
    }

    let store = CheckpointStore::new(&cfg.checkpoint_path);
    if cfg.discard_checkpoint
        && store
            .discard()
            .context("could not discard existing checkpoint")?
    {
        warn!(path = %store.path().display(), "existing checkpoint discarded on request");
    }

    let clock = Clock::system();
    let mut scheduler = Scheduler::new(source, collector, store, clock, cfg.options);
    let (mut session, startup) = scheduler
        .init(cfg.identity.clone())
        .with_context(|| format!("cannot start session ({})", cfg.checkpoint_path.display()))?;
    match startup {
        Startup::Fresh => info!(
            session = %cfg.identity,
            checkpoint = %cfg.checkpoint_path.display(),
            "starting new session"
        ),
        Startup::Resumed { samples, errors } => info!(
            session = %cfg.identity,
            samples,
            errors,
            start_time = %session.start_time(),
            "resuming session from checkpoint"
        ),
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current tick");
            let _ = cancel_tx.send(true);
        }
    });

    let status = match scheduler.run(&mut session, cancel_rx).await {
        Ok(status) => status,
        Err(e) => {
            error!(error = %e, "session aborted");
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };

    Ok(match status {
        SessionStatus::Completed => {
            if let Err(e) = write_output(&cfg.output, &session, clock.now()) {
                error!(error = %e, "could not write output document");
                return Ok(ExitCode::from(EXIT_FAILED));
            }
            info!(path = %cfg.output.display(), "output written");
            ExitCode::SUCCESS
        }
        SessionStatus::Failed => {
            error!(
                reason = %escalation_reason(&session),
                checkpoint = %cfg.checkpoint_path.display(),
                "session FAILED"
            );
            ExitCode::from(EXIT_FAILED)
        }
        SessionStatus::Interrupted => {
            info!(
                checkpoint = %cfg.checkpoint_path.display(),
                "session interrupted; rerun with the same settings to resume"
            );
            ExitCode::from(EXIT_INTERRUPTED)
        }
        SessionStatus::Init | SessionStatus::Running => ExitCode::from(EXIT_FAILED),
    })
}

fn escalation_reason(session: &MonitoringSession) -> String {
    let streak = session.consecutive_errors();
    match session.samples().last().map(|s| &s.outcome) {
        Some(Outcome::Error {
            error_kind,
            message,
        }) => format!("{streak} consecutive errors, last {error_kind}: {message}"),
        _ => format!("{streak} consecutive errors"),
    }
}

/// One bounded acquisition, reported and classified. Never touches the checkpoint.
async fn preflight<S: MetricSource>(collector: &Collector, source: &mut S) -> ExitCode {
    info!(endpoint = %source.describe(), timeout = ?collector.timeout(), "running preflight check");
    let started = tokio::time::Instant::now();
    let sample = collector.collect(source, 0, Utc::now()).await;
    let latency = started.elapsed();

    match &sample.outcome {
        Outcome::Success { snapshot } => {
            info!(
                tag = "OK",
                latency_ms = latency.as_millis() as u64,
                cpus = snapshot.cpu.total_cpus,
                buffer_pool_mb = snapshot.memory.buffer_pool_mb,
                connections = snapshot.activity.user_connections,
                top_wait = %snapshot.waits.top_wait_type,
                "metric source answered"
            );
            for (field, value) in snapshot.numeric_fields() {
                debug!(field, value, "preflight value");
            }
            if latency > SLOW_PREFLIGHT {
                warn!(
                    latency_ms = latency.as_millis() as u64,
                    "acquisition is slow; consider a longer interval"
                );
            }
            ExitCode::SUCCESS
        }
        Outcome::Error {
            error_kind,
            message,
        } => {
            error!(tag = error_kind.tag(), latency_ms = latency.as_millis() as u64, "{message}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

//! Agent configuration: built-in defaults, then an optional JSON config file
//! ($XDG_CONFIG_HOME/workmon_agent/config.json), then WORKMON_* environment
//! variables, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::checkpoint::CheckpointStore;
use crate::collector::DEFAULT_TIMEOUT;
use crate::scheduler::{SchedulerOptions, DEFAULT_CHECKPOINT_EVERY, DEFAULT_FAILURE_THRESHOLD};
use crate::session::{AuthMode, SessionIdentity};

pub const DEFAULT_DURATION_MINUTES: u64 = 1440;
pub const DEFAULT_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_OUTPUT: &str = "workload_samples.json";
/// One year.
pub const MAX_DURATION_MINUTES: u64 = 366 * 1440;
/// One day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

pub const USAGE: &str = "Usage: workmon_agent --target ws://HOST:PORT/PATH|-T URL [--duration MINUTES|-d MINUTES] \
[--interval SECONDS|-i SECONDS] [--output PATH|-o PATH] [--resume-from CHECKPOINT|-r CHECKPOINT] \
[--username NAME|-u NAME] [--password SECRET] [--timeout SECONDS] [--failure-threshold N] \
[--checkpoint-every N] [--discard-checkpoint] [--demo] [--check]";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--help` was requested; carries the usage text.
    #[error("{0}")]
    Help(String),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Secrets for credentialed mode. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    pub target: Option<String>,
    pub duration_minutes: Option<u64>,
    pub interval_secs: Option<u64>,
    pub output: Option<PathBuf>,
    pub resume_from: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub checkpoint_every: Option<u32>,
    pub discard_checkpoint: bool,
    pub demo: bool,
    pub check: bool,
}

fn parse_num<T: std::str::FromStr>(flag: &str, v: &str) -> Result<T, ConfigError> {
    v.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::invalid(flag, format!("'{v}' is not a number")))
}

fn env_num<T: std::str::FromStr>(
    env: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    env(key).map(|v| parse_num::<T>(key, &v)).transpose()
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, ConfigError> {
    let mut it = args.into_iter();
    let _prog = it.next();
    let mut out = ParsedArgs::default();

    while let Some(raw) = it.next() {
        // --flag=value is accepted for every flag that takes a value
        let (flag, inline) = match raw.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (raw.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, ConfigError> {
            match inline.clone().or_else(|| it.next()) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(ConfigError::MissingValue(name.to_string())),
            }
        };
        match flag.as_str() {
            "-h" | "--help" => return Err(ConfigError::Help(USAGE.to_string())),
            "--target" | "-T" => out.target = Some(value("--target")?),
            "--duration" | "-d" => {
                out.duration_minutes = Some(parse_num("--duration", &value("--duration")?)?)
            }
            "--interval" | "-i" => {
                out.interval_secs = Some(parse_num("--interval", &value("--interval")?)?)
            }
            "--output" | "-o" => out.output = Some(PathBuf::from(value("--output")?)),
            "--resume-from" | "-r" => {
                out.resume_from = Some(PathBuf::from(value("--resume-from")?))
            }
            "--username" | "-u" => out.username = Some(value("--username")?),
            "--password" => out.password = Some(value("--password")?),
            "--timeout" => out.timeout_secs = Some(parse_num("--timeout", &value("--timeout")?)?),
            "--failure-threshold" => {
                out.failure_threshold = Some(parse_num(
                    "--failure-threshold",
                    &value("--failure-threshold")?,
                )?)
            }
            "--checkpoint-every" => {
                out.checkpoint_every = Some(parse_num(
                    "--checkpoint-every",
                    &value("--checkpoint-every")?,
                )?)
            }
            "--discard-checkpoint" => out.discard_checkpoint = true,
            "--demo" => out.demo = true,
            "--check" => out.check = true,
            _ => return Err(ConfigError::UnexpectedArgument(raw)),
        }
    }
    Ok(out)
}

/// Optional on-disk defaults. Every key may be omitted.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    pub timeout_secs: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub checkpoint_every: Option<u32>,
    pub interval_secs: Option<u64>,
    pub duration_minutes: Option<u64>,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("workmon_agent")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workmon_agent")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Missing file means defaults; a file that does not parse is an error.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(e) => Err(ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub identity: SessionIdentity,
    pub credentials: Option<Credentials>,
    pub output: PathBuf,
    pub checkpoint_path: PathBuf,
    pub timeout: Duration,
    pub options: SchedulerOptions,
    pub discard_checkpoint: bool,
    pub demo: bool,
    pub check: bool,
}

impl AgentConfig {
    /// Merge all layers. `env` looks up environment variables (injected for tests).
    pub fn resolve(
        args: ParsedArgs,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_timeout = env_num::<u64>(&env, "WORKMON_AGENT_TIMEOUT_SECS")?;
        let env_threshold = env_num::<u32>(&env, "WORKMON_AGENT_FAILURE_THRESHOLD")?;
        let env_every = env_num::<u32>(&env, "WORKMON_AGENT_CHECKPOINT_EVERY")?;

        let duration_minutes = args
            .duration_minutes
            .or(file.duration_minutes)
            .unwrap_or(DEFAULT_DURATION_MINUTES);
        let interval_secs = args
            .interval_secs
            .or(file.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let timeout_secs = args
            .timeout_secs
            .or(env_timeout)
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT.as_secs());
        let failure_threshold = args
            .failure_threshold
            .or(env_threshold)
            .or(file.failure_threshold)
            .unwrap_or(DEFAULT_FAILURE_THRESHOLD);
        let checkpoint_every = args
            .checkpoint_every
            .or(env_every)
            .or(file.checkpoint_every)
            .unwrap_or(DEFAULT_CHECKPOINT_EVERY);

        if interval_secs == 0 {
            return Err(ConfigError::invalid("--interval", "must be at least 1 second"));
        }
        if interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::invalid(
                "--interval",
                format!("must be at most {MAX_INTERVAL_SECS} seconds"),
            ));
        }
        if duration_minutes > MAX_DURATION_MINUTES {
            return Err(ConfigError::invalid(
                "--duration",
                format!("must be at most {MAX_DURATION_MINUTES} minutes"),
            ));
        }
        if duration_minutes.saturating_mul(60) < interval_secs {
            return Err(ConfigError::invalid(
                "--duration",
                "duration must be at least one interval",
            ));
        }
        if timeout_secs == 0 {
            return Err(ConfigError::invalid("--timeout", "must be at least 1 second"));
        }
        if failure_threshold == 0 {
            return Err(ConfigError::invalid("--failure-threshold", "must be at least 1"));
        }
        if checkpoint_every == 0 {
            return Err(ConfigError::invalid("--checkpoint-every", "must be at least 1"));
        }

        let target = match (args.target, args.demo) {
            (Some(t), _) => {
                let url = Url::parse(&t).map_err(|e| ConfigError::invalid("--target", e.to_string()))?;
                if !matches!(url.scheme(), "ws" | "wss") {
                    return Err(ConfigError::invalid("--target", "expected a ws:// or wss:// URL"));
                }
                if url.password().is_some() || !url.username().is_empty() {
                    return Err(ConfigError::invalid(
                        "--target",
                        "put credentials in --username/--password, not the URL",
                    ));
                }
                t
            }
            (None, true) => "demo".to_string(),
            (None, false) => return Err(ConfigError::MissingValue("--target".into())),
        };

        let credentials = match args.username {
            Some(username) => {
                let password = args
                    .password
                    .or_else(|| env("WORKMON_PASSWORD"))
                    .ok_or_else(|| {
                        ConfigError::invalid(
                            "--password",
                            "credentialed mode needs --password or WORKMON_PASSWORD",
                        )
                    })?;
                Some(Credentials { username, password })
            }
            None => None,
        };
        let auth = match &credentials {
            Some(c) => AuthMode::Credentialed {
                username: c.username.clone(),
            },
            None => AuthMode::Trusted,
        };

        let output = args.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
        let checkpoint_path = args
            .resume_from
            .unwrap_or_else(|| CheckpointStore::default_path_for(&output));

        Ok(Self {
            identity: SessionIdentity {
                target,
                auth,
                duration_minutes,
                interval_secs,
            },
            credentials,
            output,
            checkpoint_path,
            timeout: Duration::from_secs(timeout_secs),
            options: SchedulerOptions {
                failure_threshold,
                checkpoint_every,
            },
            discard_checkpoint: args.discard_checkpoint,
            demo: args.demo,
            check: args.check,
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut w = Vec::new();
        if self.identity.interval_secs < 10 {
            w.push("interval under 10 seconds may load the monitored server".to_string());
        }
        if self.timeout.as_secs() >= self.identity.interval_secs {
            w.push(format!(
                "timeout ({}s) is not shorter than the interval ({}s); slow ticks will shift the schedule",
                self.timeout.as_secs(),
                self.identity.interval_secs
            ));
        }
        w
    }
}

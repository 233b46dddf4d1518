//! Entry point for workmon. Prints the status of a checkpoint once, or keeps
//! printing it in watch mode.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;

use workmon::render::render;
use workmon::status::{compute_status, read_checkpoint};
use workmon::watch::{watch, DEFAULT_WATCH_INTERVAL};

const USAGE: &str = "Usage: workmon [--watch|-w] [--interval SECONDS|-n SECONDS] CHECKPOINT";

struct ParsedArgs {
    checkpoint: PathBuf,
    watch: bool,
    interval: Duration,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let _prog = it.next();
    let mut checkpoint: Option<PathBuf> = None;
    let mut watch = false;
    let mut interval = DEFAULT_WATCH_INTERVAL;

    let parse_secs = |v: Option<String>| -> Result<Duration, String> {
        match v.as_deref().map(str::parse::<u64>) {
            Some(Ok(s)) if s > 0 => Ok(Duration::from_secs(s)),
            _ => Err(format!("--interval needs a positive number of seconds. {USAGE}")),
        }
    };

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--watch" | "-w" => watch = true,
            "--interval" | "-n" => interval = parse_secs(it.next())?,
            _ if arg.starts_with("--interval=") => {
                interval = parse_secs(arg.split_once('=').map(|(_, v)| v.to_string()))?
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown flag '{arg}'. {USAGE}"));
            }
            _ => {
                if checkpoint.is_none() {
                    checkpoint = Some(PathBuf::from(arg));
                } else {
                    return Err(format!("Unexpected argument. {USAGE}"));
                }
            }
        }
    }
    let checkpoint = checkpoint.ok_or_else(|| format!("Missing CHECKPOINT. {USAGE}"))?;
    Ok(ParsedArgs {
        checkpoint,
        watch,
        interval,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) if msg == USAGE => {
            println!("{msg}");
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };

    let result = if parsed.watch {
        run_watch(parsed).await
    } else {
        run_once(parsed).await
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("workmon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_once(args: ParsedArgs) -> anyhow::Result<()> {
    let cp = read_checkpoint(&args.checkpoint)
        .await
        .context("status unavailable")?;
    print!("{}", render(&compute_status(&cp, Utc::now())));
    Ok(())
}

async fn run_watch(args: ParsedArgs) -> anyhow::Result<()> {
    let mut reports = Box::pin(watch(args.checkpoint.clone(), args.interval));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            item = reports.next() => match item {
                Some(Ok(report)) => {
                    // clear screen, cursor home
                    print!("\x1b[2J\x1b[H{}", render(&report));
                    println!(
                        "\n(refreshing every {}s, Ctrl-C to stop)",
                        args.interval.as_secs()
                    );
                }
                Some(Err(e)) => eprintln!("workmon: {e}"),
                None => return Ok(()),
            },
            _ = &mut ctrl_c => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("workmon")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn watch_and_interval_forms() {
        let p = parse_args(args(&["-w", "-n", "5", "cp.json"])).unwrap();
        assert!(p.watch);
        assert_eq!(p.interval, Duration::from_secs(5));
        assert_eq!(p.checkpoint, PathBuf::from("cp.json"));

        let p = parse_args(args(&["--interval=12", "cp.json"])).unwrap();
        assert!(!p.watch);
        assert_eq!(p.interval, Duration::from_secs(12));

        let p = parse_args(args(&["cp.json"])).unwrap();
        assert_eq!(p.interval, DEFAULT_WATCH_INTERVAL);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["-n", "0", "cp.json"])).is_err());
        assert!(parse_args(args(&["--bogus", "cp.json"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
        assert_eq!(parse_args(args(&["-h"])).err().as_deref(), Some(USAGE));
    }
}

//! Plain-text rendering of a `StatusReport`.

use std::fmt::Write;

use crate::status::StatusReport;

fn hms(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}h {:02}m {:02}s", secs / 3600, secs % 3600 / 60, secs % 60)
}

fn num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

pub fn render(r: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Target:      {} [{}]", r.target, r.auth);
    let _ = writeln!(out, "Status:      {}", r.status);
    let _ = writeln!(
        out,
        "Plan:        {} min every {} s",
        r.duration_minutes, r.interval_secs
    );

    let _ = writeln!(out, "\nTimeline");
    let _ = writeln!(out, "  started:          {}", r.start_time.to_rfc3339());
    match r.last_checkpoint_time {
        Some(t) => {
            let _ = writeln!(out, "  last checkpoint:  {}", t.to_rfc3339());
        }
        None => {
            let _ = writeln!(out, "  last checkpoint:  never");
        }
    }
    let _ = writeln!(out, "  elapsed:          {}", hms(r.elapsed));
    if let Some(d) = r.since_checkpoint {
        let _ = writeln!(out, "  since checkpoint: {}", hms(d));
    }
    if r.stale {
        let _ = writeln!(
            out,
            "  WARNING: no checkpoint for over 5 minutes; the agent may have stopped"
        );
    }

    let _ = writeln!(out, "\nCollection");
    let _ = writeln!(
        out,
        "  samples:   {}/{} ({} remaining)",
        r.taken, r.planned, r.remaining
    );
    let _ = writeln!(out, "  successes: {}", r.successes);
    let _ = writeln!(out, "  errors:    {}", r.errors);
    for (kind, n) in &r.errors_by_kind {
        let _ = writeln!(out, "    {kind}: {n}");
    }
    match r.success_rate {
        Some(rate) => {
            let _ = writeln!(out, "  success:   {rate:.1}%");
        }
        None => {
            let _ = writeln!(out, "  success:   n/a");
        }
    }

    if !r.recent.is_empty() {
        let _ = writeln!(out, "\nRecent samples");
        for s in &r.recent {
            let detail = if s.is_success() {
                "OK".to_string()
            } else {
                format!(
                    "{}: {}",
                    s.error_kind.as_deref().unwrap_or("error"),
                    s.message.as_deref().unwrap_or("")
                )
            };
            let _ = writeln!(
                out,
                "  #{:<5} {}  {detail}",
                s.index + 1,
                s.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    if !r.fields.is_empty() {
        let _ = writeln!(out, "\nMetrics (successful samples)");
        let _ = writeln!(
            out,
            "  {:<34} {:>16} {:>16}  peak at",
            "field", "average", "peak"
        );
        for f in &r.fields {
            let name = format!("{}.{}", f.category, f.field);
            let _ = writeln!(
                out,
                "  {name:<34} {:>16} {:>16}  {}",
                num(f.avg),
                num(f.peak),
                f.peak_at.format("%H:%M:%S")
            );
        }
    }
    out
}

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::job::{JobDefinition, JobStatus};

fn format_age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

fn health(status: &JobStatus) -> &'static str {
    match (status.last_run_at, status.last_success_at, status.consecutive_error_count) {
        (None, _, _) => "⏳ pending",
        (_, _, n) if n > 0 => "❌ failing",
        (_, Some(_), _) => "✅ healthy",
        (Some(_), None, _) => "⏸️ waiting",
    }
}

/// Human-readable per-job table plus a one-line summary
pub fn render_status(jobs: &[JobDefinition], statuses: &HashMap<String, JobStatus>, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:<12} {:<12} {:>6}  {}\n",
        "JOB", "LAST RUN", "LAST OK", "ERRORS", "STATE"
    ));
    out.push_str(&format!("{}\n", "-".repeat(70)));

    let mut healthy = 0;
    for job in jobs {
        let status = statuses.get(&job.name).cloned().unwrap_or_default();
        if status.last_success_at.is_some() && status.consecutive_error_count == 0 {
            healthy += 1;
        }
        out.push_str(&format!(
            "{:<24} {:<12} {:<12} {:>6}  {}\n",
            job.name,
            format_age(status.last_run_at, now),
            format_age(status.last_success_at, now),
            status.consecutive_error_count,
            health(&status)
        ));
    }

    out.push_str(&format!("📊 {}/{} jobs healthy", healthy, jobs.len()));
    out
}

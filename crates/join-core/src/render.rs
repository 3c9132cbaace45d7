use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::cache::{CachePolicy, PolicyTable, RequestInfo};
use crate::config::Config;
use crate::dashboard::Greeting;
use crate::stats::{BoardStatus, TaskSummary};
use crate::theme::ApplyReport;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn print_greeting(&self, greeting: &Greeting) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match &greeting.name {
            Some(name) => writeln!(out, "{} {}", greeting.headline(), self.paint(name, "1"))?,
            None => writeln!(out, "{}", greeting.headline())?,
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, summary))]
    pub fn print_summary(&self, summary: &TaskSummary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_summary(&mut out, summary, |text, code| self.paint(text, code))
    }

    #[tracing::instrument(skip(self, table))]
    pub fn print_policies(&self, table: &PolicyTable) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["Policy", "Match", "Strategy", "Bucket", "Max", "Max age", "Timeout"]
            .map(str::to_string)
            .to_vec();
        let rows = table.policies().iter().map(policy_row).collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_route(&self, info: &RequestInfo, policy: &CachePolicy) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let row = policy_row(policy);
        writeln!(out, "url       {}", info.url)?;
        writeln!(out, "policy    {}", self.paint(policy.name, "33"))?;
        writeln!(out, "strategy  {}", row[2])?;
        writeln!(out, "bucket    {}", row[3])?;
        writeln!(out, "entries   {}", row[4])?;
        writeln!(out, "max age   {}", row[5])?;
        writeln!(out, "timeout   {}", row[6])?;
        Ok(())
    }

    pub fn print_theme(&self, report: &ApplyReport) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "preference  {}", report.preference)?;
        writeln!(out, "resolved    {}", report.resolved.as_str())?;
        writeln!(out, "class       {}", report.resolved.as_class())?;
        writeln!(out, "toggle      {}", report.preference.toggle_label())?;
        for (step, error) in &report.failures {
            writeln!(out, "{}", self.paint(&format!("failed {step:?}: {error}"), "31"))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_summary<W: Write>(
    mut out: W,
    summary: &TaskSummary,
    paint: impl Fn(&str, &str) -> String,
) -> anyhow::Result<()> {
    let headers = vec!["Status".to_string(), "Tasks".to_string()];
    let mut rows: Vec<Vec<String>> = [
        BoardStatus::Todo,
        BoardStatus::InProgress,
        BoardStatus::AwaitingFeedback,
        BoardStatus::Done,
    ]
    .into_iter()
    .map(|status| vec![status.label().to_string(), summary.count(status).to_string()])
    .collect();
    rows.push(vec!["Total".to_string(), summary.total.to_string()]);

    let urgent = summary.urgent.to_string();
    let urgent = if summary.urgent > 0 { paint(&urgent, "31") } else { urgent };
    rows.push(vec!["Urgent".to_string(), urgent]);

    let deadline = summary
        .next_deadline
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "No upcoming deadline".to_string());
    rows.push(vec!["Deadline".to_string(), deadline]);

    write_table(&mut out, headers, rows)
}

fn policy_row(policy: &CachePolicy) -> Vec<String> {
    let cached = policy.bucket.is_some();
    vec![
        policy.name.to_string(),
        policy.matcher.describe(),
        policy.strategy.as_str().to_string(),
        policy.bucket.clone().unwrap_or_else(|| "-".to_string()),
        if cached { policy.max_entries.to_string() } else { "-".to_string() },
        if cached { format_age(policy.max_age.as_secs()) } else { "-".to_string() },
        policy
            .network_timeout
            .map(|t| format!("{} ms", t.as_millis()))
            .unwrap_or_else(|| "-".to_string()),
    ]
}

fn format_age(secs: u64) -> String {
    const DAY: u64 = 24 * 60 * 60;
    if secs >= DAY && secs % DAY == 0 {
        format!("{}d", secs / DAY)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        out.push(ch);
    }

    out
}

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use join_shared::{ResolvedTheme, ThemePreference};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "join",
    version,
    about = "Join: board statistics, theme and offline-cache tooling",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "joinrc", global = true)]
    pub joinrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Board statistics and greeting for one user.
    Summary {
        #[arg(long = "user")]
        user: Option<String>,

        /// IANA zone used for the greeting, e.g. Europe/Berlin.
        #[arg(long = "timezone")]
        timezone: Option<String>,
    },
    /// Apply a theme preference and show how it resolves.
    Theme {
        preference: Option<ThemePreference>,

        /// OS colour scheme to resolve `device` against.
        #[arg(long = "system", value_parser = parse_resolved)]
        system: Option<ResolvedTheme>,

        /// Advance the stored preference one step.
        #[arg(long = "next", conflicts_with = "preference")]
        next: bool,
    },
    /// Show which cache policy the worker applies to a URL.
    Route {
        url: String,

        #[arg(long = "destination", default_value = "")]
        destination: String,

        #[arg(long = "navigate")]
        navigate: bool,
    },
    /// List the worker's cache policy table.
    Policies,
}

impl Default for Command {
    fn default() -> Self {
        Self::Summary {
            user: None,
            timezone: None,
        }
    }
}

fn parse_resolved(raw: &str) -> Result<ResolvedTheme, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(ResolvedTheme::Light),
        "dark" => Ok(ResolvedTheme::Dark),
        other => Err(format!("expected light or dark, got: {other}")),
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.key=value` (or `rc.key:value`) words out of the argument
/// list before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }
        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["join", "rc.layout.breakpoint=800", "policies", "rc.color:off"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["join", "policies"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.layout.breakpoint".to_string(), "800".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn theme_subcommand_parses_preference_and_system() {
        let cli = GlobalCli::parse_from(["join", "theme", "system", "--system", "dark"]);
        assert_eq!(
            cli.command,
            Some(Command::Theme {
                preference: Some(ThemePreference::Device),
                system: Some(ResolvedTheme::Dark),
                next: false,
            })
        );
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = GlobalCli::parse_from(["join", "route", "https://join.app/", "--navigate", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Command::Route { navigate: true, .. })));
    }

    #[test]
    fn keyval_requires_equals() {
        assert!("color".parse::<KeyVal>().is_err());
        let kv: KeyVal = " color = off ".parse().expect("parse");
        assert_eq!((kv.key.as_str(), kv.value.as_str()), ("color", "off"));
    }
}

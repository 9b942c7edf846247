//! CLI - Command Line Interface for aniplay
//!
//! Designed for scripting and automation. Every browse and playback action
//! is a subcommand, and all output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Browse the catalog
//! aniplay top --window week --json
//! aniplay episodes one-piece-100
//!
//! # Resolve a stream and play it
//! aniplay resolve one-piece-100 --episode 3 --variant dub
//! aniplay play one-piece-100 --episode 3
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;

use crate::models::Variant;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Title or episode not found
    NotFound = 4,
    /// Nothing playable resolved (no episodes, servers, or stream link)
    NoStreams = 5,
    /// Player or pipeline failure
    PlaybackFailed = 6,
    /// Stream container cannot be decoded
    Unsupported = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// aniplay - Terminal client for browsing and playing anime streams
#[derive(Parser, Debug)]
#[command(
    name = "aniplay",
    version,
    about = "Terminal client for browsing and playing anime streams",
    long_about = "Browse a streaming catalog, resolve episode streams through \
                  the server cascade, and play them in mpv, VLC, or IINA.\n\n\
                  All subcommands emit JSON with --json for scripting.",
    after_help = "EXAMPLES:\n\
                  aniplay top --window week           Weekly top titles\n\
                  aniplay episodes one-piece-100      List episodes\n\
                  aniplay resolve one-piece-100 -e 3  Resolve a stream URL\n\
                  aniplay play one-piece-100 -e 3     Play in a local player"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Catalog API base URL (overrides config)
    #[arg(long, short = 'b', global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the top titles for a time window
    #[command(visible_alias = "t")]
    Top(TopCmd),

    /// Get details for a title
    #[command(visible_alias = "i")]
    Info(InfoCmd),

    /// List the episodes of a title
    #[command(visible_alias = "ep")]
    Episodes(EpisodesCmd),

    /// List the streaming servers for an episode
    #[command(visible_alias = "sv")]
    Servers(ServersCmd),

    /// Fetch the stream manifest from one server
    #[command(visible_alias = "m")]
    Manifest(ManifestCmd),

    /// Run the full resolution cascade for a title
    #[command(visible_alias = "r")]
    Resolve(ResolveCmd),

    /// List or fetch subtitle tracks for an episode
    #[command(visible_alias = "sub")]
    Subtitles(SubtitlesCmd),

    /// Resolve a stream and play it in a local player
    #[command(visible_alias = "p")]
    Play(PlayCmd),
}

// =============================================================================
// Shared argument enums
// =============================================================================

/// Output variant selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariantArg {
    /// Original audio with subtitles (default)
    #[default]
    Sub,
    /// Dubbed audio
    Dub,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Variant {
        match arg {
            VariantArg::Sub => Variant::Sub,
            VariantArg::Dub => Variant::Dub,
        }
    }
}

/// Time window for the top listing
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopWindow {
    /// Today's top titles
    #[default]
    Today,
    /// This week's top titles
    Week,
    /// This month's top titles
    Month,
}

// =============================================================================
// Browse Commands
// =============================================================================

/// Show the top titles for a time window
#[derive(Args, Debug)]
pub struct TopCmd {
    /// Time window for the ranking
    #[arg(long, short = 'w', value_enum, default_value = "today")]
    pub window: TopWindow,

    /// Maximum number of results
    #[arg(long, short = 'l', default_value = "10")]
    pub limit: usize,
}

/// Get detailed information about a title
#[derive(Args, Debug)]
pub struct InfoCmd {
    /// Title id (e.g., one-piece-100)
    #[arg(required = true)]
    pub title_id: String,
}

/// List the episodes of a title
#[derive(Args, Debug)]
pub struct EpisodesCmd {
    /// Title id (e.g., one-piece-100)
    #[arg(required = true)]
    pub title_id: String,

    /// Skip filler episodes
    #[arg(long)]
    pub no_filler: bool,
}

/// List the streaming servers for an episode
#[derive(Args, Debug)]
pub struct ServersCmd {
    /// Episode id from `episodes` output (e.g., one-piece-100?ep=2142)
    #[arg(required = true)]
    pub episode_id: String,

    /// Only show servers for one variant
    #[arg(long, short = 'v', value_enum)]
    pub variant: Option<VariantArg>,
}

/// Fetch the stream manifest from one server
#[derive(Args, Debug)]
pub struct ManifestCmd {
    /// Episode id from `episodes` output
    #[arg(required = true)]
    pub episode_id: String,

    /// Server name (defaults to the configured preference)
    #[arg(long, short = 's')]
    pub server: Option<String>,

    /// Output variant
    #[arg(long, short = 'v', value_enum)]
    pub variant: Option<VariantArg>,
}

// =============================================================================
// Resolve Command
// =============================================================================

/// Run the full resolution cascade: episodes -> servers -> manifest
#[derive(Args, Debug)]
pub struct ResolveCmd {
    /// Title id (e.g., one-piece-100)
    #[arg(required = true)]
    pub title_id: String,

    /// Episode number (defaults to the first episode)
    #[arg(long, short = 'e')]
    pub episode: Option<u32>,

    /// Output variant
    #[arg(long, short = 'v', value_enum)]
    pub variant: Option<VariantArg>,

    /// Server tried first, overriding the configured preference
    #[arg(long, short = 's')]
    pub server: Option<String>,

    /// Fail instead of falling back to a server of the other variant
    #[arg(long)]
    pub strict: bool,
}

// =============================================================================
// Subtitles Command
// =============================================================================

/// List or fetch the subtitle tracks of an episode's stream
#[derive(Args, Debug)]
pub struct SubtitlesCmd {
    /// Episode id from `episodes` output
    #[arg(required = true)]
    pub episode_id: String,

    /// Server name (defaults to the configured preference)
    #[arg(long, short = 's')]
    pub server: Option<String>,

    /// Output variant
    #[arg(long, short = 'v', value_enum)]
    pub variant: Option<VariantArg>,

    /// Download the payload of one track instead of listing
    #[arg(long, short = 'i')]
    pub index: Option<usize>,
}

// =============================================================================
// Play Command
// =============================================================================

/// Resolve a stream and hand it to a local player
#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Title id (e.g., one-piece-100)
    #[arg(required = true)]
    pub title_id: String,

    /// Episode number (defaults to the first episode)
    #[arg(long, short = 'e')]
    pub episode: Option<u32>,

    /// Output variant
    #[arg(long, short = 'v', value_enum)]
    pub variant: Option<VariantArg>,

    /// Server tried first, overriding the configured preference
    #[arg(long, short = 's')]
    pub server: Option<String>,

    /// Player to use (mpv, vlc, iina); probed when omitted
    #[arg(long, short = 'p')]
    pub player: Option<String>,

    /// Start position in seconds, or MM:SS / HH:MM:SS
    #[arg(long)]
    pub start: Option<String>,

    /// Don't load the default subtitle track into the player
    #[arg(long)]
    pub no_subtitle: bool,
}

impl PlayCmd {
    /// Parse the start offset argument
    pub fn start_offset(&self) -> Result<Option<Duration>, &'static str> {
        match self.start.as_deref() {
            None => Ok(None),
            Some(raw) => parse_start(raw)
                .map(Some)
                .ok_or("Invalid start position (expected seconds, MM:SS, or HH:MM:SS)"),
        }
    }
}

/// Parse a start offset: plain seconds, MM:SS, or HH:MM:SS
pub fn parse_start(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let parts: Vec<&str> = s.split(':').collect();
    let secs = match parts.len() {
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            mins * 60 + secs
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: u64 = parts[2].parse().ok()?;
            hours * 3600 + mins * 60 + secs
        }
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            // For non-JSON, caller should handle formatting
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print raw JSON (already formatted)
    pub fn print_json<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Id Validation
// =============================================================================

fn title_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap())
}

fn episode_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*(?:\?ep=\d+)?$").unwrap())
}

/// Validate a title id slug (lowercase words joined by hyphens)
pub fn validate_title_id(id: &str) -> Result<&str, &'static str> {
    if title_id_pattern().is_match(id) {
        Ok(id)
    } else {
        Err("Invalid title id (expected a slug like one-piece-100)")
    }
}

/// Validate an episode id (a title slug with an optional ?ep= suffix)
pub fn validate_episode_id(id: &str) -> Result<&str, &'static str> {
    if episode_id_pattern().is_match(id) {
        Ok(id)
    } else {
        Err("Invalid episode id (expected a slug like one-piece-100?ep=2142)")
    }
}

// =============================================================================
// Tests
// =============================================================================

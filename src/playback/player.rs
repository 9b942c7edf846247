//! External player handoff - mpv/VLC/IINA playback support
//!
//! Hands a resolved stream URL to a locally installed player instead of
//! driving the in-process pipeline. All supported players decode segmented
//! streams natively, so their presence also enables the native path in the
//! pipeline's capability probe.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};

/// Supported external players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerKind {
    /// mpv media player (default)
    #[default]
    Mpv,
    /// VLC media player
    Vlc,
    /// IINA, macOS only
    Iina,
}

impl PlayerKind {
    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerKind::Mpv => "mpv",
            PlayerKind::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerKind::Iina => {
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/IINA.app").exists() {
                    return "/Applications/IINA.app/Contents/MacOS/iina-cli";
                }
                "iina"
            }
        }
    }

    /// Get a display name for this player
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerKind::Mpv => "mpv",
            PlayerKind::Vlc => "VLC",
            PlayerKind::Iina => "IINA",
        }
    }

    /// Parse a configured player name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mpv" => Some(PlayerKind::Mpv),
            "vlc" => Some(PlayerKind::Vlc),
            "iina" => Some(PlayerKind::Iina),
            _ => None,
        }
    }

    /// All of these ship an HLS demuxer
    pub fn supports_native_hls(&self) -> bool {
        true
    }
}

impl std::fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Errors from external player operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
}

/// Extras passed along with the stream URL
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Remote subtitle track to load alongside the stream
    pub subtitle_url: Option<String>,
    /// Start offset into the stream
    pub start: Option<Duration>,
    /// Title to show in the player window
    pub title: Option<String>,
}

/// External player for resolved streams
pub struct LocalPlayer {
    kind: PlayerKind,
}

impl LocalPlayer {
    pub fn new(kind: PlayerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }

    /// Resolve a player from a configured name, or probe for the first
    /// available one
    pub async fn detect(preferred: Option<&str>) -> Option<Self> {
        let candidates: Vec<PlayerKind> = match preferred.and_then(PlayerKind::from_name) {
            Some(kind) => vec![kind],
            None => vec![PlayerKind::Mpv, PlayerKind::Vlc, PlayerKind::Iina],
        };
        for kind in candidates {
            let player = Self::new(kind);
            if player.is_available().await {
                return Some(player);
            }
        }
        None
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let cmd = self.kind.command();

        // If it's a full path (macOS app bundle), check if it exists
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Spawn the player on a stream URL
    pub async fn play(&self, stream_url: &str, options: &PlayOptions) -> Result<Child, PlayerError> {
        let mut cmd = Command::new(self.kind.command());
        cmd.arg(stream_url);

        match self.kind {
            PlayerKind::Mpv => {
                if let Some(sub) = &options.subtitle_url {
                    cmd.arg(format!("--sub-file={}", sub));
                }
                if let Some(start) = options.start {
                    cmd.arg(format!("--start={}", start.as_secs()));
                }
                if let Some(title) = &options.title {
                    cmd.arg(format!("--force-media-title={}", title));
                }
                cmd.arg("--force-window=immediate");
            }
            PlayerKind::Vlc => {
                if let Some(sub) = &options.subtitle_url {
                    cmd.arg("--sub-file").arg(sub);
                }
                if let Some(start) = options.start {
                    cmd.arg(format!("--start-time={}", start.as_secs()));
                }
                if let Some(title) = &options.title {
                    cmd.arg("--meta-title").arg(title);
                }
                cmd.arg("--no-video-title-show");
            }
            PlayerKind::Iina => {
                // iina-cli forwards --mpv-* flags to the embedded mpv
                if let Some(sub) = &options.subtitle_url {
                    cmd.arg(format!("--mpv-sub-file={}", sub));
                }
                if let Some(start) = options.start {
                    cmd.arg(format!("--mpv-start={}", start.as_secs()));
                }
                if let Some(title) = &options.title {
                    cmd.arg(format!("--mpv-force-media-title={}", title));
                }
            }
        }

        // Don't capture output - let the player own the terminal
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.kind.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })
    }

    /// Spawn the player and wait for it to close
    pub async fn play_and_wait(
        &self,
        stream_url: &str,
        options: &PlayOptions,
    ) -> Result<(), PlayerError> {
        let mut child = self.play(stream_url, options).await?;
        let _ = child.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_kind_command() {
        assert_eq!(PlayerKind::Mpv.command(), "mpv");
        // On macOS with VLC installed, returns the bundle path; otherwise "vlc"
        let vlc_cmd = PlayerKind::Vlc.command();
        assert!(vlc_cmd == "vlc" || vlc_cmd == "/Applications/VLC.app/Contents/MacOS/VLC");
    }

    #[test]
    fn test_player_kind_display() {
        assert_eq!(PlayerKind::Mpv.to_string(), "mpv");
        assert_eq!(PlayerKind::Vlc.to_string(), "VLC");
        assert_eq!(PlayerKind::Iina.to_string(), "IINA");
    }

    #[test]
    fn test_player_kind_from_name() {
        assert_eq!(PlayerKind::from_name("mpv"), Some(PlayerKind::Mpv));
        assert_eq!(PlayerKind::from_name("VLC"), Some(PlayerKind::Vlc));
        assert_eq!(PlayerKind::from_name("wmp"), None);
    }

    #[test]
    fn test_default_player() {
        assert_eq!(PlayerKind::default(), PlayerKind::Mpv);
    }

    #[test]
    fn test_all_players_decode_hls() {
        for kind in [PlayerKind::Mpv, PlayerKind::Vlc, PlayerKind::Iina] {
            assert!(kind.supports_native_hls());
        }
    }
}

//! Configuration management for aniplay
//!
//! Handles config file loading/saving and default playback preferences.
//! Config is stored at ~/.config/aniplay/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::api::catalog::DEFAULT_BASE_URL;
use crate::models::Variant;
use crate::playback::selector::{FallbackPolicy, SelectionPolicy};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Catalog API base URL override
    pub api_base_url: Option<String>,
    /// Server tried first when a list arrives
    pub preferred_server: Option<String>,
    /// Default output variant (sub or dub)
    pub default_variant: Option<Variant>,
    /// Refuse cross-variant fallback when no server matches
    pub strict_variant: Option<bool>,
    /// External player to prefer (mpv, vlc, iina)
    pub player: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/aniplay/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("aniplay").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Base URL for the catalog API, falling back to the bundled default
    pub fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Variant used when none is given on the command line
    pub fn variant(&self) -> Variant {
        self.default_variant.unwrap_or_default()
    }

    /// Server selection policy assembled from the configured preferences
    pub fn selection_policy(&self) -> SelectionPolicy {
        let mut policy = SelectionPolicy::default();
        if let Some(name) = &self.preferred_server {
            policy.preferred_server = name.clone();
        }
        if self.strict_variant.unwrap_or(false) {
            policy.fallback = FallbackPolicy::Strict;
        }
        policy
    }
}

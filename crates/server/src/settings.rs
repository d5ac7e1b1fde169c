//! Persisted configuration and the live player-list removal policy.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde::Deserialize;
use skintrack_engine::tick::Tick;

/// Server settings, read from a JSON file. Every field has a default so a
/// partial (or missing) file is fine.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Global default for hiding NPCs from the tab list after their skin
    /// has loaded. Individual NPCs may override it.
    pub remove_players_from_player_list: bool,
    /// Ticks between follow-up player-list removal packets.
    pub packet_delay_ticks: Tick,
    /// How many removal packets are sent per viewer cycle.
    pub remove_packet_retries: u8,
    /// Block radius of the periodic nearby-viewer sweep.
    pub nearby_radius: f64,
    /// Ticks between nearby-viewer sweeps.
    pub nearby_sweep_ticks: Tick,
    /// Wall-clock duration of one server tick.
    pub tick_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remove_players_from_player_list: true,
            packet_delay_ticks: 1,
            remove_packet_retries: 2,
            nearby_radius: 64.0,
            nearby_sweep_ticks: 20,
            tick_millis: 50,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Process-wide removal default, readable from any follow-up at fire time.
#[derive(Debug)]
pub struct PlayerListPolicy {
    remove_by_default: AtomicBool,
}

impl PlayerListPolicy {
    pub fn new(remove_by_default: bool) -> Self {
        Self {
            remove_by_default: AtomicBool::new(remove_by_default),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.remove_players_from_player_list)
    }

    pub fn remove_by_default(&self) -> bool {
        self.remove_by_default.load(Ordering::Relaxed)
    }

    pub fn set_remove_by_default(&self, remove: bool) {
        self.remove_by_default.store(remove, Ordering::Relaxed);
    }

    /// The per-entity override, when present, wins over the global default.
    pub fn should_remove(&self, entity_override: Option<bool>) -> bool {
        entity_override.unwrap_or_else(|| self.remove_by_default())
    }
}

impl Default for PlayerListPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

//! Resolved skin identities and the synchronous resolution cache.
//!
//! A [`SkinRecord`] is an immutable snapshot. Changing an NPC's skin never
//! edits a record in place: the tracker asks the resolver again and swaps its
//! `Arc<SkinRecord>` wholesale, so a reader never sees a half-updated skin.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

/// Name of the record returned when nothing better is cached.
pub const FALLBACK_SKIN_NAME: &str = "steve";

/// Resolved visual identity of one tracked entity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SkinRecord {
    /// Profile uuid the texture belongs to.
    pub identity: Uuid,
    /// Skin (profile) name the record was resolved from.
    pub name: String,
    /// Base64 `textures` property payload.
    pub texture: String,
    /// Mojang signature over `texture`. `None` for unsigned skins.
    #[serde(default)]
    pub signature: Option<String>,
}

impl SkinRecord {
    pub fn new(identity: Uuid, name: impl Into<String>, texture: impl Into<String>) -> Self {
        Self {
            identity,
            name: name.into(),
            texture: texture.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Signed skins are accepted by vanilla clients in online mode.
    pub fn is_signed(&self) -> bool {
        self.signature.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Unsigned default skin, always available.
    pub fn fallback() -> Self {
        Self::new(
            Uuid::new_v3(&Uuid::NAMESPACE_URL, b"OfflinePlayer:steve"),
            FALLBACK_SKIN_NAME,
            String::new(),
        )
    }
}

/// Turns a skin name into a record. Must answer synchronously; a resolver
/// that has nothing cached returns its fallback rather than blocking.
pub trait SkinResolver: Send + Sync {
    fn resolve(&self, skin_name: &str) -> Arc<SkinRecord>;
}

/// In-memory skin cache keyed by lower-cased skin name.
pub struct SkinCache {
    skins: DashMap<String, Arc<SkinRecord>>,
    fallback: Arc<SkinRecord>,
}

impl SkinCache {
    pub fn new() -> Self {
        Self::with_fallback(SkinRecord::fallback())
    }

    pub fn with_fallback(fallback: SkinRecord) -> Self {
        Self {
            skins: DashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Load records from a JSON array of `SkinRecord`s. A missing file
    /// yields an empty cache.
    pub fn load_from(path: &Path) -> Result<Self> {
        let cache = Self::new();
        if !path.exists() {
            tracing::info!("No skin file at {}, using fallback skin only", path.display());
            return Ok(cache);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading skins from {}", path.display()))?;
        let records: Vec<SkinRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parsing skins in {}", path.display()))?;
        for record in records {
            cache.insert(record);
        }
        tracing::info!("Loaded {} skins from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Insert or supersede the record for `record.name`.
    pub fn insert(&self, record: SkinRecord) {
        self.skins
            .insert(record.name.to_lowercase(), Arc::new(record));
    }

    pub fn len(&self) -> usize {
        self.skins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skins.is_empty()
    }
}

impl SkinResolver for SkinCache {
    fn resolve(&self, skin_name: &str) -> Arc<SkinRecord> {
        match self.skins.get(&skin_name.to_lowercase()) {
            Some(record) => Arc::clone(record.value()),
            None => {
                tracing::debug!("Skin '{}' not cached, using fallback", skin_name);
                Arc::clone(&self.fallback)
            }
        }
    }
}

impl Default for SkinCache {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tagged asset collections.
//!
//! Images, videos, audios and 3D assets on an experience are stored as
//! ordered lists of `(kind, url)` pairs rather than maps. Duplicate kinds can
//! exist transiently while a reconciliation pass is in flight; the operations
//! here are written so that re-applying the same mutation is a no-op and a
//! finished pass leaves at most one entry per exclusive kind.

use serde::{Deserialize, Serialize};

// ============================================================================
// Kind tags
// ============================================================================

/// Canonical kind tags written by the update path and the media pipeline.
/// Unknown tags are accepted everywhere for forward compatibility.
pub mod kinds {
    /// Source asset as uploaded by the caller.
    pub const ORIGINAL: &str = "original";
    /// Raw caller upload kept alongside a cleaned-up original.
    pub const ORIGINAL_INPUT: &str = "original_input";
    /// Spawn (intro) image for ground experiences.
    pub const SPAWN: &str = "spawn";
    /// Pipeline-compressed primary asset.
    pub const COMPRESSED: &str = "compressed";
    /// Compressed spawn image.
    pub const COMPRESSED_SPAWN: &str = "compressed_spawn";
    /// Color-corrected compressed image, also used as campaign thumbnail.
    pub const COLOR_COMPRESSED: &str = "color_compressed";
    /// Standard-quality compressed image.
    pub const STD_COMPRESSED: &str = "std_compressed";
    /// Feature/preview image.
    pub const FEATURE_IMAGE: &str = "feature_image";
    /// Feature-database matching image.
    pub const FDB: &str = "fdb";
    /// Green-screen source image before keying.
    pub const ORIGINAL_GREEN_SCREEN: &str = "original_green_screen";
    /// Subject cut-out photo.
    pub const MASKED_PHOTO: &str = "masked_photo";
    /// Compressed subject cut-out photo.
    pub const COMPRESSED_MASKED_PHOTO: &str = "compressed_masked_photo";
    /// Compressed playback rendition of a video.
    pub const COMPRESSED_PLAYBACK: &str = "compressed_playback";
    /// Plain playback rendition.
    pub const PLAYBACK: &str = "playback";
    /// HLS manifest.
    pub const HLS: &str = "hls";
    /// DASH manifest.
    pub const DASH: &str = "dash";
    /// WebM rendition.
    pub const WEBM: &str = "webm";
    /// Alpha/mask video.
    pub const MASK: &str = "mask";
    /// Generated green-screen video.
    pub const GREEN_SCREEN: &str = "green_screen";
    /// Source GLB model.
    pub const ORIGINAL_GLB: &str = "original_glb";
    /// Source USDZ model.
    pub const ORIGINAL_USDZ: &str = "original_usdz";
    /// Source OBJ model.
    pub const ORIGINAL_OBJ: &str = "original_obj";
    /// Blender project file.
    pub const BLEND_FILE: &str = "blend_file";
    /// Model texture file.
    pub const TEXTURE_FILE: &str = "texture_file";
}

/// Derived image kinds that go stale when the original image changes.
pub const IMAGE_DERIVED_KINDS: &[&str] = &[
    kinds::COMPRESSED,
    kinds::COMPRESSED_SPAWN,
    kinds::COLOR_COMPRESSED,
    kinds::STD_COMPRESSED,
    kinds::FEATURE_IMAGE,
    kinds::FDB,
];

/// Derived image kinds that go stale when the spawn image changes.
pub const SPAWN_DERIVED_KINDS: &[&str] = &[
    kinds::COMPRESSED,
    kinds::COMPRESSED_SPAWN,
    kinds::COLOR_COMPRESSED,
    kinds::STD_COMPRESSED,
    kinds::FEATURE_IMAGE,
];

/// Every spawn-related image kind, removed when the spawn image is deleted.
pub const SPAWN_KINDS: &[&str] = &[kinds::SPAWN, kinds::COMPRESSED_SPAWN];

/// Derived video kinds that go stale when the original video changes.
pub const VIDEO_DERIVED_KINDS: &[&str] = &[
    kinds::MASK,
    kinds::COMPRESSED,
    kinds::HLS,
    kinds::DASH,
    kinds::COMPRESSED_PLAYBACK,
    kinds::WEBM,
];

/// Derived video kinds that go stale when the mask video changes. The mask
/// entry itself is replaced in place, so it is not in this list.
pub const MASK_DERIVED_KINDS: &[&str] = &[
    kinds::COMPRESSED,
    kinds::HLS,
    kinds::DASH,
    kinds::COMPRESSED_PLAYBACK,
    kinds::WEBM,
];

// ============================================================================
// Asset set
// ============================================================================

/// One tagged URL. Serialized with the short `k`/`v` names the documents use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Kind tag, e.g. `original` or `hls`.
    #[serde(rename = "k")]
    pub kind: String,
    /// Asset URL.
    #[serde(rename = "v")]
    pub url: String,
}

impl AssetEntry {
    /// Build an entry from any kind/url pair.
    pub fn new(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
        }
    }
}

/// Ordered list of tagged URLs with idempotent merge operations.
///
/// Serializes as a plain JSON array so the document layout stays `[{k, v}]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetSet(pub Vec<AssetEntry>);

impl AssetSet {
    /// Empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of entries, counting transient duplicates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// URL of the first entry with the given kind, if any.
    pub fn url_of(&self, kind: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.url.as_str())
    }

    /// Whether any entry carries the given kind.
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    /// Replace the single entry matching `kind` in place, else append.
    ///
    /// Used for source kinds like `original` that must never duplicate.
    pub fn upsert_by_kind(&mut self, kind: &str, url: &str) {
        match self.0.iter_mut().find(|e| e.kind == kind) {
            Some(entry) => entry.url = url.to_string(),
            None => self.0.push(AssetEntry::new(kind, url)),
        }
    }

    /// Append an entry only when no entry with that kind exists.
    ///
    /// Used when reconciling pipeline-produced derived assets so duplicate
    /// completion delivery leaves the set unchanged.
    pub fn add_if_absent(&mut self, kind: &str, url: &str) {
        if !self.contains_kind(kind) {
            self.0.push(AssetEntry::new(kind, url));
        }
    }

    /// Remove every entry whose kind is in `kinds`.
    pub fn remove_kinds(&mut self, kinds: &[&str]) {
        self.0.retain(|e| !kinds.contains(&e.kind.as_str()));
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetEntry> {
        self.0.iter()
    }
}

impl From<Vec<AssetEntry>> for AssetSet {
    fn from(entries: Vec<AssetEntry>) -> Self {
        Self(entries)
    }
}

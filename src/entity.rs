//! Entity identifiers and song catalog records.
//!
//! Entities are created once while the knowledge base is built and never
//! change afterwards. The identifier is opaque: in practice it is a
//! MusicBrainz recording id, but nothing in the crate relies on that.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable, opaque identifier of one song.
///
/// Cloning is cheap (shared string), so ids can be stored in every index
/// bucket without duplicating the text.
///
/// # Examples
///
/// ```
/// use tastekb::EntityId;
///
/// let id = EntityId::from("0b7a1c3e-song");
/// assert_eq!(id.as_str(), "0b7a1c3e-song");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Arc<str>);

impl EntityId {
    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s.trim()))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for EntityId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Catalog metadata for a song.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Song {
    /// Performing artist.
    #[serde(default)]
    pub artist: String,
    /// Track title.
    #[serde(default)]
    pub track: String,
    /// Album title.
    #[serde(default)]
    pub album: String,
}

impl Song {
    /// Creates a catalog record.
    #[must_use]
    pub fn new(artist: impl Into<String>, track: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            track: track.into(),
            album: album.into(),
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artist = if self.artist.is_empty() { "Unknown" } else { &self.artist };
        let track = if self.track.is_empty() { "Unknown" } else { &self.track };
        write!(f, "{artist} - {track}")
    }
}

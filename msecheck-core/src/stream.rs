//! Stream fixture descriptors and the catalog tests draw them from.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of elementary stream carried by a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Byte and time placement of one media segment inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub offset: u64,
    pub size: u64,
    pub start: f64,
    pub duration: f64,
}

impl SegmentInfo {
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    pub fn end_time(&self) -> f64 {
        self.start + self.duration
    }
}

/// Immutable description of a media resource used as test input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub codec: String,
    pub mime_type: String,
    pub kind: MediaKind,
    pub url: String,
    /// Total resource size in bytes.
    pub size: u64,
    /// Nominal duration in seconds.
    pub duration: f64,
    /// Length of the initialization segment at the start of the resource.
    pub init_size: u64,
    #[serde(default)]
    pub segments: Vec<SegmentInfo>,
    /// Named expectations for specific test variants, e.g. `"seek_duration"`.
    #[serde(default)]
    pub expected: BTreeMap<String, f64>,
}

impl StreamDescriptor {
    /// Full mime type including the codec parameter.
    pub fn type_string(&self) -> String {
        format!("{}; codecs=\"{}\"", self.mime_type, self.codec)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Looks up a named expectation.
    pub fn expected(&self, key: &str) -> Option<f64> {
        self.expected.get(key).copied()
    }

    /// Average media segment duration, if a segment table is present.
    pub fn segment_duration(&self) -> Option<f64> {
        if self.segments.is_empty() {
            return None;
        }
        let total: f64 = self.segments.iter().map(|s| s.duration).sum();
        Some(total / self.segments.len() as f64)
    }

    /// Maps a presentation time to the byte offset a source should resume at.
    ///
    /// With a segment table this is the start of the segment containing
    /// `time`; otherwise the offset is interpolated over the media region.
    pub fn offset_for_time(&self, time: f64) -> u64 {
        if time <= 0.0 {
            return self.init_size;
        }

        if !self.segments.is_empty() {
            return self
                .segments
                .iter()
                .find(|s| time < s.end_time())
                .map(|s| s.offset)
                .unwrap_or(self.size);
        }

        if self.duration <= 0.0 {
            return self.init_size;
        }
        let media_size = self.size.saturating_sub(self.init_size);
        let ratio = (time / self.duration).min(1.0);
        self.init_size + (media_size as f64 * ratio) as u64
    }
}

/// Errors raised while loading a stream catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Role name to descriptor mapping shared by every test in a run.
#[derive(Debug, Clone, Default)]
pub struct StreamCatalog {
    streams: HashMap<String, Arc<StreamDescriptor>>,
}

impl StreamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>, descriptor: StreamDescriptor) {
        self.streams.insert(role.into(), Arc::new(descriptor));
    }

    pub fn get(&self, role: &str) -> Option<Arc<StreamDescriptor>> {
        self.streams.get(role).cloned()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Role names in sorted order.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.streams.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Parses a JSON object of `role -> descriptor`.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Parse` - If the document is not a valid catalog
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: HashMap<String, StreamDescriptor> = serde_json::from_str(json)?;
        Ok(Self {
            streams: raw.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        })
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Io` - If the file cannot be read
    /// - `CatalogError::Parse` - If the file is not a valid catalog
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes the catalog back to JSON.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Parse` - If serialization fails
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let raw: BTreeMap<&str, &StreamDescriptor> = self
            .streams
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmented_descriptor() -> StreamDescriptor {
        StreamDescriptor {
            codec: "avc1.640028".to_string(),
            mime_type: "video/mp4".to_string(),
            kind: MediaKind::Video,
            url: "sim://video".to_string(),
            size: 400,
            duration: 3.0,
            init_size: 100,
            segments: vec![
                SegmentInfo { offset: 100, size: 100, start: 0.0, duration: 1.0 },
                SegmentInfo { offset: 200, size: 100, start: 1.0, duration: 1.0 },
                SegmentInfo { offset: 300, size: 100, start: 2.0, duration: 1.0 },
            ],
            expected: BTreeMap::new(),
        }
    }

    #[test]
    fn test_offset_for_time_uses_segment_table() {
        let descriptor = segmented_descriptor();
        assert_eq!(descriptor.offset_for_time(0.0), 100);
        assert_eq!(descriptor.offset_for_time(1.5), 200);
        assert_eq!(descriptor.offset_for_time(2.0), 300);
        assert_eq!(descriptor.offset_for_time(9.0), 400);
    }

    #[test]
    fn test_offset_for_time_interpolates_without_table() {
        let mut descriptor = segmented_descriptor();
        descriptor.segments.clear();
        assert_eq!(descriptor.offset_for_time(1.5), 250);
        assert_eq!(descriptor.offset_for_time(30.0), 400);
    }

    #[test]
    fn test_type_string_includes_codec() {
        assert_eq!(
            segmented_descriptor().type_string(),
            "video/mp4; codecs=\"avc1.640028\""
        );
    }

    #[test]
    fn test_catalog_json_roundtrip_preserves_roles() {
        let mut catalog = StreamCatalog::new();
        catalog.insert("video", segmented_descriptor());

        let json = catalog.to_json().unwrap();
        let loaded = StreamCatalog::from_json(&json).unwrap();

        assert_eq!(loaded.roles(), vec!["video"]);
        assert_eq!(loaded.get("video").unwrap().segment_count(), 3);
    }
}

//! Synthetic stream fixtures and the catalog the builtin suite runs against.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use msecheck_core::stream::CatalogError;
use msecheck_core::{MediaKind, SegmentInfo, StreamCatalog, StreamDescriptor};
use thiserror::Error;

use crate::container::{InitInfo, MediaSegmentInfo, encode_init, encode_media};
use crate::fetcher::InMemoryFetcher;

/// Builder for a synthetic resource and its descriptor.
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    kind: MediaKind,
    mime_type: String,
    codec: String,
    url: String,
    segment_count: usize,
    segment_duration: f64,
    payload_len: usize,
    init_padding: usize,
    width: u32,
    height: u32,
}

impl SyntheticStream {
    /// Ten one-second 640x360 video segments.
    pub fn video(url: &str) -> Self {
        Self {
            kind: MediaKind::Video,
            mime_type: "video/x-sim".to_string(),
            codec: "simv.1".to_string(),
            url: url.to_string(),
            segment_count: 10,
            segment_duration: 1.0,
            payload_len: 4000,
            init_padding: 200,
            width: 640,
            height: 360,
        }
    }

    /// Twenty half-second audio segments.
    pub fn audio(url: &str) -> Self {
        Self {
            kind: MediaKind::Audio,
            mime_type: "audio/x-sim".to_string(),
            codec: "sima.1".to_string(),
            url: url.to_string(),
            segment_count: 20,
            segment_duration: 0.5,
            payload_len: 800,
            init_padding: 64,
            width: 0,
            height: 0,
        }
    }

    pub fn codec(mut self, codec: &str) -> Self {
        self.codec = codec.to_string();
        self
    }

    pub fn segments(mut self, count: usize, duration: f64) -> Self {
        self.segment_count = count;
        self.segment_duration = duration;
        self
    }

    pub fn payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn duration(&self) -> f64 {
        self.segment_count as f64 * self.segment_duration
    }

    /// Encodes the resource and describes it.
    pub fn build(&self) -> (StreamDescriptor, Bytes) {
        let init = encode_init(
            &InitInfo {
                kind: self.kind,
                codec: self.codec.clone(),
                width: self.width,
                height: self.height,
                duration: self.duration(),
            },
            self.init_padding,
        );

        let mut data = BytesMut::from(&init[..]);
        let mut segments = Vec::with_capacity(self.segment_count);
        for i in 0..self.segment_count {
            let start = i as f64 * self.segment_duration;
            let encoded = encode_media(
                MediaSegmentInfo {
                    start,
                    duration: self.segment_duration,
                },
                self.payload_len,
            );
            segments.push(SegmentInfo {
                offset: data.len() as u64,
                size: encoded.len() as u64,
                start,
                duration: self.segment_duration,
            });
            data.extend_from_slice(&encoded);
        }

        let mut expected = BTreeMap::new();
        expected.insert("duration".to_string(), self.duration());
        if self.kind == MediaKind::Video {
            expected.insert("width".to_string(), f64::from(self.width));
            expected.insert("height".to_string(), f64::from(self.height));
        }

        let descriptor = StreamDescriptor {
            codec: self.codec.clone(),
            mime_type: self.mime_type.clone(),
            kind: self.kind,
            url: self.url.clone(),
            size: data.len() as u64,
            duration: self.duration(),
            init_size: init.len() as u64,
            segments,
            expected,
        };
        (descriptor, data.freeze())
    }
}

/// Builds the default catalog and a fetcher serving its resources.
///
/// Roles: `video`, `audio`, and `video_unsupported` whose codec the default
/// simulator rejects.
pub fn standard_catalog() -> (StreamCatalog, InMemoryFetcher) {
    let mut catalog = StreamCatalog::new();
    let fetcher = InMemoryFetcher::new();
    for (role, stream) in standard_streams() {
        let (descriptor, data) = stream.build();
        fetcher.insert(&descriptor.url, data);
        catalog.insert(role, descriptor);
    }
    (catalog, fetcher)
}

/// Errors raised while writing fixtures to disk.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to write fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Writes the standard fixtures into `dir` and returns the catalog path.
///
/// Each stream is written as one media file and its catalog URL is the bare
/// file name, so serving `dir` over HTTP and passing the server root as the
/// media base URL reproduces [`standard_catalog`] through real range requests.
///
/// # Errors
///
/// - `FixtureError::Io` - If `dir` cannot be created or written
/// - `FixtureError::Catalog` - If the catalog cannot be serialized
pub fn export_standard_catalog(dir: &Path) -> Result<PathBuf, FixtureError> {
    std::fs::create_dir_all(dir)?;

    let mut catalog = StreamCatalog::new();
    for (role, stream) in standard_streams() {
        let (mut descriptor, data) = stream.build();
        let file_name = descriptor
            .url
            .rsplit('/')
            .next()
            .unwrap_or(role)
            .to_string();
        std::fs::write(dir.join(&file_name), &data)?;
        tracing::debug!(role, file = %file_name, bytes = data.len(), "Wrote fixture");

        descriptor.url = file_name;
        catalog.insert(role, descriptor);
    }

    let path = dir.join("catalog.json");
    std::fs::write(&path, catalog.to_json()?)?;
    Ok(path)
}

fn standard_streams() -> [(&'static str, SyntheticStream); 3] {
    [
        ("video", SyntheticStream::video("sim://video.simv")),
        ("audio", SyntheticStream::audio("sim://audio.sima")),
        (
            "video_unsupported",
            SyntheticStream::video("sim://video-hevc.simv").codec("simv.hevc"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Element, SegmentParser};

    #[test]
    fn test_segment_table_matches_encoded_bytes() {
        let (descriptor, data) = SyntheticStream::video("sim://v").segments(3, 2.0).build();

        assert_eq!(descriptor.size, data.len() as u64);
        assert_eq!(descriptor.segment_count(), 3);
        assert_eq!(descriptor.segments[0].offset, descriptor.init_size);
        assert_eq!(descriptor.segments[2].end_offset(), descriptor.size);
        assert_eq!(descriptor.expected("duration"), Some(6.0));

        let segment = &descriptor.segments[1];
        let mut parser = SegmentParser::new();
        let elements = parser
            .push(&data[segment.offset as usize..segment.end_offset() as usize])
            .unwrap();
        assert_eq!(
            elements,
            vec![Element::Media(MediaSegmentInfo {
                start: 2.0,
                duration: 2.0
            })]
        );
    }

    #[tokio::test]
    async fn test_standard_catalog_is_served() {
        use msecheck_core::Fetcher;

        let (catalog, fetcher) = standard_catalog();
        assert_eq!(catalog.len(), 3);

        let audio = catalog.get("audio").unwrap();
        assert_eq!(audio.type_string(), "audio/x-sim; codecs=\"sima.1\"");
        assert_eq!(audio.expected("width"), None);

        let fetched = fetcher.fetch_range(&audio.url, 0..audio.init_size).await.unwrap();
        assert_eq!(fetched.total_size, audio.size);
        assert_eq!(&fetched.data[..4], b"SIMI");
    }

    #[test]
    fn test_export_writes_servable_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_standard_catalog(dir.path()).unwrap();

        let exported = StreamCatalog::load(&path).unwrap();
        let (standard, _) = standard_catalog();
        assert_eq!(exported.len(), standard.len());

        let video = exported.get("video").unwrap();
        assert_eq!(video.url, "video.simv");
        assert_eq!(video.segments, standard.get("video").unwrap().segments);

        let data = std::fs::read(dir.path().join(&video.url)).unwrap();
        assert_eq!(data.len() as u64, video.size);
        assert_eq!(&data[..4], b"SIMI");
    }
}

//! Synthetic container format understood by the simulated buffers.
//!
//! A stream is a sequence of boxes, each an 8-byte header (4-byte magic,
//! big-endian `u32` body length) followed by the body:
//!
//! - `SIMI` init: kind `u8`, width `u32`, height `u32`, duration µs `u64`,
//!   codec length `u16`, codec bytes, zero padding
//! - `SIMS` media: start µs `u64`, duration µs `u64`, opaque payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use msecheck_core::MediaKind;
use thiserror::Error;

pub const INIT_MAGIC: [u8; 4] = *b"SIMI";
pub const MEDIA_MAGIC: [u8; 4] = *b"SIMS";

const HEADER_LEN: usize = 8;
const MAX_BOX_LEN: usize = 64 * 1024 * 1024;
const INIT_FIXED_LEN: usize = 1 + 4 + 4 + 8 + 2;
const MEDIA_FIXED_LEN: usize = 8 + 8;

/// Errors that can occur while parsing synthetic boxes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContainerError {
    #[error("unknown box type {magic:?}")]
    UnknownBox { magic: [u8; 4] },

    #[error("box of {len} bytes exceeds limit")]
    BoxTooLarge { len: usize },

    #[error("malformed box: {reason}")]
    Malformed { reason: String },
}

/// Contents of an init box.
#[derive(Debug, Clone, PartialEq)]
pub struct InitInfo {
    pub kind: MediaKind,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// Timing of a media box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaSegmentInfo {
    pub start: f64,
    pub duration: f64,
}

impl MediaSegmentInfo {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A fully parsed box.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Init(InitInfo),
    Media(MediaSegmentInfo),
}

/// Encodes an init box followed by `padding` zero bytes inside the body.
pub fn encode_init(info: &InitInfo, padding: usize) -> Bytes {
    let codec = info.codec.as_bytes();
    let body_len = INIT_FIXED_LEN + codec.len() + padding;

    let mut out = BytesMut::with_capacity(HEADER_LEN + body_len);
    out.put_slice(&INIT_MAGIC);
    out.put_u32(body_len as u32);
    out.put_u8(match info.kind {
        MediaKind::Audio => 0,
        MediaKind::Video => 1,
    });
    out.put_u32(info.width);
    out.put_u32(info.height);
    out.put_u64(seconds_to_micros(info.duration));
    out.put_u16(codec.len() as u16);
    out.put_slice(codec);
    out.put_bytes(0, padding);
    out.freeze()
}

/// Encodes a media box carrying `payload_len` patterned bytes.
pub fn encode_media(segment: MediaSegmentInfo, payload_len: usize) -> Bytes {
    let body_len = MEDIA_FIXED_LEN + payload_len;

    let mut out = BytesMut::with_capacity(HEADER_LEN + body_len);
    out.put_slice(&MEDIA_MAGIC);
    out.put_u32(body_len as u32);
    out.put_u64(seconds_to_micros(segment.start));
    out.put_u64(seconds_to_micros(segment.duration));
    let seed = seconds_to_micros(segment.start) as usize;
    out.extend((0..payload_len).map(|i| ((i + seed) % 251) as u8));
    out.freeze()
}

/// Length of the box header plus body for a media box of `payload_len`.
pub fn media_box_len(payload_len: usize) -> usize {
    HEADER_LEN + MEDIA_FIXED_LEN + payload_len
}

/// Incremental box parser.
///
/// Bytes may arrive split at arbitrary points; complete boxes are returned
/// as soon as their last byte is pushed.
#[derive(Debug, Default)]
pub struct SegmentParser {
    pending: BytesMut,
}

impl SegmentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `data` and returns every box it completes.
    ///
    /// # Errors
    ///
    /// - `ContainerError` - A box header or body is invalid; the parser keeps
    ///   its remaining bytes and should be reset
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Element>, ContainerError> {
        self.pending.extend_from_slice(data);
        let mut elements = Vec::new();

        while self.pending.len() >= HEADER_LEN {
            let magic = [
                self.pending[0],
                self.pending[1],
                self.pending[2],
                self.pending[3],
            ];
            let len = u32::from_be_bytes([
                self.pending[4],
                self.pending[5],
                self.pending[6],
                self.pending[7],
            ]) as usize;

            if magic != INIT_MAGIC && magic != MEDIA_MAGIC {
                return Err(ContainerError::UnknownBox { magic });
            }
            if len > MAX_BOX_LEN {
                return Err(ContainerError::BoxTooLarge { len });
            }
            if self.pending.len() < HEADER_LEN + len {
                break;
            }

            let mut frame = self.pending.split_to(HEADER_LEN + len).freeze();
            frame.advance(HEADER_LEN);
            let element = if magic == INIT_MAGIC {
                Element::Init(parse_init(frame)?)
            } else {
                Element::Media(parse_media(frame)?)
            };
            elements.push(element);
        }

        Ok(elements)
    }

    /// Drops any partially received box.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn parse_init(mut body: Bytes) -> Result<InitInfo, ContainerError> {
    if body.len() < INIT_FIXED_LEN {
        return Err(malformed("init box shorter than its fixed fields"));
    }

    let kind = match body.get_u8() {
        0 => MediaKind::Audio,
        1 => MediaKind::Video,
        other => return Err(malformed(&format!("unknown media kind {other}"))),
    };
    let width = body.get_u32();
    let height = body.get_u32();
    let duration = micros_to_seconds(body.get_u64());
    let codec_len = body.get_u16() as usize;
    if body.len() < codec_len {
        return Err(malformed("codec string overruns init box"));
    }
    let codec = String::from_utf8(body.split_to(codec_len).to_vec())
        .map_err(|_| malformed("codec string is not UTF-8"))?;

    Ok(InitInfo {
        kind,
        codec,
        width,
        height,
        duration,
    })
}

fn parse_media(mut body: Bytes) -> Result<MediaSegmentInfo, ContainerError> {
    if body.len() < MEDIA_FIXED_LEN {
        return Err(malformed("media box shorter than its timing fields"));
    }
    let start = micros_to_seconds(body.get_u64());
    let duration = micros_to_seconds(body.get_u64());
    Ok(MediaSegmentInfo { start, duration })
}

fn malformed(reason: &str) -> ContainerError {
    ContainerError::Malformed {
        reason: reason.to_string(),
    }
}

fn seconds_to_micros(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1_000_000.0).round() as u64
}

fn micros_to_seconds(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn video_init() -> InitInfo {
        InitInfo {
            kind: MediaKind::Video,
            codec: "simv.1".to_string(),
            width: 640,
            height: 360,
            duration: 10.0,
        }
    }

    #[test]
    fn test_init_box_parses_back() {
        let encoded = encode_init(&video_init(), 100);
        let mut parser = SegmentParser::new();

        let elements = parser.push(&encoded).unwrap();
        assert_eq!(elements, vec![Element::Init(video_init())]);
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn test_media_box_waits_for_last_byte() {
        let segment = MediaSegmentInfo {
            start: 2.0,
            duration: 0.5,
        };
        let encoded = encode_media(segment, 300);
        assert_eq!(encoded.len(), media_box_len(300));

        let mut parser = SegmentParser::new();
        assert!(parser.push(&encoded[..encoded.len() - 1]).unwrap().is_empty());
        let elements = parser.push(&encoded[encoded.len() - 1..]).unwrap();
        assert_eq!(elements, vec![Element::Media(segment)]);
    }

    #[test]
    fn test_unknown_box_is_rejected() {
        let mut parser = SegmentParser::new();
        let err = parser.push(b"JUNK\x00\x00\x00\x00").unwrap_err();
        assert_eq!(err, ContainerError::UnknownBox { magic: *b"JUNK" });

        parser.reset();
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn test_truncated_init_body_is_malformed() {
        let mut parser = SegmentParser::new();
        let err = parser.push(b"SIMI\x00\x00\x00\x02\x01\x00").unwrap_err();
        assert!(matches!(err, ContainerError::Malformed { .. }));
    }

    proptest! {
        #[test]
        fn prop_any_split_yields_same_boxes(
            segments in 1usize..6,
            payload in 0usize..400,
            split in 1usize..97,
        ) {
            let mut stream = BytesMut::new();
            stream.extend_from_slice(&encode_init(&video_init(), 16));
            let mut expected = vec![Element::Init(video_init())];
            for i in 0..segments {
                let segment = MediaSegmentInfo { start: i as f64, duration: 1.0 };
                stream.extend_from_slice(&encode_media(segment, payload));
                expected.push(Element::Media(segment));
            }

            let mut parser = SegmentParser::new();
            let mut parsed = Vec::new();
            for piece in stream.chunks(split) {
                parsed.extend(parser.push(piece).unwrap());
            }
            prop_assert_eq!(parsed, expected);
            prop_assert_eq!(parser.pending_len(), 0);
        }
    }
}

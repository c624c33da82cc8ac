//! Typed views of an envelope's `value` field.
//!
//! Text travels as the literal string. Binary media travels as a tagged
//! base64 blob: `IMG:`, `AUDIO:` or `VIDEO:` followed by the standard
//! base64 encoding of the raw file bytes.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::str::FromStr;

use crate::EnvelopeError;

/// Kind of binary media carried in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image (`IMG:` prefix).
    Image,
    /// Audio clip (`AUDIO:` prefix).
    Audio,
    /// Video clip (`VIDEO:` prefix).
    Video,
}

impl MediaKind {
    /// All media kinds, in prefix-matching order.
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Audio, MediaKind::Video];

    /// Wire prefix for this media kind.
    pub fn prefix(self) -> &'static str {
        match self {
            MediaKind::Image => "IMG:",
            MediaKind::Audio => "AUDIO:",
            MediaKind::Video => "VIDEO:",
        }
    }

    /// Detect the media kind of a raw payload from its prefix.
    pub fn detect(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| raw.starts_with(kind.prefix()))
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        };
        f.write_str(name)
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "img" | "image" => Ok(MediaKind::Image),
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Decoded payload of a transfer or delivery.
#[derive(Clone, PartialEq, Eq)]
pub enum Payload {
    /// Plain text message.
    Text(String),
    /// Binary media with its raw bytes.
    Media {
        /// What kind of media this is.
        kind: MediaKind,
        /// Raw (decoded) bytes.
        data: Vec<u8>,
    },
}

impl Payload {
    /// Wrap raw media bytes.
    pub fn media(kind: MediaKind, data: Vec<u8>) -> Self {
        Payload::Media { kind, data }
    }

    /// Parse a raw wire value.
    ///
    /// Values starting with a media prefix must carry valid base64;
    /// anything else is text.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        match MediaKind::detect(raw) {
            Some(kind) => {
                let body = &raw[kind.prefix().len()..];
                let data = STANDARD
                    .decode(body)
                    .map_err(|source| EnvelopeError::InvalidMedia {
                        kind: kind.prefix(),
                        source,
                    })?;
                Ok(Payload::Media { kind, data })
            }
            None => Ok(Payload::Text(raw.to_string())),
        }
    }

    /// Encode to the wire value.
    pub fn to_wire(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Media { kind, data } => {
                format!("{}{}", kind.prefix(), STANDARD.encode(data))
            }
        }
    }

    /// Media kind, if this is a media payload.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Payload::Text(_) => None,
            Payload::Media { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Media { kind, data } => f
                .debug_struct("Media")
                .field("kind", kind)
                .field("data", &format!("[{} bytes]", data.len()))
                .finish(),
        }
    }
}

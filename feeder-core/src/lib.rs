use std::fmt;

use ordered_float::NotNan;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

pub mod resize;

pub use resize::{Dimensions, MaxDimension, ResizeError, compute_target_size};

// Names and status values are never mutated after construction, so we keep
// them as `Box<str>` rather than `String`.
type BoxStr = Box<str>;

/// Capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rotation applied by the camera to compensate for how it is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    pub const fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported rotation {0}, expected one of 0, 90, 180, 270")]
pub struct InvalidRotation(pub u16);

impl TryFrom<u16> for Rotation {
    type Error = InvalidRotation;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarters),
            other => Err(InvalidRotation(other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// The kind of media a capture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    fn stem(self) -> &'static str {
        match self {
            MediaKind::Photo => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "h264",
        }
    }
}

/// File name of a captured artifact.
///
/// The same name is used for the local file (relative to the capture
/// directory) and as the key in the remote object store, so it never contains
/// a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName(BoxStr);

impl ArtifactName {
    /// `image_<YYYYMMDD-HHMMSS>.jpg` or `video_<YYYYMMDD-HHMMSS>.h264`.
    pub fn at(kind: MediaKind, time: &jiff::Zoned) -> Self {
        Self::build(kind, time, None)
    }

    /// Same as [`ArtifactName::at`] with a `_<sequence>` suffix, for a second
    /// capture landing in the same second as a file still on disk.
    pub fn with_sequence(kind: MediaKind, time: &jiff::Zoned, sequence: u32) -> Self {
        Self::build(kind, time, Some(sequence))
    }

    fn build(kind: MediaKind, time: &jiff::Zoned, sequence: Option<u32>) -> Self {
        let stamp = time.strftime("%Y%m%d-%H%M%S");
        let name = match sequence {
            Some(n) => format!("{}_{}_{}.{}", kind.stem(), stamp, n, kind.extension()),
            None => format!("{}_{}.{}", kind.stem(), stamp, kind.extension()),
        };
        Self(name.into())
    }

    /// Name of a derived variant, e.g. `small_image_20240101-120000.jpg`.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self(format!("{prefix}{}", self.0).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A temperature reading in degrees Celsius. NaN is not a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Celsius(pub NotNan<f64>);

impl Celsius {
    pub fn new(value: f64) -> Option<Self> {
        NotNan::new(value).ok().map(Celsius)
    }

    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

impl fmt::Display for Celsius {
    // Debug keeps the fractional part, so 20 degrees reads `20.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0.into_inner())
    }
}

/// A status event published to a topic.
///
/// Always serialized as a single-entry object: `{"<key>":"<value>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub key: BoxStr,
    pub value: BoxStr,
}

impl StatusMessage {
    pub fn new(key: impl Into<BoxStr>, value: impl Into<BoxStr>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Serialize for StatusMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&*self.key, &*self.value)?;
        map.end()
    }
}

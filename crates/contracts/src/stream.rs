//! Stream identity, stream profiles and stream requests.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sensor output channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Depth,
    Color,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
    Pose,
    Confidence,
}

impl StreamType {
    /// Stable lowercase name (used in logs, metrics labels and manifests)
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Depth => "depth",
            StreamType::Color => "color",
            StreamType::Infrared => "infrared",
            StreamType::Fisheye => "fisheye",
            StreamType::Gyro => "gyro",
            StreamType::Accel => "accel",
            StreamType::Pose => "pose",
            StreamType::Confidence => "confidence",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample / pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Z16,
    Y8,
    Y16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Yuyv,
    Uyvy,
    Raw16,
    MotionXyz32f,
    SixDof,
}

impl Format {
    /// Bytes per pixel for video formats, `None` for motion formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Format::Y8 => Some(1),
            Format::Z16 | Format::Y16 | Format::Yuyv | Format::Uyvy | Format::Raw16 => Some(2),
            Format::Rgb8 | Format::Bgr8 => Some(3),
            Format::Rgba8 | Format::Bgra8 => Some(4),
            Format::MotionXyz32f | Format::SixDof => None,
        }
    }

    /// Whether this format carries image data
    pub fn is_video(&self) -> bool {
        self.bytes_per_pixel().is_some()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Z16 => "Z16",
            Format::Y8 => "Y8",
            Format::Y16 => "Y16",
            Format::Rgb8 => "RGB8",
            Format::Bgr8 => "BGR8",
            Format::Rgba8 => "RGBA8",
            Format::Bgra8 => "BGRA8",
            Format::Yuyv => "YUYV",
            Format::Uyvy => "UYVY",
            Format::Raw16 => "RAW16",
            Format::MotionXyz32f => "MOTION_XYZ32F",
            Format::SixDof => "6DOF",
        };
        f.write_str(name)
    }
}

/// Request identity: a later request with the same key replaces the earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub stream: StreamType,
    pub index: u32,
}

impl StreamKey {
    pub fn new(stream: StreamType, index: u32) -> Self {
        Self { stream, index }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.stream, self.index)
    }
}

/// Image stream capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoStreamProfile {
    pub stream: StreamType,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub fps: u32,
    #[serde(default)]
    pub is_default: bool,
}

/// Motion (IMU / pose) stream capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionStreamProfile {
    pub stream: StreamType,
    pub index: u32,
    pub format: Format,
    pub fps: u32,
    #[serde(default)]
    pub is_default: bool,
}

/// A concrete capability a sensor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamProfile {
    Video(VideoStreamProfile),
    Motion(MotionStreamProfile),
}

impl StreamProfile {
    pub fn stream(&self) -> StreamType {
        match self {
            StreamProfile::Video(p) => p.stream,
            StreamProfile::Motion(p) => p.stream,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            StreamProfile::Video(p) => p.index,
            StreamProfile::Motion(p) => p.index,
        }
    }

    pub fn key(&self) -> StreamKey {
        StreamKey::new(self.stream(), self.index())
    }

    pub fn format(&self) -> Format {
        match self {
            StreamProfile::Video(p) => p.format,
            StreamProfile::Motion(p) => p.format,
        }
    }

    pub fn fps(&self) -> u32 {
        match self {
            StreamProfile::Video(p) => p.fps,
            StreamProfile::Motion(p) => p.fps,
        }
    }

    pub fn is_default(&self) -> bool {
        match self {
            StreamProfile::Video(p) => p.is_default,
            StreamProfile::Motion(p) => p.is_default,
        }
    }

    /// `(width, height)`; motion profiles report `(0, 0)`
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            StreamProfile::Video(p) => (p.width, p.height),
            StreamProfile::Motion(_) => (0, 0),
        }
    }

    /// Nominal frame period in milliseconds
    pub fn frame_period_ms(&self) -> f64 {
        1000.0 / f64::from(self.fps().max(1))
    }

    /// Ordering key used when picking the best available profile of a stream.
    ///
    /// Default-flagged profiles win, then pixel count, then frame rate.
    pub fn quality_rank(&self) -> (bool, u64, u32) {
        let (w, h) = self.resolution();
        (self.is_default(), u64::from(w) * u64::from(h), self.fps())
    }
}

impl From<VideoStreamProfile> for StreamProfile {
    fn from(p: VideoStreamProfile) -> Self {
        StreamProfile::Video(p)
    }
}

impl From<MotionStreamProfile> for StreamProfile {
    fn from(p: MotionStreamProfile) -> Self {
        StreamProfile::Motion(p)
    }
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamProfile::Video(p) => write!(
                f,
                "{}[{}] {}x{} {} @{}fps",
                p.stream, p.index, p.width, p.height, p.format, p.fps
            ),
            StreamProfile::Motion(p) => {
                write!(f, "{}[{}] {} @{}fps", p.stream, p.index, p.format, p.fps)
            }
        }
    }
}

/// A user's request for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRequest {
    pub stream: StreamType,
    pub index: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub format: Format,
    pub fps: u32,
}

impl StreamRequest {
    pub fn new(
        stream: StreamType,
        index: u32,
        width: u32,
        height: u32,
        format: Format,
        fps: u32,
    ) -> Self {
        Self {
            stream,
            index,
            width,
            height,
            format,
            fps,
        }
    }

    pub fn key(&self) -> StreamKey {
        StreamKey::new(self.stream, self.index)
    }

    /// Request that reproduces a concrete profile exactly
    pub fn from_profile(profile: &StreamProfile) -> Self {
        match profile {
            StreamProfile::Video(p) => {
                Self::new(p.stream, p.index, p.width, p.height, p.format, p.fps)
            }
            StreamProfile::Motion(p) => Self::new(p.stream, p.index, 0, 0, p.format, p.fps),
        }
    }

    /// Exact match on every field
    pub fn matches(&self, profile: &StreamProfile) -> bool {
        let (width, height) = profile.resolution();
        self.stream == profile.stream()
            && self.index == profile.index()
            && self.width == width
            && self.height == height
            && self.format == profile.format()
            && self.fps == profile.fps()
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}x{} {} @{}fps",
            self.stream, self.index, self.width, self.height, self.format, self.fps
        )
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

/// Name reported for any face that is not accepted as a gallery identity.
pub const UNKNOWN: &str = "Unknown";

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Box-filter downscale by an integer factor. A factor of 0 or 1 returns a copy.
    pub fn downscaled(&self, factor: u32) -> Frame {
        if factor <= 1 || self.width < factor || self.height < factor {
            return self.clone();
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let f = factor as usize;
        let (out_w, out_h) = (w / f, h / f);
        let mut data = Vec::with_capacity(out_w * out_h);

        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut sum = 0u32;
                for y in oy * f..(oy + 1) * f {
                    for x in ox * f..(ox + 1) * f {
                        sum += self.data.get(y * w + x).copied().unwrap_or(0) as u32;
                    }
                }
                data.push((sum / (f * f) as u32) as u8);
            }
        }

        Frame {
            data,
            width: out_w as u32,
            height: out_h as u32,
            timestamp: self.timestamp,
            sequence: self.sequence,
            is_dark: self.is_dark,
        }
    }
}

/// Location of a face inside a frame, in pixel coordinates of the frame sent to the embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Face embedding vector (128-dimensional for the dlib ResNet model the gallery is built with).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Returns `None` when the vectors are empty or of different dimension,
    /// i.e. when no meaningful distance can be computed.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return None;
        }
        let d = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        d.is_finite().then_some(d)
    }
}

/// One face found by the embedding collaborator in a single frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Identity resolved for one face in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDetection {
    /// Lower-case gallery name, or [`UNKNOWN`].
    pub name: String,
    /// Distance to the nearest gallery embedding; absent when none could be computed.
    pub distance: Option<f32>,
}

impl FrameDetection {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            distance: None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN
    }
}

/// The best detection seen across a session.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub name: String,
    pub distance: f32,
}

impl BestMatch {
    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN
    }
}

/// `None` when no face with a computable distance was seen during the session.
pub type SessionResult = Option<BestMatch>;

/// Immutable record sent to the remote attendance log, one per completed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEvent {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub authorized: bool,
    /// Serialized as an empty string when absent.
    #[serde(serialize_with = "serialize_distance")]
    pub distance: Option<f32>,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

fn serialize_distance<S: Serializer>(d: &Option<f32>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_f32(*d),
        None => s.serialize_str(""),
    }
}

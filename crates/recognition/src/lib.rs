//! Face recognition results and the client for the external recognition
//! service.
//!
//! The pipeline only depends on the [`Recognizer`] trait; the CompreFace
//! client is one implementation of it.

mod compreface;
mod detection;
mod error;

pub use compreface::{CompreFaceClient, CompreFaceConfig};
pub use detection::{BoundingBox, Candidate, Detection};
pub use error::RecognitionError;

/// Blocking face recognition over an encoded image.
pub trait Recognizer: Send + Sync {
    /// Recognize faces in a JPEG image. An image without faces yields an
    /// empty list, not an error.
    fn recognize(&self, jpeg: &[u8]) -> Result<Vec<Detection>, RecognitionError>;
}

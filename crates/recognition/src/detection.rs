use serde::Serialize;

/// Face bounding box in frame pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

/// One identity the service considers a possible match.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub subject: String,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
}

/// A recognized face region and its ranked candidates.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub candidates: Vec<Candidate>,
}

impl Detection {
    /// Candidate with the highest similarity. Ties go to the earliest entry.
    pub fn best_candidate(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .fold(None, |best: Option<&Candidate>, candidate| match best {
                Some(current) if candidate.similarity <= current.similarity => Some(current),
                _ => Some(candidate),
            })
    }
}

use serde::Serialize;

/// Annotated frame ready to be served, shared by every connected client.
#[derive(Clone, Debug)]
pub(crate) struct FramePacket {
    pub(crate) jpeg: Vec<u8>,
    pub(crate) timestamp_ms: i64,
    pub(crate) frame_number: u64,
    pub(crate) faces: usize,
}

#[derive(Serialize)]
pub(crate) struct CommandResponse {
    pub(crate) status: &'static str,
    pub(crate) message: String,
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) is_running: bool,
    pub(crate) status: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct FaceSummary {
    pub(crate) name: Option<String>,
    pub(crate) similarity: f64,
}

#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct RecognitionResponse {
    pub(crate) status: &'static str,
    pub(crate) faces: Vec<FaceSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) session: &'static str,
    pub(crate) stale_stage: Option<&'static str>,
    pub(crate) capture_age_ms: Option<u64>,
    pub(crate) recognition_age_ms: Option<u64>,
}

#[derive(Serialize)]
pub(crate) struct RootResponse {
    pub(crate) status: &'static str,
    pub(crate) message: &'static str,
    pub(crate) version: &'static str,
}

pub(crate) fn activity_label(running: bool) -> &'static str {
    if running { "active" } else { "inactive" }
}

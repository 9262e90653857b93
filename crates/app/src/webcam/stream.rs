//! Multipart JPEG stream for one client.
//!
//! Every client holds its own receiver on the frame channel and paces itself;
//! a slow or vanished client never touches the capture device or other
//! clients.

use std::{sync::Arc, time::Duration};

use actix_web::web::Bytes;
use async_stream::stream;
use futures_util::Stream;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::webcam::{data::FramePacket, pipeline::FrameReceiver};

pub(crate) const BOUNDARY: &str = "frame";

/// One part of the `multipart/x-mixed-replace` body.
pub(crate) fn multipart_part(packet: &FramePacket) -> Bytes {
    let mut payload = Vec::with_capacity(packet.jpeg.len() + 96);
    payload.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    payload.extend_from_slice(format!("X-Sequence: {}\r\n", packet.frame_number).as_bytes());
    payload.extend_from_slice(format!("X-Timestamp: {}\r\n", packet.timestamp_ms).as_bytes());
    payload.extend_from_slice(format!("X-Faces: {}\r\n", packet.faces).as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("Content-Length: {}\r\n\r\n", packet.jpeg.len()).as_bytes());
    payload.extend_from_slice(&packet.jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Tracks connected clients in the gauge for as long as the stream lives.
struct StreamClient;

impl StreamClient {
    fn connect() -> Self {
        metrics::gauge!("webcam_stream_clients").increment(1.0);
        StreamClient
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        metrics::gauge!("webcam_stream_clients").decrement(1.0);
        debug!("stream client disconnected");
    }
}

/// Yield each new frame at most once per `cadence`. Ends when the session
/// stops and the frame sender goes away.
pub(crate) fn frame_stream(
    mut frames: FrameReceiver,
    cadence: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    stream! {
        let _client = StreamClient::connect();
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if frames.changed().await.is_err() {
                break;
            }
            let packet: Option<Arc<FramePacket>> = frames.borrow_and_update().clone();
            if let Some(packet) = packet {
                yield Ok(multipart_part(&packet));
            }
        }
    }
}

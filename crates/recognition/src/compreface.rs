//! Client for a CompreFace-compatible recognition endpoint.

use std::time::Duration;

use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use tracing::debug;

use crate::{
    Recognizer,
    detection::{BoundingBox, Candidate, Detection},
    error::RecognitionError,
};

const RECOGNIZE_PATH: &str = "/api/v1/recognition/recognize";
/// CompreFace reports "no face is found in the given image" with this code.
const NO_FACE_FOUND: i64 = 28;

#[derive(Clone, Debug)]
pub struct CompreFaceConfig {
    /// Scheme, host and port of the service, e.g. `http://localhost:8000`.
    pub base_url: String,
    pub api_key: String,
    /// Upper bound for a whole request, connect included.
    pub timeout: Duration,
    pub det_prob_threshold: f32,
    pub prediction_count: u32,
}

pub struct CompreFaceClient {
    http: Client,
    endpoint: String,
    api_key: String,
    det_prob_threshold: String,
    prediction_count: String,
}

impl CompreFaceClient {
    /// Build the HTTP client. Must not be called from inside an async runtime.
    pub fn new(config: CompreFaceConfig) -> Result<Self, RecognitionError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            RECOGNIZE_PATH
        );
        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key,
            det_prob_threshold: config.det_prob_threshold.to_string(),
            prediction_count: config.prediction_count.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Recognizer for CompreFaceClient {
    fn recognize(&self, jpeg: &[u8]) -> Result<Vec<Detection>, RecognitionError> {
        let part = multipart::Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("limit", "0"),
                ("det_prob_threshold", self.det_prob_threshold.as_str()),
                ("prediction_count", self.prediction_count.as_str()),
            ])
            .multipart(form)
            .send()?;

        let status = response.status();
        let body = response.bytes()?;
        if status.is_success() {
            parse_recognize_response(&body)
        } else {
            interpret_error(status.as_u16(), &body)
        }
    }
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    result: Vec<WireFace>,
}

#[derive(Deserialize)]
struct WireFace {
    #[serde(rename = "box")]
    bbox: WireBox,
    #[serde(default)]
    subjects: Vec<WireSubject>,
}

#[derive(Deserialize)]
struct WireBox {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

#[derive(Deserialize)]
struct WireSubject {
    subject: String,
    #[serde(default)]
    similarity: f64,
}

#[derive(Deserialize)]
struct WireError {
    code: Option<i64>,
    message: Option<String>,
}

impl From<WireFace> for Detection {
    fn from(face: WireFace) -> Self {
        Detection {
            bbox: BoundingBox {
                x_min: face.bbox.x_min.round() as i32,
                y_min: face.bbox.y_min.round() as i32,
                x_max: face.bbox.x_max.round() as i32,
                y_max: face.bbox.y_max.round() as i32,
            },
            candidates: face
                .subjects
                .into_iter()
                .map(|s| Candidate {
                    subject: s.subject,
                    similarity: if s.similarity.is_nan() {
                        0.0
                    } else {
                        s.similarity.clamp(0.0, 1.0)
                    },
                })
                .collect(),
        }
    }
}

pub(crate) fn parse_recognize_response(body: &[u8]) -> Result<Vec<Detection>, RecognitionError> {
    let response: RecognizeResponse = serde_json::from_slice(body)?;
    Ok(response.result.into_iter().map(Detection::from).collect())
}

fn interpret_error(status: u16, body: &[u8]) -> Result<Vec<Detection>, RecognitionError> {
    let parsed = serde_json::from_slice::<WireError>(body).ok();
    if status == 400 && parsed.as_ref().and_then(|e| e.code) == Some(NO_FACE_FOUND) {
        debug!("recognition service found no face");
        return Ok(Vec::new());
    }
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    Err(RecognitionError::Service { status, message })
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    use super::*;

    const SAMPLE: &str = r#"{
        "result": [
            {
                "box": {"probability": 0.99, "x_min": 10, "y_min": 20, "x_max": 110, "y_max": 140},
                "subjects": [
                    {"subject": "ana", "similarity": 0.97},
                    {"subject": "luis", "similarity": 0.41}
                ]
            },
            {
                "box": {"probability": 0.91, "x_min": 200, "y_min": 30, "x_max": 260, "y_max": 100},
                "subjects": []
            }
        ]
    }"#;

    #[test]
    fn parses_detections_and_candidates() {
        let detections = parse_recognize_response(SAMPLE.as_bytes()).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(
            detections[0].bbox,
            BoundingBox {
                x_min: 10,
                y_min: 20,
                x_max: 110,
                y_max: 140
            }
        );
        assert_eq!(detections[0].candidates[0].subject, "ana");
        assert!(detections[1].candidates.is_empty());
    }

    #[test]
    fn missing_result_is_empty() {
        assert!(parse_recognize_response(b"{}").unwrap().is_empty());
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = parse_recognize_response(b"<html>").unwrap_err();
        assert!(matches!(err, RecognitionError::Malformed(_)));
    }

    #[test]
    fn no_face_code_is_not_an_error() {
        let body = br#"{"message": "No face is found in the given image", "code": 28}"#;
        assert!(interpret_error(400, body).unwrap().is_empty());
    }

    #[test]
    fn other_errors_keep_status_and_message() {
        let body = br#"{"message": "Missing header x-api-key", "code": 20}"#;
        match interpret_error(401, body) {
            Err(RecognitionError::Service { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Missing header x-api-key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Serve a single request, hand its head back to the test, and answer with
    /// `response`.
    fn one_shot_server(response: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            tx.send(head).unwrap();
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    fn client_for(base_url: String, timeout: Duration) -> CompreFaceClient {
        CompreFaceClient::new(CompreFaceConfig {
            base_url,
            api_key: "secret".to_string(),
            timeout,
            det_prob_threshold: 0.8,
            prediction_count: 1,
        })
        .unwrap()
    }

    #[test]
    fn posts_image_with_api_key() {
        let body = r#"{"result":[{"box":{"x_min":1,"y_min":2,"x_max":3,"y_max":4},"subjects":[{"subject":"ana","similarity":0.9}]}]}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (base_url, head_rx) = one_shot_server(response);
        let client = client_for(base_url, Duration::from_secs(5));

        let detections = client.recognize(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].candidates[0].subject, "ana");

        let head = head_rx.recv().unwrap().to_ascii_lowercase();
        assert!(head.starts_with("post /api/v1/recognition/recognize?"));
        assert!(head.contains("det_prob_threshold=0.8"));
        assert!(head.contains("x-api-key: secret"));
        assert!(head.contains("multipart/form-data"));
    }

    #[test]
    fn hung_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        thread::spawn(move || {
            let _held = listener.accept().unwrap();
            let _ = done_rx.recv();
        });
        let client = client_for(format!("http://{addr}"), Duration::from_millis(200));

        let err = client.recognize(&[0xFF, 0xD8]).unwrap_err();
        assert!(matches!(err, RecognitionError::Transport(_)));
        let _ = done_tx.send(());
    }
}

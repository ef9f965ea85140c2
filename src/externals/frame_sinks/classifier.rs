use std::time::Duration;

use common::frame::FrameBuffer;
use serde::Deserialize;
use tracing::{info, instrument};
use ureq::{Agent, AgentBuilder};

use crate::ports::{FrameSink, SinkError};

const BOUNDARY: &str = "occupancy-sentinel-frame-boundary";
const FIELD_NAME: &str = "image";
const FILE_NAME: &str = "image.raw";

/// Body returned by the classification service.
#[derive(Debug, Deserialize, PartialEq)]
pub struct PredictionResponse {
    #[serde(default)]
    pub prediction: Vec<serde_json::Value>,

    #[serde(default)]
    pub error: Option<String>,
}

impl PredictionResponse {
    /// The service reports failures in-band through a non-empty `error`.
    fn into_result(self) -> Result<Vec<serde_json::Value>, SinkError> {
        match self.error {
            Some(error) if !error.is_empty() => Err(SinkError::Rejected(error)),
            _ => Ok(self.prediction),
        }
    }
}

/// Uploads frames to an HTTP image classification service.
pub struct ClassifierClient {
    agent: Agent,
    endpoint: String,
}

impl ClassifierClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: AgentBuilder::new().timeout(timeout).build(),
            endpoint: endpoint.into(),
        }
    }

    /// Post the frame and return the predictions.
    #[instrument(skip_all)]
    pub fn classify(&self, frame: &FrameBuffer) -> Result<Vec<serde_json::Value>, SinkError> {
        let body = multipart_body(frame.data());
        let response = self
            .agent
            .post(&self.endpoint)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .send_bytes(&body);

        let text = match response {
            Ok(response) => response
                .into_string()
                .map_err(|e| SinkError::Transport(e.to_string()))?,
            Err(ureq::Error::Status(code, response)) => {
                // Error responses may still carry a JSON error message.
                let text = response.into_string().unwrap_or_default();
                return Err(match parse_response(&text).map(|r| r.into_result()) {
                    Ok(Err(rejected)) => rejected,
                    _ => SinkError::Rejected(format!("HTTP status {}", code)),
                });
            }
            Err(e) => return Err(SinkError::Transport(e.to_string())),
        };

        parse_response(&text)?.into_result()
    }
}

fn parse_response(text: &str) -> Result<PredictionResponse, SinkError> {
    serde_json::from_str(text)
        .map_err(|e| SinkError::Rejected(format!("Unparsable response. Error: {}", e)))
}

fn multipart_body(bytes: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, FIELD_NAME, FILE_NAME
    );
    let tail = format!("\r\n--{}--\r\n", BOUNDARY);

    let mut body = Vec::with_capacity(head.len() + bytes.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(tail.as_bytes());
    body
}

impl FrameSink for ClassifierClient {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn submit(&mut self, frame: &FrameBuffer) -> Result<(), SinkError> {
        let predictions = self.classify(frame)?;
        info!("Got predictions: {}", serde_json::Value::Array(predictions));
        Ok(())
    }
}

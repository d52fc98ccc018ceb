//! Client wire protocol
//!
//! Every inbound frame is a JSON object `{"command": <string>, "data": <object>}`.
//! The stream is fire-and-forget: the server never answers on the application
//! level. `update` carries only the fields that changed on the client, so all
//! of its fields are optional.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid data for command '{command}': {source}")]
    InvalidData {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    command: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Payload of the `update` command. Steering is in degrees, pedals in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct UpdateData {
    pub steering: Option<f64>,
    pub accelerator: Option<f64>,
    pub brake: Option<f64>,
}

impl UpdateData {
    /// Drops fields that are not finite numbers.
    pub fn sanitized(self) -> Self {
        fn finite(name: &str, value: Option<f64>) -> Option<f64> {
            match value {
                Some(v) if !v.is_finite() => {
                    warn!("Ignoring non-finite {} value {}", name, v);
                    None
                }
                other => other,
            }
        }

        Self {
            steering: finite("steering", self.steering),
            accelerator: finite("accelerator", self.accelerator),
            brake: finite("brake", self.brake),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steering.is_none() && self.accelerator.is_none() && self.brake.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Update(UpdateData),
    HandbrakePress,
    HandbrakeRelease,
    HornPress,
    HornRelease,
    Reset,
    /// Anything this server does not know; kept for logging only
    Unknown(String),
}

impl Command {
    /// Decodes one frame. Text and binary frames share the same JSON format.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(payload)?;

        let command = match envelope.command.as_str() {
            "update" => {
                let data = match envelope.data {
                    Some(value) => serde_json::from_value::<UpdateData>(value).map_err(
                        |source| ProtocolError::InvalidData {
                            command: envelope.command.clone(),
                            source,
                        },
                    )?,
                    None => UpdateData::default(),
                };
                Command::Update(data.sanitized())
            }
            "handbrake_press" => Command::HandbrakePress,
            "handbrake_release" => Command::HandbrakeRelease,
            "horn_press" => Command::HornPress,
            "horn_release" => Command::HornRelease,
            "reset" => Command::Reset,
            _ => Command::Unknown(envelope.command),
        };
        Ok(command)
    }
}

//! Terminal / REPL session frames.
//!
//! Output travels server → client as JSON text frames with base64 data.
//! Keystrokes travel client → server as raw binary frames; control
//! requests (resize) as JSON text frames.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Frames pushed by the terminal endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalFrame {
    /// A chunk of terminal output, base64-encoded.
    Output { data: String },
    /// The remote process exited.
    Exit {
        #[serde(default)]
        code: i32,
    },
    Info { message: String },
}

impl TerminalFrame {
    /// Builds an output frame from raw bytes.
    pub fn output(bytes: &[u8]) -> Self {
        Self::Output {
            data: STANDARD.encode(bytes),
        }
    }

    /// Decodes the payload of an output frame. `None` for other frames or
    /// invalid base64.
    pub fn output_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Output { data } => STANDARD.decode(data).ok(),
            _ => None,
        }
    }
}

/// Control requests sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalControl {
    Resize { cols: u16, rows: u16 },
}

//! Network roles and the stream presets they imply.
//!
//! A two-device session pairs a **Mirror** (displays and remote-controls a
//! capture it does not perform) with a **Scanner** (captures and accepts
//! remote commands).  The role decides which of the four stream directions
//! are enabled on this device; the presets are exact inverses of each other,
//! so a correctly configured pair never has both ends sending (or both ends
//! receiving) the same stream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role this device plays in a paired session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Display-only remote control of another device's capture.
    Mirror,
    /// Capture-only device that streams its render and obeys remote commands.
    Scanner,
}

impl DeviceRole {
    /// Returns the stream preset for this role.
    pub fn stream_config(self) -> StreamConfig {
        match self {
            DeviceRole::Mirror => StreamConfig {
                send_rendered_stream: false,
                receive_rendered_stream: true,
                send_network_commands: true,
                receive_network_commands: false,
            },
            DeviceRole::Scanner => DeviceRole::Mirror.stream_config().inverse(),
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Mirror => f.write_str("mirror"),
            DeviceRole::Scanner => f.write_str("scanner"),
        }
    }
}

/// Four independent stream-direction flags sent to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub send_rendered_stream: bool,
    pub receive_rendered_stream: bool,
    pub send_network_commands: bool,
    pub receive_network_commands: bool,
}

impl StreamConfig {
    /// Swaps every send flag with its receive counterpart.
    pub fn inverse(self) -> Self {
        Self {
            send_rendered_stream: self.receive_rendered_stream,
            receive_rendered_stream: self.send_rendered_stream,
            send_network_commands: self.receive_network_commands,
            receive_network_commands: self.send_network_commands,
        }
    }

    /// Returns `true` when `other` can be the far end of a two-party session
    /// with `self`: whatever one side sends, the other receives.
    pub fn complements(&self, other: &StreamConfig) -> bool {
        *other == self.inverse()
    }
}

use serde::{Deserialize, Serialize};

/// Which of the three virtual lanes a frame travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Program,
    Platform,
    Control,
}

/// Persisted direction of a recorded message, relative to the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToHarness,
    FromHarness,
}

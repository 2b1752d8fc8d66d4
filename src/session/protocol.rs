//! Wire protocol types for the Session Controller. These are plain,
//! serde-serializable messages; binding them to an actual transport
//! (HTTP upgrade, websocket framing, CORS policy) is out of scope here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inspector::ConnectionReport;
use crate::session::metrics::DaemonStats;

/// One cell coordinate, used by `paint`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

/// Inbound action dispatched by a client. `#[serde(tag = "action")]` mirrors
/// the `{"action": "..."}` envelope the reference transport used.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Start {
        experiment: String,
        #[serde(default)]
        config: Value,
    },
    Click {
        #[serde(default)]
        x: usize,
        #[serde(default)]
        y: usize,
    },
    Paint {
        #[serde(default)]
        cells: Vec<Cell>,
        #[serde(default = "default_paint_value")]
        value: f32,
    },
    Step {
        #[serde(default = "default_step_count")]
        count: usize,
    },
    Play {
        #[serde(default = "default_fps")]
        fps: u32,
        #[serde(default = "default_steps_per_tick")]
        steps_per_tick: usize,
    },
    Pause,
    Reset,
    Reconnect {
        #[serde(default)]
        config: Value,
    },
    Inspect {
        #[serde(default)]
        x: usize,
        #[serde(default)]
        y: usize,
    },
}

fn default_paint_value() -> f32 {
    1.0
}

fn default_step_count() -> usize {
    1
}

fn default_fps() -> u32 {
    10
}

fn default_steps_per_tick() -> usize {
    1
}

/// Optional timing block attached to a frame, present only when the caller
/// supplies an elapsed duration (mirrors the reference "only if elapsed_s is
/// known and positive" behaviour).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerfInfo {
    pub steps: usize,
    pub elapsed_ms: f64,
    pub steps_per_second: f64,
}

impl PerfInfo {
    pub fn new(steps: usize, elapsed: std::time::Duration) -> Option<Self> {
        let elapsed_s = elapsed.as_secs_f64();
        if elapsed_s <= 0.0 {
            return None;
        }
        Some(Self {
            steps,
            elapsed_ms: (elapsed_s * 1000.0 * 100.0).round() / 100.0,
            steps_per_second: (steps as f64 / elapsed_s * 10.0).round() / 10.0,
        })
    }
}

/// Outbound message sent back to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        state: &'static str,
    },
    Frame {
        generation: u64,
        grid: Vec<Vec<i32>>,
        stats: DaemonStats,
        #[serde(skip_serializing_if = "Option::is_none")]
        perf: Option<PerfInfo>,
    },
    Connections(ConnectionReport),
    Error {
        message: String,
    },
}

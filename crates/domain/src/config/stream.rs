use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Path of the event router under `service.base_url`.
    #[serde(default = "d_path")]
    pub path: String,
    #[serde(default = "d_channel_type")]
    pub channel_type: String,
    /// Free-form identifier of this client platform.
    #[serde(default = "d_platform_key")]
    pub channel_platform_key: String,
    /// A connection that stays silent this long (no data, no heartbeat) is
    /// considered dead.
    #[serde(default = "d_45000")]
    pub idle_timeout_ms: u64,
    #[serde(default = "d_10000")]
    pub connect_timeout_ms: u64,
    #[serde(default = "d_500")]
    pub initial_backoff_ms: u64,
    #[serde(default = "d_30000")]
    pub max_backoff_ms: u64,
    /// Consecutive failed reconnects before the stream gives up.
    #[serde(default = "d_5")]
    pub max_reconnect_attempts: u32,
    /// Capacity of the delivery channel between the reader task and caller.
    #[serde(default = "d_256")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            channel_type: d_channel_type(),
            channel_platform_key: d_platform_key(),
            idle_timeout_ms: 45_000,
            connect_timeout_ms: 10_000,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_reconnect_attempts: 5,
            channel_capacity: 256,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_path() -> String {
    "/eventrouter/v1/sse".into()
}
fn d_channel_type() -> String {
    "embedded_messaging".into()
}
fn d_platform_key() -> String {
    "imsim".into()
}
fn d_45000() -> u64 {
    45_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_500() -> u64 {
    500
}
fn d_30000() -> u64 {
    30_000
}
fn d_5() -> u32 {
    5
}
fn d_256() -> usize {
    256
}

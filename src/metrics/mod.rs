// Metrics module
// Prometheus counters and the per-request phase record

mod registry;
mod types;

pub use registry::GatewayMetrics;
pub use types::{AttemptPhase, PhaseRecord, PhaseStatus};

use cell::{StartSpec, TaskSpec};
use serde::{Deserialize, Serialize};

/// Tunables for one [`crate::engine::schedule`] call.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed size of the bounded worker pool used for bid collection and
    /// commit fan-out.
    pub worker_pool_size: usize,
}

impl SchedulerConfig {
    pub const DEFAULT_WORKER_POOL_SIZE: usize = 5;

    /// Read `AUCTION_WORKER_POOL_SIZE` from the environment, falling back to
    /// [`Self::DEFAULT_WORKER_POOL_SIZE`] if unset or unparsable.
    pub fn from_env() -> Self {
        let worker_pool_size = std::env::var("AUCTION_WORKER_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_WORKER_POOL_SIZE);

        Self { worker_pool_size }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: Self::DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

/// A request to place a new LRP instance, as submitted to a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub spec: StartSpec,
    pub attempts: u32,
    pub submitted_at_ms: u64,
}

/// A request to stop one over-replicated (process_guid, index) slot across
/// the fleet, as submitted to a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub process_guid: String,
    pub index: u32,
    pub attempts: u32,
    pub submitted_at_ms: u64,
}

/// A request to run a one-shot task, as submitted to a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub spec: TaskSpec,
    pub attempts: u32,
    pub submitted_at_ms: u64,
}

/// One batch's worth of auction requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionRequest {
    pub starts: Vec<StartRequest>,
    pub stops: Vec<StopRequest>,
    pub tasks: Vec<TaskRequest>,
}

/// The verdict for a single start request: always carries `attempts`
/// incremented by one relative to the input, plus a winner and wait
/// duration if and only if the auction succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResult {
    pub spec: StartSpec,
    pub attempts: u32,
    pub submitted_at_ms: u64,
    pub winner: Option<String>,
    pub wait_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResult {
    pub process_guid: String,
    pub index: u32,
    pub attempts: u32,
    pub submitted_at_ms: u64,
    pub winner: Option<String>,
    pub wait_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub spec: TaskSpec,
    pub attempts: u32,
    pub submitted_at_ms: u64,
    pub winner: Option<String>,
    pub wait_duration_ms: Option<u64>,
}

/// Outcome of one `schedule()` call: every input request appears in exactly
/// one of the matching successful/failed lists (the "partition" invariant).
#[derive(Debug, Clone, Default)]
pub struct AuctionResults {
    pub successful_starts: Vec<StartResult>,
    pub successful_stops: Vec<StopResult>,
    pub successful_tasks: Vec<TaskResult>,
    pub failed_starts: Vec<StartResult>,
    pub failed_stops: Vec<StopResult>,
    pub failed_tasks: Vec<TaskResult>,
}

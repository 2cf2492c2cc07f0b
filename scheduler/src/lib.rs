//! Batch auction scheduler: greedily places LRP instances and tasks onto
//! cells, and resolves over-replicated (process_guid, index) slots, one
//! batch at a time.

pub mod clock;
pub mod engine;
pub mod pool;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use engine::schedule;
pub use pool::WorkerPool;
pub use types::{
    AuctionRequest, AuctionResults, SchedulerConfig, StartRequest, StartResult, StopRequest,
    StopResult, TaskRequest, TaskResult,
};

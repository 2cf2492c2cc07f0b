use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::instance::{ActualLrpStop, StartSpec, TaskSpec};

/// One cell's worth of decided work, ready to be dispatched in a single bulk
/// RPC. Also used, with the same shape, to describe the subset of work a
/// cell refused (`FailedWork`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    pub starts: Vec<StartSpec>,
    pub stops: Vec<ActualLrpStop>,
    pub tasks: Vec<TaskSpec>,
}

impl Work {
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty() && self.stops.is_empty() && self.tasks.is_empty()
    }
}

/// The subset of a `Work` order a cell declined to carry out. Always a
/// subset, by identity, of the `Work` it was handed.
pub type FailedWork = Work;

/// Consumed collaborator: the transport that actually delivers a cell's
/// bulk work order and reports back what it could not perform. Production
/// implementations live outside this crate (gRPC, HTTP, whatever the fleet
/// speaks); this crate only depends on the trait, plus an in-memory test
/// double in its own test suite.
#[async_trait]
pub trait CellClient: Send + Sync {
    async fn perform(&self, work: Work) -> Result<FailedWork, RpcError>;
}

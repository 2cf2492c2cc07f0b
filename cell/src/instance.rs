use crate::resources::Resources;
use serde::{Deserialize, Serialize};

/// A long-running process instance materialized on some cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub process_guid: String,
    pub instance_guid: String,
    pub index: u32,
    pub memory_mb: i64,
    pub disk_mb: i64,
}

impl Instance {
    /// Resources occupied by this instance. Every instance consumes exactly
    /// one container, regardless of its memory/disk footprint.
    pub fn footprint(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// A one-shot task materialized on some cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub task_guid: String,
    pub memory_mb: i64,
    pub disk_mb: i64,
}

impl TaskInstance {
    pub fn footprint(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// Work order to place a new LRP instance on a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSpec {
    pub process_guid: String,
    pub stack: String,
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub instance_guid: String,
    pub index: u32,
}

impl StartSpec {
    pub fn footprint(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// Work order to place a new task on a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_guid: String,
    pub stack: String,
    pub memory_mb: i64,
    pub disk_mb: i64,
}

impl TaskSpec {
    pub fn footprint(&self) -> Resources {
        Resources::new(self.memory_mb, self.disk_mb, 1)
    }
}

/// A concrete instance to stop on a specific cell, as committed to the RPC.
/// Distinct from the stop *request* (process_guid + index), which identifies
/// an over-replicated slot across the whole fleet rather than one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLrpStop {
    pub process_guid: String,
    pub instance_guid: String,
    pub index: u32,
    pub cell_id: String,
}

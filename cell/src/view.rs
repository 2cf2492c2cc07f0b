use std::sync::Arc;

use tracing::warn;

use crate::error::CellError;
use crate::instance::{ActualLrpStop, Instance, StartSpec, TaskInstance, TaskSpec};
use crate::resources::Resources;
use crate::work::{CellClient, FailedWork, Work};

/// Bid returned by [`CellView::score_for_stop`]: the score this cell offers
/// to be the *keeper* of the (process_guid, index) pair, plus the instance
/// guids on this cell that matched the pair (the candidates to stop should
/// this cell not be the one chosen to keep them).
#[derive(Debug, Clone, PartialEq)]
pub struct StopBid {
    pub score: f64,
    pub matching_instance_guids: Vec<String>,
}

/// Buffers the start/stop/task decisions taken against one cell during a
/// batch, for a single bulk commit at the end of the round.
#[derive(Debug, Default, Clone)]
struct PendingWork {
    starts: Vec<StartSpec>,
    stops: Vec<ActualLrpStop>,
    tasks: Vec<TaskSpec>,
}

impl PendingWork {
    fn is_empty(&self) -> bool {
        self.starts.is_empty() && self.stops.is_empty() && self.tasks.is_empty()
    }

    fn drain_into_work(&mut self) -> Work {
        Work {
            starts: std::mem::take(&mut self.starts),
            stops: std::mem::take(&mut self.stops),
            tasks: std::mem::take(&mut self.tasks),
        }
    }
}

/// An in-memory projection of one cell's state, owned by the scheduler for
/// the lifetime of a single batch. Scoring methods are pure (read-only);
/// mutation methods update `available`/`instances`/`tasks` in place and
/// accumulate the corresponding RPC work in `pending`.
///
/// `Clone` is cheap (an `Arc` bump plus small `Vec` copies) and is what lets
/// bid collection hand each worker its own snapshot instead of sharing a
/// reference across spawned tasks.
#[derive(Clone)]
pub struct CellView {
    pub id: String,
    pub stack: String,
    pub total: Resources,
    pub available: Resources,
    pub instances: Vec<Instance>,
    pub tasks: Vec<TaskInstance>,
    pending: PendingWork,
    client: Arc<dyn CellClient>,
}

impl CellView {
    /// Build a cell view from a fleet snapshot. `total` must have all three
    /// dimensions strictly positive — the fractional-fullness scoring
    /// formula divides by each of them — so this is debug-asserted rather
    /// than checked at runtime; a cell-state provider that can yield a
    /// zero-capacity cell must filter it out before this point.
    pub fn new(
        id: impl Into<String>,
        stack: impl Into<String>,
        total: Resources,
        available: Resources,
        instances: Vec<Instance>,
        tasks: Vec<TaskInstance>,
        client: Arc<dyn CellClient>,
    ) -> Self {
        debug_assert!(
            total.all_positive(),
            "cell totals must be strictly positive to be scoreable"
        );

        Self {
            id: id.into(),
            stack: stack.into(),
            total,
            available,
            instances,
            tasks,
            pending: PendingWork::default(),
            client,
        }
    }

    fn admit(&self, stack: &str, footprint: Resources) -> Result<Resources, CellError> {
        if self.stack != stack {
            return Err(CellError::StackMismatch {
                cell_id: self.id.clone(),
                cell_stack: self.stack.clone(),
                request_stack: stack.to_string(),
            });
        }

        self.available
            .checked_sub(footprint)
            .ok_or_else(|| CellError::InsufficientResources {
                cell_id: self.id.clone(),
            })
    }

    /// Score this cell's bid to start `spec`. Lower is better. Admission
    /// failures mean this cell does not bid at all.
    pub fn score_for_start(&self, spec: &StartSpec) -> Result<f64, CellError> {
        let remaining = self.admit(&spec.stack, spec.footprint())?;

        let co_located = self
            .instances
            .iter()
            .filter(|i| i.process_guid == spec.process_guid)
            .count();

        Ok(remaining.fractional_used_against(self.total) + co_located as f64)
    }

    /// Score this cell's bid to run `spec`. Lower is better. Tasks carry no
    /// process identity, so there is no co-location term.
    pub fn score_for_task(&self, spec: &TaskSpec) -> Result<f64, CellError> {
        let remaining = self.admit(&spec.stack, spec.footprint())?;
        Ok(remaining.fractional_used_against(self.total))
    }

    /// Score this cell's bid to *keep* an instance of (process_guid, index).
    /// Returns `NothingToStop` if this cell has no matching instance at all.
    /// The minimum-scoring cell across the fleet is the one that keeps an
    /// instance; every other matching cell stops all of its instances of
    /// this (process_guid, index) pair. See module docs on [`CellView`] for
    /// why `d` is added, not subtracted.
    pub fn score_for_stop(&self, process_guid: &str, index: u32) -> Result<StopBid, CellError> {
        let mut matching = Vec::new();
        let mut different_index_same_process = 0usize;

        for instance in &self.instances {
            if instance.process_guid != process_guid {
                continue;
            }
            if instance.index == index {
                matching.push(instance);
            } else {
                different_index_same_process += 1;
            }
        }

        if matching.is_empty() {
            return Err(CellError::NothingToStop {
                cell_id: self.id.clone(),
                process_guid: process_guid.to_string(),
                index,
            });
        }

        let reclaimed = matching
            .iter()
            .fold(Resources::default(), |acc, i| acc + i.footprint());
        let remaining_after_removal = self.available + reclaimed;

        let score = remaining_after_removal.fractional_used_against(self.total)
            + different_index_same_process as f64;

        Ok(StopBid {
            score,
            matching_instance_guids: matching.iter().map(|i| i.instance_guid.clone()).collect(),
        })
    }

    /// Apply a winning start bid: record the new instance, debit `available`,
    /// and queue the RPC work order.
    pub fn start_lrp(&mut self, spec: StartSpec) -> Result<(), CellError> {
        let remaining = self.admit(&spec.stack, spec.footprint())?;

        self.instances.push(Instance {
            process_guid: spec.process_guid.clone(),
            instance_guid: spec.instance_guid.clone(),
            index: spec.index,
            memory_mb: spec.memory_mb,
            disk_mb: spec.disk_mb,
        });
        self.available = remaining;
        self.pending.starts.push(spec);

        Ok(())
    }

    /// Apply a winning task bid: record the new task, debit `available`, and
    /// queue the RPC work order.
    pub fn start_task(&mut self, spec: TaskSpec) -> Result<(), CellError> {
        let remaining = self.admit(&spec.stack, spec.footprint())?;

        self.tasks.push(TaskInstance {
            task_guid: spec.task_guid.clone(),
            memory_mb: spec.memory_mb,
            disk_mb: spec.disk_mb,
        });
        self.available = remaining;
        self.pending.tasks.push(spec);

        Ok(())
    }

    /// Stop a single, specific instance on this cell, crediting its
    /// footprint back to `available` and queuing the RPC stop order.
    pub fn stop_lrp(
        &mut self,
        process_guid: &str,
        instance_guid: &str,
        index: u32,
    ) -> Result<(), CellError> {
        let position = self.instances.iter().position(|i| {
            i.process_guid == process_guid && i.instance_guid == instance_guid && i.index == index
        });

        let Some(position) = position else {
            return Err(CellError::NothingToStop {
                cell_id: self.id.clone(),
                process_guid: process_guid.to_string(),
                index,
            });
        };

        let removed = self.instances.remove(position);
        self.available = self.available + removed.footprint();

        self.pending.stops.push(ActualLrpStop {
            process_guid: removed.process_guid,
            instance_guid: removed.instance_guid,
            index: removed.index,
            cell_id: self.id.clone(),
        });

        Ok(())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Issue the single bulk RPC for everything decided against this cell
    /// this round. An RPC transport error is treated as "dispatched" — it
    /// may mean the cell performed some of the work, and retrying risks
    /// duplicating it, so we return no failed work and let a separate
    /// convergence loop reconcile. A non-empty `FailedWork` reply is
    /// returned as-is for the scheduler to reclassify as failures.
    pub async fn commit(&mut self) -> FailedWork {
        if self.pending.is_empty() {
            return FailedWork::default();
        }

        let work = self.pending.drain_into_work();

        match self.client.perform(work).await {
            Ok(failed) => {
                if !failed.is_empty() {
                    warn!(cell_id = %self.id, "cell refused part of its committed work");
                }
                failed
            }
            Err(err) => {
                warn!(cell_id = %self.id, error = %err, "perform call failed, treating work as dispatched");
                FailedWork::default()
            }
        }
    }
}

impl std::fmt::Debug for CellView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellView")
            .field("id", &self.id)
            .field("stack", &self.stack)
            .field("total", &self.total)
            .field("available", &self.available)
            .field("instances", &self.instances.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct NoopClient {
        calls: Mutex<Vec<Work>>,
    }

    #[async_trait]
    impl CellClient for NoopClient {
        async fn perform(&self, work: Work) -> Result<FailedWork, RpcError> {
            self.calls.lock().unwrap().push(work);
            Ok(FailedWork::default())
        }
    }

    fn cell(id: &str, stack: &str, total: Resources, instances: Vec<Instance>) -> CellView {
        let used = instances
            .iter()
            .fold(Resources::default(), |acc, i| acc + i.footprint());
        let available = total.checked_sub(used).expect("fixture must not overcommit");
        CellView::new(
            id,
            stack,
            total,
            available,
            instances,
            Vec::new(),
            Arc::new(NoopClient::default()),
        )
    }

    fn instance(process_guid: &str, instance_guid: &str, index: u32) -> Instance {
        Instance {
            process_guid: process_guid.into(),
            instance_guid: instance_guid.into(),
            index,
            memory_mb: 10,
            disk_mb: 10,
        }
    }

    fn start(process_guid: &str, instance_guid: &str, index: u32) -> StartSpec {
        StartSpec {
            process_guid: process_guid.into(),
            stack: "lucid64".into(),
            memory_mb: 10,
            disk_mb: 10,
            instance_guid: instance_guid.into(),
            index,
        }
    }

    #[test]
    fn score_for_start_rejects_stack_mismatch() {
        let c = cell("A", "lucid64", Resources::new(100, 100, 100), vec![]);
        let mut spec = start("pg-1", "ig-1", 0);
        spec.stack = "windows".into();

        let err = c.score_for_start(&spec).unwrap_err();
        assert!(matches!(err, CellError::StackMismatch { .. }));
    }

    #[test]
    fn score_for_start_rejects_insufficient_resources() {
        let c = cell("A", "lucid64", Resources::new(5, 5, 1), vec![]);
        let spec = start("pg-1", "ig-1", 0);

        let err = c.score_for_start(&spec).unwrap_err();
        assert!(matches!(err, CellError::InsufficientResources { .. }));
    }

    #[test]
    fn score_for_start_counts_colocated_instances() {
        let c = cell(
            "A",
            "lucid64",
            Resources::new(100, 100, 100),
            vec![instance("pg-4", "ig-other", 1)],
        );
        let spec = start("pg-4", "ig-new", 2);

        let score = c.score_for_start(&spec).unwrap();
        // one pre-existing instance of pg-4 on this cell => k=1 dominates the
        // fractional term, so score must land in [1.0, 2.0).
        assert!((1.0..2.0).contains(&score));
    }

    #[test]
    fn empty_cell_scores_lower_than_busier_cell_of_equal_size() {
        let total = Resources::new(100, 100, 100);
        let empty = cell("empty", "lucid64", total, vec![]);
        let busy = cell("busy", "lucid64", total, vec![instance("pg-x", "ig-x", 0)]);

        let spec = start("pg-4", "ig-4", 0);
        let empty_score = empty.score_for_start(&spec).unwrap();
        let busy_score = busy.score_for_start(&spec).unwrap();

        assert!(empty_score < busy_score);
    }

    #[test]
    fn start_lrp_debits_available_and_records_instance() {
        let mut c = cell("A", "lucid64", Resources::new(100, 100, 100), vec![]);
        c.start_lrp(start("pg-1", "ig-1", 0)).unwrap();

        assert_eq!(c.available, Resources::new(90, 90, 99));
        assert_eq!(c.instances.len(), 1);
        assert!(c.has_pending_work());
    }

    #[test]
    fn stop_lrp_credits_available_and_removes_instance() {
        let mut c = cell(
            "A",
            "lucid64",
            Resources::new(100, 100, 100),
            vec![instance("pg-1", "ig-1", 0)],
        );

        c.stop_lrp("pg-1", "ig-1", 0).unwrap();

        assert_eq!(c.available, Resources::new(100, 100, 100));
        assert!(c.instances.is_empty());
        assert!(c.has_pending_work());
    }

    #[test]
    fn stop_lrp_on_unknown_instance_fails() {
        let mut c = cell("A", "lucid64", Resources::new(100, 100, 100), vec![]);
        let err = c.stop_lrp("pg-1", "ig-1", 0).unwrap_err();
        assert!(matches!(err, CellError::NothingToStop { .. }));
    }

    #[test]
    fn score_for_stop_reports_matching_instances_and_other_index_count() {
        let c = cell(
            "A",
            "lucid64",
            Resources::new(100, 100, 100),
            vec![
                instance("pg", "ig-1", 0),
                instance("pg", "ig-2", 1),
                instance("pg", "ig-3", 1),
            ],
        );

        let bid = c.score_for_stop("pg", 1).unwrap();
        assert_eq!(bid.matching_instance_guids.len(), 2);
        // one instance of "pg" at a different index (ig-1 @ index 0) => d=1
        assert!(bid.score >= 1.0);
    }

    #[test]
    fn score_for_stop_with_no_match_signals_nothing_to_stop() {
        let c = cell(
            "A",
            "lucid64",
            Resources::new(100, 100, 100),
            vec![instance("pg", "ig-1", 0)],
        );

        let err = c.score_for_stop("pg", 17).unwrap_err();
        assert!(matches!(err, CellError::NothingToStop { .. }));
    }

    #[tokio::test]
    async fn commit_is_a_noop_with_nothing_pending() {
        let mut c = cell("A", "lucid64", Resources::new(100, 100, 100), vec![]);
        let failed = c.commit().await;
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn commit_sends_accumulated_work_in_one_call() {
        let mut c = cell("A", "lucid64", Resources::new(100, 100, 100), vec![]);
        c.start_lrp(start("pg-1", "ig-1", 0)).unwrap();
        c.start_lrp(start("pg-2", "ig-2", 0)).unwrap();

        let failed = c.commit().await;
        assert!(failed.is_empty());
        assert!(!c.has_pending_work());
    }

    #[tokio::test]
    async fn commit_silences_transport_errors_as_dispatched() {
        struct FailingClient;

        #[async_trait]
        impl CellClient for FailingClient {
            async fn perform(&self, _work: Work) -> Result<FailedWork, RpcError> {
                Err(RpcError::Transport("connection reset".into()))
            }
        }

        let mut c = CellView::new(
            "A",
            "lucid64",
            Resources::new(100, 100, 100),
            Resources::new(100, 100, 100),
            vec![],
            vec![],
            Arc::new(FailingClient),
        );
        c.start_lrp(start("pg-1", "ig-1", 0)).unwrap();

        let failed = c.commit().await;
        assert!(failed.is_empty(), "a transport error must not be reported as failed work");
    }
}

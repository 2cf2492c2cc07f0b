//! The batch scheduler: orders one batch's requests, runs the bid/mutate
//! cycle for each, then commits every touched cell.

use std::collections::HashMap;

use cell::{ActualLrpStop, CellError, CellView, StartSpec, TaskSpec};
use common::TraceId;
use tracing::{debug, info, warn, Instrument};

use crate::clock::Clock;
use crate::pool::WorkerPool;
use crate::types::{
    AuctionRequest, AuctionResults, StartRequest, StartResult, StopRequest, StopResult,
    TaskRequest, TaskResult,
};

/// Run one batch through the auction. Cell views are mutated in place as
/// winners are decided, so the fleet snapshot reflects every decision made
/// earlier in the same batch by the time a later request is scored.
pub async fn schedule(
    pool: &WorkerPool,
    cells: &mut HashMap<String, CellView>,
    clock: &dyn Clock,
    request: AuctionRequest,
) -> AuctionResults {
    let batch_id = TraceId::default();
    let span = tracing::info_span!(
        "schedule",
        batch_id = %batch_id.as_str(),
        starts = request.starts.len(),
        stops = request.stops.len(),
        tasks = request.tasks.len(),
    );

    run_batch(pool, cells, clock, request)
        .instrument(span)
        .await
}

async fn run_batch(
    pool: &WorkerPool,
    cells: &mut HashMap<String, CellView>,
    clock: &dyn Clock,
    request: AuctionRequest,
) -> AuctionResults {
    let mut results = AuctionResults::default();

    // A fleet with no cells at all cannot bid on anything; fail the whole
    // batch up front rather than running three empty auctions.
    if cells.is_empty() {
        for req in request.starts {
            results.failed_starts.push(StartResult {
                spec: req.spec,
                attempts: req.attempts + 1,
                submitted_at_ms: req.submitted_at_ms,
                winner: None,
                wait_duration_ms: None,
            });
        }
        for req in request.stops {
            results.failed_stops.push(StopResult {
                process_guid: req.process_guid,
                index: req.index,
                attempts: req.attempts + 1,
                submitted_at_ms: req.submitted_at_ms,
                winner: None,
                wait_duration_ms: None,
            });
        }
        for req in request.tasks {
            results.failed_tasks.push(TaskResult {
                spec: req.spec,
                attempts: req.attempts + 1,
                submitted_at_ms: req.submitted_at_ms,
                winner: None,
                wait_duration_ms: None,
            });
        }
        return results;
    }

    // Large-first: bigger requests are placed while the fleet still has the
    // most room, so a large item is never starved of capacity by smaller
    // ones from the same batch that happened to be listed first.
    let mut starts = request.starts;
    starts.sort_by(|a, b| b.spec.memory_mb.cmp(&a.spec.memory_mb));

    let mut tasks = request.tasks;
    tasks.sort_by(|a, b| b.spec.memory_mb.cmp(&a.spec.memory_mb));

    for req in starts {
        let result = auction_start(pool, cells, clock, req).await;
        if result.winner.is_some() {
            results.successful_starts.push(result);
        } else {
            results.failed_starts.push(result);
        }
    }

    for req in request.stops {
        let result = auction_stop(pool, cells, clock, req).await;
        // Stop auctions never fail outright before the commit phase: either
        // a keeper is chosen, or the duplicate is already gone and that is
        // itself a (silent) success.
        results.successful_stops.push(result);
    }

    for req in tasks {
        let result = auction_task(pool, cells, clock, req).await;
        if result.winner.is_some() {
            results.successful_tasks.push(result);
        } else {
            results.failed_tasks.push(result);
        }
    }

    let failed_by_cell = commit_phase(pool, cells).await;
    reclassify_after_commit(&mut results, failed_by_cell);

    results
}

/// Collect bids from every cell concurrently. Each worker scores against an
/// owned snapshot of that cell's view and never mutates anything.
async fn collect_bids<F, T>(pool: &WorkerPool, cells: &HashMap<String, CellView>, score: F) -> Vec<(String, Result<T, CellError>)>
where
    F: Fn(&CellView) -> Result<T, CellError> + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    let jobs: Vec<_> = cells
        .iter()
        .map(|(id, view)| {
            let snapshot = view.clone();
            let id = id.clone();
            let score = score.clone();
            async move { (id, score(&snapshot)) }
        })
        .collect();

    pool.run(jobs).await
}

/// Pick the minimum-score bid, breaking ties lexicographically on cell id.
fn select_winner<T>(bids: Vec<(String, Result<T, CellError>)>) -> Option<(String, T)>
where
    T: HasScore,
{
    let mut candidates: Vec<(String, T)> = bids.into_iter().filter_map(|(id, r)| r.ok().map(|v| (id, v))).collect();

    candidates.sort_by(|(id_a, a), (id_b, b)| {
        a.score()
            .partial_cmp(&b.score())
            .expect("scores must be finite")
            .then_with(|| id_a.cmp(id_b))
    });

    candidates.into_iter().next()
}

trait HasScore {
    fn score(&self) -> f64;
}

impl HasScore for f64 {
    fn score(&self) -> f64 {
        *self
    }
}

impl HasScore for cell::StopBid {
    fn score(&self) -> f64 {
        self.score
    }
}

async fn auction_start(
    pool: &WorkerPool,
    cells: &mut HashMap<String, CellView>,
    clock: &dyn Clock,
    req: StartRequest,
) -> StartResult {
    let spec = req.spec;
    let attempts = req.attempts + 1;

    let bid_spec = spec.clone();
    let bids = collect_bids(pool, cells, move |view: &CellView| view.score_for_start(&bid_spec)).await;
    let winner = select_winner(bids);

    match winner {
        None => {
            info!(process_guid = %spec.process_guid, "start auction failed: no eligible cell");
            StartResult {
                spec,
                attempts,
                submitted_at_ms: req.submitted_at_ms,
                winner: None,
                wait_duration_ms: None,
            }
        }
        Some((winner_id, _score)) => {
            let cell_view = cells
                .get_mut(&winner_id)
                .expect("winning cell id must still be present in the fleet map");
            cell_view
                .start_lrp(spec.clone())
                .expect("a cell that won its own bid must be able to apply it");

            let wait_ms = clock.now_ms().saturating_sub(req.submitted_at_ms);
            debug!(winner = %winner_id, process_guid = %spec.process_guid, "start auction won");

            StartResult {
                spec,
                attempts,
                submitted_at_ms: req.submitted_at_ms,
                winner: Some(winner_id),
                wait_duration_ms: Some(wait_ms),
            }
        }
    }
}

async fn auction_task(
    pool: &WorkerPool,
    cells: &mut HashMap<String, CellView>,
    clock: &dyn Clock,
    req: TaskRequest,
) -> TaskResult {
    let spec = req.spec;
    let attempts = req.attempts + 1;

    let bid_spec = spec.clone();
    let bids = collect_bids(pool, cells, move |view: &CellView| view.score_for_task(&bid_spec)).await;
    let winner = select_winner(bids);

    match winner {
        None => {
            info!(task_guid = %spec.task_guid, "task auction failed: no eligible cell");
            TaskResult {
                spec,
                attempts,
                submitted_at_ms: req.submitted_at_ms,
                winner: None,
                wait_duration_ms: None,
            }
        }
        Some((winner_id, _score)) => {
            let cell_view = cells
                .get_mut(&winner_id)
                .expect("winning cell id must still be present in the fleet map");
            cell_view
                .start_task(spec.clone())
                .expect("a cell that won its own bid must be able to apply it");

            let wait_ms = clock.now_ms().saturating_sub(req.submitted_at_ms);
            debug!(winner = %winner_id, task_guid = %spec.task_guid, "task auction won");

            TaskResult {
                spec,
                attempts,
                submitted_at_ms: req.submitted_at_ms,
                winner: Some(winner_id),
                wait_duration_ms: Some(wait_ms),
            }
        }
    }
}

async fn auction_stop(
    pool: &WorkerPool,
    cells: &mut HashMap<String, CellView>,
    clock: &dyn Clock,
    req: StopRequest,
) -> StopResult {
    let process_guid = req.process_guid.clone();
    let index = req.index;
    let attempts = req.attempts + 1;

    let bids = collect_bids(pool, cells, move |view: &CellView| {
        view.score_for_stop(&process_guid, index)
    })
    .await;

    let matches: HashMap<String, cell::StopBid> = bids
        .into_iter()
        .filter_map(|(id, r)| r.ok().map(|bid| (id, bid)))
        .collect();

    let wait_ms = clock.now_ms().saturating_sub(req.submitted_at_ms);

    if matches.is_empty() {
        info!(process_guid = %req.process_guid, index, "stop auction is a no-op: duplicate already gone");
        return StopResult {
            process_guid: req.process_guid,
            index: req.index,
            attempts,
            submitted_at_ms: req.submitted_at_ms,
            winner: None,
            wait_duration_ms: Some(wait_ms),
        };
    }

    let mut ordered: Vec<(&String, &cell::StopBid)> = matches.iter().collect();
    ordered.sort_by(|(id_a, a), (id_b, b)| {
        a.score
            .partial_cmp(&b.score)
            .expect("scores must be finite")
            .then_with(|| id_a.cmp(id_b))
    });
    let winner_id = ordered[0].0.clone();

    for (cell_id, bid) in &matches {
        if *cell_id == winner_id {
            // The keeper stops all but the first of its own duplicates.
            for instance_guid in bid.matching_instance_guids.iter().skip(1) {
                let view = cells.get_mut(cell_id).expect("cell must still be present");
                view.stop_lrp(&req.process_guid, instance_guid, req.index)
                    .expect("instance reported by this cell's own bid must still be there");
            }
        } else {
            for instance_guid in &bid.matching_instance_guids {
                let view = cells.get_mut(cell_id).expect("cell must still be present");
                view.stop_lrp(&req.process_guid, instance_guid, req.index)
                    .expect("instance reported by this cell's own bid must still be there");
            }
        }
    }

    debug!(winner = %winner_id, process_guid = %req.process_guid, index, "stop auction resolved");

    StopResult {
        process_guid: req.process_guid,
        index: req.index,
        attempts,
        submitted_at_ms: req.submitted_at_ms,
        winner: Some(winner_id),
        wait_duration_ms: Some(wait_ms),
    }
}

/// Commit every cell with pending work, concurrently, and report which
/// cell's work (if any) came back as refused.
async fn commit_phase(
    pool: &WorkerPool,
    cells: &mut HashMap<String, cell::CellView>,
) -> HashMap<String, cell::FailedWork> {
    let pending_ids: Vec<String> = cells
        .iter()
        .filter(|(_, view)| view.has_pending_work())
        .map(|(id, _)| id.clone())
        .collect();

    let jobs: Vec<_> = pending_ids
        .iter()
        .map(|id| {
            let mut view = cells.remove(id).expect("id was just read from this map");
            let id = id.clone();
            async move {
                let failed = view.commit().await;
                (id, view, failed)
            }
        })
        .collect();

    let outcomes = pool.run(jobs).await;

    let mut failed_by_cell = HashMap::new();
    for (id, view, failed) in outcomes {
        cells.insert(id.clone(), view);
        if !failed.is_empty() {
            warn!(cell_id = %id, "commit returned refused work, reclassifying as failures");
            failed_by_cell.insert(id, failed);
        }
    }
    failed_by_cell
}

fn reclassify_after_commit(
    results: &mut AuctionResults,
    failed_by_cell: HashMap<String, cell::FailedWork>,
) {
    let mut failed_starts: Vec<StartSpec> = Vec::new();
    let mut failed_stops: Vec<ActualLrpStop> = Vec::new();
    let mut failed_tasks: Vec<TaskSpec> = Vec::new();

    for work in failed_by_cell.into_values() {
        failed_starts.extend(work.starts);
        failed_stops.extend(work.stops);
        failed_tasks.extend(work.tasks);
    }

    for spec in &failed_starts {
        if let Some(pos) = results
            .successful_starts
            .iter()
            .position(|r| r.spec.instance_guid == spec.instance_guid)
        {
            let mut moved = results.successful_starts.remove(pos);
            moved.winner = None;
            moved.wait_duration_ms = None;
            results.failed_starts.push(moved);
        }
    }

    for stop in &failed_stops {
        if let Some(pos) = results
            .successful_stops
            .iter()
            .position(|r| r.process_guid == stop.process_guid && r.index == stop.index)
        {
            let mut moved = results.successful_stops.remove(pos);
            moved.winner = None;
            moved.wait_duration_ms = None;
            results.failed_stops.push(moved);
        }
    }

    for spec in &failed_tasks {
        if let Some(pos) = results
            .successful_tasks
            .iter()
            .position(|r| r.spec.task_guid == spec.task_guid)
        {
            let mut moved = results.successful_tasks.remove(pos);
            moved.winner = None;
            moved.wait_duration_ms = None;
            results.failed_tasks.push(moved);
        }
    }
}

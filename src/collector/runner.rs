use std::time::{Duration, Instant};

use super::context::CollectorContext;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{CollectorError, Result};
use crate::metrics::RuntimeMetrics;
use crate::schema::{PriceStatus, WorkUnit};
use crate::shutdown::Shutdown;
use crate::util;

/// Lifecycle of one work unit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InFlight,
    /// Found or NotFound recorded
    Completed,
    /// Filtered out by resume or missing-only
    Skipped,
    /// Unavailable placeholder recorded
    Failed,
}

/// Outcome of `collect`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub work_set_size: usize,
    /// Index the run started from after resume handling
    pub start_index: usize,
    /// Units sent to the market client
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub requests_sent: usize,
    /// Resume position persisted at the end of the run
    pub last_processed_index: usize,
    pub interrupted: bool,
}

/// Loads the catalog, builds the context and collects.
///
/// The catalog is read before anything touches the network; a
/// broken catalog aborts here.
pub async fn run(config: Config, shutdown: Shutdown) -> Result<RunSummary> {
    config.validate()?;

    let catalog = Catalog::load(&config.catalog_path)?;
    let units = catalog.work_units(config.ignore_stat_trak);
    log::info!(
        "Work set: {} units ({})",
        units.len(),
        if config.ignore_stat_trak { "StatTrak excluded" } else { "StatTrak included" }
    );

    let mut ctx = CollectorContext::build(config, shutdown).await?;
    let collected = collect(&mut ctx, &units).await;

    // finish even after an error so progress so far is flushed
    let finished = ctx.finish().await;
    let summary = collected?;
    finished?;
    Ok(summary)
}

/// Drives every unit of `units` through the market client.
///
/// FILTERS (in order):
/// 1. StatTrak exclusion (already applied when `units` was built)
/// 2. resume: indices below the checkpoint position are skipped, and
///    so are completed units past it
/// 3. missing-only: units already Found are skipped instead
/// 4. limit: at most `limit` units go to the market client
///
/// RESUME POSITION:
/// - The saved index is only trusted for the work set it was
///   written against (same StatTrak filter and size). Otherwise it
///   is re-derived as the longest completed prefix of `units`.
/// - A missing-only run over a fully walked work set is a separate
///   pass with its own cursor; `lastProcessedIndex` is left alone.
///
/// GUARANTEES:
/// - A unit's permanent failure is recorded as Unavailable and the
///   loop continues
/// - Every processed unit is persisted before the next one starts
/// - On shutdown the loop stops between units; an interrupted unit
///   is not recorded
pub async fn collect(ctx: &mut CollectorContext, units: &[WorkUnit]) -> Result<RunSummary> {
    let size = units.len();
    let ignore_stat_trak = ctx.config.ignore_stat_trak;
    let resume = ctx.config.resume;
    let missing_only = ctx.config.missing_only;
    let limit = ctx.config.effective_limit();
    let progress_interval = ctx.config.progress_interval.max(1);

    // ------------------------------------------------------------
    // Resume position
    // ------------------------------------------------------------
    let saved = ctx.store.state();
    let work_set_changed = saved.ignore_stat_trak != ignore_stat_trak
        || (saved.work_set_size != 0 && saved.work_set_size != size);

    let mut start = if resume && !saved.completed.is_empty() && work_set_changed {
        let anchored = units
            .iter()
            .take_while(|u| ctx.store.is_completed(&u.id()))
            .count();
        log::warn!(
            "Checkpoint was written for another work set ({} units, ignoreStatTrak={}), resuming by completed units from index {}",
            saved.work_set_size,
            saved.ignore_stat_trak,
            anchored
        );
        ctx.store.reanchor(anchored);
        anchored
    } else if resume {
        ctx.store.last_processed_index()
    } else {
        0
    };

    let missing_pass = missing_only && size > 0 && start >= size;
    if missing_pass {
        start = ctx.store.missing_pass_index().unwrap_or(0).min(size);
        if start == 0 {
            log::info!("Previous pass complete, starting a missing-only pass from the beginning");
        } else {
            log::info!("Continuing the missing-only pass at index {}/{}", start, size);
        }
    }

    ctx.store.bind_work_set(ignore_stat_trak, size);

    if start > 0 && !missing_pass {
        log::info!("Resuming at index {}/{}", start.min(size), size);
    }

    let mut summary = RunSummary {
        work_set_size: size,
        start_index: start,
        ..RunSummary::default()
    };
    let started = Instant::now();
    let mut walked_to_end = true;

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    for (index, unit) in units.iter().enumerate().skip(start) {
        if ctx.shutdown.is_triggered() {
            summary.interrupted = true;
            walked_to_end = false;
            break;
        }

        let id = unit.id();
        let mut state = UnitState::Pending;

        let done = if missing_only {
            ctx.store.is_found(&id)
        } else {
            resume && ctx.store.is_completed(&id)
        };
        if done {
            state = UnitState::Skipped;
            log::debug!("[{}] {} -> {:?}", index, id, state);
            RuntimeMetrics::incr(&ctx.metrics.skipped);
            summary.skipped += 1;
            if missing_pass {
                ctx.store.advance_pass(index);
            } else {
                ctx.store.advance_past(index);
            }
            continue;
        }

        if limit.is_some_and(|l| summary.processed >= l) {
            log::info!("Limit of {} units reached", summary.processed);
            walked_to_end = false;
            break;
        }

        debug_assert_eq!(state, UnitState::Pending);
        state = UnitState::InFlight;
        log::debug!("[{}] {} -> {:?}", index, id, state);

        let result = match ctx.client.fetch_price(unit).await {
            Ok(result) => result,
            Err(CollectorError::Interrupted) => {
                log::info!("Interrupted while processing {}, it will be retried on resume", id);
                summary.interrupted = true;
                walked_to_end = false;
                break;
            }
            Err(e) => return Err(e),
        };

        state = match result.status {
            PriceStatus::Found => {
                RuntimeMetrics::incr(&ctx.metrics.found);
                summary.found += 1;
                UnitState::Completed
            }
            PriceStatus::NotFound => {
                RuntimeMetrics::incr(&ctx.metrics.not_found);
                summary.not_found += 1;
                UnitState::Completed
            }
            PriceStatus::Unavailable => {
                RuntimeMetrics::incr(&ctx.metrics.unavailable);
                summary.failed += 1;
                UnitState::Failed
            }
        };
        match result.price {
            Some(price) => log::debug!("[{}] {} -> {:?} {} {}", index, id, state, price, result.currency),
            None => log::debug!("[{}] {} -> {:?}", index, id, state),
        }

        // lastProcessedIndex is already past `index` during a pass
        if missing_pass {
            ctx.store.advance_pass(index);
        }
        ctx.store.record_result(index, result).await?;
        summary.processed += 1;

        if summary.processed % progress_interval == 0 {
            let in_window = ctx.limiter.in_window().await;
            log_progress(&summary, index, limit, in_window, started.elapsed());
        }
    }

    if ctx.shutdown.is_triggered() {
        summary.interrupted = true;
        walked_to_end = false;
    }
    if missing_pass && walked_to_end {
        ctx.store.finish_pass();
    }
    summary.last_processed_index = ctx.store.last_processed_index();
    summary.requests_sent = ctx.metrics.snapshot().requests_sent;

    log_summary(&summary, ctx.client.currency(), started.elapsed());
    Ok(summary)
}

fn log_progress(
    summary: &RunSummary,
    index: usize,
    limit: Option<usize>,
    in_window: usize,
    elapsed: Duration,
) {
    let per_minute = summary.processed as f64 / elapsed.as_secs_f64().max(1e-3) * 60.0;

    let mut remaining = summary.work_set_size.saturating_sub(index + 1);
    if let Some(limit) = limit {
        remaining = remaining.min(limit.saturating_sub(summary.processed));
    }
    let eta = if per_minute > 0.0 {
        util::format_duration(Duration::from_secs_f64(remaining as f64 / per_minute * 60.0))
    } else {
        "unknown".to_string()
    };

    log::info!(
        "Progress: {}/{} | found {} | not found {} | failed {} | skipped {} | {:.1}/min | {} in window | ETA {}",
        index + 1,
        summary.work_set_size,
        summary.found,
        summary.not_found,
        summary.failed,
        summary.skipped,
        per_minute,
        in_window,
        eta
    );
}

fn log_summary(summary: &RunSummary, currency: &str, elapsed: Duration) {
    log::info!(
        "{} after {}: {} processed ({} found in {}, {} not found, {} failed), {} skipped, next index {}/{}",
        if summary.interrupted { "Interrupted" } else { "Collection finished" },
        util::format_duration(elapsed),
        summary.processed,
        summary.found,
        currency,
        summary.not_found,
        summary.failed,
        summary.skipped,
        summary.last_processed_index,
        summary.work_set_size
    );
}

/// Collector module
///
/// This module groups all logic responsible for:
/// - Building the run context (limiter, proxy pool, client, checkpoint)
/// - Walking the work set and applying the resume / missing-only / limit filters
/// - Recording every outcome in the checkpoint
///
/// The collector layer is the orchestration layer between:
/// - The market client (rate limiting, proxies, retries)
/// - The checkpoint store (durable progress)
///
/// Design notes:
/// - Market-specific logic MUST NOT live here
/// - Per-unit failures never abort the loop
pub mod context;
pub mod runner;

pub use context::CollectorContext;
pub use runner::{collect, run, RunSummary, UnitState};

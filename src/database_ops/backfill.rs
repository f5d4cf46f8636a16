//! Backfill stage: fetch every store of one segment, resumably.
//!
//! The checkpoint is saved after every store the cursor passes, so an
//! interrupted run loses at most the store that was in flight.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::database_ops::checkpoint::{Checkpoint, CheckpointStore, Stage};
use crate::database_ops::custard::{FlavorSource, Store, StoreDetail};
use crate::database_ops::db::{FetchSummary, FlavorDb};
use crate::database_ops::layout::DataLayout;
use crate::database_ops::segments::Segment;
use crate::util::json_file::{append_json_line, read_json_opt, write_json_atomic};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing {} for segment {segment}; run the discover stage first", .path.display())]
    MissingSegment { segment: Segment, path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub segment: Segment,
    pub stores_per_run: usize,
    pub sleep_ms: u64,
    pub timeout: Duration,
    pub stop_on_error: bool,
}

/// Run-local counters; lifetime progress lives in the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillTally {
    pub processed: usize,
    pub success: usize,
    pub failures: usize,
    pub flavor_counts: Vec<usize>,
}

impl BackfillTally {
    fn median_flavors(&self) -> Option<usize> {
        if self.flavor_counts.is_empty() {
            return None;
        }
        let mut sorted = self.flavor_counts.clone();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub segment: Segment,
    pub done: bool,
    pub stores_total: usize,
    pub processed_this_run: usize,
    pub success_this_run: usize,
    pub failures_this_run: usize,
    pub next_index: usize,
    pub remaining: usize,
    pub median_flavors: Option<usize>,
    #[serde(skip)]
    pub stop_on_error: bool,
}

impl BackfillSummary {
    /// 2 tells an external scheduler to pause: stop-on-error was requested and
    /// this run hit a failure.
    pub fn exit_code(&self) -> u8 {
        if self.stop_on_error && self.failures_this_run > 0 {
            2
        } else {
            0
        }
    }
}

/// Read a segment list written by discovery. Absence is a configuration error.
pub fn load_segment(layout: &DataLayout, segment: Segment) -> Result<Vec<Store>> {
    let path = layout.segment_path(segment);
    match read_json_opt::<Vec<Store>>(&path)? {
        Some(stores) => Ok(stores),
        None => Err(StageError::MissingSegment { segment, path }.into()),
    }
}

/// Side files kept next to the database for each successful fetch.
fn write_fetch_artifacts(
    layout: &DataLayout,
    segment: Segment,
    store: &Store,
    detail: &StoreDetail,
    summary: &FetchSummary,
    seen_at: DateTime<Utc>,
) -> Result<()> {
    let name = if detail.name.is_empty() {
        store.name.as_str()
    } else {
        detail.name.as_str()
    };
    let calendar = json!({
        "fetched_at": seen_at,
        "segment": segment,
        "store": {
            "slug": store.slug,
            "name": name,
            "address": detail.address,
            "city": store.city,
            "state": store.state,
        },
        "flavors": detail.flavors,
    });
    write_json_atomic(&layout.calendar_path(&store.slug), &calendar)?;

    append_json_line(
        &layout.snapshot_log(),
        &json!({
            "fetched_at": seen_at,
            "segment": segment,
            "store_slug": store.slug,
            "flavor_count": summary.count,
            "min_date": summary.min_date,
            "max_date": summary.max_date,
        }),
    )
}

/// Walk the segment list from the checkpoint cursor, fetching and persisting up
/// to `stores_per_run` stores. Returns the advanced checkpoint, which has
/// already been saved after every processed store.
pub async fn backfill_step<S>(
    source: &S,
    db: &mut FlavorDb,
    layout: &DataLayout,
    stores: &[Store],
    mut checkpoint: Checkpoint,
    opts: &BackfillOptions,
) -> Result<(Checkpoint, BackfillTally)>
where
    S: FlavorSource + ?Sized,
{
    let stage = Stage::Backfill(opts.segment);
    let checkpoints = CheckpointStore::new(layout.clone());
    let mut tally = BackfillTally::default();

    while checkpoint.next_index < stores.len() && tally.processed < opts.stores_per_run {
        let index = checkpoint.next_index;
        let store = &stores[index];

        if checkpoint.completed_slugs.contains(&store.slug) {
            checkpoint.next_index += 1;
            checkpoints
                .save(stage, &checkpoint)
                .with_context(|| format!("failed to save {} checkpoint", stage.name()))?;
            continue;
        }

        match source.fetch_detail(&store.slug, opts.timeout).await {
            Ok(detail) => {
                let seen_at = Utc::now();
                let summary = db
                    .record_fetch(opts.segment, store, &detail, seen_at)
                    .with_context(|| format!("failed to persist {}", store.slug))?;
                // The database row is committed; side files are best effort.
                if let Err(err) =
                    write_fetch_artifacts(layout, opts.segment, store, &detail, &summary, seen_at)
                {
                    warn!(slug = %store.slug, error = ?err, "failed to write calendar artifacts");
                }

                checkpoint.completed_slugs.insert(store.slug.clone());
                tally.success += 1;
                tally.flavor_counts.push(summary.count);
                info!(
                    segment = %opts.segment,
                    index = index + 1,
                    total = stores.len(),
                    slug = %store.slug,
                    count = summary.count,
                    min_date = summary.min_date.as_deref().unwrap_or("-"),
                    max_date = summary.max_date.as_deref().unwrap_or("-"),
                    "ok"
                );
            }
            Err(err) => {
                tally.failures += 1;
                warn!(
                    stage = stage.name(),
                    segment = %opts.segment,
                    index,
                    slug = %store.slug,
                    kind = err.kind(),
                    error = %err,
                    "fetch failed"
                );
                if opts.stop_on_error {
                    break;
                }
            }
        }

        tally.processed += 1;
        checkpoint.next_index += 1;
        checkpoint.touch(Utc::now());
        checkpoints
            .save(stage, &checkpoint)
            .with_context(|| format!("failed to save {} checkpoint", stage.name()))?;

        if opts.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.sleep_ms)).await;
        }
    }

    Ok((checkpoint, tally))
}

/// One bounded backfill invocation for `opts.segment`.
#[instrument(skip_all, fields(segment = %opts.segment, stores_per_run = opts.stores_per_run))]
pub async fn run_backfill<S>(
    source: &S,
    layout: &DataLayout,
    opts: &BackfillOptions,
) -> Result<BackfillSummary>
where
    S: FlavorSource + ?Sized,
{
    let stores = load_segment(layout, opts.segment)?;
    let stage = Stage::Backfill(opts.segment);
    let checkpoints = CheckpointStore::new(layout.clone());
    let checkpoint = checkpoints
        .load(stage)
        .with_context(|| format!("failed to load {} checkpoint", stage.name()))?;
    let mut db = FlavorDb::open(layout.db_path())?;

    let (mut checkpoint, tally) =
        backfill_step(source, &mut db, layout, &stores, checkpoint, opts).await?;
    checkpoint.touch(Utc::now());
    checkpoints
        .save(stage, &checkpoint)
        .with_context(|| format!("failed to save {} checkpoint", stage.name()))?;

    let summary = BackfillSummary {
        segment: opts.segment,
        done: checkpoint.next_index >= stores.len(),
        stores_total: stores.len(),
        processed_this_run: tally.processed,
        success_this_run: tally.success,
        failures_this_run: tally.failures,
        next_index: checkpoint.next_index,
        remaining: stores.len().saturating_sub(checkpoint.next_index),
        median_flavors: tally.median_flavors(),
        stop_on_error: opts.stop_on_error,
    };
    info!(
        next_index = summary.next_index,
        success = summary.success_this_run,
        failures = summary.failures_this_run,
        done = summary.done,
        "backfill run finished"
    );
    Ok(summary)
}

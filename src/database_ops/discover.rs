//! Discovery stage: enumerate the store keyspace through the search endpoint.
//!
//! There is no listing endpoint, so every two-character token over
//! `[a-z0-9]` is searched once. The token list is fixed, which makes
//! `next_index` a stable cursor across runs.
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::database_ops::checkpoint::{Checkpoint, CheckpointStore, Stage};
use crate::database_ops::custard::FlavorSource;
use crate::database_ops::layout::DataLayout;
use crate::database_ops::segments::{partition, Segment};
use crate::util::json_file::write_json_atomic;

pub const TOKEN_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// All two-character search tokens, in alphabet order (1296 of them).
pub fn discovery_tokens() -> Vec<String> {
    let mut out = Vec::with_capacity(TOKEN_ALPHABET.len() * TOKEN_ALPHABET.len());
    for a in TOKEN_ALPHABET.chars() {
        for b in TOKEN_ALPHABET.chars() {
            out.push(format!("{a}{b}"));
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub tokens_per_run: usize,
    pub sleep_ms: u64,
    pub timeout: Duration,
}

/// Outcome of advancing a discovery checkpoint through one budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverStep {
    pub processed: usize,
    pub failed_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoverSummary {
    pub done: bool,
    pub processed_tokens_this_run: usize,
    pub completed_tokens_total: usize,
    pub total_tokens: usize,
    pub stores_total: usize,
    pub stores_primary: usize,
    pub stores_remainder: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_token: Option<String>,
}

/// Search up to `tokens_per_run` tokens starting at the checkpoint cursor and
/// merge results into its registry. Stops at the first failed search without
/// advancing past it.
pub async fn discover_step<S>(
    source: &S,
    tokens: &[String],
    mut checkpoint: Checkpoint,
    opts: &DiscoverOptions,
) -> (Checkpoint, DiscoverStep)
where
    S: FlavorSource + ?Sized,
{
    let mut step = DiscoverStep {
        processed: 0,
        failed_token: None,
    };

    while checkpoint.next_index < tokens.len() && step.processed < opts.tokens_per_run {
        let token = &tokens[checkpoint.next_index];
        match source.search(token, opts.timeout).await {
            Ok(found) => {
                for store in found {
                    checkpoint.stores.insert(store.slug.clone(), store);
                }
            }
            Err(err) => {
                warn!(
                    stage = "discover",
                    index = checkpoint.next_index,
                    token = %token,
                    kind = err.kind(),
                    error = %err,
                    "search failed; stopping this run"
                );
                step.failed_token = Some(token.clone());
                break;
            }
        }

        checkpoint.next_index += 1;
        step.processed += 1;

        if opts.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.sleep_ms)).await;
        }
    }

    (checkpoint, step)
}

/// One bounded discovery invocation: load, search, partition, persist.
#[instrument(skip_all, fields(tokens_per_run = opts.tokens_per_run))]
pub async fn run_discover<S>(
    source: &S,
    layout: &DataLayout,
    opts: &DiscoverOptions,
) -> Result<DiscoverSummary>
where
    S: FlavorSource + ?Sized,
{
    let checkpoints = CheckpointStore::new(layout.clone());
    let tokens = discovery_tokens();
    let checkpoint = checkpoints
        .load(Stage::Discover)
        .context("failed to load discover checkpoint")?;
    let resumed_at = checkpoint.next_index;

    let (mut checkpoint, step) = discover_step(source, &tokens, checkpoint, opts).await;
    checkpoint.touch(Utc::now());

    let segments = partition(&checkpoint.stores);
    write_json_atomic(&layout.stores_path(), &segments.all)?;
    for segment in Segment::ALL {
        write_json_atomic(&layout.segment_path(segment), segments.get(segment))?;
    }
    checkpoints
        .save(Stage::Discover, &checkpoint)
        .context("failed to save discover checkpoint")?;

    let summary = DiscoverSummary {
        done: checkpoint.next_index >= tokens.len(),
        processed_tokens_this_run: step.processed,
        completed_tokens_total: checkpoint.next_index,
        total_tokens: tokens.len(),
        stores_total: segments.all.len(),
        stores_primary: segments.primary.len(),
        stores_remainder: segments.remainder.len(),
        failed_token: step.failed_token,
    };
    info!(
        resumed_at,
        next_index = summary.completed_tokens_total,
        processed = summary.processed_tokens_this_run,
        stores = summary.stores_total,
        done = summary.done,
        "discover run finished"
    );
    Ok(summary)
}

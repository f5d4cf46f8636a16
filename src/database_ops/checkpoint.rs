//! Durable per-stage progress records.
//!
//! One JSON file per stage under `<data>/state/`. Loading an absent file yields
//! a fresh zero-progress checkpoint; saving goes through a temp file + rename so
//! a reader never sees half of a write.
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::database_ops::custard::Store;
use crate::database_ops::layout::DataLayout;
use crate::database_ops::segments::Segment;
use crate::util::json_file::{read_json_opt, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Discover,
    Backfill(Segment),
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Backfill(Segment::Primary) => "backfill-primary",
            Stage::Backfill(Segment::Remainder) => "backfill-remainder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
    /// Cursor into the stage's ordered workload.
    #[serde(default)]
    pub next_index: usize,
    /// Backfill only: slugs already fetched and persisted.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub completed_slugs: BTreeSet<String>,
    /// Discovery only: registry accumulated so far, keyed by slug.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stores: BTreeMap<String, Store>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            next_index: 0,
            completed_slugs: BTreeSet::new(),
            stores: BTreeMap::new(),
            last_updated_at: None,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = Some(now);
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: DataLayout,
}

impl CheckpointStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Load the stage checkpoint, or a fresh one if it was never saved.
    pub fn load(&self, stage: Stage) -> Result<Checkpoint> {
        Ok(self
            .try_load(stage)?
            .unwrap_or_else(|| Checkpoint::fresh(Utc::now())))
    }

    /// Load without creating a default; used by read-only reporting.
    pub fn try_load(&self, stage: Stage) -> Result<Option<Checkpoint>> {
        read_json_opt(&self.layout.checkpoint_path(stage))
    }

    pub fn save(&self, stage: Stage, checkpoint: &Checkpoint) -> Result<()> {
        write_json_atomic(&self.layout.checkpoint_path(stage), checkpoint)
    }
}

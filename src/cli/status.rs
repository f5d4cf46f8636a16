use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database_ops::checkpoint::{CheckpointStore, Stage};
use crate::database_ops::custard::Store;
use crate::database_ops::db::{FlavorDb, RegionCount};
use crate::database_ops::layout::DataLayout;
use crate::database_ops::segments::Segment;
use crate::util::json_file::read_json_opt;

const TOP_REGIONS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStatus {
    pub tokens_completed: usize,
    pub stores_found_total: usize,
    pub stores_found_primary: usize,
    pub stores_found_remainder: usize,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentStatus {
    pub next_index: usize,
    pub completed: usize,
    pub total: usize,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStatus {
    pub primary: SegmentStatus,
    pub remainder: SegmentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStatus {
    pub stores: i64,
    pub store_flavor_rows: i64,
    pub snapshots: i64,
    pub top_states: Vec<RegionCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paths {
    pub data_dir: String,
    pub db: String,
    pub primary_state: String,
    pub remainder_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub discovery: DiscoveryStatus,
    pub backfill: BackfillStatus,
    pub database: DatabaseStatus,
    pub paths: Paths,
}

fn list_len(path: &std::path::Path) -> Result<usize> {
    Ok(read_json_opt::<Vec<Store>>(path)?.map_or(0, |v| v.len()))
}

fn segment_status(
    checkpoints: &CheckpointStore,
    layout: &DataLayout,
    segment: Segment,
) -> Result<SegmentStatus> {
    let total = list_len(&layout.segment_path(segment))?;
    Ok(match checkpoints.try_load(Stage::Backfill(segment))? {
        Some(cp) => SegmentStatus {
            next_index: cp.next_index,
            completed: cp.completed_slugs.len(),
            total,
            last_updated_at: cp.last_updated_at,
        },
        None => SegmentStatus {
            total,
            ..Default::default()
        },
    })
}

fn database_status(layout: &DataLayout) -> Result<DatabaseStatus> {
    let Some(db) = FlavorDb::open_read_only(layout.db_path())? else {
        return Ok(DatabaseStatus::default());
    };
    Ok(DatabaseStatus {
        stores: db.count_rows("stores")?,
        store_flavor_rows: db.count_rows("store_flavors")?,
        snapshots: db.count_rows("snapshots")?,
        top_states: db.top_regions(TOP_REGIONS)?,
    })
}

/// Aggregate checkpoints, segment lists and the database without writing anything.
pub fn collect(layout: &DataLayout) -> Result<StatusReport> {
    let checkpoints = CheckpointStore::new(layout.clone());
    let discover = checkpoints.try_load(Stage::Discover)?;

    let discovery = DiscoveryStatus {
        tokens_completed: discover.as_ref().map_or(0, |cp| cp.next_index),
        stores_found_total: list_len(&layout.stores_path())?,
        stores_found_primary: list_len(&layout.segment_path(Segment::Primary))?,
        stores_found_remainder: list_len(&layout.segment_path(Segment::Remainder))?,
        last_updated_at: discover.and_then(|cp| cp.last_updated_at),
    };
    let backfill = BackfillStatus {
        primary: segment_status(&checkpoints, layout, Segment::Primary)?,
        remainder: segment_status(&checkpoints, layout, Segment::Remainder)?,
    };

    Ok(StatusReport {
        discovery,
        backfill,
        database: database_status(layout)?,
        paths: Paths {
            data_dir: layout.root().display().to_string(),
            db: layout.db_path().display().to_string(),
            primary_state: layout
                .checkpoint_path(Stage::Backfill(Segment::Primary))
                .display()
                .to_string(),
            remainder_state: layout
                .checkpoint_path(Stage::Backfill(Segment::Remainder))
                .display()
                .to_string(),
        },
    })
}

pub fn run(layout: &DataLayout) -> Result<()> {
    let report = collect(layout)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

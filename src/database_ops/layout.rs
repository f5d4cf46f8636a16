use std::path::{Path, PathBuf};

use crate::database_ops::checkpoint::Stage;
use crate::database_ops::segments::Segment;

const MAX_FILE_STEM: usize = 200;

/// Map a remote slug onto a single file-name component. Bytes outside
/// `[A-Za-z0-9_-]` (and `.` in leading position) become `%XX`, so distinct
/// slugs never share a file and no slug can climb out of its directory.
pub fn file_stem_for_slug(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    for (i, b) in slug.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    // ASCII only from here, so byte truncation stays on a char boundary.
    out.truncate(MAX_FILE_STEM);
    out
}

/// On-disk layout of one backfill dataset.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn calendar_dir(&self) -> PathBuf {
        self.root.join("store_calendars")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("flavors.sqlite")
    }

    pub fn stores_path(&self) -> PathBuf {
        self.root.join("stores.json")
    }

    pub fn segment_path(&self, segment: Segment) -> PathBuf {
        self.root.join(format!("stores_{}.json", segment.label()))
    }

    pub fn snapshot_log(&self) -> PathBuf {
        self.root.join("snapshot_runs.ndjson")
    }

    pub fn checkpoint_path(&self, stage: Stage) -> PathBuf {
        self.state_dir().join(format!("{}.json", stage.name()))
    }

    pub fn calendar_path(&self, slug: &str) -> PathBuf {
        self.calendar_dir()
            .join(format!("{}.json", file_stem_for_slug(slug)))
    }
}

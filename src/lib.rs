//! Staged, checkpointed backfill of store flavor calendars.
//!
//! `discover` enumerates stores through the search endpoint and splits them
//! into segments; `backfill` fetches each segment's calendars into SQLite;
//! `status` reports progress. Every stage is bounded per invocation and
//! resumes from its checkpoint.
pub mod logging;

pub mod cli {
    pub mod status;
}

pub mod database_ops {
    pub mod backfill;
    pub mod checkpoint;
    pub mod custard;
    pub mod db;
    pub mod discover;
    pub mod layout;
    pub mod segments;
}

pub mod util {
    pub mod env;
    pub mod json_file;
}

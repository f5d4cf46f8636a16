//! Custard calendar API: typed records and the remote source seam.
//!
//! Stages only talk to [`FlavorSource`]; [`provider::CustardProvider`] is the
//! HTTP implementation and tests substitute scripted sources.
pub mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// A discovered store location. `slug` is the only identity field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
}

/// One dated flavor entry from a store's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Decoded detail response plus the raw payload it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDetail {
    pub name: String,
    pub address: String,
    pub flavors: Vec<Flavor>,
    pub raw: Value,
}

impl StoreDetail {
    /// Earliest and latest non-empty flavor date (ISO dates compare lexically).
    pub fn date_range(&self) -> (Option<String>, Option<String>) {
        let mut dates = self
            .flavors
            .iter()
            .map(|f| f.date.as_str())
            .filter(|d| !d.is_empty());
        let Some(first) = dates.next() else {
            return (None, None);
        };
        let (min, max) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        (Some(min.to_string()), Some(max.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network, timeout or server-side trouble; the same request may succeed later.
    #[error("transient fetch failure for {url}: {reason}")]
    Transient { url: String, reason: String },
    /// The server answered but not with the shape we decode.
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transient { .. } => "transient",
            FetchError::Malformed { .. } => "malformed",
        }
    }
}

/// The two remote operations the stages depend on. Implementations never retry.
#[async_trait]
pub trait FlavorSource: Send + Sync {
    /// Stores whose slug/name/city match `token`; empty when nothing matches.
    async fn search(&self, token: &str, timeout: Duration) -> Result<Vec<Store>, FetchError>;

    /// Flavor calendar for a single store.
    async fn fetch_detail(&self, slug: &str, timeout: Duration)
        -> Result<StoreDetail, FetchError>;
}

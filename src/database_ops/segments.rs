use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::database_ops::custard::Store;

/// Region backfilled first.
pub const PRIORITY_REGION: &str = "WI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Primary,
    Remainder,
}

impl Segment {
    pub const ALL: [Segment; 2] = [Segment::Primary, Segment::Remainder];

    pub fn label(self) -> &'static str {
        match self {
            Segment::Primary => "primary",
            Segment::Remainder => "remainder",
        }
    }

    pub fn for_region(region: &str) -> Self {
        if region.trim().eq_ignore_ascii_case(PRIORITY_REGION) {
            Segment::Primary
        } else {
            Segment::Remainder
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Registry split into the two segment lists, each sorted by slug.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub all: Vec<Store>,
    pub primary: Vec<Store>,
    pub remainder: Vec<Store>,
}

impl Partition {
    pub fn get(&self, segment: Segment) -> &[Store] {
        match segment {
            Segment::Primary => &self.primary,
            Segment::Remainder => &self.remainder,
        }
    }
}

/// Partition the registry. BTreeMap iteration order already sorts by slug, so
/// the lists are stable across recomputation.
pub fn partition(registry: &BTreeMap<String, Store>) -> Partition {
    let mut out = Partition::default();
    for store in registry.values() {
        out.all.push(store.clone());
        match Segment::for_region(&store.state) {
            Segment::Primary => out.primary.push(store.clone()),
            Segment::Remainder => out.remainder.push(store.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(slug: &str, state: &str) -> Store {
        Store {
            slug: slug.into(),
            name: slug.into(),
            city: String::new(),
            state: state.into(),
        }
    }

    #[test]
    fn every_store_lands_in_exactly_one_segment() {
        let mut registry = BTreeMap::new();
        for s in [
            store("verona", "WI"),
            store("appleton", "wi"),
            store("rockford", "IL"),
            store("nowhere", ""),
        ] {
            registry.insert(s.slug.clone(), s);
        }

        let p = partition(&registry);
        assert_eq!(p.all.len(), 4);
        assert_eq!(p.primary.len() + p.remainder.len(), p.all.len());
        for s in &p.all {
            let in_primary = p.primary.contains(s);
            let in_remainder = p.remainder.contains(s);
            assert!(in_primary ^ in_remainder, "{} in both or neither", s.slug);
            assert_eq!(in_primary, s.state.eq_ignore_ascii_case("WI"));
        }
        let slugs: Vec<_> = p.primary.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, ["appleton", "verona"]);
    }

    #[test]
    fn segment_labels_match_stage_names() {
        assert_eq!(Segment::Primary.to_string(), "primary");
        assert_eq!(Segment::for_region(" wi "), Segment::Primary);
        assert_eq!(Segment::for_region("MN"), Segment::Remainder);
    }
}

//! Read planning
//!
//! Decides, from what exists on disk, how a read request is served:
//!
//! | State | Resource | Condition | Action |
//! |-------|----------|-----------|--------|
//! | `NoDatasets` | `cache` | no manifest, no sources | fail |
//! | `RebuildAggregate` | `cache` | no manifest, some sources | rebuild present datasets |
//! | `Missing` | dataset | no source, no projection | fail |
//! | `Build` | dataset | source, no projection | parse, project, write through |
//! | `Serve` | any | projection (or manifest) exists | stream the file as is |
//!
//! Existing files are served without revalidation: the manifest reflects
//! the last write, not the current sources.

use std::collections::BTreeSet;

use crate::domain::{Dataset, Resource};

/// What exists on disk at the time of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facts {
    /// Datasets with a tabular source
    pub sources: BTreeSet<Dataset>,
    /// Datasets with a projection file
    pub projections: BTreeSet<Dataset>,
    /// Whether the manifest file exists
    pub manifest: bool,
}

impl Facts {
    /// Datasets with a source, in workbook order
    pub fn present_sources(&self) -> Vec<Dataset> {
        Dataset::ALL
            .into_iter()
            .filter(|d| self.sources.contains(d))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadState {
    /// Aggregate requested with nothing to build from
    NoDatasets,
    /// Aggregate requested without a manifest: rebuild these datasets
    RebuildAggregate(Vec<Dataset>),
    /// Dataset with neither source nor projection
    Missing(Dataset),
    /// Dataset whose projection must be built from its source
    Build(Dataset),
    /// The requested file exists and is served verbatim
    Serve(Resource),
}

/// Transition function from request and facts to read state
pub fn plan(resource: Resource, facts: &Facts) -> ReadState {
    match resource {
        Resource::Cache if facts.manifest => ReadState::Serve(resource),
        Resource::Cache => {
            let present = facts.present_sources();
            if present.is_empty() {
                ReadState::NoDatasets
            } else {
                ReadState::RebuildAggregate(present)
            }
        }
        Resource::Dataset(dataset) if facts.projections.contains(&dataset) => {
            ReadState::Serve(resource)
        }
        Resource::Dataset(dataset) if facts.sources.contains(&dataset) => ReadState::Build(dataset),
        Resource::Dataset(dataset) => ReadState::Missing(dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(sources: &[Dataset], projections: &[Dataset], manifest: bool) -> Facts {
        Facts {
            sources: sources.iter().copied().collect(),
            projections: projections.iter().copied().collect(),
            manifest,
        }
    }

    #[test]
    fn aggregate_without_anything_fails() {
        assert_eq!(plan(Resource::Cache, &Facts::default()), ReadState::NoDatasets);
    }

    #[test]
    fn aggregate_ignores_projections_without_sources() {
        let f = facts(&[], &[Dataset::Kanji], false);
        assert_eq!(plan(Resource::Cache, &f), ReadState::NoDatasets);
    }

    #[test]
    fn aggregate_rebuilds_present_sources_in_order() {
        let f = facts(&[Dataset::Kanji, Dataset::Phrases], &[], false);
        assert_eq!(
            plan(Resource::Cache, &f),
            ReadState::RebuildAggregate(vec![Dataset::Phrases, Dataset::Kanji])
        );
    }

    #[test]
    fn existing_manifest_is_served() {
        let f = facts(&[Dataset::Kanji], &[], true);
        assert_eq!(plan(Resource::Cache, &f), ReadState::Serve(Resource::Cache));

        let f = facts(&[], &[], true);
        assert_eq!(plan(Resource::Cache, &f), ReadState::Serve(Resource::Cache));
    }

    #[test]
    fn dataset_states() {
        let kanji = Resource::Dataset(Dataset::Kanji);

        assert_eq!(plan(kanji, &facts(&[], &[], false)), ReadState::Missing(Dataset::Kanji));
        assert_eq!(
            plan(kanji, &facts(&[Dataset::Phrases], &[Dataset::Phrases], true)),
            ReadState::Missing(Dataset::Kanji)
        );
        assert_eq!(plan(kanji, &facts(&[Dataset::Kanji], &[], false)), ReadState::Build(Dataset::Kanji));
        assert_eq!(plan(kanji, &facts(&[Dataset::Kanji], &[Dataset::Kanji], false)), ReadState::Serve(kanji));
        assert_eq!(plan(kanji, &facts(&[], &[Dataset::Kanji], false)), ReadState::Serve(kanji));
    }
}

//! Resource names
//!
//! The store serves a closed set of resources:
//! - Datasets: `phrases`, `vocabulary`, `kanji`
//! - The aggregate manifest view: `cache`
//!
//! Names are parsed once at the boundary (case-insensitive) and carried
//! as typed values afterwards. The lower-case name is the identity used for
//! projection files and manifest keys; the title-cased display name is used
//! for tabular source files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ResourceError {
    #[error("Unknown resource '{0}': expected one of cache, phrases, vocabulary, kanji")]
    Unknown(String),

    #[error("Resource 'cache' is not a dataset")]
    NotADataset,
}

/// One of the fixed datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dataset {
    Phrases,
    Vocabulary,
    Kanji,
}

impl Dataset {
    /// All datasets in workbook order
    pub const ALL: [Dataset; 3] = [Dataset::Phrases, Dataset::Vocabulary, Dataset::Kanji];

    /// Lower-case identity (`vocabulary`)
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Phrases => "phrases",
            Dataset::Vocabulary => "vocabulary",
            Dataset::Kanji => "kanji",
        }
    }

    /// Title-cased display name (`Vocabulary`)
    pub fn display_name(&self) -> &'static str {
        match self {
            Dataset::Phrases => "Phrases",
            Dataset::Vocabulary => "Vocabulary",
            Dataset::Kanji => "Kanji",
        }
    }

    /// File name of the tabular source
    pub fn source_file_name(&self) -> String {
        format!("{}.csv", self.display_name())
    }

    /// File name of the JSON projection
    pub fn projection_file_name(&self) -> String {
        format!("{}.json", self.name())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Resource>()? {
            Resource::Dataset(dataset) => Ok(dataset),
            Resource::Cache => Err(ResourceError::NotADataset),
        }
    }
}

impl TryFrom<String> for Dataset {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dataset> for String {
    fn from(dataset: Dataset) -> Self {
        dataset.name().to_string()
    }
}

/// A requestable resource: a dataset or the aggregate manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// The synthetic `cache` view over the manifest
    Cache,
    Dataset(Dataset),
}

impl Resource {
    pub const CACHE_NAME: &'static str = "cache";

    /// Lower-case identity
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Cache => Self::CACHE_NAME,
            Resource::Dataset(dataset) => dataset.name(),
        }
    }

    /// Title-cased display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Resource::Cache => "Cache",
            Resource::Dataset(dataset) => dataset.display_name(),
        }
    }

    /// Returns the dataset, if this is not the aggregate view
    pub fn dataset(&self) -> Option<Dataset> {
        match self {
            Resource::Cache => None,
            Resource::Dataset(dataset) => Some(*dataset),
        }
    }

    pub fn is_cache(&self) -> bool {
        matches!(self, Resource::Cache)
    }
}

impl From<Dataset> for Resource {
    fn from(dataset: Dataset) -> Self {
        Resource::Dataset(dataset)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resource {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "cache" => Ok(Resource::Cache),
            "phrases" => Ok(Resource::Dataset(Dataset::Phrases)),
            "vocabulary" => Ok(Resource::Dataset(Dataset::Vocabulary)),
            "kanji" => Ok(Resource::Dataset(Dataset::Kanji)),
            _ => Err(ResourceError::Unknown(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Vocabulary".parse::<Resource>().unwrap(), Resource::Dataset(Dataset::Vocabulary));
        assert_eq!(" KANJI ".parse::<Resource>().unwrap(), Resource::Dataset(Dataset::Kanji));
        assert_eq!("cache".parse::<Resource>().unwrap(), Resource::Cache);
    }

    #[test]
    fn unknown_resource_rejected() {
        let err = "opposites".parse::<Resource>().unwrap_err();
        assert_eq!(err, ResourceError::Unknown("opposites".to_string()));
    }

    #[test]
    fn cache_is_not_a_dataset() {
        assert_eq!("cache".parse::<Dataset>().unwrap_err(), ResourceError::NotADataset);
    }

    #[test]
    fn file_names() {
        assert_eq!(Dataset::Phrases.source_file_name(), "Phrases.csv");
        assert_eq!(Dataset::Phrases.projection_file_name(), "phrases.json");
    }

    #[test]
    fn display_names_parse_back() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.display_name().parse::<Dataset>().unwrap(), dataset);
            assert_eq!(Resource::from(dataset).display_name(), dataset.display_name());
        }
        assert_eq!(Resource::Cache.display_name(), "Cache");
    }

    #[test]
    fn dataset_serde_uses_name() {
        let json = serde_json::to_string(&Dataset::Kanji).unwrap();
        assert_eq!(json, "\"kanji\"");
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Dataset::Kanji);
    }
}

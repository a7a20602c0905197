//! Resource store
//!
//! Ties the codec, projection, manifest and backups together over one
//! [`StoreConfig`]:
//!
//! - reads follow [`plan`]: serve an existing file, build a missing
//!   projection from its source, or rebuild the aggregate manifest
//! - writes replace a dataset's source, snapshot it, rebuild its projection
//!   and record the new hash, holding that dataset's lock throughout
//!
//! Datasets are independent: each has its own write lock and nothing locks
//! across datasets. Existing projections are served without locking; files
//! are only ever replaced by atomic rename.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, BufReader};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::backup::Snapshotter;
use super::config::StoreConfig;
use super::csv::{self, ReadError};
use super::error::{ConsistencyWarning, StoreError, StoreResult};
use super::fsutil::{exists, write_atomic_async};
use super::manifest::{Manifest, ManifestStore};
use super::state::{plan, Facts, ReadState};
use crate::domain::{content_hash, project, Dataset, Resource, SheetModel};

/// Body of a successful read
#[derive(Debug)]
pub enum ResourceBody {
    /// An existing file, streamed as is
    File(File),
    /// A document built during the request
    Bytes(Vec<u8>),
}

impl ResourceBody {
    /// True when the body streams an existing file
    pub fn is_streamed(&self) -> bool {
        matches!(self, ResourceBody::File(_))
    }

    /// Reads the whole body into memory
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            ResourceBody::File(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                Ok(buf)
            }
            ResourceBody::Bytes(bytes) => Ok(bytes),
        }
    }

    /// Copies the body into a writer, returning the number of bytes copied
    pub async fn copy_to<W>(self, out: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            ResourceBody::File(mut file) => tokio::io::copy(&mut file, out).await,
            ResourceBody::Bytes(bytes) => {
                let mut slice = bytes.as_slice();
                tokio::io::copy(&mut slice, out).await
            }
        }
    }
}

/// A dataset that could not be rebuilt during an aggregate rebuild
#[derive(Debug)]
pub struct AggregateFailure {
    pub resource: Dataset,
    pub error: StoreError,
}

/// Result of rebuilding several datasets
#[derive(Debug, Default)]
pub struct AggregateReport {
    /// Hashes of the datasets that were rebuilt
    pub rebuilt: Manifest,
    /// The manifest as it stood after the last update
    pub manifest: Manifest,
    /// Datasets that were skipped
    pub failures: Vec<AggregateFailure>,
}

/// Result of a read request
#[derive(Debug)]
pub struct ReadOutcome {
    /// How the request was served
    pub state: ReadState,
    pub body: ResourceBody,
    /// Datasets skipped while rebuilding the aggregate manifest
    pub failures: Vec<AggregateFailure>,
}

/// Result of an accepted write
#[derive(Debug)]
pub struct WriteReceipt {
    pub resource: Dataset,
    /// Hash of the new projection
    pub hash: String,
    pub source_path: PathBuf,
    pub projection_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    /// Non-blocking problems, e.g. a failed backup
    pub warnings: Vec<ConsistencyWarning>,
}

/// Per-dataset presence, as reported by [`ResourceStore::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetStatus {
    pub resource: Dataset,
    pub source: bool,
    pub projection: bool,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub manifest: bool,
    pub datasets: Vec<DatasetStatus>,
}

/// One write lock per dataset
#[derive(Default)]
struct DatasetLocks {
    phrases: Mutex<()>,
    vocabulary: Mutex<()>,
    kanji: Mutex<()>,
}

impl DatasetLocks {
    async fn lock(&self, dataset: Dataset) -> MutexGuard<'_, ()> {
        let lock = match dataset {
            Dataset::Phrases => &self.phrases,
            Dataset::Vocabulary => &self.vocabulary,
            Dataset::Kanji => &self.kanji,
        };
        lock.lock().await
    }
}

/// The dataset store
pub struct ResourceStore {
    config: StoreConfig,
    manifest: ManifestStore,
    snapshotter: Snapshotter,
    locks: DatasetLocks,
}

impl ResourceStore {
    /// Creates a store over a layout; nothing is touched on disk
    pub fn new(config: StoreConfig) -> Self {
        let manifest = ManifestStore::for_config(&config);
        let snapshotter = Snapshotter::new(config.backup_dir());
        Self {
            config,
            manifest,
            snapshotter,
            locks: DatasetLocks::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Gathers which sources, projections and manifest exist
    pub async fn facts(&self) -> Facts {
        let mut facts = Facts {
            manifest: self.manifest.exists().await,
            ..Default::default()
        };

        for dataset in Dataset::ALL {
            if exists(&self.config.source_path(dataset)).await {
                facts.sources.insert(dataset);
            }
            if exists(&self.config.projection_path(dataset)).await {
                facts.projections.insert(dataset);
            }
        }

        facts
    }

    /// Reads a resource given by name
    pub async fn read_by_name(&self, name: &str) -> StoreResult<ReadOutcome> {
        let resource: Resource = name.parse()?;
        self.read(resource).await
    }

    /// Reads a dataset projection or the aggregate manifest
    pub async fn read(&self, resource: Resource) -> StoreResult<ReadOutcome> {
        let state = plan(resource, &self.facts().await);
        debug!(%resource, ?state, "read planned");
        self.execute(state).await
    }

    /// Reads a dataset projection, building it if needed
    pub async fn read_dataset(&self, dataset: Dataset) -> StoreResult<ReadOutcome> {
        self.read(Resource::Dataset(dataset)).await
    }

    /// Reads the aggregate manifest, rebuilding it if it is missing
    pub async fn read_aggregate(&self) -> StoreResult<ReadOutcome> {
        self.read(Resource::Cache).await
    }

    async fn execute(&self, state: ReadState) -> StoreResult<ReadOutcome> {
        match state {
            ReadState::NoDatasets => Err(self.not_found(Resource::Cache)),
            ReadState::Missing(dataset) => Err(self.not_found(Resource::Dataset(dataset))),
            ReadState::Serve(resource) => self.serve(resource).await,
            ReadState::Build(dataset) => self.build_through(dataset).await,
            ReadState::RebuildAggregate(datasets) => {
                let report = self.rebuild(&datasets).await?;
                let body = serde_json::to_vec_pretty(&report.manifest).map_err(|e| {
                    StoreError::persistence(self.manifest.path(), io::Error::other(e))
                })?;

                Ok(ReadOutcome {
                    state: ReadState::RebuildAggregate(datasets),
                    body: ResourceBody::Bytes(body),
                    failures: report.failures,
                })
            }
        }
    }

    fn resource_path(&self, resource: Resource) -> PathBuf {
        match resource {
            Resource::Cache => self.manifest.path().to_path_buf(),
            Resource::Dataset(dataset) => self.config.projection_path(dataset),
        }
    }

    async fn serve(&self, resource: Resource) -> StoreResult<ReadOutcome> {
        let path = self.resource_path(resource);
        let file = File::open(&path).await.map_err(|e| {
            warn!(%resource, path = %path.display(), "read failed");
            StoreError::persistence(&path, e)
        })?;

        Ok(ReadOutcome {
            state: ReadState::Serve(resource),
            body: ResourceBody::File(file),
            failures: Vec::new(),
        })
    }

    fn not_found(&self, resource: Resource) -> StoreError {
        let hint = match resource.dataset() {
            Some(dataset) => format!(
                "Add dataset to: {}",
                self.config.display_path(&self.config.source_path(dataset))
            ),
            None => format!(
                "Add datasets to: {}/",
                self.config.display_path(self.config.csv_dir())
            ),
        };
        warn!(%resource, "{hint}");

        StoreError::NotFound { resource, hint }
    }

    /// Parses a dataset's tabular source
    pub async fn load_sheet(&self, dataset: Dataset) -> StoreResult<SheetModel> {
        let path = self.config.source_path(dataset);
        let file = File::open(&path)
            .await
            .map_err(|e| StoreError::persistence(&path, e))?;

        csv::parse_reader(BufReader::new(file), dataset.display_name())
            .await
            .map_err(|e| match e {
                ReadError::Io(source) => StoreError::persistence(&path, source),
                ReadError::Csv(source) => {
                    warn!(resource = %dataset, error = %source, "CSV > JSON failed");
                    StoreError::Conversion {
                        resource: dataset,
                        source,
                    }
                }
            })
    }

    /// Builds and writes a projection from the source; returns bytes and hash
    async fn write_projection(&self, dataset: Dataset) -> StoreResult<(Vec<u8>, String)> {
        let sheet = self.load_sheet(dataset).await?;
        let bytes = project(&sheet).to_json_bytes();
        let hash = content_hash(&bytes);

        let path = self.config.projection_path(dataset);
        write_atomic_async(path.clone(), bytes.clone())
            .await
            .map_err(|e| StoreError::persistence(&path, e))?;

        Ok((bytes, hash))
    }

    async fn build_through(&self, dataset: Dataset) -> StoreResult<ReadOutcome> {
        let guard = self.locks.lock(dataset).await;

        // A write may have produced the projection while we waited
        if exists(&self.config.projection_path(dataset)).await {
            debug!(resource = %dataset, "projection appeared while waiting");
            drop(guard);
            return self.serve(Resource::Dataset(dataset)).await;
        }

        let (bytes, hash) = self.write_projection(dataset).await?;
        self.record(dataset, &hash).await?;

        info!(resource = %dataset, %hash, "projection built");
        Ok(ReadOutcome {
            state: ReadState::Build(dataset),
            body: ResourceBody::Bytes(bytes),
            failures: Vec::new(),
        })
    }

    /// Upserts a dataset's hash; callers hold that dataset's lock
    async fn record(&self, dataset: Dataset, hash: &str) -> StoreResult<Manifest> {
        self.manifest.upsert(dataset.name(), hash).await.map_err(|source| {
            let warning = ConsistencyWarning::ManifestUpdateFailed {
                resource: dataset,
                source,
            };
            warn!("{warning}");
            warning.into()
        })
    }

    /// Rebuilds projections of `datasets`, recording each hash under its lock
    ///
    /// A dataset that fails is reported and skipped, and its manifest entry
    /// is left as it was. Entries of other datasets are never touched. If
    /// every dataset fails, the first failure is returned.
    async fn rebuild(&self, datasets: &[Dataset]) -> StoreResult<AggregateReport> {
        let mut report = AggregateReport::default();

        for &dataset in datasets {
            let guard = self.locks.lock(dataset).await;
            let result = match self.write_projection(dataset).await {
                Ok((_, hash)) => self
                    .record(dataset, &hash)
                    .await
                    .map(|manifest| (hash, manifest)),
                Err(error) => Err(error),
            };
            drop(guard);

            match result {
                Ok((hash, manifest)) => {
                    report.rebuilt.insert(dataset.name().to_string(), hash);
                    report.manifest = manifest;
                }
                Err(error) => {
                    warn!(resource = %dataset, %error, "skipped during aggregate rebuild");
                    report.failures.push(AggregateFailure {
                        resource: dataset,
                        error,
                    });
                }
            }
        }

        if report.rebuilt.is_empty() && !report.failures.is_empty() {
            return Err(report.failures.remove(0).error);
        }

        info!(
            rebuilt = report.rebuilt.len(),
            failed = report.failures.len(),
            "aggregate manifest rebuilt"
        );
        Ok(report)
    }

    /// Rebuilds every dataset that has a source, whether or not a manifest exists
    ///
    /// Afterwards, entries of datasets whose source is gone are dropped.
    pub async fn rebuild_all(&self) -> StoreResult<AggregateReport> {
        let present = self.facts().await.present_sources();
        if present.is_empty() {
            return Err(self.not_found(Resource::Cache));
        }
        let mut report = self.rebuild(&present).await?;

        // Checked inside the manifest lock: a write upserts only after its source is on disk
        let sources: Vec<(&'static str, PathBuf)> = Dataset::ALL
            .into_iter()
            .map(|dataset| (dataset.name(), self.config.source_path(dataset)))
            .collect();
        report.manifest = self
            .manifest
            .retain(move |resource| {
                sources
                    .iter()
                    .find(|(name, _)| *name == resource)
                    .map_or(true, |(_, source)| source.exists())
            })
            .await
            .map_err(|e| StoreError::persistence(self.manifest.path(), e))?;

        Ok(report)
    }

    /// Recreates the manifest from the projection files on disk
    pub async fn reindex_manifest(&self) -> StoreResult<Manifest> {
        let mut manifest = Manifest::new();

        for dataset in Dataset::ALL {
            let path = self.config.projection_path(dataset);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    manifest.insert(dataset.name().to_string(), content_hash(&bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::persistence(&path, e)),
            }
        }

        self.manifest
            .replace(manifest.clone())
            .await
            .map_err(|e| StoreError::persistence(self.manifest.path(), e))?;

        info!(entries = manifest.len(), "manifest reindexed from projections");
        Ok(manifest)
    }

    /// Writes a sheet, timestamping its backup with the current time
    pub async fn write(&self, sheet: &SheetModel) -> StoreResult<WriteReceipt> {
        self.write_at(sheet, Utc::now()).await
    }

    /// Writes a sheet: source, backup, projection and manifest entry
    pub async fn write_at(
        &self,
        sheet: &SheetModel,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<WriteReceipt> {
        if !sheet.is_filled() {
            return Err(StoreError::Validation("Sheet missing name or data".to_string()));
        }
        let dataset: Dataset = sheet.name.parse()?;
        if let Some((cell, index)) = sheet.dangling_style() {
            return Err(StoreError::Validation(format!(
                "Cell {cell} refers to style {index}, but the sheet has {} styles",
                sheet.styles.len()
            )));
        }

        let text = csv::serialize(sheet)
            .map_err(|e| StoreError::Validation(format!("Sheet cannot be encoded: {e}")))?;
        // Project the canonical source so a later rebuild from disk agrees
        let stored = csv::parse_str(&text, dataset.display_name()).map_err(|source| {
            StoreError::Conversion {
                resource: dataset,
                source,
            }
        })?;
        let bytes = text.into_bytes();

        let _guard = self.locks.lock(dataset).await;
        let mut warnings = Vec::new();

        let backup_path = match self
            .snapshotter
            .snapshot(dataset.display_name(), &bytes, timestamp)
            .await
        {
            Ok(path) => Some(path),
            Err(source) => {
                let warning = ConsistencyWarning::BackupFailed {
                    resource: dataset,
                    source,
                };
                warn!("{warning}");
                warnings.push(warning);
                None
            }
        };

        let source_path = self.config.source_path(dataset);
        write_atomic_async(source_path.clone(), bytes)
            .await
            .map_err(|e| {
                warn!(resource = %dataset, "write failed");
                StoreError::persistence(&source_path, e)
            })?;

        let projection = project(&stored).to_json_bytes();
        let hash = content_hash(&projection);
        let projection_path = self.config.projection_path(dataset);
        write_atomic_async(projection_path.clone(), projection)
            .await
            .map_err(|source| {
                let warning = ConsistencyWarning::ProjectionWriteFailed {
                    resource: dataset,
                    source,
                };
                warn!("{warning}");
                warning
            })?;

        self.record(dataset, &hash).await?;

        info!(resource = %dataset, %hash, "dataset written");
        Ok(WriteReceipt {
            resource: dataset,
            hash,
            source_path,
            projection_path,
            backup_path,
            warnings,
        })
    }

    /// Parses every dataset source that exists, in workbook order
    pub async fn read_workbook(&self) -> StoreResult<Vec<SheetModel>> {
        let mut sheets = Vec::new();

        for dataset in Dataset::ALL {
            let path = self.config.source_path(dataset);
            if !exists(&path).await {
                warn!(resource = %dataset, "Add dataset to: {}", self.config.display_path(&path));
                continue;
            }
            sheets.push(self.load_sheet(dataset).await?);
        }

        if sheets.is_empty() {
            return Err(self.not_found(Resource::Cache));
        }
        Ok(sheets)
    }

    /// Presence of sources and projections, with manifest hashes
    pub async fn status(&self) -> StoreResult<StoreStatus> {
        let facts = self.facts().await;
        let manifest = self
            .manifest
            .get()
            .await
            .map_err(|e| StoreError::persistence(self.manifest.path(), e))?;

        let datasets = Dataset::ALL
            .into_iter()
            .map(|dataset| DatasetStatus {
                resource: dataset,
                source: facts.sources.contains(&dataset),
                projection: facts.projections.contains(&dataset),
                hash: manifest.get(dataset.name()).cloned(),
            })
            .collect();

        Ok(StoreStatus {
            manifest: facts.manifest,
            datasets,
        })
    }

    /// Path of the file that backs a resource
    pub fn path_of(&self, resource: Resource) -> PathBuf {
        self.resource_path(resource)
    }
}

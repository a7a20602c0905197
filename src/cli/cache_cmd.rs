//! Cache CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::storage::Project;

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show manifest entries and which files exist
    Status,

    /// Rebuild every projection and the manifest from the sources
    Rebuild,

    /// Rebuild the manifest from the projection files
    Reindex,
}

pub async fn run(cmd: CacheCommands, output: &Output, project: &Project) -> Result<()> {
    match cmd {
        CacheCommands::Status => status(output, project).await,
        CacheCommands::Rebuild => rebuild(output, project).await,
        CacheCommands::Reindex => reindex(output, project).await,
    }
}

fn mark(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "-"
    }
}

async fn status(output: &Output, project: &Project) -> Result<()> {
    let store = project.store();
    let status = store.status().await?;
    let manifest_path = project.config().display_path(store.manifest().path());

    if output.is_json() {
        let datasets: Vec<_> = status
            .datasets
            .iter()
            .map(|d| {
                serde_json::json!({
                    "resource": d.resource.name(),
                    "source": d.source,
                    "projection": d.projection,
                    "hash": d.hash,
                })
            })
            .collect();

        output.data(&serde_json::json!({
            "manifest": {
                "path": manifest_path,
                "exists": status.manifest,
            },
            "datasets": datasets,
        }));
    } else {
        println!("Cache Status");
        println!("{}", "=".repeat(40));
        println!(
            "Manifest: {} ({})",
            manifest_path,
            if status.manifest { "present" } else { "missing" }
        );
        println!();
        println!("{:<12} {:<8} {:<11} HASH", "RESOURCE", "SOURCE", "PROJECTION");

        for d in &status.datasets {
            println!(
                "{:<12} {:<8} {:<11} {}",
                d.resource.name(),
                mark(d.source),
                mark(d.projection),
                d.hash.as_deref().unwrap_or("-")
            );
        }

        let orphaned = status.datasets.iter().any(|d| d.projection && d.hash.is_none());
        if orphaned {
            println!();
            println!("Run 'cardstore cache reindex' to record projections missing from the manifest.");
        }
    }

    Ok(())
}

async fn rebuild(output: &Output, project: &Project) -> Result<()> {
    let start = std::time::Instant::now();
    let report = project.store().rebuild_all().await?;
    let duration = start.elapsed();

    for failure in &report.failures {
        output.warning(&format!("{} skipped: {}", failure.resource, failure.error));
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "rebuilt": report.rebuilt,
            "failed": report
                .failures
                .iter()
                .map(|f| serde_json::json!({
                    "resource": f.resource.name(),
                    "error": f.error.to_string(),
                }))
                .collect::<Vec<_>>(),
            "duration_ms": duration.as_millis(),
        }));
    } else {
        output.success(&format!(
            "Cache rebuilt in {:?} ({} rebuilt, {} failed)",
            duration,
            report.rebuilt.len(),
            report.failures.len()
        ));
    }

    Ok(())
}

async fn reindex(output: &Output, project: &Project) -> Result<()> {
    let manifest = project.store().reindex_manifest().await?;

    if output.is_json() {
        output.data(&manifest);
    } else {
        output.success(&format!("Manifest reindexed ({} entries)", manifest.len()));
        for (resource, hash) in &manifest {
            output.row(&["  ", resource.as_str(), hash.as_str()]);
        }
    }

    Ok(())
}

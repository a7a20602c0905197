//! Resource CLI commands

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;

use super::output::Output;
use crate::domain::SheetModel;
use crate::storage::{csv, Project};

/// Prints a projection, or the manifest for `cache`
pub async fn read(output: &Output, project: &Project, resource: &str) -> Result<()> {
    let store = project.store();
    let outcome = store.read_by_name(resource).await?;

    for failure in &outcome.failures {
        output.warning(&format!("{} skipped: {}", failure.resource, failure.error));
    }

    let mut stdout = tokio::io::stdout();
    outcome.body.copy_to(&mut stdout).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(())
}

/// Loads a sheet from a `.json` sheet model or a `.csv` source
pub(crate) async fn load_sheet(file: &Path, name: Option<&str>) -> Result<SheetModel> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => {
            let mut sheet: SheetModel = serde_json::from_str(&text)
                .with_context(|| format!("Invalid sheet JSON in {}", file.display()))?;
            if let Some(name) = name {
                sheet.name = name.to_string();
            }
            Ok(sheet)
        }
        Some("csv") => {
            let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let name = name.unwrap_or(stem);
            csv::parse_str(&text, name).with_context(|| format!("Invalid CSV in {}", file.display()))
        }
        _ => bail!(
            "Unsupported input {}: expected a .json sheet or a .csv source",
            file.display()
        ),
    }
}

pub async fn write(output: &Output, project: &Project, file: &Path, name: Option<&str>) -> Result<()> {
    let sheet = load_sheet(file, name).await?;
    let store = project.store();
    let receipt = store.write(&sheet).await?;
    let config = project.config();

    for warning in &receipt.warnings {
        output.warning(&warning.to_string());
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "resource": receipt.resource.name(),
            "hash": receipt.hash,
            "source": config.display_path(&receipt.source_path),
            "projection": config.display_path(&receipt.projection_path),
            "backup": receipt.backup_path.as_deref().map(|p| config.display_path(p)),
            "warnings": receipt.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        }));
    } else {
        output.success(&format!(
            "Wrote {} ({})",
            receipt.resource.display_name(),
            receipt.hash
        ));
        output.row(&["  source:", config.display_path(&receipt.source_path).as_str()]);
        output.row(&["  projection:", config.display_path(&receipt.projection_path).as_str()]);
        if let Some(backup) = &receipt.backup_path {
            output.row(&["  backup:", config.display_path(backup).as_str()]);
        }
    }

    Ok(())
}

/// Prints every present dataset source as a sheet model
pub async fn workbook(output: &Output, project: &Project) -> Result<()> {
    let sheets = project.store().read_workbook().await?;
    output.data(&sheets);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn csv_name_comes_from_stem() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Kanji.csv");
        fs::write(&file, "kanji\n犬\n").unwrap();

        let sheet = load_sheet(&file, None).await.unwrap();
        assert_eq!(sheet.name, "Kanji");
        assert_eq!(sheet.rows.len(), 2);

        let sheet = load_sheet(&file, Some("Phrases")).await.unwrap();
        assert_eq!(sheet.name, "Phrases");
    }

    #[tokio::test]
    async fn json_sheet_is_decoded() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("input.JSON");
        fs::write(&file, r#"{"name":"Vocabulary","rows":[["english"],["dog"]]}"#).unwrap();

        let sheet = load_sheet(&file, None).await.unwrap();
        assert_eq!(sheet.name, "Vocabulary");
        assert_eq!(sheet.rows[1], vec!["dog".to_string()]);
    }

    #[tokio::test]
    async fn other_extensions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sheet.xlsx");
        fs::write(&file, "").unwrap();

        let err = load_sheet(&file, None).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported input"));
    }
}

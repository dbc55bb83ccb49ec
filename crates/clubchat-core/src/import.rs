use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::error::{ClubChatError, Result};
use crate::model::{validate_club_name, Club};
use crate::storage::StorageBackend;

/// Where a CSV column lands on a [`Club`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Name,
    Description,
    Majors,
    Membership,
    Extra(String),
}

impl Column {
    fn from_header(header: &str) -> Self {
        let key = header.trim();
        match key.to_lowercase().as_str() {
            "name" | "club_name" | "club" => Self::Name,
            "description" | "club_description" | "about" => Self::Description,
            "majors" | "major" | "target_majors" => Self::Majors,
            "membership" | "members" | "membership_info" => Self::Membership,
            _ => Self::Extra(key.to_string()),
        }
    }
}

/// Clubs read from a CSV source, plus counts of rows that were dropped.
#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub clubs: Vec<Club>,
    /// Rows with a blank name.
    pub skipped_empty: usize,
    /// Rows whose name fails validation (too long).
    pub skipped_invalid: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub skipped_empty: usize,
    pub skipped_invalid: usize,
}

/// Parse a club CSV. Headers are matched case-insensitively with aliases;
/// unrecognised non-empty columns are kept in `extra`.
pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedCatalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<Column> = rdr
        .headers()
        .map_err(|e| ClubChatError::InvalidInput(format!("invalid CSV header: {e}")))?
        .iter()
        .map(Column::from_header)
        .collect();

    if !columns.contains(&Column::Name) {
        return Err(ClubChatError::InvalidInput(
            "CSV has no name column (expected 'name', 'club_name' or 'club')".into(),
        ));
    }

    let mut parsed = ParsedCatalog::default();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            ClubChatError::InvalidInput(format!("invalid CSV row {}: {e}", line + 2))
        })?;

        let mut club = Club::new("");
        let mut extra = BTreeMap::new();
        for (column, value) in columns.iter().zip(record.iter()) {
            if value.is_empty() {
                continue;
            }
            match column {
                Column::Name => club.name = value.to_string(),
                Column::Description => club.description = value.to_string(),
                Column::Majors => club.majors = value.to_string(),
                Column::Membership => club.membership = Some(value.to_string()),
                Column::Extra(key) if !key.is_empty() => {
                    extra.insert(key.clone(), value.to_string());
                }
                Column::Extra(_) => {}
            }
        }

        if club.name.trim().is_empty() {
            parsed.skipped_empty += 1;
            continue;
        }
        if let Err(e) = validate_club_name(&club.name) {
            tracing::debug!(line = line + 2, "skipping row: {e}");
            parsed.skipped_invalid += 1;
            continue;
        }
        club.extra = extra;
        parsed.clubs.push(club);
    }
    Ok(parsed)
}

/// Store parsed clubs, skipping names that already exist.
pub async fn import_clubs(
    storage: &impl StorageBackend,
    parsed: ParsedCatalog,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        skipped_empty: parsed.skipped_empty,
        skipped_invalid: parsed.skipped_invalid,
        ..Default::default()
    };

    for club in &parsed.clubs {
        match storage.create_club(club).await {
            Ok(()) => report.imported += 1,
            Err(ClubChatError::AlreadyExists(_)) => {
                tracing::debug!(name = %club.name, "club already exists, skipping");
                report.skipped_duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        imported = report.imported,
        skipped_duplicates = report.skipped_duplicates,
        skipped_empty = report.skipped_empty,
        skipped_invalid = report.skipped_invalid,
        "club import finished"
    );
    Ok(report)
}

/// Read a CSV file and import it.
pub async fn import_csv_file(storage: &impl StorageBackend, path: &Path) -> Result<ImportReport> {
    let file = std::fs::File::open(path).map_err(|e| {
        ClubChatError::InvalidInput(format!("cannot open {}: {e}", path.display()))
    })?;
    let parsed = parse_csv(file)?;
    import_clubs(storage, parsed).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    const SAMPLE: &str = "\
Club_Name,About,Major,Meeting Day,Members
AI Society,Paper reading and projects,CS,Friday,120
Chess Club,,,Tuesday,
,orphan row,,,
";

    #[test]
    fn test_header_aliases() {
        assert_eq!(Column::from_header("CLUB"), Column::Name);
        assert_eq!(Column::from_header(" club_description "), Column::Description);
        assert_eq!(Column::from_header("Target_Majors"), Column::Majors);
        assert_eq!(Column::from_header("membership_info"), Column::Membership);
        assert_eq!(
            Column::from_header("Meeting Day"),
            Column::Extra("Meeting Day".into())
        );
    }

    #[test]
    fn test_parse_maps_columns_and_skips_nameless_rows() {
        let parsed = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(parsed.clubs.len(), 2);
        assert_eq!(parsed.skipped_empty, 1);

        let ai = &parsed.clubs[0];
        assert_eq!(ai.name, "AI Society");
        assert_eq!(ai.description, "Paper reading and projects");
        assert_eq!(ai.majors, "CS");
        assert_eq!(ai.membership.as_deref(), Some("120"));
        assert_eq!(ai.extra.get("Meeting Day").map(String::as_str), Some("Friday"));

        let chess = &parsed.clubs[1];
        assert!(chess.description.is_empty());
        assert!(chess.membership.is_none());
    }

    #[test]
    fn test_overlong_name_is_counted_as_invalid() {
        let csv = format!("name,about\n{},too long\n,blank\nOk Club,fine\n", "x".repeat(201));
        let parsed = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.clubs.len(), 1);
        assert_eq!(parsed.skipped_empty, 1);
        assert_eq!(parsed.skipped_invalid, 1);
    }

    #[test]
    fn test_missing_name_column_is_rejected() {
        let err = parse_csv("title,about\nx,y\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no name column"));
    }

    #[tokio::test]
    async fn test_import_counts_duplicates() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.create_club(&Club::new("chess club")).await.unwrap();

        let parsed = parse_csv(SAMPLE.as_bytes()).unwrap();
        let report = import_clubs(&storage, parsed).await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                imported: 1,
                skipped_duplicates: 1,
                skipped_empty: 1,
                skipped_invalid: 0,
            }
        );
        assert_eq!(storage.count_clubs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_csv_file_missing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let err = import_csv_file(&storage, Path::new("/nonexistent/clubs.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }
}

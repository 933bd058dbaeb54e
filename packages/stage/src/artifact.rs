//! CSV encoding of staged records.
//!
//! Every artifact starts with the same five columns
//! (`event_id,entity_kind,entity_ref,team,source_team`) followed by the
//! category's stable stat columns. Missing values are empty cells.

use std::path::Path;

use gridiron_stats_models::{
    EntityKind, EntityRef, FieldValue, StatCategory, StatFields, StatRecord,
};
use sha2::{Digest, Sha256};

use crate::StageError;

const FIXED_COLUMNS: [&str; 5] = ["event_id", "entity_kind", "entity_ref", "team", "source_team"];

/// Renders one value so it reads back as the same variant (`8.0`, not
/// `8`).
fn cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(f) => format!("{f:?}"),
        other => other.to_string(),
    }
}

/// Encodes records of one category as CSV bytes.
///
/// # Errors
///
/// Returns [`StageError::Csv`] if the writer fails.
pub fn encode(category: StatCategory, records: &[StatRecord]) -> Result<Vec<u8>, StageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = FIXED_COLUMNS.to_vec();
    header.extend_from_slice(category.columns());
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.event_id.clone(),
            record.entity.kind.to_string(),
            record.entity.raw.clone(),
            record.team.clone(),
            record.source_team.clone(),
        ];
        row.extend(
            category
                .columns()
                .iter()
                .map(|column| record.fields.get(*column).map(cell).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| StageError::Io(e.into_error()))
}

/// Decodes CSV bytes back into records.
///
/// # Errors
///
/// Returns [`StageError::Malformed`] if the header is not an artifact
/// header or a row names an unknown entity kind.
pub fn decode(
    category: StatCategory,
    bytes: &[u8],
    origin: &Path,
) -> Result<Vec<StatRecord>, StageError> {
    let malformed = |message: String| StageError::Malformed {
        path: origin.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(ToString::to_string).collect();
    if headers.len() < FIXED_COLUMNS.len()
        || headers[..FIXED_COLUMNS.len()]
            .iter()
            .zip(FIXED_COLUMNS)
            .any(|(a, b)| a != b)
    {
        return Err(malformed(format!("unexpected header {headers:?}")));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let get = |i: usize| row.get(i).unwrap_or("").to_string();

        let kind: EntityKind = get(1)
            .parse()
            .map_err(|_| malformed(format!("unknown entity kind {:?}", get(1))))?;

        let fields: StatFields = headers
            .iter()
            .enumerate()
            .skip(FIXED_COLUMNS.len())
            .filter_map(|(i, column)| {
                FieldValue::parse(row.get(i).unwrap_or("")).map(|value| (column.clone(), value))
            })
            .collect();

        records.push(StatRecord {
            event_id: get(0),
            entity: EntityRef { kind, raw: get(2) },
            team: get(3),
            source_team: get(4),
            category,
            fields,
        });
    }

    Ok(records)
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never sees a half-written artifact.
///
/// # Errors
///
/// Returns [`StageError::Io`] on any filesystem failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

//! Box-score header mapping.
//!
//! Source tables use terse, category-dependent headers (`c/att`, `car`,
//! `tgts`). This module maps each raw header onto the stable column names
//! of [`StatCategory::columns`], splitting compound cells such as
//! `22/30` (completions/attempts) or `2-14` (sacks/yards lost).

use gridiron_stats_models::{FieldValue, StatCategory, StatFields};

/// How a raw header contributes to the output columns.
enum Mapping {
    /// Copy the cell into one column.
    Single(&'static str),
    /// Split a `a<sep>b` cell into two columns.
    Split(char, &'static str, &'static str),
}

/// Normalizes a header cell: lowercase, spaces to underscores.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn mapping(category: StatCategory, header: &str) -> Option<Mapping> {
    use Mapping::{Single, Split};

    // ── Headers that mean the same thing everywhere ─────────────────
    match header {
        "yds" => return Some(Single("yards")),
        "avg" => return Some(Single("average")),
        "long" | "lng" => return Some(Single("long")),
        _ => {}
    }

    match (category, header) {
        // ── Offense ──────────────────────────────────────────────────
        (StatCategory::Passing, "c/att") => Some(Split('/', "completions", "attempts")),
        (StatCategory::Passing, "sacks") => Some(Split('-', "sacks", "sack_yards")),
        (StatCategory::Passing, "qbr") => Some(Single("qbr")),
        (StatCategory::Passing, "rtg") => Some(Single("rating")),
        (StatCategory::Rushing, "car") => Some(Single("attempts")),
        (StatCategory::Receiving, "rec") => Some(Single("receptions")),
        (StatCategory::Receiving, "tgts") => Some(Single("targets")),
        (StatCategory::Fumbles, "fum") => Some(Single("fumbles")),
        (StatCategory::Fumbles, "lost") => Some(Single("lost")),
        (StatCategory::Fumbles, "rec") => Some(Single("recovered")),

        // ── Defense ──────────────────────────────────────────────────
        (StatCategory::Defensive, "tot") => Some(Single("tackles")),
        (StatCategory::Defensive, "solo") => Some(Single("solo")),
        (StatCategory::Defensive, "sacks") => Some(Single("sacks")),
        (StatCategory::Defensive, "tfl") => Some(Single("tackles_for_loss")),
        (StatCategory::Defensive, "pd") => Some(Single("passes_defended")),
        (StatCategory::Defensive, "qb_hts" | "qb_hits") => Some(Single("qb_hits")),
        (StatCategory::Interceptions | StatCategory::Passing, "int") => {
            Some(Single("interceptions"))
        }

        // ── Special teams ────────────────────────────────────────────
        (StatCategory::KickReturns | StatCategory::PuntReturns, "no") => Some(Single("returns")),
        (StatCategory::Kicking, "fg") => Some(Split('/', "fg_made", "fg_attempted")),
        (StatCategory::Kicking, "pct") => Some(Single("fg_pct")),
        (StatCategory::Kicking, "xp") => Some(Split('/', "xp_made", "xp_attempted")),
        (StatCategory::Kicking, "pts") => Some(Single("points")),
        (StatCategory::Punting, "no") => Some(Single("punts")),
        (StatCategory::Punting, "tb") => Some(Single("touchbacks")),
        (StatCategory::Punting, "in_20" | "in20") => Some(Single("inside_20")),

        (_, "td") => Some(Single("touchdowns")),
        _ => None,
    }
}

/// Maps one table row onto the category's stable columns.
///
/// Cells under unknown headers are dropped (logged at debug level). Empty
/// or placeholder cells produce no field, so they never overwrite data on
/// merge.
#[must_use]
pub fn map_row(category: StatCategory, headers: &[String], cells: &[String]) -> StatFields {
    let mut fields = StatFields::new();

    for (header, cell) in headers.iter().zip(cells) {
        match mapping(category, header) {
            Some(Mapping::Single(column)) => {
                if let Some(value) = FieldValue::parse(cell) {
                    fields.insert(column.to_string(), value);
                }
            }
            Some(Mapping::Split(sep, first, second)) => {
                if let Some((a, b)) = cell.split_once(sep) {
                    if let Some(value) = FieldValue::parse(a) {
                        fields.insert(first.to_string(), value);
                    }
                    if let Some(value) = FieldValue::parse(b) {
                        fields.insert(second.to_string(), value);
                    }
                } else if !cell.trim().is_empty() {
                    log::debug!("{category}: cannot split {header} value {cell:?}");
                }
            }
            None => log::debug!("{category}: dropping unknown column {header:?}"),
        }
    }

    fields.retain(|column, _| category.columns().contains(&column.as_str()));
    fields
}

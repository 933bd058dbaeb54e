#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The single canonical franchise table.
//!
//! Franchises are defined in `teams.toml`, embedded at compile time. Every
//! spelling a source has used for a team (legacy codes, full names,
//! nicknames, relocated-franchise names) maps to exactly one canonical code.
//! Metro labels shared by two franchises (`New York`, `Los Angeles`) only
//! resolve when the caller supplies context that names exactly one of them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Deserialize;

/// A canonical franchise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TeamInfo {
    /// Canonical code (`WSH`, `LAC`).
    pub code: String,
    /// Full display name.
    pub name: String,
    /// City or region as used in the full name.
    pub city: String,
    /// Nickname (`Giants`).
    pub nickname: String,
    /// Historical codes and spellings that map to this franchise.
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Metro {
    label: String,
    teams: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TeamFile {
    team: Vec<TeamInfo>,
    #[serde(default)]
    metro: Vec<Metro>,
}

/// Errors from team lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeamLookupError {
    /// The label matches no known franchise.
    #[error("Unknown team: {raw:?}")]
    Unknown {
        /// The label as given.
        raw: String,
    },

    /// The label matches more than one franchise and context did not
    /// narrow it down.
    #[error("Ambiguous team {raw:?}: could be any of {candidates:?}")]
    Ambiguous {
        /// The label as given.
        raw: String,
        /// Canonical codes the label could refer to.
        candidates: Vec<String>,
    },
}

struct TeamTable {
    teams: Vec<TeamInfo>,
    /// Normalized label -> index into `teams`.
    index: BTreeMap<String, usize>,
    /// Normalized metro label -> candidate indices.
    metros: BTreeMap<String, Vec<usize>>,
}

const TEAMS_TOML: &str = include_str!("../teams.toml");

static TABLE: LazyLock<TeamTable> = LazyLock::new(|| {
    let file: TeamFile = toml::de::from_str(TEAMS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded teams.toml: {e}"));
    TeamTable::build(file)
});

impl TeamTable {
    fn build(file: TeamFile) -> Self {
        let TeamFile { team: teams, metro } = file;

        let mut city_counts: BTreeMap<String, usize> = BTreeMap::new();
        for team in &teams {
            *city_counts.entry(normalize_label(&team.city)).or_default() += 1;
        }

        let mut index = BTreeMap::new();
        for (i, team) in teams.iter().enumerate() {
            let mut labels = vec![
                team.code.clone(),
                team.name.clone(),
                format!("{} {}", team.city, team.nickname),
                team.nickname.clone(),
            ];
            labels.extend(team.aliases.iter().cloned());

            let city = normalize_label(&team.city);
            if city_counts.get(&city) == Some(&1) {
                labels.push(team.city.clone());
            }

            for label in labels {
                if let Some(previous) = index.insert(normalize_label(&label), i) {
                    if previous != i {
                        log::warn!(
                            "Team label {label:?} maps to both {} and {}",
                            teams[previous].code,
                            team.code
                        );
                    }
                }
            }
        }

        let metros = metro
            .into_iter()
            .map(|m| {
                let candidates = m
                    .teams
                    .iter()
                    .filter_map(|code| teams.iter().position(|t| &t.code == code))
                    .collect();
                (normalize_label(&m.label), candidates)
            })
            .collect();

        Self {
            teams,
            index,
            metros,
        }
    }
}

/// Lowercases, drops periods, and collapses whitespace so `N.Y. Giants`
/// and `ny  giants` compare equal.
fn normalize_label(label: &str) -> String {
    label
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Returns every canonical franchise.
#[must_use]
pub fn all_teams() -> &'static [TeamInfo] {
    &TABLE.teams
}

/// Returns the franchise with exactly this canonical code
/// (case-insensitive). Aliases are not consulted.
#[must_use]
pub fn team_by_code(code: &str) -> Option<&'static TeamInfo> {
    let code = code.trim();
    TABLE
        .teams
        .iter()
        .find(|t| t.code.eq_ignore_ascii_case(code))
}

/// Resolves a raw team label to its canonical franchise.
///
/// Precedence: exact canonical code, then any alias, full name, or
/// nickname, then metro labels narrowed by `context` (canonical codes of
/// the teams known to be involved, e.g. the event's matchup).
///
/// # Errors
///
/// * [`TeamLookupError::Ambiguous`] if the label is a shared metro label
///   and `context` does not name exactly one of its franchises
/// * [`TeamLookupError::Unknown`] if the label matches nothing
pub fn lookup_team(raw: &str, context: &[String]) -> Result<&'static TeamInfo, TeamLookupError> {
    if let Some(team) = team_by_code(raw) {
        return Ok(team);
    }

    let key = normalize_label(raw);
    let table = &*TABLE;

    if let Some(&i) = table.index.get(&key) {
        return Ok(&table.teams[i]);
    }

    if let Some(candidates) = table.metros.get(&key) {
        let in_context: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| {
                context
                    .iter()
                    .any(|code| code.eq_ignore_ascii_case(&table.teams[i].code))
            })
            .collect();

        if let [only] = in_context.as_slice() {
            return Ok(&table.teams[*only]);
        }

        return Err(TeamLookupError::Ambiguous {
            raw: raw.to_string(),
            candidates: candidates
                .iter()
                .map(|&i| table.teams[i].code.clone())
                .collect(),
        });
    }

    Err(TeamLookupError::Unknown {
        raw: raw.to_string(),
    })
}

/// Convenience wrapper returning just the canonical code.
///
/// # Errors
///
/// Same as [`lookup_team`].
pub fn canonical_code(raw: &str, context: &[String]) -> Result<&'static str, TeamLookupError> {
    lookup_team(raw, context).map(|t| t.code.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_all_32_franchises_with_unique_codes() {
        let teams = all_teams();
        assert_eq!(teams.len(), 32);
        let mut codes: Vec<&str> = teams.iter().map(|t| t.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 32);
    }

    #[test]
    fn every_alias_resolves_to_its_own_team() {
        for team in all_teams() {
            for alias in &team.aliases {
                assert_eq!(
                    canonical_code(alias, &[]).unwrap(),
                    team.code,
                    "alias {alias}"
                );
            }
            assert_eq!(canonical_code(&team.name, &[]).unwrap(), team.code);
            assert_eq!(canonical_code(&team.nickname, &[]).unwrap(), team.code);
        }
    }

    #[test]
    fn legacy_codes_map_to_current_franchise() {
        assert_eq!(canonical_code("WAS", &[]).unwrap(), "WSH");
        assert_eq!(canonical_code("OAK", &[]).unwrap(), "LV");
        assert_eq!(canonical_code("GNB", &[]).unwrap(), "GB");
        assert_eq!(canonical_code("tbb", &[]).unwrap(), "TB");
        assert_eq!(canonical_code("St. Louis Rams", &[]).unwrap(), "LAR");
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(canonical_code("n.y. giants", &[]).unwrap(), "NYG");
        assert_eq!(canonical_code("  New   York  Jets ", &[]).unwrap(), "NYJ");
    }

    #[test]
    fn unique_city_resolves_but_shared_metro_does_not() {
        assert_eq!(canonical_code("Green Bay", &[]).unwrap(), "GB");

        let err = canonical_code("New York", &[]).unwrap_err();
        assert_eq!(
            err,
            TeamLookupError::Ambiguous {
                raw: "New York".to_string(),
                candidates: vec!["NYG".to_string(), "NYJ".to_string()],
            }
        );
    }

    #[test]
    fn metro_label_uses_context_to_disambiguate() {
        let context = vec!["NYJ".to_string(), "BUF".to_string()];
        assert_eq!(canonical_code("New York", &context).unwrap(), "NYJ");

        let both = vec!["LAC".to_string(), "LAR".to_string()];
        assert!(matches!(
            canonical_code("Los Angeles", &both),
            Err(TeamLookupError::Ambiguous { .. })
        ));
    }

    #[test]
    fn rejects_unknown_labels() {
        assert_eq!(
            canonical_code("Springfield Atoms", &[]),
            Err(TeamLookupError::Unknown {
                raw: "Springfield Atoms".to_string()
            })
        );
    }
}

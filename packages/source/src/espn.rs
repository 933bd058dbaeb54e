//! ESPN box-score page extractor.
//!
//! All knowledge of ESPN's markup lives in [`BoxscoreLayout`]. A box score
//! is a sequence of team sections:
//!
//! ```text
//! <div class="TeamTitle" data-testid="teamTitle">
//!   <div class="TeamTitle__Name">Kansas City Chiefs Passing</div>
//! </div>
//! <div class="ResponsiveTable">
//!   <table class="Table--fixed-left"> names </table>
//!   <div class="Table__Scroller"><table> stats </table></div>
//! </div>
//! ```
//!
//! Row 0 of each table is the header; the final `TEAM` row holds totals and
//! is skipped.

use chrono::NaiveDate;
use gridiron_stats_models::{EntityRef, StatCategory, StatFields};
use scraper::{ElementRef, Html, Selector};

use crate::columns::{map_row, normalize_header};
use crate::{ExtractedEvent, ExtractionError, Extractor, RawContent, Side, StatSection, TeamScore};

/// CSS selectors describing one version of the box-score layout.
#[derive(Debug, Clone)]
pub struct BoxscoreLayout {
    /// Section heading container.
    pub team_title: Selector,
    /// Heading text element inside [`Self::team_title`].
    pub team_name: Selector,
    /// Stats container following each heading.
    pub stats_table: Selector,
    /// Fixed left table holding entity names.
    pub names_table: Selector,
    /// Scrollable table holding stat values.
    pub values_table: Selector,
    /// Table rows.
    pub row: Selector,
    /// Header and data cells.
    pub cell: Selector,
    /// Container holding the printed game date.
    pub game_meta: Selector,
    /// One scoreboard block per team, away first.
    pub scoreboard_team: Selector,
    /// Team name inside a scoreboard block.
    pub scoreboard_name: Selector,
    /// Score inside a scoreboard block.
    pub scoreboard_score: Selector,
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

impl BoxscoreLayout {
    /// The current ESPN layout.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Selector`] if a selector fails to parse.
    pub fn espn() -> Result<Self, ExtractionError> {
        Ok(Self {
            team_title: selector("div.TeamTitle")?,
            team_name: selector("div.TeamTitle__Name")?,
            stats_table: selector("div.ResponsiveTable")?,
            names_table: selector("table.Table--fixed-left")?,
            values_table: selector("div.Table__Scroller table")?,
            row: selector("tr")?,
            cell: selector("th, td")?,
            game_meta: selector("div.GameInfo__Meta")?,
            scoreboard_team: selector("div.Gamestrip__Team")?,
            scoreboard_name: selector(".ScoreCell__TeamName")?,
            scoreboard_score: selector(".Gamestrip__Score")?,
        })
    }
}

/// Extracts stat sections from ESPN box-score pages.
#[derive(Debug, Clone)]
pub struct EspnBoxscoreExtractor {
    layout: BoxscoreLayout,
}

impl EspnBoxscoreExtractor {
    /// Creates an extractor for the current ESPN layout.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Selector`] if the layout fails to build.
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self::with_layout(BoxscoreLayout::espn()?))
    }

    /// Creates an extractor for a custom layout.
    #[must_use]
    pub const fn with_layout(layout: BoxscoreLayout) -> Self {
        Self { layout }
    }

    fn sections(&self, document: &Html) -> Vec<StatSection> {
        let mut sections = Vec::new();

        for title in document.select(&self.layout.team_title) {
            let Some(name) = title.select(&self.layout.team_name).next() else {
                continue;
            };
            let heading = stripped_text(&name);

            let Some((source_team, category)) = split_heading(&heading) else {
                log::warn!("Unrecognized box-score heading {heading:?}");
                continue;
            };

            let Some(table) = title
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take_while(|el| !self.layout.team_title.matches(el))
                .find(|el| self.layout.stats_table.matches(el))
            else {
                log::warn!("No stats table follows heading {heading:?}");
                continue;
            };

            let rows = self.table_rows(&table, category);
            log::debug!("{heading}: {} rows", rows.len());
            sections.push(StatSection {
                source_team,
                category,
                rows,
            });
        }

        sections
    }

    fn table_rows(
        &self,
        table: &ElementRef<'_>,
        category: StatCategory,
    ) -> Vec<(EntityRef, StatFields)> {
        let (Some(names), Some(values)) = (
            table.select(&self.layout.names_table).next(),
            table.select(&self.layout.values_table).next(),
        ) else {
            log::warn!("{category}: stats table is missing its name or value half");
            return Vec::new();
        };

        let names: Vec<String> = names
            .select(&self.layout.row)
            .skip(1)
            .map(|row| {
                row.select(&self.layout.cell)
                    .next()
                    .map(|cell| stripped_text(&cell))
                    .unwrap_or_default()
            })
            .collect();

        let mut value_rows = values.select(&self.layout.row);
        let Some(header_row) = value_rows.next() else {
            return Vec::new();
        };
        let headers: Vec<String> = header_row
            .select(&self.layout.cell)
            .map(|cell| normalize_header(&stripped_text(&cell)))
            .collect();

        names
            .into_iter()
            .zip(value_rows)
            .filter(|(name, _)| !name.is_empty() && !name.eq_ignore_ascii_case("team"))
            .map(|(name, row)| {
                let cells: Vec<String> = row
                    .select(&self.layout.cell)
                    .map(|cell| stripped_text(&cell))
                    .collect();
                (EntityRef::player(name), map_row(category, &headers, &cells))
            })
            .collect()
    }

    fn event_date(&self, document: &Html) -> Option<NaiveDate> {
        document
            .select(&self.layout.game_meta)
            .flat_map(|meta| meta.text().map(str::trim).collect::<Vec<_>>())
            .find_map(parse_page_date)
    }

    fn scoreboard(&self, document: &Html) -> Vec<TeamScore> {
        document
            .select(&self.layout.scoreboard_team)
            .take(2)
            .zip([Side::Away, Side::Home])
            .filter_map(|(block, side)| {
                let name = block.select(&self.layout.scoreboard_name).next()?;
                let points = block
                    .select(&self.layout.scoreboard_score)
                    .next()
                    .and_then(|score| leading_number(&stripped_text(&score)));
                Some(TeamScore {
                    source_team: stripped_text(&name),
                    side,
                    points,
                })
            })
            .collect()
    }
}

impl Extractor for EspnBoxscoreExtractor {
    fn name(&self) -> &'static str {
        "espn_boxscore"
    }

    fn extract(&self, raw: &RawContent) -> Result<ExtractedEvent, ExtractionError> {
        let document = Html::parse_document(&raw.body);

        let sections = self.sections(&document);
        let scoreboard = self.scoreboard(&document);

        if sections.is_empty() && scoreboard.is_empty() {
            return Err(ExtractionError::NoBoxScore {
                event_id: raw.event_id.clone(),
            });
        }

        let event_date = self.event_date(&document);
        if event_date.is_none() {
            log::warn!("Event {}: no game date on page", raw.event_id);
        }

        Ok(ExtractedEvent {
            event_date,
            scoreboard,
            sections,
        })
    }
}

/// Concatenates an element's text nodes, each trimmed. A name cell like
/// `<a>P. Mahomes</a><span>#15</span>` becomes `P. Mahomes#15`.
fn stripped_text(el: &ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

/// Splits `Kansas City Chiefs Kick Returns` into the team label and the
/// category, matching the longest known category label.
fn split_heading(heading: &str) -> Option<(String, StatCategory)> {
    let mut categories = StatCategory::BOX_SCORE;
    categories.sort_by_key(|c| std::cmp::Reverse(c.page_label().len()));

    categories.into_iter().find_map(|category| {
        let label = category.page_label();
        let team = heading.strip_suffix(label)?.trim_end();
        (!team.is_empty()).then(|| (team.to_string(), category))
    })
}

/// Parses `Friday, September 5, 2025` or `8:20 PM, September 5, 2025`.
fn parse_page_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%B %d, %Y").ok().or_else(|| {
        let (_, rest) = text.split_once(',')?;
        NaiveDate::parse_from_str(rest.trim(), "%B %d, %Y").ok()
    })
}

fn leading_number(text: &str) -> Option<i64> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="Gamestrip__Competitors">
  <div class="Gamestrip__Team Gamestrip__Team--away">
    <h2 class="ScoreCell__TeamName">Chiefs</h2>
    <div class="Gamestrip__Score">21<svg></svg></div>
  </div>
  <div class="Gamestrip__Team Gamestrip__Team--home">
    <h2 class="ScoreCell__TeamName">Chargers</h2>
    <div class="Gamestrip__Score">27</div>
  </div>
</div>
<div class="GameInfo__Meta">
  <span>8:00 PM, September 5, 2025</span><span>Coverage: YouTube</span>
</div>

<div class="Boxscore">
  <div class="TeamTitle" data-testid="teamTitle">
    <div class="TeamTitle__Name">Kansas City Chiefs Passing</div>
  </div>
  <div class="ResponsiveTable">
    <table class="Table Table--fixed-left">
      <tr><th>passing</th></tr>
      <tr><td><a>Patrick Mahomes</a><span>#15</span></td></tr>
      <tr><td>TEAM</td></tr>
    </table>
    <div class="Table__Scroller"><table>
      <tr><th>C/ATT</th><th>YDS</th><th>AVG</th><th>TD</th>
          <th>INT</th><th>SACKS</th><th>QBR</th><th>RTG</th></tr>
      <tr><td>24/39</td><td>258</td><td>6.6</td><td>1</td>
          <td>0</td><td>1-7</td><td>62.1</td><td>90.8</td></tr>
      <tr><td>24/39</td><td>251</td><td>6.4</td><td>1</td>
          <td>0</td><td>1-7</td><td></td><td></td></tr>
    </table></div>
  </div>

  <div class="TeamTitle" data-testid="teamTitle">
    <div class="TeamTitle__Name">Kansas City Chiefs Kick Returns</div>
  </div>
  <div class="ResponsiveTable">
    <table class="Table Table--fixed-left">
      <tr><th>kick returns</th></tr>
      <tr><td>Nikko Remigio</td></tr>
    </table>
    <div class="Table__Scroller"><table>
      <tr><th>NO</th><th>YDS</th><th>AVG</th><th>LONG</th><th>TD</th></tr>
      <tr><td>2</td><td>55</td><td>27.5</td><td>31</td><td>0</td></tr>
    </table></div>
  </div>

  <div class="TeamTitle" data-testid="teamTitle">
    <div class="TeamTitle__Name">Los Angeles Chargers Kicking</div>
  </div>
  <div class="ResponsiveTable">
    <table class="Table Table--fixed-left">
      <tr><th>kicking</th></tr>
      <tr><td>Cameron Dicker</td></tr>
    </table>
    <div class="Table__Scroller"><table>
      <tr><th>FG</th><th>PCT</th><th>LONG</th><th>XP</th><th>PTS</th></tr>
      <tr><td>2/2</td><td>100.0</td><td>41</td><td>3/3</td><td>9</td></tr>
    </table></div>
  </div>
</div>
</body></html>
"#;

    fn raw(body: &str) -> RawContent {
        RawContent {
            event_id: "401772936".to_string(),
            url: "https://www.espn.com/nfl/boxscore/_/gameId/401772936".to_string(),
            body: body.to_string(),
            fetched_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn extracts_sections_with_multi_word_categories() {
        let extractor = EspnBoxscoreExtractor::new().unwrap();
        let extracted = extractor.extract(&raw(PAGE)).unwrap();

        let summary: Vec<(&str, StatCategory, usize)> = extracted
            .sections
            .iter()
            .map(|s| (s.source_team.as_str(), s.category, s.rows.len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Kansas City Chiefs", StatCategory::Passing, 1),
                ("Kansas City Chiefs", StatCategory::KickReturns, 1),
                ("Los Angeles Chargers", StatCategory::Kicking, 1),
            ]
        );
    }

    #[test]
    fn skips_team_total_rows_and_keeps_jersey_composite() {
        let extractor = EspnBoxscoreExtractor::new().unwrap();
        let extracted = extractor.extract(&raw(PAGE)).unwrap();
        let passing = &extracted.sections[0];

        assert_eq!(passing.rows.len(), 1);
        let (entity, fields) = &passing.rows[0];
        assert_eq!(entity, &EntityRef::player("Patrick Mahomes#15"));
        assert_eq!(fields["completions"].as_i64(), Some(24));
        assert_eq!(fields["attempts"].as_i64(), Some(39));
        assert_eq!(fields["yards"].as_i64(), Some(258));
    }

    #[test]
    fn reads_date_and_scoreboard() {
        let extractor = EspnBoxscoreExtractor::new().unwrap();
        let extracted = extractor.extract(&raw(PAGE)).unwrap();

        assert_eq!(extracted.event_date, NaiveDate::from_ymd_opt(2025, 9, 5));
        assert_eq!(
            extracted.scoreboard,
            vec![
                TeamScore {
                    source_team: "Chiefs".to_string(),
                    side: Side::Away,
                    points: Some(21),
                },
                TeamScore {
                    source_team: "Chargers".to_string(),
                    side: Side::Home,
                    points: Some(27),
                },
            ]
        );
    }

    #[test]
    fn page_without_box_score_is_an_error() {
        let extractor = EspnBoxscoreExtractor::new().unwrap();
        let err = extractor
            .extract(&raw("<html><body><p>Game postponed</p></body></html>"))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoBoxScore { .. }));
    }

    #[test]
    fn heading_split_prefers_longest_category() {
        assert_eq!(
            split_heading("New York Giants Punt Returns"),
            Some(("New York Giants".to_string(), StatCategory::PuntReturns))
        );
        assert_eq!(
            split_heading("49ers Receiving"),
            Some(("49ers".to_string(), StatCategory::Receiving))
        );
        assert_eq!(split_heading("Passing"), None);
        assert_eq!(split_heading("Giants Weather"), None);
    }

    #[test]
    fn parses_both_page_date_forms() {
        assert_eq!(
            parse_page_date("Friday, September 5, 2025"),
            NaiveDate::from_ymd_opt(2025, 9, 5)
        );
        assert_eq!(
            parse_page_date("January 12, 2025"),
            NaiveDate::from_ymd_opt(2025, 1, 12)
        );
        assert_eq!(parse_page_date("Coverage: YouTube"), None);
    }
}

//! Turns match records into the text shown on the poster overlay.

use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use regex::Regex;

use crate::model::{LeagueInfo, MatchRecord, Team};

pub const FIELD_SEPARATOR: &str = " | ";

/// A column the user can put on the poster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum FieldId {
    Date,
    Time,
    Home,
    HomeShort,
    HomeScore,
    Result,
    GuestScore,
    Guest,
    GuestShort,
    League,
}

impl FieldId {
    /// Order used by the composer's number-key toggles (1..9, then 0).
    pub const ALL: [FieldId; 10] = [
        FieldId::Date,
        FieldId::Time,
        FieldId::Home,
        FieldId::HomeShort,
        FieldId::HomeScore,
        FieldId::Result,
        FieldId::GuestScore,
        FieldId::Guest,
        FieldId::GuestShort,
        FieldId::League,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldId::Date => "date",
            FieldId::Time => "time",
            FieldId::Home => "home",
            FieldId::HomeShort => "home-short",
            FieldId::HomeScore => "home-score",
            FieldId::Result => "result",
            FieldId::GuestScore => "guest-score",
            FieldId::Guest => "guest",
            FieldId::GuestShort => "guest-short",
            FieldId::League => "league",
        }
    }

    fn is_team(self) -> bool {
        matches!(
            self,
            FieldId::Home | FieldId::HomeShort | FieldId::Guest | FieldId::GuestShort
        )
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn default_fields() -> Vec<FieldId> {
    vec![
        FieldId::Date,
        FieldId::HomeShort,
        FieldId::Result,
        FieldId::GuestShort,
    ]
}

/// Adds `field` at the end of the selection, or removes it if present.
pub fn toggle_field(fields: &mut Vec<FieldId>, field: FieldId) {
    if let Some(idx) = fields.iter().position(|f| *f == field) {
        fields.remove(idx);
    } else {
        fields.push(field);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TextFormat {
    /// One line per match.
    #[default]
    Plain,
    /// One `<p>` per match, team names in `<strong>`.
    Html,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub home: u32,
    pub guest: u32,
}

/// Splits `"58:42"` into its two sides. Missing or unparseable sides are 0.
pub fn parse_result(result: Option<&str>) -> Score {
    let Some(result) = result else {
        return Score::default();
    };
    let mut sides = result.split(':').map(|s| s.trim().parse::<u32>().unwrap_or(0));
    Score {
        home: sides.next().unwrap_or(0),
        guest: sides.next().unwrap_or(0),
    }
}

/// Everything a field can be resolved against for one match.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    pub record: &'a MatchRecord,
    pub league: Option<&'a LeagueInfo>,
    pub date: String,
    pub time: String,
    pub score: Score,
}

impl<'a> MatchContext<'a> {
    pub fn new(record: &'a MatchRecord, league: Option<&'a LeagueInfo>) -> Self {
        let (date, time) = display_kickoff(&record.kickoff_date, &record.kickoff_time);
        Self {
            record,
            league,
            date,
            time,
            score: parse_result(record.result.as_deref()),
        }
    }

    /// Never fails; anything missing along the way resolves to "".
    pub fn resolve(&self, field: FieldId) -> String {
        let played = self.record.result.is_some();
        match field {
            FieldId::Date => self.date.clone(),
            FieldId::Time => self.time.clone(),
            FieldId::Home => team_name(self.record.home_team.as_ref(), false),
            FieldId::HomeShort => team_name(self.record.home_team.as_ref(), true),
            FieldId::Guest => team_name(self.record.guest_team.as_ref(), false),
            FieldId::GuestShort => team_name(self.record.guest_team.as_ref(), true),
            FieldId::HomeScore if played => self.score.home.to_string(),
            FieldId::GuestScore if played => self.score.guest.to_string(),
            FieldId::HomeScore | FieldId::GuestScore => String::new(),
            FieldId::Result => self.record.result.clone().unwrap_or_default(),
            FieldId::League => self
                .record
                .liga_data
                .as_ref()
                .or(self.league)
                .and_then(|l| l.liganame.clone())
                .unwrap_or_default(),
        }
    }
}

fn team_name(team: Option<&Team>, short: bool) -> String {
    team.and_then(|t| {
        if short {
            t.teamname_small.clone()
        } else {
            t.teamname.clone()
        }
    })
    .unwrap_or_default()
}

/// German-style `DD.MM.YYYY` / `HH:MM`. Parts that fail to parse are shown raw.
fn display_kickoff(date: &str, time: &str) -> (String, String) {
    let combined = format!("{}T{}", date.trim(), time.trim());
    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, fmt) {
            return (
                dt.format("%d.%m.%Y").to_string(),
                dt.format("%H:%M").to_string(),
            );
        }
    }
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|_| date.to_string());
    (date, time.to_string())
}

/// Builds the overlay text: one line (or paragraph) per match, fields in
/// selection order.
pub fn compose_text(
    matches: &[MatchRecord],
    league: Option<&LeagueInfo>,
    fields: &[FieldId],
    format: TextFormat,
) -> String {
    let lines = matches.iter().map(|record| {
        let ctx = MatchContext::new(record, league);
        match format {
            TextFormat::Plain => fields
                .iter()
                .map(|f| ctx.resolve(*f))
                .collect::<Vec<_>>()
                .join(FIELD_SEPARATOR),
            TextFormat::Html => {
                let segments = fields
                    .iter()
                    .map(|f| {
                        let value = escape_html(&ctx.resolve(*f));
                        if f.is_team() {
                            format!("<strong>{value}</strong>")
                        } else {
                            value
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(FIELD_SEPARATOR);
                format!("<p>{segments}</p>")
            }
        }
    });

    match format {
        TextFormat::Plain => lines.collect::<Vec<_>>().join("\n"),
        TextFormat::Html => lines.collect::<String>(),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6])\s*>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Strips markup so the text can be drawn line by line.
pub fn plain_text(text: &str) -> String {
    let text = BLOCK_BREAK.replace_all(text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.trim_end_matches(['\n', '\r']).to_string()
}

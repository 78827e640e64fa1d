use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope returned by `/club/id/<id>/actualmatches`, relayed as-is by the proxy.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesResponse {
    pub data: Option<MatchesData>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchesData {
    pub matches: Vec<MatchRecord>,
    pub liga_data: Option<LeagueInfo>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRecord {
    pub kickoff_date: String, // "2024-05-01"
    pub kickoff_time: String, // "18:00"
    pub home_team: Option<Team>,
    pub guest_team: Option<Team>,
    pub result: Option<String>, // "58:42", absent until played
    pub liga_data: Option<LeagueInfo>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Team {
    pub teamname: Option<String>,
    pub teamname_small: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeagueInfo {
    pub liganame: Option<String>,
    pub ak_name: Option<String>, // age class, "Senioren"
}

impl LeagueInfo {
    /// League name with the age class appended when the upstream sends one.
    pub fn label(&self) -> Option<String> {
        let name = self.liganame.as_deref()?;
        Some(match self.ak_name.as_deref().filter(|ak| !ak.is_empty()) {
            Some(ak) => format!("{name} ({ak})"),
            None => name.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("response has no `data` object")]
    MissingData,
    #[error("response has no `data.matches` list")]
    MissingMatches,
    #[error("`data.matches` is not an array")]
    MatchesNotArray,
    #[error("match record could not be decoded: {0}")]
    Record(#[from] serde_json::Error),
}

/// A validated batch of matches plus the league they belong to.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct MatchBatch {
    pub matches: Vec<MatchRecord>,
    pub league: Option<LeagueInfo>,
}

impl MatchBatch {
    /// Validates that `data.matches` is an array before decoding the records.
    ///
    /// League metadata comes from `data.ligaData` when the upstream sends it
    /// for the whole batch, otherwise from the first record that carries one.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ShapeError> {
        let data = value.get("data").ok_or(ShapeError::MissingData)?;
        let matches = data.get("matches").ok_or(ShapeError::MissingMatches)?;
        if !matches.is_array() {
            return Err(ShapeError::MatchesNotArray);
        }

        let response: MatchesResponse = serde_json::from_value(value.clone())?;
        let data = response.data.unwrap_or_default();
        let league = data
            .liga_data
            .or_else(|| data.matches.iter().find_map(|m| m.liga_data.clone()));

        Ok(Self {
            matches: data.matches,
            league,
        })
    }
}

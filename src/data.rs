use crate::model::MatchBatch;
use anyhow::{bail, Context, Result};
use reqwest::Client;

/// Filters sent with every match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub just_home: bool,
    pub range_days: u32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            just_home: false,
            range_days: 30,
        }
    }
}

impl FilterParams {
    pub const MIN_RANGE_DAYS: u32 = 1;
    pub const MAX_RANGE_DAYS: u32 = 60;

    pub fn toggled_home(self) -> Self {
        Self {
            just_home: !self.just_home,
            ..self
        }
    }

    /// Shifts the day range, staying within `1..=60`.
    pub fn shifted_range(self, delta: i64) -> Self {
        let days = (self.range_days as i64 + delta)
            .clamp(Self::MIN_RANGE_DAYS as i64, Self::MAX_RANGE_DAYS as i64);
        Self {
            range_days: days as u32,
            ..self
        }
    }

    pub fn query(&self) -> String {
        format!("justHome={}&rangeDays={}", self.just_home, self.range_days)
    }

    /// Reads `justHome` / `rangeDays` from a raw query string. Anything
    /// missing or unparseable keeps the value from `defaults`.
    pub fn from_query(query: &str, defaults: FilterParams) -> Self {
        let mut params = defaults;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "justHome" => {
                    if value.eq_ignore_ascii_case("true") {
                        params.just_home = true;
                    } else if value.eq_ignore_ascii_case("false") {
                        params.just_home = false;
                    }
                }
                "rangeDays" => {
                    if let Ok(days) = value.trim().parse::<u32>() {
                        if days >= Self::MIN_RANGE_DAYS {
                            params.range_days = days;
                        }
                    }
                }
                _ => {}
            }
        }
        params
    }
}

/// Hands out increasing sequence numbers so that only the answer to the most
/// recent request is applied, whatever order the responses arrive in.
#[derive(Debug, Default)]
pub struct RequestSeq {
    latest: u64,
}

impl RequestSeq {
    pub fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        seq == self.latest
    }
}

pub struct DataClient {
    client: Client,
    base_url: String,
}

impl DataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn fetch_matches(&self, filters: &FilterParams) -> Result<MatchBatch> {
        let url = format!(
            "{}/api/spiele?{}",
            self.base_url.trim_end_matches('/'),
            filters.query()
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = resp.status();
        let body = resp
            .json::<serde_json::Value>()
            .await
            .context("proxy response is not JSON")?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            bail!("proxy answered {status}: {message}");
        }

        let batch = MatchBatch::from_value(&body)?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchesResponse;
    use std::fs;
    use tiny_http::{Response, Server};

    fn fixture() -> String {
        fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/actualmatches.json"
        ))
        .expect("Failed to read fixture")
    }

    /// Serves `body` with `status` for every request, returns the base URL.
    fn fake_proxy(status: u16, body: String) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let response = Response::from_string(body.clone()).with_status_code(status);
                let _ = request.respond(response);
            }
        });
        format!("http://127.0.0.1:{port}")
    }

    #[test]
    fn test_deserialize_sample() {
        let content = fixture();
        let _data: MatchesResponse =
            serde_json::from_str(&content).expect("Failed to deserialize");
    }

    #[test]
    fn query_uses_upstream_parameter_names() {
        let filters = FilterParams {
            just_home: true,
            range_days: 8,
        };
        assert_eq!(filters.query(), "justHome=true&rangeDays=8");
    }

    #[test]
    fn from_query_keeps_defaults_for_bad_values() {
        let defaults = FilterParams::default();
        assert_eq!(FilterParams::from_query("", defaults), defaults);
        assert_eq!(
            FilterParams::from_query("justHome=maybe&rangeDays=abc", defaults),
            defaults
        );
        assert_eq!(
            FilterParams::from_query("rangeDays=0", defaults).range_days,
            30
        );
        let parsed = FilterParams::from_query("justHome=TRUE&rangeDays=14", defaults);
        assert!(parsed.just_home);
        assert_eq!(parsed.range_days, 14);
    }

    #[test]
    fn range_shift_is_clamped() {
        let filters = FilterParams {
            just_home: false,
            range_days: 59,
        };
        assert_eq!(filters.shifted_range(5).range_days, 60);
        assert_eq!(filters.shifted_range(-100).range_days, 1);
        assert!(filters.toggled_home().just_home);
    }

    #[test]
    fn only_latest_sequence_is_current() {
        let mut seq = RequestSeq::default();
        let first = seq.issue();
        let second = seq.issue();
        assert!(second > first);
        assert!(!seq.is_latest(first));
        assert!(seq.is_latest(second));
    }

    #[tokio::test]
    async fn fetches_and_validates_matches() {
        let base = fake_proxy(200, fixture());
        let client = DataClient::new(base);
        let batch = client
            .fetch_matches(&FilterParams::default())
            .await
            .unwrap();
        assert_eq!(batch.matches.len(), 2);
        assert_eq!(batch.matches[0].result.as_deref(), Some("70:65"));
    }

    #[tokio::test]
    async fn proxy_error_payload_becomes_error() {
        let base = fake_proxy(500, r#"{"error":"Fehler beim Laden der Spieldaten"}"#.into());
        let client = DataClient::new(base);
        let err = client
            .fetch_matches(&FilterParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Fehler beim Laden der Spieldaten"));
    }

    #[tokio::test]
    async fn wrong_shape_is_rejected() {
        let base = fake_proxy(200, r#"{"data":{"matches":"none"}}"#.into());
        let client = DataClient::new(base);
        assert!(client
            .fetch_matches(&FilterParams::default())
            .await
            .is_err());
    }
}

//! `GET /api/spiele` pass-through to the basketball-bund.net REST API.

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use thiserror::Error;
use tiny_http::{Header, Method, Response, Server};

use crate::config::Config;
use crate::data::FilterParams;

pub const ROUTE: &str = "/api/spiele";
pub const LOAD_FAILURE_MESSAGE: &str = "Fehler beim Laden der Spieldaten";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream answered {0}")]
    Status(u16),
    #[error("upstream body is not JSON: {0}")]
    NotJson(#[from] serde_json::Error),
}

/// Where the proxy forwards to. Fixed per deployment.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub base: String,
    pub club_id: String,
    pub defaults: FilterParams,
}

impl Upstream {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base: config.upstream_base.clone(),
            club_id: config.club_id.clone(),
            defaults: config.default_filters,
        }
    }

    pub fn matches_url(&self, filters: &FilterParams) -> String {
        format!(
            "{}/club/id/{}/actualmatches?{}",
            self.base.trim_end_matches('/'),
            self.club_id,
            filters.query()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl ProxyResponse {
    fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            body,
            headers: vec![
                ("Content-Type", "application/json"),
                ("Access-Control-Allow-Origin", "*"),
            ],
        }
    }

    fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::json(status, body.into_bytes())
    }
}

pub fn handle_request(
    client: &Client,
    upstream: &Upstream,
    method: &Method,
    url: &str,
) -> ProxyResponse {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    if path != ROUTE {
        return ProxyResponse::error(404, "not found");
    }

    match method {
        Method::Get => {}
        Method::Options => {
            return ProxyResponse {
                status: 204,
                body: Vec::new(),
                headers: vec![
                    ("Access-Control-Allow-Origin", "*"),
                    ("Access-Control-Allow-Methods", "GET, OPTIONS"),
                ],
            }
        }
        _ => return ProxyResponse::error(405, "method not allowed"),
    }

    let filters = FilterParams::from_query(query, upstream.defaults);
    let target = upstream.matches_url(&filters);
    match fetch_upstream(client, &target) {
        Ok(body) => {
            tracing::info!(url = %target, bytes = body.len(), "relayed matches");
            ProxyResponse::json(200, body)
        }
        Err(err) => {
            tracing::warn!(url = %target, error = %err, "upstream failed");
            ProxyResponse::error(500, LOAD_FAILURE_MESSAGE)
        }
    }
}

/// Body is returned untouched once it is known to be JSON.
fn fetch_upstream(client: &Client, url: &str) -> Result<Vec<u8>, ProxyError> {
    let resp = client.get(url).send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ProxyError::Status(status.as_u16()));
    }
    let body = resp.bytes()?;
    serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;
    Ok(body.to_vec())
}

/// Blocking accept loop; one request at a time.
pub fn serve(config: &Config) -> Result<()> {
    let server = Server::http(&config.bind).map_err(|e| anyhow!("cannot bind {}: {e}", config.bind))?;
    let client = Client::new();
    let upstream = Upstream::from_config(config);
    tracing::info!(bind = %config.bind, upstream = %upstream.base, club = %upstream.club_id, "proxy listening");

    for request in server.incoming_requests() {
        let reply = handle_request(&client, &upstream, request.method(), request.url());
        tracing::debug!(method = %request.method(), url = %request.url(), status = reply.status, "request");

        let mut response = Response::from_data(reply.body).with_status_code(reply.status);
        for (name, value) in reply.headers {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }
        if let Err(err) = request.respond(response) {
            tracing::warn!(error = %err, "failed to write response");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const BODY: &str = r#"{"status":"0","data":{"matches":[{"kickoffDate":"2024-05-01","result":"70:65"}]}}"#;

    /// Upstream stub answering every request with `status`/`body`; the
    /// requested URLs are forwarded on the returned channel.
    fn fake_upstream(status: u16, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let _ = tx.send(request.url().to_string());
                let response = Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });
        (format!("http://127.0.0.1:{port}/rest"), rx)
    }

    fn upstream(base: String) -> Upstream {
        Upstream {
            base,
            club_id: "4307".into(),
            defaults: FilterParams::default(),
        }
    }

    fn error_body() -> Vec<u8> {
        br#"{"error":"Fehler beim Laden der Spieldaten"}"#.to_vec()
    }

    #[test]
    fn builds_upstream_url() {
        let up = upstream("https://www.basketball-bund.net/rest/".into());
        let url = up.matches_url(&FilterParams {
            just_home: true,
            range_days: 8,
        });
        assert_eq!(
            url,
            "https://www.basketball-bund.net/rest/club/id/4307/actualmatches?justHome=true&rangeDays=8"
        );
    }

    #[test]
    fn relays_body_verbatim_for_all_filters() {
        let (base, rx) = fake_upstream(200, BODY);
        let up = upstream(base);
        let client = Client::new();
        for just_home in [true, false] {
            for days in [1, 8, 30, 60] {
                let reply = handle_request(
                    &client,
                    &up,
                    &Method::Get,
                    &format!("/api/spiele?justHome={just_home}&rangeDays={days}"),
                );
                assert_eq!(reply.status, 200);
                assert_eq!(reply.body, BODY.as_bytes());
                assert!(reply.headers.contains(&("Access-Control-Allow-Origin", "*")));
                assert_eq!(
                    rx.recv().unwrap(),
                    format!("/rest/club/id/4307/actualmatches?justHome={just_home}&rangeDays={days}")
                );
            }
        }
    }

    #[test]
    fn missing_parameters_use_defaults() {
        let (base, rx) = fake_upstream(200, BODY);
        let client = Client::new();
        let reply = handle_request(&client, &upstream(base), &Method::Get, "/api/spiele");
        assert_eq!(reply.status, 200);
        assert_eq!(
            rx.recv().unwrap(),
            "/rest/club/id/4307/actualmatches?justHome=false&rangeDays=30"
        );
    }

    #[test]
    fn upstream_error_status_is_generic_500() {
        let (base, _rx) = fake_upstream(503, r#"{"detail":"maintenance"}"#);
        let client = Client::new();
        let reply = handle_request(&client, &upstream(base), &Method::Get, "/api/spiele");
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, error_body());
    }

    #[test]
    fn non_json_body_is_generic_500() {
        let (base, _rx) = fake_upstream(200, "<html>Wartungsarbeiten</html>");
        let client = Client::new();
        let reply = handle_request(&client, &upstream(base), &Method::Get, "/api/spiele");
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, error_body());
    }

    #[test]
    fn unreachable_upstream_is_generic_500() {
        let client = Client::new();
        let reply = handle_request(
            &client,
            &upstream("http://127.0.0.1:1".into()),
            &Method::Get,
            "/api/spiele?justHome=true",
        );
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, error_body());
    }

    #[test]
    fn other_routes_and_methods() {
        let client = Client::new();
        let up = upstream("http://127.0.0.1:1".into());
        assert_eq!(handle_request(&client, &up, &Method::Get, "/api/other").status, 404);
        assert_eq!(handle_request(&client, &up, &Method::Post, "/api/spiele").status, 405);
        let preflight = handle_request(&client, &up, &Method::Options, "/api/spiele");
        assert_eq!(preflight.status, 204);
        assert!(preflight.body.is_empty());
    }
}

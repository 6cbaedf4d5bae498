use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// JSON client for the API-backed sources.
///
/// Anything but `200 OK` is a [`ScrapeError::Request`]; retrying is up to the caller.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> ScrapeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|source| ScrapeError::Transport {
                url: String::new(),
                source,
            })?;

        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str) -> ScrapeResult<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| transport(url, source))?;
        Self::decode(url, response).await
    }

    pub async fn post_json(&self, url: &str, payload: &Value) -> ScrapeResult<Value> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|source| transport(url, source))?;
        Self::decode(url, response).await
    }

    async fn decode(url: &str, response: reqwest::Response) -> ScrapeResult<Value> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ScrapeError::Request {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|source| transport(url, source))
    }
}

fn transport(url: &str, source: reqwest::Error) -> ScrapeError {
    ScrapeError::Transport {
        url: url.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CannedResponse, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn non_200_carries_url_and_status() {
        let server = MockServer::start(vec![CannedResponse::status(503)]).await;
        let url = server.url("/api/v1/actueel-aanbod?");

        let err = HttpClient::new().unwrap().get_json(&url).await.unwrap_err();

        match err {
            ScrapeError::Request { url: failed, status } => {
                assert_eq!(failed, url);
                assert_eq!(status, 503);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_sends_payload_and_parses_json() {
        let server = MockServer::start(vec![CannedResponse::json(json!({"total": 3}))]).await;

        let body = HttpClient::new()
            .unwrap()
            .post_json(&server.url("/find"), &json!({"pageNo": 1}))
            .await
            .unwrap();

        assert_eq!(body, json!({"total": 3}));
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /find"));
        assert!(requests[0].contains(r#""pageNo":1"#));
    }
}

//! HTTP GET returning parsed JSON

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("refwatch/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// GET `url` and decode the JSON body. Non-2xx responses are failures;
    /// no retry is attempted.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url, bearer: Option<&str>) -> Result<T> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport {
                url: url.to_string(),
                message: format!("HTTP {} - {}", status, body.trim()),
            });
        }

        response.json().await.map_err(|e| transport_error(url, e))
    }
}

/// Append path segments to an API base URL (which may carry a path prefix
/// such as `/2.3`). Segments are percent-encoded individually.
pub fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn transport_error(url: &Url, error: reqwest::Error) -> Error {
    Error::Transport {
        url: url.to_string(),
        message: error.to_string(),
    }
}

//! Requests, responses and the network seam used by the offline cache.

use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Host part of the URL, without userinfo or port.
    pub fn host(&self) -> Option<&str> {
        let (_, rest) = self.url.split_once("://")?;
        let authority = rest.split(['/', '?', '#']).next()?;
        let host_port = authority.rsplit('@').next()?;

        let host = if let Some(bracketed) = host_port.strip_prefix('[') {
            bracketed.split(']').next()?
        } else {
            host_port.split(':').next()?
        };

        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn network(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Performs a network round trip. HTTP error statuses are responses, not errors.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("walkpin/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = match self.agent.request(&request.method, &request.url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => {
                return Err(FetchError::Transport {
                    url: request.url.clone(),
                    message: e.to_string(),
                })
            }
        };

        let status = response.status();
        let content_type = response.header("Content-Type").map(str::to_string);

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|source| FetchError::Body {
                url: request.url.clone(),
                source,
            })?;

        debug!(url = %request.url, status, bytes = body.len(), "Fetched from network");
        Ok(Response::network(status, content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_host() {
        let cases = [
            ("https://a.tile.openstreetmap.org/15/29105/12903.png", Some("a.tile.openstreetmap.org")),
            ("http://localhost:8080/index.html", Some("localhost")),
            ("http://user:pw@example.com:81?q=1", Some("example.com")),
            ("http://[::1]:8080/", Some("::1")),
            ("https://example.com#frag", Some("example.com")),
            ("/relative/path", None),
            ("file:///etc/hosts", None),
        ];
        for (url, expected) in cases {
            assert_eq!(Request::get(url).host(), expected, "{}", url);
        }
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let mut request = Request::get("http://x/");
        assert!(request.is_get());
        request.method = "get".to_string();
        assert!(request.is_get());
        request.method = "POST".to_string();
        assert!(!request.is_get());
    }

    #[test]
    fn test_response_is_ok() {
        assert!(Response::network(200, None, vec![]).is_ok());
        assert!(Response::network(204, None, vec![]).is_ok());
        assert!(!Response::network(304, None, vec![]).is_ok());
        assert!(!Response::network(404, None, vec![]).is_ok());
    }
}

// API client module: a small blocking HTTP client that posts batches of
// finds to the submission endpoint. It performs exactly one request per
// call; deciding whether and when to try again is the watcher's job.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::Settings;
use crate::error::{RelayError, Result};

/// Header the endpoint reads the key from (documented upstream as `API-Key`;
/// header names are case-insensitive).
pub const API_KEY_HEADER: &str = "api-key";

/// Request body for one submission. Built fresh for every attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub algorithm: String,
    pub founds: Vec<String>,
}

impl UploadPayload {
    pub fn new(algorithm: impl Into<String>, founds: Vec<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            founds,
        }
    }
}

/// What happened to a single submission.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The endpoint answered 200.
    Success,
    /// The endpoint answered with any other status.
    ServerRejected(u16),
    /// No usable response: refused, timed out, DNS or TLS failure.
    TransportError(Box<dyn std::error::Error + Send + Sync>),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Success => write!(f, "accepted"),
            UploadOutcome::ServerRejected(status) => write!(f, "rejected with status {}", status),
            UploadOutcome::TransportError(cause) => write!(f, "transport error: {}", cause),
        }
    }
}

/// Anything that can deliver a payload. The watcher only sees this.
pub trait Submit {
    fn submit(&self, payload: &UploadPayload) -> UploadOutcome;
}

/// Blocking client bound to one endpoint and one API key.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: String,
}

impl ApiClient {
    /// Build a client from resolved settings. The API key is attached to
    /// every request as a default header and marked sensitive so it stays
    /// out of debug output.
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut key = HeaderValue::from_str(&settings.api_key)
            .map_err(|_| RelayError::InvalidApiKey)?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(ApiClient {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Submit for ApiClient {
    fn submit(&self, payload: &UploadPayload) -> UploadOutcome {
        let res = match self.client.post(&self.endpoint).json(payload).send() {
            Ok(res) => res,
            Err(err) => return UploadOutcome::TransportError(Box::new(err)),
        };
        debug!(endpoint = %self.endpoint, founds = payload.founds.len(), "POST request sent");

        match res.status() {
            StatusCode::OK => UploadOutcome::Success,
            status => UploadOutcome::ServerRejected(status.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    struct CapturedRequest {
        head: String,
        body: String,
    }

    /// Accept one connection, answer with `status`, hand back the request.
    fn one_shot_server(status: &'static str) -> (String, mpsc::Receiver<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/v2/submit", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            )
            .unwrap();
            stream.flush().unwrap();

            let _ = tx.send(CapturedRequest {
                head,
                body: String::from_utf8(body).unwrap(),
            });
        });

        (url, rx)
    }

    fn settings_for(endpoint: String) -> Settings {
        Settings {
            endpoint,
            api_key: "test-key".into(),
            resubmission_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            algorithm: "0".into(),
        }
    }

    #[test]
    fn payload_serializes_to_expected_shape() {
        let payload = UploadPayload::new("1000", vec!["a:b".into(), "".into()]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "algorithm": "1000", "founds": ["a:b", ""] })
        );
    }

    #[test]
    fn status_200_is_success_and_request_is_well_formed() {
        let (url, rx) = one_shot_server("200 OK");
        let client = ApiClient::new(&settings_for(url)).unwrap();

        let outcome = client.submit(&UploadPayload::new("0", vec!["found1".into()]));
        assert!(outcome.is_success(), "got {}", outcome);

        let req = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(req.head.starts_with("POST /api/v2/submit "));
        let head = req.head.to_ascii_lowercase();
        assert!(head.contains("api-key: test-key"));
        assert!(head.contains("content-type: application/json"));

        let body: UploadPayload = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body, UploadPayload::new("0", vec!["found1".into()]));
    }

    #[test]
    fn other_status_is_server_rejected() {
        let (url, _rx) = one_shot_server("500 Internal Server Error");
        let client = ApiClient::new(&settings_for(url)).unwrap();

        match client.submit(&UploadPayload::new("0", vec![])) {
            UploadOutcome::ServerRejected(500) => {}
            other => panic!("expected rejection, got {}", other),
        }
    }

    #[test]
    fn non_200_success_codes_are_still_rejections() {
        let (url, _rx) = one_shot_server("201 Created");
        let client = ApiClient::new(&settings_for(url)).unwrap();

        assert!(matches!(
            client.submit(&UploadPayload::new("0", vec![])),
            UploadOutcome::ServerRejected(201)
        ));
    }

    #[test]
    fn refused_connection_is_transport_error() {
        // Bind then drop so the port is very likely closed.
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let client = ApiClient::new(&settings_for(format!("http://{}/submit", addr))).unwrap();

        assert!(matches!(
            client.submit(&UploadPayload::new("0", vec!["x".into()])),
            UploadOutcome::TransportError(_)
        ));
    }

    #[test]
    fn api_key_with_newline_is_rejected_up_front() {
        let mut settings = settings_for("http://127.0.0.1:1/".into());
        settings.api_key = "bad\nkey".into();
        assert!(matches!(
            ApiClient::new(&settings),
            Err(RelayError::InvalidApiKey)
        ));
    }
}

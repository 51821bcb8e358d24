#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;
use vercel_runtime::{Body, Request, Response};
use whatsapp_relay::{Credentials, RelayConfig, SendMode};

pub const TOKEN: &str = "test-token";
pub const PHONE_NUMBER_ID: &str = "1055";

/// A request received by the mock provider.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }

    pub fn body_contains(&self, needle: &[u8]) -> bool {
        self.body.windows(needle.len()).any(|w| w == needle)
    }
}

#[derive(Clone)]
struct Reply {
    suffix: &'static str,
    status: u16,
    body: String,
}

/// In-process stand-in for the Graph API that records every request.
pub struct MockProvider {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockProvider {
    /// Start a provider answering paths ending in `suffix` with the given
    /// status and JSON body; everything else gets a 404.
    pub async fn start(replies: &[(&'static str, u16, Value)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock provider");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let replies: Arc<Vec<Reply>> = Arc::new(
            replies
                .iter()
                .map(|(suffix, status, body)| Reply {
                    suffix: *suffix,
                    status: *status,
                    body: body.to_string(),
                })
                .collect(),
        );

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                let replies = Arc::clone(&replies);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        respond(req, Arc::clone(&recorded), Arc::clone(&replies))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_credentials(Credentials::new(TOKEN, PHONE_NUMBER_ID))
            .with_api_base_url(&self.base_url)
    }

    pub fn config_with_mode(&self, mode: SendMode) -> RelayConfig {
        self.config().with_send_mode(mode)
    }

    /// Same endpoint, but without credentials.
    pub fn unconfigured(&self) -> RelayConfig {
        RelayConfig::default().with_api_base_url(&self.base_url)
    }
}

async fn respond(
    req: hyper::Request<Incoming>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    replies: Arc<Vec<Reply>>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();
    let path = parts.uri.path().to_string();

    recorded.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: path.clone(),
        headers: parts.headers,
        body,
    });

    let (status, body) = replies
        .iter()
        .find(|r| path.ends_with(r.suffix))
        .map_or((404, r#"{"error":{"message":"unknown path"}}"#.to_string()), |r| {
            (r.status, r.body.clone())
        });

    let response = hyper::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap();
    Ok(response)
}

pub fn json_request(path: &str, body: &Value) -> Request {
    http::Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn response_json(response: &Response<Body>) -> Value {
    match response.body() {
        Body::Text(text) => serde_json::from_str(text).unwrap(),
        Body::Binary(bytes) => serde_json::from_slice(bytes).unwrap(),
        Body::Empty => Value::Null,
    }
}

/// Build a multipart body from `(name, value)` fields and an optional
/// `(filename, content type, bytes)` file.
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, data)) = file {
        out.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

pub fn multipart_request(boundary: &str, body: Vec<u8>) -> Request {
    http::Request::builder()
        .method("POST")
        .uri("/api/send-message")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::Binary(body))
        .unwrap()
}

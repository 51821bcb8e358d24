//! Local development server: serves every relay route on one port using the
//! same handlers as the serverless functions.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};
use vercel_runtime::Body;

use crate::handler::{Relay, Route};

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Route one hyper request through the relay.
///
/// The hyper body is collected into a Vercel body (`Binary`, or `Empty` when
/// nothing was sent) and the handler's response is converted back.
pub async fn serve<B>(
    req: hyper::Request<B>,
    relay: Arc<Relay>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body,
    B::Error: Display,
{
    let Some(route) = Route::from_path(req.uri().path()) else {
        debug!("No route for {}", req.uri().path());
        return Ok(plain(StatusCode::NOT_FOUND, r#"{"error":"Not found"}"#));
    };

    let (parts, incoming) = req.into_parts();
    let bytes = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return Ok(plain(StatusCode::BAD_REQUEST, r#"{"error":"Unreadable body"}"#));
        }
    };

    match relay
        .handle(route, http::Request::from_parts(parts, to_vercel_body(bytes)))
        .await
    {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Ok(hyper::Response::from_parts(parts, Full::new(from_vercel_body(body))))
        }
        Err(e) => {
            error!("Handler error: {}", e);
            Ok(plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Internal server error"}"#,
            ))
        }
    }
}

/// Accept connections until the listener fails, serving each on its own task.
pub async fn run(listener: TcpListener, relay: Arc<Relay>) {
    let mut incoming = TcpListenerStream::new(listener);
    while let Some(stream) = incoming.next().await {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let relay = Arc::clone(&relay);

        tokio::spawn(async move {
            let service = service_fn(move |req| serve(req, Arc::clone(&relay)));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection closed with error: {}", e);
            }
        });
    }
}

fn to_vercel_body(bytes: Bytes) -> Body {
    if bytes.is_empty() {
        Body::Empty
    } else {
        Body::Binary(bytes.to_vec())
    }
}

fn from_vercel_body(body: Body) -> Bytes {
    match body {
        Body::Empty => Bytes::new(),
        Body::Text(text) => Bytes::from(text),
        Body::Binary(data) => Bytes::from(data),
    }
}

fn plain(status: StatusCode, body: &'static str) -> hyper::Response<Full<Bytes>> {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

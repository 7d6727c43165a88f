use std::convert::Infallible;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Serves `GET /metrics` in prometheus text format.
#[derive(Clone)]
pub struct MetricsServer {
    listen: String,
}

impl MetricsServer {
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.listen).await?;
        tracing::info!("metrics listening on {}", self.listen);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("metrics server shutdown");
                    return Ok(());
                }
                res = listener.accept() => {
                    let (stream, _peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("metrics accept error: {}", e);
                            continue;
                        }
                    };

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let builder = hyper::server::conn::http1::Builder::new();
                        if let Err(e) = builder.serve_connection(io, service_fn(handle)).await {
                            tracing::warn!("metrics conn error: {}", e);
                        }
                    });
                }
            }
        }
    }
}

async fn handle(req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = if req.uri().path() == "/metrics" {
        (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(super::registry::gather_as_text()),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            "text/plain; charset=utf-8",
            Bytes::from_static(b"not found"),
        )
    };

    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    Ok(resp)
}

use crate::{ErrorKind, Exchange, ProtocolAdapter, SendError};
use async_trait::async_trait;
use barrage_target::Target;
use http::Method;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request};
use hyper_tls::HttpsConnector;
use log::trace;
use std::time::Duration;
use tokio::time::timeout;

/// Request/response over HTTP(S). The status code isn't inspected, any completed exchange is
/// a success.
pub struct HttpAdapter {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    send_timeout: Duration,
}

impl HttpAdapter {
    pub fn new(send_timeout: Duration) -> Self {
        let https = HttpsConnector::new();
        let client = Client::builder().build::<_, Body>(https);
        HttpAdapter {
            client,
            send_timeout,
        }
    }
}

fn build_request(target: &Target) -> Result<Request<Body>, SendError> {
    let method = Method::from_bytes(target.action().as_bytes())
        .map_err(|e| SendError::new(ErrorKind::Other, e.to_string()))?;
    let mut request = Request::builder()
        .method(method)
        .uri(target.url().as_str())
        .body(Body::from(target.payload().clone()))
        .map_err(|e| SendError::new(ErrorKind::Other, e.to_string()))?;
    *request.headers_mut() = target.headers().clone();
    Ok(request)
}

fn classify(err: &hyper::Error) -> SendError {
    let kind = if err.is_connect() {
        ErrorKind::Connect
    } else if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_canceled() {
        ErrorKind::Canceled
    } else if err.is_parse() || err.is_incomplete_message() || err.is_user() {
        ErrorKind::Protocol
    } else {
        ErrorKind::Io
    };
    SendError::from_chain(kind, err)
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    async fn transport(&self, target: &Target) -> Result<Exchange, SendError> {
        let request = build_request(target)?;
        let bytes_out = target.payload().len() as u64;
        trace!("[HttpAdapter] - sending {}", target);
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| classify(&e))?;
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| classify(&e))?;
            Ok(Exchange {
                bytes_out,
                bytes_in: body.len() as u64,
            })
        };
        match timeout(self.send_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SendError::timeout(self.send_timeout)),
        }
    }
}

//! HTTP transport for page requests.
//!
//! The fetcher only needs "GET this URL with these parameters and give me
//! the body of a 2xx response". Keeping that behind [`PageTransport`] lets
//! the retry and pagination loop run against an in-memory upstream in tests.

use crate::error::AttemptError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A single GET attempt against the upstream.
pub trait PageTransport {
    /// Perform one GET and return the body of a 2xx response.
    ///
    /// Non-2xx statuses and transport failures are both reported as
    /// [`AttemptError`]; the caller decides whether to retry.
    fn get(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> impl Future<Output = Result<String, AttemptError>> + Send;
}

/// `reqwest`-backed transport sending a fixed client-identifying header.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with a per-attempt timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = client_builder(user_agent, timeout).build()?;
        Ok(Self { client, timeout })
    }
}

fn client_builder(user_agent: &str, timeout: Duration) -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .default_headers(headers)
        .timeout(timeout)
}

impl PageTransport for HttpTransport {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<String, AttemptError> {
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Network(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    AttemptError::Network(format!("cannot connect to {}", url))
                } else {
                    AttemptError::Network(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::status(status.as_u16(), &body));
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Network(format!("failed to read response body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `response` and hand back the raw request head.
    async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/v2/deputados", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_lowercase()
        });

        (url, handle)
    }

    /// Same client as [`HttpTransport::new`], minus any proxy from the environment.
    fn local_transport() -> HttpTransport {
        let timeout = Duration::from_secs(5);
        let client = client_builder("camara-digest-test/0.1", timeout)
            .no_proxy()
            .build()
            .unwrap();
        HttpTransport { client, timeout }
    }

    fn params() -> Vec<(String, String)> {
        vec![
            ("pagina".to_string(), "2".to_string()),
            ("itens".to_string(), "5".to_string()),
        ]
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new("camara-digest-test/0.1", Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_sends_identifying_headers_and_query() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 12\r\nConnection: close\r\n\r\n{\"dados\":[]}",
        )
        .await;
        let transport = local_transport();

        let body = transport.get(&url, &params()).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(body, r#"{"dados":[]}"#);
        assert!(request.starts_with("get /api/v2/deputados?pagina=2&itens=5 http/1.1"));
        assert!(request.contains("user-agent: camara-digest-test/0.1"));
        assert!(request.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (url, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;
        let transport = local_transport();

        let err = transport.get(&url, &params()).await.unwrap_err();
        server.await.unwrap();

        assert_eq!(
            err,
            AttemptError::Status {
                status: 503,
                body: "busy".to_string()
            }
        );
    }
}

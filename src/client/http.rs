//! reqwest plumbing shared by the provider adapters

use crate::core::error::{ApiError, PublishError};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("release-publisher/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Error body returned by both Gitea and GitHub
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub(crate) fn build_client(skip_tls_verify: bool) -> Result<Client, PublishError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()
        .map_err(|e| PublishError::config("http client", e.to_string()))
}

/// Append escaped path segments to a base URL
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::transport(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Split a repository file path into URL segments
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Send a request, turning a non-2xx answer into an `ApiError` with its status
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    Err(ApiError::status(status.as_u16(), message))
}

pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = send(request).await?;
    Ok(response.json::<T>().await?)
}

/// One-shot HTTP server answering canned responses in order
#[cfg(test)]
pub(crate) mod stub {
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Recorded {
        /// Method and path with query, e.g. `GET /api/v1/repos/acme/tool`
        pub line: String,
        pub headers: String,
        pub body: Vec<u8>,
    }

    pub(crate) struct StubServer {
        pub url: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl StubServer {
        /// Serve `responses` as `(status, body)`, one connection each
        pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));

            let recorded = Arc::clone(&requests);
            tokio::spawn(async move {
                for (status, body) in responses {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    answer(stream, status, body, &recorded).await.ok();
                }
            });

            Self { url, requests }
        }

        pub fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }

        pub fn lines(&self) -> Vec<String> {
            self.requests().into_iter().map(|r| r.line).collect()
        }
    }

    async fn answer(
        mut stream: TcpStream,
        status: u16,
        body: &str,
        recorded: &Mutex<Vec<Recorded>>,
    ) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let (request_line, headers) = head.split_once("\r\n").unwrap_or((head.as_str(), ""));
        let mut parts = request_line.split_whitespace();
        let line = format!("{} {}", parts.next().unwrap_or_default(), parts.next().unwrap_or_default());
        recorded.lock().unwrap().push(Recorded {
            line,
            headers: headers.to_ascii_lowercase(),
            body: buf[header_end..].to_vec(),
        });

        let content_type = if body.starts_with('{') || body.starts_with('[') {
            "application/json"
        } else {
            "text/plain"
        };
        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }
}

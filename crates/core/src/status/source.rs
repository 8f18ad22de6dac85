use std::{future::Future, time::Duration};

use reqwest::{header::CONTENT_TYPE, Client};
use tracing::debug;

use crate::{config::AppConfig, error::StatusError};

/// Anything that can produce the raw status body for one poll.
pub trait StatusSource: Send + Sync {
    /// Fetch the body text. One call is one outbound request.
    fn fetch(&self) -> impl Future<Output = Result<String, StatusError>> + Send;
}

/// Fetches the server listing over HTTP.
pub struct HttpStatusSource {
    client: Client,
    endpoint: String,
    server_id: String,
    api_key: String,
}

impl HttpStatusSource {
    /// Build a source for `endpoint` with a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        server_id: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StatusError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("statusbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| StatusError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            server_id: server_id.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a source from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StatusError> {
        Self::new(
            config.status.endpoint.clone(),
            config.credentials.server_id.clone(),
            config.credentials.api_key.clone(),
            config.request_timeout(),
        )
    }
}

impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<String, StatusError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("id", self.server_id.as_str()),
                ("key", self.api_key.as_str()),
                ("players", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::HttpStatus(status.as_u16()));
        }

        // The endpoint is known to mislabel JSON, so the body is always read as text.
        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.contains("application/json") {
                debug!("status endpoint answered with content type {content_type:?}");
            }
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// One-shot HTTP server. Resolves to the request line it received.
    async fn serve_once(response: Option<String>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            match response {
                Some(response) => {
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => tokio::time::sleep(Duration::from_secs(10)).await,
            }
            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });
        (format!("http://{addr}/serverinfo.php"), task)
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn source(endpoint: String, timeout: Duration) -> HttpStatusSource {
        HttpStatusSource::new(endpoint, "777", "secret-key", timeout).unwrap()
    }

    #[tokio::test]
    async fn reads_json_served_as_html() {
        let body = r#"{"Success":true,"Servers":[{"Players":"5/20"}]}"#;
        let (endpoint, server) =
            serve_once(Some(http_response("200 OK", "text/html; charset=UTF-8", body))).await;

        let fetched = source(endpoint, Duration::from_secs(5)).fetch().await.unwrap();
        assert_eq!(fetched, body);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn sends_id_key_and_players_query() {
        let (endpoint, server) =
            serve_once(Some(http_response("200 OK", "application/json", "{}"))).await;

        source(endpoint, Duration::from_secs(5)).fetch().await.unwrap();
        let request_line = server.await.unwrap();
        assert_eq!(
            request_line,
            "GET /serverinfo.php?id=777&key=secret-key&players=true HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let (endpoint, server) = serve_once(Some(http_response(
            "500 Internal Server Error",
            "text/plain",
            "oops",
        )))
        .await;

        let err = source(endpoint, Duration::from_secs(5)).fetch().await.unwrap_err();
        assert!(matches!(err, StatusError::HttpStatus(500)), "{err:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_times_out_as_transport_error() {
        let (endpoint, server) = serve_once(None).await;

        let src = source(endpoint, Duration::from_millis(200));
        let fetch = src.fetch();
        let err = tokio::time::timeout(Duration::from_secs(5), fetch)
            .await
            .expect("request timeout did not fire")
            .unwrap_err();
        assert!(matches!(err, StatusError::Transport(_)), "{err:?}");
        server.abort();
    }
}

use crate::{
    catalog::{CatalogRoot, PresetId, RemotePreset},
    config::AppConfig,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("presetsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("at least one preset id must be provided")]
    EmptyQuery,
    #[error("server returned HTTP {code} for {url}")]
    Status { code: u16, url: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Caller bugs rejected before any I/O; never worth retrying.
    pub fn is_usage(&self) -> bool {
        matches!(self, FetchError::EmptyQuery)
    }
}

/// Remote read side of the synchronizer. Implementations must not touch local state.
pub trait CatalogSource: Send + Sync {
    fn fetch_catalog(&self) -> Result<CatalogRoot, FetchError>;
    fn fetch_updates(&self, ids: &[PresetId]) -> Result<Vec<RemotePreset>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    agent: ureq::Agent,
    base_url: String,
    escaped_plugin: String,
}

impl CatalogClient {
    pub fn new(config: &AppConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .timeout_write(Duration::from_secs(config.read_timeout_secs))
            .build();
        let mut base_url = config.server_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            agent,
            base_url,
            escaped_plugin: urlencoding::encode(&config.plugin_name).into_owned(),
        }
    }

    pub fn catalog_url(&self) -> String {
        format!("{}{}", self.base_url, self.escaped_plugin)
    }

    pub fn updates_url(&self, ids: &[PresetId]) -> String {
        let query = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/updates?query={query}", self.catalog_url())
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = match self.agent.get(url).set("User-Agent", USER_AGENT).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError::Status {
                    code,
                    url: url.to_string(),
                })
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(FetchError::Transport(err.to_string()))
            }
        };
        let body = response
            .into_string()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| FetchError::Decode(err.to_string()))
    }
}

impl CatalogSource for CatalogClient {
    fn fetch_catalog(&self) -> Result<CatalogRoot, FetchError> {
        self.get_json(&self.catalog_url())
    }

    fn fetch_updates(&self, ids: &[PresetId]) -> Result<Vec<RemotePreset>, FetchError> {
        if ids.is_empty() {
            return Err(FetchError::EmptyQuery);
        }
        let updates: Option<Vec<RemotePreset>> = self.get_json(&self.updates_url(ids))?;
        Ok(updates.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    fn config_for(server_url: &str) -> AppConfig {
        AppConfig {
            server_url: server_url.to_string(),
            ..AppConfig::default()
        }
    }

    // Serves exactly one response and reports the request line it saw.
    fn serve_once(status: &str, body: &str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let status = status.to_string();
        let body = body.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            let _ = tx.send(request_line.trim().to_string());
        });
        (format!("http://{addr}/api/v1/plugins/"), rx)
    }

    #[test]
    fn escapes_plugin_name_in_urls() {
        let client = CatalogClient::new(&config_for("http://localhost:3000/api/v1/plugins"));
        assert_eq!(
            client.catalog_url(),
            "http://localhost:3000/api/v1/plugins/Codex%20Example"
        );
        assert_eq!(
            client.updates_url(&[4, 9]),
            "http://localhost:3000/api/v1/plugins/Codex%20Example/updates?query=4,9"
        );
    }

    #[test]
    fn empty_update_query_fails_before_network() {
        // Nothing listens on port 9; reaching the network would yield Transport.
        let client = CatalogClient::new(&config_for("http://127.0.0.1:9/"));
        let err = client.fetch_updates(&[]).unwrap_err();
        assert_eq!(err, FetchError::EmptyQuery);
        assert!(err.is_usage());
    }

    #[test]
    fn fetches_catalog() {
        let body = r#"{"id":1,"name":"Codex Example","description":"d","categories":[{"name":"A","presets":[{"id":4,"name":"p","version":2,"updatedAt":"2024-05-01T12:00:00Z","data":"{}"}]}]}"#;
        let (url, seen) = serve_once("200 OK", body);
        let client = CatalogClient::new(&config_for(&url));

        let catalog = client.fetch_catalog().unwrap();
        assert_eq!(catalog.preset_count(), 1);
        assert_eq!(
            seen.recv().unwrap(),
            "GET /api/v1/plugins/Codex%20Example HTTP/1.1"
        );
    }

    #[test]
    fn fetches_updates_with_comma_query() {
        let body = r#"[{"id":9,"name":"p","version":5,"updatedAt":"2024-05-01T12:00:00Z","data":"{}"}]"#;
        let (url, seen) = serve_once("200 OK", body);
        let client = CatalogClient::new(&config_for(&url));

        let updates = client.fetch_updates(&[9, 4]).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, 9);
        assert_eq!(
            seen.recv().unwrap(),
            "GET /api/v1/plugins/Codex%20Example/updates?query=9,4 HTTP/1.1"
        );
    }

    #[test]
    fn null_update_body_is_empty() {
        let (url, _seen) = serve_once("200 OK", "null");
        let client = CatalogClient::new(&config_for(&url));
        assert!(client.fetch_updates(&[1]).unwrap().is_empty());
    }

    #[test]
    fn non_success_status_is_fetch_error() {
        let (url, _seen) = serve_once("404 Not Found", "{}");
        let client = CatalogClient::new(&config_for(&url));
        match client.fetch_catalog() {
            Err(FetchError::Status { code, .. }) => assert_eq!(code, 404),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let (url, _seen) = serve_once("200 OK", r#"{"id":"nope"}"#);
        let client = CatalogClient::new(&config_for(&url));
        assert!(matches!(
            client.fetch_catalog(),
            Err(FetchError::Decode(_))
        ));
    }
}

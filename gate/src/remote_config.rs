use crate::errors::GateError;
use crate::events::with_trailing_slash;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Where the routing record lives.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// `Ok(None)` means the record is absent or not decodable.
    async fn fetch(&self) -> Result<Option<Value>, TransportError>;
}

/// Reads a record from a Firebase Realtime Database path through its REST
/// interface (`GET {database_url}/{path}.json`).
pub struct RealtimeDbConfigSource {
    transport: Arc<dyn Transport>,
    record_url: Url,
}

impl RealtimeDbConfigSource {
    pub fn new(
        transport: Arc<dyn Transport>,
        database_url: &Url,
        path: &str,
    ) -> Result<Self, url::ParseError> {
        let record_url =
            with_trailing_slash(database_url).join(&format!("{}.json", path.trim_matches('/')))?;
        Ok(RealtimeDbConfigSource {
            transport,
            record_url,
        })
    }
}

#[async_trait]
impl ConfigSource for RealtimeDbConfigSource {
    async fn fetch(&self) -> Result<Option<Value>, TransportError> {
        let response = self.transport.get(self.record_url.clone()).await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, url = %self.record_url, "Config read rejected");
            return Err(TransportError::Status(response.status));
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(error = %err, "Config record is not valid JSON");
                Ok(None)
            }
        }
    }
}

/// The two supported record shapes, in priority order.
#[derive(Debug, PartialEq, Eq)]
pub enum RemoteConfigRecord {
    /// `{"stray": host, "swap": path}`
    HostPath { host: String, path: String },
    /// `{"url": absolute_url}`
    Url(String),
}

impl RemoteConfigRecord {
    pub fn from_map(record: &Map<String, Value>) -> Option<Self> {
        let non_empty = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        if let (Some(host), Some(path)) = (non_empty("stray"), non_empty("swap")) {
            return Some(RemoteConfigRecord::HostPath {
                host: host.to_string(),
                path: path.to_string(),
            });
        }

        record
            .get("url")
            .and_then(Value::as_str)
            .map(|url| RemoteConfigRecord::Url(url.to_string()))
    }

    /// Derives the base endpoint. https is preferred, http is the fallback for
    /// host/path records.
    pub fn endpoint(&self) -> Result<Url, GateError> {
        match self {
            RemoteConfigRecord::HostPath { host, path } => {
                let path = if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("/{path}")
                };
                Url::parse(&format!("https://{host}{path}"))
                    .or_else(|_| Url::parse(&format!("http://{host}{path}")))
                    .map_err(|_| GateError::InvalidConfig)
            }
            RemoteConfigRecord::Url(url) => Url::parse(url).map_err(|_| GateError::InvalidConfig),
        }
    }
}

/// Derives the base endpoint from a raw config record.
pub fn derive_endpoint(record: &Value) -> Result<Url, GateError> {
    let map = record.as_object().ok_or(GateError::NoData)?;
    RemoteConfigRecord::from_map(map)
        .ok_or(GateError::InvalidConfig)?
        .endpoint()
}

pub struct ConfigReader {
    source: Arc<dyn ConfigSource>,
}

impl ConfigReader {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        ConfigReader { source }
    }

    pub async fn fetch_config(&self) -> Result<Url, GateError> {
        let record = self.source.fetch().await.map_err(|err| {
            tracing::error!(error = %err, "Config fetch failed");
            GateError::from(err)
        })?;

        let record = match record {
            Some(record) if record.is_object() => record,
            _ => {
                tracing::error!("No config data");
                return Err(GateError::NoData);
            }
        };

        let endpoint = derive_endpoint(&record).inspect_err(|_| {
            tracing::error!(%record, "Invalid config, no valid base endpoint");
        })?;
        tracing::info!(endpoint = %endpoint, "Base endpoint derived");
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{StaticConfigSource, TestServer};
    use crate::transport::HttpTransport;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_host_path_record() {
        let endpoint = derive_endpoint(&json!({"stray": "api.example.com", "swap": "go"}));
        assert_eq!(endpoint.unwrap().as_str(), "https://api.example.com/go");

        // Leading slash is kept as is
        let endpoint = derive_endpoint(&json!({"stray": "api.example.com", "swap": "/go/on"}));
        assert_eq!(endpoint.unwrap().as_str(), "https://api.example.com/go/on");
    }

    #[test]
    fn test_empty_path_is_invalid() {
        assert_eq!(
            derive_endpoint(&json!({"stray": "a", "swap": ""})),
            Err(GateError::InvalidConfig)
        );
    }

    #[test]
    fn test_url_record() {
        let endpoint = derive_endpoint(&json!({"url": "https://x.test/y"}));
        assert_eq!(endpoint.unwrap().as_str(), "https://x.test/y");

        // Relative URLs are rejected
        assert_eq!(
            derive_endpoint(&json!({"url": "/relative"})),
            Err(GateError::InvalidConfig)
        );
    }

    #[test]
    fn test_host_path_takes_priority() {
        let endpoint = derive_endpoint(&json!({
            "url": "https://x.test/y",
            "stray": "api.example.com",
            "swap": "go",
        }));
        assert_eq!(endpoint.unwrap().as_str(), "https://api.example.com/go");
    }

    #[test]
    fn test_unusable_host_path() {
        // Both schemes fail on a host with a space; no fall through to "url"
        assert_eq!(
            derive_endpoint(&json!({"stray": "bad host", "swap": "go", "url": "https://x.test"})),
            Err(GateError::InvalidConfig)
        );
    }

    #[test]
    fn test_non_string_fields() {
        assert_eq!(
            derive_endpoint(&json!({"stray": 1, "swap": true})),
            Err(GateError::InvalidConfig)
        );
        assert_eq!(derive_endpoint(&json!(["a"])), Err(GateError::NoData));
    }

    #[tokio::test]
    async fn test_reader_errors() {
        let reader = ConfigReader::new(Arc::new(StaticConfigSource::absent()));
        assert_eq!(reader.fetch_config().await, Err(GateError::NoData));

        let reader = ConfigReader::new(Arc::new(StaticConfigSource::record(json!("just a string"))));
        assert_eq!(reader.fetch_config().await, Err(GateError::NoData));

        let reader = ConfigReader::new(Arc::new(StaticConfigSource::failing()));
        assert!(matches!(
            reader.fetch_config().await,
            Err(GateError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_realtime_db_source() {
        let server = TestServer::spawn(|req| match req.uri().path() {
            "/config.json" => TestServer::json(200, r#"{"stray":"api.example.com","swap":"go"}"#),
            "/empty.json" => TestServer::json(200, "null"),
            "/denied.json" => TestServer::json(401, r#"{"error":"Permission denied"}"#),
            _ => TestServer::text(404, ""),
        })
        .await;
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());

        let source = RealtimeDbConfigSource::new(transport.clone(), &server.url("/"), "config").unwrap();
        let reader = ConfigReader::new(Arc::new(source));
        assert_eq!(
            reader.fetch_config().await.unwrap().as_str(),
            "https://api.example.com/go"
        );

        let source = RealtimeDbConfigSource::new(transport.clone(), &server.url("/"), "/empty").unwrap();
        let reader = ConfigReader::new(Arc::new(source));
        assert_eq!(reader.fetch_config().await, Err(GateError::NoData));

        let source = RealtimeDbConfigSource::new(transport, &server.url("/"), "denied").unwrap();
        let reader = ConfigReader::new(Arc::new(source));
        assert!(matches!(
            reader.fetch_config().await,
            Err(GateError::Network(_))
        ));
    }
}

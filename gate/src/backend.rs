use crate::errors::GateError;
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Sends the encoded payload to the backend endpoint and turns its reply into
/// a destination URL.
pub struct BackendResolver {
    transport: Arc<dyn Transport>,
}

impl BackendResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        BackendResolver { transport }
    }

    /// `endpoint` with the payload appended as the `data` query parameter.
    pub fn request_url(endpoint: &Url, payload: &str) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("data", payload);
        url
    }

    pub async fn resolve(&self, endpoint: &Url, payload: &str) -> Result<Url, GateError> {
        let reply = self.fetch_reply(endpoint, payload).await?;
        decode_reply(&reply)
    }

    /// Issues the request and decodes the body as a JSON object.
    pub async fn fetch_reply(
        &self,
        endpoint: &Url,
        payload: &str,
    ) -> Result<Map<String, Value>, GateError> {
        let url = Self::request_url(endpoint, payload);
        tracing::info!(url = %url, "Requesting backend");

        let response = self.transport.get(url).await.map_err(|err| {
            tracing::error!(error = %err, "Backend request failed");
            GateError::from(err)
        })?;

        if !response.is_success() {
            // The reply body decides the outcome, not the status
            tracing::warn!(status = response.status, "Backend replied with non-success status");
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                tracing::error!("Backend reply is not a JSON object");
                Err(GateError::InvalidConfig)
            }
        }
    }
}

/// Rebuilds the destination from a reply that splits it over two string
/// fragments, e.g. `{"more": "apptest4", "sea": ".click"}`.
///
/// Key names are ignored. The first string starting with `.` is the suffix
/// and the first string without it is the prefix. When either role has no
/// candidate the first two strings are joined as they appear in the reply.
pub fn decode_reply(reply: &Map<String, Value>) -> Result<Url, GateError> {
    let strings: Vec<&str> = reply.values().filter_map(Value::as_str).collect();
    if strings.len() < 2 {
        tracing::error!(parts = strings.len(), "Backend reply has fewer than two string parts");
        return Err(GateError::InvalidConfig);
    }

    let suffix = strings.iter().find(|s| s.starts_with('.'));
    let prefix = strings.iter().find(|s| !s.starts_with('.'));
    let combined = match (prefix, suffix) {
        (Some(prefix), Some(suffix)) => format!("{prefix}{suffix}"),
        _ => strings[..2].concat(),
    };

    let candidate = if combined.starts_with("http") {
        combined
    } else {
        format!("https://{combined}")
    };

    Url::parse(&candidate).map_err(|err| {
        tracing::error!(value = %candidate, error = %err, "Final URL invalid");
        GateError::InvalidConfig
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ScriptedTransport, TestServer};
    use crate::transport::HttpTransport;
    use serde_json::json;
    use std::time::Duration;

    fn decode(value: Value) -> Result<Url, GateError> {
        decode_reply(value.as_object().unwrap())
    }

    #[test]
    fn test_prefix_suffix() {
        let url = decode(json!({"more": "apptest4", "sea": ".click"})).unwrap();
        assert_eq!(url.host_str(), Some("apptest4.click"));
        assert_eq!(url.scheme(), "https");

        // Order in the reply does not matter when both roles are present
        let url = decode(json!({"sea": ".click", "more": "apptest4"})).unwrap();
        assert_eq!(url.host_str(), Some("apptest4.click"));
    }

    #[test]
    fn test_ambiguous_falls_back_to_first_two() {
        let url = decode(json!({"a": "example", "b": "com"})).unwrap();
        assert_eq!(url.host_str(), Some("examplecom"));

        // Only the first two strings take part in the fallback
        let url = decode(json!({"a": "example", "b": "com", "c": "ignored"})).unwrap();
        assert_eq!(url.host_str(), Some("examplecom"));
    }

    #[test]
    fn test_non_string_values_are_skipped() {
        let url = decode(json!({"n": 4, "more": "apptest4", "flag": true, "sea": ".click"})).unwrap();
        assert_eq!(url.as_str(), "https://apptest4.click/");
    }

    #[test]
    fn test_first_candidates_win() {
        let url = decode(json!({"a": "first", "b": ".one", "c": "second", "d": ".two"})).unwrap();
        assert_eq!(url.host_str(), Some("first.one"));
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let url = decode(json!({"a": "http://apptest4", "b": ".click/path"})).unwrap();
        assert_eq!(url.as_str(), "http://apptest4.click/path");
    }

    #[test]
    fn test_too_few_parts() {
        assert_eq!(decode(json!({"only": "apptest4"})), Err(GateError::InvalidConfig));
        assert_eq!(decode(json!({"a": "x", "b": 1})), Err(GateError::InvalidConfig));
        assert_eq!(decode(json!({})), Err(GateError::InvalidConfig));
    }

    #[test]
    fn test_unparsable_result() {
        assert_eq!(
            decode(json!({"a": "bad host", "b": ".click"})),
            Err(GateError::InvalidConfig)
        );
    }

    #[test]
    fn test_request_url() {
        let endpoint = Url::parse("https://api.example.com/go?x=1").unwrap();
        let url = BackendResolver::request_url(&endpoint, "YT1i+c/9=");
        assert_eq!(url.as_str(), "https://api.example.com/go?x=1&data=YT1i%2Bc%2F9%3D");
        let data = url.query_pairs().find(|(k, _)| k == "data").unwrap().1;
        assert_eq!(data, "YT1i+c/9=");
    }

    #[tokio::test]
    async fn test_resolve_over_http() {
        let server = TestServer::spawn(|req| {
            let has_payload = req
                .uri()
                .query()
                .is_some_and(|q| q.starts_with("data="));
            match (req.uri().path(), has_payload) {
                ("/go", true) => TestServer::json(200, r#"{"more":"apptest4","sea":".click"}"#),
                ("/html", _) => TestServer::text(200, "<html></html>"),
                _ => TestServer::text(400, "bad request"),
            }
        })
        .await;
        let resolver =
            BackendResolver::new(Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap()));

        let url = resolver.resolve(&server.url("/go"), "cGF5bG9hZA==").await.unwrap();
        assert_eq!(url.as_str(), "https://apptest4.click/");

        let result = resolver.resolve(&server.url("/html"), "cGF5bG9hZA==").await;
        assert_eq!(result, Err(GateError::InvalidConfig));
    }

    #[tokio::test]
    async fn test_resolve_transport_failure() {
        let resolver = BackendResolver::new(Arc::new(ScriptedTransport::failing()));
        let endpoint = Url::parse("https://api.example.com/go").unwrap();
        assert!(matches!(
            resolver.resolve(&endpoint, "x").await,
            Err(GateError::Network(_))
        ));
    }
}

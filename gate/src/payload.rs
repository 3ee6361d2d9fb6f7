use crate::params::CollectedParams;
use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Renders the parameters as a fixed-order `key=value&...` string and base64
/// encodes its UTF-8 bytes.
///
/// Values are written verbatim. The output is deterministic for a given input.
pub fn encode(params: &CollectedParams) -> String {
    STANDARD.encode(raw_query(params).as_bytes())
}

fn raw_query(params: &CollectedParams) -> String {
    let fields = [
        ("appsflyer_id", params.attribution_id.as_str()),
        ("app_instance_id", params.install_instance_id.as_str()),
        ("uid", params.session_id.as_str()),
        ("osVersion", params.os_version.as_str()),
        ("devModel", params.device_model.as_str()),
        ("bundle", params.bundle_id.as_str()),
        ("fcm_token", params.push_token.as_str()),
        ("att_token", params.attribution_token.as_deref().unwrap_or_default()),
    ];

    let raw = fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    tracing::debug!(payload = %raw, "Payload before base64");
    raw
}

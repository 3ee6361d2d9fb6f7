//! Secondary resolution path: follow a URL through its HTTP redirects and
//! report where it lands.

use parking_lot::Mutex;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MAX_REDIRECTS: usize = 10;
const LANDING_TIMEOUT: Duration = Duration::from_secs(5);

/// GETs `url`, recording every redirect hop while still following it.
///
/// Returns the last URL in the redirect chain, the request URL when nothing
/// redirected (also when the request itself failed), or an empty string when
/// `timeout` elapsed first.
pub async fn resolve_redirects(url: &Url, timeout: Duration) -> String {
    tracing::info!(url = %url, "Resolving redirect chain");

    let chain = Arc::new(Mutex::new(Vec::<Url>::new()));
    let recorder = chain.clone();
    let policy = Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            tracing::warn!(to = %attempt.url(), "Redirect limit reached");
            return attempt.stop();
        }
        // Only hops that are actually requested count as part of the chain
        recorder.lock().push(attempt.url().clone());
        tracing::debug!(to = %attempt.url(), "Following redirect");
        attempt.follow()
    });

    // No client timeout: an elapsed deadline must yield "", not the request URL
    let client = match reqwest::Client::builder().redirect(policy).build() {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "Could not build redirect client");
            return String::new();
        }
    };

    match tokio::time::timeout(timeout, client.get(url.clone()).send()).await {
        Err(_) => {
            tracing::warn!(url = %url, "Redirect resolution timed out");
            String::new()
        }
        Ok(Err(err)) if err.is_timeout() => {
            tracing::warn!(url = %url, error = %err, "Redirect resolution timed out");
            String::new()
        }
        Ok(result) => {
            if let Err(err) = &result {
                tracing::warn!(error = %err, "Redirect request completed with an error");
            }
            let final_url = chain
                .lock()
                .last()
                .cloned()
                .unwrap_or_else(|| url.clone());
            tracing::info!(final_url = %final_url, "Redirect chain resolved");
            final_url.to_string()
        }
    }
}

/// Resolves where `url` finally lands: follows redirects, then checks whether
/// the landing page is a JSON object carrying the destination split across
/// `bat` and `man`.
pub async fn resolve_landing(url: &Url, redirect_timeout: Duration) -> Url {
    let resolved = resolve_redirects(url, redirect_timeout).await;
    let chosen = if resolved.is_empty() {
        url.clone()
    } else {
        Url::parse(&resolved).unwrap_or_else(|_| url.clone())
    };

    match fetch_landing_json(&chosen).await {
        Some(assembled) => {
            tracing::info!(url = %assembled, "Assembled destination from landing JSON");
            assembled
        }
        None => chosen,
    }
}

async fn fetch_landing_json(url: &Url) -> Option<Url> {
    let client = reqwest::Client::builder()
        .timeout(LANDING_TIMEOUT)
        .build()
        .ok()?;
    let body = client.get(url.clone()).send().await.ok()?.bytes().await.ok()?;
    let json: Value = serde_json::from_slice(&body).ok()?;

    let bat = json.get("bat")?.as_str()?;
    let man = json.get("man")?.as_str()?;
    Url::parse(&format!("https://{bat}{man}")).ok()
}

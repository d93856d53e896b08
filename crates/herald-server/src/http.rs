//! Shared outbound HTTP client.

use std::time::Duration;

/// Build the `reqwest` client shared by upstream clients and publishers.
///
/// Installs `ring` as the rustls crypto provider first; the workspace builds
/// reqwest with `rustls-no-provider`.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    // No-op if a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Encode key/value pairs as an `application/x-www-form-urlencoded` body.
pub fn form_body(pairs: &[(&str, &str)]) -> String {
    reqwest::Url::parse_with_params("http://form.invalid/", pairs)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .unwrap_or_default()
}

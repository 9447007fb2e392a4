use std::time::Duration;

use futures_util::StreamExt;

const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

pub(crate) fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if base.ends_with(&format!("/{endpoint}")) {
        base.to_string()
    } else {
        format!("{base}/{endpoint}")
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Error bodies end up in result messages and logs, so at most `MAX_ERROR_BODY_BYTES` are
/// read off the wire.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let (bytes, truncated) = body_prefix(response, MAX_ERROR_BODY_BYTES).await;
    let mut body = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        body.push_str("...(truncated)");
    }
    body
}

async fn body_prefix(response: reqwest::Response, max_bytes: usize) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else {
            break;
        };
        let remaining = max_bytes.saturating_sub(out.len());
        if chunk.len() > remaining {
            out.extend_from_slice(&chunk[..remaining]);
            return (out, true);
        }
        out.extend_from_slice(&chunk);
    }
    (out, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_stops_reading_at_the_cap() {
        if crate::utils::test_support::should_skip_httpmock() {
            return;
        }
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/big");
                then.status(500).body("x".repeat(MAX_ERROR_BODY_BYTES * 4));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/small");
                then.status(400).body("bad size");
            })
            .await;

        let http = reqwest::Client::new();
        let response = http.get(server.url("/big")).send().await.unwrap();
        let body = error_body(response).await;
        assert!(body.ends_with("...(truncated)"));
        assert_eq!(body.len(), MAX_ERROR_BODY_BYTES + "...(truncated)".len());

        let response = http.get(server.url("/small")).send().await.unwrap();
        assert_eq!(error_body(response).await, "bad size");
    }

    #[test]
    fn join_endpoint_handles_slashes_and_duplicates() {
        assert_eq!(
            join_endpoint("https://api.x.ai/v1/", "/images/generations"),
            "https://api.x.ai/v1/images/generations"
        );
        assert_eq!(
            join_endpoint("https://proxy.local/v1/images/generations", "images/generations"),
            "https://proxy.local/v1/images/generations"
        );
    }
}

//! # Fetch Shim (§4.2.2)
//!
//! Outbound HTTP calls are matched against `network.fetch` glob patterns on
//! the full URL. Grounded on the teacher's `reqwest`-based provider clients
//! (`providers::*`), generalized from "call a named LLM provider" to "call
//! whatever URL the grant allows."

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::RuntimeError;

use super::CapabilityContext;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn fetch(
    ctx: &CapabilityContext,
    url: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Option<String>,
) -> Result<FetchResponse, RuntimeError> {
    if !ctx.matcher.can_fetch(url) {
        return Err(ctx.permission_denied(format!("add \"{url}\" to network.fetch allow")));
    }

    let client = reqwest::Client::new();
    let method = method
        .parse::<reqwest::Method>()
        .map_err(|_| RuntimeError::ValidationError {
            message: format!("invalid HTTP method: {method}"),
        })?;
    let mut request = client.request(method, url).timeout(DEFAULT_FETCH_TIMEOUT);
    for (key, value) in &headers {
        request = request.header(key, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let response = request.send().await.map_err(|e| RuntimeError::UnknownError {
        message: format!("fetch {url}: {e}"),
    })?;
    let status = response.status().as_u16();
    let mut out_headers = HashMap::new();
    for (name, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            out_headers.insert(name.to_string(), v.to_string());
        }
    }
    let body = response.text().await.map_err(|e| RuntimeError::UnknownError {
        message: format!("fetch {url} body: {e}"),
    })?;

    Ok(FetchResponse {
        status,
        headers: out_headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{NetworkSpec, PermissionMatcher, PermissionSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx_with_fetch(allow: &[&str]) -> CapabilityContext {
        let spec = PermissionSpec {
            network: NetworkSpec {
                fetch: allow.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        };
        CapabilityContext::new(
            Descriptor {
                host_type: HostType::Cli,
                plugin_id: "demo".to_string(),
                plugin_version: "1.0.0".to_string(),
                request_id: "r1".to_string(),
                parent_request_id: None,
                tenant_id: None,
                invocation_depth: 0,
                cwd: "/tmp".to_string(),
                outdir: None,
                permissions: spec.clone(),
                host_context: json!({}),
            },
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        )
    }

    #[tokio::test]
    async fn fetch_denied_outside_grant() {
        let ctx = ctx_with_fetch(&["https://api.example.com/**"]);
        let result = fetch(&ctx, "https://evil.example.net/x", "GET", HashMap::new(), None).await;
        assert!(result.is_err());
    }
}

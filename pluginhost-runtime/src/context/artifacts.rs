//! # Artifacts Shim (§4.8)
//!
//! Artifacts are rooted at the invocation's `outdir`, separate from the
//! general `fs` grant so a plugin can always write its own declared outputs
//! without needing a broad `fs.write` grant. Reading another plugin's
//! artifacts requires an explicit `artifacts.read` entry naming that plugin
//! and an allowed path/type.

use std::path::{Path, PathBuf};

use crate::error::RuntimeError;
use crate::permissions::ArtifactOwner;

use super::CapabilityContext;

fn own_outdir(ctx: &CapabilityContext) -> Result<&str, RuntimeError> {
    ctx.descriptor
        .outdir
        .as_deref()
        .ok_or_else(|| RuntimeError::WorkspaceError {
            message: "invocation has no outdir configured".to_string(),
        })
}

pub async fn write(ctx: &CapabilityContext, path: &str, contents: &[u8]) -> Result<(), RuntimeError> {
    let allowed = ctx
        .matcher
        .spec
        .artifacts
        .write
        .iter()
        .any(|p| glob::Pattern::new(p).map(|pat| pat.matches(path)).unwrap_or(false));
    if !allowed {
        return Err(ctx.permission_denied(format!("add \"{path}\" to artifacts.write")));
    }
    let outdir = own_outdir(ctx)?;
    let full = Path::new(outdir).join(path);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(&full, contents)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("artifact write {path}: {e}"),
        })
}

pub async fn read(
    ctx: &CapabilityContext,
    owner_plugin_id: Option<&str>,
    path: &str,
) -> Result<Vec<u8>, RuntimeError> {
    let entry = ctx.matcher.spec.artifacts.read.iter().find(|r| match (&r.from, owner_plugin_id) {
        (ArtifactOwner::SelfPlugin, None) => true,
        (ArtifactOwner::OtherPlugin(id), Some(other)) => id == other,
        _ => false,
    });
    let Some(entry) = entry else {
        return Err(ctx.permission_denied("add an artifacts.read entry for this owner"));
    };
    let path_allowed = entry
        .paths
        .iter()
        .any(|p| glob::Pattern::new(p).map(|pat| pat.matches(path)).unwrap_or(false));
    if !path_allowed {
        return Err(ctx.permission_denied(format!("add \"{path}\" to artifacts.read paths")));
    }
    if let Some(allowed_types) = &entry.allowed_types {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        if !allowed_types.iter().any(|t| t.trim_start_matches('.') == ext) {
            return Err(ctx.permission_denied("file type not in artifacts.read allowedTypes"));
        }
    }

    let root: PathBuf = match owner_plugin_id {
        None => PathBuf::from(own_outdir(ctx)?),
        Some(other) => {
            let registry = ctx.registry.as_ref().ok_or_else(|| RuntimeError::UnknownError {
                message: "no plugin registry configured for cross-plugin artifact reads".to_string(),
            })?;
            let outdir = registry
                .read()
                .await
                .outdir(other)
                .map(PathBuf::from)
                .ok_or_else(|| RuntimeError::WorkspaceError {
                    message: format!("unknown plugin '{other}' or it has no artifact root configured"),
                })?;
            outdir
        }
    };
    tokio::fs::read(root.join(path))
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("artifact read {path}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{ArtifactsSpec, PermissionMatcher, PermissionSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn write_denied_without_grant() {
        let spec = PermissionSpec {
            artifacts: ArtifactsSpec::default(),
            ..Default::default()
        };
        let ctx = CapabilityContext::new(
            Descriptor {
                host_type: HostType::Cli,
                plugin_id: "demo".to_string(),
                plugin_version: "1.0.0".to_string(),
                request_id: "r1".to_string(),
                parent_request_id: None,
                tenant_id: None,
                invocation_depth: 0,
                cwd: "/tmp".to_string(),
                outdir: Some("/tmp/out".to_string()),
                permissions: spec.clone(),
                host_context: json!({}),
            },
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        );
        let result = write(&ctx, "report.json", b"{}").await;
        assert!(result.is_err());
    }
}

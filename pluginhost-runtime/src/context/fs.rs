//! # Filesystem Shim (§4.2.1)
//!
//! Every call is checked against the invocation's compiled `fs.read`/
//! `fs.write` patterns before touching disk, with the deny-list
//! (`.env`, `.git`, `.ssh`, `node_modules`, `/etc`, `/proc`, `/sys`) checked
//! first so no allow-pattern can bypass it. Canonicalizing the path before
//! the check closes the obvious `../` traversal bypass. A path that resolves
//! into the invocation's `outdir` or spells its way into an `.artifacts`/
//! `artifacts` directory is rejected outright and logged as a security event
//! before any permission check runs — artifacts are governed separately
//! (§4.8) and must only be reached through that API, not this one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::RuntimeError;
use crate::permissions::fs_hint;

use super::platform::analytics_track;
use super::CapabilityContext;

#[derive(Debug, Clone, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
    pub modified_ms: Option<u64>,
}

/// Normalize without requiring the path to exist (`std::fs::canonicalize`
/// fails on missing paths, which is common for `writeFile`/`mkdir` targets).
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve(ctx: &CapabilityContext, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        Path::new(&ctx.descriptor.cwd).join(candidate)
    };
    lexical_normalize(&joined)
}

/// The artifacts root a raw `fs` call must never reach into: the
/// invocation's own `outdir`, plus any path that spells its way into an
/// `.artifacts`/`artifacts` directory regardless of `outdir` (§4.2.1).
fn artifacts_root(ctx: &CapabilityContext) -> Option<PathBuf> {
    let outdir = ctx.descriptor.outdir.as_deref()?;
    let candidate = Path::new(outdir);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        Path::new(&ctx.descriptor.cwd).join(candidate)
    };
    Some(lexical_normalize(&joined))
}

fn is_artifacts_bypass(ctx: &CapabilityContext, resolved: &Path) -> bool {
    if let Some(root) = artifacts_root(ctx) {
        if resolved.starts_with(&root) {
            return true;
        }
    }
    resolved.components().any(|c| {
        matches!(c, std::path::Component::Normal(name) if name == ".artifacts" || name == "artifacts")
    })
}

/// Logs a security event and denies the call when a raw `fs` read/write
/// would otherwise reach into the artifacts directory, which must only be
/// touched through the `artifacts` API (§4.2.1, §4.8).
fn reject_artifacts_bypass(ctx: &CapabilityContext, path: &str, resolved: &Path) -> Option<RuntimeError> {
    if !is_artifacts_bypass(ctx, resolved) {
        return None;
    }
    let mut properties: HashMap<String, Value> = HashMap::new();
    properties.insert("plugin_id".to_string(), Value::String(ctx.descriptor.plugin_id.clone()));
    properties.insert("path".to_string(), Value::String(path.to_string()));
    analytics_track(ctx, "security.fs_artifacts_bypass_attempt", &properties);
    Some(ctx.permission_denied("artifacts are reached through the artifacts API, not fs"))
}

fn check_read(ctx: &CapabilityContext, path: &str) -> Result<PathBuf, RuntimeError> {
    let resolved = resolve(ctx, path);
    if let Some(err) = reject_artifacts_bypass(ctx, path, &resolved) {
        return Err(err);
    }
    let resolved_str = resolved.to_string_lossy().to_string();
    if !ctx.matcher.can_read_fs(&resolved_str) {
        return Err(ctx.permission_denied(fs_hint(&resolved_str, false)));
    }
    Ok(resolved)
}

fn check_write(ctx: &CapabilityContext, path: &str) -> Result<PathBuf, RuntimeError> {
    let resolved = resolve(ctx, path);
    if let Some(err) = reject_artifacts_bypass(ctx, path, &resolved) {
        return Err(err);
    }
    let resolved_str = resolved.to_string_lossy().to_string();
    if !ctx.matcher.can_write_fs(&resolved_str) {
        return Err(ctx.permission_denied(fs_hint(&resolved_str, true)));
    }
    Ok(resolved)
}

pub async fn read_file(ctx: &CapabilityContext, path: &str) -> Result<String, RuntimeError> {
    let resolved = check_read(ctx, path)?;
    tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("readFile {path}: {e}"),
        })
}

pub async fn read_file_buffer(ctx: &CapabilityContext, path: &str) -> Result<Vec<u8>, RuntimeError> {
    let resolved = check_read(ctx, path)?;
    tokio::fs::read(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("readFileBuffer {path}: {e}"),
        })
}

pub async fn write_file(ctx: &CapabilityContext, path: &str, contents: &[u8]) -> Result<(), RuntimeError> {
    let resolved = check_write(ctx, path)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(&resolved, contents)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("writeFile {path}: {e}"),
        })
}

pub async fn readdir(ctx: &CapabilityContext, path: &str) -> Result<Vec<String>, RuntimeError> {
    let resolved = check_read(ctx, path)?;
    let mut entries = tokio::fs::read_dir(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("readdir {path}: {e}"),
        })?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RuntimeError::WorkspaceError { message: e.to_string() })?
    {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

pub async fn readdir_with_stats(
    ctx: &CapabilityContext,
    path: &str,
) -> Result<Vec<DirEntryInfo>, RuntimeError> {
    let resolved = check_read(ctx, path)?;
    let mut entries = tokio::fs::read_dir(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError { message: e.to_string() })?;
    let mut out = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RuntimeError::WorkspaceError { message: e.to_string() })?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| RuntimeError::WorkspaceError { message: e.to_string() })?;
        out.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: file_type.is_dir(),
        });
    }
    Ok(out)
}

pub async fn stat(ctx: &CapabilityContext, path: &str) -> Result<FileStat, RuntimeError> {
    let resolved = check_read(ctx, path)?;
    let meta = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("stat {path}: {e}"),
        })?;
    let modified_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64);
    Ok(FileStat {
        size: meta.len(),
        is_dir: meta.is_dir(),
        is_file: meta.is_file(),
        modified_ms,
    })
}

pub async fn exists(ctx: &CapabilityContext, path: &str) -> bool {
    match check_read(ctx, path) {
        Ok(resolved) => tokio::fs::metadata(&resolved).await.is_ok(),
        Err(_) => false,
    }
}

pub async fn mkdir(ctx: &CapabilityContext, path: &str) -> Result<(), RuntimeError> {
    let resolved = check_write(ctx, path)?;
    tokio::fs::create_dir_all(&resolved)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("mkdir {path}: {e}"),
        })
}

pub async fn rm(ctx: &CapabilityContext, path: &str) -> Result<(), RuntimeError> {
    let resolved = check_write(ctx, path)?;
    let meta = tokio::fs::metadata(&resolved).await;
    match meta {
        Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(&resolved).await,
        Ok(_) => tokio::fs::remove_file(&resolved).await,
        Err(_) => return Ok(()),
    }
    .map_err(|e| RuntimeError::WorkspaceError {
        message: format!("rm {path}: {e}"),
    })
}

pub async fn copy(ctx: &CapabilityContext, from: &str, to: &str) -> Result<(), RuntimeError> {
    let src = check_read(ctx, from)?;
    let dst = check_write(ctx, to)?;
    tokio::fs::copy(&src, &dst)
        .await
        .map(|_| ())
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("copy {from} -> {to}: {e}"),
        })
}

pub async fn rename(ctx: &CapabilityContext, from: &str, to: &str) -> Result<(), RuntimeError> {
    let src = check_write(ctx, from)?;
    let dst = check_write(ctx, to)?;
    tokio::fs::rename(&src, &dst)
        .await
        .map_err(|e| RuntimeError::WorkspaceError {
            message: format!("move {from} -> {to}: {e}"),
        })
}

pub fn resolve_path(ctx: &CapabilityContext, path: &str) -> String {
    resolve(ctx, path).to_string_lossy().to_string()
}

pub fn relative(ctx: &CapabilityContext, from: &str, to: &str) -> String {
    let from = resolve(ctx, from);
    let to = resolve(ctx, to);
    pathdiff(&from, &to)
}

fn pathdiff(from: &Path, to: &Path) -> String {
    let mut from_components: Vec<_> = from.components().collect();
    let mut to_components: Vec<_> = to.components().collect();
    let mut i = 0;
    while i < from_components.len() && i < to_components.len() && from_components[i] == to_components[i] {
        i += 1;
    }
    from_components.drain(..i);
    to_components.drain(..i);
    let mut parts: Vec<String> = from_components.iter().map(|_| "..".to_string()).collect();
    parts.extend(to_components.iter().map(|c| c.as_os_str().to_string_lossy().to_string()));
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn join(parts: &[String]) -> String {
    let mut path = PathBuf::new();
    for part in parts {
        path.push(part);
    }
    lexical_normalize(&path).to_string_lossy().to_string()
}

pub fn dirname(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn extname(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers_match_posix_semantics() {
        assert_eq!(dirname("/a/b/c.txt"), "/a/b");
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(extname("/a/b/c.txt"), ".txt");
        assert_eq!(extname("/a/b/c"), "");
        assert_eq!(join(&["a".to_string(), "b".to_string(), "../c".to_string()]), "a/c");
    }

    #[test]
    fn lexical_normalize_collapses_parent_dirs() {
        let out = lexical_normalize(Path::new("/workspace/foo/../../etc/passwd"));
        assert_eq!(out, PathBuf::from("/etc/passwd"));
    }
}

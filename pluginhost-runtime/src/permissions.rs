//! # Permission Specification
//!
//! The nested, immutable-per-invocation permission grammar of §3/§6. Patterns
//! are compiled once, at context construction, into `glob::Pattern`s so the
//! hot path (every fs/fetch/cache/etc. call) never re-parses a pattern — the
//! re-architecture note in §9 applies directly here.

use std::collections::HashMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Paths that are never readable or writable, regardless of any `**` grant.
/// Checked before any allow-pattern, so deny always wins (§3, testable
/// property 3).
const DENIED_FS_PATTERNS: &[&str] = &[
    "**/.env",
    "**/.env.*",
    "**/.git",
    "**/.git/**",
    "**/.ssh",
    "**/.ssh/**",
    "**/node_modules",
    "**/node_modules/**",
    "/etc/**",
    "/proc/**",
    "/sys/**",
];

fn compile_all(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}

fn matches_any(compiled: &[Pattern], candidate: &str) -> bool {
    compiled.iter().any(|p| p.matches(candidate))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemSpec {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub fetch: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub read: Vec<String>,
}

/// A grant for a single platform service: either unrestricted (`true`), a
/// list of namespace/prefix scopes, or absent (denied).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    Bool(bool),
    Scoped(Vec<String>),
}

impl Default for Grant {
    fn default() -> Self {
        Grant::Bool(false)
    }
}

impl Grant {
    pub fn is_granted(&self) -> bool {
        match self {
            Grant::Bool(b) => *b,
            Grant::Scoped(scopes) => !scopes.is_empty(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Grant::Bool(true))
    }

    pub fn scopes(&self) -> &[String] {
        match self {
            Grant::Scoped(s) => s,
            Grant::Bool(_) => &[],
        }
    }

    /// True if `key` is permitted under this grant: unrestricted grants pass
    /// everything; scoped grants require a prefix match.
    pub fn allows_prefix(&self, key: &str) -> bool {
        match self {
            Grant::Bool(b) => *b,
            Grant::Scoped(scopes) => scopes.iter().any(|s| key.starts_with(s.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSpec {
    #[serde(default)]
    pub logger: Grant,
    #[serde(default)]
    pub llm: Grant,
    #[serde(default)]
    pub embeddings: Grant,
    #[serde(default, rename = "vectorStore")]
    pub vector_store: Grant,
    #[serde(default)]
    pub cache: Grant,
    #[serde(default)]
    pub storage: Grant,
    #[serde(default)]
    pub analytics: Grant,
    #[serde(default, rename = "eventBus")]
    pub event_bus: Grant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellSpec {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default, rename = "requireConfirmation")]
    pub require_confirmation: Vec<String>,
    #[serde(default, rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(default, rename = "maxConcurrent")]
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeSpec {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutLimits {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalLimits {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobQuotas {
    #[serde(default, rename = "perMinute")]
    pub per_minute: Option<u64>,
    #[serde(default, rename = "perHour")]
    pub per_hour: Option<u64>,
    #[serde(default, rename = "perDay")]
    pub per_day: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobKindSpec {
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default)]
    pub quotas: JobQuotas,
    #[serde(default, rename = "timeoutLimits")]
    pub timeout_limits: Option<TimeoutLimits>,
    #[serde(default, rename = "intervalLimits")]
    pub interval_limits: Option<IntervalLimits>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsSpec {
    #[serde(default)]
    pub submit: JobKindSpec,
    #[serde(default)]
    pub schedule: JobKindSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsSpec {
    #[serde(default)]
    pub produce: Vec<String>,
    #[serde(default)]
    pub consume: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, rename = "maxPayloadBytes")]
    pub max_payload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReadSpec {
    pub from: ArtifactOwner,
    pub paths: Vec<String>,
    #[serde(default, rename = "allowedTypes")]
    pub allowed_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactOwner {
    #[serde(rename = "self")]
    SelfPlugin,
    OtherPlugin(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsSpec {
    #[serde(default)]
    pub read: Vec<ArtifactReadSpec>,
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSpec {
    #[serde(default)]
    pub filesystem: FilesystemSpec,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub environment: EnvironmentSpec,
    #[serde(default)]
    pub platform: PlatformSpec,
    #[serde(default)]
    pub shell: ShellSpec,
    #[serde(default)]
    pub invoke: InvokeSpec,
    #[serde(default)]
    pub jobs: JobsSpec,
    #[serde(default)]
    pub events: EventsSpec,
    #[serde(default)]
    pub artifacts: ArtifactsSpec,
}

/// Always-allowed environment variable names, regardless of grant (§4.2.3).
const ALWAYS_ALLOWED_ENV: &[&str] = &["NODE_ENV", "CI", "TZ", "LANG"];

/// The compiled, call-site-ready form of a `PermissionSpec`. Built once per
/// invocation by `PermissionMatcher::compile`.
pub struct PermissionMatcher {
    fs_read: Vec<Pattern>,
    fs_write: Vec<Pattern>,
    fs_denied: Vec<Pattern>,
    fetch: Vec<Pattern>,
    env_exact: Vec<String>,
    env_prefixes: Vec<String>,
    shell_allow: Vec<String>,
    shell_deny: Vec<String>,
    invoke_allow: Vec<String>,
    invoke_deny: Vec<String>,
    job_submit_handlers: Vec<Pattern>,
    job_schedule_handlers: Vec<Pattern>,
    pub spec: PermissionSpec,
}

impl PermissionMatcher {
    pub fn compile(spec: PermissionSpec) -> Self {
        let (env_exact, env_prefixes) = spec
            .environment
            .read
            .iter()
            .cloned()
            .partition::<Vec<_>, _>(|p| !p.ends_with('*'));
        let env_prefixes = env_prefixes
            .into_iter()
            .map(|p| p.trim_end_matches('*').to_string())
            .collect();

        Self {
            fs_read: compile_all(&spec.filesystem.read),
            fs_write: compile_all(&spec.filesystem.write),
            fs_denied: DENIED_FS_PATTERNS
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
            fetch: compile_all(&spec.network.fetch),
            env_exact,
            env_prefixes,
            shell_allow: spec.shell.allow.clone(),
            shell_deny: spec.shell.deny.clone(),
            invoke_allow: spec.invoke.allow.clone(),
            invoke_deny: spec.invoke.deny.clone(),
            job_submit_handlers: compile_all(&spec.jobs.submit.handlers),
            job_schedule_handlers: compile_all(&spec.jobs.schedule.handlers),
            spec,
        }
    }

    fn is_denied_path(&self, path: &str) -> bool {
        matches_any(&self.fs_denied, path)
    }

    pub fn can_read_fs(&self, path: &str) -> bool {
        !self.is_denied_path(path) && matches_any(&self.fs_read, path)
    }

    pub fn can_write_fs(&self, path: &str) -> bool {
        !self.is_denied_path(path) && matches_any(&self.fs_write, path)
    }

    pub fn can_fetch(&self, url: &str) -> bool {
        matches_any(&self.fetch, url)
    }

    pub fn can_read_env(&self, name: &str) -> bool {
        ALWAYS_ALLOWED_ENV.contains(&name)
            || self.env_exact.iter().any(|e| e == name)
            || self.env_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Shell command allow-check: deny list wins, then the allow list or `*`.
    pub fn can_exec_shell(&self, command: &str) -> bool {
        let denied = self
            .shell_deny
            .iter()
            .any(|p| Pattern::new(p).map(|pat| pat.matches(command)).unwrap_or(false));
        if denied {
            return false;
        }
        self.shell_allow.iter().any(|p| {
            p == "*" || Pattern::new(p).map(|pat| pat.matches(command)).unwrap_or(p == command)
        })
    }

    /// Cross-plugin invocation allow-check: deny wins over allow (§4.8).
    pub fn can_invoke(&self, target: &str) -> bool {
        let denied = self.invoke_deny.iter().any(|p| glob_like_match(p, target));
        if denied {
            return false;
        }
        self.invoke_allow.iter().any(|p| glob_like_match(p, target))
    }

    pub fn can_submit_job(&self, handler_ref: &str) -> bool {
        matches_any(&self.job_submit_handlers, handler_ref)
    }

    pub fn can_schedule_job(&self, handler_ref: &str) -> bool {
        matches_any(&self.job_schedule_handlers, handler_ref)
    }

    pub fn cache_grant(&self) -> &Grant {
        &self.spec.platform.cache
    }

    pub fn storage_grant(&self) -> &Grant {
        &self.spec.platform.storage
    }

    pub fn vector_store_grant(&self) -> &Grant {
        &self.spec.platform.vector_store
    }

    pub fn llm_grant(&self) -> &Grant {
        &self.spec.platform.llm
    }
}

/// `pluginId` or `pluginId:METHOD /path` patterns aren't true globs; match
/// exact string or a trailing `*` wildcard.
fn glob_like_match(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    pattern == candidate
}

/// Build a remediation hint for a denied filesystem call, per §4.2.5.
pub fn fs_hint(path: &str, write: bool) -> String {
    if write {
        format!("add \"{path}\" to fs.write allow")
    } else {
        format!("add \"{path}\" to fs.read allow")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledSummary {
    pub fs_read_patterns: usize,
    pub fs_write_patterns: usize,
}

/// Per-scope map used by `cache`/`storage`/`vectorStore` shims to record
/// which namespace an already-prefixed key resolved to, for diagnostics.
pub type ScopeDiagnostics = HashMap<String, usize>;

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_fs(read: &[&str], write: &[&str]) -> PermissionSpec {
        PermissionSpec {
            filesystem: FilesystemSpec {
                read: read.iter().map(|s| s.to_string()).collect(),
                write: write.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn deny_wins_over_broad_allow() {
        let matcher = PermissionMatcher::compile(spec_with_fs(&["**"], &["**"]));
        assert!(!matcher.can_read_fs("/workspace/.env"));
        assert!(!matcher.can_write_fs("/workspace/.git/config"));
        assert!(matcher.can_read_fs("/workspace/src/main.rs"));
    }

    #[test]
    fn env_prefix_and_always_allowed() {
        let spec = PermissionSpec {
            environment: EnvironmentSpec {
                read: vec!["MY_APP_*".to_string(), "EXACT_NAME".to_string()],
            },
            ..Default::default()
        };
        let matcher = PermissionMatcher::compile(spec);
        assert!(matcher.can_read_env("TZ"));
        assert!(matcher.can_read_env("MY_APP_TOKEN"));
        assert!(matcher.can_read_env("EXACT_NAME"));
        assert!(!matcher.can_read_env("SECRET"));
    }

    #[test]
    fn cache_namespace_prefix_isolation() {
        let spec = PermissionSpec {
            platform: PlatformSpec {
                cache: Grant::Scoped(vec!["jobs:".to_string()]),
                ..Default::default()
            },
            ..Default::default()
        };
        let matcher = PermissionMatcher::compile(spec);
        assert!(matcher.cache_grant().allows_prefix("jobs:a"));
        assert!(!matcher.cache_grant().allows_prefix("other:a"));
        assert!(!matcher.cache_grant().is_unrestricted());
    }

    #[test]
    fn invoke_deny_wins_over_allow() {
        let spec = PermissionSpec {
            invoke: InvokeSpec {
                allow: vec!["*".to_string()],
                deny: vec!["evil-plugin".to_string()],
            },
            ..Default::default()
        };
        let matcher = PermissionMatcher::compile(spec);
        assert!(matcher.can_invoke("good-plugin"));
        assert!(!matcher.can_invoke("evil-plugin"));
    }

    #[test]
    fn shell_star_allows_unless_denied() {
        let spec = PermissionSpec {
            shell: ShellSpec {
                allow: vec!["*".to_string()],
                deny: vec!["rm".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let matcher = PermissionMatcher::compile(spec);
        assert!(matcher.can_exec_shell("ls"));
        assert!(!matcher.can_exec_shell("rm"));
    }
}

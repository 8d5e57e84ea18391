//! # Plugin Identity & Manifest
//!
//! The opaque entry point SPEC_FULL.md §11 calls for: manifest schema
//! validation is explicitly out of scope, so this only captures what's
//! needed to construct a `PermissionSpec` and a handler registry.
//! Structurally this replaces the teacher's `plugins::mod::Plugin` trait
//! object registry with a data-driven manifest + handler-reference lookup.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handler::Handler;
use crate::permissions::PermissionSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub permissions: PermissionSpec,
    pub handlers: Vec<HandlerDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    /// e.g. `"./dist/commands/x.js#run"` or, in this compiled-registry
    /// rendering of §9's re-architecture note, a registry key like
    /// `"commands/x#run"`.
    pub handler_ref: String,
    #[serde(default)]
    pub kind: HandlerKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Command,
    Route,
    WsChannel,
    Workflow,
    Webhook,
    Job,
}

/// A loaded plugin: its manifest plus the compiled handler registry the
/// runner resolves `handlerRef` against (§9's "registry keyed by
/// `handlerRef`" re-architecture).
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub handlers: HashMap<String, Arc<dyn Handler>>,
    /// This plugin's artifact root, set by the discovery code that loaded it
    /// (its declared `outdir` is per-invocation, §4.8; this is the static
    /// root other plugins resolve into for cross-plugin `artifacts.read`).
    outdir: Option<String>,
}

impl LoadedPlugin {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            handlers: HashMap::new(),
            outdir: None,
        }
    }

    pub fn with_outdir(mut self, outdir: impl Into<String>) -> Self {
        self.outdir = Some(outdir.into());
        self
    }

    pub fn register(&mut self, handler_ref: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler_ref.into(), handler);
    }

    pub fn resolve(&self, handler_ref: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(handler_ref).cloned()
    }
}

/// Registry of all loaded plugins, keyed by plugin id.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, LoadedPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: LoadedPlugin) {
        self.plugins.insert(plugin.manifest.id.clone(), plugin);
    }

    pub fn get(&self, plugin_id: &str) -> Option<&LoadedPlugin> {
        self.plugins.get(plugin_id)
    }

    pub fn manifest(&self, plugin_id: &str) -> Option<&PluginManifest> {
        self.plugins.get(plugin_id).map(|p| &p.manifest)
    }

    /// The artifact root a cross-plugin `artifacts.read` resolves into
    /// (§4.8), distinct from the reading plugin's own per-invocation outdir.
    pub fn outdir(&self, plugin_id: &str) -> Option<&str> {
        self.plugins.get(plugin_id).and_then(|p| p.outdir.as_deref())
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_manifest() {
        let manifest = PluginManifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            handlers: vec![HandlerDescriptor {
                handler_ref: "commands/hello#run".to_string(),
                kind: HandlerKind::Command,
            }],
        };
        let mut registry = PluginRegistry::new();
        registry.insert(LoadedPlugin::new(manifest));
        assert!(registry.manifest("demo").is_some());
        assert!(registry.get("missing").is_none());
    }
}

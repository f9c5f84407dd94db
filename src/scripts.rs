//! Script registry
//!
//! Indexes `scriptParsed` notifications by runtime id and by URL. Anonymous
//! eval scripts get a synthesized `VM<id>` URL so every script is
//! addressable. Entries live until `executionContextsCleared` or
//! disconnect.

use crate::rdp::types::ScriptParsedEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Prefix of synthesized URLs for anonymous eval scripts
pub const VM_URL_PREFIX: &str = "VM";

/// A parsed script known to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Runtime script id
    pub script_id: String,
    /// Script URL, synthesized as `VM<id>` when the runtime sent none
    pub url: String,
    /// Declared source-map URL
    pub source_map_url: Option<String>,
}

/// A logical source served through a `sourceReference`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SourceContainer {
    /// Backing script, when the source is a loaded script
    pub script_id: Option<String>,
    /// Inline contents, set only for inlined source-map sources
    pub contents: Option<String>,
    /// Authored path the container maps to
    pub mapped_path: Option<String>,
}

/// Uppercase a lowercase drive letter at the start of a path or file URL.
pub fn fix_drive_letter(url: &str) -> String {
    let bytes = url.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_lowercase() {
        let mut fixed = String::with_capacity(url.len());
        fixed.push(bytes[0].to_ascii_uppercase() as char);
        fixed.push_str(&url[1..]);
        return fixed;
    }
    // file:///c:/… keeps the drive letter after the scheme.
    if let Some(rest) = url.strip_prefix("file:///") {
        let rest_bytes = rest.as_bytes();
        if rest_bytes.len() >= 2 && rest_bytes[1] == b':' && rest_bytes[0].is_ascii_lowercase() {
            let mut fixed = String::with_capacity(url.len());
            fixed.push_str("file:///");
            fixed.push(rest_bytes[0].to_ascii_uppercase() as char);
            fixed.push_str(&rest[1..]);
            return fixed;
        }
    }
    url.to_string()
}

/// Whether a URL names a synthesized anonymous-eval script.
pub fn is_vm_url(url: &str) -> bool {
    url.starts_with(VM_URL_PREFIX)
}

/// Script index keyed by runtime id and by URL
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: HashMap<String, Arc<Script>>,
    by_url: HashMap<String, Arc<Script>>,
}

impl ScriptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parsed script and return its normalized record.
    pub fn register(&self, event: &ScriptParsedEvent) -> Arc<Script> {
        let url = if event.url.is_empty() {
            format!("{}{}", VM_URL_PREFIX, event.script_id)
        } else {
            fix_drive_letter(&event.url)
        };

        let script = Arc::new(Script {
            script_id: event.script_id.clone(),
            url: url.clone(),
            source_map_url: event.source_map_url.clone(),
        });

        let mut inner = self.inner.write();
        inner.by_id.insert(script.script_id.clone(), script.clone());
        inner.by_url.insert(url, script.clone());
        script
    }

    /// Look up by runtime script id.
    pub fn get_by_id(&self, script_id: &str) -> Option<Arc<Script>> {
        self.inner.read().by_id.get(script_id).cloned()
    }

    /// Look up by URL.
    pub fn get_by_url(&self, url: &str) -> Option<Arc<Script>> {
        self.inner.read().by_url.get(url).cloned()
    }

    /// All known scripts, in URL order.
    pub fn all_by_url(&self) -> Vec<Arc<Script>> {
        let inner = self.inner.read();
        let mut scripts: Vec<_> = inner.by_url.values().cloned().collect();
        scripts.sort_by(|a, b| a.url.cmp(&b.url));
        scripts
    }

    /// Number of known scripts.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Whether no scripts are known.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }

    /// Drop every script (execution contexts cleared, disconnect).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.by_url.clear();
    }
}

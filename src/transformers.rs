//! Transformer collaborator interfaces
//!
//! Path mapping, source-map resolution and line/column origin conversion
//! are owned by the embedder. The adapter talks to them through these
//! traits; the identity implementations below are the defaults and the
//! test doubles.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// An authored position produced by source-map lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPosition {
    /// Authored source path; `None` when the map had no source for the site
    pub source: Option<String>,
    /// 0-based authored line
    pub line: u64,
    /// 0-based authored column
    pub column: u64,
}

/// Details of one authored source within a generated script
#[derive(Debug, Clone)]
pub struct SourcePathDetails {
    /// Authored source path
    pub inferred_path: String,
    /// Where the source's generated code starts within the script
    pub start_position: Option<(u64, u64)>,
}

/// Maps client paths to target URLs and back.
pub trait PathTransformer: Send + Sync {
    /// Client path → target script URL.
    fn to_target_url(&self, client_path: &str) -> Option<String>;

    /// Target script URL → client path.
    fn to_client_path(&self, target_url: &str) -> Option<String>;

    /// Observe a parsed script so later lookups can resolve it.
    fn script_parsed(&self, url: &str);

    /// Forget everything learned from the current target.
    fn clear_target_context(&self);
}

/// Resolves authored↔generated positions through source maps.
#[async_trait]
pub trait SourceMapTransformer: Send + Sync {
    /// Load the map for a newly parsed script. Returns the authored source
    /// paths the map names, or `None` when the script has no map.
    async fn script_parsed(
        &self,
        path_or_url: &str,
        source_map_url: Option<&str>,
    ) -> Option<Vec<String>>;

    /// Generated position → authored position.
    fn map_to_authored(&self, path: &str, line: u64, column: u64) -> Option<MappedPosition>;

    /// Authored position → generated position.
    fn map_to_generated(&self, authored_path: &str, line: u64, column: u64)
        -> Option<MappedPosition>;

    /// Authored path → generated path.
    fn generated_path_from_authored(&self, authored_path: &str) -> Option<String>;

    /// All authored sources of a generated script.
    fn all_sources(&self, generated_path: &str) -> Vec<String>;

    /// Authored source details of a generated script, in source order.
    fn all_source_path_details(&self, generated_path: &str) -> Vec<SourcePathDetails>;

    /// Forget everything learned from the current target.
    fn clear_target_context(&self);
}

/// Converts line/column numbers between client origin and the runtime's
/// 0-based origin.
pub trait LineColTransformer: Send + Sync {
    /// Record the client's numbering origin from the initialize request.
    fn set_client_origin(&self, lines_start_at1: bool, columns_start_at1: bool);

    /// Record whether the runtime honors column breakpoints.
    fn set_column_breakpoints_enabled(&self, enabled: bool);

    /// Client line → 0-based debugger line.
    fn line_to_debugger(&self, client_line: u64) -> u64;

    /// 0-based debugger line → client line.
    fn line_to_client(&self, debugger_line: u64) -> u64;

    /// Client column → 0-based debugger column.
    fn column_to_debugger(&self, client_column: u64) -> u64;

    /// 0-based debugger column → client column.
    fn column_to_client(&self, debugger_column: u64) -> u64;
}

/// Path transformer that maps every path to itself.
#[derive(Debug, Default)]
pub struct IdentityPathTransformer;

impl PathTransformer for IdentityPathTransformer {
    fn to_target_url(&self, client_path: &str) -> Option<String> {
        Some(client_path.to_string())
    }

    fn to_client_path(&self, target_url: &str) -> Option<String> {
        Some(target_url.to_string())
    }

    fn script_parsed(&self, _url: &str) {}

    fn clear_target_context(&self) {}
}

/// Source-map transformer for targets without source maps.
#[derive(Debug, Default)]
pub struct NoSourceMaps;

#[async_trait]
impl SourceMapTransformer for NoSourceMaps {
    async fn script_parsed(
        &self,
        _path_or_url: &str,
        _source_map_url: Option<&str>,
    ) -> Option<Vec<String>> {
        None
    }

    fn map_to_authored(&self, _path: &str, _line: u64, _column: u64) -> Option<MappedPosition> {
        None
    }

    fn map_to_generated(
        &self,
        _authored_path: &str,
        _line: u64,
        _column: u64,
    ) -> Option<MappedPosition> {
        None
    }

    fn generated_path_from_authored(&self, _authored_path: &str) -> Option<String> {
        None
    }

    fn all_sources(&self, _generated_path: &str) -> Vec<String> {
        Vec::new()
    }

    fn all_source_path_details(&self, _generated_path: &str) -> Vec<SourcePathDetails> {
        Vec::new()
    }

    fn clear_target_context(&self) {}
}

/// Default line/column transformer: client numbering recorded at
/// initialize, debugger side always 0-based.
#[derive(Debug)]
pub struct DefaultLineColTransformer {
    lines_start_at1: AtomicBool,
    columns_start_at1: AtomicBool,
    column_breakpoints: AtomicBool,
}

impl Default for DefaultLineColTransformer {
    fn default() -> Self {
        Self {
            lines_start_at1: AtomicBool::new(true),
            columns_start_at1: AtomicBool::new(true),
            column_breakpoints: AtomicBool::new(false),
        }
    }
}

impl DefaultLineColTransformer {
    /// Create with the standard 1-based client origin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineColTransformer for DefaultLineColTransformer {
    fn set_client_origin(&self, lines_start_at1: bool, columns_start_at1: bool) {
        self.lines_start_at1.store(lines_start_at1, Ordering::Relaxed);
        self.columns_start_at1
            .store(columns_start_at1, Ordering::Relaxed);
    }

    fn set_column_breakpoints_enabled(&self, enabled: bool) {
        self.column_breakpoints.store(enabled, Ordering::Relaxed);
    }

    fn line_to_debugger(&self, client_line: u64) -> u64 {
        if self.lines_start_at1.load(Ordering::Relaxed) {
            client_line.saturating_sub(1)
        } else {
            client_line
        }
    }

    fn line_to_client(&self, debugger_line: u64) -> u64 {
        if self.lines_start_at1.load(Ordering::Relaxed) {
            debugger_line + 1
        } else {
            debugger_line
        }
    }

    fn column_to_debugger(&self, client_column: u64) -> u64 {
        if self.columns_start_at1.load(Ordering::Relaxed) {
            client_column.saturating_sub(1)
        } else {
            client_column
        }
    }

    fn column_to_client(&self, debugger_column: u64) -> u64 {
        if self.columns_start_at1.load(Ordering::Relaxed) {
            debugger_column + 1
        } else {
            debugger_column
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_origin_conversion() {
        let transformer = DefaultLineColTransformer::new();
        assert_eq!(transformer.line_to_debugger(1), 0);
        assert_eq!(transformer.line_to_client(0), 1);
        assert_eq!(transformer.column_to_debugger(5), 4);
        assert_eq!(transformer.column_to_client(4), 5);

        transformer.set_client_origin(false, false);
        assert_eq!(transformer.line_to_debugger(0), 0);
        assert_eq!(transformer.line_to_client(0), 0);
    }

    #[test]
    fn test_identity_path_transformer() {
        let transformer = IdentityPathTransformer;
        assert_eq!(
            transformer.to_target_url("/app/a.js").as_deref(),
            Some("/app/a.js")
        );
        assert_eq!(
            transformer.to_client_path("file:///app/a.js").as_deref(),
            Some("file:///app/a.js")
        );
    }

    #[tokio::test]
    async fn test_no_source_maps() {
        let transformer = NoSourceMaps;
        assert!(transformer.script_parsed("a.js", None).await.is_none());
        assert!(transformer.map_to_authored("a.js", 0, 0).is_none());
        assert!(transformer.generated_path_from_authored("a.ts").is_none());
    }
}

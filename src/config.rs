//! Attach configuration
//!
//! Deserialized from the DAP `attach` request arguments. All fields are
//! optional on the wire; defaults follow the documented launch-configuration
//! behavior (port 9229, source maps on).

use serde::Deserialize;

fn default_port() -> u16 {
    9229
}

fn default_true() -> bool {
    true
}

/// Arguments of the `attach` request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct AttachConfig {
    /// Debug port of the target runtime
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host address for target discovery
    #[serde(default)]
    pub address: Option<String>,
    /// URL filter applied during target discovery
    #[serde(default)]
    pub url: Option<String>,
    /// Discovery timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Direct websocket URL, bypassing discovery
    #[serde(default)]
    pub websocket_url: Option<String>,
    /// Whether authored sources are resolved through source maps
    #[serde(default = "default_true")]
    pub source_maps: bool,
    /// Auto-skip frames that have no authored mapping while stepping
    #[serde(default)]
    pub smart_step: bool,
    /// Ask the runtime for async stack parents
    #[serde(default)]
    pub show_async_stacks: bool,
    /// Glob patterns for files to skip; `!`-negation is not supported
    #[serde(default)]
    pub skip_files: Vec<String>,
    /// Raw regex patterns appended verbatim to the skip set
    #[serde(default)]
    pub skip_file_reg_exps: Vec<String>,
    /// Trace setting: `"verbose"` or any truthy value enables request tracing
    #[serde(default)]
    pub trace: Option<serde_json::Value>,
    /// Deprecated alias of `trace: "verbose"`
    #[serde(default)]
    pub verbose_diagnostic_logging: bool,
    /// Deprecated alias of `trace: true`
    #[serde(default)]
    pub diagnostic_logging: bool,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: None,
            url: None,
            timeout: None,
            websocket_url: None,
            source_maps: true,
            smart_step: false,
            show_async_stacks: false,
            skip_files: Vec::new(),
            skip_file_reg_exps: Vec::new(),
            trace: None,
            verbose_diagnostic_logging: false,
            diagnostic_logging: false,
        }
    }
}

impl AttachConfig {
    /// Whether verbose request tracing was requested, through any of the
    /// current and deprecated flags.
    pub fn verbose_trace(&self) -> bool {
        if self.verbose_diagnostic_logging {
            return true;
        }
        match &self.trace {
            Some(serde_json::Value::String(s)) => s == "verbose",
            _ => false,
        }
    }

    /// Whether any diagnostic tracing at all was requested.
    pub fn any_trace(&self) -> bool {
        if self.verbose_trace() || self.diagnostic_logging {
            return true;
        }
        match &self.trace {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: AttachConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.port, 9229);
        assert!(config.source_maps);
        assert!(!config.smart_step);
        assert!(config.skip_files.is_empty());
    }

    #[test]
    fn test_full_arguments() {
        let config: AttachConfig = serde_json::from_value(json!({
            "port": 9230,
            "websocketUrl": "ws://127.0.0.1:9230/abc",
            "sourceMaps": false,
            "smartStep": true,
            "showAsyncStacks": true,
            "skipFiles": ["node_modules/**"],
            "skipFileRegExps": ["^internal/"],
        }))
        .unwrap();
        assert_eq!(config.port, 9230);
        assert_eq!(config.websocket_url.as_deref(), Some("ws://127.0.0.1:9230/abc"));
        assert!(!config.source_maps);
        assert!(config.smart_step);
        assert_eq!(config.skip_files, vec!["node_modules/**"]);
        assert_eq!(config.skip_file_reg_exps, vec!["^internal/"]);
    }

    #[test]
    fn test_trace_flags() {
        let config: AttachConfig =
            serde_json::from_value(json!({ "trace": "verbose" })).unwrap();
        assert!(config.verbose_trace());
        assert!(config.any_trace());

        let config: AttachConfig = serde_json::from_value(json!({ "trace": true })).unwrap();
        assert!(!config.verbose_trace());
        assert!(config.any_trace());

        let config: AttachConfig =
            serde_json::from_value(json!({ "verboseDiagnosticLogging": true })).unwrap();
        assert!(config.verbose_trace());
    }
}

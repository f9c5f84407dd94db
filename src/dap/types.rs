//! DAP request argument and response body types
//!
//! CamelCase on the wire. Only the fields this adapter reads or produces
//! are modeled; unknown incoming fields are ignored.

use serde::{Deserialize, Serialize};

/// DAP `initialize` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    /// Adapter id
    #[serde(default)]
    pub adapter_id: String,
    /// Whether lines start at 1
    #[serde(default = "default_true")]
    pub lines_start_at1: bool,
    /// Whether columns start at 1
    #[serde(default = "default_true")]
    pub columns_start_at1: bool,
    /// Path format; this adapter requires `"path"`
    #[serde(default)]
    pub path_format: String,
}

fn default_true() -> bool {
    true
}

/// DAP capabilities returned from `initialize`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Supports `configurationDone`
    pub supports_configuration_done_request: bool,
    /// Supports `setVariable`
    pub supports_set_variable: bool,
    /// Supports conditional breakpoints
    pub supports_conditional_breakpoints: bool,
    /// Supports hit-conditional breakpoints
    pub supports_hit_conditional_breakpoints: bool,
    /// Supports `completions`
    pub supports_completions_request: bool,
    /// Supports `restartFrame`
    pub supports_restart_frame: bool,
    /// Supports `exceptionInfo`
    pub supports_exception_info_request: bool,
    /// Exception filter options
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointFilter>,
}

/// An exception filter advertised in the capabilities
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointFilter {
    /// Filter id sent back in `setExceptionBreakpoints`
    pub filter: String,
    /// Display label
    pub label: String,
    /// Whether the filter starts enabled
    pub default: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_set_variable: true,
            supports_conditional_breakpoints: true,
            supports_hit_conditional_breakpoints: true,
            supports_completions_request: true,
            supports_restart_frame: true,
            supports_exception_info_request: true,
            exception_breakpoint_filters: vec![
                ExceptionBreakpointFilter {
                    filter: "all".to_string(),
                    label: "All Exceptions".to_string(),
                    default: false,
                },
                ExceptionBreakpointFilter {
                    filter: "uncaught".to_string(),
                    label: "Uncaught Exceptions".to_string(),
                    default: true,
                },
            ],
        }
    }
}

/// DAP source descriptor
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Client path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Reference for sources served by the adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
    /// Where the source came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// `deemphasize` for skipped sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

/// A breakpoint requested by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// Line number in client origin
    pub line: u64,
    /// Column number in client origin
    #[serde(default)]
    pub column: Option<u64>,
    /// Condition expression, passed to the runtime unchanged
    #[serde(default)]
    pub condition: Option<String>,
    /// Hit-condition string (`"% 3"`, `"> 2"`, `"5"`)
    #[serde(default)]
    pub hit_condition: Option<String>,
}

/// DAP `setBreakpoints` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// Source to set breakpoints in
    pub source: Source,
    /// Requested breakpoints
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

/// A breakpoint in a `setBreakpoints` response or `breakpoint` event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Stable client-visible id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Whether the runtime bound the breakpoint
    pub verified: bool,
    /// Failure detail for unverified breakpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Actual bound line (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    /// Actual bound column (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
    /// Source the breakpoint bound in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// `setBreakpoints` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// One entry per requested breakpoint, in request order
    pub breakpoints: Vec<Breakpoint>,
}

/// DAP `stackTrace` request arguments
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// Thread id
    #[serde(default)]
    pub thread_id: i64,
    /// Index of the first frame to return
    #[serde(default)]
    pub start_frame: Option<u64>,
    /// Maximum number of frames to return
    #[serde(default)]
    pub levels: Option<u64>,
}

/// A stack frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Frame handle, valid for the current pause epoch
    pub id: i64,
    /// Function name
    pub name: String,
    /// Source of the frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Line in client origin
    pub line: u64,
    /// Column in client origin
    pub column: u64,
    /// `label` for async boundary frames, `deemphasize` hint carried via `source.origin`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

/// `stackTrace` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// The requested window of frames
    pub stack_frames: Vec<StackFrame>,
    /// Total frame count before slicing
    pub total_frames: u64,
}

/// A variable scope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Capitalized scope name (`Local`, `Closure`, `Global`, `Exception`)
    pub name: String,
    /// Handle for expanding the scope's variables
    pub variables_reference: i64,
    /// Whether fetching the scope is expensive (true for `Global`)
    pub expensive: bool,
    /// Scope range start line (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    /// Scope range start column (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
    /// Scope range end line (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u64>,
    /// Scope range end column (client origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u64>,
}

/// `scopes` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    /// Scopes of the frame, innermost first
    pub scopes: Vec<Scope>,
}

/// DAP `variables` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    /// Container handle
    pub variables_reference: i64,
    /// `indexed`, `named`, or absent for all
    #[serde(default)]
    pub filter: Option<String>,
    /// Start of a sliced window
    #[serde(default)]
    pub start: Option<u64>,
    /// Length of a sliced window
    #[serde(default)]
    pub count: Option<u64>,
}

/// A variable
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// Rendered value
    pub value: String,
    /// Runtime type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    /// Expression that re-evaluates to this variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluate_name: Option<String>,
    /// Handle for expanding children; 0 for leaf values
    pub variables_reference: i64,
    /// Count of named children, when precomputed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<u64>,
    /// Count of indexed children, when precomputed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<u64>,
}

/// `variables` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    /// The container's children
    pub variables: Vec<Variable>,
}

/// DAP `setVariable` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    /// Container holding the variable
    pub variables_reference: i64,
    /// Variable name within the container
    pub name: String,
    /// New value expression
    pub value: String,
}

/// `setVariable` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableResponseBody {
    /// Rendered new value
    pub value: String,
}

/// DAP `evaluate` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    /// Expression to evaluate
    pub expression: String,
    /// Frame to evaluate in; global evaluation when absent
    #[serde(default)]
    pub frame_id: Option<i64>,
    /// Evaluation context (`repl`, `watch`, `hover`)
    #[serde(default)]
    pub context: Option<String>,
}

/// `evaluate` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// Rendered result
    pub result: String,
    /// Handle for expanding the result; 0 for leaf values
    pub variables_reference: i64,
    /// Count of named children, when precomputed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<u64>,
    /// Count of indexed children, when precomputed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<u64>,
}

/// DAP `completions` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsArguments {
    /// Text to complete within
    pub text: String,
    /// 1-based caret column within `text`
    pub column: u64,
    /// Frame whose scopes seed global completions
    #[serde(default)]
    pub frame_id: Option<i64>,
}

/// A completion item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    /// Completion label
    pub label: String,
    /// Item kind; always `property`
    #[serde(rename = "type")]
    pub item_type: String,
}

/// `completions` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsResponseBody {
    /// Matching completion targets
    pub targets: Vec<CompletionItem>,
}

/// DAP `source` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArguments {
    /// Reference of the source to fetch
    #[serde(default)]
    pub source_reference: Option<i64>,
    /// Source descriptor; `path` is honored when the reference is absent
    #[serde(default)]
    pub source: Option<Source>,
}

/// `source` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResponseBody {
    /// The source text
    pub content: String,
}

/// DAP `setExceptionBreakpoints` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    /// Enabled filter ids
    #[serde(default)]
    pub filters: Vec<String>,
}

/// DAP `exceptionInfo` response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfoResponseBody {
    /// Exception class name
    pub exception_id: String,
    /// Break mode; always `unhandled`
    pub break_mode: String,
    /// Exception details
    pub details: ExceptionDetailsBody,
}

/// Exception detail payload of `exceptionInfo`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetailsBody {
    /// Source-mapped formatted stack trace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// DAP `toggleSkipFileStatus` request arguments
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSkipFileStatusArguments {
    /// Client path of the file to toggle
    #[serde(default)]
    pub path: Option<String>,
    /// Source reference of the file to toggle
    #[serde(default)]
    pub source_reference: Option<i64>,
}

/// DAP `restartFrame` request arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartFrameArguments {
    /// Frame handle to restart
    pub frame_id: i64,
}

/// A thread in the `threads` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread id; always 1
    pub id: i64,
    /// Thread name
    pub name: String,
}

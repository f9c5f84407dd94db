//! Wire types for the `Debugger`, `Runtime` and `Console` domains
//!
//! Field names follow the protocol's camelCase JSON; optional fields are
//! omitted when absent, matching what real runtimes send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A location within a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Runtime script id
    pub script_id: String,
    /// 0-based line
    pub line_number: u64,
    /// 0-based column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u64>,
}

/// A possible break location reported by `Debugger.getPossibleBreakpoints`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakLocation {
    /// Runtime script id
    pub script_id: String,
    /// 0-based line
    pub line_number: u64,
    /// 0-based column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u64>,
    /// Break location type (`debuggerStatement`, `call`, `return`)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub break_type: Option<String>,
}

/// Mirror object referencing a value in the runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type (`object`, `function`, `string`, `number`, `boolean`,
    /// `symbol`, `undefined`)
    #[serde(rename = "type", default)]
    pub object_type: String,
    /// Object subtype (`array`, `null`, `map`, `set`, `error`, …)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Constructor name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Primitive value, when representable in JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// String description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remote object id, present for non-primitive values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Preview of the object's contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ObjectPreview>,
}

/// Preview of an object's own properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPreview {
    /// Whether the preview was truncated
    #[serde(default)]
    pub overflow: bool,
    /// Previewed properties
    #[serde(default)]
    pub properties: Vec<PropertyPreview>,
    /// Previewed Map/Set entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryPreview>>,
    /// Description override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object subtype
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// A single previewed property
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPreview {
    /// Property name
    pub name: String,
    /// Property value type
    #[serde(rename = "type", default)]
    pub value_type: String,
    /// Rendered value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Value subtype
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// A previewed Map/Set entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPreview {
    /// Entry key preview (absent for Sets)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ObjectPreview>,
    /// Entry value preview
    pub value: ObjectPreview,
}

/// Own or accessor property descriptor from `Runtime.getProperties`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Property value, when it is a data property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    /// Getter function, when it is an accessor property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<RemoteObject>,
    /// Setter function
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<RemoteObject>,
    /// Whether the property is writable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writable: Option<bool>,
    /// Whether the property is enumerable
    #[serde(default)]
    pub enumerable: bool,
    /// Whether this is the object's own property
    #[serde(default)]
    pub is_own: bool,
}

/// Internal property descriptor (`[[Entries]]`, `[[Prototype]]`, …)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalPropertyDescriptor {
    /// Property name
    pub name: String,
    /// Property value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
}

/// Result of `Runtime.getProperties`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
    /// Own/accessor properties
    #[serde(default)]
    pub result: Vec<PropertyDescriptor>,
    /// Internal properties
    #[serde(default)]
    pub internal_properties: Vec<InternalPropertyDescriptor>,
    /// Set when property collection threw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

/// A scope in a call frame's scope chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerScope {
    /// Scope type (`global`, `local`, `with`, `closure`, `catch`, `block`, `script`)
    #[serde(rename = "type")]
    pub scope_type: String,
    /// Object holding the scope's variables
    pub object: RemoteObject,
    /// Start of the scope's range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    /// End of the scope's range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_location: Option<Location>,
}

/// A call frame from a `Debugger.paused` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Frame id, valid while paused
    pub call_frame_id: String,
    /// Function name; empty for anonymous functions
    #[serde(default)]
    pub function_name: String,
    /// Current location in the generated script
    pub location: Location,
    /// Scope chain, innermost first
    #[serde(default)]
    pub scope_chain: Vec<DebuggerScope>,
    /// The `this` object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub this: Option<RemoteObject>,
    /// Return value, present when paused on a function return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<RemoteObject>,
}

/// A call frame inside a `Runtime.StackTrace`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFrame {
    /// Function name
    #[serde(default)]
    pub function_name: String,
    /// Script id
    pub script_id: String,
    /// Script URL
    #[serde(default)]
    pub url: String,
    /// 0-based line
    pub line_number: u64,
    /// 0-based column
    pub column_number: u64,
}

/// An async stack trace chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    /// Label for the async boundary (`setTimeout`, `Promise.then`, …)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Frames of this segment
    #[serde(default)]
    pub call_frames: Vec<RuntimeCallFrame>,
    /// Parent async segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<StackTrace>>,
}

/// Detailed exception information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception text
    #[serde(default)]
    pub text: String,
    /// 0-based line of the throw site
    #[serde(default)]
    pub line_number: u64,
    /// 0-based column of the throw site
    #[serde(default)]
    pub column_number: u64,
    /// Script id of the throw site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    /// Script URL of the throw site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// JavaScript stack at the throw site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
    /// The thrown value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Displayable error text: the thrown value's description when
    /// present, else the runtime's summary text.
    pub fn error_text(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// `Debugger.paused` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    /// Call frames, top first
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    /// Pause reason (`exception`, `promiseRejection`, `other`, …)
    #[serde(default)]
    pub reason: String,
    /// Reason-specific payload; the thrown value for exceptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RemoteObject>,
    /// Ids of breakpoints hit at this location
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
    /// Async parent chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_stack_trace: Option<StackTrace>,
}

/// `Debugger.scriptParsed` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    /// Runtime script id
    pub script_id: String,
    /// Script URL; empty for anonymous eval scripts
    #[serde(default)]
    pub url: String,
    /// Source-map URL, when the script declares one
    #[serde(rename = "sourceMapURL", skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
}

/// `Debugger.breakpointResolved` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResolvedEvent {
    /// Runtime breakpoint id
    pub breakpoint_id: String,
    /// Where the breakpoint actually bound
    pub location: Location,
}

/// `Runtime.consoleAPICalled` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalledEvent {
    /// Call type (`log`, `error`, `assert`, `warning`, …)
    #[serde(rename = "type", default)]
    pub call_type: String,
    /// Call arguments
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    /// Stack at the call site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
}

/// `Runtime.exceptionThrown` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownEvent {
    /// Exception details
    pub exception_details: ExceptionDetails,
}

/// Legacy `Console.messageAdded` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessageAddedEvent {
    /// The console message
    pub message: ConsoleMessage,
}

/// Legacy console message shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessage {
    /// Message severity (`log`, `error`, `warning`, …)
    #[serde(default)]
    pub level: String,
    /// Message text
    #[serde(default)]
    pub text: String,
    /// Structured parameters, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<RemoteObject>>,
}

/// Result of `Debugger.setBreakpoint`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
    /// Runtime breakpoint id
    pub breakpoint_id: String,
    /// Where the breakpoint bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_location: Option<Location>,
}

/// Result of `Debugger.setBreakpointByUrl`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
    /// Runtime breakpoint id
    pub breakpoint_id: String,
    /// Resolved locations; empty until the script loads
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// Result of `Runtime.evaluate` / `Debugger.evaluateOnCallFrame` /
/// `Runtime.callFunctionOn`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    /// The expression's value
    #[serde(default)]
    pub result: RemoteObject,
    /// Set when evaluation threw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

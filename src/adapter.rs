//! The debug adapter
//!
//! `ChromeDebugAdapter` ties the engines together: it owns the session
//! lifecycle (attach, domain enablement, teardown), dispatches runtime
//! notifications into the pause machine, breakpoint engine and script
//! registry, and exposes the typed DAP request surface.
//!
//! All notification handling runs behind one dispatch lock, giving the
//! single-threaded cooperative ordering the protocol handling relies on.

use crate::breakpoints::{BreakpointEngine, BreakpointRequest, PendingBreakpoint};
use crate::config::AttachConfig;
use crate::dap::events::{DapEvent, EventSink, OutputCategory, StopReason};
use crate::dap::types::{
    Breakpoint, Capabilities, CompletionItem, CompletionsArguments, CompletionsResponseBody,
    EvaluateArguments, EvaluateResponseBody, ExceptionDetailsBody, ExceptionInfoResponseBody,
    InitializeArguments, RestartFrameArguments, ScopesResponseBody, SetBreakpointsArguments,
    SetBreakpointsResponseBody, SetExceptionBreakpointsArguments, SetVariableArguments,
    SetVariableResponseBody, SourceArguments, SourceResponseBody, StackTraceArguments,
    StackTraceResponseBody, Thread, ToggleSkipFileStatusArguments, VariablesArguments,
    VariablesResponseBody,
};
use crate::error::{AdapterError, Result};
use crate::handles::{HandleTable, ReverseHandleTable};
use crate::pause::{classify_pause, PauseState, QUIESCENCE_WINDOW, STEP_SETTLE_CEILING};
use crate::rdp::client::{RdpConnection, RdpConnector};
use crate::rdp::types::{
    BreakpointResolvedEvent, ConsoleApiCalledEvent, ConsoleMessageAddedEvent, EvaluateResult,
    ExceptionThrownEvent, PausedEvent, RemoteObject, ScriptParsedEvent,
};
use crate::scripts::{ScriptRegistry, SourceContainer};
use crate::skip::SkipFileEngine;
use crate::stack::{slice_frames, FrameEntry, StackContext};
use crate::transformers::{LineColTransformer, PathTransformer, SourceMapTransformer};
use crate::variables::{remote_object_preview, VariableContainer, VariableStore};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument, warn};

/// The single thread id the adapter exposes
pub const THREAD_ID: i64 = 1;

/// Cap on script source emitted by the `.scripts` meta-command
const SCRIPT_SOURCE_CAP: usize = 100_000;

/// Async parent depth requested when `showAsyncStacks` is on
const ASYNC_STACK_DEPTH: u64 = 4;

/// Collaborators injected at construction
pub struct AdapterDependencies {
    /// Opens RDP connections
    pub connector: Arc<dyn RdpConnector>,
    /// Receives DAP events
    pub events: Arc<dyn EventSink>,
    /// Client↔target path mapping
    pub path: Arc<dyn PathTransformer>,
    /// Authored↔generated mapping
    pub source_maps: Arc<dyn SourceMapTransformer>,
    /// Line/column origin conversion
    pub line_col: Arc<dyn LineColTransformer>,
}

/// The DAP↔RDP debug adapter core
pub struct ChromeDebugAdapter {
    connector: Arc<dyn RdpConnector>,
    events: Arc<dyn EventSink>,
    path: Arc<dyn PathTransformer>,
    source_maps: Arc<dyn SourceMapTransformer>,
    line_col: Arc<dyn LineColTransformer>,

    client: RwLock<Option<Arc<dyn RdpConnection>>>,
    config: RwLock<AttachConfig>,

    scripts: ScriptRegistry,
    skip: SkipFileEngine,
    breakpoints: BreakpointEngine,
    variables: VariableStore,
    pause: PauseState,
    frames: HandleTable<FrameEntry>,
    sources: ReverseHandleTable<SourceContainer>,

    thread_name: RwLock<String>,
    dispatch: tokio::sync::Mutex<()>,
    attached: AtomicBool,
    column_bps_probed: AtomicBool,
    initialized_sent: AtomicBool,
    terminated_sent: AtomicBool,
    blackbox_warned: AtomicBool,
}

impl ChromeDebugAdapter {
    /// Create an adapter wired to its collaborators.
    pub fn new(deps: AdapterDependencies) -> Self {
        Self {
            connector: deps.connector,
            events: deps.events,
            path: deps.path,
            source_maps: deps.source_maps,
            line_col: deps.line_col,
            client: RwLock::new(None),
            config: RwLock::new(AttachConfig::default()),
            scripts: ScriptRegistry::new(),
            skip: SkipFileEngine::new(),
            breakpoints: BreakpointEngine::new(),
            variables: VariableStore::new(),
            pause: PauseState::new(),
            frames: HandleTable::new(1),
            sources: ReverseHandleTable::new(1),
            thread_name: RwLock::new("Thread 1".to_string()),
            dispatch: tokio::sync::Mutex::new(()),
            attached: AtomicBool::new(false),
            column_bps_probed: AtomicBool::new(false),
            initialized_sent: AtomicBool::new(false),
            terminated_sent: AtomicBool::new(false),
            blackbox_warned: AtomicBool::new(false),
        }
    }

    /// Override the display name of the single thread.
    pub fn set_thread_name(&self, name: impl Into<String>) {
        *self.thread_name.write() = name.into();
    }

    fn require_client(&self) -> Result<Arc<dyn RdpConnection>> {
        self.client.read().clone().ok_or(AdapterError::NotConnected)
    }

    fn source_maps_enabled(&self) -> bool {
        self.config.read().source_maps
    }

    fn smart_step_enabled(&self) -> bool {
        let config = self.config.read();
        config.smart_step && config.source_maps
    }

    // ---- Lifecycle --------------------------------------------------------

    /// Handle the `initialize` request.
    ///
    /// # Errors
    ///
    /// Rejects any `pathFormat` other than `"path"`.
    #[instrument(level = "debug", skip(self))]
    pub fn initialize(&self, args: &InitializeArguments) -> Result<Capabilities> {
        if !args.path_format.is_empty() && args.path_format != "path" {
            return Err(AdapterError::validation(format!(
                "Unsupported path format: {}",
                args.path_format
            )));
        }
        self.line_col
            .set_client_origin(args.lines_start_at1, args.columns_start_at1);
        Ok(Capabilities::default())
    }

    /// Handle the `attach` request: open the RDP connection, enable the
    /// domains and install the skip patterns and async stack depth.
    ///
    /// The embedder forwards every domain notification into
    /// [`Self::handle_event`] and socket closure into
    /// [`Self::on_socket_closed`].
    ///
    /// # Errors
    ///
    /// Fails when the connection cannot be opened or `Debugger`/`Runtime`
    /// enablement is rejected. A `Console.enable` failure is tolerated for
    /// older runtimes.
    #[instrument(level = "info", skip(self, config))]
    pub async fn attach(&self, config: AttachConfig) -> Result<()> {
        info!(
            "Attaching to {}:{}",
            config.address.as_deref().unwrap_or("127.0.0.1"),
            config.port
        );
        self.skip
            .configure(&config.skip_files, &config.skip_file_reg_exps);

        let client = self.connector.connect(&config).await?;
        *self.client.write() = Some(client.clone());
        *self.config.write() = config;

        if let Err(e) = client.call("Console.enable", json!({})).await {
            debug!("Console.enable failed (tolerated): {}", e);
        }
        client.call("Debugger.enable", json!({})).await?;
        client.call("Runtime.enable", json!({})).await?;

        let patterns = self.skip.pattern_list();
        if !patterns.is_empty() {
            if let Err(e) = client
                .call("Debugger.setBlackboxPatterns", json!({ "patterns": patterns }))
                .await
            {
                self.warn_blackbox_unsupported(&e.to_string());
            }
        }

        let depth = if self.config.read().show_async_stacks {
            ASYNC_STACK_DEPTH
        } else {
            0
        };
        if let Err(e) = client
            .call("Debugger.setAsyncCallStackDepth", json!({ "maxDepth": depth }))
            .await
        {
            warn!("setAsyncCallStackDepth failed: {}", e);
        }

        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Handle the `disconnect` request: close the socket and emit a single
    /// `terminated` event.
    pub async fn disconnect(&self, restart: bool) {
        if let Some(client) = self.client.write().take() {
            client.close().await;
        }
        self.terminate(restart);
    }

    /// The embedder's socket-close notification.
    pub async fn on_socket_closed(&self) {
        let _guard = self.dispatch.lock().await;
        self.client.write().take();
        self.terminate(false);
    }

    fn terminate(&self, restart: bool) {
        if self.terminated_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        self.attached.store(false, Ordering::SeqCst);
        self.scripts.clear();
        self.breakpoints.clear_all();
        self.pause.reset();
        self.frames.reset();
        self.variables.reset();
        self.path.clear_target_context();
        self.source_maps.clear_target_context();
        self.events.send_event(DapEvent::Terminated { restart });
    }

    fn warn_blackbox_unsupported(&self, error: &str) {
        if !self.blackbox_warned.swap(true, Ordering::SeqCst) {
            warn!("Runtime does not support blackboxing: {}", error);
        }
    }

    // ---- Runtime notification dispatch ------------------------------------

    /// Dispatch one RDP domain notification. Parse and handler failures are
    /// logged and swallowed so the session continues.
    pub async fn handle_event(&self, method: &str, params: Value) {
        let _guard = self.dispatch.lock().await;
        match method {
            "Debugger.paused" => match serde_json::from_value::<PausedEvent>(params) {
                Ok(event) => {
                    let expecting = self.pause.expected_stop();
                    self.on_paused(event, expecting).await;
                }
                Err(e) => warn!("Malformed Debugger.paused: {}", e),
            },
            "Debugger.resumed" => self.on_resumed(),
            "Debugger.scriptParsed" => match serde_json::from_value::<ScriptParsedEvent>(params) {
                Ok(event) => self.on_script_parsed(event).await,
                Err(e) => warn!("Malformed Debugger.scriptParsed: {}", e),
            },
            "Debugger.breakpointResolved" => {
                match serde_json::from_value::<BreakpointResolvedEvent>(params) {
                    Ok(event) => self.on_breakpoint_resolved(&event),
                    Err(e) => warn!("Malformed Debugger.breakpointResolved: {}", e),
                }
            }
            "Runtime.consoleAPICalled" => {
                match serde_json::from_value::<ConsoleApiCalledEvent>(params) {
                    Ok(event) => self.on_console_api_called(event),
                    Err(e) => warn!("Malformed Runtime.consoleAPICalled: {}", e),
                }
            }
            "Runtime.exceptionThrown" => {
                match serde_json::from_value::<ExceptionThrownEvent>(params) {
                    Ok(event) => self.on_exception_thrown(&event),
                    Err(e) => warn!("Malformed Runtime.exceptionThrown: {}", e),
                }
            }
            "Runtime.executionContextsCleared" => self.on_execution_contexts_cleared(),
            "Console.messageAdded" => {
                match serde_json::from_value::<ConsoleMessageAddedEvent>(params) {
                    Ok(event) => self.on_console_message_added(event),
                    Err(e) => warn!("Malformed Console.messageAdded: {}", e),
                }
            }
            other => debug!("Ignoring notification {}", other),
        }
    }

    async fn on_paused(&self, event: PausedEvent, expecting: Option<StopReason>) {
        // New pause epoch: stale frame and variable handles must not resolve.
        self.frames.reset();
        self.variables.reset();
        self.pause.set_exception(None);
        self.pause.remember_pause(event.clone(), expecting);
        self.pause.set_paused(event.clone());

        let reason = classify_pause(&event.reason, !event.hit_breakpoints.is_empty(), expecting);
        let mut text = None;

        match reason {
            StopReason::Exception | StopReason::PromiseRejection => {
                text = event
                    .data
                    .as_ref()
                    .and_then(|d| d.description.as_deref())
                    .map(first_line);
                self.pause.set_exception(event.data.clone());
            }
            StopReason::Breakpoint => {
                let user_initiated = expecting.is_some();
                if !self
                    .breakpoints
                    .register_hits(&event.hit_breakpoints, user_initiated)
                {
                    // Hit-condition miss: resume without surfacing the pause.
                    debug!("Hit-condition miss; resuming silently");
                    self.pause.clear_paused();
                    if let Ok(client) = self.require_client() {
                        if let Err(e) = client.call("Debugger.resume", json!({})).await {
                            warn!("Silent resume failed: {}", e);
                        }
                    }
                    return;
                }
            }
            _ => {}
        }

        self.pause.take_expected_stop();

        if reason == StopReason::Step && self.smart_step_enabled() {
            if let Some(frame) = event.call_frames.first() {
                let url = self
                    .scripts
                    .get_by_id(&frame.location.script_id)
                    .map(|s| s.url.clone())
                    .unwrap_or_default();
                let mapped = self.source_maps.map_to_authored(
                    &url,
                    frame.location.line_number,
                    frame.location.column_number.unwrap_or(0),
                );
                if mapped.as_ref().and_then(|m| m.source.as_ref()).is_none() {
                    let skipped = self.pause.note_smart_step();
                    debug!("SmartStep: auto-stepping through unmapped frame ({})", skipped);
                    if let Err(e) = self.step("Debugger.stepInto", StopReason::Step).await {
                        warn!("SmartStep step failed: {}", e);
                    } else {
                        return;
                    }
                }
            }
        }
        let skipped = self.pause.take_smart_step_run();
        if skipped > 0 {
            info!("SmartStep: Skipped {} steps", skipped);
        }

        // Never let the stop overtake the step response that caused it.
        self.pause.wait_step_settled(STEP_SETTLE_CEILING).await;
        self.events.send_event(DapEvent::Stopped {
            reason,
            thread_id: THREAD_ID,
            text,
        });
    }

    fn on_resumed(&self) {
        self.pause.clear_paused();
        if self.pause.take_expecting_resumed() {
            // A navigation request caused this; evaluations back off briefly.
            self.pause.arm_quiescence(QUIESCENCE_WINDOW);
        } else {
            self.events.send_event(DapEvent::Continued {
                thread_id: THREAD_ID,
            });
        }
    }

    async fn on_script_parsed(&self, event: ScriptParsedEvent) {
        let script = self.scripts.register(&event);
        self.path.script_parsed(&script.url);

        if !self.column_bps_probed.swap(true, Ordering::SeqCst) {
            let supported = self.probe_column_breakpoints(&script.script_id).await;
            self.breakpoints.set_column_breakpoints_enabled(supported);
            self.line_col.set_column_breakpoints_enabled(supported);
        }

        let authored = if self.source_maps_enabled() {
            self.source_maps
                .script_parsed(&script.url, script.source_map_url.as_deref())
                .await
        } else {
            None
        };

        // Drain parked breakpoints for every path this script answers for.
        let mut drain_keys = vec![script.url.clone()];
        if let Some(client_path) = self.path.to_client_path(&script.url) {
            drain_keys.push(client_path);
        }
        if let Some(sources) = &authored {
            for source in sources {
                drain_keys.push(source.clone());
                if let Some(client_path) = self.path.to_client_path(source) {
                    drain_keys.push(client_path);
                }
            }
        }
        for key in drain_keys {
            if let Some(pending) = self.breakpoints.take_pending(&key) {
                self.drain_pending(pending).await;
            }
        }

        self.submit_blackboxed_ranges(&script.script_id, &script.url).await;

        if !self.initialized_sent.swap(true, Ordering::SeqCst) {
            self.events.send_event(DapEvent::Initialized);
        }
    }

    /// One-shot probe: does this runtime answer `getPossibleBreakpoints`?
    async fn probe_column_breakpoints(&self, script_id: &str) -> bool {
        let Ok(client) = self.require_client() else {
            return false;
        };
        let params = json!({
            "start": { "scriptId": script_id, "lineNumber": 0, "columnNumber": 0 },
            "end": { "scriptId": script_id, "lineNumber": 1, "columnNumber": 0 },
            "restrictToFunction": false,
        });
        match client.call("Debugger.getPossibleBreakpoints", params).await {
            Ok(_) => {
                debug!("Column breakpoints supported");
                true
            }
            Err(e) => {
                debug!("Column breakpoints unsupported: {}", e);
                false
            }
        }
    }

    async fn drain_pending(&self, pending: PendingBreakpoint) {
        debug!(
            "Draining {} parked breakpoints (request seq {})",
            pending.ids.len(),
            pending.request_seq
        );
        let ids = pending.ids.clone();
        match self
            .set_breakpoints(pending.args, pending.request_seq, Some(ids))
            .await
        {
            Ok(body) => {
                for breakpoint in body.breakpoints {
                    if breakpoint.verified {
                        self.events.send_event(DapEvent::BreakpointChanged {
                            reason: "new".to_string(),
                            breakpoint,
                        });
                    }
                }
            }
            Err(e) => warn!("Draining parked breakpoints failed: {}", e),
        }
    }

    async fn submit_blackboxed_ranges(&self, script_id: &str, url: &str) {
        if !self.skip.is_active() {
            return;
        }
        let Ok(client) = self.require_client() else {
            return;
        };

        let parent_path = self.path.to_client_path(url).unwrap_or_else(|| url.to_string());
        let parent_skipped = self.skip.is_skipped(&parent_path);
        let details = self.source_maps.all_source_path_details(url);
        let positions: Vec<Value> = self
            .skip
            .blackboxed_ranges(parent_skipped, &details)
            .into_iter()
            .map(|(line, column)| json!({ "lineNumber": line, "columnNumber": column }))
            .collect();

        // Clear first; setting over stale ranges trips a runtime bug.
        for payload in [json!([]), Value::Array(positions)] {
            if let Err(e) = client
                .call(
                    "Debugger.setBlackboxedRanges",
                    json!({ "scriptId": script_id, "positions": payload }),
                )
                .await
            {
                self.warn_blackbox_unsupported(&e.to_string());
                return;
            }
        }
    }

    fn on_breakpoint_resolved(&self, event: &BreakpointResolvedEvent) {
        let url = self
            .scripts
            .get_by_id(&event.location.script_id)
            .map(|s| s.url.clone())
            .unwrap_or_default();
        let dap_id = self.breakpoints.on_resolved(event, &url);

        let (line, column) = self.to_client_position(
            &url,
            event.location.line_number,
            event.location.column_number.unwrap_or(0),
        );
        self.events.send_event(DapEvent::BreakpointChanged {
            reason: "new".to_string(),
            breakpoint: Breakpoint {
                id: Some(dap_id),
                verified: true,
                message: None,
                line: Some(line),
                column: Some(column),
                source: None,
            },
        });
    }

    fn on_console_api_called(&self, event: ConsoleApiCalledEvent) {
        if event.args.is_empty() {
            return;
        }
        let category = match event.call_type.as_str() {
            "error" | "assert" => OutputCategory::Stderr,
            _ => OutputCategory::Stdout,
        };

        let is_single_primitive =
            event.args.len() == 1 && event.args[0].object_id.is_none();
        if is_single_primitive {
            let output = format!("{}\n", remote_object_preview(&event.args[0]));
            self.events.send_event(DapEvent::Output {
                category,
                output,
                variables_reference: None,
            });
            return;
        }

        let previews: Vec<String> = event.args.iter().map(remote_object_preview).collect();
        let output = format!("{}\n", previews.join(" "));
        let reference = self
            .variables
            .create(VariableContainer::LoggedObjects { args: event.args });
        self.events.send_event(DapEvent::Output {
            category,
            output,
            variables_reference: Some(reference),
        });
    }

    fn on_console_message_added(&self, event: ConsoleMessageAddedEvent) {
        // Legacy runtimes; remap onto the modern notification and delegate.
        let message = event.message;
        let call_type = match message.level.as_str() {
            "error" => "error",
            "warning" => "warning",
            _ => "log",
        };
        let args = message.parameters.unwrap_or_else(|| {
            vec![RemoteObject {
                object_type: "string".to_string(),
                value: Some(Value::String(message.text.clone())),
                ..RemoteObject::default()
            }]
        });
        self.on_console_api_called(ConsoleApiCalledEvent {
            call_type: call_type.to_string(),
            args,
            stack_trace: None,
        });
    }

    fn on_exception_thrown(&self, event: &ExceptionThrownEvent) {
        let description = event
            .exception_details
            .exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| event.exception_details.text.clone());
        let output = format!("{}\n", self.map_formatted_exception(&description));
        self.events.send_event(DapEvent::Output {
            category: OutputCategory::Stderr,
            output,
            variables_reference: None,
        });
    }

    fn on_execution_contexts_cleared(&self) {
        info!("Execution contexts cleared; dropping target state");
        self.scripts.clear();
        self.breakpoints.clear_all();
        self.frames.reset();
        self.variables.reset();
        self.pause.clear_paused();
        self.pause.set_exception(None);
        self.path.clear_target_context();
        self.source_maps.clear_target_context();
    }

    // ---- Breakpoints -------------------------------------------------------

    /// Handle the `setBreakpoints` request. `ids` carries previously
    /// returned client ids when a parked request is drained.
    ///
    /// # Errors
    ///
    /// Fails on an unknown `sourceReference` or when no client is
    /// connected for a resolvable script.
    #[instrument(level = "debug", skip(self, args), fields(path = ?args.source.path))]
    pub async fn set_breakpoints(
        &self,
        args: SetBreakpointsArguments,
        request_seq: i64,
        ids: Option<Vec<i64>>,
    ) -> Result<SetBreakpointsResponseBody> {
        let (target_url, pending_key) = self.resolve_breakpoint_target(&args)?;

        let Some(target_url) = target_url else {
            // Not resolvable yet; park the request and answer unverified.
            let ids = ids.unwrap_or_else(|| {
                args.breakpoints
                    .iter()
                    .map(|_| self.breakpoints.allocate_id())
                    .collect()
            });
            let breakpoints = ids
                .iter()
                .map(|&id| Breakpoint {
                    id: Some(id),
                    verified: false,
                    message: None,
                    line: None,
                    column: None,
                    source: None,
                })
                .collect();
            if let Some(key) = pending_key {
                self.breakpoints.enqueue_pending(
                    key,
                    PendingBreakpoint {
                        args,
                        ids,
                        request_seq,
                    },
                );
            }
            return Ok(SetBreakpointsResponseBody { breakpoints });
        };

        if let Some(key) = &pending_key {
            // A committed cycle supersedes any parked request for the source.
            self.breakpoints.take_pending(key);
        }

        let client = self.require_client()?;
        let script = self.scripts.get_by_url(&target_url);
        let authored_path = args.source.path.clone();

        let requests: Vec<BreakpointRequest> = args
            .breakpoints
            .iter()
            .map(|bp| {
                let line = self.line_col.line_to_debugger(bp.line);
                let column = bp.column.map(|c| self.line_col.column_to_debugger(c));
                let (line, column) = match authored_path
                    .as_deref()
                    .filter(|_| self.source_maps_enabled())
                    .and_then(|path| {
                        self.source_maps
                            .map_to_generated(path, line, column.unwrap_or(0))
                    }) {
                    Some(generated) => (generated.line, Some(generated.column)),
                    None => (line, column),
                };
                BreakpointRequest {
                    line,
                    column,
                    condition: bp.condition.clone(),
                    hit_condition: bp.hit_condition.clone(),
                }
            })
            .collect();

        let outcomes = self
            .breakpoints
            .commit(client, &target_url, script, &requests, ids.as_deref())
            .await;

        let breakpoints = outcomes
            .into_iter()
            .map(|outcome| {
                let (line, column) = match (outcome.line, outcome.column) {
                    (Some(line), column) => {
                        let (l, c) =
                            self.to_client_position(&target_url, line, column.unwrap_or(0));
                        (Some(l), Some(c))
                    }
                    _ => (None, None),
                };
                Breakpoint {
                    id: outcome.dap_id,
                    verified: outcome.verified,
                    message: outcome.message,
                    line,
                    column,
                    source: Some(args.source.clone()),
                }
            })
            .collect();

        Ok(SetBreakpointsResponseBody { breakpoints })
    }

    /// Resolve the target script URL for a set-breakpoints request.
    /// Returns `(None, pending_key)` when nothing is loaded yet.
    fn resolve_breakpoint_target(
        &self,
        args: &SetBreakpointsArguments,
    ) -> Result<(Option<String>, Option<String>)> {
        if let Some(reference) = args.source.source_reference.filter(|&r| r > 0) {
            let container = self
                .sources
                .get(reference)
                .ok_or(AdapterError::InvalidSourceReference { reference })?;
            let url = container
                .script_id
                .as_ref()
                .and_then(|id| self.scripts.get_by_id(id))
                .map(|s| s.url.clone())
                .or_else(|| args.source.path.clone());
            return Ok((url, None));
        }

        let Some(client_path) = args.source.path.clone() else {
            return Err(AdapterError::unresolvable("Source has no path or reference"));
        };

        let Some(target_path) = self.path.to_target_url(&client_path) else {
            return Ok((None, Some(client_path)));
        };

        let generated = if self.source_maps_enabled() {
            self.source_maps.generated_path_from_authored(&target_path)
        } else {
            None
        };

        let url = generated.unwrap_or(target_path);
        if self.scripts.get_by_url(&url).is_some() {
            Ok((Some(url), Some(client_path)))
        } else {
            Ok((None, Some(client_path)))
        }
    }

    // ---- Stack, scopes, variables -----------------------------------------

    /// Handle the `threads` request.
    pub fn threads(&self) -> Vec<Thread> {
        vec![Thread {
            id: THREAD_ID,
            name: self.thread_name.read().clone(),
        }]
    }

    /// Handle the `stackTrace` request.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not paused or the thread id is wrong.
    #[instrument(level = "debug", skip(self))]
    pub fn stack_trace(&self, args: &StackTraceArguments) -> Result<StackTraceResponseBody> {
        if args.thread_id != THREAD_ID {
            return Err(AdapterError::InvalidThread { id: args.thread_id });
        }
        let event = self.pause.current().ok_or(AdapterError::NoCallStack)?;

        let context = StackContext {
            frames: &self.frames,
            sources: &self.sources,
            scripts: &self.scripts,
            skip: &self.skip,
            path: self.path.as_ref(),
            source_maps: self.source_maps.as_ref(),
            line_col: self.line_col.as_ref(),
            source_maps_enabled: self.source_maps_enabled(),
            smart_step: self.config.read().smart_step,
        };
        let all = context.assemble(&event);
        let (stack_frames, total_frames) = slice_frames(all, args.start_frame, args.levels);
        Ok(StackTraceResponseBody {
            stack_frames,
            total_frames,
        })
    }

    /// Handle the `scopes` request.
    ///
    /// # Errors
    ///
    /// Fails for handles from a previous pause epoch or non-executable
    /// frames.
    pub fn scopes(&self, frame_id: i64) -> Result<ScopesResponseBody> {
        let entry = self
            .frames
            .get(frame_id)
            .ok_or(AdapterError::UnknownHandle { handle: frame_id })?;
        let FrameEntry::Live(call_frame) = entry else {
            return Err(AdapterError::validation("Frame has no scopes"));
        };
        let scopes = crate::stack::build_scopes(
            &self.variables,
            self.line_col.as_ref(),
            &call_frame,
            self.pause.exception(),
        );
        Ok(ScopesResponseBody { scopes })
    }

    /// Handle the `variables` request. Stale or unknown handles yield an
    /// empty list, matching the pause-epoch isolation the tables promise.
    pub async fn variables(&self, args: &VariablesArguments) -> Result<VariablesResponseBody> {
        let Some(container) = self.variables.get(args.variables_reference) else {
            return Ok(VariablesResponseBody {
                variables: Vec::new(),
            });
        };
        let client = self.require_client()?;
        let variables = self
            .variables
            .expand(
                &client,
                &container,
                args.filter.as_deref(),
                args.start,
                args.count,
            )
            .await;
        Ok(VariablesResponseBody { variables })
    }

    /// Handle the `setVariable` request.
    ///
    /// # Errors
    ///
    /// Fails for unknown handles and runtime-rejected assignments.
    pub async fn set_variable(
        &self,
        args: &SetVariableArguments,
    ) -> Result<SetVariableResponseBody> {
        let container = self
            .variables
            .get(args.variables_reference)
            .ok_or(AdapterError::UnknownHandle {
                handle: args.variables_reference,
            })?;
        let client = self.require_client()?;
        let value = self
            .variables
            .set_value(&client, &container, &args.name, &args.value)
            .await?;
        Ok(SetVariableResponseBody { value })
    }

    // ---- Execution control -------------------------------------------------

    async fn step(&self, method: &str, expected: StopReason) -> Result<()> {
        let client = self.require_client()?;
        self.pause.expect_stop(expected);
        self.pause.expect_resumed();
        self.pause.begin_step();
        let result = client.call(method, json!({})).await;
        self.pause.end_step();
        result?;
        Ok(())
    }

    /// Handle `next`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn next(&self) -> Result<()> {
        self.step("Debugger.stepOver", StopReason::Step).await
    }

    /// Handle `stepIn`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn step_in(&self) -> Result<()> {
        self.step("Debugger.stepInto", StopReason::Step).await
    }

    /// Handle `stepOut`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn step_out(&self) -> Result<()> {
        self.step("Debugger.stepOut", StopReason::Step).await
    }

    /// Handle `stepBack` (time-travel runtimes).
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn step_back(&self) -> Result<()> {
        self.step("TimeTravel.stepBack", StopReason::Step).await
    }

    /// Handle `reverseContinue` (time-travel runtimes).
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn reverse_continue(&self) -> Result<()> {
        let client = self.require_client()?;
        self.pause.take_expected_stop();
        self.pause.expect_resumed();
        self.pause.begin_step();
        let result = client.call("TimeTravel.reverse", json!({})).await;
        self.pause.end_step();
        result?;
        Ok(())
    }

    /// Handle `continue`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn continue_request(&self) -> Result<()> {
        let client = self.require_client()?;
        self.pause.take_expected_stop();
        self.pause.expect_resumed();
        self.pause.begin_step();
        let result = client.call("Debugger.resume", json!({})).await;
        self.pause.end_step();
        result?;
        Ok(())
    }

    /// Handle `pause`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn pause_request(&self) -> Result<()> {
        let client = self.require_client()?;
        self.pause.expect_stop(StopReason::Pause);
        self.pause.begin_step();
        let result = client.call("Debugger.pause", json!({})).await;
        self.pause.end_step();
        result?;
        Ok(())
    }

    /// Handle `restartFrame`: restart then step into the frame entry.
    ///
    /// # Errors
    ///
    /// Fails for stale frame handles and non-executable frames.
    pub async fn restart_frame(&self, args: &RestartFrameArguments) -> Result<()> {
        let entry = self
            .frames
            .get(args.frame_id)
            .ok_or(AdapterError::UnknownHandle {
                handle: args.frame_id,
            })?;
        let FrameEntry::Live(call_frame) = entry else {
            return Err(AdapterError::validation("Frame cannot be restarted"));
        };
        let client = self.require_client()?;
        client
            .call(
                "Debugger.restartFrame",
                json!({ "callFrameId": call_frame.call_frame_id }),
            )
            .await?;
        self.step("Debugger.stepInto", StopReason::FrameEntry).await
    }

    /// Handle `configurationDone`.
    pub fn configuration_done(&self) {}

    /// Handle `setExceptionBreakpoints`.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected or rejects the command.
    pub async fn set_exception_breakpoints(
        &self,
        args: &SetExceptionBreakpointsArguments,
    ) -> Result<()> {
        let state = if args.filters.iter().any(|f| f == "all") {
            "all"
        } else if args.filters.iter().any(|f| f == "uncaught") {
            "uncaught"
        } else {
            "none"
        };
        let client = self.require_client()?;
        client
            .call("Debugger.setPauseOnExceptions", json!({ "state": state }))
            .await?;
        Ok(())
    }

    // ---- Skip files --------------------------------------------------------

    /// Handle `toggleSkipFileStatus`: flip the file's classification,
    /// refresh the runtime's blackboxed ranges and re-fire the last pause
    /// so the client re-renders its deemphasis hints.
    ///
    /// # Errors
    ///
    /// Fails when the file is not in the current stack or is a generated
    /// meta-script.
    #[instrument(level = "debug", skip(self))]
    pub async fn toggle_skip_file_status(
        &self,
        args: &ToggleSkipFileStatusArguments,
    ) -> Result<()> {
        let path = match (&args.path, args.source_reference) {
            (Some(path), _) => path.clone(),
            (None, Some(reference)) => {
                let container = self
                    .sources
                    .get(reference)
                    .ok_or(AdapterError::InvalidSourceReference { reference })?;
                container
                    .mapped_path
                    .clone()
                    .or_else(|| {
                        container
                            .script_id
                            .as_ref()
                            .and_then(|id| self.scripts.get_by_id(id))
                            .map(|s| s.url.clone())
                    })
                    .ok_or_else(|| {
                        AdapterError::validation("Source reference has no path to toggle")
                    })?
            }
            (None, None) => {
                return Err(AdapterError::validation(
                    "toggleSkipFileStatus requires a path or source reference",
                ))
            }
        };

        if !self.path_in_current_stack(&path) {
            return Err(AdapterError::validation(format!(
                "Can't toggle skipFiles for {path}: not in the current stack"
            )));
        }

        // A generated script that carries a map is only a container for its
        // authored sources; toggling it would be ambiguous.
        if self.source_maps_enabled() {
            let generated = self
                .source_maps
                .generated_path_from_authored(&path)
                .unwrap_or_else(|| path.clone());
            if generated == path {
                if let Some(script) = self
                    .path
                    .to_target_url(&path)
                    .and_then(|url| self.scripts.get_by_url(&url))
                {
                    if script.source_map_url.is_some() {
                        return Err(AdapterError::validation(format!(
                            "Can't toggle skipFiles for {path}: it is a source-mapped script"
                        )));
                    }
                }
            }
        }

        self.skip.toggle(&path);

        let generated = self
            .source_maps
            .generated_path_from_authored(&path)
            .unwrap_or_else(|| path.clone());
        if let Some(script) = self
            .path
            .to_target_url(&generated)
            .and_then(|url| self.scripts.get_by_url(&url))
        {
            self.submit_blackboxed_ranges(&script.script_id, &script.url)
                .await;
        }

        if let Some(last) = self.pause.last_pause() {
            self.on_paused(last.event, last.expecting).await;
        }
        Ok(())
    }

    fn path_in_current_stack(&self, path: &str) -> bool {
        let Some(event) = self.pause.current() else {
            return false;
        };
        event.call_frames.iter().any(|frame| {
            let url = self
                .scripts
                .get_by_id(&frame.location.script_id)
                .map(|s| s.url.clone())
                .unwrap_or_default();
            if url == path || self.path.to_client_path(&url).as_deref() == Some(path) {
                return true;
            }
            if self.source_maps_enabled() {
                if let Some(mapped) = self.source_maps.map_to_authored(
                    &url,
                    frame.location.line_number,
                    frame.location.column_number.unwrap_or(0),
                ) {
                    if mapped.source.as_deref() == Some(path) {
                        return true;
                    }
                    if let Some(client) =
                        mapped.source.as_deref().and_then(|s| self.path.to_client_path(s))
                    {
                        return client == path;
                    }
                }
            }
            false
        })
    }

    // ---- Sources -----------------------------------------------------------

    /// Handle the `source` request.
    ///
    /// # Errors
    ///
    /// Fails for unknown references and unfetchable scripts.
    pub async fn source(&self, args: &SourceArguments) -> Result<SourceResponseBody> {
        if let Some(reference) = args.source_reference.filter(|&r| r > 0) {
            let container = self
                .sources
                .get(reference)
                .ok_or(AdapterError::InvalidSourceReference { reference })?;
            if let Some(contents) = container.contents {
                return Ok(SourceResponseBody { content: contents });
            }
            let script_id = container.script_id.ok_or_else(|| {
                AdapterError::validation("Source reference has no backing script")
            })?;
            let content = self.fetch_script_source(&script_id).await?;
            return Ok(SourceResponseBody { content });
        }

        let path = args
            .source
            .as_ref()
            .and_then(|s| s.path.clone())
            .ok_or_else(|| AdapterError::validation("source requires a reference or path"))?;
        let url = self
            .path
            .to_target_url(&path)
            .unwrap_or_else(|| path.clone());
        let script = self
            .scripts
            .get_by_url(&url)
            .or_else(|| self.scripts.get_by_url(&url_encode_path(&url)))
            .ok_or_else(|| AdapterError::validation(format!("Unknown source: {path}")))?;
        let content = self.fetch_script_source(&script.script_id).await?;
        Ok(SourceResponseBody { content })
    }

    async fn fetch_script_source(&self, script_id: &str) -> Result<String> {
        let client = self.require_client()?;
        let result = client
            .call("Debugger.getScriptSource", json!({ "scriptId": script_id }))
            .await?;
        Ok(result
            .get("scriptSource")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    // ---- Evaluation --------------------------------------------------------

    /// Handle the `evaluate` request.
    ///
    /// # Errors
    ///
    /// Fails when the runtime reports an exception, with the extracted
    /// text (remapped to a canned message outside the REPL).
    #[instrument(level = "debug", skip(self, args), fields(context = ?args.context))]
    pub async fn evaluate(&self, args: &EvaluateArguments) -> Result<EvaluateResponseBody> {
        if args.expression.starts_with(".scripts") {
            self.scripts_meta_command(args.expression[".scripts".len()..].trim())
                .await?;
            return Ok(EvaluateResponseBody {
                result: String::new(),
                variables_reference: 0,
                named_variables: None,
                indexed_variables: None,
            });
        }

        // A step may have just resumed the runtime; let it settle first.
        self.pause.wait_quiescence().await;

        let client = self.require_client()?;
        let call_frame_id = args.frame_id.and_then(|id| match self.frames.get(id) {
            Some(FrameEntry::Live(frame)) => Some(frame.call_frame_id),
            _ => None,
        });
        let include_command_line_api = args.context.as_deref() == Some("repl");

        let result = match call_frame_id {
            Some(call_frame_id) => {
                client
                    .call(
                        "Debugger.evaluateOnCallFrame",
                        json!({
                            "callFrameId": call_frame_id,
                            "expression": args.expression,
                            "silent": true,
                            "generatePreview": true,
                            "includeCommandLineAPI": include_command_line_api,
                        }),
                    )
                    .await?
            }
            None => {
                client
                    .call(
                        "Runtime.evaluate",
                        json!({
                            "expression": args.expression,
                            "silent": true,
                            "generatePreview": true,
                            "includeCommandLineAPI": include_command_line_api,
                        }),
                    )
                    .await?
            }
        };

        let result: EvaluateResult = serde_json::from_value(result)?;
        if let Some(details) = result.exception_details {
            let text = details.error_text();
            let message = if args.context.as_deref() != Some("repl")
                && (text.starts_with("ReferenceError: ") || text.starts_with("TypeError: "))
            {
                "not available".to_string()
            } else {
                text
            };
            return Err(AdapterError::evaluation(message));
        }

        let variable = self
            .variables
            .create_variable(&client, "", &result.result, None)
            .await;
        Ok(EvaluateResponseBody {
            result: variable.value,
            variables_reference: variable.variables_reference,
            named_variables: variable.named_variables,
            indexed_variables: variable.indexed_variables,
        })
    }

    /// The `.scripts` meta-command: list every known script, or emit one
    /// script's source.
    async fn scripts_meta_command(&self, argument: &str) -> Result<()> {
        let output = if argument.is_empty() {
            let mut lines = Vec::new();
            for script in self.scripts.all_by_url() {
                let client_path = self
                    .path
                    .to_client_path(&script.url)
                    .unwrap_or_else(|| script.url.clone());
                lines.push(format!("› {} ({})", script.url, client_path));
                for authored in self.source_maps.all_sources(&script.url) {
                    lines.push(format!("    - {authored}"));
                }
            }
            format!("{}\n", lines.join("\n"))
        } else {
            let script = self
                .scripts
                .get_by_url(argument)
                .or_else(|| {
                    self.scripts
                        .all_by_url()
                        .into_iter()
                        .find(|s| s.url.ends_with(argument))
                })
                .ok_or_else(|| AdapterError::validation(format!("Unknown script: {argument}")))?;
            let mut content = self.fetch_script_source(&script.script_id).await?;
            if content.len() > SCRIPT_SOURCE_CAP {
                let mut cap = SCRIPT_SOURCE_CAP;
                while !content.is_char_boundary(cap) {
                    cap -= 1;
                }
                content.truncate(cap);
                content.push_str("[⋯]");
            }
            format!("{content}\n")
        };

        self.events.send_event(DapEvent::Output {
            category: OutputCategory::Stdout,
            output,
            variables_reference: None,
        });
        Ok(())
    }

    /// Handle the `completions` request.
    ///
    /// # Errors
    ///
    /// Fails when the runtime is not connected.
    pub async fn completions(
        &self,
        args: &CompletionsArguments,
    ) -> Result<CompletionsResponseBody> {
        let caret = (args.column.max(1) - 1) as usize;
        let prefix: String = args.text.chars().take(caret).collect();
        let expression = prefix.rfind('.').map(|dot| prefix[..dot].to_string());

        let client = self.require_client()?;
        let mut names: Vec<String> = Vec::new();

        match expression {
            Some(expression) if !expression.is_empty() => {
                let walk = format!(
                    "(function(x){{var a=[];for(var o=x;o;o=o.__proto__)a.push(Object.getOwnPropertyNames(o));return a}})({expression})"
                );
                let call_frame_id = args.frame_id.and_then(|id| match self.frames.get(id) {
                    Some(FrameEntry::Live(frame)) => Some(frame.call_frame_id),
                    _ => None,
                });
                let result = match call_frame_id {
                    Some(call_frame_id) => {
                        client
                            .call(
                                "Debugger.evaluateOnCallFrame",
                                json!({
                                    "callFrameId": call_frame_id,
                                    "expression": walk,
                                    "silent": true,
                                    "returnByValue": true,
                                }),
                            )
                            .await
                    }
                    None => {
                        client
                            .call(
                                "Runtime.evaluate",
                                json!({
                                    "expression": walk,
                                    "silent": true,
                                    "returnByValue": true,
                                }),
                            )
                            .await
                    }
                };
                if let Ok(value) = result {
                    if let Ok(result) = serde_json::from_value::<EvaluateResult>(value) {
                        if let Some(Value::Array(levels)) = result.result.value {
                            for level in levels {
                                if let Value::Array(level_names) = level {
                                    names.extend(
                                        level_names
                                            .into_iter()
                                            .filter_map(|n| n.as_str().map(str::to_string)),
                                    );
                                }
                            }
                        }
                    }
                }
            }
            _ => {
                // No expression before the dot: union the member names of
                // every scope of the active frame.
                if let Some(FrameEntry::Live(frame)) =
                    args.frame_id.and_then(|id| self.frames.get(id))
                {
                    for (index, scope) in frame.scope_chain.iter().enumerate() {
                        let Some(object_id) = &scope.object.object_id else {
                            continue;
                        };
                        let container = VariableContainer::Scope {
                            call_frame_id: frame.call_frame_id.clone(),
                            scope_index: index,
                            object_id: object_id.clone(),
                            this_obj: None,
                            return_value: None,
                        };
                        for variable in self
                            .variables
                            .expand(&client, &container, None, None, None)
                            .await
                        {
                            names.push(variable.name);
                        }
                    }
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        let targets = names
            .into_iter()
            .filter(|name| !crate::variables::is_indexed_name(name))
            .filter(|name| seen.insert(name.clone()))
            .map(|label| CompletionItem {
                label,
                item_type: "property".to_string(),
            })
            .collect();
        Ok(CompletionsResponseBody { targets })
    }

    /// Handle the `exceptionInfo` request.
    ///
    /// # Errors
    ///
    /// Fails for a wrong thread id or when no exception is current.
    pub fn exception_info(&self, thread_id: i64) -> Result<ExceptionInfoResponseBody> {
        if thread_id != THREAD_ID {
            return Err(AdapterError::InvalidThread { id: thread_id });
        }
        let exception = self
            .pause
            .exception()
            .ok_or_else(|| AdapterError::validation("No current exception"))?;
        let stack_trace = exception
            .description
            .as_deref()
            .map(|d| self.map_formatted_exception(d));
        Ok(ExceptionInfoResponseBody {
            exception_id: exception
                .class_name
                .clone()
                .unwrap_or_else(|| "Error".to_string()),
            break_mode: "unhandled".to_string(),
            details: ExceptionDetailsBody { stack_trace },
        })
    }

    /// Remap the `at file:line:col` lines of a formatted exception stack to
    /// authored client locations. Lines that don't match pass through
    /// verbatim.
    pub fn map_formatted_exception(&self, text: &str) -> String {
        static LINE_PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = LINE_PATTERN.get_or_init(|| {
            Regex::new(r"^\s+at (.*?)\s*\(?([^ ]+):(\d+):(\d+)\)?$").expect("valid pattern")
        });

        text.lines()
            .map(|line| {
                let Some(caps) = pattern.captures(line) else {
                    return line.to_string();
                };
                let file = caps.get(2).map_or("", |m| m.as_str());
                let line_1based: u64 = caps[3].parse().unwrap_or(1);
                let column: u64 = caps[4].parse().unwrap_or(0);

                let mapped = self
                    .source_maps
                    .map_to_authored(file, line_1based.saturating_sub(1), column);
                let (path, mapped_line, mapped_column) = match mapped {
                    Some(m) if m.source.is_some() => {
                        let source = m.source.unwrap_or_default();
                        (source, self.line_col.line_to_client(m.line), m.column)
                    }
                    _ => return line.to_string(),
                };
                let client_path = self.path.to_client_path(&path).unwrap_or(path);

                let original = format!("{}:{}:{}", file, &caps[3], &caps[4]);
                let replacement = format!("{client_path}:{mapped_line}:{mapped_column}");
                line.replace(&original, &replacement)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ---- Helpers -----------------------------------------------------------

    /// Translate a generated runtime position into authored client numbers.
    fn to_client_position(&self, url: &str, line: u64, column: u64) -> (u64, u64) {
        let (line, column) = if self.source_maps_enabled() {
            match self.source_maps.map_to_authored(url, line, column) {
                Some(mapped) if mapped.source.is_some() => (mapped.line, mapped.column),
                _ => (line, column),
            }
        } else {
            (line, column)
        };
        (
            self.line_col.line_to_client(line),
            self.line_col.column_to_client(column),
        )
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

/// Percent-encode the characters the registry's URL normalization encodes.
fn url_encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b' ' => encoded.push_str("%20"),
            b'#' => encoded.push_str("%23"),
            b'?' => encoded.push_str("%3F"),
            _ => encoded.push(byte as char),
        }
    }
    encoded
}

//! Breakpoint engine
//!
//! Pending vs committed bookkeeping, URL-regex vs scriptId binding,
//! column probing, hit-condition predicates and the per-target serialized
//! set/clear queue. Requests and outcomes use the runtime's 0-based
//! numbering; origin conversion and source-map back-translation happen at
//! the request surface.

use crate::dap::types::SetBreakpointsArguments;
use crate::handles::ReverseHandleTable;
use crate::rdp::client::{RdpConnection, RdpError};
use crate::rdp::types::{
    BreakLocation, BreakpointResolvedEvent, Location, SetBreakpointByUrlResult,
    SetBreakpointResult,
};
use crate::scripts::{is_vm_url, Script};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a queued set-breakpoints cycle may run before it is logged as
/// slow. Expiry never cancels the work; the true result is still returned.
const SET_BREAKPOINTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime error text meaning the breakpoint is already bound where we
/// asked; treated as success at the requested location.
const ALREADY_EXISTS_ERROR: &str = "Breakpoint at specified location already exists.";

/// Hit-condition comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitConditionOp {
    Gt,
    Ge,
    Eq,
    Lt,
    Le,
    Mod,
}

/// A compiled hit-condition predicate plus its counter
#[derive(Debug, Clone)]
pub struct HitConditionBreakpoint {
    op: HitConditionOp,
    operand: u64,
    num_hits: u64,
}

impl HitConditionBreakpoint {
    /// Compile a hit-condition string. Grammar:
    /// `^(>|>=|=|<|<=|%)?\s*([0-9]+)$`, default operator `>=`, `=` compares
    /// for equality, `%` pauses on every Nth hit.
    pub fn parse(raw: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"^(>|>=|=|<|<=|%)?\s*([0-9]+)$").expect("valid pattern"));
        let caps = pattern.captures(raw.trim())?;
        let op = match caps.get(1).map(|m| m.as_str()) {
            None => HitConditionOp::Ge,
            Some(">") => HitConditionOp::Gt,
            Some(">=") => HitConditionOp::Ge,
            Some("=") => HitConditionOp::Eq,
            Some("<") => HitConditionOp::Lt,
            Some("<=") => HitConditionOp::Le,
            Some("%") => HitConditionOp::Mod,
            Some(_) => return None,
        };
        let operand = caps[2].parse().ok()?;
        Some(Self {
            op,
            operand,
            num_hits: 0,
        })
    }

    /// Whether the predicate holds for the current counter.
    pub fn should_pause(&self) -> bool {
        let n = self.num_hits;
        let x = self.operand;
        match self.op {
            HitConditionOp::Gt => n > x,
            HitConditionOp::Ge => n >= x,
            HitConditionOp::Eq => n == x,
            HitConditionOp::Lt => n < x,
            HitConditionOp::Le => n <= x,
            HitConditionOp::Mod => x != 0 && n % x == 0,
        }
    }
}

/// A breakpoint request in runtime numbering
#[derive(Debug, Clone)]
pub struct BreakpointRequest {
    /// 0-based generated line
    pub line: u64,
    /// 0-based generated column
    pub column: Option<u64>,
    /// Condition expression, passed through unchanged
    pub condition: Option<String>,
    /// Raw hit-condition string
    pub hit_condition: Option<String>,
}

/// Outcome of one requested breakpoint, in runtime numbering
#[derive(Debug, Clone)]
pub struct BreakpointOutcome {
    /// Stable client-visible id
    pub dap_id: Option<i64>,
    /// Whether the runtime bound the breakpoint
    pub verified: bool,
    /// Failure detail
    pub message: Option<String>,
    /// Bound 0-based generated line
    pub line: Option<u64>,
    /// Bound 0-based generated column
    pub column: Option<u64>,
}

/// A set-breakpoints request parked until a matching script is observed
#[derive(Debug, Clone)]
pub struct PendingBreakpoint {
    /// The original request arguments
    pub args: SetBreakpointsArguments,
    /// Client ids already returned for these breakpoints
    pub ids: Vec<i64>,
    /// Sequence number of the parked request
    pub request_seq: i64,
}

/// Breakpoint state: pending and committed tables, hit conditions and the
/// per-target serialization queue.
pub struct BreakpointEngine {
    committed: RwLock<HashMap<String, Vec<String>>>,
    pending: RwLock<HashMap<String, PendingBreakpoint>>,
    hit_conditions: RwLock<HashMap<String, HitConditionBreakpoint>>,
    ids: ReverseHandleTable<String>,
    queue: tokio::sync::Mutex<()>,
    column_breakpoints: AtomicBool,
}

impl Default for BreakpointEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            hit_conditions: RwLock::new(HashMap::new()),
            ids: ReverseHandleTable::new(1),
            queue: tokio::sync::Mutex::new(()),
            column_breakpoints: AtomicBool::new(false),
        }
    }

    /// Record whether the runtime honors column breakpoints.
    pub fn set_column_breakpoints_enabled(&self, enabled: bool) {
        self.column_breakpoints.store(enabled, Ordering::Relaxed);
    }

    /// Allocate a client id not yet bound to a runtime breakpoint.
    pub fn allocate_id(&self) -> i64 {
        self.ids.allocate()
    }

    /// The stable client id for a runtime breakpoint id.
    pub fn dap_id_for(&self, runtime_id: &str) -> i64 {
        self.ids.handle_for(runtime_id.to_string())
    }

    /// Park a request until a matching script shows up.
    pub fn enqueue_pending(&self, source_url: String, pending: PendingBreakpoint) {
        debug!("Parking breakpoints for unresolved source {}", source_url);
        self.pending.write().insert(source_url, pending);
    }

    /// Take the parked request for a source, if any.
    pub fn take_pending(&self, source_url: &str) -> Option<PendingBreakpoint> {
        self.pending.write().remove(source_url)
    }

    /// Runtime ids currently committed for a URL.
    pub fn committed_ids(&self, url: &str) -> Vec<String> {
        self.committed.read().get(url).cloned().unwrap_or_default()
    }

    /// Increment hit counters for a pause's hit breakpoints. Returns
    /// `false` when the pause should be silently resumed: the user did not
    /// just step or pause, and some hit-condition predicate rejected its
    /// counter.
    pub fn register_hits(&self, hit_ids: &[String], user_initiated: bool) -> bool {
        let mut table = self.hit_conditions.write();
        let mut pause = true;
        for id in hit_ids {
            if let Some(hit_condition) = table.get_mut(id) {
                hit_condition.num_hits += 1;
                if !user_initiated && !hit_condition.should_pause() {
                    pause = false;
                }
            }
        }
        pause
    }

    /// Handle `Debugger.breakpointResolved`: append to the owning URL's
    /// committed list and return the stable client id for the event.
    pub fn on_resolved(&self, event: &BreakpointResolvedEvent, url: &str) -> i64 {
        let mut committed = self.committed.write();
        let list = committed.entry(url.to_string()).or_default();
        if !list.contains(&event.breakpoint_id) {
            list.push(event.breakpoint_id.clone());
        }
        self.ids.handle_for(event.breakpoint_id.clone())
    }

    /// Drop every committed breakpoint, hit condition and parked request
    /// (execution contexts cleared, disconnect).
    pub fn clear_all(&self) {
        self.committed.write().clear();
        self.pending.write().clear();
        self.hit_conditions.write().clear();
    }

    /// Run one serialized clear-then-add cycle for a URL.
    ///
    /// Waits for any prior cycle to finish, removes every breakpoint
    /// previously committed for the URL one at a time, then adds the
    /// requested breakpoints. The whole cycle is wrapped in a timeout that
    /// logs on expiry but keeps waiting for the true result.
    pub async fn commit(
        &self,
        client: Arc<dyn RdpConnection>,
        url: &str,
        script: Option<Arc<Script>>,
        requests: &[BreakpointRequest],
        ids: Option<&[i64]>,
    ) -> Vec<BreakpointOutcome> {
        let work = async {
            let _slot = self.queue.lock().await;
            self.clear_committed(&client, url).await;
            self.add_breakpoints(&client, url, script, requests, ids).await
        };
        tokio::pin!(work);
        match tokio::time::timeout(SET_BREAKPOINTS_TIMEOUT, &mut work).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(
                    "Timed out after {:?} setting breakpoints for {}; waiting for completion",
                    SET_BREAKPOINTS_TIMEOUT, url
                );
                work.await
            }
        }
    }

    /// Remove every committed breakpoint for a URL, one call at a time.
    /// Concurrent removes trip a known runtime bug.
    async fn clear_committed(&self, client: &Arc<dyn RdpConnection>, url: &str) {
        let ids = {
            let mut committed = self.committed.write();
            committed.remove(url).unwrap_or_default()
        };
        for runtime_id in ids {
            self.hit_conditions.write().remove(&runtime_id);
            if let Err(e) = client
                .call(
                    "Debugger.removeBreakpoint",
                    json!({ "breakpointId": runtime_id }),
                )
                .await
            {
                warn!("Failed to remove breakpoint {}: {}", runtime_id, e);
            }
        }
    }

    async fn add_breakpoints(
        &self,
        client: &Arc<dyn RdpConnection>,
        url: &str,
        script: Option<Arc<Script>>,
        requests: &[BreakpointRequest],
        ids: Option<&[i64]>,
    ) -> Vec<BreakpointOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let passed_id = ids.and_then(|list| list.get(i).copied());

            let hit_condition = match &request.hit_condition {
                Some(raw) => match HitConditionBreakpoint::parse(raw) {
                    Some(compiled) => Some(compiled),
                    None => {
                        outcomes.push(BreakpointOutcome {
                            dap_id: passed_id,
                            verified: false,
                            message: Some(format!("Invalid hit condition: {raw}")),
                            line: None,
                            column: None,
                        });
                        continue;
                    }
                },
                None => None,
            };

            let location = self
                .probe_column(client, script.as_deref(), request.line, request.column)
                .await;

            let added = self
                .add_one(client, url, script.as_deref(), request, &location)
                .await;

            match added {
                Ok((runtime_id, actual)) => {
                    let dap_id = if let Some(runtime_id) = &runtime_id {
                        if let Some(known) = self.ids.lookup(runtime_id) {
                            known
                        } else if let Some(passed) = passed_id {
                            self.ids.bind(passed, runtime_id.clone());
                            passed
                        } else {
                            self.ids.handle_for(runtime_id.clone())
                        }
                    } else {
                        passed_id.unwrap_or_else(|| self.ids.allocate())
                    };

                    if let Some(runtime_id) = &runtime_id {
                        self.committed
                            .write()
                            .entry(url.to_string())
                            .or_default()
                            .push(runtime_id.clone());
                        if let Some(compiled) = hit_condition {
                            self.hit_conditions
                                .write()
                                .insert(runtime_id.clone(), compiled);
                        }
                    }

                    match actual {
                        Some(actual) => outcomes.push(BreakpointOutcome {
                            dap_id: Some(dap_id),
                            verified: true,
                            message: None,
                            line: Some(actual.line_number),
                            column: actual.column_number,
                        }),
                        None => outcomes.push(BreakpointOutcome {
                            dap_id: Some(dap_id),
                            verified: false,
                            message: None,
                            line: None,
                            column: None,
                        }),
                    }
                }
                Err(e) => {
                    warn!("Failed to set breakpoint at {}:{}: {}", url, request.line, e);
                    outcomes.push(BreakpointOutcome {
                        dap_id: passed_id,
                        verified: false,
                        message: Some(e.to_string()),
                        line: None,
                        column: None,
                    });
                }
            }
        }
        outcomes
    }

    /// Add one breakpoint. Returns the runtime id (when one was issued)
    /// and the actual bound location (when the runtime reported one).
    async fn add_one(
        &self,
        client: &Arc<dyn RdpConnection>,
        url: &str,
        script: Option<&Script>,
        request: &BreakpointRequest,
        location: &(u64, Option<u64>),
    ) -> Result<(Option<String>, Option<Location>), RdpError> {
        let (line, column) = *location;
        let requested = Location {
            script_id: script.map(|s| s.script_id.clone()).unwrap_or_default(),
            line_number: line,
            column_number: column,
        };

        let result = if is_vm_url(url) {
            let Some(script) = script else {
                return Err(RdpError::command(format!("Script not loaded: {url}")));
            };
            // Synthetic eval scripts have no stable URL to rebind against.
            let mut params = json!({
                "location": {
                    "scriptId": script.script_id,
                    "lineNumber": line,
                    "columnNumber": column.unwrap_or(0),
                },
            });
            if let Some(condition) = &request.condition {
                params["condition"] = json!(condition);
            }
            client
                .call("Debugger.setBreakpoint", params)
                .await
                .map(|value| {
                    serde_json::from_value::<SetBreakpointResult>(value).map(|result| {
                        (Some(result.breakpoint_id), result.actual_location)
                    })
                })
        } else {
            // URL-regex binding survives reloads; the runtime rebinds and
            // reports via breakpointResolved.
            let mut params = json!({
                "urlRegex": path_to_regex(url),
                "lineNumber": line,
                "columnNumber": column.unwrap_or(0),
            });
            if let Some(condition) = &request.condition {
                params["condition"] = json!(condition);
            }
            client
                .call("Debugger.setBreakpointByUrl", params)
                .await
                .map(|value| {
                    serde_json::from_value::<SetBreakpointByUrlResult>(value).map(|result| {
                        (
                            Some(result.breakpoint_id),
                            result.locations.into_iter().next(),
                        )
                    })
                })
        };

        match result {
            Ok(Ok(parsed)) => Ok(parsed),
            Ok(Err(e)) => Err(RdpError::command(format!("Malformed response: {e}"))),
            Err(RdpError::Command { message }) if message == ALREADY_EXISTS_ERROR => {
                Ok((None, Some(requested)))
            }
            Err(e) => Err(e),
        }
    }

    /// When column breakpoints are enabled and the script is known, ask the
    /// runtime for valid locations on the line and pick the nearest.
    async fn probe_column(
        &self,
        client: &Arc<dyn RdpConnection>,
        script: Option<&Script>,
        line: u64,
        column: Option<u64>,
    ) -> (u64, Option<u64>) {
        if !self.column_breakpoints.load(Ordering::Relaxed) {
            return (line, column);
        }
        let Some(script) = script else {
            return (line, column);
        };

        let params = json!({
            "start": { "scriptId": script.script_id, "lineNumber": line, "columnNumber": 0 },
            "end": { "scriptId": script.script_id, "lineNumber": line + 1, "columnNumber": 0 },
            "restrictToFunction": false,
        });
        let locations = match client.call("Debugger.getPossibleBreakpoints", params).await {
            Ok(value) => value
                .get("locations")
                .cloned()
                .and_then(|v| serde_json::from_value::<Vec<BreakLocation>>(v).ok())
                .unwrap_or_default(),
            Err(e) => {
                debug!("getPossibleBreakpoints failed: {}", e);
                return (line, column);
            }
        };

        match nearest_location(&locations, line, column.unwrap_or(0)) {
            Some(best) => (best.line_number, best.column_number),
            None => (line, column),
        }
    }
}

/// Pick the closest valid location on the requested line: same-line
/// columns at or past the requested column win, else the closest earlier
/// column on the line.
fn nearest_location(
    locations: &[BreakLocation],
    line: u64,
    column: u64,
) -> Option<&BreakLocation> {
    let on_line: Vec<_> = locations.iter().filter(|l| l.line_number == line).collect();
    if on_line.is_empty() {
        return None;
    }
    on_line
        .iter()
        .filter(|l| l.column_number.unwrap_or(0) >= column)
        .min_by_key(|l| l.column_number.unwrap_or(0))
        .or_else(|| {
            on_line
                .iter()
                .max_by_key(|l| l.column_number.unwrap_or(0))
        })
        .copied()
}

/// Build a url regex that matches the path with either slash direction and
/// a case-insensitive drive letter.
pub fn path_to_regex(url: &str) -> String {
    let bytes = url.as_bytes();
    let (mut regex, rest) =
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            let upper = bytes[0].to_ascii_uppercase() as char;
            let lower = bytes[0].to_ascii_lowercase() as char;
            (format!("[{upper}{lower}]"), &url[1..])
        } else {
            (String::new(), url)
        };
    for c in rest.chars() {
        match c {
            '/' | '\\' => regex.push_str(r"[\/\\]"),
            '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}' => {
                regex.push('\\');
                regex.push(c);
            }
            other => regex.push(other),
        }
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_condition_grammar() {
        let hc = HitConditionBreakpoint::parse("% 3").unwrap();
        assert_eq!(hc.op, HitConditionOp::Mod);
        assert_eq!(hc.operand, 3);

        let hc = HitConditionBreakpoint::parse(">2").unwrap();
        assert_eq!(hc.op, HitConditionOp::Gt);

        let hc = HitConditionBreakpoint::parse(">= 10").unwrap();
        assert_eq!(hc.op, HitConditionOp::Ge);

        // Default operator is >=.
        let hc = HitConditionBreakpoint::parse("5").unwrap();
        assert_eq!(hc.op, HitConditionOp::Ge);
        assert_eq!(hc.operand, 5);

        // "=" compares for equality.
        let hc = HitConditionBreakpoint::parse("= 4").unwrap();
        assert_eq!(hc.op, HitConditionOp::Eq);

        assert!(HitConditionBreakpoint::parse("abc").is_none());
        assert!(HitConditionBreakpoint::parse("% x").is_none());
        assert!(HitConditionBreakpoint::parse("").is_none());
    }

    #[test]
    fn test_hit_condition_semantics() {
        // "% 3" pauses on hits 3, 6, 9, …
        let mut hc = HitConditionBreakpoint::parse("% 3").unwrap();
        let stops: Vec<bool> = (0..9)
            .map(|_| {
                hc.num_hits += 1;
                hc.should_pause()
            })
            .collect();
        assert_eq!(
            stops,
            vec![false, false, true, false, false, true, false, false, true]
        );

        // "> 2" pauses on hits 3, 4, …
        let mut hc = HitConditionBreakpoint::parse("> 2").unwrap();
        let stops: Vec<bool> = (0..4)
            .map(|_| {
                hc.num_hits += 1;
                hc.should_pause()
            })
            .collect();
        assert_eq!(stops, vec![false, false, true, true]);

        // "5" (default >=) pauses on hits 5, 6, …
        let mut hc = HitConditionBreakpoint::parse("5").unwrap();
        let stops: Vec<bool> = (0..6)
            .map(|_| {
                hc.num_hits += 1;
                hc.should_pause()
            })
            .collect();
        assert_eq!(stops, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn test_register_hits_silent_resume() {
        let engine = BreakpointEngine::new();
        engine
            .hit_conditions
            .write()
            .insert("bp1".to_string(), HitConditionBreakpoint::parse("% 2").unwrap());

        let ids = vec!["bp1".to_string()];
        // Hits 1 and 3 are silent, 2 and 4 pause.
        assert!(!engine.register_hits(&ids, false));
        assert!(engine.register_hits(&ids, false));
        assert!(!engine.register_hits(&ids, false));
        assert!(engine.register_hits(&ids, false));

        // A user-initiated stop is never silenced.
        assert!(engine.register_hits(&ids, true));
    }

    #[test]
    fn test_path_to_regex() {
        let regex = path_to_regex("C:\\app\\a.js");
        assert_eq!(regex, r"[Cc]:[\/\\]app[\/\\]a\.js");

        let regex = path_to_regex("/srv/app/main.js");
        assert_eq!(regex, r"[\/\\]srv[\/\\]app[\/\\]main\.js");
    }

    #[test]
    fn test_nearest_location() {
        let locations = vec![
            BreakLocation {
                script_id: "1".to_string(),
                line_number: 4,
                column_number: Some(2),
                break_type: None,
            },
            BreakLocation {
                script_id: "1".to_string(),
                line_number: 4,
                column_number: Some(10),
                break_type: None,
            },
            BreakLocation {
                script_id: "1".to_string(),
                line_number: 5,
                column_number: Some(0),
                break_type: None,
            },
        ];

        // Same-line column at or past the request wins.
        let best = nearest_location(&locations, 4, 6).unwrap();
        assert_eq!(best.column_number, Some(10));

        // Nothing at or past the request: closest earlier column on the line.
        let best = nearest_location(&locations, 4, 20).unwrap();
        assert_eq!(best.column_number, Some(10));

        let best = nearest_location(&locations, 4, 0).unwrap();
        assert_eq!(best.column_number, Some(2));

        assert!(nearest_location(&locations, 7, 0).is_none());
    }

    #[test]
    fn test_pending_bookkeeping() {
        let engine = BreakpointEngine::new();
        let pending = PendingBreakpoint {
            args: serde_json::from_value(serde_json::json!({
                "source": { "path": "/app/a.ts" },
                "breakpoints": [{ "line": 10 }]
            }))
            .unwrap(),
            ids: vec![engine.allocate_id()],
            request_seq: 42,
        };
        engine.enqueue_pending("/app/a.ts".to_string(), pending);

        let taken = engine.take_pending("/app/a.ts").unwrap();
        assert_eq!(taken.request_seq, 42);
        assert_eq!(taken.ids.len(), 1);
        assert!(engine.take_pending("/app/a.ts").is_none());
    }

    #[test]
    fn test_resolved_appends_committed() {
        let engine = BreakpointEngine::new();
        let event = BreakpointResolvedEvent {
            breakpoint_id: "bp:later".to_string(),
            location: Location {
                script_id: "9".to_string(),
                line_number: 12,
                column_number: Some(0),
            },
        };
        let dap_id = engine.on_resolved(&event, "file:///app/a.js");
        assert_eq!(engine.committed_ids("file:///app/a.js"), vec!["bp:later"]);

        // Stable across repeated resolutions of the same runtime id.
        assert_eq!(engine.on_resolved(&event, "file:///app/a.js"), dap_id);
        assert_eq!(engine.committed_ids("file:///app/a.js").len(), 1);
    }
}

//! DAP events emitted toward the IDE

use super::types::Breakpoint;
use serde::Serialize;

/// Reason carried by a `stopped` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Paused on a thrown exception
    Exception,
    /// Paused on an unhandled promise rejection
    PromiseRejection,
    /// Paused on a breakpoint
    Breakpoint,
    /// Paused after a step request
    Step,
    /// Paused after an explicit pause request
    Pause,
    /// Paused on a `debugger` statement
    DebuggerStatement,
    /// Paused on function entry after a frame restart
    FrameEntry,
}

impl StopReason {
    /// Wire string of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::PromiseRejection => "promise_rejection",
            Self::Breakpoint => "breakpoint",
            Self::Step => "step",
            Self::Pause => "pause",
            Self::DebuggerStatement => "debugger_statement",
            Self::FrameEntry => "frame_entry",
        }
    }
}

/// Output category of an `output` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputCategory {
    /// Regular console output
    Stdout,
    /// Error output
    Stderr,
}

/// Events the adapter emits toward the IDE
#[derive(Debug, Clone)]
pub enum DapEvent {
    /// The adapter is ready to accept configuration requests
    Initialized,
    /// Execution stopped
    Stopped {
        /// Why execution stopped
        reason: StopReason,
        /// The single thread id, always 1
        thread_id: i64,
        /// First line of the exception description, for exception stops
        text: Option<String>,
    },
    /// Execution continued
    Continued {
        /// The single thread id, always 1
        thread_id: i64,
    },
    /// A breakpoint changed state
    BreakpointChanged {
        /// Change reason (`new` for later-bound resolutions)
        reason: String,
        /// The updated breakpoint
        breakpoint: Breakpoint,
    },
    /// Console or exception output
    Output {
        /// stdout or stderr
        category: OutputCategory,
        /// Output text
        output: String,
        /// Container handle for expandable logged objects
        variables_reference: Option<i64>,
    },
    /// The debug session ended
    Terminated {
        /// Restart hint passed through from disconnect
        restart: bool,
    },
}

/// Sink for adapter-emitted events; implemented by the DAP transport.
pub trait EventSink: Send + Sync {
    /// Deliver one event to the client.
    fn send_event(&self, event: DapEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_strings() {
        assert_eq!(StopReason::Exception.as_str(), "exception");
        assert_eq!(StopReason::PromiseRejection.as_str(), "promise_rejection");
        assert_eq!(StopReason::DebuggerStatement.as_str(), "debugger_statement");
        assert_eq!(StopReason::FrameEntry.as_str(), "frame_entry");
    }
}

//! Stack-trace and scope assembly
//!
//! Maps the paused notification's call frames (plus the async parent
//! chain) into DAP stack frames, applying source-map, path and line/column
//! transformation, skip-file and smart-step deemphasis hints, and the
//! `VM*`-to-sourceReference rewrite. Scope building injects the synthetic
//! exception scope and the `this`/return-value children of scope 0.

use crate::dap::types::{Scope, Source, StackFrame};
use crate::handles::{HandleTable, ReverseHandleTable};
use crate::rdp::types::{CallFrame, PausedEvent, RemoteObject, RuntimeCallFrame};
use crate::scripts::{is_vm_url, ScriptRegistry, SourceContainer};
use crate::skip::SkipFileEngine;
use crate::transformers::{LineColTransformer, PathTransformer, SourceMapTransformer};
use crate::variables::{VariableContainer, VariableStore};

/// Origin tag for frames deemphasized by the skip-file engine
pub const SKIP_FILES_ORIGIN: &str = "skipped by 'skipFiles'";

/// Origin tag for frames deemphasized by smart step
pub const SMART_STEP_ORIGIN: &str = "skipped by 'smartStep'";

/// What a frame handle resolves to
#[derive(Debug, Clone)]
pub enum FrameEntry {
    /// A live call frame; scopes and evaluation work against it
    Live(CallFrame),
    /// A frame of an async parent segment; display only
    Async(RuntimeCallFrame),
    /// A non-executable async boundary label
    Label,
}

/// Collaborators needed to assemble one stack trace
pub struct StackContext<'a> {
    /// Frame handle table for the current pause epoch
    pub frames: &'a HandleTable<FrameEntry>,
    /// Source handle table
    pub sources: &'a ReverseHandleTable<SourceContainer>,
    /// Script registry
    pub scripts: &'a ScriptRegistry,
    /// Skip classification
    pub skip: &'a SkipFileEngine,
    /// Client↔target path mapping
    pub path: &'a dyn PathTransformer,
    /// Authored↔generated mapping
    pub source_maps: &'a dyn SourceMapTransformer,
    /// Line/column origin conversion
    pub line_col: &'a dyn LineColTransformer,
    /// Whether source maps are enabled
    pub source_maps_enabled: bool,
    /// Whether smart step is enabled
    pub smart_step: bool,
}

impl StackContext<'_> {
    /// Assemble the full, unsliced frame list for a pause notification.
    pub fn assemble(&self, event: &PausedEvent) -> Vec<StackFrame> {
        if event.call_frames.is_empty() {
            // Nonsense notification; give the client something to render.
            let id = self.frames.create(FrameEntry::Label);
            return vec![StackFrame {
                id,
                name: "VM_Unknown".to_string(),
                source: None,
                line: self.line_col.line_to_client(0),
                column: self.line_col.column_to_client(0),
                presentation_hint: None,
            }];
        }

        let mut frames = Vec::new();
        for call_frame in &event.call_frames {
            let id = self.frames.create(FrameEntry::Live(call_frame.clone()));
            let url = self
                .scripts
                .get_by_id(&call_frame.location.script_id)
                .map(|s| s.url.clone())
                .unwrap_or_default();
            frames.push(self.build_frame(
                id,
                &call_frame.function_name,
                &call_frame.location.script_id,
                &url,
                call_frame.location.line_number,
                call_frame.location.column_number.unwrap_or(0),
            ));
        }

        // Async parents, each subtree prefixed with a label frame.
        let mut parent = event.async_stack_trace.as_ref();
        while let Some(segment) = parent {
            let label_id = self.frames.create(FrameEntry::Label);
            let description = segment.description.as_deref().unwrap_or("async");
            frames.push(StackFrame {
                id: label_id,
                name: format!("[ {description} ]"),
                source: None,
                line: self.line_col.line_to_client(0),
                column: self.line_col.column_to_client(0),
                presentation_hint: Some("label".to_string()),
            });

            for frame in &segment.call_frames {
                let id = self.frames.create(FrameEntry::Async(frame.clone()));
                let url = if frame.url.is_empty() {
                    self.scripts
                        .get_by_id(&frame.script_id)
                        .map(|s| s.url.clone())
                        .unwrap_or_default()
                } else {
                    frame.url.clone()
                };
                frames.push(self.build_frame(
                    id,
                    &frame.function_name,
                    &frame.script_id,
                    &url,
                    frame.line_number,
                    frame.column_number,
                ));
            }
            parent = segment.parent.as_deref();
        }

        frames
    }

    fn build_frame(
        &self,
        id: i64,
        function_name: &str,
        script_id: &str,
        url: &str,
        line: u64,
        column: u64,
    ) -> StackFrame {
        let mapped = if self.source_maps_enabled {
            self.source_maps.map_to_authored(url, line, column)
        } else {
            None
        };
        let is_source_mapped = mapped.as_ref().is_some_and(|m| m.source.is_some());

        let (final_path, final_line, final_column) = match &mapped {
            Some(m) if m.source.is_some() => {
                (m.source.clone().unwrap_or_default(), m.line, m.column)
            }
            _ => (url.to_string(), line, column),
        };

        let name = if function_name.is_empty() {
            if !url.is_empty() && !is_vm_url(url) {
                "(anonymous function)".to_string()
            } else {
                "(eval code)".to_string()
            }
        } else {
            function_name.to_string()
        };

        let client_path = if final_path.is_empty() {
            None
        } else {
            self.path.to_client_path(&final_path)
        };

        let classify_path = client_path.as_deref().unwrap_or(&final_path);
        let (origin, hint) = if self.skip.is_skipped(classify_path) {
            (Some(SKIP_FILES_ORIGIN.to_string()), Some("deemphasize".to_string()))
        } else if self.smart_step && self.source_maps_enabled && !is_source_mapped {
            (Some(SMART_STEP_ORIGIN.to_string()), Some("deemphasize".to_string()))
        } else {
            (None, None)
        };

        let source = if final_path.is_empty() {
            None
        } else if is_vm_url(&final_path) || client_path.is_none() {
            // No client file to open; serve the script through a reference.
            let reference = self.sources.handle_for(SourceContainer {
                script_id: Some(script_id.to_string()),
                contents: None,
                mapped_path: None,
            });
            Some(Source {
                name: Some(final_path.clone()),
                path: None,
                source_reference: Some(reference),
                origin,
                presentation_hint: hint,
            })
        } else {
            let path = client_path.unwrap_or(final_path);
            Some(Source {
                name: Some(base_name(&path)),
                path: Some(path),
                source_reference: None,
                origin,
                presentation_hint: hint,
            })
        };

        StackFrame {
            id,
            name,
            source,
            line: self.line_col.line_to_client(final_line),
            column: self.line_col.column_to_client(final_column),
            presentation_hint: None,
        }
    }
}

/// Slice an assembled frame list by `startFrame`/`levels`.
pub fn slice_frames(
    mut frames: Vec<StackFrame>,
    start_frame: Option<u64>,
    levels: Option<u64>,
) -> (Vec<StackFrame>, u64) {
    let total = frames.len() as u64;
    let start = start_frame.unwrap_or(0).min(total) as usize;
    let mut window = frames.split_off(start);
    if let Some(levels) = levels {
        if levels > 0 {
            window.truncate(levels as usize);
        }
    }
    (window, total)
}

/// Build the scope list for a live call frame. The exception pseudo-scope
/// is prepended when an exception is current; scope 0 carries the
/// synthetic `this` and return-value children.
pub fn build_scopes(
    variables: &VariableStore,
    line_col: &dyn LineColTransformer,
    call_frame: &CallFrame,
    exception: Option<RemoteObject>,
) -> Vec<Scope> {
    let mut scopes = Vec::with_capacity(call_frame.scope_chain.len() + 1);

    if let Some(exception) = exception {
        let reference = variables.create(VariableContainer::Exception { exception });
        scopes.push(Scope {
            name: "Exception".to_string(),
            variables_reference: reference,
            expensive: false,
            line: None,
            column: None,
            end_line: None,
            end_column: None,
        });
    }

    for (index, scope) in call_frame.scope_chain.iter().enumerate() {
        let reference = variables.create(VariableContainer::Scope {
            call_frame_id: call_frame.call_frame_id.clone(),
            scope_index: index,
            object_id: scope.object.object_id.clone().unwrap_or_default(),
            this_obj: if index == 0 {
                call_frame.this.clone().filter(|t| t.object_type != "undefined")
            } else {
                None
            },
            return_value: if index == 0 {
                call_frame.return_value.clone()
            } else {
                None
            },
        });

        scopes.push(Scope {
            name: capitalize(&scope.scope_type),
            variables_reference: reference,
            expensive: scope.scope_type == "global",
            line: scope
                .start_location
                .as_ref()
                .map(|l| line_col.line_to_client(l.line_number)),
            column: scope
                .start_location
                .as_ref()
                .map(|l| line_col.column_to_client(l.column_number.unwrap_or(0))),
            end_line: scope
                .end_location
                .as_ref()
                .map(|l| line_col.line_to_client(l.line_number)),
            end_column: scope
                .end_location
                .as_ref()
                .map(|l| line_col.column_to_client(l.column_number.unwrap_or(0))),
        });
    }

    scopes
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn base_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::types::ScriptParsedEvent;
    use crate::transformers::{
        DefaultLineColTransformer, IdentityPathTransformer, MappedPosition, NoSourceMaps,
        SourcePathDetails,
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedSourceMaps;

    #[async_trait]
    impl SourceMapTransformer for FixedSourceMaps {
        async fn script_parsed(
            &self,
            _path_or_url: &str,
            _source_map_url: Option<&str>,
        ) -> Option<Vec<String>> {
            Some(vec!["/app/src/a.ts".to_string()])
        }

        fn map_to_authored(&self, path: &str, line: u64, column: u64) -> Option<MappedPosition> {
            (path == "file:///app/out.js").then(|| MappedPosition {
                source: Some("/app/src/a.ts".to_string()),
                line: line / 2,
                column,
            })
        }

        fn map_to_generated(
            &self,
            authored_path: &str,
            line: u64,
            column: u64,
        ) -> Option<MappedPosition> {
            (authored_path == "/app/src/a.ts").then(|| MappedPosition {
                source: Some("file:///app/out.js".to_string()),
                line: line * 2,
                column,
            })
        }

        fn generated_path_from_authored(&self, authored_path: &str) -> Option<String> {
            (authored_path == "/app/src/a.ts").then(|| "file:///app/out.js".to_string())
        }

        fn all_sources(&self, _generated_path: &str) -> Vec<String> {
            vec!["/app/src/a.ts".to_string()]
        }

        fn all_source_path_details(&self, _generated_path: &str) -> Vec<SourcePathDetails> {
            Vec::new()
        }

        fn clear_target_context(&self) {}
    }

    struct Fixture {
        frames: HandleTable<FrameEntry>,
        sources: ReverseHandleTable<SourceContainer>,
        scripts: ScriptRegistry,
        skip: SkipFileEngine,
        path: IdentityPathTransformer,
        line_col: DefaultLineColTransformer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                frames: HandleTable::new(1),
                sources: ReverseHandleTable::new(5000),
                scripts: ScriptRegistry::new(),
                skip: SkipFileEngine::new(),
                path: IdentityPathTransformer,
                line_col: DefaultLineColTransformer::new(),
            }
        }

        fn context<'a>(&'a self, maps: &'a dyn SourceMapTransformer, enabled: bool, smart: bool) -> StackContext<'a> {
            StackContext {
                frames: &self.frames,
                sources: &self.sources,
                scripts: &self.scripts,
                skip: &self.skip,
                path: &self.path,
                source_maps: maps,
                line_col: &self.line_col,
                source_maps_enabled: enabled,
                smart_step: smart,
            }
        }
    }

    fn paused_event(value: serde_json::Value) -> PausedEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_sync_and_async_frames_with_labels() {
        let fixture = Fixture::new();
        fixture.scripts.register(&ScriptParsedEvent {
            script_id: "1".to_string(),
            url: "file:///app/main.js".to_string(),
            source_map_url: None,
        });

        let event = paused_event(json!({
            "callFrames": [{
                "callFrameId": "frame:0",
                "functionName": "work",
                "location": { "scriptId": "1", "lineNumber": 9, "columnNumber": 4 }
            }],
            "reason": "other",
            "asyncStackTrace": {
                "description": "setTimeout",
                "callFrames": [{
                    "functionName": "",
                    "scriptId": "1",
                    "url": "file:///app/main.js",
                    "lineNumber": 2,
                    "columnNumber": 0
                }]
            }
        }));

        let maps = NoSourceMaps;
        let frames = fixture.context(&maps, false, false).assemble(&event);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].name, "work");
        assert_eq!(frames[0].line, 10);
        assert_eq!(frames[0].column, 5);
        assert_eq!(frames[1].name, "[ setTimeout ]");
        assert_eq!(frames[1].presentation_hint.as_deref(), Some("label"));
        assert_eq!(frames[2].name, "(anonymous function)");
    }

    #[test]
    fn test_source_mapped_frame() {
        let fixture = Fixture::new();
        fixture.scripts.register(&ScriptParsedEvent {
            script_id: "2".to_string(),
            url: "file:///app/out.js".to_string(),
            source_map_url: Some("out.js.map".to_string()),
        });

        let event = paused_event(json!({
            "callFrames": [{
                "callFrameId": "frame:0",
                "functionName": "mapped",
                "location": { "scriptId": "2", "lineNumber": 8, "columnNumber": 0 }
            }],
            "reason": "other"
        }));

        let maps = FixedSourceMaps;
        let frames = fixture.context(&maps, true, false).assemble(&event);
        let source = frames[0].source.as_ref().unwrap();
        assert_eq!(source.path.as_deref(), Some("/app/src/a.ts"));
        assert_eq!(frames[0].line, 5);
    }

    #[test]
    fn test_smart_step_deemphasis_for_unmapped_frames() {
        let fixture = Fixture::new();
        fixture.scripts.register(&ScriptParsedEvent {
            script_id: "3".to_string(),
            url: "file:///app/vendor.js".to_string(),
            source_map_url: None,
        });

        let event = paused_event(json!({
            "callFrames": [{
                "callFrameId": "frame:0",
                "functionName": "lib",
                "location": { "scriptId": "3", "lineNumber": 1, "columnNumber": 0 }
            }],
            "reason": "other"
        }));

        let maps = FixedSourceMaps;
        let frames = fixture.context(&maps, true, true).assemble(&event);
        let source = frames[0].source.as_ref().unwrap();
        assert_eq!(source.presentation_hint.as_deref(), Some("deemphasize"));
        assert_eq!(source.origin.as_deref(), Some(SMART_STEP_ORIGIN));
    }

    #[test]
    fn test_skip_files_deemphasis_wins() {
        let fixture = Fixture::new();
        fixture.skip.configure(&["**/lib.js".to_string()], &[]);
        fixture.scripts.register(&ScriptParsedEvent {
            script_id: "4".to_string(),
            url: "file:///app/lib.js".to_string(),
            source_map_url: None,
        });

        let event = paused_event(json!({
            "callFrames": [{
                "callFrameId": "frame:0",
                "functionName": "inLib",
                "location": { "scriptId": "4", "lineNumber": 0, "columnNumber": 0 }
            }],
            "reason": "other"
        }));

        let maps = NoSourceMaps;
        let frames = fixture.context(&maps, false, false).assemble(&event);
        let source = frames[0].source.as_ref().unwrap();
        assert_eq!(source.origin.as_deref(), Some(SKIP_FILES_ORIGIN));
        assert_eq!(source.presentation_hint.as_deref(), Some("deemphasize"));
    }

    #[test]
    fn test_vm_script_gets_source_reference() {
        let fixture = Fixture::new();
        fixture.scripts.register(&ScriptParsedEvent {
            script_id: "77".to_string(),
            url: String::new(),
            source_map_url: None,
        });

        let event = paused_event(json!({
            "callFrames": [{
                "callFrameId": "frame:0",
                "functionName": "",
                "location": { "scriptId": "77", "lineNumber": 0, "columnNumber": 0 }
            }],
            "reason": "other"
        }));

        let maps = NoSourceMaps;
        let frames = fixture.context(&maps, false, false).assemble(&event);
        assert_eq!(frames[0].name, "(eval code)");
        let source = frames[0].source.as_ref().unwrap();
        assert_eq!(source.name.as_deref(), Some("VM77"));
        assert!(source.path.is_none());
        assert!(source.source_reference.unwrap() >= 5000);
    }

    #[test]
    fn test_empty_call_frames_yield_stub() {
        let fixture = Fixture::new();
        let event = paused_event(json!({ "callFrames": [], "reason": "other" }));
        let maps = NoSourceMaps;
        let frames = fixture.context(&maps, false, false).assemble(&event);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "VM_Unknown");
    }

    #[test]
    fn test_slice_frames_law() {
        let frames: Vec<StackFrame> = (0..10)
            .map(|i| StackFrame {
                id: i,
                name: format!("f{i}"),
                source: None,
                line: 1,
                column: 1,
                presentation_hint: None,
            })
            .collect();

        let (window, total) = slice_frames(frames.clone(), Some(3), Some(4));
        assert_eq!(total, 10);
        let names: Vec<_> = window.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f3", "f4", "f5", "f6"]);

        let (window, total) = slice_frames(frames.clone(), None, None);
        assert_eq!(total, 10);
        assert_eq!(window.len(), 10);

        let (window, _) = slice_frames(frames, Some(8), Some(10));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_build_scopes_with_exception_and_this() {
        let store = VariableStore::new();
        let line_col = DefaultLineColTransformer::new();
        let call_frame: CallFrame = serde_json::from_value(json!({
            "callFrameId": "frame:0",
            "functionName": "f",
            "location": { "scriptId": "1", "lineNumber": 0 },
            "scopeChain": [
                {
                    "type": "local",
                    "object": { "type": "object", "objectId": "scope:0" },
                    "startLocation": { "scriptId": "1", "lineNumber": 2, "columnNumber": 0 },
                    "endLocation": { "scriptId": "1", "lineNumber": 8, "columnNumber": 1 }
                },
                { "type": "global", "object": { "type": "object", "objectId": "scope:1" } }
            ],
            "this": { "type": "object", "className": "Window", "objectId": "obj:this" }
        }))
        .unwrap();

        let exception: RemoteObject =
            serde_json::from_value(json!({ "type": "object", "className": "Error", "objectId": "obj:err" }))
                .unwrap();

        let scopes = build_scopes(&store, &line_col, &call_frame, Some(exception));
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes[0].name, "Exception");
        assert_eq!(scopes[1].name, "Local");
        assert_eq!(scopes[1].line, Some(3));
        assert_eq!(scopes[1].end_line, Some(9));
        assert!(!scopes[1].expensive);
        assert_eq!(scopes[2].name, "Global");
        assert!(scopes[2].expensive);

        // Scope 0 carries the synthetic this.
        let container = store.get(scopes[1].variables_reference).unwrap();
        match container {
            VariableContainer::Scope { this_obj, .. } => assert!(this_obj.is_some()),
            _ => panic!("expected scope container"),
        }
    }
}

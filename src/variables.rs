//! Variable materializer
//!
//! Converts remote objects into DAP variables and owns the per-pause
//! variable-container handle table. Containers expand lazily: property
//! listing, getter invocation and sliced windows all run against the
//! runtime on demand. Expansion errors are logged and yield an empty list;
//! the request itself never fails.

use crate::dap::types::Variable;
use crate::handles::HandleTable;
use crate::rdp::client::RdpConnection;
use crate::rdp::types::{
    EvaluateResult, GetPropertiesResult, ObjectPreview, PropertyDescriptor, RemoteObject,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Benign runtime quirk: property listing against a gone context returns
/// an empty list instead of failing the request.
const NO_CONTEXT_ERROR: &str = "Cannot find context with specified id";

const GETTER_INVOKER: &str = "function(n) { return this[n]; }";

const INDEXED_SLICE: &str =
    "function(s, c) { var r = []; for (var i = s; i < s + c; i++) r[i] = this[i]; return r; }";

const NAMED_SLICE: &str = "function(s, c) { var r = {}; var names = Object.getOwnPropertyNames(this); for (var i = s; i < s + c && i < names.length; i++) r[names[i]] = this[names[i]]; return r; }";

const ARRAY_COUNTS: &str = "function() { var names = Object.getOwnPropertyNames(this); return [this.length, names.length - this.length + 2]; }";

const COLLECTION_SIZE: &str = "function() { return this.size; }";

/// A lazily expandable variable container
#[derive(Debug, Clone)]
pub enum VariableContainer {
    /// Children of a remote object
    Property {
        /// Remote object id
        object_id: String,
        /// Expression that re-evaluates to the parent
        evaluate_name: Option<String>,
    },
    /// One scope of a call frame
    Scope {
        /// Owning call frame id
        call_frame_id: String,
        /// Index within the frame's scope chain
        scope_index: usize,
        /// The scope's variables object
        object_id: String,
        /// Synthetic `this` child, injected for scope 0
        this_obj: Option<RemoteObject>,
        /// Synthetic return-value child, injected for scope 0
        return_value: Option<RemoteObject>,
    },
    /// The current exception
    Exception {
        /// The thrown value
        exception: RemoteObject,
    },
    /// Captured arguments of one console call
    LoggedObjects {
        /// The call's arguments
        args: Vec<RemoteObject>,
    },
}

/// Variable-container handle table plus the materialization logic
pub struct VariableStore {
    handles: HandleTable<VariableContainer>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            handles: HandleTable::new(1000),
        }
    }

    /// Allocate a handle for a container.
    pub fn create(&self, container: VariableContainer) -> i64 {
        self.handles.create(container)
    }

    /// Resolve a handle issued in the current pause epoch.
    pub fn get(&self, handle: i64) -> Option<VariableContainer> {
        self.handles.get(handle)
    }

    /// Start a new pause epoch: every outstanding handle goes stale.
    pub fn reset(&self) {
        self.handles.reset();
    }

    /// Expand a container into its children.
    pub async fn expand(
        &self,
        client: &Arc<dyn RdpConnection>,
        container: &VariableContainer,
        filter: Option<&str>,
        start: Option<u64>,
        count: Option<u64>,
    ) -> Vec<Variable> {
        match container {
            VariableContainer::Property {
                object_id,
                evaluate_name,
            } => {
                if let (Some(start), Some(count)) = (start, count) {
                    self.expand_slice(client, object_id, evaluate_name.as_deref(), filter, start, count)
                        .await
                } else {
                    self.list_properties(client, object_id, evaluate_name.as_deref(), filter)
                        .await
                }
            }
            VariableContainer::Scope {
                scope_index,
                object_id,
                this_obj,
                return_value,
                ..
            } => {
                let mut variables = self
                    .list_properties(client, object_id, None, filter)
                    .await;
                if *scope_index == 0 {
                    if let Some(this_obj) = this_obj {
                        let this_var = self.create_variable(client, "this", this_obj, None).await;
                        variables.insert(0, this_var);
                    }
                    if let Some(return_value) = return_value {
                        let ret = self
                            .create_variable(client, "Return value", return_value, None)
                            .await;
                        variables.push(ret);
                    }
                }
                variables
            }
            VariableContainer::Exception { exception } => match &exception.object_id {
                Some(object_id) => self.list_properties(client, object_id, None, filter).await,
                None => {
                    vec![self.create_variable(client, "Exception", exception, None).await]
                }
            },
            VariableContainer::LoggedObjects { args } => {
                let mut variables = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    variables.push(self.create_variable(client, &i.to_string(), arg, None).await);
                }
                variables
            }
        }
    }

    /// Assign a new value to a named child of a container. Returns the
    /// rendered new value.
    pub async fn set_value(
        &self,
        client: &Arc<dyn RdpConnection>,
        container: &VariableContainer,
        name: &str,
        value: &str,
    ) -> crate::error::Result<String> {
        match container {
            VariableContainer::Scope {
                call_frame_id,
                scope_index,
                ..
            } => {
                let evaluated = client
                    .call(
                        "Debugger.evaluateOnCallFrame",
                        json!({
                            "callFrameId": call_frame_id,
                            "expression": value,
                            "silent": true,
                        }),
                    )
                    .await?;
                let evaluated: EvaluateResult = serde_json::from_value(evaluated)?;
                if let Some(details) = evaluated.exception_details {
                    return Err(crate::error::AdapterError::evaluation(details.error_text()));
                }

                let new_value = evaluated.result;
                client
                    .call(
                        "Debugger.setVariableValue",
                        json!({
                            "callFrameId": call_frame_id,
                            "scopeNumber": scope_index,
                            "variableName": name,
                            "newValue": call_argument(&new_value),
                        }),
                    )
                    .await?;
                Ok(remote_object_preview(&new_value))
            }
            VariableContainer::Property { object_id, .. } => {
                // Backslashes first, or the quote escapes get double-escaped.
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                let declaration =
                    format!("function() {{ return this[\"{escaped}\"] = {value}; }}");
                let result = client
                    .call(
                        "Runtime.callFunctionOn",
                        json!({
                            "objectId": object_id,
                            "functionDeclaration": declaration,
                            "silent": true,
                        }),
                    )
                    .await?;
                let result: EvaluateResult = serde_json::from_value(result)?;
                if let Some(details) = result.exception_details {
                    return Err(crate::error::AdapterError::evaluation(details.error_text()));
                }
                Ok(remote_object_preview(&result.result))
            }
            VariableContainer::Exception { .. } | VariableContainer::LoggedObjects { .. } => {
                Err(crate::error::AdapterError::validation(
                    "Variable is read-only",
                ))
            }
        }
    }

    /// List a remote object's properties: accessor descriptors merged with
    /// own descriptors (own wins on name collision), internal properties
    /// collected separately, getters invoked, the result filtered and
    /// sorted.
    async fn list_properties(
        &self,
        client: &Arc<dyn RdpConnection>,
        object_id: &str,
        evaluate_name: Option<&str>,
        filter: Option<&str>,
    ) -> Vec<Variable> {
        let accessors = self.get_properties(client, object_id, false, true).await;
        let own = self.get_properties(client, object_id, true, false).await;

        let mut merged: Vec<PropertyDescriptor> = Vec::new();
        for descriptor in accessors.result.into_iter().chain(own.result) {
            if let Some(existing) = merged.iter_mut().find(|d| d.name == descriptor.name) {
                *existing = descriptor;
            } else {
                merged.push(descriptor);
            }
        }

        let keep = |name: &str| match filter {
            Some("indexed") => is_indexed_name(name),
            Some("named") => !is_indexed_name(name),
            _ => true,
        };

        let mut variables = Vec::new();
        for descriptor in merged.iter().filter(|d| keep(&d.name)) {
            let variable = match (&descriptor.value, &descriptor.get) {
                (Some(value), _) => {
                    self.create_variable(client, &descriptor.name, value, evaluate_name)
                        .await
                }
                (None, Some(getter)) if getter.object_type != "undefined" => {
                    self.invoke_getter(client, object_id, &descriptor.name, evaluate_name)
                        .await
                }
                _ => continue,
            };
            variables.push(variable);
        }

        sort_variables(&mut variables);

        if filter != Some("indexed") {
            for internal in &own.internal_properties {
                if let Some(value) = &internal.value {
                    let variable = self
                        .create_variable(client, &internal.name, value, evaluate_name)
                        .await;
                    variables.push(variable);
                }
            }
        }

        variables
    }

    /// Expand a sliced window of an object's children without the filter
    /// overlay: copy the window into a temp object in the runtime, then
    /// list the temp object.
    async fn expand_slice(
        &self,
        client: &Arc<dyn RdpConnection>,
        object_id: &str,
        evaluate_name: Option<&str>,
        filter: Option<&str>,
        start: u64,
        count: u64,
    ) -> Vec<Variable> {
        let (declaration, inner_filter) = if filter == Some("named") {
            (NAMED_SLICE, "named")
        } else {
            (INDEXED_SLICE, "indexed")
        };

        let result = client
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "arguments": [{ "value": start }, { "value": count }],
                    "silent": true,
                }),
            )
            .await;

        let window = match result
            .map(serde_json::from_value::<EvaluateResult>)
        {
            Ok(Ok(evaluated)) => evaluated.result,
            Ok(Err(e)) => {
                warn!("Malformed slice response: {}", e);
                return Vec::new();
            }
            Err(e) => {
                warn!("Slice expansion failed: {}", e);
                return Vec::new();
            }
        };

        match window.object_id {
            Some(window_id) => {
                self.list_properties(client, &window_id, evaluate_name, Some(inner_filter))
                    .await
            }
            None => Vec::new(),
        }
    }

    async fn invoke_getter(
        &self,
        client: &Arc<dyn RdpConnection>,
        object_id: &str,
        name: &str,
        evaluate_name: Option<&str>,
    ) -> Variable {
        let result = client
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": GETTER_INVOKER,
                    "arguments": [{ "value": name }],
                    "silent": true,
                }),
            )
            .await;

        match result.map(serde_json::from_value::<EvaluateResult>) {
            Ok(Ok(evaluated)) => {
                if let Some(details) = evaluated.exception_details {
                    // A throwing getter is non-fatal; its text becomes the value.
                    Variable {
                        name: name.to_string(),
                        value: details.error_text(),
                        var_type: None,
                        evaluate_name: compose_evaluate_name(evaluate_name, name),
                        variables_reference: 0,
                        named_variables: None,
                        indexed_variables: None,
                    }
                } else {
                    self.create_variable(client, name, &evaluated.result, evaluate_name)
                        .await
                }
            }
            Ok(Err(e)) => {
                warn!("Malformed getter response for {}: {}", name, e);
                leaf_variable(name, String::new(), None)
            }
            Err(e) => {
                warn!("Getter invocation for {} failed: {}", name, e);
                leaf_variable(name, e.to_string(), None)
            }
        }
    }

    async fn get_properties(
        &self,
        client: &Arc<dyn RdpConnection>,
        object_id: &str,
        own_properties: bool,
        accessor_properties_only: bool,
    ) -> GetPropertiesResult {
        let params = json!({
            "objectId": object_id,
            "ownProperties": own_properties,
            "accessorPropertiesOnly": accessor_properties_only,
            "generatePreview": true,
        });
        match client.call("Runtime.getProperties", params).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Malformed getProperties response: {}", e);
                GetPropertiesResult::default()
            }),
            Err(e) => {
                if !e.to_string().contains(NO_CONTEXT_ERROR) {
                    warn!("getProperties failed: {}", e);
                }
                GetPropertiesResult::default()
            }
        }
    }

    /// Convert a remote object into a DAP variable, allocating a container
    /// handle for expandable values and precomputing indexed/named counts
    /// for collections.
    pub async fn create_variable(
        &self,
        client: &Arc<dyn RdpConnection>,
        name: &str,
        obj: &RemoteObject,
        parent_evaluate_name: Option<&str>,
    ) -> Variable {
        let evaluate_name = compose_evaluate_name(parent_evaluate_name, name);

        match obj.object_type.as_str() {
            "object" => match obj.subtype.as_deref() {
                Some("null") => leaf_variable_with(name, "null".to_string(), obj, evaluate_name),
                Some("internal#location") => leaf_variable_with(
                    name,
                    obj.description.clone().unwrap_or_default(),
                    obj,
                    evaluate_name,
                ),
                subtype => {
                    let value = remote_object_preview(obj);
                    let Some(object_id) = &obj.object_id else {
                        return leaf_variable_with(name, value, obj, evaluate_name);
                    };

                    let (indexed, named) = match subtype {
                        Some("array") | Some("typedarray") => {
                            let (indexed, named) =
                                self.array_counts(client, obj, object_id).await;
                            (Some(indexed), Some(named))
                        }
                        Some("map") | Some("set") => {
                            let named = self.collection_counts(client, obj, object_id).await;
                            (None, Some(named))
                        }
                        _ => (None, None),
                    };

                    let reference = self.create(VariableContainer::Property {
                        object_id: object_id.clone(),
                        evaluate_name: evaluate_name.clone(),
                    });
                    Variable {
                        name: name.to_string(),
                        value,
                        var_type: Some(
                            obj.class_name
                                .clone()
                                .unwrap_or_else(|| obj.object_type.clone()),
                        ),
                        evaluate_name,
                        variables_reference: reference,
                        named_variables: named,
                        indexed_variables: indexed,
                    }
                }
            },
            "function" => {
                let value = function_description(obj.description.as_deref().unwrap_or(""));
                let reference = match &obj.object_id {
                    Some(object_id) => self.create(VariableContainer::Property {
                        object_id: object_id.clone(),
                        evaluate_name: evaluate_name.clone(),
                    }),
                    None => 0,
                };
                Variable {
                    name: name.to_string(),
                    value,
                    var_type: Some("function".to_string()),
                    evaluate_name,
                    variables_reference: reference,
                    named_variables: None,
                    indexed_variables: None,
                }
            }
            _ => leaf_variable_with(name, primitive_to_string(obj), obj, evaluate_name),
        }
    }

    /// Indexed/named counts for arrays: max preview index + 1 and the
    /// non-indexed preview properties plus `__proto__` and `length`, with
    /// an eval fallback when the preview is truncated.
    async fn array_counts(
        &self,
        client: &Arc<dyn RdpConnection>,
        obj: &RemoteObject,
        object_id: &str,
    ) -> (u64, u64) {
        if let Some(preview) = &obj.preview {
            if !preview.overflow {
                let mut max_index = 0u64;
                let mut named = 0u64;
                for prop in &preview.properties {
                    match prop.name.parse::<u64>() {
                        Ok(i) => max_index = max_index.max(i + 1),
                        Err(_) => named += 1,
                    }
                }
                return (max_index, named + 2);
            }
        }

        let result = client
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": ARRAY_COUNTS,
                    "returnByValue": true,
                    "silent": true,
                }),
            )
            .await;
        if let Ok(Ok(evaluated)) = result.map(serde_json::from_value::<EvaluateResult>) {
            if let Some(serde_json::Value::Array(counts)) = evaluated.result.value {
                let indexed = counts.first().and_then(|v| v.as_u64()).unwrap_or(0);
                let named = counts.get(1).and_then(|v| v.as_u64()).unwrap_or(0);
                return (indexed, named);
            }
        }
        (0, 0)
    }

    /// Named count for Maps and Sets: preview properties plus the
    /// `[[Entries]]` slot, with a size eval fallback when truncated.
    async fn collection_counts(
        &self,
        client: &Arc<dyn RdpConnection>,
        obj: &RemoteObject,
        object_id: &str,
    ) -> u64 {
        if let Some(preview) = &obj.preview {
            if !preview.overflow {
                return preview.properties.len() as u64 + 1;
            }
        }

        let result = client
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": COLLECTION_SIZE,
                    "returnByValue": true,
                    "silent": true,
                }),
            )
            .await;
        if let Ok(Ok(evaluated)) = result.map(serde_json::from_value::<EvaluateResult>) {
            if let Some(size) = evaluated.result.value.as_ref().and_then(|v| v.as_u64()) {
                return size + 1;
            }
        }
        1
    }
}

fn leaf_variable(name: &str, value: String, evaluate_name: Option<String>) -> Variable {
    Variable {
        name: name.to_string(),
        value,
        var_type: None,
        evaluate_name,
        variables_reference: 0,
        named_variables: None,
        indexed_variables: None,
    }
}

fn leaf_variable_with(
    name: &str,
    value: String,
    obj: &RemoteObject,
    evaluate_name: Option<String>,
) -> Variable {
    Variable {
        name: name.to_string(),
        value,
        var_type: Some(obj.object_type.clone()),
        evaluate_name,
        variables_reference: 0,
        named_variables: None,
        indexed_variables: None,
    }
}

/// Wire form of a value handed back to the runtime as a call argument.
fn call_argument(obj: &RemoteObject) -> serde_json::Value {
    if let Some(object_id) = &obj.object_id {
        json!({ "objectId": object_id })
    } else if let Some(value) = &obj.value {
        json!({ "value": value })
    } else if obj.object_type == "undefined" {
        json!({})
    } else {
        json!({ "unserializableValue": obj.description.clone().unwrap_or_default() })
    }
}

/// Whether a property name addresses an indexed element.
pub fn is_indexed_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric names ascending by value, then the rest lexicographically.
pub fn sort_variables(variables: &mut [Variable]) {
    variables.sort_by(|a, b| {
        match (a.name.parse::<u64>(), b.name.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.name.cmp(&b.name),
        }
    });
}

/// Compose a child's evaluate name from its parent's.
pub fn compose_evaluate_name(parent: Option<&str>, name: &str) -> Option<String> {
    let Some(parent) = parent else {
        return Some(name.to_string());
    };
    if is_indexed_name(name) {
        Some(format!("{parent}[{name}]"))
    } else if is_identifier(name) {
        Some(format!("{parent}.{name}"))
    } else {
        Some(format!("{parent}[\"{}\"]", name.replace('"', "\\\"")))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Truncate a function description to its head: up to the first `{`, or
/// the first `=>` for expression-bodied arrows, else verbatim.
pub fn function_description(description: &str) -> String {
    if let Some(index) = description.find('{') {
        format!("{} {{ … }}", description[..index].trim_end())
    } else if let Some(index) = description.find("=>") {
        format!("{} => …", description[..index].trim_end())
    } else {
        description.to_string()
    }
}

/// Render a primitive remote object.
pub fn primitive_to_string(obj: &RemoteObject) -> String {
    match obj.object_type.as_str() {
        "undefined" => "undefined".to_string(),
        "string" => {
            let text = obj
                .value
                .as_ref()
                .and_then(|v| v.as_str().map(str::to_string))
                .or_else(|| obj.description.clone())
                .unwrap_or_default();
            format!("\"{text}\"")
        }
        "number" | "bigint" => obj
            .description
            .clone()
            .or_else(|| obj.value.as_ref().map(std::string::ToString::to_string))
            .unwrap_or_default(),
        "boolean" => obj
            .value
            .as_ref()
            .map(std::string::ToString::to_string)
            .unwrap_or_default(),
        "symbol" => obj.description.clone().unwrap_or_default(),
        _ => obj
            .description
            .clone()
            .or_else(|| obj.value.as_ref().map(std::string::ToString::to_string))
            .unwrap_or_default(),
    }
}

/// Render a remote object's preview string.
pub fn remote_object_preview(obj: &RemoteObject) -> String {
    match obj.object_type.as_str() {
        "object" => match obj.subtype.as_deref() {
            Some("null") => "null".to_string(),
            _ => match &obj.preview {
                Some(preview) => preview_to_string(obj, preview),
                None => obj
                    .description
                    .clone()
                    .or_else(|| obj.class_name.clone())
                    .unwrap_or_else(|| "Object".to_string()),
            },
        },
        "function" => function_description(obj.description.as_deref().unwrap_or("")),
        _ => primitive_to_string(obj),
    }
}

fn preview_to_string(obj: &RemoteObject, preview: &ObjectPreview) -> String {
    let description = preview
        .description
        .clone()
        .or_else(|| obj.description.clone())
        .or_else(|| obj.class_name.clone())
        .unwrap_or_else(|| "Object".to_string());

    let subtype = preview
        .subtype
        .as_deref()
        .or(obj.subtype.as_deref());

    let mut parts: Vec<String> = Vec::new();
    if let Some(entries) = &preview.entries {
        for entry in entries {
            let value = entry
                .value
                .description
                .clone()
                .unwrap_or_else(|| entry_props(&entry.value));
            match &entry.key {
                Some(key) => {
                    let key = key.description.clone().unwrap_or_else(|| entry_props(key));
                    parts.push(format!("{key} => {value}"));
                }
                None => parts.push(value),
            }
        }
    } else {
        let indexed = matches!(subtype, Some("array") | Some("typedarray"));
        for prop in &preview.properties {
            let value = property_preview_value(prop);
            if indexed && is_indexed_name(&prop.name) {
                parts.push(value);
            } else {
                parts.push(format!("{}: {}", prop.name, value));
            }
        }
    }

    if preview.overflow {
        parts.push("…".to_string());
    }

    let body = parts.join(", ");
    if matches!(subtype, Some("array") | Some("typedarray")) {
        format!("{description} [{body}]")
    } else {
        format!("{description} {{{body}}}")
    }
}

fn entry_props(preview: &ObjectPreview) -> String {
    let parts: Vec<String> = preview
        .properties
        .iter()
        .map(|p| format!("{}: {}", p.name, property_preview_value(p)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn property_preview_value(prop: &crate::rdp::types::PropertyPreview) -> String {
    match prop.value_type.as_str() {
        "string" => format!("\"{}\"", prop.value.as_deref().unwrap_or("")),
        "object" => prop
            .value
            .clone()
            .unwrap_or_else(|| prop.subtype.clone().unwrap_or_else(|| "Object".to_string())),
        _ => prop.value.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::client::RdpError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    /// Scripted connection: canned responses per method, call log.
    struct ScriptedConnection {
        responses: Mutex<std::collections::HashMap<String, Vec<Value>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedConnection {
        fn new() -> Self {
            Self {
                responses: Mutex::new(std::collections::HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, method: &str, response: Value) {
            self.responses
                .lock()
                .entry(method.to_string())
                .or_default()
                .push(response);
        }
    }

    #[async_trait]
    impl RdpConnection for ScriptedConnection {
        async fn call(&self, method: &str, params: Value) -> Result<Value, RdpError> {
            self.calls.lock().push((method.to_string(), params));
            let mut responses = self.responses.lock();
            match responses.get_mut(method) {
                Some(queue) if !queue.is_empty() => Ok(queue.remove(0)),
                _ => Ok(json!({})),
            }
        }

        async fn close(&self) {}
    }

    fn client(conn: ScriptedConnection) -> Arc<dyn RdpConnection> {
        Arc::new(conn)
    }

    fn remote(value: Value) -> RemoteObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_primitive_rendering() {
        assert_eq!(
            primitive_to_string(&remote(json!({ "type": "undefined" }))),
            "undefined"
        );
        assert_eq!(
            primitive_to_string(&remote(json!({ "type": "string", "value": "hi" }))),
            "\"hi\""
        );
        assert_eq!(
            primitive_to_string(&remote(json!({ "type": "number", "value": 3, "description": "3" }))),
            "3"
        );
        assert_eq!(
            primitive_to_string(&remote(json!({ "type": "number", "description": "Infinity" }))),
            "Infinity"
        );
        assert_eq!(
            primitive_to_string(&remote(json!({ "type": "boolean", "value": true }))),
            "true"
        );
    }

    #[test]
    fn test_function_description_truncation() {
        assert_eq!(
            function_description("function add(a, b) { return a + b; }"),
            "function add(a, b) { … }"
        );
        assert_eq!(function_description("(a) => a * 2"), "(a) => …");
        assert_eq!(function_description("class Foo"), "class Foo");
    }

    #[test]
    fn test_preview_rendering() {
        let obj = remote(json!({
            "type": "object",
            "className": "Object",
            "description": "Object",
            "objectId": "obj:1",
            "preview": {
                "overflow": false,
                "properties": [
                    { "name": "a", "type": "number", "value": "1" },
                    { "name": "b", "type": "string", "value": "x" }
                ]
            }
        }));
        assert_eq!(remote_object_preview(&obj), "Object {a: 1, b: \"x\"}");

        let arr = remote(json!({
            "type": "object",
            "subtype": "array",
            "description": "Array(2)",
            "objectId": "obj:2",
            "preview": {
                "overflow": true,
                "subtype": "array",
                "properties": [
                    { "name": "0", "type": "number", "value": "10" },
                    { "name": "1", "type": "number", "value": "20" }
                ]
            }
        }));
        assert_eq!(remote_object_preview(&arr), "Array(2) [10, 20, …]");
    }

    #[test]
    fn test_sort_variables_numeric_then_lexicographic() {
        let mut variables: Vec<Variable> = ["10", "2", "b", "a", "1"]
            .iter()
            .map(|n| leaf_variable(n, String::new(), None))
            .collect();
        sort_variables(&mut variables);
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["1", "2", "10", "a", "b"]);
    }

    #[test]
    fn test_evaluate_name_composition() {
        assert_eq!(compose_evaluate_name(None, "x").as_deref(), Some("x"));
        assert_eq!(
            compose_evaluate_name(Some("obj"), "field").as_deref(),
            Some("obj.field")
        );
        assert_eq!(
            compose_evaluate_name(Some("arr"), "3").as_deref(),
            Some("arr[3]")
        );
        assert_eq!(
            compose_evaluate_name(Some("obj"), "odd name").as_deref(),
            Some("obj[\"odd name\"]")
        );
    }

    #[tokio::test]
    async fn test_array_counts_from_preview() {
        let store = VariableStore::new();
        let client = client(ScriptedConnection::new());
        let arr = remote(json!({
            "type": "object",
            "subtype": "array",
            "className": "Array",
            "description": "Array(3)",
            "objectId": "obj:9",
            "preview": {
                "overflow": false,
                "subtype": "array",
                "properties": [
                    { "name": "0", "type": "number", "value": "1" },
                    { "name": "1", "type": "number", "value": "2" },
                    { "name": "2", "type": "number", "value": "3" },
                    { "name": "extra", "type": "string", "value": "x" }
                ]
            }
        }));

        let variable = store.create_variable(&client, "list", &arr, None).await;
        assert_eq!(variable.indexed_variables, Some(3));
        // Non-indexed preview props + __proto__ and length.
        assert_eq!(variable.named_variables, Some(3));
        assert!(variable.variables_reference >= 1000);
    }

    #[tokio::test]
    async fn test_map_counts_include_entries_slot() {
        let store = VariableStore::new();
        let client = client(ScriptedConnection::new());
        let map = remote(json!({
            "type": "object",
            "subtype": "map",
            "className": "Map",
            "description": "Map(2)",
            "objectId": "obj:4",
            "preview": {
                "overflow": false,
                "properties": [
                    { "name": "size", "type": "number", "value": "2" },
                    { "name": "k", "type": "string", "value": "v" }
                ]
            }
        }));

        let variable = store.create_variable(&client, "m", &map, None).await;
        assert_eq!(variable.named_variables, Some(3));
        assert_eq!(variable.indexed_variables, None);
    }

    #[tokio::test]
    async fn test_property_listing_merge_and_getter() {
        let conn = ScriptedConnection::new();
        // Accessor-only pass.
        conn.respond(
            "Runtime.getProperties",
            json!({
                "result": [
                    { "name": "computed", "get": { "type": "function", "objectId": "fn:1" } }
                ]
            }),
        );
        // Own-properties pass; "plain" also appears here and wins.
        conn.respond(
            "Runtime.getProperties",
            json!({
                "result": [
                    { "name": "plain", "value": { "type": "number", "value": 1, "description": "1" } }
                ],
                "internalProperties": [
                    { "name": "[[Prototype]]", "value": { "type": "object", "className": "Object", "objectId": "obj:proto" } }
                ]
            }),
        );
        // Getter invocation.
        conn.respond(
            "Runtime.callFunctionOn",
            json!({ "result": { "type": "string", "value": "got" } }),
        );

        let store = VariableStore::new();
        let client = client(conn);
        let container = VariableContainer::Property {
            object_id: "obj:1".to_string(),
            evaluate_name: Some("obj".to_string()),
        };

        let variables = store.expand(&client, &container, None, None, None).await;
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["computed", "plain", "[[Prototype]]"]);
        assert_eq!(variables[0].value, "\"got\"");
        assert_eq!(variables[1].value, "1");
    }

    #[tokio::test]
    async fn test_expansion_error_yields_empty_list() {
        struct FailingConnection;

        #[async_trait]
        impl RdpConnection for FailingConnection {
            async fn call(&self, _method: &str, _params: Value) -> Result<Value, RdpError> {
                Err(RdpError::command("Cannot find context with specified id"))
            }
            async fn close(&self) {}
        }

        let store = VariableStore::new();
        let client: Arc<dyn RdpConnection> = Arc::new(FailingConnection);
        let container = VariableContainer::Property {
            object_id: "obj:gone".to_string(),
            evaluate_name: None,
        };
        let variables = store.expand(&client, &container, None, None, None).await;
        assert!(variables.is_empty());
    }

    #[tokio::test]
    async fn test_scope_zero_injects_this_and_return_value() {
        let conn = ScriptedConnection::new();
        conn.respond("Runtime.getProperties", json!({ "result": [] }));
        conn.respond(
            "Runtime.getProperties",
            json!({
                "result": [
                    { "name": "local", "value": { "type": "number", "value": 5, "description": "5" } }
                ]
            }),
        );

        let store = VariableStore::new();
        let client = client(conn);
        let container = VariableContainer::Scope {
            call_frame_id: "frame:0".to_string(),
            scope_index: 0,
            object_id: "scope:0".to_string(),
            this_obj: Some(remote(json!({ "type": "object", "className": "Window", "objectId": "obj:this", "description": "Window" }))),
            return_value: Some(remote(json!({ "type": "number", "value": 7, "description": "7" }))),
        };

        let variables = store.expand(&client, &container, None, None, None).await;
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["this", "local", "Return value"]);
        assert_eq!(variables[2].value, "7");
    }

    #[tokio::test]
    async fn test_sliced_expansion_uses_window_function() {
        let conn = ScriptedConnection::new();
        conn.respond(
            "Runtime.callFunctionOn",
            json!({ "result": { "type": "object", "subtype": "array", "objectId": "obj:window" } }),
        );
        conn.respond("Runtime.getProperties", json!({ "result": [] }));
        conn.respond(
            "Runtime.getProperties",
            json!({
                "result": [
                    { "name": "2", "value": { "type": "number", "value": 30, "description": "30" } },
                    { "name": "3", "value": { "type": "number", "value": 40, "description": "40" } }
                ]
            }),
        );

        let store = VariableStore::new();
        let client = client(conn);
        let container = VariableContainer::Property {
            object_id: "obj:arr".to_string(),
            evaluate_name: Some("arr".to_string()),
        };

        let variables = store
            .expand(&client, &container, Some("indexed"), Some(2), Some(2))
            .await;
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["2", "3"]);
        assert_eq!(variables[0].evaluate_name.as_deref(), Some("arr[2]"));
    }

    #[tokio::test]
    async fn test_set_value_on_scope() {
        let conn = Arc::new(ScriptedConnection::new());
        conn.respond(
            "Debugger.evaluateOnCallFrame",
            json!({ "result": { "type": "number", "value": 42, "description": "42" } }),
        );
        let client: Arc<dyn RdpConnection> = conn.clone();

        let store = VariableStore::new();
        let container = VariableContainer::Scope {
            call_frame_id: "frame:0".to_string(),
            scope_index: 1,
            object_id: "scope:1".to_string(),
            this_obj: None,
            return_value: None,
        };

        let rendered = store
            .set_value(&client, &container, "count", "6 * 7")
            .await
            .unwrap();
        assert_eq!(rendered, "42");

        let calls = conn.calls.lock();
        let (_, eval) = calls
            .iter()
            .find(|(m, _)| m == "Debugger.evaluateOnCallFrame")
            .unwrap();
        assert_eq!(eval["callFrameId"], "frame:0");
        assert_eq!(eval["expression"], "6 * 7");
        let (_, set) = calls
            .iter()
            .find(|(m, _)| m == "Debugger.setVariableValue")
            .unwrap();
        assert_eq!(set["callFrameId"], "frame:0");
        assert_eq!(set["scopeNumber"], 1);
        assert_eq!(set["variableName"], "count");
        assert_eq!(set["newValue"]["value"], 42);
    }

    #[tokio::test]
    async fn test_set_value_on_scope_reports_evaluation_error() {
        let conn = Arc::new(ScriptedConnection::new());
        conn.respond(
            "Debugger.evaluateOnCallFrame",
            json!({
                "result": { "type": "undefined" },
                "exceptionDetails": {
                    "text": "Uncaught",
                    "exception": { "type": "object", "description": "ReferenceError: nope is not defined" }
                }
            }),
        );
        let client: Arc<dyn RdpConnection> = conn.clone();

        let store = VariableStore::new();
        let container = VariableContainer::Scope {
            call_frame_id: "frame:0".to_string(),
            scope_index: 0,
            object_id: "scope:0".to_string(),
            this_obj: None,
            return_value: None,
        };

        let err = store
            .set_value(&client, &container, "x", "nope")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: nope is not defined");
        // The assignment is never attempted.
        assert!(!conn
            .calls
            .lock()
            .iter()
            .any(|(m, _)| m == "Debugger.setVariableValue"));
    }

    #[tokio::test]
    async fn test_set_value_on_property_escapes_name() {
        let conn = Arc::new(ScriptedConnection::new());
        conn.respond(
            "Runtime.callFunctionOn",
            json!({ "result": { "type": "string", "value": "ok" } }),
        );
        let client: Arc<dyn RdpConnection> = conn.clone();

        let store = VariableStore::new();
        let container = VariableContainer::Property {
            object_id: "obj:1".to_string(),
            evaluate_name: Some("obj".to_string()),
        };

        let rendered = store
            .set_value(&client, &container, "a\\b\"c", "\"ok\"")
            .await
            .unwrap();
        assert_eq!(rendered, "\"ok\"");

        let calls = conn.calls.lock();
        let (_, params) = calls
            .iter()
            .find(|(m, _)| m == "Runtime.callFunctionOn")
            .unwrap();
        assert_eq!(params["objectId"], "obj:1");
        // Backslash and quote both survive into the JS string literal.
        assert_eq!(
            params["functionDeclaration"],
            "function() { return this[\"a\\\\b\\\"c\"] = \"ok\"; }"
        );
    }

    #[tokio::test]
    async fn test_set_value_rejects_read_only_containers() {
        let conn = Arc::new(ScriptedConnection::new());
        let client: Arc<dyn RdpConnection> = conn.clone();
        let store = VariableStore::new();

        let container = VariableContainer::LoggedObjects { args: Vec::new() };
        let err = store
            .set_value(&client, &container, "0", "1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Variable is read-only");
        assert!(conn.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_logged_objects_expand_by_index() {
        let store = VariableStore::new();
        let client = client(ScriptedConnection::new());
        let container = VariableContainer::LoggedObjects {
            args: vec![
                remote(json!({ "type": "string", "value": "first" })),
                remote(json!({ "type": "number", "value": 2, "description": "2" })),
            ],
        };
        let variables = store.expand(&client, &container, None, None, None).await;
        assert_eq!(variables[0].name, "0");
        assert_eq!(variables[0].value, "\"first\"");
        assert_eq!(variables[1].name, "1");
        assert_eq!(variables[1].value, "2");
    }

    #[tokio::test]
    async fn test_handle_reset_invalidates_epoch() {
        let store = VariableStore::new();
        let handle = store.create(VariableContainer::LoggedObjects { args: Vec::new() });
        assert!(store.get(handle).is_some());
        store.reset();
        assert!(store.get(handle).is_none());
    }
}

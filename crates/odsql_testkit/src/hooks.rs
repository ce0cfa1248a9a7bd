//! A configurable, recording event handler.

use odsql_core::{EventHandler, ODataEntry, ODataResponse, ODataResult, RequestContext, UriInfo};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// State key the handler stores in the request context during `before_*`.
pub const BEFORE_MARKER: &str = "recording.before";

/// A mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create.
    Create,
    /// Update or merge.
    Update,
    /// Delete.
    Delete,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// An event handler whose answers are configured per operation and which
/// records every hook invocation.
#[derive(Default)]
pub struct RecordingEventHandler {
    forbidden: HashSet<Operation>,
    before: HashMap<Operation, ODataResponse>,
    on: HashMap<Operation, ODataResponse>,
    after: HashMap<Operation, Option<ODataResponse>>,
    calls: Mutex<Vec<String>>,
    entries: Mutex<Vec<(String, ODataEntry)>>,
    before_seen_in_after: Mutex<Vec<bool>>,
}

impl RecordingEventHandler {
    /// Creates a handler that only records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbids an operation.
    #[must_use]
    pub fn forbid(mut self, operation: Operation) -> Self {
        self.forbidden.insert(operation);
        self
    }

    /// Makes `before_*` return `response`.
    #[must_use]
    pub fn before(mut self, operation: Operation, response: ODataResponse) -> Self {
        self.before.insert(operation, response);
        self
    }

    /// Replaces the default path of an operation with one returning `response`.
    #[must_use]
    pub fn on(mut self, operation: Operation, response: ODataResponse) -> Self {
        self.on.insert(operation, response);
        self
    }

    /// Enables `after_*`, returning `response` from it.
    #[must_use]
    pub fn after(mut self, operation: Operation, response: Option<ODataResponse>) -> Self {
        self.after.insert(operation, response);
        self
    }

    /// Returns the recorded calls, e.g. `before_create:Cars`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the entries hooks were called with, keyed by hook name.
    pub fn entries(&self) -> Vec<(String, ODataEntry)> {
        self.entries.lock().clone()
    }

    /// Returns, per `after_*` call, whether state set by `before_*` was visible.
    pub fn before_seen_in_after(&self) -> Vec<bool> {
        self.before_seen_in_after.lock().clone()
    }

    fn record(&self, hook: &str, operation: Operation, uri: &UriInfo) {
        self.calls
            .lock()
            .push(format!("{hook}_{}:{}", operation.label(), uri.entity_set.name));
    }

    fn record_entry(&self, hook: &str, operation: Operation, entry: &ODataEntry) {
        self.entries
            .lock()
            .push((format!("{hook}_{}", operation.label()), entry.clone()));
    }

    fn run_before(&self, operation: Operation, uri: &UriInfo, context: &mut RequestContext) -> Option<ODataResponse> {
        self.record("before", operation, uri);
        context.insert(BEFORE_MARKER, json!(operation.label()));
        self.before.get(&operation).cloned()
    }

    fn run_on(&self, operation: Operation, uri: &UriInfo) -> ODataResponse {
        self.record("on", operation, uri);
        self.on
            .get(&operation)
            .cloned()
            .unwrap_or_else(ODataResponse::no_content)
    }

    fn run_after(&self, operation: Operation, uri: &UriInfo, context: &mut RequestContext) -> Option<ODataResponse> {
        self.record("after", operation, uri);
        self.before_seen_in_after
            .lock()
            .push(context.get(BEFORE_MARKER).is_some());
        self.after.get(&operation).cloned().flatten()
    }
}

impl EventHandler for RecordingEventHandler {
    fn forbid_create_entity(&self, _uri: &UriInfo) -> bool {
        self.forbidden.contains(&Operation::Create)
    }

    fn before_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        self.record_entry("before", Operation::Create, entry);
        Ok(self.run_before(Operation::Create, uri, context))
    }

    fn is_using_on_create_entity(&self, _uri: &UriInfo) -> bool {
        self.on.contains_key(&Operation::Create)
    }

    fn on_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        _context: &mut RequestContext,
    ) -> ODataResult<ODataResponse> {
        self.record_entry("on", Operation::Create, entry);
        Ok(self.run_on(Operation::Create, uri))
    }

    fn is_using_after_create_entity(&self, _uri: &UriInfo) -> bool {
        self.after.contains_key(&Operation::Create)
    }

    fn after_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        self.record_entry("after", Operation::Create, entry);
        Ok(self.run_after(Operation::Create, uri, context))
    }

    fn forbid_update_entity(&self, _uri: &UriInfo) -> bool {
        self.forbidden.contains(&Operation::Update)
    }

    fn before_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        _merge: bool,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        self.record_entry("before", Operation::Update, entry);
        Ok(self.run_before(Operation::Update, uri, context))
    }

    fn is_using_on_update_entity(&self, _uri: &UriInfo) -> bool {
        self.on.contains_key(&Operation::Update)
    }

    fn on_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        _merge: bool,
        _context: &mut RequestContext,
    ) -> ODataResult<ODataResponse> {
        self.record_entry("on", Operation::Update, entry);
        Ok(self.run_on(Operation::Update, uri))
    }

    fn is_using_after_update_entity(&self, _uri: &UriInfo) -> bool {
        self.after.contains_key(&Operation::Update)
    }

    fn after_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        _merge: bool,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        self.record_entry("after", Operation::Update, entry);
        Ok(self.run_after(Operation::Update, uri, context))
    }

    fn forbid_delete_entity(&self, _uri: &UriInfo) -> bool {
        self.forbidden.contains(&Operation::Delete)
    }

    fn before_delete_entity(&self, uri: &UriInfo, context: &mut RequestContext) -> ODataResult<Option<ODataResponse>> {
        Ok(self.run_before(Operation::Delete, uri, context))
    }

    fn is_using_on_delete_entity(&self, _uri: &UriInfo) -> bool {
        self.on.contains_key(&Operation::Delete)
    }

    fn on_delete_entity(&self, uri: &UriInfo, _context: &mut RequestContext) -> ODataResult<ODataResponse> {
        Ok(self.run_on(Operation::Delete, uri))
    }

    fn is_using_after_delete_entity(&self, _uri: &UriInfo) -> bool {
        self.after.contains_key(&Operation::Delete)
    }

    fn after_delete_entity(&self, uri: &UriInfo, context: &mut RequestContext) -> ODataResult<Option<ODataResponse>> {
        Ok(self.run_after(Operation::Delete, uri, context))
    }
}

impl std::fmt::Debug for RecordingEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingEventHandler")
            .field("forbidden", &self.forbidden)
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

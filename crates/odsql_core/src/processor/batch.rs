//! Batches and changesets.

use super::SqlProcessor;
use crate::context::RequestContext;
use crate::error::{ODataError, ODataResult};
use crate::request::{BatchPart, ODataRequest, RequestBody};
use crate::response::{BatchResponse, BatchResponsePart, ODataResponse};
use odsql_datasource::{Connection, Datasource, PinnedDatasource};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Transaction scope of one changeset.
///
/// Dropping an unsettled scope rolls back; autocommit is always restored.
struct ChangesetScope {
    pinned: Arc<PinnedDatasource>,
    settled: bool,
}

impl ChangesetScope {
    fn begin(connection: Box<dyn Connection>) -> ODataResult<Self> {
        let pinned = Arc::new(PinnedDatasource::new(connection));
        pinned
            .set_auto_commit(false)
            .map_err(|e| ODataError::IllegalState(format!("cannot disable autocommit for changeset: {e}")))?;
        Ok(Self { pinned, settled: false })
    }

    fn datasource(&self) -> Arc<dyn Datasource> {
        self.pinned.clone()
    }

    fn commit(&mut self) -> ODataResult<()> {
        self.pinned.commit()?;
        self.settled = true;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Err(e) = self.pinned.rollback() {
            error!(error = %e, "changeset rollback failed");
        }
        self.settled = true;
    }
}

impl Drop for ChangesetScope {
    fn drop(&mut self) {
        if !self.settled {
            self.rollback();
        }
        if let Err(e) = self.pinned.set_auto_commit(true) {
            error!(error = %e, "failed to restore autocommit after changeset");
        }
    }
}

impl SqlProcessor {
    /// Executes a wire batch: parses the body, runs the parts and writes
    /// the `multipart/mixed` response envelope.
    ///
    /// # Errors
    ///
    /// Fails if no metadata is registered, the body cannot be parsed, or
    /// the batch exceeds the configured limits. Failures of single parts
    /// are answered inside the envelope.
    pub fn execute_batch_request(&self, context: &RequestContext, body: &RequestBody) -> ODataResult<ODataResponse> {
        let edm = self
            .edm
            .as_deref()
            .ok_or_else(|| ODataError::IllegalState("wire batches need entity metadata; none is registered".into()))?;
        let parts = self.codec.read_batch(edm, &body.content_type, &body.bytes)?;
        let batch = self.execute_batch(context, &parts)?;
        self.codec.write_batch(&batch)
    }

    /// Executes a batch.
    ///
    /// Standalone parts run independently, each with its own connection;
    /// a failing part yields an error response without affecting the
    /// others. Changesets run atomically. Responses match parts by position.
    pub fn execute_batch(&self, context: &RequestContext, parts: &[BatchPart]) -> ODataResult<BatchResponse> {
        if parts.len() > self.config.max_batch_parts {
            return Err(ODataError::BadRequest(format!(
                "batch has {} parts, at most {} allowed",
                parts.len(),
                self.config.max_batch_parts
            )));
        }
        let batch_id = Uuid::new_v4().to_string();
        info!(%batch_id, parts = parts.len(), "executing batch");

        let mut responses = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let response = match part {
                BatchPart::Request(request) => {
                    let mut part_context = context.sibling();
                    let response = self
                        .handle(&mut part_context, request)
                        .unwrap_or_else(|e| self.failure(request.method(), &request.uri().request_uri, &e));
                    debug!(%batch_id, index, status = %response.status(), "batch request done");
                    BatchResponsePart::Response(response)
                }
                BatchPart::ChangeSet(requests) => {
                    let responses = self.execute_changeset(context, requests).unwrap_or_else(|e| {
                        error!(%batch_id, index, error = %e, "changeset could not run");
                        vec![e.to_response()]
                    });
                    BatchResponsePart::ChangeSet(responses)
                }
            };
            responses.push(response);
        }
        Ok(BatchResponse {
            batch_id,
            parts: responses,
        })
    }

    /// Executes a changeset atomically.
    ///
    /// All requests run in order on one connection with autocommit off.
    /// The first error response stops execution, rolls everything back and
    /// is returned alone. Otherwise the transaction commits and all
    /// responses are returned.
    ///
    /// # Errors
    ///
    /// Fails if no connection is available, autocommit cannot be disabled,
    /// or the commit fails.
    pub fn execute_changeset(&self, context: &RequestContext, requests: &[ODataRequest]) -> ODataResult<Vec<ODataResponse>> {
        if requests.len() > self.config.max_changeset_size {
            return Err(ODataError::BadRequest(format!(
                "changeset has {} requests, at most {} allowed",
                requests.len(),
                self.config.max_changeset_size
            )));
        }
        if let Some(read) = requests.iter().find(|r| !r.is_mutation()) {
            return Err(ODataError::BadRequest(format!(
                "{} {} is not allowed in a changeset",
                read.method(),
                read.uri().request_uri
            )));
        }

        let mut scope = ChangesetScope::begin(context.connection()?)?;
        let datasource = scope.datasource();
        let mut responses = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let mut sub_context = context.pinned_child(Arc::clone(&datasource));
            let response = self
                .handle(&mut sub_context, request)
                .unwrap_or_else(|e| self.failure(request.method(), &request.uri().request_uri, &e));
            if response.is_error() {
                warn!(index, status = %response.status(), "changeset request failed, rolling back");
                scope.rollback();
                return Ok(vec![response]);
            }
            responses.push(response);
        }
        scope.commit()?;
        info!(requests = requests.len(), "changeset committed");
        Ok(responses)
    }
}

//! Event hooks around create, update and delete.
//!
//! An [`EventHandler`] injects business rules into the default mutation
//! path. For every mutation kind the processor asks, in order:
//!
//! 1. `forbid_*`: true aborts with a forbidden error before any interceptor,
//!    statement builder or SQL runs.
//! 2. `before_*`: may return a response. An error response ends the
//!    operation. A success response with a body for create or update carries
//!    the authoritative entry, which replaces the submitted one for the
//!    rest of the operation. Any other response ends the operation.
//! 3. `is_using_on_*`: true hands the whole operation to `on_*`; no default
//!    statement is built or executed.
//! 4. `is_using_after_*`: true runs `after_*` once the change is applied.
//!    A returned response, of any status, becomes the operation's response.
//!
//! Every method has a default that keeps the default SQL path, so handlers
//! implement only what they need.

use crate::context::RequestContext;
use crate::entity::ODataEntry;
use crate::error::{ODataError, ODataResult};
use crate::request::UriInfo;
use crate::response::ODataResponse;

/// Hooks around the default mutation path.
///
/// Implementations are shared by concurrent requests.
#[allow(unused_variables)]
pub trait EventHandler: Send + Sync {
    /// Returns true to forbid creating entities of the target type.
    fn forbid_create_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs before an entity is created.
    fn before_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }

    /// Returns true if [`EventHandler::on_create_entity`] replaces the default insert.
    fn is_using_on_create_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Creates the entity in place of the default insert.
    fn on_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        context: &mut RequestContext,
    ) -> ODataResult<ODataResponse> {
        Err(ODataError::NotImplemented("on_create_entity".into()))
    }

    /// Returns true if [`EventHandler::after_create_entity`] should run.
    fn is_using_after_create_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs after an entity is created.
    fn after_create_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }

    /// Returns true to forbid updating entities of the target type.
    fn forbid_update_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs before an entity is updated.
    fn before_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        merge: bool,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }

    /// Returns true if [`EventHandler::on_update_entity`] replaces the default update.
    fn is_using_on_update_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Updates the entity in place of the default update.
    fn on_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        merge: bool,
        context: &mut RequestContext,
    ) -> ODataResult<ODataResponse> {
        Err(ODataError::NotImplemented("on_update_entity".into()))
    }

    /// Returns true if [`EventHandler::after_update_entity`] should run.
    fn is_using_after_update_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs after an entity is updated.
    fn after_update_entity(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        merge: bool,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }

    /// Returns true to forbid deleting entities of the target type.
    fn forbid_delete_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs before an entity is deleted.
    fn before_delete_entity(
        &self,
        uri: &UriInfo,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }

    /// Returns true if [`EventHandler::on_delete_entity`] replaces the default delete.
    fn is_using_on_delete_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Deletes the entity in place of the default delete.
    fn on_delete_entity(&self, uri: &UriInfo, context: &mut RequestContext) -> ODataResult<ODataResponse> {
        Err(ODataError::NotImplemented("on_delete_entity".into()))
    }

    /// Returns true if [`EventHandler::after_delete_entity`] should run.
    fn is_using_after_delete_entity(&self, uri: &UriInfo) -> bool {
        false
    }

    /// Runs after an entity is deleted.
    fn after_delete_entity(
        &self,
        uri: &UriInfo,
        context: &mut RequestContext,
    ) -> ODataResult<Option<ODataResponse>> {
        Ok(None)
    }
}

/// An event handler that never intervenes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl EventHandler for NoopEventHandler {}

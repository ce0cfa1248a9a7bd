//! Create, update and delete.

use super::SqlProcessor;
use crate::context::RequestContext;
use crate::edm::EntityType;
use crate::entity::{map_to_json, ODataEntry, PropertyMap, PropertyValue};
use crate::error::{ODataError, ODataResult};
use crate::interceptor::InterceptPoint;
use crate::request::{KeyPredicate, RequestBody, UriInfo};
use crate::response::{ODataResponse, StatusCode};
use odsql_datasource::{Connection, SqlType, SqlValue};
use tracing::{debug, warn};

/// What a before-hook response means for the rest of the operation.
enum BeforeOutcome {
    /// End the operation with this response.
    Respond(ODataResponse),
    /// Continue with this entry in place of the submitted one.
    Continue(ODataEntry),
}

impl SqlProcessor {
    /// Creates an entity and returns it as stored.
    pub fn create_entity(
        &self,
        context: &mut RequestContext,
        uri: &UriInfo,
        body: &RequestBody,
    ) -> ODataResult<ODataResponse> {
        let ty = uri.target_type();
        if self.events.forbid_create_entity(uri) {
            return Err(ODataError::forbidden("Create", ty.fqn()));
        }
        let mut entry = self.codec.read_entry(ty, &body.content_type, &body.bytes)?;

        if let Some(response) = self.events.before_create_entity(uri, &entry, context)? {
            match self.before_outcome(ty, response, true)? {
                BeforeOutcome::Respond(response) => return Ok(response),
                BeforeOutcome::Continue(authoritative) => entry = authoritative,
            }
        }
        if self.events.is_using_on_create_entity(uri) {
            return self.events.on_create_entity(uri, &entry, context);
        }

        let builder = self.query_builder.insert(uri, &entry)?;
        let generated = builder.has_server_generated_key(ty);
        if !generated && entry.key_values(ty).is_none() {
            return Err(ODataError::BadRequest(format!(
                "all key properties of {} must be provided",
                ty.fqn()
            )));
        }
        let builder = self.intercept(InterceptPoint::Create, builder, uri, context)?;

        let mut connection = context.connection()?;
        self.execute(connection.as_mut(), context, builder.as_ref())?;
        let keys = match entry.key_values(ty) {
            Some(keys) => keys,
            None => recover_generated_key(connection.as_mut(), ty, &mut entry)?,
        };

        if self.events.is_using_after_create_entity(uri) {
            if let Some(response) = self.events.after_create_entity(uri, &entry, context)? {
                return Ok(response);
            }
        }

        let created = entity_uri(uri, &keys);
        match self.select_entity(connection.as_mut(), context, &created)? {
            Some(root) => self.codec.write_entry(StatusCode::CREATED, &created, root.render_for_expand()),
            None => {
                debug!(entity_type = %ty.fqn(), "created entity not visible, returning submitted entry");
                self.codec
                    .write_entry(StatusCode::CREATED, &created, map_to_json(&entry.properties))
            }
        }
    }

    /// Updates one entity by key.
    pub fn update_entity(
        &self,
        context: &mut RequestContext,
        uri: &UriInfo,
        body: &RequestBody,
        merge: bool,
    ) -> ODataResult<ODataResponse> {
        let ty = uri.target_type();
        if uri.filter.is_some() {
            return Err(ODataError::BadRequest("update with $filter is not supported".into()));
        }
        if self.events.forbid_update_entity(uri) {
            return Err(ODataError::forbidden("Update", ty.fqn()));
        }
        let keys = uri.key_values()?;
        let mut entry = self.codec.read_entry(ty, &body.content_type, &body.bytes)?;

        if let Some(response) = self.events.before_update_entity(uri, &entry, merge, context)? {
            match self.before_outcome(ty, response, true)? {
                BeforeOutcome::Respond(response) => return Ok(response),
                BeforeOutcome::Continue(authoritative) => entry = authoritative,
            }
        }
        if self.events.is_using_on_update_entity(uri) {
            return self.events.on_update_entity(uri, &entry, merge, context);
        }

        let mut connection = context.connection()?;
        let current = entity_uri(uri, &keys);
        if self.select_entity(connection.as_mut(), context, &current)?.is_none() {
            return Err(ODataError::NotFound(format!("{}{}", uri.entity_set.name, describe(&keys))));
        }
        let builder = self.intercept(
            InterceptPoint::Update,
            self.query_builder.update(uri, &entry, &keys, merge)?,
            uri,
            context,
        )?;
        self.execute(connection.as_mut(), context, builder.as_ref())?;

        if self.events.is_using_after_update_entity(uri) {
            if let Some(response) = self.events.after_update_entity(uri, &entry, merge, context)? {
                return Ok(response);
            }
        }
        Ok(ODataResponse::no_content())
    }

    /// Deletes one entity by key.
    pub fn delete_entity(&self, context: &mut RequestContext, uri: &UriInfo) -> ODataResult<ODataResponse> {
        let ty = uri.target_type();
        if self.events.forbid_delete_entity(uri) {
            return Err(ODataError::forbidden("Delete", ty.fqn()));
        }
        if let Some(response) = self.events.before_delete_entity(uri, context)? {
            if let BeforeOutcome::Respond(response) = self.before_outcome(ty, response, false)? {
                return Ok(response);
            }
        }
        if self.events.is_using_on_delete_entity(uri) {
            return self.events.on_delete_entity(uri, context);
        }

        let keys = uri.key_values()?;
        let builder = self.intercept(
            InterceptPoint::Delete,
            self.query_builder.delete(uri, &keys)?,
            uri,
            context,
        )?;
        let mut connection = context.connection()?;
        let deleted = self.execute(connection.as_mut(), context, builder.as_ref())?;
        if deleted == 0 {
            debug!(entity_set = %uri.entity_set.name, keys = %describe(&keys), "delete matched no rows");
        }

        if self.events.is_using_after_delete_entity(uri) {
            if let Some(response) = self.events.after_delete_entity(uri, context)? {
                return Ok(response);
            }
        }
        Ok(ODataResponse::no_content())
    }

    fn before_outcome(&self, ty: &EntityType, response: ODataResponse, accepts_entry: bool) -> ODataResult<BeforeOutcome> {
        if response.is_error() {
            warn!(entity_type = %ty.fqn(), status = %response.status(), "before hook returned an error response");
            return Ok(BeforeOutcome::Respond(response));
        }
        if accepts_entry && response.has_body() {
            let content_type = response.content_type().unwrap_or("application/json");
            let entry = self.codec.read_entry(ty, content_type, response.body())?;
            return Ok(BeforeOutcome::Continue(entry));
        }
        Ok(BeforeOutcome::Respond(response))
    }
}

/// Addresses the entity with `keys` in the same set, without query options
/// other than `$expand` and `$select`.
fn entity_uri(uri: &UriInfo, keys: &PropertyMap) -> UriInfo {
    let mut target = UriInfo::new(uri.entity_set.clone());
    target.select = uri.select.clone();
    target.expand = uri.expand.clone();
    target.key_predicates = keys
        .iter()
        .filter_map(|(name, value)| match value {
            PropertyValue::Simple(v) => Some(KeyPredicate {
                property: name.clone(),
                value: v.clone(),
            }),
            PropertyValue::Complex(_) => None,
        })
        .collect();
    target
}

fn recover_generated_key(connection: &mut dyn Connection, ty: &EntityType, entry: &mut ODataEntry) -> ODataResult<PropertyMap> {
    let mut key_properties = ty.key_properties();
    let (Some(key), None) = (key_properties.next(), key_properties.next()) else {
        return Err(ODataError::Internal(format!(
            "{} has a composite key and cannot use a generated key",
            ty.fqn()
        )));
    };
    let value = connection
        .last_generated_key()?
        .filter(|v| !v.is_null())
        .ok_or_else(|| ODataError::Internal(format!("no key generated for {}", ty.fqn())))?;
    let value = match (key.edm_type.sql_type(), value) {
        (SqlType::Varchar, SqlValue::Integer(n)) => SqlValue::Text(n.to_string()),
        (_, v) => v,
    };
    entry.properties.insert(key.name.clone(), PropertyValue::Simple(value.clone()));
    let mut keys = PropertyMap::new();
    keys.insert(key.name.clone(), PropertyValue::Simple(value));
    Ok(keys)
}

fn describe(keys: &PropertyMap) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|(name, value)| match value {
            PropertyValue::Simple(v) => format!("{name}={v}"),
            PropertyValue::Complex(_) => format!("{name}=?"),
        })
        .collect();
    format!("({})", parts.join(","))
}

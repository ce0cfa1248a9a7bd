//! Read operations.

use super::paging::{next_link, PageInfo};
use super::SqlProcessor;
use crate::accumulator::ExpandAccumulator;
use crate::context::RequestContext;
use crate::entity::{IdentityKey, ResultSetEntity};
use crate::error::{ODataError, ODataResult};
use crate::interceptor::InterceptPoint;
use crate::request::UriInfo;
use crate::response::{ODataResponse, StatusCode};
use crate::statement::StatementBuilder;
use odsql_datasource::{Connection, ResultSet, SqlValue};
use tracing::debug;

impl SqlProcessor {
    /// Reads one entity by key, expanded as requested.
    ///
    /// Zero matching rows produce `204 No Content`.
    pub fn read_entity(&self, context: &RequestContext, uri: &UriInfo) -> ODataResult<ODataResponse> {
        let mut connection = context.connection()?;
        match self.select_entity(connection.as_mut(), context, uri)? {
            Some(root) => self.codec.write_entry(StatusCode::OK, uri, root.render_for_expand()),
            None => Ok(ODataResponse::no_content()),
        }
    }

    /// Reads a page of an entity set, expanded as requested.
    ///
    /// With `$expand` the page is chosen by a key-only query first, then the
    /// selected roots are re-read joined with their expansions, so paging
    /// never cuts a root's children.
    pub fn read_entity_set(&self, context: &RequestContext, uri: &UriInfo) -> ODataResult<ODataResponse> {
        let mut connection = context.connection()?;
        let connection = connection.as_mut();
        let ty = uri.target_type();

        let (roots, page) = if uri.has_expand() {
            let keys_builder = self.intercept(InterceptPoint::Read, self.query_builder.select_keys(uri)?, uri, context)?;
            let page = PageInfo::of(keys_builder.as_ref(), ty);
            let rows = self.query(connection, context, keys_builder.as_ref())?;
            let reader = self.reader(keys_builder.as_ref());
            let keys = rows
                .rows()
                .map(|row| reader.read_key(&row, ty))
                .collect::<ODataResult<Vec<IdentityKey>>>()?;
            debug!(entity_set = %uri.entity_set.name, roots = keys.len(), "selected page keys");
            if keys.is_empty() {
                (Vec::new(), page)
            } else {
                let builder = self.intercept(
                    InterceptPoint::Read,
                    self.query_builder.select_entity_set(uri, &keys)?,
                    uri,
                    context,
                )?;
                let rows = self.query(connection, context, builder.as_ref())?;
                (self.accumulate(&rows, builder.as_ref(), uri)?, page)
            }
        } else {
            let builder = self.intercept(
                InterceptPoint::Read,
                self.query_builder.select_entity_set(uri, &[])?,
                uri,
                context,
            )?;
            let page = PageInfo::of(builder.as_ref(), ty);
            let rows = self.query(connection, context, builder.as_ref())?;
            (self.accumulate(&rows, builder.as_ref(), uri)?, page)
        };

        let count = if uri.inline_count {
            Some(self.count(connection, context, uri)?)
        } else {
            None
        };
        let next = next_link(&uri.request_uri, roots.len(), &page, uri.effective_skip());
        let entities = roots.iter().map(ExpandAccumulator::render_for_expand).collect();
        self.codec.write_feed(uri, entities, count, next)
    }

    /// Reads a single property of one entity, or its raw `$value`.
    pub fn read_entity_property(&self, context: &RequestContext, uri: &UriInfo) -> ODataResult<ODataResponse> {
        let ty = uri.target_type();
        let name = uri
            .property_path
            .as_deref()
            .ok_or_else(|| ODataError::BadRequest("no property addressed".into()))?;
        let property = ty
            .property(name)
            .ok_or_else(|| ODataError::NotFound(format!("property {name} of {}", ty.fqn())))?;

        let mut connection = context.connection()?;
        let builder = self.intercept(InterceptPoint::Read, self.query_builder.select_entity(uri)?, uri, context)?;
        let rows = self.query(connection.as_mut(), context, builder.as_ref())?;
        let Some(row) = rows.rows().next() else {
            return Ok(ODataResponse::no_content());
        };
        let value = self.reader(builder.as_ref()).read_property(&row, &ty.fqn(), ty, property)?;
        self.codec.write_property(uri, name, &value)
    }

    /// Counts an entity set.
    ///
    /// `$top`, `$skip` and `$skiptoken` are rejected as not implemented.
    pub fn count_entity_set(&self, context: &RequestContext, uri: &UriInfo) -> ODataResult<ODataResponse> {
        if uri.top.is_some() || uri.skip.is_some() || uri.skip_token.is_some() {
            return Err(ODataError::NotImplemented("$count combined with $top, $skip or $skiptoken".into()));
        }
        let mut connection = context.connection()?;
        let count = self.count(connection.as_mut(), context, uri)?;
        self.codec.write_count(count)
    }

    pub(super) fn select_entity(
        &self,
        connection: &mut dyn Connection,
        context: &RequestContext,
        uri: &UriInfo,
    ) -> ODataResult<Option<ExpandAccumulator>> {
        let builder = self.intercept(InterceptPoint::Read, self.query_builder.select_entity(uri)?, uri, context)?;
        let rows = self.query(connection, context, builder.as_ref())?;
        Ok(self.accumulate(&rows, builder.as_ref(), uri)?.into_iter().next())
    }

    fn count(&self, connection: &mut dyn Connection, context: &RequestContext, uri: &UriInfo) -> ODataResult<u64> {
        let builder = self.intercept(InterceptPoint::Read, self.query_builder.select_count(uri)?, uri, context)?;
        let rows = self.query(connection, context, builder.as_ref())?;
        let count = rows
            .rows()
            .next()
            .and_then(|row| row.first().and_then(SqlValue::as_i64))
            .and_then(|n| u64::try_from(n).ok());
        count.ok_or_else(|| ODataError::Materialization("count statement returned no number".into()))
    }

    /// Folds rows into root entities with their expansions.
    ///
    /// Rows of one root must be consecutive; a new root starts whenever the
    /// root identity changes. Rows whose root key is entirely null are
    /// skipped.
    fn accumulate(
        &self,
        rows: &ResultSet,
        builder: &dyn StatementBuilder,
        uri: &UriInfo,
    ) -> ODataResult<Vec<ExpandAccumulator>> {
        let reader = self.reader(builder);
        let ty = uri.target_type();
        let properties = uri.selected_properties();
        let mut roots: Vec<ExpandAccumulator> = Vec::new();

        for row in rows.rows() {
            let entity = reader.read_entity(&row, ty, &properties)?;
            if entity.is_empty() {
                continue;
            }
            if !roots.last().is_some_and(|root| root.is_accumulator_for(&entity)) {
                roots.push(ExpandAccumulator::new(entity));
            }
            let Some(root) = roots.last_mut() else {
                continue;
            };
            for path in &uri.expand {
                let mut parents: Vec<ResultSetEntity> = Vec::new();
                for segment in path.segments() {
                    let child = reader.read_full_entity(&row, &segment.target)?;
                    if child.is_empty() {
                        break;
                    }
                    let chain: Vec<&ResultSetEntity> = parents.iter().collect();
                    root.add_expand_entity(child.clone(), &chain)?;
                    parents.push(child);
                }
            }
        }
        Ok(roots)
    }
}

//! Interceptors and query builder wrappers for observing the processor.

use odsql_core::{
    EntityType, IdentityKey, InterceptPoint, Intercepted, Interceptor, ODataEntry, ODataError, ODataResult,
    PropertyMap, QueryBuilder, RequestContext, SqlContext, Statement, StatementBuilder, StatementKind, UriInfo,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A shared, ordered log.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty log.
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn point_label(point: InterceptPoint) -> &'static str {
    match point {
        InterceptPoint::Read => "read",
        InterceptPoint::Create => "create",
        InterceptPoint::Update => "update",
        InterceptPoint::Delete => "delete",
    }
}

/// Logs `name:point:kind` for every builder it sees and changes nothing.
#[derive(Debug, Clone)]
pub struct RecordingInterceptor {
    name: String,
    log: CallLog,
}

impl RecordingInterceptor {
    /// Creates an interceptor writing to `log`.
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self { name: name.into(), log }
    }

    fn record(&self, point: InterceptPoint, builder: Box<dyn StatementBuilder>) -> ODataResult<Intercepted> {
        self.log
            .lock()
            .push(format!("{}:{}:{:?}", self.name, point_label(point), builder.kind()));
        Ok(Intercepted::Unchanged(builder))
    }
}

impl Interceptor for RecordingInterceptor {
    fn on_read(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.record(InterceptPoint::Read, builder)
    }

    fn on_create(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.record(InterceptPoint::Create, builder)
    }

    fn on_update(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.record(InterceptPoint::Update, builder)
    }

    fn on_delete(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.record(InterceptPoint::Delete, builder)
    }
}

/// A statement whose SQL is the inner statement's with one substring replaced.
pub struct RewrittenStatement {
    inner: Box<dyn StatementBuilder>,
    from: String,
    to: String,
}

impl StatementBuilder for RewrittenStatement {
    fn kind(&self) -> StatementKind {
        self.inner.kind()
    }

    fn build(&self, context: &SqlContext) -> ODataResult<Statement> {
        let statement = self.inner.build(context)?;
        Ok(Statement::new(statement.sql.replace(&self.from, &self.to), statement.params))
    }

    fn column_alias(&self, type_fqn: &str, property: &str) -> ODataResult<String> {
        self.inner.column_alias(type_fqn, property)
    }

    fn is_transient(&self, type_fqn: &str, property: &str) -> bool {
        self.inner.is_transient(type_fqn, property)
    }

    fn row_number_alias(&self, ty: &EntityType) -> String {
        self.inner.row_number_alias(ty)
    }

    fn has_server_generated_key(&self, ty: &EntityType) -> bool {
        self.inner.has_server_generated_key(ty)
    }

    fn is_serverside_paging(&self) -> bool {
        self.inner.is_serverside_paging()
    }

    fn top(&self) -> Option<u32> {
        self.inner.top()
    }

    fn page_size(&self, ty: &EntityType) -> u32 {
        self.inner.page_size(ty)
    }
}

/// Rewrites the SQL of every read, e.g. to swap a table for a restricted subquery.
#[derive(Debug, Clone)]
pub struct ReadRewriteInterceptor {
    from: String,
    to: String,
}

impl ReadRewriteInterceptor {
    /// Replaces `from` with `to` in read statements.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Interceptor for ReadRewriteInterceptor {
    fn on_read(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        Ok(Intercepted::Replaced(Box::new(RewrittenStatement {
            inner: builder,
            from: self.from.clone(),
            to: self.to.clone(),
        })))
    }
}

/// Fails at one interception point.
#[derive(Debug, Clone, Copy)]
pub struct FailingInterceptor {
    point: InterceptPoint,
}

impl FailingInterceptor {
    /// Fails whenever `point` is intercepted.
    pub fn at(point: InterceptPoint) -> Self {
        Self { point }
    }

    fn check(&self, point: InterceptPoint, builder: Box<dyn StatementBuilder>) -> ODataResult<Intercepted> {
        if point == self.point {
            return Err(ODataError::Internal(format!("interceptor refused {}", point_label(point))));
        }
        Ok(Intercepted::Unchanged(builder))
    }
}

impl Interceptor for FailingInterceptor {
    fn on_read(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.check(InterceptPoint::Read, builder)
    }

    fn on_create(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.check(InterceptPoint::Create, builder)
    }

    fn on_update(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.check(InterceptPoint::Update, builder)
    }

    fn on_delete(&self, builder: Box<dyn StatementBuilder>, _uri: &UriInfo, _ctx: &RequestContext) -> ODataResult<Intercepted> {
        self.check(InterceptPoint::Delete, builder)
    }
}

/// A query builder that logs which statements were requested.
pub struct CountingQueryBuilder {
    inner: Arc<dyn QueryBuilder>,
    log: Mutex<Vec<StatementKind>>,
}

impl CountingQueryBuilder {
    /// Wraps a query builder.
    pub fn new(inner: Arc<dyn QueryBuilder>) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Returns the requested statement kinds in order.
    pub fn requested(&self) -> Vec<StatementKind> {
        self.log.lock().clone()
    }

    fn note(&self, kind: StatementKind) {
        self.log.lock().push(kind);
    }
}

impl QueryBuilder for CountingQueryBuilder {
    fn select_entity(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::SelectEntity);
        self.inner.select_entity(uri)
    }

    fn select_entity_set(&self, uri: &UriInfo, pinned: &[IdentityKey]) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::SelectEntitySet);
        self.inner.select_entity_set(uri, pinned)
    }

    fn select_keys(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::SelectKeys);
        self.inner.select_keys(uri)
    }

    fn select_count(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::Count);
        self.inner.select_count(uri)
    }

    fn insert(&self, uri: &UriInfo, entry: &ODataEntry) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::Insert);
        self.inner.insert(uri, entry)
    }

    fn update(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        keys: &PropertyMap,
        merge: bool,
    ) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::Update);
        self.inner.update(uri, entry, keys, merge)
    }

    fn delete(&self, uri: &UriInfo, keys: &PropertyMap) -> ODataResult<Box<dyn StatementBuilder>> {
        self.note(StatementKind::Delete);
        self.inner.delete(uri, keys)
    }
}

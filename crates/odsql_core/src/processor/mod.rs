//! The request orchestrator.
//!
//! [`SqlProcessor`] implements one operation per protocol verb on top of a
//! [`QueryBuilder`], the interceptor chain, the event handler and the
//! result materializer. Every operation acquires its connection from the
//! [`RequestContext`] it is given and releases it when the operation ends.

mod batch;
mod paging;
mod read;
mod write;

pub use paging::{next_link, PageInfo};

use crate::codec::{JsonCodec, ProtocolCodec};
use crate::config::ProcessorConfig;
use crate::context::RequestContext;
use crate::edm::EdmProvider;
use crate::error::{ODataError, ODataResult};
use crate::handler::{EventHandler, NoopEventHandler};
use crate::interceptor::{InterceptPoint, Interceptor, InterceptorChain};
use crate::materializer::{IdentityCustomizer, PropertyValueCustomizer, ResultSetReader};
use crate::request::{ODataRequest, UriInfo};
use crate::response::ODataResponse;
use crate::statement::{QueryBuilder, StatementBuilder};
use odsql_datasource::{Connection, Datasource, ResultSet};
use std::sync::Arc;
use tracing::{debug, error};

/// Executes protocol requests against a SQL datasource.
///
/// A processor is built once and shared; registered interceptors and the
/// event handler must be safe under concurrent use.
pub struct SqlProcessor {
    datasource: Arc<dyn Datasource>,
    query_builder: Arc<dyn QueryBuilder>,
    codec: Arc<dyn ProtocolCodec>,
    events: Arc<dyn EventHandler>,
    interceptors: InterceptorChain,
    customizer: Arc<dyn PropertyValueCustomizer>,
    edm: Option<Arc<dyn EdmProvider>>,
    config: ProcessorConfig,
}

impl SqlProcessor {
    /// Starts building a processor.
    pub fn builder(datasource: Arc<dyn Datasource>, query_builder: Arc<dyn QueryBuilder>) -> SqlProcessorBuilder {
        SqlProcessorBuilder {
            processor: SqlProcessor {
                datasource,
                query_builder,
                codec: Arc::new(JsonCodec),
                events: Arc::new(NoopEventHandler),
                interceptors: InterceptorChain::new(),
                customizer: Arc::new(IdentityCustomizer),
                edm: None,
                config: ProcessorConfig::default(),
            },
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Creates a context for one operation on the processor's datasource.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(Arc::clone(&self.datasource))
    }

    /// Dispatches a request to its operation.
    pub fn handle(&self, context: &mut RequestContext, request: &ODataRequest) -> ODataResult<ODataResponse> {
        match request {
            ODataRequest::ReadEntity(uri) => self.read_entity(context, uri),
            ODataRequest::ReadEntitySet(uri) => self.read_entity_set(context, uri),
            ODataRequest::ReadProperty(uri) => self.read_entity_property(context, uri),
            ODataRequest::Count(uri) => self.count_entity_set(context, uri),
            ODataRequest::Create { uri, body } => self.create_entity(context, uri, body),
            ODataRequest::Update { uri, body, merge } => self.update_entity(context, uri, body, *merge),
            ODataRequest::Delete(uri) => self.delete_entity(context, uri),
        }
    }

    /// Handles a request in a fresh context, turning failures into error responses.
    pub fn handle_request(&self, request: &ODataRequest) -> ODataResponse {
        let mut context = self.context();
        self.handle(&mut context, request)
            .unwrap_or_else(|e| self.failure(request.method(), &request.uri().request_uri, &e))
    }

    fn failure(&self, method: &str, uri: &str, error: &ODataError) -> ODataResponse {
        if error.is_server_error() {
            error!(method, uri, %error, "unable to serve request");
        } else {
            debug!(method, uri, %error, "request rejected");
        }
        error.to_response()
    }

    fn intercept(
        &self,
        point: InterceptPoint,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Box<dyn StatementBuilder>> {
        self.interceptors.apply(point, builder, uri, context)
    }

    fn query(
        &self,
        connection: &mut dyn Connection,
        context: &RequestContext,
        builder: &dyn StatementBuilder,
    ) -> ODataResult<ResultSet> {
        let statement = builder.build(&context.sql_context(connection))?;
        if self.config.log_statements {
            debug!(kind = ?builder.kind(), sql = %statement.sql, params = statement.params.len(), "query");
        }
        Ok(connection.query(&statement.sql, &statement.params)?)
    }

    fn execute(
        &self,
        connection: &mut dyn Connection,
        context: &RequestContext,
        builder: &dyn StatementBuilder,
    ) -> ODataResult<u64> {
        let statement = builder.build(&context.sql_context(connection))?;
        if self.config.log_statements {
            debug!(kind = ?builder.kind(), sql = %statement.sql, params = statement.params.len(), "execute");
        }
        Ok(connection.execute(&statement.sql, &statement.params)?)
    }

    fn reader<'a>(&'a self, builder: &'a dyn StatementBuilder) -> ResultSetReader<'a> {
        ResultSetReader::new(builder, self.customizer.as_ref())
    }
}

impl std::fmt::Debug for SqlProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlProcessor")
            .field("interceptors", &self.interceptors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SqlProcessor`].
pub struct SqlProcessorBuilder {
    processor: SqlProcessor,
}

impl SqlProcessorBuilder {
    /// Sets the payload codec. Defaults to [`JsonCodec`].
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn ProtocolCodec>) -> Self {
        self.processor.codec = codec;
        self
    }

    /// Sets the event handler. Defaults to [`NoopEventHandler`].
    #[must_use]
    pub fn event_handler(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.processor.events = events;
        self
    }

    /// Appends an interceptor; interceptors run in the order they are added.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.processor.interceptors.push(interceptor);
        self
    }

    /// Sets the property value customizer.
    #[must_use]
    pub fn customizer(mut self, customizer: Arc<dyn PropertyValueCustomizer>) -> Self {
        self.processor.customizer = customizer;
        self
    }

    /// Sets the metadata used to resolve request lines of wire batches.
    #[must_use]
    pub fn edm(mut self, edm: Arc<dyn EdmProvider>) -> Self {
        self.processor.edm = Some(edm);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.processor.config = config;
        self
    }

    /// Finishes the processor.
    pub fn build(self) -> SqlProcessor {
        self.processor
    }
}

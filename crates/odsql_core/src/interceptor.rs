//! Statement builder interceptors.

use crate::context::RequestContext;
use crate::error::ODataResult;
use crate::request::UriInfo;
use crate::statement::StatementBuilder;
use std::sync::Arc;
use tracing::trace;

/// The result of one interceptor stage.
pub enum Intercepted {
    /// The stage had no opinion; the builder it received is passed on.
    Unchanged(Box<dyn StatementBuilder>),
    /// The stage replaced the builder.
    Replaced(Box<dyn StatementBuilder>),
}

impl Intercepted {
    /// Returns the builder carried by either variant.
    pub fn into_builder(self) -> Box<dyn StatementBuilder> {
        match self {
            Intercepted::Unchanged(b) | Intercepted::Replaced(b) => b,
        }
    }

    /// Returns true if the builder was replaced.
    pub fn is_replaced(&self) -> bool {
        matches!(self, Intercepted::Replaced(_))
    }
}

impl std::fmt::Debug for Intercepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intercepted::Unchanged(b) => f.debug_tuple("Unchanged").field(&b.kind()).finish(),
            Intercepted::Replaced(b) => f.debug_tuple("Replaced").field(&b.kind()).finish(),
        }
    }
}

/// A rewriter of statement builders.
///
/// Each method receives the builder produced so far and either hands it
/// back unchanged or returns a replacement, typically a wrapper delegating
/// to the original. Interceptors are shared by concurrent requests.
#[allow(unused_variables)]
pub trait Interceptor: Send + Sync {
    /// Intercepts selects and counts.
    fn on_read(
        &self,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Intercepted> {
        Ok(Intercepted::Unchanged(builder))
    }

    /// Intercepts inserts.
    fn on_create(
        &self,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Intercepted> {
        Ok(Intercepted::Unchanged(builder))
    }

    /// Intercepts updates.
    fn on_update(
        &self,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Intercepted> {
        Ok(Intercepted::Unchanged(builder))
    }

    /// Intercepts deletes.
    fn on_delete(
        &self,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Intercepted> {
        Ok(Intercepted::Unchanged(builder))
    }
}

/// Which interceptor method applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptPoint {
    /// [`Interceptor::on_read`]
    Read,
    /// [`Interceptor::on_create`]
    Create,
    /// [`Interceptor::on_update`]
    Update,
    /// [`Interceptor::on_delete`]
    Delete,
}

/// Interceptors applied in registration order.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Returns the number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns true if no interceptor is registered.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Threads `builder` through every interceptor.
    ///
    /// # Errors
    ///
    /// The first failing interceptor aborts the chain.
    pub fn apply(
        &self,
        point: InterceptPoint,
        builder: Box<dyn StatementBuilder>,
        uri: &UriInfo,
        context: &RequestContext,
    ) -> ODataResult<Box<dyn StatementBuilder>> {
        let mut current = builder;
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            let outcome = match point {
                InterceptPoint::Read => interceptor.on_read(current, uri, context)?,
                InterceptPoint::Create => interceptor.on_create(current, uri, context)?,
                InterceptPoint::Update => interceptor.on_update(current, uri, context)?,
                InterceptPoint::Delete => interceptor.on_delete(current, uri, context)?,
            };
            if outcome.is_replaced() {
                trace!(index, ?point, "interceptor replaced statement builder");
            }
            current = outcome.into_builder();
        }
        Ok(current)
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

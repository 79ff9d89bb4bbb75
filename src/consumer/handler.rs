//! Event handler abstraction for the consumption loop.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::Decoded;
use crate::error::HandlerError;

/// Processes decoded deliveries.
///
/// Returning `Ok` acknowledges the delivery. An error nacks it for retry
/// and ends the consumption loop.
pub trait EventHandler<E>: Send + Sync {
    fn handle(&self, event: Arc<Decoded<E>>) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<E, F, Fut> EventHandler<E> for F
where
    F: Fn(Arc<Decoded<E>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, event: Arc<Decoded<E>>) -> BoxFuture<'static, Result<(), HandlerError>> {
        self(event).boxed()
    }
}

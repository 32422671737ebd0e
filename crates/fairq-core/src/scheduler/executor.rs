//! Executor contract: the caller-supplied async unit of work per task type.

use std::future::Future;

use futures::future::BoxFuture;

use super::context::TaskContext;
use super::TaskData;

/// Performs the work for one task. Returning `Err` counts as a failed
/// attempt and goes through the queue's retry policy.
pub trait Executor<T: TaskData>: Send + Sync + 'static {
    fn execute(&self, data: T, ctx: TaskContext<T>) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<T, F, Fut> Executor<T> for F
where
    T: TaskData,
    F: Fn(T, TaskContext<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn execute(&self, data: T, ctx: TaskContext<T>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(data, ctx))
    }
}

//! Boxed future returned across trait seams

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Async task wrapper for boxing futures with combinator chaining
pub enum AsyncTask<T> {
    FutureVariant(Pin<Box<dyn Future<Output = T> + Send + 'static>>),
}

impl<T> AsyncTask<T> {
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        AsyncTask::FutureVariant(Box::pin(fut))
    }

    /// Task that resolves immediately to `value`
    pub fn ready(value: T) -> Self
    where
        T: Send + 'static,
    {
        Self::from_future(std::future::ready(value))
    }
}

impl<T> Future for AsyncTask<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let AsyncTask::FutureVariant(fut) = &mut *self;
        fut.as_mut().poll(cx)
    }
}

impl<T, E> AsyncTask<Result<T, E>> {
    /// Map the success value
    pub fn map<U, F>(self, f: F) -> AsyncTask<Result<U, E>>
    where
        F: FnOnce(T) -> U + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        U: Send + 'static,
    {
        let AsyncTask::FutureVariant(fut) = self;
        AsyncTask::from_future(async move { fut.await.map(f) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn map_transforms_success_only() {
        let ok: AsyncTask<Result<u32, String>> = AsyncTask::ready(Ok(20));
        assert_eq!(ok.map(|v| v + 1).await, Ok(21));

        let err: AsyncTask<Result<u32, String>> = AsyncTask::ready(Err("boom".into()));
        assert_eq!(err.map(|v| v + 1).await, Err("boom".to_string()));
    }
}

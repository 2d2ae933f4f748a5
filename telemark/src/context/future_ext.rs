use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use pin_project_lite::pin_project;

use crate::Context;

pin_project! {
    /// A future that attaches a captured [`Context`] around every poll.
    ///
    /// The context is current for the duration of each `poll` call and
    /// detached again before control returns to the executor, preserving
    /// the scoped-attach contract across task boundaries.
    #[derive(Debug)]
    pub struct WithContext<F> {
        #[pin]
        inner: F,
        cx: Context,
    }
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        this.inner.poll(task_cx)
    }
}

/// Extension trait carrying a [`Context`] across `await` points.
pub trait FutureContextExt: Sized {
    /// Attach the provided context to this future.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attach the context that is current at call time to this future.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(Context::current())
    }
}

impl<F: Future> FutureContextExt for F {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(&'static str);

    #[test]
    fn context_is_current_while_polling() {
        let cx = Context::new().with_value(Marker("inside"));
        let fut = async {
            assert_eq!(Context::current().get::<Marker>(), Some(&Marker("inside")));
        }
        .with_context(cx);

        futures_executor::block_on(fut);
        assert_eq!(Context::current().get::<Marker>(), None);
    }
}

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Output of [`Select::select`]: whichever of the two futures resolved
/// first. Polling is biased toward `self` (the left-hand future) on ties so
/// call sites get deterministic behavior when both are ready on the same
/// poll.
pub enum SelectOutput<A, B> {
    A(A),
    B(B),
}

/// Two-future "race" combinator, used throughout the dispatcher to wait on
/// "handler future vs. request body arriving" and "response body vs. write
/// readiness" without pulling in a runtime-specific `select!` macro.
pub trait Select: Future + Sized {
    fn select<Fut>(self, other: Fut) -> SelectFuture<Self, Fut>
    where
        Fut: Future;
}

impl<F> Select for F
where
    F: Future,
{
    fn select<Fut>(self, other: Fut) -> SelectFuture<Self, Fut>
    where
        Fut: Future,
    {
        SelectFuture {
            fut_a: self,
            fut_b: other,
        }
    }
}

pub struct SelectFuture<A, B> {
    fut_a: A,
    fut_b: B,
}

impl<A, B> Future for SelectFuture<A, B>
where
    A: Future,
    B: Future,
{
    type Output = SelectOutput<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `fut_a`/`fut_b` are structurally pinned along with `self`;
        // neither field is moved out of nor replaced while pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let fut_a = unsafe { Pin::new_unchecked(&mut this.fut_a) };
        let fut_b = unsafe { Pin::new_unchecked(&mut this.fut_b) };

        if let Poll::Ready(a) = fut_a.poll(cx) {
            return Poll::Ready(SelectOutput::A(a));
        }

        fut_b.poll(cx).map(SelectOutput::B)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};

    #[tokio::test]
    async fn ready_future_wins() {
        match ready(1u8).select(pending::<u8>()).await {
            SelectOutput::A(v) => assert_eq!(v, 1),
            SelectOutput::B(_) => panic!("pending future should never resolve"),
        }
    }

    #[tokio::test]
    async fn second_future_resolves() {
        match pending::<u8>().select(ready(2u8)).await {
            SelectOutput::A(_) => panic!("pending future should never resolve"),
            SelectOutput::B(v) => assert_eq!(v, 2),
        }
    }
}

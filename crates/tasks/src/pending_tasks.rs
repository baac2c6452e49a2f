use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

/// Counter of tasks that still hold a [`ShutdownGuard`](crate::ShutdownGuard), with a future that
/// resolves once the count drops to zero.
#[derive(Debug)]
pub struct PendingTasks {
    counter: AtomicUsize,
    waker: AtomicWaker,
}

impl PendingTasks {
    pub fn new(initial_count: usize) -> Self {
        Self {
            counter: AtomicUsize::new(initial_count),
            waker: AtomicWaker::new(),
        }
    }

    pub fn current(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.waker.wake();
        }
    }

    pub fn wait_for_zero(self: Arc<Self>) -> WaitForZero {
        WaitForZero {
            pending_tasks: self,
        }
    }
}

#[derive(Debug)]
pub struct WaitForZero {
    pending_tasks: Arc<PendingTasks>,
}

impl Future for WaitForZero {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.pending_tasks.current() == 0 {
            return Poll::Ready(());
        }

        self.pending_tasks.waker.register(cx.waker());

        // the last decrement may have raced with the registration above
        if self.pending_tasks.current() == 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

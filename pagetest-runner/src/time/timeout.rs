// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use pin_project_lite::pin_project;
use std::{future::Future, pin::Pin, task::Poll, time::Duration};
use tokio::time::{Instant, Sleep};

pin_project! {
    /// A re-armable wrapper around [`tokio::time::Sleep`].
    ///
    /// The pool's completion loop owns one of these and keeps it armed with
    /// the earliest live obligation deadline. While disarmed it never
    /// resolves; resolving disarms it.
    #[derive(Debug)]
    pub(crate) struct Timeout {
        #[pin]
        sleep: Sleep,
        armed: bool,
    }
}

impl Timeout {
    pub(crate) fn new() -> Self {
        Self {
            sleep: tokio::time::sleep_until(far_future()),
            armed: false,
        }
    }

    /// Arms the timeout to fire at `deadline`. Re-arming an armed timeout
    /// replaces its deadline.
    pub(crate) fn arm(self: Pin<&mut Self>, deadline: Instant) {
        let this = self.project();
        this.sleep.reset(deadline);
        *this.armed = true;
    }

    /// Disarms the timeout if it is armed.
    pub(crate) fn disarm(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.armed {
            this.sleep.reset(far_future());
            *this.armed = false;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Future for Timeout {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if !*this.armed {
            return Poll::Pending;
        }
        match this.sleep.poll(cx) {
            Poll::Ready(()) => {
                *this.armed = false;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// Cribbed from tokio: there is no way to obtain a max `Instant`, and very
// large offsets overflow on some platforms. Thirty years is far enough.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

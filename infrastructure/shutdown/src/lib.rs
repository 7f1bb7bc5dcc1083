// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A convenient shutdown signal.
//!
//! `Shutdown` is the owning side of the signal. Any number of `ShutdownSignal`s may be
//! cloned from it and awaited by long-running workers. The signal resolves once
//! `trigger()` is called or the owning `Shutdown` is dropped, whichever comes first.

use futures::{channel::oneshot, future::Shared, FutureExt};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// The owner of a shutdown signal. Dropping this without calling `trigger` still
/// resolves all signals.
#[derive(Debug)]
pub struct Shutdown {
    trigger: Option<oneshot::Sender<()>>,
    signal: ShutdownSignal,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            trigger: Some(tx),
            signal: ShutdownSignal { inner: rx.shared() },
        }
    }

    /// Resolve all signals cloned from this instance. Subsequent calls are a no-op.
    pub fn trigger(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            let _ = trigger.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger.is_none()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A future that resolves when the owning `Shutdown` is triggered or dropped.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl ShutdownSignal {
    /// Returns true if the signal has already resolved.
    pub fn is_triggered(&self) -> bool {
        self.inner.peek().is_some()
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A cancelled receiver means the Shutdown was dropped, which counts as triggered.
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn it_resolves_on_trigger() {
        let mut shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        signal.await;
    }

    #[tokio::test]
    async fn it_resolves_all_clones() {
        let mut shutdown = Shutdown::new();
        let signals = (0..10).map(|_| shutdown.to_signal()).collect::<Vec<_>>();
        shutdown.trigger();
        for signal in signals {
            assert!(signal.is_triggered());
            signal.await;
        }
    }

    #[tokio::test]
    async fn it_resolves_when_dropped() {
        let shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        drop(shutdown);
        signal.await;
    }

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let mut shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }
}

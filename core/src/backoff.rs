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

//! Bounded exponential backoff for transient failures (probe timeouts, RPC
//! timeouts). Mutating operations must not be routed through this.

use std::{future::Future, time::Duration};

#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2,
            cap: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// The delay to sleep after the given zero-based failed attempt.
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = self.factor.saturating_pow(attempt as u32);
        self.initial.saturating_mul(factor).min(self.cap)
    }

    /// Runs `op` up to `max_attempts` times, sleeping between failures while
    /// `is_transient` holds for the error. The final error is returned as-is.
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !is_transient(&err) {
                        return Err(err);
                    }
                    tokio::time::sleep(self.delay(attempt - 1)).await;
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn it_retries_transient_errors_up_to_the_budget() {
        let calls = AtomicUsize::new(0);
        let policy = BackoffPolicy::default();
        let result: Result<(), &str> = policy
            .retry_if(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("timeout") }
                },
                |_| true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn it_does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let policy = BackoffPolicy::default();
        let result: Result<(), &str> = policy
            .retry_if(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("denied") }
                },
                |_| false,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn it_returns_the_first_success() {
        let calls = AtomicUsize::new(0);
        let policy = BackoffPolicy::default();
        let result: Result<usize, &str> = policy
            .retry_if(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 1 {
                            Err("timeout")
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap(), 1);
    }
}

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

use super::message::BusMessage;
use log::*;
use tokio::sync::broadcast;

const LOG_TARGET: &str = "aio::events::bus";

/// Per-subscriber queue bound. A subscriber that falls further behind than
/// this loses its oldest pending messages and observes a gap; clients
/// resynchronize on the next periodic broadcast.
pub const QUEUE_BOUND: usize = 256;

/// Single-process publisher. One broadcast channel carries every subscription
/// channel; delivery order within a channel is publication order. Filtering by
/// subscription happens at the socket layer.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(QUEUE_BOUND);
        Self { tx }
    }

    pub fn publish(&self, channel: &str, message_type: &str, data: serde_json::Value) {
        self.publish_message(BusMessage::new(message_type, channel, data));
    }

    pub fn publish_message(&self, message: BusMessage) {
        trace!(
            target: LOG_TARGET,
            "publish {} on {}",
            message.message_type,
            message.subscription.as_deref().unwrap_or("-")
        );
        // An error only means there is no subscriber right now.
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_arrive_in_publication_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for n in 0..5 {
            bus.publish("tasks", "task:progress", json!({ "n": n }));
        }
        for n in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.data["n"], n);
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish("alerts", "alert", json!({}));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn a_lagging_subscriber_drops_oldest_and_sees_a_gap() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for n in 0..(QUEUE_BOUND + 10) {
            bus.publish("tasks", "task:progress", json!({ "n": n }));
        }
        // The receiver lagged; the oldest messages are gone.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert!(missed >= 10),
            other => panic!("expected lag, got {:?}", other),
        }
        // After the gap the stream continues from the oldest retained message.
        let next = rx.recv().await.unwrap();
        assert!(next.data["n"].as_u64().unwrap() >= 10);
    }
}

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

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A typed message as delivered to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    pub data: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl BusMessage {
    pub fn new(message_type: &str, subscription: &str, data: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            subscription: Some(subscription.to_string()),
            data,
            ts: Utc::now(),
        }
    }

    pub fn unrouted(message_type: &str, data: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            subscription: None,
            data,
            ts: Utc::now(),
        }
    }

    /// Equality that ignores the timestamp, for dedup of repeats.
    pub fn same_content(&self, other: &BusMessage) -> bool {
        self.message_type == other.message_type && self.subscription == other.subscription && self.data == other.data
    }
}

/// Subscription matching: exact, `*`, or a `prefix:*` wildcard.
pub fn channel_matches(pattern: &str, channel: &str) -> bool {
    if pattern == "*" || pattern == channel {
        return true;
    }
    match pattern.strip_suffix(":*") {
        Some(prefix) => channel.starts_with(prefix) && channel[prefix.len()..].starts_with(':'),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_patterns_match_the_prefix() {
        assert!(channel_matches("sync:*", "sync:progress"));
        assert!(channel_matches("sync:*", "sync:complete"));
        assert!(!channel_matches("sync:*", "synchronized:x"));
        assert!(!channel_matches("sync:*", "tasks"));
        assert!(channel_matches("*", "anything"));
        assert!(channel_matches("alerts", "alerts"));
        assert!(!channel_matches("alerts", "alerts:extra"));
    }

    #[test]
    fn same_content_ignores_the_timestamp() {
        let mut a = BusMessage::new("services_update", "updates:services", json!({"x": 1}));
        let b = BusMessage::new("services_update", "updates:services", json!({"x": 1}));
        a.ts = a.ts - chrono::Duration::seconds(30);
        assert!(a.same_content(&b));
        let c = BusMessage::new("services_update", "updates:services", json!({"x": 2}));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn serialization_uses_the_wire_field_names() {
        let msg = BusMessage::new("alert", "alerts", json!({}));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("type").is_some());
        assert!(value.get("subscription").is_some());
        assert!(value.get("ts").is_some());
    }
}

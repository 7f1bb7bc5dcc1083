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

//! # Event bus and broadcaster
//!
//! Single-process publish/subscribe fan-out towards connected WebSocket
//! clients, plus the periodic broadcaster that drives the `updates:services`
//! and `updates:resources` channels with change detection and adaptive
//! cadence.

mod broadcaster;
mod bus;
mod message;

pub use self::{
    broadcaster::{resources_is_new, Broadcaster, BroadcasterConfig, ClientPresence},
    bus::EventBus,
    message::{channel_matches, BusMessage},
};

/// Well-known subscription channels.
pub mod channels {
    pub const SERVICES: &str = "updates:services";
    pub const RESOURCES: &str = "updates:resources";
    pub const ALERTS: &str = "alerts";
    pub const TASKS: &str = "tasks";
    pub const SYNC_PREFIX: &str = "sync";
    pub const UPDATES_PIPELINE: &str = "updates:pipeline";
}

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

//! The three-way decision protocol for an unsynced node.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// What to do while the node catches up.
///
/// - `Wait`: block the flow, stream progress until synced.
/// - `Background`: register a node-sync task and point dependents at the
///   public fallback endpoint until the task completes.
/// - `Skip`: make the fallback endpoint permanent; no task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStrategy {
    Wait,
    Background,
    Skip,
}

const WAIT_CEILING_SECS: u64 = 5 * 60;
const BACKGROUND_CEILING_SECS: u64 = 60 * 60;

/// Recommended default as a function of the ETA. An unknown ETA recommends
/// `Background`.
pub fn recommend(eta_secs: Option<u64>) -> SyncStrategy {
    match eta_secs {
        Some(eta) if eta < WAIT_CEILING_SECS => SyncStrategy::Wait,
        Some(eta) if eta <= BACKGROUND_CEILING_SECS => SyncStrategy::Background,
        Some(_) => SyncStrategy::Skip,
        None => SyncStrategy::Background,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_waits_block_inline() {
        assert_eq!(recommend(Some(0)), SyncStrategy::Wait);
        assert_eq!(recommend(Some(299)), SyncStrategy::Wait);
    }

    #[test]
    fn medium_waits_go_to_the_background() {
        assert_eq!(recommend(Some(300)), SyncStrategy::Background);
        assert_eq!(recommend(Some(2_500)), SyncStrategy::Background);
        assert_eq!(recommend(Some(3_600)), SyncStrategy::Background);
    }

    #[test]
    fn long_waits_skip_to_the_public_endpoint() {
        assert_eq!(recommend(Some(3_601)), SyncStrategy::Skip);
        assert_eq!(recommend(Some(7 * 86_400)), SyncStrategy::Skip);
    }

    #[test]
    fn unknown_eta_recommends_background() {
        assert_eq!(recommend(None), SyncStrategy::Background);
    }
}

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

//! A bounded catalog of remediation texts keyed by the kind of validation
//! issue. Returned verbatim alongside the report.

pub(super) fn for_issue(kind: &str) -> &'static [&'static str] {
    match kind {
        "MissingPrerequisite" => &[
            "Add the Kaspa node profile (or the archive node variant) to your selection.",
            "A public node endpoint can substitute for a local node for some profiles; choose the skip strategy during sync if blockchain data is not needed locally.",
        ],
        "Conflict" => &[
            "Keep either the pruning node or the archive node, not both; they manage the same datadir.",
        ],
        "UnknownProfile" => &["Check the profile identifier against GET /api/profiles."],
        "BelowRecommendedRam" => &[
            "Close other workloads or add memory; the fleet will run but may swap under load.",
            "Deselect the explorer bundle to reduce memory pressure; it can be added later.",
        ],
        "BelowRecommendedDisk" => &[
            "Free disk space or mount a larger volume before installing; node sync grows the datadir continuously.",
        ],
        "DockerMemoryBelowRequired" => &[
            "Raise the container engine memory limit in its settings to at least the combined minimum.",
        ],
        "SharedResourcesUsed" => &[
            "Shared services (reverse proxy, dashboard, database) are counted once across profiles.",
        ],
        _ => &[],
    }
}

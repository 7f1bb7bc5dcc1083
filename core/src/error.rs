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

//! Stable error kinds returned on boundary responses and logged alongside the
//! subsystem errors that produced them.

use serde::Serialize;
use std::fmt;

/// The stable classification of a failure as it crosses an HTTP or WebSocket
/// boundary. The variant names are the wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    PrerequisiteNotMet,
    ConflictingSelection,
    RuntimeUnavailable,
    ProbeTimeout,
    ProbeRefused,
    StartupDeadlineExceeded,
    PartialStart,
    DependentsRunning,
    RpcError,
    RpcTimeout,
    SnapshotFailed,
    RestoreFailed,
    UpdateFailed,
    TokenExpired,
    TokenAlreadyConsumed,
    TokenNotFound,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Transient kinds are retried within their subsystem with bounded backoff.
    /// Mutations are never retried automatically.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::ProbeTimeout | ErrorKind::ProbeRefused | ErrorKind::RpcTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Implemented by every subsystem error so that the applications can serialize
/// failures as `{success: false, kind, message}`.
pub trait BoundaryError {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_serializes_as_its_name() {
        assert_eq!(serde_json::to_string(&ErrorKind::DependentsRunning).unwrap(), "\"DependentsRunning\"");
        assert_eq!(serde_json::to_string(&ErrorKind::RpcTimeout).unwrap(), "\"RpcTimeout\"");
    }

    #[test]
    fn transient_kinds() {
        assert!(ErrorKind::ProbeTimeout.is_transient());
        assert!(ErrorKind::RpcTimeout.is_transient());
        assert!(!ErrorKind::UpdateFailed.is_transient());
        assert!(!ErrorKind::Cancelled.is_transient());
    }
}

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

//! Boundary responses: every failure crosses the HTTP surface as
//! `{success: false, kind, message}` with a status derived from the kind.

use kaspa_aio_core::error::{BoundaryError, ErrorKind};
use serde_json::json;
use std::fmt::Display;
use warp::{http::StatusCode, reply, Reply};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation
        | ErrorKind::PrerequisiteNotMet
        | ErrorKind::ConflictingSelection
        | ErrorKind::DependentsRunning => StatusCode::BAD_REQUEST,
        ErrorKind::TokenNotFound => StatusCode::NOT_FOUND,
        ErrorKind::TokenExpired | ErrorKind::TokenAlreadyConsumed => StatusCode::GONE,
        ErrorKind::RuntimeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ProbeTimeout
        | ErrorKind::ProbeRefused
        | ErrorKind::RpcTimeout
        | ErrorKind::StartupDeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn failure(kind: ErrorKind, message: &str) -> reply::Response {
    let body = reply::json(&json!({
        "success": false,
        "kind": kind,
        "message": message,
    }));
    reply::with_status(body, status_for(kind)).into_response()
}

pub fn failure_with(kind: ErrorKind, message: &str, details: serde_json::Value) -> reply::Response {
    let body = reply::json(&json!({
        "success": false,
        "kind": kind,
        "message": message,
        "details": details,
    }));
    reply::with_status(body, status_for(kind)).into_response()
}

/// Failure response from a subsystem error. The error's own message is user
/// facing; secrets never travel through subsystem errors.
pub fn failure_of<E: BoundaryError + Display>(err: &E) -> reply::Response {
    failure(err.kind(), &err.to_string())
}

pub fn ok<T: serde::Serialize>(data: &T) -> reply::Response {
    reply::json(data).into_response()
}

pub fn ok_with_success<T: serde::Serialize>(data: &T) -> reply::Response {
    let mut value = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.insert("success".to_string(), json!(true));
    }
    reply::json(&value).into_response()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn statuses_follow_the_kind() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::TokenNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::TokenExpired), StatusCode::GONE);
        assert_eq!(status_for(ErrorKind::RuntimeUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

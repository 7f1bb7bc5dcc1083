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

//! Health probe execution. HTTP accepts any 2xx/3xx; JSON-RPC sends the
//! configured no-argument method and accepts any non-error response; TCP only
//! requires a successful connect.

use crate::catalog::HealthProbe;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("unexpected HTTP status {0}")]
    BadStatus(u16),
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl crate::error::BoundaryError for ProbeError {
    fn kind(&self) -> crate::error::ErrorKind {
        match self {
            ProbeError::Timeout => crate::error::ErrorKind::ProbeTimeout,
            _ => crate::error::ErrorKind::ProbeRefused,
        }
    }
}

pub async fn execute(
    client: &reqwest::Client,
    host: &str,
    probe: &HealthProbe,
    deadline: Duration,
) -> Result<(), ProbeError> {
    match probe {
        HealthProbe::Http { port, path } => {
            let url = format!("http://{}:{}{}", host, port, path);
            let response = client
                .get(&url)
                .timeout(deadline)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status();
            if status.is_success() || status.is_redirection() {
                Ok(())
            } else {
                Err(ProbeError::BadStatus(status.as_u16()))
            }
        },
        HealthProbe::JsonRpc { port, method } => {
            let url = format!("http://{}:{}/", host, port);
            let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": [] });
            let response = client
                .post(&url)
                .json(&body)
                .timeout(deadline)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            if !response.status().is_success() {
                return Err(ProbeError::BadStatus(response.status().as_u16()));
            }
            let value: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ProbeError::Rpc(format!("invalid response body: {}", e)))?;
            match value.get("error") {
                Some(err) if !err.is_null() => Err(ProbeError::Rpc(err.to_string())),
                _ => Ok(()),
            }
        },
        HealthProbe::Tcp { port } => {
            let address = format!("{}:{}", host, port);
            match tokio::time::timeout(deadline, TcpStream::connect(&address)).await {
                Ok(Ok(_stream)) => Ok(()),
                Ok(Err(err)) => Err(ProbeError::Refused(err.to_string())),
                Err(_) => Err(ProbeError::Timeout),
            }
        },
        HealthProbe::None => Ok(()),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Refused(err.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_probe_succeeds_against_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = reqwest::Client::new();
        let probe = HealthProbe::Tcp { port };
        execute(&client, "127.0.0.1", &probe, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn tcp_probe_is_refused_without_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = reqwest::Client::new();
        let probe = HealthProbe::Tcp { port };
        let err = execute(&client, "127.0.0.1", &probe, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Refused(_)));
    }

    #[tokio::test]
    async fn absent_probe_is_trivially_healthy() {
        let client = reqwest::Client::new();
        execute(&client, "127.0.0.1", &HealthProbe::None, Duration::from_secs(1)).await.unwrap();
    }
}

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

//! HTTP client side of the CLI: every subcommand except `start` talks to a
//! running wizard instance.

use serde_json::Value;
use std::time::Duration;

pub struct WizardClient {
    base_url: String,
    http: reqwest::Client,
}

impl WizardClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            http: reqwest::Client::new(),
        }
    }

    pub async fn status(&self) -> anyhow::Result<Value> {
        self.get("/api/wizard/health").await
    }

    pub async fn stop(&self) -> anyhow::Result<Value> {
        self.post("/api/wizard/shutdown", Value::Null).await
    }

    pub async fn logs(&self, service: &str, tail: usize) -> anyhow::Result<Value> {
        self.get(&format!("/api/wizard/logs/{}?tail={}", service, tail)).await
    }

    pub async fn restart(&self, services: &[String]) -> anyhow::Result<Value> {
        self.post(
            "/api/wizard/services/restart",
            serde_json::json!({ "services": services }),
        )
        .await
    }

    pub async fn reconfigure_link(&self) -> anyhow::Result<Value> {
        self.get("/api/wizard/reconfigure-link").await
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .http
            .get(&format!("{}{}", self.base_url, path))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let mut request = self
            .http
            .post(&format!("{}{}", self.base_url, path))
            .timeout(Duration::from_secs(30));
        if !body.is_null() {
            request = request.json(&body);
        }
        Self::parse(request.send().await?).await
    }

    async fn parse(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        let value: Value = response.json().await?;
        let failed = value.get("success").and_then(|s| s.as_bool()).map(|s| !s).unwrap_or(false);
        if !status.is_success() || failed {
            let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("Internal");
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("request failed");
            anyhow::bail!("{}: {}", kind, message);
        }
        Ok(value)
    }
}

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

//! The declarative compose-style service file. The store only enumerates
//! services and replaces image tags; structural edits are rejected by
//! construction since no other mutation is exposed.

use super::ConfigError;
use serde_yaml::Value;

#[derive(Debug, Clone)]
pub struct ComposeFile {
    doc: Value,
}

impl ComposeFile {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self { doc: Value::Null });
        }
        let doc: Value = serde_yaml::from_str(input)?;
        Ok(Self { doc })
    }

    pub fn empty() -> Self {
        Self { doc: Value::Null }
    }

    fn services(&self) -> Option<&serde_yaml::Mapping> {
        self.doc.get("services").and_then(|v| v.as_mapping())
    }

    /// Top-level service names, in declaration order.
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .map(|services| {
                services
                    .iter()
                    .filter_map(|(k, _)| k.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services()
            .map(|services| services.contains_key(&Value::String(service.to_string())))
            .unwrap_or(false)
    }

    pub fn image_of(&self, service: &str) -> Option<&str> {
        self.doc
            .get("services")?
            .get(service)?
            .get("image")?
            .as_str()
    }

    pub fn image_tag_of(&self, service: &str) -> Option<&str> {
        let image = self.image_of(service)?;
        match image.rsplit_once(':') {
            Some((_, tag)) if !tag.contains('/') => Some(tag),
            _ => None,
        }
    }

    /// Replaces only the tag of the service's image reference, returning the
    /// previous tag. This is the single mutation the compose artifact supports.
    pub fn set_image_tag(&mut self, service: &str, tag: &str) -> Result<String, ConfigError> {
        let image = self
            .image_of(service)
            .ok_or_else(|| {
                if self.has_service(service) {
                    ConfigError::ServiceHasNoImage(service.to_string())
                } else {
                    ConfigError::UnknownService(service.to_string())
                }
            })?
            .to_string();

        let (repository, old_tag) = match image.rsplit_once(':') {
            Some((repo, t)) if !t.contains('/') => (repo.to_string(), t.to_string()),
            _ => (image.clone(), String::new()),
        };

        let entry = self
            .doc
            .get_mut("services")
            .and_then(|s| s.get_mut(service))
            .and_then(|s| s.get_mut("image"))
            .expect("image presence checked above");
        *entry = Value::String(format!("{}:{}", repository, tag));
        Ok(old_tag)
    }

    pub fn to_string(&self) -> Result<String, ConfigError> {
        if self.doc.is_null() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(&self.doc)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const COMPOSE: &str = "services:\n  kaspa-node:\n    image: kaspanet/kaspad:v0.12.19\n    restart: unless-stopped\n  nginx:\n    image: nginx:1.25-alpine\n";

    #[test]
    fn service_names_in_declaration_order() {
        let file = ComposeFile::parse(COMPOSE).unwrap();
        assert_eq!(file.service_names(), vec!["kaspa-node", "nginx"]);
    }

    #[test]
    fn set_image_tag_replaces_only_the_tag() {
        let mut file = ComposeFile::parse(COMPOSE).unwrap();
        let old = file.set_image_tag("kaspa-node", "v0.12.20").unwrap();
        assert_eq!(old, "v0.12.19");
        assert_eq!(file.image_of("kaspa-node"), Some("kaspanet/kaspad:v0.12.20"));
        // Unrelated structure untouched.
        let text = file.to_string().unwrap();
        assert!(text.contains("restart: unless-stopped"));
        assert!(text.contains("nginx:1.25-alpine"));
    }

    #[test]
    fn unknown_service_is_rejected() {
        let mut file = ComposeFile::parse(COMPOSE).unwrap();
        assert!(matches!(
            file.set_image_tag("nope", "v1"),
            Err(ConfigError::UnknownService(_))
        ));
    }

    #[test]
    fn service_without_image_is_rejected() {
        let mut file = ComposeFile::parse("services:\n  built:\n    build: .\n").unwrap();
        assert!(matches!(
            file.set_image_tag("built", "v1"),
            Err(ConfigError::ServiceHasNoImage(_))
        ));
    }

    #[test]
    fn empty_input_parses_to_no_services() {
        let file = ComposeFile::parse("").unwrap();
        assert!(file.service_names().is_empty());
        assert_eq!(file.to_string().unwrap(), "");
    }

    #[test]
    fn tag_round_trip_survives_serialization() {
        let mut file = ComposeFile::parse(COMPOSE).unwrap();
        file.set_image_tag("nginx", "1.26-alpine").unwrap();
        let reparsed = ComposeFile::parse(&file.to_string().unwrap()).unwrap();
        assert_eq!(reparsed.image_tag_of("nginx"), Some("1.26-alpine"));
    }
}

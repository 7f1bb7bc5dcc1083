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

//! Sensitive-value elision for user-visible serializations (diffs, backup
//! metadata, logs). The on-disk artifacts are never masked.

use super::env_file::ConfigDiff;
use std::collections::BTreeMap;

pub const MASK: &str = "********";

const SENSITIVE_KEY_PATTERNS: &[&str] = &["password", "secret", "key", "seed", "mnemonic", "private", "token"];

pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEY_PATTERNS.iter().any(|p| lowered.contains(p))
}

pub fn mask_value(key: &str, value: &str) -> String {
    if is_sensitive_key(key) {
        MASK.to_string()
    } else {
        value.to_string()
    }
}

pub fn mask_pairs(pairs: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), mask_value(k, v)))
        .collect()
}

impl ConfigDiff {
    /// A copy safe to show to users: values of sensitive keys are elided.
    pub fn masked(&self) -> ConfigDiff {
        let mut masked = self.clone();
        for change in &mut masked.changes {
            if is_sensitive_key(&change.key) {
                change.old_value = change.old_value.as_ref().map(|_| MASK.to_string());
                change.new_value = change.new_value.as_ref().map(|_| MASK.to_string());
            }
        }
        masked
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config_store::EnvFile;

    #[test]
    fn key_patterns_match_case_insensitively() {
        assert!(is_sensitive_key("POSTGRES_PASSWORD"));
        assert!(is_sensitive_key("WalletSeedPhrase"));
        assert!(is_sensitive_key("API_TOKEN"));
        assert!(is_sensitive_key("PRIVATE_URI"));
        assert!(!is_sensitive_key("KASPA_NETWORK"));
    }

    #[test]
    fn masked_diff_hides_values_but_keeps_keys_and_kinds() {
        let file = EnvFile::parse("POSTGRES_PASSWORD=hunter2\nKASPA_NETWORK=mainnet\n");
        let desired = vec![
            ("POSTGRES_PASSWORD".to_string(), "correcthorse".to_string()),
            ("KASPA_NETWORK".to_string(), "testnet".to_string()),
        ]
        .into_iter()
        .collect();
        let diff = file.diff(&desired).masked();

        let password = diff.changes.iter().find(|c| c.key == "POSTGRES_PASSWORD").unwrap();
        assert_eq!(password.old_value.as_deref(), Some(MASK));
        assert_eq!(password.new_value.as_deref(), Some(MASK));
        let network = diff.changes.iter().find(|c| c.key == "KASPA_NETWORK").unwrap();
        assert_eq!(network.new_value.as_deref(), Some("testnet"));
    }
}

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

//! Line-oriented `KEY=VALUE` environment file. Comments and blank lines are
//! preserved; keys keep their first-encountered order and new keys append at
//! the end, so rewrites produce minimal diffs.

use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use strum_macros::Display;

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Pair { key: String, value: String },
    Comment(String),
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    /// Total: any input parses. Surrounding single or double quotes on values
    /// are stripped; a later duplicate key updates the first occurrence.
    pub fn parse(input: &str) -> Self {
        let mut file = EnvFile::default();
        for raw in input.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                file.lines.push(Line::Blank);
            } else if trimmed.starts_with('#') {
                file.lines.push(Line::Comment(raw.to_string()));
            } else if let Some((key, value)) = trimmed.split_once('=') {
                let key = key.trim().to_string();
                let value = unquote(value.trim()).to_string();
                file.set(&key, &value);
            } else {
                // Not a pair; keep the text so a rewrite does not lose it.
                file.lines.push(Line::Comment(raw.to_string()));
            }
        }
        file
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Updates in place, or appends if the key is new.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Pair { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        self.lines.push(Line::Pair {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.lines.iter().position(|line| match line {
            Line::Pair { key: k, .. } => k == key,
            _ => false,
        })?;
        match self.lines.remove(index) {
            Line::Pair { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Keys in first-encountered order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Pair { key, .. } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Pair { key, value } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.pairs().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The changes required to turn this file into `desired`, ordered by key.
    pub fn diff(&self, desired: &BTreeMap<String, String>) -> ConfigDiff {
        let current = self.to_map();
        let mut changes = Vec::new();
        let mut keys: Vec<&String> = current.keys().chain(desired.keys()).collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            match (current.get(key), desired.get(key)) {
                (None, Some(new)) => changes.push(ConfigChange {
                    key: key.clone(),
                    kind: ChangeKind::Added,
                    old_value: None,
                    new_value: Some(new.clone()),
                }),
                (Some(old), None) => changes.push(ConfigChange {
                    key: key.clone(),
                    kind: ChangeKind::Removed,
                    old_value: Some(old.clone()),
                    new_value: None,
                }),
                (Some(old), Some(new)) if old != new => changes.push(ConfigChange {
                    key: key.clone(),
                    kind: ChangeKind::Modified,
                    old_value: Some(old.clone()),
                    new_value: Some(new.clone()),
                }),
                _ => {},
            }
        }
        ConfigDiff { changes }
    }

    /// Applies `desired` as the authoritative key set: unchanged keys keep
    /// their position, new keys append, absent keys are removed. Returns the
    /// diff that was applied.
    pub fn apply(&mut self, desired: &BTreeMap<String, String>) -> ConfigDiff {
        let diff = self.diff(desired);
        for change in &diff.changes {
            match change.kind {
                ChangeKind::Removed => {
                    self.remove(&change.key);
                },
                _ => self.set(&change.key, change.new_value.as_deref().unwrap_or_default()),
            }
        }
        diff
    }
}

impl fmt::Display for EnvFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Pair { key, value } => writeln!(f, "{}={}", key, value)?,
                Line::Comment(text) => writeln!(f, "{}", text)?,
                Line::Blank => writeln!(f)?,
            }
        }
        Ok(())
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    pub key: String,
    pub kind: ChangeKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// An ordered-by-key list of environment changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDiff {
    pub changes: Vec<ConfigChange>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.key.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn desired(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parse_preserves_comments_and_order() {
        let file = EnvFile::parse("# header\nA=1\n\nB=\"two\"\nC='three'\n");
        assert_eq!(file.get("A"), Some("1"));
        assert_eq!(file.get("B"), Some("two"));
        assert_eq!(file.get("C"), Some("three"));
        assert_eq!(file.to_string(), "# header\nA=1\n\nB=two\nC=three\n");
    }

    #[test]
    fn duplicate_keys_keep_the_first_position_and_last_value() {
        let file = EnvFile::parse("A=1\nB=2\nA=3\n");
        assert_eq!(file.get("A"), Some("3"));
        assert_eq!(file.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn rewrite_preserves_order_and_appends_new_keys() {
        let mut file = EnvFile::parse("A=1\nB=2\n");
        let diff = file.apply(&desired(&[("A", "1"), ("B", "3"), ("C", "4")]));

        assert_eq!(file.to_string(), "A=1\nB=3\nC=4\n");
        assert_eq!(diff.changes.len(), 2);
        assert_eq!(diff.changes[0].key, "B");
        assert_eq!(diff.changes[0].kind, ChangeKind::Modified);
        assert_eq!(diff.changes[0].old_value.as_deref(), Some("2"));
        assert_eq!(diff.changes[0].new_value.as_deref(), Some("3"));
        assert_eq!(diff.changes[1].key, "C");
        assert_eq!(diff.changes[1].kind, ChangeKind::Added);
        assert_eq!(diff.changes[1].old_value, None);
    }

    #[test]
    fn absent_keys_are_removed() {
        let mut file = EnvFile::parse("A=1\nB=2\n");
        let diff = file.apply(&desired(&[("B", "2")]));
        assert_eq!(diff.changes[0].kind, ChangeKind::Removed);
        assert_eq!(file.to_string(), "B=2\n");
    }

    #[test]
    fn applying_the_same_diff_twice_is_idempotent() {
        let target = desired(&[("A", "1"), ("B", "3"), ("C", "4")]);
        let mut file = EnvFile::parse("A=1\nB=2\n");
        file.apply(&target);
        let first = file.to_string();
        let second_diff = file.apply(&target);
        assert!(second_diff.is_empty());
        assert_eq!(file.to_string(), first);
    }

    #[test]
    fn diff_is_ordered_by_key() {
        let file = EnvFile::parse("Z=1\nA=2\n");
        let diff = file.diff(&desired(&[("M", "5")]));
        let keys: Vec<_> = diff.keys().collect();
        assert_eq!(keys, vec!["A", "M", "Z"]);
    }

    #[test]
    fn empty_input_parses_to_an_empty_file() {
        let file = EnvFile::parse("");
        assert!(file.is_empty());
        assert_eq!(file.to_string(), "");
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Favorites and pinned tabs.
//!
//! Both lists are keyed by partition: two entries may point at the same URL but
//! never at the same partition.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::partition::is_persistent_partition;

/// Title used when neither a title nor a URL was supplied.
pub const UNTITLED_BOOKMARK: &str = "Page";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub partition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_svg: Option<String>,
}

impl Bookmark {
    pub fn new(title: Option<&str>, url: &str, partition: impl Into<String>) -> Self {
        Self {
            title: default_title(title, url),
            url: url.to_string(),
            partition: partition.into(),
            icon_svg: None,
        }
    }
}

/// Snapshot of a tab marked pinned, restored into a live tab at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedTab {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub partition: String,
}

/// Loosely-typed add request; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookmarkDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
}

/// Selector for removal. A bare string is the legacy URL form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoveKey {
    ByUrl(String),
    ByPartition {
        partition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl RemoveKey {
    fn matches(&self, bookmark: &Bookmark) -> bool {
        match self {
            Self::ByUrl(url) => bookmark.url == *url,
            Self::ByPartition { partition, .. } => bookmark.partition == *partition,
        }
    }
}

/// Entries that carry a storage partition.
pub trait Partitioned {
    fn partition(&self) -> &str;
}

impl Partitioned for Bookmark {
    fn partition(&self) -> &str {
        &self.partition
    }
}

impl Partitioned for PinnedTab {
    fn partition(&self) -> &str {
        &self.partition
    }
}

/// Keep the entries that decode as `T` with a durable, not-yet-seen partition.
///
/// Returns the survivors in order and the number dropped.
pub fn retain_persistent<T>(documents: Vec<serde_json::Value>) -> (Vec<T>, usize)
where
    T: Partitioned + DeserializeOwned,
{
    let total = documents.len();
    let kept = dedupe_by_partition(
        documents
            .into_iter()
            .filter_map(|value| serde_json::from_value::<T>(value).ok()),
    );
    let dropped = total - kept.len();
    (kept, dropped)
}

fn dedupe_by_partition<T, I>(entries: I) -> Vec<T>
where
    T: Partitioned,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            is_persistent_partition(entry.partition()) && seen.insert(entry.partition().to_string())
        })
        .collect()
}

/// `title`, else `url`, else [`UNTITLED_BOOKMARK`].
pub fn default_title(title: Option<&str>, url: &str) -> String {
    match title {
        Some(title) if !title.is_empty() => title.to_string(),
        _ if !url.is_empty() => url.to_string(),
        _ => UNTITLED_BOOKMARK.to_string(),
    }
}

/// Turn address-bar input into a fetchable URL, defaulting the scheme to https.
pub fn normalize_user_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{trimmed}"))
    }
}

/// Ordered favorites, unique by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkList {
    entries: Vec<Bookmark>,
}

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw stored documents, dropping anything malformed.
    pub fn from_documents(documents: Vec<serde_json::Value>) -> (Self, usize) {
        let (entries, dropped) = retain_persistent(documents);
        (Self { entries }, dropped)
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|b| b.partition.as_str())
    }

    pub fn contains_partition(&self, partition: &str) -> bool {
        self.entries.iter().any(|b| b.partition == partition)
    }

    /// Append `bookmark` unless its partition is taken or not durable.
    pub fn add(&mut self, bookmark: Bookmark) -> bool {
        if !is_persistent_partition(&bookmark.partition)
            || self.contains_partition(&bookmark.partition)
        {
            return false;
        }
        self.entries.push(bookmark);
        true
    }

    /// Remove every entry matching `key`, returning what was removed.
    pub fn remove(&mut self, key: &RemoveKey) -> Vec<Bookmark> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|b| key.matches(b));
        self.entries = kept;
        removed
    }

    /// Replace the sequence wholesale. Invalid and duplicate-partition entries
    /// are dropped; the count of dropped entries is returned.
    pub fn reorder(&mut self, order: Vec<Bookmark>) -> usize {
        let supplied = order.len();
        self.entries = dedupe_by_partition(order);
        supplied - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bookmark(url: &str, partition: &str) -> Bookmark {
        Bookmark::new(None, url, partition)
    }

    #[test]
    fn add_rejects_duplicate_partition() {
        let mut list = BookmarkList::new();
        assert!(list.add(bookmark("https://example.com", "persist:example")));
        let before = list.clone();

        assert!(!list.add(bookmark("https://other.com", "persist:example")));
        assert_eq!(list, before);
    }

    #[test]
    fn add_rejects_ephemeral_partition() {
        let mut list = BookmarkList::new();
        assert!(!list.add(bookmark("https://example.com", "example")));
        assert!(list.is_empty());
    }

    #[test]
    fn title_falls_back_to_url_then_placeholder() {
        assert_eq!(default_title(Some("Mail"), "https://m.io"), "Mail");
        assert_eq!(default_title(Some(""), "https://m.io"), "https://m.io");
        assert_eq!(default_title(None, ""), UNTITLED_BOOKMARK);
    }

    #[test]
    fn remove_by_partition_leaves_siblings() {
        let mut list = BookmarkList::new();
        list.add(bookmark("https://ex.com", "persist:ex1"));
        list.add(bookmark("https://ex.com", "persist:ex12"));
        list.add(bookmark("https://ex.com", "persist:ex"));

        let removed = list.remove(&RemoveKey::ByPartition {
            partition: "persist:ex1".to_string(),
            url: None,
        });

        assert_eq!(removed.len(), 1);
        assert_eq!(
            list.partitions().collect::<Vec<_>>(),
            vec!["persist:ex12", "persist:ex"]
        );
    }

    #[test]
    fn remove_by_url_drops_every_match() {
        let mut list = BookmarkList::new();
        list.add(bookmark("https://ex.com", "persist:ex"));
        list.add(bookmark("https://ex.com", "persist:ex2"));
        list.add(bookmark("https://other.com", "persist:other"));

        let removed = list.remove(&RemoveKey::ByUrl("https://ex.com".to_string()));

        assert_eq!(removed.len(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_key_decodes_both_shapes() {
        let legacy: RemoveKey = serde_json::from_value(json!("https://ex.com")).unwrap();
        assert_eq!(legacy, RemoveKey::ByUrl("https://ex.com".to_string()));

        let descriptor = json!({"partition": "persist:ex", "url": "https://ex.com"});
        let keyed: RemoveKey = serde_json::from_value(descriptor).unwrap();
        assert_eq!(
            keyed,
            RemoveKey::ByPartition {
                partition: "persist:ex".to_string(),
                url: Some("https://ex.com".to_string()),
            }
        );
    }

    #[test]
    fn load_drops_malformed_entries() {
        let (list, dropped) = BookmarkList::from_documents(vec![
            json!({"title": "a", "url": "https://a.com", "partition": "persist:a"}),
            json!({"title": "b", "url": "https://b.com", "partition": "b"}),
            json!({"title": "c", "url": "https://c.com"}),
            json!("https://d.com"),
            json!(null),
            json!({"title": "dup", "url": "https://a.com", "partition": "persist:a"}),
        ]);

        assert_eq!(dropped, 5);
        assert_eq!(list.partitions().collect::<Vec<_>>(), vec!["persist:a"]);
    }

    #[test]
    fn load_keeps_icon_when_present() {
        let (list, _) = BookmarkList::from_documents(vec![json!({
            "title": "a",
            "url": "https://a.com",
            "partition": "persist:a",
            "iconSvg": "<svg/>",
        })]);
        assert_eq!(list.as_slice()[0].icon_svg.as_deref(), Some("<svg/>"));
    }

    #[test]
    fn reorder_replaces_sequence() {
        let mut list = BookmarkList::new();
        list.add(bookmark("https://a.com", "persist:a"));
        list.add(bookmark("https://b.com", "persist:b"));

        let dropped = list.reorder(vec![
            bookmark("https://b.com", "persist:b"),
            bookmark("https://a.com", "persist:a"),
            bookmark("https://a.com", "persist:a"),
            bookmark("https://x.com", "x"),
        ]);

        assert_eq!(dropped, 2);
        assert_eq!(list.partitions().collect::<Vec<_>>(), vec!["persist:b", "persist:a"]);
    }

    #[test]
    fn user_url_normalization() {
        assert_eq!(normalize_user_url("  example.com "), Some("https://example.com".to_string()));
        assert_eq!(normalize_user_url("HTTP://x.io"), Some("HTTP://x.io".to_string()));
        assert_eq!(normalize_user_url("   "), None);
    }

    #[test]
    fn pinned_tabs_share_the_partition_rule() {
        let (pinned, dropped) = retain_persistent::<PinnedTab>(vec![
            json!({"url": "https://a.com", "title": "A", "partition": "persist:a"}),
            json!({"url": "https://b.com", "title": "B", "partition": "temp:b"}),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(pinned.len(), 1);
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session registry: the in-memory projection of favorites and pinned tabs.
//!
//! The registry is the only writer of `bookmarks.json` and `pinned.json`. Every
//! mutation that changes a list is written through before the call returns.

use std::collections::BTreeSet;

use log::{debug, warn};
use vaultshell_core::bookmarks::normalize_user_url;
use vaultshell_core::partition::is_persistent_partition;
use vaultshell_core::{
    Bookmark, BookmarkDraft, BookmarkList, PartitionAllocator, PinnedTab, RemoveKey,
};

use crate::persistence::JsonStore;

pub struct SessionRegistry {
    bookmarks: BookmarkList,
    pinned: Vec<PinnedTab>,
    allocator: PartitionAllocator,
    /// Partitions whose browsing session has been brought up this run.
    sessions: BTreeSet<String>,
    store: JsonStore,
}

impl SessionRegistry {
    pub fn load(store: JsonStore) -> Self {
        let bookmarks = store.load_bookmarks();
        let pinned = store.load_pinned();
        debug!(
            "registry: loaded {} favorites and {} pinned tabs from {}",
            bookmarks.len(),
            pinned.len(),
            store.dir().display()
        );
        Self {
            bookmarks,
            pinned,
            allocator: PartitionAllocator::new(),
            sessions: BTreeSet::new(),
            store,
        }
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.bookmarks.as_slice()
    }

    pub fn list(&self) -> Vec<Bookmark> {
        self.bookmarks.to_vec()
    }

    pub fn pinned(&self) -> &[PinnedTab] {
        &self.pinned
    }

    pub fn has_session(&self, partition: &str) -> bool {
        self.sessions.contains(partition)
    }

    /// Add a favorite. Returns `true` if the list changed.
    ///
    /// A draft without a usable partition gets one allocated from its URL; a
    /// draft with neither is ignored.
    pub fn add(&mut self, draft: BookmarkDraft) -> bool {
        let url = draft.url.unwrap_or_default();
        let partition = match draft.partition {
            Some(partition) if is_persistent_partition(&partition) => partition,
            other => {
                if url.is_empty() {
                    warn!("registry: ignoring favorite with no URL and no usable partition");
                    return false;
                }
                let allocated = self.allocate_for_url(&url);
                debug!("registry: partition {other:?} unusable for {url}; allocated {allocated}");
                allocated
            }
        };

        let bookmark = Bookmark::new(draft.title.as_deref(), &url, partition);
        if !self.bookmarks.add(bookmark) {
            debug!("registry: favorite for {url} already present");
            return false;
        }
        self.store.save_bookmarks(self.bookmarks.as_slice());
        true
    }

    /// Remove every favorite matching `key` and write the remainder through,
    /// even when nothing matched. Returns how many favorites were removed.
    pub fn remove(&mut self, key: Option<&RemoveKey>) -> usize {
        let removed = key.map(|key| self.bookmarks.remove(key)).unwrap_or_default();
        let count = removed.len();
        for bookmark in removed {
            self.retire(bookmark.partition);
        }
        if count == 0 {
            debug!("registry: remove matched nothing for {key:?}");
        }
        self.store.save_bookmarks(self.bookmarks.as_slice());
        count
    }

    /// Replace the sequence with `order`. Favorites absent from `order` are dropped.
    pub fn reorder(&mut self, order: Vec<Bookmark>) {
        let before: Vec<String> = self.bookmarks.partitions().map(str::to_string).collect();
        let dropped = self.bookmarks.reorder(order);
        if dropped > 0 {
            warn!("registry: reorder dropped {dropped} invalid or duplicate entries");
        }
        for partition in before {
            if !self.bookmarks.contains_partition(&partition) {
                self.retire(partition);
            }
        }
        self.store.save_bookmarks(self.bookmarks.as_slice());
    }

    /// Replace the pinned-tab snapshot.
    pub fn set_pinned(&mut self, pinned: Vec<PinnedTab>) -> &[PinnedTab] {
        self.pinned = pinned;
        self.store.save_pinned(&self.pinned);
        &self.pinned
    }

    /// Bring up the browsing session for `partition`. Returns `true` the first
    /// time a partition is seen this run.
    pub fn ensure_session(&mut self, partition: &str) -> bool {
        if partition.is_empty() {
            return false;
        }
        if !is_persistent_partition(partition) {
            warn!(
                "registry: session {partition} is not durable; \
                 its storage will not survive a restart"
            );
        }
        self.sessions.insert(partition.to_string())
    }

    /// Turn address-bar text into a new favorite on a fresh partition.
    pub fn open_favorite(&mut self, raw_url: &str) -> Option<Bookmark> {
        let url = normalize_user_url(raw_url)?;
        let partition = self.allocate_for_url(&url);
        let bookmark = Bookmark::new(None, &url, partition.clone());
        if !self.bookmarks.add(bookmark.clone()) {
            return None;
        }
        self.store.save_bookmarks(self.bookmarks.as_slice());
        self.ensure_session(&partition);
        Some(bookmark)
    }

    fn allocate_for_url(&self, url: &str) -> String {
        let live = self
            .bookmarks
            .partitions()
            .chain(self.pinned.iter().map(|tab| tab.partition.as_str()));
        self.allocator.allocate_for_url(url, live)
    }

    fn retire(&mut self, partition: String) {
        self.sessions.remove(&partition);
        self.allocator.retire(partition);
    }
}

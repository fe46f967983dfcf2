/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Storage-partition naming.
//!
//! Every favorite is bound to one durable partition named
//! `persist:<slug>[<n>]`. The first partition for a domain carries no suffix
//! (implicit index 1); later ones count up from the highest index seen.

use std::collections::BTreeSet;

use url::Url;

/// Prefix the browser engine treats as durable (on-disk) session storage.
pub const PERSIST_PREFIX: &str = "persist:";

/// Slug used when a URL has no usable host.
pub const FALLBACK_DOMAIN_SLUG: &str = "site";

/// Derive the domain slug for `raw_url`: the host with every run of non-word
/// characters collapsed to `_`, lower-cased.
pub fn domain_slug_from_url(raw_url: &str) -> String {
    let Ok(parsed) = Url::parse(raw_url) else {
        return FALLBACK_DOMAIN_SLUG.to_string();
    };
    match parsed.host_str() {
        Some(host) if !host.is_empty() => slugify(host),
        _ => FALLBACK_DOMAIN_SLUG.to_string(),
    }
}

fn slugify(host: &str) -> String {
    let mut slug = String::with_capacity(host.len());
    let mut in_gap = false;
    for ch in host.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            slug.push(ch.to_ascii_lowercase());
            in_gap = false;
        } else if !in_gap {
            slug.push('_');
            in_gap = true;
        }
    }
    slug
}

/// `true` for `persist:` followed by a non-empty name without whitespace.
pub fn is_persistent_partition(partition: &str) -> bool {
    partition
        .strip_prefix(PERSIST_PREFIX)
        .is_some_and(|name| {
            !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
        })
}

/// Index `partition` occupies for `slug`, if it belongs to that domain.
///
/// `persist:<slug>` is index 1, `persist:<slug><n>` is index `n`.
pub fn partition_index(partition: &str, slug: &str) -> Option<u64> {
    let suffix = partition.strip_prefix(PERSIST_PREFIX)?.strip_prefix(slug)?;
    if suffix.is_empty() {
        return Some(1);
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u64>().ok()
}

/// Next free partition for `slug` given the partitions already in use.
///
/// Counts up from the highest index seen. Once that index is `u64::MAX` the
/// lowest index not in use is taken instead.
pub fn next_partition_for_domain<'a, I>(slug: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let used: BTreeSet<u64> = existing
        .into_iter()
        .filter_map(|partition| partition_index(partition, slug))
        .collect();
    let next = match used.last() {
        None => 1,
        Some(&max) => max
            .checked_add(1)
            .or_else(|| (1..=u64::MAX).find(|index| !used.contains(index)))
            .unwrap_or(max),
    };
    partition_name(slug, next)
}

fn partition_name(slug: &str, index: u64) -> String {
    if index <= 1 {
        format!("{PERSIST_PREFIX}{slug}")
    } else {
        format!("{PERSIST_PREFIX}{slug}{index}")
    }
}

/// Session-scoped allocator.
///
/// Remembers partitions released during this session so their indices are
/// not handed out again before the next restart.
#[derive(Debug, Default, Clone)]
pub struct PartitionAllocator {
    retired: BTreeSet<String>,
}

impl PartitionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate<'a, I>(&'a self, slug: &str, live: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let retired = self.retired.iter().map(String::as_str);
        next_partition_for_domain(slug, live.into_iter().chain(retired))
    }

    pub fn allocate_for_url<'a, I>(&'a self, url: &str, live: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.allocate(&domain_slug_from_url(url), live)
    }

    pub fn retire(&mut self, partition: impl Into<String>) {
        self.retired.insert(partition.into());
    }

    pub fn is_retired(&self, partition: &str) -> bool {
        self.retired.contains(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com", "example_com")]
    #[case("https://Mail.Example.COM/inbox", "mail_example_com")]
    #[case("http://my-site.io:8080/x", "my_site_io")]
    #[case("https://under_score.dev", "under_score_dev")]
    #[case("not a url", "site")]
    #[case("mailto:someone@example.com", "site")]
    fn slug_from_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(domain_slug_from_url(url), expected);
    }

    #[rstest]
    #[case("persist:example", Some(1))]
    #[case("persist:example7", Some(7))]
    #[case("persist:example_com", None)]
    #[case("persist:other", None)]
    #[case("example", None)]
    fn index_of_partition(#[case] partition: &str, #[case] expected: Option<u64>) {
        assert_eq!(partition_index(partition, "example"), expected);
    }

    #[test]
    fn first_partition_has_no_suffix() {
        assert_eq!(next_partition_for_domain("example", []), "persist:example");
    }

    #[test]
    fn unsuffixed_counts_as_one() {
        assert_eq!(
            next_partition_for_domain("example", ["persist:example"]),
            "persist:example2"
        );
    }

    #[test]
    fn continues_after_highest_index() {
        let existing = ["persist:d", "persist:d2"];
        assert_eq!(next_partition_for_domain("d", existing), "persist:d3");

        let gapped = ["persist:d5", "persist:other"];
        assert_eq!(next_partition_for_domain("d", gapped), "persist:d6");
    }

    #[test]
    fn saturated_index_falls_back_to_lowest_free() {
        let max = format!("persist:d{}", u64::MAX);
        assert_eq!(next_partition_for_domain("d", [max.as_str()]), "persist:d");
        assert_eq!(
            next_partition_for_domain("d", ["persist:d", max.as_str()]),
            "persist:d2"
        );
    }

    #[test]
    fn retired_partitions_are_not_reissued() {
        let mut allocator = PartitionAllocator::new();
        allocator.retire("persist:d2");

        assert_eq!(allocator.allocate("d", ["persist:d"]), "persist:d3");
        assert!(allocator.is_retired("persist:d2"));
    }

    #[test]
    fn persistent_partition_shape() {
        assert!(is_persistent_partition("persist:example"));
        assert!(!is_persistent_partition("persist:"));
        assert!(!is_persistent_partition("example"));
        assert!(!is_persistent_partition("persist:a b"));
        assert!(!is_persistent_partition("memory:example"));
    }

    proptest! {
        #[test]
        fn allocation_never_collides(
            slug in "[a-z][a-z_]{0,8}",
            indices in proptest::collection::btree_set(1u64..50, 0..6),
        ) {
            let existing: Vec<String> = indices
                .iter()
                .map(|&n| if n == 1 {
                    format!("persist:{slug}")
                } else {
                    format!("persist:{slug}{n}")
                })
                .collect();
            let next = next_partition_for_domain(&slug, existing.iter().map(String::as_str));

            prop_assert!(!existing.contains(&next));
            prop_assert!(is_persistent_partition(&next));
            let next_index = partition_index(&next, &slug).unwrap();
            prop_assert!(indices.iter().all(|&n| n < next_index));
        }

        #[test]
        fn repeated_allocation_is_monotonic(slug in "[a-z]{1,6}", rounds in 1usize..8) {
            let mut live = vec![format!("persist:{slug}"), format!("persist:{slug}2")];
            let mut last = 2;
            for _ in 0..rounds {
                let next = next_partition_for_domain(&slug, live.iter().map(String::as_str));
                let index = partition_index(&next, &slug).unwrap();
                prop_assert!(index > last);
                last = index;
                live.push(next);
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn repeat_within_ttl_is_duplicate() {
    let dedupe = MessageDeduplicator::new(Duration::from_secs(10));
    assert!(!dedupe.is_duplicate("abc", "hello"));
    assert!(dedupe.is_duplicate("abc", "hello"));
    assert!(dedupe.is_duplicate("abc", "hello"));
}

#[test]
fn different_node_or_text_is_fresh() {
    let dedupe = MessageDeduplicator::new(Duration::from_secs(10));
    assert!(!dedupe.is_duplicate("abc", "hello"));
    assert!(!dedupe.is_duplicate("abd", "hello"));
    assert!(!dedupe.is_duplicate("abc", "hello there"));
}

#[test]
fn expired_entry_is_fresh_again() {
    let dedupe = MessageDeduplicator::new(Duration::from_millis(20));
    assert!(!dedupe.is_duplicate("abc", "hello"));
    std::thread::sleep(Duration::from_millis(30));
    assert!(!dedupe.is_duplicate("abc", "hello"));
}

#[test]
fn clear_expired_prunes_only_stale_entries() {
    let dedupe = MessageDeduplicator::new(Duration::from_millis(20));
    let _ = dedupe.is_duplicate("old", "msg");
    std::thread::sleep(Duration::from_millis(30));
    let _ = dedupe.is_duplicate("new", "msg");

    assert_eq!(dedupe.len(), 2);
    dedupe.clear_expired();
    assert_eq!(dedupe.len(), 1);
    // The fresh entry still deduplicates.
    assert!(dedupe.is_duplicate("new", "msg"));
}

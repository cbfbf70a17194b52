// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound chunking: greedy word fill with `[i/N]` frame tags.

/// Tag plus separator space: `" [1/2]"` is 6 chars, `" [10/12]"` is 8.
const SUFFIX_SMALL: usize = 6;
const SUFFIX_LARGE: usize = 8;

/// Split `text` into frames no longer than `max_len` bytes. Multi-frame
/// output gets an ` [i/N]` suffix on every frame, with suffix space
/// reserved before packing. Single-frame input is passed through (words
/// re-joined with single spaces). Never fails; empty input yields one
/// empty frame.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    if text.len() <= max_len {
        return vec![normalize(text)];
    }

    let mut chunks = pack(text, max_len.saturating_sub(SUFFIX_SMALL));
    if chunks.len() >= 10 {
        // The wide tag needs two more reserved chars; repack.
        chunks = pack(text, max_len.saturating_sub(SUFFIX_LARGE));
    }

    if chunks.len() == 1 {
        return chunks;
    }

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("{chunk} [{}/{total}]", i + 1))
        .collect()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word fill. Words longer than `usable` are hard-split so the
/// frame-length bound always holds.
fn pack(text: &str, usable: usize) -> Vec<String> {
    let usable = usable.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut push_word = |chunks: &mut Vec<String>, current: &mut String, word: &str| {
        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current.len() + needed <= usable {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(current));
            }
            current.push_str(word);
        }
    };

    for word in text.split_whitespace() {
        if word.len() > usable {
            for piece in split_oversize(word, usable) {
                push_word(&mut chunks, &mut current, piece);
            }
        } else {
            push_word(&mut chunks, &mut current, word);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

fn split_oversize(word: &str, usable: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = word;
    while rest.len() > usable {
        let mut cut = usable;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            break;
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

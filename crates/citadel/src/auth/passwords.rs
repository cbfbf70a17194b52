// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PBKDF2-HMAC-SHA256 password hashing.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use ring::pbkdf2;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 64;

fn iterations() -> NonZeroU32 {
    NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Derive a key from `password` and return it base64-encoded for storage.
pub fn hash_password(password: &str, salt: &[u8]) -> String {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        salt,
        password.as_bytes(),
        &mut key,
    );
    BASE64.encode(key)
}

/// Constant-time check of `password` against a stored base64 hash.
pub fn verify_password(password: &str, salt: &[u8], stored_hash: &str) -> bool {
    let Ok(expected) = BASE64.decode(stored_hash) else {
        return false;
    };
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        salt,
        password.as_bytes(),
        &expected,
    )
    .is_ok()
}

#[cfg(test)]
#[path = "passwords_tests.rs"]
mod tests;

//! Instance name allocation
//!
//! Names are `ui_` followed by six random lowercase alphanumerics. Every
//! name handed out stays reserved for the lifetime of the allocator, and
//! names already present in the route table can be reserved up front, so a
//! new instance never overwrites an existing route.

use lumos_proto::{INSTANCE_NAME_LEN, INSTANCE_NAME_PREFIX};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Hands out unique instance names
#[derive(Debug, Default)]
pub struct NameAllocator {
    reserved: Mutex<HashSet<String>>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that never returns any of the given names
    pub fn with_reserved<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Allocate a fresh name and reserve it
    pub fn allocate(&self) -> String {
        let mut reserved = self.lock();
        loop {
            let candidate = random_name();
            if !reserved.contains(&candidate) {
                reserved.insert(candidate.clone());
                return candidate;
            }
            debug!("Instance name {} already taken, drawing again", candidate);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..INSTANCE_NAME_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", INSTANCE_NAME_PREFIX, suffix)
}

/// Whether a string has the shape of a generated instance name
#[cfg(test)]
pub(crate) fn is_instance_name(name: &str) -> bool {
    match name.strip_prefix(INSTANCE_NAME_PREFIX) {
        Some(suffix) => {
            suffix.len() == INSTANCE_NAME_LEN
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        }
        None => false,
    }
}

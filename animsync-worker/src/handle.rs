/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Handles to resources owned by another context, and the registries that
//! resolve them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::error::DispatchError;

/// Resource families addressed over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Module,
    File,
    View,
    VideoReader,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Module => "Module",
            Kind::File => "File",
            Kind::View => "View",
            Kind::VideoReader => "VideoReader",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

/// Identifies one execution context. Unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u32);

impl ContextId {
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a registry entry in the context that issued it.
///
/// `key` packs the slot index and generation, so a handle to a destroyed
/// entry never resolves to whatever later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub context: ContextId,
    pub kind: Kind,
    pub key: u64,
}

new_key_type! {
    struct EntryKey;
}

/// Owns the resources of one kind for one context.
pub struct Registry<T> {
    context: ContextId,
    kind: Kind,
    entries: SlotMap<EntryKey, T>,
}

impl<T> Registry<T> {
    pub fn new(context: ContextId, kind: Kind) -> Self {
        Self {
            context,
            kind,
            entries: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, value: T) -> Handle {
        let key = self.entries.insert(value);
        Handle {
            context: self.context,
            kind: self.kind,
            key: key.data().as_ffi(),
        }
    }

    pub fn get(&self, handle: Handle) -> Result<&T, DispatchError> {
        let key = self.resolve(handle)?;
        self.entries
            .get(key)
            .ok_or(DispatchError::UnknownHandle { kind: self.kind })
    }

    pub fn remove(&mut self, handle: Handle) -> Result<T, DispatchError> {
        let key = self.resolve(handle)?;
        self.entries
            .remove(key)
            .ok_or(DispatchError::UnknownHandle { kind: self.kind })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, handle: Handle) -> Result<EntryKey, DispatchError> {
        if handle.kind != self.kind {
            return Err(DispatchError::WrongKind {
                expected: self.kind,
                found: handle.kind,
            });
        }
        if handle.context != self.context {
            return Err(DispatchError::ForeignHandle {
                kind: self.kind,
                issuer: handle.context.0,
                context: self.context.0,
            });
        }
        Ok(EntryKey::from(KeyData::from_ffi(handle.key)))
    }
}

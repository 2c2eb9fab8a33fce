//! Loading each inode once
//!
//! A host filesystem looks inodes up by number, often from many threads at once. [`InodeCache`]
//! keeps one slot per inode number: either a load in progress, which later callers wait on, or a
//! finished inode. A failed load leaves no slot behind, so the next lookup tries again.

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::fragments::FragmentResolver;
use crate::ids::IdResolver;
use crate::inode::{Decoder, Inode};
use crate::metadata::MetadataSource;
use parking_lot::{Condvar, Mutex};
use repr::inode::{Number, Ref};
use slog::Logger;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Produces an inode from its location
pub trait InodeLoader {
    fn load(&self, inode_ref: Ref) -> Result<Inode>;
}

impl<S, I, F> InodeLoader for Decoder<S, I, F>
where
    S: MetadataSource,
    I: IdResolver,
    F: FragmentResolver,
{
    fn load(&self, inode_ref: Ref) -> Result<Inode> {
        self.decode(inode_ref)
    }
}

/// A load in progress, and the result once it finishes
struct Pending {
    outcome: Mutex<Option<Result<Arc<Inode>>>>,
    ready: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Arc<Inode>> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = &*outcome {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }

    fn publish(&self, result: Result<Arc<Inode>>) {
        *self.outcome.lock() = Some(result);
        self.ready.notify_all();
    }
}

enum Slot {
    Loading(Arc<Pending>),
    Loaded(Arc<Inode>),
}

enum Role {
    Lead(Arc<Pending>),
    Wait(Arc<Pending>),
}

/// Held by the caller running a load. If it is dropped before the load completes (the loader
/// panicked), waiters are told the load was abandoned and the slot is freed.
struct LoadGuard<'a, L> {
    cache: &'a InodeCache<L>,
    number: Number,
    pending: Arc<Pending>,
    done: bool,
}

impl<L> LoadGuard<'_, L> {
    fn complete(&mut self, result: Result<Arc<Inode>>) {
        {
            let mut slots = self.cache.slots.lock();
            let ours = matches!(
                slots.get(&self.number),
                Some(Slot::Loading(pending)) if Arc::ptr_eq(pending, &self.pending)
            );
            if ours {
                match &result {
                    Ok(inode) => {
                        slots.insert(self.number, Slot::Loaded(Arc::clone(inode)));
                    }
                    Err(_) => {
                        slots.remove(&self.number);
                    }
                }
            }
        }
        self.pending.publish(result);
        self.done = true;
    }
}

impl<L> Drop for LoadGuard<'_, L> {
    fn drop(&mut self) {
        if !self.done {
            slog::warn!(self.cache.logger, "Inode load abandoned"; "number" => self.number.0);
            self.complete(Err(Error::Abandoned(self.number.0)));
        }
    }
}

/// Inodes keyed by inode number, each loaded at most once at a time
pub struct InodeCache<L> {
    loader: L,
    slots: Mutex<HashMap<Number, Slot>>,
    verify_inode_numbers: bool,
    logger: Logger,
}

impl<L: InodeLoader> InodeCache<L> {
    pub fn new(loader: L, config: &Config, logger: Logger) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
            verify_inode_numbers: config.verify_inode_numbers,
            logger,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Get the inode `number`, loading it from `inode_ref` unless it is already loaded
    ///
    /// Callers asking for a number which is being loaded by another thread block until that load
    /// finishes, and all receive its result. Failures are not remembered.
    pub fn get_or_load(&self, number: Number, inode_ref: Ref) -> Result<Arc<Inode>> {
        let role = {
            let mut slots = self.slots.lock();
            match slots.get(&number) {
                Some(Slot::Loaded(inode)) => return Ok(Arc::clone(inode)),
                Some(Slot::Loading(pending)) => Role::Wait(Arc::clone(pending)),
                None => {
                    let pending = Arc::new(Pending::new());
                    slots.insert(number, Slot::Loading(Arc::clone(&pending)));
                    Role::Lead(pending)
                }
            }
        };
        let pending = match role {
            Role::Lead(pending) => pending,
            Role::Wait(pending) => {
                slog::trace!(self.logger, "Waiting for inode load"; "number" => number.0);
                return pending.wait();
            }
        };

        slog::debug!(self.logger, "Loading inode";
            "number" => number.0,
            "ref" => format!("{:#x}", inode_ref.0)
        );
        let mut guard = LoadGuard {
            cache: self,
            number,
            pending,
            done: false,
        };
        let result = self
            .loader
            .load(inode_ref)
            .and_then(|inode| self.check(number, inode_ref, inode))
            .map(Arc::new);
        guard.complete(result.clone());
        result
    }

    fn check(&self, number: Number, inode_ref: Ref, inode: Inode) -> Result<Inode> {
        if self.verify_inode_numbers && inode.inode_number != number {
            return Err(Error::malformed(
                inode_ref,
                format!(
                    "looked up as inode {}, but the record is inode {}",
                    number.0, inode.inode_number.0
                ),
            ));
        }
        Ok(inode)
    }

    /// The inode `number`, if it has finished loading
    pub fn get(&self, number: Number) -> Option<Arc<Inode>> {
        match self.slots.lock().get(&number) {
            Some(Slot::Loaded(inode)) => Some(Arc::clone(inode)),
            _ => None,
        }
    }

    /// Drop the loaded inode `number`, so the next lookup decodes it again
    ///
    /// A load in progress is left alone. Returns whether anything was dropped.
    pub fn forget(&self, number: Number) -> bool {
        let mut slots = self.slots.lock();
        if let Some(Slot::Loaded(_)) = slots.get(&number) {
            slots.remove(&number);
            slog::debug!(self.logger, "Forgot inode"; "number" => number.0);
            true
        } else {
            false
        }
    }
}

impl<L> fmt::Debug for InodeCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let loading = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Loading(_)))
            .count();
        f.debug_struct("InodeCache")
            .field("loaded", &(slots.len() - loading))
            .field("loading", &loading)
            .field("verify_inode_numbers", &self.verify_inode_numbers)
            .finish()
    }
}

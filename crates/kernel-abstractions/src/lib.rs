//! The guest-visible kernel object table: dense, reused 32-bit handles
//! mapping to arbitrary kernel objects (spec.md §4.1, grounded on
//! `KProcess::handle_table` / `KObject` from the original source).
//!
//! Unlike the original's `std::map<handle_t, std::shared_ptr<KObject>>`,
//! handles here are backed by a [`slab::Slab`] arena: allocation reuses the
//! lowest free index, exactly like the original's `handle_index` counter but
//! without ever needing to hand back memory to the allocator.

mod handle;

pub use handle::Handle;

use constants::ResultCode;
use slab::Slab;

/// Anything that can live in a [`HandleTable`]. Implementors typically are
/// an enum discriminating every kind of guest kernel object (thread,
/// process, shared memory, session) the way `KObjectType` did in the
/// original, but as a trait rather than an enum tag so crates outside
/// `kernel-abstractions` can add object kinds without editing a shared enum.
pub trait KernelObject: core::fmt::Debug {
    fn type_name(&self) -> &'static str;
}

/// A handle table owning every live kernel object of type `T` for one guest
/// process.
#[derive(Debug, Default)]
pub struct HandleTable<T> {
    slots: Slab<T>,
}

impl<T: KernelObject> HandleTable<T> {
    pub fn new() -> Self {
        HandleTable { slots: Slab::new() }
    }

    /// Registers `object`, returning the handle guest code will use to refer
    /// to it. Handle `0` is never issued (spec.md §4.1's "handle 0 is
    /// invalid" invariant).
    pub fn open(&mut self, object: T) -> Handle {
        let key = self.slots.insert(object);
        let handle = Handle::from_slot(key);
        log::trace!("opened handle {handle:?} for a {}", self.slots[key].type_name());
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        handle.to_slot().and_then(|key| self.slots.get(key))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        handle.to_slot().and_then(move |key| self.slots.get_mut(key))
    }

    /// As [`Self::get`], but returns the guest-visible `InvalidHandle` error
    /// code on a miss, ready to propagate out of a syscall handler.
    pub fn get_or_invalid(&self, handle: Handle) -> Result<&T, ResultCode> {
        self.get(handle).ok_or(ResultCode::InvalidHandle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        handle.to_slot().is_some_and(|key| self.slots.contains(key))
    }

    /// Closes `handle`, returning the object that was registered under it.
    pub fn close(&mut self, handle: Handle) -> Option<T> {
        let key = handle.to_slot()?;
        if self.slots.contains(key) {
            let object = self.slots.remove(key);
            log::trace!("closed handle {handle:?} ({})", object.type_name());
            Some(object)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

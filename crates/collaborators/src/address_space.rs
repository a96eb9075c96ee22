use address::GuestAddress;

/// Maps guest-visible anonymous memory, backing syscalls like
/// `SetHeapSize` that must hand the guest a usable, RW-mapped region
/// (spec.md §8 Scenario E). Grounded on the teacher's
/// `mmap-abstractions`/`mmu-abstractions` split: this core never walks
/// page tables itself, it asks the host collaborator to do the mapping.
pub trait GuestAddressSpace: Send + Sync {
    /// Maps (or resizes, if already mapped) the guest heap region to
    /// `size` bytes RW, returning its page-aligned base address.
    fn set_heap_size(&self, size: usize) -> GuestAddress;
}

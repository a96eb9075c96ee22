use crate::{CallbackEntry, HostPageProtection, LockCallback, TrapCallback, TrapProtection};
use address::{GuestAddress, GuestAddressRange};
use interval_map::{GroupHandle, Interval, IntervalMap};
use parking_lot::Mutex;

/// Opaque reference to a registered trap group, returned by
/// [`TrapManager::create_trap`] (spec.md §3 "Trap group").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TrapHandle(GroupHandle);

/// Something that can apply a host page permission to a guest address range
/// — an mprotect-shaped collaborator (spec.md §6's page-protection half of
/// the Signal installer contract).
pub trait PageProtector: Send + Sync {
    fn protect(&self, range: GuestAddressRange, protection: HostPageProtection);
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum TrapError {
    #[error("trap region {0:?} starts below the manager's base address")]
    BelowManagedBase(GuestAddressRange),
    #[error("trap region {0:?} is empty")]
    EmptyRegion(GuestAddressRange),
    #[error("unknown trap handle")]
    UnknownHandle,
    #[error("fault handler retried {0} times without a callback completing; logic error in a trap callback")]
    RetryExhausted(u32),
}

/// Bounds the lock-callback retry loop so a genuinely stuck callback becomes
/// a diagnosable fatal error instead of an infinite spin (spec.md §4.2: "not
/// formally bounded... implementations must not assume a single retry
/// suffices" — bounded here generously rather than left unbounded).
const MAX_RETRIES: u32 = 1024;

/// Tracks guest memory regions and converts host page-fault notifications
/// into precise read/write callbacks to every trap group that overlaps the
/// faulting page (spec.md §4.2, grounded on `skyline::TrapManager`).
pub struct TrapManager<P> {
    base: GuestAddress,
    protector: P,
    map: Mutex<IntervalMap<GuestAddress, CallbackEntry>>,
}

impl<P: PageProtector> TrapManager<P> {
    /// `base` is the lowest guest address the manager is willing to track;
    /// it must be page-aligned, matching the managed guest address space's
    /// mapping base.
    pub fn new(base: GuestAddress, protector: P) -> Self {
        assert!(base.is_page_aligned(), "trap manager base must be page-aligned");
        TrapManager {
            base,
            protector,
            map: Mutex::new(IntervalMap::new()),
        }
    }

    /// Registers a new trap group over `regions`, initially unarmed
    /// (`TrapProtection::None`, so no page protection is installed until the
    /// caller calls [`Self::arm`]).
    pub fn create_trap(
        &self,
        regions: &[GuestAddressRange],
        lock: LockCallback,
        on_read: TrapCallback,
        on_write: TrapCallback,
    ) -> Result<TrapHandle, TrapError> {
        for region in regions {
            if region.is_empty() {
                return Err(TrapError::EmptyRegion(*region));
            }
            if region.start() < self.base {
                return Err(TrapError::BelowManagedBase(*region));
            }
        }

        let intervals: Vec<Interval<GuestAddress>> = regions
            .iter()
            .map(|r| Interval::new(r.start(), r.end()))
            .collect();

        let entry = CallbackEntry::new(lock, on_read, on_write);
        let mut map = self.map.lock();
        let handle = map.insert_multi(&intervals, entry);
        log::trace!("created trap group {handle:?} over {} region(s)", regions.len());
        Ok(TrapHandle(handle))
    }

    /// Arms `handle`, requiring `on_write` (and, unless `write_only`,
    /// `on_read`) to run before the guest is allowed to touch its regions
    /// again (spec.md §4.2's `arm(group, write_only)`).
    pub fn arm(&self, handle: TrapHandle, write_only: bool) -> Result<(), TrapError> {
        let protection = if write_only {
            TrapProtection::WriteOnly
        } else {
            TrapProtection::ReadWrite
        };
        self.set_protection(handle, protection)
    }

    /// Disarms `handle`: the group no longer contributes to any page's
    /// protection requirement, though it remains registered.
    pub fn disarm(&self, handle: TrapHandle) -> Result<(), TrapError> {
        self.set_protection(handle, TrapProtection::None)
    }

    /// Disarms and unregisters `handle`.
    pub fn delete_trap(&self, handle: TrapHandle) -> Result<(), TrapError> {
        self.disarm(handle)?;
        let mut map = self.map.lock();
        map.remove(handle.0).ok_or(TrapError::UnknownHandle)?;
        Ok(())
    }

    fn set_protection(&self, handle: TrapHandle, protection: TrapProtection) -> Result<(), TrapError> {
        let mut map = self.map.lock();
        map.group_value_mut(handle.0).ok_or(TrapError::UnknownHandle)?.protection = protection;
        let intervals = map.group_intervals(handle.0).ok_or(TrapError::UnknownHandle)?.to_vec();
        self.reprotect_intervals(&map, &intervals, protection);
        Ok(())
    }

    /// The fault-handling algorithm (spec.md §4.2 steps 1-6, grounded on
    /// `TrapManager::HandleTrap`). Returns `Ok(true)` if some group handled
    /// the fault, `Ok(false)` if the address is untracked and the signal
    /// should propagate as fatal.
    pub fn handle_fault(&self, address: GuestAddress, is_write: bool) -> Result<bool, TrapError> {
        let mut pending_lock: Option<LockCallback> = None;
        let mut retries = 0u32;

        loop {
            if let Some(lock) = pending_lock.take() {
                log::warn!("trap callback would block at {address:?}, invoking lock callback and retrying");
                lock();
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(TrapError::RetryExhausted(retries));
                }
            }

            let mut map = self.map.lock();
            let (groups, intervals) =
                map.get_aligned_recursive_range_point_handles::<{ constants::PAGE_SIZE }>(address);
            if groups.is_empty() {
                return Ok(false);
            }

            if is_write {
                for group in &groups {
                    let Some(entry) = map.group_value(*group) else { continue };
                    if entry.protection == TrapProtection::None {
                        continue;
                    }
                    let on_write = entry.on_write.clone();
                    if !on_write() {
                        pending_lock = Some(entry.lock.clone());
                        break;
                    }
                    map.group_value_mut(*group).unwrap().protection = TrapProtection::None;
                }
            } else {
                for group in &groups {
                    let Some(entry) = map.group_value(*group) else { continue };
                    if entry.protection != TrapProtection::ReadWrite {
                        continue;
                    }
                    let on_read = entry.on_read.clone();
                    if !on_read() {
                        pending_lock = Some(entry.lock.clone());
                        break;
                    }
                    map.group_value_mut(*group).unwrap().protection = TrapProtection::WriteOnly;
                }
            }
            if pending_lock.is_some() {
                continue;
            }

            // spec.md §4.2 step 6: the page's new permission is the strictest
            // requirement any overlapping group still carries once this
            // fault's callbacks have run — a group demoted `ReadWrite ->
            // WriteOnly` still forbids writes, it does not count as `None`.
            let strictest = groups
                .iter()
                .filter_map(|g| map.group_value(*g))
                .map(|e| e.protection)
                .max()
                .unwrap_or(TrapProtection::None);
            let permission = strictest.host_permission_for_none();
            for interval in &intervals {
                self.protector.protect(
                    GuestAddressRange::from_start_end(interval.start, interval.end),
                    permission,
                );
            }

            return Ok(true);
        }
    }

    fn reprotect_intervals(
        &self,
        map: &IntervalMap<GuestAddress, CallbackEntry>,
        intervals: &[Interval<GuestAddress>],
        protection: TrapProtection,
    ) {
        for region in intervals {
            let aligned = region.align(constants::PAGE_SIZE);
            let range = GuestAddressRange::from_start_end(aligned.start, aligned.end);
            let entries = map.get_range(aligned);

            let permission = match protection {
                TrapProtection::None => {
                    let strictest = entries
                        .iter()
                        .map(|e| e.protection)
                        .max()
                        .unwrap_or(TrapProtection::None);
                    strictest.host_permission_for_none()
                }
                TrapProtection::WriteOnly => {
                    if entries.iter().any(|e| e.protection == TrapProtection::ReadWrite) {
                        HostPageProtection::NONE
                    } else {
                        HostPageProtection::READ_EXEC
                    }
                }
                TrapProtection::ReadWrite => HostPageProtection::NONE,
            };

            self.protector.protect(range, permission);
        }
    }
}

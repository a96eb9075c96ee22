use bitflags::bitflags;

bitflags! {
    /// The host page permissions the manager asks the page protector
    /// collaborator to apply. Mirrors the `PROT_READ`/`PROT_WRITE`/`PROT_EXEC`
    /// combinations `TrapManager::ReprotectIntervals` passed to `mprotect`.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct HostPageProtection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl HostPageProtection {
    pub const NONE: HostPageProtection = HostPageProtection::empty();
    pub const READ_EXEC: HostPageProtection = HostPageProtection::READ.union(HostPageProtection::EXEC);
    pub const READ_WRITE_EXEC: HostPageProtection = HostPageProtection::READ
        .union(HostPageProtection::WRITE)
        .union(HostPageProtection::EXEC);
}

/// The guest-facing protection level a single trap group contributes to
/// every page it covers (spec.md §4.2 "Protection model").
///
/// Ordered so the strictest requirement across overlapping groups can be
/// found with a plain `max` (`ReadWrite` > `WriteOnly` > `None`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum TrapProtection {
    #[default]
    None,
    WriteOnly,
    ReadWrite,
}

impl TrapProtection {
    /// The host page permission that grants exactly the accesses *not*
    /// covered by this single requirement, used as the per-group
    /// contribution before the manager takes the strictest one across a page.
    pub fn host_permission_for_none(self) -> HostPageProtection {
        match self {
            TrapProtection::None => HostPageProtection::READ_WRITE_EXEC,
            TrapProtection::WriteOnly => HostPageProtection::READ_EXEC,
            TrapProtection::ReadWrite => HostPageProtection::NONE,
        }
    }
}

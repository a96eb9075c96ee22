use crate::Interval;
use abstractions::IUsizeAlias;
use slab::Slab;

/// A handle to a group of intervals previously inserted into an
/// [`IntervalMap`]. Handles are dense indices into an internal arena and are
/// reused after [`IntervalMap::remove`] — the same reuse scheme the kernel
/// object table uses for guest handles, so callers must not retain a handle
/// past the removal of the group it names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GroupHandle(usize);

struct EntryGroup<A, V> {
    intervals: Vec<Interval<A>>,
    value: V,
}

struct Entry<A> {
    start: A,
    end: A,
    group: GroupHandle,
}

/// An associative map of (possibly overlapping) interval groups to values,
/// supporting point lookup, range lookup and the recursive aligned-range
/// query the trap manager uses to widen a fault to everything it can safely
/// reprotect in one pass (spec.md §4.2, grounded on `interval_map.h`).
///
/// Entries are kept sorted by interval start. The original C++ derives the
/// insertion point from the new interval's end address, which relies on an
/// invariant (new intervals never strictly enclose a run of previously
/// inserted smaller ones) that doesn't hold in general; this port sorts and
/// searches consistently on start so the binary searches stay well-defined
/// for every insertion order.
pub struct IntervalMap<A, V> {
    groups: Slab<EntryGroup<A, V>>,
    entries: Vec<Entry<A>>,
}

impl<A: IUsizeAlias, V> Default for IntervalMap<A, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: IUsizeAlias, V> IntervalMap<A, V> {
    pub fn new() -> Self {
        IntervalMap {
            groups: Slab::new(),
            entries: Vec::new(),
        }
    }

    fn lower_bound_start(&self, target: usize) -> usize {
        self.entries.partition_point(|e| e.start.as_usize() < target)
    }

    fn insert_entry(&mut self, start: A, end: A, group: GroupHandle) {
        let pos = self.lower_bound_start(start.as_usize());
        self.entries.insert(pos, Entry { start, end, group });
    }

    /// Inserts a single interval as its own group, returning a handle to it.
    pub fn insert(&mut self, start: A, end: A, value: V) -> GroupHandle {
        let key = self.groups.insert(EntryGroup {
            intervals: vec![Interval::new(start, end)],
            value,
        });
        let handle = GroupHandle(key);
        self.insert_entry(start, end, handle);
        handle
    }

    /// Inserts several intervals as a single group sharing one value — used
    /// for a tiled GPU surface whose guest backing spans multiple
    /// non-contiguous ranges.
    pub fn insert_multi(&mut self, intervals: &[Interval<A>], value: V) -> GroupHandle {
        let key = self.groups.insert(EntryGroup {
            intervals: intervals.to_vec(),
            value,
        });
        let handle = GroupHandle(key);
        for interval in intervals {
            self.insert_entry(interval.start, interval.end, handle);
        }
        handle
    }

    /// Removes every interval belonging to `group` and returns its value.
    pub fn remove(&mut self, group: GroupHandle) -> Option<V> {
        self.entries.retain(|e| e.group != group);
        self.groups.try_remove(group.0).map(|g| g.value)
    }

    pub fn group_value(&self, group: GroupHandle) -> Option<&V> {
        self.groups.get(group.0).map(|g| &g.value)
    }

    pub fn group_value_mut(&mut self, group: GroupHandle) -> Option<&mut V> {
        self.groups.get_mut(group.0).map(|g| &mut g.value)
    }

    pub fn group_intervals(&self, group: GroupHandle) -> Option<&[Interval<A>]> {
        self.groups.get(group.0).map(|g| g.intervals.as_slice())
    }

    /// Returns the value of any group overlapping `address`.
    pub fn get(&self, address: A) -> Option<&V> {
        let addr = address.as_usize();
        let mut idx = self.lower_bound_start(addr);
        while idx != 0 {
            idx -= 1;
            if self.entries[idx].start.as_usize() > addr {
                break;
            }
            if self.entries[idx].end.as_usize() > addr {
                return self.group_value(self.entries[idx].group);
            }
        }
        None
    }

    /// Returns the values of every group overlapping `interval`, each group
    /// appearing at most once.
    pub fn get_range(&self, interval: Interval<A>) -> Vec<&V> {
        let end = interval.end.as_usize();
        let start = interval.start.as_usize();

        let mut seen = Vec::new();
        let mut result = Vec::new();

        let mut idx = self.lower_bound_start(end);
        while idx != 0 {
            idx -= 1;
            if self.entries[idx].start.as_usize() >= end {
                break;
            }
            let entry = &self.entries[idx];
            if entry.end.as_usize() > start && !seen.contains(&entry.group) {
                seen.push(entry.group);
                if let Some(value) = self.group_value(entry.group) {
                    result.push(value);
                }
            }
        }

        result
    }

    /// Returns every group overlapping `interval` and a minimal set of
    /// aligned, coalesced sub-intervals the caller can safely treat as
    /// belonging exclusively to one of those groups for the purpose of a
    /// single fault-handling pass (spec.md §4.2 / §9's "recursive aligned
    /// range" invariant).
    ///
    /// This mirrors `IntervalMap::GetAlignedRecursiveRange` from the
    /// original trap manager: entries that exclusively occupy the aligned
    /// lookup region contribute everything they (recursively) overlap;
    /// entries that only partially occupy it contribute only the
    /// sub-intervals nobody else touches.
    pub fn get_aligned_recursive_range<const ALIGNMENT: usize>(
        &self,
        interval: Interval<A>,
    ) -> (Vec<&V>, Vec<Interval<A>>) {
        let (groups, intervals) = self.get_aligned_recursive_range_handles::<ALIGNMENT>(interval);
        let values = groups.into_iter().filter_map(|g| self.group_value(g)).collect();
        (values, intervals)
    }

    /// As [`Self::get_aligned_recursive_range`], but returns the group
    /// handles rather than borrowed values — callers (the trap manager, in
    /// particular) that need to mutate each group's value in place go
    /// through this and `group_value_mut` instead.
    pub fn get_aligned_recursive_range_handles<const ALIGNMENT: usize>(
        &self,
        interval: Interval<A>,
    ) -> (Vec<GroupHandle>, Vec<Interval<A>>) {
        let interval = interval.align(ALIGNMENT);

        let mut query_groups: Vec<GroupHandle> = Vec::new();
        let mut intervals: Vec<Interval<A>> = Vec::new();

        let entry_idx = self.lower_bound_start(interval.end.as_usize());
        let exclusive_entry = entry_idx == 0
            || entry_idx == 1
            || self.entries[entry_idx - 2].start.as_usize() >= interval.end.as_usize();

        let mut idx = entry_idx;
        while idx != 0 {
            idx -= 1;
            if self.entries[idx].start.as_usize() >= interval.end.as_usize() {
                break;
            }

            let (entry_start, entry_end, entry_group) = {
                let e = &self.entries[idx];
                (e.start, e.end, e.group)
            };

            if entry_end.as_usize() <= interval.start.as_usize() || query_groups.contains(&entry_group) {
                continue;
            }
            query_groups.push(entry_group);

            let group_intervals = self
                .groups
                .get(entry_group.0)
                .map(|g| g.intervals.clone())
                .unwrap_or_default();

            for entry_interval in &group_intervals {
                let aligned = entry_interval.align(ALIGNMENT);

                if exclusive_entry || *entry_interval == Interval::new(entry_start, entry_end) {
                    self.collect_exclusive_or_matching::<ALIGNMENT>(
                        aligned,
                        entry_group,
                        &mut query_groups,
                        &mut intervals,
                    );
                    intervals.push(aligned);
                } else if self.is_exclusive_interval(aligned, entry_group) {
                    intervals.push(aligned);
                }
            }
        }

        intervals.sort_by_key(|iv| iv.start.as_usize());
        coalesce(&mut intervals);

        (query_groups, intervals)
    }

    /// Case (1)/(3) of `GetAlignedRecursiveRange`: pulls in every other group
    /// overlapping `aligned`, and for each of those, every sub-interval they
    /// exclusively own.
    fn collect_exclusive_or_matching<const ALIGNMENT: usize>(
        &self,
        aligned: Interval<A>,
        owning_group: GroupHandle,
        query_groups: &mut Vec<GroupHandle>,
        intervals: &mut Vec<Interval<A>>,
    ) {
        let mut idx = self.lower_bound_start(aligned.end.as_usize());
        while idx != 0 {
            idx -= 1;
            if self.entries[idx].start.as_usize() >= aligned.end.as_usize() {
                break;
            }

            let (recursed_end, recursed_group) = {
                let e = &self.entries[idx];
                (e.end, e.group)
            };

            if recursed_end.as_usize() <= aligned.start.as_usize()
                || recursed_group == owning_group
                || query_groups.contains(&recursed_group)
            {
                continue;
            }
            query_groups.push(recursed_group);

            let recursed_intervals = self
                .groups
                .get(recursed_group.0)
                .map(|g| g.intervals.clone())
                .unwrap_or_default();

            for entry_interval2 in &recursed_intervals {
                let aligned2 = entry_interval2.align(ALIGNMENT);
                if self.is_exclusive_interval_excluding(aligned2, recursed_group, owning_group) {
                    intervals.push(aligned2);
                }
            }
        }
    }

    /// Whether `aligned` is only covered by `group` (case (2) of
    /// `GetAlignedRecursiveRange`).
    fn is_exclusive_interval(&self, aligned: Interval<A>, group: GroupHandle) -> bool {
        self.is_exclusive_interval_excluding(aligned, group, group)
    }

    fn is_exclusive_interval_excluding(
        &self,
        aligned: Interval<A>,
        group: GroupHandle,
        also_allow: GroupHandle,
    ) -> bool {
        let mut idx = self.lower_bound_start(aligned.end.as_usize());
        while idx != 0 {
            idx -= 1;
            if self.entries[idx].start.as_usize() >= aligned.end.as_usize() {
                break;
            }
            let entry = &self.entries[idx];
            if entry.end.as_usize() > aligned.start.as_usize()
                && entry.group != group
                && entry.group != also_allow
            {
                return false;
            }
        }
        true
    }

    /// Same as [`Self::get_aligned_recursive_range`] but for a single point.
    pub fn get_aligned_recursive_range_point<const ALIGNMENT: usize>(
        &self,
        address: A,
    ) -> (Vec<&V>, Vec<Interval<A>>) {
        self.get_aligned_recursive_range::<ALIGNMENT>(Interval::new(address, A::from_usize(address.as_usize() + 1)))
    }

    /// As [`Self::get_aligned_recursive_range_point`], but returns handles —
    /// see [`Self::get_aligned_recursive_range_handles`].
    pub fn get_aligned_recursive_range_point_handles<const ALIGNMENT: usize>(
        &self,
        address: A,
    ) -> (Vec<GroupHandle>, Vec<Interval<A>>) {
        self.get_aligned_recursive_range_handles::<ALIGNMENT>(Interval::new(
            address,
            A::from_usize(address.as_usize() + 1),
        ))
    }
}

fn coalesce<A: IUsizeAlias>(intervals: &mut Vec<Interval<A>>) {
    let mut i = 0;
    while i + 1 < intervals.len() {
        if intervals[i].end.as_usize() >= intervals[i + 1].start.as_usize() {
            let start = intervals[i].start.as_usize().min(intervals[i + 1].start.as_usize());
            let end = intervals[i].end.as_usize().max(intervals[i + 1].end.as_usize());
            intervals[i] = Interval::new(A::from_usize(start), A::from_usize(end));
            intervals.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

//! **Portable sort primitive** shared by every subsystem that restores
//! canonical cluster order.
//!
//! One ordering contract, three backends picked at build time:
//!
//! - default: the standard library's unstable sort;
//! - `portable-sort`: an in-place quicksort with an insertion-sort floor,
//!   safe on targets that support recursion but ship no library sort;
//! - `portable-sort` + `no-recursion`: insertion sort only, quadratic but
//!   correct on targets where recursion is unavailable.
//!
//! The comparator variants take a strict-less predicate, mirroring the
//! default variants with `less(a, b)` in place of `a < b`.

use std::marker::PhantomData;
use std::sync::{Arc, Barrier};

// ------------------------------------------------------------------
// 1. Public entry points
// ------------------------------------------------------------------
/// Order a contiguous range in place, ascending.
#[inline(always)]
pub fn sort<T: Ord>(range: &mut [T]) {
    #[cfg(not(feature = "portable-sort"))]
    range.sort_unstable();
    #[cfg(all(feature = "portable-sort", not(feature = "no-recursion")))]
    quicksort(range);
    #[cfg(all(feature = "portable-sort", feature = "no-recursion"))]
    insertion_sort(range);
}

/// Order a contiguous range in place under a strict-less comparator.
#[inline(always)]
pub fn sort_by<T, F>(range: &mut [T], less: F)
where
    F: Fn(&T, &T) -> bool,
{
    #[cfg(not(feature = "portable-sort"))]
    range.sort_unstable_by(|a, b| {
        if less(a, b) {
            std::cmp::Ordering::Less
        } else if less(b, a) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    #[cfg(all(feature = "portable-sort", not(feature = "no-recursion")))]
    quicksort_by(range, &less);
    #[cfg(all(feature = "portable-sort", feature = "no-recursion"))]
    insertion_sort_by(range, &less);
}

// ------------------------------------------------------------------
// 2. Block-cooperative variant
// ------------------------------------------------------------------
/// Execution context for a cooperating thread group.
///
/// Exactly one member reports itself leader. `barrier` must be reached by
/// every member; divergent control flow that skips it is undefined behavior
/// by contract, not a recoverable condition.
pub trait BlockContext {
    fn is_leader(&self) -> bool;
    fn barrier(&self);
}

/// Degenerate group of one. Used on sequential targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBlock;

impl BlockContext for SequentialBlock {
    #[inline(always)]
    fn is_leader(&self) -> bool {
        true
    }

    #[inline(always)]
    fn barrier(&self) {}
}

/// One member of a thread group synchronized by a shared barrier.
#[derive(Debug, Clone)]
pub struct ThreadBlock {
    leader: bool,
    barrier: Arc<Barrier>,
}

impl ThreadBlock {
    /// Create handles for a group of `members` threads. The first handle is
    /// the leader.
    pub fn group(members: usize) -> Vec<Self> {
        let barrier = Arc::new(Barrier::new(members));
        (0..members)
            .map(|i| Self {
                leader: i == 0,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl BlockContext for ThreadBlock {
    #[inline(always)]
    fn is_leader(&self) -> bool {
        self.leader
    }

    #[inline(always)]
    fn barrier(&self) {
        self.barrier.wait();
    }
}

/// A range shared across one cooperating group for the duration of a
/// [`sort_in_block`] call. Members hand the same view to the call; only the
/// leader touches the data, the barrier publishes it to the rest.
pub struct BlockSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _life: PhantomData<&'a mut [T]>,
}

// Only the leader dereferences between barriers.
unsafe impl<T: Send> Send for BlockSlice<'_, T> {}
unsafe impl<T: Send> Sync for BlockSlice<'_, T> {}

impl<'a, T> BlockSlice<'a, T> {
    pub fn new(range: &'a mut [T]) -> Self {
        Self {
            ptr: range.as_mut_ptr(),
            len: range.len(),
            _life: PhantomData,
        }
    }

    #[inline(always)]
    unsafe fn leader_view(&self) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

/// Sort a shared range from inside a cooperating group: the leader sorts,
/// the barrier makes the result visible to every member.
pub fn sort_in_block<T: Ord, C: BlockContext>(ctx: &C, range: &BlockSlice<'_, T>) {
    if ctx.is_leader() {
        // Sole writer until the barrier below.
        sort(unsafe { range.leader_view() });
    }
    ctx.barrier();
}

/// Comparator form of [`sort_in_block`].
pub fn sort_in_block_by<T, C, F>(ctx: &C, range: &BlockSlice<'_, T>, less: F)
where
    C: BlockContext,
    F: Fn(&T, &T) -> bool,
{
    if ctx.is_leader() {
        sort_by(unsafe { range.leader_view() }, less);
    }
    ctx.barrier();
}

// ------------------------------------------------------------------
// 3. Quicksort backend
// ------------------------------------------------------------------
// Midpoint pivot swapped to the front, converging scan from both ends,
// insertion-sort floor at five elements and below.

const INSERTION_FLOOR: usize = 5;

/// The recursive backend, callable directly regardless of feature flags.
pub fn quicksort<T: Ord>(v: &mut [T]) {
    if v.len() <= 1 {
        return;
    }
    if v.len() <= INSERTION_FLOOR {
        insertion_sort(v);
        return;
    }
    let pivot = partition(v);
    let (lower, upper) = v.split_at_mut(pivot);
    quicksort(lower);
    quicksort(&mut upper[1..]);
}

fn partition<T: Ord>(v: &mut [T]) -> usize {
    let mid = v.len() / 2;
    v.swap(mid, 0);
    let mut i = 1;
    let mut j = v.len() - 1;
    while i <= j {
        while i <= j && v[i] <= v[0] {
            i += 1;
        }
        while i <= j && v[j] > v[0] {
            j -= 1;
        }
        if i < j {
            v.swap(i, j);
        }
    }
    v.swap(i - 1, 0);
    i - 1
}

pub fn quicksort_by<T, F>(v: &mut [T], less: &F)
where
    F: Fn(&T, &T) -> bool,
{
    if v.len() <= 1 {
        return;
    }
    if v.len() <= INSERTION_FLOOR {
        insertion_sort_by(v, less);
        return;
    }
    let pivot = partition_by(v, less);
    let (lower, upper) = v.split_at_mut(pivot);
    quicksort_by(lower, less);
    quicksort_by(&mut upper[1..], less);
}

fn partition_by<T, F>(v: &mut [T], less: &F) -> usize
where
    F: Fn(&T, &T) -> bool,
{
    // Pivot parks at the back here; the scan directions swap accordingly.
    let mid = v.len() / 2;
    let last = v.len() - 1;
    v.swap(mid, last);
    let mut i = 0;
    let mut j = last - 1;
    loop {
        while i <= j && !less(&v[j], &v[last]) {
            if j == 0 {
                break;
            }
            j -= 1;
        }
        while i <= j && less(&v[i], &v[last]) {
            i += 1;
        }
        if i < j {
            v.swap(i, j);
        } else {
            break;
        }
    }
    v.swap(i, last);
    i
}

// ------------------------------------------------------------------
// 4. Insertion backend
// ------------------------------------------------------------------
// Selection of the minimum remaining element per pass, one swap into place.

/// The recursion-free backend, callable directly regardless of feature
/// flags. Quadratic; meant for small ranges.
pub fn insertion_sort<T: Ord>(v: &mut [T]) {
    for left in 0..v.len() {
        let mut min = left;
        for probe in left + 1..v.len() {
            if v[probe] < v[min] {
                min = probe;
            }
        }
        if min != left {
            v.swap(left, min);
        }
    }
}

pub fn insertion_sort_by<T, F>(v: &mut [T], less: &F)
where
    F: Fn(&T, &T) -> bool,
{
    for left in 0..v.len() {
        let mut min = left;
        for probe in left + 1..v.len() {
            if less(&v[probe], &v[min]) {
                min = probe;
            }
        }
        if min != left {
            v.swap(left, min);
        }
    }
}

mod tests;

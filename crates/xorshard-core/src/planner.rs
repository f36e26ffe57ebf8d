//! Fragment planning.
//!
//! Splits `[0, data_size)` into exactly `thread_count` contiguous ranges. All
//! fragments get `data_size / thread_count` bytes and the last one also takes
//! the remainder. When there are more threads than bytes the leading
//! fragments are empty, which is legal: their workers simply do nothing.
//!
//! [`split_fragments`] turns a plan into disjoint `&mut [u8]` views of the
//! payload, one per worker, so no two workers can ever alias the same byte.

use crate::error::{Result, TransformError};

/// A planned byte range `[start, end)` of the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    /// Fragment (and worker) index
    pub index: usize,
    /// First byte, inclusive
    pub start: usize,
    /// Last byte, exclusive
    pub end: usize,
}

impl FragmentRange {
    /// Number of bytes covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the fragment covers no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Compute the fragment plan for a payload
///
/// # Errors
///
/// Returns `EmptyOrInvalid` if `data_size` is 0, `InvalidThreadCount` if
/// `thread_count` is 0, and `OutOfMemory` if the plan itself cannot be
/// allocated.
///
/// # Example
///
/// ```
/// use xorshard_core::plan_fragments;
///
/// let plan = plan_fragments(7, 3).unwrap();
/// let sizes: Vec<usize> = plan.iter().map(|f| f.len()).collect();
/// assert_eq!(sizes, vec![2, 2, 3]);
/// ```
pub fn plan_fragments(data_size: usize, thread_count: usize) -> Result<Vec<FragmentRange>> {
    if data_size == 0 {
        return Err(TransformError::EmptyOrInvalid {
            what: "payload",
            detail: "data size is 0".to_string(),
        });
    }
    if thread_count == 0 {
        return Err(TransformError::InvalidThreadCount(thread_count));
    }

    let fragment_size = data_size / thread_count;
    let extra_bytes = data_size % thread_count;
    let last = thread_count - 1;

    let mut plan = Vec::new();
    reserve_exact(&mut plan, thread_count)?;

    for index in 0..thread_count {
        let start = index * fragment_size;
        let end = if index == last {
            (index + 1) * fragment_size + extra_bytes
        } else {
            (index + 1) * fragment_size
        };
        plan.push(FragmentRange { index, start, end });
    }

    Ok(plan)
}

/// A worker's exclusive view of its byte range plus the shared key
pub struct Fragment<'a> {
    range: FragmentRange,
    data: &'a mut [u8],
    key: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Planned range
    #[must_use]
    pub fn range(&self) -> FragmentRange {
        self.range
    }

    /// Fragment index
    #[must_use]
    pub fn index(&self) -> usize {
        self.range.index
    }

    /// Number of bytes in this fragment
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the fragment is a no-op
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split into the mutable bytes, their absolute offset and the key
    pub fn into_parts(self) -> (&'a mut [u8], usize, &'a [u8]) {
        (self.data, self.range.start, self.key)
    }
}

impl std::fmt::Debug for Fragment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("range", &self.range)
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// Split `data` into one exclusive fragment per planned range
///
/// # Errors
///
/// Returns `EmptyOrInvalid` if `plan` does not tile `[0, data.len())` exactly
/// in order, or if `key` is empty.
pub fn split_fragments<'a>(
    data: &'a mut [u8],
    key: &'a [u8],
    plan: &[FragmentRange],
) -> Result<Vec<Fragment<'a>>> {
    if key.is_empty() {
        return Err(TransformError::EmptyOrInvalid {
            what: "key",
            detail: "zero-length key".to_string(),
        });
    }
    if !tiles_exactly(plan, data.len()) {
        return Err(TransformError::EmptyOrInvalid {
            what: "fragment plan",
            detail: format!("plan does not partition {} bytes", data.len()),
        });
    }

    let mut fragments = Vec::new();
    reserve_exact(&mut fragments, plan.len())?;
    let mut rest: &'a mut [u8] = data;
    for range in plan {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        fragments.push(Fragment {
            range: *range,
            data: head,
            key,
        });
        rest = tail;
    }

    Ok(fragments)
}

/// Reserve room for `count` elements, failing with `OutOfMemory` instead of aborting
pub(crate) fn reserve_exact<T>(vec: &mut Vec<T>, count: usize) -> Result<()> {
    vec.try_reserve_exact(count).map_err(|_| TransformError::OutOfMemory {
        requested: (count as u64).saturating_mul(std::mem::size_of::<T>() as u64),
    })
}

fn tiles_exactly(plan: &[FragmentRange], data_size: usize) -> bool {
    let mut cursor = 0;
    for range in plan {
        if range.start != cursor || range.end < range.start {
            return false;
        }
        cursor = range.end;
    }
    !plan.is_empty() && cursor == data_size
}

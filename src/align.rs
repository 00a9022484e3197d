/// Byte boundary every payload size and payload address is rounded to.
pub const ALIGNMENT: usize = 4;

/// Rounds `value` up to the next multiple of `quantum`, which must be a power
/// of two. Evaluates to `None` when the rounded value does not fit in `usize`.
///
/// # Examples
///
/// ```rust
/// use ffalloc::align_to;
///
/// assert_eq!(align_to!(30usize, 4), Some(32));
/// assert_eq!(align_to!(4097usize, 4096), Some(8192));
/// assert_eq!(align_to!(usize::MAX, 4), None);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $quantum:expr) => {
    ($value)
      .checked_add($quantum - 1)
      .map(|v: usize| v & !($quantum - 1))
  };
}

/// Rounds a payload size up to [`ALIGNMENT`](crate::align::ALIGNMENT).
///
/// ```rust
/// use ffalloc::align;
///
/// assert_eq!(align!(13usize), Some(16));
/// assert_eq!(align!(16usize), Some(16));
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}

/// Rounds a requested payload size to the quantum, never below one quantum.
pub(crate) fn payload_size(requested: usize) -> Option<usize> {
  align!(requested).map(|size| size.max(ALIGNMENT))
}

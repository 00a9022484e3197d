use crate::{align::ALIGNMENT, block::HEADER_SIZE, error::HeapError};

/// Default number of bytes requested from the growth primitive at a time.
pub const DEFAULT_GROWTH_QUANTUM: usize = 4096;

/// Tunables for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  growth_quantum: usize,
}

impl HeapConfig {
  /// Every growth request is rounded up to a multiple of `quantum`.
  ///
  /// The quantum must be a power of two and hold at least one header plus
  /// the smallest payload.
  pub fn with_growth_quantum(
    self,
    quantum: usize,
  ) -> Result<Self, HeapError> {
    if !quantum.is_power_of_two() || quantum < HEADER_SIZE + ALIGNMENT {
      return Err(HeapError::InvalidGrowthQuantum(quantum));
    }

    Ok(Self {
      growth_quantum: quantum,
    })
  }

  pub fn growth_quantum(&self) -> usize {
    self.growth_quantum
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      growth_quantum: DEFAULT_GROWTH_QUANTUM,
    }
  }
}

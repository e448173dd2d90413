//! Fixed-size history of accepted states used by multistep schemes

use nalgebra::DVector;

/// Symbolic stencil index: `n`, `n-1`, `n-2`, ...
///
/// The wrapped value is the lag behind the most recent accepted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StencilIndex(usize);

impl StencilIndex {
    /// Most recent accepted state
    pub const N: StencilIndex = StencilIndex(0);
    pub const N_MINUS_ONE: StencilIndex = StencilIndex(1);
    pub const N_MINUS_TWO: StencilIndex = StencilIndex(2);

    /// Index `n - lag`
    pub const fn n_minus(lag: usize) -> Self {
        StencilIndex(lag)
    }

    pub const fn lag(self) -> usize {
        self.0
    }
}

/// Stencil of the `K` most recently accepted states, most recent first
///
/// Every slot owns its own buffer; slots never alias each other or the
/// caller's live state.
///
/// # Example
/// ```
/// use nalgebra::DVector;
/// use odestep::steppers::{StencilIndex, StencilStates};
///
/// let mut stencil = StencilStates::<2>::new(&DVector::from_element(2, 0.0));
/// stencil.rotate(&DVector::from_element(2, 1.0));
/// assert_eq!(stencil.state_at(StencilIndex::N)[0], 1.0);
/// assert_eq!(stencil.state_at(StencilIndex::N_MINUS_ONE)[0], 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StencilStates<const K: usize> {
    slots: [DVector<f64>; K],
}

impl<const K: usize> StencilStates<K> {
    /// Create a stencil with every slot cloned from `prototype`
    ///
    /// # Panics
    /// Panics if `K == 0`.
    pub fn new(prototype: &DVector<f64>) -> Self {
        assert!(K >= 1, "a stencil must hold at least one state");
        Self {
            slots: std::array::from_fn(|_| prototype.clone()),
        }
    }

    pub const fn size() -> usize {
        K
    }

    /// State at `index`
    ///
    /// # Panics
    /// Panics if `index` reaches past the stencil size.
    pub fn state_at(&self, index: StencilIndex) -> &DVector<f64> {
        self.get(index).unwrap_or_else(|| {
            panic!(
                "stencil index n-{} out of range for stencil of size {}",
                index.lag(),
                K
            )
        })
    }

    pub fn get(&self, index: StencilIndex) -> Option<&DVector<f64>> {
        self.slots.get(index.lag())
    }

    /// Oldest state held, `n-(K-1)`
    pub fn oldest(&self) -> &DVector<f64> {
        &self.slots[K - 1]
    }

    /// Slots ordered `n`, `n-1`, ...
    pub fn as_slice(&self) -> &[DVector<f64>] {
        &self.slots
    }

    /// Drop the oldest state, shift the others down and copy `incoming` into `n`.
    pub fn rotate(&mut self, incoming: &DVector<f64>) {
        self.slots.rotate_right(1);
        self.slots[0].clone_from(incoming);
    }

    /// Inverse of [`rotate`](Self::rotate): shift every state up and copy
    /// `restored_oldest` into the oldest slot.
    pub fn unrotate(&mut self, restored_oldest: &DVector<f64>) {
        self.slots.rotate_left(1);
        self.slots[K - 1].clone_from(restored_oldest);
    }
}

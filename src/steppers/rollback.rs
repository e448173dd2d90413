//! Scoped rollback of a tentative step

use log::trace;
use nalgebra::DVector;

use super::{StencilIndex, StencilStates};

/// Guard over the quantities a tentative step mutates
///
/// Creating the guard saves the oldest stencil slot into the recovery buffer
/// and rotates the live state into the stencil. Unless [`commit`](Self::commit)
/// is called, dropping the guard restores the live state, the stencil and the
/// oldest slot in the reverse order of mutation, on error returns and panics
/// alike.
pub(crate) struct RollbackGuard<'g, const K: usize> {
    stencil: &'g mut StencilStates<K>,
    recovery: &'g mut DVector<f64>,
    live: &'g mut DVector<f64>,
    armed: bool,
}

impl<'g, const K: usize> RollbackGuard<'g, K> {
    pub(crate) fn rotate(
        stencil: &'g mut StencilStates<K>,
        recovery: &'g mut DVector<f64>,
        live: &'g mut DVector<f64>,
    ) -> Self {
        recovery.clone_from(stencil.oldest());
        stencil.rotate(&*live);
        Self {
            stencil,
            recovery,
            live,
            armed: true,
        }
    }

    /// Shared access to the rotated stencil alongside the live state.
    pub(crate) fn split(&mut self) -> (&StencilStates<K>, &mut DVector<f64>) {
        (&*self.stencil, &mut *self.live)
    }

    /// Keep the rotated stencil and the new live state.
    pub(crate) fn commit(mut self) {
        self.armed = false;
    }

    fn rollback(&mut self) {
        self.live.clone_from(self.stencil.state_at(StencilIndex::N));
        self.stencil.unrotate(&*self.recovery);
    }
}

impl<const K: usize> Drop for RollbackGuard<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            trace!("rolling back tentative step (stencil size {K})");
            self.rollback();
        }
    }
}

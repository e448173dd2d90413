//! Galerkin projection of a full-order model onto a linear trial subspace

use nalgebra::{DMatrix, DVector};

use crate::steppers::{ContinuousTimeSystem, OdeError};

/// Linear map from reduced to full coordinates, `y = Φ ŷ`
#[derive(Debug, Clone)]
pub struct LinearDecoder {
    basis: DMatrix<f64>,
}

impl LinearDecoder {
    pub fn new(basis: DMatrix<f64>) -> Self {
        Self { basis }
    }

    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    pub fn full_dim(&self) -> usize {
        self.basis.nrows()
    }

    pub fn reduced_dim(&self) -> usize {
        self.basis.ncols()
    }

    /// `y = Φ ŷ`
    pub fn decode(&self, reduced: &DVector<f64>, full: &mut DVector<f64>) {
        full.gemv(1.0, &self.basis, reduced, 0.0);
    }
}

/// Galerkin reduced-order model of a continuous-time full-order model
///
/// ```text
/// y   = y_ref + Φ ŷ
/// f_r = Φᵀ f(y, t)
/// J_r = Φᵀ (df/dy) Φ
/// ```
///
/// The reduced model is itself a [`ContinuousTimeSystem`] and can be driven
/// by any stepper.
pub struct GalerkinSystem<'a, Fom: ?Sized> {
    fom: &'a Fom,
    decoder: LinearDecoder,
    reference: DVector<f64>,
}

impl<'a, Fom> GalerkinSystem<'a, Fom>
where
    Fom: ContinuousTimeSystem + ?Sized,
{
    pub fn new(
        fom: &'a Fom,
        decoder: LinearDecoder,
        reference: DVector<f64>,
    ) -> Result<Self, OdeError> {
        let fom_dim = fom.create_velocity().len();
        if decoder.full_dim() != fom_dim || reference.len() != fom_dim {
            return Err(OdeError::InvalidConfiguration(format!(
                "decoder has {} rows and reference state {} entries, full-order model has {}",
                decoder.full_dim(),
                reference.len(),
                fom_dim
            )));
        }
        Ok(Self {
            fom,
            decoder,
            reference,
        })
    }

    pub fn decoder(&self) -> &LinearDecoder {
        &self.decoder
    }

    /// Full-order state `y_ref + Φ ŷ`
    pub fn reconstruct(&self, reduced: &DVector<f64>) -> DVector<f64> {
        let mut full = DVector::zeros(self.decoder.full_dim());
        self.decoder.decode(reduced, &mut full);
        full += &self.reference;
        full
    }

    /// Reduced coordinates `Φᵀ (y - y_ref)`; exact when `Φ` is orthonormal
    /// and `y - y_ref` lies in its span.
    pub fn project_state(&self, full: &DVector<f64>) -> DVector<f64> {
        let mut reduced = DVector::zeros(self.decoder.reduced_dim());
        reduced.gemv_tr(1.0, self.decoder.basis(), &(full - &self.reference), 0.0);
        reduced
    }
}

impl<Fom> ContinuousTimeSystem for GalerkinSystem<'_, Fom>
where
    Fom: ContinuousTimeSystem + ?Sized,
{
    fn create_velocity(&self) -> DVector<f64> {
        DVector::zeros(self.decoder.reduced_dim())
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        let k = self.decoder.reduced_dim();
        DMatrix::zeros(k, k)
    }

    fn velocity(&self, state: &DVector<f64>, time: f64, f: &mut DVector<f64>) -> Result<(), OdeError> {
        let full = self.reconstruct(state);
        let mut fom_f = self.fom.create_velocity();
        self.fom.velocity(&full, time, &mut fom_f)?;
        f.gemv_tr(1.0, self.decoder.basis(), &fom_f, 0.0);
        Ok(())
    }

    fn jacobian(&self, state: &DVector<f64>, time: f64, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        let full = self.reconstruct(state);
        let mut fom_j = self.fom.create_jacobian();
        self.fom.jacobian(&full, time, &mut fom_j)?;
        let j_phi = &fom_j * self.decoder.basis();
        j.gemm_tr(1.0, self.decoder.basis(), &j_phi, 0.0);
        Ok(())
    }
}

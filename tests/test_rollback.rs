//! Property tests: a failed step leaves no trace

use std::cell::Cell;

use nalgebra::{DMatrix, DVector};
use odestep::optim::NewtonRaphson;
use odestep::steppers::{
    create_bdf3_stepper, ContinuousTimeSystem, ImplicitStepping, OdeError, StencilIndex,
    StencilStates,
};
use proptest::prelude::*;

/// dy/dt = lambda * y + sin(t), with an on/off failure switch
struct Switchable {
    dim: usize,
    lambda: f64,
    fail: Cell<bool>,
}

impl ContinuousTimeSystem for Switchable {
    fn create_velocity(&self) -> DVector<f64> {
        DVector::zeros(self.dim)
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.dim, self.dim)
    }

    fn velocity(&self, y: &DVector<f64>, t: f64, f: &mut DVector<f64>) -> Result<(), OdeError> {
        if self.fail.get() {
            return Err(OdeError::VelocityEvaluationFailure("switched off".into()));
        }
        for i in 0..y.len() {
            f[i] = self.lambda * y[i] + t.sin();
        }
        Ok(())
    }

    fn jacobian(&self, _y: &DVector<f64>, _t: f64, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        j.fill_with_identity();
        *j *= self.lambda;
        Ok(())
    }
}

proptest! {
    #[test]
    fn prop_failed_step_is_invisible(
        values in prop::collection::vec(-2.0f64..2.0, 1..6),
        dt in 0.001f64..0.2,
        warmup in 0usize..5,
    ) {
        let y0 = DVector::from_vec(values);
        let system = Switchable { dim: y0.len(), lambda: -1.5, fail: Cell::new(false) };
        let mut newton = NewtonRaphson::new().with_tolerance(1e-12);

        let mut failing = create_bdf3_stepper(&y0, &system);
        let mut reference = create_bdf3_stepper(&y0, &system);
        let mut y_failing = y0.clone();
        let mut y_reference = y0.clone();

        for step in 1..=warmup {
            let t = (step - 1) as f64 * dt;
            failing.do_step(&mut y_failing, t, dt, step, &mut newton).unwrap();
            reference.do_step(&mut y_reference, t, dt, step, &mut newton).unwrap();
        }

        let step = warmup + 1;
        let t = warmup as f64 * dt;
        let stencil_before = failing.stencil().clone();
        let state_before = y_failing.clone();

        system.fail.set(true);
        let err = failing.do_step(&mut y_failing, t, dt, step, &mut newton).unwrap_err();
        prop_assert!(err.is_time_step_failure());
        prop_assert_eq!(&y_failing, &state_before);
        prop_assert_eq!(failing.stencil(), &stencil_before);

        // the retried step reproduces a run that never failed
        system.fail.set(false);
        failing.do_step(&mut y_failing, t, dt, step, &mut newton).unwrap();
        reference.do_step(&mut y_reference, t, dt, step, &mut newton).unwrap();
        prop_assert_eq!(&y_failing, &y_reference);
        prop_assert_eq!(failing.stencil(), reference.stencil());
        prop_assert_eq!(failing.order(), 3);
    }

    #[test]
    fn prop_unrotate_inverts_rotate(
        initial in prop::collection::vec(-10.0f64..10.0, 3),
        rotations in prop::collection::vec(prop::collection::vec(-10.0f64..10.0, 3), 0..6),
        incoming in prop::collection::vec(-10.0f64..10.0, 3),
    ) {
        let mut stencil = StencilStates::<3>::new(&DVector::from_vec(initial));
        for r in rotations {
            stencil.rotate(&DVector::from_vec(r));
        }
        let before = stencil.clone();

        let dropped = stencil.oldest().clone();
        let incoming = DVector::from_vec(incoming);
        stencil.rotate(&incoming);
        prop_assert_eq!(stencil.state_at(StencilIndex::N), &incoming);

        stencil.unrotate(&dropped);
        prop_assert_eq!(stencil, before);
    }
}

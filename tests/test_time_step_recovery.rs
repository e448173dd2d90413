//! Time-step recovery with a user-defined two-state scheme
//!
//! The system fails at step 3 unless dt has been reduced to 0.025. Every
//! retried attempt must see the same stencil, which proves that failed
//! attempts are rolled back before the advancer retries.

use std::cell::{Cell, RefCell};

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use odestep::steppers::{
    advance_to_target_time_with_time_step_recovery, create_arbitrary_stepper, DiscreteTimeSystem,
    ImplicitStepping, NonlinearSolver, NonlinearSystem, OdeError, StencilIndex, StepCount,
    StepSizeControl, StepperPhase,
};

struct App {
    attempts: RefCell<Vec<(StepCount, f64)>>,
    passed: Cell<bool>,
}

impl App {
    fn new() -> Self {
        Self {
            attempts: RefCell::new(Vec::new()),
            passed: Cell::new(true),
        }
    }

    fn check(&self, actual: &DVector<f64>, expected: [f64; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            if (a - e).abs() > 1e-13 {
                self.passed.set(false);
            }
        }
    }
}

impl DiscreteTimeSystem for App {
    fn create_discrete_time_residual(&self) -> DVector<f64> {
        DVector::zeros(3)
    }

    fn create_discrete_time_jacobian(&self) -> DMatrix<f64> {
        DMatrix::zeros(3, 3)
    }

    fn discrete_time_residual(
        &self,
        step: StepCount,
        _time: f64,
        dt: f64,
        r: &mut DVector<f64>,
        _trial: &DVector<f64>,
        stencil: &[DVector<f64>],
    ) -> Result<(), OdeError> {
        let (yn, ynm1) = (&stencil[0], &stencil[1]);
        self.attempts.borrow_mut().push((step, dt));

        for i in 0..3 {
            r[i] = yn[i] + dt;
        }

        if step == 3 {
            // every attempt at step 3 sees the same stencil
            self.check(yn, [1.4, 1.8, 2.2]);
            self.check(ynm1, [1.2, 1.4, 1.6]);
        }

        if step == 3 && (dt == 0.1 || dt == 0.05) {
            return Err(OdeError::DiscreteTimeResidualFailure(format!(
                "step 3 rejects dt = {dt}"
            )));
        }

        if step == 3 {
            self.check(r, [1.425, 1.825, 2.225]);
        }
        Ok(())
    }

    fn discrete_time_jacobian(
        &self,
        _step: StepCount,
        _time: f64,
        _dt: f64,
        _j: &mut DMatrix<f64>,
        _trial: &DVector<f64>,
        _stencil: &[DVector<f64>],
    ) -> Result<(), OdeError> {
        Ok(())
    }
}

/// Two residual evaluations, each followed by a fixed update
struct FakeSolver;

impl NonlinearSolver for FakeSolver {
    fn solve<S>(&mut self, system: &S, state: &mut DVector<f64>) -> Result<(), OdeError>
    where
        S: NonlinearSystem + ?Sized,
    {
        let mut r = system.create_residual();
        for iteration in 0..2 {
            match system.residual(state, &mut r) {
                Ok(()) => {
                    state[0] += 0.1;
                    state[1] += 0.2;
                    state[2] += 0.3;
                }
                Err(err @ OdeError::ResidualEvaluationFailure { .. }) => {
                    return Err(OdeError::NonlinearSolveFailure {
                        iterations: iteration,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn control(_step: StepCount, _time: f64) -> StepSizeControl {
    StepSizeControl::new(0.1, 0.01, 2.0)
}

#[test]
fn test_arbitrary_stepper_recovers_at_step_three() {
    let app = App::new();
    let mut y = DVector::from_element(3, 1.0);
    let mut stepper = create_arbitrary_stepper::<_, 2>(1, &y, &app).unwrap();
    assert_eq!(stepper.order(), 1);

    let mut solver = FakeSolver;
    let mut times = Vec::new();
    let steps = advance_to_target_time_with_time_step_recovery(
        &mut stepper.with_solver(&mut solver),
        &mut y,
        0.0,
        0.4,
        control,
        |step, time, _| times.push((step, time)),
    )
    .unwrap();

    assert!(app.passed.get());

    let step3: Vec<f64> = app
        .attempts
        .borrow()
        .iter()
        .filter(|a| a.0 == 3)
        .map(|a| a.1)
        .collect();
    assert_eq!(step3, vec![0.1, 0.05, 0.025, 0.025]);

    assert_eq!(steps, 5);
    let (last_step, last_time) = times[times.len() - 1];
    assert_eq!(last_step, 5);
    assert_eq!(last_time, 0.4);
    assert_relative_eq!(times[3].1, 0.225, epsilon = 1e-14);

    // five accepted steps of (0.2, 0.4, 0.6)
    assert_relative_eq!(y[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(y[1], 3.0, epsilon = 1e-12);
    assert_relative_eq!(y[2], 4.0, epsilon = 1e-12);
}

#[test]
fn test_failed_attempt_is_a_single_time_step_failure() {
    let app = App::new();
    let mut y = DVector::from_element(3, 1.0);
    let mut stepper = create_arbitrary_stepper::<_, 2>(1, &y, &app).unwrap();
    let mut solver = FakeSolver;

    stepper.do_step(&mut y, 0.0, 0.1, 1, &mut solver).unwrap();
    stepper.do_step(&mut y, 0.1, 0.1, 2, &mut solver).unwrap();
    let y_before = y.clone();
    let stencil_before = stepper.stencil().clone();

    let err = stepper
        .do_step(&mut y, 0.2, 0.1, 3, &mut solver)
        .unwrap_err();

    match &err {
        OdeError::TimeStepFailure { step, dt, source } => {
            assert_eq!(*step, 3);
            assert_eq!(*dt, 0.1);
            assert!(matches!(
                **source,
                OdeError::NonlinearSolveFailure { iterations: 0, .. }
            ));
        }
        other => panic!("expected a time-step failure, got {other:?}"),
    }
    assert_eq!(y, y_before);
    assert_eq!(stepper.stencil(), &stencil_before);
    assert_eq!(stepper.phase(), StepperPhase::RolledBack);
    assert_relative_eq!(
        stepper.stencil().state_at(StencilIndex::N)[0],
        1.2,
        epsilon = 1e-14
    );
}

#[test]
fn test_recovery_budget_exhausted() {
    let app = App::new();
    let mut y = DVector::from_element(3, 1.0);
    let mut stepper = create_arbitrary_stepper::<_, 2>(1, &y, &app).unwrap();
    let mut solver = FakeSolver;

    // 0.1 -> 0.05 -> 0.025 is below min_dt = 0.04
    let err = advance_to_target_time_with_time_step_recovery(
        &mut stepper.with_solver(&mut solver),
        &mut y,
        0.0,
        0.4,
        |_, _| StepSizeControl::new(0.1, 0.04, 2.0),
        |_, _, _| {},
    )
    .unwrap_err();

    assert!(matches!(err, OdeError::TimeStepTooSmall { step: 3, .. }));
    assert_relative_eq!(y[0], 1.4, epsilon = 1e-14);
}

#[test]
fn test_invalid_arbitrary_configuration() {
    let app = App::new();
    let y = DVector::from_element(3, 1.0);
    assert!(create_arbitrary_stepper::<_, 2>(0, &y, &app).is_err());
    assert!(create_arbitrary_stepper::<_, 4>(1, &y, &app).is_err());
}

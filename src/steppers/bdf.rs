//! Implicit multistep steppers
//!
//! BDF methods of orders 1-3 and user-defined "arbitrary" schemes whose
//! discrete-time residual is supplied by the system itself.
//!
//! # Bootstrapping
//!
//! A scheme with `K` stencil states cannot take its first steps before `K`
//! accepted states exist. BDF2 and BDF3 therefore carry an auxiliary
//! lower-order stepper (BDF2 uses BDF1, BDF3 uses BDF2) and delegate every
//! step `s <= K_aux` to it, where `K_aux` is the auxiliary stencil size. The
//! chain is resolved at compile time through the auxiliary type parameter and
//! ends at [`NoBootstrap`].
//!
//! # Rollback
//!
//! Each step rotates the stencil before solving. If the step fails, the live
//! state, the stencil and the dropped oldest state are restored before the
//! error is returned, so a failed step leaves the stepper exactly as it was.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::rollback::RollbackGuard;
use super::{
    ContinuousTimeSystem, DiscreteTimeJacobianPolicy, DiscreteTimeResidualPolicy,
    DiscreteTimeSystem, ImplicitStepping, JacobianPolicy, NoBootstrap, NonlinearSolver,
    NonlinearSystem, OdeError, PolicyHandle, ResidualPolicy, StandardJacobianPolicy,
    StandardResidualPolicy, StencilStates, StepCount, StepperPhase, WithSolver,
};

/// Implicit stepper with `K` stencil states and auxiliary stepper `A`
///
/// Use the [`Bdf1`], [`Bdf2`], [`Bdf3`] and [`ArbitraryStepper`] aliases
/// rather than naming this type directly.
pub struct ImplicitStepper<'a, Sys: ?Sized, R, J, A, const K: usize> {
    name: &'static str,
    order: usize,
    system: &'a Sys,
    stencil: StencilStates<K>,
    recovery: DVector<f64>,
    residual_policy: PolicyHandle<'a, R>,
    jacobian_policy: PolicyHandle<'a, J>,
    aux: A,
    eval_time: f64,
    dt: f64,
    step: StepCount,
    phase: StepperPhase,
}

/// Backward Euler
pub type Bdf1<'a, Sys, R = StandardResidualPolicy, J = StandardJacobianPolicy> =
    ImplicitStepper<'a, Sys, R, J, NoBootstrap, 1>;

/// BDF2, bootstrapped by BDF1 on the first step
pub type Bdf2<'a, Sys, R = StandardResidualPolicy, J = StandardJacobianPolicy> =
    ImplicitStepper<'a, Sys, R, J, Bdf1<'a, Sys, R, J>, 2>;

/// BDF3, bootstrapped by BDF2 on the first two steps
pub type Bdf3<'a, Sys, R = StandardResidualPolicy, J = StandardJacobianPolicy> =
    ImplicitStepper<'a, Sys, R, J, Bdf2<'a, Sys, R, J>, 3>;

/// User-defined scheme over a [`DiscreteTimeSystem`] with `K` stencil states
pub type ArbitraryStepper<'a, Sys, const K: usize> =
    ImplicitStepper<'a, Sys, DiscreteTimeResidualPolicy, DiscreteTimeJacobianPolicy, NoBootstrap, K>;

/// Construction of a stepper (and, recursively, its auxiliary chain) from
/// shared policies.
pub trait BuildStepper<'a, Sys: ?Sized, R, J>: ImplicitStepping + Sized {
    fn build(
        state: &DVector<f64>,
        system: &'a Sys,
        residual_policy: PolicyHandle<'a, R>,
        jacobian_policy: PolicyHandle<'a, J>,
    ) -> Self;
}

impl<'a, Sys: ?Sized, R, J> BuildStepper<'a, Sys, R, J> for NoBootstrap {
    fn build(
        _state: &DVector<f64>,
        _system: &'a Sys,
        _residual_policy: PolicyHandle<'a, R>,
        _jacobian_policy: PolicyHandle<'a, J>,
    ) -> Self {
        NoBootstrap
    }
}

impl<'a, Sys, R, J, A, const K: usize> BuildStepper<'a, Sys, R, J>
    for ImplicitStepper<'a, Sys, R, J, A, K>
where
    Sys: ?Sized,
    R: ResidualPolicy<Sys> + Clone,
    J: JacobianPolicy<Sys> + Clone,
    A: BuildStepper<'a, Sys, R, J>,
{
    fn build(
        state: &DVector<f64>,
        system: &'a Sys,
        residual_policy: PolicyHandle<'a, R>,
        jacobian_policy: PolicyHandle<'a, J>,
    ) -> Self {
        Self::with_policies(state, system, residual_policy, jacobian_policy)
    }
}

fn scheme_name(stencil_size: usize) -> &'static str {
    match stencil_size {
        1 => "bdf1",
        2 => "bdf2",
        3 => "bdf3",
        _ => "implicit",
    }
}

impl<'a, Sys, R, J, A, const K: usize> ImplicitStepper<'a, Sys, R, J, A, K>
where
    Sys: ?Sized,
    R: ResidualPolicy<Sys> + Clone,
    J: JacobianPolicy<Sys> + Clone,
    A: BuildStepper<'a, Sys, R, J>,
{
    /// Create a stepper whose stencil slots all start as copies of `state`.
    ///
    /// The policies are shared with the auxiliary chain: owned policies are
    /// cloned into it, borrowed ones are borrowed again.
    pub fn with_policies(
        state: &DVector<f64>,
        system: &'a Sys,
        residual_policy: PolicyHandle<'a, R>,
        jacobian_policy: PolicyHandle<'a, J>,
    ) -> Self {
        let aux = A::build(
            state,
            system,
            residual_policy.clone(),
            jacobian_policy.clone(),
        );
        let phase = if A::STENCIL_SIZE > 0 {
            StepperPhase::Bootstrapping
        } else {
            StepperPhase::SteadyState
        };

        Self {
            name: scheme_name(K),
            order: K,
            system,
            stencil: StencilStates::new(state),
            recovery: state.clone(),
            residual_policy,
            jacobian_policy,
            aux,
            eval_time: 0.0,
            dt: 0.0,
            step: 0,
            phase,
        }
    }

    /// Create a stepper owning default-constructed policies
    pub fn new(state: &DVector<f64>, system: &'a Sys) -> Self
    where
        R: Default,
        J: Default,
    {
        Self::with_policies(state, system, PolicyHandle::default(), PolicyHandle::default())
    }
}

impl<'a, Sys: ?Sized, R, J, A, const K: usize> ImplicitStepper<'a, Sys, R, J, A, K> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> StepperPhase {
        self.phase
    }

    /// Accepted states the next step will be built on, most recent first
    pub fn stencil(&self) -> &StencilStates<K> {
        &self.stencil
    }

    /// Lower-order stepper used while bootstrapping
    pub fn auxiliary(&self) -> &A {
        &self.aux
    }

    pub fn system(&self) -> &'a Sys {
        self.system
    }

    /// Time the last step was evaluated at
    pub fn evaluation_time(&self) -> f64 {
        self.eval_time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Index of the last attempted step, 0 before the first one
    pub fn step_count(&self) -> StepCount {
        self.step
    }

    /// Bind this stepper to a solver so the advancers can drive it
    pub fn with_solver<'s, NS>(&'s mut self, solver: &'s mut NS) -> WithSolver<'s, Self, NS>
    where
        NS: NonlinearSolver + ?Sized,
    {
        WithSolver::new(self, solver)
    }

    fn view(&self) -> StepSystem<'_, Sys, R, J, K> {
        StepSystem {
            system: self.system,
            stencil: &self.stencil,
            residual_policy: &*self.residual_policy,
            jacobian_policy: &*self.jacobian_policy,
            time: self.eval_time,
            dt: self.dt,
            step: self.step,
        }
    }
}

impl<Sys, R, J, A, const K: usize> ImplicitStepping for ImplicitStepper<'_, Sys, R, J, A, K>
where
    Sys: ?Sized,
    R: ResidualPolicy<Sys>,
    J: JacobianPolicy<Sys>,
    A: ImplicitStepping,
{
    const STENCIL_SIZE: usize = K;

    fn order(&self) -> usize {
        self.order
    }

    fn do_step_with_guess<NS, G>(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
        solver: &mut NS,
        mut guess: G,
    ) -> Result<(), OdeError>
    where
        NS: NonlinearSolver + ?Sized,
        G: FnMut(StepCount, f64, &mut DVector<f64>),
    {
        if step == 0 {
            return Err(OdeError::InvalidConfiguration(
                "steps are numbered from 1".into(),
            ));
        }

        self.dt = dt;
        self.eval_time = current_time + dt;
        self.step = step;
        debug!(
            "{} stepper: do step {} (t = {}, dt = {})",
            self.name, step, current_time, dt
        );

        let bootstrapping = step <= A::STENCIL_SIZE;
        let mut guard = RollbackGuard::rotate(&mut self.stencil, &mut self.recovery, state);

        let result = if bootstrapping {
            let (_, live) = guard.split();
            self.aux.do_step(live, current_time, dt, step, solver)
        } else {
            let (stencil, live) = guard.split();
            guess(step, self.eval_time, live);
            let view = StepSystem {
                system: self.system,
                stencil,
                residual_policy: &*self.residual_policy,
                jacobian_policy: &*self.jacobian_policy,
                time: self.eval_time,
                dt,
                step,
            };
            solver.solve(&view, live)
        };

        match result {
            Ok(()) => {
                guard.commit();
                self.phase = if bootstrapping {
                    StepperPhase::Bootstrapping
                } else {
                    StepperPhase::SteadyState
                };
                Ok(())
            }
            Err(err) => {
                drop(guard);
                self.phase = StepperPhase::RolledBack;
                debug!("{} stepper: step {} rolled back: {}", self.name, step, err);
                Err(err.into_time_step_failure(step, dt))
            }
        }
    }
}

/// The stepper viewed as the nonlinear system of its last step
impl<Sys, R, J, A, const K: usize> NonlinearSystem for ImplicitStepper<'_, Sys, R, J, A, K>
where
    Sys: ?Sized,
    R: ResidualPolicy<Sys>,
    J: JacobianPolicy<Sys>,
{
    fn create_residual(&self) -> DVector<f64> {
        self.view().create_residual()
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        self.view().create_jacobian()
    }

    fn residual(&self, state: &DVector<f64>, r: &mut DVector<f64>) -> Result<(), OdeError> {
        self.view().residual(state, r)
    }

    fn jacobian(&self, state: &DVector<f64>, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        self.view().jacobian(state, j)
    }
}

/// Residual and Jacobian of one step, as handed to the solver
struct StepSystem<'v, Sys: ?Sized, R, J, const K: usize> {
    system: &'v Sys,
    stencil: &'v StencilStates<K>,
    residual_policy: &'v R,
    jacobian_policy: &'v J,
    time: f64,
    dt: f64,
    step: StepCount,
}

impl<Sys, R, J, const K: usize> NonlinearSystem for StepSystem<'_, Sys, R, J, K>
where
    Sys: ?Sized,
    R: ResidualPolicy<Sys>,
    J: JacobianPolicy<Sys>,
{
    fn create_residual(&self) -> DVector<f64> {
        self.residual_policy.create(self.system)
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        self.jacobian_policy.create(self.system)
    }

    fn residual(&self, state: &DVector<f64>, r: &mut DVector<f64>) -> Result<(), OdeError> {
        self.residual_policy.compute(
            state,
            self.stencil,
            self.system,
            self.time,
            self.dt,
            self.step,
            r,
        )
    }

    fn jacobian(&self, state: &DVector<f64>, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        self.jacobian_policy.compute(
            state,
            self.stencil,
            self.system,
            self.time,
            self.dt,
            self.step,
            j,
        )
    }
}

/// Backward Euler stepper with the standard policies
pub fn create_bdf1_stepper<'a, Sys>(state: &DVector<f64>, system: &'a Sys) -> Bdf1<'a, Sys>
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    Bdf1::new(state, system)
}

pub fn create_bdf2_stepper<'a, Sys>(state: &DVector<f64>, system: &'a Sys) -> Bdf2<'a, Sys>
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    Bdf2::new(state, system)
}

pub fn create_bdf3_stepper<'a, Sys>(state: &DVector<f64>, system: &'a Sys) -> Bdf3<'a, Sys>
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    Bdf3::new(state, system)
}

/// Stepper for a system that defines its own discrete-time residual over
/// `K` stencil states (1 to 3). `order` is reported as is.
pub fn create_arbitrary_stepper<'a, Sys, const K: usize>(
    order: usize,
    state: &DVector<f64>,
    system: &'a Sys,
) -> Result<ArbitraryStepper<'a, Sys, K>, OdeError>
where
    Sys: DiscreteTimeSystem + ?Sized,
{
    if !(1..=3).contains(&K) {
        return Err(OdeError::InvalidConfiguration(format!(
            "arbitrary steppers support 1 to 3 stencil states, got {K}"
        )));
    }
    if order == 0 {
        return Err(OdeError::InvalidConfiguration(
            "scheme order must be positive".into(),
        ));
    }

    let mut stepper = ArbitraryStepper::<'a, Sys, K>::new(state, system);
    stepper.name = "arbitrary";
    stepper.order = order;
    Ok(stepper)
}

//! Explicit Runge-Kutta steppers
//!
//! Fixed-step explicit schemes over a [`ContinuousTimeSystem`]. Stages are
//! accumulated in internal buffers and the live state is only written once
//! every stage has been evaluated, so a failed velocity evaluation leaves the
//! state untouched.

use log::debug;
use nalgebra::DVector;

use super::{ContinuousTimeSystem, OdeError, StepCount, Steppable};

/// Available explicit schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitScheme {
    /// Forward Euler
    ForwardEuler,
    /// Classical four-stage Runge-Kutta
    RungeKutta4,
    /// Three-stage Strong Stability Preserving Runge-Kutta (Shu-Osher form)
    Ssprk3,
}

impl ExplicitScheme {
    pub fn order(&self) -> usize {
        match self {
            ExplicitScheme::ForwardEuler => 1,
            ExplicitScheme::RungeKutta4 => 4,
            ExplicitScheme::Ssprk3 => 3,
        }
    }

    pub fn stages(&self) -> usize {
        match self {
            ExplicitScheme::ForwardEuler => 1,
            ExplicitScheme::RungeKutta4 => 4,
            ExplicitScheme::Ssprk3 => 3,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExplicitScheme::ForwardEuler => "euler",
            ExplicitScheme::RungeKutta4 => "rk4",
            ExplicitScheme::Ssprk3 => "ssprk3",
        }
    }
}

/// Explicit stepper bound to a continuous-time system
pub struct ExplicitStepper<'a, Sys: ?Sized> {
    scheme: ExplicitScheme,
    system: &'a Sys,
    slopes: Vec<DVector<f64>>,
    stage_state: DVector<f64>,
}

impl<'a, Sys> ExplicitStepper<'a, Sys>
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    pub fn new(scheme: ExplicitScheme, system: &'a Sys) -> Self {
        let slopes = (0..scheme.stages())
            .map(|_| system.create_velocity())
            .collect();
        Self {
            scheme,
            system,
            slopes,
            stage_state: system.create_velocity(),
        }
    }

    pub fn scheme(&self) -> ExplicitScheme {
        self.scheme
    }

    /// Advance `state` from `current_time` to `current_time + dt`
    pub fn do_step(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
    ) -> Result<(), OdeError> {
        debug!(
            "{} stepper: do step {} (t = {}, dt = {})",
            self.scheme.name(),
            step,
            current_time,
            dt
        );
        let next = match self.scheme {
            ExplicitScheme::ForwardEuler => self.forward_euler(state, current_time, dt),
            ExplicitScheme::RungeKutta4 => self.runge_kutta4(state, current_time, dt),
            ExplicitScheme::Ssprk3 => self.ssprk3(state, current_time, dt),
        }
        .map_err(|e| e.into_time_step_failure(step, dt))?;

        state.copy_from(&next);
        Ok(())
    }

    fn forward_euler(&mut self, y: &DVector<f64>, t: f64, dt: f64) -> Result<DVector<f64>, OdeError> {
        self.system.velocity(y, t, &mut self.slopes[0])?;
        Ok(y + dt * &self.slopes[0])
    }

    fn runge_kutta4(&mut self, y: &DVector<f64>, t: f64, dt: f64) -> Result<DVector<f64>, OdeError> {
        // c = [0, 1/2, 1/2, 1], b = [1/6, 1/3, 1/3, 1/6]
        self.system.velocity(y, t, &mut self.slopes[0])?;

        self.stage_state = y + 0.5 * dt * &self.slopes[0];
        self.system.velocity(&self.stage_state, t + 0.5 * dt, &mut self.slopes[1])?;

        self.stage_state = y + 0.5 * dt * &self.slopes[1];
        self.system.velocity(&self.stage_state, t + 0.5 * dt, &mut self.slopes[2])?;

        self.stage_state = y + dt * &self.slopes[2];
        self.system.velocity(&self.stage_state, t + dt, &mut self.slopes[3])?;

        let k = &self.slopes;
        Ok(y + (dt / 6.0) * (&k[0] + 2.0 * &k[1] + 2.0 * &k[2] + &k[3]))
    }

    fn ssprk3(&mut self, y: &DVector<f64>, t: f64, dt: f64) -> Result<DVector<f64>, OdeError> {
        // u1 = y + h f(y, t)
        self.system.velocity(y, t, &mut self.slopes[0])?;
        self.stage_state = y + dt * &self.slopes[0];

        // u2 = 3/4 y + 1/4 (u1 + h f(u1, t + h))
        self.system.velocity(&self.stage_state, t + dt, &mut self.slopes[1])?;
        self.stage_state = 0.75 * y + 0.25 * (&self.stage_state + dt * &self.slopes[1]);

        // y+ = 1/3 y + 2/3 (u2 + h f(u2, t + h/2))
        self.system.velocity(&self.stage_state, t + 0.5 * dt, &mut self.slopes[2])?;
        Ok(y / 3.0 + (2.0 / 3.0) * (&self.stage_state + dt * &self.slopes[2]))
    }
}

impl<Sys> Steppable for ExplicitStepper<'_, Sys>
where
    Sys: ContinuousTimeSystem + ?Sized,
{
    fn order(&self) -> usize {
        self.scheme.order()
    }

    fn step(
        &mut self,
        state: &mut DVector<f64>,
        current_time: f64,
        dt: f64,
        step: StepCount,
    ) -> Result<(), OdeError> {
        self.do_step(state, current_time, dt, step)
    }
}

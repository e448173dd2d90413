//! Advancer loops
//!
//! Drive a [`Steppable`] over a number of steps or up to a target time, calling
//! an observer with `(step, time, state)` at step 0 and after every accepted
//! step. The `*_with_time_step_recovery` variants retry a failed step with a
//! reduced time step until it succeeds or the time step falls below its
//! minimum.

use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{OdeError, StepCount, Steppable};

/// Time-step control for one step of a recovering advancer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSizeControl {
    /// Time step tried first
    pub dt: f64,
    /// Smallest time step allowed when retrying
    pub min_dt: f64,
    /// Factor the time step is divided by after a failure
    pub reduction_factor: f64,
}

impl StepSizeControl {
    pub fn new(dt: f64, min_dt: f64, reduction_factor: f64) -> Self {
        Self {
            dt,
            min_dt,
            reduction_factor,
        }
    }

    /// Control that never retries
    pub fn fixed(dt: f64) -> Self {
        Self::new(dt, dt, 2.0)
    }

    pub fn validate(&self) -> Result<(), OdeError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(OdeError::InvalidConfiguration(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if !(self.min_dt > 0.0 && self.min_dt <= self.dt) {
            return Err(OdeError::InvalidConfiguration(format!(
                "min_dt must lie in (0, {}], got {}",
                self.dt, self.min_dt
            )));
        }
        if !(self.reduction_factor.is_finite() && self.reduction_factor > 1.0) {
            return Err(OdeError::InvalidConfiguration(format!(
                "dt reduction factor must be greater than 1, got {}",
                self.reduction_factor
            )));
        }
        Ok(())
    }
}

fn end_tolerance(final_time: f64) -> f64 {
    1e-12 * final_time.abs().max(1.0)
}

fn check_interval(start_time: f64, final_time: f64) -> Result<(), OdeError> {
    if !(start_time.is_finite() && final_time.is_finite()) || final_time < start_time {
        return Err(OdeError::InvalidConfiguration(format!(
            "cannot advance from t = {start_time} to t = {final_time}"
        )));
    }
    Ok(())
}

fn check_dt(dt: f64, step: StepCount) -> Result<(), OdeError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(OdeError::InvalidConfiguration(format!(
            "invalid dt = {dt} for step {step}"
        )));
    }
    Ok(())
}

/// Shorten `dt` so the step lands exactly on `final_time`.
fn clamp_to_end(time: f64, dt: f64, final_time: f64) -> (f64, bool) {
    if time + dt >= final_time - end_tolerance(final_time) {
        (final_time - time, true)
    } else {
        (dt, false)
    }
}

/// Take `num_steps` steps of constant size `dt`; returns the final time.
pub fn advance_n_steps<S, O>(
    stepper: &mut S,
    state: &mut DVector<f64>,
    start_time: f64,
    dt: f64,
    num_steps: StepCount,
    mut observer: O,
) -> Result<f64, OdeError>
where
    S: Steppable + ?Sized,
    O: FnMut(StepCount, f64, &DVector<f64>),
{
    check_dt(dt, 1)?;

    let mut time = start_time;
    observer(0, time, state);
    for step in 1..=num_steps {
        stepper.step(state, time, dt, step)?;
        time = start_time + step as f64 * dt;
        observer(step, time, state);
    }
    Ok(time)
}

/// Step from `start_time` to `final_time` with the time step returned by
/// `dt_policy(step, time)`; returns the number of steps taken.
///
/// The last step is shortened so the run ends exactly at `final_time`.
pub fn advance_to_target_time<S, P, O>(
    stepper: &mut S,
    state: &mut DVector<f64>,
    start_time: f64,
    final_time: f64,
    mut dt_policy: P,
    mut observer: O,
) -> Result<StepCount, OdeError>
where
    S: Steppable + ?Sized,
    P: FnMut(StepCount, f64) -> f64,
    O: FnMut(StepCount, f64, &DVector<f64>),
{
    check_interval(start_time, final_time)?;

    let eps = end_tolerance(final_time);
    let mut time = start_time;
    let mut step: StepCount = 0;
    observer(0, time, state);

    while final_time - time > eps {
        step += 1;
        let dt = dt_policy(step, time);
        check_dt(dt, step)?;
        let (dt, last) = clamp_to_end(time, dt, final_time);

        stepper.step(state, time, dt, step)?;
        time = if last { final_time } else { time + dt };
        observer(step, time, state);
    }
    Ok(step)
}

/// Like [`advance_n_steps`], retrying failed steps with a reduced time step.
///
/// `control(step, time)` provides the step-size control for each step.
/// Returns the final time.
pub fn advance_n_steps_with_time_step_recovery<S, C, O>(
    stepper: &mut S,
    state: &mut DVector<f64>,
    start_time: f64,
    num_steps: StepCount,
    mut control: C,
    mut observer: O,
) -> Result<f64, OdeError>
where
    S: Steppable + ?Sized,
    C: FnMut(StepCount, f64) -> StepSizeControl,
    O: FnMut(StepCount, f64, &DVector<f64>),
{
    let mut time = start_time;
    observer(0, time, state);
    for step in 1..=num_steps {
        let dt = step_with_recovery(stepper, state, time, step, control(step, time), None)?;
        time += dt;
        observer(step, time, state);
    }
    Ok(time)
}

/// Like [`advance_to_target_time`], retrying failed steps with a reduced
/// time step. Returns the number of steps taken.
pub fn advance_to_target_time_with_time_step_recovery<S, C, O>(
    stepper: &mut S,
    state: &mut DVector<f64>,
    start_time: f64,
    final_time: f64,
    mut control: C,
    mut observer: O,
) -> Result<StepCount, OdeError>
where
    S: Steppable + ?Sized,
    C: FnMut(StepCount, f64) -> StepSizeControl,
    O: FnMut(StepCount, f64, &DVector<f64>),
{
    check_interval(start_time, final_time)?;

    let eps = end_tolerance(final_time);
    let mut time = start_time;
    let mut step: StepCount = 0;
    observer(0, time, state);

    while final_time - time > eps {
        step += 1;
        let dt = step_with_recovery(
            stepper,
            state,
            time,
            step,
            control(step, time),
            Some(final_time),
        )?;
        time = if (final_time - (time + dt)).abs() <= eps {
            final_time
        } else {
            time + dt
        };
        observer(step, time, state);
    }
    Ok(step)
}

/// Attempt `step` until it succeeds; returns the time step that was accepted.
fn step_with_recovery<S>(
    stepper: &mut S,
    state: &mut DVector<f64>,
    time: f64,
    step: StepCount,
    control: StepSizeControl,
    final_time: Option<f64>,
) -> Result<f64, OdeError>
where
    S: Steppable + ?Sized,
{
    control.validate()?;

    let mut dt = control.dt;
    if let Some(final_time) = final_time {
        dt = clamp_to_end(time, dt, final_time).0;
    }

    loop {
        match stepper.step(state, time, dt, step) {
            Ok(()) => return Ok(dt),
            Err(err) if err.is_time_step_failure() => {
                let reduced = dt / control.reduction_factor;
                if reduced < control.min_dt {
                    debug!("step {step}: giving up, {err}");
                    return Err(OdeError::TimeStepTooSmall {
                        step,
                        dt: reduced,
                        dt_min: control.min_dt,
                    });
                }
                warn!("step {step} failed with dt = {dt}, retrying with dt = {reduced}");
                dt = reduced;
            }
            Err(err) => return Err(err),
        }
    }
}

use std::process::ExitCode;

use log::{error, info};
use nalgebra::DVector;
use odestep::prelude::*;

/// Burgers1D demo: integrate with the scheme selected in an optional JSON
/// settings file given as first argument.
fn run() -> Result<(), OdeError> {
    let settings = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).map_err(|e| {
                OdeError::InvalidConfiguration(format!("cannot read {path}: {e}"))
            })?;
            IntegratorSettings::from_json(&json)?
        }
        None => IntegratorSettings::default(),
    };
    settings.validate()?;

    let app = Burgers1d::new(Burgers1d::DEFAULT_PARAMETERS, 20)?;
    let mut y = app.initial_state();
    let mut solver = NewtonRaphson::from_settings(settings.newton);

    println!("odestep - Burgers1D demo");
    println!("========================\n");
    println!("  scheme:   {} (order {})", settings.scheme.as_str(), settings.scheme.order());
    println!("  cells:    {}", app.num_cells());
    println!(
        "  interval: [{}, {}], dt = {}\n",
        settings.start_time,
        settings.final_time(),
        settings.dt
    );

    let steps = match settings.scheme {
        SchemeKind::BDF1 => {
            let mut stepper = create_bdf1_stepper(&y, &app);
            integrate(&mut stepper.with_solver(&mut solver), &mut y, &settings)?
        }
        SchemeKind::BDF2 => {
            let mut stepper = create_bdf2_stepper(&y, &app);
            integrate(&mut stepper.with_solver(&mut solver), &mut y, &settings)?
        }
        SchemeKind::BDF3 => {
            let mut stepper = create_bdf3_stepper(&y, &app);
            integrate(&mut stepper.with_solver(&mut solver), &mut y, &settings)?
        }
        SchemeKind::Euler => {
            let mut stepper = ExplicitStepper::new(ExplicitScheme::ForwardEuler, &app);
            integrate(&mut stepper, &mut y, &settings)?
        }
        SchemeKind::RK4 => {
            let mut stepper = ExplicitStepper::new(ExplicitScheme::RungeKutta4, &app);
            integrate(&mut stepper, &mut y, &settings)?
        }
        SchemeKind::SSPRK3 => {
            let mut stepper = ExplicitStepper::new(ExplicitScheme::Ssprk3, &app);
            integrate(&mut stepper, &mut y, &settings)?
        }
    };

    println!("Completed {} steps", steps);
    println!("  min(u) = {:.6}", y.min());
    println!("  max(u) = {:.6}", y.max());
    println!("  |u|    = {:.6}", y.norm());
    Ok(())
}

fn integrate<S: Steppable>(
    stepper: &mut S,
    y: &mut DVector<f64>,
    settings: &IntegratorSettings,
) -> Result<StepCount, OdeError> {
    let observer = |step: StepCount, time: f64, state: &DVector<f64>| {
        info!("step {step}: t = {time:.4}, |u| = {:.6}", state.norm());
    };

    if settings.recovery {
        let control = settings.step_size_control();
        advance_to_target_time_with_time_step_recovery(
            stepper,
            y,
            settings.start_time,
            settings.final_time(),
            |_, _| control,
            observer,
        )
    } else {
        advance_to_target_time(
            stepper,
            y,
            settings.start_time,
            settings.final_time(),
            |_, _| settings.dt,
            observer,
        )
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

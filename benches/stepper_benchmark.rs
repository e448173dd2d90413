//! Stepper benchmarks
//!
//! Benchmarks time-stepping performance for the explicit and implicit steppers.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, DVector};
use odestep::apps::Burgers1d;
use odestep::optim::NewtonRaphson;
use odestep::steppers::{
    advance_n_steps, create_bdf1_stepper, create_bdf2_stepper, create_bdf3_stepper,
    ContinuousTimeSystem, ExplicitScheme, ExplicitStepper, OdeError,
};

/// Simple exponential decay: dx/dt = -k*x
struct ExponentialDecay {
    size: usize,
    k: f64,
}

impl ContinuousTimeSystem for ExponentialDecay {
    fn create_velocity(&self) -> DVector<f64> {
        DVector::zeros(self.size)
    }

    fn create_jacobian(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.size, self.size)
    }

    fn velocity(&self, x: &DVector<f64>, _t: f64, f: &mut DVector<f64>) -> Result<(), OdeError> {
        f.copy_from(&(-self.k * x));
        Ok(())
    }

    fn jacobian(&self, _x: &DVector<f64>, _t: f64, j: &mut DMatrix<f64>) -> Result<(), OdeError> {
        j.fill_with_identity();
        *j *= -self.k;
        Ok(())
    }
}

/// Benchmark RK4 steps with different state vector sizes
fn bench_rk4_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("RK4 Step");

    for size in [1, 5, 10, 20, 50, 100].iter() {
        let system = ExponentialDecay { size: *size, k: 0.5 };
        let initial = DVector::from_element(*size, 1.0);
        let dt = 0.001;

        group.bench_with_input(BenchmarkId::new("state_size", size), size, |b, _| {
            let mut stepper = ExplicitStepper::new(ExplicitScheme::RungeKutta4, &system);
            b.iter(|| {
                let mut y = initial.clone();
                stepper.do_step(&mut y, 0.0, black_box(dt), 1).unwrap();
                black_box(y);
            });
        });
    }

    group.finish();
}

/// Benchmark the BDF family on Burgers1D over a fixed number of steps
fn bench_bdf_burgers(c: &mut Criterion) {
    let mut group = c.benchmark_group("BDF Burgers1D");
    let app = Burgers1d::new(Burgers1d::DEFAULT_PARAMETERS, 100).unwrap();
    let y0 = app.initial_state();
    let dt = 0.01;
    let steps = 50;

    group.bench_function("BDF1", |b| {
        b.iter(|| {
            let mut y = y0.clone();
            let mut stepper = create_bdf1_stepper(&y0, &app);
            let mut solver = NewtonRaphson::new();
            advance_n_steps(&mut stepper.with_solver(&mut solver), &mut y, 0.0, dt, steps, |_, _, _| {})
                .unwrap();
            black_box(y);
        });
    });

    group.bench_function("BDF2", |b| {
        b.iter(|| {
            let mut y = y0.clone();
            let mut stepper = create_bdf2_stepper(&y0, &app);
            let mut solver = NewtonRaphson::new();
            advance_n_steps(&mut stepper.with_solver(&mut solver), &mut y, 0.0, dt, steps, |_, _, _| {})
                .unwrap();
            black_box(y);
        });
    });

    group.bench_function("BDF3", |b| {
        b.iter(|| {
            let mut y = y0.clone();
            let mut stepper = create_bdf3_stepper(&y0, &app);
            let mut solver = NewtonRaphson::new();
            advance_n_steps(&mut stepper.with_solver(&mut solver), &mut y, 0.0, dt, steps, |_, _, _| {})
                .unwrap();
            black_box(y);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rk4_step, bench_bdf_burgers);
criterion_main!(benches);

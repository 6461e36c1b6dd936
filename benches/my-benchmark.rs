use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{arr1, Array1, Array2};
use rusty_estimation::{
    Filter, KalmanFilter, ParticleFilter, ParticleFilterConfig, UnscentedKalmanFilter,
};

fn constant_velocity_kalman(dim: usize) -> KalmanFilter<f64> {
    let mut transition = Array2::<f64>::eye(dim);
    for i in 0..dim / 2 {
        transition[[i, i + dim / 2]] = 1.0;
    }
    let mut kf = KalmanFilter::<f64>::new(
        1.0,
        &transition,
        &Array2::eye(dim),
        &(Array2::<f64>::eye(dim) * 0.001),
        &(Array2::<f64>::eye(dim) * 0.1),
        &Array2::eye(dim),
    )
    .unwrap();
    kf.init(&Array1::zeros(dim)).unwrap();
    kf
}

pub fn kalman_predict_benchmark(c: &mut Criterion) {
    let mut kf = constant_velocity_kalman(8);
    c.bench_function("Kalman filter predict for an 8 dimensional state", |b| {
        b.iter(|| kf.predict().unwrap())
    });
}

pub fn kalman_update_benchmark(c: &mut Criterion) {
    let mut kf = constant_velocity_kalman(8);
    let measurement = Array1::<f64>::ones(8);
    c.bench_function("Kalman filter predict and update with 8 measurements", |b| {
        b.iter(|| {
            kf.predict().unwrap();
            kf.update(black_box(&measurement)).unwrap();
        })
    });
}

pub fn unscented_cycle_benchmark(c: &mut Criterion) {
    let mut ukf = UnscentedKalmanFilter::new(4, 2).unwrap();
    ukf.set_process_model(
        |x| arr1(&[x[0] + x[2], x[1] + x[3], x[2], x[3]]),
        &(Array2::<f64>::eye(4) * 0.001),
    )
    .unwrap();
    ukf.set_measurement_model(
        |x| arr1(&[(x[0] * x[0] + x[1] * x[1]).sqrt(), x[1].atan2(x[0])]),
        &(Array2::<f64>::eye(2) * 0.1),
    )
    .unwrap();
    ukf.initialize(&arr1(&[10.0, 10.0, 1.0, 0.0]), &Array2::eye(4))
        .unwrap();
    let measurement = arr1(&[14.5, 0.78]);
    c.bench_function("Unscented Kalman filter predict and update, range and bearing", |b| {
        b.iter(|| {
            ukf.predict().unwrap();
            ukf.update(black_box(&measurement)).unwrap();
        })
    });
}

pub fn particle_update_benchmark(c: &mut Criterion) {
    let config = ParticleFilterConfig::default()
        .with_particle_count(1000)
        .with_seed(1);
    let mut pf = ParticleFilter::with_config(config).unwrap();
    let measurement = arr1(&[0.0, 0.0]);
    c.bench_function("Particle filter predict and update for 1000 particles", |b| {
        b.iter(|| {
            pf.predict().unwrap();
            pf.update(black_box(&measurement)).unwrap();
        })
    });
}

criterion_group!(predict, kalman_predict_benchmark);
criterion_group!(
    update,
    kalman_update_benchmark,
    unscented_cycle_benchmark,
    particle_update_benchmark
);
criterion_main!(predict, update);

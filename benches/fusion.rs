//! Performance benchmarks for fusion and gesture recognition
//!
//! Run with: cargo bench
//! Run specific benchmark: cargo bench -- merge
//! Compare against baseline: cargo bench -- --save-baseline main

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use multisensor_skeleton_fusion_rs::common::rng::SimpleRng;
use multisensor_skeleton_fusion_rs::config::MotionModelConfig;
use multisensor_skeleton_fusion_rs::gesture::kmeans;
use multisensor_skeleton_fusion_rs::scenario::standing_skeleton;
use multisensor_skeleton_fusion_rs::{
    DiscreteHmm, FusionConfig, JointMotionFilter, ManualClock, SkeletonFusionEngine, Topology,
    TrainingOptions,
};
use nalgebra::Point3;
use rand::Rng;

fn t(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
}

/// Engine holding `n` subjects spaced 2 m apart
fn populated_engine(n: usize) -> (SkeletonFusionEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t(0)));
    let engine = SkeletonFusionEngine::with_clock(FusionConfig::default(), clock.clone())
        .expect("default configuration");
    for i in 0..n {
        engine.merge_skeleton(&standing_skeleton("k", i as u64, Point3::new(2.0 * i as f64, 0.9, 3.0), t(0)));
    }
    (engine, clock)
}

// =============================================================================
// JOINT FILTER BENCHMARKS
// =============================================================================

fn bench_joint_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_filter");
    group.sample_size(100);

    let config = MotionModelConfig::default();
    group.bench_function("integrate", |b| {
        let filter = JointMotionFilter::new(&config);
        let mut k = 0i64;
        b.iter(|| {
            k += 1;
            filter.integrate_measurement(&Point3::new(0.001 * k as f64, 1.0, 2.0), t(33 * k), 0.01)
        })
    });

    let filter = JointMotionFilter::new(&config);
    for k in 0..30 {
        filter.integrate_measurement(&Point3::new(0.01 * k as f64, 1.0, 2.0), t(33 * k), 0.01);
    }
    group.bench_function("predict", |b| b.iter(|| filter.predict_and_discard(0.05)));

    group.finish();
}

// =============================================================================
// FUSION ENGINE BENCHMARKS
// =============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(50);

    for n in [1, 4, 8, 16] {
        let (engine, clock) = populated_engine(n);
        group.bench_with_input(BenchmarkId::new("observation", format!("{}subjects", n)), &n, |b, &n| {
            let mut k = 0i64;
            b.iter(|| {
                k += 1;
                clock.advance_ms(33);
                let i = (k as usize) % n;
                let obs = standing_skeleton("k", i as u64, Point3::new(2.0 * i as f64, 0.9, 3.0), t(33 * k));
                engine.merge_skeleton(&obs)
            })
        });
    }

    group.finish();
}

fn bench_predict_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_all");
    group.sample_size(50);

    for n in [1, 4, 8, 16] {
        let (engine, _clock) = populated_engine(n);
        group.bench_with_input(BenchmarkId::new("skeletons", format!("{}subjects", n)), &engine, |b, e| {
            b.iter(|| e.get_all_predicted_skeletons(0.033))
        });
    }

    group.finish();
}

// =============================================================================
// GESTURE BENCHMARKS
// =============================================================================

fn bench_hmm(c: &mut Criterion) {
    let mut group = c.benchmark_group("hmm");
    group.sample_size(50);

    let mut rng = SimpleRng::new(42);
    let sequences: Vec<Vec<usize>> = (0..10)
        .map(|_| (0..40).map(|t| (t / 5 + rng.gen_range(0..2)) % 8).collect())
        .collect();

    let untrained: DiscreteHmm<usize, usize> =
        DiscreteHmm::with_topology((0..4).collect(), (0..8).collect(), Topology::LeftToRight)
            .expect("valid topology");
    let mut trained = untrained.clone();
    let options = TrainingOptions::default();
    let _ = trained.train_scaled(&sequences, &options);

    for len in [40, 200, 1000] {
        let obs: Vec<usize> = (0..len).map(|t| (t / 5) % 8).collect();
        group.bench_with_input(BenchmarkId::new("log_likelihood", len), &obs, |b, o| {
            b.iter(|| trained.log_observation_probability(o))
        });
    }

    group.bench_function("train_scaled", |b| {
        b.iter(|| {
            let mut hmm = untrained.clone();
            hmm.train_scaled(&sequences, &options)
        })
    });

    group.finish();
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(20);

    for n in [100, 500, 2000] {
        let mut rng = SimpleRng::new(42);
        let points: Vec<Point3<f64>> = (0..n)
            .map(|_| Point3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()))
            .collect();
        group.bench_with_input(BenchmarkId::new("cluster", format!("{}pts", n)), &points, |b, p| {
            let mut rng = SimpleRng::new(7);
            b.iter(|| kmeans(p, 8, 100, &mut rng))
        });
    }

    group.finish();
}

// =============================================================================
// GROUP DEFINITIONS
// =============================================================================

criterion_group!(
    benches,
    bench_joint_filter,
    bench_merge,
    bench_predict_all,
    bench_hmm,
    bench_kmeans,
);

criterion_main!(benches);

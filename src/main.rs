use anyhow::{Context, Result, bail};
use nalgebra::Rotation3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_ahrs::config::AppConfig;
use rust_ahrs::geometry::so3;
use rust_ahrs::imu::{GyroSample, ImuBias, PreintegratedRotation};
use rust_ahrs::io::euroc::EurocImuDataset;
use rust_ahrs::optimizer::{
    AhrsFactor, B, BiasPrior, FactorGraph, LevenbergMarquardt, RotationPrior, Values, X,
};

/// One keyframe interval of the gyro stream.
struct Interval {
    t_start: f64,
    t_end: f64,
    preintegrated: PreintegratedRotation,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let dataset_path = args
        .next()
        .unwrap_or_else(|| "data/euroc/MH_01_easy/mav0".to_string());
    let config = match args.next() {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };

    info!("Loading EuRoC IMU data from: {}", dataset_path);
    let dataset = EurocImuDataset::new(&dataset_path)?;
    info!(
        "Loaded {} gyro samples at {} Hz, {} ground truth entries",
        dataset.len(),
        dataset.calibration.rate_hz,
        dataset.groundtruth.len()
    );

    let samples_per_keyframe =
        (config.keyframe_interval_s * dataset.calibration.rate_hz).round() as usize;
    if samples_per_keyframe == 0 {
        bail!(
            "keyframe interval {} s is shorter than one IMU sample",
            config.keyframe_interval_s
        );
    }

    let bias_hat = ImuBias::zero();
    let gyro_covariance = dataset.calibration.gyro_noise().covariance();
    let intervals = preintegrate_intervals(
        &dataset.gyro_samples,
        samples_per_keyframe,
        config.max_keyframes,
        bias_hat,
        gyro_covariance,
    )?;
    if intervals.is_empty() {
        bail!("not enough gyro samples for a single keyframe interval");
    }

    // Anchor the first attitude to ground truth when available
    let first_rotation = match dataset.groundtruth_at(intervals[0].t_start) {
        Some(gt) => gt.orientation,
        None => {
            warn!("No ground truth; anchoring first keyframe at identity");
            Rotation3::identity()
        }
    };

    let mut graph = FactorGraph::new();
    let mut values = Values::new();
    values.insert_rotation(X(0), first_rotation);
    values.insert_bias(B(0), bias_hat);
    graph.add(RotationPrior::isotropic(X(0), first_rotation, config.prior_sigma_rot)?);
    graph.add(BiasPrior::isotropic(B(0), bias_hat, config.prior_sigma_bias)?);

    let mut rotation = first_rotation;
    for (k, interval) in intervals.iter().enumerate() {
        let (i, j) = (k as u64, k as u64 + 1);
        let factor = AhrsFactor::with_options(
            X(i),
            X(j),
            B(0),
            interval.preintegrated.clone(),
            config.omega_coriolis,
            Some(dataset.calibration.body_p_sensor),
            config.use_second_order_coriolis,
        );
        rotation = factor.predict_rot_j(&rotation, &bias_hat);
        values.insert_rotation(X(j), rotation);
        graph.add(factor);
    }
    info!(
        "Built attitude graph: {} keyframes, {} factors",
        intervals.len() + 1,
        graph.len()
    );

    let optimizer = LevenbergMarquardt::new(config.optimizer.clone());
    let result = optimizer
        .optimize(&graph, &values)
        .context("attitude graph optimization failed")?;

    let bias = result.values.bias(B(0))?;
    println!(
        "Estimated gyro bias: [{:.5}, {:.5}, {:.5}] rad/s",
        bias.gyro.x, bias.gyro.y, bias.gyro.z
    );

    println!("{:>4} {:>18} {:>12}", "kf", "t [s]", "err [deg]");
    for k in 0..=intervals.len() {
        let t = if k == 0 {
            intervals[0].t_start
        } else {
            intervals[k - 1].t_end
        };
        let estimate = result.values.rotation(X(k as u64))?;
        match dataset.groundtruth_at(t) {
            Some(gt) => {
                let err = so3::log(&(gt.orientation.inverse() * estimate)).norm();
                println!("{:>4} {:>18.6} {:>12.4}", k, t, err.to_degrees());
            }
            None => println!("{:>4} {:>18.6} {:>12}", k, t, "n/a"),
        }
    }

    Ok(())
}

/// Splits the gyro stream into consecutive intervals of `samples_per_keyframe`
/// steps; neighbouring intervals share their boundary sample.
fn preintegrate_intervals(
    samples: &[GyroSample],
    samples_per_keyframe: usize,
    max_keyframes: usize,
    bias_hat: ImuBias,
    gyro_covariance: nalgebra::Matrix3<f64>,
) -> Result<Vec<Interval>> {
    let mut intervals = Vec::new();
    let mut start = 0;

    while start + samples_per_keyframe < samples.len() && intervals.len() + 1 < max_keyframes {
        let window = &samples[start..=start + samples_per_keyframe];
        let mut preintegrated = PreintegratedRotation::new(bias_hat, gyro_covariance)
            .with_initial_rotation_rate(window[0].gyro);
        preintegrated
            .integrate_samples(window)
            .with_context(|| format!("Failed to preintegrate samples {}..", start))?;

        intervals.push(Interval {
            t_start: window[0].timestamp_s,
            t_end: window[window.len() - 1].timestamp_s,
            preintegrated,
        });
        start += samples_per_keyframe;
    }

    Ok(intervals)
}

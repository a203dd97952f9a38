use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::{Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use tracing::warn;

use crate::imu::{GyroNoise, GyroSample, ImuBias};

#[derive(Debug, Clone)]
pub struct GroundTruthEntry {
    pub timestamp_s: f64,
    /// Body-to-world rotation (q_RS).
    pub orientation: Rotation3<f64>,
    pub bias: ImuBias,
}

/// IMU intrinsics and extrinsics from `imu0/sensor.yaml`.
#[derive(Debug, Clone)]
pub struct ImuCalibration {
    /// Pose of the IMU in the body frame (T_BS).
    pub body_p_sensor: Isometry3<f64>,
    pub gyroscope_noise_density: f64,
    pub gyroscope_random_walk: f64,
    pub rate_hz: f64,
}

impl ImuCalibration {
    pub fn gyro_noise(&self) -> GyroNoise {
        GyroNoise::new(self.gyroscope_noise_density, self.gyroscope_random_walk)
    }
}

#[derive(Debug)]
pub struct EurocImuDataset {
    pub gyro_samples: Vec<GyroSample>,
    pub calibration: ImuCalibration,
    pub groundtruth: Vec<GroundTruthEntry>,
}

impl EurocImuDataset {
    /// Loads `imu0/` and, when present, `state_groundtruth_estimate0/` under a
    /// `mav0` directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let gyro_samples = load_gyro_samples(root.join("imu0/data.csv"))?;
        let calibration = load_imu_calibration(root.join("imu0/sensor.yaml"))?;
        // Ground truth is optional - some sequences don't ship it
        let groundtruth = load_groundtruth(root.join("state_groundtruth_estimate0/data.csv"))
            .unwrap_or_else(|e| {
                warn!("Could not load ground truth: {}. Continuing without it.", e);
                Vec::new()
            });

        Ok(Self {
            gyro_samples,
            calibration,
            groundtruth,
        })
    }

    pub fn len(&self) -> usize {
        self.gyro_samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gyro_samples.is_empty()
    }

    /// Gyro samples with `t_start <= t <= t_end`.
    pub fn gyro_between(&self, t_start: f64, t_end: f64) -> &[GyroSample] {
        let first = self
            .gyro_samples
            .partition_point(|s| s.timestamp_s < t_start);
        let last = self
            .gyro_samples
            .partition_point(|s| s.timestamp_s <= t_end);
        &self.gyro_samples[first..last.max(first)]
    }

    /// Ground truth entry closest in time to `timestamp_s`.
    pub fn groundtruth_at(&self, timestamp_s: f64) -> Option<&GroundTruthEntry> {
        let idx = self
            .groundtruth
            .partition_point(|gt| gt.timestamp_s < timestamp_s);

        let after = self.groundtruth.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.groundtruth.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp_s - b.timestamp_s <= a.timestamp_s - timestamp_s {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }
}

fn open_csv(csv_path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))
}

fn parse_vector(rec: &csv::StringRecord, start: usize) -> Result<Vector3<f64>> {
    Ok(Vector3::new(
        rec[start].trim().parse()?,
        rec[start + 1].trim().parse()?,
        rec[start + 2].trim().parse()?,
    ))
}

/// Reads `imu0/data.csv`: `timestamp [ns], w_x, w_y, w_z, a_x, a_y, a_z`.
///
/// Accelerometer columns are ignored.
pub fn load_gyro_samples<P: AsRef<Path>>(csv_path: P) -> Result<Vec<GyroSample>> {
    let csv_path = csv_path.as_ref();
    let mut rdr = open_csv(csv_path)?;

    let mut samples = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() < 4 {
            warn!("{}: skipping short row {}", csv_path.display(), line + 1);
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let gyro = parse_vector(&rec, 1)?;
        samples.push(GyroSample::new(ts as f64 * 1e-9, gyro));
    }
    Ok(samples)
}

/// Reads `state_groundtruth_estimate0/data.csv`.
pub fn load_groundtruth<P: AsRef<Path>>(csv_path: P) -> Result<Vec<GroundTruthEntry>> {
    let csv_path = csv_path.as_ref();
    let mut rdr = open_csv(csv_path)?;

    let mut entries = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        // CSV format: timestamp, p_RS_R_x, p_RS_R_y, p_RS_R_z, q_RS_w, q_RS_x, q_RS_y, q_RS_z,
        //             v_RS_R_x, v_RS_R_y, v_RS_R_z, b_w_RS_S_x, b_w_RS_S_y, b_w_RS_S_z,
        //             b_a_RS_S_x, b_a_RS_S_y, b_a_RS_S_z
        if rec.len() < 17 {
            warn!("{}: skipping short row {}", csv_path.display(), line + 1);
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;

        // w-first quaternion
        let q = Quaternion::new(
            rec[4].trim().parse()?,
            rec[5].trim().parse()?,
            rec[6].trim().parse()?,
            rec[7].trim().parse()?,
        );
        let orientation = UnitQuaternion::from_quaternion(q).to_rotation_matrix();

        let bias = ImuBias::new(parse_vector(&rec, 11)?, parse_vector(&rec, 14)?);

        entries.push(GroundTruthEntry {
            timestamp_s: ts as f64 * 1e-9,
            orientation,
            bias,
        });
    }
    Ok(entries)
}

/// EuRoC T_BS transform format: has cols, rows, data fields
#[derive(Debug, Deserialize)]
struct TransformYaml {
    data: Vec<f64>,
}

/// EuRoC imu sensor.yaml format
#[derive(Debug, Deserialize)]
struct ImuYaml {
    #[serde(rename = "T_BS")]
    t_bs: TransformYaml,
    rate_hz: f64,
    gyroscope_noise_density: f64,
    gyroscope_random_walk: f64,
}

pub fn load_imu_calibration<P: AsRef<Path>>(yaml_path: P) -> Result<ImuCalibration> {
    let yaml_path: PathBuf = yaml_path.as_ref().to_path_buf();
    let imu: ImuYaml = serde_yaml::from_reader(
        File::open(&yaml_path).with_context(|| format!("Failed to open {:?}", yaml_path))?,
    )
    .with_context(|| format!("Failed to parse {:?}", yaml_path))?;

    if imu.rate_hz <= 0.0 {
        bail!("IMU rate must be positive, got {}", imu.rate_hz);
    }

    Ok(ImuCalibration {
        body_p_sensor: isometry_from(&imu.t_bs.data)?,
        gyroscope_noise_density: imu.gyroscope_noise_density,
        gyroscope_random_walk: imu.gyroscope_random_walk,
        rate_hz: imu.rate_hz,
    })
}

fn isometry_from(data: &[f64]) -> Result<Isometry3<f64>> {
    if data.len() != 16 {
        bail!("Expected 16 elements for transform, got {}", data.len());
    }
    let mat = Matrix4::from_row_slice(data);
    let rot: Matrix3<f64> = mat.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_matrix(&rot);
    let translation = Translation3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
    Ok(Isometry3::from_parts(translation, rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use tempfile::TempDir;

    const IMU_CSV: &str = "\
#timestamp [ns],w_RS_S_x [rad s^-1],w_RS_S_y [rad s^-1],w_RS_S_z [rad s^-1],a_RS_S_x [m s^-2],a_RS_S_y [m s^-2],a_RS_S_z [m s^-2]
1403636579758555392,-0.099134701513277898,0.14032447186034408,0.029321531433504058,8.1476917083333333,-0.37592158333333331,-2.4026292499999999
1403636579763555584,-0.099134701513277898,0.14032447186034408,0.029321531433504058,8.033280791666666,-0.40861041666666664,-2.4026292499999999
1403636579768555520,-0.098436569812100444,0.12775810124598494,0.037699111843077518,7.8861810416666662,-0.42495483333333334,-2.4353180833333332
";

    const IMU_YAML: &str = "\
#Default imu sensor yaml file
sensor_type: imu
comment: VI-Sensor IMU (ADIS16448)

# Sensor extrinsics wrt. the body-frame.
T_BS:
  cols: 4
  rows: 4
  data: [1.0, 0.0, 0.0, 0.0,
         0.0, 1.0, 0.0, 0.0,
         0.0, 0.0, 1.0, 0.0,
         0.0, 0.0, 0.0, 1.0]
rate_hz: 200

# inertial sensor noise model parameters (static)
gyroscope_noise_density: 1.6968e-04     # [ rad / s / sqrt(Hz) ]   ( gyro \"white noise\" )
gyroscope_random_walk: 1.9393e-05       # [ rad / s^2 / sqrt(Hz) ] ( gyro bias diffusion )
accelerometer_noise_density: 2.0000e-3  # [ m / s^2 / sqrt(Hz) ]   ( accel \"white noise\" )
accelerometer_random_walk: 3.0000e-3    # [ m / s^3 / sqrt(Hz) ].  ( accel bias diffusion )
";

    const GT_CSV: &str = "\
#timestamp, p_RS_R_x [m], p_RS_R_y [m], p_RS_R_z [m], q_RS_w [], q_RS_x [], q_RS_y [], q_RS_z [], v_RS_R_x [m s^-1], v_RS_R_y [m s^-1], v_RS_R_z [m s^-1], b_w_RS_S_x [rad s^-1], b_w_RS_S_y [rad s^-1], b_w_RS_S_z [rad s^-1], b_a_RS_S_x [m s^-2], b_a_RS_S_y [m s^-2], b_a_RS_S_z [m s^-2]
1403636579758555392,4.688319,-1.786938,0.783338,1.0,0.0,0.0,0.0,-0.027876,0.033207,0.800006,-0.003172,0.021267,0.078502,-0.025266,0.136696,0.075593
1403636579768555520,4.688177,-1.786770,0.787350,0.0,0.0,0.0,1.0,-0.014048,0.016788,0.803094,-0.003172,0.021267,0.078502,-0.025266,0.136696,0.075593
";

    fn write_dataset(with_groundtruth: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("imu0")).unwrap();
        fs::write(dir.path().join("imu0/data.csv"), IMU_CSV).unwrap();
        fs::write(dir.path().join("imu0/sensor.yaml"), IMU_YAML).unwrap();
        if with_groundtruth {
            fs::create_dir_all(dir.path().join("state_groundtruth_estimate0")).unwrap();
            fs::write(dir.path().join("state_groundtruth_estimate0/data.csv"), GT_CSV).unwrap();
        }
        dir
    }

    #[test]
    fn test_load_gyro_samples() {
        let dir = write_dataset(false);
        let samples = load_gyro_samples(dir.path().join("imu0/data.csv")).unwrap();

        assert_eq!(samples.len(), 3);
        assert_relative_eq!(samples[0].gyro.x, -0.099134701513277898, epsilon = 1e-15);
        assert_relative_eq!(samples[2].gyro.z, 0.037699111843077518, epsilon = 1e-15);
        assert_relative_eq!(samples[1].timestamp_s - samples[0].timestamp_s, 0.005, epsilon = 1e-6);
    }

    #[test]
    fn test_load_imu_calibration() {
        let dir = write_dataset(false);
        let calib = load_imu_calibration(dir.path().join("imu0/sensor.yaml")).unwrap();

        assert_eq!(calib.rate_hz, 200.0);
        assert_relative_eq!(calib.gyroscope_noise_density, 1.6968e-4);
        assert_relative_eq!(calib.gyro_noise().random_walk, 1.9393e-5);
        assert_relative_eq!(calib.body_p_sensor, Isometry3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_dataset_without_groundtruth() {
        let dir = write_dataset(false);
        let dataset = EurocImuDataset::new(dir.path()).unwrap();

        assert_eq!(dataset.len(), 3);
        assert!(dataset.groundtruth.is_empty());
        assert!(dataset.groundtruth_at(1403636579.76).is_none());
    }

    #[test]
    fn test_gyro_between_is_inclusive() {
        let dir = write_dataset(false);
        let dataset = EurocImuDataset::new(dir.path()).unwrap();
        let t0 = dataset.gyro_samples[0].timestamp_s;
        let t1 = dataset.gyro_samples[1].timestamp_s;

        assert_eq!(dataset.gyro_between(t0, t1).len(), 2);
        assert_eq!(dataset.gyro_between(t1 + 1e-4, t1 + 2e-4).len(), 0);
        assert_eq!(dataset.gyro_between(t1, t0).len(), 0);
    }

    #[test]
    fn test_groundtruth_nearest_lookup() {
        let dir = write_dataset(true);
        let dataset = EurocImuDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.groundtruth.len(), 2);

        let t0 = dataset.groundtruth[0].timestamp_s;
        let t1 = dataset.groundtruth[1].timestamp_s;

        let early = dataset.groundtruth_at(t0 + 0.001).unwrap();
        assert_relative_eq!(early.orientation, Rotation3::identity(), epsilon = 1e-12);

        let late = dataset.groundtruth_at(t1 + 10.0).unwrap();
        assert_relative_eq!(late.timestamp_s, t1);
        assert_relative_eq!(late.orientation.angle(), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(late.bias.gyro, Vector3::new(-0.003172, 0.021267, 0.078502));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_gyro_samples("/nonexistent/imu0/data.csv").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/imu0/data.csv"));
    }
}

use std::path::PathBuf;
use std::time::Instant;

use camera_network_calibration::CameraNetwork;
use camera_network_calibration::config::NetworkConfig;
use camera_network_calibration::data_loader::{
    CameraOrder, find_latest_file, load_camera_order, load_corrections, load_detections, load_skeleton,
};
use camera_network_calibration::io::{object_to_json, write_detailed_report, write_outlier_log, write_report};
use camera_network_calibration::network::BundleAdjustReport;
use camera_network_calibration::optimization::TinySolverBackend;
use camera_network_calibration::skeleton::SkeletonConfig;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Detections JSON `[camera][frame][joint][xy]`
    #[arg(short, long)]
    detections: Option<String>,

    /// Folder searched for the newest `pred*.json` when no detections file is given
    #[arg(short, long)]
    folder: Option<String>,

    /// Calibration JSON
    #[arg(short, long)]
    calibration: Option<String>,

    /// Camera order JSON, a `cidread2cid` list
    #[arg(long)]
    camera_order: Option<String>,

    /// Skeleton JSON, defaults to the bilateral 38-joint rig
    #[arg(long)]
    skeleton: Option<String>,

    /// Network config JSON
    #[arg(long)]
    config: Option<String>,

    /// Manual corrections JSON `{cam_id: {frame: [[x, y], ...]}}`
    #[arg(long)]
    corrections: Option<String>,

    /// Run the three-camera outlier rejection when triangulating
    #[arg(long)]
    reject_outliers: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Triangulate every frame and write the reconstruction
    Triangulate {
        #[command(flatten)]
        inputs: Inputs,

        /// Output reconstruction JSON
        #[arg(short, long, default_value = "reconstruction.json")]
        output: String,

        /// Where to write the outlier rejection log
        #[arg(long)]
        outlier_log: Option<String>,
    },
    /// Refine the left and right camera groups with bundle adjustment
    Calibrate {
        #[command(flatten)]
        inputs: Inputs,

        /// Output calibration JSON, merged into an existing file
        #[arg(short, long, default_value = "calibration.json")]
        output: String,

        /// First frame of the calibration window
        #[arg(long, default_value = "0")]
        start: usize,

        /// End of the calibration window, exclusive. Defaults to all frames
        #[arg(long)]
        end: Option<usize>,

        /// tiny-solver verbosity
        #[arg(long, default_value = "0")]
        verbosity: usize,
    },
    /// Seed poses along a camera chain from epipolar geometry
    Bootstrap {
        #[command(flatten)]
        inputs: Inputs,

        /// Camera ids, each posed relative to the previous one
        #[arg(long, value_delimiter = ',', default_value = "0,1,2")]
        chain: Vec<usize>,

        /// Output calibration JSON
        #[arg(short, long, default_value = "calibration.json")]
        output: String,
    },
    /// Write per-camera reprojection statistics
    Report {
        #[command(flatten)]
        inputs: Inputs,

        /// Text report path; a `.json` sibling gets the detailed report
        #[arg(short, long, default_value = "report.txt")]
        output: String,
    },
}

fn load_network(inputs: &Inputs) -> Result<CameraNetwork, Box<dyn std::error::Error>> {
    let mut config = match &inputs.config {
        Some(path) => NetworkConfig::from_json(path)?,
        None => NetworkConfig::default(),
    };
    if inputs.reject_outliers {
        config.triangulation.outlier_rejection = true;
    }
    let skeleton = match &inputs.skeleton {
        Some(path) => load_skeleton(path)?,
        None => SkeletonConfig::default(),
    };
    let detections_path = match (&inputs.detections, &inputs.folder) {
        (Some(path), _) => PathBuf::from(path),
        (None, Some(folder)) => find_latest_file(folder, "pred*.json").ok_or("no pred*.json in folder")?,
        (None, None) => return Err("either --detections or --folder is required".into()),
    };
    let detections = load_detections(&detections_path)?;
    let order = match &inputs.camera_order {
        Some(path) => load_camera_order(path)?,
        None if skeleton.visible_joints.is_empty() => CameraOrder::identity(detections.n_views()),
        None => CameraOrder::identity(skeleton.visible_joints.len()),
    };
    let mut network = CameraNetwork::from_detections(&detections, &order, skeleton, config)?;
    if let Some(path) = &inputs.calibration {
        network.load_calibration_file(path)?;
    }
    Ok(network)
}

fn print_reports(reports: &[BundleAdjustReport]) {
    for r in reports {
        println!(
            "cameras {:?}: {} points, error {:.4} -> {:.4} px after {} evaluations ({:?})",
            r.cam_ids, r.n_points, r.initial_error, r.final_error, r.nfev, r.status
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Triangulate {
            inputs,
            output,
            outlier_log,
        } => {
            let mut network = load_network(&inputs)?;
            let now = Instant::now();
            network.triangulate(None)?;
            println!("triangulation took {:.3} sec", now.elapsed().as_secs_f64());
            if let Some(path) = outlier_log {
                let threshold = network.config().triangulation.outlier_threshold;
                write_outlier_log(path, network.outliers(), threshold)?;
            }
            let corrections = inputs.corrections.as_ref().map(load_corrections).transpose()?;
            let reconstruction = network.reconstruction(corrections.as_ref())?;
            object_to_json(&output, &reconstruction)?;
            println!("Saved the pose at: {}", output);
        }
        Commands::Calibrate {
            inputs,
            output,
            start,
            end,
            verbosity,
        } => {
            let mut network = load_network(&inputs)?;
            let corrections = inputs.corrections.as_ref().map(load_corrections).transpose()?;
            let frames = start..end.unwrap_or(network.n_frames());
            let now = Instant::now();
            let solver = TinySolverBackend { verbosity };
            let reports = network.calibrate_range(&solver, frames, corrections.as_ref())?;
            println!("calibration took {:.3} sec", now.elapsed().as_secs_f64());
            print_reports(&reports);
            network.save_calibration(&output, None)?;
        }
        Commands::Bootstrap {
            inputs,
            chain,
            output,
        } => {
            let mut network = load_network(&inputs)?;
            for pair in chain.windows(2) {
                let pose = network.bootstrap_pair(pair[0], pair[1])?;
                println!(
                    "cam{} -> cam{}: {} of {} correspondences in front, inlier ratio {:.3}",
                    pair[0],
                    pair[1],
                    pose.n_in_front,
                    pose.inliers.len(),
                    pose.inlier_ratio()
                );
            }
            let meta = serde_json::json!({ "bootstrap_chain": chain });
            network.save_calibration(&output, Some(meta))?;
        }
        Commands::Report { inputs, output } => {
            let mut network = load_network(&inputs)?;
            let calibrated = network.has_calibration();
            let stats = if calibrated {
                network.triangulate(None)?;
                network.camera_stats(None)?
            } else {
                Vec::new()
            };
            write_report(&output, calibrated, &stats)?;
            let json_path = PathBuf::from(&output).with_extension("json");
            write_detailed_report(json_path, &network.calibration_record(None), &stats)?;
        }
    }

    Ok(())
}

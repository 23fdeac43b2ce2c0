use std::path::Path;

use camera_network_calibration::io::object_to_json;
use camera_network_calibration::synthetic::SyntheticRig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic rig: detections, ground-truth calibration, camera order and skeleton
    Generate {
        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of cameras on the ring
        #[arg(short, long, default_value = "3")]
        cameras: usize,

        /// Number of frames to generate
        #[arg(short, long, default_value = "100")]
        num_frames: usize,

        /// Joints per frame
        #[arg(short, long, default_value = "10")]
        joints: usize,

        /// Uniform pixel noise amplitude added to every observation
        #[arg(long, default_value = "0.0")]
        noise: f64,

        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Generate {
            output,
            cameras,
            num_frames,
            joints,
            noise,
            seed,
        } => {
            generate_rig(&output, cameras, num_frames, joints, noise, seed)?;
        }
    }

    Ok(())
}

fn generate_rig(
    output_dir: &str,
    n_cameras: usize,
    num_frames: usize,
    joints: usize,
    noise: f64,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let out = Path::new(output_dir);
    std::fs::create_dir_all(out)?;

    let rig = SyntheticRig::new(n_cameras, num_frames, joints, seed);
    object_to_json(out.join("pred_synthetic.json"), &rig.detections(noise, seed))?;
    object_to_json(out.join("calibration_gt.json"), &rig.calibration_record())?;
    object_to_json(out.join("camera_order.json"), &(0..n_cameras).collect::<Vec<_>>())?;
    object_to_json(out.join("skeleton.json"), &rig.default_skeleton())?;
    let points: Vec<Vec<[f64; 3]>> = rig
        .points
        .iter()
        .map(|f| f.iter().map(|p| [p.x, p.y, p.z]).collect())
        .collect();
    object_to_json(out.join("points3d_gt.json"), &points)?;

    println!(
        "Generated {} cameras x {} frames x {} joints in {}",
        n_cameras, num_frames, joints, output_dir
    );
    Ok(())
}

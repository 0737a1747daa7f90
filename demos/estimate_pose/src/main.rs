use argh::FromArgs;
use std::path::PathBuf;

use graspose::{
    config::{EstimatorConfig, DEFAULT_Z_RANGE},
    estimator::PoseEstimator,
    g3d::io::npy::write_npy_f64,
};

#[derive(FromArgs)]
/// Estimate the 6D pose of a point cloud segment in the robot world frame
struct Args {
    /// path to the clean segment cloud (.npy, N x 3)
    #[argh(option)]
    clean_path: PathBuf,

    /// path to the noisy segment cloud used for the box fit (.npy, N x 3)
    #[argh(option)]
    noisy_path: Option<PathBuf>,

    /// path to the estimator configuration (.json)
    #[argh(option)]
    config_path: Option<PathBuf>,

    /// segment id
    #[argh(option, default = "1")]
    segment_id: u32,

    /// crop the clouds to the default depth range when the config has none
    #[argh(switch)]
    crop: bool,

    /// where to save the world pose (.npy, 4 x 4)
    #[argh(option)]
    output_path: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config_path {
        Some(path) => EstimatorConfig::from_json_file(path)?,
        None => EstimatorConfig::default(),
    };
    if args.crop && config.z_range.is_none() {
        config.z_range = Some(DEFAULT_Z_RANGE);
    }

    let estimator = PoseEstimator::new(&config)?;

    let loaded =
        estimator.load_files(args.segment_id, &args.clean_path, args.noisy_path.as_deref())?;
    log::info!(
        "segment {}: {} points used for the box fit",
        args.segment_id,
        loaded.segment().fitting_cloud().len()
    );

    let boxed = loaded.compute_bounding_box(estimator.analyzer())?;
    let lengths = boxed.obb().edge_lengths();
    println!(
        "box edges: x = {:.4} m, y = {:.4} m, z = {:.4} m",
        lengths[0], lengths[1], lengths[2]
    );

    let classified = boxed.classify_axes()?;
    println!(
        "approach offset: {:.4} m",
        classified.axes().approach_offset()
    );

    let world = classified
        .build_pose()?
        .to_world_frame(estimator.frame_chain())?;

    let rows = world.pose_world().to_rows();
    println!("world pose:");
    for row in &rows {
        println!(
            "  [{:>9.5} {:>9.5} {:>9.5} {:>9.5}]",
            row[0], row[1], row[2], row[3]
        );
    }

    if let Some(path) = args.output_path {
        write_npy_f64(&path, &[4, 4], &rows.concat())?;
        log::info!("saved world pose to {}", path.display());
    }

    Ok(())
}

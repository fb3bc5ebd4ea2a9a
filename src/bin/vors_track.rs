// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::{info, warn};
use std::{env, error::Error, fs, path::Path, path::PathBuf};

use direct_rgbd_odometry::core::camera::Intrinsics;
use direct_rgbd_odometry::core::image::{self, Image};
use direct_rgbd_odometry::core::track::linearizer::LinearizationMode;
use direct_rgbd_odometry::core::track::visual_odometry::{Config, Tracker};
use direct_rgbd_odometry::core::warp::WarpKind;
use direct_rgbd_odometry::dataset::tum_rgbd;
use direct_rgbd_odometry::misc::{helper, interop};
use direct_rgbd_odometry::misc::type_aliases::Iso3;

fn main() {
    pretty_env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./vors_track [fr1|fr2|fr3|icl] associations_file [inverse|forward|esm] [affine]";

fn my_run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Build a vector containing timestamps and full paths of images.
    let associations = parse_associations(&valid_args.associations_file_path)?;
    let first = associations.first().ok_or("The association file is empty")?;

    // Setup tracking configuration, the image size is the one of the first frame.
    let (first_depth, first_gray) = read_images(first)?;
    let mut config = Config::new(valid_args.intrinsics, first_gray.shape());
    config.octaves = 4;
    config.depth = tum_rgbd::depth_config();
    config.linearization = valid_args.linearization;
    config.warp_kind = valid_args.warp_kind;
    let mut tracker = Tracker::new(config)?;
    tracker.on_keyframe_added(|event| info!("Keyframe at {}", event.pose));

    // Track every frame in the associations file.
    let mut pose = Iso3::identity();
    tracker.update_pose(&mut pose, &first_gray, &first_depth)?;
    print_frame(first.depth_timestamp, pose);
    for assoc in associations.iter().skip(1) {
        let (depth, gray) = read_images(assoc)?;
        // Constant position model, the previous pose is the initial guess.
        tracker.update_pose(&mut pose, &gray, &depth)?;
        if tracker.last_num_pixels() == 0 {
            warn!("No valid pixel at timestamp {}", assoc.depth_timestamp);
        }
        print_frame(assoc.depth_timestamp, pose);
    }
    Ok(())
}

/// Print to stdout the frame pose.
fn print_frame(timestamp: f64, pose: Iso3) {
    println!("{}", tum_rgbd::Frame { timestamp, pose });
}

struct Args {
    associations_file_path: PathBuf,
    intrinsics: Intrinsics,
    linearization: LinearizationMode,
    warp_kind: WarpKind,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    let (camera_id, associations_file_path_str, options) = match args {
        [_, camera_id, path, options @ ..] if options.len() <= 2 => (camera_id, path, options),
        _ => {
            eprintln!("{}", USAGE);
            return Err("Wrong number of arguments".to_string());
        }
    };
    let intrinsics = create_camera(camera_id)?;
    let mut linearization = LinearizationMode::Inverse;
    let mut warp_kind = WarpKind::Standard;
    for option in options {
        match option.as_str() {
            "inverse" => linearization = LinearizationMode::Inverse,
            "forward" => linearization = LinearizationMode::Forward,
            "esm" => linearization = LinearizationMode::Esm,
            "affine" => warp_kind = WarpKind::AffineLighting,
            _ => {
                eprintln!("{}", USAGE);
                return Err(format!("Unknown option: {}", option));
            }
        }
    }
    let associations_file_path = PathBuf::from(associations_file_path_str);
    if associations_file_path.is_file() {
        Ok(Args {
            associations_file_path,
            intrinsics,
            linearization,
            warp_kind,
        })
    } else {
        eprintln!("{}", USAGE);
        Err(format!(
            "The association file does not exist or is not reachable: {}",
            associations_file_path_str
        ))
    }
}

/// Create camera depending on `camera_id` command line argument.
fn create_camera(camera_id: &str) -> Result<Intrinsics, String> {
    match camera_id {
        "fr1" => Ok(tum_rgbd::INTRINSICS_FR1),
        "fr2" => Ok(tum_rgbd::INTRINSICS_FR2),
        "fr3" => Ok(tum_rgbd::INTRINSICS_FR3),
        "icl" => Ok(tum_rgbd::INTRINSICS_ICL_NUIM),
        _ => {
            eprintln!("{}", USAGE);
            Err(format!("Unknown camera id: {}", camera_id))
        }
    }
}

/// Open an association file and parse it into a vector of Association,
/// with images paths relative to the association file.
fn parse_associations(file_path: &Path) -> Result<Vec<tum_rgbd::Association>, Box<dyn Error>> {
    let content = fs::read_to_string(file_path)?;
    let parent = file_path.parent().unwrap_or_else(|| Path::new("."));
    let associations = tum_rgbd::parse::associations(&content)?;
    Ok(associations
        .into_iter()
        .map(|assoc| tum_rgbd::Association {
            depth_file_path: parent.join(&assoc.depth_file_path),
            color_file_path: parent.join(&assoc.color_file_path),
            ..assoc
        })
        .collect())
}

/// Read a raw depth image and a gray image in `[0, 1]` given by an association.
fn read_images(assoc: &tum_rgbd::Association) -> Result<(Image, Image), Box<dyn Error>> {
    let depth = helper::read_depth_image(&assoc.depth_file_path)?;
    let gray = helper::read_gray_image(&assoc.color_file_path)?;
    Ok((image::from_pixels(&depth, 1.0), interop::normalized_intensities(&gray)))
}

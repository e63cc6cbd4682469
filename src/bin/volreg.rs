use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use volreg::config::RegistrationConfig;
use volreg::error::Error;
use volreg::io::{read_affine, read_nifti, write_affine, write_nifti};
use volreg::registration::{extract_features, register};
use volreg::resample::warp_volume;

#[derive(Parser)]
#[command(name = "volreg", about = "3D keypoint-based volumetric image registration")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a source volume onto a reference volume
    Register(RegisterArgs),
    /// Detect and describe keypoints in a volume
    Keypoints(KeypointsArgs),
    /// Apply a saved transform to a volume
    Warp(WarpArgs),
}

#[derive(Args)]
struct RegisterArgs {
    /// Source volume (.nii or .nii.gz)
    source: PathBuf,
    /// Reference volume (.nii or .nii.gz)
    reference: PathBuf,
    /// Output transform file
    #[arg(short, long, default_value = "transform.txt")]
    output: PathBuf,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Also write the source resampled into the reference frame
    #[arg(long)]
    resampled: Option<PathBuf>,
}

#[derive(Args)]
struct KeypointsArgs {
    /// Input volume (.nii or .nii.gz)
    volume: PathBuf,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct WarpArgs {
    /// Input volume (.nii or .nii.gz)
    volume: PathBuf,
    /// Transform file produced by `register`
    transform: PathBuf,
    /// Output volume path
    output: PathBuf,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    match &cli.command {
        Commands::Register(args) => {
            let config = load_config(args.config.as_ref())?;
            let source = read_nifti(&args.source)?;
            let reference = read_nifti(&args.reference)?;

            let (transform, report) = register(&source, &reference, &config)?;
            write_affine(&args.output, &transform)?;
            println!(
                "keypoints {}/{}  matches {}  inliers {}  mean residual {:.3}",
                report.keypoints_source,
                report.keypoints_reference,
                report.matches,
                report.inliers,
                report.mean_residual
            );

            if let Some(resampled) = &args.resampled {
                let warped =
                    warp_volume(&source, &transform, reference.dims(), reference.spacing())?;
                write_nifti(resampled, &warped)?;
            }
            Ok(())
        }
        Commands::Keypoints(args) => {
            let config = load_config(args.config.as_ref())?;
            let volume = read_nifti(&args.volume)?;

            let features = extract_features(&volume, &config)?;
            let hist_len = features.descriptors.first().map_or(0, |d| d.hist.len());
            println!(
                "keypoints {}  descriptors {}  histogram length {}",
                features.keypoints.len(),
                features.descriptors.len(),
                hist_len
            );
            Ok(())
        }
        Commands::Warp(args) => {
            let volume = read_nifti(&args.volume)?;
            let transform = read_affine(&args.transform)?;

            let warped = warp_volume(&volume, &transform, volume.dims(), volume.spacing())?;
            write_nifti(&args.output, &warped)?;
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RegistrationConfig, Error> {
    match path {
        Some(p) => RegistrationConfig::from_toml_file(p),
        None => Ok(RegistrationConfig::default()),
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use eigenface_core::{preprocess, projector, GrayBuffer, RecognizerModel};
use image::GrayImage;
use std::path::{Path, PathBuf};

mod config;
mod store;

use config::Config;
use store::Gallery;

#[derive(Parser)]
#[command(name = "eigenface", about = "Eigenface recognition over a gallery of crops")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gallery directory (overrides config and EIGENFACE_GALLERY_DIR)
    #[arg(short, long, global = true)]
    gallery: Option<PathBuf>,

    /// Distance threshold; 0 or below never rejects
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    threshold: Option<f64>,

    /// Maximum number of eigen-images; 0 uses all
    #[arg(short = 'k', long, global = true)]
    max_components: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an image to the gallery under a label
    Enroll {
        /// Label for this sample (e.g., a person's name)
        #[arg(short, long)]
        label: String,
        image: PathBuf,
    },
    /// Recognize an image against the gallery
    Recognize {
        image: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the eigenspace distance to every gallery sample
    Distances { image: PathBuf },
    /// Write the eigenspace reconstruction of an image
    Reconstruct {
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the mean image and every eigen-image
    Eigenfaces {
        #[arg(short, long)]
        output_dir: PathBuf,
    },
    /// List gallery samples
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.gallery {
        config.gallery_dir = dir;
    }
    if let Some(threshold) = cli.threshold {
        config.recognizer.distance_threshold = threshold;
    }
    if let Some(k) = cli.max_components {
        config.recognizer.max_components = k;
    }

    let mut gallery = Gallery::open(&config.gallery_dir)?;

    match cli.command {
        Commands::Enroll { label, image } => {
            let crop = preprocess::prepare_luma(&load(&image)?, &config.preprocess);
            gallery.add(&crop, &label)?;
            println!(
                "Enrolled {} as \"{}\" ({} samples)",
                image.display(),
                label.trim(),
                gallery.len()
            );
        }
        Commands::Recognize { image, json } => {
            let model = train(&gallery, &config)?;
            let query = prepare(&image, &config)?;
            let best = model.nearest(&query)?;
            let recognition = best.clone().into_recognition(model.threshold());
            if json {
                let out = serde_json::json!({
                    "result": recognition,
                    "nearest": best,
                    "threshold": model.threshold(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{recognition} (nearest: {} at {:.2})", best.label, best.distance);
            }
        }
        Commands::Distances { image } => {
            let model = train(&gallery, &config)?;
            let query = prepare(&image, &config)?;
            let distances = model.distances_to(&query)?;
            for ((i, label), distance) in model.labels().enumerate().zip(distances) {
                println!("{:>4}  {:<20} {:.2}", i + 1, label, distance);
            }
            let residual = projector::reconstruction_error(&query, model.eigenspace())?;
            println!("distance from eigenspace: {residual:.2}");
        }
        Commands::Reconstruct { image, output } => {
            let model = train(&gallery, &config)?;
            let query = prepare(&image, &config)?;
            let coeffs = model.project(&query)?;
            let rebuilt = projector::reconstruct(&coeffs, model.eigenspace())?;
            save(&rebuilt, rebuilt.to_luma(), &output)?;
            println!("Wrote {}", output.display());
        }
        Commands::Eigenfaces { output_dir } => {
            let model = train(&gallery, &config)?;
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("creating {}", output_dir.display()))?;

            let space = model.eigenspace();
            save(space.mean(), space.mean().to_luma(), &output_dir.join("mean.png"))?;
            let kept = space.basis().iter().zip(space.eigenvalues());
            for (i, (basis, &eigenvalue)) in kept.enumerate() {
                if eigenvalue <= 0.0 {
                    continue;
                }
                let path = output_dir.join(format!("eigenface{:03}.png", i + 1));
                save(basis, basis.to_luma_normalized(), &path)?;
            }
            println!(
                "Wrote mean and {} eigenfaces to {}",
                space.significant_components(),
                output_dir.display()
            );
        }
        Commands::List => {
            if gallery.is_empty() {
                println!("No samples enrolled in {}", gallery.dir().display());
            }
            for (i, label) in gallery.labels().iter().enumerate() {
                println!("{:>4}  {}", i + 1, label);
            }
        }
    }

    Ok(())
}

/// Rebuild the model from the whole gallery.
fn train(gallery: &Gallery, config: &Config) -> Result<RecognizerModel> {
    if gallery.is_empty() {
        bail!(
            "gallery {} is empty; enroll at least one sample first",
            gallery.dir().display()
        );
    }
    let samples = gallery.samples()?;
    let model = RecognizerModel::train_samples(&samples, &config.recognizer)
        .context("training recognizer")?;
    Ok(model)
}

fn load(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("loading {}", path.display()))
}

fn prepare(path: &Path, config: &Config) -> Result<GrayBuffer> {
    Ok(preprocess::prepare(&load(path)?, &config.preprocess))
}

fn save(buffer: &GrayBuffer, pixels: Vec<u8>, path: &Path) -> Result<()> {
    let img = GrayImage::from_raw(buffer.width(), buffer.height(), pixels)
        .context("pixel buffer does not match image size")?;
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))
}

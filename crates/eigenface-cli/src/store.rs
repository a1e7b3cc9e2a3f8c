//! On-disk gallery of training crops.
//!
//! Layout: `TrainedLabels.txt` holds `N%label1%label2%…%`, and sample `i`
//! (1-based) is stored as `face{i}.bmp` next to it.

use anyhow::{bail, ensure, Context, Result};
use eigenface_core::{GrayBuffer, TrainingImage};
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};

const LABEL_FILE: &str = "TrainedLabels.txt";
const DELIMITER: char = '%';

pub struct Gallery {
    dir: PathBuf,
    labels: Vec<String>,
}

impl Gallery {
    /// Open the gallery in `dir`. A missing directory or label file is an
    /// empty gallery.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(LABEL_FILE);
        let labels = match fs::read_to_string(&path) {
            Ok(text) => parse_labels(&text)
                .with_context(|| format!("malformed label file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        tracing::debug!(dir = %dir.display(), samples = labels.len(), "gallery opened");
        Ok(Self { dir, labels })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn image_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("face{}.bmp", index + 1))
    }

    /// Append a crop under `label` and rewrite the label file.
    pub fn add(&mut self, image: &GrayImage, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            bail!("label must not be empty");
        }
        if label.contains(DELIMITER) {
            bail!("label must not contain '{DELIMITER}'");
        }
        if let Some(first) = self.samples_dimensions()? {
            ensure!(
                image.dimensions() == first,
                "crop is {}x{}, gallery holds {}x{} images",
                image.width(),
                image.height(),
                first.0,
                first.1
            );
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let path = self.image_path(self.labels.len());
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;

        let mut labels = self.labels.clone();
        labels.push(label.to_string());
        let label_path = self.dir.join(LABEL_FILE);
        if let Err(e) = fs::write(&label_path, format_labels(&labels)) {
            // No label refers to the crop yet.
            let _ = fs::remove_file(&path);
            return Err(e).with_context(|| format!("writing {}", label_path.display()));
        }
        self.labels = labels;

        tracing::info!(label, index = self.labels.len() - 1, "sample added");
        Ok(())
    }

    fn samples_dimensions(&self) -> Result<Option<(u32, u32)>> {
        if self.labels.is_empty() {
            return Ok(None);
        }
        let path = self.image_path(0);
        let dims = image::image_dimensions(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(dims))
    }

    /// Load every stored crop with its label, in enrollment order.
    pub fn samples(&self) -> Result<Vec<TrainingImage>> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| -> Result<TrainingImage> {
                let path = self.image_path(i);
                let img = image::open(&path)
                    .with_context(|| format!("loading {}", path.display()))?
                    .to_luma8();
                let buffer = GrayBuffer::from_luma(img.width(), img.height(), img.as_raw())?;
                Ok(TrainingImage::new(buffer, label.clone()))
            })
            .collect()
    }
}

fn parse_labels(text: &str) -> Result<Vec<String>> {
    let mut fields = text.trim_end().split(DELIMITER);
    let count: usize = fields
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .context("missing sample count")?;
    let labels: Vec<String> = fields.take(count).map(str::to_string).collect();
    ensure!(
        labels.len() == count,
        "label file declares {count} samples but lists {}",
        labels.len()
    );
    Ok(labels)
}

fn format_labels(labels: &[String]) -> String {
    let mut out = format!("{}{DELIMITER}", labels.len());
    for label in labels {
        out.push_str(label);
        out.push(DELIMITER);
    }
    out
}

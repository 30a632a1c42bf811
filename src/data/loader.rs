// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Loads a class-per-directory image collection:
//
//   root/
//     airplane/  0001.png 0002.png ...
//     bird/      0001.png ...
//
// Class directories are sorted by name, so label ids are stable
// across runs. Labels are never shown to the clustering network;
// they are only used to score clusters after training.
//
// Every image is decoded with the `image` crate, resized to a
// square `image_size`, converted to 1 (luma) or 3 (RGB) channels
// and stored channel-major in [0, 1].

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use std::{fs, path::{Path, PathBuf}};

use crate::data::dataset::ImageSample;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Loads labelled images from a directory tree.
pub struct ImageFolder {
    root:       PathBuf,
    image_size: usize,
    channels:   usize,
}

/// Everything read from an image folder
#[derive(Debug, Clone)]
pub struct LoadedImages {
    pub samples:     Vec<ImageSample>,
    pub class_names: Vec<String>,
}

impl ImageFolder {
    pub fn new(root: impl Into<PathBuf>, image_size: usize, channels: usize) -> Self {
        Self { root: root.into(), image_size, channels }
    }

    pub fn load_all(&self) -> Result<LoadedImages> {
        if self.channels != 1 && self.channels != 3 {
            bail!("channels must be 1 or 3, got {}", self.channels);
        }
        if self.image_size == 0 {
            bail!("image_size must be positive");
        }
        if !self.root.is_dir() {
            bail!("image folder '{}' does not exist or is not a directory", self.root.display());
        }

        let class_dirs = sorted_entries(&self.root, |p| p.is_dir())?;
        if class_dirs.is_empty() {
            bail!("no class directories under '{}'", self.root.display());
        }

        let mut samples     = Vec::new();
        let mut class_names = Vec::with_capacity(class_dirs.len());

        for (label, dir) in class_dirs.iter().enumerate() {
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            let files = sorted_entries(dir, is_image_file)?;
            tracing::debug!("Class '{}' (label {}): {} images", name, label, files.len());

            for file in files {
                samples.push(self.load_image(&file, label)?);
            }
            class_names.push(name);
        }

        tracing::info!(
            "Loaded {} images in {} classes from '{}'",
            samples.len(),
            class_names.len(),
            self.root.display()
        );
        Ok(LoadedImages { samples, class_names })
    }

    fn load_image(&self, path: &Path, label: usize) -> Result<ImageSample> {
        let img = image::open(path)
            .with_context(|| format!("cannot decode image '{}'", path.display()))?;
        let size = self.image_size as u32;
        let img = img.resize_exact(size, size, FilterType::Triangle);

        let pixels = to_chw(&img, self.channels);
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(ImageSample {
            pixels,
            shape: [self.channels, self.image_size, self.image_size],
            label,
            filename,
        })
    }
}

/// Interleaved HWC bytes → planar CHW floats in [0, 1]
fn to_chw(img: &DynamicImage, channels: usize) -> Vec<f32> {
    let raw: Vec<u8> = if channels == 1 {
        img.to_luma8().into_raw()
    } else {
        img.to_rgb8().into_raw()
    };
    let hw = raw.len() / channels;

    let mut out = vec![0.0f32; raw.len()];
    for (i, &byte) in raw.iter().enumerate() {
        let (pixel, channel) = (i / channels, i % channels);
        out[channel * hw + pixel] = byte as f32 / 255.0;
    }
    out
}

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Directory entries matching `keep`, sorted by path
pub(crate) fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("cannot read directory '{}'", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("cannot list entries of '{}'", dir.display()))?;
    let mut out: Vec<PathBuf> = entries
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| keep(p.as_path()))
        .collect();
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dc_loader_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_loads_sorted_classes_with_labels() {
        let root = temp_dir("classes");
        for (class, value) in [("b_dark", 0u8), ("a_bright", 255u8)] {
            fs::create_dir_all(root.join(class)).unwrap();
            for i in 0..2 {
                GrayImage::from_pixel(8, 8, Luma([value]))
                    .save(root.join(class).join(format!("{i}.png")))
                    .unwrap();
            }
        }
        fs::write(root.join("a_bright").join("notes.txt"), "ignored").unwrap();

        let loaded = ImageFolder::new(&root, 4, 1).load_all().unwrap();
        assert_eq!(loaded.class_names, vec!["a_bright", "b_dark"]);
        assert_eq!(loaded.samples.len(), 4);

        let first = &loaded.samples[0];
        assert_eq!(first.label, 0);
        assert_eq!(first.shape, [1, 4, 4]);
        assert!(first.pixels.iter().all(|&p| p > 0.99));
        assert!(loaded.samples[3].pixels.iter().all(|&p| p < 0.01));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_rgb_is_channel_major() {
        let root = temp_dir("rgb");
        fs::create_dir_all(root.join("red")).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]))
            .save(root.join("red").join("r.png"))
            .unwrap();

        let loaded = ImageFolder::new(&root, 2, 3).load_all().unwrap();
        let px = &loaded.samples[0].pixels;
        // first plane is red, then green, then blue
        assert!(px[0..4].iter().all(|&p| p > 0.99));
        assert!(px[4..12].iter().all(|&p| p < 0.01));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_folder_is_an_error() {
        let err = ImageFolder::new("/definitely/not/here", 8, 1).load_all();
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_channel_count_is_an_error() {
        let root = temp_dir("channels");
        assert!(ImageFolder::new(&root, 8, 2).load_all().is_err());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_sorted_entries_filters_and_reports_unreadable_dirs() {
        let root = temp_dir("entries");
        for name in ["b.png", "a.jpg", "notes.txt"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir_all(root.join("c.png")).unwrap();

        let entries = sorted_entries(&root, is_image_file).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);

        let err = sorted_entries(&root.join("notes.txt"), |_| true).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));

        fs::remove_dir_all(&root).ok();
    }
}

// ============================================================
// Layer 4 — Medical Image Segmentation Datasets
// ============================================================
// Paired image/ground-truth slices stored as PNG files:
//
//   root/<folder_name>/<mode>/<subfolder>/<stem>.png
//
//   e.g. root/PROSTATE/train/img/Case00_0_12.png
//        root/PROSTATE/train/gt/Case00_0_12.png
//
// Every subfolder must contain exactly the same file stems; item
// i is the i-th stem (sorted) read from every subfolder in order.
//
// Slices belong to patients (groups). The group id is extracted
// from the file name with a per-dataset regex, so that callers can
// split or sample by patient rather than by slice.
//
// The archives are expected to be extracted already; a missing
// folder is reported, never downloaded.

use anyhow::{bail, Context, Result};
use burn::data::dataset::Dataset;
use image::GrayImage;
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::data::loader::{is_image_file, sorted_entries};

/// Where a dataset lives and how its patients are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationPreset {
    pub name:          &'static str,
    pub folder_name:   &'static str,
    pub zip_name:      &'static str,
    pub group_pattern: &'static str,
}

impl SegmentationPreset {
    pub const PROSTATE: Self = Self {
        name:          "prostate",
        folder_name:   "PROSTATE",
        zip_name:      "PROSTATE.zip",
        group_pattern: r"Case\d+",
    };

    pub const ACDC: Self = Self {
        name:          "acdc",
        folder_name:   "ACDC-all",
        zip_name:      "ACDC-all.zip",
        group_pattern: r"patient\d+_\d+",
    };
}

impl FromStr for SegmentationPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "prostate" => Ok(Self::PROSTATE),
            "acdc" => Ok(Self::ACDC),
            other => bail!("unknown segmentation dataset '{other}' (expected prostate or acdc)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    Train,
    Val,
}

impl SplitMode {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for SplitMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            other => bail!("unknown mode '{other}' (expected train or val)"),
        }
    }
}

/// One slice: an image per subfolder (same order as `subfolders`).
#[derive(Debug, Clone)]
pub struct SegmentationSample {
    pub images:   Vec<GrayImage>,
    pub filename: String,
}

pub struct MedicalImageSegmentationDataset {
    preset:     SegmentationPreset,
    mode:       SplitMode,
    root:       PathBuf,
    subfolders: Vec<String>,
    stems:      Vec<String>,
    extensions: Vec<Vec<String>>,
    groups:     Vec<String>,
}

impl MedicalImageSegmentationDataset {
    pub fn new(
        root_dir:   impl AsRef<Path>,
        preset:     SegmentationPreset,
        mode:       SplitMode,
        subfolders: &[&str],
    ) -> Result<Self> {
        if subfolders.is_empty() {
            bail!("at least one subfolder is required");
        }

        let dataset_dir = root_dir.as_ref().join(preset.folder_name);
        if !dataset_dir.is_dir() {
            bail!(
                "dataset folder '{}' not found; extract {} under '{}' first",
                dataset_dir.display(),
                preset.zip_name,
                root_dir.as_ref().display()
            );
        }
        let root = dataset_dir.join(mode.dir_name());

        // ── List every subfolder ──────────────────────────────────────────────
        let mut listings: Vec<Vec<(String, String)>> = Vec::with_capacity(subfolders.len());
        for sub in subfolders {
            let dir = root.join(sub);
            if !dir.is_dir() {
                bail!("subfolder '{}' not found", dir.display());
            }
            let entries = sorted_entries(&dir, is_image_file)?
                .into_iter()
                .filter_map(|p| {
                    let stem = p.file_stem()?.to_str()?.to_string();
                    let ext = p.extension()?.to_str()?.to_string();
                    Some((stem, ext))
                })
                .collect();
            listings.push(entries);
        }

        // ── All subfolders must agree on their stems ──────────────────────────
        let stems: Vec<String> = listings[0].iter().map(|(s, _)| s.clone()).collect();
        for (sub, listing) in subfolders.iter().zip(&listings).skip(1) {
            if listing.len() != stems.len() {
                bail!(
                    "subfolder '{}' has {} files but '{}' has {}",
                    sub,
                    listing.len(),
                    subfolders[0],
                    stems.len()
                );
            }
            if let Some(((other, _), stem)) =
                listing.iter().zip(&stems).find(|((other, _), stem)| other != *stem)
            {
                bail!("file '{other}' in '{sub}' does not match '{stem}' in '{}'", subfolders[0]);
            }
        }

        let extensions: Vec<Vec<String>> = listings
            .iter()
            .map(|l| l.iter().map(|(_, e)| e.clone()).collect())
            .collect();

        // ── Patient ids ───────────────────────────────────────────────────────
        let pattern = Regex::new(preset.group_pattern)
            .with_context(|| format!("invalid group pattern '{}'", preset.group_pattern))?;
        let groups = stems
            .iter()
            .map(|stem| {
                pattern
                    .find(stem)
                    .map(|m| m.as_str().to_string())
                    .with_context(|| {
                        format!("file '{stem}' does not match group pattern '{}'", preset.group_pattern)
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "{} {} set: {} slices, {} groups",
            preset.folder_name,
            mode,
            stems.len(),
            groups.iter().collect::<BTreeSet<_>>().len()
        );

        Ok(Self {
            preset,
            mode,
            root,
            subfolders: subfolders.iter().map(|s| s.to_string()).collect(),
            stems,
            extensions,
            groups,
        })
    }

    pub fn preset(&self) -> SegmentationPreset { self.preset }

    pub fn mode(&self) -> SplitMode { self.mode }

    /// File stems shared by every subfolder, in index order
    pub fn filenames(&self) -> &[String] { &self.stems }

    /// Sorted unique group (patient) ids
    pub fn group_list(&self) -> Vec<String> {
        self.groups
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Group id → indices of its slices
    pub fn group_indices(&self) -> BTreeMap<String, Vec<usize>> {
        let mut out: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, g) in self.groups.iter().enumerate() {
            out.entry(g.clone()).or_default().push(i);
        }
        out
    }

    /// Read slice `index` from every subfolder.
    pub fn load(&self, index: usize) -> Result<SegmentationSample> {
        let Some(stem) = self.stems.get(index) else {
            bail!("index {index} out of range for {} slices", self.stems.len());
        };

        let images = self
            .subfolders
            .iter()
            .zip(&self.extensions)
            .map(|(sub, exts)| {
                let path = self.root.join(sub).join(format!("{stem}.{}", exts[index]));
                image::open(&path)
                    .map(|img| img.to_luma8())
                    .with_context(|| format!("cannot read '{}'", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SegmentationSample { images, filename: stem.clone() })
    }
}

impl Dataset<SegmentationSample> for MedicalImageSegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationSample> {
        match self.load(index) {
            Ok(sample) => Some(sample),
            Err(e) => {
                tracing::warn!("skipping slice {index}: {e:#}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.stems.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::fs;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dc_seg_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_slices(root: &Path, preset: SegmentationPreset, mode: &str, stems: &[&str]) {
        for (sub, value) in [("img", 100u8), ("gt", 1u8)] {
            let dir = root.join(preset.folder_name).join(mode).join(sub);
            fs::create_dir_all(&dir).unwrap();
            for stem in stems {
                GrayImage::from_pixel(4, 4, Luma([value]))
                    .save(dir.join(format!("{stem}.png")))
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_prostate_groups_and_items() {
        let root = temp_root("prostate");
        let p = SegmentationPreset::PROSTATE;
        write_slices(&root, p, "train", &["Case00_0_1", "Case00_0_2", "Case03_0_1"]);

        let ds = MedicalImageSegmentationDataset::new(&root, p, SplitMode::Train, &["img", "gt"])
            .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.group_list(), vec!["Case00", "Case03"]);
        assert_eq!(ds.group_indices()["Case00"], vec![0, 1]);

        for i in 0..ds.len() {
            let sample = ds.get(i).unwrap();
            assert_eq!(sample.images.len(), 2);
            assert_eq!(sample.images[0].get_pixel(0, 0)[0], 100);
            assert_eq!(sample.images[1].get_pixel(0, 0)[0], 1);
        }
        assert!(ds.get(3).is_none());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_acdc_group_pattern() {
        let root = temp_root("acdc");
        let p = SegmentationPreset::ACDC;
        write_slices(&root, p, "val", &["patient001_01_0_1", "patient001_01_0_2", "patient002_12_0_1"]);

        let ds = MedicalImageSegmentationDataset::new(&root, p, SplitMode::Val, &["img", "gt"])
            .unwrap();
        assert_eq!(ds.group_list(), vec!["patient001_01", "patient002_12"]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_dataset_is_not_downloaded() {
        let root = temp_root("missing");
        let err = MedicalImageSegmentationDataset::new(
            &root,
            SegmentationPreset::PROSTATE,
            SplitMode::Train,
            &["img", "gt"],
        );
        assert!(err.is_err());
        assert!(!root.join("PROSTATE.zip").exists());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_mismatched_subfolders_are_rejected() {
        let root = temp_root("mismatch");
        let p = SegmentationPreset::PROSTATE;
        write_slices(&root, p, "train", &["Case00_0_1"]);
        GrayImage::new(4, 4)
            .save(root.join("PROSTATE/train/img/Case01_0_1.png"))
            .unwrap();

        let err = MedicalImageSegmentationDataset::new(&root, p, SplitMode::Train, &["img", "gt"]);
        assert!(err.is_err());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_parse_preset_and_mode() {
        assert_eq!("Prostate".parse::<SegmentationPreset>().unwrap(), SegmentationPreset::PROSTATE);
        assert_eq!("acdc".parse::<SegmentationPreset>().unwrap(), SegmentationPreset::ACDC);
        assert!("mnist".parse::<SegmentationPreset>().is_err());
        assert_eq!("val".parse::<SplitMode>().unwrap(), SplitMode::Val);
    }
}

// ============================================================
// Layer 2 — DatasetUseCase
// ============================================================
// Opens a segmentation dataset and summarises it: number of
// slices, patient groups and slices per group. Reading the first
// slice confirms that the files actually decode.

use anyhow::Result;
use burn::data::dataset::Dataset;
use std::collections::BTreeMap;

use crate::data::segmentation::{MedicalImageSegmentationDataset, SegmentationPreset, SplitMode};

/// Subfolders used when none are given: image and ground truth
pub const DEFAULT_SUBFOLDERS: &[&str] = &["img", "gt"];

#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub name:        String,
    pub mode:        SplitMode,
    pub slices:      usize,
    /// group id → number of slices
    pub groups:      BTreeMap<String, usize>,
    /// Stem of the first slice
    pub first_slice: Option<String>,
    /// Width × height of the first slice per subfolder
    pub first_shape: Vec<(u32, u32)>,
}

pub struct DatasetUseCase {
    root:       String,
    preset:     SegmentationPreset,
    mode:       SplitMode,
    subfolders: Vec<String>,
}

impl DatasetUseCase {
    pub fn new(root: String, preset: SegmentationPreset, mode: SplitMode, subfolders: Vec<String>) -> Self {
        let subfolders = if subfolders.is_empty() {
            DEFAULT_SUBFOLDERS.iter().map(|s| s.to_string()).collect()
        } else {
            subfolders
        };
        Self { root, preset, mode, subfolders }
    }

    pub fn execute(&self) -> Result<DatasetReport> {
        let subfolders: Vec<&str> = self.subfolders.iter().map(String::as_str).collect();
        let dataset = MedicalImageSegmentationDataset::new(&self.root, self.preset, self.mode, &subfolders)?;

        let groups = dataset
            .group_indices()
            .into_iter()
            .map(|(group, indices)| (group, indices.len()))
            .collect();

        let first_shape = if dataset.is_empty() {
            Vec::new()
        } else {
            dataset.load(0)?.images.iter().map(|img| img.dimensions()).collect()
        };

        Ok(DatasetReport {
            name: dataset.preset().folder_name.to_string(),
            mode: dataset.mode(),
            slices: dataset.len(),
            groups,
            first_slice: dataset.filenames().first().cloned(),
            first_shape,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::fs;

    #[test]
    fn test_report_counts_slices_per_patient() {
        let root = std::env::temp_dir().join(format!("dc_dataset_uc_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        for sub in DEFAULT_SUBFOLDERS {
            let dir = root.join("ACDC-all").join("val").join(sub);
            fs::create_dir_all(&dir).unwrap();
            for stem in ["patient001_01_0_1", "patient001_01_0_2", "patient002_12_0_1"] {
                GrayImage::from_pixel(6, 5, Luma([9u8]))
                    .save(dir.join(format!("{stem}.png")))
                    .unwrap();
            }
        }

        let report = DatasetUseCase::new(
            root.to_string_lossy().into_owned(),
            SegmentationPreset::ACDC,
            SplitMode::Val,
            Vec::new(),
        )
        .execute()
        .unwrap();

        assert_eq!(report.slices, 3);
        assert_eq!(report.groups["patient001_01"], 2);
        assert_eq!(report.groups["patient002_12"], 1);
        assert_eq!(report.mode, SplitMode::Val);
        assert_eq!(report.first_slice.as_deref(), Some("patient001_01_0_1"));
        assert_eq!(report.first_shape, vec![(6, 5), (6, 5)]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_dataset_folder_is_reported() {
        let root = std::env::temp_dir().join(format!("dc_dataset_uc_missing_{}", std::process::id()));
        let result = DatasetUseCase::new(
            root.to_string_lossy().into_owned(),
            SegmentationPreset::PROSTATE,
            SplitMode::Train,
            Vec::new(),
        )
        .execute();
        assert!(result.is_err());
    }
}

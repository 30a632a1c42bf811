use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One decoded image with its (evaluation-only) class label.
/// Pixels are channel-major (CHW) in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub pixels:   Vec<f32>,
    /// [channels, height, width]
    pub shape:    [usize; 3],
    pub label:    usize,
    pub filename: String,
}

impl ImageSample {
    pub fn channels(&self) -> usize { self.shape[0] }

    pub fn height(&self) -> usize { self.shape[1] }

    pub fn width(&self) -> usize { self.shape[2] }

    pub fn numel(&self) -> usize { self.shape.iter().product() }
}

pub struct ClusterDataset {
    samples: Vec<ImageSample>,
}

impl ClusterDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

impl Dataset<ImageSample> for ClusterDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: usize) -> ImageSample {
        ImageSample {
            pixels:   vec![0.5; 2 * 3 * 4],
            shape:    [2, 3, 4],
            label,
            filename: format!("img_{label}.png"),
        }
    }

    #[test]
    fn test_dataset_get_and_len() {
        let ds = ClusterDataset::new(vec![sample(0), sample(1)]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).map(|s| s.label), Some(1));
        assert!(ds.get(2).is_none());
        assert_eq!(ds.labels(), vec![0, 1]);
    }

    #[test]
    fn test_sample_shape_accessors() {
        let s = sample(0);
        assert_eq!((s.channels(), s.height(), s.width()), (2, 3, 4));
        assert_eq!(s.numel(), s.pixels.len());
    }
}

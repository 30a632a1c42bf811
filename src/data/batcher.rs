// ============================================================
// Layer 4 — Clustering Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ImageSample>
// into the tensors a clustering step needs:
//
//   images    [N, C, H, W]   original views
//   images_tf [N, C, H, W]   augmented views (same order)
//   labels    [N]            ground truth, evaluation only
//
// Augmentation happens here, per batch, so every epoch sees a
// fresh perturbation of every image.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::{augment::Augmenter, dataset::ImageSample};

/// A batch of images and their perturbed copies.
#[derive(Debug, Clone)]
pub struct ClusterBatch<B: Backend> {
    pub images:    Tensor<B, 4>,
    pub images_tf: Tensor<B, 4>,
    pub labels:    Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ClusterBatcher<B: Backend> {
    pub device: B::Device,
    augmenter:  Augmenter,
}

impl<B: Backend> ClusterBatcher<B> {
    pub fn new(device: B::Device, augmenter: Augmenter) -> Self {
        Self { device, augmenter }
    }
}

impl<B: Backend> Batcher<ImageSample, ClusterBatch<B>> for ClusterBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ClusterBatch<B> {
        let batch_size = items.len();
        // All samples of a dataset share one shape
        let [c, h, w] = items[0].shape;

        let mut rng = rand::thread_rng();

        let images_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.pixels.iter().copied())
            .collect();

        let images_tf_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| self.augmenter.augment(s, &mut rng))
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_flat, [batch_size, c, h, w]),
            &self.device,
        );
        let images_tf = Tensor::<B, 4>::from_floats(
            TensorData::new(images_tf_flat, [batch_size, c, h, w]),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ClusterBatch { images, images_tf, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::augment::AugmentConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(value: f32, label: usize) -> ImageSample {
        ImageSample {
            pixels:   vec![value; 1 * 4 * 4],
            shape:    [1, 4, 4],
            label,
            filename: format!("{label}.png"),
        }
    }

    #[test]
    fn test_batch_shapes_and_labels() {
        let batcher = ClusterBatcher::<TestBackend>::new(
            Default::default(),
            Augmenter::new(AugmentConfig::default()),
        );
        let batch = batcher.batch(vec![sample(0.2, 3), sample(0.8, 1)]);

        assert_eq!(batch.images.dims(), [2, 1, 4, 4]);
        assert_eq!(batch.images_tf.dims(), [2, 1, 4, 4]);
        let labels: Vec<i64> = batch.labels.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![3, 1]);
    }

    #[test]
    fn test_identity_augmentation_copies_images() {
        let batcher = ClusterBatcher::<TestBackend>::new(
            Default::default(),
            Augmenter::new(AugmentConfig::identity()),
        );
        let batch = batcher.batch(vec![sample(0.25, 0)]);
        let a: Vec<f32> = batch.images.into_data().convert::<f32>().to_vec().unwrap();
        let b: Vec<f32> = batch.images_tf.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(a, b);
    }
}

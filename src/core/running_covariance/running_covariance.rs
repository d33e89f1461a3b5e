use crate::core::error::ReducerError;
use crate::core::layout::{EventNdims, LeafLayout};
use crate::core::running_covariance::chunk::ChunkMoments;
use ndarray::{Array3, ArrayD, ArrayView2};
use serde::{Deserialize, Serialize};

/// Which second moment a running accumulator tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Moment {
    /// Full outer product over the event dimensions.
    Covariance,
    /// Elementwise squares only; no cross terms.
    Variance,
}

impl Moment {
    /// Per-batch product of two `(batch, event)` blocks: an outer product
    /// over the event axis for covariance, an elementwise product for
    /// variance.
    fn cross(self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> ArrayD<f64> {
        match self {
            Moment::Covariance => {
                let (batch, event) = a.dim();
                Array3::from_shape_fn((batch, event, event), |(i, j, k)| a[[i, j]] * b[[i, k]])
                    .into_dyn()
            }
            Moment::Variance => (&a * &b).into_dyn(),
        }
    }
}

/// Streaming mean and sum of squared deviations for one leaf.
///
/// Uses Welford's update for single observations and the Chan–Golub–LeVeque
/// combination for chunks, so the result does not depend on how the samples
/// were split into calls. Values are never mutated in place: every update
/// returns a new accumulator and leaves `self` untouched.
///
/// Shapes are fixed by the [`LeafLayout`] at construction:
/// - `mean`: `batch_shape + event_shape`
/// - `sum_sq_dev`: `batch_shape + event_shape + event_shape` for
///   [`Moment::Covariance`], `batch_shape + event_shape` for
///   [`Moment::Variance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningCovariance {
    layout: LeafLayout,
    moment: Moment,
    num_samples: f64,
    mean: ArrayD<f64>,
    sum_sq_dev: ArrayD<f64>,
}

impl RunningCovariance {
    pub fn from_layout(layout: LeafLayout, moment: Moment) -> Self {
        let sum_sq_dev_shape = match moment {
            Moment::Covariance => layout.covariance_shape(),
            Moment::Variance => layout.shape(),
        };
        Self {
            mean: ArrayD::zeros(layout.shape()),
            sum_sq_dev: ArrayD::zeros(sum_sq_dev_shape),
            num_samples: 0.0,
            layout,
            moment,
        }
    }

    pub fn from_shape(
        shape: &[usize],
        event_ndims: EventNdims,
        moment: Moment,
    ) -> Result<Self, ReducerError> {
        Ok(Self::from_layout(LeafLayout::partition(shape, event_ndims)?, moment))
    }

    pub fn layout(&self) -> &LeafLayout {
        &self.layout
    }

    pub fn moment(&self) -> Moment {
        self.moment
    }

    pub fn num_samples(&self) -> f64 {
        self.num_samples
    }

    pub fn mean(&self) -> &ArrayD<f64> {
        &self.mean
    }

    pub fn sum_sq_dev(&self) -> &ArrayD<f64> {
        &self.sum_sq_dev
    }

    /// Absorbs one observation shaped like the template.
    pub fn update(&self, observation: &ArrayD<f64>) -> Result<Self, ReducerError> {
        self.layout.check_observation(observation.shape())?;
        let flat = (self.layout.batch_size(), self.layout.event_size());
        let x = observation.to_shape(flat)?;
        let mean = self.mean.to_shape(flat)?;

        let num_samples = self.num_samples + 1.0;
        let delta = &x - &mean;
        let new_mean = &mean + &(&delta / num_samples);
        let delta_post = &x - &new_mean;
        let increment = self
            .moment
            .cross(delta.view(), delta_post.view())
            .into_shape_with_order(self.sum_sq_dev.raw_dim())?;

        Ok(Self {
            layout: self.layout.clone(),
            moment: self.moment,
            num_samples,
            mean: new_mean.into_shape_with_order(self.mean.raw_dim())?,
            sum_sq_dev: &self.sum_sq_dev + &increment,
        })
    }

    /// Absorbs a chunk of observations stacked along `axis`.
    ///
    /// The chunk shape is the template shape with one extra dimension
    /// inserted at `axis`, and `axis` may not exceed the batch rank. An empty
    /// chunk returns an unchanged copy.
    pub fn update_chunk(&self, chunk: &ArrayD<f64>, axis: usize) -> Result<Self, ReducerError> {
        let (order, len) = self.layout.chunk_order(chunk.shape(), axis)?;
        let block = chunk.view().permuted_axes(order);
        let block = block.to_shape((self.layout.batch_size(), len, self.layout.event_size()))?;

        match ChunkMoments::from_chunk(block.view(), self.moment) {
            Some(moments) => self.combine(moments),
            None => Ok(self.clone()),
        }
    }

    fn combine(&self, chunk: ChunkMoments) -> Result<Self, ReducerError> {
        let flat = (self.layout.batch_size(), self.layout.event_size());
        let mean = self.mean.to_shape(flat)?;

        let num_samples = self.num_samples + chunk.num_samples;
        let delta = &chunk.mean - &mean;
        let new_mean = &mean + &(&delta * chunk.num_samples / num_samples);
        let correction = self.moment.cross(delta.view(), delta.view())
            * (self.num_samples * chunk.num_samples / num_samples);

        let chunk_sum_sq_dev = chunk
            .sum_sq_dev
            .into_shape_with_order(self.sum_sq_dev.raw_dim())?;
        let correction = correction.into_shape_with_order(self.sum_sq_dev.raw_dim())?;

        Ok(Self {
            layout: self.layout.clone(),
            moment: self.moment,
            num_samples,
            mean: new_mean.into_shape_with_order(self.mean.raw_dim())?,
            sum_sq_dev: &(&self.sum_sq_dev + &chunk_sum_sq_dev) + &correction,
        })
    }

    /// `sum_sq_dev / (num_samples - ddof)`.
    ///
    /// With `num_samples <= ddof` the division follows IEEE semantics, so the
    /// result holds infinities or NaNs rather than failing.
    pub fn finalize(&self, ddof: usize) -> ArrayD<f64> {
        &self.sum_sq_dev / (self.num_samples - ddof as f64)
    }
}

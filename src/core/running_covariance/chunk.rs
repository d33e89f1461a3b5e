use crate::core::running_covariance::Moment;
use ndarray::{Array2, Array3, ArrayD, ArrayView3, Axis};

/// Sufficient statistics of one chunk of observations, in flattened
/// `(batch, event)` form, ready to be combined with a running state.
#[derive(Debug, Clone)]
pub(crate) struct ChunkMoments {
    pub(super) num_samples: f64,
    pub(super) mean: Array2<f64>,
    /// `(batch, event, event)` for covariance, `(batch, event)` for variance.
    pub(super) sum_sq_dev: ArrayD<f64>,
}

impl ChunkMoments {
    /// Reduces a `(batch, chunk, event)` block along the chunk axis.
    ///
    /// Returns `None` for an empty chunk.
    pub(crate) fn from_chunk(chunk: ArrayView3<'_, f64>, moment: Moment) -> Option<Self> {
        let (batch, len, event) = chunk.dim();
        let mean = chunk.mean_axis(Axis(1))?;
        let centered = &chunk - &mean.view().insert_axis(Axis(1));

        let sum_sq_dev = match moment {
            Moment::Covariance => Array3::from_shape_fn((batch, event, event), |(i, j, k)| {
                sum_of_products(&centered, i, j, k)
            })
            .into_dyn(),
            Moment::Variance => {
                Array2::from_shape_fn((batch, event), |(i, j)| sum_of_products(&centered, i, j, j))
                    .into_dyn()
            }
        };

        Some(Self {
            num_samples: len as f64,
            mean,
            sum_sq_dev,
        })
    }
}

// Both moments reduce through this fold so a zero-event covariance and a
// variance see the same rounding.
#[inline]
fn sum_of_products(centered: &Array3<f64>, batch: usize, j: usize, k: usize) -> f64 {
    centered
        .index_axis(Axis(0), batch)
        .outer_iter()
        .fold(0.0, |acc, row| acc + row[j] * row[k])
}

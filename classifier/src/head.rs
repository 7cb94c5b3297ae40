// Copyright 2023 Xayn AG
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use serde::{Deserialize, Serialize};

use crate::metrics::{binary_cross_entropy, THRESHOLD};

/// Computes the logistic sigmoid without overflowing for large magnitudes.
pub fn sigmoid(logit: f32) -> f32 {
    if logit >= 0. {
        1. / (1. + (-logit).exp())
    } else {
        let exp = logit.exp();
        exp / (1. + exp)
    }
}

/// Glorot-Uniform initializer.
///
/// Weights of a layer with `n_in` inputs and `n_out` outputs are sampled from:
///
/// ```ascii
/// W ~ U(-l, l) with l = sqrt(6 / (n_in + n_out))
/// ```
///
/// Source:
///
/// - [Pdf](https://proceedings.mlr.press/v9/glorot10a/glorot10a.pdf)
#[allow(clippy::cast_precision_loss)] // our integers are small enough
pub fn glorot_uniform_weights_init(
    rng: &mut (impl Rng + ?Sized),
    n_in: usize,
    n_out: usize,
) -> Array1<f32> {
    // Avoids an empty sampling range which can only happen without any units.
    if n_in + n_out == 0 {
        return Array1::default(n_in);
    }

    let limit = (6. / (n_in + n_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array1::from_shape_simple_fn(n_in, || dist.sample(rng))
}

/// The gradients of the mean binary cross-entropy wrt. the head parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub loss: f32,
    pub weights: Array1<f32>,
    pub bias: f32,
}

/// A binary classification head.
///
/// Maps the class token embedding of a sequence with a single affine unit to a logit and
/// squashes it with a sigmoid into the probability of the positive class.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClassificationHead {
    pub(crate) weights: Array1<f32>,
    pub(crate) bias: f32,
}

impl ClassificationHead {
    /// Creates a randomly initialized head.
    pub fn new(embedding_size: usize, rng: &mut (impl Rng + ?Sized)) -> Self {
        Self {
            weights: glorot_uniform_weights_init(rng, embedding_size, 1),
            bias: 0.,
        }
    }

    /// The size of the embeddings the head expects.
    pub fn embedding_size(&self) -> usize {
        self.weights.len()
    }

    /// Computes the logits of the features of shape `(batch_size, embedding_size)`.
    pub fn logits(&self, features: ArrayView2<'_, f32>) -> Array1<f32> {
        features.dot(&self.weights) + self.bias
    }

    /// Computes the probabilities of the positive class.
    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Array1<f32> {
        self.logits(features).mapv_into(sigmoid)
    }

    /// Classifies the features into the negative `0` and the positive `1` class.
    pub fn classify(&self, features: ArrayView2<'_, f32>) -> Vec<u8> {
        self.predict(features)
            .iter()
            .map(|&probability| u8::from(probability >= THRESHOLD))
            .collect()
    }

    /// Computes the loss and its gradients for a batch of features and binary labels.
    ///
    /// The gradient of the mean cross-entropy wrt. each logit is `(p - y) / n`.
    #[allow(clippy::cast_precision_loss)]
    pub fn gradients(
        &self,
        features: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, f32>,
    ) -> Gradients {
        let probabilities = self.predict(features);
        let loss = binary_cross_entropy(probabilities.view(), labels);
        if probabilities.is_empty() {
            return Gradients {
                loss,
                weights: Array1::zeros(self.weights.len()),
                bias: 0.,
            };
        }

        let errors = (probabilities - labels) / features.nrows() as f32;
        Gradients {
            loss,
            weights: features.t().dot(&errors),
            bias: errors.sum(),
        }
    }
}

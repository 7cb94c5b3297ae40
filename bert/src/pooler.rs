// Copyright 2021 Xayn AG
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

use derive_more::{Deref, From};
use ndarray::{s, Array2};

use crate::model::Prediction;

/// A batch of sequence embeddings.
///
/// The embedding is of shape `(batch_size, embedding_size)`.
#[derive(Clone, Debug, Deref, From, PartialEq)]
pub struct Embedding2(Array2<f32>);

impl Embedding2 {
    pub fn into_inner(self) -> Array2<f32> {
        self.0
    }
}

/// A first token pooling strategy.
///
/// The prediction is pooled over its first token, which is the class token of each sequence.
pub struct FirstPooler;

impl FirstPooler {
    /// Pools the prediction over its first token.
    pub fn pool(prediction: &Prediction) -> Embedding2 {
        prediction.slice(s![.., 0, ..]).to_owned().into()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr3, Array3};
    use xayn_test_utils::assert_approx_eq;

    use super::*;

    #[test]
    fn test_first() {
        let prediction = arr3(&[
            [[1., 2., 3.], [4., 5., 6.]],
            [[7., 8., 9.], [10., 11., 12.]],
        ]);
        let embedding = FirstPooler::pool(&prediction.into());
        assert_approx_eq!(f32, *embedding, [[1., 2., 3.], [7., 8., 9.]]);
    }

    #[test]
    fn test_first_empty_batch() {
        let prediction = Array3::<f32>::zeros((0, 4, 3));
        let embedding = FirstPooler::pool(&prediction.into());
        assert_eq!(embedding.shape(), [0, 3]);
    }
}

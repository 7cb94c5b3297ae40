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

use ndarray::ArrayView1;
use serde::Serialize;

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logarithms.
pub const EPSILON: f32 = 1e-7;

/// The decision threshold of the positive class.
pub const THRESHOLD: f32 = 0.5;

/// Computes the mean binary cross-entropy of the predicted probabilities.
///
/// Empty inputs have a loss of `0`.
#[allow(clippy::cast_precision_loss)]
pub fn binary_cross_entropy(
    probabilities: ArrayView1<'_, f32>,
    labels: ArrayView1<'_, f32>,
) -> f32 {
    if probabilities.is_empty() {
        return 0.;
    }

    let sum = probabilities
        .iter()
        .zip(labels)
        .map(|(probability, label)| {
            let probability = probability.clamp(EPSILON, 1. - EPSILON);
            -(label * probability.ln() + (1. - label) * (1. - probability).ln())
        })
        .sum::<f32>();

    sum / probabilities.len() as f32
}

/// Evaluation metrics of a binary classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub loss: f32,
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl Metrics {
    /// Evaluates the predicted probabilities against the binary labels.
    ///
    /// Undefined ratios, like the precision without any positive prediction, are `0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(probabilities: ArrayView1<'_, f32>, labels: ArrayView1<'_, f32>) -> Self {
        if probabilities.is_empty() {
            return Self::default();
        }

        let (mut true_positives, mut false_positives, mut false_negatives, mut correct) =
            (0_usize, 0_usize, 0_usize, 0_usize);
        for (&probability, &label) in probabilities.iter().zip(labels) {
            let predicted = probability >= THRESHOLD;
            let actual = label >= THRESHOLD;
            match (predicted, actual) {
                (true, true) => true_positives += 1,
                (true, false) => false_positives += 1,
                (false, true) => false_negatives += 1,
                (false, false) => {}
            }
            if predicted == actual {
                correct += 1;
            }
        }

        let ratio = |numerator: usize, denominator: usize| {
            if denominator == 0 {
                0.
            } else {
                numerator as f32 / denominator as f32
            }
        };
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0. {
            2. * precision * recall / (precision + recall)
        } else {
            0.
        };

        Self {
            loss: binary_cross_entropy(probabilities, labels),
            accuracy: ratio(correct, probabilities.len()),
            precision,
            recall,
            f1,
        }
    }
}

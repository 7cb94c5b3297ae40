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

//! Gradient based optimizers of the classification head.

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::head::{ClassificationHead, Gradients};

/// An optimization algorithm with a fixed learning rate.
pub trait Optimizer {
    /// Updates the head parameters by one step against the gradients.
    fn step(&mut self, head: &mut ClassificationHead, gradients: &Gradients);

    fn learning_rate(&self) -> f32;
}

/// The available optimizers.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
}

impl OptimizerKind {
    /// Creates an optimizer for a head of the given embedding size.
    pub fn build(self, learning_rate: f32, embedding_size: usize) -> Box<dyn Optimizer> {
        match self {
            Self::Sgd => Box::new(Sgd::new(learning_rate)),
            Self::Adam => Box::new(Adam::new(learning_rate, embedding_size)),
        }
    }
}

/// Plain stochastic gradient descent.
#[derive(Debug)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, head: &mut ClassificationHead, gradients: &Gradients) {
        head.weights
            .scaled_add(-self.learning_rate, &gradients.weights);
        head.bias -= self.learning_rate * gradients.bias;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// Adam with bias corrected moment estimates.
///
/// ```ascii
/// m = b1 * m + (1 - b1) * g
/// v = b2 * v + (1 - b2) * g^2
/// p = p - lr * (m / (1 - b1^t)) / (sqrt(v / (1 - b2^t)) + eps)
/// ```
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    weights_moments: (Array1<f32>, Array1<f32>),
    bias_moments: (f32, f32),
}

impl Adam {
    pub const BETA1: f32 = 0.9;
    pub const BETA2: f32 = 0.999;
    pub const EPSILON: f32 = 1e-7;

    pub fn new(learning_rate: f32, embedding_size: usize) -> Self {
        Self {
            learning_rate,
            beta1: Self::BETA1,
            beta2: Self::BETA2,
            epsilon: Self::EPSILON,
            step: 0,
            weights_moments: (
                Array1::zeros(embedding_size),
                Array1::zeros(embedding_size),
            ),
            bias_moments: (0., 0.),
        }
    }

    fn update(&self, parameter: &mut f32, gradient: f32, first: &mut f32, second: &mut f32) {
        *first = self.beta1 * *first + (1. - self.beta1) * gradient;
        *second = self.beta2 * *second + (1. - self.beta2) * gradient * gradient;
        let first = *first / (1. - self.beta1.powi(self.step));
        let second = *second / (1. - self.beta2.powi(self.step));
        *parameter -= self.learning_rate * first / (second.sqrt() + self.epsilon);
    }
}

impl Optimizer for Adam {
    fn step(&mut self, head: &mut ClassificationHead, gradients: &Gradients) {
        self.step = self.step.saturating_add(1);

        let (mut first, mut second) = std::mem::take(&mut self.weights_moments);
        Zip::from(&mut head.weights)
            .and(&gradients.weights)
            .and(&mut first)
            .and(&mut second)
            .for_each(|parameter, &gradient, first, second| {
                self.update(parameter, gradient, first, second);
            });
        self.weights_moments = (first, second);

        let (mut first, mut second) = self.bias_moments;
        self.update(&mut head.bias, gradients.bias, &mut first, &mut second);
        self.bias_moments = (first, second);
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

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

//! Training of the classification head on top of the frozen encoder.

use displaydoc::Display;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use xayn_ai_bert::{tokenizer::Tokenize, Pipeline, PipelineError, Predict};

use crate::{
    config::{InvalidConfig, TrainingConfig},
    head::ClassificationHead,
    metrics::Metrics,
};

/// The potential errors of the training.
#[derive(Debug, Display, Error)]
pub enum TrainError {
    /// Invalid training configuration: {0}
    Config(#[from] InvalidConfig),
    /// Got {labels} labels for {texts} texts
    LengthMismatch { texts: usize, labels: usize },
    /// Invalid label {label} at index {index}, expected 0 or 1
    Label { index: usize, label: u8 },
    /// No training examples remain after holding out the validation split
    Empty,
    /// Failed to compute the features: {0}
    Pipeline(#[from] PipelineError),
}

/// The metrics of a finished epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// The mean loss of the mini-batches.
    pub loss: f32,
    /// The metrics on the training examples after the epoch.
    pub train: Metrics,
    /// The metrics on the held out examples after the epoch, if any are held out.
    pub validation: Option<Metrics>,
}

/// The outcome of a training.
#[derive(Clone, Debug)]
pub struct Training {
    pub head: ClassificationHead,
    pub history: Vec<EpochMetrics>,
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress
}

/// Computes the class token embeddings of the texts in batches.
///
/// The features are of shape `(texts.len(), embedding_size)`.
pub fn features<T, M>(
    pipeline: &Pipeline<T, M>,
    texts: &[impl AsRef<str>],
    batch_size: usize,
) -> Result<Array2<f32>, PipelineError>
where
    T: Tokenize,
    M: Predict,
{
    let mut features = Array2::zeros((texts.len(), pipeline.embedding_size()));
    let progress = progress_bar(texts.len());
    progress.set_message("embedding");

    for (batch, texts) in texts.chunks(batch_size.max(1)).enumerate() {
        let start = batch * batch_size.max(1);
        let embedding = pipeline.run(texts)?;
        features
            .slice_mut(s![start..start + texts.len(), ..])
            .assign(&*embedding);
        progress.inc(texts.len() as u64);
    }
    progress.finish_and_clear();

    Ok(features)
}

/// Trains a classification head on the texts and their binary labels.
///
/// The encoder is frozen, so the features are computed only once. The trailing
/// `validation_split` fraction of the examples is held out for validation and the
/// remaining examples are shuffled anew each epoch.
pub fn train<T, M>(
    pipeline: &Pipeline<T, M>,
    texts: &[impl AsRef<str>],
    labels: &[u8],
    config: &TrainingConfig,
) -> Result<Training, TrainError>
where
    T: Tokenize,
    M: Predict,
{
    config.validate()?;
    if texts.len() != labels.len() {
        return Err(TrainError::LengthMismatch {
            texts: texts.len(),
            labels: labels.len(),
        });
    }
    if let Some((index, &label)) = labels.iter().enumerate().find(|&(_, &label)| label > 1) {
        return Err(TrainError::Label { index, label });
    }
    let split = split_at(labels.len(), config.validation_split);
    if split == 0 {
        return Err(TrainError::Empty);
    }

    let features = features(pipeline, texts, config.batch_size)?;
    let labels = labels.iter().copied().map(f32::from).collect::<Array1<_>>();
    let (train_features, validation_features) = features.view().split_at(Axis(0), split);
    let (train_labels, validation_labels) = labels.view().split_at(Axis(0), split);
    tracing::info!(
        train = train_labels.len(),
        validation = validation_labels.len(),
        embedding_size = pipeline.embedding_size(),
        "split examples",
    );

    let mut head = ClassificationHead::new(
        pipeline.embedding_size(),
        &mut StdRng::seed_from_u64(config.seed),
    );
    let mut optimizer = config
        .optimizer
        .build(config.learning_rate, pipeline.embedding_size());
    let mut indices = (0..split).collect::<Vec<_>>();
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        indices.shuffle(&mut rng);

        let mut loss = 0.;
        for batch in indices.chunks(config.batch_size) {
            let features = train_features.select(Axis(0), batch);
            let labels = train_labels.select(Axis(0), batch);
            let gradients = head.gradients(features.view(), labels.view());
            #[allow(clippy::cast_precision_loss)]
            let weight = batch.len() as f32 / split as f32;
            loss += gradients.loss * weight;
            optimizer.step(&mut head, &gradients);
        }

        let metrics = EpochMetrics {
            epoch,
            loss,
            train: evaluate(&head, train_features, train_labels),
            validation: (!validation_labels.is_empty())
                .then(|| evaluate(&head, validation_features, validation_labels)),
        };
        log_epoch(&metrics);
        history.push(metrics);
    }

    Ok(Training { head, history })
}

/// Classifies the texts with a trained head.
pub fn predict<T, M>(
    pipeline: &Pipeline<T, M>,
    head: &ClassificationHead,
    texts: &[impl AsRef<str>],
    batch_size: usize,
) -> Result<Vec<u8>, PipelineError>
where
    T: Tokenize,
    M: Predict,
{
    let features = features(pipeline, texts, batch_size)?;
    Ok(head.classify(features.view()))
}

/// The number of training examples, the rest is held out for validation.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn split_at(len: usize, validation_split: f64) -> usize {
    ((len as f64 * (1. - validation_split)) as usize).min(len)
}

fn evaluate(
    head: &ClassificationHead,
    features: ArrayView2<'_, f32>,
    labels: ArrayView1<'_, f32>,
) -> Metrics {
    Metrics::new(head.predict(features).view(), labels)
}

fn log_epoch(metrics: &EpochMetrics) {
    let validation = metrics.validation.unwrap_or_default();
    tracing::info!(
        epoch = metrics.epoch + 1,
        loss = metrics.loss,
        accuracy = metrics.train.accuracy,
        val_loss = validation.loss,
        val_accuracy = validation.accuracy,
        val_precision = validation.precision,
        val_recall = validation.recall,
        val_f1 = validation.f1,
        "finished epoch",
    );
}

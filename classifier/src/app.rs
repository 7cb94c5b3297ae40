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

//! The commands of the classifier.

use std::path::Path;

use anyhow::{bail, Context};
use tracing::instrument;
use xayn_ai_bert::{tokenizer::Tokenize, Pipeline, Predict};

use crate::{
    checkpoint::Checkpoint,
    config::{Command, Config, ModelConfig, TrainingConfig},
    data::{labels, read_tweets, texts, write_submission},
    head::ClassificationHead,
    trainer::{self, Training},
};

/// Runs the command with the pretrained Bert model.
pub fn run(config: &Config, command: &Command) -> Result<(), anyhow::Error> {
    match command {
        Command::Train {
            data, checkpoint, ..
        } => {
            let pipeline = config.model.build()?;
            train(&pipeline, data, checkpoint, &config.training)?;
        }
        Command::Predict {
            data,
            checkpoint,
            submission,
        } => {
            let checkpoint = Checkpoint::load(checkpoint)
                .with_context(|| format!("failed to load {}", checkpoint.display()))?;
            // the head only fits the encodings of the token size it was trained with
            let model = ModelConfig {
                token_size: checkpoint.token_size,
                ..config.model.clone()
            };
            let pipeline = model.build()?;
            predict(
                &pipeline,
                &checkpoint.head,
                data,
                submission,
                config.training.batch_size,
            )?;
        }
    }

    Ok(())
}

/// Trains the head on the labeled tweets and stores it as a checkpoint.
#[instrument(skip(pipeline, config), err)]
pub fn train<T, M>(
    pipeline: &Pipeline<T, M>,
    data: &Path,
    checkpoint: &Path,
    config: &TrainingConfig,
) -> Result<Training, anyhow::Error>
where
    T: Tokenize,
    M: Predict,
{
    let tweets =
        read_tweets(data).with_context(|| format!("failed to read {}", data.display()))?;
    let labels = labels(&tweets)?;
    let training = trainer::train(pipeline, &texts(&tweets), &labels, config)?;

    Checkpoint {
        token_size: *pipeline.token_size(),
        head: training.head.clone(),
    }
    .save(checkpoint)?;

    Ok(training)
}

/// Classifies the unlabeled tweets and writes the submission.
#[instrument(skip(pipeline, head), err)]
pub fn predict<T, M>(
    pipeline: &Pipeline<T, M>,
    head: &ClassificationHead,
    data: &Path,
    submission: &Path,
    batch_size: usize,
) -> Result<Vec<u8>, anyhow::Error>
where
    T: Tokenize,
    M: Predict,
{
    if head.embedding_size() != pipeline.embedding_size() {
        bail!(
            "head of embedding size {} doesn't fit the model of embedding size {}",
            head.embedding_size(),
            pipeline.embedding_size(),
        );
    }

    let tweets =
        read_tweets(data).with_context(|| format!("failed to read {}", data.display()))?;
    let predictions = trainer::predict(pipeline, head, &texts(&tweets), batch_size.max(1))?;
    write_submission(submission, &tweets, &predictions)?;
    tracing::info!(
        tweets = tweets.len(),
        disasters = predictions.iter().filter(|&&target| target == 1).count(),
        "wrote submission",
    );

    Ok(predictions)
}

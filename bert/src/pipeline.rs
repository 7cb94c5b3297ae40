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

use displaydoc::Display;
use thiserror::Error;

use crate::{
    encoding::{encode, Encoding, EncodingError, TokenSize},
    model::Predict,
    pooler::{Embedding2, FirstPooler},
    tokenizer::Tokenize,
};

/// A pipeline can be built from a [`Config`] and consists of a tokenizer and a model.
///
/// The sequence embeddings are pooled over the class token.
///
/// [`Config`]: crate::Config
pub struct Pipeline<T, M> {
    pub(crate) tokenizer: T,
    pub(crate) model: M,
    pub(crate) token_size: TokenSize,
}

/// The potential errors of the [`Pipeline`].
#[derive(Debug, Display, Error)]
pub enum PipelineError {
    /// Failed to configure the pipeline: {0}
    Config(#[from] figment::Error),
    /// Failed to run the tokenizer: {0}
    Tokenizer(#[from] tokenizers::Error),
    /// Failed to encode the sequences: {0}
    Encoding(#[from] EncodingError),
    /// Failed to run the model: {0}
    Model(#[from] anyhow::Error),
}

impl<T, M> Pipeline<T, M>
where
    T: Tokenize,
    M: Predict,
{
    pub fn new(tokenizer: T, model: M, token_size: TokenSize) -> Self {
        Self {
            tokenizer,
            model,
            token_size,
        }
    }

    /// Encodes the sequences for the model.
    pub fn encode(&self, sequences: &[impl AsRef<str>]) -> Result<Encoding, PipelineError> {
        encode(&self.tokenizer, sequences, self.token_size).map_err(Into::into)
    }

    /// Computes the class token embeddings of the sequences.
    ///
    /// The embedding is of shape `(sequences.len(), embedding_size)`.
    pub fn run(&self, sequences: &[impl AsRef<str>]) -> Result<Embedding2, PipelineError> {
        let encoding = self.encode(sequences)?;
        let prediction = self.model.predict(&encoding)?;

        Ok(FirstPooler::pool(&prediction))
    }

    /// Gets the token size.
    pub fn token_size(&self) -> TokenSize {
        self.token_size
    }

    /// Gets the embedding size.
    pub fn embedding_size(&self) -> usize {
        self.model.embedding_size()
    }
}

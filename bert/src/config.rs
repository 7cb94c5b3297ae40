// Copyright 2022 Xayn AG
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

use std::path::PathBuf;

use figment::{
    error::{Actual, Error, Kind},
    providers::{Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::{
    encoding::TokenSize,
    model::Model,
    pipeline::{Pipeline, PipelineError},
    tokenizer::bert::Tokenizer,
    Bert,
};

/// A pipeline configuration.
///
/// The configuration is read from the `config.toml` next to the `vocab.txt` and the
/// `model.onnx` of the pretrained model.
///
/// # Example
///
/// ```toml
/// [tokenizer]
/// cleanse-accents = true
/// cleanse-text = true
/// # the case folding flag of the vocabulary
/// lower-case = true
/// max-chars = 100
///
/// [tokenizer.tokens]
/// # the `token size` must be in the inclusive range, but is passed as an argument
/// size.min = 2
/// size.max = 512
/// class = "[CLS]"
/// separation = "[SEP]"
/// unknown = "[UNK]"
/// continuation = "##"
///
/// # each input and output is required by tract
/// # string shapes are considered dynamic and depend on arguments
/// [model.input.0]
/// shape.0 = 1
/// shape.1 = "token size"
/// type = "i64"
///
/// [model.input.1]
/// shape.0 = 1
/// shape.1 = "token size"
/// type = "i64"
///
/// [model.input.2]
/// shape.0 = 1
/// shape.1 = "token size"
/// type = "i64"
///
/// [model.output.0]
/// shape.0 = 1
/// shape.1 = "token size"
/// shape.2 = 768
/// type = "f32"
/// ```
#[must_use]
pub struct Config {
    pub dir: PathBuf,
    toml: Figment,
    pub(crate) token_size: TokenSize,
}

impl Config {
    const MIN_TOKEN_SIZE: &'static str = "tokenizer.tokens.size.min";
    const MAX_TOKEN_SIZE: &'static str = "tokenizer.tokens.size.max";

    /// Creates a pipeline configuration.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        let toml = Figment::from(Toml::file(dir.join("config.toml")));
        let token_size = (toml.extract_inner::<usize>(Self::MIN_TOKEN_SIZE)?
            + toml.extract_inner::<usize>(Self::MAX_TOKEN_SIZE)?)
            / 2;
        let token_size =
            TokenSize::new(token_size).map_err(|error| Error::from(error.to_string()))?;

        Ok(Self {
            dir,
            toml,
            token_size,
        })
    }

    pub fn extract<'b, V>(&self, key: &str) -> Result<V, Error>
    where
        V: Deserialize<'b>,
    {
        self.toml.extract_inner(key)
    }

    /// Gets the token size.
    pub fn token_size(&self) -> TokenSize {
        self.token_size
    }

    /// Sets the token size for the tokenizer and the model.
    ///
    /// Defaults to the midpoint of the token size range.
    ///
    /// # Errors
    /// Fails if `size` is not within the token size range or can't hold the class and
    /// separation tokens.
    pub fn with_token_size(mut self, size: usize) -> Result<Self, Error> {
        let min = self
            .extract::<usize>(Self::MIN_TOKEN_SIZE)?
            .max(TokenSize::MIN);
        let max = self.extract::<usize>(Self::MAX_TOKEN_SIZE)?;

        match TokenSize::new(size) {
            Ok(token_size) if (min..=max).contains(&size) => {
                self.token_size = token_size;
                Ok(self)
            }
            _ => Err(Error::from(Kind::InvalidValue(
                Actual::Unsigned(size as u128),
                format!("{min}..={max}"),
            ))),
        }
    }

    /// Creates a pipeline from a configuration.
    pub fn build(&self) -> Result<Bert, PipelineError> {
        let tokenizer = Tokenizer::new(self)?;
        let model = Model::new(self)?;
        tracing::info!(
            dir = %self.dir.display(),
            token_size = *self.token_size,
            "built bert pipeline",
        );

        Ok(Pipeline::new(tokenizer, model, self.token_size))
    }
}

#[cfg(test)]
mod tests {
    use xayn_test_utils::asset::tiny_bert;

    use super::*;

    #[test]
    fn test_default_token_size() {
        let config = Config::new(tiny_bert().unwrap()).unwrap();
        assert_eq!(*config.token_size(), 257);
    }

    #[test]
    fn test_with_token_size() {
        let config = Config::new(tiny_bert().unwrap())
            .unwrap()
            .with_token_size(160)
            .unwrap();
        assert_eq!(*config.token_size(), 160);

        let config = config.with_token_size(2).unwrap();
        assert_eq!(*config.token_size(), 2);
    }

    #[test]
    fn test_with_invalid_token_size() {
        for size in [0, 1, 513] {
            let error = Config::new(tiny_bert().unwrap())
                .unwrap()
                .with_token_size(size)
                .err()
                .unwrap();
            assert!(
                error.to_string().contains("2..=512"),
                "unexpected error: {error}",
            );
        }
    }

    #[test]
    fn test_extract() {
        let config = Config::new(tiny_bert().unwrap()).unwrap();
        assert!(config.extract::<bool>("tokenizer.lower-case").unwrap());
        assert_eq!(
            config.extract::<String>("tokenizer.tokens.class").unwrap(),
            "[CLS]",
        );
        assert!(config.extract::<String>("tokenizer.missing").is_err());
    }

    #[test]
    fn test_build_without_model() {
        let config = Config::new(tiny_bert().unwrap()).unwrap();
        assert!(matches!(config.build(), Err(PipelineError::Model(_))));
    }
}

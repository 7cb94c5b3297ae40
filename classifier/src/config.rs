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

mod cli;

use std::path::{Path, PathBuf};

use displaydoc::Display;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use xayn_ai_bert::{
    hub::{Hub, HubError},
    Bert,
    TokenSize,
};

pub use self::cli::{Args, Command, Overrides};
use crate::{logging, optimizer::OptimizerKind};

/// The configuration of the classifier.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
#[cfg_attr(test, serde(deny_unknown_fields))]
pub struct Config {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: logging::Config,
}

/// Errors of the classifier configuration.
#[derive(Copy, Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    /// Invalid token size, expected at least 2 to hold the class and separation tokens
    TokenSize,
    /// Invalid learning rate, expected positive value
    LearningRate,
    /// Invalid batch size, expected positive value
    BatchSize,
    /// Invalid number of epochs, expected positive value
    Epochs,
    /// Invalid validation split, expected value from the half open unit interval
    ValidationSplit,
}

impl Config {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.model.validate()?;
        self.training.validate()?;

        Ok(())
    }
}

/// The configuration of the pretrained Bert model.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
#[cfg_attr(test, serde(deny_unknown_fields))]
pub struct ModelConfig {
    /// The directory of the model assets.
    ///
    /// Takes precedence over the hub if both are configured.
    pub dir: Option<PathBuf>,
    pub hub: Option<HubConfig>,
    /// The number of tokens per encoded sequence.
    pub token_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: None,
            hub: None,
            token_size: 160,
        }
    }
}

impl ModelConfig {
    const DEFAULT_DIR: &'static str = "assets/bert_uncased";

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        TokenSize::new(self.token_size).map_err(|_| InvalidConfig::TokenSize)?;

        Ok(())
    }

    /// Resolves the directory of the model assets.
    ///
    /// The assets are fetched from the hub only if it is configured without a directory.
    pub fn resolve_dir(&self) -> Result<PathBuf, HubError> {
        match (&self.dir, &self.hub) {
            (Some(dir), Some(hub)) => {
                tracing::warn!(
                    dir = %dir.display(),
                    hub = %hub.url,
                    "model dir is configured, ignoring the hub",
                );
                Ok(dir.clone())
            }
            (Some(dir), None) => Ok(dir.clone()),
            (None, Some(hub)) => Hub::new(&hub.url, &hub.cache).fetch(&hub.name),
            (None, None) => Ok(PathBuf::from(Self::DEFAULT_DIR)),
        }
    }

    /// Creates the Bert pipeline.
    pub fn build(&self) -> Result<Bert, anyhow::Error> {
        let dir = self.resolve_dir()?;
        let pipeline = xayn_ai_bert::Config::new(dir)?
            .with_token_size(self.token_size)?
            .build()?;

        Ok(pipeline)
    }
}

/// The remote location of the pretrained Bert model assets.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[cfg_attr(test, serde(deny_unknown_fields))]
pub struct HubConfig {
    pub url: String,
    pub name: String,
    #[serde(default = "HubConfig::default_cache")]
    pub cache: PathBuf,
}

impl HubConfig {
    fn default_cache() -> PathBuf {
        PathBuf::from(".cache/models")
    }
}

/// The configuration of the training of the classification head.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
#[cfg_attr(test, serde(deny_unknown_fields))]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub epochs: usize,
    /// The trailing fraction of the labeled data which is held out for validation.
    pub validation_split: f64,
    pub seed: u64,
    pub optimizer: OptimizerKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 16,
            epochs: 3,
            validation_split: 0.2,
            seed: 42,
            optimizer: OptimizerKind::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(InvalidConfig::LearningRate);
        }
        if self.batch_size == 0 {
            return Err(InvalidConfig::BatchSize);
        }
        if self.epochs == 0 {
            return Err(InvalidConfig::Epochs);
        }
        if !(0. ..1.).contains(&self.validation_split) {
            return Err(InvalidConfig::ValidationSplit);
        }

        Ok(())
    }
}

/// Loads the config with the parsed CLI args.
///
/// The config file and the overrides are taken from the args.
pub fn load_with_args<C>(args: &Args) -> Result<C, figment::Error>
where
    C: DeserializeOwned,
{
    load_config(args.config.as_deref(), args.to_config_overrides())
}

/// Load the configuration into given type.
///
/// # Load order/priority
///
/// This will by ascending priority load:
///
/// 1. `./config.toml` or specified toml config file
/// 2. `./.env`
/// 3. `./.env.local`
/// 4. process environment
/// 5. options passed through `update_with`
///
/// Config values loaded from higher priority sources override such from lower
/// priority sources. E.g. values defined in `update_with` override values
/// from any other source.
///
/// # Env and .env
///
/// Environment variables from `.env` and `.env.local` will be loaded into the process
/// environment if they don't already exist there (keeping priority as described above).
///
/// When creating the config type instance, only environment variables with the
/// `XAYN_CLASSIFIER_` prefix will be considered and the prefix is stripped.
///
/// Env variables are split at `__`. I.e. `XAYN_CLASSIFIER_TRAINING__BATCH_SIZE=32` will be
/// treated like the json `{ "training": { "batch_size": 32 } }` wrt. deserializing the config.
pub fn load_config<C, U>(config: Option<&str>, update_with: U) -> Result<C, figment::Error>
where
    C: DeserializeOwned,
    U: Serialize,
{
    // the order must be from highest to lowest priority
    load_dotenv(".env.local")?;
    load_dotenv(".env")?;

    let mut figment = Figment::new()
        .join(Serialized::globals(update_with))
        .join(Env::prefixed("XAYN_CLASSIFIER_").split("__"));

    let provider = config
        .map(|content_or_path| {
            if let Some(content) = content_or_path.strip_prefix("inline:") {
                Toml::string(content)
            } else {
                Toml::file(content_or_path)
            }
        })
        .or_else(|| {
            let default_file = Path::new("config.toml");
            default_file.exists().then(|| Toml::file(default_file))
        });
    if let Some(provider) = provider {
        figment = figment.join(provider);
    }

    figment.extract()
}

fn load_dotenv(file_name: &str) -> Result<(), figment::Error> {
    match dotenvy::from_filename(file_name) {
        Err(error) if !error.not_found() => {
            Err(figment::Error::from(error.to_string()).with_path(file_name))
        }
        _ => Ok(()),
    }
}

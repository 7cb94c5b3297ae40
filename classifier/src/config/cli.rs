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

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Classifies tweets about real disasters with a fine-tuned Bert model.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Use given configuration file.
    ///
    /// Instead of a path "inline" toml configuration file can also be
    /// passed in by prefixing it with `inline:`.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// File to log to additionally to logging to stdout.
    #[arg(short, long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print the config and exit instead of running the command.
    #[arg(long, global = true)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Trains the classification head on labeled tweets.
    Train {
        /// The csv file of labeled tweets.
        #[arg(long)]
        data: PathBuf,

        /// The file to store the trained head in.
        #[arg(long)]
        checkpoint: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Classifies unlabeled tweets with a trained head.
    Predict {
        /// The csv file of unlabeled tweets.
        #[arg(long)]
        data: PathBuf,

        /// The file of the trained head.
        #[arg(long)]
        checkpoint: PathBuf,

        /// The csv file to write the `id,target` predictions to.
        #[arg(long)]
        submission: PathBuf,
    },
}

/// Settings which are prioritized over settings through the config and environment.
#[derive(ClapArgs, Debug, Default)]
pub struct Overrides {
    /// The directory of the pretrained Bert model.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// The number of tokens per encoded tweet.
    #[arg(long)]
    pub token_size: Option<usize>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f32>,
}

impl Args {
    pub(super) fn to_config_overrides(&self) -> impl Serialize {
        let mut map = Map::new();
        if let Some(log_file) = &self.log_file {
            map.insert(String::from("logging"), json!({ "file": log_file }));
        }

        if let Command::Train { overrides, .. } = &self.command {
            let mut model = Map::new();
            if let Some(model_dir) = &overrides.model_dir {
                model.insert(String::from("dir"), json!(model_dir));
            }
            if let Some(token_size) = overrides.token_size {
                model.insert(String::from("token_size"), json!(token_size));
            }
            if !model.is_empty() {
                map.insert(String::from("model"), Value::Object(model));
            }

            let mut training = Map::new();
            if let Some(epochs) = overrides.epochs {
                training.insert(String::from("epochs"), json!(epochs));
            }
            if let Some(batch_size) = overrides.batch_size {
                training.insert(String::from("batch_size"), json!(batch_size));
            }
            if let Some(learning_rate) = overrides.learning_rate {
                training.insert(String::from("learning_rate"), json!(learning_rate));
            }
            if !training.is_empty() {
                map.insert(String::from("training"), Value::Object(training));
            }
        }

        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(args: &[&str]) -> Value {
        let args = Args::parse_from(args);
        serde_json::to_value(args.to_config_overrides()).unwrap()
    }

    #[test]
    fn test_train_overrides() {
        let value = overrides(&[
            "disaster-tweets",
            "train",
            "--data",
            "train.csv",
            "--checkpoint",
            "head.json",
            "--model-dir",
            "models/bert",
            "--token-size",
            "64",
            "--epochs",
            "5",
            "--log-file",
            "train.log",
        ]);
        assert_eq!(
            value,
            json!({
                "logging": { "file": "train.log" },
                "model": { "dir": "models/bert", "token_size": 64 },
                "training": { "epochs": 5 },
            }),
        );
    }

    #[test]
    fn test_no_overrides() {
        let value = overrides(&[
            "disaster-tweets",
            "predict",
            "--data",
            "test.csv",
            "--checkpoint",
            "head.json",
            "--submission",
            "submission.csv",
        ]);
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_global_args() {
        let args = Args::parse_from([
            "disaster-tweets",
            "predict",
            "--data",
            "test.csv",
            "--checkpoint",
            "head.json",
            "--submission",
            "submission.csv",
            "--config",
            "inline:[training]",
            "--print-config",
        ]);
        assert_eq!(args.config.as_deref(), Some("inline:[training]"));
        assert!(args.print_config);
        assert!(matches!(args.command, Command::Predict { .. }));
    }

    #[test]
    fn test_missing_data() {
        assert!(Args::try_parse_from(["disaster-tweets", "train", "--checkpoint", "head.json"])
            .is_err());
    }
}

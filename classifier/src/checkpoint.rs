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

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::head::ClassificationHead;

/// The potential errors of storing and restoring a checkpoint.
#[derive(Debug, Display, Error)]
pub enum CheckpointError {
    /// Failed to access the checkpoint file: {0}
    Io(#[from] io::Error),
    /// Malformed checkpoint: {0}
    Json(#[from] serde_json::Error),
}

/// The trained state of the classifier.
///
/// The encoder is frozen, hence the head and the token size it was trained with are sufficient
/// to restore the classifier together with the pretrained model.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Checkpoint {
    pub token_size: usize,
    pub head: ClassificationHead,
}

impl Checkpoint {
    /// Stores the checkpoint as a json file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "saved checkpoint");

        Ok(())
    }

    /// Restores a checkpoint from a json file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(Into::into)
    }
}

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
    env::var_os,
    io::{Error, ErrorKind, Result},
    path::{Path, PathBuf},
};

const ASSETS_DIR: &str = "assets/";

/// Resolves the path to the requested data relative to the workspace directory.
fn resolve_path(path: &[impl AsRef<Path>]) -> Result<PathBuf> {
    let manifest = var_os("CARGO_MANIFEST_DIR")
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "missing CARGO_MANIFEST_DIR"))?;

    let workspace = PathBuf::from(manifest)
        .ancestors()
        .find(|path| path.join("Cargo.lock").exists())
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "missing cargo workspace dir"))?
        .to_path_buf();

    path.iter()
        .fold(workspace, |path, component| path.join(component))
        .canonicalize()
}

/// Resolves the path to the tiny bert assets.
///
/// They contain a config and a small vocabulary, but no onnx model.
pub fn tiny_bert() -> Result<PathBuf> {
    resolve_path(&[ASSETS_DIR, "tiny_bert"])
}

/// Resolves the path to the pretrained bert assets, eg as fetched from the hub.
pub fn bert() -> Result<PathBuf> {
    resolve_path(&[ASSETS_DIR, "bert_uncased"])
}

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

use std::{fs::File, io::BufReader};

use anyhow::{bail, Result};
use derive_more::{Deref, From};
use ndarray::{s, Array2, Array3, Ix3};
use serde::Deserialize;
use tract_onnx::prelude::{
    tvec,
    Framework,
    InferenceFact,
    InferenceModel,
    InferenceModelExt,
    IntoArcTensor,
    TValue,
    TypedModel,
    TypedRunnableModel,
};

use crate::{config::Config, encoding::Encoding};

/// The predicted contextual token embeddings.
///
/// The prediction is of shape `(batch_size, token_size, embedding_size)`, the embedding at
/// token index `0` is the aggregate representation of the class token.
#[derive(Clone, Debug, Deref, From)]
pub struct Prediction(Array3<f32>);

/// A pretrained sequence encoder.
pub trait Predict {
    /// Runs prediction on the encoded sequences.
    fn predict(&self, encoding: &Encoding) -> Result<Prediction>;

    /// The size of the embedding of each token.
    fn embedding_size(&self) -> usize;
}

#[derive(Deserialize)]
enum DynDim {
    #[serde(rename = "token size")]
    TokenSize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Dimension {
    Fixed(usize),
    Dynamic(DynDim),
}

impl Config {
    fn extract_facts(
        &self,
        io: &'static str,
        mut model: InferenceModel,
        with_io_fact: impl Fn(InferenceModel, usize, InferenceFact) -> Result<InferenceModel>,
    ) -> Result<InferenceModel> {
        let mut i = 0;
        while let Ok(datum_type) = self
            .extract::<String>(&format!("model.{io}.{i}.type"))
            .map_err(Into::into)
            .and_then(|datum_type| datum_type.parse())
        {
            let mut shape = Vec::new();
            let mut j = 0;
            while let Ok(dim) = self.extract::<Dimension>(&format!("model.{io}.{i}.shape.{j}")) {
                let dim = match dim {
                    Dimension::Fixed(dim) => dim,
                    Dimension::Dynamic(DynDim::TokenSize) => *self.token_size,
                };
                shape.push(dim);
                j += 1;
            }
            model = with_io_fact(model, i, InferenceFact::dt_shape(datum_type, shape))?;
            i += 1;
        }

        Ok(model)
    }
}

/// A Bert onnx model run by tract.
///
/// The model takes the token ids, attention mask and type ids of a single sequence, each of
/// shape `(1, token_size)`, and returns the token embeddings as its first output.
#[derive(Debug)]
pub struct Model {
    model: TypedRunnableModel<TypedModel>,
    token_size: usize,
    embedding_size: usize,
}

impl Model {
    /// Creates a model from a configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let model = config.dir.join("model.onnx");
        if !model.exists() {
            bail!("bert model '{}' doesn't exist", model.display());
        }

        let mut model = BufReader::new(File::open(model)?);
        let model = tract_onnx::onnx().model_for_read(&mut model)?;
        let model = config.extract_facts("input", model, InferenceModel::with_input_fact)?;
        let model = config.extract_facts("output", model, InferenceModel::with_output_fact)?;
        let model = model.into_optimized()?.into_runnable()?;

        Ok(Model {
            model,
            token_size: *config.token_size,
            embedding_size: config.extract("model.output.0.shape.2")?,
        })
    }
}

impl Predict for Model {
    fn predict(&self, encoding: &Encoding) -> Result<Prediction> {
        if encoding.token_size() != self.token_size {
            bail!(
                "encoding token size {} doesn't match the model token size {}",
                encoding.token_size(),
                self.token_size,
            );
        }

        let mut prediction = Array3::zeros((
            encoding.batch_size(),
            self.token_size,
            self.embedding_size,
        ));
        for (row, encoding) in encoding.rows().enumerate() {
            let as_input = |array: Array2<i64>| TValue::Const(array.into_arc_tensor());
            let inputs = tvec![
                as_input(encoding.token_ids.0),
                as_input(encoding.attention_mask.0),
                as_input(encoding.type_ids.0),
            ];
            let outputs = self.model.run(inputs)?;
            let embeddings = outputs[0]
                .to_array_view::<f32>()?
                .into_dimensionality::<Ix3>()?;
            prediction
                .slice_mut(s![row, .., ..])
                .assign(&embeddings.slice(s![0, .., ..]));
        }

        Ok(prediction.into())
    }

    fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}

use std::path::Path;

use rten::Model;
use rten_tensor::Tensor;
use rten_tensor::prelude::*;

use crate::error::{InferenceError, ModelLoadError};
use crate::model::{InferenceBackend, InputBlob};

/// `InferenceBackend` over an `rten` model graph.
pub struct RtenBackend {
    model: Model,
}

impl RtenBackend {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::MissingFile(path.to_path_buf()));
        }
        let model = Model::load_file(path).map_err(|e| ModelLoadError::CorruptGraph {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { model })
    }
}

impl InferenceBackend for RtenBackend {
    fn has_node(&self, name: &str) -> bool {
        self.model.find_node(name).is_some()
    }

    fn forward(
        &mut self,
        input_name: &str,
        input: &InputBlob,
        output_names: &[String],
    ) -> Result<Vec<Vec<f32>>, InferenceError> {
        let input_id = self
            .model
            .find_node(input_name)
            .ok_or_else(|| InferenceError::Backend(format!("no input node '{input_name}'")))?;
        let output_ids = output_names
            .iter()
            .map(|name| {
                self.model
                    .find_node(name)
                    .ok_or_else(|| InferenceError::Backend(format!("no output node '{name}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tensor = Tensor::from_data(&input.shape[..], input.data.clone());
        let outputs = self
            .model
            .run(vec![(input_id, tensor.view().into())], &output_ids, None)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        outputs
            .into_iter()
            .zip(output_names)
            .map(|(value, name)| {
                let scores: Tensor<f32> = value.try_into().map_err(|_| {
                    InferenceError::ShapeMismatch(format!("output '{name}' is not a float tensor"))
                })?;
                Ok(scores.to_vec())
            })
            .collect()
    }
}

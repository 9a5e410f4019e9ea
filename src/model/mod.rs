pub mod rten_backend;

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use image::imageops::FilterType;
use tracing::{error, info};

use crate::error::{InferenceError, ModelLoadError};
use crate::frame::{ChannelLayout, Frame};

pub use rten_backend::RtenBackend;

/// Opaque runtime that executes a trained graph.
///
/// Implementations need not be reentrant: `ClassifierModel` never issues two
/// `forward` calls on the same backend at once.
pub trait InferenceBackend: Send {
    /// Whether the graph has a node with this name.
    fn has_node(&self, name: &str) -> bool;

    /// Run the graph, feeding `input` into `input_name` and returning one
    /// flattened score vector per name in `output_names`, in order.
    fn forward(
        &mut self,
        input_name: &str,
        input: &InputBlob,
        output_names: &[String],
    ) -> Result<Vec<Vec<f32>>, InferenceError>;
}

/// NCHW float tensor handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InputBlob {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

/// Fixed resize/normalize step applied before every inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocess {
    pub width: u32,
    pub height: u32,
    /// Multiplier applied after mean subtraction
    pub scale: f32,
    /// Per-channel mean, in the model's channel order
    pub mean: [f32; 3],
    /// Channel layout the model was trained on
    pub layout: ChannelLayout,
}

impl Preprocess {
    pub fn new(width: u32, height: u32, layout: ChannelLayout) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
            mean: [0.0; 3],
            layout,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_mean(mut self, mean: [f32; 3]) -> Self {
        self.mean = mean;
        self
    }

    /// Convert a frame into the model's input tensor: re-encode channels,
    /// resize bilinearly, subtract the mean and scale.
    pub fn to_blob(&self, frame: &Frame) -> InputBlob {
        let frame = frame.to_layout(self.layout);
        let channels = self.layout.channels();
        let plane = (self.width * self.height) as usize;
        let mut data = vec![0.0f32; plane * channels];

        // Resizing happens in the frame's own channel order, so work on the
        // interleaved bytes rather than through `to_image`, which reorders Bgr.
        let resized: Vec<u8> = match self.layout {
            ChannelLayout::Gray => {
                let img = image::GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                    .unwrap_or_else(|| image::GrayImage::new(frame.width(), frame.height()));
                image::imageops::resize(&img, self.width, self.height, FilterType::Triangle).into_raw()
            }
            ChannelLayout::Rgb | ChannelLayout::Bgr => {
                let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                    .unwrap_or_else(|| image::RgbImage::new(frame.width(), frame.height()));
                image::imageops::resize(&img, self.width, self.height, FilterType::Triangle).into_raw()
            }
        };

        for (idx, px) in resized.chunks_exact(channels).enumerate() {
            for (c, &value) in px.iter().enumerate() {
                data[c * plane + idx] = (value as f32 - self.mean[c]) * self.scale;
            }
        }

        InputBlob {
            shape: [1, channels, self.height as usize, self.width as usize],
            data,
        }
    }
}

/// Score vectors produced by one inference call, one per output slot.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    slots: Vec<Vec<f32>>,
}

impl InferenceOutput {
    pub fn new(slots: Vec<Vec<f32>>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Vec<f32>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Arg-max class index of every slot.
    pub fn argmax(&self) -> Vec<usize> {
        self.slots.iter().map(|scores| argmax(scores)).collect()
    }
}

/// Index of the largest score. Ties go to the lowest index; NaN never wins.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (idx, &score) in scores.iter().enumerate() {
        if score > scores[best] || scores[best].is_nan() {
            best = idx;
        }
    }
    best
}

/// Thread-safe wrapper around one loaded model.
///
/// Preprocessing and output validation run outside the lock; only the backend
/// call itself is serialized.
pub struct ClassifierModel {
    name: String,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
    input_layer: String,
    output_layers: Vec<String>,
    preprocess: Preprocess,
    slot_widths: OnceLock<Vec<usize>>,
}

impl ClassifierModel {
    /// Load an `.rten` graph from disk.
    pub fn load(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        input_layer: impl Into<String>,
        output_layers: Vec<String>,
        preprocess: Preprocess,
    ) -> Result<Self, ModelLoadError> {
        let name = name.into();
        let backend = RtenBackend::load(path.as_ref())?;
        let model = Self::from_backend(&name, Box::new(backend), input_layer, output_layers, preprocess)?;
        info!("{} loaded from {}", name, path.as_ref().display());
        Ok(model)
    }

    /// Wrap an already loaded backend, checking that the layer names exist.
    pub fn from_backend(
        name: impl Into<String>,
        backend: Box<dyn InferenceBackend>,
        input_layer: impl Into<String>,
        output_layers: Vec<String>,
        preprocess: Preprocess,
    ) -> Result<Self, ModelLoadError> {
        let input_layer = input_layer.into();
        if output_layers.is_empty() {
            return Err(ModelLoadError::NoOutputs);
        }
        for layer in std::iter::once(&input_layer).chain(output_layers.iter()) {
            if !backend.has_node(layer) {
                return Err(ModelLoadError::UnknownLayer(layer.clone()));
            }
        }
        Ok(Self {
            name: name.into(),
            backend: Mutex::new(Some(backend)),
            input_layer,
            output_layers,
            preprocess,
            slot_widths: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel layout the model consumes.
    pub fn input_layout(&self) -> ChannelLayout {
        self.preprocess.layout
    }

    pub fn predict(&self, frame: &Frame) -> Result<InferenceOutput, InferenceError> {
        let blob = self.preprocess.to_blob(frame);

        let slots = {
            // A panic in an earlier call poisons the lock; the backend itself is still usable.
            let mut guard = match self.backend.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let backend = guard.as_mut().ok_or(InferenceError::BackendClosed)?;
            backend.forward(&self.input_layer, &blob, &self.output_layers)?
        };

        self.check_shape(&slots)?;
        Ok(InferenceOutput::new(slots))
    }

    /// Predict on an image file read from disk as grayscale.
    pub fn predict_image_file(&self, path: impl AsRef<Path>) -> Result<InferenceOutput, InferenceError> {
        let img = image::open(path)?.to_luma8();
        let (w, h) = img.dimensions();
        let frame = Frame::new(w, h, ChannelLayout::Gray, img.into_raw())
            .map_err(|e| InferenceError::ShapeMismatch(e.to_string()))?;
        self.predict(&frame)
    }

    /// Release the backend. Closing twice is a lifecycle bug; it is logged and
    /// otherwise ignored.
    pub fn close(&self) {
        let backend = match self.backend.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match backend {
            Some(backend) => {
                drop(backend);
                info!("{} closed", self.name);
            }
            None => error!("{} closed twice", self.name),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.backend.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    fn check_shape(&self, slots: &[Vec<f32>]) -> Result<(), InferenceError> {
        if slots.len() != self.output_layers.len() {
            return Err(InferenceError::ShapeMismatch(format!(
                "{}: expected {} output slots, got {}",
                self.name,
                self.output_layers.len(),
                slots.len()
            )));
        }
        if let Some(slot) = slots.iter().position(|s| s.is_empty()) {
            return Err(InferenceError::ShapeMismatch(format!(
                "{}: output slot {} is empty",
                self.name, slot
            )));
        }

        // The first successful call fixes the widths for the process lifetime.
        let widths: Vec<usize> = slots.iter().map(Vec::len).collect();
        let expected = self.slot_widths.get_or_init(|| widths.clone());
        if *expected != widths {
            return Err(InferenceError::ShapeMismatch(format!(
                "{}: output widths {:?}, expected {:?}",
                self.name, widths, expected
            )));
        }
        Ok(())
    }
}

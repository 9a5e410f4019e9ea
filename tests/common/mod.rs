#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use numlabel::{
    ChannelLayout, ClassifierModel, Frame, InferenceBackend, InferenceError, InputBlob,
    Preprocess, TwoStageCascade,
};

/// Frame edge used by every fixture; matches the fake models' input size so
/// no resampling happens.
pub const EDGE: u32 = 4;

/// Pixel value the fake recognizer fails on.
pub const POISON: u8 = 255;

type ForwardFn = Box<dyn FnMut(&InputBlob) -> Result<Vec<Vec<f32>>, InferenceError> + Send>;

/// Backend driven by a closure, counting how often it is dropped.
pub struct FnBackend {
    forward: ForwardFn,
    drops: Arc<AtomicUsize>,
}

impl InferenceBackend for FnBackend {
    fn has_node(&self, _name: &str) -> bool {
        true
    }

    fn forward(
        &mut self,
        _input_name: &str,
        input: &InputBlob,
        _output_names: &[String],
    ) -> Result<Vec<Vec<f32>>, InferenceError> {
        (self.forward)(input)
    }
}

impl Drop for FnBackend {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn model(
    name: &str,
    layout: ChannelLayout,
    slots: usize,
    forward: impl FnMut(&InputBlob) -> Result<Vec<Vec<f32>>, InferenceError> + Send + 'static,
) -> (ClassifierModel, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let backend = FnBackend {
        forward: Box::new(forward),
        drops: drops.clone(),
    };
    let outputs = (0..slots).map(|i| format!("out{i}")).collect();
    let model = ClassifierModel::from_backend(
        name,
        Box::new(backend),
        "input",
        outputs,
        Preprocess::new(EDGE, EDGE, layout),
    )
    .expect("fake backend accepts every layer name");
    (model, drops)
}

pub fn one_hot(class: usize, width: usize) -> Vec<f32> {
    let mut v = vec![0.0; width];
    v[class] = 1.0;
    v
}

/// A flat gray frame. Value 0 reads as noise to the fake detector; any other
/// value `v` is recognized as the plain label `format!("{v:03}")`.
pub fn frame(value: u8) -> Frame {
    Frame::new(EDGE, EDGE, ChannelLayout::Gray, vec![value; (EDGE * EDGE) as usize])
        .expect("fixture frame has the right size")
}

pub fn expected_label(value: u8) -> String {
    format!("{value:03}")
}

/// Detector: class 1 for any non-zero pixel.
pub fn detector_fn(input: &InputBlob) -> Result<Vec<Vec<f32>>, InferenceError> {
    let class = if input.data[0] > 0.0 { 1 } else { 0 };
    Ok(vec![one_hot(class, 2)])
}

/// Recognizer: guard 1, plain layout, payload digits of the pixel value.
pub fn recognizer_fn(input: &InputBlob) -> Result<Vec<Vec<f32>>, InferenceError> {
    let value = input.data[0] as usize;
    if value == POISON as usize {
        return Err(InferenceError::Backend("poisoned frame".into()));
    }
    let digits = [1, 3, value / 100, value / 10 % 10, value % 10, 0];
    Ok(digits
        .iter()
        .map(|&d| one_hot(if d == 0 { 10 } else { d }, 11))
        .collect())
}

pub struct Fixture {
    pub cascade: TwoStageCascade,
    pub detector_drops: Arc<AtomicUsize>,
    pub recognizer_drops: Arc<AtomicUsize>,
}

pub fn cascade() -> Fixture {
    cascade_with_detector(detector_fn)
}

pub fn cascade_with_detector(
    detector: impl FnMut(&InputBlob) -> Result<Vec<Vec<f32>>, InferenceError> + Send + 'static,
) -> Fixture {
    let (detector, detector_drops) = model("detector", ChannelLayout::Gray, 1, detector);
    let (recognizer, recognizer_drops) = model("recognizer", ChannelLayout::Rgb, 6, recognizer_fn);
    Fixture {
        cascade: TwoStageCascade::new(detector, recognizer),
        detector_drops,
        recognizer_drops,
    }
}

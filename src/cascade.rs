use tracing::debug;

use crate::debug_frames::{DebugBucket, DebugFrameWriter};
use crate::decoder::{self, DecodeRejection, DigitSequence, Label};
use crate::error::InferenceError;
use crate::frame::Frame;
use crate::model::{ClassifierModel, argmax};

/// Detector class meaning "background / noise".
const NOISE_CLASS: usize = 0;

/// Outcome of running one frame through the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeDecision {
    /// Detector saw no number; the recognizer never ran
    NoNumber,
    /// Recognizer ran but the digit layout did not decode
    Malformed(DecodeRejection),
    Accepted(Label),
}

impl CascadeDecision {
    pub fn label(&self) -> Option<&Label> {
        match self {
            CascadeDecision::Accepted(label) => Some(label),
            _ => None,
        }
    }
}

/// Detector followed by recognizer.
pub struct TwoStageCascade {
    detector: ClassifierModel,
    recognizer: ClassifierModel,
    debug_writer: Option<DebugFrameWriter>,
}

impl TwoStageCascade {
    pub fn new(detector: ClassifierModel, recognizer: ClassifierModel) -> Self {
        Self {
            detector,
            recognizer,
            debug_writer: None,
        }
    }

    /// Persist every processed frame to the writer's noise or number directory.
    pub fn with_debug_writer(mut self, writer: DebugFrameWriter) -> Self {
        self.debug_writer = Some(writer);
        self
    }

    pub fn detector(&self) -> &ClassifierModel {
        &self.detector
    }

    pub fn recognizer(&self) -> &ClassifierModel {
        &self.recognizer
    }

    /// Classify one frame. `index` names the frame in logs and debug files.
    ///
    /// Inference failures in either stage come back as `Err`; decode misses
    /// are `Ok(CascadeDecision::Malformed(_))`.
    pub fn process_one(&self, frame: &Frame, index: u64) -> Result<CascadeDecision, InferenceError> {
        let detection = self.detector.predict(frame)?;
        let is_number = detection
            .slots()
            .first()
            .map(|scores| argmax(scores) != NOISE_CLASS)
            .unwrap_or(false);

        if !is_number {
            self.save_debug(DebugBucket::Noise, index, frame);
            return Ok(CascadeDecision::NoNumber);
        }

        // The recognizer may want three channels from a grayscale source;
        // replicate rather than resample.
        let recognizer_input = frame.to_layout(self.recognizer.input_layout());
        let recognition = self.recognizer.predict(&recognizer_input)?;
        let sequence = DigitSequence::try_from(recognition.argmax().as_slice())?;

        let decision = match decoder::decode(&sequence) {
            Ok(label) => CascadeDecision::Accepted(label),
            Err(rejection) => {
                debug!("frame #{index}: {rejection} ({:?})", sequence.classes());
                CascadeDecision::Malformed(rejection)
            }
        };

        self.save_debug(DebugBucket::Number, index, frame);
        Ok(decision)
    }

    /// Release both backends.
    pub fn close(&self) {
        self.detector.close();
        self.recognizer.close();
    }

    fn save_debug(&self, bucket: DebugBucket, index: u64, frame: &Frame) {
        if let Some(writer) = &self.debug_writer {
            writer.save(bucket, index, frame);
        }
    }
}

pub mod cascade;
pub mod config;
pub mod debug_frames;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod model;
pub mod pipeline;
pub mod sink;

pub use cascade::{CascadeDecision, TwoStageCascade};
pub use config::LabellerConfig;
pub use decoder::{DecodeRejection, DigitSequence, Label, decode};
pub use error::{ConfigError, FrameError, InferenceError, ModelLoadError};
pub use frame::{ChannelLayout, Frame};
pub use model::{ClassifierModel, InferenceBackend, InferenceOutput, InputBlob, Preprocess};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport, PipelineState, SubmitError};
pub use sink::{ChannelSink, LogSink, MostFrequentSink, ResultSink};

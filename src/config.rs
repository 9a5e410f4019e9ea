use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::decoder::DIGIT_SLOTS;
use crate::error::ConfigError;
use crate::frame::ChannelLayout;
use crate::model::Preprocess;

/// Settings read once at pipeline start.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabellerConfig {
    pub detector_model_path: PathBuf,
    pub detector_input_layer: String,
    pub detector_output_layers: Vec<String>,
    #[serde(default = "default_detector_layout")]
    pub detector_layout: ChannelLayout,

    pub recognizer_model_path: PathBuf,
    pub recognizer_input_layer: String,
    pub recognizer_output_layers: Vec<String>,
    #[serde(default = "default_recognizer_layout")]
    pub recognizer_layout: ChannelLayout,

    #[serde(default = "default_queue_capacity")]
    pub ingestion_queue_capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub save_debug_frames: bool,
    #[serde(default = "default_noise_dir")]
    pub debug_noise_dir: PathBuf,
    #[serde(default = "default_number_dir")]
    pub debug_number_dir: PathBuf,

    /// 0 logs every label; otherwise log the most frequent label per window
    #[serde(default)]
    pub result_aggregation_window_size: usize,

    #[serde(default = "default_input_edge")]
    pub input_width: u32,
    #[serde(default = "default_input_edge")]
    pub input_height: u32,
    #[serde(default = "default_scale")]
    pub input_scale: f32,
    #[serde(default)]
    pub input_mean: [f32; 3],
}

fn default_detector_layout() -> ChannelLayout {
    ChannelLayout::Gray
}

fn default_recognizer_layout() -> ChannelLayout {
    ChannelLayout::Rgb
}

fn default_queue_capacity() -> usize {
    100
}

fn default_workers() -> usize {
    1
}

fn default_noise_dir() -> PathBuf {
    PathBuf::from("debug/noise")
}

fn default_number_dir() -> PathBuf {
    PathBuf::from("debug/number")
}

fn default_input_edge() -> u32 {
    48
}

fn default_scale() -> f32 {
    1.0
}

impl LabellerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingestion_queue_capacity == 0 {
            return Err(ConfigError::Invalid("ingestion_queue_capacity must be > 0".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ConfigError::Invalid("input dimensions must be non-zero".into()));
        }
        let layers = [&self.detector_input_layer, &self.recognizer_input_layer]
            .into_iter()
            .chain(&self.detector_output_layers)
            .chain(&self.recognizer_output_layers);
        for layer in layers {
            if layer.trim().is_empty() {
                return Err(ConfigError::Invalid("layer names must not be empty".into()));
            }
        }
        if self.detector_output_layers.is_empty() {
            return Err(ConfigError::Invalid("detector_output_layers must not be empty".into()));
        }
        if self.recognizer_output_layers.len() != DIGIT_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "recognizer_output_layers must name {DIGIT_SLOTS} layers, got {}",
                self.recognizer_output_layers.len()
            )));
        }
        if self.save_debug_frames {
            warn!("debug frame saving is enabled");
        }
        Ok(())
    }

    pub fn detector_preprocess(&self) -> Preprocess {
        self.preprocess(self.detector_layout)
    }

    pub fn recognizer_preprocess(&self) -> Preprocess {
        self.preprocess(self.recognizer_layout)
    }

    fn preprocess(&self, layout: ChannelLayout) -> Preprocess {
        Preprocess::new(self.input_width, self.input_height, layout)
            .with_scale(self.input_scale)
            .with_mean(self.input_mean)
    }
}

impl std::str::FromStr for LabellerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: LabellerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        detector_model_path = "models/detector.rten"
        detector_input_layer = "input"
        detector_output_layers = ["prob"]
        recognizer_model_path = "models/svhn.rten"
        recognizer_input_layer = "input"
        recognizer_output_layers = ["d0", "d1", "d2", "d3", "d4", "d5"]
    "#;

    #[test]
    fn test_defaults() {
        let config: LabellerConfig = MINIMAL.parse().unwrap();
        assert_eq!(config.ingestion_queue_capacity, 100);
        assert_eq!(config.workers, 1);
        assert!(!config.save_debug_frames);
        assert_eq!(config.result_aggregation_window_size, 0);
        assert_eq!(config.recognizer_output_layers.len(), 6);

        let pre = config.recognizer_preprocess();
        assert_eq!((pre.width, pre.height), (48, 48));
        assert_eq!(pre.layout, ChannelLayout::Rgb);
        assert_eq!(config.detector_preprocess().layout, ChannelLayout::Gray);
    }

    #[test]
    fn test_overrides() {
        let text = format!(
            "{MINIMAL}\ningestion_queue_capacity = 8\nworkers = 2\nrecognizer_layout = \"bgr\"\ninput_mean = [1.0, 2.0, 3.0]\n"
        );
        let config: LabellerConfig = text.parse().unwrap();
        assert_eq!(config.ingestion_queue_capacity, 8);
        assert_eq!(config.workers, 2);
        assert_eq!(config.recognizer_layout, ChannelLayout::Bgr);
        assert_eq!(config.recognizer_preprocess().mean, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let text = format!("{MINIMAL}\ningestion_queue_capacity = 0\n");
        assert!(matches!(text.parse::<LabellerConfig>(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_recognizer_slot_count_must_match_decoder() {
        let five = MINIMAL.replace(r#"["d0", "d1", "d2", "d3", "d4", "d5"]"#, r#"["d0", "d1", "d2", "d3", "d4"]"#);
        let err = five.parse::<LabellerConfig>().unwrap_err();
        assert!(matches!(&err, ConfigError::Invalid(msg) if msg.contains("got 5")));

        let seven = MINIMAL.replace(r#""d5"]"#, r#""d5", "d6"]"#);
        assert!(matches!(seven.parse::<LabellerConfig>(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_field_is_a_parse_error() {
        let result = "detector_input_layer = \"x\"".parse::<LabellerConfig>();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

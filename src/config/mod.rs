// src/config/mod.rs
pub mod detector;

pub use detector::{
    DetectorConfig, FetchSection, PathsSection, PolicyKind, PolicySection, TrainingSection,
    DEFAULT_DETECTOR_CONFIG_PATH, ENV_DETECTOR_CONFIG_PATH,
};

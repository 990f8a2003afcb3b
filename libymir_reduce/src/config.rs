use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::image_key::ImagePrefixMap;
use super::nexus::{
    CropBounds, DEFAULT_DETECTOR_NAME, DEFAULT_HISTOGRAM_PATH, DEFAULT_SENSOR_NAME,
};
use super::normalize::{DEFAULT_BACKGROUND_THRESHOLD, DEFAULT_SAMPLE_THRESHOLD};
use super::tiff_writer::ExportOptions;

/// Structure representing the application configuration. Contains pathing and export options.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// NeXus file holding the detector images and logs
    pub input_path: PathBuf,
    /// If set, `input_path` names a file in this directory, staged through the data cache
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    pub histogram_path: String,
    pub detector_name: String,
    pub sensor_name: String,
    /// Pixel bounds applied to every detector frame before separation
    #[serde(default)]
    pub crop: CropBounds,
    #[serde(default = "default_background_threshold")]
    pub background_threshold: f64,
    #[serde(default = "default_sample_threshold")]
    pub sample_threshold: f64,
    /// Directory the per-role TIFF files are written to
    pub output_path: PathBuf,
    /// If set, normalized sample images are also written here
    pub normalized_path: Option<PathBuf>,
    pub merge_images: bool,
    pub overwrite: bool,
    pub prefixes: ImagePrefixMap,
}

fn default_background_threshold() -> f64 {
    DEFAULT_BACKGROUND_THRESHOLD
}

fn default_sample_threshold() -> f64 {
    DEFAULT_SAMPLE_THRESHOLD
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid, names are the YMIR defaults
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("None"),
            source_dir: None,
            histogram_path: String::from(DEFAULT_HISTOGRAM_PATH),
            detector_name: String::from(DEFAULT_DETECTOR_NAME),
            sensor_name: String::from(DEFAULT_SENSOR_NAME),
            crop: CropBounds::default(),
            background_threshold: DEFAULT_BACKGROUND_THRESHOLD,
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
            output_path: PathBuf::from("None"),
            normalized_path: None,
            merge_images: false,
            overwrite: false,
            prefixes: ImagePrefixMap::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn has_normalized_path(&self) -> bool {
        self.normalized_path.is_some()
    }

    /// Options for the TIFF export described by this config
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            merge_image_by_key: self.merge_images,
            overwrite: self.overwrite,
            prefixes: self.prefixes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.normalized_path = Some(PathBuf::from("/data/normalized"));
        config.merge_images = true;
        config.write_config_file(&path).unwrap();

        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.has_normalized_path());
        let options = loaded.export_options();
        assert!(options.merge_image_by_key);
        assert!(!options.overwrite);
        assert_eq!(options.prefixes, ImagePrefixMap::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(matches!(
            Config::read_config_file(&path),
            Err(ConfigError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
input_path: /data/ymir_4.h5
histogram_path: /entry/instrument/histogram_mode_detectors
detector_name: orca
sensor_name: motion_cabinet_2
output_path: /data/tiff
normalized_path: null
merge_images: false
overwrite: true
prefixes:
  sample: sample
  open_beam: open_beam
  dark_current: dark_current
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.input_path, PathBuf::from("/data/ymir_4.h5"));
        assert!(config.overwrite);
        assert!(!config.has_normalized_path());
        assert_eq!(config.prefixes.open_beam, "open_beam");
        assert_eq!(config.source_dir, None);
        assert_eq!(config.crop, CropBounds::default());
        assert_eq!(config.background_threshold, 1.0);
        assert_eq!(config.sample_threshold, 0.0);
    }

    #[test]
    fn test_parse_thresholds_and_crop() {
        let yaml = r#"
input_path: small_ymir_images.hdf
source_dir: /mnt/ymir
histogram_path: /entry/instrument/histogram_mode_detectors
detector_name: orca
sensor_name: motion_cabinet_2
crop:
  min_dim_1: 10
  max_dim_1: 100
  min_dim_2: null
  max_dim_2: 50
background_threshold: 2.0
sample_threshold: 0.5
output_path: /data/tiff
normalized_path: /data/normalized
merge_images: true
overwrite: false
prefixes:
  sample: sample
  open_beam: ob
  dark_current: dc
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source_dir, Some(PathBuf::from("/mnt/ymir")));
        assert_eq!(config.crop.min_dim_1, Some(10));
        assert_eq!(config.crop.max_dim_1, Some(100));
        assert_eq!(config.crop.min_dim_2, None);
        assert_eq!(config.crop.max_dim_2, Some(50));
        assert_eq!(config.background_threshold, 2.0);
        assert_eq!(config.sample_threshold, 0.5);
    }
}

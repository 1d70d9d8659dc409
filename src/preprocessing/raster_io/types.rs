//! GeoTIFF output configuration types

use serde::{Deserialize, Serialize};

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    #[default]
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

/// Configuration for writing a raster layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Compression method to use
    pub compression: TiffCompression,
    /// Predictor value for compression (2 for horizontal differencing).
    /// Only applied to integer layers.
    pub predictor: Option<u16>,
    /// Store `int8` layers as `int16`, moving the sentinel to the `int16` minimum,
    /// for viewers that cannot display signed 8-bit rasters.
    pub compatibility_mode: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: TiffCompression::None,
            predictor: None,
            compatibility_mode: false,
        }
    }
}

impl WriterConfig {
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }
}

/// Builder for WriterConfig
#[derive(Default)]
pub struct WriterConfigBuilder {
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
    compatibility_mode: Option<bool>,
}

impl WriterConfigBuilder {
    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn compatibility_mode(mut self, enable: bool) -> Self {
        self.compatibility_mode = Some(enable);
        self
    }

    pub fn build(self) -> WriterConfig {
        let default = WriterConfig::default();
        WriterConfig {
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
            compatibility_mode: self.compatibility_mode.unwrap_or(default.compatibility_mode),
        }
    }
}

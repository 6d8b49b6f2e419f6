//! Stream configuration and construction options
//!
//! Every setter clamps into the engine limits instead of rejecting. Fields
//! left unset are never pushed to the engine, which keeps its own default.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine::{
    Engine, MAX_CHANNELS, MAX_PITCH, MAX_RATE, MAX_SPEED, MAX_VOLUME, MIN_CHANNELS, MIN_PITCH,
    MIN_RATE, MIN_SPEED, MIN_VOLUME,
};
use crate::error::Result;

// ============================================================================
// Helper Functions
// ============================================================================

/// Clamp `value` into `[min, max]`; NaN leaves `current` untouched
fn clamp_param(name: &str, value: f32, min: f32, max: f32, current: Option<f32>) -> Option<f32> {
    if value.is_nan() {
        warn!("ignoring NaN {}", name);
        return current;
    }
    Some(value.clamp(min, max))
}

// ============================================================================
// Stream Configuration
// ============================================================================

/// Validated parameter set for a transformer
///
/// # Example
/// ```
/// use varispeed::stream::StreamConfig;
/// use varispeed::engine::MIN_SPEED;
///
/// let mut config = StreamConfig::default();
/// config.set_speed(-5.0);
/// assert_eq!(config.speed(), Some(MIN_SPEED));
/// assert_eq!(config.pitch(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    channels: u32,
    volume: Option<f32>,
    speed: Option<f32>,
    pitch: Option<f32>,
    rate: Option<f32>,
    quality: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            volume: None,
            speed: None,
            pitch: None,
            rate: None,
            quality: false,
        }
    }
}

impl StreamConfig {
    /// Build a configuration by applying `options` in order
    ///
    /// # Errors
    /// Returns the first error reported by an option, unchanged.
    pub fn from_options<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = StreamOption>,
    {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config)?;
        }
        Ok(config)
    }

    /// Load a preset from JSON, clamping every value
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: StreamConfig = serde_json::from_str(json)?;
        Ok(raw.normalized())
    }

    /// Store this configuration as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Re-apply every setter so deserialized values respect the limits
    fn normalized(self) -> Self {
        let mut config = Self::default();
        config.set_channels(self.channels);
        if let Some(volume) = self.volume {
            config.set_volume(volume);
        }
        if let Some(speed) = self.speed {
            config.set_speed(speed);
        }
        if let Some(pitch) = self.pitch {
            config.set_pitch(pitch);
        }
        if let Some(rate) = self.rate {
            config.set_rate(rate);
        }
        if self.quality {
            config.enable_quality();
        }
        config
    }

    /// Set the channel count, clamped to [1, 32]
    pub fn set_channels(&mut self, channels: u32) {
        self.channels = channels.clamp(MIN_CHANNELS, MAX_CHANNELS);
    }

    /// Set the volume scale factor, clamped to [0.01, 100]
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_param("volume", volume, MIN_VOLUME, MAX_VOLUME, self.volume);
    }

    /// Set the speed-up factor, clamped to [0.05, 20]
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = clamp_param("speed", speed, MIN_SPEED, MAX_SPEED, self.speed);
    }

    /// Set the pitch scale factor, clamped to [0.05, 20]
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = clamp_param("pitch", pitch, MIN_PITCH, MAX_PITCH, self.pitch);
    }

    /// Set the playback rate, clamped to [0.05, 20]
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = clamp_param("rate", rate, MIN_RATE, MAX_RATE, self.rate);
    }

    /// Disable the engine's speed-up heuristics
    ///
    /// There is no way to switch this back off; the default is off.
    pub fn enable_quality(&mut self) {
        self.quality = true;
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    pub fn speed(&self) -> Option<f32> {
        self.speed
    }

    pub fn pitch(&self) -> Option<f32> {
        self.pitch
    }

    pub fn rate(&self) -> Option<f32> {
        self.rate
    }

    pub fn quality(&self) -> bool {
        self.quality
    }

    /// Push the set fields to `engine` in volume, speed, pitch, rate, quality order
    pub fn apply_to<E: Engine + ?Sized>(&self, engine: &mut E) {
        if let Some(volume) = self.volume {
            engine.set_volume(volume);
        }
        if let Some(speed) = self.speed {
            engine.set_speed(speed);
        }
        if let Some(pitch) = self.pitch {
            engine.set_pitch(pitch);
        }
        if let Some(rate) = self.rate {
            engine.set_rate(rate);
        }
        if self.quality {
            engine.set_quality(true);
        }
    }
}

// ============================================================================
// Stream Options
// ============================================================================

type Mutator = Box<dyn FnOnce(&mut StreamConfig) -> Result<()> + Send>;

/// One configuration mutator, applied in order at construction
pub struct StreamOption(Mutator);

impl StreamOption {
    /// Wrap a caller-defined mutator
    ///
    /// An error returned here aborts construction before any engine exists.
    pub fn new<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut StreamConfig) -> Result<()> + Send + 'static,
    {
        Self(Box::new(mutator))
    }

    /// Apply this option to `config`
    pub fn apply(self, config: &mut StreamConfig) -> Result<()> {
        (self.0)(config)
    }
}

impl std::fmt::Debug for StreamOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamOption(..)")
    }
}

/// Set the channel count (default 1)
pub fn with_channels(channels: u32) -> StreamOption {
    StreamOption::new(move |config| {
        config.set_channels(channels);
        Ok(())
    })
}

/// Scale the volume; 2.0 doubles amplitude
pub fn with_volume(volume: f32) -> StreamOption {
    StreamOption::new(move |config| {
        config.set_volume(volume);
        Ok(())
    })
}

/// Scale the speed without changing pitch; 2.0 is twice as fast
pub fn with_speed(speed: f32) -> StreamOption {
    StreamOption::new(move |config| {
        config.set_speed(speed);
        Ok(())
    })
}

/// Scale the pitch without changing speed; 1.3 is 30% higher
pub fn with_pitch(pitch: f32) -> StreamOption {
    StreamOption::new(move |config| {
        config.set_pitch(pitch);
        Ok(())
    })
}

/// Scale the playback rate, changing speed and pitch together
pub fn with_rate(rate: f32) -> StreamOption {
    StreamOption::new(move |config| {
        config.set_rate(rate);
        Ok(())
    })
}

/// Disable speed-up heuristics; slower, sometimes cleaner
pub fn with_quality() -> StreamOption {
    StreamOption::new(|config| {
        config.enable_quality();
        Ok(())
    })
}

/// Replace the whole configuration, e.g. with a loaded preset
pub fn with_config(preset: StreamConfig) -> StreamOption {
    StreamOption::new(move |config| {
        *config = preset.normalized();
        Ok(())
    })
}

// ============================================================================
// Tests
// ============================================================================

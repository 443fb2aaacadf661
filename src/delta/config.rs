//! Delta cache configuration.
//!
//! Controlled through the `[delta]` table of `flagsync.toml`.

use std::num::NonZeroUsize;

const DEFAULT_MAX_LENGTH: usize = 20;

#[derive(Debug, Clone)]
pub struct DeltaConfig {
    /// Maximum number of events retained for incremental replay per cache.
    pub max_length: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl From<&crate::config::DeltaSettings> for DeltaConfig {
    fn from(settings: &crate::config::DeltaSettings) -> Self {
        Self {
            max_length: settings.max_length.get(),
        }
    }
}

impl DeltaConfig {
    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Returns the buffer bound as `NonZeroUsize`, clamping to 1 if zero.
    pub fn max_length_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_length).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retains_twenty_events() {
        assert_eq!(DeltaConfig::default().max_length, 20);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = DeltaConfig::with_max_length(0);
        assert_eq!(config.max_length_non_zero().get(), 1);
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::MltError;
use serde::{Deserialize, Serialize};

/// Tuning knobs for building and writing chunks. Missing fields take their
/// default values when deserializing.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MltConfig {
    /// Capacity of a freshly allocated writer buffer, in bytes.
    pub initial_buffer_capacity: usize,
    /// How many writer buffers are kept around for reuse.
    pub max_pooled_buffers: usize,
    /// Maximum number of frames stored inline in a single frame sequence.
    /// Smaller values share more of the stacks' tails at the cost of more
    /// stack pool entries.
    pub frames_per_sequence: usize,
}

impl MltConfig {
    pub const DEFAULT_INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
    pub const DEFAULT_MAX_POOLED_BUFFERS: usize = 4;
    pub const DEFAULT_FRAMES_PER_SEQUENCE: usize = 8;

    pub fn validate(&self) -> Result<(), MltError> {
        if self.frames_per_sequence == 0 {
            return Err(MltError::invalid_argument(
                "frames_per_sequence must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for MltConfig {
    fn default() -> Self {
        Self {
            initial_buffer_capacity: Self::DEFAULT_INITIAL_BUFFER_CAPACITY,
            max_pooled_buffers: Self::DEFAULT_MAX_POOLED_BUFFERS,
            frames_per_sequence: Self::DEFAULT_FRAMES_PER_SEQUENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: MltConfig = serde_json::from_str(r#"{"frames_per_sequence": 2}"#).unwrap();
        assert_eq!(config.frames_per_sequence, 2);
        assert_eq!(
            config.initial_buffer_capacity,
            MltConfig::DEFAULT_INITIAL_BUFFER_CAPACITY
        );
        assert_eq!(config.max_pooled_buffers, MltConfig::DEFAULT_MAX_POOLED_BUFFERS);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_sequences() {
        let config = MltConfig {
            frames_per_sequence: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MltError::InvalidArgument(_))));
    }
}

//! Session hyperparameters
//!
//! Every tuning session carries a serialized hyperparameter record. Defaults
//! follow the values the recommendation pipeline was originally tuned with.

use serde::{Deserialize, Serialize};

/// Hyperparameters governing the recommendation pipeline for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Number of top-ranked knobs retained by the mapper and combiner
    pub important_knob_number: usize,
    /// Number of uniform-random seed points for the surrogate search
    pub num_samples: usize,
    /// Number of best historical rows added to the seed set
    pub top_num_config: usize,
    /// Epsilon used to nudge historical seed points off evaluated configs
    pub gpr_eps: f64,
    /// Initial flip probability for binary repair randomization
    pub init_flip_prob: f64,
    /// Per-iteration decay of the flip probability
    pub flip_prob_decay: f64,
    /// Gradient-update epochs per RL training call
    pub ddpg_update_epochs: usize,
    /// Use the simple base-ratio reward instead of the shaped reward
    pub ddpg_simple_reward: bool,
    /// One-hot encode enum knobs before scaling
    pub enable_dummy_encoder: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            important_knob_number: 10,
            num_samples: 30,
            top_num_config: 10,
            gpr_eps: 0.001,
            init_flip_prob: 0.3,
            flip_prob_decay: 0.5,
            ddpg_update_epochs: 30,
            ddpg_simple_reward: false,
            enable_dummy_encoder: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Hyperparameters::default();
        assert_eq!(p.important_knob_number, 10);
        assert_eq!(p.top_num_config, 10);
        assert!(!p.ddpg_simple_reward);
        assert!(!p.enable_dummy_encoder);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let p: Hyperparameters = serde_json::from_str(r#"{"num_samples": 50}"#).unwrap();
        assert_eq!(p.num_samples, 50);
        assert_eq!(p.important_knob_number, 10);
    }
}

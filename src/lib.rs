//! # afinar
//!
//! Knob-configuration recommendation pipeline for automated DBMS tuning.
//!
//! Each benchmark trial flows through a short chain of stages: the aggregator
//! assembles the session's training data (or samples a cold-start
//! configuration), the mapper matches the target against historical
//! workloads, the combiner merges both into a scaled optimization problem,
//! and the search asks a pluggable surrogate model for the next configuration
//! to try. A reinforcement-learning path drives a persistent per-session
//! agent instead.
//!
//! Surrogate internals (Gaussian-process and neural regressors, the RL agent,
//! the Latin-Hypercube generator) live behind the traits in [`surrogate`];
//! this crate owns the data handling, preprocessing, and stage semantics.
//!
//! ```no_run
//! use afinar::pipeline::{stages_for, Algorithm};
//!
//! for stage in stages_for(Algorithm::Gpr) {
//!     println!("{stage:?}");
//! }
//! ```

pub mod aggregate;
pub mod align;
pub mod catalog;
pub mod combine;
pub mod mapping;
pub mod params;
pub mod pipeline;
pub mod preprocess;
pub mod rl;
pub mod search;
pub mod store;
pub mod surrogate;

#[cfg(test)]
mod testutil;

pub use catalog::{Knob, KnobType, KnobValue, Metric, MetricPolarity};
pub use params::Hyperparameters;
pub use pipeline::{Algorithm, PipelineError, Stage, StagePayload};
pub use store::{InMemoryStore, Observation, Recommendation, Session, Store, TuningMode, Workload};

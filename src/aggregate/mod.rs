//! Aggregate module
//!
//! The per-trainer workload aggregate and its year/month buckets.

pub mod trainer;

pub use trainer::{
    validate_period, MonthBucket, MonthlyWorkload, TrainerAggregate, TrainerProfile, YearBucket,
};

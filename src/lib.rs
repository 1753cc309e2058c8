//! Energy load forecasting pipeline.
//!
//! Raw grid and weather CSVs flow through feature engineering, categorical
//! encoding and scaling, model training/selection and finally an HTTP
//! prediction service. Every stage reads its inputs from, and writes its
//! outputs to, the directories named in [`config::Config`].

pub mod analysis;
pub mod api;
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ml;
pub mod pipeline;
pub mod preprocessing;
pub mod telemetry;
pub mod tracking;

pub use error::{PipelineError, Result};

//! Evaluation of scored test sets.

pub mod domain;
pub mod service;

pub use domain::{ConfusionMatrix, EvalReport};

//! Employee attrition prediction.
//!
//! The offline pipeline (get, clean, split, train, score, evaluate) and the
//! web front-end share one feature encoding so a form submission is scored
//! against exactly the columns the classifier was trained on.

pub mod common;
pub mod data;
pub mod features;
pub mod training;
pub mod inference;
pub mod evaluation;
pub mod api;

pub use common::error::{AttrResult, AttritionError, ErrorCode};

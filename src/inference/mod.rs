//! Schema inference: the only stage that talks to the AI capability
//!
//! Its output is pure data (`Inventory`); nothing it returns is ever
//! executed or emitted as code.

mod client;
mod engine;
mod schema;

pub use client::{CommandClient, InferenceClient, InferenceError, InferenceRequest, MockClient};
pub use engine::{select_samples, InferenceOutcome, InferenceState, SampleSet, SchemaInferenceEngine};
pub use schema::{EntitySpec, FieldSpec, FieldType, Inventory};

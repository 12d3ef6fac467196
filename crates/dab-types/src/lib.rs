#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Parameter-schema and candidate data model shared by the engine and CLI.

pub mod candidate;
pub mod error;
pub mod param;
pub mod schema;

pub use candidate::Candidate;
pub use error::SchemaError;
pub use param::{ParamKind, ParamValue, Parameter};
pub use schema::ParameterSchema;

use thiserror::Error;

/// Configuration-class failures: malformed or missing parameter schema.
///
/// These are always fatal at startup; callers should surface them as a
/// nonzero exit rather than retry.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("parameter {index} has max ({max}) < min ({min})")]
    MaxBelowMin { index: u32, min: f64, max: f64 },

    #[error("parameter {index} has step {step} > (max - min) {range}")]
    StepExceedsRange { index: u32, step: f64, range: f64 },

    #[error("duplicate parameter index {0}")]
    DuplicateIndex(u32),

    #[error("parameter indices are not dense: expected {expected}, found {found}")]
    NonDenseIndex { expected: u32, found: u32 },

    #[error("unknown parameter type {0:?}")]
    UnknownType(String),

    #[error("parameter {index} has no value for required attribute {attr}")]
    MissingAttr { index: u32, attr: &'static str },

    #[error("schema has no parameters")]
    Empty,
}

//! Crate-wide error kinds (spec §7: ConfigMissing, MeshInvalid, NonInvertibleMatrix,
//! TimestepCollapse, ValidationFailure).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HydroError {
    #[error("missing required parameter `{0}`")]
    ConfigMissing(String),

    #[error("parameter `{key}` could not be parsed as {expected}: `{value}`")]
    ConfigMalformed {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("mesh topology invalid: {0}")]
    MeshInvalid(String),

    #[error("3x3 matrix is not invertible (|det| = {0:e})")]
    NonInvertibleMatrix(f64),

    #[error("CFL timestep collapsed below floor ({dt:e} < {floor:e})")]
    TimestepCollapse { dt: f64, floor: f64 },

    #[error("validation failed: {field} expected {expected}, got {actual} (rel. err {rel_err:e})")]
    ValidationFailure {
        field: &'static str,
        expected: f64,
        actual: f64,
        rel_err: f64,
    },
}

pub type Result<T> = std::result::Result<T, HydroError>;

use num_bigint::BigUint;

/// Errors that can occur during factorization and cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("modulus {modulus} is too small for wheel factorization")]
    TooSmall { modulus: u64 },

    #[error("product of found factors exceeds the target")]
    ProductOverflow,

    #[error("failed to fully factor; composite residual {residual}")]
    Incomplete { residual: BigUint },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

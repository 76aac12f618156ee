use thiserror::Error;

/// Rejections raised when validating fingerprint/protocol parameters.
///
/// All parameter checking happens at construction time so that bit
/// arithmetic inside the fingerprint never has to re-validate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("fingerprint width must be between 1 and 64 bits, got {0}")]
    InvalidWidth(u8),

    #[error("counter region must be at least one bit")]
    ZeroCounterWidth,

    #[error("counter region ({counter} bits) must be narrower than the fingerprint ({width} bits)")]
    CounterTooWide { counter: u8, width: u8 },

    #[error("hash count must be positive")]
    ZeroHashCount,
}

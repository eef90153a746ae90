use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BLSError {
    #[error("Invalid encoding length {actual}, expected {expected:?}")]
    InvalidEncodingLength { actual: usize, expected: [usize; 2] },
    #[error("Bad point encoding")]
    BadEncoding,
    #[error("Point is not on the curve")]
    PointNotOnCurve,
    #[error("Point is not in the prime order subgroup")]
    PointNotInGroup,
    #[error("Point at infinity")]
    PointAtInfinity,
    #[error("Invalid secret key")]
    InvalidSecretKey,
    #[error("Invalid hex string")]
    InvalidHexString,
    #[error("Cannot aggregate an empty set")]
    EmptyAggregate,
    #[error("blst error: {0}")]
    Blst(String),
}

impl BLSError {
    pub(crate) fn check_length(actual: usize, expected: [usize; 2]) -> Result<(), BLSError> {
        if expected.contains(&actual) {
            return Ok(());
        }
        Err(BLSError::InvalidEncodingLength { actual, expected })
    }
}

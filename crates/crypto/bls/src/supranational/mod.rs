//! [`blst`] backed implementations of the signature traits.

pub mod private_key;
pub mod pubkey;
pub mod signature;

use blst::BLST_ERROR;

use crate::errors::BLSError;

impl From<BLST_ERROR> for BLSError {
    fn from(err: BLST_ERROR) -> Self {
        match err {
            BLST_ERROR::BLST_BAD_ENCODING => BLSError::BadEncoding,
            BLST_ERROR::BLST_POINT_NOT_ON_CURVE => BLSError::PointNotOnCurve,
            BLST_ERROR::BLST_POINT_NOT_IN_GROUP => BLSError::PointNotInGroup,
            BLST_ERROR::BLST_PK_IS_INFINITY => BLSError::PointAtInfinity,
            other => BLSError::Blst(format!("{other:?}")),
        }
    }
}

//! Caller identification.

use super::ApiError;
use crate::task::domain::UserId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the [`USER_ID_HEADER`] header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub UserId);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::validation(format!("missing {USER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::validation(format!("{USER_ID_HEADER} is not valid text")))?;
        let uuid = Uuid::parse_str(raw.trim())
            .map_err(|err| ApiError::validation(format!("{USER_ID_HEADER}: {err}")))?;
        Ok(Self(UserId::from_uuid(uuid)))
    }
}

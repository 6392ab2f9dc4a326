//! HTTP handlers

pub mod health;
pub mod progress;
pub mod upload;
pub mod video;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use vidstream_core::{AppError, VideoId};

use crate::constants::{ANONYMOUS_OWNER, USER_ID_HEADER};
use crate::error::HttpAppError;

/// Principal attached by the authentication layer in front of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(ANONYMOUS_OWNER);
        Ok(Owner(owner.to_string()))
    }
}

pub(crate) fn parse_video_id(raw: &str) -> Result<VideoId, HttpAppError> {
    VideoId::parse(raw.trim()).map_err(|e| HttpAppError(AppError::InvalidInput(e)))
}

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::domain::{Actor, ActorId, Role};

use super::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// 認証済みアクター（ハンドラーの引数）
///
/// 認証基盤が付与したヘッダから取り出す。トークンの発行・検証はこのサービスの外側で行う。
#[derive(Debug, Clone, Copy)]
pub struct ActorContext(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("{} header is not valid text", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = Uuid::parse_str(header(parts, ACTOR_ID_HEADER)?.trim())
            .map_err(|_| ApiError::Unauthorized("x-actor-id must be a UUID".to_string()))?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|e: crate::domain::ValueError| ApiError::Unauthorized(e.to_string()))?;

        Ok(Self(Actor::new(ActorId::from_uuid(id), role)))
    }
}

//! Personal access token handlers.

use jiff::Timestamp;
use portico_app::store::records::UserId;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    pipeline::CallResult,
    rpc::{
        Call, Dispatcher, Reply, Status,
        handlers::views::{AccessTokenView, ensure, reply},
    },
};

#[derive(Debug, Deserialize)]
struct CreateTokenRequest {
    id: UserId,
    #[serde(default)]
    description: String,
    #[serde(default)]
    expires_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct ListTokensRequest {
    id: UserId,
}

#[derive(Debug, Deserialize)]
struct DeleteTokenRequest {
    id: UserId,
    token: Uuid,
}

pub(crate) async fn create(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: CreateTokenRequest = call.decode()?;

    ensure(principal.can_manage(request.id))?;

    if request
        .expires_at
        .is_some_and(|expires_at| expires_at <= Timestamp::now())
    {
        return Err(Status::invalid_argument("expires_at must be in the future"));
    }

    let created = dispatcher
        .auth
        .create_personal_token(request.id, request.description, request.expires_at)
        .await?;

    // The plaintext token is only ever returned here.
    reply(&json!({
        "token": created.token,
        "access_token": AccessTokenView::from(&created.record),
    }))
}

pub(crate) async fn list(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: ListTokensRequest = call.decode()?;

    ensure(principal.can_manage(request.id))?;

    let tokens = dispatcher.auth.list_personal_tokens(request.id).await?;
    let tokens: Vec<AccessTokenView> = tokens.iter().map(AccessTokenView::from).collect();

    reply(&json!({ "access_tokens": tokens }))
}

pub(crate) async fn delete(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: DeleteTokenRequest = call.decode()?;

    ensure(principal.can_manage(request.id))?;

    dispatcher
        .auth
        .delete_personal_token(request.id, request.token)
        .await?;

    Ok(Reply::empty())
}

//! `AuthService` handlers.

use jiff::Timestamp;
use portico_app::{
    auth::{REFRESH_COOKIE, Session},
    store::records::Role,
    users::NewAccount,
};
use serde::Deserialize;

use crate::{
    pipeline::CallResult,
    rpc::{
        Call, Dispatcher, Reply, SetCookie, Status, Surface,
        handlers::views::{SessionView, UserView, reply},
    },
};

#[derive(Debug, Deserialize)]
struct SignInRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignUpRequest {
    username: String,
    password: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

pub(crate) async fn sign_in(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let request: SignInRequest = call.decode()?;

    let session = dispatcher
        .auth
        .sign_in(&request.username, &request.password)
        .await?;

    session_reply(call, &session)
}

pub(crate) async fn sign_up(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let request: SignUpRequest = call.decode()?;

    let user = dispatcher
        .users
        .sign_up(NewAccount {
            username: request.username,
            password: request.password,
            nickname: request.nickname,
            email: request.email,
            role: Role::Regular,
        })
        .await?;

    let session = dispatcher.auth.issue_session(&user).await?;

    session_reply(call, &session)
}

pub(crate) async fn sign_out(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let token = presented_refresh_token(call)?;

    dispatcher.auth.sign_out(token).await?;

    Ok(Reply::empty().with_cookie(SetCookie::removal(REFRESH_COOKIE)))
}

pub(crate) async fn refresh_token(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let token = presented_refresh_token(call)?
        .ok_or_else(|| Status::unauthenticated("missing refresh token"))?;

    let session = dispatcher.auth.refresh(&token).await?;

    session_reply(call, &session)
}

pub(crate) async fn current_user(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;

    let user = dispatcher.users.get_user(principal.user_id).await?;

    reply(&UserView::from(&user))
}

/// Cookie first, then the message body for clients without a cookie jar.
fn presented_refresh_token(call: &Call) -> Result<Option<String>, Status> {
    if let Some(token) = &call.metadata.refresh_token {
        return Ok(Some(token.clone()));
    }

    let request: RefreshRequest = call.decode()?;

    Ok(request.refresh_token.filter(|token| !token.is_empty()))
}

fn session_reply(call: &Call, session: &Session) -> CallResult {
    let max_age = (session.refresh_expires_at.as_second() - Timestamp::now().as_second()).max(0);

    let view = SessionView::new(session, call.surface == Surface::Native);

    Ok(reply(&view)?.with_cookie(SetCookie::new(
        REFRESH_COOKIE,
        session.refresh_token.clone(),
        max_age,
    )))
}

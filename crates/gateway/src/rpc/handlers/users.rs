//! `UserService` account handlers.

use portico_app::{
    store::{
        data::FindUser,
        records::{Role, UserId, UserStatus},
    },
    users::{AccountPatch, NewAccount},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    pipeline::CallResult,
    rpc::{
        Call, Dispatcher, Reply, Status,
        handlers::views::{UserView, ensure, reply},
    },
};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Deserialize)]
struct UserIdRequest {
    id: UserId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListUsersRequest {
    username: Option<String>,
    role: Option<Role>,
    status: Option<UserStatus>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    email: String,
    #[serde(default = "default_role")]
    role: Role,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    id: UserId,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    status: Option<UserStatus>,
    #[serde(default)]
    password: Option<String>,
}

const fn default_role() -> Role {
    Role::Regular
}

pub(crate) async fn get(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: UserIdRequest = call.decode()?;

    ensure(principal.can_manage(request.id) || principal.can_read_all_users())?;

    let user = dispatcher.users.get_user(request.id).await?;

    reply(&UserView::from(&user))
}

pub(crate) async fn list(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: ListUsersRequest = call.decode()?;

    ensure(principal.can_read_all_users())?;

    let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(Status::invalid_argument(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let users = dispatcher
        .users
        .list_users(FindUser {
            username: request.username,
            role: request.role,
            status: request.status,
            limit: Some(limit),
            offset: request.offset,
            ..FindUser::default()
        })
        .await?;

    let users: Vec<UserView> = users.iter().map(UserView::from).collect();

    reply(&json!({ "users": users }))
}

pub(crate) async fn create(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: CreateUserRequest = call.decode()?;

    ensure(principal.is_admin())?;

    let user = dispatcher
        .users
        .create_user(NewAccount {
            username: request.username,
            password: request.password,
            nickname: request.nickname,
            email: request.email,
            role: request.role,
        })
        .await?;

    reply(&UserView::from(&user))
}

pub(crate) async fn update(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: UpdateUserRequest = call.decode()?;

    ensure(principal.can_manage(request.id))?;

    // Only administrators change roles or lifecycle status.
    if request.role.is_some() || request.status.is_some() {
        ensure(principal.is_admin())?;
    }

    let user = dispatcher
        .users
        .update_user(AccountPatch {
            id: request.id,
            username: request.username,
            nickname: request.nickname,
            email: request.email,
            role: request.role,
            status: request.status,
            password: request.password,
        })
        .await?;

    reply(&UserView::from(&user))
}

pub(crate) async fn delete(dispatcher: &Dispatcher, call: &Call) -> CallResult {
    let principal = call.principal()?;
    let request: UserIdRequest = call.decode()?;

    ensure(principal.is_admin())?;

    dispatcher.users.delete_user(request.id).await?;

    Ok(Reply::empty())
}

//! Shared builders for handler tests.

use std::{net::SocketAddr, sync::Arc};

use http::HeaderMap;
use jiff::Timestamp;
use portico_app::{
    auth::{CredentialKind, MockAuthService, Principal},
    instance::MockInstanceService,
    store::records::{Role, UserId, UserRecord, UserStatus},
    users::MockUsersService,
};
use serde_json::Value;

use crate::rpc::{Call, Dispatcher, Surface};

pub(crate) fn user(id: UserId, role: Role) -> UserRecord {
    UserRecord {
        id,
        username: format!("user{id}"),
        nickname: String::new(),
        email: String::new(),
        role,
        status: UserStatus::Active,
        password_hash: String::new(),
        created_at: Timestamp::UNIX_EPOCH,
        updated_at: Timestamp::UNIX_EPOCH,
    }
}

pub(crate) fn principal(user_id: UserId, role: Role) -> Principal {
    Principal {
        user_id,
        username: format!("user{user_id}"),
        role,
        credential: CredentialKind::AccessToken,
    }
}

/// Dispatcher over strict mocks: unexpected service calls fail the test.
pub(crate) fn dispatcher(
    auth: MockAuthService,
    users: MockUsersService,
    instance: MockInstanceService,
) -> Dispatcher {
    Dispatcher::new(Arc::new(auth), Arc::new(users), Arc::new(instance))
}

pub(crate) fn call_as(method: &str, caller: Option<Principal>, payload: Value) -> Call {
    let mut call = Call::new(
        method,
        Surface::Rest,
        SocketAddr::from(([127, 0, 0, 1], 40_000)),
        HeaderMap::new(),
        payload,
    );
    call.principal = caller;
    call
}

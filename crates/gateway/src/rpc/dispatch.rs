//! Method id to handler routing.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use portico_app::{auth::AuthService, instance::InstanceService, users::UsersService};

use crate::{
    pipeline::{CallHandler, CallResult},
    rpc::{Call, Status, handlers, methods},
};

/// Business capability shared by every surface.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub(crate) auth: Arc<dyn AuthService>,
    pub(crate) users: Arc<dyn UsersService>,
    pub(crate) instance: Arc<dyn InstanceService>,
}

impl Dispatcher {
    pub(crate) fn new(
        auth: Arc<dyn AuthService>,
        users: Arc<dyn UsersService>,
        instance: Arc<dyn InstanceService>,
    ) -> Self {
        Self {
            auth,
            users,
            instance,
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl CallHandler for Dispatcher {
    async fn handle(&self, call: Call) -> CallResult {
        match call.method.as_str() {
            methods::SIGN_IN => handlers::auth::sign_in(self, &call).await,
            methods::SIGN_UP => handlers::auth::sign_up(self, &call).await,
            methods::SIGN_OUT => handlers::auth::sign_out(self, &call).await,
            methods::REFRESH_TOKEN => handlers::auth::refresh_token(self, &call).await,
            methods::GET_CURRENT_USER => handlers::auth::current_user(self, &call).await,

            methods::GET_USER => handlers::users::get(self, &call).await,
            methods::LIST_USERS => handlers::users::list(self, &call).await,
            methods::CREATE_USER => handlers::users::create(self, &call).await,
            methods::UPDATE_USER => handlers::users::update(self, &call).await,
            methods::DELETE_USER => handlers::users::delete(self, &call).await,
            methods::CREATE_PERSONAL_ACCESS_TOKEN => {
                handlers::tokens::create(self, &call).await
            }
            methods::LIST_PERSONAL_ACCESS_TOKENS => handlers::tokens::list(self, &call).await,
            methods::DELETE_PERSONAL_ACCESS_TOKEN => {
                handlers::tokens::delete(self, &call).await
            }

            methods::GET_INSTANCE_PROFILE => handlers::instance::profile(self).await,

            other => Err(Status::unimplemented(other)),
        }
    }
}

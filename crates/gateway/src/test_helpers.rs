//! Test helpers.

use std::sync::Arc;

use portico_app::{auth::MockAuthService, instance::MockInstanceService, users::MockUsersService};
use tokio::sync::watch;

use crate::{
    adapters::HttpGateway,
    pipeline,
    rpc::Dispatcher,
    state::State,
};

const TEST_MAX_BODY_BYTES: usize = 64 * 1024;

/// Standard pipeline over the given mocks, with no default deadline.
pub(crate) fn state_with(
    auth: MockAuthService,
    users: MockUsersService,
    instance: MockInstanceService,
) -> Arc<State> {
    let auth = Arc::new(auth);
    let dispatcher = Dispatcher::new(auth.clone(), Arc::new(users), Arc::new(instance));

    Arc::new(State::new(
        pipeline::standard(auth, None, Arc::new(dispatcher)),
        TEST_MAX_BODY_BYTES,
    ))
}

/// Gateway whose shutdown trigger never fires.
pub(crate) fn gateway(state: Arc<State>) -> HttpGateway {
    let (_trigger, shutdown) = watch::channel(false);

    HttpGateway::new(state, shutdown)
}

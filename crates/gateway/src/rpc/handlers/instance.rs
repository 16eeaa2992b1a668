//! `InstanceService` handlers.

use crate::{
    pipeline::CallResult,
    rpc::{Dispatcher, handlers::views::reply},
};

pub(crate) async fn profile(dispatcher: &Dispatcher) -> CallResult {
    let profile = dispatcher.instance.profile().await?;

    reply(&profile)
}

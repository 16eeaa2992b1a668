//! Protocol-neutral calls and the business dispatcher behind every surface.

mod call;
mod dispatch;
mod handlers;
pub(crate) mod methods;
mod status;

pub(crate) use call::*;
pub(crate) use dispatch::Dispatcher;
pub(crate) use status::*;

//! Ordered interceptor chain applied to every call on every surface.
//!
//! Stages are composed once at startup by [`PipelineBuilder`]; each stage
//! receives the call plus a [`Next`] handle and decides whether to continue.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use portico_app::auth::AuthService;

use crate::rpc::{Call, Reply, Status};

mod auth;
mod deadline;
mod logging;
mod normalize;
mod recover;

pub(crate) use auth::Authenticate;
pub(crate) use deadline::Deadline;
pub(crate) use logging::Logging;
pub(crate) use normalize::Normalize;
pub(crate) use recover::Recover;

pub(crate) type CallResult = Result<Reply, Status>;

/// Terminal business handler.
#[async_trait]
pub(crate) trait CallHandler: Send + Sync {
    async fn handle(&self, call: Call) -> CallResult;
}

#[async_trait]
pub(crate) trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult;
}

/// Remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub(crate) struct Next<'a> {
    stages: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn CallHandler,
}

impl Next<'_> {
    pub(crate) async fn run(self, call: Call) -> CallResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .intercept(
                        call,
                        Next {
                            stages: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            }
            None => self.handler.handle(call).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct Pipeline {
    stages: Arc<[Arc<dyn Interceptor>]>,
    handler: Arc<dyn CallHandler>,
}

impl Pipeline {
    pub(crate) async fn call(&self, call: Call) -> CallResult {
        Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        }
        .run(call)
        .await
    }

    pub(crate) fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub(crate) struct PipelineBuilder {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn with(mut self, stage: impl Interceptor + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub(crate) fn build(self, handler: Arc<dyn CallHandler>) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
            handler,
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

/// The gateway's fixed stage order.
pub(crate) fn standard(
    auth: Arc<dyn AuthService>,
    default_deadline: Option<Duration>,
    handler: Arc<dyn CallHandler>,
) -> Pipeline {
    PipelineBuilder::new()
        .with(Normalize)
        .with(Logging)
        .with(Recover)
        .with(Deadline::new(default_deadline))
        .with(Authenticate::new(auth))
        .build(handler)
}

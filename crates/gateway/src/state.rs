//! State

use std::{sync::Arc, time::Duration};

use portico_app::context::AppContext;

use crate::{
    adapters::CorsPolicy,
    pipeline::{self, Pipeline},
    rpc::Dispatcher,
};

/// Everything a connection needs to serve calls.
#[derive(Debug, Clone)]
pub(crate) struct State {
    pub(crate) pipeline: Pipeline,
    pub(crate) max_body_bytes: usize,
    pub(crate) cors: CorsPolicy,
}

impl State {
    #[must_use]
    pub(crate) fn new(pipeline: Pipeline, max_body_bytes: usize) -> Self {
        Self {
            pipeline,
            max_body_bytes,
            cors: CorsPolicy::default(),
        }
    }

    #[must_use]
    pub(crate) fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    /// Compose the standard pipeline over the application services.
    #[must_use]
    pub(crate) fn from_app_context(
        app: &AppContext,
        default_deadline: Option<Duration>,
        max_body_bytes: usize,
        cors: CorsPolicy,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(
            Arc::clone(&app.auth),
            Arc::clone(&app.users),
            Arc::clone(&app.instance),
        );

        let pipeline = pipeline::standard(
            Arc::clone(&app.auth),
            default_deadline,
            Arc::new(dispatcher),
        );

        Arc::new(Self::new(pipeline, max_body_bytes).with_cors(cors))
    }
}

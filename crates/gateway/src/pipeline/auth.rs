//! Authentication stage.
//!
//! Public methods accept an optional credential; everything else requires a
//! valid bearer credential before the dispatcher runs.

use std::sync::Arc;

use async_trait::async_trait;
use portico_app::auth::AuthService;
use tracing::debug;

use crate::{
    pipeline::{CallResult, Interceptor, Next},
    rpc::{Call, Status, methods},
};

#[derive(Clone)]
pub(crate) struct Authenticate {
    auth: Arc<dyn AuthService>,
}

impl Authenticate {
    pub(crate) fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }
}

impl std::fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticate").finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        let public = methods::is_public(&call.method);

        let Some(credential) = call.metadata.bearer.as_deref() else {
            if public {
                return next.run(call).await;
            }

            return Err(Status::unauthenticated("missing bearer credential"));
        };

        match self.auth.authenticate_bearer(credential).await {
            Ok(principal) => {
                call.principal = Some(principal);
                next.run(call).await
            }
            Err(error) if public => {
                debug!(
                    method = %call.method,
                    "ignoring invalid credential on public method: {error}"
                );
                next.run(call).await
            }
            Err(error) => Err(error.into()),
        }
    }
}

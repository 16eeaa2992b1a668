//! Bound the rest of the chain by the caller's deadline.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::{
    pipeline::{CallResult, Interceptor, Next},
    rpc::{Call, Status},
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    default: Option<Duration>,
}

impl Deadline {
    /// `default` applies to calls that carry no `grpc-timeout`.
    pub(crate) const fn new(default: Option<Duration>) -> Self {
        Self { default }
    }
}

#[async_trait]
impl Interceptor for Deadline {
    fn name(&self) -> &'static str {
        "deadline"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let Some(deadline) = call.metadata.deadline.or(self.default) else {
            return next.run(call).await;
        };

        // Timing out drops the inner future, cancelling any pending storage call.
        time::timeout(deadline, next.run(call))
            .await
            .unwrap_or_else(|_| Err(Status::deadline_exceeded()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use testresult::TestResult;

    use super::*;
    use crate::{
        pipeline::{CallHandler, PipelineBuilder, testing::*},
        rpc::{Code, Reply},
    };

    #[derive(Default)]
    struct Slow {
        finished: AtomicBool,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CallHandler for Slow {
        async fn handle(&self, _call: Call) -> CallResult {
            let _flag = DropFlag(Arc::clone(&self.dropped));

            time::sleep(Duration::from_secs(10)).await;
            self.finished.store(true, Ordering::SeqCst);

            Ok(Reply::empty())
        }
    }

    fn with_deadline(deadline: Duration) -> Call {
        let mut call = call("/slow");
        call.metadata.deadline = Some(deadline);
        call
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_cancels_the_handler() {
        let slow = Arc::new(Slow::default());
        let pipeline = PipelineBuilder::new()
            .with(Deadline::new(None))
            .build(slow.clone());

        let result = pipeline.call(with_deadline(Duration::from_secs(1))).await;

        assert!(matches!(result, Err(status) if status.code == Code::DeadlineExceeded));
        assert!(slow.dropped.load(Ordering::SeqCst), "handler future dropped");
        assert!(!slow.finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn generous_deadline_lets_the_call_finish() -> TestResult {
        let slow = Arc::new(Slow::default());
        let pipeline = PipelineBuilder::new()
            .with(Deadline::new(None))
            .build(slow.clone());

        pipeline.call(with_deadline(Duration::from_secs(30))).await?;

        assert!(slow.finished.load(Ordering::SeqCst));

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn default_applies_without_grpc_timeout() {
        let pipeline = PipelineBuilder::new()
            .with(Deadline::new(Some(Duration::from_secs(2))))
            .build(Arc::new(Slow::default()));

        let result = pipeline.call(call("/slow")).await;

        assert!(matches!(result, Err(status) if status.code == Code::DeadlineExceeded));
    }
}

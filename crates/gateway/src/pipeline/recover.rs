//! Panic containment: one panicking call fails alone.

use std::{any::Any, panic::AssertUnwindSafe};

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::error;

use crate::{
    pipeline::{CallResult, Interceptor, Next},
    rpc::{Call, Status},
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Recover;

#[async_trait]
impl Interceptor for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let method = call.method.clone();

        match AssertUnwindSafe(next.run(call)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                error!(
                    method = %method,
                    panic = %panic_message(payload.as_ref()),
                    "call handler panicked"
                );

                Err(Status::internal())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testresult::TestResult;

    use super::*;
    use crate::{
        pipeline::{CallHandler, PipelineBuilder, testing::*},
        rpc::{Code, INTERNAL_MESSAGE},
    };

    struct Explode;

    #[async_trait]
    #[expect(clippy::panic, reason = "exercising panic containment")]
    impl CallHandler for Explode {
        async fn handle(&self, call: Call) -> CallResult {
            panic!("secret detail for {}", call.method);
        }
    }

    #[tokio::test]
    async fn panic_becomes_an_opaque_internal_status() {
        let pipeline = PipelineBuilder::new()
            .with(Recover)
            .build(Arc::new(Explode));

        let result = pipeline.call(call("/boom")).await;

        let Err(status) = result else {
            unreachable!("a panicking handler cannot succeed");
        };

        assert_eq!(status.code, Code::Internal);
        assert_eq!(status.message, INTERNAL_MESSAGE);
        assert!(!status.message.contains("secret"));
    }

    #[tokio::test]
    async fn later_calls_are_unaffected() -> TestResult {
        let echo = Echo::shared();
        let exploding = PipelineBuilder::new()
            .with(Recover)
            .build(Arc::new(Explode));
        let healthy = PipelineBuilder::new().with(Recover).build(echo.clone());

        let _failed = exploding.call(call("/boom")).await;
        healthy.call(call("/ok")).await?;

        assert_eq!(echo.count(), 1);

        Ok(())
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let literal: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(literal.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}

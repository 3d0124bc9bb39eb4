//! Tool dispatch bridge
//!
//! Turns a model tool-call frame into exactly one structured outcome. Every
//! failure mode (unknown name, bad arguments, operation error, timeout,
//! cancellation) becomes `{success: false, error}` rather than an error
//! value, so the caller always has something to send back to the model.

use crate::domain::tool::{
    BusinessOperations, OperationError, ToolContext, ToolInvocation, ToolName, ToolOutcome,
};
use crate::infrastructure::metrics;
use crate::infrastructure::retry::{retry_with_backoff, RetryError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tool call as emitted by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFrame {
    pub correlation_id: String,
    pub name: String,
    /// Serialized JSON arguments
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub outcome: ToolOutcome,
    pub latency: Duration,
}

pub struct ToolDispatcher {
    operations: Arc<dyn BusinessOperations>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ToolDispatcher {
    /// `timeout` bounds the whole call, retries of transient errors included
    pub fn new(operations: Arc<dyn BusinessOperations>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            operations,
            timeout,
            policy,
        }
    }

    pub async fn dispatch(
        &self,
        context: &ToolContext,
        frame: &ToolCallFrame,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let started = Instant::now();
        let outcome = self.run(context, frame, cancel).await;
        let latency = started.elapsed();

        metrics::record_tool_call(tool_label(&frame.name), outcome.success, latency);
        debug!(
            "Tool {} ({}) for call {} finished in {:?}: success={}",
            frame.name, frame.correlation_id, context.call_id, latency, outcome.success
        );
        DispatchResult { outcome, latency }
    }

    async fn run(
        &self,
        context: &ToolContext,
        frame: &ToolCallFrame,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let Some(name) = ToolName::from_str(&frame.name) else {
            warn!("Model called unknown tool {} on call {}", frame.name, context.call_id);
            return ToolOutcome::failure("unknown_tool");
        };

        let invocation = match ToolInvocation::parse(name, &frame.arguments) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Invalid arguments for {} on call {}: {}", name, context.call_id, e);
                return ToolOutcome::failure(format!("invalid_arguments: {}", e));
            }
        };

        let operations = &self.operations;
        let invocation = &invocation;
        let attempts = retry_with_backoff(
            &self.policy,
            cancel,
            OperationError::is_transient,
            move |_| operations.execute(context, invocation),
        );

        match tokio::time::timeout(self.timeout, attempts).await {
            Ok(Ok(data)) => ToolOutcome::ok(data),
            Ok(Err(RetryError::Exhausted { last, .. })) | Ok(Err(RetryError::NonRetryable(last))) => {
                warn!("Tool {} failed on call {}: {}", name, context.call_id, last);
                ToolOutcome::failure(last.to_string())
            }
            Ok(Err(RetryError::Cancelled)) => ToolOutcome::failure("cancelled"),
            Err(_) => {
                warn!("Tool {} timed out on call {}", name, context.call_id);
                ToolOutcome::failure(format!("timeout after {}ms", self.timeout.as_millis()))
            }
        }
    }
}

/// Metric label for a model-supplied tool name; names outside the catalogue
/// share one label
fn tool_label(name: &str) -> &'static str {
    ToolName::from_str(name).map_or("unknown", |name| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::CallId;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails transiently `failures` times, then answers
    struct FlakyOperations {
        failures: u32,
        calls: AtomicU32,
        delay: Duration,
    }

    #[async_trait]
    impl BusinessOperations for FlakyOperations {
        async fn execute(
            &self,
            _context: &ToolContext,
            invocation: &ToolInvocation,
        ) -> Result<Value, OperationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.failures {
                return Err(OperationError::Unavailable("upstream 503".into()));
            }
            match invocation {
                ToolInvocation::CheckRideStatus(args) if args.ride_id == "missing" => {
                    Err(OperationError::Rejected("ride not found".into()))
                }
                other => Ok(json!({ "tool": other.name().as_str() })),
            }
        }
    }

    fn dispatcher(failures: u32, delay: Duration) -> (ToolDispatcher, Arc<FlakyOperations>) {
        let ops = Arc::new(FlakyOperations {
            failures,
            calls: AtomicU32::new(0),
            delay,
        });
        (
            ToolDispatcher::new(
                ops.clone(),
                Duration::from_secs(8),
                RetryPolicy::new(2, Duration::from_millis(100), Duration::from_millis(1000)),
            ),
            ops,
        )
    }

    fn context() -> ToolContext {
        ToolContext {
            call_id: CallId::new(),
            from_address: "+250788000111".into(),
            agent_id: None,
        }
    }

    fn frame(name: &str, arguments: &str) -> ToolCallFrame {
        ToolCallFrame {
            correlation_id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool() {
        let (dispatcher, ops) = dispatcher(0, Duration::ZERO);
        let result = dispatcher
            .dispatch(&context(), &frame("launch_rocket", "{}"), &CancellationToken::new())
            .await;
        assert_eq!(result.outcome, ToolOutcome::failure("unknown_tool"));
        assert_eq!(ops.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments() {
        let (dispatcher, _) = dispatcher(0, Duration::ZERO);
        let result = dispatcher
            .dispatch(&context(), &frame("check_ride_status", "{\"ride\":1}"), &CancellationToken::new())
            .await;
        assert!(!result.outcome.success);
        assert!(result
            .outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("invalid_arguments: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried() {
        let (dispatcher, ops) = dispatcher(2, Duration::ZERO);
        let result = dispatcher
            .dispatch(
                &context(),
                &frame("check_ride_status", "{\"ride_id\":\"R1\"}"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.outcome, ToolOutcome::ok(json!({ "tool": "check_ride_status" })));
        assert_eq!(ops.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_not_retried() {
        let (dispatcher, ops) = dispatcher(0, Duration::ZERO);
        let result = dispatcher
            .dispatch(
                &context(),
                &frame("check_ride_status", "{\"ride_id\":\"missing\"}"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.outcome, ToolOutcome::failure("ride not found"));
        assert_eq!(ops.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_produces_failure() {
        let (dispatcher, _) = dispatcher(0, Duration::from_secs(30));
        let result = dispatcher
            .dispatch(
                &context(),
                &frame("search_knowledge_base", "{\"query\":\"fares\"}"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.outcome, ToolOutcome::failure("timeout after 8000ms"));
        assert_eq!(result.latency, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_dispatch() {
        let (dispatcher, _) = dispatcher(0, Duration::from_secs(3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result = dispatcher
            .dispatch(&context(), &frame("transfer_to_human", "{\"reason\":\"angry\"}"), &cancel)
            .await;
        assert_eq!(result.outcome, ToolOutcome::failure("cancelled"));
    }

    #[test]
    fn test_unknown_tool_names_share_one_label() {
        assert_eq!(tool_label("schedule_ride"), "schedule_ride");
        assert_eq!(tool_label("drop_all_tables"), "unknown");
        assert_eq!(tool_label(""), "unknown");
    }
}

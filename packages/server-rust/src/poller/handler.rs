//! Servicer-side execution of dispensed calls.

use std::sync::Arc;

use async_trait::async_trait;
use callrelay_core::{Call, CallResult, Value};
use dashmap::DashMap;

// ---------------------------------------------------------------------------
// CallHandler trait
// ---------------------------------------------------------------------------

/// Executes a pulled call and produces the result posted back to the relay.
///
/// Implementations report failures as [`CallResult::Error`]; the poller
/// turns a panicking handler into an error result as well.
#[async_trait]
pub trait CallHandler: Send + Sync + 'static {
    async fn handle(&self, call: Call) -> CallResult;
}

// ---------------------------------------------------------------------------
// OperationHandler trait
// ---------------------------------------------------------------------------

/// A single named operation registered with a [`HandlerRegistry`].
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Runs the operation. `Err` carries the message passed back to the
    /// submitter verbatim.
    async fn invoke(&self, params: Vec<Value>) -> Result<Value, String>;
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Dispatches calls to operation handlers by operation name.
#[derive(Default)]
pub struct HandlerRegistry {
    by_name: DashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in operations (`echo`) installed.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("echo", EchoHandler);
        registry
    }

    /// Registers `handler` under `name`, replacing any earlier registration.
    pub fn register(&self, name: impl Into<String>, handler: impl OperationHandler + 'static) {
        self.by_name.insert(name.into(), Arc::new(handler));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CallHandler for HandlerRegistry {
    async fn handle(&self, call: Call) -> CallResult {
        // Clone the handler out so no map guard is held across the await.
        let handler = self.by_name.get(&call.operation).map(|e| Arc::clone(e.value()));
        let Some(handler) = handler else {
            return CallResult::failure(format!("Unknown method {}", call.operation));
        };
        match handler.invoke(call.params).await {
            Ok(value) => CallResult::Value(value),
            Err(message) => CallResult::Error(message),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in operations
// ---------------------------------------------------------------------------

/// Returns its single parameter unchanged, or the parameter list when given
/// more or fewer than one.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl OperationHandler for EchoHandler {
    async fn invoke(&self, mut params: Vec<Value>) -> Result<Value, String> {
        if params.len() == 1 {
            Ok(params.remove(0))
        } else {
            Ok(Value::Array(params))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Fails;

    #[async_trait]
    impl OperationHandler for Fails {
        async fn invoke(&self, _params: Vec<Value>) -> Result<Value, String> {
            Err("storage offline".to_string())
        }
    }

    #[tokio::test]
    async fn echo_returns_single_param() {
        let registry = HandlerRegistry::with_builtins();
        let result = registry.handle(Call::new("t", "echo", vec![json!("hi")])).await;
        assert_eq!(result, CallResult::success("hi"));

        let result = registry
            .handle(Call::new("t", "echo", vec![json!(1), json!(2)]))
            .await;
        assert_eq!(result, CallResult::success(json!([1, 2])));
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error_result() {
        let registry = HandlerRegistry::with_builtins();
        let result = registry.handle(Call::new("t", "launch", Vec::new())).await;
        assert_eq!(result, CallResult::failure("Unknown method launch"));
    }

    #[tokio::test]
    async fn handler_failure_passes_message_through() {
        let registry = HandlerRegistry::new();
        registry.register("save", Fails);
        assert!(registry.contains("save"));
        let result = registry.handle(Call::new("t", "save", Vec::new())).await;
        assert_eq!(result, CallResult::failure("storage offline"));
    }

    #[test]
    fn names_are_sorted() {
        let registry = HandlerRegistry::with_builtins();
        registry.register("alpha", EchoHandler);
        assert_eq!(registry.names(), vec!["alpha".to_string(), "echo".to_string()]);
    }
}

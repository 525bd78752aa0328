//! Connector trait and operation types.
//!
//! All external systems are reached through the Connector trait, giving the
//! dispatcher a uniform interface regardless of the wire protocol behind it.

use crate::error::ConnectorError;
use crate::record::ConnectorSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// An operation request against an external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Requested resource (e.g. `database`).
    pub resource: String,
    /// Requested action (e.g. `query`).
    pub action: String,
    /// Operation parameters.
    pub params: JsonValue,
}

impl Operation {
    /// Creates a new operation with empty parameters.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            params: JsonValue::Object(Default::default()),
        }
    }

    /// Sets all parameters at once.
    #[must_use]
    pub fn with_params(mut self, params: JsonValue) -> Self {
        self.params = params;
        self
    }
}

/// The result of a successful operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Output data.
    pub data: JsonValue,
    /// Number of external API calls made.
    pub api_calls: u32,
}

impl OperationResult {
    /// Creates a result with a single API call recorded.
    #[must_use]
    pub fn new(data: JsonValue) -> Self {
        Self { data, api_calls: 1 }
    }
}

/// The narrow interface to one external system.
///
/// Concrete wire protocols (cache clients, SQL drivers, SaaS APIs) live
/// behind this trait; the gateway only decides whether a call may proceed
/// and records the outcome.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Executes an operation against the external system.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the parameters are invalid.
    async fn execute(&self, operation: Operation) -> Result<OperationResult, ConnectorError>;

    /// Checks whether the external system is reachable and healthy.
    async fn health_check(&self) -> Result<bool, ConnectorError>;
}

/// Builds connector instances from specs.
///
/// The registry owns one factory and consults it at create and update time;
/// a factory failure surfaces as a configuration error.
pub trait ConnectorFactory: Send + Sync {
    /// Builds a connector for the given spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec's configuration cannot produce a
    /// working connector.
    fn build(&self, spec: &ConnectorSpec) -> Result<Arc<dyn Connector>, ConnectorError>;
}

/// Configurable in-memory connector and factory for tests.
pub mod mock {
    use super::{Connector, ConnectorError, ConnectorFactory, Operation, OperationResult};
    use crate::record::ConnectorSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// A connector whose health and execution behavior can be toggled at
    /// runtime from a test.
    pub struct MockConnector {
        healthy: AtomicBool,
        fail_execute: AtomicBool,
        delay: Mutex<Option<Duration>>,
        calls: AtomicU64,
    }

    impl MockConnector {
        /// Creates a connector that reports healthy and succeeds.
        #[must_use]
        pub fn healthy() -> Self {
            Self {
                healthy: AtomicBool::new(true),
                fail_execute: AtomicBool::new(false),
                delay: Mutex::new(None),
                calls: AtomicU64::new(0),
            }
        }

        /// Creates a connector that reports unhealthy.
        #[must_use]
        pub fn unhealthy() -> Self {
            let mock = Self::healthy();
            mock.set_healthy(false);
            mock
        }

        /// Sets the health probe outcome.
        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        /// Makes subsequent executions fail with a connection error.
        pub fn set_fail_execute(&self, fail: bool) {
            self.fail_execute.store(fail, Ordering::SeqCst);
        }

        /// Delays subsequent executions, for timeout tests.
        pub fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock().unwrap() = delay;
        }

        /// Number of execute calls that reached this connector.
        #[must_use]
        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn execute(&self, operation: Operation) -> Result<OperationResult, ConnectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_execute.load(Ordering::SeqCst) {
                return Err(ConnectorError::ConnectionFailed {
                    reason: "mock failure".to_string(),
                });
            }
            Ok(OperationResult::new(serde_json::json!({
                "resource": operation.resource,
                "action": operation.action,
            })))
        }

        async fn health_check(&self) -> Result<bool, ConnectorError> {
            Ok(self.healthy.load(Ordering::SeqCst))
        }
    }

    /// A factory that hands out one shared mock connector.
    ///
    /// Specs with `"unbuildable": true` in their configuration fail to build,
    /// for configuration-error tests.
    pub struct MockConnectorFactory {
        connector: Arc<MockConnector>,
    }

    impl MockConnectorFactory {
        /// Creates a factory returning the given connector.
        #[must_use]
        pub fn returning(connector: Arc<MockConnector>) -> Self {
            Self { connector }
        }
    }

    impl Default for MockConnectorFactory {
        fn default() -> Self {
            Self::returning(Arc::new(MockConnector::healthy()))
        }
    }

    impl ConnectorFactory for MockConnectorFactory {
        fn build(&self, spec: &ConnectorSpec) -> Result<Arc<dyn Connector>, ConnectorError> {
            if spec.config.get("unbuildable") == Some(&serde_json::Value::Bool(true)) {
                return Err(ConnectorError::ConnectionFailed {
                    reason: "unbuildable configuration".to_string(),
                });
            }
            Ok(Arc::clone(&self.connector) as Arc<dyn Connector>)
        }
    }
}

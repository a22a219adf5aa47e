//! Middleware system for message processing pipeline

use std::sync::Arc;
use std::time::{Duration, Instant};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::domain::entities::Message;
use crate::application::services::LifecycleCoordinator;

/// Context key holding the comma-separated extensions enabled for the message's server
pub const ENABLED_EXTENSIONS: &str = "enabled_extensions";

/// Context passed through middleware chain
#[derive(Debug, Clone)]
pub struct Context {
    pub message: Message,
    pub channel_id: String,
    pub server_id: Option<String>,
    pub user_id: Option<String>,
    pub data: HashMap<String, String>,
}

impl Context {
    pub fn new(message: Message) -> Self {
        let channel_id = message.channel_id.clone();
        let server_id = message.server_id.clone();
        let user_id = message.sender.as_ref().map(|u| u.id.clone());

        Self {
            message,
            channel_id,
            server_id,
            user_id,
            data: HashMap::new(),
        }
    }

    /// Get data from context
    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    /// Set data in context
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    /// Whether reconciliation reported `name` as enabled for this server
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(ENABLED_EXTENSIONS)
            .map(|list| list.split(',').any(|n| n == name))
            .unwrap_or(false)
    }
}

/// Middleware trait - processors that can intercept and modify message handling
pub trait Middleware: Send + Sync {
    /// Process a message and optionally modify the context
    fn process(&self, ctx: Context, next: Next) -> MiddlewareResult;
}

/// Result of middleware processing
pub type MiddlewareResult = Result<Context, MiddlewareError>;

/// Middleware errors
#[derive(Debug, Clone)]
pub enum MiddlewareError {
    /// Stop processing and return error
    Blocked(String),
    /// Rate limited
    RateLimited { retry_after: Duration },
    /// Permission denied
    PermissionDenied(String),
    /// Internal error
    Internal(String),
}

impl std::fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareError::Blocked(msg) => write!(f, "Blocked: {}", msg),
            MiddlewareError::RateLimited { retry_after } => {
                write!(f, "Rate limited, retry after {:?}", retry_after)
            }
            MiddlewareError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            MiddlewareError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MiddlewareError {}

/// Next middleware in chain
#[derive(Clone)]
pub struct Next {
    remaining: Arc<[Arc<dyn Middleware>]>,
}

impl Next {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            remaining: middlewares.into(),
        }
    }

    /// Process remaining middleware
    pub fn run(self, ctx: Context) -> MiddlewareResult {
        match self.remaining.split_first() {
            Some((first, rest)) => first.process(ctx, Next::new(rest.to_vec())),
            // No more middleware, processing complete
            None => Ok(ctx),
        }
    }
}

/// Middleware chain builder
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Vec<Arc<dyn Middleware>> {
        self.middlewares
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limit middleware
pub struct RateLimitMiddleware {
    requests: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimitMiddleware {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: std::sync::Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    fn check_rate_limit(&self, key: &str) -> Result<(), MiddlewareError> {
        let mut requests = self.requests.lock()
            .map_err(|_| MiddlewareError::Internal("Lock poisoned".to_string()))?;

        let now = Instant::now();
        let times = requests.entry(key.to_string()).or_default();

        // Remove old requests outside the window
        times.retain(|&t| now.duration_since(t) < self.window);

        if times.len() >= self.max_requests as usize {
            let retry_after = times.first()
                .map(|t| self.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(self.window);

            return Err(MiddlewareError::RateLimited { retry_after });
        }

        times.push(now);
        Ok(())
    }
}

impl Middleware for RateLimitMiddleware {
    fn process(&self, ctx: Context, next: Next) -> MiddlewareResult {
        // Rate limit by user, falling back to the channel
        let key = ctx.user_id.clone().unwrap_or_else(|| ctx.channel_id.clone());

        self.check_rate_limit(&key)?;

        next.run(ctx)
    }
}

/// Brings the registry in line with the server's record before each command.
///
/// Never blocks the command: load failures are logged and the command is
/// still routed.
pub struct ReconcileMiddleware {
    coordinator: Arc<LifecycleCoordinator>,
}

impl ReconcileMiddleware {
    pub fn new(coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Middleware for ReconcileMiddleware {
    fn process(&self, mut ctx: Context, next: Next) -> MiddlewareResult {
        if !ctx.message.content.is_command() {
            return next.run(ctx);
        }

        match ctx.server_id.clone() {
            Some(server_id) => {
                let report = self.coordinator.reconcile(&server_id);
                if !report.loaded.is_empty() {
                    debug!("[{}] Loaded on demand: {}", server_id, report.loaded.join(", "));
                }
                for failure in &report.failures {
                    warn!("[{}] {}", server_id, failure);
                }
                ctx.set(ENABLED_EXTENSIONS, report.enabled.names().join(","));
            }
            None => {
                if let Err(e) = self.coordinator.registry().ensure_loaded(self.coordinator.base()) {
                    warn!("[{}] {}", ctx.channel_id, e);
                }
            }
        }

        next.run(ctx)
    }
}

/// Logging middleware for debugging
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn process(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let msg_preview = ctx.message.content.text()
            .map(|s| s.chars().take(50).collect::<String>())
            .or_else(|| ctx.message.content.command_name().map(|n| format!("[command {}]", n)))
            .unwrap_or_else(|| "[empty]".to_string());
        let channel_id = ctx.channel_id.clone();

        debug!("[{}] {}", channel_id, msg_preview);

        let result = next.run(ctx);

        match &result {
            Ok(_) => debug!("[{}] Processed OK", channel_id),
            Err(e) => warn!("[{}] Error: {}", channel_id, e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;

    fn command(user: &str) -> Context {
        Context::new(Message::from_command("c1", "ping", vec![]).with_sender(User::new(user)))
    }

    #[test]
    fn test_rate_limit_per_user() {
        let chain = MiddlewareChain::new().add(RateLimitMiddleware::new(2, 60)).build();

        assert!(Next::new(chain.clone()).run(command("1")).is_ok());
        assert!(Next::new(chain.clone()).run(command("1")).is_ok());
        assert!(matches!(
            Next::new(chain.clone()).run(command("1")),
            Err(MiddlewareError::RateLimited { .. })
        ));
        assert!(Next::new(chain).run(command("2")).is_ok());
    }

    #[test]
    fn test_enabled_extensions_lookup() {
        let mut ctx = command("1");
        assert!(!ctx.is_enabled("weather"));
        ctx.set(ENABLED_EXTENSIONS, "time,weather");
        assert!(ctx.is_enabled("weather"));
        assert!(!ctx.is_enabled("weath"));
    }
}

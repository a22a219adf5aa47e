//! Message handling - Event-driven message processing

pub mod conversation;
pub mod dispatcher;
pub mod middleware;
pub mod parser;

pub use conversation::ConversationRouter;
pub use dispatcher::MessageDispatcher;
pub use middleware::{
    Context, LoggingMiddleware, Middleware, MiddlewareChain, RateLimitMiddleware, ReconcileMiddleware,
};
pub use parser::MessageParser;

//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth resolver: bearer token to `CurrentUser`, when a token is sent
//! 2. Audit logger: logs after auth, knows the principal

pub mod audit;
pub mod auth;

//! Challenge-solver integration: session lifecycle, JSON protocol client,
//! and user-agent rotation.

mod client;
mod session;
mod user_agent;

pub use client::{is_ban_like, SolvedPage, SolverClient, SolverCookie, SolverError};
pub use session::SessionManager;
pub use user_agent::{UserAgentPool, USER_AGENTS};

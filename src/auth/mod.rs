//! Authentication module for managing driver sessions.
//!
//! Sessions are persisted to disk and tokens expire after a fixed window;
//! an expired session forces a fresh login. An `Unauthorized` response
//! from the backend is handled the same way at the call sites.

pub mod session;

pub use session::{Session, SessionData};

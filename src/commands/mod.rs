//! CLI command implementations for stackup.
//!
//! One command for now:
//!
//! - [`up`] - Bring the stack up, hold in foreground (or run tests), tear down

pub mod up;

//! Application layer: the session engine and its operation groups.
//!
//! [`session::Session`] owns the lifecycle and the command/response core;
//! the sibling modules extend it with the operation families: burst capture
//! (`capture`), 3A and autoframing convergence (`convergence`), and
//! recordings, measurements, and capability queries (`queries`).

pub mod capture;
pub mod convergence;
pub mod queries;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

//! Replay protection for option mutations.
//!
//! A [`TokenGate`] issues one action-scoped token per process and verifies
//! submitted requests against it, using a [`TokenAuthority`] for the
//! cryptography and a [`RequestVerifier`] for the host's referer and
//! background-request checks.

pub mod authority;
pub mod gate;
pub mod request;

pub use authority::{KeyedTokenAuthority, TokenAuthority};
pub use gate::{GatePhase, TokenGate, TOKEN_SUFFIX};
pub use request::{HostVerifier, RequestContext, RequestVerifier};

//! Cross-subsystem integration tests.
//!
//! Everything in here wires real components together over the in-memory
//! bus: signed envelopes, verification key rings, journals, and saga
//! orchestration. No component is mocked unless the external world
//! (settlement networks) forces it.

pub mod e2e_choreography;
pub mod flows;

//! Client helper (§4.12): the symmetric side of the harness's own wire
//! contract, used by tests and tools to drive a harness-server instance
//! the same way a real program or platform side would.

pub mod connection;

pub use connection::{ClientError, HarnessClient};

//! Shared test utilities: a mock WebSocket server and client for
//! integration-testing the harness protocol without a real harness-server
//! or harness-client process.

pub mod mock_ws_client;
pub mod mock_ws_server;

pub use mock_ws_client::MockWsClient;
pub use mock_ws_server::{FrameHandler, MockWsServer};

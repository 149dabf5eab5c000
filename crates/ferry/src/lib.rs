//! ferry — client side of the ferry transfer engine.
//! The binary wires the driver to the CLI; integration tests drive the
//! driver directly against an in-process server.

pub mod control;
pub mod driver;
pub mod progress;
pub mod sender;

pub use control::ControlClient;
pub use driver::TransferDriver;

//! ferryd — server side of the ferry transfer engine.
//! The binary wires these modules to a loopback control port; integration
//! tests drive them in-process.

pub mod api;
pub mod fsops;
pub mod receiver;
pub mod txlog;

pub use api::AppState;

//! Source-level debugging for Z80 programs and apps running on an emulated
//! TI calculator.
//!
//! [`debugger::DebugContext`] is the engine. It drives a host-supplied
//! [`debugger::Emulator`] and maps between calculator addresses and source
//! lines through a [`symbols::SymbolService`]. [`executor::Console`] and
//! [`dap::DapServer`] are front ends over it.

pub mod config;
pub mod dap;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod parser;
pub mod symbols;

pub use config::DebuggerConfig;
pub use error::{DebuggerError, Result};

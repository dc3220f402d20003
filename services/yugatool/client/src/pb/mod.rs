//! Protocol buffer messages of the services yugatool calls.
//!
//! Field numbers match the server's `.proto` definitions; only the fields
//! the tool reads are declared; unknown fields are skipped on decode.

pub mod common;
pub mod master;
pub mod server;

pub use common::*;
pub use master::*;
pub use server::*;

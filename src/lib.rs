//! sl-lua - typed marshaling between Rust host code and embedded Lua scripts.
//!
//! Values, tables and functions move across the boundary through a
//! [`Context`](lua::Context); host functions see checked, typed arguments and
//! script functions are called with typed results.

pub mod config;
pub mod error;
mod fatal;
pub mod logging;
pub mod lua;

pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use lua::{
    Boolean, Context, Extraction, HostFunction, Library, Marshal, MarshalMulti, Number, Opaque,
    Runtime, Table, Value, ValueTag,
};

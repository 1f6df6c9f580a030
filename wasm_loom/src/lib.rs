// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `wasm_loom`: a streaming decoder and validator for the WebAssembly 1.0 (MVP) binary
//! module format.
//!
//! Decoding happens in two passes over the same bytes:
//!
//! 1. the symbol pass ([`module::Module::decode`]) validates the header and every non-code
//!    section, populating the symbol table and queueing deferred link actions;
//! 2. the code pass ([`module::Module::read_code_entries`], or [`driver::read_code_entries`]
//!    with the `std` feature for a background thread on large modules) abstractly interprets
//!    every function body in a single traversal, fusing parsing, type checking, branch-target
//!    tracking, and side-table generation, and emits a per-function block tree for a
//!    downstream executor.
//!
//! Any structural or type error aborts the parse with a specific [`error::ParseError`] kind;
//! a module is never observable in a half-decoded state.
//!
//! ## Example
//!
//! ```
//! use wasm_loom::module::Module;
//!
//! // The smallest well-formed module: magic and version only.
//! let mut module = Module::decode(vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00])?;
//! module.read_code_entries()?;
//! assert_eq!(module.symbols().num_functions(), 0);
//! # Ok::<(), wasm_loom::error::ParseError>(())
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub(crate) mod body;
pub mod builder;
pub(crate) mod decoder;
#[cfg(feature = "std")]
pub mod driver;
pub mod error;
pub mod format;
pub mod limits;
pub mod linker;
pub mod module;
pub mod nodes;
pub mod opcode;
pub(crate) mod state;
pub mod store;
pub mod symbols;
pub mod types;

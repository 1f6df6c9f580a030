// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The decoded module: symbol table, code entries, custom sections, link queue.
//!
//! A [`Module`] owns the original input bytes. The symbol sections are decoded eagerly by
//! [`Module::decode`]; function bodies are decoded by a separate code pass (see
//! [`Module::read_code_entries`] and, with the `std` feature, [`crate::driver`]) because that
//! pass is the expensive one and may run on a background thread. A module is never observable
//! in a half-built state: every constructor returns either a fully decoded value or an error.

use alloc::string::String;
use alloc::vec::Vec;

use crate::limits::ModuleLimits;
use crate::linker::LinkerQueue;
use crate::nodes::BlockNode;
use crate::symbols::SymbolTable;
use crate::types::ValueType;

/// A custom section, kept by name and byte span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomSection {
    /// The section name.
    pub name: String,
    /// Offset of the payload (after the name) in the module bytes.
    pub offset: u32,
    /// Payload length in bytes.
    pub len: u32,
}

/// A decoded function body with its side tables.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeEntry {
    /// Types of all locals: argument types followed by declared locals.
    pub local_types: Vec<ValueType>,
    /// The root block covering the whole body.
    pub root: BlockNode,
    /// Stack sizes and continuation lengths consumed by branches and returns, in emission order.
    pub int_constants: Vec<u32>,
    /// One entry per `br_table`: `[arity, depth0, stack0, depth1, stack1, ..]`.
    pub branch_tables: Vec<Vec<u32>>,
    /// Number of profile-counter slots the body uses (`br_if` and `call_indirect` sites).
    pub profile_count: u32,
    /// High-water mark of the operand stack, for frame sizing.
    pub max_stack_size: u32,
}

/// A decoded and validated module.
#[derive(Debug)]
pub struct Module {
    pub(crate) data: Vec<u8>,
    pub(crate) symbols: SymbolTable,
    pub(crate) custom_sections: Vec<CustomSection>,
    pub(crate) linker: LinkerQueue,
    pub(crate) limits: ModuleLimits,
}

impl Module {
    /// Returns the original module bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the symbol table.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Returns the custom sections in order of appearance.
    #[must_use]
    pub fn custom_sections(&self) -> &[CustomSection] {
        &self.custom_sections
    }

    /// Returns the payload bytes of a custom section.
    #[must_use]
    pub fn custom_section_payload(&self, section: &CustomSection) -> &[u8] {
        &self.data[section.offset as usize..(section.offset + section.len) as usize]
    }

    /// Returns the deferred link actions collected while decoding.
    #[must_use]
    pub fn linker(&self) -> &LinkerQueue {
        &self.linker
    }

    /// Returns the limits this module was decoded under.
    #[must_use]
    pub fn limits(&self) -> &ModuleLimits {
        &self.limits
    }
}

// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource ceilings enforced while decoding.
//!
//! Every breach is a hard failure with its own [`LimitKind`]; the parse aborts immediately.

use crate::error::{LimitKind, ParseError};

/// The wasm page size in bytes.
pub const PAGE_SIZE: u32 = 65_536;

/// The largest memory, in pages, a module may declare or import.
pub const MAX_MEMORY_DECLARATION_SIZE: u32 = 65_536;

/// Resource limits for a single module parse.
///
/// The defaults match the ceilings common to web engines.
#[derive(Clone, Debug)]
pub struct ModuleLimits {
    /// Maximum total module size in bytes.
    pub module_size: usize,
    /// Maximum number of entries in the type section.
    pub type_count: u32,
    /// Maximum number of declared functions (including imports).
    pub function_count: u32,
    /// Maximum number of imports.
    pub import_count: u32,
    /// Maximum number of exports.
    pub export_count: u32,
    /// Maximum number of globals.
    pub global_count: u32,
    /// Maximum number of data segments.
    pub data_segment_count: u32,
    /// Maximum number of element segments.
    pub element_segment_count: u32,
    /// Maximum parameters of a single function type.
    pub param_count: u32,
    /// Maximum results of a single function type.
    pub result_count: u32,
    /// Maximum locals (including arguments) of a single function.
    pub local_count: u32,
    /// Maximum size of a single function body in bytes.
    pub function_size: u32,
    /// Maximum declared table size.
    pub table_size: u32,
}

impl Default for ModuleLimits {
    fn default() -> Self {
        Self {
            module_size: 1 << 30,
            type_count: 1_000_000,
            function_count: 1_000_000,
            import_count: 100_000,
            export_count: 100_000,
            global_count: 1_000_000,
            data_segment_count: 100_000,
            element_segment_count: 10_000_000,
            param_count: 1_000,
            result_count: 1,
            local_count: 50_000,
            function_size: 7_654_321,
            table_size: 10_000_000,
        }
    }
}

impl ModuleLimits {
    fn check(limit: LimitKind, value: u64, max: u64) -> Result<(), ParseError> {
        if value > max {
            return Err(ParseError::LimitExceeded { limit, value, max });
        }
        Ok(())
    }

    /// Checks the total module size.
    pub fn check_module_size(&self, size: usize) -> Result<(), ParseError> {
        Self::check(LimitKind::ModuleSize, size as u64, self.module_size as u64)
    }

    /// Checks the type section entry count.
    pub fn check_type_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(LimitKind::TypeCount, count.into(), self.type_count.into())
    }

    /// Checks the declared function count.
    pub fn check_function_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::FunctionCount,
            count.into(),
            self.function_count.into(),
        )
    }

    /// Checks the import count.
    pub fn check_import_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::ImportCount,
            count.into(),
            self.import_count.into(),
        )
    }

    /// Checks the export count.
    pub fn check_export_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::ExportCount,
            count.into(),
            self.export_count.into(),
        )
    }

    /// Checks the global count.
    pub fn check_global_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::GlobalCount,
            count.into(),
            self.global_count.into(),
        )
    }

    /// Checks the data segment count.
    pub fn check_data_segment_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::DataSegmentCount,
            count.into(),
            self.data_segment_count.into(),
        )
    }

    /// Checks the element segment count.
    pub fn check_element_segment_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::ElementSegmentCount,
            count.into(),
            self.element_segment_count.into(),
        )
    }

    /// Checks the parameter count of one function type.
    pub fn check_param_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(LimitKind::ParamCount, count.into(), self.param_count.into())
    }

    /// Checks the result count of one function type.
    pub fn check_result_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::ResultCount,
            count.into(),
            self.result_count.into(),
        )
    }

    /// Checks the locals (including arguments) of one function.
    pub fn check_local_count(&self, count: u32) -> Result<(), ParseError> {
        Self::check(LimitKind::LocalCount, count.into(), self.local_count.into())
    }

    /// Checks the byte size of one function body.
    pub fn check_function_size(&self, size: u32) -> Result<(), ParseError> {
        Self::check(
            LimitKind::FunctionSize,
            size.into(),
            self.function_size.into(),
        )
    }

    /// Checks a declared table size.
    pub fn check_table_size(&self, size: u32) -> Result<(), ParseError> {
        Self::check(LimitKind::TableSize, size.into(), self.table_size.into())
    }
}

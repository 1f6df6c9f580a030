// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The section loop and per-section readers.
//!
//! [`Module::decode`] runs the symbol pass: it checks the header, walks the sections in order,
//! populates the symbol table, and records custom sections and deferred link actions. Function
//! bodies are only size- and locals-checked here; the code pass (see [`crate::body`]) decodes
//! them separately so it can run on a background thread for large modules.
//!
//! This module also hosts the instance-reset passes, which re-read the already-validated bytes
//! of the global, data, and element sections against a live instance.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::ParseError;
use crate::format::Reader;
use crate::limits::{MAX_MEMORY_DECLARATION_SIZE, ModuleLimits};
use crate::linker::{ConstOffset, Instance, LinkerQueue};
use crate::module::{CustomSection, Module};
use crate::opcode::{self, FUNCTION_TYPE_FORM, import_kind, export_kind, section};
use crate::symbols::SymbolTable;
use crate::types::{
    FUNCREF, LIMITS_NO_MAX, LIMITS_WITH_MAX, Mutability, VOID_TYPE, ValueType,
};

/// `\0asm`, little-endian.
pub(crate) const MAGIC: u32 = 0x6D73_6100;

/// The only supported binary format version.
pub(crate) const VERSION: u32 = 0x0000_0001;

/// The name of the custom section carrying debug names.
const NAME_SECTION: &str = "name";

impl Module {
    /// Decodes and validates the symbol sections of a module under the default limits.
    ///
    /// Function bodies are size-checked but not yet decoded; run [`Module::read_code_entries`]
    /// (or [`crate::driver::read_code_entries`] with a config) to decode them.
    pub fn decode(data: Vec<u8>) -> Result<Self, ParseError> {
        Self::decode_with_limits(data, ModuleLimits::default())
    }

    /// Decodes and validates the symbol sections of a module under `limits`.
    pub fn decode_with_limits(data: Vec<u8>, limits: ModuleLimits) -> Result<Self, ParseError> {
        limits.check_module_size(data.len())?;
        let mut decoder = ModuleDecoder {
            r: Reader::new(&data),
            limits: &limits,
            symbols: SymbolTable::new(),
            custom_sections: Vec::new(),
            linker: LinkerQueue::new(),
        };
        decoder.validate_magic_and_version()?;
        decoder.read_symbol_sections()?;
        let ModuleDecoder {
            symbols,
            custom_sections,
            linker,
            ..
        } = decoder;
        Ok(Self {
            data,
            symbols,
            custom_sections,
            linker,
            limits,
        })
    }
}

struct ModuleDecoder<'a> {
    r: Reader<'a>,
    limits: &'a ModuleLimits,
    symbols: SymbolTable,
    custom_sections: Vec<CustomSection>,
    linker: LinkerQueue,
}

impl ModuleDecoder<'_> {
    fn input_len(&self) -> usize {
        self.r.offset() + self.r.remaining()
    }

    fn validate_magic_and_version(&mut self) -> Result<(), ParseError> {
        let magic = self.r.read_u32_le()?;
        if magic != MAGIC {
            return Err(ParseError::InvalidMagicNumber { found: magic });
        }
        let version = self.r.read_u32_le()?;
        if version != VERSION {
            return Err(ParseError::InvalidVersionNumber { found: version });
        }
        Ok(())
    }

    fn read_symbol_sections(&mut self) -> Result<(), ParseError> {
        let mut last_non_custom: Option<u8> = None;
        while !self.r.eof() {
            let id = self.r.read_u8()?;
            if id != section::CUSTOM {
                match last_non_custom {
                    Some(last) if id == last => {
                        return Err(ParseError::DuplicatedSection { id });
                    }
                    Some(last) if id < last => {
                        return Err(ParseError::InvalidSectionOrder { id, last });
                    }
                    _ => last_non_custom = Some(id),
                }
            }
            let size = self.r.read_length()?;
            let start = self.r.offset();
            match id {
                section::CUSTOM => self.read_custom_section(size)?,
                section::TYPE => self.read_type_section()?,
                section::IMPORT => self.read_import_section()?,
                section::FUNCTION => self.read_function_section()?,
                section::TABLE => self.read_table_section()?,
                section::MEMORY => self.read_memory_section()?,
                section::GLOBAL => self.read_global_section()?,
                section::EXPORT => self.read_export_section()?,
                section::START => self.read_start_section()?,
                section::ELEMENT => self.read_element_section()?,
                section::CODE => self.skip_code_section()?,
                section::DATA => self.read_data_section()?,
                _ => return Err(ParseError::MalformedSectionId { id }),
            }
            let actual = (self.r.offset() - start) as u32;
            if actual != size {
                return Err(ParseError::SectionSizeMismatch {
                    id,
                    declared: size,
                    actual,
                });
            }
        }
        Ok(())
    }

    // Reading helpers shared by several sections.

    fn read_name(&mut self) -> Result<String, ParseError> {
        let len = self.r.read_length()?;
        Ok(self.r.read_str(len as usize)?.to_string())
    }

    fn read_value_type(&mut self) -> Result<ValueType, ParseError> {
        ValueType::from_byte(self.r.read_u8()?)
    }

    fn read_end(&mut self) -> Result<(), ParseError> {
        let b = self.r.read_u8()?;
        if b != opcode::END {
            return Err(ParseError::TypeMismatch {
                message: "a constant expression must end with `end`",
            });
        }
        Ok(())
    }

    fn read_type_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        if index >= self.symbols.type_count() {
            return Err(ParseError::UnknownType { index });
        }
        Ok(index)
    }

    fn read_declared_function_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        self.symbols.check_function_index(index)?;
        Ok(index)
    }

    fn read_table_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        // MVP modules have at most one table, so the only valid index is 0.
        if index != 0 || !self.symbols.table_exists() {
            return Err(ParseError::UnknownTable);
        }
        Ok(index)
    }

    fn read_memory_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        if index != 0 || !self.symbols.memory_exists() {
            return Err(ParseError::UnknownMemory);
        }
        Ok(index)
    }

    fn read_limits(&mut self, default_max: u32) -> Result<(u32, u32), ParseError> {
        let prefix = self.r.read_u8()?;
        match prefix {
            LIMITS_NO_MAX => Ok((self.r.read_leb_u32()?, default_max)),
            LIMITS_WITH_MAX => Ok((self.r.read_leb_u32()?, self.r.read_leb_u32()?)),
            _ => Err(ParseError::malformed(format!(
                "invalid limits prefix (expected 0x00 or 0x01, got {prefix:#04x})"
            ))),
        }
    }

    fn read_table_limits(&mut self) -> Result<(u32, u32), ParseError> {
        let (min, max) = self.read_limits(self.limits.table_size)?;
        self.limits.check_table_size(min)?;
        self.limits.check_table_size(max)?;
        if min > max {
            return Err(ParseError::LimitMinimumGreaterThanMaximum { min, max });
        }
        Ok((min, max))
    }

    fn read_memory_limits(&mut self) -> Result<(u32, u32), ParseError> {
        let (min, max) = self.read_limits(MAX_MEMORY_DECLARATION_SIZE)?;
        if min > MAX_MEMORY_DECLARATION_SIZE {
            return Err(ParseError::MemorySizeLimitExceeded { pages: min });
        }
        if max > MAX_MEMORY_DECLARATION_SIZE {
            return Err(ParseError::MemorySizeLimitExceeded { pages: max });
        }
        if min > max {
            return Err(ParseError::LimitMinimumGreaterThanMaximum { min, max });
        }
        Ok((min, max))
    }

    /// Reads an `i32` constant offset expression: a literal or a `global.get` of an imported
    /// `i32` global, terminated by `end`.
    fn read_const_offset_expression(&mut self) -> Result<ConstOffset, ParseError> {
        let instruction = self.r.read_u8()?;
        let offset = match instruction {
            opcode::I32_CONST => ConstOffset::Literal(self.r.read_leb_s32()?),
            opcode::GLOBAL_GET => {
                let index = self.r.read_leb_u32()?;
                if index >= self.symbols.imported_global_count() {
                    return Err(ParseError::UnknownGlobal { index });
                }
                if self.symbols.global_value_type(index) != ValueType::I32 {
                    return Err(ParseError::TypeMismatch {
                        message: "an offset expression must have type i32",
                    });
                }
                ConstOffset::ImportedGlobal(index)
            }
            _ => {
                return Err(ParseError::TypeMismatch {
                    message: "invalid instruction for an offset expression",
                });
            }
        };
        self.read_end()?;
        Ok(offset)
    }

    // Section readers.

    fn read_custom_section(&mut self, size: u32) -> Result<(), ParseError> {
        let section_end = self.r.offset() + size as usize;
        let name = self.read_name()?;
        if self.r.offset() > section_end || section_end > self.input_len() {
            return Err(ParseError::UnexpectedEnd);
        }
        self.custom_sections.push(CustomSection {
            name: name.clone(),
            offset: self.r.offset() as u32,
            len: (section_end - self.r.offset()) as u32,
        });
        if name == NAME_SECTION {
            // A malformed name section must not invalidate the module: debug names are
            // committed only when the whole section reads cleanly, and errors are dropped.
            if let Ok(names) = self.read_name_subsections() {
                for (index, name) in names {
                    self.symbols.function_mut(index).set_debug_name(name);
                }
            }
        }
        self.r.jump(section_end)
    }

    fn read_name_subsections(&mut self) -> Result<Vec<(u32, String)>, ParseError> {
        let mut names = Vec::new();
        if !self.r.eof() && self.r.peek_u8(0)? == 0 {
            self.skip_name_subsection()?;
        }
        if !self.r.eof() && self.r.peek_u8(0)? == 1 {
            self.read_function_name_subsection(&mut names)?;
        }
        if !self.r.eof() && self.r.peek_u8(0)? == 2 {
            self.skip_name_subsection()?;
        }
        Ok(names)
    }

    /// Skips a module-name or local-name subsection; neither payload is used.
    fn skip_name_subsection(&mut self) -> Result<(), ParseError> {
        self.r.read_u8()?;
        let size = self.r.read_length()?;
        self.r.skip(size as usize)
    }

    fn read_function_name_subsection(
        &mut self,
        names: &mut Vec<(u32, String)>,
    ) -> Result<(), ParseError> {
        let id = self.r.read_u8()?;
        let size = self.r.read_length()?;
        let start = self.r.offset();
        let count = self.r.read_length()?;
        for _ in 0..count {
            let index = self.r.read_leb_u32()?;
            if index >= self.symbols.num_functions() {
                return Err(ParseError::malformed(
                    "function index too large in the name section",
                ));
            }
            let name = self.read_name()?;
            names.push((index, name));
        }
        let actual = (self.r.offset() - start) as u32;
        if actual != size {
            return Err(ParseError::SectionSizeMismatch {
                id,
                declared: size,
                actual,
            });
        }
        Ok(())
    }

    fn read_type_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_type_count(count)?;
        for _ in 0..count {
            let form = self.r.read_u8()?;
            if form != FUNCTION_TYPE_FORM {
                return Err(ParseError::malformed(format!(
                    "invalid type form {form:#04x}; only function types are supported"
                )));
            }
            self.read_function_type()?;
        }
        Ok(())
    }

    fn read_function_type(&mut self) -> Result<(), ParseError> {
        let param_count = self.r.read_length()?;
        self.limits.check_param_count(param_count)?;

        // The result arity is needed before the parameters are read, because the symbol table
        // allocates both arenas up front. Parameters are one byte each, so the result-count
        // encoding sits exactly `param_count` bytes ahead.
        let mut probe = self.r.clone();
        probe.skip(param_count as usize)?;
        let raw = probe.read_leb_u32()?;
        let result_count = if raw == u32::from(VOID_TYPE) { 0 } else { raw };

        let type_index = self
            .symbols
            .allocate_function_type(param_count, result_count)?;
        self.limits.check_result_count(result_count)?;

        for i in 0..param_count {
            let t = self.read_value_type()?;
            self.symbols
                .register_function_type_parameter_type(type_index, i, t);
        }
        self.read_result_list(type_index)
    }

    /// The result list has three accepted encodings: the 0x40 void byte, an empty vector, or a
    /// one-element vector.
    fn read_result_list(&mut self, type_index: u32) -> Result<(), ParseError> {
        let b = self.r.read_u8()?;
        match b {
            VOID_TYPE | 0x00 => Ok(()),
            0x01 => {
                let t = self.read_value_type()?;
                self.symbols
                    .register_function_type_return_type(type_index, 0, t);
                Ok(())
            }
            _ => Err(ParseError::MalformedValueType { byte: b }),
        }
    }

    fn read_import_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_import_count(count)?;
        for _ in 0..count {
            let module = self.read_name()?;
            let member = self.read_name()?;
            let kind = self.r.read_u8()?;
            match kind {
                import_kind::FUNCTION => {
                    let type_index = self.read_type_index()?;
                    self.symbols.import_function(module, member, type_index);
                }
                import_kind::TABLE => {
                    let elem_type = self.r.read_u8()?;
                    if elem_type != FUNCREF {
                        return Err(ParseError::malformed(
                            "invalid element type for table import",
                        ));
                    }
                    let (min, max) = self.read_table_limits()?;
                    self.symbols.import_table(module, member, min, max)?;
                }
                import_kind::MEMORY => {
                    let (min, max) = self.read_memory_limits()?;
                    self.symbols.import_memory(module, member, min, max)?;
                }
                import_kind::GLOBAL => {
                    let value_type = self.read_value_type()?;
                    let mutability = Mutability::from_byte(self.r.read_u8()?)?;
                    self.symbols
                        .import_global(module, member, value_type, mutability);
                }
                _ => {
                    return Err(ParseError::malformed(format!(
                        "invalid import kind {kind:#04x}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn read_function_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_function_count(count)?;
        for _ in 0..count {
            let type_index = self.read_type_index()?;
            self.symbols.declare_function(type_index);
        }
        Ok(())
    }

    fn read_table_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        // The symbol table rejects a second table, so this loop body runs at most once for a
        // valid module.
        for _ in 0..count {
            let elem_type = self.r.read_u8()?;
            if elem_type != FUNCREF {
                return Err(ParseError::malformed("invalid element type for table"));
            }
            let (min, max) = self.read_table_limits()?;
            self.symbols.allocate_table(min, max)?;
        }
        Ok(())
    }

    fn read_memory_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        for _ in 0..count {
            let (min, max) = self.read_memory_limits()?;
            self.symbols.allocate_memory(min, max)?;
        }
        Ok(())
    }

    fn read_global_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_global_count(count)?;
        for _ in 0..count {
            let value_type = self.read_value_type()?;
            let mutability = Mutability::from_byte(self.r.read_u8()?)?;
            let init = self.read_global_initializer(value_type)?;
            self.read_end()?;

            let global_index = self.symbols.declare_global(value_type, mutability);
            self.linker.enqueue(Box::new(move |_module, instance| {
                let value = match init {
                    GlobalInit::Value(v) => v,
                    GlobalInit::ImportedGlobal(g) => instance.globals.load(g),
                };
                instance.globals.store(global_index, value);
                Ok(())
            }));
        }
        Ok(())
    }

    fn read_global_initializer(
        &mut self,
        declared: ValueType,
    ) -> Result<GlobalInit, ParseError> {
        let check = |t: ValueType| -> Result<(), ParseError> {
            if t != declared {
                return Err(ParseError::TypeMismatch {
                    message: "the global initializer must match the declared type",
                });
            }
            Ok(())
        };
        let instruction = self.r.read_u8()?;
        match instruction {
            opcode::I32_CONST => {
                check(ValueType::I32)?;
                Ok(GlobalInit::Value(self.r.read_leb_s32()? as i64 as u64))
            }
            opcode::I64_CONST => {
                check(ValueType::I64)?;
                Ok(GlobalInit::Value(self.r.read_leb_s64()? as u64))
            }
            opcode::F32_CONST => {
                check(ValueType::F32)?;
                Ok(GlobalInit::Value(u64::from(self.r.read_u32_le()?)))
            }
            opcode::F64_CONST => {
                check(ValueType::F64)?;
                Ok(GlobalInit::Value(self.r.read_u64_le()?))
            }
            opcode::GLOBAL_GET => {
                let index = self.r.read_leb_u32()?;
                // Constant expressions may only refer to imported globals, which precede all
                // declared globals in the index space.
                if index >= self.symbols.imported_global_count() {
                    return Err(ParseError::UnknownGlobal { index });
                }
                check(self.symbols.global_value_type(index))?;
                Ok(GlobalInit::ImportedGlobal(index))
            }
            _ => Err(ParseError::TypeMismatch {
                message: "invalid instruction for a global initializer",
            }),
        }
    }

    fn read_export_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_export_count(count)?;
        for _ in 0..count {
            let name = self.read_name()?;
            let kind = self.r.read_u8()?;
            match kind {
                export_kind::FUNCTION => {
                    let index = self.read_declared_function_index()?;
                    self.symbols.export_function(name, index);
                }
                export_kind::TABLE => {
                    self.read_table_index()?;
                    self.symbols.export_table(name);
                }
                export_kind::MEMORY => {
                    self.read_memory_index()?;
                    self.symbols.export_memory(name);
                }
                export_kind::GLOBAL => {
                    let index = self.r.read_leb_u32()?;
                    if index >= self.symbols.num_globals() {
                        return Err(ParseError::UnknownGlobal { index });
                    }
                    self.symbols.export_global(name, index);
                }
                _ => {
                    return Err(ParseError::malformed(format!(
                        "invalid export kind {kind:#04x}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn read_start_section(&mut self) -> Result<(), ParseError> {
        let index = self.read_declared_function_index()?;
        self.symbols.set_start_function(index)
    }

    fn read_element_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_element_segment_count(count)?;
        for _ in 0..count {
            self.read_table_index()?;
            let offset = self.read_const_offset_expression()?;
            let len = self.r.read_length()?;
            let mut function_indices = Vec::with_capacity(len as usize);
            for _ in 0..len {
                function_indices.push(self.read_declared_function_index()?);
            }
            self.linker.enqueue(Box::new(move |_module, instance| {
                let at = offset.resolve(&instance.globals);
                instance.table_mut()?.write(at, &function_indices)
            }));
        }
        Ok(())
    }

    fn read_data_section(&mut self) -> Result<(), ParseError> {
        let count = self.r.read_length()?;
        self.limits.check_data_segment_count(count)?;
        for _ in 0..count {
            self.read_memory_index()?;
            let offset = self.read_const_offset_expression()?;
            let len = self.r.read_length()?;
            let bytes = self.r.read_bytes(len as usize)?.to_vec();
            self.linker.enqueue(Box::new(move |_module, instance| {
                let at = offset.resolve(&instance.globals);
                instance.memory_mut()?.write(at, &bytes)
            }));
        }
        Ok(())
    }

    /// The symbol pass does not decode function bodies, but it still enforces the per-entry
    /// size and locals limits and the function/code count consistency.
    fn skip_code_section(&mut self) -> Result<(), ParseError> {
        let actual = self.r.read_length()?;
        let declared = self.symbols.num_functions() - self.symbols.imported_function_count();
        if actual != declared {
            return Err(ParseError::FunctionsCodeInconsistentLengths { declared, actual });
        }
        for entry in 0..actual {
            let body_size = self.r.read_leb_u32()?;
            self.limits.check_function_size(body_size)?;
            let end_of_body = self.r.offset() + body_size as usize;
            let local_count = self.read_local_count()?;
            let function_index = self.symbols.imported_function_count() + entry;
            let arg_count = self.symbols.function_param_types(function_index).len() as u32;
            self.limits.check_local_count(
                local_count
                    .checked_add(arg_count)
                    .ok_or(ParseError::LengthOutOfBounds { length: u32::MAX })?,
            )?;
            self.r.jump(end_of_body)?;
        }
        Ok(())
    }

    /// Reads the locals declaration of one code entry, returning the total count.
    fn read_local_count(&mut self) -> Result<u32, ParseError> {
        let groups = self.r.read_length()?;
        let mut total: u32 = 0;
        for _ in 0..groups {
            let group_len = self.r.read_leb_u32()?;
            total = total
                .checked_add(group_len)
                .ok_or(ParseError::LengthOutOfBounds { length: u32::MAX })?;
            self.limits.check_local_count(total)?;
            self.read_value_type()?;
        }
        Ok(total)
    }
}

#[derive(Copy, Clone, Debug)]
enum GlobalInit {
    Value(u64),
    ImportedGlobal(u32),
}

/// Re-validates the header and positions `r` at the content of section `target`.
///
/// Returns `false` when the module has no such section.
pub(crate) fn try_jump_to_section(r: &mut Reader<'_>, target: u8) -> Result<bool, ParseError> {
    r.jump(0)?;
    let magic = r.read_u32_le()?;
    if magic != MAGIC {
        return Err(ParseError::InvalidMagicNumber { found: magic });
    }
    let version = r.read_u32_le()?;
    if version != VERSION {
        return Err(ParseError::InvalidVersionNumber { found: version });
    }
    while !r.eof() {
        let id = r.read_u8()?;
        let size = r.read_leb_u32()?;
        if id == target {
            return Ok(true);
        }
        r.skip(size as usize)?;
    }
    Ok(false)
}

fn skip_reset_limits(r: &mut Reader<'_>) -> Result<(), ParseError> {
    let prefix = r.read_u8()?;
    r.read_leb_u32()?;
    if prefix == LIMITS_WITH_MAX {
        r.read_leb_u32()?;
    }
    Ok(())
}

fn skip_reset_name(r: &mut Reader<'_>) -> Result<(), ParseError> {
    let len = r.read_leb_u32()?;
    r.skip(len as usize)
}

/// Reads an offset expression during a reset pass, without re-validating it.
fn read_reset_offset(r: &mut Reader<'_>) -> Result<ConstOffset, ParseError> {
    let instruction = r.read_u8()?;
    let offset = match instruction {
        opcode::I32_CONST => ConstOffset::Literal(r.read_leb_s32()?),
        opcode::GLOBAL_GET => ConstOffset::ImportedGlobal(r.read_leb_u32()?),
        _ => {
            return Err(ParseError::TypeMismatch {
                message: "invalid instruction for an offset expression",
            });
        }
    };
    r.read_u8()?; // end
    Ok(offset)
}

// The reset passes re-traverse sections of an already parsed and linked module to restore the
// live instance. The byte stream is assumed to match what was validated, so no checks are
// repeated; `global.get` initializers read the *current* value of the imported global.
impl Module {
    /// Re-runs the global initializers against the instance's current global values.
    pub fn reset_global_state(&self, instance: &mut Instance) -> Result<(), ParseError> {
        let mut r = Reader::new(&self.data);
        let mut global_index: u32 = 0;
        if try_jump_to_section(&mut r, section::IMPORT)? {
            let count = r.read_leb_u32()?;
            for _ in 0..count {
                skip_reset_name(&mut r)?;
                skip_reset_name(&mut r)?;
                let kind = r.read_u8()?;
                match kind {
                    import_kind::FUNCTION => {
                        r.read_leb_u32()?;
                    }
                    import_kind::TABLE => {
                        r.read_u8()?;
                        skip_reset_limits(&mut r)?;
                    }
                    import_kind::MEMORY => {
                        skip_reset_limits(&mut r)?;
                    }
                    import_kind::GLOBAL => {
                        r.read_u8()?;
                        r.read_u8()?;
                        global_index += 1;
                    }
                    _ => {}
                }
            }
        }
        if try_jump_to_section(&mut r, section::GLOBAL)? {
            let count = r.read_leb_u32()?;
            for _ in 0..count {
                r.read_u8()?; // value type
                r.read_u8()?; // mutability
                let instruction = r.read_u8()?;
                let value = match instruction {
                    opcode::I32_CONST => r.read_leb_s32()? as i64 as u64,
                    opcode::I64_CONST => r.read_leb_s64()? as u64,
                    opcode::F32_CONST => u64::from(r.read_u32_le()?),
                    opcode::F64_CONST => r.read_u64_le()?,
                    opcode::GLOBAL_GET => {
                        let existing = r.read_leb_u32()?;
                        instance.globals.load(existing)
                    }
                    _ => {
                        return Err(ParseError::TypeMismatch {
                            message: "invalid instruction for a global initializer",
                        });
                    }
                };
                r.read_u8()?; // end
                instance.globals.store(global_index, value);
                global_index += 1;
            }
        }
        Ok(())
    }

    /// Re-writes all data segments into the instance memory.
    pub fn reset_memory_state(&self, instance: &mut Instance) -> Result<(), ParseError> {
        let mut r = Reader::new(&self.data);
        if !try_jump_to_section(&mut r, section::DATA)? {
            return Ok(());
        }
        let count = r.read_leb_u32()?;
        for _ in 0..count {
            r.read_leb_u32()?; // memory index
            let offset = read_reset_offset(&mut r)?;
            let len = r.read_leb_u32()?;
            let bytes = r.read_bytes(len as usize)?;
            let at = offset.resolve(&instance.globals);
            instance.memory_mut()?.write(at, bytes)?;
        }
        Ok(())
    }

    /// Re-writes all element segments into the instance table.
    pub fn reset_table_state(&self, instance: &mut Instance) -> Result<(), ParseError> {
        let mut r = Reader::new(&self.data);
        if !try_jump_to_section(&mut r, section::ELEMENT)? {
            return Ok(());
        }
        let count = r.read_leb_u32()?;
        for _ in 0..count {
            r.read_leb_u32()?; // table index
            let offset = read_reset_offset(&mut r)?;
            let len = r.read_leb_u32()?;
            let mut function_indices = Vec::with_capacity(len as usize);
            for _ in 0..len {
                function_indices.push(r.read_leb_u32()?);
            }
            let at = offset.resolve(&instance.globals);
            instance.table_mut()?.write(at, &function_indices)?;
        }
        Ok(())
    }
}

// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The symbol table: types, functions, table, memory, globals, exports.
//!
//! Section readers mutate the table as they go; the body decoder and the linker only read from
//! it. Function types are packed into a single [`ValueType`] arena and referenced by range, so
//! signature lookups are slice borrows rather than per-type allocations.
//!
//! Index arguments to the read accessors must already be validated (the decoder checks every
//! index it reads before use).

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::error::ParseError;
use crate::module::CodeEntry;
use crate::types::{BlockType, Mutability, ValueType};

/// A range into the packed value-type arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeRange {
    /// Start offset in the arena.
    pub offset: u32,
    /// Number of entries.
    pub len: u32,
}

/// A function type: parameter types and at most one result type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionType {
    params: TypeRange,
    results: TypeRange,
}

/// A declared or imported function.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    type_index: u32,
    debug_name: Option<String>,
    code: Option<CodeEntry>,
}

impl Function {
    /// Returns the index of this function's type.
    #[must_use]
    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Returns the debug name recovered from the name section, if any.
    #[must_use]
    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    /// Returns the decoded body, once the code section has been read.
    ///
    /// Imported functions never have one.
    #[must_use]
    pub fn code_entry(&self) -> Option<&CodeEntry> {
        self.code.as_ref()
    }

    pub(crate) fn set_code_entry(&mut self, code: CodeEntry) {
        self.code = Some(code);
    }

    pub(crate) fn set_debug_name(&mut self, name: String) {
        self.debug_name = Some(name);
    }
}

/// What an import provides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportKind {
    /// A function with the given type index.
    Function {
        /// Index into the type section.
        type_index: u32,
    },
    /// The table.
    Table,
    /// The memory.
    Memory,
    /// A global.
    Global {
        /// Index in the global index space.
        index: u32,
    },
}

/// An import record: module and member names plus what is imported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportDescriptor {
    /// The module name.
    pub module: String,
    /// The member name within the module.
    pub member: String,
    /// What the import provides.
    pub kind: ImportKind,
}

/// What an export exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportKind {
    /// A function by index.
    Function(u32),
    /// The table.
    Table,
    /// The memory.
    Memory,
    /// A global by index.
    Global(u32),
}

/// An export record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    /// The exported name.
    pub name: String,
    /// What is exported.
    pub kind: ExportKind,
}

/// Declared table limits (elements).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableDecl {
    /// Minimum element count.
    pub min: u32,
    /// Maximum element count.
    pub max: u32,
}

/// Declared memory limits (pages).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryDecl {
    /// Minimum page count.
    pub min: u32,
    /// Maximum page count.
    pub max: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct GlobalEntry {
    value_type: ValueType,
    mutability: Mutability,
}

/// The mutable registry populated by the section readers.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    value_types: Vec<ValueType>,
    function_types: Vec<FunctionType>,
    functions: Vec<Function>,
    imported_function_count: u32,
    imports: Vec<ImportDescriptor>,
    exports: Vec<ExportEntry>,
    export_index: HashMap<String, usize>,
    globals: Vec<GlobalEntry>,
    imported_global_count: u32,
    table: Option<TableDecl>,
    memory: Option<MemoryDecl>,
    start_function: Option<u32>,
}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves a function type with the given arities and returns its index.
    ///
    /// The parameter and result slots are filled by the `register_*` calls that follow; the
    /// placeholder entries written here are never observable through the public accessors
    /// because the type section reader registers every slot before returning.
    pub(crate) fn allocate_function_type(
        &mut self,
        param_count: u32,
        result_count: u32,
    ) -> Result<u32, ParseError> {
        if result_count > 1 {
            return Err(ParseError::InvalidResultArity {
                arity: result_count,
            });
        }
        let params = TypeRange {
            offset: self.value_types.len() as u32,
            len: param_count,
        };
        for _ in 0..param_count {
            self.value_types.push(ValueType::I32);
        }
        let results = TypeRange {
            offset: self.value_types.len() as u32,
            len: result_count,
        };
        for _ in 0..result_count {
            self.value_types.push(ValueType::I32);
        }
        let index = self.function_types.len() as u32;
        self.function_types.push(FunctionType { params, results });
        Ok(index)
    }

    pub(crate) fn register_function_type_parameter_type(
        &mut self,
        type_index: u32,
        i: u32,
        t: ValueType,
    ) {
        let range = self.function_types[type_index as usize].params;
        self.value_types[(range.offset + i) as usize] = t;
    }

    pub(crate) fn register_function_type_return_type(
        &mut self,
        type_index: u32,
        i: u32,
        t: ValueType,
    ) {
        let range = self.function_types[type_index as usize].results;
        self.value_types[(range.offset + i) as usize] = t;
    }

    /// Returns the number of function types.
    #[must_use]
    pub fn type_count(&self) -> u32 {
        self.function_types.len() as u32
    }

    fn types_in(&self, range: TypeRange) -> &[ValueType] {
        &self.value_types[range.offset as usize..(range.offset + range.len) as usize]
    }

    /// Returns the parameter types of function type `type_index`.
    #[must_use]
    pub fn function_type_param_types(&self, type_index: u32) -> &[ValueType] {
        self.types_in(self.function_types[type_index as usize].params)
    }

    /// Returns the result types of function type `type_index` (zero or one entries).
    #[must_use]
    pub fn function_type_result_types(&self, type_index: u32) -> &[ValueType] {
        self.types_in(self.function_types[type_index as usize].results)
    }

    /// Returns the result of function type `type_index` as a block type.
    #[must_use]
    pub fn function_type_block_type(&self, type_index: u32) -> BlockType {
        match self.function_type_result_types(type_index) {
            [] => BlockType::Void,
            [t, ..] => BlockType::Value(*t),
        }
    }

    pub(crate) fn import_function(
        &mut self,
        module: String,
        member: String,
        type_index: u32,
    ) -> u32 {
        let index = self.functions.len() as u32;
        self.functions.push(Function {
            type_index,
            debug_name: None,
            code: None,
        });
        self.imported_function_count += 1;
        self.imports.push(ImportDescriptor {
            module,
            member,
            kind: ImportKind::Function { type_index },
        });
        index
    }

    pub(crate) fn declare_function(&mut self, type_index: u32) -> u32 {
        let index = self.functions.len() as u32;
        self.functions.push(Function {
            type_index,
            debug_name: None,
            code: None,
        });
        index
    }

    /// Returns the number of functions in the index space, imports included.
    #[must_use]
    pub fn num_functions(&self) -> u32 {
        self.functions.len() as u32
    }

    /// Returns the number of imported functions; they occupy the low indices.
    #[must_use]
    pub fn imported_function_count(&self) -> u32 {
        self.imported_function_count
    }

    /// Returns the function at `index`.
    #[must_use]
    pub fn function(&self, index: u32) -> &Function {
        &self.functions[index as usize]
    }

    pub(crate) fn function_mut(&mut self, index: u32) -> &mut Function {
        &mut self.functions[index as usize]
    }

    /// Fails with [`ParseError::UnknownFunction`] unless `index` is in the function space.
    pub fn check_function_index(&self, index: u32) -> Result<(), ParseError> {
        if index >= self.num_functions() {
            return Err(ParseError::UnknownFunction { index });
        }
        Ok(())
    }

    /// Returns the parameter types of the function at `index`.
    #[must_use]
    pub fn function_param_types(&self, index: u32) -> &[ValueType] {
        self.function_type_param_types(self.functions[index as usize].type_index)
    }

    /// Returns the result types of the function at `index`.
    #[must_use]
    pub fn function_result_types(&self, index: u32) -> &[ValueType] {
        self.function_type_result_types(self.functions[index as usize].type_index)
    }

    /// Returns the result of the function at `index` as a block type.
    #[must_use]
    pub fn function_block_type(&self, index: u32) -> BlockType {
        self.function_type_block_type(self.functions[index as usize].type_index)
    }

    pub(crate) fn allocate_table(&mut self, min: u32, max: u32) -> Result<(), ParseError> {
        if self.table.is_some() {
            return Err(ParseError::MultipleTables);
        }
        self.table = Some(TableDecl { min, max });
        Ok(())
    }

    pub(crate) fn import_table(
        &mut self,
        module: String,
        member: String,
        min: u32,
        max: u32,
    ) -> Result<(), ParseError> {
        self.allocate_table(min, max)?;
        self.imports.push(ImportDescriptor {
            module,
            member,
            kind: ImportKind::Table,
        });
        Ok(())
    }

    /// Returns `true` when the module declares or imports a table.
    #[must_use]
    pub fn table_exists(&self) -> bool {
        self.table.is_some()
    }

    /// Returns the table limits, if a table exists.
    #[must_use]
    pub fn table(&self) -> Option<TableDecl> {
        self.table
    }

    pub(crate) fn allocate_memory(&mut self, min: u32, max: u32) -> Result<(), ParseError> {
        if self.memory.is_some() {
            return Err(ParseError::MultipleMemories);
        }
        self.memory = Some(MemoryDecl { min, max });
        Ok(())
    }

    pub(crate) fn import_memory(
        &mut self,
        module: String,
        member: String,
        min: u32,
        max: u32,
    ) -> Result<(), ParseError> {
        self.allocate_memory(min, max)?;
        self.imports.push(ImportDescriptor {
            module,
            member,
            kind: ImportKind::Memory,
        });
        Ok(())
    }

    /// Returns `true` when the module declares or imports a memory.
    #[must_use]
    pub fn memory_exists(&self) -> bool {
        self.memory.is_some()
    }

    /// Returns the memory limits, if a memory exists.
    #[must_use]
    pub fn memory(&self) -> Option<MemoryDecl> {
        self.memory
    }

    pub(crate) fn import_global(
        &mut self,
        module: String,
        member: String,
        value_type: ValueType,
        mutability: Mutability,
    ) -> u32 {
        let index = self.globals.len() as u32;
        self.globals.push(GlobalEntry {
            value_type,
            mutability,
        });
        self.imported_global_count += 1;
        self.imports.push(ImportDescriptor {
            module,
            member,
            kind: ImportKind::Global { index },
        });
        index
    }

    pub(crate) fn declare_global(&mut self, value_type: ValueType, mutability: Mutability) -> u32 {
        let index = self.globals.len() as u32;
        self.globals.push(GlobalEntry {
            value_type,
            mutability,
        });
        index
    }

    /// Returns the number of globals in the index space, imports included.
    #[must_use]
    pub fn num_globals(&self) -> u32 {
        self.globals.len() as u32
    }

    /// Returns the number of imported globals; they occupy the low indices.
    #[must_use]
    pub fn imported_global_count(&self) -> u32 {
        self.imported_global_count
    }

    /// Returns the value type of the global at `index`.
    #[must_use]
    pub fn global_value_type(&self, index: u32) -> ValueType {
        self.globals[index as usize].value_type
    }

    /// Returns the mutability of the global at `index`.
    #[must_use]
    pub fn global_mutability(&self, index: u32) -> Mutability {
        self.globals[index as usize].mutability
    }

    /// Returns `true` when the global at `index` is imported.
    #[must_use]
    pub fn global_is_imported(&self, index: u32) -> bool {
        index < self.imported_global_count
    }

    fn push_export(&mut self, name: String, kind: ExportKind) {
        self.export_index.insert(name.clone(), self.exports.len());
        self.exports.push(ExportEntry { name, kind });
    }

    pub(crate) fn export_function(&mut self, name: String, index: u32) {
        self.push_export(name, ExportKind::Function(index));
    }

    pub(crate) fn export_table(&mut self, name: String) {
        self.push_export(name, ExportKind::Table);
    }

    pub(crate) fn export_memory(&mut self, name: String) {
        self.push_export(name, ExportKind::Memory);
    }

    pub(crate) fn export_global(&mut self, name: String, index: u32) {
        self.push_export(name, ExportKind::Global(index));
    }

    /// Returns all exports in declaration order.
    #[must_use]
    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Looks up an export by name. If a name was exported twice, the last one wins.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&ExportEntry> {
        self.export_index.get(name).map(|&i| &self.exports[i])
    }

    /// Returns all imports in declaration order.
    #[must_use]
    pub fn imports(&self) -> &[ImportDescriptor] {
        &self.imports
    }

    pub(crate) fn set_start_function(&mut self, index: u32) -> Result<(), ParseError> {
        self.check_function_index(index)?;
        if !self.function_param_types(index).is_empty()
            || !self.function_result_types(index).is_empty()
        {
            return Err(ParseError::TypeMismatch {
                message: "the start function must have no parameters and no results",
            });
        }
        self.start_function = Some(index);
        Ok(())
    }

    /// Returns the start function index, if the module declares one.
    #[must_use]
    pub fn start_function(&self) -> Option<u32> {
        self.start_function
    }
}

// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small builder for constructing wasm binaries without hand-computing section sizes or
//! varint encodings.
//!
//! This is primarily intended for tests and prototypes: the decoder is the product, the
//! builder is the tooling that feeds it. Bodies are written through [`BodyAsm`]; the builder
//! assembles the surrounding sections in id order and fills in all size prefixes.
//!
//! The builder does not validate. A body that forgets its terminating `end`, or an export
//! naming a missing function, is emitted as-is and rejected by the decoder.

use alloc::string::String;
use alloc::vec::Vec;

use crate::format::Writer;
use crate::opcode::{self, FUNCTION_TYPE_FORM, export_kind, import_kind, section};
use crate::types::{FUNCREF, LIMITS_NO_MAX, LIMITS_WITH_MAX, ValueType};

/// A constant initializer expression for globals and segment offsets.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum InitExpr {
    /// An `i32.const` literal.
    I32Const(i32),
    /// An `i64.const` literal.
    I64Const(i64),
    /// An `f32.const` literal.
    F32Const(f32),
    /// An `f64.const` literal.
    F64Const(f64),
    /// A `global.get` of an (imported) global.
    GlobalGet(u32),
}

impl InitExpr {
    fn encode(self, w: &mut Writer) {
        match self {
            Self::I32Const(v) => {
                w.write_u8(opcode::I32_CONST);
                w.write_leb_s32(v);
            }
            Self::I64Const(v) => {
                w.write_u8(opcode::I64_CONST);
                w.write_leb_s64(v);
            }
            Self::F32Const(v) => {
                w.write_u8(opcode::F32_CONST);
                w.write_u32_le(v.to_bits());
            }
            Self::F64Const(v) => {
                w.write_u8(opcode::F64_CONST);
                w.write_u64_le(v.to_bits());
            }
            Self::GlobalGet(index) => {
                w.write_u8(opcode::GLOBAL_GET);
                w.write_leb_u32(index);
            }
        }
        w.write_u8(opcode::END);
    }
}

/// An instruction-level writer for one function body.
#[derive(Clone, Debug, Default)]
pub struct BodyAsm {
    locals: Vec<(u32, ValueType)>,
    code: Writer,
}

impl BodyAsm {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `count` locals of type `t` (appended after the arguments).
    pub fn locals(&mut self, count: u32, t: ValueType) -> &mut Self {
        self.locals.push((count, t));
        self
    }

    /// Emits a raw opcode byte.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.write_u8(opcode);
        self
    }

    /// Emits a raw LEB128 `u32` immediate.
    pub fn imm_u32(&mut self, v: u32) -> &mut Self {
        self.code.write_leb_u32(v);
        self
    }

    /// `i32.const v`
    pub fn i32_const(&mut self, v: i32) -> &mut Self {
        self.code.write_u8(opcode::I32_CONST);
        self.code.write_leb_s32(v);
        self
    }

    /// `i64.const v`
    pub fn i64_const(&mut self, v: i64) -> &mut Self {
        self.code.write_u8(opcode::I64_CONST);
        self.code.write_leb_s64(v);
        self
    }

    /// `f32.const v`
    pub fn f32_const(&mut self, v: f32) -> &mut Self {
        self.code.write_u8(opcode::F32_CONST);
        self.code.write_u32_le(v.to_bits());
        self
    }

    /// `f64.const v`
    pub fn f64_const(&mut self, v: f64) -> &mut Self {
        self.code.write_u8(opcode::F64_CONST);
        self.code.write_u64_le(v.to_bits());
        self
    }

    /// `block` with result type `result` (`None` for void).
    pub fn block(&mut self, result: Option<ValueType>) -> &mut Self {
        self.code.write_u8(opcode::BLOCK);
        self.block_type(result)
    }

    /// `loop` with result type `result`.
    pub fn loop_(&mut self, result: Option<ValueType>) -> &mut Self {
        self.code.write_u8(opcode::LOOP);
        self.block_type(result)
    }

    /// `if` with result type `result`.
    pub fn if_(&mut self, result: Option<ValueType>) -> &mut Self {
        self.code.write_u8(opcode::IF);
        self.block_type(result)
    }

    fn block_type(&mut self, result: Option<ValueType>) -> &mut Self {
        match result {
            Some(t) => self.code.write_u8(t.byte()),
            None => self.code.write_u8(crate::types::VOID_TYPE),
        }
        self
    }

    /// `else`
    pub fn else_(&mut self) -> &mut Self {
        self.op(opcode::ELSE)
    }

    /// `end`
    pub fn end(&mut self) -> &mut Self {
        self.op(opcode::END)
    }

    /// `br depth`
    pub fn br(&mut self, depth: u32) -> &mut Self {
        self.op(opcode::BR).imm_u32(depth)
    }

    /// `br_if depth`
    pub fn br_if(&mut self, depth: u32) -> &mut Self {
        self.op(opcode::BR_IF).imm_u32(depth)
    }

    /// `br_table labels default`
    pub fn br_table(&mut self, labels: &[u32], default: u32) -> &mut Self {
        self.op(opcode::BR_TABLE).imm_u32(labels.len() as u32);
        for &label in labels {
            self.imm_u32(label);
        }
        self.imm_u32(default)
    }

    /// `return`
    pub fn ret(&mut self) -> &mut Self {
        self.op(opcode::RETURN)
    }

    /// `call function_index`
    pub fn call(&mut self, function_index: u32) -> &mut Self {
        self.op(opcode::CALL).imm_u32(function_index)
    }

    /// `call_indirect type_index` (with the trailing zero table byte).
    pub fn call_indirect(&mut self, type_index: u32) -> &mut Self {
        self.op(opcode::CALL_INDIRECT).imm_u32(type_index).op(0x00)
    }

    /// `drop`
    pub fn drop_(&mut self) -> &mut Self {
        self.op(opcode::DROP)
    }

    /// `select`
    pub fn select(&mut self) -> &mut Self {
        self.op(opcode::SELECT)
    }

    /// `local.get index`
    pub fn local_get(&mut self, index: u32) -> &mut Self {
        self.op(opcode::LOCAL_GET).imm_u32(index)
    }

    /// `local.set index`
    pub fn local_set(&mut self, index: u32) -> &mut Self {
        self.op(opcode::LOCAL_SET).imm_u32(index)
    }

    /// `local.tee index`
    pub fn local_tee(&mut self, index: u32) -> &mut Self {
        self.op(opcode::LOCAL_TEE).imm_u32(index)
    }

    /// `global.get index`
    pub fn global_get(&mut self, index: u32) -> &mut Self {
        self.op(opcode::GLOBAL_GET).imm_u32(index)
    }

    /// `global.set index`
    pub fn global_set(&mut self, index: u32) -> &mut Self {
        self.op(opcode::GLOBAL_SET).imm_u32(index)
    }

    /// A load opcode with its align and offset immediates.
    pub fn load(&mut self, load_opcode: u8, align: u32, offset: u32) -> &mut Self {
        self.op(load_opcode).imm_u32(align).imm_u32(offset)
    }

    /// A store opcode with its align and offset immediates.
    pub fn store(&mut self, store_opcode: u8, align: u32, offset: u32) -> &mut Self {
        self.op(store_opcode).imm_u32(align).imm_u32(offset)
    }

    fn encode(&self, w: &mut Writer) {
        let mut body = Writer::new();
        body.write_leb_u32(self.locals.len() as u32);
        for &(count, t) in &self.locals {
            body.write_leb_u32(count);
            body.write_u8(t.byte());
        }
        body.write_bytes(self.code.as_slice());
        w.write_leb_u32(body.len() as u32);
        w.write_bytes(body.as_slice());
    }
}

#[derive(Clone, Debug)]
enum ImportDef {
    Function {
        module: String,
        member: String,
        type_index: u32,
    },
    Table {
        module: String,
        member: String,
        min: u32,
        max: Option<u32>,
    },
    Memory {
        module: String,
        member: String,
        min: u32,
        max: Option<u32>,
    },
    Global {
        module: String,
        member: String,
        value_type: ValueType,
        mutable: bool,
    },
}

#[derive(Clone, Debug)]
struct GlobalDef {
    value_type: ValueType,
    mutable: bool,
    init: InitExpr,
}

/// Builds a complete module binary.
#[derive(Clone, Debug, Default)]
pub struct ModuleBuilder {
    types: Vec<(Vec<ValueType>, Option<ValueType>)>,
    imports: Vec<ImportDef>,
    imported_function_count: u32,
    imported_global_count: u32,
    function_types: Vec<u32>,
    bodies: Vec<BodyAsm>,
    table: Option<(u32, Option<u32>)>,
    memory: Option<(u32, Option<u32>)>,
    globals: Vec<GlobalDef>,
    exports: Vec<(String, u8, u32)>,
    start: Option<u32>,
    elements: Vec<(InitExpr, Vec<u32>)>,
    data: Vec<(InitExpr, Vec<u8>)>,
    customs: Vec<(String, Vec<u8>)>,
}

impl ModuleBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function type and returns its index.
    pub fn push_type(&mut self, params: &[ValueType], result: Option<ValueType>) -> u32 {
        self.types.push((params.to_vec(), result));
        self.types.len() as u32 - 1
    }

    /// Imports a function and returns its index in the function space.
    pub fn import_function(
        &mut self,
        module: impl Into<String>,
        member: impl Into<String>,
        type_index: u32,
    ) -> u32 {
        self.imports.push(ImportDef::Function {
            module: module.into(),
            member: member.into(),
            type_index,
        });
        self.imported_function_count += 1;
        self.imported_function_count - 1
    }

    /// Imports the table.
    pub fn import_table(
        &mut self,
        module: impl Into<String>,
        member: impl Into<String>,
        min: u32,
        max: Option<u32>,
    ) {
        self.imports.push(ImportDef::Table {
            module: module.into(),
            member: member.into(),
            min,
            max,
        });
    }

    /// Imports the memory.
    pub fn import_memory(
        &mut self,
        module: impl Into<String>,
        member: impl Into<String>,
        min: u32,
        max: Option<u32>,
    ) {
        self.imports.push(ImportDef::Memory {
            module: module.into(),
            member: member.into(),
            min,
            max,
        });
    }

    /// Imports a global and returns its index in the global space.
    pub fn import_global(
        &mut self,
        module: impl Into<String>,
        member: impl Into<String>,
        value_type: ValueType,
        mutable: bool,
    ) -> u32 {
        self.imports.push(ImportDef::Global {
            module: module.into(),
            member: member.into(),
            value_type,
            mutable,
        });
        self.imported_global_count += 1;
        self.imported_global_count - 1
    }

    /// Declares a function with `type_index` and its body; returns its function index.
    pub fn push_function(&mut self, type_index: u32, body: BodyAsm) -> u32 {
        self.function_types.push(type_index);
        self.bodies.push(body);
        self.imported_function_count + self.function_types.len() as u32 - 1
    }

    /// Declares the table.
    pub fn set_table(&mut self, min: u32, max: Option<u32>) {
        self.table = Some((min, max));
    }

    /// Declares the memory.
    pub fn set_memory(&mut self, min: u32, max: Option<u32>) {
        self.memory = Some((min, max));
    }

    /// Declares a global and returns its index in the global space.
    pub fn push_global(&mut self, value_type: ValueType, mutable: bool, init: InitExpr) -> u32 {
        self.globals.push(GlobalDef {
            value_type,
            mutable,
            init,
        });
        self.imported_global_count + self.globals.len() as u32 - 1
    }

    /// Exports a function.
    pub fn export_function(&mut self, name: impl Into<String>, index: u32) {
        self.exports.push((name.into(), export_kind::FUNCTION, index));
    }

    /// Exports the table.
    pub fn export_table(&mut self, name: impl Into<String>) {
        self.exports.push((name.into(), export_kind::TABLE, 0));
    }

    /// Exports the memory.
    pub fn export_memory(&mut self, name: impl Into<String>) {
        self.exports.push((name.into(), export_kind::MEMORY, 0));
    }

    /// Exports a global.
    pub fn export_global(&mut self, name: impl Into<String>, index: u32) {
        self.exports.push((name.into(), export_kind::GLOBAL, index));
    }

    /// Sets the start function.
    pub fn set_start(&mut self, index: u32) {
        self.start = Some(index);
    }

    /// Adds an element segment.
    pub fn push_element(&mut self, offset: InitExpr, function_indices: &[u32]) {
        self.elements.push((offset, function_indices.to_vec()));
    }

    /// Adds a data segment.
    pub fn push_data(&mut self, offset: InitExpr, bytes: &[u8]) {
        self.data.push((offset, bytes.to_vec()));
    }

    /// Adds a custom section.
    pub fn push_custom(&mut self, name: impl Into<String>, payload: &[u8]) {
        self.customs.push((name.into(), payload.to_vec()));
    }

    fn write_name(w: &mut Writer, name: &str) {
        w.write_leb_u32(name.len() as u32);
        w.write_bytes(name.as_bytes());
    }

    fn write_limits(w: &mut Writer, min: u32, max: Option<u32>) {
        match max {
            None => {
                w.write_u8(LIMITS_NO_MAX);
                w.write_leb_u32(min);
            }
            Some(max) => {
                w.write_u8(LIMITS_WITH_MAX);
                w.write_leb_u32(min);
                w.write_leb_u32(max);
            }
        }
    }

    fn write_section(w: &mut Writer, id: u8, payload: &Writer) {
        w.write_u8(id);
        w.write_leb_u32(payload.len() as u32);
        w.write_bytes(payload.as_slice());
    }

    /// Emits the module bytes.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32_le(0x6D73_6100);
        w.write_u32_le(0x0000_0001);

        if !self.types.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.types.len() as u32);
            for (params, result) in &self.types {
                payload.write_u8(FUNCTION_TYPE_FORM);
                payload.write_leb_u32(params.len() as u32);
                for t in params {
                    payload.write_u8(t.byte());
                }
                match result {
                    None => payload.write_u8(0x00),
                    Some(t) => {
                        payload.write_u8(0x01);
                        payload.write_u8(t.byte());
                    }
                }
            }
            Self::write_section(&mut w, section::TYPE, &payload);
        }

        if !self.imports.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.imports.len() as u32);
            for import in &self.imports {
                match import {
                    ImportDef::Function {
                        module,
                        member,
                        type_index,
                    } => {
                        Self::write_name(&mut payload, module);
                        Self::write_name(&mut payload, member);
                        payload.write_u8(import_kind::FUNCTION);
                        payload.write_leb_u32(*type_index);
                    }
                    ImportDef::Table {
                        module,
                        member,
                        min,
                        max,
                    } => {
                        Self::write_name(&mut payload, module);
                        Self::write_name(&mut payload, member);
                        payload.write_u8(import_kind::TABLE);
                        payload.write_u8(FUNCREF);
                        Self::write_limits(&mut payload, *min, *max);
                    }
                    ImportDef::Memory {
                        module,
                        member,
                        min,
                        max,
                    } => {
                        Self::write_name(&mut payload, module);
                        Self::write_name(&mut payload, member);
                        payload.write_u8(import_kind::MEMORY);
                        Self::write_limits(&mut payload, *min, *max);
                    }
                    ImportDef::Global {
                        module,
                        member,
                        value_type,
                        mutable,
                    } => {
                        Self::write_name(&mut payload, module);
                        Self::write_name(&mut payload, member);
                        payload.write_u8(import_kind::GLOBAL);
                        payload.write_u8(value_type.byte());
                        payload.write_u8(u8::from(*mutable));
                    }
                }
            }
            Self::write_section(&mut w, section::IMPORT, &payload);
        }

        if !self.function_types.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.function_types.len() as u32);
            for &type_index in &self.function_types {
                payload.write_leb_u32(type_index);
            }
            Self::write_section(&mut w, section::FUNCTION, &payload);
        }

        if let Some((min, max)) = self.table {
            let mut payload = Writer::new();
            payload.write_leb_u32(1);
            payload.write_u8(FUNCREF);
            Self::write_limits(&mut payload, min, max);
            Self::write_section(&mut w, section::TABLE, &payload);
        }

        if let Some((min, max)) = self.memory {
            let mut payload = Writer::new();
            payload.write_leb_u32(1);
            Self::write_limits(&mut payload, min, max);
            Self::write_section(&mut w, section::MEMORY, &payload);
        }

        if !self.globals.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.globals.len() as u32);
            for global in &self.globals {
                payload.write_u8(global.value_type.byte());
                payload.write_u8(u8::from(global.mutable));
                global.init.encode(&mut payload);
            }
            Self::write_section(&mut w, section::GLOBAL, &payload);
        }

        if !self.exports.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.exports.len() as u32);
            for (name, kind, index) in &self.exports {
                Self::write_name(&mut payload, name);
                payload.write_u8(*kind);
                payload.write_leb_u32(*index);
            }
            Self::write_section(&mut w, section::EXPORT, &payload);
        }

        if let Some(index) = self.start {
            let mut payload = Writer::new();
            payload.write_leb_u32(index);
            Self::write_section(&mut w, section::START, &payload);
        }

        if !self.elements.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.elements.len() as u32);
            for (offset, function_indices) in &self.elements {
                payload.write_leb_u32(0); // table index
                offset.encode(&mut payload);
                payload.write_leb_u32(function_indices.len() as u32);
                for &index in function_indices {
                    payload.write_leb_u32(index);
                }
            }
            Self::write_section(&mut w, section::ELEMENT, &payload);
        }

        if !self.bodies.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.bodies.len() as u32);
            for body in &self.bodies {
                body.encode(&mut payload);
            }
            Self::write_section(&mut w, section::CODE, &payload);
        }

        if !self.data.is_empty() {
            let mut payload = Writer::new();
            payload.write_leb_u32(self.data.len() as u32);
            for (offset, bytes) in &self.data {
                payload.write_leb_u32(0); // memory index
                offset.encode(&mut payload);
                payload.write_leb_u32(bytes.len() as u32);
                payload.write_bytes(bytes);
            }
            Self::write_section(&mut w, section::DATA, &payload);
        }

        for (name, bytes) in &self.customs {
            let mut payload = Writer::new();
            Self::write_name(&mut payload, name);
            payload.write_bytes(bytes);
            Self::write_section(&mut w, section::CUSTOM, &payload);
        }

        w.into_vec()
    }
}

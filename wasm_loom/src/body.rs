// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The code-section pass: decoding, type-checking, and side-table generation for every
//! function body, fused into a single traversal.
//!
//! Each body is read instruction by instruction while an [`ExecutionState`] abstractly
//! interprets the stack effects. Control instructions recurse into nested blocks, producing the
//! block tree of [`crate::nodes`]; branches and returns append to the side tables that the
//! executor consumes to unwind the stack at run time.

use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use crate::decoder::try_jump_to_section;
use crate::error::ParseError;
use crate::format::Reader;
use crate::limits::ModuleLimits;
use crate::linker::{LinkerQueue, ResolvedCall};
use crate::module::{CodeEntry, Module};
use crate::nodes::{BlockNode, CallStubNode, IfNode, IndirectCallNode, LoopNode, Node};
use crate::opcode::{self, section};
use crate::state::ExecutionState;
use crate::symbols::SymbolTable;
use crate::types::{BlockType, Mutability, ValueType};

impl Module {
    /// Decodes and validates all function bodies on the current thread.
    ///
    /// Run this exactly once after [`Module::decode`]. With the `std` feature,
    /// [`crate::driver::read_code_entries`] wraps this call and moves it to a background
    /// thread for large modules.
    pub fn read_code_entries(&mut self) -> Result<(), ParseError> {
        let Self {
            data,
            symbols,
            linker,
            limits,
            ..
        } = self;
        let mut r = Reader::new(data);
        if !try_jump_to_section(&mut r, section::CODE)? {
            let declared = symbols.num_functions() - symbols.imported_function_count();
            if declared != 0 {
                return Err(ParseError::FunctionsCodeInconsistentLengths {
                    declared,
                    actual: 0,
                });
            }
            return Ok(());
        }
        let mut pass = CodePass {
            r,
            symbols,
            linker,
            limits,
        };
        pass.read_code_section()
    }
}

struct CodePass<'a> {
    r: Reader<'a>,
    symbols: &'a mut SymbolTable,
    linker: &'a mut LinkerQueue,
    limits: &'a ModuleLimits,
}

/// Per-function context threaded through the block recursion.
struct BodyContext {
    function_index: u32,
    local_types: Vec<ValueType>,
    return_type: BlockType,
    /// Running ordinal of call stubs within this body, for link actions.
    stub_count: u32,
}

impl CodePass<'_> {
    fn read_code_section(&mut self) -> Result<(), ParseError> {
        let actual = self.r.read_length()?;
        // The symbol pass already rejected a count mismatch.
        debug_assert_eq!(
            actual,
            self.symbols.num_functions() - self.symbols.imported_function_count()
        );
        for entry in 0..actual {
            let body_size = self.r.read_leb_u32()?;
            let start = self.r.offset();
            let function_index = self.symbols.imported_function_count() + entry;
            self.read_code_entry(function_index)?;
            let consumed = (self.r.offset() - start) as u32;
            if consumed != body_size {
                return Err(ParseError::malformed(format!(
                    "code entry {entry} size is incorrect"
                )));
            }
        }
        Ok(())
    }

    fn read_code_entry(&mut self, function_index: u32) -> Result<(), ParseError> {
        // The code-entry locals are the argument types followed by the declared locals.
        let mut local_types: Vec<ValueType> =
            self.symbols.function_param_types(function_index).to_vec();
        let groups = self.r.read_length()?;
        for _ in 0..groups {
            let group_len = self.r.read_leb_u32()?;
            let t = ValueType::from_byte(self.r.read_u8()?)?;
            let total = (local_types.len() as u32)
                .checked_add(group_len)
                .ok_or(ParseError::LengthOutOfBounds { length: u32::MAX })?;
            self.limits.check_local_count(total)?;
            for _ in 0..group_len {
                local_types.push(t);
            }
        }

        let return_type = self.symbols.function_block_type(function_index);
        let mut ctx = BodyContext {
            function_index,
            local_types,
            return_type,
            stub_count: 0,
        };
        let mut state = ExecutionState::new();
        let root = self.read_block_body(&mut ctx, &mut state, return_type, false)?;

        if state.stack_size() != return_type.arity() {
            return Err(ParseError::TypeMismatch {
                message: "stack size must match the return type length at the function end",
            });
        }

        let profile_count = state.profile_count();
        let max_stack_size = state.max_stack_size();
        let (int_constants, branch_tables) = state.into_side_tables();
        self.symbols
            .function_mut(function_index)
            .set_code_entry(CodeEntry {
                local_types: ctx.local_types,
                root,
                int_constants,
                branch_tables,
                profile_count,
                max_stack_size,
            });
        Ok(())
    }

    /// Reads instructions until `end` or `else`, interpreting their stack effects and
    /// collecting child nodes.
    fn read_block_body(
        &mut self,
        ctx: &mut BodyContext,
        state: &mut ExecutionState,
        return_type: BlockType,
        is_loop: bool,
    ) -> Result<BlockNode, ParseError> {
        use ValueType::{F32, F64, I32, I64};

        let mut children: Vec<Node> = Vec::new();
        let start_stack_size = state.stack_size();
        let start_offset = self.r.offset() as u32;
        let start_int_constants = state.int_constant_offset();
        let start_branch_tables = state.branch_table_offset();
        let start_profile_count = state.profile_count();

        state.start_block(is_loop, return_type);
        state.set_reachable(true);

        loop {
            let op = self.r.read_u8()?;
            match op {
                opcode::UNREACHABLE => state.mark_unreachable(),
                opcode::NOP => {}
                opcode::BLOCK => {
                    let reachable = state.is_reachable();
                    let block_type = BlockType::from_byte(self.r.read_u8()?)?;
                    let block = self.read_block_body(ctx, state, block_type, false)?;
                    children.push(Node::Block(block));
                    state.set_reachable(reachable);
                }
                opcode::LOOP => {
                    let reachable = state.is_reachable();
                    let block_type = BlockType::from_byte(self.r.read_u8()?)?;
                    let body = self.read_block_body(ctx, state, block_type, true)?;
                    if body.return_type.input_arity() != 0 {
                        return Err(ParseError::LoopInput);
                    }
                    children.push(Node::Loop(LoopNode {
                        body: Box::new(body),
                    }));
                    state.set_reachable(reachable);
                }
                opcode::IF => {
                    state.pop_checked(I32)?;
                    let reachable = state.is_reachable();
                    let if_node = self.read_if(ctx, state)?;
                    children.push(Node::If(if_node));
                    state.set_reachable(reachable);
                }
                // `else` terminates a block exactly like `end`; the `if` reader looks back
                // at the terminator byte to decide whether a false branch follows.
                opcode::ELSE | opcode::END => {}
                opcode::BR => {
                    let unwind_level = self.r.read_leb_u32()?;
                    let target_stack_size = state.target_stack_size(unwind_level)?;
                    state.use_int_constant(target_stack_size);
                    let continuation_length = state.continuation_length(unwind_level)?;
                    state.use_int_constant(continuation_length);
                    state.check_continuation_type(unwind_level)?;
                    state.mark_unreachable();
                }
                opcode::BR_IF => {
                    state.pop_checked(I32)?;
                    let unwind_level = self.r.read_leb_u32()?;
                    let target_stack_size = state.target_stack_size(unwind_level)?;
                    state.use_int_constant(target_stack_size);
                    let continuation_length = state.continuation_length(unwind_level)?;
                    state.use_int_constant(continuation_length);
                    state.check_continuation_type(unwind_level)?;
                    state.increment_profile_count();
                }
                opcode::BR_TABLE => {
                    state.pop_checked(I32)?;
                    let label_count = self.r.read_length()? as usize;
                    // One flat array per br_table: the shared continuation arity, then a
                    // (depth, entry stack size) pair per target, default target last.
                    let mut table = vec![0u32; 2 * (label_count + 1) + 1];
                    let mut continuation_length: Option<u32> = None;
                    for i in 0..=label_count {
                        let unwind_level = self.r.read_leb_u32()?;
                        table[1 + 2 * i] = unwind_level;
                        table[1 + 2 * i + 1] = state.target_stack_size(unwind_level)?;
                        let target_length = state.continuation_length(unwind_level)?;
                        state.check_continuation_type(unwind_level)?;
                        match continuation_length {
                            None => continuation_length = Some(target_length),
                            Some(len) if len != target_length => {
                                return Err(ParseError::TypeMismatch {
                                    message:
                                        "all br_table targets must have the same continuation arity",
                                });
                            }
                            Some(_) => {}
                        }
                    }
                    table[0] = continuation_length.unwrap_or(0);
                    state.save_branch_table(table);
                    state.mark_unreachable();
                }
                opcode::RETURN => {
                    if let BlockType::Value(t) = ctx.return_type {
                        state.pop_checked(t)?;
                    }
                    let depth = state.depth_to_root();
                    state.use_int_constant(depth);
                    let root_length = state.root_return_length();
                    state.use_int_constant(root_length);
                    state.mark_unreachable();
                }
                opcode::CALL => {
                    let function_index = self.read_function_index()?;
                    let param_count = self.symbols.function_param_types(function_index).len();
                    for i in (0..param_count).rev() {
                        let t = self.symbols.function_param_types(function_index)[i];
                        state.pop_checked(t)?;
                    }
                    if let BlockType::Value(t) = self.symbols.function_block_type(function_index) {
                        state.push(t);
                    }
                    // The callee's body may not be decoded yet (or may live in another
                    // module), so the call site is resolved by a deferred action.
                    children.push(Node::CallStub(CallStubNode { function_index }));
                    let caller = ctx.function_index;
                    let stub_index = ctx.stub_count;
                    ctx.stub_count += 1;
                    self.linker.enqueue(Box::new(move |module, instance| {
                        module.symbols().check_function_index(function_index)?;
                        instance.resolved_calls.push(ResolvedCall {
                            caller,
                            stub_index,
                            callee: function_index,
                        });
                        Ok(())
                    }));
                }
                opcode::CALL_INDIRECT => {
                    if !self.symbols.table_exists() {
                        return Err(ParseError::UnknownTable);
                    }
                    let type_index = self.read_type_index()?;
                    state.pop_checked(I32)?; // callee index
                    let param_count = self.symbols.function_type_param_types(type_index).len();
                    for i in (0..param_count).rev() {
                        let t = self.symbols.function_type_param_types(type_index)[i];
                        state.pop_checked(t)?;
                    }
                    if let BlockType::Value(t) = self.symbols.function_type_block_type(type_index) {
                        state.push(t);
                    }
                    state.increment_profile_count();
                    children.push(Node::IndirectCall(IndirectCallNode));
                    let table_byte = self.r.read_u8()?;
                    if table_byte != 0 {
                        return Err(ParseError::ZeroFlagExpected { found: table_byte });
                    }
                }
                opcode::DROP => {
                    state.pop()?;
                }
                opcode::SELECT => {
                    state.pop_checked(I32)?; // condition
                    let first = state.pop()?;
                    let second = state.pop()?;
                    let result = match (first, second) {
                        (Some(a), Some(b)) => {
                            if a != b {
                                return Err(ParseError::StackTypeMismatch {
                                    expected: a,
                                    actual: b,
                                });
                            }
                            Some(a)
                        }
                        (Some(a), None) => Some(a),
                        (None, other) => other,
                    };
                    match result {
                        Some(t) => state.push(t),
                        None => state.push_unknown(),
                    }
                }
                opcode::LOCAL_GET => {
                    let t = self.read_local_type(ctx)?;
                    state.push(t);
                }
                opcode::LOCAL_SET => {
                    let t = self.read_local_type(ctx)?;
                    state.pop_checked(t)?;
                }
                opcode::LOCAL_TEE => {
                    let t = self.read_local_type(ctx)?;
                    state.pop_checked(t)?;
                    state.push(t);
                }
                opcode::GLOBAL_GET => {
                    let index = self.read_global_index()?;
                    state.push(self.symbols.global_value_type(index));
                }
                opcode::GLOBAL_SET => {
                    let index = self.read_global_index()?;
                    if self.symbols.global_mutability(index) != Mutability::Var {
                        return Err(ParseError::ImmutableGlobalWrite { index });
                    }
                    state.pop_checked(self.symbols.global_value_type(index))?;
                }
                opcode::I32_LOAD => self.load(state, I32, 32)?,
                opcode::I64_LOAD => self.load(state, I64, 64)?,
                opcode::F32_LOAD => self.load(state, F32, 32)?,
                opcode::F64_LOAD => self.load(state, F64, 64)?,
                opcode::I32_LOAD8_S | opcode::I32_LOAD8_U => self.load(state, I32, 8)?,
                opcode::I32_LOAD16_S | opcode::I32_LOAD16_U => self.load(state, I32, 16)?,
                opcode::I64_LOAD8_S | opcode::I64_LOAD8_U => self.load(state, I64, 8)?,
                opcode::I64_LOAD16_S | opcode::I64_LOAD16_U => self.load(state, I64, 16)?,
                opcode::I64_LOAD32_S | opcode::I64_LOAD32_U => self.load(state, I64, 32)?,
                opcode::I32_STORE => self.store(state, I32, 32)?,
                opcode::I64_STORE => self.store(state, I64, 64)?,
                opcode::F32_STORE => self.store(state, F32, 32)?,
                opcode::F64_STORE => self.store(state, F64, 64)?,
                opcode::I32_STORE_8 => self.store(state, I32, 8)?,
                opcode::I32_STORE_16 => self.store(state, I32, 16)?,
                opcode::I64_STORE_8 => self.store(state, I64, 8)?,
                opcode::I64_STORE_16 => self.store(state, I64, 16)?,
                opcode::I64_STORE_32 => self.store(state, I64, 32)?,
                opcode::MEMORY_SIZE => {
                    let flag = self.r.read_u8()?;
                    if flag != 0 {
                        return Err(ParseError::ZeroFlagExpected { found: flag });
                    }
                    if !self.symbols.memory_exists() {
                        return Err(ParseError::UnknownMemory);
                    }
                    state.push(I32);
                }
                opcode::MEMORY_GROW => {
                    let flag = self.r.read_u8()?;
                    if flag != 0 {
                        return Err(ParseError::ZeroFlagExpected { found: flag });
                    }
                    if !self.symbols.memory_exists() {
                        return Err(ParseError::UnknownMemory);
                    }
                    state.pop_checked(I32)?;
                    state.push(I32);
                }
                opcode::I32_CONST => {
                    self.r.read_leb_s32()?;
                    state.push(I32);
                }
                opcode::I64_CONST => {
                    self.r.read_leb_s64()?;
                    state.push(I64);
                }
                opcode::F32_CONST => {
                    self.r.read_u32_le()?;
                    state.push(F32);
                }
                opcode::F64_CONST => {
                    self.r.read_u64_le()?;
                    state.push(F64);
                }
                opcode::I32_EQZ => {
                    state.pop_checked(I32)?;
                    state.push(I32);
                }
                opcode::I32_EQ..=opcode::I32_GE_U => {
                    state.pop_checked(I32)?;
                    state.pop_checked(I32)?;
                    state.push(I32);
                }
                opcode::I64_EQZ => {
                    state.pop_checked(I64)?;
                    state.push(I32);
                }
                opcode::I64_EQ..=opcode::I64_GE_U => {
                    state.pop_checked(I64)?;
                    state.pop_checked(I64)?;
                    state.push(I32);
                }
                opcode::F32_EQ..=opcode::F32_GE => {
                    state.pop_checked(F32)?;
                    state.pop_checked(F32)?;
                    state.push(I32);
                }
                opcode::F64_EQ..=opcode::F64_GE => {
                    state.pop_checked(F64)?;
                    state.pop_checked(F64)?;
                    state.push(I32);
                }
                opcode::I32_CLZ..=opcode::I32_POPCNT => {
                    state.pop_checked(I32)?;
                    state.push(I32);
                }
                opcode::I32_ADD..=opcode::I32_ROTR => {
                    state.pop_checked(I32)?;
                    state.pop_checked(I32)?;
                    state.push(I32);
                }
                opcode::I64_CLZ..=opcode::I64_POPCNT => {
                    state.pop_checked(I64)?;
                    state.push(I64);
                }
                opcode::I64_ADD..=opcode::I64_ROTR => {
                    state.pop_checked(I64)?;
                    state.pop_checked(I64)?;
                    state.push(I64);
                }
                opcode::F32_ABS..=opcode::F32_SQRT => {
                    state.pop_checked(F32)?;
                    state.push(F32);
                }
                opcode::F32_ADD..=opcode::F32_COPYSIGN => {
                    state.pop_checked(F32)?;
                    state.pop_checked(F32)?;
                    state.push(F32);
                }
                opcode::F64_ABS..=opcode::F64_SQRT => {
                    state.pop_checked(F64)?;
                    state.push(F64);
                }
                opcode::F64_ADD..=opcode::F64_COPYSIGN => {
                    state.pop_checked(F64)?;
                    state.pop_checked(F64)?;
                    state.push(F64);
                }
                opcode::I32_WRAP_I64 => {
                    state.pop_checked(I64)?;
                    state.push(I32);
                }
                opcode::I32_TRUNC_F32_S | opcode::I32_TRUNC_F32_U => {
                    state.pop_checked(F32)?;
                    state.push(I32);
                }
                opcode::I32_TRUNC_F64_S | opcode::I32_TRUNC_F64_U => {
                    state.pop_checked(F64)?;
                    state.push(I32);
                }
                opcode::I64_EXTEND_I32_S | opcode::I64_EXTEND_I32_U => {
                    state.pop_checked(I32)?;
                    state.push(I64);
                }
                opcode::I64_TRUNC_F32_S | opcode::I64_TRUNC_F32_U => {
                    state.pop_checked(F32)?;
                    state.push(I64);
                }
                opcode::I64_TRUNC_F64_S | opcode::I64_TRUNC_F64_U => {
                    state.pop_checked(F64)?;
                    state.push(I64);
                }
                opcode::F32_CONVERT_I32_S | opcode::F32_CONVERT_I32_U => {
                    state.pop_checked(I32)?;
                    state.push(F32);
                }
                opcode::F32_CONVERT_I64_S | opcode::F32_CONVERT_I64_U => {
                    state.pop_checked(I64)?;
                    state.push(F32);
                }
                opcode::F32_DEMOTE_F64 => {
                    state.pop_checked(F64)?;
                    state.push(F32);
                }
                opcode::F64_CONVERT_I32_S | opcode::F64_CONVERT_I32_U => {
                    state.pop_checked(I32)?;
                    state.push(F64);
                }
                opcode::F64_CONVERT_I64_S | opcode::F64_CONVERT_I64_U => {
                    state.pop_checked(I64)?;
                    state.push(F64);
                }
                opcode::F64_PROMOTE_F32 => {
                    state.pop_checked(F32)?;
                    state.push(F64);
                }
                opcode::I32_REINTERPRET_F32 => {
                    state.pop_checked(F32)?;
                    state.push(I32);
                }
                opcode::I64_REINTERPRET_F64 => {
                    state.pop_checked(F64)?;
                    state.push(I64);
                }
                opcode::F32_REINTERPRET_I32 => {
                    state.pop_checked(I32)?;
                    state.push(F32);
                }
                opcode::F64_REINTERPRET_I64 => {
                    state.pop_checked(I64)?;
                    state.push(F64);
                }
                _ => {
                    return Err(ParseError::malformed(format!("unknown opcode {op:#04x}")));
                }
            }
            if op == opcode::END || op == opcode::ELSE {
                break;
            }
        }

        let node = BlockNode {
            start_offset,
            byte_length: self.r.offset() as u32 - start_offset,
            return_type,
            entry_stack_size: start_stack_size,
            int_constant_offset: start_int_constants,
            int_constant_length: state.int_constant_offset() - start_int_constants,
            branch_table_offset: start_branch_tables,
            branch_table_length: state.branch_table_offset() - start_branch_tables,
            profile_offset: start_profile_count,
            profile_length: state.profile_count() - start_profile_count,
            children,
        };
        state.end_block()?;
        Ok(node)
    }

    fn read_if(
        &mut self,
        ctx: &mut BodyContext,
        state: &mut ExecutionState,
    ) -> Result<IfNode, ParseError> {
        let block_type = BlockType::from_byte(self.r.read_u8()?)?;
        // The condition was popped by the caller.
        let stack_size_after_condition = state.stack_size();

        let start_offset = self.r.offset() as u32;
        let true_branch = self.read_block_body(ctx, state, block_type, false)?;

        // Discard values produced by the then-branch before the else-branch is read.
        state.unwind_stack(stack_size_after_condition);

        let false_branch = if self.r.peek_u8(-1)? == opcode::ELSE {
            Some(Box::new(self.read_block_body(ctx, state, block_type, false)?))
        } else {
            if block_type != BlockType::Void {
                return Err(ParseError::TypeMismatch {
                    message: "an if without an else branch cannot return values",
                });
            }
            None
        };

        Ok(IfNode {
            true_branch: Box::new(true_branch),
            false_branch,
            byte_length: self.r.offset() as u32 - start_offset,
            return_type: block_type,
            stack_size_before_condition: stack_size_after_condition + 1,
        })
    }

    fn read_function_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        self.symbols.check_function_index(index)?;
        Ok(index)
    }

    fn read_type_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        if index >= self.symbols.type_count() {
            return Err(ParseError::UnknownType { index });
        }
        Ok(index)
    }

    fn read_global_index(&mut self) -> Result<u32, ParseError> {
        let index = self.r.read_leb_u32()?;
        if index >= self.symbols.num_globals() {
            return Err(ParseError::UnknownGlobal { index });
        }
        Ok(index)
    }

    fn read_local_type(&mut self, ctx: &BodyContext) -> Result<ValueType, ParseError> {
        let index = self.r.read_leb_u32()?;
        ctx.local_types
            .get(index as usize)
            .copied()
            .ok_or(ParseError::UnknownLocal { index })
    }

    /// The align hint is an exponent: `2^align` must not exceed the access width in bytes.
    fn read_align_hint(&mut self, width_bits: u32) -> Result<u32, ParseError> {
        let align = self.r.read_leb_u32()?;
        if align >= 32 || (1u64 << align) > u64::from(width_bits / 8) {
            return Err(ParseError::AlignmentLargerThanNatural { align, width_bits });
        }
        Ok(align)
    }

    fn load(
        &mut self,
        state: &mut ExecutionState,
        result: ValueType,
        width_bits: u32,
    ) -> Result<(), ParseError> {
        if !self.symbols.memory_exists() {
            return Err(ParseError::UnknownMemory);
        }
        self.read_align_hint(width_bits)?;
        self.r.read_leb_u32()?; // load offset
        state.pop_checked(ValueType::I32)?; // base address
        state.push(result);
        Ok(())
    }

    fn store(
        &mut self,
        state: &mut ExecutionState,
        value: ValueType,
        width_bits: u32,
    ) -> Result<(), ParseError> {
        if !self.symbols.memory_exists() {
            return Err(ParseError::UnknownMemory);
        }
        self.read_align_hint(width_bits)?;
        self.r.read_leb_u32()?; // store offset
        state.pop_checked(value)?; // value to store
        state.pop_checked(ValueType::I32)?; // base address
        Ok(())
    }
}

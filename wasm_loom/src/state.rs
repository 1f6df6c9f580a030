// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-body abstract interpretation state.
//!
//! One [`ExecutionState`] lives for the duration of a single function body. It tracks the typed
//! operand stack, the stack of open blocks, and the append-only side tables that branches and
//! returns consume at execution time. Stack entries are `Option<ValueType>`, with `None` as the
//! polymorphic sentinel: in unreachable regions pops synthesize `None` instead of failing, which
//! is exactly the stack-polymorphism rule of the validation algorithm.
//!
//! Values below the innermost open block's entry depth are never accessible; pops clamp there
//! and fail (or synthesize, when unreachable) rather than reach into an enclosing block.

use alloc::vec::Vec;

use crate::error::ParseError;
use crate::types::{BlockType, ValueType};

#[derive(Copy, Clone, Debug)]
struct BlockFrame {
    is_loop: bool,
    entry_stack_size: u32,
    return_type: BlockType,
}

pub(crate) struct ExecutionState {
    stack: Vec<Option<ValueType>>,
    frames: Vec<BlockFrame>,
    int_constants: Vec<u32>,
    branch_tables: Vec<Vec<u32>>,
    profile_count: u32,
    max_stack_size: u32,
    reachable: bool,
}

impl ExecutionState {
    pub(crate) fn new() -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            int_constants: Vec::new(),
            branch_tables: Vec::new(),
            profile_count: 0,
            max_stack_size: 0,
            reachable: true,
        }
    }

    pub(crate) fn stack_size(&self) -> u32 {
        self.stack.len() as u32
    }

    pub(crate) fn max_stack_size(&self) -> u32 {
        self.max_stack_size
    }

    pub(crate) fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Restores a saved reachability flag (or re-arms it at block entry). This never touches
    /// the operand stack; use [`ExecutionState::mark_unreachable`] for branch-like
    /// instructions.
    pub(crate) fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Enters the stack-polymorphic regime after `unreachable`, `br`, `br_table`, or
    /// `return`: the operand stack is cut back to the block floor and stays polymorphic
    /// until the enclosing block ends.
    pub(crate) fn mark_unreachable(&mut self) {
        let floor = self.current_entry_size();
        self.stack.truncate(floor as usize);
        self.reachable = false;
    }

    fn current_entry_size(&self) -> u32 {
        self.frames.last().map_or(0, |f| f.entry_stack_size)
    }

    fn push_entry(&mut self, entry: Option<ValueType>) {
        self.stack.push(entry);
        self.max_stack_size = self.max_stack_size.max(self.stack.len() as u32);
    }

    pub(crate) fn push(&mut self, t: ValueType) {
        self.push_entry(Some(t));
    }

    /// Pushes the polymorphic sentinel, for results whose type cannot be known
    /// (e.g. `select` over two unknown operands).
    pub(crate) fn push_unknown(&mut self) {
        self.push_entry(None);
    }

    /// Pops one entry, synthesizing the polymorphic sentinel at the block floor when
    /// the region is unreachable.
    pub(crate) fn pop(&mut self) -> Result<Option<ValueType>, ParseError> {
        if self.stack_size() == self.current_entry_size() {
            if self.reachable {
                return Err(ParseError::TypeMismatch {
                    message: "operand stack underflow",
                });
            }
            return Ok(None);
        }
        // The floor check above guarantees a value is present.
        Ok(self.stack.pop().flatten())
    }

    pub(crate) fn pop_checked(&mut self, expected: ValueType) -> Result<(), ParseError> {
        match self.pop()? {
            None => Ok(()),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(ParseError::StackTypeMismatch { expected, actual }),
        }
    }

    /// Checks the top of stack against `expected` without popping it.
    fn check_top(&self, expected: ValueType) -> Result<(), ParseError> {
        if self.stack_size() == self.current_entry_size() {
            if self.reachable {
                return Err(ParseError::TypeMismatch {
                    message: "operand stack underflow",
                });
            }
            return Ok(());
        }
        match self.stack.last() {
            Some(&Some(actual)) if actual != expected => {
                Err(ParseError::StackTypeMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Drops stack entries down to depth `to`. Used to discard a then-branch's results
    /// before the else-branch is read.
    pub(crate) fn unwind_stack(&mut self, to: u32) {
        self.stack.truncate(to as usize);
    }

    pub(crate) fn start_block(&mut self, is_loop: bool, return_type: BlockType) {
        self.frames.push(BlockFrame {
            is_loop,
            entry_stack_size: self.stack_size(),
            return_type,
        });
    }

    /// Closes the innermost block: its result must sit on a stack otherwise returned to
    /// entry depth. The result is pushed back for the enclosing block.
    pub(crate) fn end_block(&mut self) -> Result<(), ParseError> {
        let frame = match self.frames.last() {
            Some(f) => *f,
            None => {
                return Err(ParseError::TypeMismatch {
                    message: "end without an open block",
                });
            }
        };
        if let BlockType::Value(t) = frame.return_type {
            self.pop_checked(t)?;
        }
        if self.stack_size() != frame.entry_stack_size {
            return Err(ParseError::TypeMismatch {
                message: "stack size must match the block entry size at the block end",
            });
        }
        self.frames.pop();
        if let BlockType::Value(t) = frame.return_type {
            self.push(t);
        }
        Ok(())
    }

    fn target(&self, unwind_level: u32) -> Result<&BlockFrame, ParseError> {
        let depth = self.frames.len() as u32;
        if unwind_level >= depth {
            return Err(ParseError::UnknownLabel {
                depth: unwind_level,
            });
        }
        Ok(&self.frames[(depth - 1 - unwind_level) as usize])
    }

    /// The operand stack depth recorded at the target block's entry.
    pub(crate) fn target_stack_size(&self, unwind_level: u32) -> Result<u32, ParseError> {
        Ok(self.target(unwind_level)?.entry_stack_size)
    }

    /// The number of values a branch to this target carries: 0 for loops (the branch goes to
    /// the header), the block's result arity otherwise.
    pub(crate) fn continuation_length(&self, unwind_level: u32) -> Result<u32, ParseError> {
        let frame = self.target(unwind_level)?;
        if frame.is_loop {
            Ok(0)
        } else {
            Ok(frame.return_type.arity())
        }
    }

    /// Checks that the continuation values for a branch to `unwind_level` are on the stack.
    pub(crate) fn check_continuation_type(&self, unwind_level: u32) -> Result<(), ParseError> {
        let frame = self.target(unwind_level)?;
        if frame.is_loop {
            return Ok(());
        }
        match frame.return_type {
            BlockType::Void => Ok(()),
            BlockType::Value(t) => self.check_top(t),
        }
    }

    /// The unwind level that targets the root block.
    pub(crate) fn depth_to_root(&self) -> u32 {
        self.frames.len() as u32 - 1
    }

    pub(crate) fn root_return_length(&self) -> u32 {
        self.frames[0].return_type.arity()
    }

    pub(crate) fn use_int_constant(&mut self, value: u32) {
        self.int_constants.push(value);
    }

    pub(crate) fn int_constant_offset(&self) -> u32 {
        self.int_constants.len() as u32
    }

    pub(crate) fn save_branch_table(&mut self, table: Vec<u32>) {
        self.branch_tables.push(table);
    }

    pub(crate) fn branch_table_offset(&self) -> u32 {
        self.branch_tables.len() as u32
    }

    pub(crate) fn increment_profile_count(&mut self) {
        self.profile_count += 1;
    }

    pub(crate) fn profile_count(&self) -> u32 {
        self.profile_count
    }

    /// Transfers the side tables out for storage on the code entry.
    pub(crate) fn into_side_tables(self) -> (Vec<u32>, Vec<Vec<u32>>) {
        (self.int_constants, self.branch_tables)
    }
}

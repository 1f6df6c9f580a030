// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The block tree emitted for each function body.
//!
//! Nodes do not carry instruction payloads; an executor re-reads the body bytes using the byte
//! spans recorded here, and uses the side-table offsets to find each block's slice of the
//! per-function int-constant, branch-table, and profile-counter arrays.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::types::BlockType;

/// A child of a block.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A nested `block`.
    Block(BlockNode),
    /// A `loop`, wrapping its body block.
    Loop(LoopNode),
    /// An `if`, with optional `else`.
    If(IfNode),
    /// A direct call, resolved after linking.
    CallStub(CallStubNode),
    /// An indirect call through the table.
    IndirectCall(IndirectCallNode),
}

/// A decoded block and its side-table window.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockNode {
    /// Offset of the first body byte in the original input.
    pub start_offset: u32,
    /// Number of body bytes, terminator included.
    pub byte_length: u32,
    /// The block's result type.
    pub return_type: BlockType,
    /// Operand stack depth at block entry.
    pub entry_stack_size: u32,
    /// Start of this block's window into the code entry's int-constant table.
    pub int_constant_offset: u32,
    /// Length of the int-constant window.
    pub int_constant_length: u32,
    /// Start of this block's window into the code entry's branch-table array.
    pub branch_table_offset: u32,
    /// Length of the branch-table window.
    pub branch_table_length: u32,
    /// First profile-counter slot used inside this block.
    pub profile_offset: u32,
    /// Number of profile-counter slots used inside this block.
    pub profile_length: u32,
    /// Child nodes in instruction order.
    pub children: Vec<Node>,
}

/// A `loop` node. Branches to it target the loop header, so its continuation arity is 0.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopNode {
    /// The loop body.
    pub body: Box<BlockNode>,
}

/// An `if` node. The condition is popped before the branches are entered.
#[derive(Clone, Debug, PartialEq)]
pub struct IfNode {
    /// The branch taken on a non-zero condition.
    pub true_branch: Box<BlockNode>,
    /// The branch taken on a zero condition, if present.
    pub false_branch: Option<Box<BlockNode>>,
    /// Number of body bytes covered by both branches.
    pub byte_length: u32,
    /// The result type shared by both branches.
    pub return_type: BlockType,
    /// Operand stack depth before the condition was pushed.
    pub stack_size_before_condition: u32,
}

/// A placeholder for a direct call; the target is resolved by a deferred link action.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallStubNode {
    /// Index of the callee in the function index space.
    pub function_index: u32,
}

/// An indirect call site. The callee index and expected type are re-read from the body bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct IndirectCallNode;

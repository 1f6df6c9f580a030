// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred link actions and instantiation.
//!
//! Section readers cannot finish global initializers, element segments, data segments, or call
//! sites while the module is still being decoded, so they enqueue closures to run once an
//! instance exists. The closures capture only small integers and byte vectors, never references
//! into unresolved structures, and run in section order, so a data segment whose offset is an
//! imported `global.get` observes the already-initialized global.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::error::ParseError;
use crate::module::Module;
use crate::store::{GlobalStore, MemoryStore, TableStore};

/// A call site resolved after linking: the `stub_index`-th call stub of function `caller`
/// targets function `callee`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCall {
    /// The calling function's index.
    pub caller: u32,
    /// Ordinal of the call stub within the caller's body, in decode order.
    pub stub_index: u32,
    /// The callee's index in the function index space.
    pub callee: u32,
}

/// One instantiation of a module: the stores that link actions and reset passes write.
#[derive(Debug)]
pub struct Instance {
    /// Typed global slots.
    pub globals: GlobalStore,
    /// The linear memory, if the module declares or imports one.
    pub memory: Option<MemoryStore>,
    /// The funcref table, if the module declares or imports one.
    pub table: Option<TableStore>,
    /// Call sites resolved by link actions, for the downstream executor.
    pub resolved_calls: Vec<ResolvedCall>,
}

impl Instance {
    fn new(module: &Module) -> Self {
        let symbols = module.symbols();
        Self {
            globals: GlobalStore::new(symbols.num_globals()),
            memory: symbols.memory().map(|m| MemoryStore::new(m.min)),
            table: symbols.table().map(|t| TableStore::new(t.min)),
            resolved_calls: Vec::new(),
        }
    }

    pub(crate) fn memory_mut(&mut self) -> Result<&mut MemoryStore, ParseError> {
        self.memory.as_mut().ok_or(ParseError::UnknownMemory)
    }

    pub(crate) fn table_mut(&mut self) -> Result<&mut TableStore, ParseError> {
        self.table.as_mut().ok_or(ParseError::UnknownTable)
    }
}

/// A deferred action run at instantiation.
pub type LinkAction = Box<dyn Fn(&Module, &mut Instance) -> Result<(), ParseError> + Send + Sync>;

/// The queue of deferred actions collected while decoding.
#[derive(Default)]
pub struct LinkerQueue {
    actions: Vec<LinkAction>,
}

impl LinkerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&mut self, action: LinkAction) {
        self.actions.push(action);
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` when no actions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn run(&self, module: &Module, instance: &mut Instance) -> Result<(), ParseError> {
        for action in &self.actions {
            action(module, instance)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkerQueue")
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// An initializer offset expression: an `i32` literal or a `global.get` of an imported global.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConstOffset {
    Literal(i32),
    ImportedGlobal(u32),
}

impl ConstOffset {
    pub(crate) fn resolve(self, globals: &GlobalStore) -> u32 {
        match self {
            Self::Literal(v) => v as u32,
            Self::ImportedGlobal(index) => globals.load(index) as u32,
        }
    }
}

impl Module {
    /// Creates an instance and runs all deferred link actions against it.
    ///
    /// Actions run in section order; any failure aborts instantiation.
    pub fn instantiate(&self) -> Result<Instance, ParseError> {
        let mut instance = Instance::new(self);
        self.linker.run(self, &mut instance)?;
        Ok(instance)
    }
}

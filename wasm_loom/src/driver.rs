// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Optional off-thread execution of the code-section pass.
//!
//! Abstract interpretation of a large code section is by far the most expensive part of
//! decoding, and its recursion depth scales with block nesting. For modules at or above a
//! configurable size the pass is moved onto a single background thread with an explicitly
//! sized stack; the caller blocks until it joins, so nothing downstream can observe a
//! half-decoded module.
//!
//! Failures crossing the join are normalized: any error or panic in the background pass
//! surfaces as `UnspecifiedInvalid("Asynchronous parsing failed.")`, and a thread that could
//! not be spawned as `UnspecifiedInvalid("Asynchronous parsing interrupted.")`.

use std::thread;

use crate::error::ParseError;
use crate::module::Module;

const MIN_DEFAULT_STACK_SIZE: usize = 1_000_000;
const MAX_DEFAULT_ASYNC_STACK_SIZE: usize = 10_000_000;

/// Configuration for [`read_code_entries`].
#[derive(Clone, Debug)]
pub struct ParserConfig {
    /// Byte threshold at or above which the code section runs on a background thread.
    /// 0 means always synchronous.
    pub async_parsing_binary_size: usize,
    /// Requested background stack size in KB. 0 means a computed default of
    /// `max(1 MB, min(2 * binary size, 10 MB))`.
    pub async_parsing_stack_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            async_parsing_binary_size: 100_000,
            async_parsing_stack_size: 0,
        }
    }
}

/// Runs the code-section pass, on a background thread when the module is large enough.
pub fn read_code_entries(module: &mut Module, config: &ParserConfig) -> Result<(), ParseError> {
    let binary_size = module.data().len();
    if config.async_parsing_binary_size == 0 || binary_size < config.async_parsing_binary_size {
        return module.read_code_entries();
    }

    let requested = config.async_parsing_stack_size * 1000;
    let computed = MIN_DEFAULT_STACK_SIZE.max((2 * binary_size).min(MAX_DEFAULT_ASYNC_STACK_SIZE));
    let stack_size = if requested != 0 { requested } else { computed };

    thread::scope(|scope| {
        let builder = thread::Builder::new()
            .name("wasm-parsing-thread".into())
            .stack_size(stack_size);
        let handle = match builder.spawn_scoped(scope, || module.read_code_entries()) {
            Ok(handle) => handle,
            Err(_) => return Err(ParseError::invalid("Asynchronous parsing interrupted.")),
        };
        match handle.join() {
            Ok(Ok(())) => Ok(()),
            // Both a reported failure and a panic in the parsing thread normalize to the
            // same kind at the join point.
            Ok(Err(_)) | Err(_) => Err(ParseError::invalid("Asynchronous parsing failed.")),
        }
    })
}

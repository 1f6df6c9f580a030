// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `wasm_loom` live in `benches/decode.rs`.

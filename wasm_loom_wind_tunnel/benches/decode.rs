// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "benchmark crate")]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use wasm_loom::builder::{BodyAsm, ModuleBuilder};
use wasm_loom::module::Module;
use wasm_loom::types::ValueType;

/// A module with `function_count` small arithmetic functions and one branchy driver.
fn build_module(function_count: u32) -> Vec<u8> {
    use ValueType::I32;

    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[I32], Some(I32));

    for i in 0..function_count {
        let mut body = BodyAsm::new();
        body.local_get(0)
            .block(Some(I32))
            .i32_const(i as i32)
            .i32_const(1)
            .br_if(0)
            .i32_const(2)
            .op(wasm_loom::opcode::I32_MUL)
            .end()
            .op(wasm_loom::opcode::I32_ADD)
            .end();
        builder.push_function(t, body);
    }
    builder.build()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_module");
    for &function_count in &[10_u32, 100, 1000] {
        let bytes = build_module(function_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(function_count),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let mut module = Module::decode(black_box(bytes.clone())).unwrap();
                    module.read_code_entries().unwrap();
                    black_box(module)
                });
            },
        );
    }
    group.finish();
}

fn bench_symbol_pass_only(c: &mut Criterion) {
    let bytes = build_module(1000);
    c.bench_function("symbol_pass_1000", |b| {
        b.iter(|| black_box(Module::decode(black_box(bytes.clone())).unwrap()));
    });
}

criterion_group!(benches, bench_decode, bench_symbol_pass_only);
criterion_main!(benches);

// Copyright 2026 the Wasm Loom Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use wasm_loom::builder::{BodyAsm, InitExpr, ModuleBuilder};
use wasm_loom::error::{LimitKind, ParseError};
use wasm_loom::format::Reader;
use wasm_loom::limits::ModuleLimits;
use wasm_loom::linker::ResolvedCall;
use wasm_loom::module::Module;
use wasm_loom::nodes::Node;
use wasm_loom::opcode;
use wasm_loom::types::{BlockType, ValueType};

const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

fn decode_full(bytes: Vec<u8>) -> Result<Module, ParseError> {
    let mut module = Module::decode(bytes)?;
    module.read_code_entries()?;
    Ok(module)
}

/// Offsets at which a section ends (the first entry is the end of the header).
fn section_boundaries(bytes: &[u8]) -> Vec<usize> {
    let mut r = Reader::new(bytes);
    r.jump(8).unwrap();
    let mut boundaries = vec![8];
    while !r.eof() {
        r.read_u8().unwrap();
        let size = r.read_leb_u32().unwrap();
        r.skip(size as usize).unwrap();
        boundaries.push(r.offset());
    }
    boundaries
}

/// `() -> i32` returning the constant 42, built through the builder.
fn const_42_module() -> Vec<u8> {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.i32_const(42).end();
    builder.push_function(t, body);
    builder.build()
}

#[test]
fn s1_minimal_empty_module() {
    let module = decode_full(HEADER.to_vec()).unwrap();
    assert_eq!(module.symbols().num_functions(), 0);
    assert_eq!(module.symbols().type_count(), 0);
    assert!(module.custom_sections().is_empty());
    assert!(module.linker().is_empty());
}

#[test]
fn s2_bad_magic() {
    let err = decode_full(vec![0x00, 0x61, 0x73, 0x6E, 0x01, 0x00, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err, ParseError::InvalidMagicNumber { .. }));
}

#[test]
fn s3_duplicate_type_section() {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[1, 1, 0]);
    bytes.extend_from_slice(&[1, 1, 0]);
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::DuplicatedSection { id: 1 }
    );
}

#[test]
fn s4_function_with_immediate_return() {
    let module = decode_full(const_42_module()).unwrap();
    let code = module.symbols().function(0).code_entry().unwrap();
    assert_eq!(code.root.return_type, BlockType::Value(ValueType::I32));
    assert_eq!(code.root.entry_stack_size, 0);
    assert!(code.root.children.is_empty());
    assert!(code.int_constants.is_empty());
    assert!(code.branch_tables.is_empty());
    assert_eq!(code.profile_count, 0);
    assert_eq!(code.max_stack_size, 1);
}

#[test]
fn s5_br_table_arity_mismatch() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.block(Some(ValueType::I32)) // arity 1
        .block(None) // arity 0
        .i32_const(7)
        .i32_const(0)
        .br_table(&[0], 1)
        .end()
        .end()
        .drop_()
        .end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::TypeMismatch { .. }
    ));
}

#[test]
fn s6_global_set_on_immutable_global() {
    let mut builder = ModuleBuilder::new();
    let g = builder.push_global(ValueType::I32, false, InitExpr::I32Const(0));
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(1).global_set(g).end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::ImmutableGlobalWrite { index: 0 }
    );
}

#[test]
fn s7_memory_alignment_overshoot() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(0)
        .load(opcode::I32_LOAD, 3, 0)
        .drop_()
        .end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::AlignmentLargerThanNatural {
            align: 3,
            width_bits: 32,
        }
    );
}

#[test]
fn natural_alignment_is_accepted() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(0)
        .load(opcode::I32_LOAD, 2, 0)
        .drop_()
        .end();
    builder.push_function(t, body);
    decode_full(builder.build()).unwrap();
}

#[test]
fn every_truncation_of_a_module_is_rejected_consistently() {
    let bytes = const_42_module();
    let boundaries = section_boundaries(&bytes);
    // [header end, type end, function end, code end]
    assert_eq!(boundaries.len(), 4);
    assert_eq!(*boundaries.last().unwrap(), bytes.len());

    for p in 0..bytes.len() {
        let result = decode_full(bytes[..p].to_vec());
        if p == boundaries[0] || p == boundaries[1] {
            // A cut exactly after the header or the type section leaves a complete
            // (smaller) module that declares no functions.
            assert!(result.is_ok(), "prefix of {p} bytes should decode");
        } else if p == boundaries[2] {
            // Functions are declared but the code section is gone.
            assert!(
                matches!(
                    result.unwrap_err(),
                    ParseError::FunctionsCodeInconsistentLengths {
                        declared: 1,
                        actual: 0,
                    }
                ),
                "prefix of {p} bytes"
            );
        } else {
            assert_eq!(
                result.unwrap_err(),
                ParseError::UnexpectedEnd,
                "prefix of {p} bytes"
            );
        }
    }
}

#[test]
fn section_sizes_partition_the_input() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.i32_const(1).end();
    let f = builder.push_function(t, body);
    builder.export_function("f", f);
    builder.push_data(InitExpr::I32Const(0), &[1, 2, 3]);
    builder.push_custom("meta", &[9, 9]);
    let bytes = builder.build();

    let boundaries = section_boundaries(&bytes);
    assert_eq!(*boundaries.last().unwrap(), bytes.len());
    assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
    decode_full(bytes).unwrap();
}

/// A module exercising branches, br_table, calls, and an if, with known side tables.
fn branchy_module() -> Vec<u8> {
    use ValueType::I32;

    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(I32));

    let mut f0 = BodyAsm::new();
    f0.block(Some(I32))
        .loop_(None)
        .i32_const(0)
        .br_if(0)
        .i32_const(5)
        .i32_const(1)
        .br_if(1)
        .drop_()
        .end() // loop
        .call(1)
        .block(None)
        .i32_const(9)
        .i32_const(0)
        .br_table(&[1], 1)
        .end() // inner block
        .end() // outer block
        .end();

    let mut f1 = BodyAsm::new();
    f1.i32_const(7).end();

    builder.push_function(t, f0);
    builder.push_function(t, f1);
    builder.build()
}

#[test]
fn branch_side_tables_are_emitted() {
    let module = decode_full(branchy_module()).unwrap();
    let code = module.symbols().function(0).code_entry().unwrap();

    // Two br_if sites: (target stack size, continuation length) each.
    assert_eq!(code.int_constants, vec![0, 0, 0, 1]);
    // One br_table: [arity, depth0, stack0, depth_default, stack_default].
    assert_eq!(code.branch_tables, vec![vec![1, 1, 0, 1, 0]]);
    // br_if twice; no call_indirect.
    assert_eq!(code.profile_count, 2);
    assert_eq!(code.max_stack_size, 3);

    // The outer block carries the whole side-table window.
    let Node::Block(outer) = &code.root.children[0] else {
        panic!("expected a block node");
    };
    assert_eq!(outer.int_constant_offset, 0);
    assert_eq!(outer.int_constant_length, 4);
    assert_eq!(outer.branch_table_length, 1);
    assert_eq!(outer.profile_length, 2);
}

#[test]
fn revalidation_yields_identical_side_tables() {
    let bytes = branchy_module();
    let first = decode_full(bytes.clone()).unwrap();
    let second = decode_full(bytes).unwrap();
    for i in 0..first.symbols().num_functions() {
        assert_eq!(
            first.symbols().function(i).code_entry(),
            second.symbols().function(i).code_entry()
        );
    }
}

#[test]
fn call_sites_resolve_at_instantiation() {
    let module = decode_full(branchy_module()).unwrap();
    let instance = module.instantiate().unwrap();
    assert_eq!(
        instance.resolved_calls,
        vec![ResolvedCall {
            caller: 0,
            stub_index: 0,
            callee: 1,
        }]
    );
}

// Single-byte mutations of a known-good module, each with its specific rejection.

/// Hand-assembled module with fixed offsets: type (i32)->i32, one function, a table,
/// and a body `local.get 0; end`.
fn mutation_subject() -> Vec<u8> {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[1, 6, 1, 0x60, 1, 0x7F, 0x01, 0x7F]); // 8..16
    bytes.extend_from_slice(&[3, 2, 1, 0]); // 16..20
    bytes.extend_from_slice(&[4, 4, 1, 0x70, 0x00, 0x00]); // 20..26
    bytes.extend_from_slice(&[10, 6, 1, 4, 0, 0x20, 0x00, 0x0B]); // 26..34
    bytes
}

#[test]
fn mutation_subject_is_accepted() {
    decode_full(mutation_subject()).unwrap();
}

#[test]
fn mutating_a_section_id_is_rejected() {
    let mut bytes = mutation_subject();
    bytes[8] = 12;
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::MalformedSectionId { id: 12 }
    );

    let mut bytes = mutation_subject();
    bytes[16] = 1; // a second "type" section
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::DuplicatedSection { id: 1 }
    );
}

#[test]
fn shrinking_a_declared_size_is_rejected() {
    let mut bytes = mutation_subject();
    bytes[9] -= 1;
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::SectionSizeMismatch {
            id: 1,
            declared: 5,
            actual: 6,
        }
    );
}

#[test]
fn clobbering_a_value_type_is_rejected() {
    let mut bytes = mutation_subject();
    bytes[13] = 0x5F;
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::MalformedValueType { byte: 0x5F }
    );
}

#[test]
fn clobbering_the_table_element_type_is_rejected() {
    let mut bytes = mutation_subject();
    bytes[23] = 0x6F;
    assert!(matches!(
        decode_full(bytes).unwrap_err(),
        ParseError::UnspecifiedMalformed { .. }
    ));
}

// Control flow and stack discipline.

#[test]
fn if_else_produces_an_if_node() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.i32_const(1)
        .if_(Some(ValueType::I32))
        .i32_const(2)
        .else_()
        .i32_const(3)
        .end()
        .end();
    builder.push_function(t, body);

    let module = decode_full(builder.build()).unwrap();
    let code = module.symbols().function(0).code_entry().unwrap();
    let Node::If(if_node) = &code.root.children[0] else {
        panic!("expected an if node");
    };
    assert!(if_node.false_branch.is_some());
    assert_eq!(if_node.return_type, BlockType::Value(ValueType::I32));
    assert_eq!(if_node.stack_size_before_condition, 1);
}

#[test]
fn valued_if_requires_an_else_branch() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(1)
        .if_(Some(ValueType::I32))
        .i32_const(2)
        .end()
        .drop_()
        .end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::TypeMismatch { .. }
    ));
}

#[test]
fn unreachable_regions_are_stack_polymorphic() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.op(opcode::UNREACHABLE).op(opcode::I32_ADD).end();
    builder.push_function(t, body);
    decode_full(builder.build()).unwrap();
}

#[test]
fn branch_deeper_than_the_nesting_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.br(3).end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownLabel { depth: 3 }
    );
}

#[test]
fn select_requires_matching_operand_types() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(1)
        .i64_const(2)
        .i32_const(0)
        .select()
        .drop_()
        .end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::StackTypeMismatch { .. }
    ));
}

#[test]
fn function_result_must_be_on_the_stack_at_the_end() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::TypeMismatch { .. }
    ));
}

#[test]
fn unknown_local_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.local_get(3).drop_().end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownLocal { index: 3 }
    );
}

#[test]
fn unknown_opcode_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.op(0xFE).end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnspecifiedMalformed { .. }
    ));
}

#[test]
fn overlong_leb_in_a_body_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.op(opcode::I32_CONST)
        .op(0x80)
        .op(0x80)
        .op(0x80)
        .op(0x80)
        .op(0x80)
        .op(0x00)
        .drop_()
        .end();
    builder.push_function(t, body);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::MalformedLeb { .. }
    ));
}

// Memory and table instructions.

#[test]
fn memory_size_reserved_flag_must_be_zero() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.op(opcode::MEMORY_SIZE).op(0x01).drop_().end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::ZeroFlagExpected { found: 1 }
    );
}

#[test]
fn memory_grow_without_a_memory_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(1).op(opcode::MEMORY_GROW).op(0x00).drop_().end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownMemory
    );
}

#[test]
fn load_without_a_memory_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(0).load(opcode::I32_LOAD, 0, 0).drop_().end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownMemory
    );
}

#[test]
fn call_indirect_requires_a_table() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(0).call_indirect(t).end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownTable
    );
}

#[test]
fn call_indirect_trailing_byte_must_be_zero() {
    let mut builder = ModuleBuilder::new();
    builder.set_table(1, None);
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.i32_const(0)
        .op(opcode::CALL_INDIRECT)
        .imm_u32(t)
        .op(0x01)
        .end();
    builder.push_function(t, body);
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::ZeroFlagExpected { found: 1 }
    );
}

// Imports, exports, start.

#[test]
fn imported_functions_occupy_the_low_indices() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let imported = builder.import_function("env", "f", t);
    let mut body = BodyAsm::new();
    body.call(imported).end();
    let declared = builder.push_function(t, body);

    let module = decode_full(builder.build()).unwrap();
    assert_eq!(module.symbols().num_functions(), 2);
    assert_eq!(module.symbols().imported_function_count(), 1);
    assert!(module.symbols().function(imported).code_entry().is_none());
    assert!(module.symbols().function(declared).code_entry().is_some());

    let instance = module.instantiate().unwrap();
    assert_eq!(
        instance.resolved_calls,
        vec![ResolvedCall {
            caller: declared,
            stub_index: 0,
            callee: imported,
        }]
    );
}

#[test]
fn malformed_import_name_is_rejected() {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[2, 9, 1, 1, 0xFF, 1, b'm', 2, 0x00, 0x01]);
    assert!(matches!(
        decode_full(bytes).unwrap_err(),
        ParseError::MalformedUtf8 { .. }
    ));
}

#[test]
fn start_function_is_recorded() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.end();
    let f = builder.push_function(t, body);
    builder.set_start(f);
    let module = decode_full(builder.build()).unwrap();
    assert_eq!(module.symbols().start_function(), Some(f));
}

#[test]
fn start_function_with_a_result_is_rejected() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], Some(ValueType::I32));
    let mut body = BodyAsm::new();
    body.i32_const(1).end();
    let f = builder.push_function(t, body);
    builder.set_start(f);
    assert!(matches!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::TypeMismatch { .. }
    ));
}

// Function/code section consistency.

#[test]
fn declared_functions_require_code_entries() {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[1, 4, 1, 0x60, 0, 0]);
    bytes.extend_from_slice(&[3, 2, 1, 0]);
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::FunctionsCodeInconsistentLengths {
            declared: 1,
            actual: 0,
        }
    );
}

#[test]
fn code_entry_count_must_match_the_function_section() {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[1, 4, 1, 0x60, 0, 0]);
    bytes.extend_from_slice(&[3, 2, 1, 0]);
    bytes.extend_from_slice(&[10, 7, 2, 2, 0, 0x0B, 2, 0, 0x0B]);
    assert_eq!(
        decode_full(bytes).unwrap_err(),
        ParseError::FunctionsCodeInconsistentLengths {
            declared: 1,
            actual: 2,
        }
    );
}

// Limits.

#[test]
fn function_count_limit_is_enforced() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    for _ in 0..2 {
        let mut body = BodyAsm::new();
        body.end();
        builder.push_function(t, body);
    }
    let limits = ModuleLimits {
        function_count: 1,
        ..ModuleLimits::default()
    };
    let err = Module::decode_with_limits(builder.build(), limits).unwrap_err();
    assert!(matches!(
        err,
        ParseError::LimitExceeded {
            limit: LimitKind::FunctionCount,
            value: 2,
            max: 1,
        }
    ));
}

#[test]
fn local_count_limit_is_enforced() {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.locals(10, ValueType::I64).end();
    builder.push_function(t, body);
    let limits = ModuleLimits {
        local_count: 4,
        ..ModuleLimits::default()
    };
    let err = Module::decode_with_limits(builder.build(), limits).unwrap_err();
    assert!(matches!(
        err,
        ParseError::LimitExceeded {
            limit: LimitKind::LocalCount,
            ..
        }
    ));
}

// Name section tolerance.

fn module_with_name_section(payload: &[u8]) -> Vec<u8> {
    let mut builder = ModuleBuilder::new();
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.end();
    builder.push_function(t, body);
    builder.push_custom("name", payload);
    builder.build()
}

#[test]
fn function_names_are_recovered() {
    // Function-name subsection: id 1, 9 payload bytes, one entry naming function 0.
    let payload = [1, 9, 1, 0, 6, b'a', b'n', b's', b'w', b'e', b'r'];
    let module = decode_full(module_with_name_section(&payload)).unwrap();
    assert_eq!(module.symbols().function(0).debug_name(), Some("answer"));
}

#[test]
fn malformed_name_section_is_dropped_without_invalidating_the_module() {
    // Out-of-range function index.
    let payload = [1, 9, 1, 5, 6, b'a', b'n', b's', b'w', b'e', b'r'];
    let module = decode_full(module_with_name_section(&payload)).unwrap();
    assert_eq!(module.symbols().function(0).debug_name(), None);

    // Truncated subsection.
    let payload = [1, 200, 1];
    let module = decode_full(module_with_name_section(&payload)).unwrap();
    assert_eq!(module.symbols().function(0).debug_name(), None);

    // Bad UTF-8 in a function name.
    let payload = [1, 5, 1, 0, 2, 0xFF, 0xFE];
    let module = decode_full(module_with_name_section(&payload)).unwrap();
    assert_eq!(module.symbols().function(0).debug_name(), None);
}

#[test]
fn unknown_name_subsections_are_skipped() {
    // Module-name subsection (id 0) followed by garbage that never matches ids 1 or 2.
    let payload = [0, 1, 0xAA, 7, 7, 7];
    let module = decode_full(module_with_name_section(&payload)).unwrap();
    assert_eq!(module.symbols().function(0).debug_name(), None);
}

// Instantiation, segments, and reset passes.

#[test]
fn data_segments_initialize_the_memory() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    builder.push_data(InitExpr::I32Const(3), b"abc");
    let module = decode_full(builder.build()).unwrap();

    let mut instance = module.instantiate().unwrap();
    assert_eq!(&instance.memory.as_ref().unwrap().bytes()[3..6], b"abc");

    // Clobber the bytes, then reset.
    instance.memory.as_mut().unwrap().write(3, b"xyz").unwrap();
    module.reset_memory_state(&mut instance).unwrap();
    assert_eq!(&instance.memory.as_ref().unwrap().bytes()[3..6], b"abc");
}

#[test]
fn oversized_data_segment_fails_at_instantiation() {
    let mut builder = ModuleBuilder::new();
    builder.set_memory(1, None);
    builder.push_data(InitExpr::I32Const(65_534), b"abc");
    let module = decode_full(builder.build()).unwrap();
    assert_eq!(
        module.instantiate().unwrap_err(),
        ParseError::DataSegmentDoesNotFit {
            offset: 65_534,
            length: 3,
        }
    );
}

#[test]
fn element_segments_initialize_the_table() {
    let mut builder = ModuleBuilder::new();
    builder.set_table(2, None);
    let t = builder.push_type(&[], None);
    let mut body = BodyAsm::new();
    body.end();
    let f = builder.push_function(t, body);
    builder.push_element(InitExpr::I32Const(1), &[f]);
    let module = decode_full(builder.build()).unwrap();

    let mut instance = module.instantiate().unwrap();
    assert_eq!(instance.table.as_ref().unwrap().get(0), None);
    assert_eq!(instance.table.as_ref().unwrap().get(1), Some(f));

    module.reset_table_state(&mut instance).unwrap();
    assert_eq!(instance.table.as_ref().unwrap().get(1), Some(f));
}

#[test]
fn global_initializers_read_imported_globals_at_link_time() {
    let mut builder = ModuleBuilder::new();
    let base = builder.import_global("env", "base", ValueType::I32, false);
    let derived = builder.push_global(ValueType::I32, true, InitExpr::GlobalGet(base));
    let answer = builder.push_global(ValueType::I64, true, InitExpr::I64Const(5));
    let module = decode_full(builder.build()).unwrap();

    let mut instance = module.instantiate().unwrap();
    assert_eq!(instance.globals.load(derived), 0);
    assert_eq!(instance.globals.load(answer), 5);

    // The embedder updates the imported global; a reset re-derives the others from it.
    instance.globals.store(base, 42);
    instance.globals.store(answer, 99);
    module.reset_global_state(&mut instance).unwrap();
    assert_eq!(instance.globals.load(base), 42);
    assert_eq!(instance.globals.load(derived), 42);
    assert_eq!(instance.globals.load(answer), 5);
}

#[test]
fn global_initializer_may_not_reference_a_declared_global() {
    let mut builder = ModuleBuilder::new();
    builder.push_global(ValueType::I32, false, InitExpr::I32Const(1));
    builder.push_global(ValueType::I32, false, InitExpr::GlobalGet(0));
    assert_eq!(
        decode_full(builder.build()).unwrap_err(),
        ParseError::UnknownGlobal { index: 0 }
    );
}

// The background driver agrees with the synchronous pass.

#[test]
fn background_code_pass_matches_the_synchronous_one() {
    use wasm_loom::driver::{ParserConfig, read_code_entries};

    let bytes = branchy_module();
    let mut sync_module = Module::decode(bytes.clone()).unwrap();
    sync_module.read_code_entries().unwrap();

    let mut async_module = Module::decode(bytes).unwrap();
    let config = ParserConfig {
        async_parsing_binary_size: 1,
        async_parsing_stack_size: 0,
    };
    read_code_entries(&mut async_module, &config).unwrap();

    for i in 0..sync_module.symbols().num_functions() {
        assert_eq!(
            sync_module.symbols().function(i).code_entry(),
            async_module.symbols().function(i).code_entry()
        );
    }
}

//! Data-declaration parsing: reserves, strings, floats, DUP replication,
//! nested sub-lists, and numeric reduction.

mod common;

use common::parse;
use oxasm::insn::{ExtOpKind, Opcode};

fn eops(line: &str) -> Vec<oxasm::ExtOp> {
    let (insn, host) = parse(line);
    assert!(
        host.errors().is_empty(),
        "unexpected errors for {:?}: {:?}",
        line,
        host.errors()
    );
    insn.eops
}

#[test]
fn numbers_and_strings() {
    let ops = eops("db 1, 2, 'hi', 0x40");
    assert_eq!(ops.len(), 4);
    assert!(matches!(
        ops[0].kind,
        ExtOpKind::Number { offset: 1, .. }
    ));
    assert!(matches!(ops[2].kind, ExtOpKind::String(ref s) if s == b"hi"));
    assert!(matches!(
        ops[3].kind,
        ExtOpKind::Number { offset: 0x40, .. }
    ));
    assert!(ops.iter().all(|e| e.elem == 1 && e.dup == 1));
}

#[test]
fn element_size_follows_directive() {
    let ops = eops("dq 1");
    assert_eq!(ops[0].elem, 8);
    let ops = eops("dw 1");
    assert_eq!(ops[0].elem, 2);
}

#[test]
fn reserve_markers_coalesce() {
    let ops = eops("db ?, ?, ?");
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0].kind, ExtOpKind::Reserve));
    assert_eq!(ops[0].dup, 3);
}

#[test]
fn reserve_then_data_does_not_coalesce() {
    let ops = eops("db ?, 1, ?");
    assert_eq!(ops.len(), 3);
}

#[test]
fn dup_replication() {
    let ops = eops("db 2 dup (0x55, 0x66)");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].dup, 2);
    match &ops[0].kind {
        ExtOpKind::SubList(children) => {
            assert_eq!(children.len(), 2);
            assert!(matches!(
                children[0].kind,
                ExtOpKind::Number { offset: 0x55, .. }
            ));
        }
        other => panic!("expected sub-list, got {:?}", other),
    }
}

#[test]
fn single_element_dup_flattens() {
    // One child: the node is replaced by it, with multiplied counts.
    let ops = eops("db 3 dup (7)");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].dup, 3);
    assert!(matches!(ops[0].kind, ExtOpKind::Number { offset: 7, .. }));
}

#[test]
fn nested_dup_multiplies() {
    let ops = eops("db 2 dup (3 dup (9), 1)");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].dup, 2);
    match &ops[0].kind {
        ExtOpKind::SubList(children) => {
            // The inner single-element DUP flattened into one node.
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].dup, 3);
            assert!(matches!(
                children[0].kind,
                ExtOpKind::Number { offset: 9, .. }
            ));
        }
        other => panic!("expected sub-list, got {:?}", other),
    }
}

#[test]
fn dup_by_zero_discards() {
    let ops = eops("db 0 dup (1), 5");
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0].kind, ExtOpKind::Number { offset: 5, .. }));
}

#[test]
fn negative_dup_is_an_error() {
    let (insn, host) = parse("db -1 dup (0)");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(host.errors()[0].message.contains("negative"));
}

#[test]
fn non_constant_dup_is_an_error() {
    let (insn, host) = parse("db rax dup (0)");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(host.errors()[0].message.contains("non-constant"));
}

#[test]
fn percent_sublist() {
    let ops = eops("db %(1, 2, 3)");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        ExtOpKind::SubList(children) => assert_eq!(children.len(), 3),
        other => panic!("expected sub-list, got {:?}", other),
    }
}

#[test]
fn percent_single_flattens() {
    let ops = eops("db %(42)");
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0].kind, ExtOpKind::Number { offset: 42, .. }));
}

#[test]
fn size_override_applies_to_children() {
    let ops = eops("db dword (1, 2)");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        ExtOpKind::SubList(children) => {
            assert!(children.iter().all(|c| c.elem == 4));
        }
        other => panic!("expected sub-list, got {:?}", other),
    }
}

#[test]
fn float_conversion() {
    let ops = eops("dd 1.5");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        ExtOpKind::Float(bytes) => {
            assert_eq!(bytes.as_slice(), &1.5f32.to_le_bytes());
        }
        other => panic!("expected float, got {:?}", other),
    }

    let ops = eops("dq 1.5");
    match &ops[0].kind {
        ExtOpKind::Float(bytes) => {
            assert_eq!(bytes.as_slice(), &1.5f64.to_le_bytes());
        }
        other => panic!("expected float, got {:?}", other),
    }
}

#[test]
fn signed_float() {
    let ops = eops("dd -2.5");
    match &ops[0].kind {
        ExtOpKind::Float(bytes) => {
            assert_eq!(bytes.as_slice(), &(-2.5f32).to_le_bytes());
        }
        other => panic!("expected float, got {:?}", other),
    }
}

#[test]
fn minus_number_is_an_expression_not_a_float() {
    let ops = eops("dd -3");
    assert!(matches!(
        ops[0].kind,
        ExtOpKind::Number { offset: -3, .. }
    ));
}

#[test]
fn string_transform_owns_its_bytes() {
    let ops = eops("db __utf16le__('ab')");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        ExtOpKind::OwnedString(bytes) => {
            assert_eq!(bytes, &[b'a', 0, b'b', 0]);
        }
        other => panic!("expected owned string, got {:?}", other),
    }
}

#[test]
fn string_in_expression_is_a_character_constant() {
    let ops = eops("dd 'ab'+1");
    assert!(matches!(
        ops[0].kind,
        ExtOpKind::Number { offset, .. } if offset == 0x6261 + 1
    ));
}

#[test]
fn relocatable_data() {
    let eval = common::TestEval::new().with_symbol("sym", 2, 0x80);
    let (insn, host) = common::parse_with("dd sym+4", eval, common::TestHost::new());
    assert!(host.errors().is_empty());
    assert!(matches!(
        insn.eops[0].kind,
        ExtOpKind::Number {
            offset: 0x84,
            segment: Some(2),
            relative: false,
            ..
        }
    ));
}

#[test]
fn unknown_symbol_defers_resolution() {
    let (insn, host) = parse("dd later");
    assert!(host.errors().is_empty());
    assert!(matches!(
        insn.eops[0].kind,
        ExtOpKind::Number { offset: 0, segment: None, .. }
    ));
}

#[test]
fn register_in_data_is_an_error() {
    let (insn, host) = parse("db rax");
    // Diagnosed but recoverable: the node stays numeric garbage-free.
    assert_eq!(insn.opcode, Opcode::Db);
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0]
        .message
        .contains("not simple or relocatable"));
}

#[test]
fn times_applies_to_whole_declaration() {
    let (insn, host) = parse("times 4 dw 0xABCD");
    assert!(host.errors().is_empty());
    assert_eq!(insn.times, 4);
    assert_eq!(insn.opcode, Opcode::Dw);
    assert_eq!(insn.eops.len(), 1);
}

//! End-to-end line-parsing tests: whole source lines through the fixture
//! scanner, evaluator and host.

mod common;

use common::{parse, parse_with, TestEval, TestHost};
use oxasm::expr::EaHint;
use oxasm::insn::{Opcode, PrefixKind, PrefixSlot};
use oxasm::reg::Register;
use oxasm::{DecoFlags, EaFlags, OpExtra, OpFlags, RoundMode};

/// The recorded broadcast/ER/SAE position matches the decorator flags.
fn check_brerop_invariant(insn: &oxasm::Insn) {
    let deco = DecoFlags::BRDCAST_MASK | DecoFlags::ER | DecoFlags::SAE;
    let any = insn.oprs[..insn.operands]
        .iter()
        .any(|op| op.decoflags.intersects(deco));
    assert_eq!(insn.evex_brerop.is_some(), any);
}

#[test]
fn label_and_memory_operand() {
    let (insn, host) = parse("foo: mov eax, [ebx+4*ecx+0x10]");

    assert_eq!(insn.label.as_deref(), Some("foo"));
    assert_eq!(insn.opcode, Opcode::Table(0));
    assert_eq!(insn.operands, 2);

    let op0 = &insn.oprs[0];
    assert!(OpFlags::is_class(OpFlags::REGISTER, op0.ty));
    assert_eq!(op0.ty & OpFlags::SIZE_MASK, OpFlags::BITS32);
    assert_eq!(op0.basereg, Some(Register::Eax));

    let op1 = &insn.oprs[1];
    assert!(OpFlags::is_class(OpFlags::MEMORY_ANY, op1.ty));
    assert_eq!(op1.basereg, Some(Register::Ebx));
    assert_eq!(op1.indexreg, Some(Register::Ecx));
    assert_eq!(op1.scale, 4);
    assert_eq!(op1.offset, 0x10);

    // The label was defined at the current location.
    assert_eq!(host.labels, vec![("foo".to_string(), 0, 0x1000)]);
    assert!(host.errors().is_empty());
    check_brerop_invariant(&insn);
}

#[test]
fn times_data_declaration_with_bad_float() {
    // elem=1, so the float has no legal format: it errors out and is
    // dropped, while the reserve and string survive under TIMES.
    let (insn, host) = parse("times 3 db ?, 'abc', 1.5");

    assert_eq!(insn.times, 3);
    assert_eq!(insn.opcode, Opcode::Db);
    assert_eq!(insn.operands, 3);
    assert_eq!(insn.eops.len(), 2);
    assert!(matches!(insn.eops[0].kind, oxasm::ExtOpKind::Reserve));
    assert!(
        matches!(insn.eops[1].kind, oxasm::ExtOpKind::String(ref s) if s == b"abc")
    );
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("floating-point"));
}

#[test]
fn avx512_decorators() {
    let (insn, host) = parse("vaddps zmm1{k2}{z}, zmm2, dword [rax] {1to16}");

    assert!(host.errors().is_empty());
    assert_eq!(insn.operands, 3);

    let op0 = &insn.oprs[0];
    assert_eq!(op0.basereg, Some(Register::Zmm1));
    assert_eq!(op0.decoflags.opmask_value(), 2);
    assert!(op0.decoflags.intersects(DecoFlags::Z));

    let op2 = &insn.oprs[2];
    assert!(OpFlags::is_class(OpFlags::MEMORY_ANY, op2.ty));
    assert_eq!(op2.basereg, Some(Register::Rax));
    assert!(op2.decoflags.intersects(DecoFlags::BRDCAST_MASK));
    assert_eq!(op2.decoflags.brnum_value(), 3);

    assert_eq!(insn.evex_brerop, Some(2));
    check_brerop_invariant(&insn);
}

#[test]
fn rip_relative_memory() {
    let eval = TestEval::new().with_symbol("foo", 1, 0x100);
    let (insn, host) = parse_with("lea rax, [rel foo]", eval, TestHost::new());

    assert!(host.errors().is_empty());
    let op1 = &insn.oprs[1];
    assert!(OpFlags::is_class(OpFlags::IP_REL, op1.ty));
    assert!(op1.extra.intersects(OpExtra::RELATIVE));
    assert_eq!(op1.segment, Some(1));
    assert_eq!(op1.offset, 0x100);
    assert!(op1.eaflags.intersects(EaFlags::REL));
}

#[test]
fn default_rel_mode() {
    let mut host = TestHost::new();
    host.globalrel = true;
    let eval = TestEval::new().with_symbol("foo", 1, 0x40);
    let (insn, _) = parse_with("mov rax, [foo]", eval, host);
    assert!(OpFlags::is_class(OpFlags::IP_REL, insn.oprs[1].ty));
}

#[test]
fn conditional_mnemonics_parse_as_immediates() {
    for line in ["jo target", "jno target", "jz target", "jnz target"] {
        let (insn, host) = parse(line);
        assert!(matches!(insn.opcode, Opcode::Table(_)), "{}", line);
        assert_eq!(insn.operands, 1);
        let op = &insn.oprs[0];
        assert!(OpFlags::is_class(OpFlags::IMMEDIATE, op.ty));
        // Unknown forward reference: optimistic compact flags.
        assert!(op.extra.intersects(OpExtra::UNKNOWN));
        assert!(op.ty.contains(
            OpFlags::UNITY
                | OpFlags::SBYTEWORD
                | OpFlags::SBYTEDWORD
                | OpFlags::UDWORD
                | OpFlags::SDWORD
        ));
        assert!(insn.forw_ref);
        assert!(host.errors().is_empty());
    }
}

#[test]
fn strict_suppresses_optimism() {
    let (insn, _) = parse("add eax, strict dword 5");
    let op = &insn.oprs[1];
    assert!(op.ty.intersects(OpFlags::STRICT));
    assert_eq!(op.offset, 5);
    assert!(!op.ty.intersects(OpFlags::SBYTEDWORD));
}

#[test]
fn immediate_compact_flags() {
    let (insn, _) = parse("add eax, 1");
    let op = &insn.oprs[1];
    assert!(op.ty.contains(OpFlags::UNITY | OpFlags::SBYTEDWORD | OpFlags::SDWORD));
}

#[test]
fn prefix_only_line_synthesizes_resb() {
    let (insn, host) = parse("rep");
    assert_eq!(insn.opcode, Opcode::Resb);
    assert_eq!(insn.operands, 1);
    assert_eq!(insn.prefix(PrefixSlot::LockRep), Some(PrefixKind::Rep));
    assert!(OpFlags::is_class(OpFlags::IMMEDIATE, insn.oprs[0].ty));
    assert_eq!(insn.oprs[0].offset, 0);
    assert!(host.errors().is_empty());
}

#[test]
fn redundant_and_conflicting_prefixes() {
    let (_, host) = parse("lock lock mov eax, 1");
    assert_eq!(host.warnings().len(), 1);
    assert!(host.warnings()[0].message.contains("redundant"));

    let (_, host) = parse("rep repne mov eax, 1");
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("conflicting"));
}

#[test]
fn mnemonic_reused_as_label() {
    let (insn, host) = parse("mov: db 1");
    assert_eq!(insn.label.as_deref(), Some("mov"));
    assert_eq!(insn.opcode, Opcode::Db);
    assert_eq!(insn.eops.len(), 1);
    assert!(host.labels.iter().any(|(n, _, _)| n == "mov"));
}

#[test]
fn orphan_label_warns() {
    let (insn, host) = parse("alone");
    assert_eq!(insn.label.as_deref(), Some("alone"));
    assert_eq!(insn.opcode, Opcode::None);
    assert_eq!(host.warnings().len(), 1);
    assert!(host.warnings()[0].message.contains("without a colon"));
}

#[test]
fn equ_label_is_not_defined_here() {
    let (insn, host) = parse("answer equ 42");
    assert_eq!(insn.label.as_deref(), Some("answer"));
    assert_eq!(insn.opcode, Opcode::Equ);
    assert!(host.labels.is_empty());
}

#[test]
fn negative_times_is_zeroed() {
    let (insn, host) = parse("times -2 db 0");
    assert_eq!(insn.times, 0);
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("negative"));
}

#[test]
fn non_constant_times() {
    let (insn, host) = parse("times rax db 0");
    assert_eq!(insn.times, 1);
    assert!(host.errors()[0].message.contains("non-constant"));
}

#[test]
fn mib_compound_reference() {
    let (insn, host) = parse("bndstx [rbx+0x40,rcx*2], bnd0");
    assert!(host.errors().is_empty());
    let op0 = &insn.oprs[0];
    assert_eq!(op0.basereg, Some(Register::Rbx));
    assert_eq!(op0.indexreg, Some(Register::Rcx));
    assert_eq!(op0.scale, 2);
    assert_eq!(op0.offset, 0x40);
    assert_eq!(op0.hint, EaHint::MakeBase);
    assert_eq!(op0.hintbase, Some(Register::Rbx));
}

#[test]
fn mib_second_half_carries_only_index() {
    let op0 = {
        // A plain register in the second half becomes index*1.
        let (insn, host) = parse("bndstx [rbx,rcx], bnd0");
        assert!(host.errors().is_empty());
        insn.oprs[0].clone()
    };
    assert_eq!(op0.indexreg, Some(Register::Rcx));
    assert_eq!(op0.scale, 1);

    // An offset in the second half is malformed.
    let (insn, host) = parse("bndstx [rbx,rcx+1], bnd0");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(host.errors()[0].message.contains("mib"));
}

#[test]
fn segment_override_inside_brackets() {
    let (insn, host) = parse("mov ax, [fs:bx]");
    assert!(host.errors().is_empty());
    assert_eq!(
        insn.prefix(PrefixSlot::Seg),
        Some(PrefixKind::Seg(Register::Fs))
    );
    let op1 = &insn.oprs[1];
    assert!(op1.eaflags.intersects(EaFlags::FSGS));
    assert_eq!(op1.basereg, Some(Register::Bx));
}

#[test]
fn segment_override_outside_brackets() {
    let (insn, host) = parse("mov ax, es:[di]");
    assert!(host.errors().is_empty());
    assert_eq!(
        insn.prefix(PrefixSlot::Seg),
        Some(PrefixKind::Seg(Register::Es))
    );
    let op1 = &insn.oprs[1];
    assert!(!op1.eaflags.intersects(EaFlags::FSGS));
    assert_eq!(op1.basereg, Some(Register::Di));
}

#[test]
fn displacement_before_brackets() {
    let (insn, host) = parse("mov eax, 0x20[ebx]");
    assert!(host.errors().is_empty());
    let op1 = &insn.oprs[1];
    assert!(OpFlags::is_class(OpFlags::MEMORY_ANY, op1.ty));
    assert_eq!(op1.basereg, Some(Register::Ebx));
    assert_eq!(op1.offset, 0x20);
}

#[test]
fn vector_indexed_memory() {
    let (insn, host) = parse("vaddps zmm0, zmm1, [rax+zmm4*4]");
    assert!(host.errors().is_empty());
    let op2 = &insn.oprs[2];
    assert!(OpFlags::is_class(OpFlags::ZMEM, op2.ty));
    assert_eq!(op2.indexreg, Some(Register::Zmm4));
    assert_eq!(op2.scale, 4);
}

#[test]
fn rounding_decorator_attaches_to_previous_operand() {
    let (insn, host) = parse("vaddps zmm1, zmm2, zmm3, {rn-sae}");
    assert!(host.errors().is_empty());
    assert_eq!(insn.operands, 3);
    assert!(insn.oprs[2].decoflags.intersects(DecoFlags::ER));
    assert_eq!(insn.evex_rm, Some(RoundMode::Rn));
    assert_eq!(insn.evex_brerop, Some(2));
    check_brerop_invariant(&insn);
}

#[test]
fn sae_decorator() {
    let (insn, _) = parse("vaddps zmm1, zmm2, zmm3, {sae}");
    assert!(insn.oprs[2].decoflags.intersects(DecoFlags::SAE));
    assert_eq!(insn.evex_rm, Some(RoundMode::Sae));
}

#[test]
fn braced_constant_operand() {
    // A braced constant ends its operand without a comma.
    let (insn, host) = parse("ccmpz {dfv=3} rax, rcx");
    assert!(host.errors().is_empty());
    assert_eq!(insn.operands, 3);
    assert!(OpFlags::is_class(OpFlags::IMMEDIATE, insn.oprs[0].ty));
    assert_eq!(insn.oprs[0].offset, 3);
    assert_eq!(insn.oprs[1].basereg, Some(Register::Rax));
    assert_eq!(insn.oprs[2].basereg, Some(Register::Rcx));
}

#[test]
fn braced_encoding_prefix_before_first_operand() {
    let (insn, host) = parse("vaddps {evex} xmm1, xmm2, xmm3");
    assert!(host.errors().is_empty());
    assert_eq!(insn.prefix(PrefixSlot::VexClass), Some(PrefixKind::Evex));
    assert_eq!(insn.operands, 3);
}

#[test]
fn register_set_suffix() {
    let (insn, host) = parse("mov eax, ecx+3");
    assert!(host.errors().is_empty());
    let op1 = &insn.oprs[1];
    assert_eq!(op1.basereg, Some(Register::Ecx));
    // Register set of 4: encoded as count >> 1 in the regset field.
    assert_eq!(
        (op1.ty & OpFlags::REGSET_MASK).bits() >> OpFlags::REGSET_SHIFT,
        2
    );

    let (_, host) = parse("mov eax, ecx+2");
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("register set"));
}

#[test]
fn register_size_mismatch_warns() {
    let (_, host) = parse("mov word eax, 1");
    assert_eq!(host.warnings().len(), 1);
    assert!(host.warnings()[0].message.contains("register size"));

    // Matching size: no warning.
    let (_, host) = parse("mov dword eax, 1");
    assert!(host.warnings().is_empty());
}

#[test]
fn opmask_register_takes_explicit_size() {
    let (insn, host) = parse("mov word k1, [rax]");
    assert!(host.warnings().is_empty());
    let op0 = &insn.oprs[0];
    assert!(OpFlags::is_class(OpFlags::REG_OPMASK, op0.ty));
    assert_eq!(op0.ty & OpFlags::SIZE_MASK, OpFlags::BITS16);
}

#[test]
fn first_size_specifier_wins() {
    let (insn, _) = parse("mov dword word eax, 1");
    assert_eq!(insn.oprs[0].ty & OpFlags::SIZE_MASK, OpFlags::BITS32);
}

#[test]
fn far_outside_jmp_is_rejected() {
    let (_, host) = parse("add eax, far 5");
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("FAR"));

    let (insn, host) = parse("jmp far target");
    assert!(host.errors().is_empty());
    assert!(insn.oprs[0].ty.intersects(OpFlags::FAR));
}

#[test]
fn missing_bracket_recovers_at_comma() {
    let (insn, host) = parse("add eax, [ebx, ecx");
    // The malformed memory operand diagnoses but parsing continues.
    assert!(!host.errors().is_empty());
    assert_eq!(insn.opcode, Opcode::Table(2));
}

#[test]
fn incbin_arity() {
    let (insn, host) = parse("incbin 'file.bin', 4, 12");
    assert!(host.errors().is_empty());
    assert_eq!(insn.opcode, Opcode::Incbin);
    assert_eq!(insn.eops.len(), 3);

    let (insn, host) = parse("incbin 5");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(host.errors()[0].message.contains("file name"));

    let (insn, _) = parse("incbin 'a', 1, 2, 3");
    assert_eq!(insn.opcode, Opcode::None);
}

#[test]
fn empty_db_warns() {
    let (insn, host) = parse("db");
    assert_eq!(insn.opcode, Opcode::Db);
    assert_eq!(insn.operands, 0);
    assert_eq!(host.warnings().len(), 1);
    assert!(host.warnings()[0].message.contains("no operand"));
}

#[test]
fn blank_line_is_accepted() {
    let (insn, host) = parse("");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(insn.label.is_none());
    assert!(host.diags.is_empty());
}

#[test]
fn junk_line_is_diagnosed() {
    let (insn, host) = parse("123");
    assert_eq!(insn.opcode, Opcode::None);
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0]
        .message
        .contains("label or instruction expected"));
}

#[test]
fn address_size_override_inside_brackets() {
    let (insn, host) = parse("mov eax, [a32 ebx]");
    assert!(host.errors().is_empty());
    assert_eq!(insn.prefix(PrefixSlot::ASize), Some(PrefixKind::A32));

    let (_, host) = parse("mov eax, [a32 a16 ebx]");
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].message.contains("conflicting address size"));
}

#[test]
fn displacement_size_override() {
    let (insn, _) = parse("mov eax, [byte ebx+1]");
    let op1 = &insn.oprs[1];
    assert_eq!(op1.disp_size, 8);
    assert!(op1.eaflags.intersects(EaFlags::BYTEOFFS));

    let (insn, _) = parse("mov eax, [dword ebx+1]");
    assert_eq!(insn.oprs[1].disp_size, 32);
}

#[test]
fn too_many_registers_in_address() {
    let (insn, host) = parse("mov eax, [eax+ebx+ecx]");
    assert_eq!(insn.opcode, Opcode::None);
    assert!(host.errors()[0].message.contains("too many registers"));
}

use super::*;
use crate::env::AddressSize;
use crate::reader::read_database;
use crate::tables::Tables;

#[track_caller]
fn records(db: &str) -> Vec<InstructionRecord> {
    let tables = Tables::default();
    let database = read_database(db, "test.txt", &tables).unwrap();
    crate::prepare(database, &tables).unwrap()
}

fn config(modes: &[Mode], address_sizes: &[AddressSize]) -> RunConfig {
    RunConfig {
        modes: modes.to_vec(),
        address_sizes: address_sizes.to_vec(),
    }
}

#[track_caller]
fn run(db: &str, config: &RunConfig) -> Synthesis {
    synthesize(&records(db), config).unwrap()
}

#[track_caller]
fn run_err(db: &str, config: &RunConfig) -> String {
    synthesize(&records(db), config).unwrap_err().to_string()
}

fn names(s: &Synthesis) -> Vec<&str> {
    s.procedures().map(|p| p.name.as_str()).collect()
}

#[track_caller]
fn find<'a>(s: &'a Synthesis, name: &str) -> &'a EncoderProcedure {
    s.procedures()
        .find(|p| p.name == name)
        .unwrap_or_else(|| panic!("no procedure {name} in {:?}", names(s)))
}

fn m64() -> RunConfig {
    RunConfig::default()
}

const ADD: &str = "
{
ICLASS: ADD
IFORM: ADD_GPRv_GPRv_01
PATTERN: 0x01 MOD[0b11] MOD=3 REG[rrr] RM[nnn]
OPERANDS: REG0=GPRv_B():rw REG1=GPRv_R():r REG2=XED_REG_EFLAGS:w:SUPP
}
";

const PUSH: &str = "
{
ICLASS: PUSH
IFORM: PUSH_GPRv_FFr6
PATTERN: 0xFF MOD[0b11] MOD=3 REG[0b110] RM[nnn] DF64()
OPERANDS: REG0=GPRv_B():r
}
";

const INC_MEM: &str = "
{
ICLASS: INC
IFORM: INC_MEMb
PATTERN: 0xFE MOD[mm] MOD!=3 REG[0b000] RM[nnn] MODRM()
OPERANDS: MEM0:rw:b
}
";

#[test]
fn rexw_forced_for_64_bit_operands() {
    let s = run(ADD, &m64());
    assert_eq!(names(&s), ["add_rvrv_o16", "add_rvrv_o32", "add_rvrv_o64"]);

    let o64 = find(&s, "add_rvrv_o64");
    assert!(o64.has_step(&Step::Set(Field::RexW, Value::Const(1))));
    assert!(o64.has_step(&Step::Emit(Assembled::Rex)));
    assert_eq!(o64.literal_bytes(), [0x01]);

    let o32 = find(&s, "add_rvrv_o32");
    assert!(o32.has_step(&Step::EmitIf(Flag::RexNeeded, Assembled::Rex)));
    assert!(!o32.has_step(&Step::Set(Field::RexW, Value::Const(1))));

    let o16 = find(&s, "add_rvrv_o16");
    assert_eq!(o16.literal_bytes(), [0x66, 0x01]);
    assert!(o16.has_step(&Step::Set(
        Field::Rm,
        Value::Register {
            class: RegClass::Gpr16,
            param: "reg0"
        }
    )));
}

#[test]
fn default_64_skips_32_bit_operands() {
    let s = run(PUSH, &m64());
    assert_eq!(names(&s), ["push_rv_o16", "push_rv_o64"]);
    let o64 = find(&s, "push_rv_o64");
    assert!(!o64.has_step(&Step::Set(Field::RexW, Value::Const(1))));
    assert!(o64.has_step(&Step::Set(Field::Reg, Value::Const(6))));

    let s = run(PUSH, &config(&[Mode::M32], &[AddressSize::A32]));
    assert_eq!(names(&s), ["push_rv_o16", "push_rv_o32"]);
    assert_eq!(find(&s, "push_rv_o32").literal_bytes(), [0xFF]);
}

#[test]
fn memory_forms_cover_index_and_displacement() {
    let s = run(INC_MEM, &config(&[Mode::M32], &[AddressSize::A32]));
    assert_eq!(
        names(&s),
        [
            "inc_mem_b_b_a32",
            "inc_mem_b_bd8_a32",
            "inc_mem_b_bd32_a32",
            "inc_mem_b_bis_a32",
            "inc_mem_b_bisd8_a32",
            "inc_mem_b_bisd32_a32",
        ]
    );
    assert_eq!(s.stats.generated, 6);

    let b = find(&s, "inc_mem_b_b_a32");
    assert_eq!(b.literal_bytes(), [0xFE]);
    assert!(b.has_step(&Step::EmitIf(Flag::HasSib, Assembled::Sib)));
    let Some(Step::Branch { flag, then, otherwise }) = b.steps.last() else {
        panic!("expected a displacement branch: {:?}", b.steps);
    };
    assert_eq!(*flag, Flag::HasDisp8);
    assert_eq!(then.len(), 1);
    assert!(matches!(otherwise.as_slice(), [Step::Branch { flag: Flag::HasDisp32, .. }]));

    let bisd8 = find(&s, "inc_mem_b_bisd8_a32");
    let params: Vec<_> = bisd8.params.iter().map(|p| p.name).collect();
    assert_eq!(params, ["base", "index", "scale", "disp8"]);
    assert!(bisd8.has_step(&Step::Set(Field::Mod, Value::Const(1))));
    assert!(bisd8.has_step(&Step::Set(Field::Reg, Value::Const(0))));
}

#[test]
fn memory_forms_at_16_bit_address_size() {
    let s = run(INC_MEM, &config(&[Mode::M32], &[AddressSize::A16]));
    let all = names(&s);
    assert_eq!(all.len(), 6);
    assert!(all.contains(&"inc_mem_b_bid16_a16"));
    let bi = find(&s, "inc_mem_b_bi_a16");
    assert_eq!(bi.literal_bytes(), [0x67, 0xFE]);
    assert!(bi.params.iter().all(|p| p.name != "scale"));
}

#[test]
fn address_size_override_in_64_bit_mode() {
    let s = run(INC_MEM, &config(&[Mode::M64], &[AddressSize::A32, AddressSize::A64]));
    assert_eq!(s.stats.generated, 12);
    for p in s.procedures() {
        let bytes = p.literal_bytes();
        match p.env.asz {
            AddressSize::A32 => assert_eq!(bytes, [0x67, 0xFE], "{}", p.name),
            _ => assert_eq!(bytes, [0xFE], "{}", p.name),
        }
    }
}

#[test]
fn environments_are_pruned() {
    let db = format!(
        "{ADD}{PUSH}{INC_MEM}
{{
ICLASS: PUSH
IFORM: PUSH_ES
PATTERN: 0x06 MODE!=2
OPERANDS: REG0=XED_REG_ES:r:IMPL
}}
"
    );
    let s = run(&db, &RunConfig::from_flags(&[], &[], true));
    for p in s.procedures() {
        assert!(Environment::new(p.env.mode, p.env.asz).is_some(), "{}", p.name);
    }
    let push_es = s.outcome(RecordId(3)).unwrap();
    assert!(push_es.skipped);
    assert!(push_es.procedures.iter().all(|p| p.env.mode != Mode::M64));
    assert_eq!(push_es.procedures[0].name, "push_es");
    assert_eq!(push_es.procedures[0].literal_bytes(), [0x06]);
}

#[test]
fn stats_add_up() {
    let db = format!(
        "{ADD}{PUSH}
{{
ICLASS: PUSH
IFORM: PUSH_GPRv_50
PATTERN: 0b0101_0 SRM[rrr] DF64()
OPERANDS: REG0=GPRv_SB():r
}}
{{
ICLASS: VADDPS
PATTERN: VEXVALID=2 0x58 MODRM() VL=2 MAP=1
OPERANDS: REG0=ZMM_R3():w MEM0:r:zf32
}}
"
    );
    let s = run(&db, &m64());
    let stats = s.stats;
    assert_eq!(stats.forms, 4);
    assert_eq!(stats.handled + stats.unhandled, stats.forms);
    assert_eq!(stats.handled, 2);
    assert_eq!(
        stats.generated,
        s.outcomes.values().map(|o| o.procedures.len()).sum::<usize>()
    );

    let partial = s.outcome(RecordId(2)).unwrap();
    assert!(!partial.handled());
    assert_eq!(partial.diagnostics.warnings().count(), 1);
}

#[test]
fn fatal_synthesis_errors() {
    let x87 = "{\nICLASS: FADD\nPATTERN: 0xD8 MOD[0b11] MOD=3 RM[nnn]\nOPERANDS: REG0=XED_REG_ST0:rw:IMPL REG1=X87():r\n}\n";
    assert!(run_err(x87, &m64()).contains("Need a value for MODRM.REG"));

    let evex_u0 = "{\nICLASS: VLOADUNPACKLD\nPATTERN: VEXVALID=4 0xD0 MODRM()\nOPERANDS:\n}\n";
    assert!(run_err(evex_u0, &m64()).contains("Unhandled encoding space: evex.u0"));

    let no_pp = "{\nICLASS: VADDPS\nPATTERN: VEXVALID=1 0x58 MOD[0b11] MOD=3 REG[rrr] RM[nnn] VL=0 MAP=1\nOPERANDS: REG0=XMM_R():w REG1=XMM_N():r REG2=XMM_B():r\n}\n";
    assert!(run_err(no_pp, &m64()).contains("VEX.PP"));

    let partial = "{\nICLASS: XCHG\nPATTERN: 0b1001_0 SRM[rrr]\nOPERANDS: REG0=GPRv_SB():rw REG1=GPRv_R():rw\n}\n";
    assert!(run_err(partial, &m64()).contains("partial opcodes"));

    let relbr = "{\nICLASS: JMP\nPATTERN: 0xE9\nOPERANDS: RELBR:r:w\n}\n";
    assert!(run_err(relbr, &m64()).contains("Unhandled relbr width: w"));

    let vvvv = "{\nICLASS: VMOVAPS\nPATTERN: VEXVALID=1 0x28 MOD[0b11] MOD=3 VEX_PREFIX=0 MAP=1\nOPERANDS: REG0=XMM_R():w REG1=XMM_N():r\n}\n";
    assert!(run_err(vvvv, &m64()).contains("Unexpected VVVV operand"));
}

#[test]
fn vex_prefix_selection() {
    let db = "
{
ICLASS: VADDPS
PATTERN: VEXVALID=1 0x58 MOD[0b11] MOD=3 REG[rrr] RM[nnn] VL=1 VEX_PREFIX=0 MAP=1
OPERANDS: REG0=YMM_R():w:qq REG1=YMM_N():r:qq REG2=YMM_B():r:qq
}
{
ICLASS: VPERMQ
PATTERN: VEXVALID=1 0x00 MOD[0b11] MOD=3 REG[rrr] RM[nnn] VL=1 VEX_PREFIX=1 MAP=3 REXW=1
OPERANDS: REG0=YMM_R():w:qq REG1=YMM_B():r:qq
}
";
    let s = run(db, &m64());
    let vaddps = find(&s, "vaddps_3ymm");
    assert!(vaddps.has_step(&Step::Branch {
        flag: Flag::RexB,
        then: vec![Step::Emit(Assembled::Vex3)],
        otherwise: vec![Step::Emit(Assembled::Vex2)],
    }));
    assert!(vaddps.has_step(&Step::Set(Field::VexL, Value::Const(1))));
    assert!(vaddps.has_step(&Step::Set(
        Field::Vvvv,
        Value::Register {
            class: RegClass::Ymm,
            param: "reg1"
        }
    )));
    assert_eq!(vaddps.literal_bytes(), [0x58]);

    let vpermq = find(&s, "vpermq_2ymm");
    assert!(vpermq.has_step(&Step::Emit(Assembled::Vex3)));
    assert!(vpermq.has_step(&Step::Set(Field::RexW, Value::Const(1))));
    assert!(vpermq.has_step(&Step::Set(Field::Vvvv, Value::Const(0xF))));
    assert!(vpermq.has_step(&Step::Set(Field::Map, Value::Const(3))));
}

#[test]
fn zero_operand_sizes() {
    let db = "
{
ICLASS: CWDE
PATTERN: 0x98 EOSZ=2
OPERANDS:
}
{
ICLASS: CDQE
PATTERN: 0x98 EOSZ=3
OPERANDS:
}
{
ICLASS: REP_LODSW
PATTERN: 0xAD REP=3 EASZ=2 EOSZ=1
OPERANDS:
}
";
    let s = run(db, &RunConfig::from_flags(&[], &[], true));
    let cwde: Vec<_> = s.outcome(RecordId(0)).unwrap().procedures.iter().collect();
    assert_eq!(cwde.len(), 6);
    for p in cwde {
        assert_eq!(p.name, "cwde_o32");
        match p.env.mode {
            Mode::M16 => assert_eq!(p.literal_bytes(), [0x66, 0x98]),
            _ => assert_eq!(p.literal_bytes(), [0x98]),
        }
    }

    let cdqe = s.outcome(RecordId(1)).unwrap();
    assert!(cdqe.skipped);
    assert!(cdqe.procedures.iter().all(|p| p.env.mode == Mode::M64));
    let p = &cdqe.procedures[0];
    assert_eq!(p.name, "cdqe_o64");
    assert!(p.has_step(&Step::Emit(Assembled::Rex)));

    let lods = s.outcome(RecordId(2)).unwrap();
    let m64 = lods.procedures.iter().find(|p| p.env.mode == Mode::M64).unwrap();
    assert_eq!(m64.name, "rep_lodsw_a32_o16");
    assert_eq!(m64.literal_bytes(), [0x67, 0xF3, 0x66, 0xAD]);
    let m16 = lods.procedures.iter().find(|p| p.env.mode == Mode::M16).unwrap();
    assert_eq!(m16.literal_bytes(), [0x67, 0xF3, 0xAD]);
}

#[test]
fn branches_and_immediates() {
    let db = "
{
ICLASS: JMP
PATTERN: 0xE9 BRDISPz()
OPERANDS: RELBR:r:z
}
{
ICLASS: INT
PATTERN: 0xCD UIMM8()
OPERANDS: IMM0:r:b
}
{
ICLASS: ADD
PATTERN: 0x83 MOD[0b11] MOD=3 REG[0b000] RM[nnn] SIMM8()
OPERANDS: REG0=GPRv_B():rw IMM0:r:b:i8
}
";
    let s = run(db, &m64());
    assert_eq!(find(&s, "jmp_o16").literal_bytes(), [0x66, 0xE9]);
    let o32 = find(&s, "jmp_o32");
    assert_eq!(o32.literal_bytes(), [0xE9]);
    assert_eq!(
        o32.steps.last(),
        Some(&Step::Int {
            bits: 32,
            value: Value::Param("disp32"),
            signed: true
        })
    );

    let int = find(&s, "int");
    assert_eq!(int.literal_bytes(), [0xCD]);
    assert_eq!(int.params[0].kind, ParamKind::Immediate(8));

    let add = find(&s, "add_ri_o64");
    assert!(add.has_step(&Step::Set(Field::Reg, Value::Const(0))));
    assert!(add.has_step(&Step::Emit(Assembled::Rex)));
}

#[test]
fn parallel_matches_sequential() {
    let db = format!("{ADD}{PUSH}{INC_MEM}");
    let records = records(&db);
    let config = RunConfig::from_flags(&[], &[], true);
    let s = synthesize(&records, &config).unwrap();
    let envs = config.environments();
    for (i, record) in records.iter().enumerate() {
        let sequential = synthesize_record(RecordId(i), record, &envs).unwrap();
        assert_eq!(s.outcome(RecordId(i)).unwrap().procedures, sequential.procedures);
        assert_eq!(s.outcome(RecordId(i)).unwrap().diagnostics, sequential.diagnostics);
    }
}

#[test]
fn operand_size_lists() {
    assert_eq!(operand_sizes(Mode::M64, &[16, 32, 64], false), [16, 32, 64]);
    assert_eq!(operand_sizes(Mode::M64, &[16, 32, 64], true), [16, 64]);
    assert_eq!(operand_sizes(Mode::M32, &[16, 32, 64], true), [16, 32]);
    assert_eq!(operand_sizes(Mode::M16, &[32, 64], false), [32]);
}

fn reg(class: RegClass, param: &'static str) -> Value {
    Value::Register { class, param }
}

#[test]
fn gpr8_register_forms() {
    let db = "
{
ICLASS: ADD
PATTERN: 0x00 MOD[0b11] MOD=3 REG[rrr] RM[nnn]
OPERANDS: REG0=GPR8_B():rw REG1=GPR8_R():r
}
{
ICLASS: SETB
PATTERN: 0x0F 0x92 MOD[0b11] MOD=3 REG[0b000] RM[nnn]
OPERANDS: REG0=GPR8_B():w REG1=XED_REG_EFLAGS:r:SUPP
}
{
ICLASS: ADD
PATTERN: 0x80 MOD[0b11] MOD=3 REG[0b000] RM[nnn] UIMM8()
OPERANDS: REG0=GPR8_B():rw IMM0:r:b
}
";
    let s = run(db, &m64());
    assert_eq!(names(&s), ["add_r8r8", "setb_o8", "add_ri_o8"]);
    assert_eq!(
        find(&s, "add_r8r8").steps,
        [
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Rm, reg(RegClass::Gpr8, "reg0")),
            Step::Set(Field::Reg, reg(RegClass::Gpr8, "reg1")),
            Step::EmitIf(Flag::RexNeeded, Assembled::Rex),
            Step::Byte(0x00),
            Step::Emit(Assembled::ModRm),
        ]
    );
    assert_eq!(
        find(&s, "setb_o8").steps,
        [
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Rm, reg(RegClass::Gpr8, "reg0")),
            Step::Set(Field::Reg, Value::Const(0)),
            Step::EmitIf(Flag::RexNeeded, Assembled::Rex),
            Step::Byte(0x0F),
            Step::Byte(0x92),
            Step::Emit(Assembled::ModRm),
        ]
    );
    let imm = find(&s, "add_ri_o8");
    assert_eq!(imm.params[1].kind, ParamKind::Immediate(8));
    assert_eq!(
        imm.steps,
        [
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Rm, reg(RegClass::Gpr8, "reg0")),
            Step::Set(Field::Reg, Value::Const(0)),
            Step::EmitIf(Flag::RexNeeded, Assembled::Rex),
            Step::Byte(0x80),
            Step::Emit(Assembled::ModRm),
            Step::Int {
                bits: 8,
                value: Value::Param("imm8"),
                signed: false
            },
        ]
    );
}

#[test]
fn scalable_register_with_immz() {
    let db = "
{
ICLASS: ADD
PATTERN: 0x81 MOD[0b11] MOD=3 REG[0b000] RM[nnn] SIMMz()
OPERANDS: REG0=GPRv_B():rw IMM0:r:z
}
";
    let s = run(db, &m64());
    assert_eq!(names(&s), ["add_ri_o16", "add_ri_o32", "add_ri_o64"]);

    let o16 = find(&s, "add_ri_o16");
    assert_eq!(o16.literal_bytes(), [0x66, 0x81]);
    assert_eq!(o16.params[1], Param { name: "imm16", kind: ParamKind::Immediate(16) });
    assert_eq!(
        o16.steps.last(),
        Some(&Step::Int {
            bits: 16,
            value: Value::Param("imm16"),
            signed: false
        })
    );

    let o32 = find(&s, "add_ri_o32");
    assert_eq!(o32.literal_bytes(), [0x81]);
    assert!(o32.has_step(&Step::EmitIf(Flag::RexNeeded, Assembled::Rex)));
    assert_eq!(
        o32.steps.last(),
        Some(&Step::Int {
            bits: 32,
            value: Value::Param("imm32"),
            signed: false
        })
    );

    let o64 = find(&s, "add_ri_o64");
    assert_eq!(o64.params[1], Param { name: "imm32", kind: ParamKind::Immediate(32) });
    assert!(o64.has_step(&Step::Set(Field::RexW, Value::Const(1))));
    assert!(o64.has_step(&Step::Emit(Assembled::Rex)));
    assert!(o64.has_step(&Step::Set(Field::Reg, Value::Const(0))));
    assert_eq!(
        o64.steps.last(),
        Some(&Step::Int {
            bits: 32,
            value: Value::Param("imm32"),
            signed: true
        })
    );
}

#[test]
fn xmm_register_forms() {
    let db = "
{
ICLASS: PSHUFD
PATTERN: 0x0F 0x70 MOD[0b11] MOD=3 REG[rrr] RM[nnn] OSZ=1 UIMM8()
OPERANDS: REG0=XMM_R():w:dq REG1=XMM_B():r:dq IMM0:r:b
}
{
ICLASS: PADDB
PATTERN: 0x0F 0xFC MOD[0b11] MOD=3 REG[rrr] RM[nnn] OSZ=1
OPERANDS: REG0=XMM_R():rw:dq REG1=XMM_B():r:dq
}
{
ICLASS: PSRLW
PATTERN: 0x0F 0x71 MOD[0b11] MOD=3 REG[0b010] RM[nnn] OSZ=1 UIMM8()
OPERANDS: REG0=XMM_B():rw:dq IMM0:r:b
}
";
    let s = run(db, &m64());
    assert_eq!(names(&s), ["pshufd_xmmi", "paddb_xmm", "psrlw_xmmi"]);
    assert_eq!(
        find(&s, "pshufd_xmmi").steps,
        [
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Reg, reg(RegClass::Xmm, "reg0")),
            Step::Set(Field::Rm, reg(RegClass::Xmm, "reg1")),
            Step::Byte(0x66),
            Step::EmitIf(Flag::RexNeeded, Assembled::Rex),
            Step::Byte(0x0F),
            Step::Byte(0x70),
            Step::Emit(Assembled::ModRm),
            Step::Int {
                bits: 8,
                value: Value::Param("imm8"),
                signed: false
            },
        ]
    );
    let paddb = find(&s, "paddb_xmm");
    assert_eq!(paddb.params.len(), 2);
    assert_eq!(paddb.steps.last(), Some(&Step::Emit(Assembled::ModRm)));
    assert_eq!(
        find(&s, "psrlw_xmmi").steps,
        [
            Step::Set(Field::Rm, reg(RegClass::Xmm, "reg0")),
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Reg, Value::Const(2)),
            Step::Byte(0x66),
            Step::EmitIf(Flag::RexNeeded, Assembled::Rex),
            Step::Byte(0x0F),
            Step::Byte(0x71),
            Step::Emit(Assembled::ModRm),
            Step::Int {
                bits: 8,
                value: Value::Param("imm8"),
                signed: false
            },
        ]
    );

    // REX exists only in 64-bit mode.
    let s = run(db, &config(&[Mode::M32], &[AddressSize::A32]));
    let pshufd = find(&s, "pshufd_xmmi");
    assert_eq!(pshufd.literal_bytes(), [0x66, 0x0F, 0x70]);
    assert!(!pshufd.has_step(&Step::EmitIf(Flag::RexNeeded, Assembled::Rex)));
}

#[test]
fn mmx_forms_never_take_rex() {
    let db = "
{
ICLASS: MOVQ
PATTERN: 0x0F 0x6F MOD[0b11] MOD=3 REG[rrr] RM[nnn]
OPERANDS: REG0=MMX_R():w:q REG1=MMX_B():r:q
}
{
ICLASS: PSRLW
PATTERN: 0x0F 0x71 MOD[0b11] MOD=3 REG[0b010] RM[nnn] UIMM8()
OPERANDS: REG0=MMX_B():rw:q IMM0:r:b
}
";
    let s = run(db, &m64());
    assert_eq!(
        find(&s, "movq_mmx").steps,
        [
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Reg, reg(RegClass::Mmx, "reg0")),
            Step::Set(Field::Rm, reg(RegClass::Mmx, "reg1")),
            Step::Byte(0x0F),
            Step::Byte(0x6F),
            Step::Emit(Assembled::ModRm),
        ]
    );
    assert_eq!(
        find(&s, "psrlw_mmxi").steps,
        [
            Step::Set(Field::Rm, reg(RegClass::Mmx, "reg0")),
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Reg, Value::Const(2)),
            Step::Byte(0x0F),
            Step::Byte(0x71),
            Step::Emit(Assembled::ModRm),
            Step::Int {
                bits: 8,
                value: Value::Param("imm8"),
                signed: false
            },
        ]
    );
}

#[test]
fn x87_stack_registers() {
    let db = "
{
ICLASS: FFREE
PATTERN: 0xDD MOD[0b11] MOD=3 REG[0b000] RM[nnn]
OPERANDS: REG0=X87():r
}
{
ICLASS: FADD
PATTERN: 0xD8 MOD[0b11] MOD=3 REG[0b000] RM[nnn]
OPERANDS: REG0=XED_REG_ST0:rw:IMPL REG1=X87():r
}
";
    let s = run(db, &m64());
    assert_eq!(names(&s), ["ffree_x87", "fadd_x87_st0"]);
    let expected = |opcode| {
        vec![
            Step::Set(Field::Mod, Value::Const(3)),
            Step::Set(Field::Reg, Value::Const(0)),
            Step::Set(Field::Rm, reg(RegClass::X87, "reg0")),
            Step::Byte(opcode),
            Step::Emit(Assembled::ModRm),
        ]
    };
    assert_eq!(find(&s, "ffree_x87").steps, expected(0xDD));
    let fadd = find(&s, "fadd_x87_st0");
    assert_eq!(fadd.steps, expected(0xD8));
    assert_eq!(fadd.params, [Param { name: "reg0", kind: ParamKind::Register(RegClass::X87) }]);
}

#[test]
fn modrm_without_fixed_fields() {
    let db = "
{
ICLASS: UD0
PATTERN: 0x0F 0xFF MODRM()
OPERANDS:
}
{
ICLASS: CPUID
PATTERN: 0x0F 0xA2
OPERANDS:
}
";
    let s = run(db, &m64());
    assert_eq!(
        find(&s, "ud0").steps,
        [
            Step::Set(Field::Mod, Value::Const(0)),
            Step::Set(Field::Reg, Value::Const(0)),
            Step::Set(Field::Rm, Value::Const(0)),
            Step::Byte(0x0F),
            Step::Byte(0xFF),
            Step::Emit(Assembled::ModRm),
        ]
    );
    assert_eq!(find(&s, "cpuid").steps, [Step::Byte(0x0F), Step::Byte(0xA2)]);
}

#[test]
fn partial_opcode_with_immediate_is_skipped() {
    let db = "
{
ICLASS: MOV
PATTERN: 0b1011_0 SRM[rrr] UIMM8()
OPERANDS: REG0=GPR8_SB():w IMM0:r:b
}
";
    let s = run(db, &m64());
    let outcome = s.outcome(RecordId(0)).unwrap();
    assert!(!outcome.handled());
    assert!(outcome.skipped);
    assert_eq!(outcome.diagnostics.warnings().count(), 1);
    assert_eq!(s.stats.skipped, 1);
    assert_eq!(s.stats.unhandled, 1);
}

#[test]
fn mandatory_prefixes_precede_operand_size_override() {
    let db = "
{
ICLASS: POPCNT
PATTERN: 0x0F 0xB8 MOD[0b11] MOD=3 REG[rrr] RM[nnn] REP=3
OPERANDS: REG0=GPRv_R():w REG1=GPRv_B():r
}
";
    let s = run(db, &m64());
    assert_eq!(find(&s, "popcnt_rvrv_o16").literal_bytes(), [0xF3, 0x66, 0x0F, 0xB8]);
    assert_eq!(find(&s, "popcnt_rvrv_o32").literal_bytes(), [0xF3, 0x0F, 0xB8]);
    let o64 = find(&s, "popcnt_rvrv_o64");
    assert_eq!(
        o64.steps[4..],
        [
            Step::Byte(0xF3),
            Step::Emit(Assembled::Rex),
            Step::Byte(0x0F),
            Step::Byte(0xB8),
            Step::Emit(Assembled::ModRm),
        ]
    );
}

#[test]
fn prefix_free_forms_drop_overridden_sizes() {
    let db = "
{
ICLASS: BSF
PATTERN: 0x0F 0xBC MOD[0b11] MOD=3 REG[rrr] RM[nnn] REP=0 OSZ=0
OPERANDS: REG0=GPRv_R():w REG1=GPRv_B():r
}
";
    let s = run(db, &m64());
    assert_eq!(names(&s), ["bsf_rvrv_o32", "bsf_rvrv_o64"]);
    let s = run(db, &config(&[Mode::M16], &[AddressSize::A16]));
    assert_eq!(names(&s), ["bsf_rvrv_o16"]);
    assert_eq!(find(&s, "bsf_rvrv_o16").literal_bytes(), [0x0F, 0xBC]);
}

#[test]
fn vex_length_follows_the_pattern() {
    let db = "
{
ICLASS: VADDPS
PATTERN: VEXVALID=1 0x58 MOD[0b11] MOD=3 REG[rrr] RM[nnn] VL=0 VEX_PREFIX=0 MAP=1
OPERANDS: REG0=XMM_R():w:dq REG1=XMM_N():r:dq REG2=XMM_B():r:dq
}
{
ICLASS: VADDPS
PATTERN: VEXVALID=1 0x58 MOD[0b11] MOD=3 REG[rrr] RM[nnn] VL=0 VEX_PREFIX=0 MAP=1
OPERANDS: REG0=YMM_R():w:qq REG1=YMM_N():r:qq REG2=YMM_B():r:qq
}
";
    let s = run(db, &m64());
    let xmm = find(&s, "vaddps_3xmm");
    assert!(!xmm.steps.iter().any(|step| matches!(step, Step::Set(Field::VexL, _))));

    let ymm = s.outcome(RecordId(1)).unwrap();
    assert!(!ymm.handled());
    assert_eq!(ymm.diagnostics.warnings().count(), 1);
}

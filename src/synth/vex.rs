//! VEX register-only forms with two or three XMM or YMM registers.

use super::{Assembled, Field, Flag, Job, ParamKind, RegClass, Step, Value, register};
use crate::error::Result;
use crate::record::{RexW, VectorLength};
use crate::shape::VecClass;

const REGS: [&str; 3] = ["reg0", "reg1", "reg2"];

pub(super) fn simd_regs(job: &mut Job<'_>, count: u8, class: VecClass) -> Result<()> {
    let record = job.record;
    let Some(pp) = record.vex_pp else {
        return Err(job.fatal("Could not find the VEX.PP pattern"));
    };
    let regs = match class {
        VecClass::Xmm => RegClass::Xmm,
        VecClass::Ymm => RegClass::Ymm,
    };

    let (mut r, mut b, mut n) = (None, None, None);
    for (i, op) in record.encodable_operands().enumerate() {
        let (Some(lookup), Some(&param)) = (op.lookup_fn.as_deref(), REGS.get(i)) else {
            continue;
        };
        if lookup.ends_with("_R") {
            r = Some(param);
        } else if lookup.ends_with("_B") {
            b = Some(param);
        } else if lookup.ends_with("_N") {
            if count == 2 {
                return Err(job.fatal(format!(
                    "Unexpected VVVV operand in 2 operand instr: {lookup}"
                )));
            }
            n = Some(param);
        } else {
            return Err(job.fatal(format!("unexpected VEX operand lookup {lookup}")));
        }
    }
    let (Some(r), Some(b)) = (r, b) else {
        return Err(job.fatal("VEX form needs both a ModRM.reg and a ModRM.rm operand"));
    };

    let mut p = job.procedure(&format!("_{count}{}", class.name()));
    for &name in &REGS[..usize::from(count)] {
        p.param(name, ParamKind::Register(regs));
    }
    p.set_const(Field::VexPp, pp);
    p.set_const(Field::Map, record.map);
    match (record.vl, class) {
        (VectorLength::L256, _) => p.set_const(Field::VexL, 1),
        (VectorLength::L128 | VectorLength::Ignored, VecClass::Xmm) => {}
        (vl, _) => {
            job.warn(format!("{} registers with vector length {vl}", class.name()));
            return Ok(());
        }
    }
    if record.rexw == RexW::One {
        p.set_const(Field::RexW, 1);
    }
    match n {
        Some(n) => p.set(Field::Vvvv, register(regs, n)),
        None => p.set(Field::Vvvv, Value::Const(0xF)),
    }
    p.set_const(Field::Mod, 3);
    p.set(Field::Reg, register(regs, r));
    p.set(Field::Rm, register(regs, b));

    // Register-only: only REX.B can rule out the two-byte form.
    if record.map == 1 && record.rexw != RexW::One {
        p.branch(
            Flag::RexB,
            vec![Step::Emit(Assembled::Vex3)],
            vec![Step::Emit(Assembled::Vex2)],
        );
    } else {
        p.emit(Assembled::Vex3);
    }
    p.byte(record.opcode);
    p.emit(Assembled::ModRm);
    job.push(p);
    Ok(())
}

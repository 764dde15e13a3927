//! Fixed-width memory operands.
//!
//! Each address size gets one procedure per combination of index use and
//! displacement size. The zero-displacement forms cannot always be encoded
//! without a displacement (`[rbp]`, `[r13]`, 16-bit `[bp]`), so they decide
//! at run time whether to emit a zero one.

use super::{
    Address, Assembled, Field, Flag, Job, ParamKind, Step, Value, map_escapes, required_prefixes,
    rex,
};
use crate::env::AddressSize;
use crate::error::Result;
use crate::record::{AddressSizeClass, RexW};

/// Signature of an addressing form: base, optional index (and scale), and
/// displacement size.
fn signature(asz: AddressSize, use_index: bool, disp: u8) -> &'static str {
    match (asz, use_index, disp) {
        (_, false, 0) => "b",
        (_, false, 8) => "bd8",
        (_, false, 16) => "bd16",
        (_, false, _) => "bd32",
        (AddressSize::A16, true, 0) => "bi",
        (AddressSize::A16, true, 8) => "bid8",
        (AddressSize::A16, true, _) => "bid16",
        (_, true, 0) => "bis",
        (_, true, 8) => "bisd8",
        (_, true, _) => "bisd32",
    }
}

fn disp_param(bits: u8) -> &'static str {
    match bits {
        8 => "disp8",
        16 => "disp16",
        _ => "disp32",
    }
}

fn allows(class: AddressSizeClass, asz: AddressSize) -> bool {
    match class {
        AddressSizeClass::All => true,
        AddressSizeClass::A16 => asz == AddressSize::A16,
        AddressSizeClass::A32 => asz == AddressSize::A32,
        AddressSizeClass::A64 => asz == AddressSize::A64,
        AddressSizeClass::Not16 => asz != AddressSize::A16,
    }
}

pub(super) fn one_mem_fixed(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let env = job.env;
    if !allows(record.easz, env.asz) {
        job.skip();
        return Ok(());
    }
    let Some(width) = record.first_encodable().and_then(|op| op.width.clone()) else {
        return Err(job.fatal("memory operand without a width"));
    };
    let native: u8 = match env.asz {
        AddressSize::A16 => 16,
        AddressSize::A32 | AddressSize::A64 => 32,
    };
    let scaled = env.asz != AddressSize::A16;
    let forced = record.rexw == RexW::One;

    for use_index in [false, true] {
        for disp in [0, 8, native] {
            let sig = signature(env.asz, use_index, disp);
            let mut p = job.procedure(&format!("_mem_{width}_{sig}_a{}", env.asz.bits()));
            p.param("base", ParamKind::Base(env.asz));
            if use_index {
                p.param("index", ParamKind::Index(env.asz));
                if scaled {
                    p.param("scale", ParamKind::Scale);
                }
            }
            if disp != 0 {
                p.param(disp_param(disp), ParamKind::Displacement(disp));
            }

            if forced {
                p.set_const(Field::RexW, 1);
            }
            match disp {
                0 => {}
                8 => p.set_const(Field::Mod, 1),
                _ => p.set_const(Field::Mod, 2),
            }
            if let Some(digit) = record.modrm_reg.value() {
                p.set_const(Field::Reg, digit);
            }
            p.set(
                Field::Rm,
                Value::Address(Address {
                    asz: env.asz,
                    base: "base",
                    index: use_index.then_some("index"),
                    scale: (use_index && scaled).then_some("scale"),
                    disp: (disp != 0).then(|| (disp, disp_param(disp))),
                }),
            );

            if env.overrides_address_size() {
                p.byte(0x67);
            }
            required_prefixes(&mut p, record);
            rex(&mut p, forced);
            map_escapes(&mut p, record);
            p.byte(record.opcode);
            p.emit(Assembled::ModRm);
            p.emit_if(Flag::HasSib, Assembled::Sib);
            if disp == 0 {
                p.branch(
                    Flag::HasDisp8,
                    vec![zero(8)],
                    vec![Step::Branch {
                        flag: Flag::HasDisp32,
                        then: vec![zero(32)],
                        otherwise: Vec::new(),
                    }],
                );
            } else {
                p.int(disp, Value::Param(disp_param(disp)), true);
            }
            job.push(p);
        }
    }
    Ok(())
}

fn zero(bits: u8) -> Step {
    Step::Int {
        bits,
        value: Value::Const(0),
        signed: true,
    }
}

use std::fmt;

use bytes::Bytes;
use runtime::{error::VmError, heap::ArrayKind, stack::Frame};
use support::bytes_ext::SafeBuf;

use crate::Interpreter;

mod binary;
mod invoke;
mod load_store;
mod mnemonic;
mod ops;
mod unary;

pub use load_store::{constant_cells, constant_fits};
pub use mnemonic::mnemonic;

use ops::{Constant, ElementKind, ValueKind};

pub enum Progression {
    JumpAbs(usize),
    /// Relative to the pc of the instruction that jumps.
    JumpRel(i32),
    Next,
    Return(Vec<runtime::stack::Cell>),
}

pub trait Instruction: fmt::Debug {
    fn handle(&self, _vm: &mut Interpreter, _frame: &mut Frame) -> Result<Progression, VmError> {
        Ok(Progression::Next)
    }
}

/// Shorthand for the decode table.
fn b<T>(v: T) -> Box<T> {
    Box::new(v)
}

fn unsupported(opcode: u8) -> Box<ops::Unsupported> {
    b(ops::Unsupported {
        opcode,
        name: mnemonic(opcode),
    })
}

/// Decode the instruction at the front of `bytes`, which starts at `pc` in the method's code.
/// The number of bytes consumed is the instruction's length.
pub fn decode_instruction(bytes: &mut Bytes, pc: usize) -> Result<Box<dyn Instruction>, VmError> {
    let instruction = bytes.safe_get_u8()?;

    Ok(match instruction {
        0x00 => b(ops::Nop),

        // Constants
        0x01 => b(ops::PushConst {
            value: Constant::Null,
        }),
        0x02..=0x08 => b(ops::PushConst {
            value: Constant::Int(instruction as i32 - 0x03),
        }),
        0x09 | 0x0a => b(ops::PushConst {
            value: Constant::Long(instruction as i64 - 0x09),
        }),
        0x0b..=0x0d => b(ops::PushConst {
            value: Constant::Float((instruction - 0x0b) as f32),
        }),
        0x0e | 0x0f => b(ops::PushConst {
            value: Constant::Double((instruction - 0x0e) as f64),
        }),
        0x10 => b(ops::PushConst {
            value: Constant::Int(bytes.safe_get_i8()? as i32),
        }),
        0x11 => b(ops::PushConst {
            // sipush sign-extends
            value: Constant::Int(bytes.safe_get_i16()? as i32),
        }),
        0x12 => b(ops::Ldc {
            index: bytes.safe_get_u8()? as u16,
        }),
        0x13 => b(ops::Ldc {
            index: bytes.safe_get_u16()?,
        }),
        0x14 => b(ops::Ldc2W {
            index: bytes.safe_get_u16()?,
        }),

        // Loads
        0x15..=0x19 => b(ops::LoadLocal {
            index: bytes.safe_get_u8()? as usize,
            kind: ValueKind::from_offset(instruction - 0x15),
        }),
        0x1a..=0x2d => b(ops::LoadLocal {
            index: ((instruction - 0x1a) % 4) as usize,
            kind: ValueKind::from_offset((instruction - 0x1a) / 4),
        }),
        0x2e..=0x35 => b(ops::ArrayLoad {
            kind: ElementKind::from_offset(instruction - 0x2e),
        }),

        // Stores
        0x36..=0x3a => b(ops::StoreLocal {
            index: bytes.safe_get_u8()? as usize,
            kind: ValueKind::from_offset(instruction - 0x36),
        }),
        0x3b..=0x4e => b(ops::StoreLocal {
            index: ((instruction - 0x3b) % 4) as usize,
            kind: ValueKind::from_offset((instruction - 0x3b) / 4),
        }),
        0x4f..=0x56 => b(ops::ArrayStore {
            kind: ElementKind::from_offset(instruction - 0x4f),
        }),

        // Stack
        0x57 => b(ops::Pop { amount: 1 }),
        0x58 => b(ops::Pop { amount: 2 }),
        0x59 => b(ops::Dup { count: 1, depth: 0 }),
        0x5a => b(ops::Dup { count: 1, depth: 1 }),
        0x5b => b(ops::Dup { count: 1, depth: 2 }),
        0x5c => b(ops::Dup { count: 2, depth: 0 }),
        0x5d => b(ops::Dup { count: 2, depth: 1 }),
        0x5e => b(ops::Dup { count: 2, depth: 2 }),
        0x5f => b(ops::Swap),

        // Math
        0x60 => b(ops::Iadd),
        0x61 => b(ops::Ladd),
        0x62 => b(ops::Fadd),
        0x63 => b(ops::Dadd),
        0x64 => b(ops::Isub),
        0x65 => b(ops::Lsub),
        0x66 => b(ops::Fsub),
        0x67 => b(ops::Dsub),
        0x68 => b(ops::Imul),
        0x69 => b(ops::Lmul),
        0x6a => b(ops::Fmul),
        0x6b => b(ops::Dmul),
        0x6c => b(ops::Idiv),
        0x6d => b(ops::Ldiv),
        0x6e => b(ops::Fdiv),
        0x6f => b(ops::Ddiv),
        0x70 => b(ops::Irem),
        0x71 => b(ops::Lrem),
        0x72 => b(ops::Frem),
        0x73 => b(ops::Drem),
        0x74 => b(ops::Ineg),
        0x75 => b(ops::Lneg),
        0x76 => b(ops::Fneg),
        0x77 => b(ops::Dneg),
        0x78 => b(ops::Ishl),
        0x79 => b(ops::Lshl),
        0x7a => b(ops::Ishr),
        0x7b => b(ops::Lshr),
        0x7c => b(ops::Iushr),
        0x7d => b(ops::Lushr),
        0x7e => b(ops::Iand),
        0x7f => b(ops::Land),
        0x80 => b(ops::Ior),
        0x81 => b(ops::Lor),
        0x82 => b(ops::Ixor),
        0x83 => b(ops::Lxor),
        0x84 => b(ops::Iinc {
            index: bytes.safe_get_u8()? as usize,
            constant: bytes.safe_get_i8()? as i32,
        }),

        // Conversions
        0x85 => b(ops::I2l),
        0x86 => b(ops::I2f),
        0x87 => b(ops::I2d),
        0x88 => b(ops::L2i),
        0x89 => b(ops::L2f),
        0x8a => b(ops::L2d),
        0x8b => b(ops::F2i),
        0x8c => b(ops::F2l),
        0x8d => b(ops::F2d),
        0x8e => b(ops::D2i),
        0x8f => b(ops::D2l),
        0x90 => b(ops::D2f),
        0x91 => b(ops::I2b),
        0x92 => b(ops::I2c),
        0x93 => b(ops::I2s),

        // Comparisons
        0x94 => b(ops::Lcmp),
        0x95 => b(ops::Fcmpl),
        0x96 => b(ops::Fcmpg),
        0x97 => b(ops::Dcmpl),
        0x98 => b(ops::Dcmpg),
        0x99 => b(ops::IfEq {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9a => b(ops::IfNe {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9b => b(ops::IfLt {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9c => b(ops::IfGe {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9d => b(ops::IfGt {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9e => b(ops::IfLe {
            jump_to: bytes.safe_get_i16()?,
        }),
        0x9f => b(ops::Ieq {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa0 => b(ops::Ine {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa1 => b(ops::Ilt {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa2 => b(ops::Ige {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa3 => b(ops::Igt {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa4 => b(ops::Ile {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa5 => b(ops::IfRefEq {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xa6 => b(ops::IfRefNe {
            jump_to: bytes.safe_get_i16()?,
        }),

        // Control
        0xa7 => b(ops::Goto {
            jump_to: bytes.safe_get_i16()? as i32,
        }),
        0xa8 => b(ops::Jsr {
            jump_to: bytes.safe_get_i16()? as i32,
            return_to: pc + 3,
        }),
        0xa9 => b(ops::Ret {
            index: bytes.safe_get_u8()? as usize,
        }),
        0xaa => {
            let pad_len = 3 - (pc % 4);
            bytes.try_skip(pad_len)?;

            let default = bytes.safe_get_i32()?;

            let low = bytes.safe_get_i32()?;
            let high = bytes.safe_get_i32()?;
            if high < low {
                return Err(VmError::InvalidInstructionParameters(format!(
                    "tableswitch at pc {} has low {} above high {}",
                    pc, low, high
                )));
            }

            let len = (high as i64 - low as i64 + 1) as usize;
            let mut table: Vec<i32> = Vec::with_capacity(len.min(bytes.len() / 4));
            for _ in 0..len {
                table.push(bytes.safe_get_i32()?);
            }

            b(ops::TableSwitch {
                default,
                low,
                high,
                table,
            })
        }
        0xab => {
            let pad_len = 3 - (pc % 4);
            bytes.try_skip(pad_len)?;

            let default = bytes.safe_get_i32()?;
            let npairs = bytes.safe_get_i32()?;
            if npairs < 0 {
                return Err(VmError::InvalidInstructionParameters(format!(
                    "lookupswitch at pc {} has {} pairs",
                    pc, npairs
                )));
            }

            let npairs = npairs as usize;
            let mut pairs: Vec<(i32, i32)> = Vec::with_capacity(npairs.min(bytes.len() / 8));
            for _ in 0..npairs {
                pairs.push((bytes.safe_get_i32()?, bytes.safe_get_i32()?));
            }

            b(ops::LookupSwitch { default, pairs })
        }
        0xac..=0xb0 => b(ops::ValueReturn {
            kind: ValueKind::from_offset(instruction - 0xac),
        }),
        0xb1 => b(ops::VoidReturn),

        // References
        0xb2 => b(ops::GetStatic {
            index: bytes.safe_get_u16()?,
        }),
        0xb3 => b(ops::PutStatic {
            index: bytes.safe_get_u16()?,
        }),
        0xb6 => b(ops::InvokeVirtual {
            index: bytes.safe_get_u16()?,
        }),
        0xb8 => b(ops::InvokeStatic {
            index: bytes.safe_get_u16()?,
        }),
        0xb4 | 0xb5 | 0xb7 | 0xbb | 0xc0 | 0xc1 => {
            bytes.safe_get_u16()?;
            unsupported(instruction)
        }
        0xb9 | 0xba => {
            bytes.safe_get_u16()?;
            bytes.safe_get_u16()?;
            unsupported(instruction)
        }
        0xbc => {
            let tag = bytes.safe_get_u8()?;
            let kind = ArrayKind::from_tag(tag).ok_or_else(|| {
                VmError::InvalidInstructionParameters(format!("newarray with type {}", tag))
            })?;

            b(ops::NewArray { kind })
        }
        0xbd => b(ops::ANewArray {
            type_index: bytes.safe_get_u16()?,
        }),
        0xbe => b(ops::ArrayLength),
        0xbf => unsupported(instruction),
        0xc2 => b(ops::MonitorEnter),
        0xc3 => b(ops::MonitorExit),

        // Extended
        0xc4 => decode_wide(bytes, pc)?,
        0xc5 => {
            bytes.safe_get_u16()?;
            bytes.safe_get_u8()?;
            unsupported(instruction)
        }
        0xc6 => b(ops::IfNull {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xc7 => b(ops::IfNotNull {
            jump_to: bytes.safe_get_i16()?,
        }),
        0xc8 => b(ops::Goto {
            jump_to: bytes.safe_get_i32()?,
        }),
        0xc9 => b(ops::Jsr {
            jump_to: bytes.safe_get_i32()?,
            return_to: pc + 5,
        }),

        opcode => return Err(VmError::UnknownInstruction { opcode, pc }),
    })
}

/// The instruction following `wide`, with a 16 bit local index.
fn decode_wide(bytes: &mut Bytes, pc: usize) -> Result<Box<dyn Instruction>, VmError> {
    let instruction = bytes.safe_get_u8()?;

    Ok(match instruction {
        0x15..=0x19 => b(ops::LoadLocal {
            index: bytes.safe_get_u16()? as usize,
            kind: ValueKind::from_offset(instruction - 0x15),
        }),
        0x36..=0x3a => b(ops::StoreLocal {
            index: bytes.safe_get_u16()? as usize,
            kind: ValueKind::from_offset(instruction - 0x36),
        }),
        0xa9 => b(ops::Ret {
            index: bytes.safe_get_u16()? as usize,
        }),
        0x84 => b(ops::Iinc {
            index: bytes.safe_get_u16()? as usize,
            constant: bytes.safe_get_i16()? as i32,
        }),
        opcode => return Err(VmError::UnknownInstruction { opcode, pc }),
    })
}

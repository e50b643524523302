#![allow(clippy::redundant_closure_call)]

use super::{Instruction, Progression};
use crate::{arg, Interpreter};
use anyhow::Context as AnyhowContext;
use runtime::{
    error::VmError,
    stack::{Cell, Frame, OperandType},
};

macro_rules! unop {
    // Generic value transformation
    ($ins: ident, $ty: ident, $push: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins;

        impl Instruction for $ins {
            fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
                let val = arg!(frame, "unary value" => $ty);

                let result = $op(val);
                frame.operands.$push(result)?;

                Ok(Progression::Next)
            }
        }
    };
    // Generic conditional transformation
    ($ins: ident, $ty: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins {
            pub(crate) jump_to: i16
        }

        impl Instruction for $ins {
            fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
                let val = arg!(frame, "unary value" => $ty);

                let result: bool = $op(val);
                if result {
                    Ok(Progression::JumpRel(self.jump_to as i32))
                } else {
                    Ok(Progression::Next)
                }
            }
        }
    };
    ($ins: ident (int) => $op: expr) => {
        unop!($ins, i32, push_int => $op);
    };
    ($ins: ident (long) => $op: expr) => {
        unop!($ins, i64, push_long => $op);
    };
    ($ins: ident (float) => $op: expr) => {
        unop!($ins, f32, push_float => $op);
    };
    ($ins: ident (double) => $op: expr) => {
        unop!($ins, f64, push_double => $op);
    };
    ($ins: ident (int => long) => $op: expr) => {
        unop!($ins, i32, push_long => $op);
    };
    ($ins: ident (int => float) => $op: expr) => {
        unop!($ins, i32, push_float => $op);
    };
    ($ins: ident (int => double) => $op: expr) => {
        unop!($ins, i32, push_double => $op);
    };
    ($ins: ident (long => int) => $op: expr) => {
        unop!($ins, i64, push_int => $op);
    };
    ($ins: ident (long => float) => $op: expr) => {
        unop!($ins, i64, push_float => $op);
    };
    ($ins: ident (long => double) => $op: expr) => {
        unop!($ins, i64, push_double => $op);
    };
    ($ins: ident (float => int) => $op: expr) => {
        unop!($ins, f32, push_int => $op);
    };
    ($ins: ident (float => long) => $op: expr) => {
        unop!($ins, f32, push_long => $op);
    };
    ($ins: ident (float => double) => $op: expr) => {
        unop!($ins, f32, push_double => $op);
    };
    ($ins: ident (double => int) => $op: expr) => {
        unop!($ins, f64, push_int => $op);
    };
    ($ins: ident (double => long) => $op: expr) => {
        unop!($ins, f64, push_long => $op);
    };
    ($ins: ident (double => float) => $op: expr) => {
        unop!($ins, f64, push_float => $op);
    };
    ($ins: ident (int cond) => $op: expr) => {
        unop!($ins, i32 => $op);
    };
    ($ins: ident (Object cond) => $op: expr) => {
        unop!($ins, Object => $op);
    };
}

// Negation
unop!(Ineg (int) => |val: i32| val.wrapping_neg());
unop!(Lneg (long) => |val: i64| val.wrapping_neg());
unop!(Fneg (float) => |val: f32| -val);
unop!(Dneg (double) => |val: f64| -val);

// Widening and narrowing. Float to integer casts saturate and send NaN to 0.
unop!(I2l (int => long) => |val: i32| val as i64);
unop!(I2f (int => float) => |val: i32| val as f32);
unop!(I2d (int => double) => |val: i32| val as f64);
unop!(L2i (long => int) => |val: i64| val as i32);
unop!(L2f (long => float) => |val: i64| val as f32);
unop!(L2d (long => double) => |val: i64| val as f64);
unop!(F2i (float => int) => |val: f32| val as i32);
unop!(F2l (float => long) => |val: f32| val as i64);
unop!(F2d (float => double) => |val: f32| val as f64);
unop!(D2i (double => int) => |val: f64| val as i32);
unop!(D2l (double => long) => |val: f64| val as i64);
unop!(D2f (double => float) => |val: f64| val as f32);
unop!(I2b (int) => |val: i32| val as i8 as i32);
unop!(I2c (int) => |val: i32| val as u16 as i32);
unop!(I2s (int) => |val: i32| val as i16 as i32);

// Comparison against zero
unop!(IfEq (int cond) => |val: i32| val == 0);
unop!(IfNe (int cond) => |val: i32| val != 0);
unop!(IfLt (int cond) => |val: i32| val < 0);
unop!(IfGe (int cond) => |val: i32| val >= 0);
unop!(IfGt (int cond) => |val: i32| val > 0);
unop!(IfLe (int cond) => |val: i32| val <= 0);

unop!(IfNull (Object cond) => |val: Cell| val.ty == OperandType::Null);
unop!(IfNotNull (Object cond) => |val: Cell| val.ty != OperandType::Null);

#[derive(Debug)]
pub struct Iinc {
    pub(crate) index: usize,
    pub(crate) constant: i32,
}

impl Instruction for Iinc {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let local = frame.locals.get(self.index)?;
        if local.ty != OperandType::Integer {
            return Err(runtime::internal!(
                "iinc on local {} which holds {:?}",
                self.index,
                local
            ));
        }

        frame
            .locals
            .set(self.index, Cell::int(local.value.wrapping_add(self.constant)))?;

        Ok(Progression::Next)
    }
}

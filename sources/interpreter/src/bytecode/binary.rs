#![allow(clippy::redundant_closure_call)]

use std::cmp::Ordering;

use super::{Instruction, Progression};
use crate::{arg, Interpreter};
use anyhow::Context as AnyhowContext;
use runtime::{error::VmError, stack::Frame};

fn divide_by_zero() -> VmError {
    VmError::InvalidInstructionParameters("/ by zero".to_string())
}

macro_rules! binop {
    // Generic value transformation
    ($ins: ident, $lhs: ident, $rhs: ident, $push: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins;

        impl Instruction for $ins {
            fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
                let rhs = arg!(frame, "rhs" => $rhs);
                let lhs = arg!(frame, "lhs" => $lhs);

                let result = $op(lhs, rhs)?;
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
                let rhs = arg!(frame, "rhs" => $ty);
                let lhs = arg!(frame, "lhs" => $ty);

                let result: bool = $op(lhs, rhs);
                if result {
                    Ok(Progression::JumpRel(self.jump_to as i32))
                } else {
                    Ok(Progression::Next)
                }
            }
        }
    };
    ($ins: ident (int) => $op: expr) => {
        binop!($ins, i32, i32, push_int => |lhs: i32, rhs: i32| Ok::<i32, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (int checked) => $op: expr) => {
        binop!($ins, i32, i32, push_int => $op);
    };
    ($ins: ident (long) => $op: expr) => {
        binop!($ins, i64, i64, push_long => |lhs: i64, rhs: i64| Ok::<i64, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (long checked) => $op: expr) => {
        binop!($ins, i64, i64, push_long => $op);
    };
    ($ins: ident (long shift) => $op: expr) => {
        binop!($ins, i64, i32, push_long => |lhs: i64, rhs: i32| Ok::<i64, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (long => int) => $op: expr) => {
        binop!($ins, i64, i64, push_int => |lhs: i64, rhs: i64| Ok::<i32, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (float => int) => $op: expr) => {
        binop!($ins, f32, f32, push_int => |lhs: f32, rhs: f32| Ok::<i32, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (double => int) => $op: expr) => {
        binop!($ins, f64, f64, push_int => |lhs: f64, rhs: f64| Ok::<i32, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (float) => $op: expr) => {
        binop!($ins, f32, f32, push_float => |lhs: f32, rhs: f32| Ok::<f32, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (double) => $op: expr) => {
        binop!($ins, f64, f64, push_double => |lhs: f64, rhs: f64| Ok::<f64, VmError>($op(lhs, rhs)));
    };
    ($ins: ident (int cond) => $op: expr) => {
        binop!($ins, i32 => $op);
    };
    ($ins: ident (Object cond) => $op: expr) => {
        binop!($ins, Object => $op);
    };
}

// Binary (int)
binop!(Iadd (int) => |lhs: i32, rhs: i32| lhs.wrapping_add(rhs));
binop!(Isub (int) => |lhs: i32, rhs: i32| lhs.wrapping_sub(rhs));
binop!(Imul (int) => |lhs: i32, rhs: i32| lhs.wrapping_mul(rhs));

binop!(Idiv (int checked) => |lhs: i32, rhs: i32| {
    if rhs == 0 {
        return Err(divide_by_zero());
    }

    // MIN / -1 overflows back to MIN
    Ok(lhs.wrapping_div(rhs))
});

binop!(Irem (int checked) => |lhs: i32, rhs: i32| {
    if rhs == 0 {
        return Err(divide_by_zero());
    }

    Ok(lhs.wrapping_rem(rhs))
});

binop!(Ishl (int) => |lhs: i32, rhs: i32| lhs.wrapping_shl(rhs as u32 & 0x1f));
binop!(Ishr (int) => |lhs: i32, rhs: i32| lhs.wrapping_shr(rhs as u32 & 0x1f));
binop!(Iushr (int) => |lhs: i32, rhs: i32| ((lhs as u32) >> (rhs as u32 & 0x1f)) as i32);
binop!(Iand (int) => |lhs: i32, rhs: i32| lhs & rhs);
binop!(Ior (int) => |lhs: i32, rhs: i32| lhs | rhs);
binop!(Ixor (int) => |lhs: i32, rhs: i32| lhs ^ rhs);

// Binary (long)
binop!(Ladd (long) => |lhs: i64, rhs: i64| lhs.wrapping_add(rhs));
binop!(Lsub (long) => |lhs: i64, rhs: i64| lhs.wrapping_sub(rhs));
binop!(Lmul (long) => |lhs: i64, rhs: i64| lhs.wrapping_mul(rhs));

binop!(Ldiv (long checked) => |lhs: i64, rhs: i64| {
    if rhs == 0 {
        return Err(divide_by_zero());
    }

    Ok(lhs.wrapping_div(rhs))
});

binop!(Lrem (long checked) => |lhs: i64, rhs: i64| {
    if rhs == 0 {
        return Err(divide_by_zero());
    }

    Ok(lhs.wrapping_rem(rhs))
});

binop!(Lshl (long shift) => |lhs: i64, rhs: i32| lhs.wrapping_shl(rhs as u32 & 0x3f));
binop!(Lshr (long shift) => |lhs: i64, rhs: i32| lhs.wrapping_shr(rhs as u32 & 0x3f));
binop!(Lushr (long shift) => |lhs: i64, rhs: i32| ((lhs as u64) >> (rhs as u32 & 0x3f)) as i64);
binop!(Land (long) => |lhs: i64, rhs: i64| lhs & rhs);
binop!(Lor (long) => |lhs: i64, rhs: i64| lhs | rhs);
binop!(Lxor (long) => |lhs: i64, rhs: i64| lhs ^ rhs);

// Binary (float)
binop!(Fadd (float) => |lhs: f32, rhs: f32| lhs + rhs);
binop!(Fsub (float) => |lhs: f32, rhs: f32| lhs - rhs);
binop!(Fmul (float) => |lhs: f32, rhs: f32| lhs * rhs);
binop!(Fdiv (float) => |lhs: f32, rhs: f32| lhs / rhs);
binop!(Frem (float) => |lhs: f32, rhs: f32| lhs % rhs);

// Binary (double)
binop!(Dadd (double) => |lhs: f64, rhs: f64| lhs + rhs);
binop!(Dsub (double) => |lhs: f64, rhs: f64| lhs - rhs);
binop!(Dmul (double) => |lhs: f64, rhs: f64| lhs * rhs);
binop!(Ddiv (double) => |lhs: f64, rhs: f64| lhs / rhs);
binop!(Drem (double) => |lhs: f64, rhs: f64| lhs % rhs);

fn ordering_to_int(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

// Comparisons. The l and g variants differ only in what NaN yields.
binop!(Lcmp (long => int) => |lhs: i64, rhs: i64| ordering_to_int(lhs.cmp(&rhs)));

binop!(Fcmpl (float => int) => |lhs: f32, rhs: f32| {
    lhs.partial_cmp(&rhs).map(ordering_to_int).unwrap_or(-1)
});

binop!(Fcmpg (float => int) => |lhs: f32, rhs: f32| {
    lhs.partial_cmp(&rhs).map(ordering_to_int).unwrap_or(1)
});

binop!(Dcmpl (double => int) => |lhs: f64, rhs: f64| {
    lhs.partial_cmp(&rhs).map(ordering_to_int).unwrap_or(-1)
});

binop!(Dcmpg (double => int) => |lhs: f64, rhs: f64| {
    lhs.partial_cmp(&rhs).map(ordering_to_int).unwrap_or(1)
});

// Conditional jumps
binop!(Ieq (int cond) => |lhs: i32, rhs: i32| lhs == rhs);
binop!(Ine (int cond) => |lhs: i32, rhs: i32| lhs != rhs);
binop!(Ilt (int cond) => |lhs: i32, rhs: i32| lhs < rhs);
binop!(Ige (int cond) => |lhs: i32, rhs: i32| lhs >= rhs);
binop!(Igt (int cond) => |lhs: i32, rhs: i32| lhs > rhs);
binop!(Ile (int cond) => |lhs: i32, rhs: i32| lhs <= rhs);

// Reference identity is handle identity. Null is handle 0.
binop!(IfRefEq (Object cond) => |lhs: runtime::stack::Cell, rhs: runtime::stack::Cell| {
    lhs.value == rhs.value
});

binop!(IfRefNe (Object cond) => |lhs: runtime::stack::Cell, rhs: runtime::stack::Cell| {
    lhs.value != rhs.value
});

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use parse::flags::MethodAccessFlags;
    use runtime::{
        internal,
        loader::LoadedMethod,
        stack::{Frame, Locals},
        vm::VM,
    };
    use support::descriptor::MethodType;

    use super::*;

    fn setup() -> Result<(Interpreter, Frame), VmError> {
        let mut vm = Interpreter::new(VM::new(Default::default())?);
        let class = vm.class_loader().resolve_class("java/lang/Object")?;

        let method = Rc::new(LoadedMethod {
            name: "test".to_string(),
            descriptor: "()V".to_string(),
            ty: MethodType::parse("()V").map_err(|e| internal!(e))?,
            flags: MethodAccessFlags::from_bits(0x0008),
            code: None,
        });

        Ok((vm, Frame::new(class, method, Locals::new(0), 4)))
    }

    #[test]
    fn it_orders_nan_by_variant() -> Result<(), VmError> {
        let (mut vm, mut frame) = setup()?;

        frame.operands.push_float(f32::NAN)?;
        frame.operands.push_float(1.0)?;
        Fcmpl.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_int()?, -1);

        frame.operands.push_float(f32::NAN)?;
        frame.operands.push_float(1.0)?;
        Fcmpg.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_int()?, 1);

        frame.operands.push_double(2.0)?;
        frame.operands.push_double(f64::NAN)?;
        Dcmpg.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_int()?, 1);

        frame.operands.push_long(-5)?;
        frame.operands.push_long(3)?;
        Lcmp.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_int()?, -1);
        Ok(())
    }

    #[test]
    fn it_checks_division_by_zero() -> Result<(), VmError> {
        let (mut vm, mut frame) = setup()?;

        frame.operands.push_long(1)?;
        frame.operands.push_long(0)?;
        assert!(matches!(
            Ldiv.handle(&mut vm, &mut frame),
            Err(VmError::InvalidInstructionParameters(_))
        ));

        // float division follows IEEE instead
        frame.operands.push_float(1.0)?;
        frame.operands.push_float(0.0)?;
        Fdiv.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_float()?, f32::INFINITY);
        Ok(())
    }

    #[test]
    fn it_masks_shift_counts() -> Result<(), VmError> {
        let (mut vm, mut frame) = setup()?;

        frame.operands.push_int(1)?;
        frame.operands.push_int(33)?;
        Ishl.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_int()?, 2);

        frame.operands.push_long(-1)?;
        frame.operands.push_int(65)?;
        Lushr.handle(&mut vm, &mut frame)?;
        assert_eq!(frame.operands.pop_long()?, i64::MAX);
        Ok(())
    }
}

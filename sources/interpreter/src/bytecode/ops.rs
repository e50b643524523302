use super::{Instruction, Progression};
use crate::Interpreter;
use anyhow::Context as AnyhowContext;
use runtime::error::VmError;
use runtime::heap::ArrayKind;
use runtime::internal;
use runtime::stack::{Cell, Frame, OperandType};

pub use super::binary::*;
pub use super::invoke::*;
pub use super::load_store::*;
pub use super::unary::*;

#[macro_export]
macro_rules! pop {
    ($frame: expr) => {
        $frame
            .operands
            .pop()
            .context("no value to pop from the operand stack")?
    };
}

#[macro_export]
macro_rules! arg {
    ($frame: expr, $side: expr => i32) => {
        $frame
            .operands
            .pop_int()
            .context(format!("{} was not an int", $side))?
    };
    ($frame: expr, $side: expr => i64) => {
        $frame
            .operands
            .pop_long()
            .context(format!("{} was not a long", $side))?
    };
    ($frame: expr, $side: expr => f32) => {
        $frame
            .operands
            .pop_float()
            .context(format!("{} was not a float", $side))?
    };
    ($frame: expr, $side: expr => f64) => {
        $frame
            .operands
            .pop_double()
            .context(format!("{} was not a double", $side))?
    };
    ($frame: expr, $side: expr => Object) => {
        $frame
            .operands
            .pop_reference()
            .context(format!("{} was not a reference", $side))?
    };
}

/// The value family a typed load, store or return works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Typed instruction groups are laid out as i, l, f, d, a.
    pub(crate) fn from_offset(offset: u8) -> Self {
        match offset {
            0 => ValueKind::Int,
            1 => ValueKind::Long,
            2 => ValueKind::Float,
            3 => ValueKind::Double,
            _ => ValueKind::Reference,
        }
    }

    pub fn slots(&self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Whether a local or operand cell can be read as this kind.
    pub fn accepts(&self, cell: &Cell) -> bool {
        match self {
            ValueKind::Int => cell.ty == OperandType::Integer,
            ValueKind::Long => cell.ty == OperandType::Long,
            ValueKind::Float => cell.ty == OperandType::Float,
            ValueKind::Double => cell.ty == OperandType::Double,
            ValueKind::Reference => cell.ty.is_reference(),
        }
    }
}

/// Element family of the typed array instructions, laid out as i, l, f, d, a, b, c, s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ElementKind {
    pub(crate) fn from_offset(offset: u8) -> Self {
        match offset {
            0 => ElementKind::Int,
            1 => ElementKind::Long,
            2 => ElementKind::Float,
            3 => ElementKind::Double,
            4 => ElementKind::Reference,
            5 => ElementKind::Byte,
            6 => ElementKind::Char,
            _ => ElementKind::Short,
        }
    }

    /// `baload`/`bastore` serve both byte and boolean arrays.
    pub fn matches(&self, kind: ArrayKind) -> bool {
        matches!(
            (self, kind),
            (ElementKind::Int, ArrayKind::Int)
                | (ElementKind::Long, ArrayKind::Long)
                | (ElementKind::Float, ArrayKind::Float)
                | (ElementKind::Double, ArrayKind::Double)
                | (ElementKind::Byte, ArrayKind::Byte)
                | (ElementKind::Byte, ArrayKind::Boolean)
                | (ElementKind::Char, ArrayKind::Char)
                | (ElementKind::Short, ArrayKind::Short)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

#[derive(Debug)]
pub struct Nop;

impl Instruction for Nop {}

#[derive(Debug)]
pub struct PushConst {
    pub(crate) value: Constant,
}

impl Instruction for PushConst {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        match self.value {
            Constant::Null => frame.operands.push(Cell::null())?,
            Constant::Int(value) => frame.operands.push_int(value)?,
            Constant::Long(value) => frame.operands.push_long(value)?,
            Constant::Float(value) => frame.operands.push_float(value)?,
            Constant::Double(value) => frame.operands.push_double(value)?,
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Pop {
    pub(crate) amount: usize,
}

impl Instruction for Pop {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        if self.amount == 1 && pop!(frame).ty.is_wide() {
            return Err(internal!("pop on half of a long or double"));
        }

        if self.amount == 2 {
            frame
                .operands
                .pop_cells(2)
                .context("pop2 needs two cells")?;
        }

        Ok(Progression::Next)
    }
}

/// The `dup` family: copy the top `count` cells and insert the copies below the `depth` cells
/// under them.
#[derive(Debug)]
pub struct Dup {
    pub(crate) count: usize,
    pub(crate) depth: usize,
}

impl Instruction for Dup {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let top = frame
            .operands
            .pop_cells(self.count)
            .context("not enough cells to duplicate")?;
        let under = frame
            .operands
            .pop_cells(self.depth)
            .context("not enough cells to duplicate past")?;

        if self.count == 1 && top.iter().any(|cell| cell.ty.is_wide()) {
            return Err(internal!("dup on half of a long or double"));
        }

        frame.operands.push_all(&top)?;
        frame.operands.push_all(&under)?;
        frame.operands.push_all(&top)?;

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Swap;

impl Instruction for Swap {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let first = pop!(frame);
        let second = pop!(frame);

        if first.ty.is_wide() || second.ty.is_wide() {
            return Err(internal!("swap on a long or double"));
        }

        frame.operands.push(first)?;
        frame.operands.push(second)?;

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Goto {
    pub(crate) jump_to: i32,
}

impl Instruction for Goto {
    fn handle(&self, _vm: &mut Interpreter, _frame: &mut Frame) -> Result<Progression, VmError> {
        Ok(Progression::JumpRel(self.jump_to))
    }
}

#[derive(Debug)]
pub struct Jsr {
    pub(crate) jump_to: i32,
    pub(crate) return_to: usize,
}

impl Instruction for Jsr {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        frame.operands.push(Cell::return_address(self.return_to))?;
        Ok(Progression::JumpRel(self.jump_to))
    }
}

#[derive(Debug)]
pub struct Ret {
    pub(crate) index: usize,
}

impl Instruction for Ret {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let address = frame.locals.get(self.index)?;
        if address.ty != OperandType::ReturnAddress {
            return Err(internal!(
                "ret from local {} which holds {:?}",
                self.index,
                address
            ));
        }

        Ok(Progression::JumpAbs(address.value as usize))
    }
}

#[derive(Debug)]
pub struct TableSwitch {
    pub(crate) default: i32,
    pub(crate) low: i32,
    pub(crate) high: i32,
    pub(crate) table: Vec<i32>,
}

impl Instruction for TableSwitch {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let index = arg!(frame, "tableswitch index" => i32);

        if index < self.low || index > self.high {
            return Ok(Progression::JumpRel(self.default));
        }

        let offset = self
            .table
            .get((index as i64 - self.low as i64) as usize)
            .copied()
            .unwrap_or(self.default);

        Ok(Progression::JumpRel(offset))
    }
}

#[derive(Debug)]
pub struct LookupSwitch {
    pub(crate) default: i32,
    pub(crate) pairs: Vec<(i32, i32)>,
}

impl Instruction for LookupSwitch {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let key = arg!(frame, "lookupswitch key" => i32);

        let offset = self
            .pairs
            .iter()
            .find(|(pair_key, _)| *pair_key == key)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.default);

        Ok(Progression::JumpRel(offset))
    }
}

#[derive(Debug)]
pub struct ValueReturn {
    pub(crate) kind: ValueKind,
}

impl Instruction for ValueReturn {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let cells = frame
            .operands
            .pop_cells(self.kind.slots())
            .context("no value to return")?;

        if !cells.iter().all(|cell| self.kind.accepts(cell)) {
            return Err(internal!(
                "{:?} return of {:?}",
                self.kind,
                cells
            ));
        }

        Ok(Progression::Return(cells))
    }
}

#[derive(Debug)]
pub struct VoidReturn;

impl Instruction for VoidReturn {
    fn handle(&self, _vm: &mut Interpreter, _frame: &mut Frame) -> Result<Progression, VmError> {
        Ok(Progression::Return(vec![]))
    }
}

#[derive(Debug)]
pub struct MonitorEnter;

impl Instruction for MonitorEnter {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        // Single threaded, so locking is a null check
        let object = arg!(frame, "monitor object" => Object);
        if object.ty == OperandType::Null {
            return Err(VmError::InvalidInstructionParameters(
                "monitorenter on null".to_string(),
            ));
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct MonitorExit;

impl Instruction for MonitorExit {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let object = arg!(frame, "monitor object" => Object);
        if object.ty == OperandType::Null {
            return Err(VmError::InvalidInstructionParameters(
                "monitorexit on null".to_string(),
            ));
        }

        Ok(Progression::Next)
    }
}

/// An instruction that decodes but cannot run here.
#[derive(Debug)]
pub struct Unsupported {
    pub(crate) opcode: u8,
    pub(crate) name: &'static str,
}

impl Instruction for Unsupported {
    fn handle(&self, _vm: &mut Interpreter, _frame: &mut Frame) -> Result<Progression, VmError> {
        Err(VmError::UnsupportedInstruction {
            opcode: self.opcode,
            name: self.name,
        })
    }
}

use std::{fmt, rc::Rc};

use anyhow::{anyhow, Context, Result};
use support::numeric::{join_halves, split_halves};

use crate::{
    heap::Handle,
    loader::{LoadedClass, LoadedMethod},
};

/// What a 32 bit cell holds. Both halves of a long or double carry the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    Integer,
    Float,
    Long,
    Double,
    Null,
    StringRef,
    ArrayRef,
    ObjectRef,
    ClassRef,
    MethodRef,
    ReturnAddress,
}

impl OperandType {
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            OperandType::Null
                | OperandType::StringRef
                | OperandType::ArrayRef
                | OperandType::ObjectRef
                | OperandType::ClassRef
                | OperandType::MethodRef
        )
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, OperandType::Long | OperandType::Double)
    }
}

/// One operand stack or local variable slot.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub value: i32,
    pub ty: OperandType,
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#x})", self.ty, self.value)
    }
}

impl Cell {
    pub fn new(value: i32, ty: OperandType) -> Self {
        Self { value, ty }
    }

    pub fn int(value: i32) -> Self {
        Self::new(value, OperandType::Integer)
    }

    pub fn float(value: f32) -> Self {
        Self::new(value.to_bits() as i32, OperandType::Float)
    }

    pub fn null() -> Self {
        Self::new(0, OperandType::Null)
    }

    pub fn reference(handle: Handle, ty: OperandType) -> Self {
        if handle == 0 {
            Self::null()
        } else {
            Self::new(handle, ty)
        }
    }

    pub fn return_address(pc: usize) -> Self {
        Self::new(pc as i32, OperandType::ReturnAddress)
    }

    /// High cell first, the order they are pushed in.
    pub fn long(value: i64) -> [Cell; 2] {
        let (high, low) = split_halves(value as u64);
        [
            Self::new(high as i32, OperandType::Long),
            Self::new(low as i32, OperandType::Long),
        ]
    }

    pub fn double(value: f64) -> [Cell; 2] {
        let (high, low) = split_halves(value.to_bits());
        [
            Self::new(high as i32, OperandType::Double),
            Self::new(low as i32, OperandType::Double),
        ]
    }

    pub fn as_float(&self) -> f32 {
        f32::from_bits(self.value as u32)
    }

    /// Zero value for a field or array element of the given descriptor.
    pub fn default_for(descriptor: &str) -> Vec<Cell> {
        match descriptor.chars().next() {
            Some('J') => Cell::long(0).to_vec(),
            Some('D') => Cell::double(0.0).to_vec(),
            Some('F') => vec![Cell::float(0.0)],
            Some('L') | Some('[') => vec![Cell::null()],
            _ => vec![Cell::int(0)],
        }
    }
}

fn join_long(high: Cell, low: Cell) -> i64 {
    join_halves(high.value as u32, low.value as u32) as i64
}

fn join_double(high: Cell, low: Cell) -> f64 {
    f64::from_bits(join_halves(high.value as u32, low.value as u32))
}

/// A bounded operand stack. Popping a cell of the wrong type is an error, never a coercion.
#[derive(Debug, Clone, Default)]
pub struct OperandStack {
    values: Vec<Cell>,
    max: usize,
}

impl OperandStack {
    pub fn new(max: usize) -> Self {
        Self {
            values: Vec::with_capacity(max),
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, cell: Cell) -> Result<()> {
        if self.values.len() >= self.max {
            return Err(anyhow!("operand stack overflow (max {})", self.max));
        }

        self.values.push(cell);
        Ok(())
    }

    pub fn push_all(&mut self, cells: &[Cell]) -> Result<()> {
        for cell in cells {
            self.push(*cell)?;
        }

        Ok(())
    }

    pub fn pop(&mut self) -> Result<Cell> {
        self.values.pop().context("operand stack underflow")
    }

    /// The cell `depth` below the top, 0 being the top.
    pub fn peek(&self, depth: usize) -> Result<Cell> {
        self.values
            .len()
            .checked_sub(depth + 1)
            .map(|index| self.values[index])
            .context("operand stack underflow")
    }

    /// Pop `count` cells, returned in the order they were pushed.
    pub fn pop_cells(&mut self, count: usize) -> Result<Vec<Cell>> {
        let start = self
            .values
            .len()
            .checked_sub(count)
            .context("operand stack underflow")?;

        Ok(self.values.split_off(start))
    }

    fn pop_typed(&mut self, ty: OperandType) -> Result<Cell> {
        let cell = self.pop()?;
        if cell.ty != ty {
            return Err(anyhow!("expected {:?} on the operand stack, got {:?}", ty, cell));
        }

        Ok(cell)
    }

    pub fn push_int(&mut self, value: i32) -> Result<()> {
        self.push(Cell::int(value))
    }

    pub fn push_float(&mut self, value: f32) -> Result<()> {
        self.push(Cell::float(value))
    }

    pub fn push_long(&mut self, value: i64) -> Result<()> {
        self.push_all(&Cell::long(value))
    }

    pub fn push_double(&mut self, value: f64) -> Result<()> {
        self.push_all(&Cell::double(value))
    }

    pub fn push_reference(&mut self, handle: Handle, ty: OperandType) -> Result<()> {
        self.push(Cell::reference(handle, ty))
    }

    pub fn pop_int(&mut self) -> Result<i32> {
        Ok(self.pop_typed(OperandType::Integer)?.value)
    }

    pub fn pop_float(&mut self) -> Result<f32> {
        Ok(self.pop_typed(OperandType::Float)?.as_float())
    }

    pub fn pop_long(&mut self) -> Result<i64> {
        let low = self.pop_typed(OperandType::Long)?;
        let high = self.pop_typed(OperandType::Long)?;
        Ok(join_long(high, low))
    }

    pub fn pop_double(&mut self) -> Result<f64> {
        let low = self.pop_typed(OperandType::Double)?;
        let high = self.pop_typed(OperandType::Double)?;
        Ok(join_double(high, low))
    }

    /// A reference or null. The handle of null is 0.
    pub fn pop_reference(&mut self) -> Result<Cell> {
        let cell = self.pop()?;
        if !cell.ty.is_reference() {
            return Err(anyhow!("expected a reference on the operand stack, got {:?}", cell));
        }

        Ok(cell)
    }
}

/// Local variable slots. Longs and doubles take two consecutive slots.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    values: Vec<Cell>,
}

impl Locals {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![Cell::int(0); size],
        }
    }

    /// Slots start out as the arguments, then zeroed up to `size`.
    pub fn with_arguments(args: Vec<Cell>, size: usize) -> Result<Self> {
        if args.len() > size {
            return Err(anyhow!(
                "{} argument slots do not fit in {} locals",
                args.len(),
                size
            ));
        }

        let mut values = args;
        values.resize(size, Cell::int(0));
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Cell> {
        self.values
            .get(index)
            .copied()
            .with_context(|| format!("local {} out of range ({} locals)", index, self.values.len()))
    }

    pub fn set(&mut self, index: usize, cell: Cell) -> Result<()> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .with_context(|| format!("local {} out of range ({} locals)", index, len))?;

        *slot = cell;
        Ok(())
    }

    /// Read a category 2 value as its two cells, high first.
    pub fn get_wide(&self, index: usize) -> Result<[Cell; 2]> {
        Ok([self.get(index)?, self.get(index + 1)?])
    }

    pub fn set_wide(&mut self, index: usize, cells: [Cell; 2]) -> Result<()> {
        self.get(index + 1)?;
        self.set(index, cells[0])?;
        self.set(index + 1, cells[1])
    }
}

/// The state of one method activation.
pub struct Frame {
    pub class: Rc<LoadedClass>,
    pub method: Rc<LoadedMethod>,
    pub pc: usize,
    pub locals: Locals,
    pub operands: OperandStack,
}

impl Frame {
    pub fn new(
        class: Rc<LoadedClass>,
        method: Rc<LoadedMethod>,
        locals: Locals,
        max_stack: usize,
    ) -> Self {
        Self {
            class,
            method,
            pc: 0,
            locals,
            operands: OperandStack::new(max_stack),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("class", &self.class.name)
            .field("method", &self.method.name)
            .field("pc", &self.pc)
            .field("locals", &self.locals)
            .field("operands", &self.operands)
            .finish()
    }
}

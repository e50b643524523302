use std::rc::Rc;

use super::{ops::ElementKind, ops::ValueKind, Instruction, Progression};
use crate::{arg, Interpreter};
use anyhow::Context as AnyhowContext;
use parse::{
    classfile::Resolvable,
    pool::{ConstantClass, ConstantEntry, ConstantField, ConstantPool},
};
use runtime::{
    error::VmError,
    heap::{ArrayKind, HeapObject},
    internal,
    loader::{LoadedClass, LoadedField},
    stack::{Cell, Frame, OperandType},
    vm::VM,
};
use support::{
    descriptor::{BaseType, FieldType},
    numeric::join_halves,
};

pub(crate) fn constant_pool(frame: &Frame) -> Result<&ConstantPool, VmError> {
    frame
        .class
        .class_file
        .as_ref()
        .map(|class_file| &class_file.constant_pool)
        .ok_or_else(|| internal!("{} has no constant pool", frame.class.name))
}

/// The cells a loadable constant pushes. String literals are interned.
pub fn constant_cells(entry: &ConstantEntry, vm: &mut VM) -> Result<Vec<Cell>, VmError> {
    Ok(match entry {
        ConstantEntry::Integer(data) => vec![Cell::int(data.value())],
        ConstantEntry::Float(data) => vec![Cell::float(data.value())],
        ConstantEntry::Long(data) => Cell::long(data.value()).to_vec(),
        ConstantEntry::Double(data) => Cell::double(data.value()).to_vec(),
        ConstantEntry::String(data) => {
            let handle = vm.heap.intern(&data.try_string()?)?;
            vec![Cell::reference(handle, OperandType::StringRef)]
        }
        v => return Err(internal!("cannot load {} as a constant", v.kind_name())),
    })
}

/// Whether a `ConstantValue` entry may initialise a field of type `ty`.
pub fn constant_fits(ty: &FieldType, entry: &ConstantEntry) -> bool {
    match (ty, entry) {
        (FieldType::Base(BaseType::Long), ConstantEntry::Long(_)) => true,
        (FieldType::Base(BaseType::Double), ConstantEntry::Double(_)) => true,
        (FieldType::Base(BaseType::Float), ConstantEntry::Float(_)) => true,
        (
            FieldType::Base(
                BaseType::Int
                | BaseType::Short
                | BaseType::Char
                | BaseType::Byte
                | BaseType::Boolean,
            ),
            ConstantEntry::Integer(_),
        ) => true,
        (FieldType::Object(object), ConstantEntry::String(_)) => {
            object.class_name == "java/lang/String"
        }
        _ => false,
    }
}

#[derive(Debug)]
pub struct Ldc {
    pub(crate) index: u16,
}

impl Instruction for Ldc {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let value = constant_pool(frame)?
            .get(self.index)
            .with_context(|| format!("no value @ index {}", self.index))?;

        match value {
            ConstantEntry::Class(_) => {
                return Err(VmError::UnsupportedInstruction {
                    opcode: 0x12,
                    name: "ldc (class literal)",
                })
            }
            ConstantEntry::Long(_) | ConstantEntry::Double(_) => {
                return Err(internal!("cannot load a wide constant with ldc"))
            }
            v => {
                let cells = constant_cells(&v, &mut vm.vm)?;
                frame.operands.push_all(&cells)?;
            }
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Ldc2W {
    pub(crate) index: u16,
}

impl Instruction for Ldc2W {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let value = constant_pool(frame)?
            .get(self.index)
            .with_context(|| format!("no value @ index {}", self.index))?;

        if !value.is_wide() {
            return Err(internal!(
                "cannot load {} with ldc2_w",
                value.kind_name()
            ));
        }

        let cells = constant_cells(&value, &mut vm.vm)?;
        frame.operands.push_all(&cells)?;

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct LoadLocal {
    pub(crate) index: usize,
    pub(crate) kind: ValueKind,
}

impl Instruction for LoadLocal {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        for slot in self.index..self.index + self.kind.slots() {
            let local = frame.locals.get(slot)?;
            if !self.kind.accepts(&local) {
                return Err(internal!(
                    "{:?} load from local {} which holds {:?}",
                    self.kind,
                    slot,
                    local
                ));
            }

            frame.operands.push(local)?;
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct StoreLocal {
    pub(crate) index: usize,
    pub(crate) kind: ValueKind,
}

impl Instruction for StoreLocal {
    fn handle(&self, _vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let cells = frame
            .operands
            .pop_cells(self.kind.slots())
            .context("no operand to store")?;

        for (offset, cell) in cells.into_iter().enumerate() {
            // astore also takes the return address pushed by jsr
            let storable = self.kind.accepts(&cell)
                || (self.kind == ValueKind::Reference && cell.ty == OperandType::ReturnAddress);

            if !storable {
                return Err(internal!("{:?} store of {:?}", self.kind, cell));
            }

            frame.locals.set(self.index + offset, cell)?;
        }

        Ok(Progression::Next)
    }
}

fn null_array(instruction: &str) -> VmError {
    VmError::InvalidInstructionParameters(format!("{} on a null array", instruction))
}

fn out_of_bounds(index: i32, len: usize) -> VmError {
    VmError::InvalidInstructionParameters(format!(
        "array index {} out of bounds for length {}",
        index, len
    ))
}

#[derive(Debug)]
pub struct ArrayLoad {
    pub(crate) kind: ElementKind,
}

impl Instruction for ArrayLoad {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let index = arg!(frame, "array index" => i32);
        let array = arg!(frame, "array" => Object);
        if array.ty == OperandType::Null {
            return Err(null_array("array load"));
        }

        match vm.heap().get(array.value)? {
            HeapObject::Array(values) if self.kind.matches(values.kind) => {
                let value = values.get(index)?;

                match self.kind {
                    ElementKind::Long => frame.operands.push_long(value)?,
                    ElementKind::Float => frame.operands.push_float(f32::from_bits(value as u32))?,
                    ElementKind::Double => {
                        frame.operands.push_double(f64::from_bits(value as u64))?
                    }
                    _ => frame.operands.push_int(value as i32)?,
                }
            }
            HeapObject::ObjectArray { values, .. } if self.kind == ElementKind::Reference => {
                let cell = usize::try_from(index)
                    .ok()
                    .and_then(|i| values.get(i).copied())
                    .ok_or_else(|| out_of_bounds(index, values.len()))?;

                frame.operands.push(cell)?;
            }
            other => {
                return Err(internal!(
                    "{:?} array load from {:?}",
                    self.kind,
                    other
                ))
            }
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ArrayStore {
    pub(crate) kind: ElementKind,
}

impl Instruction for ArrayStore {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let value = match self.kind {
            ElementKind::Long => Cell::long(arg!(frame, "value" => i64)).to_vec(),
            ElementKind::Double => Cell::double(arg!(frame, "value" => f64)).to_vec(),
            ElementKind::Float => vec![Cell::float(arg!(frame, "value" => f32))],
            ElementKind::Reference => vec![arg!(frame, "value" => Object)],
            _ => vec![Cell::int(arg!(frame, "value" => i32))],
        };

        let index = arg!(frame, "array index" => i32);
        let array = arg!(frame, "array" => Object);
        if array.ty == OperandType::Null {
            return Err(null_array("array store"));
        }

        match vm.heap().get_mut(array.value)? {
            HeapObject::Array(values) if self.kind.matches(values.kind) => {
                let widened = match (self.kind, value.as_slice()) {
                    (ElementKind::Long, [high, low]) | (ElementKind::Double, [high, low]) => {
                        join_halves(high.value as u32, low.value as u32) as i64
                    }
                    (ElementKind::Float, [cell]) => cell.value as u32 as i64,
                    (_, [cell]) => cell.value as i64,
                    _ => return Err(internal!("malformed array store value {:?}", value)),
                };

                values.set(index, widened)?;
            }
            HeapObject::ObjectArray { values, .. } if self.kind == ElementKind::Reference => {
                let len = values.len();
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| values.get_mut(i))
                    .ok_or_else(|| out_of_bounds(index, len))?;

                *slot = value[0];
            }
            other => {
                return Err(internal!(
                    "{:?} array store into {:?}",
                    self.kind,
                    other
                ))
            }
        }

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct NewArray {
    pub(crate) kind: ArrayKind,
}

impl Instruction for NewArray {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let count = arg!(frame, "array length" => i32);
        let handle = vm.heap().alloc_array(self.kind, count)?;

        frame.operands.push_reference(handle, OperandType::ArrayRef)?;
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ANewArray {
    pub(crate) type_index: u16,
}

impl Instruction for ANewArray {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let class_name = constant_pool(frame)?
            .address::<ConstantClass>(self.type_index)
            .try_resolve()?
            .try_name()?;

        vm.class_loader().for_name(&class_name)?;

        let count = arg!(frame, "array length" => i32);
        let handle = vm.heap().alloc_object_array(class_name, count)?;

        frame.operands.push_reference(handle, OperandType::ArrayRef)?;
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ArrayLength;

impl Instruction for ArrayLength {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let array = arg!(frame, "array" => Object);
        if array.ty == OperandType::Null {
            return Err(null_array("arraylength"));
        }

        let length = vm
            .heap()
            .get(array.value)?
            .array_length()
            .with_context(|| format!("arraylength on a non-array {:?}", array))?;

        frame.operands.push_int(length as i32)?;
        Ok(Progression::Next)
    }
}

/// Resolve the static field a `getstatic`/`putstatic` names, initialising its declaring class.
fn static_field(
    vm: &mut Interpreter,
    frame: &Frame,
    index: u16,
) -> Result<(Rc<LoadedClass>, LoadedField), VmError> {
    let (class_name, name, descriptor) = constant_pool(frame)?
        .address::<ConstantField>(index)
        .try_resolve()?
        .try_parts()?;

    let class = vm.class_loader().resolve_class(&class_name)?;
    let (declaring, field) = vm
        .class_loader()
        .resolve_field(&class, &name, &descriptor)?;

    if !field.is_static {
        return Err(VmError::FieldResolution {
            class_name,
            field: format!("{}:{} (not static)", name, descriptor),
        });
    }

    vm.initialise_class(&declaring)?;
    Ok((declaring, field))
}

/// Whether `cell` can be stored in a field of type `ty`.
fn field_accepts(ty: &FieldType, cell: &Cell) -> bool {
    match ty {
        FieldType::Base(BaseType::Long) => cell.ty == OperandType::Long,
        FieldType::Base(BaseType::Double) => cell.ty == OperandType::Double,
        FieldType::Base(BaseType::Float) => cell.ty == OperandType::Float,
        FieldType::Base(BaseType::Void) => false,
        FieldType::Base(_) => cell.ty == OperandType::Integer,
        FieldType::Object(_) | FieldType::Array(_) => cell.ty.is_reference(),
    }
}

#[derive(Debug)]
pub struct GetStatic {
    pub(crate) index: u16,
}

impl Instruction for GetStatic {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let (class, field) = static_field(vm, frame, self.index)?;

        let cells = class.get_static(&field)?;
        frame.operands.push_all(&cells)?;

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct PutStatic {
    pub(crate) index: u16,
}

impl Instruction for PutStatic {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let (class, field) = static_field(vm, frame, self.index)?;

        let cells = frame
            .operands
            .pop_cells(field.slots())
            .context("no value to store in a static field")?;

        if !cells.iter().all(|cell| field_accepts(&field.ty, cell)) {
            return Err(internal!(
                "cannot store {:?} in {}:{}",
                cells,
                field.name,
                field.descriptor
            ));
        }

        class.set_static(&field, &cells)?;
        Ok(Progression::Next)
    }
}

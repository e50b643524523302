use std::collections::HashMap;

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;

use crate::{error::VmError, stack::Cell};

/// Index into the heap plus one. Zero is null.
pub type Handle = i32;

/// Largest array the heap will allocate, in elements.
pub const MAX_ARRAY_LENGTH: i32 = 1 << 26;

/// Element kind of a primitive array, numbered as `newarray` encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl ArrayKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            4 => Self::Boolean,
            5 => Self::Char,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Byte,
            9 => Self::Short,
            10 => Self::Int,
            11 => Self::Long,
            _ => return None,
        })
    }

    pub fn descriptor(&self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
        }
    }

    /// Narrow a stored value the way the matching `*astore` does.
    fn narrow(&self, value: i64) -> i64 {
        match self {
            Self::Boolean | Self::Byte => value as i8 as i64,
            Self::Char => value as u16 as i64,
            Self::Short => value as i16 as i64,
            Self::Int | Self::Float => value as i32 as i64,
            Self::Long | Self::Double => value,
        }
    }
}

/// A primitive array. Elements are kept widened to 64 bits, floats and doubles as their bits.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveArray {
    pub kind: ArrayKind,
    pub values: Vec<i64>,
}

impl PrimitiveArray {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: i32) -> Result<i64, VmError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i).copied())
            .ok_or_else(|| out_of_bounds(index, self.values.len()))
    }

    pub fn set(&mut self, index: i32, value: i64) -> Result<(), VmError> {
        let len = self.values.len();
        let kind = self.kind;
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get_mut(i))
            .ok_or_else(|| out_of_bounds(index, len))?;

        *slot = kind.narrow(value);
        Ok(())
    }
}

fn out_of_bounds(index: i32, len: usize) -> VmError {
    VmError::InvalidInstructionParameters(format!(
        "array index {} out of bounds for length {}",
        index, len
    ))
}

#[derive(Debug, Clone, EnumAsInner)]
pub enum HeapObject {
    String(String),
    Array(PrimitiveArray),
    ObjectArray {
        class_name: String,
        values: Vec<Cell>,
    },
    ClassInstance {
        class_name: String,
        fields: Vec<Cell>,
    },
}

impl HeapObject {
    pub fn array_length(&self) -> Option<usize> {
        match self {
            HeapObject::Array(array) => Some(array.len()),
            HeapObject::ObjectArray { values, .. } => Some(values.len()),
            _ => None,
        }
    }
}

/// Every object created while the VM runs. Nothing is ever freed.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    interned: HashMap<String, Handle>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn allocate(&mut self, object: HeapObject) -> Result<Handle, VmError> {
        let handle = Handle::try_from(self.objects.len() + 1)
            .map_err(|_| VmError::OutOfMemory("heap handle space exhausted".to_string()))?;

        self.objects.push(object);
        Ok(handle)
    }

    fn check_length(length: i32) -> Result<usize, VmError> {
        if length < 0 {
            return Err(VmError::InvalidInstructionParameters(format!(
                "negative array size {}",
                length
            )));
        }

        if length > MAX_ARRAY_LENGTH {
            return Err(VmError::OutOfMemory(format!(
                "array of {} elements exceeds the limit of {}",
                length, MAX_ARRAY_LENGTH
            )));
        }

        Ok(length as usize)
    }

    pub fn alloc_string(&mut self, value: impl Into<String>) -> Result<Handle, VmError> {
        self.allocate(HeapObject::String(value.into()))
    }

    /// The same string literal always yields the same handle.
    pub fn intern(&mut self, value: &str) -> Result<Handle, VmError> {
        if let Some(handle) = self.interned.get(value) {
            return Ok(*handle);
        }

        let handle = self.alloc_string(value)?;
        self.interned.insert(value.to_string(), handle);
        Ok(handle)
    }

    pub fn alloc_array(&mut self, kind: ArrayKind, length: i32) -> Result<Handle, VmError> {
        let length = Self::check_length(length)?;
        self.allocate(HeapObject::Array(PrimitiveArray {
            kind,
            values: vec![0; length],
        }))
    }

    pub fn alloc_object_array(
        &mut self,
        class_name: impl Into<String>,
        length: i32,
    ) -> Result<Handle, VmError> {
        let length = Self::check_length(length)?;
        self.allocate(HeapObject::ObjectArray {
            class_name: class_name.into(),
            values: vec![Cell::null(); length],
        })
    }

    pub fn alloc_instance(
        &mut self,
        class_name: impl Into<String>,
        fields: Vec<Cell>,
    ) -> Result<Handle, VmError> {
        self.allocate(HeapObject::ClassInstance {
            class_name: class_name.into(),
            fields,
        })
    }

    pub fn get(&self, handle: Handle) -> Result<&HeapObject> {
        usize::try_from(handle)
            .ok()
            .and_then(|h| h.checked_sub(1))
            .and_then(|index| self.objects.get(index))
            .ok_or_else(|| anyhow!("invalid heap handle {}", handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut HeapObject> {
        usize::try_from(handle)
            .ok()
            .and_then(|h| h.checked_sub(1))
            .and_then(|index| self.objects.get_mut(index))
            .ok_or_else(|| anyhow!("invalid heap handle {}", handle))
    }

    pub fn string(&self, handle: Handle) -> Result<&str> {
        match self.get(handle)? {
            HeapObject::String(value) => Ok(value),
            other => Err(anyhow!("handle {} is not a string: {:?}", handle, other)),
        }
    }
}

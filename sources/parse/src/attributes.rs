use anyhow::{anyhow, Result};
use bytes::Bytes;
use support::bytes_ext::SafeBuf;

use crate::{
    classfile::{Addressed, Resolvable},
    pool::{ConstantClass, ConstantEntry, ConstantPool, ConstantUtf8},
    result::ParseError,
};

/// One attribute, kept as its raw bytes. Known kinds are decoded on request.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: Addressed<ConstantUtf8>,
    pub data: Bytes,
}

impl Attribute {
    pub fn try_name(&self) -> Result<String> {
        self.name.try_resolve()?.try_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub values: Vec<Attribute>,
}

impl Attributes {
    /// Decode the first attribute named `T::id()`, if there is one.
    pub fn find<T>(&self, constant_pool: &ConstantPool) -> Result<Option<T>>
    where
        T: KnownAttribute,
    {
        for attr in self.values.iter() {
            if attr.name.try_resolve()?.eq_str(T::id()) {
                return T::decode(attr.data.clone(), constant_pool).map(Some);
            }
        }

        Ok(None)
    }

    pub fn known_attribute<T>(&self, constant_pool: &ConstantPool) -> Result<T>
    where
        T: KnownAttribute,
    {
        self.find(constant_pool)?
            .ok_or_else(|| anyhow!("could not locate known attribute {}", T::id()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.values.iter()
    }

    /// Read a `u2` count followed by that many attributes. `read` counts the attributes
    /// fully read so far.
    pub fn parse(
        bytes: &mut Bytes,
        constant_pool: &ConstantPool,
        read: &mut u16,
    ) -> Result<Self, ParseError> {
        let eof = |_| ParseError::UnexpectedEofReadingAttributeInfo;

        *read = 0;
        let length = bytes.safe_get_u16().map_err(eof)?;
        let mut attributes = Attributes {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let name_index = bytes.safe_get_u16().map_err(eof)?;

            if !constant_pool.is_valid_index(name_index) {
                return Err(ParseError::InvalidConstantPoolIndex(name_index));
            }

            if !matches!(constant_pool.get(name_index), Some(ConstantEntry::Utf8(_))) {
                return Err(ParseError::InvalidNameIndex);
            }

            let attr_length = bytes.safe_get_u32().map_err(eof)?;
            if bytes.len() < attr_length as usize {
                return Err(ParseError::UnexpectedEofReadingAttributeInfo);
            }

            attributes.values.push(Attribute {
                name: constant_pool.address(name_index),
                data: bytes.split_to(attr_length as usize),
            });

            *read += 1;
        }

        Ok(attributes)
    }
}

pub trait KnownAttribute
where
    Self: Sized,
{
    fn decode(bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self>;
    fn id() -> &'static str;
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Bytes,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero catches everything.
    pub catch_type: Option<Addressed<ConstantClass>>,
}

impl KnownAttribute for CodeAttribute {
    fn decode(mut bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self> {
        let max_stack = bytes.safe_get_u16()?;
        let max_locals = bytes.safe_get_u16()?;

        let code_length = bytes.safe_get_u32()? as usize;
        if bytes.len() < code_length {
            return Err(anyhow!(
                "code length {} exceeds the {} bytes left",
                code_length,
                bytes.len()
            ));
        }
        let code = bytes.split_to(code_length);

        let exception_length = bytes.safe_get_u16()?;
        let mut exception_table: Vec<ExceptionEntry> = Vec::with_capacity(exception_length.into());
        for _ in 0..exception_length {
            let start_pc = bytes.safe_get_u16()?;
            let end_pc = bytes.safe_get_u16()?;
            let handler_pc = bytes.safe_get_u16()?;
            let catch_type = bytes.safe_get_u16()?;

            exception_table.push(ExceptionEntry {
                start_pc,
                end_pc,
                handler_pc,
                catch_type: (catch_type != 0).then(|| constant_pool.address(catch_type)),
            })
        }

        let mut nested = 0;
        let attributes = Attributes::parse(&mut bytes, constant_pool, &mut nested)?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    fn id() -> &'static str {
        "Code"
    }
}

#[derive(Debug, Clone)]
pub struct ConstantValueAttribute {
    pub value: Addressed<ConstantEntry>,
}

impl KnownAttribute for ConstantValueAttribute {
    fn decode(mut bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self> {
        Ok(ConstantValueAttribute {
            value: constant_pool.address(bytes.safe_get_u16()?),
        })
    }

    fn id() -> &'static str {
        "ConstantValue"
    }
}

#[derive(Debug, Clone)]
pub struct SourceFileAttribute {
    pub file: Addressed<ConstantUtf8>,
}

impl KnownAttribute for SourceFileAttribute {
    fn decode(mut bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self> {
        Ok(SourceFileAttribute {
            file: constant_pool.address(bytes.safe_get_u16()?),
        })
    }

    fn id() -> &'static str {
        "SourceFile"
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionsAttribute {
    pub exceptions: Vec<Addressed<ConstantClass>>,
}

impl KnownAttribute for ExceptionsAttribute {
    fn decode(mut bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self> {
        let count = bytes.safe_get_u16()?;
        let mut exceptions = Vec::with_capacity(count.into());

        for _ in 0..count {
            exceptions.push(constant_pool.address(bytes.safe_get_u16()?));
        }

        Ok(ExceptionsAttribute { exceptions })
    }

    fn id() -> &'static str {
        "Exceptions"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line: u16,
}

#[derive(Debug, Clone)]
pub struct LineNumberTableAttribute {
    pub lines: Vec<LineNumber>,
}

impl LineNumberTableAttribute {
    /// Source line for `pc`: the entry with the greatest start at or before it.
    pub fn line_for(&self, pc: u16) -> Option<u16> {
        self.lines
            .iter()
            .filter(|l| l.start_pc <= pc)
            .max_by_key(|l| l.start_pc)
            .map(|l| l.line)
    }
}

impl KnownAttribute for LineNumberTableAttribute {
    fn decode(mut bytes: Bytes, _constant_pool: &ConstantPool) -> Result<Self> {
        let count = bytes.safe_get_u16()?;
        let mut lines = Vec::with_capacity(count.into());

        for _ in 0..count {
            lines.push(LineNumber {
                start_pc: bytes.safe_get_u16()?,
                line: bytes.safe_get_u16()?,
            });
        }

        Ok(LineNumberTableAttribute { lines })
    }

    fn id() -> &'static str {
        "LineNumberTable"
    }
}

#[derive(Debug, Clone)]
pub struct InnerClass {
    pub inner_class: Addressed<ConstantClass>,
    pub outer_class: Option<Addressed<ConstantClass>>,
    pub inner_name: Option<Addressed<ConstantUtf8>>,
    pub inner_flags: u16,
}

#[derive(Debug, Clone)]
pub struct InnerClassesAttribute {
    pub classes: Vec<InnerClass>,
}

impl KnownAttribute for InnerClassesAttribute {
    fn decode(mut bytes: Bytes, constant_pool: &ConstantPool) -> Result<Self> {
        let count = bytes.safe_get_u16()?;
        let mut classes = Vec::with_capacity(count.into());

        for _ in 0..count {
            let inner = bytes.safe_get_u16()?;
            let outer = bytes.safe_get_u16()?;
            let name = bytes.safe_get_u16()?;
            let inner_flags = bytes.safe_get_u16()?;

            classes.push(InnerClass {
                inner_class: constant_pool.address(inner),
                outer_class: (outer != 0).then(|| constant_pool.address(outer)),
                inner_name: (name != 0).then(|| constant_pool.address(name)),
                inner_flags,
            });
        }

        Ok(InnerClassesAttribute { classes })
    }

    fn id() -> &'static str {
        "InnerClasses"
    }
}

#[derive(Debug, Clone)]
pub struct DeprecatedAttribute;

impl KnownAttribute for DeprecatedAttribute {
    fn decode(_bytes: Bytes, _constant_pool: &ConstantPool) -> Result<Self> {
        Ok(DeprecatedAttribute)
    }

    fn id() -> &'static str {
        "Deprecated"
    }
}

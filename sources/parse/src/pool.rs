use std::rc::Rc;

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;
use parking_lot::RwLock;
use support::{
    descriptor::{is_field_descriptor, is_method_descriptor},
    identifier::{is_valid_java_identifier, is_valid_method_name},
    numeric::{double_from_bits, float_from_bits, join_halves},
    utf8,
};

use crate::{
    classfile::{Addressed, Resolvable},
    constants::*,
    result::ParseError,
};

pub type Entries = Rc<RwLock<Vec<ConstantEntry>>>;

/// The constant pool of one class. Indices are 1-based, slot `n` lives at `entries[n - 1]`.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    pub entries: Entries,
    count: u16,
}

impl ConstantPool {
    /// `count` is the declared pool count, one more than the number of slots.
    pub fn new(count: u16) -> Self {
        Self {
            entries: Rc::new(RwLock::new(Vec::with_capacity(count.saturating_sub(1) as usize))),
            count,
        }
    }

    pub fn insert(&mut self, entry: ConstantEntry) {
        let mut pool = self.entries.write();
        pool.push(entry)
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: u16) -> Option<ConstantEntry> {
        let pool = self.entries.read();
        pool.get((index as usize).checked_sub(1)?).cloned()
    }

    /// A typed view of slot `index`. Nothing is checked until it is resolved.
    pub fn address<T>(&self, for_index: u16) -> Addressed<T> {
        Addressed::from(for_index, Rc::clone(&self.entries))
    }

    /// Every index an entry may carry: nonzero and below the declared count.
    pub fn is_valid_index(&self, index: u16) -> bool {
        index != 0 && index < self.count
    }

    /// Slots paired with their pool index, phantom slots included.
    pub fn indexed(&self) -> Vec<(u16, ConstantEntry)> {
        let pool = self.entries.read();
        pool.iter()
            .enumerate()
            .map(|(position, entry)| (position as u16 + 1, entry.clone()))
            .collect()
    }

    /// Confirm every reference in the pool points at an entry of the right kind, and that
    /// names and descriptors follow their grammars. `checked` tracks the entry under test.
    pub(crate) fn check_validity(&self, checked: &mut u16) -> Result<(), ParseError> {
        let entries = self.entries.read();

        for (position, entry) in entries.iter().enumerate() {
            *checked = position as u16 + 1;

            match entry {
                ConstantEntry::Class(data) => {
                    let name =
                        utf8_at(&entries, data.name.index()).ok_or(ParseError::InvalidNameIndex)?;

                    if !is_valid_java_identifier(&name.bytes, true) {
                        return Err(ParseError::InvalidNameIndex);
                    }
                }
                ConstantEntry::String(data) => {
                    utf8_at(&entries, data.string.index()).ok_or(ParseError::InvalidStringIndex)?;
                }
                ConstantEntry::Field(data) => check_member(
                    &entries,
                    data.class.index(),
                    data.name_and_type.index(),
                    MemberKind::Field,
                )?,
                ConstantEntry::Method(data) => check_member(
                    &entries,
                    data.class.index(),
                    data.name_and_type.index(),
                    MemberKind::Method,
                )?,
                ConstantEntry::InterfaceMethod(data) => check_member(
                    &entries,
                    data.class.index(),
                    data.name_and_type.index(),
                    MemberKind::Method,
                )?,
                ConstantEntry::NameAndType(data) => {
                    utf8_at(&entries, data.name.index())
                        .ok_or(ParseError::InvalidNameAndTypeIndex)?;
                    utf8_at(&entries, data.descriptor.index())
                        .ok_or(ParseError::InvalidNameAndTypeIndex)?;
                }
                ConstantEntry::MethodHandle(data) => {
                    let target = entry_at(&entries, data.reference_index)
                        .ok_or(ParseError::InvalidConstantPoolIndex(data.reference_index))?;

                    let fits = match data.reference_kind {
                        1..=4 => matches!(target, ConstantEntry::Field(_)),
                        5 | 8 => matches!(target, ConstantEntry::Method(_)),
                        6 | 7 => matches!(
                            target,
                            ConstantEntry::Method(_) | ConstantEntry::InterfaceMethod(_)
                        ),
                        9 => matches!(target, ConstantEntry::InterfaceMethod(_)),
                        _ => false,
                    };

                    if !fits {
                        return Err(ParseError::InvalidConstantPoolIndex(data.reference_index));
                    }
                }
                ConstantEntry::MethodType(data) => {
                    let descriptor = utf8_at(&entries, data.descriptor.index())
                        .ok_or(ParseError::InvalidMethodDescriptorIndex)?;

                    if !is_method_descriptor(&descriptor.bytes) {
                        return Err(ParseError::InvalidMethodDescriptorIndex);
                    }
                }
                ConstantEntry::InvokeDynamic(data) => {
                    entry_at(&entries, data.name_and_type.index())
                        .and_then(|e| e.as_name_and_type())
                        .ok_or(ParseError::InvalidNameAndTypeIndex)?;
                }
                ConstantEntry::Integer(_)
                | ConstantEntry::Float(_)
                | ConstantEntry::Long(_)
                | ConstantEntry::Double(_)
                | ConstantEntry::Utf8(_)
                | ConstantEntry::Reserved => {}
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Method,
}

fn entry_at(entries: &[ConstantEntry], index: u16) -> Option<&ConstantEntry> {
    entries.get((index as usize).checked_sub(1)?)
}

fn utf8_at(entries: &[ConstantEntry], index: u16) -> Option<&ConstantUtf8> {
    entry_at(entries, index)?.as_utf8()
}

fn check_member(
    entries: &[ConstantEntry],
    class_index: u16,
    name_and_type_index: u16,
    kind: MemberKind,
) -> Result<(), ParseError> {
    let class = entry_at(entries, class_index)
        .and_then(|e| e.as_class())
        .ok_or(ParseError::InvalidClassIndex)?;

    let class_name = utf8_at(entries, class.name.index()).ok_or(ParseError::InvalidClassIndex)?;
    if !is_valid_java_identifier(&class_name.bytes, true) {
        return Err(ParseError::InvalidClassIndex);
    }

    let name_and_type = entry_at(entries, name_and_type_index)
        .and_then(|e| e.as_name_and_type())
        .ok_or(ParseError::InvalidNameAndTypeIndex)?;

    let name = utf8_at(entries, name_and_type.name.index()).ok_or(ParseError::InvalidNameIndex)?;
    let name_ok = match kind {
        MemberKind::Field => is_valid_java_identifier(&name.bytes, false),
        MemberKind::Method => is_valid_method_name(&name.bytes),
    };

    if !name_ok {
        return Err(ParseError::InvalidNameIndex);
    }

    let (descriptor_ok, error) = match kind {
        MemberKind::Field => (
            utf8_at(entries, name_and_type.descriptor.index())
                .map(|d| is_field_descriptor(&d.bytes)),
            ParseError::InvalidFieldDescriptorIndex,
        ),
        MemberKind::Method => (
            utf8_at(entries, name_and_type.descriptor.index())
                .map(|d| is_method_descriptor(&d.bytes)),
            ParseError::InvalidMethodDescriptorIndex,
        ),
    };

    if descriptor_ok != Some(true) {
        return Err(error);
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConstantClass {
    pub name: Addressed<ConstantUtf8>,
}

impl ConstantClass {
    pub fn try_name(&self) -> Result<String> {
        self.name.try_resolve()?.try_string()
    }
}

macro_rules! member_ref {
    ($name: ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            pub class: Addressed<ConstantClass>,
            pub name_and_type: Addressed<ConstantNameAndType>,
        }

        impl $name {
            /// Owning class name, member name and descriptor.
            pub fn try_parts(&self) -> Result<(String, String, String)> {
                let class = self.class.try_resolve()?.try_name()?;
                let name_and_type = self.name_and_type.try_resolve()?;

                Ok((
                    class,
                    name_and_type.try_name()?,
                    name_and_type.try_descriptor()?,
                ))
            }
        }
    };
}

member_ref!(ConstantField);
member_ref!(ConstantMethod);
member_ref!(ConstantInterfaceMethod);

#[derive(Debug, Clone)]
pub struct ConstantString {
    pub string: Addressed<ConstantUtf8>,
}

impl ConstantString {
    pub fn try_string(&self) -> Result<String> {
        self.string.try_resolve()?.try_string()
    }
}

#[derive(Debug, Clone)]
pub struct ConstantInteger {
    pub bytes: u32,
}

impl ConstantInteger {
    pub fn value(&self) -> i32 {
        self.bytes as i32
    }
}

#[derive(Debug, Clone)]
pub struct ConstantFloat {
    pub bytes: u32,
}

impl ConstantFloat {
    pub fn value(&self) -> f32 {
        float_from_bits(self.bytes)
    }
}

#[derive(Debug, Clone)]
pub struct ConstantLong {
    pub high: u32,
    pub low: u32,
}

impl ConstantLong {
    pub fn value(&self) -> i64 {
        join_halves(self.high, self.low) as i64
    }
}

#[derive(Debug, Clone)]
pub struct ConstantDouble {
    pub high: u32,
    pub low: u32,
}

impl ConstantDouble {
    pub fn value(&self) -> f64 {
        double_from_bits(join_halves(self.high, self.low))
    }
}

#[derive(Debug, Clone)]
pub struct ConstantNameAndType {
    pub name: Addressed<ConstantUtf8>,
    pub descriptor: Addressed<ConstantUtf8>,
}

impl ConstantNameAndType {
    pub fn try_name(&self) -> Result<String> {
        self.name.try_resolve()?.try_string()
    }

    pub fn try_descriptor(&self) -> Result<String> {
        self.descriptor.try_resolve()?.try_string()
    }
}

#[derive(Debug, Clone)]
pub struct ConstantUtf8 {
    pub bytes: Vec<u8>,
}

impl ConstantUtf8 {
    pub fn try_string(&self) -> Result<String> {
        utf8::decode(&self.bytes)
    }

    pub fn to_ascii(&self, capacity: usize) -> String {
        utf8::to_ascii(&self.bytes, capacity)
    }

    pub fn eq_str(&self, other: &str) -> bool {
        utf8::eq_ascii(&self.bytes, other)
    }
}

#[derive(Debug, Clone)]
pub struct ConstantMethodHandle {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Debug, Clone)]
pub struct ConstantMethodType {
    pub descriptor: Addressed<ConstantUtf8>,
}

#[derive(Debug, Clone)]
pub struct ConstantInvokeDynamic {
    pub bootstrap_method_index: u16,
    pub name_and_type: Addressed<ConstantNameAndType>,
}

#[derive(EnumAsInner, Clone, Debug)]
pub enum ConstantEntry {
    Class(ConstantClass),
    Field(ConstantField),
    Method(ConstantMethod),
    InterfaceMethod(ConstantInterfaceMethod),
    String(ConstantString),
    Integer(ConstantInteger),
    Float(ConstantFloat),
    Long(ConstantLong),
    Double(ConstantDouble),
    NameAndType(ConstantNameAndType),
    Utf8(ConstantUtf8),
    MethodHandle(ConstantMethodHandle),
    MethodType(ConstantMethodType),
    InvokeDynamic(ConstantInvokeDynamic),
    /// The unreadable second slot of a long or double.
    Reserved,
}

impl ConstantEntry {
    pub fn tag(&self) -> Option<u8> {
        let tag = match self {
            ConstantEntry::Class(_) => TAG_CLASS,
            ConstantEntry::Field(_) => TAG_FIELD,
            ConstantEntry::Method(_) => TAG_METHOD,
            ConstantEntry::InterfaceMethod(_) => TAG_INTERFACE_METHOD,
            ConstantEntry::String(_) => TAG_STRING,
            ConstantEntry::Integer(_) => TAG_INTEGER,
            ConstantEntry::Float(_) => TAG_FLOAT,
            ConstantEntry::Long(_) => TAG_LONG,
            ConstantEntry::Double(_) => TAG_DOUBLE,
            ConstantEntry::NameAndType(_) => TAG_NAME_AND_TYPE,
            ConstantEntry::Utf8(_) => TAG_UTF8,
            ConstantEntry::MethodHandle(_) => TAG_METHOD_HANDLE,
            ConstantEntry::MethodType(_) => TAG_METHOD_TYPE,
            ConstantEntry::InvokeDynamic(_) => TAG_INVOKE_DYNAMIC,
            ConstantEntry::Reserved => return None,
        };

        Some(tag)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstantEntry::Class(_) => "Class",
            ConstantEntry::Field(_) => "Fieldref",
            ConstantEntry::Method(_) => "Methodref",
            ConstantEntry::InterfaceMethod(_) => "InterfaceMethodref",
            ConstantEntry::String(_) => "String",
            ConstantEntry::Integer(_) => "Integer",
            ConstantEntry::Float(_) => "Float",
            ConstantEntry::Long(_) => "Long",
            ConstantEntry::Double(_) => "Double",
            ConstantEntry::NameAndType(_) => "NameAndType",
            ConstantEntry::Utf8(_) => "Utf8",
            ConstantEntry::MethodHandle(_) => "MethodHandle",
            ConstantEntry::MethodType(_) => "MethodType",
            ConstantEntry::InvokeDynamic(_) => "InvokeDynamic",
            ConstantEntry::Reserved => "(reserved)",
        }
    }

    /// Long and double take the slot after them too.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantEntry::Long(_) | ConstantEntry::Double(_))
    }
}

impl Resolvable<ConstantEntry> for Addressed<ConstantEntry> {
    fn try_resolve(&self) -> Result<ConstantEntry> {
        let pool = self.entries.read();
        let value = (self.index() as usize)
            .checked_sub(1)
            .and_then(|position| pool.get(position))
            .ok_or_else(|| anyhow!("no constant pool entry at #{}", self.index()))?;

        Ok(value.clone())
    }
}

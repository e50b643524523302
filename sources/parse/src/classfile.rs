use std::{fmt, marker::PhantomData, path::Path, rc::Rc};

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use support::utf8;

use crate::{
    attributes::{Attributes, CodeAttribute},
    flags::{ClassFileAccessFlags, FieldAccessFlags, MethodAccessFlags},
    pool::{
        ConstantClass, ConstantEntry, ConstantField, ConstantInterfaceMethod, ConstantMethod,
        ConstantNameAndType, ConstantPool, ConstantString, ConstantUtf8,
    },
    result::ParseError,
};

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub constant_pool: ConstantPool,
    pub meta_data: MetaData,

    pub access_flags: ClassFileAccessFlags,
    pub this_class: Addressed<ConstantClass>,
    pub super_class: Option<Addressed<ConstantClass>>,

    pub interfaces: Interfaces,
    pub fields: Fields,
    pub methods: Methods,
    pub attributes: Attributes,

    /// Slots taken by static fields (long and double take two).
    pub static_field_count: u16,
    /// Slots taken by instance fields declared here, not counting inherited ones.
    pub instance_field_count: u16,
}

impl ClassFile {
    pub fn name(&self) -> Result<String> {
        self.this_class.try_resolve()?.try_name()
    }

    pub fn super_class_name(&self) -> Result<Option<String>> {
        self.super_class
            .as_ref()
            .map(|class| class.try_resolve()?.try_name())
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.interfaces
            .iter()
            .map(|class| class.try_resolve()?.try_name())
            .collect()
    }

    /// The class name's last `/` segment must equal the file's base name.
    pub fn check_file_name(&self, path: &Path) -> Result<(), ParseError> {
        let class_name = self
            .name()
            .map_err(|_| ParseError::InvalidThisClassIndex)?;

        let file_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let simple_name = class_name.rsplit('/').next().unwrap_or(&class_name);

        if simple_name != file_name {
            return Err(ParseError::ClassNameFileNameMismatch {
                class_name,
                file_name,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub flags: FieldAccessFlags,
    pub name: Addressed<ConstantUtf8>,
    pub descriptor: Addressed<ConstantUtf8>,
    pub attributes: Attributes,
    /// Slot within the static or instance area, depending on the flags.
    pub offset: u16,
}

impl Field {
    pub fn try_name(&self) -> Result<String> {
        self.name.try_resolve()?.try_string()
    }

    pub fn try_descriptor(&self) -> Result<String> {
        self.descriptor.try_resolve()?.try_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fields {
    pub(crate) values: Vec<Field>,
}

impl Fields {
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn locate(&self, name: &str, descriptor: &str) -> Option<&Field> {
        self.values.iter().find(|f| matches_key(&f.name, &f.descriptor, name, descriptor))
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub flags: MethodAccessFlags,
    pub name: Addressed<ConstantUtf8>,
    pub descriptor: Addressed<ConstantUtf8>,
    pub attributes: Attributes,
}

impl Method {
    pub fn try_name(&self) -> Result<String> {
        self.name.try_resolve()?.try_string()
    }

    pub fn try_descriptor(&self) -> Result<String> {
        self.descriptor.try_resolve()?.try_string()
    }

    /// Abstract and native methods carry no code.
    pub fn code(&self, constant_pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        self.attributes.find(constant_pool)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Methods {
    pub(crate) values: Vec<Method>,
}

impl Methods {
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn locate(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.values.iter().find(|m| matches_key(&m.name, &m.descriptor, name, descriptor))
    }
}

fn matches_key(
    name: &Addressed<ConstantUtf8>,
    descriptor: &Addressed<ConstantUtf8>,
    want_name: &str,
    want_descriptor: &str,
) -> bool {
    // Compared in encoded form, no decoding of the pool side
    let eq = |addressed: &Addressed<ConstantUtf8>, want: &str| {
        addressed
            .try_resolve()
            .map(|utf8| utf8::eq_bytes(&utf8.bytes, &utf8::encode(want)))
            .unwrap_or(false)
    };

    eq(name, want_name) && eq(descriptor, want_descriptor)
}

#[derive(Debug, Clone, Default)]
pub struct Interfaces {
    pub(crate) values: Vec<Addressed<ConstantClass>>,
}

impl Interfaces {
    pub fn iter(&self) -> impl Iterator<Item = &Addressed<ConstantClass>> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaData {
    pub minor_version: u16,
    pub major_version: u16,
}

/// A pool index tagged with the entry kind it is expected to hold.
#[derive(Clone)]
pub struct Addressed<T> {
    phantom: PhantomData<T>,

    index: u16,
    pub(crate) entries: Rc<RwLock<Vec<ConstantEntry>>>,
}

impl<T> Addressed<T> {
    pub fn from(index: u16, pool: Rc<RwLock<Vec<ConstantEntry>>>) -> Self {
        Self {
            phantom: PhantomData,
            index,
            entries: pool,
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }
}

impl<T> fmt::Debug for Addressed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addressed {{ {} }}", self.index)
    }
}

pub trait Resolvable<T> {
    fn try_resolve(&self) -> Result<T>;
}

macro_rules! address {
    ($type: ty, $enum: ident) => {
        impl Resolvable<$type> for Addressed<$type> {
            fn try_resolve(&self) -> anyhow::Result<$type> {
                let entries = self.entries.read();
                let value = (self.index as usize)
                    .checked_sub(1)
                    .and_then(|position| entries.get(position))
                    .ok_or_else(|| anyhow!("no constant pool entry at #{}", self.index))?;

                match value {
                    ConstantEntry::$enum(data) => Ok(data.clone()),
                    _ => Err(anyhow!(
                        "expected {} at #{} but found {}",
                        stringify!($enum),
                        self.index,
                        value.kind_name()
                    )),
                }
            }
        }
    };
}

address!(ConstantClass, Class);
address!(ConstantField, Field);
address!(ConstantMethod, Method);
address!(ConstantInterfaceMethod, InterfaceMethod);
address!(ConstantNameAndType, NameAndType);
address!(ConstantString, String);
address!(ConstantUtf8, Utf8);

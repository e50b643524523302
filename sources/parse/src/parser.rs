use std::path::Path;

use bytes::Bytes;
use paste::paste;
use support::{
    bytes_ext::SafeBuf,
    descriptor::{is_field_descriptor, is_method_descriptor},
    identifier::{is_valid_java_identifier, is_valid_method_name},
    utf8,
};
use tracing::{debug, trace};

use crate::attributes::Attributes;
use crate::classfile::{
    Addressed, ClassFile, Resolvable, Field, Fields, Interfaces, MetaData, Method, Methods,
};
use crate::constants::*;
use crate::flags::{ClassFileAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::pool::{
    ConstantClass, ConstantDouble, ConstantEntry, ConstantField, ConstantFloat, ConstantInteger,
    ConstantInterfaceMethod, ConstantInvokeDynamic, ConstantLong, ConstantMethod,
    ConstantMethodHandle, ConstantMethodType, ConstantNameAndType, ConstantPool, ConstantString,
    ConstantUtf8,
};
use crate::result::{ParseError, ParseFailure, ParseResult, ParseState, Progress};

/// Read a big-endian integer, failing with `$eof` when the input runs out.
macro_rules! read {
    ($self: ident, $ty: ident, $eof: expr) => {
        paste! { $self.bytes.[<safe_get_ $ty>]().map_err(|_| $eof)? }
    };
}

/// Read a u2 pool index that must be nonzero and inside the pool.
macro_rules! index {
    ($self: ident, $pool: ident) => {{
        let index = read!($self, u16, ParseError::UnexpectedEofReadingConstantPool);
        if !$pool.is_valid_index(index) {
            return Err(ParseError::InvalidConstantPoolIndex(index));
        }
        index
    }};
}

pub struct Parser {
    bytes: Bytes,
    total: usize,
    progress: Progress,
}

/// Read and parse the class file at `path`.
pub fn parse_file(path: &Path) -> ParseResult {
    let data = std::fs::read(path).map_err(|err| {
        ParseFailure::new(
            ParseError::FileCouldNotBeOpened(format!("{}: {}", path.display(), err)),
            Progress::default(),
        )
    })?;

    Parser::new(&data).parse()
}

impl Parser {
    pub fn new(data: &[u8]) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            total: bytes.len(),
            bytes,
            progress: Progress::default(),
        }
    }

    fn enter(&mut self, state: ParseState) {
        trace!("parser entering state {:?}", state);
        self.progress.state = state;
    }

    fn parse_constant_pool(&mut self) -> Result<ConstantPool, ParseError> {
        let count = read!(self, u16, ParseError::UnexpectedEof);
        if count == 0 {
            return Err(ParseError::InvalidConstantPoolCount);
        }

        self.progress.constant_pool_count = count;
        let mut pool = ConstantPool::new(count);

        let mut i = 1;
        self.progress.constant_pool_entries_read = 1;

        while i < count {
            let tag = read!(self, u8, ParseError::UnexpectedEofReadingConstantPool);
            self.progress.last_tag = Some(tag);

            let entry = match tag {
                TAG_CLASS => ConstantEntry::Class(ConstantClass {
                    name: pool.address(index!(self, pool)),
                }),
                TAG_FIELD => ConstantEntry::Field(ConstantField {
                    class: pool.address(index!(self, pool)),
                    name_and_type: pool.address(index!(self, pool)),
                }),
                TAG_METHOD => ConstantEntry::Method(ConstantMethod {
                    class: pool.address(index!(self, pool)),
                    name_and_type: pool.address(index!(self, pool)),
                }),
                TAG_INTERFACE_METHOD => ConstantEntry::InterfaceMethod(ConstantInterfaceMethod {
                    class: pool.address(index!(self, pool)),
                    name_and_type: pool.address(index!(self, pool)),
                }),
                TAG_STRING => ConstantEntry::String(ConstantString {
                    string: pool.address(index!(self, pool)),
                }),
                TAG_INTEGER => ConstantEntry::Integer(ConstantInteger {
                    bytes: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                }),
                TAG_FLOAT => ConstantEntry::Float(ConstantFloat {
                    bytes: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                }),
                TAG_LONG => ConstantEntry::Long(ConstantLong {
                    high: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                    low: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                }),
                TAG_DOUBLE => ConstantEntry::Double(ConstantDouble {
                    high: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                    low: read!(self, u32, ParseError::UnexpectedEofReadingConstantPool),
                }),
                TAG_NAME_AND_TYPE => ConstantEntry::NameAndType(ConstantNameAndType {
                    name: pool.address(index!(self, pool)),
                    descriptor: pool.address(index!(self, pool)),
                }),
                TAG_UTF8 => {
                    let length = read!(self, u16, ParseError::UnexpectedEofReadingUtf8);
                    let bytes = self
                        .bytes
                        .safe_get_bytes(length as usize)
                        .map_err(|_| ParseError::UnexpectedEofReadingUtf8)?;

                    if !bytes.iter().all(|b| utf8::is_valid_byte(*b)) {
                        return Err(ParseError::InvalidUtf8Bytes);
                    }

                    ConstantEntry::Utf8(ConstantUtf8 { bytes })
                }
                TAG_METHOD_HANDLE => ConstantEntry::MethodHandle(ConstantMethodHandle {
                    reference_kind: read!(self, u8, ParseError::UnexpectedEofReadingConstantPool),
                    reference_index: index!(self, pool),
                }),
                TAG_METHOD_TYPE => ConstantEntry::MethodType(ConstantMethodType {
                    descriptor: pool.address(index!(self, pool)),
                }),
                TAG_INVOKE_DYNAMIC => ConstantEntry::InvokeDynamic(ConstantInvokeDynamic {
                    // indexes the BootstrapMethods attribute, not the pool
                    bootstrap_method_index: read!(
                        self,
                        u16,
                        ParseError::UnexpectedEofReadingConstantPool
                    ),
                    name_and_type: pool.address(index!(self, pool)),
                }),
                _ => return Err(ParseError::UnknownConstantPoolTag(tag)),
            };

            let should_reserve_next = entry.is_wide();
            pool.insert(entry);
            i += 1;

            // 64 bit constants take up 2 slots, the second is never addressable
            if should_reserve_next {
                if i >= count {
                    return Err(ParseError::InvalidConstantPoolCount);
                }

                pool.insert(ConstantEntry::Reserved);
                i += 1;
            }

            self.progress.constant_pool_entries_read = i;
        }

        Ok(pool)
    }

    fn parse_attributes(&mut self, pool: &ConstantPool) -> Result<Attributes, ParseError> {
        let mut read = 0;
        self.progress.attribute_in_progress = Some(0);

        let result = Attributes::parse(&mut self.bytes, pool, &mut read);
        self.progress.attribute_in_progress = Some(read);

        let attributes = result?;
        self.progress.attribute_in_progress = None;

        Ok(attributes)
    }

    fn parse_interfaces(&mut self, pool: &ConstantPool) -> Result<Interfaces, ParseError> {
        let length = read!(self, u16, ParseError::UnexpectedEofReadingInterfaces);
        self.progress.interface_count = length;

        let mut interfaces = Interfaces {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let index = read!(self, u16, ParseError::UnexpectedEofReadingInterfaces);

            if !pool.is_valid_index(index) || !matches!(pool.get(index), Some(ConstantEntry::Class(_))) {
                return Err(ParseError::InvalidInterfaceIndex);
            }

            interfaces.values.push(pool.address(index));
            self.progress.interfaces_read += 1;
        }

        Ok(interfaces)
    }

    /// Read a name index that must be a Utf8 entry accepted by `valid`.
    fn read_name(
        &mut self,
        pool: &ConstantPool,
        valid: fn(&[u8]) -> bool,
        error: ParseError,
    ) -> Result<Addressed<ConstantUtf8>, ParseError> {
        let index = read!(self, u16, ParseError::UnexpectedEof);

        match pool.get(index) {
            Some(ConstantEntry::Utf8(utf8)) if pool.is_valid_index(index) && valid(&utf8.bytes) => {
                Ok(pool.address(index))
            }
            _ => Err(error),
        }
    }

    fn parse_fields(
        &mut self,
        pool: &ConstantPool,
        in_interface: bool,
    ) -> Result<(Fields, u16, u16), ParseError> {
        let length = read!(self, u16, ParseError::UnexpectedEof);
        self.progress.field_count = length;

        let mut fields = Fields {
            values: Vec::with_capacity(length.into()),
        };

        let mut static_count: u16 = 0;
        let mut instance_count: u16 = 0;

        for _ in 0..length {
            let flags = FieldAccessFlags::from_bits(read!(self, u16, ParseError::UnexpectedEof));
            flags.validate(in_interface)?;

            let name = self.read_name(
                pool,
                |b| is_valid_java_identifier(b, false),
                ParseError::InvalidNameIndex,
            )?;
            let descriptor = self.read_name(
                pool,
                is_field_descriptor,
                ParseError::InvalidFieldDescriptorIndex,
            )?;

            let attributes = self.parse_attributes(pool)?;

            let slots = field_slots(&descriptor);

            let counter = if flags.is_static() {
                &mut static_count
            } else {
                &mut instance_count
            };
            let offset = *counter;
            *counter = counter
                .checked_add(slots)
                .ok_or(ParseError::TooManyFieldSlots)?;

            fields.values.push(Field {
                flags,
                name,
                descriptor,
                attributes,
                offset,
            });

            self.progress.fields_read += 1;
        }

        Ok((fields, static_count, instance_count))
    }

    fn parse_methods(&mut self, pool: &ConstantPool) -> Result<Methods, ParseError> {
        let length = read!(self, u16, ParseError::UnexpectedEof);
        self.progress.method_count = length;

        let mut methods = Methods {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let flags = MethodAccessFlags::from_bits(read!(self, u16, ParseError::UnexpectedEof));
            flags.validate()?;

            let name = self.read_name(pool, is_valid_method_name, ParseError::InvalidNameIndex)?;
            let descriptor = self.read_name(
                pool,
                is_method_descriptor,
                ParseError::InvalidMethodDescriptorIndex,
            )?;

            let attributes = self.parse_attributes(pool)?;

            methods.values.push(Method {
                flags,
                name,
                descriptor,
                attributes,
            });

            self.progress.methods_read += 1;
        }

        Ok(methods)
    }

    fn parse_class(&mut self) -> Result<ClassFile, ParseError> {
        self.enter(ParseState::ReadingHeader);
        let magic = read!(self, u32, ParseError::UnexpectedEof);

        if magic != MAGIC {
            return Err(ParseError::InvalidSignature(magic));
        }

        let minor = read!(self, u16, ParseError::UnexpectedEof);
        let major = read!(self, u16, ParseError::UnexpectedEof);

        if !SUPPORTED_MAJOR_VERSIONS.contains(&major) {
            return Err(ParseError::UnsupportedVersion { major, minor });
        }

        let meta_data = MetaData {
            minor_version: minor,
            major_version: major,
        };

        self.enter(ParseState::ReadingConstantPool);
        let constant_pool = self.parse_constant_pool()?;

        // references may point forwards, so kinds are only checked once the pool is whole
        self.enter(ParseState::ValidatingPool);
        constant_pool.check_validity(&mut self.progress.validity_entries_checked)?;

        self.enter(ParseState::ReadingClassMeta);
        let access_flags = ClassFileAccessFlags::from_bits(read!(self, u16, ParseError::UnexpectedEof));
        access_flags.validate()?;

        let this_index = read!(self, u16, ParseError::UnexpectedEof);
        if !constant_pool.is_valid_index(this_index)
            || !matches!(constant_pool.get(this_index), Some(ConstantEntry::Class(_)))
        {
            return Err(ParseError::InvalidThisClassIndex);
        }
        let this_class: Addressed<ConstantClass> = constant_pool.address(this_index);

        let super_index = read!(self, u16, ParseError::UnexpectedEof);
        let super_class = if super_index == 0 {
            None
        } else if constant_pool.is_valid_index(super_index)
            && matches!(constant_pool.get(super_index), Some(ConstantEntry::Class(_)))
        {
            Some(constant_pool.address(super_index))
        } else {
            return Err(ParseError::InvalidSuperClassIndex);
        };

        self.enter(ParseState::ReadingInterfaces);
        let interfaces = self.parse_interfaces(&constant_pool)?;

        self.enter(ParseState::ReadingFields);
        let (fields, static_field_count, instance_field_count) =
            self.parse_fields(&constant_pool, access_flags.is_interface())?;

        self.enter(ParseState::ReadingMethods);
        let methods = self.parse_methods(&constant_pool)?;

        self.enter(ParseState::ReadingAttributes);
        if let Some(count) = self.bytes.get(0..2) {
            self.progress.attribute_count = u16::from_be_bytes([count[0], count[1]]);
        }
        let attributes = self.parse_attributes(&constant_pool);
        self.progress.attributes_read = self.progress.attribute_in_progress.unwrap_or(self.progress.attribute_count);
        let attributes = attributes?;

        if !self.bytes.is_empty() {
            return Err(ParseError::FileContainsUnexpectedData);
        }

        self.enter(ParseState::Done);

        Ok(ClassFile {
            constant_pool,
            meta_data,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            static_field_count,
            instance_field_count,
        })
    }

    pub fn parse(&mut self) -> ParseResult {
        let result = self.parse_class();
        self.progress.bytes_read = self.total - self.bytes.len();

        match result {
            Ok(class) => {
                debug!(
                    "parsed class file ({} bytes, {} pool entries)",
                    self.progress.bytes_read,
                    class.constant_pool.len()
                );
                Ok(class)
            }
            Err(error) => Err(ParseFailure::new(error, self.progress.clone())),
        }
    }
}

/// Long and double fields take two slots.
fn field_slots(descriptor: &Addressed<ConstantUtf8>) -> u16 {
    let first = descriptor
        .try_resolve()
        .ok()
        .and_then(|utf8| utf8.bytes.first().copied());

    match first {
        Some(b'J') | Some(b'D') => 2,
        _ => 1,
    }
}

use std::fmt;

use thiserror::Error;

use crate::classfile::ClassFile;

pub type ParseResult = Result<ClassFile, ParseFailure>;

/// Why a class file was rejected. The first failure ends the parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("file could not be opened ({0})")]
    FileCouldNotBeOpened(String),
    #[error("invalid signature {0:#010X}")]
    InvalidSignature(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("class name '{class_name}' does not match file name '{file_name}'")]
    ClassNameFileNameMismatch {
        class_name: String,
        file_name: String,
    },
    #[error("invalid constant pool count")]
    InvalidConstantPoolCount,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unexpected end of file while reading the constant pool")]
    UnexpectedEofReadingConstantPool,
    #[error("unexpected end of file while reading a utf8 entry")]
    UnexpectedEofReadingUtf8,
    #[error("unexpected end of file while reading interfaces")]
    UnexpectedEofReadingInterfaces,
    #[error("unexpected end of file while reading attribute info")]
    UnexpectedEofReadingAttributeInfo,
    #[error("invalid utf8 bytes in constant pool")]
    InvalidUtf8Bytes,
    #[error("invalid constant pool index #{0}")]
    InvalidConstantPoolIndex(u16),
    #[error("unknown constant pool tag {0}")]
    UnknownConstantPoolTag(u8),
    #[error("invalid combination of access flags")]
    InvalidAccessFlags,
    #[error("use of reserved class access flags")]
    ReservedClassAccessFlags,
    #[error("use of reserved method access flags")]
    ReservedMethodAccessFlags,
    #[error("use of reserved field access flags")]
    ReservedFieldAccessFlags,
    #[error("invalid this class index")]
    InvalidThisClassIndex,
    #[error("invalid super class index")]
    InvalidSuperClassIndex,
    #[error("invalid interface index")]
    InvalidInterfaceIndex,
    #[error("invalid field descriptor index")]
    InvalidFieldDescriptorIndex,
    #[error("invalid method descriptor index")]
    InvalidMethodDescriptorIndex,
    #[error("invalid name index")]
    InvalidNameIndex,
    #[error("invalid string index")]
    InvalidStringIndex,
    #[error("invalid class index")]
    InvalidClassIndex,
    #[error("invalid name and type index")]
    InvalidNameAndTypeIndex,
    #[error("invalid java identifier")]
    InvalidJavaIdentifier,
    #[error("fields need more than 65535 slots")]
    TooManyFieldSlots,
    #[error("file contains unexpected data after the end of the class")]
    FileContainsUnexpectedData,
}

/// Where the parser is. Each state is entered only after the previous one finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    Unopened,
    ReadingHeader,
    ReadingConstantPool,
    ValidatingPool,
    ReadingClassMeta,
    ReadingInterfaces,
    ReadingFields,
    ReadingMethods,
    ReadingAttributes,
    Done,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseState::Unopened => "opening the file",
            ParseState::ReadingHeader => "reading the header",
            ParseState::ReadingConstantPool => "reading the constant pool",
            ParseState::ValidatingPool => "validating the constant pool",
            ParseState::ReadingClassMeta => "reading class access flags and indices",
            ParseState::ReadingInterfaces => "reading interfaces",
            ParseState::ReadingFields => "reading fields",
            ParseState::ReadingMethods => "reading methods",
            ParseState::ReadingAttributes => "reading class attributes",
            ParseState::Done => "done",
        };

        write!(f, "{name}")
    }
}

/// How far a parse got. Counts are of fully read items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub state: ParseState,
    pub bytes_read: usize,
    pub last_tag: Option<u8>,

    pub constant_pool_count: u16,
    /// Pool slots filled, counting index 0 and the phantom slot after long/double.
    pub constant_pool_entries_read: u16,
    pub validity_entries_checked: u16,

    pub interface_count: u16,
    pub interfaces_read: u16,
    pub field_count: u16,
    pub fields_read: u16,
    pub method_count: u16,
    pub methods_read: u16,
    pub attribute_count: u16,
    pub attributes_read: u16,

    /// Attributes read from the list currently being parsed, if one is in progress.
    pub attribute_in_progress: Option<u16>,
}

/// A rejected class file together with the progress made before the failure.
#[derive(Error, Debug, Clone)]
pub struct ParseFailure {
    #[source]
    pub error: ParseError,
    pub progress: Progress,
}

impl ParseFailure {
    pub fn new(error: ParseError, progress: Progress) -> Self {
        Self { error, progress }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.progress;

        writeln!(f, "failed while {} ({} bytes read)", p.state, p.bytes_read)?;

        match p.state {
            ParseState::ReadingConstantPool => {
                write!(
                    f,
                    "Failed to read constant pool entry at index #{}",
                    p.constant_pool_entries_read
                )?;
                if let Some(tag) = p.last_tag {
                    write!(f, " (last tag read: {tag})")?;
                }
                writeln!(f)?;
            }
            ParseState::ValidatingPool => writeln!(
                f,
                "Failed to check constant pool validity. Entry at index #{} is not valid.",
                p.validity_entries_checked
            )?,
            ParseState::ReadingInterfaces => writeln!(
                f,
                "Failed to read interface at index #{} of {}",
                p.interfaces_read, p.interface_count
            )?,
            ParseState::ReadingFields | ParseState::ReadingMethods => {
                let (kind, read, count) = if p.state == ParseState::ReadingFields {
                    ("field", p.fields_read, p.field_count)
                } else {
                    ("method", p.methods_read, p.method_count)
                };

                writeln!(f, "Failed to read {kind} at index #{read} of {count}")?;
                if let Some(attribute) = p.attribute_in_progress {
                    writeln!(f, "Failed to read its attribute at index {attribute}.")?;
                }
            }
            ParseState::ReadingAttributes => writeln!(
                f,
                "Failed to read attribute at index #{} of {}",
                p.attributes_read, p.attribute_count
            )?,
            _ => {}
        }

        write!(f, "Status description: {}.", self.error)
    }
}

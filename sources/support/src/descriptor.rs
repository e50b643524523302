use std::{fmt, iter::Peekable, str::Chars};

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;

use crate::{identifier, utf8};

/// Consume one field descriptor from the front of `bytes`.
///
/// Leading `[` dimensions are unbounded. The element is one of `B C D F I J S Z` or
/// `L<name>;` with a non-empty name, which is checked against the class identifier
/// grammar when `check_identifier` is set. Returns the number of bytes consumed.
pub fn read_field_descriptor(bytes: &[u8], check_identifier: bool) -> Option<usize> {
    let mut consumed = 0;

    let element = loop {
        let (ch, used) = utf8::next_char(&bytes[consumed..])?;
        consumed += used;

        if ch != '[' as u32 {
            break ch;
        }
    };

    match char::from_u32(element)? {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => Some(consumed),
        'L' => {
            let name_start = consumed;

            loop {
                let (ch, used) = utf8::next_char(&bytes[consumed..])?;
                consumed += used;

                if ch == ';' as u32 {
                    break;
                }
            }

            let name = &bytes[name_start..consumed - 1];
            if name.is_empty() {
                return None;
            }

            if check_identifier && !identifier::is_valid_java_identifier(name, true) {
                return None;
            }

            Some(consumed)
        }
        _ => None,
    }
}

/// Consume a whole method descriptor: `(` field descriptors `)` then `V` or a field
/// descriptor. Anything left over after the return type is a failure.
pub fn read_method_descriptor(bytes: &[u8], check_identifier: bool) -> Option<usize> {
    let (open, mut consumed) = utf8::next_char(bytes)?;
    if open != '(' as u32 {
        return None;
    }

    loop {
        if let Some(used) = read_field_descriptor(&bytes[consumed..], check_identifier) {
            consumed += used;
            continue;
        }

        let (close, used) = utf8::next_char(&bytes[consumed..])?;
        if close != ')' as u32 {
            return None;
        }

        consumed += used;
        break;
    }

    match read_field_descriptor(&bytes[consumed..], check_identifier) {
        Some(used) => consumed += used,
        None => {
            let (ret, used) = utf8::next_char(&bytes[consumed..])?;
            if ret != 'V' as u32 {
                return None;
            }

            consumed += used;
        }
    }

    (consumed == bytes.len()).then_some(consumed)
}

pub fn is_field_descriptor(bytes: &[u8]) -> bool {
    read_field_descriptor(bytes, true) == Some(bytes.len())
}

pub fn is_method_descriptor(bytes: &[u8]) -> bool {
    read_method_descriptor(bytes, true).is_some()
}

/// <BaseType> ::= 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z'
#[derive(EnumAsInner, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BaseType {
    Boolean, // Z
    Char,    // C
    Float,   // F
    Double,  // D
    Byte,    // B
    Short,   // S
    Int,     // I
    Long,    // J
    Void,    // V
}

impl BaseType {
    pub fn from_char(ch: char) -> Option<Self> {
        Some(match ch {
            'Z' => BaseType::Boolean,
            'C' => BaseType::Char,
            'F' => BaseType::Float,
            'D' => BaseType::Double,
            'B' => BaseType::Byte,
            'S' => BaseType::Short,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'V' => BaseType::Void,
            _ => return None,
        })
    }

    pub fn as_char(&self) -> char {
        match self {
            BaseType::Boolean => 'Z',
            BaseType::Char => 'C',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
            BaseType::Byte => 'B',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Void => 'V',
        }
    }

    /// Operand stack cells a value of this type occupies.
    pub fn slots(&self) -> usize {
        match self {
            BaseType::Long | BaseType::Double => 2,
            BaseType::Void => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// <ObjectType> ::= 'L' <ClassName> ';'
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ObjectType {
    pub class_name: String,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{};", self.class_name)
    }
}

/// <ArrayType> ::= '[' <FieldType>
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ArrayType {
    pub field_type: Box<FieldType>,
}

impl ArrayType {
    /// The innermost non-array component.
    pub fn element(&self) -> &FieldType {
        let mut ty = self.field_type.as_ref();
        while let FieldType::Array(inner) = ty {
            ty = inner.field_type.as_ref();
        }
        ty
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.field_type)
    }
}

#[derive(EnumAsInner, Debug, PartialEq, Eq, Hash, Clone)]
pub enum FieldType {
    Base(BaseType),
    Object(ObjectType),
    Array(ArrayType),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => base.fmt(f),
            FieldType::Object(object) => object.fmt(f),
            FieldType::Array(array) => array.fmt(f),
        }
    }
}

impl FieldType {
    fn parse_from_iterator(chars: &mut Peekable<Chars>) -> Result<Self> {
        let first = chars.next().ok_or(anyhow!("no more chars"))?;

        Ok(match first {
            '[' => FieldType::Array(ArrayType {
                field_type: Box::new(FieldType::parse_from_iterator(chars)?),
            }),
            'L' => {
                let mut class_name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(ch) => class_name.push(ch),
                        None => return Err(anyhow!("unterminated class name")),
                    }
                }

                if class_name.is_empty() {
                    return Err(anyhow!("empty class name"));
                }

                FieldType::Object(ObjectType { class_name })
            }
            ch => match BaseType::from_char(ch) {
                Some(base) => FieldType::Base(base),
                None => return Err(anyhow!("unknown type {first}")),
            },
        })
    }

    pub fn parse(str: &str) -> Result<Self> {
        let mut chars = str.chars().peekable();
        let ty = FieldType::parse_from_iterator(&mut chars)?;

        if ty.is_void() {
            return Err(anyhow!("void is not a field type"));
        }

        if chars.next().is_some() {
            return Err(anyhow!("trailing characters in field descriptor {str}"));
        }

        Ok(ty)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, FieldType::Base(BaseType::Void))
    }

    pub fn slots(&self) -> usize {
        match self {
            FieldType::Base(base) => base.slots(),
            _ => 1,
        }
    }

    /// Every class this type mentions, including array element classes.
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            FieldType::Object(object) => Some(&object.class_name),
            FieldType::Array(array) => array.element().referenced_class(),
            FieldType::Base(_) => None,
        }
    }
}

/// <MethodType> ::= '(' { <FieldType> } ')' <FieldType>
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MethodType {
    pub parameters: Vec<FieldType>,
    pub return_type: FieldType,
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl MethodType {
    pub fn parse(str: &str) -> Result<Self> {
        let mut chars = str.chars().peekable();
        if chars.next() != Some('(') {
            return Err(anyhow!("descriptor did not start with ("));
        }

        let mut parameters = Vec::new();

        while chars.peek() != Some(&')') {
            let parameter = FieldType::parse_from_iterator(&mut chars)?;
            if parameter.is_void() {
                return Err(anyhow!("void parameter in {str}"));
            }

            parameters.push(parameter);
        }

        // Skip )
        chars.next();

        let return_type = FieldType::parse_from_iterator(&mut chars)?;

        if chars.next().is_some() {
            return Err(anyhow!("trailing characters in method descriptor {str}"));
        }

        Ok(MethodType {
            parameters,
            return_type,
        })
    }

    /// Local variable slots the arguments occupy (long and double take two).
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> usize {
        self.return_type.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reads_field_descriptors() {
        assert_eq!(read_field_descriptor(b"I", true), Some(1));
        assert_eq!(read_field_descriptor(b"[I", true), Some(2));
        assert_eq!(read_field_descriptor(b"[[Ljava/lang/String;", true), Some(20));
        // only the first descriptor is consumed
        assert_eq!(read_field_descriptor(b"IJ", true), Some(1));
    }

    #[test]
    fn it_rejects_bad_field_descriptors() {
        assert_eq!(read_field_descriptor(b"Q", true), None);
        assert_eq!(read_field_descriptor(b"L;", true), None);
        assert_eq!(read_field_descriptor(b"Ljava/lang/String", true), None);
        assert_eq!(read_field_descriptor(b"[", true), None);
        assert_eq!(read_field_descriptor(b"", true), None);
        assert_eq!(read_field_descriptor(b"L1bad;", true), None);
        assert_eq!(read_field_descriptor(b"L1bad;", false), Some(6));
        assert!(!is_field_descriptor(b"II"));
    }

    #[test]
    fn it_reads_method_descriptors() {
        assert!(is_method_descriptor(b"(I)V"));
        assert!(is_method_descriptor(b"()Ljava/lang/Object;"));
        assert!(is_method_descriptor(b"([I[J)D"));
        assert!(is_method_descriptor(b"([Ljava/lang/String;)V"));
    }

    #[test]
    fn it_rejects_bad_method_descriptors() {
        assert!(!is_method_descriptor(b"(I"));
        assert!(!is_method_descriptor(b"(I)VV"));
        assert!(!is_method_descriptor(b"I)V"));
        assert!(!is_method_descriptor(b"(V)V"));
        assert!(!is_method_descriptor(b"()"));
    }

    #[test]
    fn it_parses_simple_descriptors() -> Result<()> {
        let descriptor = FieldType::parse("Z")?;
        let descriptor = descriptor.into_base().unwrap();

        assert_eq!(descriptor, BaseType::Boolean);

        Ok(())
    }

    #[test]
    fn it_parses_array_descriptors() -> Result<()> {
        let descriptor = FieldType::parse("[[D")?;
        let descriptor = descriptor.into_array().unwrap();

        assert_eq!(descriptor.element(), &FieldType::Base(BaseType::Double));
        assert_eq!(descriptor.to_string(), "[[D");

        Ok(())
    }

    #[test]
    fn it_parses_method_descriptors() -> Result<()> {
        let descriptor = MethodType::parse("(IDLjava/lang/Thread;)Ljava/lang/Object;")?;
        assert_eq!(
            descriptor.parameters,
            vec![
                FieldType::Base(BaseType::Int),
                FieldType::Base(BaseType::Double),
                FieldType::Object(ObjectType {
                    class_name: "java/lang/Thread".to_string()
                })
            ]
        );

        assert_eq!(
            descriptor.return_type,
            FieldType::Object(ObjectType {
                class_name: "java/lang/Object".to_string()
            })
        );
        assert_eq!(descriptor.parameter_slots(), 4);
        assert_eq!(descriptor.to_string(), "(IDLjava/lang/Thread;)Ljava/lang/Object;");

        Ok(())
    }

    #[test]
    fn it_rejects_trailing_characters() {
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("V").is_err());
        assert!(MethodType::parse("()VI").is_err());
        assert!(MethodType::parse("(L;)V").is_err());
    }
}

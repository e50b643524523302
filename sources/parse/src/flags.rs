//! Access flags for classes, fields and methods, and the rules on which combinations are legal.
//!
//! Each kind gets a `bitflags` set of the defined bits and a wrapper (generated by
//! `impl_flags!`) that also keeps the raw value, so reserved bits can be reported instead
//! of silently truncated.

use bitflags::bitflags;
use paste::paste;
use tracing::warn;

use crate::result::ParseError;

macro_rules! impl_flags {
    ( $kind:ident, $reserved:ident ) => {
        paste! {
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            pub struct [<$kind AccessFlags>] {
                pub flags: [<$kind AccessFlag>],
                pub raw: u16,
            }

            impl [<$kind AccessFlags>] {
                pub fn from_bits(raw: u16) -> Self {
                    let flags = <[<$kind AccessFlag>]>::from_bits_truncate(raw);

                    if flags.bits() != raw {
                        warn!("unrecognised bits {:b} for {}", raw & !flags.bits(), stringify!([<$kind AccessFlag>]));
                    }

                    Self { flags, raw }
                }

                pub fn has(&self, other: [<$kind AccessFlag>]) -> bool {
                    self.flags.contains(other)
                }

                pub fn has_any(&self, other: [<$kind AccessFlag>]) -> bool {
                    self.flags.intersects(other)
                }

                fn check_reserved(&self) -> Result<(), ParseError> {
                    if self.raw & !<[<$kind AccessFlag>]>::all().bits() != 0 {
                        return Err(ParseError::$reserved);
                    }

                    Ok(())
                }

                /// Names of the set flags, in bit order.
                pub fn names(&self) -> Vec<&'static str> {
                    Self::NAMES
                        .iter()
                        .filter(|(flag, _)| self.flags.contains(*flag))
                        .map(|(_, name)| *name)
                        .collect()
                }
            }
        }
    };
}

bitflags! {
    pub struct ClassFileAccessFlag: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    pub struct FieldAccessFlag: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    pub struct MethodAccessFlag: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

impl_flags!(ClassFile, ReservedClassAccessFlags);
impl_flags!(Field, ReservedFieldAccessFlags);
impl_flags!(Method, ReservedMethodAccessFlags);

fn at_most_one(bits: u16) -> bool {
    bits.count_ones() <= 1
}

impl ClassFileAccessFlags {
    const NAMES: [(ClassFileAccessFlag, &'static str); 8] = [
        (ClassFileAccessFlag::PUBLIC, "public"),
        (ClassFileAccessFlag::FINAL, "final"),
        (ClassFileAccessFlag::SUPER, "super"),
        (ClassFileAccessFlag::INTERFACE, "interface"),
        (ClassFileAccessFlag::ABSTRACT, "abstract"),
        (ClassFileAccessFlag::SYNTHETIC, "synthetic"),
        (ClassFileAccessFlag::ANNOTATION, "annotation"),
        (ClassFileAccessFlag::ENUM, "enum"),
    ];

    pub fn validate(&self) -> Result<(), ParseError> {
        self.check_reserved()?;

        if self.has(ClassFileAccessFlag::INTERFACE) {
            if !self.has(ClassFileAccessFlag::ABSTRACT)
                || self.has_any(ClassFileAccessFlag::FINAL | ClassFileAccessFlag::SUPER)
            {
                return Err(ParseError::InvalidAccessFlags);
            }
        } else if self.has(ClassFileAccessFlag::ANNOTATION) {
            // annotation types are always interfaces
            return Err(ParseError::InvalidAccessFlags);
        }

        if self.has(ClassFileAccessFlag::FINAL) && self.has(ClassFileAccessFlag::ABSTRACT) {
            return Err(ParseError::InvalidAccessFlags);
        }

        Ok(())
    }

    pub fn is_interface(&self) -> bool {
        self.has(ClassFileAccessFlag::INTERFACE)
    }
}

impl FieldAccessFlags {
    const NAMES: [(FieldAccessFlag, &'static str); 9] = [
        (FieldAccessFlag::PUBLIC, "public"),
        (FieldAccessFlag::PRIVATE, "private"),
        (FieldAccessFlag::PROTECTED, "protected"),
        (FieldAccessFlag::STATIC, "static"),
        (FieldAccessFlag::FINAL, "final"),
        (FieldAccessFlag::VOLATILE, "volatile"),
        (FieldAccessFlag::TRANSIENT, "transient"),
        (FieldAccessFlag::SYNTHETIC, "synthetic"),
        (FieldAccessFlag::ENUM, "enum"),
    ];

    /// `in_interface` is whether the declaring class is an interface.
    pub fn validate(&self, in_interface: bool) -> Result<(), ParseError> {
        self.check_reserved()?;

        // abstract is not a field flag, so abstract+final already fails as reserved
        let access = FieldAccessFlag::PUBLIC | FieldAccessFlag::PRIVATE | FieldAccessFlag::PROTECTED;
        if !at_most_one((self.flags & access).bits()) {
            return Err(ParseError::InvalidAccessFlags);
        }

        if self.has(FieldAccessFlag::FINAL) && self.has(FieldAccessFlag::VOLATILE) {
            return Err(ParseError::InvalidAccessFlags);
        }

        if in_interface
            && !self.has(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC | FieldAccessFlag::FINAL)
        {
            return Err(ParseError::InvalidAccessFlags);
        }

        Ok(())
    }

    pub fn is_static(&self) -> bool {
        self.has(FieldAccessFlag::STATIC)
    }
}

impl MethodAccessFlags {
    const NAMES: [(MethodAccessFlag, &'static str); 12] = [
        (MethodAccessFlag::PUBLIC, "public"),
        (MethodAccessFlag::PRIVATE, "private"),
        (MethodAccessFlag::PROTECTED, "protected"),
        (MethodAccessFlag::STATIC, "static"),
        (MethodAccessFlag::FINAL, "final"),
        (MethodAccessFlag::SYNCHRONIZED, "synchronized"),
        (MethodAccessFlag::BRIDGE, "bridge"),
        (MethodAccessFlag::VARARGS, "varargs"),
        (MethodAccessFlag::NATIVE, "native"),
        (MethodAccessFlag::ABSTRACT, "abstract"),
        (MethodAccessFlag::STRICT, "strict"),
        (MethodAccessFlag::SYNTHETIC, "synthetic"),
    ];

    pub fn validate(&self) -> Result<(), ParseError> {
        self.check_reserved()?;

        let excluded_by_abstract = MethodAccessFlag::FINAL
            | MethodAccessFlag::NATIVE
            | MethodAccessFlag::PRIVATE
            | MethodAccessFlag::STATIC
            | MethodAccessFlag::STRICT
            | MethodAccessFlag::SYNCHRONIZED;

        if self.has(MethodAccessFlag::ABSTRACT) && self.has_any(excluded_by_abstract) {
            return Err(ParseError::InvalidAccessFlags);
        }

        let access =
            MethodAccessFlag::PUBLIC | MethodAccessFlag::PRIVATE | MethodAccessFlag::PROTECTED;
        if !at_most_one((self.flags & access).bits()) {
            return Err(ParseError::InvalidAccessFlags);
        }

        Ok(())
    }

    pub fn is_static(&self) -> bool {
        self.has(MethodAccessFlag::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.has(MethodAccessFlag::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.has(MethodAccessFlag::ABSTRACT)
    }
}

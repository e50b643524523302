use std::fmt;

use parse::result::ParseFailure;
use thiserror::Error;

/// The coarse outcome a caller sees once execution stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Ok,
    NoClassLoaded,
    ClassResolutionFailed,
    MethodResolutionFailed,
    FieldResolutionFailed,
    UnknownInstruction,
    OutOfMemory,
    MainMethodNotFound,
    InvalidInstructionParameters,
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            VmStatus::Ok => "ok",
            VmStatus::NoClassLoaded => "no class loaded",
            VmStatus::ClassResolutionFailed => "class resolution failed",
            VmStatus::MethodResolutionFailed => "method resolution failed",
            VmStatus::FieldResolutionFailed => "field resolution failed",
            VmStatus::UnknownInstruction => "unknown instruction",
            VmStatus::OutOfMemory => "out of memory",
            VmStatus::MainMethodNotFound => "main method not found",
            VmStatus::InvalidInstructionParameters => "invalid instruction parameters",
        };

        write!(f, "{description}")
    }
}

#[derive(Error, Debug)]
pub enum VmError {
    #[error("no class has been loaded")]
    NoClassLoaded,

    #[error("could not locate class file for {0}")]
    ClassNotFound(String),

    #[error("could not load class {name}: {failure}")]
    ClassParse {
        name: String,
        #[source]
        failure: ParseFailure,
    },

    #[error("cyclic class hierarchy while resolving {0}")]
    CyclicHierarchy(String),

    #[error("could not resolve method {class_name}.{method}")]
    MethodResolution { class_name: String, method: String },

    #[error("could not resolve field {class_name}.{field}")]
    FieldResolution { class_name: String, field: String },

    #[error("unknown instruction {opcode:#04x} at pc {pc}")]
    UnknownInstruction { opcode: u8, pc: usize },

    #[error("instruction {name} ({opcode:#04x}) is not supported")]
    UnsupportedInstruction { opcode: u8, name: &'static str },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("call depth exceeded the limit of {0} frames")]
    StackOverflow(usize),

    #[error("no static main([Ljava/lang/String;)V in {0}")]
    MainMethodNotFound(String),

    #[error("invalid instruction parameters: {0}")]
    InvalidInstructionParameters(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl VmError {
    pub fn status(&self) -> VmStatus {
        match self {
            VmError::NoClassLoaded => VmStatus::NoClassLoaded,
            VmError::ClassNotFound(_) | VmError::ClassParse { .. } | VmError::CyclicHierarchy(_) => {
                VmStatus::ClassResolutionFailed
            }
            VmError::MethodResolution { .. } => VmStatus::MethodResolutionFailed,
            VmError::FieldResolution { .. } => VmStatus::FieldResolutionFailed,
            VmError::UnknownInstruction { .. } | VmError::UnsupportedInstruction { .. } => {
                VmStatus::UnknownInstruction
            }
            VmError::OutOfMemory(_) | VmError::StackOverflow(_) => VmStatus::OutOfMemory,
            VmError::MainMethodNotFound(_) => VmStatus::MainMethodNotFound,
            VmError::InvalidInstructionParameters(_) | VmError::Internal(_) => {
                VmStatus::InvalidInstructionParameters
            }
        }
    }
}

#[macro_export]
macro_rules! internal {
    ($msg:literal $(,)?) => {
        $crate::error::VmError::Internal(anyhow::anyhow!($msg))
    };
    ($err:expr $(,)?) => {
        $crate::error::VmError::Internal(anyhow::anyhow!($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::VmError::Internal(anyhow::anyhow!($fmt, $($arg)*))
    };
}

/// One method on the call path, innermost last.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at {class_name}.{method_name} (pc {pc})")]
pub struct CallSite {
    pub class_name: String,
    pub method_name: String,
    pub pc: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_maps_errors_to_statuses() {
        assert_eq!(
            VmError::UnsupportedInstruction {
                opcode: 0xbb,
                name: "new"
            }
            .status(),
            VmStatus::UnknownInstruction
        );
        assert_eq!(VmError::StackOverflow(8).status(), VmStatus::OutOfMemory);
        assert_eq!(
            VmError::CyclicHierarchy("A".into()).status(),
            VmStatus::ClassResolutionFailed
        );
        assert_eq!(
            internal!("operand stack underflow").status(),
            VmStatus::InvalidInstructionParameters
        );
    }

    #[test]
    fn it_formats_call_sites() {
        let site = CallSite {
            class_name: "Demo".into(),
            method_name: "main".into(),
            pc: 4,
        };

        assert_eq!(site.to_string(), "at Demo.main (pc 4)");
    }
}

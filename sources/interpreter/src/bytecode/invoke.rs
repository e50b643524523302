use super::{load_store::constant_pool, Instruction, Progression};
use crate::Interpreter;
use parse::{
    classfile::Resolvable,
    pool::{ConstantEntry, ConstantInterfaceMethod, ConstantMethod},
};
use runtime::{error::VmError, internal, native::NativeFunction, stack::Frame};
use tracing::debug;

/// Class, name and descriptor of the method an invoke instruction names. Static methods on
/// interfaces are referenced through an InterfaceMethodref.
fn method_parts(frame: &Frame, index: u16) -> Result<(String, String, String), VmError> {
    let pool = constant_pool(frame)?;

    let parts = match pool.get(index) {
        Some(ConstantEntry::Method(_)) => pool
            .address::<ConstantMethod>(index)
            .try_resolve()?
            .try_parts()?,
        Some(ConstantEntry::InterfaceMethod(_)) => pool
            .address::<ConstantInterfaceMethod>(index)
            .try_resolve()?
            .try_parts()?,
        other => {
            return Err(internal!(
                "expected a method reference at #{}, got {:?}",
                index,
                other
            ))
        }
    };

    Ok(parts)
}

#[derive(Debug)]
pub struct InvokeStatic {
    pub(crate) index: u16,
}

impl Instruction for InvokeStatic {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let (class_name, name, descriptor) = method_parts(frame, self.index)?;
        let class = vm.class_loader().resolve_class(&class_name)?;

        // Host classes only have native methods
        if class.is_host() {
            let native = vm
                .vm
                .natives
                .lookup(&class.name, &name, &descriptor)
                .filter(NativeFunction::is_static)
                .ok_or_else(|| VmError::MethodResolution {
                    class_name: class.name.clone(),
                    method: format!("{}{}", name, descriptor),
                })?;

            vm.initialise_class(&class)?;
            debug!("Calling native {}.{}{}", class.name, name, descriptor);
            (native.method())(frame, &mut vm.vm)?;

            return Ok(Progression::Next);
        }

        let (declaring, method) = vm
            .class_loader()
            .resolve_method(&class, &name, &descriptor)?;

        if !method.is_static() {
            return Err(VmError::MethodResolution {
                class_name: declaring.name.clone(),
                method: format!("{}{} (not static)", name, descriptor),
            });
        }

        vm.initialise_class(&declaring)?;
        vm.invoke(frame, declaring, method)?;

        Ok(Progression::Next)
    }
}

/// Only native instance methods can be called; there is no virtual dispatch to interpreted
/// code.
#[derive(Debug)]
pub struct InvokeVirtual {
    pub(crate) index: u16,
}

impl Instruction for InvokeVirtual {
    fn handle(&self, vm: &mut Interpreter, frame: &mut Frame) -> Result<Progression, VmError> {
        let (class_name, name, descriptor) = method_parts(frame, self.index)?;
        let class = vm.class_loader().resolve_class(&class_name)?;

        let mut current = Some(class);
        while let Some(candidate) = current {
            let native = vm
                .vm
                .natives
                .lookup(&candidate.name, &name, &descriptor)
                .filter(|native| !native.is_static());

            if let Some(native) = native {
                debug!("Calling native {}.{}{}", candidate.name, name, descriptor);
                (native.method())(frame, &mut vm.vm)?;

                return Ok(Progression::Next);
            }

            current = candidate.super_class.clone();
        }

        Err(VmError::UnsupportedInstruction {
            opcode: 0xb6,
            name: "invokevirtual",
        })
    }
}

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use support::types::{FieldDescriptor, MethodDescriptor};

use crate::{
    error::VmError,
    internal, module_base,
    native::ClassInitHook,
    stack::{Cell, Frame, OperandType},
    static_method,
    vm::VM,
};

use super::{NativeFunction, NativeModule};

module_base!(LangObject);
impl NativeModule for LangObject {
    fn classname(&self) -> &'static str {
        "java/lang/Object"
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction> {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction> {
        &mut self.methods
    }

    fn init(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

module_base!(LangString);
impl NativeModule for LangString {
    fn classname(&self) -> &'static str {
        "java/lang/String"
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction> {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction> {
        &mut self.methods
    }

    fn init(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

module_base!(LangSystem);
impl NativeModule for LangSystem {
    fn classname(&self) -> &'static str {
        "java/lang/System"
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction> {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction> {
        &mut self.methods
    }

    fn static_fields(&self) -> Vec<FieldDescriptor> {
        ("out", "Ljava/io/PrintStream;")
            .try_into()
            .map(|field| vec![field])
            .unwrap_or_default()
    }

    fn class_init(&self) -> Option<ClassInitHook> {
        fn init_out(vm: &mut VM) -> Result<(), VmError> {
            let system = vm.class_loader.resolve_class("java/lang/System")?;
            vm.class_loader.resolve_class("java/io/PrintStream")?;

            let out = system
                .field("out", "Ljava/io/PrintStream;")
                .cloned()
                .ok_or_else(|| internal!("java/lang/System has no out field"))?;

            let stream = vm.heap.alloc_instance("java/io/PrintStream", vec![])?;
            system.set_static(&out, &[Cell::reference(stream, OperandType::ObjectRef)])
        }

        Some(init_out)
    }

    fn init(&mut self) -> Result<(), VmError> {
        fn current_time_millis(frame: &mut Frame, _: &mut VM) -> Result<(), VmError> {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| internal!(e))?
                .as_millis();

            frame.operands.push_long(millis as i64)?;
            Ok(())
        }

        self.set_method(
            ("currentTimeMillis", "()J"),
            static_method!(current_time_millis),
        )
    }
}

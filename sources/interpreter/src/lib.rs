use std::{path::Path, rc::Rc};

use bytes::Buf;
use crate::bytecode::{constant_cells, constant_fits, decode_instruction, Progression};
use parse::{
    attributes::ConstantValueAttribute,
    classfile::Resolvable,
    constants::CLASS_INITIALISER,
    parser::parse_file,
    result::ParseError,
};
use runtime::{
    error::{CallSite, VmError},
    heap::Heap,
    internal,
    loader::{ClassLoader, InitState, LoadedClass, LoadedMethod},
    stack::{Cell, Frame, Locals, OperandType},
    vm::VM,
};
use tracing::{debug, info, warn};

pub mod bytecode;

/// The class a program starts from, as loaded by [`Interpreter::load_entry`].
#[derive(Debug)]
pub struct EntryClass {
    pub class: Rc<LoadedClass>,
    /// Set when the class name does not match the file it came from.
    pub name_mismatch: Option<ParseError>,
}

pub struct Interpreter {
    pub vm: VM,
}

impl Interpreter {
    pub fn new(vm: VM) -> Self {
        Self { vm }
    }

    pub fn class_loader(&mut self) -> &mut ClassLoader {
        &mut self.vm.class_loader
    }

    pub fn heap(&mut self) -> &mut Heap {
        &mut self.vm.heap
    }

    /// Call stack of the last failed execution, innermost call first.
    pub fn take_trace(&mut self) -> Option<Vec<CallSite>> {
        self.vm.take_trace()
    }

    /// Execute the frame's method from its current pc until it returns.
    pub fn run(&mut self, frame: &mut Frame) -> Result<Vec<Cell>, VmError> {
        let code = frame
            .method
            .code
            .as_ref()
            .map(|code| code.code.clone())
            .ok_or_else(|| internal!("{}.{} has no code", frame.class.name, frame.method.name))?;

        while frame.pc < code.len() {
            if let Some(site) = self.vm.frames_mut().last_mut() {
                site.pc = frame.pc;
            }

            let mut instruction_bytes = code.slice(frame.pc..);
            let consumed_bytes_prev = instruction_bytes.remaining();

            let instruction = decode_instruction(&mut instruction_bytes, frame.pc)?;
            let bytes_consumed_by_opcode = consumed_bytes_prev - instruction_bytes.remaining();
            debug!("{:>5}: {:?}", frame.pc, instruction);

            // If the instruction doesn't want us to jump anywhere, proceed to the next instruction
            match instruction.handle(self, frame)? {
                Progression::JumpAbs(new_pc) => {
                    frame.pc = jump_target(new_pc as i64, code.len())?;
                }
                Progression::JumpRel(offset) => {
                    frame.pc = jump_target(frame.pc as i64 + offset as i64, code.len())?;
                }
                Progression::Next => {
                    frame.pc += bytes_consumed_by_opcode;
                }
                Progression::Return(return_value) => {
                    let expected = frame.method.ty.return_slots();
                    if return_value.len() != expected {
                        return Err(internal!(
                            "{}.{}{} returned {} cells, expected {}",
                            frame.class.name,
                            frame.method.name,
                            frame.method.descriptor,
                            return_value.len(),
                            expected
                        ));
                    }

                    return Ok(return_value);
                }
            };
        }

        Err(internal!(
            "execution ran off the end of {}.{}",
            frame.class.name,
            frame.method.name
        ))
    }

    /// Run an interpreted method with `args` as its first local slots. The call is recorded on
    /// the VM's call stack, and a failure leaves its trace behind.
    pub fn run_method(
        &mut self,
        class: Rc<LoadedClass>,
        method: Rc<LoadedMethod>,
        args: Vec<Cell>,
    ) -> Result<Vec<Cell>, VmError> {
        self.vm.push_frame(CallSite {
            class_name: class.name.clone(),
            method_name: method.name.clone(),
            pc: 0,
        })?;

        let result = self.enter(class, method, args);
        if result.is_err() {
            self.vm.record_failure();
        }

        self.vm.pop_frame();
        result
    }

    fn enter(
        &mut self,
        class: Rc<LoadedClass>,
        method: Rc<LoadedMethod>,
        args: Vec<Cell>,
    ) -> Result<Vec<Cell>, VmError> {
        let code = method.code.as_ref().ok_or_else(|| VmError::MethodResolution {
            class_name: class.name.clone(),
            method: format!("{}{} (no code)", method.name, method.descriptor),
        })?;

        let locals = Locals::with_arguments(args, code.max_locals as usize)?;
        let max_stack = code.max_stack as usize;
        let mut frame = Frame::new(class, method, locals, max_stack);

        self.run(&mut frame)
    }

    /// Call `method` from `caller`: pop its arguments off the caller's operand stack and push
    /// what it returns.
    pub fn invoke(
        &mut self,
        caller: &mut Frame,
        class: Rc<LoadedClass>,
        method: Rc<LoadedMethod>,
    ) -> Result<(), VmError> {
        if method.is_native() {
            let native = self
                .vm
                .natives
                .lookup(&class.name, &method.name, &method.descriptor)
                .ok_or_else(|| VmError::MethodResolution {
                    class_name: class.name.clone(),
                    method: format!("{}{} (no native binding)", method.name, method.descriptor),
                })?;

            debug!("Calling native {}.{}{}", class.name, method.name, method.descriptor);
            return (native.method())(caller, &mut self.vm);
        }

        let args = caller.operands.pop_cells(method.ty.parameter_slots())?;
        let result = self.run_method(class, method, args)?;
        caller.operands.push_all(&result)?;

        Ok(())
    }

    /// Run static initialisation for `class` once: superclass first, then `ConstantValue`
    /// fields, then `<clinit>` (or the native hook of a host class).
    pub fn initialise_class(&mut self, class: &Rc<LoadedClass>) -> Result<(), VmError> {
        if class.init_state() != InitState::Uninitialised {
            return Ok(());
        }

        info!("Initialising {}", class.name);
        class.set_init_state(InitState::Initialising);
        class.allocate_statics();

        if let Some(super_class) = &class.super_class {
            self.initialise_class(super_class)?;
        }

        match &class.class_file {
            Some(class_file) => {
                for field in class.fields.iter().filter(|f| f.is_static) {
                    let source = field
                        .source_index
                        .and_then(|index| class_file.fields.iter().nth(index));

                    let constant = match source {
                        Some(source) => source
                            .attributes
                            .find::<ConstantValueAttribute>(&class_file.constant_pool)?,
                        None => None,
                    };

                    if let Some(constant) = constant {
                        let entry = constant.value.try_resolve()?;
                        if !constant_fits(&field.ty, &entry) {
                            return Err(VmError::FieldResolution {
                                class_name: class.name.clone(),
                                field: format!(
                                    "{}:{} (ConstantValue is a {})",
                                    field.name,
                                    field.descriptor,
                                    entry.kind_name()
                                ),
                            });
                        }

                        let cells = constant_cells(&entry, &mut self.vm)?;
                        class.set_static(field, &cells)?;
                    }
                }

                if let Some(clinit) = class.method(CLASS_INITIALISER, "()V") {
                    self.run_method(Rc::clone(class), clinit, vec![])?;
                } else {
                    debug!("No {} in {}", CLASS_INITIALISER, class.name);
                }
            }
            None => {
                if let Some(hook) = self.vm.natives.class_init(&class.name) {
                    hook(&mut self.vm)?;
                }
            }
        }

        class.set_init_state(InitState::Initialised);
        Ok(())
    }

    /// Parse the class at `path`, add its directory as a search root, and link it.
    pub fn load_entry(&mut self, path: &Path) -> Result<EntryClass, VmError> {
        let class_file = parse_file(path).map_err(|failure| VmError::ClassParse {
            name: path.display().to_string(),
            failure,
        })?;

        let name_mismatch = class_file.check_file_name(path).err();
        if let Some(mismatch) = &name_mismatch {
            warn!("{}", mismatch);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.class_loader().add_path(parent);
        }

        let name = class_file.name()?;
        let class = match self.class_loader().get(&name) {
            Some(class) => class,
            None => self.class_loader().link(&name, class_file)?,
        };

        Ok(EntryClass {
            class,
            name_mismatch,
        })
    }

    /// Run `main([Ljava/lang/String;)V` of the named class, or of the class loaded last.
    pub fn execute_main(&mut self, class_name: Option<&str>) -> Result<(), VmError> {
        // A trace left over from an earlier run would shadow this one's
        self.vm.take_trace();

        let class = match class_name {
            Some(name) => self.class_loader().resolve_class(name)?,
            None => self
                .class_loader()
                .last_loaded()
                .ok_or(VmError::NoClassLoaded)?,
        };

        self.initialise_class(&class)?;

        let main = class
            .method("main", "([Ljava/lang/String;)V")
            .filter(|method| method.is_static())
            .ok_or_else(|| VmError::MainMethodNotFound(class.name.clone()))?;

        info!("Executing {}.main", class.name);
        let args = self.heap().alloc_object_array("java/lang/String", 0)?;
        self.run_method(
            class,
            main,
            vec![Cell::reference(args, OperandType::ArrayRef)],
        )?;

        Ok(())
    }
}

fn jump_target(target: i64, code_len: usize) -> Result<usize, VmError> {
    if target < 0 || target as usize >= code_len {
        return Err(VmError::InvalidInstructionParameters(format!(
            "jump to {} outside code of length {}",
            target, code_len
        )));
    }

    Ok(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_bounds_jumps_to_the_code() {
        assert_eq!(jump_target(0, 4).ok(), Some(0));
        assert_eq!(jump_target(3, 4).ok(), Some(3));
        assert!(jump_target(4, 4).is_err());
        assert!(jump_target(-1, 4).is_err());
    }

    #[test]
    fn it_reports_no_class_loaded() -> Result<(), VmError> {
        let mut interpreter = Interpreter::new(VM::new(Default::default())?);

        assert!(matches!(
            interpreter.execute_main(None),
            Err(VmError::NoClassLoaded)
        ));
        Ok(())
    }

    #[test]
    fn it_runs_the_system_init_hook_once() -> Result<(), VmError> {
        let mut interpreter = Interpreter::new(VM::new(Default::default())?);
        let system = interpreter.class_loader().resolve_class("java/lang/System")?;

        interpreter.initialise_class(&system)?;
        interpreter.initialise_class(&system)?;

        let out = system
            .field("out", "Ljava/io/PrintStream;")
            .cloned()
            .ok_or_else(|| internal!("no out field"))?;
        let stream = system.get_static(&out)?;

        assert_eq!(stream[0].ty, OperandType::ObjectRef);
        // One PrintStream, allocated once
        assert_eq!(interpreter.heap().len(), 1);
        Ok(())
    }
}

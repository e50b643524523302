use std::io::{self, Write};

use tracing::debug;

use crate::{
    error::{CallSite, VmError},
    heap::Heap,
    loader::ClassLoader,
    native::NativeRegistry,
};

/// Limits fixed when the VM boots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootOptions {
    /// Deepest call nesting before a call fails with a stack overflow.
    pub max_stack: usize,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self { max_stack: 256 }
    }
}

pub struct VM {
    pub class_loader: ClassLoader,
    pub heap: Heap,
    pub natives: NativeRegistry,
    pub options: BootOptions,

    /// Where programs print to.
    pub output: Box<dyn Write>,

    frames: Vec<CallSite>,
    last_trace: Option<Vec<CallSite>>,
}

impl VM {
    pub fn new(options: BootOptions) -> Result<Self, VmError> {
        let natives = NativeRegistry::with_builtins()?;
        let mut class_loader = ClassLoader::new();

        for (class_name, static_fields) in natives.host_classes() {
            class_loader.register_host(class_name, static_fields);
        }

        Ok(Self {
            class_loader,
            heap: Heap::new(),
            natives,
            options,
            output: Box::new(io::stdout()),
            frames: vec![],
            last_trace: None,
        })
    }

    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn frames(&self) -> &[CallSite] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut Vec<CallSite> {
        &mut self.frames
    }

    pub fn push_frame(&mut self, site: CallSite) -> Result<(), VmError> {
        if self.frames.len() >= self.options.max_stack {
            return Err(VmError::StackOverflow(self.options.max_stack));
        }

        self.frames.push(site);
        Ok(())
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Keep the current call path as the trace of a failure. The innermost failure wins: outer
    /// frames unwinding the same error leave it alone.
    pub fn record_failure(&mut self) {
        if self.last_trace.is_none() {
            debug!("Recording failure trace at depth {}", self.frames.len());
            self.last_trace = Some(self.frames.clone());
        }
    }

    /// The trace of the last failure, innermost call first.
    pub fn take_trace(&mut self) -> Option<Vec<CallSite>> {
        self.last_trace.take().map(|mut trace| {
            trace.reverse();
            trace
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(method_name: &str, pc: usize) -> CallSite {
        CallSite {
            class_name: "Demo".into(),
            method_name: method_name.into(),
            pc,
        }
    }

    #[test]
    fn it_bounds_call_depth() -> Result<(), VmError> {
        let mut vm = VM::new(BootOptions { max_stack: 2 })?;
        vm.push_frame(site("main", 0))?;
        vm.push_frame(site("f", 0))?;

        assert!(matches!(
            vm.push_frame(site("g", 0)),
            Err(VmError::StackOverflow(2))
        ));

        vm.pop_frame();
        assert_eq!(vm.frames().len(), 1);
        Ok(())
    }

    #[test]
    fn it_keeps_the_innermost_trace() -> Result<(), VmError> {
        let mut vm = VM::new(BootOptions::default())?;
        vm.push_frame(site("main", 3))?;
        vm.push_frame(site("f", 7))?;
        vm.record_failure();

        vm.pop_frame();
        vm.record_failure();

        let trace = vm.take_trace().unwrap_or_default();
        assert_eq!(trace, vec![site("f", 7), site("main", 3)]);
        assert!(vm.take_trace().is_none());
        Ok(())
    }

    #[test]
    fn it_registers_host_classes() -> Result<(), VmError> {
        let mut vm = VM::new(BootOptions::default())?;
        let system = vm.class_loader.resolve_class("java/lang/System")?;

        assert!(system.is_host());
        assert!(system.field("out", "Ljava/io/PrintStream;").is_some());
        Ok(())
    }
}

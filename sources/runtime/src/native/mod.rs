use std::collections::HashMap;

use support::types::{FieldDescriptor, MethodDescriptor};

use crate::{error::VmError, internal, stack::Frame, vm::VM};

pub mod io;
pub mod lang;

/// A host function. It runs against the caller's frame: it pops its own arguments (and the
/// receiver, for instance functions) and pushes its own return cells.
pub type NativeMethod = fn(&mut Frame, &mut VM) -> Result<(), VmError>;

pub type ClassInitHook = fn(&mut VM) -> Result<(), VmError>;

#[derive(Clone, Copy)]
pub enum NativeFunction {
    Static(NativeMethod),
    Instance(NativeMethod),
}

impl NativeFunction {
    pub fn is_static(&self) -> bool {
        matches!(self, NativeFunction::Static(_))
    }

    pub fn method(&self) -> NativeMethod {
        match self {
            NativeFunction::Static(method) | NativeFunction::Instance(method) => *method,
        }
    }
}

pub trait NativeModule {
    fn classname(&self) -> &'static str;

    /// Register the module's methods.
    fn init(&mut self) -> Result<(), VmError>;

    fn static_fields(&self) -> Vec<FieldDescriptor> {
        vec![]
    }

    /// Runs once, when the host class is initialised.
    fn class_init(&self) -> Option<ClassInitHook> {
        None
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction>;
    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction>;

    fn get_method(&self, method: &MethodDescriptor) -> Option<NativeFunction> {
        self.methods().get(method).copied()
    }

    fn set_method(
        &mut self,
        method: (&'static str, &'static str),
        func: NativeFunction,
    ) -> Result<(), VmError> {
        let descriptor: MethodDescriptor = method
            .try_into()
            .map_err(|e| internal!("bad native descriptor {}{}: {}", method.0, method.1, e))?;

        self.methods_mut().insert(descriptor, func);
        Ok(())
    }
}

#[macro_export]
macro_rules! static_method {
    ($method: expr) => {
        NativeFunction::Static($method)
    };
}

#[macro_export]
macro_rules! instance_method {
    ($method: expr) => {
        NativeFunction::Instance($method)
    };
}

#[macro_export]
macro_rules! module_base {
    ($ty: ident) => {
        pub struct $ty {
            methods: HashMap<MethodDescriptor, NativeFunction>,
        }

        impl $ty {
            pub fn new() -> Self {
                Self {
                    methods: HashMap::new(),
                }
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Every native module, keyed by owning class name.
#[derive(Default)]
pub struct NativeRegistry {
    modules: HashMap<&'static str, Box<dyn NativeModule>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the built-in modules installed.
    pub fn with_builtins() -> Result<Self, VmError> {
        let mut registry = Self::new();
        registry.register(lang::LangObject::new())?;
        registry.register(lang::LangString::new())?;
        registry.register(lang::LangSystem::new())?;
        registry.register(io::IOPrintStream::new())?;
        Ok(registry)
    }

    pub fn register(&mut self, mut module: impl NativeModule + 'static) -> Result<(), VmError> {
        module.init()?;
        self.modules.insert(module.classname(), Box::new(module));
        Ok(())
    }

    /// Owning class names with the static fields their modules declare.
    pub fn host_classes(&self) -> Vec<(&'static str, Vec<FieldDescriptor>)> {
        self.modules
            .values()
            .map(|module| (module.classname(), module.static_fields()))
            .collect()
    }

    pub fn has_module(&self, class_name: &str) -> bool {
        self.modules.contains_key(class_name)
    }

    pub fn class_init(&self, class_name: &str) -> Option<ClassInitHook> {
        self.modules.get(class_name)?.class_init()
    }

    pub fn lookup(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<NativeFunction> {
        let module = self.modules.get(class_name)?;
        let method: MethodDescriptor = (name, descriptor).try_into().ok()?;

        module.get_method(&method)
    }
}

#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use interpreter::Interpreter;
use runtime::{
    error::VmError,
    native::{NativeFunction, NativeModule},
    stack::{Frame, OperandType},
    static_method,
    vm::{BootOptions, VM},
};
use support::types::MethodDescriptor;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::util::{builder::ClassBuilder, scratch_dir, write_class};

static CAPTURE_COUNTER: AtomicUsize = AtomicUsize::new(0);
lazy_static::lazy_static! {
    static ref OUTPUT_STATE: Mutex<HashMap<usize, Vec<u8>>> = {
        Mutex::new(HashMap::new())
    };

    static ref CAPTURE_STATE: Mutex<HashMap<String, Vec<Captured>>> = {
        Mutex::new(HashMap::new())
    };
}

/// Program output sink, stored under its capture id.
pub struct CaptureSink {
    id: usize,
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut states = OUTPUT_STATE
            .lock()
            .expect("output lock to be not poisoned");
        states.entry(self.id).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub interpreter: Interpreter,
    output_id: usize,
}

impl Harness {
    pub fn output(&self) -> String {
        let states = OUTPUT_STATE
            .lock()
            .expect("output lock to be not poisoned");
        let bytes = states.get(&self.output_id).cloned().unwrap_or_default();
        String::from_utf8(bytes).expect("output to be utf8")
    }

    pub fn lines(&self) -> Vec<String> {
        self.output().lines().map(|l| l.to_string()).collect()
    }
}

fn init_logging() {
    let format = fmt::format()
        .with_ansi(true)
        .without_time()
        .with_level(true)
        .with_target(false)
        .with_thread_names(false)
        .with_source_location(true)
        .compact();

    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .event_format(format)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn make_vm() -> Harness {
    make_vm_with(BootOptions::default())
}

pub fn make_vm_with(options: BootOptions) -> Harness {
    init_logging();

    let output_id = CAPTURE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let vm = VM::new(options)
        .expect("vm to boot")
        .with_output(Box::new(CaptureSink { id: output_id }));

    Harness {
        interpreter: Interpreter::new(vm),
        output_id,
    }
}

/// Write `class` to a scratch directory, load it as the entry class and run its main.
pub fn run_main(harness: &mut Harness, test_name: &str, class: &ClassBuilder) -> Result<(), VmError> {
    let dir = scratch_dir(test_name).expect("scratch dir to be created");
    let path = write_class(&dir, class).expect("class to be written");

    let entry = harness.interpreter.load_entry(&path)?;
    harness.interpreter.execute_main(Some(&entry.class.name))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Option<String>),
}

fn record(frame: &Frame, value: Captured) {
    let mut states = CAPTURE_STATE
        .lock()
        .expect("capture lock to be not poisoned");
    states.entry(frame.class.name.clone()).or_default().push(value);
}

fn capture_int(frame: &mut Frame, _: &mut VM) -> Result<(), VmError> {
    let value = frame.operands.pop_int()?;
    record(frame, Captured::Int(value));
    Ok(())
}

fn capture_long(frame: &mut Frame, _: &mut VM) -> Result<(), VmError> {
    let value = frame.operands.pop_long()?;
    record(frame, Captured::Long(value));
    Ok(())
}

fn capture_float(frame: &mut Frame, _: &mut VM) -> Result<(), VmError> {
    let value = frame.operands.pop_float()?;
    record(frame, Captured::Float(value));
    Ok(())
}

fn capture_double(frame: &mut Frame, _: &mut VM) -> Result<(), VmError> {
    let value = frame.operands.pop_double()?;
    record(frame, Captured::Double(value));
    Ok(())
}

fn capture_string(frame: &mut Frame, vm: &mut VM) -> Result<(), VmError> {
    let cell = frame.operands.pop_reference()?;
    let value = match cell.ty {
        OperandType::Null => None,
        _ => Some(vm.heap.string(cell.value)?.to_string()),
    };

    record(frame, Captured::Str(value));
    Ok(())
}

/// `capture` natives on the test class. Values are recorded under the calling class.
pub struct TestCaptures {
    class_name: &'static str,
    methods: HashMap<MethodDescriptor, NativeFunction>,
}

impl NativeModule for TestCaptures {
    fn classname(&self) -> &'static str {
        self.class_name
    }

    fn init(&mut self) -> Result<(), VmError> {
        self.set_method(("capture", "(I)V"), static_method!(capture_int))?;
        self.set_method(("capture", "(J)V"), static_method!(capture_long))?;
        self.set_method(("capture", "(F)V"), static_method!(capture_float))?;
        self.set_method(("capture", "(D)V"), static_method!(capture_double))?;
        self.set_method(
            ("capture", "(Ljava/lang/String;)V"),
            static_method!(capture_string),
        )
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction> {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction> {
        &mut self.methods
    }
}

pub fn attach_captures(harness: &mut Harness, class_name: &str) {
    let module = TestCaptures {
        // Leaking is fine, the module lives for the whole test
        class_name: class_name.to_string().leak(),
        methods: HashMap::new(),
    };

    harness
        .interpreter
        .vm
        .natives
        .register(module)
        .expect("capture module to register");

    CAPTURE_STATE
        .lock()
        .expect("capture lock to be not poisoned")
        .insert(class_name.to_string(), vec![]);
}

pub fn get_captures(class_name: &str) -> Vec<Captured> {
    CAPTURE_STATE
        .lock()
        .expect("capture lock to be not poisoned")
        .get(class_name)
        .cloned()
        .expect("captures to be attached")
}

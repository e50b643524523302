mod common;
mod util;

use common::{make_vm, make_vm_with, run_main};
use runtime::{
    error::{CallSite, VmError, VmStatus},
    vm::BootOptions,
};
use util::builder::{ClassBuilder, Code, ACC_STATIC};

fn main_only(name: &str, max_stack: u16, code: Code) -> ClassBuilder {
    let mut class = ClassBuilder::new(name);
    class.main(max_stack, 1, code.bytes());
    class
}

#[test]
fn division_by_zero_leaves_a_trace() {
    let class = main_only(
        "Divide",
        2,
        Code::new()
            .op(0x04) // iconst_1
            .op(0x03) // iconst_0
            .op(0x6c) // idiv
            .op(0xb1),
    );

    let mut harness = make_vm();
    let err = run_main(&mut harness, "divide", &class).expect_err("division to fail");

    assert!(matches!(err, VmError::InvalidInstructionParameters(_)));
    assert_eq!(err.status(), VmStatus::InvalidInstructionParameters);

    let trace = harness.interpreter.take_trace().expect("a trace");
    assert_eq!(
        trace,
        vec![CallSite {
            class_name: "Divide".to_string(),
            method_name: "main".to_string(),
            pc: 2,
        }]
    );
    assert_eq!(trace[0].to_string(), "at Divide.main (pc 2)");

    // taking the trace clears it
    assert!(harness.interpreter.take_trace().is_none());
}

#[test]
fn object_creation_is_unsupported() {
    let mut class = ClassBuilder::new("Allocates");
    let object = class.class("java/lang/Object");
    class.main(
        2,
        1,
        Code::new().op(0xbb).u2(object).op(0x57).op(0xb1).bytes(),
    );

    let mut harness = make_vm();
    let err = run_main(&mut harness, "allocates", &class).expect_err("new to fail");

    assert!(matches!(
        err,
        VmError::UnsupportedInstruction {
            opcode: 0xbb,
            ..
        }
    ));
    assert_eq!(err.status(), VmStatus::UnknownInstruction);
}

#[test]
fn unknown_opcode_is_reported_with_its_pc() {
    let class = main_only("Unknown", 1, Code::new().op(0x00).op(0xcb).op(0xb1));

    let mut harness = make_vm();
    let err = run_main(&mut harness, "unknown_opcode", &class).expect_err("decode to fail");

    assert!(matches!(
        err,
        VmError::UnknownInstruction {
            opcode: 0xcb,
            pc: 1
        }
    ));
    assert_eq!(err.status(), VmStatus::UnknownInstruction);
}

#[test]
fn unbounded_recursion_overflows() {
    let mut class = ClassBuilder::new("Recurse");
    let f = class.method_ref("Recurse", "f", "()V");

    let body = Code::new().op(0xb8).u2(f).op(0xb1);
    class.method(ACC_STATIC, "f", "()V", 0, 0, body.bytes());
    class.main(0, 1, body.bytes());

    let mut harness = make_vm_with(BootOptions { max_stack: 16 });
    let err = run_main(&mut harness, "recurse", &class).expect_err("recursion to overflow");

    assert!(matches!(err, VmError::StackOverflow(16)));
    assert_eq!(err.status(), VmStatus::OutOfMemory);

    let trace = harness.interpreter.take_trace().expect("a trace");
    assert_eq!(trace.len(), 16);
    assert_eq!(trace[0].method_name, "f");
    assert_eq!(trace[15].method_name, "main");
}

#[test]
fn missing_main_is_reported() {
    let mut class = ClassBuilder::new("NoMain");
    class.method(ACC_STATIC, "helper", "()V", 0, 0, &[0xb1]);

    let mut harness = make_vm();
    let err = run_main(&mut harness, "missing_main", &class).expect_err("main to be missing");

    assert!(matches!(err, VmError::MainMethodNotFound(_)));
    assert_eq!(err.status(), VmStatus::MainMethodNotFound);
}

#[test]
fn missing_class_fails_resolution() {
    let mut class = ClassBuilder::new("NeedsMissing");
    let field = class.field_ref("DoesNotExist", "x", "I");
    class.main(1, 1, Code::new().op(0xb2).u2(field).op(0x57).op(0xb1).bytes());

    let mut harness = make_vm();
    let err = run_main(&mut harness, "missing_class", &class).expect_err("resolution to fail");

    assert!(matches!(err, VmError::ClassNotFound(ref name) if name == "DoesNotExist"));
    assert_eq!(err.status(), VmStatus::ClassResolutionFailed);
}

#[test]
fn missing_members_fail_resolution() {
    let mut class = ClassBuilder::new("NeedsMethod");
    let method = class.method_ref("NeedsMethod", "absent", "()V");
    class.main(0, 1, Code::new().op(0xb8).u2(method).op(0xb1).bytes());

    let mut harness = make_vm();
    let err = run_main(&mut harness, "missing_method", &class).expect_err("resolution to fail");

    assert!(matches!(err, VmError::MethodResolution { .. }));
    assert_eq!(err.status(), VmStatus::MethodResolutionFailed);

    let mut class = ClassBuilder::new("NeedsField");
    let field = class.field_ref("NeedsField", "absent", "I");
    class.main(1, 1, Code::new().op(0xb2).u2(field).op(0x57).op(0xb1).bytes());

    let mut harness = make_vm();
    let err = run_main(&mut harness, "missing_field", &class).expect_err("resolution to fail");

    assert!(matches!(err, VmError::FieldResolution { .. }));
    assert_eq!(err.status(), VmStatus::FieldResolutionFailed);
}

#[test]
fn nothing_loaded_means_no_main() {
    let mut harness = make_vm();
    let err = harness
        .interpreter
        .execute_main(None)
        .expect_err("nothing to run");

    assert!(matches!(err, VmError::NoClassLoaded));
    assert_eq!(err.status(), VmStatus::NoClassLoaded);
}

#[test]
fn cyclic_hierarchy_is_rejected() {
    let dir = util::scratch_dir("cyclic_hierarchy").expect("scratch dir");

    let mut first = ClassBuilder::new("CycleA");
    first.super_class("CycleB");
    let mut second = ClassBuilder::new("CycleB");
    second.super_class("CycleA");

    let path = util::write_class(&dir, &first).expect("class to be written");
    util::write_class(&dir, &second).expect("class to be written");

    let mut harness = make_vm();
    let err = harness
        .interpreter
        .load_entry(&path)
        .err()
        .expect("linking to fail");

    assert!(matches!(err, VmError::CyclicHierarchy(_)));
    assert_eq!(err.status(), VmStatus::ClassResolutionFailed);
}

#[test]
fn stale_traces_do_not_leak_into_later_runs() {
    let failing = main_only(
        "FailsFirst",
        2,
        Code::new().op(0x04).op(0x03).op(0x6c).op(0xb1),
    );
    let passing = main_only("PassesSecond", 0, Code::new().op(0xb1));

    let mut harness = make_vm();
    run_main(&mut harness, "fails_first", &failing).expect_err("first run to fail");
    run_main(&mut harness, "passes_second", &passing).expect("second run to pass");

    assert!(harness.interpreter.take_trace().is_none());
}

#[test]
fn constant_values_must_fit_their_field() {
    let mut class = ClassBuilder::new("WideConstant");
    let narrow = class.integer(42);
    class.constant_field(ACC_STATIC, "WIDE", "J", narrow);
    class.main(0, 1, &[0xb1]);

    let mut harness = make_vm();
    let err = run_main(&mut harness, "wide_constant", &class).expect_err("init to fail");

    assert!(matches!(
        err,
        VmError::FieldResolution { ref field, .. } if field.starts_with("WIDE:J")
    ));
    assert_eq!(err.status(), VmStatus::FieldResolutionFailed);

    let mut class = ClassBuilder::new("StringInInt");
    let text = class.string("text");
    class.constant_field(ACC_STATIC, "COUNT", "I", text);
    class.main(0, 1, &[0xb1]);

    let mut harness = make_vm();
    let err = run_main(&mut harness, "string_in_int", &class).expect_err("init to fail");
    assert!(matches!(err, VmError::FieldResolution { .. }));
}

#[test]
fn inherited_slots_must_fit_in_sixteen_bits() {
    let dir = util::scratch_dir("inherited_slots").expect("scratch dir");

    let mut parent = ClassBuilder::new("WideParent");
    for index in 0..32_767 {
        parent.field(0, &format!("l{}", index), "J");
    }
    let mut child = ClassBuilder::new("WideChild");
    child.super_class("WideParent");
    child.field(0, "last", "J");

    util::write_class(&dir, &parent).expect("class to be written");
    let path = util::write_class(&dir, &child).expect("class to be written");

    let mut harness = make_vm();
    let err = harness
        .interpreter
        .load_entry(&path)
        .err()
        .expect("linking to fail");

    assert!(matches!(err, VmError::Internal(_)));
    assert!(err.to_string().contains("WideChild"));
}

#[test]
fn falling_off_the_end_is_an_error() {
    // a lone nop with no return after it
    let class = main_only("NoReturn", 0, Code::new().op(0x00));

    let mut harness = make_vm();
    let err = run_main(&mut harness, "no_return", &class).expect_err("main to fail");

    assert!(matches!(err, VmError::Internal(_)));
    assert!(err.to_string().contains("ran off the end of NoReturn.main"));
}

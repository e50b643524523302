mod common;
mod util;

use common::{attach_captures, get_captures, make_vm, run_main, Captured};
use util::builder::{ClassBuilder, Code, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};

const NATIVE_STATIC: u16 = ACC_PUBLIC | ACC_STATIC | ACC_NATIVE;

fn capturing_class(name: &str, descriptors: &[&str]) -> ClassBuilder {
    let mut class = ClassBuilder::new(name);
    for descriptor in descriptors {
        class.bodiless_method(NATIVE_STATIC, "capture", descriptor);
    }
    class
}

#[test]
fn native_methods_receive_arguments() {
    let mut class = capturing_class(
        "CaptureArgs",
        &["(I)V", "(J)V", "(Ljava/lang/String;)V"],
    );
    let capture_int = class.method_ref("CaptureArgs", "capture", "(I)V");
    let capture_long = class.method_ref("CaptureArgs", "capture", "(J)V");
    let capture_string = class.method_ref("CaptureArgs", "capture", "(Ljava/lang/String;)V");
    let text = class.string("text");

    let code = Code::new()
        .op(0x08) // iconst_5
        .op(0xb8).u2(capture_int)
        .op(0x12).u1(text as u8) // ldc "text"
        .op(0xb8).u2(capture_string)
        .op(0x01) // aconst_null
        .op(0xb8).u2(capture_string)
        .op(0x0a) // lconst_1
        .op(0xb8).u2(capture_long)
        .op(0xb1);
    class.main(2, 1, code.bytes());

    let mut harness = make_vm();
    attach_captures(&mut harness, "CaptureArgs");
    run_main(&mut harness, "capture_args", &class).expect("main to run");

    assert_eq!(
        get_captures("CaptureArgs"),
        vec![
            Captured::Int(5),
            Captured::Str(Some("text".to_string())),
            Captured::Str(None),
            Captured::Long(1),
        ]
    );
}

#[test]
fn interpreted_results_reach_natives() {
    let mut class = capturing_class("CaptureResults", &["(F)V", "(D)V", "(I)V"]);
    let capture_float = class.method_ref("CaptureResults", "capture", "(F)V");
    let capture_double = class.method_ref("CaptureResults", "capture", "(D)V");
    let capture_int = class.method_ref("CaptureResults", "capture", "(I)V");
    let square = class.method_ref("CaptureResults", "square", "(I)I");

    // static int square(int x) { return x * x; }
    let body = Code::new()
        .op(0x1a) // iload_0
        .op(0x1a) // iload_0
        .op(0x68) // imul
        .op(0xac); // ireturn
    class.method(ACC_STATIC, "square", "(I)I", 2, 1, body.bytes());

    let code = Code::new()
        .op(0x10).u1(12) // bipush 12
        .op(0xb8).u2(square)
        .op(0xb8).u2(capture_int)
        .op(0x0c) // fconst_1
        .op(0x0d) // fconst_2
        .op(0x62) // fadd
        .op(0xb8).u2(capture_float)
        .op(0x0f) // dconst_1
        .op(0x8e) // d2i
        .op(0x87) // i2d
        .op(0x77) // dneg
        .op(0xb8).u2(capture_double)
        .op(0xb1);
    class.main(2, 1, code.bytes());

    let mut harness = make_vm();
    attach_captures(&mut harness, "CaptureResults");
    run_main(&mut harness, "capture_results", &class).expect("main to run");

    assert_eq!(
        get_captures("CaptureResults"),
        vec![
            Captured::Int(144),
            Captured::Float(3.0),
            Captured::Double(-1.0),
        ]
    );
}

#[test]
fn host_natives_return_values() {
    let mut class = capturing_class("CaptureTime", &["(J)V"]);
    let capture_long = class.method_ref("CaptureTime", "capture", "(J)V");
    let millis = class.method_ref("java/lang/System", "currentTimeMillis", "()J");

    let code = Code::new()
        .op(0xb8).u2(millis)
        .op(0xb8).u2(capture_long)
        .op(0xb1);
    class.main(2, 1, code.bytes());

    let mut harness = make_vm();
    attach_captures(&mut harness, "CaptureTime");
    run_main(&mut harness, "capture_time", &class).expect("main to run");

    match get_captures("CaptureTime").as_slice() {
        [Captured::Long(millis)] => assert!(*millis > 0),
        other => panic!("expected one long, got {:?}", other),
    }
}

#[test]
fn unbound_native_fails_resolution() {
    let mut class = capturing_class("Unbound", &["(I)V"]);
    let capture = class.method_ref("Unbound", "capture", "(I)V");

    let code = Code::new().op(0x03).op(0xb8).u2(capture).op(0xb1);
    class.main(1, 1, code.bytes());

    // no captures attached, so nothing binds the native
    let mut harness = make_vm();
    let err = run_main(&mut harness, "unbound_native", &class).expect_err("main to fail");

    assert!(matches!(
        err,
        runtime::error::VmError::MethodResolution { .. }
    ));
}

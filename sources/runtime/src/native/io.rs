use std::{collections::HashMap, io::Write};

use support::types::MethodDescriptor;

use crate::{
    error::VmError,
    heap::{ArrayKind, HeapObject},
    instance_method, internal, module_base,
    stack::{Cell, Frame, OperandType},
    vm::VM,
};

use super::{NativeFunction, NativeModule};

/// Render a double the way `Double.toString` does.
pub fn format_double(value: f64) -> String {
    java_decimal(value, format!("{}", value), format!("{:e}", value))
}

/// Render a float the way `Float.toString` does. Digits are the shortest that round-trip
/// through `f32`, not `f64`.
pub fn format_float(value: f32) -> String {
    java_decimal(value as f64, format!("{}", value), format!("{:e}", value))
}

fn java_decimal(value: f64, plain: String, scientific: String) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }

    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    if (1e-3..1e7).contains(&value.abs()) {
        return with_fraction(&plain);
    }

    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));

    format!("{}E{}", with_fraction(mantissa), exponent)
}

fn with_fraction(digits: &str) -> String {
    if digits.contains('.') {
        digits.to_string()
    } else {
        format!("{}.0", digits)
    }
}

fn render_boolean(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    let value = frame.operands.pop_int()?;
    Ok(if value != 0 { "true" } else { "false" }.to_string())
}

fn render_char(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    let value = frame.operands.pop_int()? as u16;
    Ok(char::from_u32(value as u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
        .to_string())
}

fn render_int(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    Ok(frame.operands.pop_int()?.to_string())
}

fn render_long(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    Ok(frame.operands.pop_long()?.to_string())
}

fn render_float(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    Ok(format_float(frame.operands.pop_float()?))
}

fn render_double(frame: &mut Frame, _: &VM) -> Result<String, VmError> {
    Ok(format_double(frame.operands.pop_double()?))
}

fn render_char_array(frame: &mut Frame, vm: &VM) -> Result<String, VmError> {
    let array = frame.operands.pop_reference()?;
    if array.ty == OperandType::Null {
        return Ok("null".to_string());
    }

    match vm.heap.get(array.value)? {
        HeapObject::Array(chars) if chars.kind == ArrayKind::Char => Ok(chars
            .values
            .iter()
            .map(|c| char::from_u32(*c as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()),
        other => Err(internal!("expected a char array, got {:?}", other)),
    }
}

fn render_string(frame: &mut Frame, vm: &VM) -> Result<String, VmError> {
    let string = frame.operands.pop_reference()?;
    if string.ty == OperandType::Null {
        return Ok("null".to_string());
    }

    Ok(vm.heap.string(string.value)?.to_string())
}

fn render_object(frame: &mut Frame, vm: &VM) -> Result<String, VmError> {
    let object = frame.operands.pop_reference()?;

    match object.ty {
        OperandType::Null => Ok("null".to_string()),
        OperandType::StringRef => Ok(vm.heap.string(object.value)?.to_string()),
        _ => Ok(format!("0x{:08X}", object.value)),
    }
}

/// Pop the receiver and write `text` to the program output.
fn write_out(frame: &mut Frame, vm: &mut VM, text: &str, newline: bool) -> Result<(), VmError> {
    let receiver: Cell = frame.operands.pop_reference()?;
    if receiver.ty == OperandType::Null {
        return Err(VmError::InvalidInstructionParameters(
            "print on a null PrintStream".to_string(),
        ));
    }

    let written = if newline {
        writeln!(vm.output, "{}", text)
    } else {
        write!(vm.output, "{}", text)
    };

    written.map_err(|e| internal!(e))?;
    vm.output.flush().map_err(|e| internal!(e))
}

macro_rules! print_pair {
    ($print: ident, $println: ident, $render: ident) => {
        fn $print(frame: &mut Frame, vm: &mut VM) -> Result<(), VmError> {
            let text = $render(frame, vm)?;
            write_out(frame, vm, &text, false)
        }

        fn $println(frame: &mut Frame, vm: &mut VM) -> Result<(), VmError> {
            let text = $render(frame, vm)?;
            write_out(frame, vm, &text, true)
        }
    };
}

fn println_nothing(frame: &mut Frame, vm: &mut VM) -> Result<(), VmError> {
    write_out(frame, vm, "", true)
}

print_pair!(print_boolean, println_boolean, render_boolean);
print_pair!(print_char, println_char, render_char);
print_pair!(print_int, println_int, render_int);
print_pair!(print_long, println_long, render_long);
print_pair!(print_float, println_float, render_float);
print_pair!(print_double, println_double, render_double);
print_pair!(print_char_array, println_char_array, render_char_array);
print_pair!(print_string, println_string, render_string);
print_pair!(print_object, println_object, render_object);

module_base!(IOPrintStream);
impl NativeModule for IOPrintStream {
    fn classname(&self) -> &'static str {
        "java/io/PrintStream"
    }

    fn methods(&self) -> &HashMap<MethodDescriptor, NativeFunction> {
        &self.methods
    }

    fn methods_mut(&mut self) -> &mut HashMap<MethodDescriptor, NativeFunction> {
        &mut self.methods
    }

    fn init(&mut self) -> Result<(), VmError> {
        self.set_method(("println", "()V"), instance_method!(println_nothing))?;

        let pairs: [(&'static str, super::NativeMethod, super::NativeMethod); 11] = [
            ("(Z)V", print_boolean, println_boolean),
            ("(C)V", print_char, println_char),
            ("(B)V", print_int, println_int),
            ("(S)V", print_int, println_int),
            ("(I)V", print_int, println_int),
            ("(J)V", print_long, println_long),
            ("(F)V", print_float, println_float),
            ("(D)V", print_double, println_double),
            ("([C)V", print_char_array, println_char_array),
            ("(Ljava/lang/String;)V", print_string, println_string),
            ("(Ljava/lang/Object;)V", print_object, println_object),
        ];

        for (descriptor, print, println) in pairs {
            self.set_method(("print", descriptor), instance_method!(print))?;
            self.set_method(("println", descriptor), instance_method!(println))?;
        }

        Ok(())
    }
}

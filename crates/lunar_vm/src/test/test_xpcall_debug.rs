// Protected calls, error values, levels and tracebacks
use super::{new_vm, new_vm_with, run, run_err};
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallContext, LuaError, LuaResult, SafeOption};

fn trace(l: &mut CallContext) -> LuaResult<usize> {
    let traceback = l.vm().traceback(None, 1);
    l.push_value(LuaValue::string_owned(traceback))?;
    Ok(1)
}

#[test]
fn test_pcall_success_and_failure() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local ok1, a, b = pcall(function(x, y) return x + y, "done" end, 1, 2)
        local ok2, err = pcall(function() error("boom") end)
        return ok1, a, b, ok2, err
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(true));
    assert_eq!(results[1], LuaValue::Integer(3));
    assert_eq!(results[2].as_str(), Some("done"));
    assert_eq!(results[3], LuaValue::Boolean(false));
    let message = results[4].as_str().unwrap_or_default();
    assert!(message.ends_with(":3: boom"), "{}", message);
}

#[test]
fn test_error_levels() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local function check(v)
            if type(v) ~= "number" then
                error("expected number", 2)
            end
        end
        local ok, err = pcall(function()
            check("x")
        end)
        local ok0, err0 = pcall(error, "plain", 0)
        return err, err0
        "#,
    );
    let located = results[0].as_str().unwrap_or_default();
    // level 2 blames the caller of check
    assert!(located.ends_with(":8: expected number"), "{}", located);
    assert_eq!(results[1].as_str(), Some("plain"));
}

#[test]
fn test_error_with_table_value() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local ok, err = pcall(error, { code = 42 })
        return ok, type(err), err.code
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    assert_eq!(results[1].as_str(), Some("table"));
    assert_eq!(results[2], LuaValue::Integer(42));

    let message = run_err(&mut vm, "error({})");
    assert_eq!(message, "(error object is a table value)");
}

#[test]
fn test_xpcall_handler_sees_message() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        return xpcall(function() error("boom") end, function(m) return "handled: " .. m end)
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    let message = results[1].as_str().unwrap_or_default();
    assert!(message.starts_with("handled: "), "{}", message);
    assert!(message.ends_with("boom"), "{}", message);
}

#[test]
fn test_xpcall_passes_arguments() {
    let mut vm = new_vm();
    let results = run(&mut vm, "return xpcall(function(a, b) return a * b end, print, 6, 7)");
    assert_eq!(results, vec![LuaValue::Boolean(true), LuaValue::Integer(42)]);
}

#[test]
fn test_error_in_error_handling() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        return xpcall(function() error("first") end, function() error("second") end)
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    let message = results[1].as_str().unwrap_or_default();
    assert!(message.starts_with("error in error handling"), "{}", message);
}

#[test]
fn test_handler_error_status_reaches_host() {
    let mut vm = new_vm();
    let chunk = vm.compile("error('first')").expect("compiles");
    let func = vm.load_proto(chunk).expect("loads");
    let chunk = vm.compile("error('second')").expect("compiles");
    let handler = vm.load_proto(chunk).expect("loads");
    let result = vm.pcall_with_handler(func, Vec::new(), Some(handler));
    assert_eq!(result.err(), Some(LuaError::ErrorInHandler));
    assert!(vm.error_message().starts_with("error in error handling"));
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_traceback_lists_frames() {
    let mut vm = new_vm();
    vm.set_global("trace", LuaValue::CFunction(trace));
    let results = run(
        &mut vm,
        r#"
        function inner() return trace() end
        local function outer() return inner() end
        return outer()
        "#,
    );
    let traceback = results[0].as_str().unwrap_or_default().to_string();
    let lines: Vec<&str> = traceback.lines().collect();
    assert_eq!(lines[0], "stack traceback:");
    assert!(lines[1].ends_with(":2: in function 'inner'"), "{}", traceback);
    assert!(lines[2].ends_with(":3: in local 'outer'"), "{}", traceback);
    assert!(lines[3].ends_with(":4: in main chunk"), "{}", traceback);
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_stack_overflow() {
    let option = SafeOption {
        max_call_depth: 40,
        ..SafeOption::default()
    };
    let mut vm = new_vm_with(option);
    let message = run_err(&mut vm, "local function f() return f() end return f()");
    assert!(message.contains("stack overflow"), "{}", message);
    assert_eq!(vm.call_depth(), 0);

    // a protected overflow is recoverable
    let results = run(&mut vm, "local function g() return g() end return pcall(g)");
    assert_eq!(results[0], LuaValue::Boolean(false));
    let results = run(&mut vm, "return 1 + 1");
    assert_eq!(results[0], LuaValue::Integer(2));
}

#[test]
fn test_assert() {
    let mut vm = new_vm();
    let results = run(&mut vm, "return assert(1, 'unused')");
    assert_eq!(results[0], LuaValue::Integer(1));
    let message = run_err(&mut vm, "assert(false)");
    assert!(message.contains("assertion failed!"), "{}", message);
    let message = run_err(&mut vm, "assert(nil, 'custom message')");
    assert_eq!(message, "custom message");
}

#[test]
fn test_runtime_error_status_codes() {
    let mut vm = new_vm();
    let err = vm.execute_string("error('x')").err();
    assert_eq!(err, Some(LuaError::RuntimeError));
    assert_eq!(LuaError::RuntimeError.status_code(), 2);
    let err = vm.execute_string("local = 1").err();
    assert_eq!(err, Some(LuaError::CompileError));
}

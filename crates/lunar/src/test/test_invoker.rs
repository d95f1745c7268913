// Protected invocation: results, message handler, failure categories
use std::rc::Rc;

use lunar_vm::{LuaValue, SafeOption, SystemAllocator};

use super::{RefusingAllocator, engine_with, new_engine, run};
use crate::{Engine, Error, FailureKind};

#[test]
fn test_return_sum() {
    let mut engine = new_engine();
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
    let answer: i64 = engine.from_value(results[0].clone()).expect("integer");
    assert_eq!(answer, 42);
}

#[test]
fn test_two_argument_rounding() {
    let mut engine = new_engine();
    let chunk = engine
        .compile("local a, b = ...\nlocal ab = a + b\nreturn math.floor(ab + 0.5)")
        .expect("compiles");
    let results = engine
        .invoke(&chunk, vec![LuaValue::Float(14.9), LuaValue::Float(27.3)], 1)
        .expect("runs");
    // floor(42.2 + 0.5)
    assert_eq!(results, vec![LuaValue::Integer(42)]);

    let results = engine
        .invoke(&chunk, vec![LuaValue::Float(15.4), LuaValue::Float(27.3)], 1)
        .expect("runs");
    assert_eq!(results, vec![LuaValue::Integer(43)]);
}

#[test]
fn test_expected_results_pad_and_truncate() {
    let mut engine = new_engine();
    let chunk = engine.compile("return 1, 2, 3").expect("compiles");
    let results = engine.invoke(&chunk, Vec::new(), 2).expect("runs");
    assert_eq!(results, vec![LuaValue::Integer(1), LuaValue::Integer(2)]);

    let results = engine.invoke(&chunk, Vec::new(), 5).expect("runs");
    assert_eq!(results.len(), 5);
    assert_eq!(results[2], LuaValue::Integer(3));
    assert_eq!(results[3], LuaValue::Nil);
    assert_eq!(results[4], LuaValue::Nil);

    assert!(engine.invoke(&chunk, Vec::new(), 0).expect("runs").is_empty());
    assert_eq!(engine.pending(), 0);
}

#[test]
fn test_pending_values_lead_arguments() {
    let mut engine = new_engine();
    engine.push_value(LuaValue::Integer(1)).expect("pushes");
    engine.push_value(LuaValue::Integer(2)).expect("pushes");
    assert_eq!(engine.pending(), 2);
    let chunk = engine.compile("return select('#', ...), ...").expect("compiles");
    let results = engine
        .invoke(&chunk, vec![LuaValue::Integer(3)], 4)
        .expect("runs");
    assert_eq!(
        results,
        vec![
            LuaValue::Integer(3),
            LuaValue::Integer(1),
            LuaValue::Integer(2),
            LuaValue::Integer(3),
        ]
    );
    // consumed by the call
    assert_eq!(engine.pending(), 0);
}

#[test]
fn test_undefined_function_has_traceback() {
    let mut engine = new_engine();
    let chunk = engine.compile("foobar()").expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert!(!report.is_fatal());
    assert!(
        report
            .message
            .starts_with("[string \"foobar()\"]:1: attempt to call a nil value (global 'foobar')"),
        "{}",
        report.message
    );
    assert!(report.message.contains("stack traceback:"), "{}", report.message);
    assert!(report.message.contains("in main chunk"), "{}", report.message);
    assert!(report.to_string().starts_with("runtime error: "));

    // still usable
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
}

#[test]
fn test_traceback_lists_frames() {
    let mut engine = new_engine();
    let chunk = engine
        .compile_named(
            "function inner() error('deep') end\nlocal function outer() inner() end\nouter()",
            "=frames",
        )
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
    let mut lines = report.message.lines();
    assert_eq!(lines.next(), Some("frames:1: deep"));
    assert_eq!(lines.next(), Some("stack traceback:"));
    let frames: Vec<&str> = lines.collect();
    assert!(frames.iter().any(|line| line.contains("in function 'inner'")), "{}", report.message);
    assert!(frames.iter().any(|line| line.contains("in local 'outer'")), "{}", report.message);
    assert!(frames.iter().all(|line| line.starts_with('\t')), "{}", report.message);
}

#[test]
fn test_number_error_gets_traceback() {
    let mut engine = new_engine();
    let chunk = engine.compile("error(42)").expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert!(report.message.starts_with("42\nstack traceback:"), "{}", report.message);
}

#[test]
fn test_non_string_error_placeholder() {
    let mut engine = new_engine();
    for source in ["error({})", "error()", "error(true)"] {
        let chunk = engine.compile(source).expect("compiles");
        let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
        assert_eq!(report.kind, FailureKind::Runtime);
        assert_eq!(report.message, "(no error message)", "{}", source);
    }
}

#[test]
fn test_tostring_error_object() {
    let mut engine = new_engine();
    let chunk = engine
        .compile("error(setmetatable({}, { __tostring = function() return 'custom failure' end }))")
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert_eq!(report.message, "custom failure");
}

#[test]
fn test_handler_fault() {
    let mut engine = new_engine();
    let chunk = engine
        .compile("error(setmetatable({}, { __tostring = function() error('no text') end }))")
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("fails");
    assert_eq!(report.kind, FailureKind::Handler);
    assert!(!report.is_fatal());
    assert!(
        report.message.starts_with("error in error handling: "),
        "{}",
        report.message
    );
    assert!(report.message.contains("no text"), "{}", report.message);
    assert_eq!(engine.pending(), 0);
}

#[test]
fn test_finalizer_fault_during_invoke() {
    let mut engine = new_engine();
    let chunk = engine
        .compile(
            r#"
            do
                setmetatable({}, { __gc = function() error("finalizer exploded") end })
            end
            collectgarbage()
            return 1
            "#,
        )
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 1).expect_err("finalizer raises");
    assert_eq!(report.kind, FailureKind::Collector);
    assert!(report.is_fatal());
    assert!(report.message.contains("finalizer exploded"), "{}", report.message);
    assert_eq!(engine.pending(), 0);

    // the object is gone; later calls are unaffected
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
}

#[test]
fn test_memory_limit_is_fatal() {
    let options = SafeOption {
        max_memory_limit: 4 * 1024 * 1024,
        ..SafeOption::default()
    };
    let mut engine = Engine::create_with_options(options, SystemAllocator);
    engine.bootstrap().expect("standard library fits");

    let chunk = engine
        .compile("local t = {} for i = 1, 1000000 do t[i] = {} end")
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 0).expect_err("runs out");
    assert_eq!(report.kind, FailureKind::Memory);
    assert!(report.is_fatal());
    assert_eq!(report.message, "not enough memory");
    assert_eq!(engine.pending(), 0);

    let chunk = engine.compile("return string.rep('x', 1 << 40)").expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 1).expect_err("too large");
    assert_eq!(report.kind, FailureKind::Memory);

    engine.collect_garbage().expect("collects");
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
}

#[test]
fn test_refused_allocation_is_a_memory_failure() {
    let allocator = RefusingAllocator::default();
    let refusing = Rc::clone(&allocator.refusing);
    let mut engine = engine_with(allocator);
    let chunk = engine.compile("return {}").expect("compiles");
    let func = engine.load(&chunk).expect("loads");

    refusing.set(true);
    // the table inside the script
    let report = engine.call(&func, Vec::new(), 1).expect_err("no memory");
    assert_eq!(report.kind, FailureKind::Memory);
    assert!(report.is_fatal());
    assert_eq!(report.message, "not enough memory");
    assert_eq!(engine.pending(), 0);
    // the closure of the main chunk
    let report = engine.invoke(&chunk, Vec::new(), 1).expect_err("no memory");
    assert_eq!(report.kind, FailureKind::Memory);
    assert_eq!(engine.pending(), 0);

    refusing.set(false);
    let results = engine.invoke(&chunk, Vec::new(), 1).expect("runs");
    assert!(matches!(results[0], LuaValue::Table(_)), "{:?}", results);
}

#[test]
fn test_pcall_inside_script() {
    let mut engine = new_engine();
    let results = run(
        &mut engine,
        "local ok, err = pcall(function() error('caught', 0) end) return ok, err",
        2,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    assert_eq!(results[1].as_str(), Some("caught"));
}

#[test]
fn test_stack_overflow() {
    let options = SafeOption {
        max_call_depth: 50,
        ..SafeOption::default()
    };
    let mut engine = Engine::create_with_options(options, SystemAllocator);
    engine.bootstrap().expect("bootstraps");
    let chunk = engine
        .compile("local function f() return 1 + f() end return f()")
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 1).expect_err("overflows");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert!(report.message.contains("stack overflow"), "{}", report.message);
}

#[test]
fn test_execute_maps_errors() {
    let mut engine = new_engine();
    match engine.execute("return 1 +", 1) {
        Err(Error::Compile(error)) => assert!(error.message.contains("near <eof>")),
        other => panic!("expected a compile error, got {:?}", other),
    }
    match engine.execute("error('plain')", 0) {
        Err(Error::Failure(report)) => assert_eq!(report.kind, FailureKind::Runtime),
        other => panic!("expected a runtime failure, got {:?}", other),
    }
    let results = engine.execute("return 'ok'", 1).expect("runs");
    assert_eq!(results[0].as_str(), Some("ok"));
}

#[test]
fn test_call_function_value() {
    let mut engine = new_engine();
    let results = run(&mut engine, "return function(x, y) return x * y, x + y end", 1);
    let products = engine
        .call(&results[0], vec![LuaValue::Integer(6), LuaValue::Integer(7)], 2)
        .expect("calls");
    assert_eq!(products, vec![LuaValue::Integer(42), LuaValue::Integer(13)]);

    let report = engine
        .call(&LuaValue::Integer(5), Vec::new(), 1)
        .expect_err("not callable");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert!(report.message.contains("attempt to call a number value"), "{}", report.message);
}

// Engine lifecycle: bootstrap, teardown, globals and conversions
use std::cell::Cell;
use std::rc::Rc;

use lunar_vm::LuaValue;

use super::{SharedOutput, Tracked, new_engine, run};
use crate::{BridgeError, Engine, ExclusiveOwned, FailureKind};

#[test]
fn test_bootstrap_installs_libraries() {
    let mut engine = Engine::create();
    // nothing installed yet
    assert_eq!(engine.get_global("print"), LuaValue::Nil);
    engine.bootstrap().expect("installs");
    for name in ["print", "pcall", "string", "table", "math", "collectgarbage"] {
        assert_ne!(engine.get_global(name), LuaValue::Nil, "{}", name);
    }
}

#[test]
fn test_print_writes_to_sink() {
    let mut engine = new_engine();
    let output = SharedOutput::default();
    engine.set_output(Box::new(output.clone()));
    run(&mut engine, "print('hello', 42, nil, 1.5)", 0);
    assert_eq!(output.text(), "hello\t42\tnil\t1.5\n");
}

#[test]
fn test_globals_and_conversions() {
    let mut engine = new_engine();
    let value = engine.to_value(21i64).expect("converts");
    engine.set_global("half", value);
    let results = run(&mut engine, "answer = half * 2 return tostring(answer)", 1);
    assert_eq!(engine.display(&results[0]), "42");
    let answer: i64 = engine
        .from_value(engine.get_global("answer"))
        .expect("integer");
    assert_eq!(answer, 42);

    let text = engine.to_value(String::from("text")).expect("converts");
    let error = engine.from_value::<i64>(text).expect_err("not a number");
    assert!(matches!(error, BridgeError::Conversion(_)));
    assert_eq!(engine.display(&LuaValue::Boolean(false)), "false");
}

#[test]
fn test_collect_garbage_frees_unreachable() {
    let mut engine = new_engine();
    let before = engine.object_count();
    run(&mut engine, "garbage = {} for i = 1, 50 do garbage[i] = {} end", 0);
    assert!(engine.object_count() > before + 50);
    run(&mut engine, "garbage = nil", 0);
    let freed = engine.collect_garbage().expect("collects");
    assert!(freed >= 51, "{}", freed);
    assert!(engine.gc_stats().collections >= 1);
}

#[test]
fn test_collect_garbage_reports_finalizer_fault() {
    let mut engine = new_engine();
    run(
        &mut engine,
        "do setmetatable({}, { __gc = function() error('late failure') end }) end",
        0,
    );
    let report = engine.collect_garbage().expect_err("finalizer raises");
    assert_eq!(report.kind, FailureKind::Collector);
    assert!(report.message.contains("late failure"), "{}", report.message);
    // the next cycle is clean
    assert!(engine.collect_garbage().is_ok());
}

#[test]
fn test_destroy_runs_pending_finalizers() {
    let drops = Rc::new(Cell::new(0));
    let mut engine = new_engine();
    run(
        &mut engine,
        "finalized = 0 holder = setmetatable({}, { __gc = function() finalized = finalized + 1 end })",
        0,
    );
    engine
        .push(ExclusiveOwned(Tracked::new(9, &drops)))
        .expect("pushes");
    run(&mut engine, "other = ...", 0);

    let stats = engine.destroy();
    assert_eq!(drops.get(), 1);
    assert!(stats.finalizers_run >= 2, "{:?}", stats.finalizers_run);
}

#[test]
fn test_working_stack() {
    let mut engine = new_engine();
    engine.push_value(LuaValue::Integer(1)).expect("pushes");
    engine.push_value(LuaValue::Integer(2)).expect("pushes");
    assert_eq!(engine.pending(), 2);
    assert_eq!(engine.pop(), Some(LuaValue::Integer(2)));
    engine.clear_pending();
    assert_eq!(engine.pending(), 0);
    assert_eq!(engine.pop(), None);
}

#[test]
fn test_debug_and_default() {
    let engine = Engine::default();
    let text = format!("{:?}", engine);
    assert!(text.starts_with("Engine {"), "{}", text);
    assert!(text.contains("closed: false"), "{}", text);
}

#[test]
fn test_errors_compose_with_question_mark() {
    fn script(engine: &mut Engine) -> crate::Result<i64> {
        let chunk = engine.compile("return 6 * 7")?;
        let results = engine.invoke(&chunk, Vec::new(), 1)?;
        let identity = engine.reference(results[0].clone())?;
        let value = engine.dereference(identity)?;
        engine.unreference(identity)?;
        Ok(engine.from_value(value)?)
    }

    let mut engine = new_engine();
    assert_eq!(script(&mut engine).expect("runs"), 42);
}

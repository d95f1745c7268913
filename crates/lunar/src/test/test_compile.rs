// Chunk compilation: diagnostics, chunk names, fragment readers
use lunar_vm::LuaValue;

use super::{new_engine, run};
use crate::FailureKind;

#[test]
fn test_syntax_error_is_reported() {
    let mut engine = new_engine();
    let error = engine.compile("syntax(error").expect_err("does not compile");
    assert!(!error.message.is_empty());
    assert!(error.message.contains("near <eof>"), "{}", error.message);
    assert!(error.message.starts_with("[string \"syntax(error\"]:1:"), "{}", error.message);

    // the engine is still usable afterwards
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
}

#[test]
fn test_diagnostic_names_token() {
    let mut engine = new_engine();
    let error = engine.compile("x = = 1").expect_err("does not compile");
    assert_eq!(
        error.message,
        "[string \"x = = 1\"]:1: unexpected symbol near '='"
    );
    assert_eq!(error.to_string(), error.message);
}

#[test]
fn test_compile_does_not_touch_collector() {
    let mut engine = new_engine();
    let objects = engine.object_count();
    let collections = engine.gc_stats().collections;
    for _ in 0..50 {
        engine
            .compile("local t = {} for i = 1, 10 do t[i] = i end return t")
            .expect("compiles");
    }
    assert_eq!(engine.object_count(), objects);
    assert_eq!(engine.gc_stats().collections, collections);
}

#[test]
fn test_chunk_names() {
    let mut engine = new_engine();
    let chunk = engine.compile_named("return 1", "=config").expect("compiles");
    assert_eq!(chunk.name(), "config");
    let chunk = engine.compile_named("return 1", "@scripts/init.lua").expect("compiles");
    assert_eq!(chunk.name(), "scripts/init.lua");
    let error = engine.compile("return 1\nreturn 2").expect_err("return must be last");
    assert!(error.message.starts_with("[string \"return 1...\"]:"), "{}", error.message);

    let chunk = engine
        .compile_named("\nlocal a\nreturn a.b", "=module")
        .expect("compiles");
    let report = engine.invoke(&chunk, Vec::new(), 1).expect_err("indexes nil");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert!(
        report
            .message
            .starts_with("module:3: attempt to index a nil value (local 'a')"),
        "{}",
        report.message
    );
}

#[test]
fn test_fragment_reader_matches_string() {
    let source = "local a, b = ...\nlocal ab = a + b\nreturn math.floor(ab + 0.5)\n";
    let mut engine = new_engine();

    // fragments split in the middle of tokens
    let pieces = [
        "local a, b",
        " = ...\nlocal a",
        "b = a ",
        "+ b\nreturn math.fl",
        "oor(ab + 0.",
        "5)\n",
    ];
    let mut fragments = pieces.iter();
    let mut reader = || fragments.next().map(|piece| piece.to_string());
    let streamed = engine.compile_reader(&mut reader, "=streamed").expect("compiles");
    let whole = engine.compile_named(source, "=whole").expect("compiles");

    for chunk in [&streamed, &whole] {
        let args = vec![LuaValue::Float(14.9), LuaValue::Float(27.3)];
        let results = engine.invoke(chunk, args, 1).expect("runs");
        assert_eq!(results, vec![LuaValue::Integer(42)]);
    }
}

#[test]
fn test_fragment_reader_stops_at_empty_fragment() {
    let mut engine = new_engine();
    let mut fragments = ["return ", "7", "", "+ 1"].into_iter().map(String::from);
    let mut reader = || fragments.next();
    let chunk = engine.compile_reader(&mut reader, "=partial").expect("compiles");
    let results = engine.invoke(&chunk, Vec::new(), 1).expect("runs");
    assert_eq!(results, vec![LuaValue::Integer(7)]);
}

#[test]
fn test_fragment_reader_syntax_error() {
    let mut engine = new_engine();
    let mut fragments = ["if x then\n", "  y = 1\n"].into_iter();
    let mut reader = || fragments.next().map(str::to_owned);
    let error = engine
        .compile_reader(&mut reader, "=broken")
        .expect_err("missing end");
    assert!(error.message.starts_with("broken:"), "{}", error.message);
    assert!(
        error
            .message
            .ends_with("'end' expected (to close 'if' at line 1) near <eof>"),
        "{}",
        error.message
    );
}

#[test]
fn test_chunk_runs_repeatedly() {
    let mut engine = new_engine();
    let chunk = engine
        .compile("counter = (counter or 0) + 1 return counter")
        .expect("compiles");
    for expected in 1..=3 {
        let results = engine.invoke(&chunk, Vec::new(), 1).expect("runs");
        assert_eq!(results, vec![LuaValue::Integer(expected)]);
    }
}

// Compiler front end: fragment readers, diagnostics, chunk names
use super::{new_vm, run};
use crate::compiler::chunk_id;
use crate::lua_value::LuaValue;
use crate::lua_vm::LuaError;

#[test]
fn test_fragment_reader_token_split() {
    let mut vm = new_vm();
    let mut parts = vec!["local x = 12", "34 ret", "urn x + 1"].into_iter();
    let mut reader = move || parts.next().map(String::from);
    let chunk = vm.compile_chunk(&mut reader, "=fragments").expect("compiles");
    assert_eq!(&*chunk.source_name, "fragments");
    let func = vm.load_proto(chunk).expect("loads");
    let results = vm.pcall_with_handler(func, Vec::new(), None).expect("runs");
    assert_eq!(results[0], LuaValue::Integer(1235));
}

#[test]
fn test_fragment_reader_empty_fragment_ends_chunk() {
    let mut vm = new_vm();
    let mut parts = vec!["return 1", "", "error('unreachable')"].into_iter();
    let mut reader = move || parts.next().map(String::from);
    let chunk = vm.compile_chunk(&mut reader, "=short").expect("compiles");
    let func = vm.load_proto(chunk).expect("loads");
    let results = vm.pcall_with_handler(func, Vec::new(), None).expect("runs");
    assert_eq!(results, vec![LuaValue::Integer(1)]);
}

#[test]
fn test_syntax_error_message() {
    let mut vm = new_vm();
    let result = vm.compile("x = = 1");
    assert_eq!(result.err(), Some(LuaError::CompileError));
    assert_eq!(
        vm.error_message(),
        "[string \"x = = 1\"]:1: unexpected symbol near '='"
    );
}

#[test]
fn test_unclosed_block() {
    let mut vm = new_vm();
    assert!(vm.compile("if x then\n  y = 1\n").is_err());
    let message = vm.error_message();
    assert!(message.contains("'end' expected (to close 'if' at line 1) near <eof>"), "{}", message);

    assert!(vm.compile("local s = 'abc").is_err());
    assert!(vm.error_message().contains("unfinished string"));
}

#[test]
fn test_invalid_statements() {
    let mut vm = new_vm();
    assert!(vm.compile("break").is_err());
    assert!(vm.error_message().contains("break outside a loop"));
    assert!(vm.compile("goto done").is_err());
    assert!(vm.error_message().contains("goto statements and labels are not supported"));
    assert!(vm.compile("local function f() return ... end").is_err());
    assert!(vm.error_message().contains("cannot use '...' outside a vararg function"));
    assert!(vm.compile("x + 1").is_err());
    assert!(vm.error_message().contains("syntax error"));
}

#[test]
fn test_const_locals_and_comments() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        -- line comment
        --[[ block
             comment ]]
        local limit <const> = 10
        local s = [[long
string]]
        return limit, s, 0xff, 1e1, "\65\x42\u{43}"
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(10));
    assert_eq!(results[1].as_str(), Some("long\nstring"));
    assert_eq!(results[2], LuaValue::Integer(255));
    assert_eq!(results[3], LuaValue::Float(10.0));
    assert_eq!(results[4].as_str(), Some("ABC"));
}

#[test]
fn test_chunk_id() {
    assert_eq!(chunk_id("=stdin"), "stdin");
    assert_eq!(chunk_id("@script.lua"), "script.lua");
    assert_eq!(chunk_id("return 1"), "[string \"return 1\"]");
    assert_eq!(chunk_id("x = 1\ny = 2"), "[string \"x = 1...\"]");

    let long_file = format!("@{}", "d/".repeat(40));
    let shown = chunk_id(&long_file);
    assert!(shown.starts_with("..."));
    assert_eq!(shown.chars().count(), 59);
}

#[test]
fn test_runtime_error_carries_chunk_name() {
    let mut vm = new_vm();
    let chunk = vm
        .compile_with_name("local a = nil\nreturn a.b", "@module.lua")
        .expect("compiles");
    let func = vm.load_proto(chunk).expect("loads");
    assert!(vm.pcall_with_handler(func, Vec::new(), None).is_err());
    assert_eq!(
        vm.error_message(),
        "module.lua:2: attempt to index a nil value (local 'a')"
    );
}

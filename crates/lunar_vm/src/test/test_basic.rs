// Core language: arithmetic, control flow, varargs and the basic library
use super::{SharedOutput, new_vm, run, run_err};
use crate::lua_value::LuaValue;

#[test]
fn test_arithmetic() {
    let mut vm = new_vm();
    let results = run(&mut vm, "return 15 + 27, 7 // 2, 7 / 2, 2^10, -7 % 3, 7.5 // 2");
    assert_eq!(results[0], LuaValue::Integer(42));
    assert_eq!(results[1], LuaValue::Integer(3));
    assert_eq!(results[2], LuaValue::Float(3.5));
    assert_eq!(results[3], LuaValue::Float(1024.0));
    assert_eq!(results[4], LuaValue::Integer(2));
    assert_eq!(results[5], LuaValue::Float(3.0));
}

#[test]
fn test_string_coercion() {
    let mut vm = new_vm();
    let results = run(&mut vm, r#"return "10" + 5, 1 .. 2, "3" * "4", 10 == "10""#);
    assert_eq!(results[0], LuaValue::Integer(15));
    assert_eq!(results[1].as_str(), Some("12"));
    assert_eq!(results[2], LuaValue::Integer(12));
    assert_eq!(results[3], LuaValue::Boolean(false));
}

#[test]
fn test_integer_division_by_zero() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "local z = 0 return 1 // z");
    assert!(message.contains("attempt to perform 'n//0'"), "{}", message);
    let message = run_err(&mut vm, "local z = 0 return 1 % z");
    assert!(message.contains("attempt to perform 'n%0'"), "{}", message);
    // float division never raises
    let results = run(&mut vm, "return 1 / 0");
    assert_eq!(results[0], LuaValue::Float(f64::INFINITY));
}

#[test]
fn test_print_goes_to_output() {
    let mut vm = new_vm();
    let output = SharedOutput::default();
    vm.set_output(Box::new(output.clone()));
    run(&mut vm, r#"print("a", 1, 2.5, nil, true) print()"#);
    assert_eq!(output.text(), "a\t1\t2.5\tnil\ttrue\n\n");
}

#[test]
fn test_varargs_and_select() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local function f(...)
            return select('#', ...), select(2, ...)
        end
        return f(10, nil, 30)
        "#,
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], LuaValue::Integer(3));
    assert_eq!(results[1], LuaValue::Nil);
    assert_eq!(results[2], LuaValue::Integer(30));

    let results = run(&mut vm, "return select(-1, 'a', 'b', 'c')");
    assert_eq!(results[0].as_str(), Some("c"));
    let message = run_err(&mut vm, "return select(0, 1)");
    assert!(message.contains("bad argument #1 to 'select'"), "{}", message);
}

#[test]
fn test_multiple_assignment_evaluates_before_storing() {
    let mut vm = new_vm();
    let results = run(&mut vm, "local a, b = 1, 2 a, b = b, a return a, b");
    assert_eq!(results, vec![LuaValue::Integer(2), LuaValue::Integer(1)]);

    let results = run(&mut vm, "local t = {} local i = 1 i, t[i] = i + 1, 20 return i, t[1], t[2]");
    assert_eq!(results[0], LuaValue::Integer(2));
    assert_eq!(results[1], LuaValue::Integer(20));
    assert_eq!(results[2], LuaValue::Nil);
}

#[test]
fn test_numeric_for() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local sum = 0
        for i = 1, 10 do sum = sum + i end
        local down = 0
        for i = 10, 1, -3 do down = down + 1 end
        local floats = 0
        for x = 0, 1, 0.25 do floats = floats + 1 end
        return sum, down, floats
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(55));
    assert_eq!(results[1], LuaValue::Integer(4));
    assert_eq!(results[2], LuaValue::Integer(5));
}

#[test]
fn test_numeric_for_near_integer_limits() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local n = 0
        for i = math.maxinteger - 2, math.maxinteger do n = n + 1 end
        local m = 0
        for i = math.mininteger, math.mininteger + 2 do m = m + 1 end
        return n, m
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(3));
    assert_eq!(results[1], LuaValue::Integer(3));
}

#[test]
fn test_numeric_for_errors() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "for i = 1, 10, 0 do end");
    assert!(message.contains("'for' step is zero"), "{}", message);
    let message = run_err(&mut vm, "for i = {}, 10 do end");
    assert!(message.contains("'for' initial value must be a number"), "{}", message);
    let message = run_err(&mut vm, "for i = 1, 'x' do end");
    assert!(message.contains("'for' limit must be a number"), "{}", message);
}

#[test]
fn test_while_repeat_break() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local i = 0
        while true do
            i = i + 1
            if i >= 5 then break end
        end
        local j = 0
        repeat
            local k = j + 1
            j = k
        until k >= 3
        return i, j
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(5));
    assert_eq!(results[1], LuaValue::Integer(3));
}

#[test]
fn test_if_elseif_else() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local function classify(n)
            if n < 0 then return "neg"
            elseif n == 0 then return "zero"
            else return "pos" end
        end
        return classify(-1), classify(0), classify(3)
        "#,
    );
    assert_eq!(results[0].as_str(), Some("neg"));
    assert_eq!(results[1].as_str(), Some("zero"));
    assert_eq!(results[2].as_str(), Some("pos"));
}

#[test]
fn test_logical_operators_short_circuit() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local calls = 0
        local function touch() calls = calls + 1 return true end
        local a = false and touch()
        local b = true or touch()
        local c = nil or "default"
        return a, b, c, calls
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    assert_eq!(results[1], LuaValue::Boolean(true));
    assert_eq!(results[2].as_str(), Some("default"));
    assert_eq!(results[3], LuaValue::Integer(0));
}

#[test]
fn test_tonumber() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"return tonumber("0x10"), tonumber("  12  "), tonumber("1e2"),
                  tonumber("z", 36), tonumber("ff", 16), tonumber("abc"), tonumber(nil)"#,
    );
    assert_eq!(results[0], LuaValue::Integer(16));
    assert_eq!(results[1], LuaValue::Integer(12));
    assert_eq!(results[2], LuaValue::Float(100.0));
    assert_eq!(results[3], LuaValue::Integer(35));
    assert_eq!(results[4], LuaValue::Integer(255));
    assert_eq!(results[5], LuaValue::Nil);
    assert_eq!(results[6], LuaValue::Nil);
}

#[test]
fn test_type_and_tostring() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"return type(1), type("s"), type({}), type(print), type(nil),
                  tostring(10), tostring(1.5), tostring(nil), tostring(true)"#,
    );
    let names: Vec<_> = results.iter().map(|v| v.as_str().unwrap_or("?").to_string()).collect();
    assert_eq!(
        names,
        vec!["number", "string", "table", "function", "nil", "10", "1.5", "nil", "true"]
    );
}

#[test]
fn test_undefined_global_call() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "undefined_fn()");
    assert!(message.contains("attempt to call a nil value (global 'undefined_fn')"), "{}", message);
    let message = run_err(&mut vm, "local t = {} t.x.y = 1");
    assert!(message.contains("attempt to index a nil value (field 'x')"), "{}", message);
}

#[test]
fn test_comparison_errors() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "return 1 < 'x'");
    assert!(message.contains("attempt to compare number with string"), "{}", message);
    let message = run_err(&mut vm, "return {} < {}");
    assert!(message.contains("attempt to compare two table values"), "{}", message);
}

#[test]
fn test_globals_persist_between_chunks() {
    let mut vm = new_vm();
    run(&mut vm, "counter = 41");
    let results = run(&mut vm, "counter = counter + 1 return counter");
    assert_eq!(results[0], LuaValue::Integer(42));
    assert_eq!(vm.get_global("counter"), LuaValue::Integer(42));
}

// Math library
use super::{new_vm, run, run_err};
use crate::lua_value::LuaValue;

#[test]
fn test_floor_ceil_keep_integers() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        "return math.floor(3.7), math.ceil(3.2), math.floor(-3.5), math.floor(5), math.ceil(1e100)",
    );
    assert_eq!(results[0], LuaValue::Integer(3));
    assert_eq!(results[1], LuaValue::Integer(4));
    assert_eq!(results[2], LuaValue::Integer(-4));
    assert_eq!(results[3], LuaValue::Integer(5));
    // out of integer range stays a float
    assert_eq!(results[4], LuaValue::Float(1e100));
}

#[test]
fn test_max_min_abs() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        "return math.max(1, 5, 3), math.min(4, 2.5, 8), math.abs(-7), math.abs(-2.5), math.max(2)",
    );
    assert_eq!(results[0], LuaValue::Integer(5));
    assert_eq!(results[1], LuaValue::Float(2.5));
    assert_eq!(results[2], LuaValue::Integer(7));
    assert_eq!(results[3], LuaValue::Float(2.5));
    assert_eq!(results[4], LuaValue::Integer(2));

    let message = run_err(&mut vm, "return math.max()");
    assert!(message.contains("bad argument #1 to 'max' (number expected, got no value)"), "{}", message);
}

#[test]
fn test_fmod_and_sqrt() {
    let mut vm = new_vm();
    let results = run(&mut vm, "return math.fmod(7, 3), math.fmod(-7, 3), math.fmod(7.5, 2), math.sqrt(16)");
    assert_eq!(results[0], LuaValue::Integer(1));
    assert_eq!(results[1], LuaValue::Integer(-1));
    assert_eq!(results[2], LuaValue::Float(1.5));
    assert_eq!(results[3], LuaValue::Float(4.0));

    let message = run_err(&mut vm, "return math.fmod(1, 0)");
    assert!(message.contains("bad argument #2 to 'fmod' (zero)"), "{}", message);
}

#[test]
fn test_tointeger_and_type() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"return math.tointeger(3.0), math.tointeger(3.5), math.tointeger("8"),
                  math.type(1), math.type(1.0), math.type("1")"#,
    );
    assert_eq!(results[0], LuaValue::Integer(3));
    assert_eq!(results[1], LuaValue::Nil);
    // numeric strings convert
    assert_eq!(results[2], LuaValue::Integer(8));
    assert_eq!(results[3].as_str(), Some("integer"));
    assert_eq!(results[4].as_str(), Some("float"));
    assert_eq!(results[5], LuaValue::Nil);
}

#[test]
fn test_constants() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        "return math.maxinteger, math.mininteger, math.huge, math.pi, math.maxinteger + 1 == math.mininteger",
    );
    assert_eq!(results[0], LuaValue::Integer(i64::MAX));
    assert_eq!(results[1], LuaValue::Integer(i64::MIN));
    assert_eq!(results[2], LuaValue::Float(f64::INFINITY));
    assert_eq!(results[3], LuaValue::Float(std::f64::consts::PI));
    assert_eq!(results[4], LuaValue::Boolean(true));
}

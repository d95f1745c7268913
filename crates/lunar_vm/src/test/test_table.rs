// Table library, constructors and iteration
use super::{new_vm, run, run_err};
use crate::lua_value::LuaValue;

#[test]
fn test_constructor_and_length() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local function three() return 1, 2, 3 end
        local t = { three(), three() }
        local u = { three(), (three()) }
        local keyed = { x = 1, ["y"] = 2, [10] = 3; 4 }
        return #t, #u, keyed.x + keyed.y + keyed[10] + keyed[1]
        "#,
    );
    // only the last item expands
    assert_eq!(results[0], LuaValue::Integer(4));
    assert_eq!(results[1], LuaValue::Integer(2));
    assert_eq!(results[2], LuaValue::Integer(10));
}

#[test]
fn test_insert_and_remove() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local t = { "a", "c" }
        table.insert(t, 2, "b")
        table.insert(t, "d")
        local removed = table.remove(t, 1)
        local last = table.remove(t)
        return table.concat(t, ","), removed, last, #t
        "#,
    );
    assert_eq!(results[0].as_str(), Some("b,c"));
    assert_eq!(results[1].as_str(), Some("a"));
    assert_eq!(results[2].as_str(), Some("d"));
    assert_eq!(results[3], LuaValue::Integer(2));

    let results = run(&mut vm, "local t = {} return table.remove(t), #t");
    assert_eq!(results, vec![LuaValue::Nil, LuaValue::Integer(0)]);
}

#[test]
fn test_insert_errors() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "table.insert({}, 5, 'x')");
    assert!(message.contains("bad argument #2 to 'insert' (position out of bounds)"), "{}", message);
    let message = run_err(&mut vm, "table.insert({}, 1, 2, 3)");
    assert!(message.contains("wrong number of arguments to 'insert'"), "{}", message);
}

#[test]
fn test_concat() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local t = { 1, "two", 3.5 }
        return table.concat(t), table.concat(t, "-", 2), table.concat(t, "", 3, 2)
        "#,
    );
    assert_eq!(results[0].as_str(), Some("1two3.5"));
    assert_eq!(results[1].as_str(), Some("two-3.5"));
    assert_eq!(results[2].as_str(), Some(""));

    let message = run_err(&mut vm, "return table.concat({ 1, {}, 3 })");
    assert!(message.contains("invalid value (at index 2) in table for 'concat'"), "{}", message);
}

#[test]
fn test_unpack() {
    let mut vm = new_vm();
    let results = run(&mut vm, "return table.unpack({ 1, 2, 3 })");
    assert_eq!(
        results,
        vec![LuaValue::Integer(1), LuaValue::Integer(2), LuaValue::Integer(3)]
    );
    let results = run(&mut vm, "return table.unpack({ 1, 2, 3 }, 2, 4)");
    assert_eq!(results, vec![LuaValue::Integer(2), LuaValue::Integer(3), LuaValue::Nil]);
    let message = run_err(&mut vm, "return table.unpack({}, 1, 1e8)");
    assert!(message.contains("too many results to unpack"), "{}", message);
}

#[test]
fn test_pairs_and_ipairs() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local t = { 10, 20, 30, nil, 50, name = "n" }
        local isum, icount = 0, 0
        for i, v in ipairs(t) do isum = isum + v icount = icount + 1 end
        local keys = 0
        for k, v in pairs(t) do keys = keys + 1 end
        return isum, icount, keys
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(60));
    assert_eq!(results[1], LuaValue::Integer(3));
    assert_eq!(results[2], LuaValue::Integer(5));
}

#[test]
fn test_pairs_metamethod() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local proxy = setmetatable({}, {
            __pairs = function(t)
                local done = false
                return function()
                    if done then return nil end
                    done = true
                    return "only", 1
                end, t, nil
            end,
        })
        local seen = {}
        for k, v in pairs(proxy) do seen[#seen + 1] = k end
        return #seen, seen[1]
        "#,
    );
    assert_eq!(results[0], LuaValue::Integer(1));
    assert_eq!(results[1].as_str(), Some("only"));
}

#[test]
fn test_next_and_raw_access() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        local t = setmetatable({}, { __index = function() return "meta" end, __len = function() return 99 end })
        rawset(t, "k", "v")
        return next({}), rawget(t, "missing"), t.missing, rawlen(t), #t, rawequal(t, t)
        "#,
    );
    assert_eq!(results[0], LuaValue::Nil);
    assert_eq!(results[1], LuaValue::Nil);
    assert_eq!(results[2].as_str(), Some("meta"));
    assert_eq!(results[3], LuaValue::Integer(0));
    assert_eq!(results[4], LuaValue::Integer(99));
    assert_eq!(results[5], LuaValue::Boolean(true));
}

#[test]
fn test_invalid_keys() {
    let mut vm = new_vm();
    let message = run_err(&mut vm, "local t = {} t[nil] = 1");
    assert!(message.contains("index is nil"), "{}", message);
    let message = run_err(&mut vm, "local t = {} t[0/0] = 1");
    assert!(message.contains("index is NaN"), "{}", message);
    // reading with a nil key is fine
    let results = run(&mut vm, "local t = {} return t[nil]");
    assert_eq!(results[0], LuaValue::Nil);
}

#[test]
fn test_float_keys_normalize() {
    let mut vm = new_vm();
    let results = run(&mut vm, "local t = {} t[1.0] = 'one' t[2] = 'two' return t[1], t[2.0], #t");
    assert_eq!(results[0].as_str(), Some("one"));
    assert_eq!(results[1].as_str(), Some("two"));
    assert_eq!(results[2], LuaValue::Integer(2));
}

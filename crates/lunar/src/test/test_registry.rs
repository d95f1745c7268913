// Persistent registry: identities, recycling, lifetime of stored values
use lunar_vm::LuaValue;

use super::{new_engine, run};
use crate::{BridgeError, FailureKind, Identity, RegistryError};

#[test]
fn test_function_survives_between_calls() {
    let mut engine = new_engine();
    let chunk = engine
        .compile("return function(x, y) return math.floor(x + y + 0.5) end")
        .expect("compiles");
    let kept = engine.invoke_keep(&chunk, Vec::new(), 1).expect("runs");
    assert_eq!(kept, 1);
    assert_eq!(engine.pending(), 1);
    let identity = engine.reference_top().expect("stores");
    assert_eq!(engine.pending(), 0);
    assert!(identity.raw() > 0);

    // unrelated work and a full cycle in between
    run(&mut engine, "local t = {} for i = 1, 100 do t[i] = { i } end", 0);
    engine.collect_garbage().expect("collects");

    let func = engine.dereference(identity).expect("live");
    let results = engine
        .call(&func, vec![LuaValue::Float(14.9), LuaValue::Float(27.3)], 1)
        .expect("calls");
    assert_eq!(results, vec![LuaValue::Integer(42)]);

    engine.unreference(identity).expect("releases");
    assert_eq!(
        engine.dereference(identity),
        Err(RegistryError::InvalidIdentity(identity.raw()))
    );
    assert_eq!(
        engine.unreference(identity),
        Err(RegistryError::InvalidIdentity(identity.raw()))
    );
}

#[test]
fn test_nil_identity() {
    let mut engine = new_engine();
    let identity = engine.reference(LuaValue::Nil).expect("nil is fine");
    assert_eq!(identity, Identity::NIL);
    assert!(identity.is_nil());
    assert_eq!(engine.dereference(identity), Ok(LuaValue::Nil));
    assert_eq!(engine.unreference(identity), Ok(()));
}

#[test]
fn test_unknown_identity() {
    let mut engine = new_engine();
    let identity = engine.reference(LuaValue::Integer(1)).expect("stores");
    engine.unreference(identity).expect("releases");
    let results = run(&mut engine, "return 1", 1);
    assert_eq!(results.len(), 1);
    assert!(engine.dereference(identity).is_err());
}

#[test]
fn test_identities_are_reissued() {
    let mut engine = new_engine();
    let first = engine.reference(LuaValue::Integer(1)).expect("stores");
    let second = engine.reference(LuaValue::Integer(2)).expect("stores");
    assert_ne!(first, second);

    engine.unreference(first).expect("releases");
    let third = engine.reference(LuaValue::Integer(3)).expect("stores");
    assert_eq!(third, first);
    assert_eq!(engine.dereference(third), Ok(LuaValue::Integer(3)));
    assert_eq!(engine.dereference(second), Ok(LuaValue::Integer(2)));
    assert_eq!(third.to_string(), format!("#{}", first.raw()));
}

#[test]
fn test_reference_top_needs_a_value() {
    let mut engine = new_engine();
    assert_eq!(engine.reference_top(), Err(RegistryError::EmptyStack));
    engine.push_value(LuaValue::string("kept")).expect("pushes");
    let identity = engine.reference_top().expect("stores");
    let value = engine.dereference(identity).expect("live");
    assert_eq!(value.as_str(), Some("kept"));
}

#[test]
fn test_released_value_is_collected() {
    let mut engine = new_engine();
    let results = run(&mut engine, "return { 1, 2, 3 }", 1);
    let identity = engine.reference(results[0].clone()).expect("stores");
    drop(results);

    engine.collect_garbage().expect("collects");
    let objects = engine.object_count();
    let table = engine.dereference(identity).expect("live");
    let chunk = engine.compile("local t = ... return #t").expect("compiles");
    let length = engine.invoke(&chunk, vec![table], 1).expect("runs");
    assert_eq!(length, vec![LuaValue::Integer(3)]);

    engine.unreference(identity).expect("releases");
    engine.collect_garbage().expect("collects");
    assert_eq!(engine.object_count(), objects - 1);
}

#[test]
fn test_results_outlive_safe_points_until_next_call() {
    let mut engine = new_engine();
    let results = run(&mut engine, "return { 1, 2, 3 }", 1);
    let table = results[0].clone();

    // a push and an explicit cycle are safe points; the results stay rooted
    engine.push(crate::ValueCopy(7i64)).expect("pushes");
    engine.clear_pending();
    engine.collect_garbage().expect("collects");

    let chunk = engine.compile("local t = ... return #t").expect("compiles");
    let length = engine.invoke(&chunk, vec![table.clone()], 1).expect("runs");
    assert_eq!(length, vec![LuaValue::Integer(3)]);
    let identity = engine.reference(table).expect("stores");
    assert_eq!(engine.dereference(identity), Ok(results[0].clone()));
}

#[test]
fn test_collected_results_are_refused() {
    let mut engine = new_engine();
    let table = run(&mut engine, "return { 1, 2, 3 }", 1).remove(0);
    // the next call releases the earlier results
    run(&mut engine, "return 1", 1);
    engine.collect_garbage().expect("collects");

    assert_eq!(
        engine.reference(table.clone()),
        Err(RegistryError::Collected("table"))
    );
    assert_eq!(
        engine.push_value(table.clone()),
        Err(BridgeError::Stale { type_name: "table" })
    );
    assert_eq!(engine.pending(), 0);

    let chunk = engine.compile("local t = ... return #t").expect("compiles");
    let report = engine.invoke(&chunk, vec![table], 1).expect_err("stale argument");
    assert_eq!(report.kind, FailureKind::Runtime);
    assert_eq!(report.message, "attempt to use a collected table value");
    assert_eq!(engine.pending(), 0);

    // the engine keeps working
    let results = run(&mut engine, "return 15 + 27", 1);
    assert_eq!(results, vec![LuaValue::Integer(42)]);
}

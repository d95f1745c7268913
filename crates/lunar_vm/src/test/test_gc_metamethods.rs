// Collector: finalizers, deferred collection, teardown
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{new_vm, run};
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallContext, LuaError, LuaResult};

#[test]
fn test_finalizer_runs_once() {
    let mut vm = new_vm();
    run(
        &mut vm,
        r#"
        finalized = 0
        do
            local t = setmetatable({}, { __gc = function() finalized = finalized + 1 end })
        end
        "#,
    );
    vm.full_gc().expect("collects");
    assert_eq!(vm.get_global("finalized"), LuaValue::Integer(1));
    // resurrected for its finalizer, freed by the next cycle, never finalized twice
    vm.full_gc().expect("collects");
    vm.full_gc().expect("collects");
    assert_eq!(vm.get_global("finalized"), LuaValue::Integer(1));
}

#[test]
fn test_reachable_objects_survive() {
    let mut vm = new_vm();
    run(
        &mut vm,
        r#"
        finalized = 0
        keep = setmetatable({ tag = "kept" }, { __gc = function() finalized = finalized + 1 end })
        "#,
    );
    vm.full_gc().expect("collects");
    assert_eq!(vm.get_global("finalized"), LuaValue::Integer(0));
    let results = run(&mut vm, "return keep.tag");
    assert_eq!(results[0].as_str(), Some("kept"));
}

#[test]
fn test_collectgarbage_inside_call_is_deferred() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        finalized = 0
        do
            setmetatable({}, { __gc = function() finalized = finalized + 1 end })
        end
        collectgarbage()
        return finalized
        "#,
    );
    // no cycle while the chunk was running
    assert_eq!(results[0], LuaValue::Integer(0));
    // the requested cycle ran at the safe point after the chunk returned
    assert_eq!(vm.get_global("finalized"), LuaValue::Integer(1));
}

#[test]
fn test_finalizer_error_reported_after_queue() {
    let mut vm = new_vm();
    run(
        &mut vm,
        r#"
        others = 0
        do
            setmetatable({}, { __gc = function() error("bad finalizer") end })
            setmetatable({}, { __gc = function() others = others + 1 end })
        end
        "#,
    );
    let result = vm.full_gc();
    assert_eq!(result.err(), Some(LuaError::GcMetamethod));
    let message = vm.error_message();
    assert!(message.starts_with("error in __gc metamethod"), "{}", message);
    assert!(message.contains("bad finalizer"), "{}", message);
    assert_eq!(vm.get_global("others"), LuaValue::Integer(1));
}

static CLOSE_FINALIZED: AtomicUsize = AtomicUsize::new(0);

fn count_close_finalizer(_l: &mut CallContext) -> LuaResult<usize> {
    CLOSE_FINALIZED.fetch_add(1, Ordering::SeqCst);
    Ok(0)
}

#[test]
fn test_close_runs_pending_finalizers() {
    let mut vm = new_vm();
    vm.set_global("on_gc", LuaValue::CFunction(count_close_finalizer));
    run(
        &mut vm,
        r#"
        held = setmetatable({}, { __gc = on_gc })
        setmetatable({}, { __gc = on_gc })
        "#,
    );
    vm.close();
    assert!(vm.is_closed());
    // reachable or not, every flagged object was finalized exactly once
    assert_eq!(CLOSE_FINALIZED.load(Ordering::SeqCst), 2);
    vm.close();
    assert_eq!(CLOSE_FINALIZED.load(Ordering::SeqCst), 2);
    assert_eq!(vm.object_count(), 0);
}

static DROPPED: AtomicUsize = AtomicUsize::new(0);

struct Tracked;

impl Drop for Tracked {
    fn drop(&mut self) {
        DROPPED.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_unreachable_userdata_payload_dropped() {
    let mut vm = new_vm();
    let kept = vm.create_userdata(Tracked).expect("allocates");
    vm.stack_push(LuaValue::Userdata(kept));
    vm.create_userdata(Tracked).expect("allocates");
    vm.full_gc().expect("collects");
    assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
    assert!(vm.userdata_ref::<Tracked>(kept).is_some());

    vm.stack_pop();
    vm.full_gc().expect("collects");
    assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
}

#[test]
fn test_stats_and_counts() {
    let mut vm = new_vm();
    // only explicit cycles below
    vm.gc_stop();
    let before = vm.gc_stats();
    run(&mut vm, "for i = 1, 100 do local t = { i } end");
    let live_objects = vm.object_count();
    let freed = vm.full_gc().expect("collects");
    assert!(freed >= 100, "freed {}", freed);
    let after = vm.gc_stats();
    assert_eq!(after.collections, before.collections + 1);
    assert!(after.objects_freed >= before.objects_freed + 100);
    assert_eq!(vm.object_count(), live_objects - freed);
    assert_eq!(after.live_bytes, vm.gc_count_bytes());
}

#[test]
fn test_collectgarbage_options() {
    let mut vm = new_vm();
    let results = run(
        &mut vm,
        r#"
        collectgarbage("stop")
        local stopped = collectgarbage("isrunning")
        collectgarbage("restart")
        return stopped, collectgarbage("isrunning"), math.type(collectgarbage("count"))
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    assert_eq!(results[1], LuaValue::Boolean(true));
    assert_eq!(results[2].as_str(), Some("float"));

    let results = run(&mut vm, "return pcall(collectgarbage, 'bogus')");
    assert_eq!(results[0], LuaValue::Boolean(false));
    let message = results[1].as_str().unwrap_or_default();
    assert!(message.contains("invalid option 'bogus'"), "{}", message);
}

//! Object bridge: native values as runtime handles.
//!
//! A pushed value is moved into a userdata block from the engine allocator.
//! The wrapper type picks the ownership mode, and the mode picks what the
//! script may do with the handle and what happens when it is collected:
//!
//! | wrapper             | script sees        | `__gc`                      |
//! |---------------------|--------------------|-----------------------------|
//! | [`ValueCopy`]       | call returns value | none                        |
//! | [`StructCopy`]      | field reads        | none                        |
//! | [`ExclusiveOwned`]  | field reads        | drops the object            |
//! | [`SharedOwned`]     | field reads        | drops the runtime's `Rc`    |
//!
//! Handles of one wrapper type share a metatable. It is registered under the
//! wrapper's `TypeId`, so distinct types reporting the same name never share
//! one; scripts see `Mode<TypeName>` as its `__name`.

use std::any::TypeId;
use std::cell::RefCell;
use std::mem::align_of;
use std::rc::Rc;

use bitflags::bitflags;
use lunar_vm::lua_vm::lua_limits::MAX_ALIGN;
use lunar_vm::{
    CFunction, CallContext, IntoLua, LuaError, LuaResult, LuaValue, TableId, UdValue,
    UserDataTrait, UserdataId,
};
use tracing::trace;

use crate::engine::Engine;
use crate::error::BridgeError;

bitflags! {
    /// What a script may do with a handle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// `handle(...)` returns the stored value
        const INVOCABLE = 1 << 0;
        /// `handle.name` reads a field
        const FIELD_READABLE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipMode {
    /// Bitwise copy of a scalar
    ValueCopy,
    /// Bitwise copy of a plain struct
    StructCopy,
    /// The runtime owns the object outright
    ExclusiveOwned,
    /// The runtime holds one reference of a shared object
    SharedOwned,
}

impl OwnershipMode {
    pub fn label(self) -> &'static str {
        match self {
            OwnershipMode::ValueCopy => "ValueCopy",
            OwnershipMode::StructCopy => "StructCopy",
            OwnershipMode::ExclusiveOwned => "ExclusiveOwned",
            OwnershipMode::SharedOwned => "SharedOwned",
        }
    }

    /// Whether collecting a handle must run the payload's destructor
    pub fn finalizes(self) -> bool {
        matches!(self, OwnershipMode::ExclusiveOwned | OwnershipMode::SharedOwned)
    }
}

/// Capabilities plus ownership mode; fixes the metatable of a handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorDescriptor {
    pub capabilities: Capabilities,
    pub mode: OwnershipMode,
}

impl BehaviorDescriptor {
    pub const fn new(capabilities: Capabilities, mode: OwnershipMode) -> Self {
        BehaviorDescriptor { capabilities, mode }
    }

    fn metatable_name(&self, type_name: &str) -> String {
        format!("{}<{}>", self.mode.label(), type_name)
    }
}

/// A value the bridge can place into runtime storage.
///
/// Implemented by the four mode wrappers; their bounds decide at compile
/// time which values each mode accepts.
pub trait PushNative: Sized + 'static {
    const BEHAVIOR: BehaviorDescriptor;

    /// Name of the wrapped type
    fn type_name(&self) -> &'static str;

    /// Field `key`; `Ok(None)` reads as nil, `Err` raises in the script
    fn read_field(&self, _key: &str) -> Result<Option<UdValue>, String> {
        Ok(None)
    }

    /// Value produced by calling the handle stored under `id`
    fn call_result(_l: &mut CallContext, _id: UserdataId) -> LuaResult<LuaValue> {
        Ok(LuaValue::Nil)
    }
}

/// Scalar copied into the runtime; calling the handle returns it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueCopy<T>(pub T);

/// Plain struct copied into the runtime; scripts read its fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructCopy<T>(pub T);

/// Object moved into the runtime, dropped exactly once by its finalizer
#[derive(Debug)]
pub struct ExclusiveOwned<T>(pub T);

/// Object shared between host and runtime. The runtime keeps one `Rc`;
/// the object is dropped once the last reference on either side goes.
#[derive(Debug)]
pub struct SharedOwned<T>(pub Rc<RefCell<T>>);

impl<T> SharedOwned<T> {
    /// Wrap another reference to `shared`
    pub fn new(shared: &Rc<RefCell<T>>) -> Self {
        SharedOwned(Rc::clone(shared))
    }
}

impl<T: Copy + IntoLua + 'static> PushNative for ValueCopy<T> {
    const BEHAVIOR: BehaviorDescriptor =
        BehaviorDescriptor::new(Capabilities::INVOCABLE, OwnershipMode::ValueCopy);

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn call_result(l: &mut CallContext, id: UserdataId) -> LuaResult<LuaValue> {
        match l.vm().userdata_ref::<Self>(id).map(|stored| stored.0) {
            Some(value) => value.into_lua(l.vm()),
            None => Err(released(l)),
        }
    }
}

impl<T: Copy + UserDataTrait> PushNative for StructCopy<T> {
    const BEHAVIOR: BehaviorDescriptor =
        BehaviorDescriptor::new(Capabilities::FIELD_READABLE, OwnershipMode::StructCopy);

    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn read_field(&self, key: &str) -> Result<Option<UdValue>, String> {
        Ok(self.0.get_field(key))
    }
}

impl<T: UserDataTrait> PushNative for ExclusiveOwned<T> {
    const BEHAVIOR: BehaviorDescriptor =
        BehaviorDescriptor::new(Capabilities::FIELD_READABLE, OwnershipMode::ExclusiveOwned);

    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn read_field(&self, key: &str) -> Result<Option<UdValue>, String> {
        Ok(self.0.get_field(key))
    }
}

impl<T: UserDataTrait> PushNative for SharedOwned<T> {
    const BEHAVIOR: BehaviorDescriptor =
        BehaviorDescriptor::new(Capabilities::FIELD_READABLE, OwnershipMode::SharedOwned);

    fn type_name(&self) -> &'static str {
        match self.0.try_borrow() {
            Ok(object) => object.type_name(),
            Err(_) => std::any::type_name::<T>(),
        }
    }

    fn read_field(&self, key: &str) -> Result<Option<UdValue>, String> {
        match self.0.try_borrow() {
            Ok(object) => Ok(object.get_field(key)),
            Err(_) => Err(format!("{} is being modified by the host", self.type_name())),
        }
    }
}

/// Runtime-visible reference to a pushed native value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandle {
    id: UserdataId,
    mode: OwnershipMode,
    type_name: &'static str,
}

impl NativeHandle {
    /// The handle as a runtime value, e.g. to pass it as an explicit argument
    #[inline]
    pub fn value(&self) -> LuaValue {
        LuaValue::Userdata(self.id)
    }

    #[inline]
    pub fn mode(&self) -> OwnershipMode {
        self.mode
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl From<NativeHandle> for LuaValue {
    fn from(handle: NativeHandle) -> Self {
        handle.value()
    }
}

// ===== Metamethods shared by every handle type =====

fn handle_id(l: &mut CallContext) -> LuaResult<UserdataId> {
    match l.arg(1) {
        LuaValue::Userdata(id) => Ok(id),
        _ => Err(l.type_error(1, "userdata")),
    }
}

/// Error for a handle whose payload is gone
fn released(l: &mut CallContext) -> LuaError {
    let handle = l.arg(1);
    let name = l.vm().type_name_meta(&handle);
    l.error(format!("attempt to use a released {}", name))
}

fn handle_call<P: PushNative>(l: &mut CallContext) -> LuaResult<usize> {
    let id = handle_id(l)?;
    let value = P::call_result(l, id)?;
    l.push_value(value)?;
    Ok(1)
}

fn handle_index<P: PushNative>(l: &mut CallContext) -> LuaResult<usize> {
    let id = handle_id(l)?;
    let key = l.arg(2);
    let field = l.vm().userdata_ref::<P>(id).map(|payload| match key.as_str() {
        Some(name) => payload.read_field(name),
        None => Ok(None),
    });
    let value = match field {
        Some(Ok(value)) => value.map_or(LuaValue::Nil, UdValue::into_lua_value),
        Some(Err(message)) => return Err(l.error(message)),
        None => return Err(released(l)),
    };
    l.push_value(value)?;
    Ok(1)
}

fn handle_gc(l: &mut CallContext) -> LuaResult<usize> {
    let id = handle_id(l)?;
    if l.vm().finalize_userdata(id) {
        trace!(handle = %id, "native handle finalized");
    }
    Ok(0)
}

impl Engine {
    /// Move `value` into runtime storage and push the handle onto the
    /// working stack, where it waits to become an argument of the next
    /// `invoke` / `call`
    pub fn push<P: PushNative>(&mut self, value: P) -> Result<NativeHandle, BridgeError> {
        let type_name = value.type_name();
        let behavior = P::BEHAVIOR;
        if align_of::<P>() > MAX_ALIGN {
            return Err(BridgeError::Alignment {
                type_name,
                required: align_of::<P>(),
            });
        }
        // safe point: everything the host can still reach is rooted
        if let Err(status) = self.vm.check_gc() {
            let report = self.take_failure(status);
            return Err(BridgeError::Collector(report.message));
        }

        let metatable = self.behavior_metatable::<P>(type_name)?;
        let id = match self.vm.create_userdata(value) {
            Ok(id) => id,
            Err(status) => return Err(self.bridge_failure(type_name, status)),
        };
        if let Err(status) = self.vm.set_userdata_metatable(id, Some(metatable)) {
            return Err(self.bridge_failure(type_name, status));
        }
        self.vm.stack_push(LuaValue::Userdata(id));
        trace!(handle = %id, type_name, mode = behavior.mode.label(), "native value pushed");
        Ok(NativeHandle {
            id,
            mode: behavior.mode,
            type_name,
        })
    }

    /// Host-side view of a pushed payload; `Stale` once it was finalized
    /// or collected
    pub fn native_ref<P: PushNative>(&self, handle: &NativeHandle) -> Result<&P, BridgeError> {
        self.vm
            .userdata_ref::<P>(handle.id)
            .ok_or(BridgeError::Stale {
                type_name: handle.type_name,
            })
    }

    /// Metatable shared by every handle of `P`, created on first use
    fn behavior_metatable<P: PushNative>(
        &mut self,
        type_name: &'static str,
    ) -> Result<TableId, BridgeError> {
        let behavior = P::BEHAVIOR;
        let key = format!("lunar.bridge.{:?}", TypeId::of::<P>());
        let name = behavior.metatable_name(type_name);
        let (metatable, created) = match self.vm.new_metatable(&key, &name) {
            Ok(found) => found,
            Err(status) => return Err(self.bridge_failure(type_name, status)),
        };
        if !created {
            return Ok(metatable);
        }

        let mut events: Vec<(&str, CFunction)> = Vec::with_capacity(3);
        if behavior.capabilities.contains(Capabilities::INVOCABLE) {
            events.push(("__call", handle_call::<P> as CFunction));
        }
        if behavior.capabilities.contains(Capabilities::FIELD_READABLE) {
            events.push(("__index", handle_index::<P> as CFunction));
        }
        if behavior.mode.finalizes() {
            events.push(("__gc", handle_gc as CFunction));
        }
        for (event, handler) in events {
            let key = LuaValue::string(event);
            if let Err(status) = self
                .vm
                .table_set_raw(metatable, &key, LuaValue::CFunction(handler))
            {
                return Err(self.bridge_failure(type_name, status));
            }
        }
        Ok(metatable)
    }

    fn bridge_failure(&mut self, type_name: &'static str, status: LuaError) -> BridgeError {
        self.vm.clear_error();
        match status {
            LuaError::MemoryError => BridgeError::OutOfMemory { type_name },
            _ => BridgeError::Stale { type_name },
        }
    }
}

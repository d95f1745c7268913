// Persistent registry
// Values stored here stay alive independently of the working stack until the
// host releases their identity. Released identities are handed out again.

use std::fmt;

use lunar_vm::{LUA_REFNIL, LuaValue, RefId};
use tracing::trace;

use crate::engine::Engine;
use crate::error::RegistryError;

/// Host-visible handle to a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(RefId);

impl Identity {
    /// Identity of nil; never occupies a slot and always dereferences to nil
    pub const NIL: Identity = Identity(LUA_REFNIL);

    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self == Identity::NIL
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Engine {
    /// Store `value` and return its identity. Values from earlier calls
    /// stay valid until the next call; a value collected since then is
    /// refused.
    pub fn reference(&mut self, value: LuaValue) -> Result<Identity, RegistryError> {
        if !self.vm.is_live(&value) {
            return Err(RegistryError::Collected(value.type_name()));
        }
        match self.vm.registry_ref(value) {
            Ok(id) => {
                trace!(identity = id, "registry reference");
                Ok(Identity(id))
            }
            Err(_) => {
                self.vm.clear_error();
                Err(RegistryError::Exhausted)
            }
        }
    }

    /// Pop the top of the working stack (typically a result kept by
    /// `invoke_keep`) and store it
    pub fn reference_top(&mut self) -> Result<Identity, RegistryError> {
        let value = self.vm.stack_pop().ok_or(RegistryError::EmptyStack)?;
        self.reference(value)
    }

    pub fn dereference(&self, identity: Identity) -> Result<LuaValue, RegistryError> {
        self.vm
            .registry_get(identity.0)
            .ok_or(RegistryError::InvalidIdentity(identity.0))
    }

    /// Release `identity`; its value becomes collectable unless reachable
    /// some other way
    pub fn unreference(&mut self, identity: Identity) -> Result<(), RegistryError> {
        if self.vm.registry_unref(identity.0) {
            trace!(identity = identity.0, "registry release");
            Ok(())
        } else {
            Err(RegistryError::InvalidIdentity(identity.0))
        }
    }
}

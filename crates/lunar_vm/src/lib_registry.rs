// Standard library installation
// Each library is a `LibraryModule`: a name plus the entries installed under
// it. `open_libs` installs the standard set; hosts may install their own
// modules the same way.

use crate::lua_value::{CFunction, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib;

/// Builds a value that needs the VM (tables, the globals table, constants)
pub type ValueInitializer = fn(&mut LuaVM) -> LuaResult<LuaValue>;

pub enum LibraryEntry {
    Function(CFunction),
    Value(ValueInitializer),
}

impl LibraryEntry {
    fn materialize(&self, vm: &mut LuaVM) -> LuaResult<LuaValue> {
        match self {
            LibraryEntry::Function(f) => Ok(LuaValue::CFunction(*f)),
            LibraryEntry::Value(init) => init(vm),
        }
    }
}

/// Named set of entries. The name `_G` installs the entries as globals,
/// any other name installs them into a global table of that name.
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        LibraryModule {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: &'static str, init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(init)));
        self
    }

    fn is_global_scope(&self) -> bool {
        self.name == "_G"
    }

    /// Install into `vm`; returns the library table (nil for `_G`)
    pub fn install(&self, vm: &mut LuaVM) -> LuaResult<LuaValue> {
        if self.is_global_scope() {
            for (name, entry) in &self.entries {
                let value = entry.materialize(vm)?;
                vm.set_global(name, value);
            }
            return Ok(LuaValue::Nil);
        }

        let table = vm.create_table(0, self.entries.len())?;
        let Some(id) = table.as_table_id() else {
            return Err(vm.error("library table creation failed"));
        };
        for (name, entry) in &self.entries {
            let value = entry.materialize(vm)?;
            vm.table_set_raw(id, &LuaValue::string(name), value)?;
        }
        vm.set_global(self.name, table.clone());
        Ok(table)
    }
}

/// `lib_module!("name", { "fn" => native, ... })` builds a module of
/// native functions; chain `.with_value` for the rest
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module
                .entries
                .push(($item_name, $crate::lib_registry::LibraryEntry::Function($item)));
        )*
        module
    }};
}

/// Ordered set of modules installed together
#[derive(Default)]
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, vm: &mut LuaVM) -> LuaResult<()> {
        for module in &self.modules {
            let table = module.install(vm)?;
            if module.name == "string" {
                install_string_metatable(vm, table)?;
            }
        }
        Ok(())
    }
}

/// Strings share one metatable whose `__index` is the string library, so
/// `s:upper()` works
fn install_string_metatable(vm: &mut LuaVM, library: LuaValue) -> LuaResult<()> {
    let meta = vm.create_table(0, 1)?;
    if let Some(meta_id) = meta.as_table_id() {
        vm.table_set_raw(meta_id, &LuaValue::string("__index"), library)?;
        vm.set_string_metatable(Some(meta_id));
    }
    Ok(())
}

/// basic, string, table and math
pub fn create_standard_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    registry.register(stdlib::basic::create_basic_lib());
    registry.register(stdlib::string::create_string_lib());
    registry.register(stdlib::table::create_table_lib());
    registry.register(stdlib::math::create_math_lib());
    registry
}

// Table library
// Implements: concat, insert, remove, unpack

use crate::gc::TableId;
use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallContext, LuaResult};

/// Upper bound on the values `unpack` may produce in one call
const MAX_UNPACK: u64 = 1 << 20;

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "concat" => table_concat,
        "insert" => table_insert,
        "remove" => table_remove,
        "unpack" => table_unpack,
    })
}

fn raw_len(l: &mut CallContext, table: TableId) -> i64 {
    l.vm.get_table(table).map_or(0, |t| t.len() as i64)
}

fn raw_geti(l: &mut CallContext, table: TableId, index: i64) -> LuaValue {
    l.vm.get_table(table).map_or(LuaValue::Nil, |t| t.get_int(index))
}

fn raw_seti(l: &mut CallContext, table: TableId, index: i64, value: LuaValue) {
    if let Some(t) = l.vm.get_table_mut(table) {
        t.set_int(index, value);
    }
}

/// table.insert(list, [pos,] value)
fn table_insert(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let end = raw_len(l, table) + 1;
    match l.arg_count() {
        2 => {
            let value = l.arg(2);
            raw_seti(l, table, end, value);
        }
        3 => {
            let pos = l.check_integer(2)?;
            if pos < 1 || pos > end {
                return Err(l.arg_error(2, "position out of bounds"));
            }
            for i in (pos + 1..=end).rev() {
                let moved = raw_geti(l, table, i - 1);
                raw_seti(l, table, i, moved);
            }
            let value = l.arg(3);
            raw_seti(l, table, pos, value);
        }
        _ => return Err(l.error("wrong number of arguments to 'insert'")),
    }
    Ok(0)
}

/// table.remove(list [, pos])
fn table_remove(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let size = raw_len(l, table);
    let mut pos = l.opt_integer(2, size)?;
    if pos != size && (pos as u64).wrapping_sub(1) > size as u64 {
        return Err(l.arg_error(2, "position out of bounds"));
    }
    let removed = raw_geti(l, table, pos);
    while pos < size {
        let next = raw_geti(l, table, pos + 1);
        raw_seti(l, table, pos, next);
        pos += 1;
    }
    raw_seti(l, table, pos, LuaValue::Nil);
    l.push_value(removed)?;
    Ok(1)
}

/// table.concat(list [, sep [, i [, j]]])
fn table_concat(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let sep = match l.arg(2) {
        LuaValue::Nil => "".into(),
        _ => l.check_string(2)?,
    };
    let i = l.opt_integer(3, 1)?;
    let len = raw_len(l, table);
    let j = l.opt_integer(4, len)?;

    let mut result = String::new();
    let mut index = i;
    while index <= j {
        let value = raw_geti(l, table, index);
        let Some(s) = value.to_str_coerce() else {
            let message = format!(
                "invalid value (at index {}) in table for 'concat'",
                index
            );
            return Err(l.error(message));
        };
        result.push_str(&s);
        if index == j {
            break;
        }
        result.push_str(&sep);
        index += 1;
    }
    l.push_value(LuaValue::string_owned(result))?;
    Ok(1)
}

/// table.unpack(list [, i [, j]]) - honors `__index`
fn table_unpack(l: &mut CallContext) -> LuaResult<usize> {
    let list = l.arg(1);
    let i = l.opt_integer(2, 1)?;
    let j = match l.arg(3) {
        LuaValue::Nil => match l.vm.try_len(&list)? {
            Some(len) => len.to_integer().unwrap_or(0),
            None => return Err(l.type_error(1, "table")),
        },
        _ => l.check_integer(3)?,
    };
    if i > j {
        return Ok(0);
    }
    let count = (j as u64).wrapping_sub(i as u64);
    if count >= MAX_UNPACK {
        return Err(l.error("too many results to unpack"));
    }
    let mut values = Vec::with_capacity(count as usize + 1);
    let mut index = i;
    loop {
        values.push(l.vm.index_value(&list, &LuaValue::Integer(index))?);
        if index == j {
            break;
        }
        index += 1;
    }
    Ok(l.push_values(values))
}

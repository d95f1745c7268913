// Lua table: an array part for the keys 1..=n plus an insertion-ordered
// node list indexed by a hash map.
//
// Invariants:
// - the last array element is never nil (trailing nils are trimmed);
// - the node part never holds a live entry for key `array.len() + 1`
//   (such keys migrate into the array as soon as it grows), so
//   `array.len()` is always a valid border for `#`.
// - removing a node leaves a tombstone (value nil) so `next` keeps working
//   while a traversal clears fields; tombstones are compacted only when a
//   new key is inserted.

use std::mem::size_of;
use std::rc::Rc;

use ahash::AHashMap;

use crate::gc::{FunctionId, TableId, UserdataId};
use crate::lua_value::{LuaValue, float_to_integer};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum TableKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Table(TableId),
    Function(FunctionId),
    CFunction(usize),
    Userdata(UserdataId),
}

/// Reasons a key cannot be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKeyError {
    Nil,
    NaN,
}

impl TableKeyError {
    pub fn message(self) -> &'static str {
        match self {
            TableKeyError::Nil => "table index is nil",
            TableKeyError::NaN => "table index is NaN",
        }
    }
}

/// Normalized key: floats with an integral value collapse onto integers
fn normalize_key(key: &LuaValue) -> Result<TableKey, TableKeyError> {
    Ok(match key {
        LuaValue::Nil => return Err(TableKeyError::Nil),
        LuaValue::Boolean(b) => TableKey::Bool(*b),
        LuaValue::Integer(i) => TableKey::Int(*i),
        LuaValue::Float(f) => {
            if f.is_nan() {
                return Err(TableKeyError::NaN);
            }
            match float_to_integer(*f) {
                Some(i) => TableKey::Int(i),
                None => TableKey::Float(f.to_bits()),
            }
        }
        LuaValue::String(s) => TableKey::Str(s.clone()),
        LuaValue::Table(id) => TableKey::Table(*id),
        LuaValue::Function(id) => TableKey::Function(*id),
        LuaValue::CFunction(f) => TableKey::CFunction(*f as usize),
        LuaValue::Userdata(id) => TableKey::Userdata(*id),
    })
}

fn key_value(key: &LuaValue) -> LuaValue {
    match key {
        LuaValue::Float(f) => match float_to_integer(*f) {
            Some(i) => LuaValue::Integer(i),
            None => key.clone(),
        },
        _ => key.clone(),
    }
}

#[derive(Default)]
pub struct LuaTable {
    array: Vec<LuaValue>,
    nodes: Vec<(LuaValue, LuaValue)>,
    index: AHashMap<TableKey, usize>,
    tombstones: usize,
    pub(crate) metatable: Option<TableId>,
}

impl LuaTable {
    pub fn new(array_size: usize, hash_size: usize) -> Self {
        LuaTable {
            array: Vec::with_capacity(array_size),
            nodes: Vec::with_capacity(hash_size),
            index: AHashMap::with_capacity(hash_size),
            tombstones: 0,
            metatable: None,
        }
    }

    #[inline]
    pub fn metatable(&self) -> Option<TableId> {
        self.metatable
    }

    #[inline]
    fn array_slot(&self, key: i64) -> Option<usize> {
        if key >= 1 && (key as u64) <= self.array.len() as u64 {
            Some(key as usize - 1)
        } else {
            None
        }
    }

    pub fn get_int(&self, key: i64) -> LuaValue {
        if let Some(slot) = self.array_slot(key) {
            return self.array[slot].clone();
        }
        self.get_node(&TableKey::Int(key))
    }

    pub fn get_str(&self, key: &str) -> LuaValue {
        self.get_node(&TableKey::Str(Rc::from(key)))
    }

    fn get_node(&self, key: &TableKey) -> LuaValue {
        match self.index.get(key) {
            Some(&i) => self.nodes[i].1.clone(),
            None => LuaValue::Nil,
        }
    }

    /// Raw read; invalid keys (nil, NaN) simply read as nil
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        match normalize_key(key) {
            Ok(TableKey::Int(i)) => self.get_int(i),
            Ok(k) => self.get_node(&k),
            Err(_) => LuaValue::Nil,
        }
    }

    /// Raw write; assigning nil removes the entry
    pub fn raw_set(&mut self, key: &LuaValue, value: LuaValue) -> Result<(), TableKeyError> {
        match normalize_key(key)? {
            TableKey::Int(i) => self.set_int(i, value),
            k => self.set_node(k, key_value(key), value),
        }
        Ok(())
    }

    pub fn set_int(&mut self, key: i64, value: LuaValue) {
        if let Some(slot) = self.array_slot(key) {
            self.array[slot] = value;
            if slot + 1 == self.array.len() {
                while matches!(self.array.last(), Some(LuaValue::Nil)) {
                    self.array.pop();
                }
            }
            return;
        }

        if key >= 1 && key as u64 == self.array.len() as u64 + 1 && !value.is_nil() {
            // drop a possible node for this key, then grow and pull successors in
            self.set_node(TableKey::Int(key), LuaValue::Integer(key), LuaValue::Nil);
            self.array.push(value);
            self.migrate_to_array();
            return;
        }

        self.set_node(TableKey::Int(key), LuaValue::Integer(key), value);
    }

    pub fn set_str(&mut self, key: &str, value: LuaValue) {
        let key: Rc<str> = Rc::from(key);
        self.set_node(TableKey::Str(key.clone()), LuaValue::String(key), value);
    }

    fn migrate_to_array(&mut self) {
        loop {
            let next = self.array.len() as i64 + 1;
            let Some(&i) = self.index.get(&TableKey::Int(next)) else {
                break;
            };
            if self.nodes[i].1.is_nil() {
                break;
            }
            let value = std::mem::take(&mut self.nodes[i].1);
            self.tombstones += 1;
            self.array.push(value);
        }
    }

    fn set_node(&mut self, key: TableKey, key_value: LuaValue, value: LuaValue) {
        if let Some(&i) = self.index.get(&key) {
            let was_nil = self.nodes[i].1.is_nil();
            let is_nil = value.is_nil();
            self.nodes[i].1 = value;
            match (was_nil, is_nil) {
                (false, true) => self.tombstones += 1,
                (true, false) => self.tombstones -= 1,
                _ => {}
            }
            return;
        }
        if value.is_nil() {
            return;
        }
        if self.tombstones > 8 && self.tombstones * 2 > self.nodes.len() {
            self.compact();
        }
        self.index.insert(key, self.nodes.len());
        self.nodes.push((key_value, value));
    }

    fn compact(&mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        self.index.clear();
        for (key, value) in nodes {
            if value.is_nil() {
                continue;
            }
            if let Ok(k) = normalize_key(&key) {
                self.index.insert(k, self.nodes.len());
                self.nodes.push((key, value));
            }
        }
        self.tombstones = 0;
    }

    /// Border of the table (`#t` without metamethods)
    #[inline]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.nodes.len() == self.tombstones
    }

    /// Traversal step: the entry after `key` (nil starts the traversal).
    /// `Err` when `key` is not present in the table.
    pub fn next(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, ()> {
        let mut array_pos = 0;
        let mut node_pos = 0;
        match key {
            LuaValue::Nil => {}
            _ => {
                let k = normalize_key(key).map_err(|_| ())?;
                match k {
                    TableKey::Int(i) if self.array_slot(i).is_some() => array_pos = i as usize,
                    // array entries cleared during the traversal trim the
                    // array; such keys resume at the node part
                    TableKey::Int(i) if i >= 1 && !self.index.contains_key(&k) => {
                        array_pos = self.array.len();
                    }
                    k => {
                        array_pos = self.array.len();
                        node_pos = *self.index.get(&k).ok_or(())? + 1;
                    }
                }
            }
        }

        for i in array_pos..self.array.len() {
            if !self.array[i].is_nil() {
                return Ok(Some((LuaValue::Integer(i as i64 + 1), self.array[i].clone())));
            }
        }
        for (key, value) in self.nodes.iter().skip(node_pos) {
            if !value.is_nil() {
                return Ok(Some((key.clone(), value.clone())));
            }
        }
        Ok(None)
    }

    /// Every key and value, for the collector's traversal
    pub(crate) fn for_each_value(&self, mut f: impl FnMut(&LuaValue)) {
        for value in &self.array {
            f(value);
        }
        for (key, value) in &self.nodes {
            if !value.is_nil() {
                f(key);
                f(value);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.array.clear();
        self.nodes.clear();
        self.index.clear();
        self.tombstones = 0;
        self.metatable = None;
    }

    pub fn estimate_size(&self) -> usize {
        size_of::<LuaTable>()
            + self.array.capacity() * size_of::<LuaValue>()
            + self.nodes.capacity() * size_of::<(LuaValue, LuaValue)>()
            + self.index.capacity() * (size_of::<TableKey>() + size_of::<usize>())
    }
}

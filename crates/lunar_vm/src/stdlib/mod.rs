// Standard libraries installed by `LuaVM::open_libs`

pub mod basic;
pub mod math;
pub mod string;
pub mod table;

//! The back end: the instruction array, value stack, registers, named
//! memory, label table, and dispatch loop (§2 component 6, §4.6).

pub mod engine;
pub mod instruction;
pub mod labels;

pub use engine::{Engine, EngineState, RuntimeErrorInfo};

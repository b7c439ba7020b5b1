//! Interactive Small Basic (ISB): a compiler that lowers a small
//! BASIC-dialect scripting language to a labelled stack-machine assembly,
//! and the VM that runs it. See the component modules for the two
//! entry points (`compiler`, `runtime`) and the incremental driver that
//! ties them into a REPL (`incremental`).

pub mod cli;
pub mod compiler;
pub mod diagnostics;
pub mod incremental;
pub mod runtime;
pub mod value;

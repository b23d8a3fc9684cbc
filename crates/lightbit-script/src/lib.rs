//! # lightbit-script
//!
//! A Bitcoin Script interpreter: a deterministic stack machine with the
//! consensus-visible limits of the reference client.
//!
//! Scripts are parsed into chunks (opcodes and data pushes), then executed
//! against a pair of stacks and a transaction context. The entry point used
//! by transaction verification is [`Script::correctly_spends`], which runs
//! an unlocking script followed by the locking script it spends, with
//! optional pay-to-script-hash evaluation.

mod error;
mod interpreter;
mod num;
mod script;
mod stack;

pub mod opcodes;

pub use error::{ScriptError, ScriptResult};
pub use interpreter::{
    execute_script, MAX_MULTISIG_KEYS, MAX_OPS_PER_SCRIPT, MAX_STACK_SIZE,
};
pub use num::{cast_to_bool, decode_num, encode_num};
pub use script::{Builder, Chunk, Script, MAX_ELEMENT_SIZE, MAX_SCRIPT_SIZE};
pub use stack::Stack;

//! RISC-V (RV32IMF, RARS/SPIM flavour) code generation.

mod arrays;
pub mod asm;
pub mod builtins;
pub mod control_flow;
pub mod data;
pub mod emitter;
pub mod error;
pub mod shadow_stack;

use std::fmt;

pub use asm::{Instruction, Opcode, Register};
pub use data::DataSection;
pub use emitter::CodeGenerator;
pub use error::{CodegenError, CodegenErrorKind};

/// A complete assembly file: data section, program text, then the runtime
/// routines the program uses.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub data: DataSection,
    pub instructions: Vec<Instruction>,
    pub runtime: Vec<Instruction>,
    /// Builtin routines in the order they were first requested.
    pub used_builtins: Vec<&'static str>,
}

impl Assembly {
    pub fn uses(&self, builtin: &str) -> bool {
        self.used_builtins.contains(&builtin)
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.data)?;
        writeln!(f)?;
        writeln!(f, ".text")?;
        writeln!(f, ".globl main")?;
        writeln!(f, "main:")?;
        writeln!(f, "    la t6, heap")?;
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        writeln!(f, "    li a7, 10")?;
        writeln!(f, "    ecall")?;
        for instruction in &self.runtime {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

pub mod codegen;

use oak_common::ast::Program;
use oak_common::manifest::GeneratorConfig;

pub use codegen::{Assembly, CodeGenerator, CodegenError, CodegenErrorKind};

/// Generate assembly for a program with the default configuration.
pub fn generate(program: &Program) -> Result<Assembly, CodegenError> {
    CodeGenerator::new().generate(program)
}

pub fn generate_with_config(
    program: &Program,
    config: GeneratorConfig,
) -> Result<Assembly, CodegenError> {
    CodeGenerator::with_config(config).generate(program)
}

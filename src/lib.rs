//! toycc - compiler for a single-type C-like toy language.
//!
//! Every value in the language is a 32-bit signed integer. Programs are a
//! sequence of global variable declarations and function definitions;
//! execution starts at `main`. The compiler lexes and parses sources into
//! an AST, lowers the AST to a block-structured IR, optimizes it, and hands
//! the result to a Cranelift backend that emits a linkable object file or
//! runs the program in-process.

#![warn(missing_docs)]

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod ir;
pub mod lexer;
pub mod optimize;
pub mod parser;
pub mod symtab;

use std::path::Path;

/// Compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main compiler interface.
pub struct Compiler {
    /// Optimization level; 0 disables the pass pipeline.
    pub opt_level: u8,
    /// Target architecture.
    pub target: String,
}

impl Compiler {
    /// Create a compiler with default settings.
    pub fn new() -> Self {
        Self {
            opt_level: 1,
            target: std::env::consts::ARCH.to_string(),
        }
    }

    /// Compile a source file into IR. The module is named after the file
    /// stem.
    pub fn compile_file(&self, path: &Path) -> Result<ir::Module, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            CompileError::FrontendError(format!("failed to read '{}': {}", path.display(), err))
        })?;
        let module_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("program");
        self.compile_source(&source, module_name)
    }

    /// Compile source text into IR.
    pub fn compile_source(
        &self,
        source: &str,
        module_name: &str,
    ) -> Result<ir::Module, CompileError> {
        let tokens = lexer::lex(source)
            .map_err(|err| CompileError::FrontendError(err.to_string()))?;
        let mut parser = parser::Parser::new(tokens);
        let program = parser
            .parse_program()
            .map_err(|err| CompileError::FrontendError(err.to_string()))?;
        self.compile_program(&program, module_name)
    }

    /// Compile a parsed program into IR: check that `main` exists, collect
    /// globals, lower, verify, and optimize.
    pub fn compile_program(
        &self,
        program: &ast::AstNode,
        module_name: &str,
    ) -> Result<ir::Module, CompileError> {
        if !ast::has_main_function(program) {
            return Err(CompileError::MissingMain);
        }

        let globals = ast::collect_global_vars(program);
        let mut module = codegen::CodeGenerator::new(module_name).generate(program, &globals)?;

        if self.opt_level > 0 {
            optimize::PassManager::standard().run(&mut module);
        }
        Ok(module)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compilation errors.
#[derive(Debug)]
pub enum CompileError {
    /// Frontend (read/lex/parse) error.
    FrontendError(String),
    /// The program defines no `main` function.
    MissingMain,
    /// The program cannot be lowered to IR.
    LoweringError(String),
    /// IR validation failed; always a compiler bug.
    InvalidIr(String),
    /// Backend error.
    BackendError(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::FrontendError(msg) => write!(f, "frontend error: {}", msg),
            CompileError::MissingMain => write!(f, "program defines no 'main' function"),
            CompileError::LoweringError(msg) => write!(f, "lowering error: {}", msg),
            CompileError::InvalidIr(msg) => write!(f, "invalid IR: {}", msg),
            CompileError::BackendError(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_main_is_rejected_before_lowering() {
        let compiler = Compiler::new();
        let result = compiler.compile_source("int helper() { return 1; }", "test");
        assert!(matches!(result, Err(CompileError::MissingMain)));
    }

    #[test]
    fn minimal_program_compiles() {
        let compiler = Compiler::new();
        let module = compiler
            .compile_source("int main() { return 0; }", "test")
            .expect("must compile");
        assert!(module.function("main").is_some());
    }
}

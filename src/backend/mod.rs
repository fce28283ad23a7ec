//! Machine-code backends.

pub mod cranelift;

pub use cranelift::CraneliftBackend;

use crate::ir::Module;
use crate::CompileError;

/// A code generator turning verified IR into linkable object bytes.
pub trait Backend {
    /// Generate an object file image from the module.
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Target architectures this backend can emit for.
    fn supported_targets(&self) -> &[&str];
}

//! Compile step seam.

use tsx_engine::TranspileError;

/// Lowers (possibly annotated) TypeScript to JavaScript Node can run.
#[cfg_attr(test, mockall::automock)]
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<String, TranspileError>;
}

/// SWC-backed compiler from `tsx-engine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcCompiler;

impl Compiler for SwcCompiler {
    fn compile(&self, source: &str) -> Result<String, TranspileError> {
        tsx_engine::transpile(source)
    }
}

//! `RuntimeStatic` (§3, §6): the output unit the core hands to the (out of
//! scope) C emitter — one of `Function`, `StaticConstant`, `StaticVariable`.

use std::rc::Rc;

use index_vec::IndexVec;
use talc_source::{FileRange, SourcePath};
use talc_types::CallingConvention;

use crate::ir::{BasicBlockId, Block, DebugScope, IrConstantValue};
use crate::ty::IrType;

#[derive(Debug, Clone)]
pub struct FunctionStatic {
    pub parameters: Vec<IrType>,
    pub has_return: bool,
    pub return_type: Option<IrType>,
    pub is_external: bool,
    pub blocks: IndexVec<BasicBlockId, Block>,
    pub external_libraries: Vec<Rc<str>>,
    pub calling_convention: CallingConvention,
    pub debug_scopes: Vec<DebugScope>,
}

impl FunctionStatic {
    /// Every block must end in a terminator (P5). Returns the indices of
    /// any block that doesn't, for diagnostics/tests.
    pub fn ill_terminated_blocks(&self) -> Vec<BasicBlockId> {
        self.blocks
            .iter_enumerated()
            .filter(|(_, block)| !block.is_terminated())
            .map(|(id, _)| id)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StaticConstantStatic {
    pub ty: IrType,
    pub value: IrConstantValue,
}

#[derive(Debug, Clone)]
pub struct StaticVariableStatic {
    pub ty: IrType,
    pub is_external: bool,
    pub external_libraries: Vec<Rc<str>>,
    pub initial_value: Option<IrConstantValue>,
}

#[derive(Debug, Clone)]
pub enum RuntimeStaticKind {
    Function(FunctionStatic),
    StaticConstant(StaticConstantStatic),
    StaticVariable(StaticVariableStatic),
}

/// A single named output of the core (§6: "a list of `RuntimeStatic*`").
#[derive(Debug, Clone)]
pub struct RuntimeStatic {
    pub name: Rc<str>,
    pub is_no_mangle: bool,
    pub path: Option<SourcePath>,
    pub range: FileRange,
    pub kind: RuntimeStaticKind,
}

impl RuntimeStatic {
    pub fn as_function(&self) -> Option<&FunctionStatic> {
        match &self.kind {
            RuntimeStaticKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// The architecture-size record plus the de-duplicated list of external
/// library names, handed to the C emitter alongside the `RuntimeStatic`
/// list (§6).
#[derive(Debug, Clone)]
pub struct CompilationOutput {
    pub statics: Vec<RuntimeStatic>,
    pub external_libraries: Vec<Rc<str>>,
    pub sizes: talc_target::ArchitectureSizes,
}

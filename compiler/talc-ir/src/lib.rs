//! The HLIR model (§3, §4.6, §6): [`ty::IrType`], the instruction/block
//! model in [`ir`], and the [`runtime_static`] output types.

pub mod ir;
pub mod runtime_static;
pub mod ty;

pub use ir::{
    AsmBinding, BasicBlockId, Block, BlockArena, BooleanArithmeticOp, DebugScope, FloatArithmeticOp,
    FloatComparisonOp, Instruction, InstructionKind, IntegerArithmeticOp, IntegerComparisonOp,
    IrConstantValue, Intrinsic, Register,
};
pub use runtime_static::{
    CompilationOutput, FunctionStatic, RuntimeStatic, RuntimeStaticKind, StaticConstantStatic,
    StaticVariableStatic,
};
pub use ty::IrType;

//! The HLIR instruction set and block model (§3, §4.6). Every instruction
//! carries its `kind`, source `range`, and emitting `debug_scope_index`
//! (§6). A `Block` is a flat `Vec<Instruction>` whose final element is
//! always one of `Jump`/`Branch`/`Return*` (§4.6 block management, P5).

use std::rc::Rc;

use index_vec::{define_index_type, IndexVec};
use talc_source::FileRange;
use talc_types::CallingConvention;

use crate::ty::IrType;

define_index_type! {
    /// A register within a single function's monotonic register space.
    pub struct Register = u32;
}

define_index_type! {
    /// A basic block within a single function.
    pub struct BasicBlockId = u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerArithmeticOp {
    Add,
    Subtract,
    Multiply,
    SignedDivide,
    UnsignedDivide,
    SignedModulus,
    UnsignedModulus,
    BitwiseAnd,
    BitwiseOr,
    LeftShift,
    RightShift,
    RightArithmeticShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerComparisonOp {
    Equal,
    NotEqual,
    SignedLessThan,
    UnsignedLessThan,
    SignedGreaterThan,
    UnsignedGreaterThan,
    SignedLessOrEqual,
    UnsignedLessOrEqual,
    SignedGreaterOrEqual,
    UnsignedGreaterOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanArithmeticOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Sqrt,
    Abs,
    Floor,
    Ceil,
}

/// A compile-time-known value, used by `Literal` and by `StaticConstant`'s
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IrConstantValue {
    Integer(u64),
    Float(f64),
    Boolean(bool),
    Aggregate(Vec<IrConstantValue>),
}

#[derive(Debug, Clone)]
pub struct AsmBinding {
    pub constraint: Rc<str>,
    /// An input binding: the register holding the value.
    pub input_register: Option<Register>,
    /// An output binding (constraint starting with `=`): the pointer to an
    /// addressed destination plus its pointed-to type.
    pub output: Option<(Register, IrType)>,
}

/// The closed sum of instruction shapes (§3, §4.6).
#[derive(Debug, Clone)]
pub enum InstructionKind {
    IntegerArithmeticOperation {
        op: IntegerArithmeticOp,
        size: talc_types::IntegerSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    IntegerComparisonOperation {
        op: IntegerComparisonOp,
        size: talc_types::IntegerSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    IntegerExtension { is_signed: bool, source: Register, destination: Register, destination_size: talc_types::IntegerSize },
    IntegerTruncation { source: Register, destination: Register, destination_size: talc_types::IntegerSize },
    FloatArithmeticOperation {
        op: FloatArithmeticOp,
        size: talc_types::FloatSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    FloatComparisonOperation {
        op: FloatComparisonOp,
        size: talc_types::FloatSize,
        source_a: Register,
        source_b: Register,
        destination: Register,
    },
    FloatConversion { source: Register, destination: Register, destination_size: talc_types::FloatSize },
    FloatFromInteger { is_signed: bool, source: Register, destination: Register, destination_size: talc_types::FloatSize },
    IntegerFromFloat { source: Register, destination: Register, destination_size: talc_types::IntegerSize },
    PointerEquality { negate: bool, source_a: Register, source_b: Register, destination: Register },
    PointerFromInteger { source: Register, destination: Register },
    IntegerFromPointer { source: Register, destination: Register, destination_size: talc_types::IntegerSize },
    BooleanArithmeticOperation { op: BooleanArithmeticOp, source_a: Register, source_b: Register, destination: Register },
    BooleanEquality { negate: bool, source_a: Register, source_b: Register, destination: Register },
    BooleanInversion { source: Register, destination: Register },
    AssembleStaticArray { element_type: IrType, elements: Vec<Register>, destination: Register },
    ReadStaticArrayElement { element_type: IrType, source: Register, index: u64, destination: Register },
    AssembleStruct { members: Vec<Register>, destination: Register },
    ReadStructMember { struct_type: IrType, source: Register, member_index: usize, destination: Register },
    Literal { ty: IrType, value: IrConstantValue, destination: Register },
    Jump { target: BasicBlockId },
    Branch { condition: Register, true_target: BasicBlockId, false_target: BasicBlockId },
    FunctionCall {
        callee: Register,
        parameters: Vec<Register>,
        has_return: bool,
        return_type: Option<IrType>,
        return_register: Option<Register>,
        calling_convention: CallingConvention,
    },
    IntrinsicCall { intrinsic: Intrinsic, arguments: Vec<Register>, destination: Register },
    Return { value: Option<Register> },
    AllocateLocal {
        ty: IrType,
        destination: Register,
        has_debug_info: bool,
        debug_name: Option<Rc<str>>,
        debug_type: Option<IrType>,
    },
    Load { ty: IrType, source: Register, destination: Register },
    Store { ty: IrType, value: Register, destination: Register },
    StructMemberPointer { struct_type: IrType, member_index: usize, pointer: Register, destination: Register },
    PointerIndex { pointed_to_type: IrType, index: Register, pointer: Register, destination: Register },
    Assembly { assembly: Rc<str>, bindings: Vec<AsmBinding> },
    ReferenceStatic { name: Rc<str>, destination: Register },
}

impl InstructionKind {
    /// Is this instruction a block terminator? (§4.6, P5: exactly one per
    /// block, always last.)
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstructionKind::Jump { .. } | InstructionKind::Branch { .. } | InstructionKind::Return { .. })
    }

    /// The register this instruction writes to, if any.
    pub fn destination(&self) -> Option<Register> {
        use InstructionKind::*;
        match self {
            IntegerArithmeticOperation { destination, .. }
            | IntegerComparisonOperation { destination, .. }
            | IntegerExtension { destination, .. }
            | IntegerTruncation { destination, .. }
            | FloatArithmeticOperation { destination, .. }
            | FloatComparisonOperation { destination, .. }
            | FloatConversion { destination, .. }
            | FloatFromInteger { destination, .. }
            | IntegerFromFloat { destination, .. }
            | PointerEquality { destination, .. }
            | PointerFromInteger { destination, .. }
            | IntegerFromPointer { destination, .. }
            | BooleanArithmeticOperation { destination, .. }
            | BooleanEquality { destination, .. }
            | BooleanInversion { destination, .. }
            | AssembleStaticArray { destination, .. }
            | ReadStaticArrayElement { destination, .. }
            | AssembleStruct { destination, .. }
            | ReadStructMember { destination, .. }
            | Literal { destination, .. }
            | IntrinsicCall { destination, .. }
            | AllocateLocal { destination, .. }
            | Load { destination, .. }
            | StructMemberPointer { destination, .. }
            | PointerIndex { destination, .. }
            | ReferenceStatic { destination, .. } => Some(*destination),
            FunctionCall { return_register, .. } => *return_register,
            Jump { .. } | Branch { .. } | Return { .. } | Store { .. } | Assembly { .. } => None,
        }
    }
}

/// An instruction plus the source location and debug scope it was emitted
/// under (§6).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub range: FileRange,
    pub debug_scope_index: usize,
}

impl Instruction {
    pub fn new(kind: InstructionKind, range: FileRange, debug_scope_index: usize) -> Self {
        Self { kind, range, debug_scope_index }
    }
}

/// A basic block: a linear instruction list whose last entry is a
/// terminator (§3). Successors are named by the terminator, referencing
/// sibling blocks by [`BasicBlockId`] (stable within the owning function).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminator(&self) -> Option<&InstructionKind> {
        self.instructions.last().map(|i| &i.kind)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.terminator(), Some(k) if k.is_terminator())
    }
}

/// A debug-info scope frame (§4.6): pushed/popped around function, `if`,
/// `while`, and `for` bodies.
#[derive(Debug, Clone)]
pub struct DebugScope {
    pub parent: Option<usize>,
    pub range: FileRange,
}

pub type BlockArena = IndexVec<BasicBlockId, Block>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_terminated_only_after_a_terminator() {
        let mut block = Block::new();
        assert!(!block.is_terminated());
        block.instructions.push(Instruction::new(
            InstructionKind::Return { value: None },
            FileRange::synthetic(),
            0,
        ));
        assert!(block.is_terminated());
    }

    #[test]
    fn slice_ir_type_is_length_then_pointer() {
        let slice = IrType::slice(talc_types::IntegerSize::Bit64);
        assert_eq!(slice, IrType::struct_of([IrType::Integer(talc_types::IntegerSize::Bit64), IrType::Pointer]));
    }
}

//! `IRType` (§3): the runtime-only subset of `AnyType`. Obtained from a
//! `talc_types::TypeId` via a total function living in `talc-check`/
//! `talc-lower` (this crate stays ignorant of the full type arena so that
//! it can be consumed without pulling in the type-checking machinery).

pub use talc_types::{FloatSize, IntegerSize};

/// A structural, self-contained runtime type. Two equal `IrType` values are
/// interchangeable (§6) — there is deliberately no definition-ref here, so
/// `IrType` implements `PartialEq`/`Hash` by structural derive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Bool,
    Integer(IntegerSize),
    Float(FloatSize),
    Pointer,
    StaticArray { length: u64, element: Box<IrType> },
    Struct { members: Vec<IrType> },
}

impl IrType {
    pub fn static_array(length: u64, element: IrType) -> Self {
        IrType::StaticArray { length, element: Box::new(element) }
    }

    pub fn struct_of(members: impl IntoIterator<Item = IrType>) -> Self {
        IrType::Struct { members: members.into_iter().collect() }
    }

    /// The two-field `{length: usize, pointer: *T}` slice representation
    /// (§4.6). `address_integer_size` is the architecture's pointer-sized
    /// integer (`usize`).
    pub fn slice(address_integer_size: IntegerSize) -> Self {
        IrType::struct_of([IrType::Integer(address_integer_size), IrType::Pointer])
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, IrType::StaticArray { .. } | IrType::Struct { .. })
    }
}

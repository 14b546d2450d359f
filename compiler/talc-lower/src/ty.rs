//! `to_ir_type` (§4.6, P4): the total conversion from the full type arena
//! down to the runtime-only `IrType` model. Every call site is guarded
//! upstream by `TypeStore::is_runtime_type` (the checker never hands a
//! non-runtime type to a position lowering reaches), so the fallback arm
//! below is unreachable by construction rather than a real case to handle.

use talc_ir::IrType;
use talc_target::ArchitectureSizes;
use talc_types::{IntegerSize, TypeId, TypeKind, TypeStore};

/// The integer width that represents `usize` on this architecture (used
/// for slice lengths and pointer-to-integer conversions). Architectures
/// outside the four standard widths are not modelled; `ArchitectureSizes`
/// never constructs one.
pub fn address_integer_size(sizes: &ArchitectureSizes) -> IntegerSize {
    match sizes.address_size.bytes() {
        1 => IntegerSize::Bit8,
        2 => IntegerSize::Bit16,
        4 => IntegerSize::Bit32,
        8 => IntegerSize::Bit64,
        other => panic!("unsupported address size: {other} bytes"),
    }
}

/// Convert a resolved `TypeId` to its runtime `IrType` representation
/// (§4.6). Structs/unions/static-arrays/enums recurse through their
/// element/member/backing types; see `DESIGN.md` for the union-as-byte-
/// array rationale (there is no `IrType::Union` variant).
pub fn to_ir_type(types: &TypeStore, sizes: &ArchitectureSizes, id: TypeId) -> IrType {
    match types.get(id) {
        TypeKind::Integer { size, .. } => IrType::Integer(*size),
        TypeKind::Float { size } => IrType::Float(*size),
        TypeKind::Boolean => IrType::Bool,
        TypeKind::Void => IrType::struct_of([]),
        TypeKind::Pointer(_) => IrType::Pointer,
        TypeKind::Array(_) => IrType::slice(address_integer_size(sizes)),
        TypeKind::StaticArray { length, element } => {
            IrType::static_array(*length, to_ir_type(types, sizes, *element))
        }
        TypeKind::Struct(def_id) => {
            let def = types.struct_def(*def_id);
            IrType::struct_of(def.members.iter().map(|m| to_ir_type(types, sizes, m.ty)).collect::<Vec<_>>())
        }
        TypeKind::Union(def_id) => {
            let byte_size = types.size_of(id, sizes).bytes();
            let _ = def_id;
            IrType::static_array(byte_size, IrType::Integer(talc_types::IntegerSize::Bit8))
        }
        TypeKind::Enum(def_id) => {
            let backing = types.enum_def(*def_id).backing;
            to_ir_type(types, sizes, backing)
        }
        TypeKind::Function { .. } => IrType::Pointer,
        TypeKind::MultiReturn(tys) => {
            IrType::struct_of(tys.iter().map(|t| to_ir_type(types, sizes, *t)).collect::<Vec<_>>())
        }
        other => panic!("to_ir_type called on a non-runtime type: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_types::{FloatSize, IntegerSize, Member, StructDef};

    fn sizes() -> ArchitectureSizes {
        ArchitectureSizes::default()
    }

    #[test]
    fn integer_and_float_convert_directly() {
        let mut store = TypeStore::new();
        let i32_ = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let f64_ = store.intern(TypeKind::Float { size: FloatSize::Bit64 });
        assert_eq!(to_ir_type(&store, &sizes(), i32_), IrType::Integer(IntegerSize::Bit32));
        assert_eq!(to_ir_type(&store, &sizes(), f64_), IrType::Float(FloatSize::Bit64));
    }

    #[test]
    fn slice_lowers_to_length_pointer_struct() {
        let mut store = TypeStore::new();
        let i32_ = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let slice = store.intern(TypeKind::Array(i32_));
        assert_eq!(to_ir_type(&store, &sizes(), slice), IrType::slice(IntegerSize::Bit64));
    }

    #[test]
    fn union_lowers_to_a_byte_array_sized_to_the_union() {
        let mut store = TypeStore::new();
        let i32_ = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let f32_ = store.intern(TypeKind::Float { size: FloatSize::Bit32 });
        let def = store.new_struct_def(StructDef {
            name: "U".into(),
            is_union: true,
            members: vec![Member { name: "i".into(), ty: i32_ }, Member { name: "f".into(), ty: f32_ }],
        });
        let union_ty = store.intern(TypeKind::Union(def));
        assert_eq!(to_ir_type(&store, &sizes(), union_ty), IrType::static_array(4, IrType::Integer(IntegerSize::Bit8)));
    }

    #[test]
    fn struct_lowers_member_by_member() {
        let mut store = TypeStore::new();
        let i8_ = store.intern(TypeKind::Integer { size: IntegerSize::Bit8, signed: false });
        let i32_ = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let def = store.new_struct_def(StructDef {
            name: "S".into(),
            is_union: false,
            members: vec![Member { name: "a".into(), ty: i8_ }, Member { name: "b".into(), ty: i32_ }],
        });
        let struct_ty = store.intern(TypeKind::Struct(def));
        assert_eq!(
            to_ir_type(&store, &sizes(), struct_ty),
            IrType::struct_of([IrType::Integer(IntegerSize::Bit8), IrType::Integer(IntegerSize::Bit32)])
        );
    }

    #[test]
    fn void_lowers_to_an_empty_struct() {
        let mut store = TypeStore::new();
        let void_ = store.intern(TypeKind::Void);
        assert_eq!(to_ir_type(&store, &sizes(), void_), IrType::struct_of([]));
    }
}

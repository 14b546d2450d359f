//! Coercion and explicit-cast rules (§4.3).

use talc_reporting::{TypeMismatchError, TypeMismatchReason};
use talc_source::FileRange;
use talc_tir::expr::TypedExprKind;
use talc_tir::{TypedExpr, ValueKind};
use talc_types::{TypeId, TypeKind, TypeStore};

/// Can `from` be implicitly coerced to `to`? (§4.3 coercion table.)
pub fn coercion_allowed(types: &TypeStore, from: TypeId, to: TypeId) -> bool {
    if types.types_equal(from, to) {
        return true;
    }
    match (types.get(from), types.get(to)) {
        (TypeKind::UndeterminedInteger, TypeKind::Integer { .. } | TypeKind::Float { .. } | TypeKind::Pointer(_)) => true,
        (TypeKind::UndeterminedFloat, TypeKind::Float { .. }) => true,
        (TypeKind::Integer { size: s1, signed: g1 }, TypeKind::Integer { size: s2, signed: g2 }) => s1 == s2 && g1 == g2,
        (TypeKind::Float { size: s1 }, TypeKind::Float { size: s2 }) => s1 == s2,
        (TypeKind::Enum(e1), TypeKind::Enum(e2)) => e1 == e2,
        (TypeKind::StaticArray { element: e1, .. }, TypeKind::Array(e2)) => types.types_equal(*e1, *e2),
        (TypeKind::UndeterminedStruct(members), TypeKind::Struct(def)) => {
            let def = types.struct_def(*def);
            members.len() == def.members.len()
                && members
                    .iter()
                    .zip(def.members.iter())
                    .all(|(m, d)| m.name == d.name && types.types_equal(m.ty, d.ty))
        }
        (TypeKind::UndeterminedStruct(members), TypeKind::Union(def)) => {
            let def = types.struct_def(*def);
            members.len() == 1 && def.members.iter().any(|d| d.name == members[0].name && types.types_equal(members[0].ty, d.ty))
        }
        _ => false,
    }
}

/// Is an explicit `cast(expr, to)` allowed between two runtime types not
/// already covered by implicit coercion? (§4.3 "Explicit casts".)
pub fn cast_allowed(types: &TypeStore, sizes: &talc_target::ArchitectureSizes, from: TypeId, to: TypeId) -> bool {
    match (types.get(from), types.get(to)) {
        (TypeKind::Integer { .. }, TypeKind::Integer { .. }) => true,
        (TypeKind::Integer { .. }, TypeKind::Float { .. }) | (TypeKind::Float { .. }, TypeKind::Integer { .. }) => true,
        (TypeKind::Float { .. }, TypeKind::Float { .. }) => true,
        (TypeKind::Pointer(_), TypeKind::Integer { size, .. }) | (TypeKind::Integer { size, .. }, TypeKind::Pointer(_)) => {
            size.bytes() == sizes.address_size.bytes()
        }
        (TypeKind::Enum(def), TypeKind::Integer { .. }) => types.types_equal(types.enum_def(*def).backing, to),
        (TypeKind::Integer { .. }, TypeKind::Enum(def)) => types.types_equal(from, types.enum_def(*def).backing),
        _ => false,
    }
}

/// Wrap `expr` in a `Coercion` node if `to` differs from its current type
/// and the coercion is allowed; otherwise a `TypeMismatch` error.
pub fn coerce(types: &TypeStore, expr: TypedExpr, to: TypeId, range: FileRange) -> Result<TypedExpr, TypeMismatchError> {
    if types.types_equal(expr.ty, to) {
        return Ok(expr);
    }
    if !coercion_allowed(types, expr.ty, to) {
        return Err(TypeMismatchError {
            range,
            expected: format!("{:?}", types.get(to)),
            found: format!("{:?}", types.get(expr.ty)),
            reason: TypeMismatchReason::DisallowedCoercion,
        });
    }
    let value = expr.value.clone();
    Ok(TypedExpr {
        range,
        ty: to,
        value,
        kind: TypedExprKind::Coercion(Box::new(expr)),
    })
}

/// Runtime-typedness gate used before a value is used where an `IrType`
/// is required (function parameter, return value, struct member, etc).
pub fn require_runtime_type(types: &TypeStore, ty: TypeId, range: FileRange) -> Result<(), TypeMismatchError> {
    if types.is_runtime_type(ty) {
        Ok(())
    } else {
        Err(TypeMismatchError {
            range,
            expected: "a runtime type".to_string(),
            found: format!("{:?}", types.get(ty)),
            reason: TypeMismatchReason::NotARuntimeType,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_types::IntegerSize;

    #[test]
    fn undetermined_integer_coerces_to_any_concrete_integer() {
        let mut types = TypeStore::new();
        let undetermined = types.intern(TypeKind::UndeterminedInteger);
        let i32 = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        assert!(coercion_allowed(&types, undetermined, i32));
    }

    #[test]
    fn mismatched_signedness_does_not_coerce() {
        let mut types = TypeStore::new();
        let i32 = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let u32_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: false });
        assert!(!coercion_allowed(&types, i32, u32_));
    }

    #[test]
    fn static_array_coerces_to_slice_of_same_element() {
        let mut types = TypeStore::new();
        let elem = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let arr = types.intern(TypeKind::StaticArray { length: 4, element: elem });
        let slice = types.intern(TypeKind::Array(elem));
        assert!(coercion_allowed(&types, arr, slice));
    }

    #[test]
    fn pointer_to_integer_cast_requires_address_sized_integer() {
        let mut types = TypeStore::new();
        let sizes = talc_target::ArchitectureSizes::default();
        let pointee = types.intern(TypeKind::Boolean);
        let ptr = types.intern(TypeKind::Pointer(pointee));
        let u64_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit64, signed: false });
        let u8_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit8, signed: false });
        assert!(cast_allowed(&types, &sizes, ptr, u64_));
        assert!(!cast_allowed(&types, &sizes, ptr, u8_));
    }
}

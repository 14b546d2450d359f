//! The synthetic global-constants table (§4.2): `u8..u64`, `i8..i64`,
//! `usize`/`isize`, `f32`/`f64`, `bool`, `void`, `true`, `false`, `undef`.
//! Consulted last, after scope-local and imported-module lookups fail.

use talc_tir::{ConstId, ConstStore, ConstantValue};
use talc_types::{FloatSize, IntegerSize, TypeId, TypeKind, TypeStore};

use crate::context::CompilerContext;

pub struct Builtins {
    pub u8_: TypeId,
    pub u16_: TypeId,
    pub u32_: TypeId,
    pub u64_: TypeId,
    pub i8_: TypeId,
    pub i16_: TypeId,
    pub i32_: TypeId,
    pub i64_: TypeId,
    pub usize_: TypeId,
    pub isize_: TypeId,
    pub f32_: TypeId,
    pub f64_: TypeId,
    pub bool_: TypeId,
    pub void_: TypeId,
    pub type_: TypeId,
    pub undetermined_integer: TypeId,
    pub undetermined_float: TypeId,

    /// `(const value, type of that constant)` for every builtin entry
    /// resolvable as a name (the integer/float/bool type names resolve to
    /// `ConstantValue::Type(_)`; `true`/`false` resolve to
    /// `ConstantValue::Boolean(_)`; `undef` to `ConstantValue::Undef`).
    names: Vec<(&'static str, ConstId, TypeId)>,
}

impl Builtins {
    pub fn new(types: &mut TypeStore, consts: &mut ConstStore) -> Self {
        let u8_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit8, signed: false });
        let u16_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit16, signed: false });
        let u32_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: false });
        let u64_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit64, signed: false });
        let i8_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit8, signed: true });
        let i16_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit16, signed: true });
        let i32_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let i64_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit64, signed: true });
        // usize/isize are always 64-bit in this model's arena (the
        // *architecture*-relative size used for layout purposes is
        // resolved separately via `ArchitectureSizes::address_size`); they
        // are kept distinct type ids from `u64`/`i64` so diagnostics can
        // tell them apart.
        let usize_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit64, signed: false });
        let isize_ = types.intern(TypeKind::Integer { size: IntegerSize::Bit64, signed: true });
        let f32_ = types.intern(TypeKind::Float { size: FloatSize::Bit32 });
        let f64_ = types.intern(TypeKind::Float { size: FloatSize::Bit64 });
        let bool_ = types.intern(TypeKind::Boolean);
        let void_ = types.intern(TypeKind::Void);
        let type_ = types.intern(TypeKind::Type);
        let undetermined_integer = types.intern(TypeKind::UndeterminedInteger);
        let undetermined_float = types.intern(TypeKind::UndeterminedFloat);

        let mut names = Vec::new();
        let mut type_name = |types_ref: &[(&'static str, TypeId)], consts: &mut ConstStore| {
            for (name, id) in types_ref {
                let c = consts.create(ConstantValue::Type(*id));
                names.push((*name, c, type_));
            }
        };
        type_name(
            &[
                ("u8", u8_), ("u16", u16_), ("u32", u32_), ("u64", u64_),
                ("i8", i8_), ("i16", i16_), ("i32", i32_), ("i64", i64_),
                ("usize", usize_), ("isize", isize_),
                ("f32", f32_), ("f64", f64_),
                ("bool", bool_), ("void", void_),
            ],
            &mut consts_sink(consts),
        );

        let true_const = consts.create(ConstantValue::Boolean(true));
        let false_const = consts.create(ConstantValue::Boolean(false));
        let undef_const = consts.create(ConstantValue::Undef);
        names.push(("true", true_const, bool_));
        names.push(("false", false_const, bool_));
        names.push(("undef", undef_const, undetermined_integer));

        // `sizeof`/`alignof` are callable builtins rather than ordinary
        // functions: they take a type-valued argument, never a runtime one,
        // so they get their own `TypeKind::BuiltinFunction` tag instead of a
        // `Function` signature (§4.4).
        for builtin in ["sizeof", "alignof"] {
            let ty = types.intern(TypeKind::BuiltinFunction(builtin.into()));
            let value = consts.create(ConstantValue::BuiltinFunction(builtin.into()));
            names.push((builtin, value, ty));
        }

        Self {
            u8_, u16_, u32_, u64_, i8_, i16_, i32_, i64_, usize_, isize_, f32_, f64_, bool_, void_,
            type_, undetermined_integer, undetermined_float, names,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<(ConstId, TypeId)> {
        self.names.iter().find(|(n, ..)| *n == name).map(|(_, c, t)| (*c, *t))
    }

    pub fn integer_type(&self, size: IntegerSize, signed: bool) -> TypeId {
        match (size, signed) {
            (IntegerSize::Bit8, false) => self.u8_,
            (IntegerSize::Bit16, false) => self.u16_,
            (IntegerSize::Bit32, false) => self.u32_,
            (IntegerSize::Bit64, false) => self.u64_,
            (IntegerSize::Bit8, true) => self.i8_,
            (IntegerSize::Bit16, true) => self.i16_,
            (IntegerSize::Bit32, true) => self.i32_,
            (IntegerSize::Bit64, true) => self.i64_,
        }
    }

    pub fn float_type(&self, size: FloatSize) -> TypeId {
        match size {
            FloatSize::Bit32 => self.f32_,
            FloatSize::Bit64 => self.f64_,
        }
    }
}

/// Helper so the closure above can take `&mut ConstStore` without fighting
/// the borrow checker over `names` living in the same function.
fn consts_sink(consts: &mut ConstStore) -> &mut ConstStore {
    consts
}

impl CompilerContext {
    pub fn builtins(&mut self) -> Builtins {
        Builtins::new(&mut self.types, &mut self.consts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_type_names_resolve_to_type_valued_constants() {
        let mut types = TypeStore::new();
        let mut consts = ConstStore::new();
        let builtins = Builtins::new(&mut types, &mut consts);
        let (const_id, ty) = builtins.lookup("i32").unwrap();
        assert_eq!(ty, builtins.type_);
        match consts.get(const_id) {
            ConstantValue::Type(t) => assert_eq!(*t, builtins.i32_),
            other => panic!("expected Type(_), got {other:?}"),
        }
    }

    #[test]
    fn true_and_false_resolve_to_boolean_constants() {
        let mut types = TypeStore::new();
        let mut consts = ConstStore::new();
        let builtins = Builtins::new(&mut types, &mut consts);
        let (true_id, true_ty) = builtins.lookup("true").unwrap();
        let (false_id, _) = builtins.lookup("false").unwrap();
        assert_eq!(true_ty, builtins.bool_);
        assert_eq!(consts.get(true_id).as_boolean(), Some(true));
        assert_eq!(consts.get(false_id).as_boolean(), Some(false));
    }

    #[test]
    fn unknown_name_does_not_resolve() {
        let mut types = TypeStore::new();
        let mut consts = ConstStore::new();
        let builtins = Builtins::new(&mut types, &mut consts);
        assert!(builtins.lookup("not_a_builtin").is_none());
    }
}

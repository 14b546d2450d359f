//! The type model: `AnyType` (§3) as a closed tagged sum over arena-stable
//! [`TypeId`]s, plus the natural-alignment layout algorithm used to compute
//! member offsets, sizes, and alignments (§4.3, P6).
//!
//! Types are interned into a [`TypeStore`] rather than owned recursively so
//! that mutually-recursive definitions (`*Node` inside `struct Node { next:
//! *Node }`) are expressible: a `Pointer` only ever needs the *id* of its
//! pointee, never its fully resolved body, so `Pointer(id)` can be created
//! before `id`'s `StructDef` is filled in.

use std::rc::Rc;

use index_vec::{define_index_type, IndexVec};
use talc_target::{ArchitectureSizes, Size};

define_index_type! {
    /// A stable handle into a [`TypeStore`]. Never invalidated or reused.
    pub struct TypeId = u32;
}

define_index_type! {
    /// A stable handle to a struct/union member layout definition.
    pub struct StructDefId = u32;
}

define_index_type! {
    pub struct EnumDefId = u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerSize {
    Bit8,
    Bit16,
    Bit32,
    Bit64,
}

impl IntegerSize {
    pub fn bytes(self) -> u64 {
        match self {
            IntegerSize::Bit8 => 1,
            IntegerSize::Bit16 => 2,
            IntegerSize::Bit32 => 4,
            IntegerSize::Bit64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatSize {
    Bit32,
    Bit64,
}

impl FloatSize {
    pub fn bytes(self) -> u64 {
        match self {
            FloatSize::Bit32 => 4,
            FloatSize::Bit64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallingConvention {
    #[default]
    Cdecl,
    Stdcall,
}

/// A named field of a struct/union definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: Rc<str>,
    pub ty: TypeId,
}

/// Backing storage for a `struct`/`union` definition. Shared by
/// `TypeKind::Struct`/`TypeKind::Union` — the `is_union` flag (carried on
/// the definition, not duplicated on the `TypeKind`) picks the layout rule.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: Rc<str>,
    pub is_union: bool,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: Rc<str>,
    pub backing: TypeId,
    pub variants: Vec<(Rc<str>, i128)>,
}

/// The closed tagged sum of every type shape in the language (§3:
/// `AnyType`). Recursive positions hold [`TypeId`]s rather than boxed
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Integer { size: IntegerSize, signed: bool },
    Float { size: FloatSize },
    Boolean,
    Void,
    /// The type of a type-valued constant (`Type(u32)` the value, not
    /// `u32` itself).
    Type,
    FileModule,
    Undef,
    Pointer(TypeId),
    /// A runtime slice, `{length: usize, pointer: *T}`.
    Array(TypeId),
    StaticArray { length: u64, element: TypeId },
    Struct(StructDefId),
    Union(StructDefId),
    Enum(EnumDefId),
    Function { parameters: Vec<TypeId>, returns: Vec<TypeId>, calling_convention: CallingConvention },
    MultiReturn(Vec<TypeId>),
    UndeterminedInteger,
    UndeterminedFloat,
    /// An undetermined struct literal's member types, named and in source
    /// order, awaiting coercion to a concrete `Struct`/`Union`.
    UndeterminedStruct(Vec<Member>),
    /// An undetermined array literal's element type, awaiting coercion to
    /// a concrete `StaticArray`/`Array`.
    UndeterminedArray(TypeId),
    PolymorphicFunction,
    PolymorphicStruct,
    PolymorphicUnion,
    BuiltinFunction(Rc<str>),
}

/// Arena owning every [`TypeKind`] and [`StructDef`]/[`EnumDef`] created
/// during compilation. Append-only: ids are never invalidated (§9).
#[derive(Debug, Default)]
pub struct TypeStore {
    types: IndexVec<TypeId, TypeKind>,
    structs: IndexVec<StructDefId, StructDef>,
    enums: IndexVec<EnumDefId, EnumDef>,
}

impl TypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        self.types.push(kind)
    }

    pub fn get(&self, id: TypeId) -> &TypeKind {
        &self.types[id]
    }

    /// Reserve a slot for a type whose body isn't known yet (the struct
    /// case: the `TypeId` for `MyStruct` must exist before its member list
    /// does, so that a member of type `*MyStruct` can be interned first).
    pub fn reserve(&mut self) -> TypeId {
        self.types.push(TypeKind::Undef)
    }

    pub fn fill(&mut self, id: TypeId, kind: TypeKind) {
        self.types[id] = kind;
    }

    pub fn new_struct_def(&mut self, def: StructDef) -> StructDefId {
        self.structs.push(def)
    }

    pub fn struct_def(&self, id: StructDefId) -> &StructDef {
        &self.structs[id]
    }

    pub fn struct_def_mut(&mut self, id: StructDefId) -> &mut StructDef {
        &mut self.structs[id]
    }

    pub fn new_enum_def(&mut self, def: EnumDef) -> EnumDefId {
        self.enums.push(def)
    }

    pub fn enum_def(&self, id: EnumDefId) -> &EnumDef {
        &self.enums[id]
    }

    /// Structural equality of two types modulo the definition-ref: two
    /// distinct `StructDefId`s still compare equal if their name and
    /// members (recursively) match, matching the spec's "two
    /// instantiations of the same polymorphic struct with equal members
    /// are equal" invariant.
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (TypeKind::Struct(d1), TypeKind::Struct(d2))
            | (TypeKind::Union(d1), TypeKind::Union(d2)) => {
                let (s1, s2) = (self.struct_def(*d1), self.struct_def(*d2));
                s1.is_union == s2.is_union
                    && s1.members.len() == s2.members.len()
                    && s1
                        .members
                        .iter()
                        .zip(s2.members.iter())
                        .all(|(m1, m2)| m1.name == m2.name && self.types_equal(m1.ty, m2.ty))
            }
            (TypeKind::Pointer(p1), TypeKind::Pointer(p2)) => self.types_equal(*p1, *p2),
            (TypeKind::Array(e1), TypeKind::Array(e2)) => self.types_equal(*e1, *e2),
            (
                TypeKind::StaticArray { length: l1, element: e1 },
                TypeKind::StaticArray { length: l2, element: e2 },
            ) => l1 == l2 && self.types_equal(*e1, *e2),
            (
                TypeKind::Function { parameters: p1, returns: r1, calling_convention: c1 },
                TypeKind::Function { parameters: p2, returns: r2, calling_convention: c2 },
            ) => {
                c1 == c2
                    && p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(x, y)| self.types_equal(*x, *y))
                    && r1.len() == r2.len()
                    && r1.iter().zip(r2).all(|(x, y)| self.types_equal(*x, *y))
            }
            (TypeKind::MultiReturn(t1), TypeKind::MultiReturn(t2)) => {
                t1.len() == t2.len() && t1.iter().zip(t2).all(|(x, y)| self.types_equal(*x, *y))
            }
            (k1, k2) => k1 == k2,
        }
    }

    /// Is this type representable at runtime (i.e. does it have an
    /// `IRType`)? Everything except the `Undetermined*`/`Polymorphic*`/
    /// `BuiltinFunction`/`Type`/`FileModule`/`Undef` kinds.
    pub fn is_runtime_type(&self, id: TypeId) -> bool {
        !matches!(
            self.get(id),
            TypeKind::Undef
                | TypeKind::Type
                | TypeKind::FileModule
                | TypeKind::UndeterminedInteger
                | TypeKind::UndeterminedFloat
                | TypeKind::UndeterminedStruct(_)
                | TypeKind::UndeterminedArray(_)
                | TypeKind::PolymorphicFunction
                | TypeKind::PolymorphicStruct
                | TypeKind::PolymorphicUnion
                | TypeKind::BuiltinFunction(_)
        )
    }

    /// The alignment of `id` under `sizes`. Struct/union alignment is the
    /// maximum member alignment (minimum 1); everything else has a fixed,
    /// architecture-derived alignment equal to its size.
    pub fn align_of(&self, id: TypeId, sizes: &ArchitectureSizes) -> Size {
        match self.get(id) {
            TypeKind::Integer { size, .. } => Size::from_bytes(size.bytes()),
            TypeKind::Float { size } => Size::from_bytes(size.bytes()),
            TypeKind::Boolean => sizes.boolean_size,
            TypeKind::Pointer(_) => sizes.address_size,
            TypeKind::Array(_) => sizes.address_size,
            TypeKind::StaticArray { element, .. } => self.align_of(*element, sizes),
            TypeKind::Struct(def) | TypeKind::Union(def) => {
                let def = self.struct_def(*def);
                def.members
                    .iter()
                    .map(|m| self.align_of(m.ty, sizes).bytes())
                    .max()
                    .map(Size::from_bytes)
                    .unwrap_or(Size::from_bytes(1))
            }
            TypeKind::Enum(def) => self.align_of(self.enum_def(*def).backing, sizes),
            TypeKind::UndeterminedInteger => sizes.default_integer_size,
            TypeKind::UndeterminedFloat => sizes.default_float_size,
            _ => Size::ZERO,
        }
    }

    /// The size of `id` under `sizes`, following the natural-alignment
    /// iterative algorithm (no rounding of the struct's total size to its
    /// own alignment — see `SPEC_FULL.md` §9's struct-tail-padding open
    /// question).
    pub fn size_of(&self, id: TypeId, sizes: &ArchitectureSizes) -> Size {
        match self.get(id) {
            TypeKind::Integer { size, .. } => Size::from_bytes(size.bytes()),
            TypeKind::Float { size } => Size::from_bytes(size.bytes()),
            TypeKind::Boolean => sizes.boolean_size,
            TypeKind::Pointer(_) => sizes.address_size,
            // {length: usize, pointer: *T} — two address-sized words (P6).
            TypeKind::Array(_) => Size::from_bytes(sizes.address_size.bytes() * 2),
            TypeKind::StaticArray { length, element } => {
                Size::from_bytes(length * self.size_of(*element, sizes).bytes())
            }
            TypeKind::Struct(def) => self.struct_size(*def, sizes),
            TypeKind::Union(def) => {
                let def = self.struct_def(*def);
                def.members.iter().map(|m| self.size_of(m.ty, sizes).bytes()).max().map(Size::from_bytes).unwrap_or(Size::ZERO)
            }
            TypeKind::Enum(def) => self.size_of(self.enum_def(*def).backing, sizes),
            TypeKind::UndeterminedInteger => sizes.default_integer_size,
            TypeKind::UndeterminedFloat => sizes.default_float_size,
            _ => Size::ZERO,
        }
    }

    /// Byte offset of member `index` within `def`, following the same
    /// iterative walk as [`Self::struct_size`] but stopping early.
    pub fn member_offset(&self, def: StructDefId, index: usize, sizes: &ArchitectureSizes) -> Size {
        let def = self.struct_def(def);
        debug_assert!(!def.is_union, "unions have no member offsets");
        let mut current_size = 0u64;
        for (i, member) in def.members.iter().enumerate() {
            let alignment = self.align_of(member.ty, sizes).bytes().max(1);
            let remainder = current_size % alignment;
            let padding = if remainder == 0 { 0 } else { alignment - remainder };
            let offset = current_size + padding;
            if i == index {
                return Size::from_bytes(offset);
            }
            current_size = offset + self.size_of(member.ty, sizes).bytes();
        }
        unreachable!("member index {index} out of bounds for struct {:?}", def.name)
    }

    /// Total size of a struct: walks every member inserting natural
    /// padding before it, but performs **no** trailing round-up to the
    /// struct's own alignment. Matches the reference `StructType::get_size`
    /// exactly (see `types.cpp`).
    fn struct_size(&self, def: StructDefId, sizes: &ArchitectureSizes) -> Size {
        let def = self.struct_def(def);
        let mut current_size = 0u64;
        for member in &def.members {
            let alignment = self.align_of(member.ty, sizes).bytes().max(1);
            let remainder = current_size % alignment;
            let padding = if remainder == 0 { 0 } else { alignment - remainder };
            current_size += padding + self.size_of(member.ty, sizes).bytes();
        }
        Size::from_bytes(current_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> ArchitectureSizes {
        ArchitectureSizes::default()
    }

    #[test]
    fn slice_size_is_two_address_words() {
        let mut store = TypeStore::new();
        let elem = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let slice = store.intern(TypeKind::Array(elem));
        assert_eq!(store.size_of(slice, &sizes()).bytes(), 16);
    }

    #[test]
    fn static_array_size_is_length_times_element() {
        let mut store = TypeStore::new();
        let elem = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let arr = store.intern(TypeKind::StaticArray { length: 5, element: elem });
        assert_eq!(store.size_of(arr, &sizes()).bytes(), 20);
    }

    #[test]
    fn struct_layout_inserts_natural_padding_and_no_tail_padding() {
        let mut store = TypeStore::new();
        let i8 = store.intern(TypeKind::Integer { size: IntegerSize::Bit8, signed: false });
        let i32 = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        // struct { a: u8; b: i32; c: u8 } -> offsets 0, 4, 8; size 9 (NOT
        // rounded up to alignment-4's 12).
        let def = store.new_struct_def(StructDef {
            name: "S".into(),
            is_union: false,
            members: vec![
                Member { name: "a".into(), ty: i8 },
                Member { name: "b".into(), ty: i32 },
                Member { name: "c".into(), ty: i8 },
            ],
        });
        let ty = store.intern(TypeKind::Struct(def));
        assert_eq!(store.member_offset(def, 0, &sizes()).bytes(), 0);
        assert_eq!(store.member_offset(def, 1, &sizes()).bytes(), 4);
        assert_eq!(store.member_offset(def, 2, &sizes()).bytes(), 8);
        assert_eq!(store.size_of(ty, &sizes()).bytes(), 9);
        assert_eq!(store.align_of(ty, &sizes()).bytes(), 4);
    }

    #[test]
    fn union_size_is_max_member_no_padding() {
        let mut store = TypeStore::new();
        let i32 = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let f64 = store.intern(TypeKind::Float { size: FloatSize::Bit64 });
        let def = store.new_struct_def(StructDef {
            name: "U".into(),
            is_union: true,
            members: vec![
                Member { name: "i".into(), ty: i32 },
                Member { name: "f".into(), ty: f64 },
            ],
        });
        let ty = store.intern(TypeKind::Union(def));
        assert_eq!(store.size_of(ty, &sizes()).bytes(), 8);
        assert_eq!(store.align_of(ty, &sizes()).bytes(), 8);
    }

    #[test]
    fn recursive_struct_via_pointer_is_expressible() {
        let mut store = TypeStore::new();
        let node_ty = store.reserve();
        let ptr_to_node = store.intern(TypeKind::Pointer(node_ty));
        let i32 = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let def = store.new_struct_def(StructDef {
            name: "Node".into(),
            is_union: false,
            members: vec![
                Member { name: "value".into(), ty: i32 },
                Member { name: "next".into(), ty: ptr_to_node },
            ],
        });
        store.fill(node_ty, TypeKind::Struct(def));
        assert_eq!(store.size_of(node_ty, &sizes()).bytes(), 12);
    }

    #[test]
    fn types_equal_ignores_definition_ref_identity() {
        let mut store = TypeStore::new();
        let i32 = store.intern(TypeKind::Integer { size: IntegerSize::Bit32, signed: true });
        let def_a = store.new_struct_def(StructDef {
            name: "Pair".into(),
            is_union: false,
            members: vec![Member { name: "x".into(), ty: i32 }],
        });
        let def_b = store.new_struct_def(StructDef {
            name: "Pair".into(),
            is_union: false,
            members: vec![Member { name: "x".into(), ty: i32 }],
        });
        let a = store.intern(TypeKind::Struct(def_a));
        let b = store.intern(TypeKind::Struct(def_b));
        assert!(store.types_equal(a, b));
    }
}

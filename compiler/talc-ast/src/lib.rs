//! The untyped AST node shapes consumed by the job scheduler and type
//! checker. This crate owns no behaviour: it is plain data, produced in a
//! real pipeline by a parser (out of scope here) and in this repository's
//! tests by hand-built fixtures.
//!
//! Every hierarchy that the original reference modelled with a C++ class
//! hierarchy (`Expression` / `Statement` base classes with virtual
//! destructors) is re-architected here as a single closed tagged `enum`,
//! per the compiler-wide convention: polymorphic dispatch becomes a
//! `match` on the tag.

use std::rc::Rc;

use talc_source::{FileRange, Identifier};

/// Wraps any AST payload with the range it was parsed from. Mirrors the
/// teacher's `AstNode<T>` wrapper.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub body: Box<T>,
    pub range: FileRange,
}

impl<T> Node<T> {
    pub fn new(body: T, range: FileRange) -> Self {
        Self { body: Box::new(body), range }
    }

    pub fn body(&self) -> &T {
        &self.body
    }
}

pub type ExprNode = Node<Expr>;
pub type StmtNode = Node<Stmt>;

/// Binary operators recognised by the expression grammar (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
    And,
    Or,
}

/// Unary operators: address-of (`&`), boolean invert (`!`), and numeric
/// negation (`-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    AddressOf,
    Not,
    Negate,
}

/// A function/struct parameter. When `is_polymorphic_determiner` is set,
/// `type` is `None` and the parameter's runtime type is derived from
/// `polymorphic_determiner` itself being bound to a compile-time argument
/// (§4.5).
#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: Identifier,
    pub is_polymorphic_determiner: bool,
    pub ty: Option<ExprNode>,
    pub polymorphic_determiner: Option<Identifier>,
}

#[derive(Debug, Clone)]
pub struct StructLiteralMember {
    pub name: Identifier,
    pub value: ExprNode,
}

#[derive(Debug, Clone)]
pub struct InlineAssemblyBinding {
    pub constraint: Rc<str>,
    pub expression: ExprNode,
}

/// Tags attachable to `FunctionDeclaration`/`VariableDeclaration` (§3.1).
#[derive(Debug, Clone, Default)]
pub struct Tags {
    pub extern_libraries: Option<Vec<Rc<str>>>,
    pub no_mangle: bool,
    pub call_conv: Option<Identifier>,
}

/// Calling conventions recognised by the `call_conv(...)` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallingConvention {
    #[default]
    Cdecl,
    Stdcall,
}

/// The closed sum of expression shapes. `Box`es break the recursive cycle;
/// nodes otherwise carry their children directly rather than via an index
/// into an arena, since the AST itself is immutable once parsed.
#[derive(Debug, Clone)]
pub enum Expr {
    NamedReference(Identifier),
    MemberReference { expression: ExprNode, name: Identifier },
    IndexReference { expression: ExprNode, index: ExprNode },
    IntegerLiteral(u64),
    FloatLiteral(f64),
    StringLiteral(Rc<str>),
    BooleanLiteral(bool),
    ArrayLiteral { elements: Vec<ExprNode> },
    StructLiteral { members: Vec<StructLiteralMember> },
    FunctionCall { expression: ExprNode, arguments: Vec<ExprNode> },
    BinaryOperation { op: BinOp, left: ExprNode, right: ExprNode },
    UnaryOperation { op: UnOp, expression: ExprNode },
    Cast { expression: ExprNode, ty: ExprNode },
    ArrayType { element: ExprNode, length: Option<ExprNode> },
    FunctionType { parameters: Vec<FunctionParameter>, return_types: Vec<ExprNode> },
    /// Forces a sub-expression to be evaluated at compile time even in a
    /// runtime position (`bake(expr)`).
    Bake { expression: ExprNode },
    Undef,
}

#[derive(Debug, Clone)]
pub struct ElseIf {
    pub condition: ExprNode,
    pub body: Vec<StmtNode>,
}

/// The closed sum of statement shapes.
#[derive(Debug, Clone)]
pub enum Stmt {
    ExpressionStatement { expression: ExprNode },
    FunctionDeclaration {
        name: Identifier,
        parameters: Vec<FunctionParameter>,
        return_types: Vec<ExprNode>,
        tags: Tags,
        body: Option<Vec<StmtNode>>,
    },
    ConstantDefinition { name: Identifier, expression: ExprNode },
    StructDefinition {
        name: Identifier,
        is_union: bool,
        parameters: Vec<FunctionParameter>,
        members: Vec<(Identifier, ExprNode)>,
    },
    EnumDefinition {
        name: Identifier,
        backing_type: Option<ExprNode>,
        variants: Vec<(Identifier, Option<ExprNode>)>,
    },
    VariableDeclaration { name: Identifier, ty: Option<ExprNode>, initializer: Option<ExprNode>, tags: Tags },
    MultiVariableDeclaration { names: Vec<Identifier>, initializer: ExprNode },
    Assignment { target: ExprNode, value: ExprNode },
    MultiAssignment { targets: Vec<ExprNode>, value: ExprNode },
    BinaryOperationAssignment { target: ExprNode, op: BinOp, value: ExprNode },
    IfStatement {
        condition: ExprNode,
        body: Vec<StmtNode>,
        else_ifs: Vec<ElseIf>,
        else_body: Option<Vec<StmtNode>>,
    },
    WhileLoop { condition: ExprNode, body: Vec<StmtNode> },
    ForLoop { variable: Identifier, from: ExprNode, to: ExprNode, body: Vec<StmtNode> },
    ReturnStatement { values: Vec<ExprNode> },
    BreakStatement,
    ContinueStatement,
    Import { path: Rc<str> },
    StaticIf { condition: ExprNode, body: Vec<StmtNode> },
    InlineAssembly { assembly: Rc<str>, bindings: Vec<InlineAssemblyBinding> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_wraps_range() {
        let range = FileRange::new(1, 0, 1, 3);
        let node = Node::new(Expr::IntegerLiteral(42), range);
        assert_eq!(node.range, range);
        assert!(matches!(*node.body, Expr::IntegerLiteral(42)));
    }
}

//! Per-function lowering state (§4.6): the register counter, the block
//! arena, the current-block cursor, the debug-scope stack, the locals
//! environment, and the loop-target stack `break`/`continue` consult.
//! Shared cross-function state (naming, dedup, static-constant promotion)
//! lives in [`crate::shared::LowerShared`] instead, threaded through as an
//! explicit parameter on every call rather than owned here — mirroring the
//! teacher's "no true globals, explicit context value" convention (§9)
//! while keeping a single function's lowering free of borrow-checker
//! aliasing against the scheduler.

use talc_ir::{BasicBlockId, Block, BlockArena, DebugScope, Instruction, InstructionKind, IrType, Register};
use talc_source::FileRange;

/// The result of lowering a typed expression: either an lvalue (a pointer
/// register plus the type it points to) or an rvalue already sitting in a
/// register (§4.6: "Reads of assignable locals produce an AddressedValue
/// ...; use in an r-position inserts a Load").
#[derive(Debug, Clone)]
pub enum Lowered {
    Addressed { pointer: Register, pointed_to: IrType },
    Value { register: Register, ty: IrType },
}

impl Lowered {
    /// The static type of this lowered expression, regardless of whether
    /// it is currently addressed or already a value.
    pub fn ty(&self) -> &IrType {
        match self {
            Lowered::Addressed { pointed_to, .. } => pointed_to,
            Lowered::Value { ty, .. } => ty,
        }
    }

    /// Force this into a register value, inserting a `Load` if it is
    /// currently addressed.
    pub fn to_register(self, builder: &mut Builder, range: FileRange) -> Register {
        match self {
            Lowered::Value { register, .. } => register,
            Lowered::Addressed { pointer, pointed_to } => {
                let destination = builder.fresh_register();
                builder.push(InstructionKind::Load { ty: pointed_to, source: pointer, destination }, range);
                destination
            }
        }
    }
}

/// A loop's break/continue targets (§4.6: "break jumps to the nearest
/// enclosing loop's after-block; continue jumps to the nearest enclosing
/// loop's increment block").
#[derive(Debug, Clone, Copy)]
pub struct LoopTargets {
    pub continue_target: BasicBlockId,
    pub break_target: BasicBlockId,
}

/// A bound local's storage: either an addressed stack slot (ordinary
/// `var` declarations) or a plain register (function parameters, per the
/// S1 scenario's literal `Return(param0)` expectation — parameters are
/// never spilled to a local unless later reassigned, and this language's
/// typed tree never reassigns a `VariableRef::Local` parameter through
/// anything but `Assignment`, which is handled by re-binding the slot).
#[derive(Debug, Clone)]
pub enum LocalSlot {
    Addressed { pointer: Register, ty: IrType },
    Register { register: Register, ty: IrType },
}

pub struct Builder {
    next_register: u32,
    pub blocks: BlockArena,
    pub current: BasicBlockId,
    pub debug_scopes: Vec<DebugScope>,
    pub current_debug_scope: usize,
    locals: talc_utils::FnvHashMap<std::rc::Rc<str>, LocalSlot>,
    loop_stack: Vec<LoopTargets>,
}

impl Builder {
    pub fn new(range: FileRange) -> Self {
        let mut blocks = BlockArena::new();
        let entry = blocks.push(Block::new());
        Self {
            next_register: 0,
            blocks,
            current: entry,
            debug_scopes: vec![DebugScope { parent: None, range }],
            current_debug_scope: 0,
            locals: talc_utils::fx_map(),
            loop_stack: Vec::new(),
        }
    }

    pub fn fresh_register(&mut self) -> Register {
        let id = Register::from_raw(self.next_register);
        self.next_register += 1;
        id
    }

    pub fn push(&mut self, kind: InstructionKind, range: FileRange) {
        let scope = self.current_debug_scope;
        self.blocks[self.current].instructions.push(Instruction::new(kind, range, scope));
    }

    pub fn current_is_terminated(&self) -> bool {
        self.blocks[self.current].is_terminated()
    }

    /// Allocate a fresh block and switch to it, emitting a `Jump` from the
    /// current block first if it isn't already terminated (§4.6
    /// `enter_new_block`).
    pub fn enter_new_block(&mut self, range: FileRange) -> BasicBlockId {
        if !self.current_is_terminated() {
            let target = self.blocks.push(Block::new());
            self.push(InstructionKind::Jump { target }, range);
            self.current = target;
            target
        } else {
            let target = self.blocks.push(Block::new());
            self.current = target;
            target
        }
    }

    /// Switch to `target` without emitting an implicit jump — the caller
    /// has already emitted the `Branch`/`Return` that reaches it (§4.6
    /// `change_block`).
    pub fn change_block(&mut self, target: BasicBlockId) {
        self.current = target;
    }

    pub fn push_debug_scope(&mut self, range: FileRange) {
        self.debug_scopes.push(DebugScope { parent: Some(self.current_debug_scope), range });
        self.current_debug_scope = self.debug_scopes.len() - 1;
    }

    pub fn pop_debug_scope(&mut self) {
        if let Some(parent) = self.debug_scopes[self.current_debug_scope].parent {
            self.current_debug_scope = parent;
        }
    }

    pub fn bind_local(&mut self, name: std::rc::Rc<str>, slot: LocalSlot) {
        self.locals.insert(name, slot);
    }

    pub fn lookup_local(&self, name: &str) -> Option<&LocalSlot> {
        self.locals.get(name)
    }

    pub fn push_loop(&mut self, targets: LoopTargets) {
        self.loop_stack.push(targets);
    }

    pub fn pop_loop(&mut self) {
        self.loop_stack.pop();
    }

    pub fn current_loop(&self) -> Option<LoopTargets> {
        self.loop_stack.last().copied()
    }
}

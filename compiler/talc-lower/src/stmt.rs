//! Statement and control-flow lowering (§4.6 "Lowering rules", "Control
//! flow"). Each method takes a borrow of the in-progress [`FnLower`] and
//! pushes instructions into its current block. Nothing here fails: the
//! checker has already rejected anything that would make a statement
//! untypeable, and a malformed `asm` binding is reported straight into the
//! diagnostic sink by [`crate::asm`] rather than aborting lowering.

use std::rc::Rc;

use talc_ir::{Block, InstructionKind, IrConstantValue, IrType, Register};
use talc_source::FileRange;
use talc_tir::{TypedElseIf, TypedExpr, TypedStmt, TypedStmtKind};
use talc_types::TypeKind;

use crate::builder::LocalSlot;
use crate::expr::FnLower;

impl<'a> FnLower<'a> {
    pub fn lower_body(&mut self, body: &[TypedStmt]) {
        for stmt in body {
            self.lower_stmt(stmt);
        }
    }

    pub fn lower_stmt(&mut self, stmt: &TypedStmt) {
        let range = stmt.range;
        match &stmt.kind {
            TypedStmtKind::ExpressionStatement(expr) => {
                self.lower_expr(expr);
            }
            TypedStmtKind::VariableDeclaration { name, ty, initializer } => {
                let ir_ty = self.ir_ty(*ty);
                let pointer = self.builder.fresh_register();
                self.builder.push(
                    InstructionKind::AllocateLocal { ty: ir_ty.clone(), destination: pointer, has_debug_info: true, debug_name: Some(name.clone()), debug_type: Some(ir_ty.clone()) },
                    range,
                );
                if let Some(initializer) = initializer {
                    let value = self.lower_expr(initializer).to_register(&mut self.builder, range);
                    self.builder.push(InstructionKind::Store { ty: ir_ty.clone(), value, destination: pointer }, range);
                }
                self.builder.bind_local(name.clone(), LocalSlot::Addressed { pointer, ty: ir_ty });
            }
            TypedStmtKind::MultiReturnVariableDeclaration { names, initializer } => {
                let struct_value = self.lower_expr(initializer);
                let (struct_register, struct_ty) = match struct_value {
                    crate::builder::Lowered::Value { register, ty } => (register, ty),
                    addressed @ crate::builder::Lowered::Addressed { .. } => {
                        let register = addressed.to_register(&mut self.builder, range);
                        let ty = self.ir_ty(initializer.ty);
                        (register, ty)
                    }
                };
                let member_types = match &struct_ty {
                    IrType::Struct { members } => members.clone(),
                    other => unreachable!("a multi-return initializer must lower to a struct: {other:?}"),
                };
                for (index, name) in names.iter().enumerate() {
                    let member_ir = member_types[index].clone();
                    let member_register = self.builder.fresh_register();
                    self.builder.push(
                        InstructionKind::ReadStructMember { struct_type: struct_ty.clone(), source: struct_register, member_index: index, destination: member_register },
                        range,
                    );
                    let pointer = self.builder.fresh_register();
                    self.builder.push(
                        InstructionKind::AllocateLocal { ty: member_ir.clone(), destination: pointer, has_debug_info: true, debug_name: Some(name.clone()), debug_type: Some(member_ir.clone()) },
                        range,
                    );
                    self.builder.push(InstructionKind::Store { ty: member_ir.clone(), value: member_register, destination: pointer }, range);
                    self.builder.bind_local(name.clone(), LocalSlot::Addressed { pointer, ty: member_ir });
                }
            }
            TypedStmtKind::Assignment { target, value } => {
                let assign_target = self.lower_assignment_target(target);
                let value_register = self.lower_expr(value).to_register(&mut self.builder, range);
                self.store_to_assignment_target(assign_target, value_register, range);
            }
            TypedStmtKind::MultiAssignment { targets, value } => {
                let struct_value = self.lower_expr(value);
                let (struct_register, struct_ty) = match struct_value {
                    crate::builder::Lowered::Value { register, ty } => (register, ty),
                    addressed @ crate::builder::Lowered::Addressed { .. } => {
                        let ty = self.ir_ty(value.ty);
                        let register = addressed.to_register(&mut self.builder, range);
                        (register, ty)
                    }
                };
                let member_types = match &struct_ty {
                    IrType::Struct { members } => members.clone(),
                    other => unreachable!("a multi-assignment value must lower to a struct: {other:?}"),
                };
                // Resolve every target *before* writing any member, so a
                // target referenced twice across the tuple (or aliasing
                // another member) sees a consistent pre-assignment state.
                let assign_targets: Vec<_> = targets.iter().map(|t| self.lower_assignment_target(t)).collect();
                for (index, assign_target) in assign_targets.into_iter().enumerate() {
                    let member_ir = member_types[index].clone();
                    let member_register = self.builder.fresh_register();
                    self.builder.push(
                        InstructionKind::ReadStructMember { struct_type: struct_ty.clone(), source: struct_register, member_index: index, destination: member_register },
                        range,
                    );
                    self.store_to_assignment_target(assign_target, member_register, range);
                }
            }
            TypedStmtKind::BinaryOperationAssignment { target, op, value } => {
                let assign_target = self.lower_assignment_target(target);
                let current = self.load_assignment_target(&assign_target, range);
                let value_register = self.lower_expr(value).to_register(&mut self.builder, range);
                let combined = self.emit_binary_op_pub(*op, value.ty, current, value_register, value.ty, range).to_register(&mut self.builder, range);
                self.store_to_assignment_target(assign_target, combined, range);
            }
            TypedStmtKind::IfStatement { condition, body, else_ifs, else_body } => self.lower_if(condition, body, else_ifs, else_body, range),
            TypedStmtKind::WhileLoop { condition, body } => self.lower_while(condition, body, range),
            TypedStmtKind::ForLoop { variable, from, to, body } => self.lower_for(variable, from, to, body, range),
            TypedStmtKind::ReturnStatement { values } => match values.len() {
                0 => self.builder.push(InstructionKind::Return { value: None }, range),
                1 => {
                    let value = self.lower_expr(&values[0]).to_register(&mut self.builder, range);
                    self.builder.push(InstructionKind::Return { value: Some(value) }, range);
                }
                _ => {
                    let registers: Vec<Register> = values.iter().map(|v| self.lower_expr(v).to_register(&mut self.builder, range)).collect();
                    let destination = self.builder.fresh_register();
                    self.builder.push(InstructionKind::AssembleStruct { members: registers, destination }, range);
                    self.builder.push(InstructionKind::Return { value: Some(destination) }, range);
                }
            },
            TypedStmtKind::Break => {
                let targets = self.builder.current_loop().expect("break outside a loop is rejected by the checker before lowering runs");
                self.builder.push(InstructionKind::Jump { target: targets.break_target }, range);
            }
            TypedStmtKind::Continue => {
                let targets = self.builder.current_loop().expect("continue outside a loop is rejected by the checker before lowering runs");
                self.builder.push(InstructionKind::Jump { target: targets.continue_target }, range);
            }
            TypedStmtKind::InlineAssembly { assembly, bindings } => {
                let lowered = crate::asm::lower_asm_bindings(self, bindings, range);
                self.builder.push(InstructionKind::Assembly { assembly: assembly.clone(), bindings: lowered }, range);
            }
        }
    }

    /// `if`/`else if`/`else` lowers to an N+1-way diamond (§4.6): a
    /// `Branch` per condition, each arm its own block, all non-terminated
    /// arms joining at a shared merge block. `else_ifs` recurses by
    /// treating the first remaining `else if` as the nested `if` of the
    /// current `else` arm.
    fn lower_if(&mut self, condition: &TypedExpr, body: &[TypedStmt], else_ifs: &[TypedElseIf], else_body: &Option<Vec<TypedStmt>>, range: FileRange) {
        let cond_reg = self.lower_expr(condition).to_register(&mut self.builder, range);
        let then_block = self.builder.blocks.push(Block::new());
        let else_block = self.builder.blocks.push(Block::new());
        self.builder.push(InstructionKind::Branch { condition: cond_reg, true_target: then_block, false_target: else_block }, range);

        self.builder.change_block(then_block);
        self.builder.push_debug_scope(range);
        self.lower_body(body);
        self.builder.pop_debug_scope();
        let then_end = self.builder.current;
        let then_terminated = self.builder.current_is_terminated();

        self.builder.change_block(else_block);
        if let Some((first, rest)) = else_ifs.split_first() {
            self.lower_if(&first.condition, &first.body, rest, else_body, range);
        } else if let Some(else_stmts) = else_body {
            self.builder.push_debug_scope(range);
            self.lower_body(else_stmts);
            self.builder.pop_debug_scope();
        }
        let else_end = self.builder.current;
        let else_terminated = self.builder.current_is_terminated();

        let merge = self.builder.blocks.push(Block::new());
        if !then_terminated {
            self.builder.change_block(then_end);
            self.builder.push(InstructionKind::Jump { target: merge }, range);
        }
        if !else_terminated {
            self.builder.change_block(else_end);
            self.builder.push(InstructionKind::Jump { target: merge }, range);
        }
        self.builder.change_block(merge);
    }

    /// `while` lowers to {header, body, after} (§4.6): the header
    /// re-evaluates the condition every iteration, `continue` targets it
    /// directly, `break` targets `after`.
    fn lower_while(&mut self, condition: &TypedExpr, body: &[TypedStmt], range: FileRange) {
        let header = self.builder.enter_new_block(range);
        let cond_reg = self.lower_expr(condition).to_register(&mut self.builder, range);
        let body_block = self.builder.blocks.push(Block::new());
        let after_block = self.builder.blocks.push(Block::new());
        self.builder.push(InstructionKind::Branch { condition: cond_reg, true_target: body_block, false_target: after_block }, range);

        self.builder.change_block(body_block);
        self.builder.push_loop(crate::builder::LoopTargets { continue_target: header, break_target: after_block });
        self.builder.push_debug_scope(range);
        self.lower_body(body);
        self.builder.pop_debug_scope();
        self.builder.pop_loop();
        if !self.builder.current_is_terminated() {
            self.builder.push(InstructionKind::Jump { target: header }, range);
        }
        self.builder.change_block(after_block);
    }

    /// `for i from a to b` lowers to {init-store, header, body, increment}
    /// (§4.6): the loop variable lives in an addressed slot; the header's
    /// single `Load` of it is reused directly as the body's bound value
    /// (no second load per iteration), and `continue` targets the
    /// increment block rather than the header so an incomplete iteration
    /// still advances the counter.
    fn lower_for(&mut self, variable: &Rc<str>, from: &TypedExpr, to: &TypedExpr, body: &[TypedStmt], range: FileRange) {
        let loop_ty_id = self.concrete_ty_for_lowering(from.ty);
        let (size, signed) = match self.ctx.types.get(loop_ty_id) {
            TypeKind::Integer { size, signed } => (*size, *signed),
            other => unreachable!("a for-loop range must be integer-typed: {other:?}"),
        };
        let loop_ty = self.ir_ty(loop_ty_id);
        let from_reg = self.lower_expr(from).to_register(&mut self.builder, range);
        let to_reg = self.lower_expr(to).to_register(&mut self.builder, range);

        let slot = self.builder.fresh_register();
        self.builder.push(
            InstructionKind::AllocateLocal { ty: loop_ty.clone(), destination: slot, has_debug_info: true, debug_name: Some(variable.clone()), debug_type: Some(loop_ty.clone()) },
            range,
        );
        self.builder.push(InstructionKind::Store { ty: loop_ty.clone(), value: from_reg, destination: slot }, range);

        let header = self.builder.enter_new_block(range);
        let current = self.builder.fresh_register();
        self.builder.push(InstructionKind::Load { ty: loop_ty.clone(), source: slot, destination: current }, range);
        let cond = self.builder.fresh_register();
        let compare_op = if signed { talc_ir::IntegerComparisonOp::SignedLessOrEqual } else { talc_ir::IntegerComparisonOp::UnsignedLessOrEqual };
        self.builder.push(InstructionKind::IntegerComparisonOperation { op: compare_op, size, source_a: current, source_b: to_reg, destination: cond }, range);

        let body_block = self.builder.blocks.push(Block::new());
        let increment_block = self.builder.blocks.push(Block::new());
        let after_block = self.builder.blocks.push(Block::new());
        self.builder.push(InstructionKind::Branch { condition: cond, true_target: body_block, false_target: after_block }, range);

        self.builder.change_block(body_block);
        self.builder.bind_local(variable.clone(), LocalSlot::Register { register: current, ty: loop_ty.clone() });
        self.builder.push_loop(crate::builder::LoopTargets { continue_target: increment_block, break_target: after_block });
        self.builder.push_debug_scope(range);
        self.lower_body(body);
        self.builder.pop_debug_scope();
        self.builder.pop_loop();
        if !self.builder.current_is_terminated() {
            self.builder.push(InstructionKind::Jump { target: increment_block }, range);
        }

        self.builder.change_block(increment_block);
        let loaded = self.builder.fresh_register();
        self.builder.push(InstructionKind::Load { ty: loop_ty.clone(), source: slot, destination: loaded }, range);
        let one = self.builder.fresh_register();
        self.builder.push(InstructionKind::Literal { ty: loop_ty.clone(), value: IrConstantValue::Integer(1), destination: one }, range);
        let incremented = self.builder.fresh_register();
        self.builder.push(
            InstructionKind::IntegerArithmeticOperation { op: talc_ir::IntegerArithmeticOp::Add, size, source_a: loaded, source_b: one, destination: incremented },
            range,
        );
        self.builder.push(InstructionKind::Store { ty: loop_ty.clone(), value: incremented, destination: slot }, range);
        self.builder.push(InstructionKind::Jump { target: header }, range);

        self.builder.change_block(after_block);
    }
}

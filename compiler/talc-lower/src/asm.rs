//! Inline-assembly binding lowering (§4.6 "Inline assembly"). The checker
//! type-checks each binding's expression but never inspects the
//! constraint string itself — validating it, and converting the typed
//! tree's `AsmBinding{constraint, value: TypedExpr}` into the IR's
//! `AsmBinding{constraint, input_register, output}`, is entirely this
//! module's job.
//!
//! A malformed binding is reported into the diagnostic sink and then
//! dropped from the emitted instruction rather than aborting the whole
//! function's lowering (§4.7 "best-effort continuation" — nothing else
//! depends on a `GenerateFunction` job, so there is no dependent to
//! propagate a secondary diagnostic to; the recorded error alone is
//! enough to fail the overall compilation).

use talc_ir::{AsmBinding as IrAsmBinding, InstructionKind};
use talc_reporting::{CoreError, InlineAssemblyError, InlineAssemblyReason};
use talc_source::FileRange;
use talc_tir::AsmBinding as TirAsmBinding;

use crate::builder::LocalSlot;
use crate::expr::{AssignTarget, FnLower};

/// Lower every binding of one `asm` statement in source order, dropping
/// any that fail validation.
pub fn lower_asm_bindings(lower: &mut FnLower, bindings: &[TirAsmBinding], range: FileRange) -> Vec<IrAsmBinding> {
    bindings.iter().filter_map(|binding| lower_one_binding(lower, binding, range)).collect()
}

fn lower_one_binding(lower: &mut FnLower, binding: &TirAsmBinding, range: FileRange) -> Option<IrAsmBinding> {
    if binding.constraint.starts_with('*') {
        lower.ctx.sink.add_error(CoreError::from(InlineAssemblyError {
            range,
            reason: InlineAssemblyReason::MalformedConstraint(binding.constraint.to_string()),
        }));
        return None;
    }
    if binding.constraint.starts_with('=') {
        if !binding.value.value.is_assignable() {
            lower.ctx.sink.add_error(CoreError::from(InlineAssemblyError { range, reason: InlineAssemblyReason::NonAssignableOutputBinding }));
            return None;
        }
        let (pointer, ty) = match lower.lower_assignment_target(&binding.value) {
            AssignTarget::Addressed(pointer, ty) => (pointer, ty),
            // A register-backed local (an unreassigned parameter) has no
            // address for the asm output to write into — spill it to a
            // stack slot and rebind the local to that slot, the same way
            // `&x` forces a register value into addressed storage.
            AssignTarget::LocalRegister(name, ty) => {
                let current = match lower.builder.lookup_local(&name) {
                    Some(LocalSlot::Register { register, .. }) => *register,
                    _ => unreachable!("AssignTarget::LocalRegister always names a register-backed local"),
                };
                let slot = lower.builder.fresh_register();
                lower.builder.push(
                    InstructionKind::AllocateLocal { ty: ty.clone(), destination: slot, has_debug_info: false, debug_name: None, debug_type: None },
                    range,
                );
                lower.builder.push(InstructionKind::Store { ty: ty.clone(), value: current, destination: slot }, range);
                lower.builder.bind_local(name, LocalSlot::Addressed { pointer: slot, ty: ty.clone() });
                (slot, ty)
            }
        };
        Some(IrAsmBinding { constraint: binding.constraint.clone(), input_register: None, output: Some((pointer, ty)) })
    } else {
        let register = lower.lower_expr(&binding.value).to_register(&mut lower.builder, range);
        Some(IrAsmBinding { constraint: binding.constraint.clone(), input_register: Some(register), output: None })
    }
}

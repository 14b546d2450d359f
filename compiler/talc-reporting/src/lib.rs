//! Diagnostics: the [`report::Report`] value and the seven [`errors::CoreError`]
//! kinds the core can raise (§7).

pub mod errors;
pub mod report;

pub use errors::{
    ConstantEvaluationError, ConstantEvaluationReason, ControlFlowError, ControlFlowReason, CoreError, CycleError,
    InlineAssemblyError, InlineAssemblyReason, NameResolutionError, NameResolutionReason, ReportSink, TagError, TagErrorReason,
    TypeMismatchError, TypeMismatchReason,
};
pub use report::{Report, ReportKind};

#[cfg(test)]
mod tests {
    use talc_source::FileRange;

    use super::*;
    use crate::errors::{ConstantEvaluationError, ConstantEvaluationReason};

    #[test]
    fn core_error_renders_into_a_report() {
        let err = ConstantEvaluationError {
            range: FileRange::new(1, 0, 1, 5),
            reason: ConstantEvaluationReason::DivisionByZero,
        };
        let report: Report = CoreError::from(err).into();
        assert_eq!(report.kind, ReportKind::Error);
        assert!(report.title.contains("division by zero"));
    }

    #[test]
    fn sink_tracks_whether_any_error_was_recorded() {
        let mut sink = ReportSink::new();
        assert!(!sink.has_errors());
        sink.add_error(ConstantEvaluationError {
            range: FileRange::synthetic(),
            reason: ConstantEvaluationReason::NotAConstant,
        });
        assert!(sink.has_errors());
    }
}

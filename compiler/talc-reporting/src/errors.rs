//! The seven error kinds of the core (§7), each with a hand-written
//! `From<_> for Report` conversion — no derive-based error-to-message
//! macro, matching the teacher's own choice.

use talc_source::FileRange;

use crate::report::{Report, ReportKind};

#[derive(Debug, Clone)]
pub struct NameResolutionError {
    pub name: String,
    pub range: FileRange,
    pub reason: NameResolutionReason,
}

#[derive(Debug, Clone)]
pub enum NameResolutionReason {
    Unknown,
    AmbiguousMember,
    DuplicateDeclaration { first: FileRange },
}

#[derive(Debug, Clone)]
pub struct TypeMismatchError {
    pub range: FileRange,
    pub expected: String,
    pub found: String,
    pub reason: TypeMismatchReason,
}

#[derive(Debug, Clone, Copy)]
pub enum TypeMismatchReason {
    DisallowedCoercion,
    ArityMismatch,
    NotARuntimeType,
}

#[derive(Debug, Clone)]
pub struct ConstantEvaluationError {
    pub range: FileRange,
    pub reason: ConstantEvaluationReason,
}

#[derive(Debug, Clone)]
pub enum ConstantEvaluationReason {
    DivisionByZero,
    IndexOutOfBounds { index: u64, length: u64 },
    NotAConstant,
    NonConstantPolymorphicArgument,
}

#[derive(Debug, Clone)]
pub struct TagError {
    pub range: FileRange,
    pub reason: TagErrorReason,
}

#[derive(Debug, Clone)]
pub enum TagErrorReason {
    UnknownTag(String),
    ConflictingTags { first: String, second: String },
    MalformedExternArgument,
}

#[derive(Debug, Clone)]
pub struct ControlFlowError {
    pub range: FileRange,
    pub reason: ControlFlowReason,
}

#[derive(Debug, Clone)]
pub enum ControlFlowReason {
    UnreachableCode,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    MissingTerminalReturn,
}

#[derive(Debug, Clone)]
pub struct InlineAssemblyError {
    pub range: FileRange,
    pub reason: InlineAssemblyReason,
}

#[derive(Debug, Clone)]
pub enum InlineAssemblyReason {
    MalformedConstraint(String),
    NonAssignableOutputBinding,
}

#[derive(Debug, Clone)]
pub struct CycleError {
    /// The declarations participating in the cycle, in discovery order.
    pub involved: Vec<(String, FileRange)>,
}

/// The closed sum of every error the core can raise (§7).
#[derive(Debug, Clone)]
pub enum CoreError {
    NameResolution(NameResolutionError),
    TypeMismatch(TypeMismatchError),
    ConstantEvaluation(ConstantEvaluationError),
    Tag(TagError),
    ControlFlow(ControlFlowError),
    InlineAssembly(InlineAssemblyError),
    Cycle(CycleError),
}

impl From<NameResolutionError> for CoreError {
    fn from(value: NameResolutionError) -> Self {
        CoreError::NameResolution(value)
    }
}
impl From<TypeMismatchError> for CoreError {
    fn from(value: TypeMismatchError) -> Self {
        CoreError::TypeMismatch(value)
    }
}
impl From<ConstantEvaluationError> for CoreError {
    fn from(value: ConstantEvaluationError) -> Self {
        CoreError::ConstantEvaluation(value)
    }
}
impl From<TagError> for CoreError {
    fn from(value: TagError) -> Self {
        CoreError::Tag(value)
    }
}
impl From<ControlFlowError> for CoreError {
    fn from(value: ControlFlowError) -> Self {
        CoreError::ControlFlow(value)
    }
}
impl From<InlineAssemblyError> for CoreError {
    fn from(value: InlineAssemblyError) -> Self {
        CoreError::InlineAssembly(value)
    }
}
impl From<CycleError> for CoreError {
    fn from(value: CycleError) -> Self {
        CoreError::Cycle(value)
    }
}

impl From<CoreError> for Report {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NameResolution(err) => {
                let title = match &err.reason {
                    NameResolutionReason::Unknown => format!("cannot find `{}` in this scope", err.name),
                    NameResolutionReason::AmbiguousMember => format!("`{}` is ambiguous", err.name),
                    NameResolutionReason::DuplicateDeclaration { .. } => {
                        format!("the name `{}` is defined multiple times", err.name)
                    }
                };
                let report = Report::new(ReportKind::Error, title)
                    .code("name-resolution")
                    .add_labelled_span(err.range, "not found");
                if let NameResolutionReason::DuplicateDeclaration { first } = err.reason {
                    report.add_labelled_span(first, "first defined here")
                } else {
                    report
                }
            }
            CoreError::TypeMismatch(err) => {
                let title = match err.reason {
                    TypeMismatchReason::DisallowedCoercion => {
                        format!("expected `{}`, found `{}`", err.expected, err.found)
                    }
                    TypeMismatchReason::ArityMismatch => {
                        format!("expected {} arguments, found {}", err.expected, err.found)
                    }
                    TypeMismatchReason::NotARuntimeType => {
                        format!("`{}` cannot be used in a runtime position", err.found)
                    }
                };
                Report::new(ReportKind::Error, title)
                    .code("type-mismatch")
                    .add_labelled_span(err.range, "here")
            }
            CoreError::ConstantEvaluation(err) => {
                let title = match err.reason {
                    ConstantEvaluationReason::DivisionByZero => "division by zero in constant expression".to_string(),
                    ConstantEvaluationReason::IndexOutOfBounds { index, length } => {
                        format!("index {index} out of bounds for array of length {length}")
                    }
                    ConstantEvaluationReason::NotAConstant => {
                        "expression must be a compile-time constant".to_string()
                    }
                    ConstantEvaluationReason::NonConstantPolymorphicArgument => {
                        "polymorphic argument must be a compile-time constant".to_string()
                    }
                };
                Report::new(ReportKind::Error, title)
                    .code("constant-evaluation")
                    .add_labelled_span(err.range, "here")
            }
            CoreError::Tag(err) => {
                let title = match err.reason {
                    TagErrorReason::UnknownTag(ref tag) => format!("unknown tag `{tag}`"),
                    TagErrorReason::ConflictingTags { ref first, ref second } => {
                        format!("tag `{second}` conflicts with `{first}`")
                    }
                    TagErrorReason::MalformedExternArgument => {
                        "malformed argument to `extern(...)`".to_string()
                    }
                };
                Report::new(ReportKind::Error, title).code("tag").add_labelled_span(err.range, "here")
            }
            CoreError::ControlFlow(err) => {
                let title = match err.reason {
                    ControlFlowReason::UnreachableCode => "unreachable code".to_string(),
                    ControlFlowReason::BreakOutsideLoop => "`break` outside of a loop".to_string(),
                    ControlFlowReason::ContinueOutsideLoop => "`continue` outside of a loop".to_string(),
                    ControlFlowReason::MissingTerminalReturn => {
                        "function does not return a value on all paths".to_string()
                    }
                };
                Report::new(ReportKind::Error, title)
                    .code("control-flow")
                    .add_labelled_span(err.range, "here")
            }
            CoreError::InlineAssembly(err) => {
                let title = match err.reason {
                    InlineAssemblyReason::MalformedConstraint(ref c) => {
                        format!("malformed asm constraint `{c}`")
                    }
                    InlineAssemblyReason::NonAssignableOutputBinding => {
                        "output binding must be an assignable value".to_string()
                    }
                };
                Report::new(ReportKind::Error, title)
                    .code("inline-assembly")
                    .add_labelled_span(err.range, "here")
            }
            CoreError::Cycle(err) => {
                let names: Vec<_> = err.involved.iter().map(|(n, _)| n.clone()).collect();
                let mut report = Report::new(
                    ReportKind::Error,
                    format!("cycle detected among: {}", names.join(", ")),
                )
                .code("cycle");
                for (name, range) in &err.involved {
                    report = report.add_labelled_span(*range, format!("`{name}` depends on the next"));
                }
                report
            }
        }
    }
}

/// Best-effort multi-error accumulation (§4.7): the scheduler keeps
/// driving independent jobs after a failure and reports everything
/// gathered at the end. Named and shaped after the teacher's own
/// `TcErrorState`.
#[derive(Debug, Default)]
pub struct ReportSink {
    reports: Vec<Report>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: impl Into<CoreError>) {
        self.reports.push(error.into().into());
    }

    pub fn add_report(&mut self, report: Report) {
        self.reports.push(report);
    }

    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(|r| r.kind == ReportKind::Error)
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.reports
    }
}

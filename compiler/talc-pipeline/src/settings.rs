//! Compiler-wide settings (§4.9). Kept independent of `clap` so this
//! crate stays usable from a test harness without pulling in a CLI
//! framework; the `talc` binary is what actually parses these from
//! arguments.

/// How aggressively `talc-lower` should fold/promote constants (P8).
/// `Speed` is accepted but currently behaves identically to `None` — the
/// HLIR generator always performs the static-constant dedup described in
/// §4.6 regardless of level; the level exists as a forward-compatible
/// knob rather than one this repository's generator actually branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimisationLevel {
    #[default]
    None,
    Speed,
}

/// Everything the entry-seed pipeline and the `talc` binary need to agree
/// on for one compilation run.
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub optimisation_level: OptimisationLevel,
    /// Declared for parity with the teacher's own multi-threaded worker
    /// pool; the scheduler here is cooperative and single-threaded (§4.1:
    /// "jobs never block on an OS thread"), so this is accepted but not
    /// consulted by `compile`.
    pub worker_count: usize,
    pub target_triple: String,
    pub dump_scopes: bool,
    pub dump_typed_tree: bool,
    pub dump_ir: bool,
    pub emit_errors: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            optimisation_level: OptimisationLevel::default(),
            worker_count: 1,
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            dump_scopes: false,
            dump_typed_tree: false,
            dump_ir: false,
            emit_errors: true,
        }
    }
}

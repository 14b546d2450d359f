//! The explicit compiler-context value threaded through every pass (§9:
//! "Global mutable state ... should be passed as an explicit compiler-context
//! value ... no true globals"). Bundles the type arena, the scope graph,
//! the constant-value arena, the diagnostic sink, and the architecture size
//! record.

use talc_reporting::ReportSink;
use talc_target::ArchitectureSizes;
use talc_tir::{ConstStore, ScopeStore};
use talc_types::TypeStore;

pub struct CompilerContext {
    pub types: TypeStore,
    pub scopes: ScopeStore,
    pub consts: ConstStore,
    pub sink: ReportSink,
    pub sizes: ArchitectureSizes,
}

impl CompilerContext {
    pub fn new(sizes: ArchitectureSizes) -> Self {
        Self {
            types: TypeStore::new(),
            scopes: ScopeStore::new(),
            consts: ConstStore::new(),
            sink: ReportSink::new(),
            sizes,
        }
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(ArchitectureSizes::default())
    }
}

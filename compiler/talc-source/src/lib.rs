//! Source-location primitives shared by every later stage: [`Identifier`]
//! and [`FileRange`]. Both are plain data, compared structurally, and carry
//! no behaviour beyond `Display`/equality — the parser (out of scope for
//! this repository) is the sole producer of them; everything downstream
//! only reads them.

use std::{fmt, path::PathBuf, rc::Rc, sync::Arc};

/// An absolute, canonicalised path to a source file, cheaply clonable.
pub type SourcePath = Arc<PathBuf>;

/// A span within a single source file, `(first_line, first_column) ..=
/// (last_line, last_column)`, all zero-indexed. Attached to every AST,
/// typed-tree, and IR node for diagnostics and debug info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRange {
    pub first_line: u32,
    pub first_column: u32,
    pub last_line: u32,
    pub last_column: u32,
}

impl FileRange {
    pub const fn new(
        first_line: u32,
        first_column: u32,
        last_line: u32,
        last_column: u32,
    ) -> Self {
        Self { first_line, first_column, last_line, last_column }
    }

    /// A placeholder range used for synthetic nodes (builtins, generated
    /// temporaries) that have no true source location.
    pub const fn synthetic() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// The smallest range enclosing both `self` and `other`.
    pub fn merge(self, other: Self) -> Self {
        let (first_line, first_column) = if self.first_line < other.first_line
            || (self.first_line == other.first_line && self.first_column <= other.first_column)
        {
            (self.first_line, self.first_column)
        } else {
            (other.first_line, other.first_column)
        };

        let (last_line, last_column) = if self.last_line > other.last_line
            || (self.last_line == other.last_line && self.last_column >= other.last_column)
        {
            (self.last_line, self.last_column)
        } else {
            (other.last_line, other.last_column)
        };

        Self::new(first_line, first_column, last_line, last_column)
    }
}

impl fmt::Display for FileRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.first_line + 1,
            self.first_column + 1,
            self.last_line + 1,
            self.last_column + 1
        )
    }
}

/// A textual name paired with the range it was written at. Two identifiers
/// are equal iff their text matches; the range only matters for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct Identifier {
    pub text: Rc<str>,
    pub range: FileRange,
}

impl Identifier {
    pub fn new(text: impl Into<Rc<str>>, range: FileRange) -> Self {
        Self { text: text.into(), range }
    }

    pub fn synthetic(text: impl Into<Rc<str>>) -> Self {
        Self { text: text.into(), range: FileRange::synthetic() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Identifier {}

impl std::hash::Hash for Identifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

talc_utils::counter! {
    name: SourceId,
    counter_name: SOURCE_ID_COUNTER,
    visibility: pub,
}

/// A single parsed file: its canonical path, used both as the scope's
/// "owning file path" and to de-duplicate `ParseFile` jobs by unique
/// absolute path.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub id: SourceId,
    pub path: SourcePath,
}

impl SourceInfo {
    pub fn new(id: SourceId, path: SourcePath) -> Self {
        Self { id, path }
    }

    pub fn basename(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_compare_by_text_only() {
        let a = Identifier::new("foo", FileRange::new(0, 0, 0, 3));
        let b = Identifier::new("foo", FileRange::new(5, 0, 5, 3));
        assert_eq!(a, b);
    }

    #[test]
    fn file_range_merge_spans_both() {
        let a = FileRange::new(1, 0, 1, 5);
        let b = FileRange::new(3, 2, 3, 9);
        let merged = a.merge(b);
        assert_eq!(merged, FileRange::new(1, 0, 3, 9));
    }
}

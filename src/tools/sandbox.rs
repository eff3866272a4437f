//! Path confinement for the one tool that accepts a model-supplied path.
//!
//! Layered policy: the textual guards (traversal token, sensitive prefixes)
//! are cheap and produce readable rejection messages; the working-directory
//! prefix check at the end is the authoritative one and must hold even if the
//! earlier layers are ever relaxed.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

/// Absolute prefixes the model may never point a tool at.
pub const SENSITIVE_PREFIXES: &[&str] = &[
    "/etc", "/root", "/var", "/usr", "/bin", "/sbin", "/sys", "/proc",
];

/// Process working directory, captured once. Read-only for the whole process
/// lifetime; every sanitized path is confined beneath it.
static WORKDIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
});

pub fn workdir() -> &'static Path {
    &WORKDIR
}

/// Why an input path was refused. The message is model-visible: it comes back
/// to the LLM as a tool result, so it names the violated rule plainly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRejected {
    Traversal,
    SensitivePrefix(&'static str),
    OutsideWorkdir,
}

impl fmt::Display for PathRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRejected::Traversal => write!(f, "Path traversal not allowed (contains '..')"),
            PathRejected::SensitivePrefix(prefix) => {
                write!(f, "Access to '{}' is not allowed", prefix)
            }
            PathRejected::OutsideWorkdir => {
                write!(f, "Path resolves outside the working directory")
            }
        }
    }
}

impl std::error::Error for PathRejected {}

/// Validate a model-supplied path and resolve it to an absolute directory
/// under the process working directory.
pub fn sanitize(input: &str) -> Result<PathBuf, PathRejected> {
    sanitize_within(input, workdir())
}

/// Same policy with an explicit root, so tests can confine to a temp dir.
pub fn sanitize_within(input: &str, root: &Path) -> Result<PathBuf, PathRejected> {
    let trimmed = input.trim();

    if trimmed.contains("..") {
        return Err(PathRejected::Traversal);
    }
    for prefix in SENSITIVE_PREFIXES.iter().copied() {
        if trimmed.starts_with(prefix) {
            return Err(PathRejected::SensitivePrefix(prefix));
        }
    }

    let joined = if Path::new(trimmed).is_absolute() {
        PathBuf::from(trimmed)
    } else {
        root.join(trimmed)
    };
    let resolved = normalize(&joined);

    // Authoritative confinement check.
    if !resolved.starts_with(root) {
        return Err(PathRejected::OutsideWorkdir);
    }
    Ok(resolved)
}

/// Lexical normalization: folds `.` components and empty segments. `..` never
/// reaches here — the traversal guard rejects it up front.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

//! Whitelisted host tools advertised to the LLM.
//!
//! The catalog is fixed at compile time: a tool is either niladic (fixed
//! argv, runs in the process working directory) or path-scoped (fixed argv,
//! runs in a sanitized model-supplied directory). There is exactly one
//! path-scoped tool. Descriptions are prompt surface — rewording them changes
//! model behavior, so treat edits as prompt changes, not refactors.

pub mod exec;
pub mod sandbox;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Fixed argv: program plus constant arguments. Nothing model-supplied is
/// ever spliced in; the path-scoped tool only varies its working directory.
pub type CommandSpec = &'static [&'static str];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSpec {
    /// No parameters; runs in the process working directory.
    Niladic { argv: CommandSpec },
    /// One optional string `path`, confined by the sandbox.
    PathScoped { argv: CommandSpec },
}

#[derive(Debug, Clone, Copy)]
pub struct ToolEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub spec: ToolSpec,
}

/// Directory names excluded from the project overview tree. Matches the
/// usual build-artifact and dependency directories.
const OVERVIEW_EXCLUDES: &str = ".git|node_modules|target|dist|build|__pycache__|.venv|coverage";

/// The one tool whose behavior is parameterized by a model-supplied path.
pub const PATH_TOOL: &str = "list_files_in_path";

/// The full catalog, in the order it is advertised upstream.
pub static CATALOG: &[ToolEntry] = &[
    ToolEntry {
        name: "current_directory",
        description: "Get the absolute path of the server's current working directory.",
        spec: ToolSpec::Niladic { argv: &["pwd"] },
    },
    ToolEntry {
        name: "project_overview",
        description: "Show a tree-style overview of the project layout (3 levels deep, \
                      build artifacts and dependency directories excluded).",
        spec: ToolSpec::Niladic {
            argv: &["tree", "-L", "3", "-I", OVERVIEW_EXCLUDES],
        },
    },
    ToolEntry {
        name: "list_files",
        description: "List the files in the server's current working directory, \
                      with sizes and permissions.",
        spec: ToolSpec::Niladic { argv: &["ls", "-la"] },
    },
    ToolEntry {
        name: "list_files_in_path",
        description: "List the files in a directory inside the project, given as a \
                      path relative to the working directory. Use this to inspect \
                      subdirectories before answering questions about them.",
        spec: ToolSpec::PathScoped { argv: &["ls", "-la"] },
    },
    ToolEntry {
        name: "current_time",
        description: "Get the current date and time on the server.",
        spec: ToolSpec::Niladic { argv: &["date"] },
    },
    ToolEntry {
        name: "disk_usage",
        description: "Show disk usage of the server's mounted filesystems.",
        spec: ToolSpec::Niladic { argv: &["df", "-h"] },
    },
    ToolEntry {
        name: "os_info",
        description: "Show the server's operating system and kernel identity.",
        spec: ToolSpec::Niladic { argv: &["uname", "-a"] },
    },
    ToolEntry {
        name: "runtime_version",
        description: "Show the version of the host's installed Rust toolchain.",
        spec: ToolSpec::Niladic {
            argv: &["rustc", "--version"],
        },
    },
    ToolEntry {
        name: "git_status",
        description: "Show the short git status of the working directory, including \
                      the current branch.",
        spec: ToolSpec::Niladic {
            argv: &["git", "status", "--short", "--branch"],
        },
    },
];

/// OpenAI-format function definitions, built once and re-sent verbatim on
/// every tool-advertising upstream call.
static DESCRIPTORS: Lazy<Vec<Value>> = Lazy::new(|| {
    CATALOG
        .iter()
        .map(|entry| {
            let parameters = match entry.spec {
                ToolSpec::Niladic { .. } => json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
                ToolSpec::PathScoped { .. } => json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory path relative to the working directory (default: \".\")"
                        }
                    },
                    "required": []
                }),
            };
            json!({
                "type": "function",
                "function": {
                    "name": entry.name,
                    "description": entry.description,
                    "parameters": parameters
                }
            })
        })
        .collect()
});

pub fn descriptors() -> &'static [Value] {
    &DESCRIPTORS
}

pub fn entry(name: &str) -> Option<&'static ToolEntry> {
    CATALOG.iter().find(|e| e.name == name)
}

pub fn is_known(name: &str) -> bool {
    entry(name).is_some()
}

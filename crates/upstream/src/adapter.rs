//! Agent adapters.
//!
//! Different coding agents expose the same operations under different tool
//! names and input shapes. The adapter is picked once per request from the
//! tool declarations in the request body, then used to classify every
//! `tool_use` block of the reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dg_domain::action::{ActionKind, AgentAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAdapter {
    /// PascalCase tools (`Edit`, `Bash`, ...) with snake_case inputs.
    #[default]
    ClaudeCode,
    /// lowercase tools (`edit`, `bash`, ...) with camelCase inputs.
    OpenCode,
}

impl AgentAdapter {
    /// Pick the adapter from the request's declared tools.
    ///
    /// Requests without tools default to [`AgentAdapter::ClaudeCode`].
    pub fn detect(request: &Value) -> Self {
        let Some(tools) = request.get("tools").and_then(Value::as_array) else {
            return Self::default();
        };
        let names = tools
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str));

        let mut lower = 0usize;
        let mut pascal = 0usize;
        for name in names {
            match name {
                "bash" | "edit" | "write" | "read" | "glob" | "grep" | "list" | "patch" => {
                    lower += 1
                }
                "Bash" | "Edit" | "Write" | "Read" | "Glob" | "Grep" | "LS" | "MultiEdit" => {
                    pascal += 1
                }
                _ => {}
            }
        }
        if lower > pascal {
            Self::OpenCode
        } else {
            Self::ClaudeCode
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::OpenCode => "opencode",
        }
    }

    pub fn kind_of(&self, tool_name: &str) -> ActionKind {
        match self {
            Self::ClaudeCode => match tool_name {
                "Edit" | "MultiEdit" | "NotebookEdit" => ActionKind::Edit,
                "Write" => ActionKind::Write,
                "Read" | "NotebookRead" => ActionKind::Read,
                "Bash" | "BashOutput" => ActionKind::Shell,
                "Grep" | "Glob" | "LS" | "WebSearch" | "WebFetch" => ActionKind::Search,
                _ => ActionKind::Other,
            },
            Self::OpenCode => match tool_name {
                "edit" | "patch" | "multiedit" => ActionKind::Edit,
                "write" => ActionKind::Write,
                "read" => ActionKind::Read,
                "bash" => ActionKind::Shell,
                "grep" | "glob" | "list" | "webfetch" | "websearch" => ActionKind::Search,
                _ => ActionKind::Other,
            },
        }
    }

    /// Map one `tool_use` invocation to a typed action.
    pub fn classify(&self, tool_name: &str, tool_use_id: &str, input: &Value) -> AgentAction {
        let kind = self.kind_of(tool_name);
        let (file_keys, path_keys, command_key): (&[&str], &[&str], &str) = match self {
            Self::ClaudeCode => (&["file_path", "notebook_path"], &["path"], "command"),
            Self::OpenCode => (&["filePath", "file_path"], &["path"], "command"),
        };

        let mut files: Vec<String> = file_keys
            .iter()
            .filter_map(|k| input.get(*k).and_then(Value::as_str))
            .map(str::to_owned)
            .collect();

        // Batch edits carry their own file paths.
        if let Some(edits) = input.get("edits").and_then(Value::as_array) {
            for e in edits {
                for k in file_keys {
                    if let Some(p) = e.get(*k).and_then(Value::as_str) {
                        files.push(p.to_owned());
                    }
                }
            }
        }

        let mut folders: Vec<String> = path_keys
            .iter()
            .filter_map(|k| input.get(*k).and_then(Value::as_str))
            .map(str::to_owned)
            .collect();
        for f in &files {
            if let Some(parent) = parent_dir(f) {
                folders.push(parent.to_owned());
            }
        }

        files.sort();
        files.dedup();
        folders.sort();
        folders.dedup();

        let command = if kind == ActionKind::Shell {
            input
                .get(command_key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        } else {
            None
        };
        let pattern = input
            .get("pattern")
            .or_else(|| input.get("query"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        AgentAction {
            kind,
            tool_name: tool_name.to_owned(),
            tool_use_id: tool_use_id.to_owned(),
            files,
            folders,
            command,
            pattern,
        }
    }
}

fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return Some("/");
    }
    Some(&trimmed[..idx])
}

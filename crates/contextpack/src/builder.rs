use crate::injection;
use crate::report::{SectionReport, StaticReport};
use crate::truncation::{self, Section};

/// Per-memory cap, as a share of the total.
const SECTION_SHARE: usize = 3;

/// A memory already fetched from the collaborator (title + rendered body).
pub struct MemorySnippet {
    pub title: String,
    pub content: String,
}

/// Deterministic builder for the static channel.
///
/// Pure function: accepts pre-fetched memories and the char cap, returns
/// the block for the system prompt plus a machine-readable report. The same
/// input always yields byte-identical output, which is what keeps the
/// cached prefix stable across sessions.
pub struct StaticContextBuilder {
    pub max_chars: usize,
}

impl StaticContextBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Returns `None` for the text when there is nothing to inject.
    pub fn build(&self, project: &str, memories: &[MemorySnippet]) -> (Option<String>, StaticReport) {
        let per_section = (self.max_chars / SECTION_SHARE).max(1);

        let mut sections: Vec<Section> = memories
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| {
                let normalized = m.content.replace("\r\n", "\n");
                let (content, truncated) = truncation::truncate(normalized.trim(), per_section);
                Section::new(m.title.trim(), content, m.content.len(), truncated)
            })
            .collect();

        truncation::apply_total_cap(&mut sections, self.max_chars);

        let mut body = String::new();
        let mut reports = Vec::with_capacity(sections.len());
        for s in &sections {
            reports.push(SectionReport {
                title: s.title.clone(),
                raw_chars: s.raw_chars,
                injected_chars: if s.included { s.content.len() } else { 0 },
                truncated_per_section: s.truncated_per_section,
                truncated_total_cap: s.truncated_total_cap,
                included: s.included,
            });
            if s.included {
                body.push_str(&injection::format_memory(&s.title, &s.content));
                body.push('\n');
            }
        }

        let text = (!body.is_empty()).then(|| injection::format_static_block(project, &body));
        let report = StaticReport {
            project: project.to_string(),
            sections: reports,
            total_injected_chars: text.as_ref().map_or(0, String::len),
        };
        (text, report)
    }
}

/// Inputs of the dynamic channel for one new user turn.
#[derive(Debug, Default)]
pub struct DynamicContext<'a> {
    pub files_edited: &'a [String],
    pub decisions: &'a [String],
    /// Correction or forced-recovery text, placed last.
    pub directive: Option<&'a str>,
}

impl DynamicContext<'_> {
    /// Render the block for the last user message, or `None` when empty.
    /// Only the most recent `max_files` edited files are listed.
    pub fn render(&self, max_files: usize) -> Option<String> {
        let mut body = String::new();

        if !self.files_edited.is_empty() && max_files > 0 {
            let skip = self.files_edited.len().saturating_sub(max_files);
            body.push_str("Files edited in this task:\n");
            for f in &self.files_edited[skip..] {
                body.push_str(&format!("- {f}\n"));
            }
        }

        if !self.decisions.is_empty() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str("Decisions so far:\n");
            for d in self.decisions {
                body.push_str(&format!("- {d}\n"));
            }
        }

        if let Some(text) = self.directive.filter(|t| !t.trim().is_empty()) {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(text.trim_end());
            body.push('\n');
        }

        (!body.is_empty()).then(|| injection::format_dynamic_block(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(title: &str, content: &str) -> MemorySnippet {
        MemorySnippet {
            title: title.into(),
            content: content.into(),
        }
    }

    #[test]
    fn static_build_is_deterministic() {
        let memories = vec![snippet("Auth", "JWT with 15 min expiry."), snippet("DB", "Postgres 16.")];
        let b = StaticContextBuilder::new(4000);
        let (a, report) = b.build("/repo", &memories);
        let (again, _) = b.build("/repo", &memories);
        assert_eq!(a, again);
        assert_eq!(report.included(), 2);
        assert_eq!(report.total_injected_chars, a.unwrap().len());
    }

    #[test]
    fn empty_memories_inject_nothing() {
        let (text, report) = StaticContextBuilder::new(4000).build("/repo", &[snippet("blank", "  ")]);
        assert!(text.is_none());
        assert_eq!(report.total_injected_chars, 0);
    }

    #[test]
    fn static_cap_drops_overflow() {
        let memories = vec![
            snippet("a", &"a".repeat(40)),
            snippet("b", &"b".repeat(40)),
            snippet("c", &"c".repeat(40)),
        ];
        let (_, report) = StaticContextBuilder::new(90).build("/repo", &memories);
        assert!(report.sections[0].included);
        assert!(report.sections[2].truncated_total_cap || !report.sections[2].included);
    }

    #[test]
    fn dynamic_block_keeps_latest_files_and_directive_last() {
        let files: Vec<String> = (1..=5).map(|i| format!("src/f{i}.rs")).collect();
        let decisions = vec!["I'll use a BTreeMap".to_string()];
        let ctx = DynamicContext {
            files_edited: &files,
            decisions: &decisions,
            directive: Some("[driftguard: Focus check] ..."),
        };
        let text = ctx.render(2).unwrap();
        assert!(!text.contains("src/f3.rs"));
        assert!(text.contains("- src/f4.rs\n- src/f5.rs\n"));
        assert!(text.contains("- I'll use a BTreeMap"));
        let directive = text.find("Focus check").unwrap();
        assert!(directive > text.find("Decisions").unwrap());
    }

    #[test]
    fn empty_dynamic_context_renders_nothing() {
        assert!(DynamicContext::default().render(10).is_none());
    }
}

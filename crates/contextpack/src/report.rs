use serde::{Deserialize, Serialize};

/// Per-memory report within a static context build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    pub title: String,
    pub raw_chars: usize,
    pub injected_chars: usize,
    pub truncated_per_section: bool,
    pub truncated_total_cap: bool,
    pub included: bool,
}

/// What went into a project's static context. Returned with the cached
/// entry so the sessions API can show it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticReport {
    pub project: String,
    pub sections: Vec<SectionReport>,
    pub total_injected_chars: usize,
}

impl StaticReport {
    pub fn included(&self) -> usize {
        self.sections.iter().filter(|s| s.included).count()
    }
}

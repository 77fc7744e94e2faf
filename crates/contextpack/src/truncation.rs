/// A section being accumulated for total-cap processing.
pub struct Section {
    pub title: String,
    pub content: String,
    pub raw_chars: usize,
    pub truncated_per_section: bool,
    pub truncated_total_cap: bool,
    pub included: bool,
}

impl Section {
    pub fn new(title: impl Into<String>, content: String, raw_chars: usize, truncated: bool) -> Self {
        Self {
            title: title.into(),
            content,
            raw_chars,
            truncated_per_section: truncated,
            truncated_total_cap: false,
            included: true,
        }
    }
}

/// Cut `content` to at most `max_chars` bytes at a char boundary and mark
/// the cut with `[TRUNCATED]`.
pub fn truncate(content: &str, max_chars: usize) -> (String, bool) {
    if content.len() <= max_chars {
        return (content.to_string(), false);
    }
    let boundary = content.floor_char_boundary(max_chars);
    let mut result = content[..boundary].trim_end().to_string();
    result.push_str("\n[TRUNCATED]");
    (result, true)
}

/// Apply a total cap across sections in order. The section that crosses the
/// cap is cut, everything after it is dropped.
pub fn apply_total_cap(sections: &mut [Section], total_max_chars: usize) {
    let mut accumulated: usize = 0;

    for section in sections.iter_mut() {
        if !section.included {
            continue;
        }

        let section_len = section.content.len();

        if accumulated + section_len <= total_max_chars {
            accumulated += section_len;
        } else if accumulated < total_max_chars {
            let remaining = total_max_chars - accumulated;
            let boundary = section.content.floor_char_boundary(remaining);
            section.content = format!("{}\n[TRUNCATED_TOTAL_CAP]", &section.content[..boundary]);
            section.truncated_total_cap = true;
            accumulated = total_max_chars;
        } else {
            section.content.clear();
            section.included = false;
        }
    }
}

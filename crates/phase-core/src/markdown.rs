//! Fixed-heading markdown used by stack `context.md` files and the project
//! context artifact.
//!
//! The format is deliberately line-oriented: `## Heading` opens a section,
//! `### Sub` opens a subsection inside it, `- Key: value` lines carry fields
//! and bare `- item` lines carry list entries. Anything else is prose and is
//! ignored on read.

use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Heading text after `## `, e.g. `Strictness: High`.
    pub heading: String,
    pub lines: Vec<String>,
    pub subsections: Vec<Section>,
}

impl Section {
    /// First `- key: value` entry whose key matches case-insensitively.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
    }

    /// Every value for a repeatable key, in document order.
    pub fn field_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items().filter_map(|item| {
            let (k, v) = item.split_once(": ")?;
            let v = v.trim();
            (!v.is_empty()).then_some((k.trim(), v))
        })
    }

    /// Bullet items with the `- ` marker stripped.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter_map(|l| l.trim_start().strip_prefix("- ").map(str::trim))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub sections: Vec<Section>,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        for line in content.lines() {
            if let Some(h) = line.strip_prefix("### ") {
                if let Some(parent) = sections.last_mut() {
                    parent.subsections.push(Section {
                        heading: h.trim().to_string(),
                        ..Section::default()
                    });
                }
                continue;
            }
            if let Some(h) = line.strip_prefix("## ") {
                sections.push(Section {
                    heading: h.trim().to_string(),
                    ..Section::default()
                });
                continue;
            }
            let Some(current) = sections.last_mut() else {
                continue;
            };
            match current.subsections.last_mut() {
                Some(sub) => sub.lines.push(line.to_string()),
                None => current.lines.push(line.to_string()),
            }
        }
        Self { sections }
    }

    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.heading.eq_ignore_ascii_case(heading))
    }

    /// Section whose heading is `<prefix>: <value>`; returns the section and value.
    pub fn section_with_value(&self, prefix: &str) -> Option<(&Section, &str)> {
        self.sections.iter().find_map(|s| {
            let (k, v) = s.heading.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(prefix)
                .then(|| (s, v.trim()))
        })
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Small builder so every writer emits the same spacing.
#[derive(Debug, Default)]
pub struct Writer {
    out: String,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&mut self, line: &str) -> &mut Self {
        self.out.push_str(line);
        self.out.push('\n');
        self
    }

    pub fn heading(&mut self, text: &str) -> &mut Self {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
        let _ = writeln!(self.out, "## {text}");
        self
    }

    pub fn subheading(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.out, "### {text}");
        self
    }

    pub fn field(&mut self, key: &str, value: &str) -> &mut Self {
        let _ = writeln!(self.out, "- {key}: {}", one_line(value));
        self
    }

    pub fn opt_field(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.field(key, v);
        }
        self
    }

    pub fn item(&mut self, value: &str) -> &mut Self {
        let _ = writeln!(self.out, "- {}", one_line(value));
        self
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Collapse a value onto one line; the reader is line-oriented.
pub fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Title ignored

## Tech Stack
- Language: Python 3.11+
- Framework: FastAPI
prose is ignored

## Key Rules
- Use type hints: everywhere
- No print statements

## Strictness: High
Apply every rule.

## Phase Plan
### 0. Skeleton
- Deliverable: app/main.py
### 1. Users
";

    #[test]
    fn parses_sections_and_fields() {
        let doc = Document::parse(SAMPLE);
        let tech = doc.section("tech stack").unwrap();
        assert_eq!(tech.field("language"), Some("Python 3.11+"));
        assert_eq!(tech.field("Framework"), Some("FastAPI"));
        assert_eq!(tech.field("Database"), None);

        let rules: Vec<_> = doc.section("Key Rules").unwrap().items().collect();
        assert_eq!(rules, vec!["Use type hints: everywhere", "No print statements"]);
    }

    #[test]
    fn heading_with_value() {
        let doc = Document::parse(SAMPLE);
        let (_, level) = doc.section_with_value("Strictness").unwrap();
        assert_eq!(level, "High");
    }

    #[test]
    fn subsections_collect_their_own_lines() {
        let doc = Document::parse(SAMPLE);
        let plan = doc.section("Phase Plan").unwrap();
        assert_eq!(plan.subsections.len(), 2);
        assert_eq!(plan.subsections[0].heading, "0. Skeleton");
        assert_eq!(plan.subsections[0].field("Deliverable"), Some("app/main.py"));
        assert!(plan.subsections[1].lines.iter().all(|l| l.trim().is_empty()));
    }

    #[test]
    fn writer_spaces_sections_and_flattens_values() {
        let mut w = Writer::new();
        w.raw("# Project Context");
        w.heading("Tech Stack").field("Language", "Go\n1.22");
        w.heading("Key Rules").item("one");
        let out = w.finish();
        assert_eq!(
            out,
            "# Project Context\n\n## Tech Stack\n- Language: Go 1.22\n\n## Key Rules\n- one\n"
        );
    }
}

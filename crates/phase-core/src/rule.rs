use crate::error::{PhaseError, Result};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RuleId
// ---------------------------------------------------------------------------

/// Numeric precedence plus concern slug, parsed from `NNN-slug.md`.
///
/// Ordering is numeric first, so `1000-x` loads after `999-y` regardless of
/// how the filenames sort lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId {
    pub number: u32,
    pub slug: String,
}

static RULE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn rule_id_re() -> &'static Regex {
    RULE_ID_RE.get_or_init(|| Regex::new(r"^(\d{1,9})-([a-z0-9][a-z0-9\-]*)$").unwrap())
}

impl RuleId {
    pub fn parse(s: &str) -> Option<Self> {
        let caps = rule_id_re().captures(s)?;
        Some(Self {
            number: caps[1].parse().ok()?,
            slug: caps[2].to_string(),
        })
    }

    /// `100-style.md` / `100-style.mdc` → `100-style`.
    pub fn from_filename(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if !is_rule_extension(ext) {
            return None;
        }
        Self::parse(path.file_stem()?.to_str()?)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.slug)
    }
}

impl Serialize for RuleId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        RuleId::parse(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("rule id '{s}' must look like 100-style"))
        })
    }
}

fn is_rule_extension(ext: &str) -> bool {
    matches!(ext, "md" | "mdc")
}

// ---------------------------------------------------------------------------
// RuleSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "from", rename_all = "snake_case")]
pub enum RuleSource {
    /// Loaded from a registry stack bundle.
    Stack(String),
    /// Loaded from a project-relative directory.
    Project(PathBuf),
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Stack(name) => write!(f, "stack:{name}"),
            RuleSource::Project(dir) => write!(f, "project:{}", dir.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    always_apply: Option<bool>,
    #[serde(default, alias = "globs", skip_serializing_if = "Option::is_none")]
    glob_pattern: Option<String>,
    /// Set on copies written into `.phase/rules/`; names the layer the rule
    /// was resolved from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mirrored_from: Option<String>,
}

/// Split `---\n<yaml>\n---\n<body>` into header and body. The header may be
/// empty (`---\n---\n`).
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))?;
    let (header, after) = match rest.strip_prefix("---") {
        Some(after) => ("", after),
        None => {
            let end = rest.find("\n---")?;
            (&rest[..end], &rest[end + "\n---".len()..])
        }
    };
    let body = after
        .strip_prefix("\r\n")
        .or_else(|| after.strip_prefix('\n'))
        .unwrap_or(after);
    Some((header, body))
}

/// The `mirroredFrom` origin of a rule file, if it is a materialized copy.
pub fn mirror_origin(content: &str) -> Option<String> {
    let (raw, _) = split_front_matter(content)?;
    serde_yaml::from_str::<RuleHeader>(raw).ok()?.mirrored_from
}

// ---------------------------------------------------------------------------
// RuleDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub id: RuleId,
    pub always_apply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub body: String,
    pub source: RuleSource,
}

impl RuleDocument {
    pub fn new(id: RuleId, body: impl Into<String>, source: RuleSource) -> Self {
        Self {
            id,
            always_apply: true,
            glob: None,
            description: None,
            body: body.into(),
            source,
        }
    }

    pub fn with_glob(mut self, glob: impl Into<String>) -> Self {
        self.always_apply = false;
        self.glob = Some(glob.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse a rule file. When `alwaysApply` is not given (no header, an empty
    /// header, or a header without the key) the rule is always applied unless
    /// it has a glob. A header `id` must agree with the filename.
    pub fn parse(path: &Path, content: &str, source: RuleSource) -> Result<Self> {
        let invalid = |reason: String| PhaseError::InvalidRule {
            path: path.to_path_buf(),
            reason,
        };
        let id = RuleId::from_filename(path).ok_or_else(|| {
            invalid("filename must look like NNN-slug.md (numeric precedence prefix)".to_string())
        })?;

        let (header, body) = match split_front_matter(content) {
            Some((raw, body)) => {
                let header: RuleHeader = if raw.trim().is_empty() {
                    RuleHeader::default()
                } else {
                    serde_yaml::from_str(raw)
                        .map_err(|e| invalid(format!("bad header: {e}")))?
                };
                (header, body)
            }
            None => (RuleHeader::default(), content),
        };

        if let Some(declared) = &header.id {
            if *declared != id.to_string() {
                return Err(invalid(format!(
                    "header id '{declared}' does not match filename id '{id}'"
                )));
            }
        }

        let glob = header.glob_pattern.filter(|g| !g.trim().is_empty());
        let doc = Self {
            id,
            always_apply: header.always_apply.unwrap_or(glob.is_none()),
            glob,
            description: header.description,
            body: body.to_string(),
            source,
        };
        // Reject unusable globs at load time rather than during resolution.
        doc.matcher()
            .map_err(|e| invalid(format!("bad glob pattern: {e}")))?;
        Ok(doc)
    }

    /// Render the on-disk form: YAML header then body.
    pub fn render(&self) -> Result<String> {
        self.render_with(None)
    }

    /// Render a materialized copy, tagged with the layer it came from.
    pub fn render_mirror(&self) -> Result<String> {
        self.render_with(Some(self.source.to_string()))
    }

    fn render_with(&self, mirrored_from: Option<String>) -> Result<String> {
        let header = RuleHeader {
            id: Some(self.id.to_string()),
            description: self.description.clone(),
            always_apply: Some(self.always_apply),
            glob_pattern: self.glob.clone(),
            mirrored_from,
        };
        let yaml = serde_yaml::to_string(&header)?;
        let mut out = String::with_capacity(yaml.len() + self.body.len() + 16);
        out.push_str("---\n");
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("---\n");
        out.push_str(&self.body);
        Ok(out)
    }

    pub fn filename(&self) -> String {
        format!("{}.md", self.id)
    }

    pub fn matcher(&self) -> std::result::Result<Option<GlobMatcher>, globset::Error> {
        self.glob
            .as_deref()
            .map(|g| GlobBuilder::new(g).build().map(|g| g.compile_matcher()))
            .transpose()
    }

    /// Same concern, same header, same body: a copy rather than a competitor.
    pub fn same_content(&self, other: &RuleDocument) -> bool {
        self.id == other.id
            && self.always_apply == other.always_apply
            && self.glob == other.glob
            && self.body.trim_end() == other.body.trim_end()
    }
}

/// Sort ascending by id; ties keep load order.
pub fn sort_rules(rules: &mut [RuleDocument]) {
    rules.sort_by(|a, b| a.id.cmp(&b.id));
}

fn rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_rule_file = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(is_rule_extension);
        if is_rule_file {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every `NNN-slug.md`/`.mdc` in `dir`, ascending by id. Other files and
/// materialized copies (`mirroredFrom` set) are ignored; a malformed rule file
/// or a duplicate id is an error.
pub fn load_dir(dir: &Path, source: RuleSource) -> Result<Vec<RuleDocument>> {
    let mut rules: Vec<RuleDocument> = Vec::new();
    for path in rule_files(dir)? {
        let content = std::fs::read_to_string(&path)?;
        if mirror_origin(&content).is_some() {
            continue;
        }
        let rule = RuleDocument::parse(&path, &content, source.clone())?;
        if let Some(existing) = rules.iter().find(|r| r.id == rule.id) {
            return Err(PhaseError::InvalidRule {
                path,
                reason: format!(
                    "duplicate rule id '{}' in the same directory (already defined by {})",
                    rule.id,
                    existing.filename()
                ),
            });
        }
        rules.push(rule);
    }
    sort_rules(&mut rules);
    Ok(rules)
}

/// Rule files in `dir` that are materialized copies.
pub fn mirrored_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut mirrors = Vec::new();
    for path in rule_files(dir)? {
        if mirror_origin(&std::fs::read_to_string(&path)?).is_some() {
            mirrors.push(path);
        }
    }
    Ok(mirrors)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

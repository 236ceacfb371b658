//! Source sampling: which files to read and what to pull out of them.

use crate::types::{Indentation, NamingConvention};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENTRYPOINT_DIRS: &[&str] = &["src", "app", "cmd", "lib", "internal", "pkg"];
const TEST_DIRS: &[&str] = &["tests", "test", "spec", "__tests__"];
const ENTRYPOINT_NAMES: &[&str] = &["main", "index", "app", "server", "application"];

/// Source extension → language.
pub fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    Some(match ext {
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "java" => "java",
        "kt" => "kotlin",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "tf" => "terraform",
        _ => return None,
    })
}

/// Count of source files per language across the whole project listing.
pub fn language_census(files: &[PathBuf]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for f in files {
        if let Some(lang) = language_for(f) {
            *counts.entry(lang).or_insert(0) += 1;
        }
    }
    counts
}

/// Up to `max` source files, entrypoints first, then entrypoint directories,
/// then test directories, then anything else. Shallow paths win ties.
pub fn choose(files: &[PathBuf], max: usize) -> Vec<PathBuf> {
    let mut ranked: Vec<(u8, usize, &PathBuf)> = files
        .iter()
        .filter(|f| language_for(f).is_some())
        .map(|f| (priority(f), f.components().count(), f))
        .collect();
    ranked.sort();
    ranked.into_iter().take(max).map(|(_, _, f)| f.clone()).collect()
}

fn priority(path: &Path) -> u8 {
    let first_dir = path
        .components()
        .next()
        .filter(|_| path.components().count() > 1)
        .and_then(|c| c.as_os_str().to_str());
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let in_entry_dir = first_dir.is_some_and(|d| ENTRYPOINT_DIRS.contains(&d));
    let in_test_dir = first_dir.is_some_and(|d| TEST_DIRS.contains(&d));

    if ENTRYPOINT_NAMES.contains(&stem) && (first_dir.is_none() || in_entry_dir) {
        0
    } else if in_entry_dir {
        1
    } else if in_test_dir {
        2
    } else {
        3
    }
}

// ---------------------------------------------------------------------------
// Per-file analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSample {
    pub path: PathBuf,
    pub language: Option<&'static str>,
    pub imports: Vec<String>,
    pub identifiers: Vec<String>,
    pub tab_lines: usize,
    /// Leading-space widths of space-indented lines.
    pub space_widths: Vec<usize>,
}

pub fn analyze(path: &Path, content: &str) -> SourceSample {
    let language = language_for(path);
    let mut sample = SourceSample {
        path: path.to_path_buf(),
        language,
        ..SourceSample::default()
    };

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('\t') {
            sample.tab_lines += 1;
        } else {
            let width = line.len() - line.trim_start_matches(' ').len();
            if width > 0 {
                sample.space_widths.push(width);
            }
        }
    }

    let Some(lang) = language else {
        return sample;
    };
    sample.imports = match lang {
        "go" => go_imports(content),
        _ => import_re(lang)
            .map(|re| first_captures(re, content))
            .unwrap_or_default(),
    };
    sample.identifiers = declaration_re(lang)
        .map(|re| first_captures(re, content))
        .unwrap_or_default();
    sample
}

/// Every capture group that participated in a match, first group first.
fn first_captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.iter().skip(1).flatten().next().map(|m| m.as_str().to_string()))
        .collect()
}

fn go_imports(content: &str) -> Vec<String> {
    let mut imports = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("import (") {
            in_block = true;
            continue;
        }
        if in_block && line.starts_with(')') {
            in_block = false;
            continue;
        }
        let spec = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("import ") {
            rest
        } else {
            continue;
        };
        if let Some((_, rest)) = spec.split_once('"') {
            if let Some((path, _)) = rest.split_once('"') {
                imports.push(path.to_string());
            }
        }
    }
    imports
}

lazy_re!(py_import_re, r"(?m)^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import|import\s+([A-Za-z_][\w.]*))");
lazy_re!(js_import_re, r#"(?m)(?:from\s+['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)|^\s*import\s+['"]([^'"]+)['"])"#);
lazy_re!(java_import_re, r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)");
lazy_re!(rust_use_re, r"(?m)^\s*(?:pub\s+)?use\s+(\w+)");
lazy_re!(ruby_require_re, r#"(?m)^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#);
lazy_re!(tf_provider_re, r#"(?m)^\s*provider\s+"([^"]+)""#);

lazy_re!(py_decl_re, r"(?m)^\s*(?:async\s+)?def\s+(\w+)|^(\w+)\s*(?::[^=]+)?=[^=]");
lazy_re!(js_decl_re, r"(?m)(?:function\s*\*?\s+(\w+)|(?:const|let|var)\s+(\w+)\s*[=:])");
lazy_re!(java_decl_re, r"(?m)^\s*(?:(?:public|private|protected|static|final|abstract|synchronized)\s+)+[\w<>\[\],\s]+?\s+(\w+)\s*\(");
lazy_re!(go_decl_re, r"(?m)^func\s+(?:\([^)]*\)\s*)?(\w+)|(\w+)\s*:=");
lazy_re!(rust_decl_re, r"(?m)\bfn\s+(\w+)|\blet\s+(?:mut\s+)?(\w+)");
lazy_re!(ruby_decl_re, r"(?m)^\s*def\s+(?:self\.)?(\w+)");
lazy_re!(tf_decl_re, r#"(?m)^\s*(?:resource|module|variable|output)\s+(?:"[^"]+"\s+)?"([^"]+)""#);

fn import_re(lang: &str) -> Option<&'static Regex> {
    Some(match lang {
        "python" => py_import_re(),
        "javascript" | "typescript" => js_import_re(),
        "java" | "kotlin" => java_import_re(),
        "rust" => rust_use_re(),
        "ruby" => ruby_require_re(),
        "terraform" => tf_provider_re(),
        _ => return None,
    })
}

fn declaration_re(lang: &str) -> Option<&'static Regex> {
    Some(match lang {
        "python" => py_decl_re(),
        "javascript" | "typescript" => js_decl_re(),
        "java" | "kotlin" => java_decl_re(),
        "go" => go_decl_re(),
        "rust" => rust_decl_re(),
        "ruby" => ruby_decl_re(),
        "terraform" => tf_decl_re(),
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Majority identifier casing across samples; ties go to the convention
/// listed first (snake, camel, pascal, kebab). Falls back to file stems when
/// no declaration carries a signal.
pub fn dominant_naming(samples: &[SourceSample]) -> Option<NamingConvention> {
    let declared = samples
        .iter()
        .flat_map(|s| s.identifiers.iter().map(String::as_str));
    vote(declared).or_else(|| {
        vote(samples.iter().filter_map(|s| {
            let name = s.path.file_name()?.to_str()?;
            name.split('.').next()
        }))
    })
}

fn vote<'a>(idents: impl Iterator<Item = &'a str>) -> Option<NamingConvention> {
    let mut counts: BTreeMap<NamingConvention, usize> = BTreeMap::new();
    for ident in idents {
        if let Some(conv) = NamingConvention::classify(ident) {
            *counts.entry(conv).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then(cb.cmp(ca)))
        .map(|(conv, _)| conv)
}

pub fn dominant_indentation(samples: &[SourceSample]) -> Option<Indentation> {
    let tabs: usize = samples.iter().map(|s| s.tab_lines).sum();
    let widths: Vec<usize> = samples.iter().flat_map(|s| s.space_widths.iter().copied()).collect();
    if tabs == 0 && widths.is_empty() {
        return None;
    }
    if tabs >= widths.len() {
        return Some(Indentation::Tabs);
    }
    // Widest unit that nearly every indented line is a multiple of.
    let fits = |unit: usize| {
        let divisible = widths.iter().filter(|w| *w % unit == 0).count();
        divisible * 10 >= widths.len() * 9
    };
    let unit = [8, 4, 2]
        .into_iter()
        .find(|u| fits(*u))
        .or_else(|| widths.iter().copied().min())
        .unwrap_or(4);
    Some(Indentation::Spaces(unit.min(u8::MAX as usize) as u8))
}

/// Directory-shape heuristics over the project listing.
pub fn architecture(files: &[PathBuf]) -> String {
    let has_dir = |name: &str| {
        files.iter().any(|f| {
            f.parent()
                .is_some_and(|p| p.components().any(|c| c.as_os_str() == name))
        })
    };
    if has_dir("modules") {
        "modular (feature modules)"
    } else if has_dir("controllers") && (has_dir("services") || has_dir("models")) {
        "layered (controller/service/model)"
    } else if has_dir("cmd") && has_dir("internal") {
        "go standard layout (cmd/internal)"
    } else if files.iter().any(|f| f.starts_with("src/main/java")) {
        "maven standard layout"
    } else if (has_dir("routes") || has_dir("api")) && has_dir("services") {
        "layered (api/service)"
    } else {
        "flat"
    }
    .to_string()
}

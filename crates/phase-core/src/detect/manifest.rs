//! Manifest files and the dependencies they declare.

use crate::error::Result;
use crate::io;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Manifest file name → ecosystem language. `*.tf` is handled by extension.
const MANIFESTS: &[(&str, &str)] = &[
    ("package.json", "javascript"),
    ("requirements.txt", "python"),
    ("pyproject.toml", "python"),
    ("Pipfile", "python"),
    ("setup.py", "python"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("build.gradle.kts", "kotlin"),
    ("go.mod", "go"),
    ("Cargo.toml", "rust"),
    ("Gemfile", "ruby"),
    ("composer.json", "php"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestEvidence {
    /// Manifest file names, first occurrence only, shallowest first.
    pub found: Vec<String>,
    /// Language of the shallowest manifest.
    pub ecosystem: Option<String>,
    pub dependencies: BTreeSet<String>,
}

pub fn ecosystem_for(file_name: &str) -> Option<&'static str> {
    if file_name.ends_with(".tf") {
        return Some("terraform");
    }
    MANIFESTS
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, lang)| *lang)
}

/// Scan the project file list for manifests (at most two directories deep)
/// and extract declared dependencies from each.
pub fn scan(root: &Path, files: &[PathBuf], max_bytes: usize) -> Result<ManifestEvidence> {
    let mut candidates: Vec<&PathBuf> = files
        .iter()
        .filter(|p| p.components().count() <= 3)
        .filter(|p| file_name(p).and_then(ecosystem_for).is_some())
        .collect();
    candidates.sort_by_key(|p| (p.components().count(), (*p).clone()));

    let mut evidence = ManifestEvidence::default();
    for rel in candidates {
        let Some(name) = file_name(rel) else { continue };
        if evidence.ecosystem.is_none() {
            evidence.ecosystem = ecosystem_for(name).map(str::to_string);
        }
        let display = if name.ends_with(".tf") { "*.tf" } else { name };
        if !evidence.found.iter().any(|f| f == display) {
            evidence.found.push(display.to_string());
        }
        let content = io::read_prefix(&root.join(rel), max_bytes)?;
        evidence.dependencies.extend(dependencies(name, &content));
    }
    Ok(evidence)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}

// ---------------------------------------------------------------------------
// Dependency extraction
// ---------------------------------------------------------------------------

/// Best-effort dependency names declared by one manifest. Names are
/// lowercased for the ecosystems that are case-insensitive.
pub fn dependencies(file_name: &str, content: &str) -> Vec<String> {
    match file_name {
        "package.json" => json_keys(content, &["dependencies", "devDependencies", "peerDependencies"]),
        "composer.json" => json_keys(content, &["require", "require-dev"]),
        "requirements.txt" => content
            .lines()
            .filter_map(|l| python_requirement(l.trim()))
            .collect(),
        "pyproject.toml" | "Pipfile" | "Cargo.toml" => toml_manifest(file_name, content),
        "setup.py" => setup_py_requirements(content),
        "pom.xml" => captures(xml_artifact_re(), content),
        "build.gradle" | "build.gradle.kts" => captures(gradle_dep_re(), content),
        "go.mod" => go_requires(content),
        "Gemfile" => captures(gem_re(), content),
        name if name.ends_with(".tf") => captures(tf_provider_re(), content),
        _ => Vec::new(),
    }
}

fn json_keys(content: &str, tables: &[&str]) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return Vec::new();
    };
    tables
        .iter()
        .filter_map(|t| value.get(*t).and_then(|v| v.as_object()))
        .flat_map(|obj| obj.keys().cloned())
        .collect()
}

/// `fastapi[all]>=0.110 ; python_version > "3.8"` → `fastapi`.
fn python_requirement(spec: &str) -> Option<String> {
    if spec.is_empty() || spec.starts_with('#') || spec.starts_with('-') {
        return None;
    }
    let end = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(spec.len());
    let name = &spec[..end];
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Only the strings inside `install_requires=[...]`; other literals in
/// `setup()` are metadata.
fn setup_py_requirements(content: &str) -> Vec<String> {
    install_requires_re()
        .captures_iter(content)
        .flat_map(|list| {
            quoted_re()
                .captures_iter(&list[1])
                .filter_map(|c| python_requirement(&c[1]))
                .collect::<Vec<_>>()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TOML manifests
// ---------------------------------------------------------------------------

fn toml_manifest(file_name: &str, content: &str) -> Vec<String> {
    let doc = match toml::from_str::<toml::Value>(content) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!(manifest = file_name, error = %e, "unparseable manifest");
            return Vec::new();
        }
    };
    match file_name {
        "pyproject.toml" => pyproject_dependencies(&doc),
        "Pipfile" => {
            let mut keys = table_keys(&doc, &["packages"]);
            keys.extend(table_keys(&doc, &["dev-packages"]));
            python_names(keys)
        }
        _ => cargo_dependencies(&doc),
    }
}

fn lookup<'a>(doc: &'a toml::Value, path: &[&str]) -> Option<&'a toml::Value> {
    path.iter().try_fold(doc, |value, key| value.get(*key))
}

fn table_keys(doc: &toml::Value, path: &[&str]) -> Vec<String> {
    lookup(doc, path)
        .and_then(toml::Value::as_table)
        .map(|t| t.keys().cloned().collect())
        .unwrap_or_default()
}

/// PEP 508 strings in a TOML array.
fn requirement_list(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(toml::Value::as_str)
        .filter_map(python_requirement)
        .collect()
}

fn python_names(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .filter(|k| k != "python")
        .map(|k| k.to_ascii_lowercase())
        .collect()
}

fn pyproject_dependencies(doc: &toml::Value) -> Vec<String> {
    let mut deps = requirement_list(lookup(doc, &["project", "dependencies"]));
    if let Some(extras) = lookup(doc, &["project", "optional-dependencies"]).and_then(toml::Value::as_table) {
        for list in extras.values() {
            deps.extend(requirement_list(Some(list)));
        }
    }

    let mut poetry = table_keys(doc, &["tool", "poetry", "dependencies"]);
    poetry.extend(table_keys(doc, &["tool", "poetry", "dev-dependencies"]));
    if let Some(groups) = lookup(doc, &["tool", "poetry", "group"]).and_then(toml::Value::as_table) {
        for group in groups.values() {
            poetry.extend(table_keys(group, &["dependencies"]));
        }
    }
    deps.extend(python_names(poetry));
    deps
}

fn cargo_dependencies(doc: &toml::Value) -> Vec<String> {
    let mut deps = Vec::new();
    for table in ["dependencies", "dev-dependencies", "build-dependencies"] {
        deps.extend(table_keys(doc, &[table]));
    }
    deps.extend(table_keys(doc, &["workspace", "dependencies"]));
    if let Some(targets) = doc.get("target").and_then(toml::Value::as_table) {
        for target in targets.values() {
            deps.extend(table_keys(target, &["dependencies"]));
        }
    }
    deps
}

fn go_requires(content: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("require (") {
            in_block = true;
            continue;
        }
        if in_block && line.starts_with(')') {
            in_block = false;
            continue;
        }
        let spec = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            rest
        } else {
            continue;
        };
        if let Some(module) = spec.split_whitespace().next().filter(|m| !m.starts_with("//")) {
            deps.push(module.to_string());
        }
    }
    deps
}

fn captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content).map(|c| c[1].to_string()).collect()
}

lazy_re!(quoted_re, r#"["']([A-Za-z0-9][A-Za-z0-9_.\-]*(?:\[[^\]]*\])?\s*(?:[<>=!~;].*?)?)["']"#);
lazy_re!(install_requires_re, r"(?s)install_requires\s*=\s*\[(.*?)\]");
lazy_re!(xml_artifact_re, r"<artifactId>\s*([^<\s]+)\s*</artifactId>");
lazy_re!(gradle_dep_re, r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation)\s*\(?\s*["'][^:"']+:([^:"']+)"#);
lazy_re!(gem_re, r#"(?m)^\s*gem\s+["']([^"']+)["']"#);
lazy_re!(tf_provider_re, r#"(?m)^\s*provider\s+"([^"]+)""#);

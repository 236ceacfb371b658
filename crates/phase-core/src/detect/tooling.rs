use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;

/// Test-runner configuration file names.
pub const TEST_CONFIGS: &[&str] = &[
    "jest.config.*",
    "vitest.config.*",
    "karma.conf.*",
    ".mocharc*",
    "playwright.config.*",
    "cypress.config.*",
    "pytest.ini",
    "conftest.py",
    "tox.ini",
    "noxfile.py",
    "phpunit.xml*",
    ".rspec",
];

/// Lint / format configuration file names.
pub const LINT_CONFIGS: &[&str] = &[
    ".eslintrc*",
    "eslint.config.*",
    ".prettierrc*",
    "prettier.config.*",
    "biome.json",
    "ruff.toml",
    ".ruff.toml",
    ".flake8",
    "mypy.ini",
    ".pylintrc",
    ".golangci.yml",
    ".golangci.yaml",
    "checkstyle.xml",
    "rustfmt.toml",
    "clippy.toml",
    ".tflint.hcl",
    ".rubocop.yml",
];

/// Build a matcher over file names from a list of name globs.
pub fn name_set(patterns: &[impl AsRef<str>]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p.as_ref())?);
    }
    builder.build()
}

/// Known tooling config names present in the project, sorted and unique.
pub fn scan(files: &[PathBuf]) -> Result<Vec<String>, globset::Error> {
    let known = name_set(&[TEST_CONFIGS, LINT_CONFIGS].concat())?;
    let mut found: Vec<String> = files
        .iter()
        .filter(|p| p.components().count() <= 3)
        .filter_map(|p| p.file_name()?.to_str())
        .filter(|name| known.is_match(name))
        .map(str::to_string)
        .collect();
    found.sort();
    found.dedup();
    Ok(found)
}

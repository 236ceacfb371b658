//! Stacks shipped with the binary and installed by `phase registry seed`.

use crate::error::{PhaseError, Result};
use crate::registry::Registry;
use crate::rule::{RuleDocument, RuleId, RuleSource};
use crate::stack::{StackContext, StackDefinition, StackSignals};
use crate::types::NamingConvention;
use serde::Serialize;

struct RuleSpec {
    number: u32,
    slug: &'static str,
    glob: Option<&'static str>,
    description: &'static str,
    body: &'static str,
}

const fn rule(number: u32, slug: &'static str, description: &'static str, body: &'static str) -> RuleSpec {
    RuleSpec {
        number,
        slug,
        glob: None,
        description,
        body,
    }
}

const fn glob_rule(
    number: u32,
    slug: &'static str,
    glob: &'static str,
    description: &'static str,
    body: &'static str,
) -> RuleSpec {
    RuleSpec {
        number,
        slug,
        glob: Some(glob),
        description,
        body,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn build(
    name: &str,
    description: &str,
    context: StackContext,
    signals: StackSignals,
    rules: &[RuleSpec],
) -> StackDefinition {
    let source = RuleSource::Stack(name.to_string());
    let mut def = StackDefinition::new(name, context);
    def.description = Some(description.to_string());
    def.signals = signals;
    def.rules = rules
        .iter()
        .map(|r| {
            let id = RuleId {
                number: r.number,
                slug: r.slug.to_string(),
            };
            let doc = RuleDocument::new(id, r.body, source.clone()).with_description(r.description);
            match r.glob {
                Some(g) => doc.with_glob(g),
                None => doc,
            }
        })
        .collect();
    def
}

const SKELETON_MARKER: &str = "Phase 0 - Skeleton";

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

fn python_fastapi() -> StackDefinition {
    build(
        "python-fastapi",
        "FastAPI service with SQLAlchemy, Pydantic and pytest",
        StackContext {
            language: "Python 3.11+".to_string(),
            framework: Some("FastAPI".to_string()),
            database: Some("PostgreSQL via SQLAlchemy 2.0".to_string()),
            testing: Some("pytest with httpx TestClient".to_string()),
            style: Some("PEP 8, type hints on every signature".to_string()),
            naming: Some(NamingConvention::Snake),
            architecture: Some("Modular monolith: app/api, app/core, app/modules/<feature>".to_string()),
            key_rules: strings(&[
                "Validate every request and response with Pydantic models",
                "Keep routers thin; business logic lives in app/modules/<feature>/services",
                "Configuration comes from environment variables via app/core/config.py",
                "Every endpoint ships with a pytest test",
            ]),
            phase_marker: Some(SKELETON_MARKER.to_string()),
        },
        StackSignals {
            languages: strings(&["python"]),
            manifests: strings(&["requirements.txt", "pyproject.toml", "Pipfile", "setup.py"]),
            frameworks: strings(&["fastapi"]),
            tooling: strings(&["pytest.ini", "conftest.py", "tox.ini", "ruff.toml", ".flake8", "mypy.ini"]),
        },
        &[
            rule(100, "style", "Python style", "# Style\n\n- Follow PEP 8; format with ruff or black.\n- Annotate every function signature.\n- Use f-strings; never build SQL with string formatting.\n"),
            rule(200, "testing", "Testing", "# Testing\n\n- pytest only; shared fixtures live in tests/conftest.py.\n- Use FastAPI's TestClient against an isolated database.\n- A phase is not done until its tests pass.\n"),
            rule(300, "architecture", "Architecture", "# Architecture\n\n- app/main.py wires routers and middleware only.\n- app/core holds config, database and security helpers.\n- Each feature module owns its models, schemas and services.\n"),
            glob_rule(400, "api", "app/api/**/*.py", "API layer", "# API layer\n\n- Routers declare response_model on every route.\n- Raise HTTPException with explicit status codes.\n- Inject sessions and the current user with Depends.\n"),
        ],
    )
}

fn node_express() -> StackDefinition {
    build(
        "node-express",
        "Express API in TypeScript with Jest and Supertest",
        StackContext {
            language: "TypeScript (Node.js 20)".to_string(),
            framework: Some("Express".to_string()),
            database: Some("PostgreSQL via Prisma".to_string()),
            testing: Some("Jest with Supertest".to_string()),
            style: Some("ESLint + Prettier, 2-space indentation".to_string()),
            naming: Some(NamingConvention::Camel),
            architecture: Some("Layered: routes, controllers, services".to_string()),
            key_rules: strings(&[
                "async/await everywhere; no callback APIs",
                "Validate request bodies at the route boundary",
                "Centralize error handling in one middleware",
            ]),
            phase_marker: Some(SKELETON_MARKER.to_string()),
        },
        StackSignals {
            languages: strings(&["javascript", "typescript"]),
            manifests: strings(&["package.json"]),
            frameworks: strings(&["express"]),
            tooling: strings(&["jest.config.*", "vitest.config.*", ".eslintrc*", "eslint.config.*", ".prettierrc*"]),
        },
        &[
            rule(100, "style", "TypeScript style", "# Style\n\n- strict mode on; no implicit any.\n- camelCase for functions and variables, PascalCase for types.\n- Prefer named exports.\n"),
            rule(200, "testing", "Testing", "# Testing\n\n- Jest for units, Supertest for HTTP routes.\n- Tests live next to the code as *.test.ts or under tests/.\n"),
            rule(300, "architecture", "Architecture", "# Architecture\n\n- Routes map URLs to controllers.\n- Controllers translate HTTP to service calls.\n- Services hold business logic and never touch req/res.\n"),
            glob_rule(400, "routes", "src/routes/**/*.ts", "Routes", "# Routes\n\n- One router per resource.\n- Wrap async handlers so rejections reach the error middleware.\n"),
        ],
    )
}

fn java_spring() -> StackDefinition {
    build(
        "java-spring",
        "Spring Boot service with JPA and JUnit 5",
        StackContext {
            language: "Java 21".to_string(),
            framework: Some("Spring Boot 3".to_string()),
            database: Some("PostgreSQL via Spring Data JPA".to_string()),
            testing: Some("JUnit 5 with Mockito and MockMvc".to_string()),
            style: Some("Google Java Style".to_string()),
            naming: Some(NamingConvention::Camel),
            architecture: Some("Layered: controller, service, repository".to_string()),
            key_rules: strings(&[
                "Constructor injection only",
                "DTOs at the controller boundary; entities never leave the service layer",
                "Transactions are declared on service methods",
            ]),
            phase_marker: Some(SKELETON_MARKER.to_string()),
        },
        StackSignals {
            languages: strings(&["java", "kotlin"]),
            manifests: strings(&["pom.xml", "build.gradle", "build.gradle.kts"]),
            frameworks: strings(&["spring-boot", "org.springframework"]),
            tooling: strings(&["checkstyle.xml"]),
        },
        &[
            rule(100, "style", "Java style", "# Style\n\n- Google Java Style, 2-space indentation.\n- No wildcard imports.\n- Use records for immutable DTOs.\n"),
            rule(200, "testing", "Testing", "# Testing\n\n- JUnit 5 for units, @WebMvcTest for controllers.\n- Integration tests use Testcontainers.\n"),
            rule(300, "architecture", "Architecture", "# Architecture\n\n- Controllers call services; services call repositories.\n- No repository access from controllers.\n"),
            glob_rule(400, "controllers", "**/controller/**/*.java", "Controllers", "# Controllers\n\n- Return ResponseEntity with explicit status codes.\n- Validate input with @Valid.\n"),
        ],
    )
}

fn go_gin() -> StackDefinition {
    build(
        "go-gin",
        "Gin HTTP service in Go with the standard project layout",
        StackContext {
            language: "Go 1.22".to_string(),
            framework: Some("Gin".to_string()),
            database: Some("PostgreSQL via pgx".to_string()),
            testing: Some("go test with testify".to_string()),
            style: Some("gofmt and golangci-lint".to_string()),
            naming: Some(NamingConvention::Camel),
            architecture: Some("Standard layout: cmd/, internal/, pkg/".to_string()),
            key_rules: strings(&[
                "Return errors; never panic in request paths",
                "Wrap errors with context using fmt.Errorf and %w",
                "Pass context.Context as the first argument",
            ]),
            phase_marker: Some(SKELETON_MARKER.to_string()),
        },
        StackSignals {
            languages: strings(&["go"]),
            manifests: strings(&["go.mod"]),
            frameworks: strings(&["github.com/gin-gonic/gin"]),
            tooling: strings(&[".golangci.yml", ".golangci.yaml"]),
        },
        &[
            rule(100, "style", "Go style", "# Style\n\n- gofmt is not optional.\n- Exported identifiers carry doc comments.\n- Keep interfaces small and defined by the consumer.\n"),
            rule(200, "testing", "Testing", "# Testing\n\n- Table-driven tests.\n- httptest for handlers.\n"),
            rule(300, "architecture", "Architecture", "# Architecture\n\n- cmd/<app>/main.go wires dependencies.\n- internal/<domain> holds handlers, services and repositories.\n"),
            glob_rule(400, "tests", "**/*_test.go", "Go tests", "# Test files\n\n- Use t.Run subtests per table case.\n- Mark helpers with t.Helper().\n"),
        ],
    )
}

fn terraform() -> StackDefinition {
    build(
        "terraform",
        "Terraform infrastructure with reusable modules",
        StackContext {
            language: "HCL (Terraform 1.6+)".to_string(),
            framework: Some("Terraform".to_string()),
            database: None,
            testing: Some("terraform validate, tflint and terraform test".to_string()),
            style: Some("terraform fmt".to_string()),
            naming: Some(NamingConvention::Snake),
            architecture: Some("Root modules per environment, shared modules under modules/".to_string()),
            key_rules: strings(&[
                "Pin provider and module versions",
                "Remote state with locking",
                "Every variable has a type and a description",
            ]),
            phase_marker: Some(SKELETON_MARKER.to_string()),
        },
        StackSignals {
            languages: strings(&["terraform"]),
            manifests: strings(&["*.tf"]),
            frameworks: Vec::new(),
            tooling: strings(&[".tflint.hcl"]),
        },
        &[
            rule(100, "style", "HCL style", "# Style\n\n- Run terraform fmt before every commit.\n- snake_case for resources, variables and outputs.\n"),
            rule(200, "testing", "Testing", "# Testing\n\n- terraform validate and tflint must pass.\n- Plan against a scratch workspace before apply.\n"),
            rule(300, "architecture", "Architecture", "# Architecture\n\n- One root module per environment.\n- Shared building blocks live in modules/ with their own variables.tf and outputs.tf.\n"),
            glob_rule(400, "modules", "modules/**/*.tf", "Modules", "# Modules\n\n- No provider blocks inside shared modules.\n- Outputs describe what they expose.\n"),
        ],
    )
}

/// Every built-in stack, in name order.
pub fn stacks() -> Vec<StackDefinition> {
    vec![go_gin(), java_spring(), node_express(), python_fastapi(), terraform()]
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Install the built-in stacks. Existing entries are kept unless `force`.
pub fn seed(registry: &Registry, force: bool) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    for def in stacks() {
        match registry.put(&def, force) {
            Ok(()) => report.installed.push(def.name),
            Err(PhaseError::StackExists(name)) => report.skipped.push(name),
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

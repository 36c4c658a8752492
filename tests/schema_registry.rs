// tests/schema_registry.rs

use std::fs;

use orchestrator::dag::JobSpec;
use orchestrator::errors::OrchestratorError;
use orchestrator::schema::SchemaRegistry;

const BUILD_SCHEMAS: &str = r#"
[schema.build]
description = "Compile a target"

[schema.build.fields.target]
type = "string"
required = true
allowed = ["debug", "release"]

[schema.build.fields.jobs]
type = "integer"
default = 4

[schema.build.fields.features]
type = "array"
items = "string"

[schema.build.fields.env]
type = "table"
schema = "env"

[schema.env]
allow_unknown = true

[schema.env.fields.path]
type = "string"
"#;

fn registry() -> SchemaRegistry {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("build.toml"), BUILD_SCHEMAS).unwrap();
    SchemaRegistry::load_dir(dir.path()).unwrap()
}

fn table(src: &str) -> toml::Table {
    toml::from_str(src).unwrap()
}

fn reason(err: OrchestratorError) -> String {
    match err {
        OrchestratorError::SchemaValidation { reason, .. } => reason,
        other => panic!("expected SchemaValidation, got {other:?}"),
    }
}

#[test]
fn loads_every_schema_in_the_directory() {
    let reg = registry();
    assert_eq!(reg.names().collect::<Vec<_>>(), vec!["build", "env"]);
    assert_eq!(
        reg.get("build").and_then(|s| s.description.as_deref()),
        Some("Compile a target")
    );
}

#[test]
fn valid_payload_gets_defaults() {
    let reg = registry();
    let payload = reg
        .validate("build", &table(r#"target = "release""#))
        .unwrap();

    assert_eq!(payload.schema.as_deref(), Some("build"));
    assert_eq!(payload.values.get("jobs"), Some(&toml::Value::Integer(4)));
    assert!(!payload.values.contains_key("features"));
}

#[test]
fn type_mismatch_missing_field_and_allowed_values_are_rejected() {
    let reg = registry();

    let msg = reason(reg.validate("build", &table("target = 3")).unwrap_err());
    assert!(msg.contains("expected string, got integer"), "{msg}");

    let msg = reason(reg.validate("build", &table("jobs = 2")).unwrap_err());
    assert!(msg.contains("missing required field 'target'"), "{msg}");

    let msg = reason(reg.validate("build", &table(r#"target = "fast""#)).unwrap_err());
    assert!(msg.contains("allowed"), "{msg}");

    let msg = reason(
        reg.validate("build", &table(r#"target = "debug"
colour = "blue""#))
            .unwrap_err(),
    );
    assert!(msg.contains("unknown field 'colour'"), "{msg}");
}

#[test]
fn array_items_and_nested_tables_are_checked() {
    let reg = registry();

    let msg = reason(
        reg.validate("build", &table(r#"target = "debug"
features = ["a", 1]"#))
            .unwrap_err(),
    );
    assert!(msg.contains("features[1]"), "{msg}");

    let msg = reason(
        reg.validate("build", &table(r#"target = "debug"
env = { path = 1 }"#))
            .unwrap_err(),
    );
    assert!(msg.contains("env.path"), "{msg}");

    // env allows unknown keys and passes them through
    let ok = reg
        .validate("build", &table(r#"target = "debug"
env = { path = "/bin", extra = true }"#))
        .unwrap();
    let env = ok.values["env"].as_table().unwrap();
    assert_eq!(env.get("extra"), Some(&toml::Value::Boolean(true)));
}

#[test]
fn jobs_without_a_schema_pass_through() {
    let reg = registry();
    let job = JobSpec::new("free").param("anything", 1i64);
    let payload = reg.validate_job(&job).unwrap();
    assert!(payload.schema.is_none());
    assert_eq!(payload.values.get("anything"), Some(&toml::Value::Integer(1)));
}

#[test]
fn job_validation_errors_name_the_job() {
    let reg = registry();
    let job = JobSpec::new("compile").schema("build");
    let msg = reason(reg.validate_job(&job).unwrap_err());
    assert!(msg.starts_with("job 'compile'"), "{msg}");
}

#[test]
fn unknown_schema_references_fail_fast() {
    let reg = registry();
    let jobs = vec![JobSpec::new("a").schema("build"), JobSpec::new("b").schema("deploy")];
    let err = reg.check_references(&jobs).unwrap_err();
    match err {
        OrchestratorError::SchemaLoad(msg) => assert!(msg.contains("deploy"), "{msg}"),
        other => panic!("expected SchemaLoad, got {other:?}"),
    }
}

#[test]
fn malformed_schema_definitions_are_load_errors() {
    let cases = [
        ("[schema.s.fields.f]\ntype = \"integer\"\ndefault = \"x\"\n", "default"),
        ("[schema.s.fields.f]\ntype = \"string\"\nrequired = true\ndefault = \"x\"\n", "required"),
        ("[schema.s.fields.f]\ntype = \"string\"\nitems = \"string\"\n", "items"),
        ("[schema.s.fields.f]\ntype = \"table\"\nschema = \"missing\"\n", "missing"),
        ("[schema.s.fields.f]\ntype = \"string\"\nallowed = [1]\n", "allowed"),
        ("[schema.s.fields.f]\ntype = \"uuid\"\n", "uuid"),
    ];

    for (src, needle) in cases {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s.toml"), src).unwrap();
        match SchemaRegistry::load_dir(dir.path()) {
            Err(OrchestratorError::SchemaLoad(msg)) => {
                assert!(msg.contains(needle), "expected '{needle}' in: {msg}")
            }
            other => panic!("expected SchemaLoad for {src:?}, got {other:?}"),
        }
    }
}

#[test]
fn duplicate_schema_across_files_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.toml"), "[schema.s]\n").unwrap();
    fs::write(dir.path().join("b.toml"), "[schema.s]\n").unwrap();
    let err = SchemaRegistry::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, OrchestratorError::SchemaLoad(ref m) if m.contains("more than once")));
}

#[test]
fn missing_directory_is_a_load_error() {
    let err = SchemaRegistry::load_dir("/no/such/schemas").unwrap_err();
    assert!(matches!(err, OrchestratorError::SchemaLoad(_)));
}

#[test]
fn integers_in_float_fields_are_widened_before_checks() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("tune.toml"),
        r#"
[schema.tune.fields.ratio]
type = "float"
allowed = [0.5, 1.0]

[schema.tune.fields.weights]
type = "array"
items = "float"

[schema.tune.fields.scale]
type = "float"
default = 2
"#,
    )
    .unwrap();
    let reg = SchemaRegistry::load_dir(dir.path()).unwrap();

    let payload = reg
        .validate("tune", &table("ratio = 1\nweights = [1, 2.5]"))
        .unwrap();
    assert_eq!(payload.values.get("ratio"), Some(&toml::Value::Float(1.0)));
    assert_eq!(
        payload.values.get("weights"),
        Some(&toml::Value::Array(vec![
            toml::Value::Float(1.0),
            toml::Value::Float(2.5)
        ]))
    );
    assert_eq!(payload.values.get("scale"), Some(&toml::Value::Float(2.0)));

    let msg = reason(reg.validate("tune", &table("ratio = 2")).unwrap_err());
    assert!(msg.contains("allowed"), "{msg}");
}

//! Runs every golden case under `tests/fixtures/expand` through a session
//! with the standard macros and compares the printed output exactly.

mod common;

use kiln::config::EngineConfig;
use kiln::CompilationSession;

#[test]
fn golden_expansions() {
    let cases = common::load_golden_cases(&common::fixtures_dir().join("expand"));
    assert!(!cases.is_empty(), "no golden cases found");

    let mut failures = Vec::new();
    for case in &cases {
        let mut session = CompilationSession::with_std(EngineConfig::default()).unwrap();
        match session.compile_source(&case.path, &case.input) {
            Ok(actual) if actual == case.expected => {}
            Ok(actual) => failures.push(format!(
                "{}: output differs\n--- expected\n{}--- actual\n{}",
                case.name, case.expected, actual
            )),
            Err(e) => failures.push(format!("{}: {e}", case.name)),
        }
    }
    assert!(failures.is_empty(), "\n{}", failures.join("\n"));
}

#[test]
fn golden_outputs_are_fixed_points() {
    for case in common::load_golden_cases(&common::fixtures_dir().join("expand")) {
        let mut session = CompilationSession::with_std(EngineConfig::default()).unwrap();
        let file = session.parse(&case.path, &case.expected).unwrap();
        assert_eq!(kiln::syntax::print(&file), case.expected, "{}", case.name);
    }
}

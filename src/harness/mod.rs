//! Harness driver - in-container compile/run pipeline
//!
//! The harness is the program executed inside the sandbox for one
//! configuration. It reads `config.json`, synthesizes a test driver around
//! the user code, compiles, runs under a deadline with resource accounting,
//! reconstructs the actual values from the driver's result lines, and writes
//! `result.json`. Every failure path still produces a result document; the
//! harness never aborts silently.
//!
//! Exit codes: 0 = run path (SUCCESS or WRONG_ANSWER); 1 = compile path
//! failure; 2 = run path failure; 3 and above = internal.

pub mod codegen;
pub mod runner;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::codec::{ResultDoc, TestConfig, DEFAULT_CPP_FLAGS, DEFAULT_C_FLAGS};
use crate::types::{CStandard, CppStandard, FunctionType, Language, ParameterSchema};

/// Compiled driver binary
const RUNNER_FILE: &str = "test_runner";
/// Schema fingerprint of the compiled driver, hex-encoded
const SCHEMA_FILE: &str = "test_runner.schema";

pub const EXIT_RUN: i32 = 0;
pub const EXIT_COMPILE_FAILURE: i32 = 1;
pub const EXIT_RUN_FAILURE: i32 = 2;
pub const EXIT_INTERNAL: i32 = 3;

/// Options for one harness invocation
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Reuse the compiled driver when the parameter schema is unchanged
    pub run_only: bool,
    pub compile_timeout: Duration,
    pub execution_timeout: Duration,
}

/// Run the full harness pipeline and return the process exit code
pub fn execute(config_path: &Path, out_path: &Path, options: &HarnessOptions) -> i32 {
    let (doc, exit_code) = match run_pipeline(config_path, out_path, options) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("harness internal failure: {:#}", e);
            (internal_doc(&e), EXIT_INTERNAL)
        }
    };

    if let Err(e) = write_result(out_path, &doc) {
        error!("failed to write result document: {:#}", e);
        return EXIT_INTERNAL;
    }
    exit_code
}

fn run_pipeline(
    config_path: &Path,
    out_path: &Path,
    options: &HarnessOptions,
) -> Result<(ResultDoc, i32)> {
    let raw = std::fs::read(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let config: TestConfig =
        serde_json::from_slice(&raw).context("failed to parse configuration document")?;

    let workdir = workdir_of(config_path);
    let language = detect_language(&config, &workdir)?;
    let schema = config.schema();
    let fingerprint = format!("{:016x}", schema.fingerprint());

    // build phase
    let reuse = options.run_only && runner_matches(&workdir, &fingerprint);
    let recompiled = options.run_only.then_some(!reuse);
    let mut compile_ms = 0u64;

    if reuse {
        debug!("parameter schema unchanged, reusing compiled driver");
    } else {
        let driver = codegen::generate_driver(&config, language)?;
        let driver_file = codegen::driver_file(language);
        std::fs::write(workdir.join(driver_file), driver)
            .with_context(|| format!("failed to write {}", driver_file))?;

        let (compiler, args) = compile_command(&config, language);
        info!(%compiler, "compiling driver and user code");
        let compile = runner::run_with_deadline(
            compiler,
            &args,
            &workdir,
            options.compile_timeout,
        )?;
        compile_ms = compile.wall.as_millis() as u64;

        if compile.timed_out {
            let mut doc = base_doc(compile_ms, recompiled);
            doc.status = "COMPILE_TIMEOUT".to_string();
            doc.exit_code = compile.exit_code;
            doc.error = Some(format!(
                "compilation exceeded the {} second limit",
                options.compile_timeout.as_secs()
            ));
            return Ok((doc, EXIT_COMPILE_FAILURE));
        }
        if compile.exit_code != 0 {
            let mut doc = base_doc(compile_ms, recompiled);
            doc.status = "COMPILE_ERROR".to_string();
            doc.exit_code = compile.exit_code;
            doc.stderr = compile.stderr.clone();
            doc.compile_output = Some(compile.stderr);
            return Ok((doc, EXIT_COMPILE_FAILURE));
        }

        std::fs::write(workdir.join(SCHEMA_FILE), &fingerprint)
            .context("failed to record driver schema")?;
    }

    // provisional document: if the sandbox kills us mid-run, this is the
    // evidence that the run phase was reached
    let mut provisional = base_doc(compile_ms, recompiled);
    provisional.status = "TIMEOUT".to_string();
    provisional.error = Some("execution did not complete".to_string());
    write_result(out_path, &provisional)?;

    // run phase
    let run = runner::run_with_deadline(
        &format!("./{}", RUNNER_FILE),
        &[],
        &workdir,
        options.execution_timeout,
    )?;

    let mut doc = base_doc(compile_ms, recompiled);
    doc.time_ms = run.wall.as_millis() as u64;
    doc.cpu_utime = run.usage.user_cpu.as_secs_f64();
    doc.cpu_stime = run.usage.sys_cpu.as_secs_f64();
    // max_rss_bytes is already normalized to bytes by the runner
    doc.maxrss_mb = run.usage.max_rss_bytes as f64 / (1024.0 * 1024.0);
    doc.stdout = run.stdout.clone();
    doc.stderr = run.stderr;
    doc.exit_code = run.exit_code;

    if run.timed_out {
        doc.status = "TIMEOUT".to_string();
        doc.error = Some(format!(
            "execution exceeded the {} second limit",
            options.execution_timeout.as_secs()
        ));
        return Ok((doc, EXIT_RUN_FAILURE));
    }
    if run.exit_code != 0 {
        doc.status = "RUNTIME_ERROR".to_string();
        doc.error = Some(format!("program exited with code {}", run.exit_code));
        return Ok((doc, EXIT_RUN_FAILURE));
    }

    // compare phase
    let actual = parse_actual(&run.stdout, &schema);
    doc.actual = Some(actual.clone());
    if config.expected.is_empty() {
        doc.status = "SUCCESS".to_string();
    } else {
        doc.expected = Some(config.expected.clone());
        let matched = crate::codec::expected_matches(&config.expected, &actual, &schema);
        doc.matched = Some(matched);
        doc.status = if matched { "SUCCESS" } else { "WRONG_ANSWER" }.to_string();
    }
    Ok((doc, EXIT_RUN))
}

/// Reconstruct the actual-value map from the driver's result lines. Only
/// declared names are scanned and the last occurrence of a name wins, so
/// interleaved user prints cannot shadow the driver's own lines.
pub fn parse_actual(stdout: &str, schema: &ParameterSchema) -> Map<String, Value> {
    let mut names: Vec<&str> = schema.params.iter().map(|(n, _)| n.as_str()).collect();
    if schema.function_type != FunctionType::Void {
        names.push("return_value");
    }

    let mut actual = Map::new();
    for name in names {
        let prefix = format!("{}: ", name);
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix(&prefix) {
                if let Ok(value) = serde_json::from_str::<Value>(rest.trim()) {
                    actual.insert(name.to_string(), value);
                }
            }
        }
    }
    actual
}

fn workdir_of(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn detect_language(config: &TestConfig, workdir: &Path) -> Result<Language> {
    if let Some(language) = config.language_hint() {
        return Ok(language);
    }
    if workdir.join(Language::Cpp.source_file()).exists() {
        Ok(Language::Cpp)
    } else if workdir.join(Language::C.source_file()).exists() {
        Ok(Language::C)
    } else {
        anyhow::bail!("cannot determine submission language: no standard field and no user source")
    }
}

/// Whether the compiled driver on disk was built for this schema
fn runner_matches(workdir: &Path, fingerprint: &str) -> bool {
    if !workdir.join(RUNNER_FILE).exists() {
        return false;
    }
    match std::fs::read_to_string(workdir.join(SCHEMA_FILE)) {
        Ok(stored) => stored.trim() == fingerprint,
        Err(_) => false,
    }
}

/// Compiler invocation for user code plus the generated driver
fn compile_command(config: &TestConfig, language: Language) -> (&'static str, Vec<String>) {
    let (compiler, std_flag, default_flags) = match language {
        Language::C => (
            "gcc",
            config.c_standard.unwrap_or(CStandard::C99).gnu_flag(),
            DEFAULT_C_FLAGS,
        ),
        Language::Cpp => (
            "g++",
            config.cpp_standard.unwrap_or(CppStandard::Cpp17).gnu_flag(),
            DEFAULT_CPP_FLAGS,
        ),
    };

    let mut args = vec![std_flag.to_string()];
    let flags = config.compiler_flags.as_deref().unwrap_or(default_flags);
    args.extend(flags.split_whitespace().map(String::from));
    args.push(language.source_file().to_string());
    args.push(codegen::driver_file(language).to_string());
    args.push("-o".to_string());
    args.push(RUNNER_FILE.to_string());
    if language == Language::C {
        args.push("-lm".to_string());
    }
    (compiler, args)
}

fn base_doc(compile_ms: u64, recompiled: Option<bool>) -> ResultDoc {
    ResultDoc {
        compile_time_ms: compile_ms,
        recompiled,
        ..Default::default()
    }
}

fn internal_doc(error: &anyhow::Error) -> ResultDoc {
    ResultDoc {
        status: "ERROR".to_string(),
        exit_code: EXIT_INTERNAL,
        error: Some(format!("{:#}", error)),
        ..Default::default()
    }
}

fn write_result(out_path: &Path, doc: &ResultDoc) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc).context("failed to serialize result document")?;
    std::fs::write(out_path, bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamType;
    use serde_json::json;

    fn schema() -> ParameterSchema {
        ParameterSchema {
            params: vec![("a".into(), ParamType::Int), ("b".into(), ParamType::Int)],
            function_type: FunctionType::Int,
        }
    }

    #[test]
    fn test_parse_actual_collects_declared_names() {
        let stdout = "Hello from C user code!\na: 6\nb: 9\nreturn_value: 0\n";
        let actual = parse_actual(stdout, &schema());
        assert_eq!(actual["a"], json!(6));
        assert_eq!(actual["b"], json!(9));
        assert_eq!(actual["return_value"], json!(0));
    }

    #[test]
    fn test_parse_actual_last_occurrence_wins() {
        let stdout = "a: 1\nsome log\na: 6\nb: 9\nreturn_value: 0\n";
        let actual = parse_actual(stdout, &schema());
        assert_eq!(actual["a"], json!(6));
    }

    #[test]
    fn test_parse_actual_ignores_undeclared_and_malformed_lines() {
        let stdout = "ghost: 1\na: not json\nb: 9\nreturn_value: 0\n";
        let actual = parse_actual(stdout, &schema());
        assert!(!actual.contains_key("ghost"));
        assert!(!actual.contains_key("a"));
        assert_eq!(actual["b"], json!(9));
    }

    #[test]
    fn test_parse_actual_omits_return_value_for_void() {
        let schema = ParameterSchema {
            params: vec![("a".into(), ParamType::Int)],
            function_type: FunctionType::Void,
        };
        let actual = parse_actual("a: 1\nreturn_value: 0\n", &schema);
        assert!(!actual.contains_key("return_value"));
    }

    #[test]
    fn test_parse_actual_arrays_and_strings() {
        let schema = ParameterSchema {
            params: vec![
                ("v".into(), ParamType::VectorInt),
                ("s".into(), ParamType::String),
            ],
            function_type: FunctionType::Void,
        };
        let actual = parse_actual("v: [1, 2, 3]\ns: \"hi \\\"there\\\"\"\n", &schema);
        assert_eq!(actual["v"], json!([1, 2, 3]));
        assert_eq!(actual["s"], json!("hi \"there\""));
    }

    #[test]
    fn test_compile_command_c_defaults() {
        let config = TestConfig {
            solve_params: vec![],
            expected: Map::new(),
            function_type: FunctionType::Int,
            c_standard: None,
            cpp_standard: None,
            compiler_flags: None,
        };
        let (compiler, args) = compile_command(&config, Language::C);
        assert_eq!(compiler, "gcc");
        assert_eq!(args[0], "-std=c99");
        assert!(args.contains(&"-Wall".to_string()));
        assert!(args.contains(&"user.c".to_string()));
        assert!(args.contains(&"test_main.c".to_string()));
        assert!(args.contains(&"-lm".to_string()));
        assert_eq!(args[args.len() - 2], RUNNER_FILE);
    }

    #[test]
    fn test_compile_command_cpp_standard_and_flags() {
        let config = TestConfig {
            solve_params: vec![],
            expected: Map::new(),
            function_type: FunctionType::Int,
            c_standard: None,
            cpp_standard: Some(CppStandard::Cpp20),
            compiler_flags: Some("-Wall -O3".to_string()),
        };
        let (compiler, args) = compile_command(&config, Language::Cpp);
        assert_eq!(compiler, "g++");
        assert_eq!(args[0], "-std=c++20");
        assert!(args.contains(&"-O3".to_string()));
        assert!(!args.contains(&"-lm".to_string()));
    }

    #[test]
    fn test_detect_language_prefers_standard_fields() {
        let config = TestConfig {
            solve_params: vec![],
            expected: Map::new(),
            function_type: FunctionType::Int,
            c_standard: Some(CStandard::C11),
            cpp_standard: None,
            compiler_flags: None,
        };
        let language = detect_language(&config, Path::new("/nonexistent")).unwrap();
        assert_eq!(language, Language::C);
    }

    #[test]
    fn test_runner_matches_requires_binary_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!runner_matches(dir.path(), "deadbeef"));
        std::fs::write(dir.path().join(RUNNER_FILE), b"").unwrap();
        std::fs::write(dir.path().join(SCHEMA_FILE), "deadbeef\n").unwrap();
        assert!(runner_matches(dir.path(), "deadbeef"));
        assert!(!runner_matches(dir.path(), "cafebabe"));
    }
}

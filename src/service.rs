//! Service facade
//!
//! Thin adapter between the network layer and the orchestrator. Everything
//! here is request validation and response shaping: malformed requests are
//! rejected with `CONFIG_INVALID` before any sandbox is touched, and they
//! never become verdicts.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::codec::TestConfig;
use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::languages::LanguageRegistry;
use crate::orchestrator::Orchestrator;
use crate::sandbox::SandboxManager;
use crate::types::{
    FunctionType, Language, Parameter, ParamType, ResourceLimits, Standard, Submission, Verdict,
    VerdictStatus, MAX_BATCH_SIZE, MAX_SOURCE_BYTES,
};

/// Source fragments that are rejected outright; user code has no business
/// spawning processes inside the sandbox
const DANGEROUS_PATTERNS: &[&str] = &[
    "system(",
    "popen(",
    "fork(",
    "execve(",
    "execvp(",
    "execl(",
];

/// Reserved key in the expected map for the entry point's return
const RETURN_VALUE_KEY: &str = "return_value";

/// All parameter type tags, for the languages listing
const PARAMETER_TYPE_TAGS: &[&str] = &[
    "int",
    "float",
    "double",
    "char",
    "string",
    "bool",
    "array_int",
    "array_float",
    "array_char",
    "vector<int>",
    "vector<float>",
    "vector<double>",
    "vector<string>",
];

/// All function type tags, for the languages listing
const FUNCTION_TYPE_TAGS: &[&str] =
    &["int", "float", "double", "char", "string", "bool", "void"];

/// Aggregate statistics for a batch response
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total_tests: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub wall_ms: u64,
}

/// Verdicts plus summary, in request order
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub verdicts: Vec<Verdict>,
    pub summary: BatchSummary,
}

/// One entry of the supported-languages listing
#[derive(Debug, Clone, Serialize)]
pub struct LanguageInfo {
    pub language: String,
    pub description: String,
    pub standards: Vec<String>,
    pub default_standard: String,
}

/// Supported languages and the closed type-tag sets
#[derive(Debug, Clone, Serialize)]
pub struct LanguagesListing {
    pub supported_languages: Vec<LanguageInfo>,
    pub parameter_types: Vec<&'static str>,
    pub function_types: Vec<&'static str>,
}

/// Published default and maximum resource limits
#[derive(Debug, Clone, Serialize)]
pub struct ServiceLimits {
    pub default_limits: ResourceLimits,
    pub maximum_limits: ResourceLimits,
    pub max_source_bytes: usize,
    pub max_batch_size: usize,
}

/// Outcome of the end-to-end health probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub check_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The judge service: validation in front of the orchestrator
pub struct JudgeService {
    orchestrator: Orchestrator,
    registry: LanguageRegistry,
}

impl JudgeService {
    pub fn new(manager: Arc<SandboxManager>, registry: LanguageRegistry) -> Self {
        Self {
            orchestrator: Orchestrator::new(manager),
            registry,
        }
    }

    /// Build the full stack from configuration: the built-in language
    /// registry and the local or SSH-proxied Docker runtime
    pub fn from_config(config: &JudgeConfig) -> Result<Self, JudgeError> {
        let registry = LanguageRegistry::builtin().map_err(JudgeError::Internal)?;
        let manager =
            SandboxManager::from_config(registry.clone(), config).map_err(JudgeError::Internal)?;
        Ok(Self::new(Arc::new(manager), registry))
    }

    /// Evaluate one submission
    pub async fn evaluate(&self, submission: Submission) -> Result<Verdict, JudgeError> {
        validate_submission(&submission)?;
        Ok(self.orchestrator.evaluate(&submission).await)
    }

    /// Evaluate independent submissions concurrently
    pub async fn evaluate_batch(
        &self,
        submissions: Vec<Submission>,
    ) -> Result<BatchOutcome, JudgeError> {
        if submissions.is_empty() {
            return Err(JudgeError::invalid("batch contains no submissions"));
        }
        if submissions.len() > MAX_BATCH_SIZE {
            return Err(JudgeError::invalid(format!(
                "batch size {} exceeds the maximum of {}",
                submissions.len(),
                MAX_BATCH_SIZE
            )));
        }
        for (index, submission) in submissions.iter().enumerate() {
            validate_submission(submission)
                .map_err(|e| JudgeError::invalid(format!("submission {}: {}", index, e)))?;
        }

        let started = Instant::now();
        let verdicts = self.orchestrator.evaluate_batch(&submissions).await;
        Ok(summarize(verdicts, started.elapsed().as_millis() as u64))
    }

    /// Evaluate one source against many configurations with a shared
    /// compile wherever the parameter schema allows
    pub async fn evaluate_optimized_batch(
        &self,
        language: Language,
        source: String,
        configs: Vec<TestConfig>,
        resource_limits: Option<ResourceLimits>,
    ) -> Result<BatchOutcome, JudgeError> {
        validate_source(&source)?;
        if configs.is_empty() {
            return Err(JudgeError::invalid("batch contains no configurations"));
        }
        if configs.len() > MAX_BATCH_SIZE {
            return Err(JudgeError::invalid(format!(
                "batch size {} exceeds the maximum of {}",
                configs.len(),
                MAX_BATCH_SIZE
            )));
        }
        let limits = resource_limits.unwrap_or_default();
        validate_limits(&limits)?;
        for (index, config) in configs.iter().enumerate() {
            validate_config(language, config)
                .map_err(|e| JudgeError::invalid(format!("config {}: {}", index, e)))?;
        }

        info!(%language, configs = configs.len(), "optimized batch accepted");
        let started = Instant::now();
        let verdicts = self
            .orchestrator
            .evaluate_optimized_batch(language, &source, &configs, limits)
            .await;
        Ok(summarize(verdicts, started.elapsed().as_millis() as u64))
    }

    /// Supported languages, standards, and type tags
    pub fn list_languages(&self) -> Result<LanguagesListing, JudgeError> {
        let mut supported_languages = Vec::new();
        for language in [Language::C, Language::Cpp] {
            let spec = self.registry.get(language).map_err(JudgeError::Internal)?;
            supported_languages.push(LanguageInfo {
                language: language.to_string(),
                description: spec.description.clone(),
                standards: spec.standards.clone(),
                default_standard: spec.default_standard.clone(),
            });
        }
        Ok(LanguagesListing {
            supported_languages,
            parameter_types: PARAMETER_TYPE_TAGS.to_vec(),
            function_types: FUNCTION_TYPE_TAGS.to_vec(),
        })
    }

    /// Published resource limits and request caps
    pub fn get_limits(&self) -> ServiceLimits {
        ServiceLimits {
            default_limits: ResourceLimits::default(),
            maximum_limits: ResourceLimits {
                compile_timeout_s: ResourceLimits::MAX_COMPILE_TIMEOUT_S,
                execution_timeout_s: ResourceLimits::MAX_EXECUTION_TIMEOUT_S,
                memory_bytes: ResourceLimits::MAX_MEMORY_BYTES,
                cpu_cores: ResourceLimits::MAX_CPU_CORES,
            },
            max_source_bytes: MAX_SOURCE_BYTES,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// End-to-end health probe: a canned C submission through the full
    /// pipeline
    pub async fn health(&self) -> HealthReport {
        let submission = health_probe_submission();
        let started = Instant::now();
        let verdict = self.orchestrator.evaluate(&submission).await;
        let check_ms = started.elapsed().as_millis() as u64;

        let healthy = verdict.status == VerdictStatus::Success;
        if !healthy {
            warn!(status = %verdict.status, "health probe failed");
        }
        HealthReport {
            healthy,
            check_ms,
            detail: (!healthy).then(|| {
                verdict
                    .error_detail
                    .unwrap_or_else(|| format!("probe verdict: {}", verdict.status))
            }),
        }
    }
}

fn summarize(verdicts: Vec<Verdict>, wall_ms: u64) -> BatchOutcome {
    let total_tests = verdicts.len();
    let success_count = verdicts
        .iter()
        .filter(|v| v.status == VerdictStatus::Success)
        .count();
    BatchOutcome {
        summary: BatchSummary {
            total_tests,
            success_count,
            error_count: total_tests - success_count,
            success_rate: if total_tests == 0 {
                0.0
            } else {
                success_count as f64 / total_tests as f64
            },
            wall_ms,
        },
        verdicts,
    }
}

fn health_probe_submission() -> Submission {
    let mut expected = serde_json::Map::new();
    expected.insert("a".to_string(), serde_json::json!(42));
    Submission {
        language: Language::C,
        source: "int solve(int *a) { *a = 42; return 0; }".to_string(),
        params: vec![Parameter {
            name: "a".to_string(),
            param_type: ParamType::Int,
            input_value: serde_json::json!(1),
        }],
        expected,
        function_type: FunctionType::Int,
        compiler_settings: None,
        resource_limits: None,
    }
}

/// Validate a full submission; raised before any sandbox is acquired
pub fn validate_submission(submission: &Submission) -> Result<(), JudgeError> {
    validate_source(&submission.source)?;

    if let Some(settings) = &submission.compiler_settings {
        match (submission.language, settings.standard) {
            (Language::C, Some(Standard::Cpp(_))) => {
                return Err(JudgeError::invalid("C submission with a C++ standard"));
            }
            (Language::Cpp, Some(Standard::C(_))) => {
                return Err(JudgeError::invalid("C++ submission with a C standard"));
            }
            _ => {}
        }
    }

    validate_params(submission.language, &submission.params)?;
    validate_expected(submission)?;

    if let Some(limits) = &submission.resource_limits {
        validate_limits(limits)?;
    }
    Ok(())
}

fn validate_source(source: &str) -> Result<(), JudgeError> {
    if source.trim().is_empty() {
        return Err(JudgeError::invalid("source code is empty"));
    }
    if source.len() > MAX_SOURCE_BYTES {
        return Err(JudgeError::invalid(format!(
            "source size {} exceeds the maximum of {} bytes",
            source.len(),
            MAX_SOURCE_BYTES
        )));
    }
    for pattern in DANGEROUS_PATTERNS {
        if source.contains(pattern) {
            return Err(JudgeError::invalid(format!(
                "source contains forbidden call {}",
                pattern.trim_end_matches('(')
            )));
        }
    }
    Ok(())
}

fn validate_params(language: Language, params: &[Parameter]) -> Result<(), JudgeError> {
    for (index, param) in params.iter().enumerate() {
        if !is_identifier(&param.name) {
            return Err(JudgeError::invalid(format!(
                "parameter {} has invalid name {:?}",
                index, param.name
            )));
        }
        if param.name == RETURN_VALUE_KEY {
            return Err(JudgeError::invalid(format!(
                "parameter name {:?} is reserved",
                RETURN_VALUE_KEY
            )));
        }
        if params[..index].iter().any(|p| p.name == param.name) {
            return Err(JudgeError::invalid(format!(
                "duplicate parameter name: {}",
                param.name
            )));
        }
        if !param.param_type.supported_by(language) {
            return Err(JudgeError::invalid(format!(
                "parameter {} has a type not supported by {}",
                param.name, language
            )));
        }
        if !crate::codec::value_conforms(&param.input_value, param.param_type) {
            return Err(JudgeError::invalid(format!(
                "initial value of parameter {} does not conform to its type",
                param.name
            )));
        }
    }
    Ok(())
}

fn validate_expected(submission: &Submission) -> Result<(), JudgeError> {
    for (key, value) in &submission.expected {
        if key == RETURN_VALUE_KEY {
            let param_type = submission.function_type.as_param_type().ok_or_else(|| {
                JudgeError::invalid("expected return_value for a void function")
            })?;
            if !crate::codec::value_conforms(value, param_type) {
                return Err(JudgeError::invalid(
                    "expected return_value does not conform to the function type",
                ));
            }
            continue;
        }
        let param = submission
            .params
            .iter()
            .find(|p| &p.name == key)
            .ok_or_else(|| {
                JudgeError::invalid(format!("expected key {:?} names no parameter", key))
            })?;
        if !crate::codec::value_conforms(value, param.param_type) {
            return Err(JudgeError::invalid(format!(
                "expected value for {} does not conform to its type",
                key
            )));
        }
    }
    Ok(())
}

fn validate_limits(limits: &ResourceLimits) -> Result<(), JudgeError> {
    if limits.compile_timeout_s == 0
        || limits.compile_timeout_s > ResourceLimits::MAX_COMPILE_TIMEOUT_S
    {
        return Err(JudgeError::invalid(format!(
            "compile timeout must be within 1..={} seconds",
            ResourceLimits::MAX_COMPILE_TIMEOUT_S
        )));
    }
    if limits.execution_timeout_s == 0
        || limits.execution_timeout_s > ResourceLimits::MAX_EXECUTION_TIMEOUT_S
    {
        return Err(JudgeError::invalid(format!(
            "execution timeout must be within 1..={} seconds",
            ResourceLimits::MAX_EXECUTION_TIMEOUT_S
        )));
    }
    if limits.memory_bytes == 0 || limits.memory_bytes > ResourceLimits::MAX_MEMORY_BYTES {
        return Err(JudgeError::invalid(format!(
            "memory limit must be within 1..={} bytes",
            ResourceLimits::MAX_MEMORY_BYTES
        )));
    }
    if limits.cpu_cores <= 0.0 || limits.cpu_cores > ResourceLimits::MAX_CPU_CORES {
        return Err(JudgeError::invalid(format!(
            "cpu share must be within (0, {}]",
            ResourceLimits::MAX_CPU_CORES
        )));
    }
    Ok(())
}

/// Validate one optimized-batch configuration
fn validate_config(language: Language, config: &TestConfig) -> Result<(), JudgeError> {
    let params: Vec<Parameter> = config
        .solve_params
        .iter()
        .map(|p| Parameter {
            name: p.name.clone(),
            param_type: p.param_type,
            input_value: p.input_value.clone(),
        })
        .collect();
    validate_params(language, &params)?;

    for (key, value) in &config.expected {
        if key == RETURN_VALUE_KEY {
            let param_type = config.function_type.as_param_type().ok_or_else(|| {
                JudgeError::invalid("expected return_value for a void function")
            })?;
            if !crate::codec::value_conforms(value, param_type) {
                return Err(JudgeError::invalid(
                    "expected return_value does not conform to the function type",
                ));
            }
            continue;
        }
        let param = params.iter().find(|p| &p.name == key).ok_or_else(|| {
            JudgeError::invalid(format!("expected key {:?} names no parameter", key))
        })?;
        if !crate::codec::value_conforms(value, param.param_type) {
            return Err(JudgeError::invalid(format!(
                "expected value for {} does not conform to its type",
                key
            )));
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> Submission {
        Submission {
            language: Language::C,
            source: "int solve(int *a) { *a = 6; return 0; }".into(),
            params: vec![Parameter {
                name: "a".into(),
                param_type: ParamType::Int,
                input_value: json!(3),
            }],
            expected: json!({"a": 6}).as_object().unwrap().clone(),
            function_type: FunctionType::Int,
            compiler_settings: None,
            resource_limits: None,
        }
    }

    #[test]
    fn test_valid_submission_passes() {
        assert!(validate_submission(&submission()).is_ok());
    }

    #[test]
    fn test_empty_source_rejected() {
        let mut sub = submission();
        sub.source = "   ".into();
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_oversize_source_rejected() {
        let mut sub = submission();
        sub.source = "x".repeat(MAX_SOURCE_BYTES + 1);
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_dangerous_source_rejected() {
        let mut sub = submission();
        sub.source = r#"int solve(int *a) { system("rm -rf /"); return 0; }"#.into();
        let err = validate_submission(&sub).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut sub = submission();
        sub.params.push(sub.params[0].clone());
        let err = validate_submission(&sub).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_reserved_name_rejected() {
        let mut sub = submission();
        sub.params[0].name = "return_value".into();
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_nonconforming_value_rejected() {
        let mut sub = submission();
        sub.params[0].input_value = json!("three");
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_vector_param_rejected_for_c() {
        let mut sub = submission();
        sub.params[0].param_type = ParamType::VectorInt;
        sub.params[0].input_value = json!([1, 2]);
        sub.expected.clear();
        assert!(validate_submission(&sub).is_err());
        sub.language = Language::Cpp;
        assert!(validate_submission(&sub).is_ok());
    }

    #[test]
    fn test_unknown_expected_key_rejected() {
        let mut sub = submission();
        sub.expected
            .insert("ghost".into(), json!(1));
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_expected_return_value_for_void_rejected() {
        let mut sub = submission();
        sub.function_type = FunctionType::Void;
        sub.expected = json!({"return_value": 0}).as_object().unwrap().clone();
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_limits_over_ceiling_rejected() {
        let mut sub = submission();
        sub.resource_limits = Some(ResourceLimits {
            execution_timeout_s: 120,
            ..Default::default()
        });
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_mismatched_standard_rejected() {
        use crate::types::{CompilerSettings, CppStandard};
        let mut sub = submission();
        sub.compiler_settings = Some(CompilerSettings {
            standard: Some(Standard::Cpp(CppStandard::Cpp17)),
            flags: None,
            optimization: None,
        });
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_summarize_counts() {
        let verdicts = vec![
            Verdict::internal_error("x"),
            {
                let mut v = Verdict::internal_error("y");
                v.status = VerdictStatus::Success;
                v.error_detail = None;
                v
            },
        ];
        let outcome = summarize(verdicts, 100);
        assert_eq!(outcome.summary.total_tests, 2);
        assert_eq!(outcome.summary.success_count, 1);
        assert_eq!(outcome.summary.error_count, 1);
        assert!((outcome.summary.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("a"));
        assert!(is_identifier("_tmp2"));
        assert!(!is_identifier("2a"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}

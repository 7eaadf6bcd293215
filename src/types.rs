//! Core data model shared by the facade, orchestrator, and harness
//!
//! Submissions are immutable once built by the facade; verdicts are the
//! single outcome record every evaluation produces.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum accepted source size in bytes
pub const MAX_SOURCE_BYTES: usize = 50_000;
/// Maximum number of configurations in one batch request
pub const MAX_BATCH_SIZE: usize = 100;

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "c")]
    C,
    #[serde(rename = "cpp")]
    Cpp,
}

impl Language {
    /// File name the user source is uploaded under
    pub fn source_file(&self) -> &'static str {
        match self {
            Language::C => "user.c",
            Language::Cpp => "user.cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

/// Closed set of parameter type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "array_int")]
    ArrayInt,
    #[serde(rename = "array_float")]
    ArrayFloat,
    #[serde(rename = "array_char")]
    ArrayChar,
    #[serde(rename = "vector<int>")]
    VectorInt,
    #[serde(rename = "vector<float>")]
    VectorFloat,
    #[serde(rename = "vector<double>")]
    VectorDouble,
    #[serde(rename = "vector<string>")]
    VectorString,
}

impl ParamType {
    /// Whether this tag denotes an ordered sequence
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            ParamType::ArrayInt
                | ParamType::ArrayFloat
                | ParamType::ArrayChar
                | ParamType::VectorInt
                | ParamType::VectorFloat
                | ParamType::VectorDouble
                | ParamType::VectorString
        )
    }

    /// Element type of a sequence tag
    pub fn element_type(&self) -> Option<ParamType> {
        match self {
            ParamType::ArrayInt | ParamType::VectorInt => Some(ParamType::Int),
            ParamType::ArrayFloat | ParamType::VectorFloat => Some(ParamType::Float),
            ParamType::VectorDouble => Some(ParamType::Double),
            ParamType::ArrayChar => Some(ParamType::Char),
            ParamType::VectorString => Some(ParamType::String),
            _ => None,
        }
    }

    /// `vector<...>` tags only exist in C++
    pub fn supported_by(&self, language: Language) -> bool {
        match self {
            ParamType::VectorInt
            | ParamType::VectorFloat
            | ParamType::VectorDouble
            | ParamType::VectorString => language == Language::Cpp,
            _ => true,
        }
    }
}

/// Declared return type of the user entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "void")]
    Void,
}

impl FunctionType {
    /// The parameter-type view of a non-void return, used for comparisons
    pub fn as_param_type(&self) -> Option<ParamType> {
        match self {
            FunctionType::Int => Some(ParamType::Int),
            FunctionType::Float => Some(ParamType::Float),
            FunctionType::Double => Some(ParamType::Double),
            FunctionType::Char => Some(ParamType::Char),
            FunctionType::String => Some(ParamType::String),
            FunctionType::Bool => Some(ParamType::Bool),
            FunctionType::Void => None,
        }
    }
}

/// One declared parameter of the `solve` entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub input_value: Value,
}

/// C language standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CStandard {
    C89,
    C99,
    C11,
    C17,
    C23,
}

impl CStandard {
    pub fn gnu_flag(&self) -> &'static str {
        match self {
            CStandard::C89 => "-std=c89",
            CStandard::C99 => "-std=c99",
            CStandard::C11 => "-std=c11",
            CStandard::C17 => "-std=c17",
            CStandard::C23 => "-std=c23",
        }
    }
}

/// C++ language standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CppStandard {
    Cpp98,
    Cpp03,
    Cpp11,
    Cpp14,
    Cpp17,
    Cpp20,
    Cpp23,
}

impl CppStandard {
    pub fn gnu_flag(&self) -> &'static str {
        match self {
            CppStandard::Cpp98 => "-std=c++98",
            CppStandard::Cpp03 => "-std=c++03",
            CppStandard::Cpp11 => "-std=c++11",
            CppStandard::Cpp14 => "-std=c++14",
            CppStandard::Cpp17 => "-std=c++17",
            CppStandard::Cpp20 => "-std=c++20",
            CppStandard::Cpp23 => "-std=c++23",
        }
    }
}

/// Language standard, tied to the submission language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Standard {
    C(CStandard),
    Cpp(CppStandard),
}

/// Compiler settings carried by a submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard: Option<Standard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<String>,
}

/// Resource limits for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Compile timeout in seconds (default 30, ceiling 300)
    #[serde(default = "ResourceLimits::default_compile_timeout")]
    pub compile_timeout_s: u64,
    /// Execution timeout in seconds (default 10, ceiling 60)
    #[serde(default = "ResourceLimits::default_execution_timeout")]
    pub execution_timeout_s: u64,
    /// Container memory cap in bytes (default 128 MiB, ceiling 1 GiB)
    #[serde(default = "ResourceLimits::default_memory_bytes")]
    pub memory_bytes: u64,
    /// Container CPU share (default 1.0, ceiling 4.0)
    #[serde(default = "ResourceLimits::default_cpu_cores")]
    pub cpu_cores: f64,
}

impl ResourceLimits {
    pub const MAX_COMPILE_TIMEOUT_S: u64 = 300;
    pub const MAX_EXECUTION_TIMEOUT_S: u64 = 60;
    pub const MAX_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;
    pub const MAX_CPU_CORES: f64 = 4.0;

    fn default_compile_timeout() -> u64 {
        30
    }
    fn default_execution_timeout() -> u64 {
        10
    }
    fn default_memory_bytes() -> u64 {
        128 * 1024 * 1024
    }
    fn default_cpu_cores() -> f64 {
        1.0
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            compile_timeout_s: Self::default_compile_timeout(),
            execution_timeout_s: Self::default_execution_timeout(),
            memory_bytes: Self::default_memory_bytes(),
            cpu_cores: Self::default_cpu_cores(),
        }
    }
}

/// An immutable user submission, built and validated by the facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub language: Language,
    pub source: String,
    pub params: Vec<Parameter>,
    /// Expected final values keyed by parameter name or `return_value`
    #[serde(default)]
    pub expected: serde_json::Map<String, Value>,
    pub function_type: FunctionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_settings: Option<CompilerSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
}

impl Submission {
    /// Effective resource limits, defaults applied
    pub fn limits(&self) -> ResourceLimits {
        self.resource_limits.unwrap_or_default()
    }

    /// The parameter schema this submission's driver is generated from
    pub fn schema(&self) -> ParameterSchema {
        ParameterSchema {
            params: self
                .params
                .iter()
                .map(|p| (p.name.clone(), p.param_type))
                .collect(),
            function_type: self.function_type,
        }
    }
}

/// Ordered ⟨name, type⟩ pairs plus the function type: the signature seen by
/// the generated driver. Two configurations share a compiled runner iff
/// their schemas are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterSchema {
    pub params: Vec<(String, ParamType)>,
    pub function_type: FunctionType,
}

impl ParameterSchema {
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Canonical status taxonomy for verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "WRONG_ANSWER")]
    WrongAnswer,
    #[serde(rename = "COMPILE_ERROR")]
    CompileError,
    #[serde(rename = "COMPILE_TIMEOUT")]
    CompileTimeout,
    #[serde(rename = "RUNTIME_ERROR")]
    RuntimeError,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerdictStatus::Success => "SUCCESS",
            VerdictStatus::WrongAnswer => "WRONG_ANSWER",
            VerdictStatus::CompileError => "COMPILE_ERROR",
            VerdictStatus::CompileTimeout => "COMPILE_TIMEOUT",
            VerdictStatus::RuntimeError => "RUNTIME_ERROR",
            VerdictStatus::Timeout => "TIMEOUT",
            VerdictStatus::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Timing and resource metrics for one evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock run time in milliseconds
    pub wall_ms: u64,
    /// Wall-clock compile time in milliseconds
    pub compile_ms: u64,
    /// CPU time spent in user mode, seconds
    pub user_cpu_s: f64,
    /// CPU time spent in kernel mode, seconds
    pub sys_cpu_s: f64,
    /// Peak resident set size in bytes
    pub max_rss_bytes: u64,
    /// Set in optimized batch: whether this item forced a recompile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recompiled: Option<bool>,
}

/// The canonical outcome record produced for every submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    /// Defined only when expected values exist and the run path completed
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Map<String, Value>>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_output: Option<String>,
    pub exit_code: i32,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Verdict {
    /// An INTERNAL_ERROR verdict carrying only a diagnostic detail
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::InternalError,
            matched: None,
            expected: None,
            actual: None,
            stdout: String::new(),
            stderr: String::new(),
            compile_output: None,
            exit_code: -1,
            metrics: Metrics::default(),
            error_detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_type_tags_round_trip() {
        for (tag, ty) in [
            ("int", ParamType::Int),
            ("array_int", ParamType::ArrayInt),
            ("vector<int>", ParamType::VectorInt),
            ("vector<string>", ParamType::VectorString),
        ] {
            let parsed: ParamType = serde_json::from_value(json!(tag)).unwrap();
            assert_eq!(parsed, ty);
            assert_eq!(serde_json::to_value(ty).unwrap(), json!(tag));
        }
    }

    #[test]
    fn test_vector_tags_are_cpp_only() {
        assert!(!ParamType::VectorInt.supported_by(Language::C));
        assert!(ParamType::VectorInt.supported_by(Language::Cpp));
        assert!(ParamType::ArrayInt.supported_by(Language::C));
    }

    #[test]
    fn test_schema_fingerprint_ignores_values() {
        let schema = |v: i64| {
            Submission {
                language: Language::C,
                source: "int solve(int *a) { return 0; }".into(),
                params: vec![Parameter {
                    name: "a".into(),
                    param_type: ParamType::Int,
                    input_value: json!(v),
                }],
                expected: serde_json::Map::new(),
                function_type: FunctionType::Int,
                compiler_settings: None,
                resource_limits: None,
            }
            .schema()
        };
        assert_eq!(schema(1).fingerprint(), schema(42).fingerprint());
    }

    #[test]
    fn test_schema_fingerprint_sees_types_and_order() {
        let base = ParameterSchema {
            params: vec![("a".into(), ParamType::Int), ("b".into(), ParamType::Int)],
            function_type: FunctionType::Int,
        };
        let swapped = ParameterSchema {
            params: vec![("b".into(), ParamType::Int), ("a".into(), ParamType::Int)],
            function_type: FunctionType::Int,
        };
        let widened = ParameterSchema {
            params: vec![
                ("a".into(), ParamType::Int),
                ("b".into(), ParamType::Double),
            ],
            function_type: FunctionType::Int,
        };
        let voided = ParameterSchema {
            function_type: FunctionType::Void,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), swapped.fingerprint());
        assert_ne!(base.fingerprint(), widened.fingerprint());
        assert_ne!(base.fingerprint(), voided.fingerprint());
    }

    #[test]
    fn test_default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.compile_timeout_s, 30);
        assert_eq!(limits.execution_timeout_s, 10);
        assert_eq!(limits.memory_bytes, 128 * 1024 * 1024);
        assert!((limits.cpu_cores - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_verdict_status_serializes_upper_snake() {
        assert_eq!(
            serde_json::to_value(VerdictStatus::WrongAnswer).unwrap(),
            json!("WRONG_ANSWER")
        );
    }
}

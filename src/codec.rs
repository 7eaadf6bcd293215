//! Parameter & result codec
//!
//! Converts submissions into the on-disk `config.json` document read by the
//! in-container harness, and parses the `result.json` document the harness
//! writes back. Numeric handling is fixed: integers are 64-bit signed,
//! floats are IEEE-754 double, arrays preserve order, strings are UTF-8.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{
    CStandard, CppStandard, FunctionType, Language, Parameter, ParameterSchema, ParamType,
    Standard, Submission,
};

/// Default compile flags when a submission carries no compiler settings
pub const DEFAULT_C_FLAGS: &str = "-Wall -Wextra";
pub const DEFAULT_CPP_FLAGS: &str = "-Wall -Wextra -O2";

/// One parameter entry of the configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub input_value: Value,
}

/// On-disk configuration document, one per test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub solve_params: Vec<SolveParam>,
    #[serde(default)]
    pub expected: Map<String, Value>,
    pub function_type: FunctionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_standard: Option<CStandard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpp_standard: Option<CppStandard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_flags: Option<String>,
}

impl TestConfig {
    /// The parameter schema this configuration implies
    pub fn schema(&self) -> ParameterSchema {
        ParameterSchema {
            params: self
                .solve_params
                .iter()
                .map(|p| (p.name.clone(), p.param_type))
                .collect(),
            function_type: self.function_type,
        }
    }

    /// Language implied by which standard field is present; C++ wins when
    /// both are absent only if the caller says so
    pub fn language_hint(&self) -> Option<Language> {
        match (self.c_standard, self.cpp_standard) {
            (Some(_), _) => Some(Language::C),
            (None, Some(_)) => Some(Language::Cpp),
            (None, None) => None,
        }
    }
}

/// On-disk result document written by the harness
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultDoc {
    pub status: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub compile_time_ms: u64,
    #[serde(default)]
    pub time_ms: u64,
    #[serde(default)]
    pub cpu_utime: f64,
    #[serde(default)]
    pub cpu_stime: f64,
    #[serde(default)]
    pub maxrss_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Map<String, Value>>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recompiled: Option<bool>,
}

/// Build the configuration document for a submission
pub fn encode_config(submission: &Submission) -> TestConfig {
    let settings = submission.compiler_settings.clone().unwrap_or_default();

    let (c_standard, cpp_standard) = match (submission.language, settings.standard) {
        (Language::C, Some(Standard::C(s))) => (Some(s), None),
        (Language::C, _) => (Some(CStandard::C99), None),
        (Language::Cpp, Some(Standard::Cpp(s))) => (None, Some(s)),
        (Language::Cpp, _) => (None, Some(CppStandard::Cpp17)),
    };

    let default_flags = match submission.language {
        Language::C => DEFAULT_C_FLAGS,
        Language::Cpp => DEFAULT_CPP_FLAGS,
    };
    let mut flags = settings.flags.unwrap_or_else(|| default_flags.to_string());
    if let Some(opt) = settings.optimization {
        if !opt.trim().is_empty() {
            flags = format!("{} {}", flags, opt.trim());
        }
    }

    TestConfig {
        solve_params: submission
            .params
            .iter()
            .map(|p| SolveParam {
                name: p.name.clone(),
                param_type: p.param_type,
                input_value: p.input_value.clone(),
            })
            .collect(),
        expected: submission.expected.clone(),
        function_type: submission.function_type,
        c_standard,
        cpp_standard,
        compiler_flags: Some(flags),
    }
}

/// Serialize a configuration document to bytes
pub fn config_to_bytes(config: &TestConfig) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(config).context("failed to serialize config document")
}

/// Parse a result document from bytes
pub fn parse_result(bytes: &[u8]) -> Result<ResultDoc> {
    serde_json::from_slice(bytes).context("failed to parse result document")
}

/// Check that a literal conforms to a type tag. `null` is forbidden
/// everywhere; sequence literals must be homogeneous.
pub fn value_conforms(value: &Value, param_type: ParamType) -> bool {
    match param_type {
        ParamType::Int => value.as_i64().is_some(),
        ParamType::Float | ParamType::Double => value.is_number(),
        ParamType::Char => value
            .as_str()
            .map(|s| s.chars().count() == 1)
            .unwrap_or(false),
        ParamType::String => value.is_string(),
        ParamType::Bool => value.is_boolean(),
        _ => match (value.as_array(), param_type.element_type()) {
            (Some(items), Some(elem)) => items.iter().all(|v| value_conforms(v, elem)),
            _ => false,
        },
    }
}

/// Typed equality between an expected and an actual literal: exact for
/// integers, strings, chars, and bools; f64 equality (0 ULP) for floats;
/// ordered element-wise for sequences.
pub fn values_equal(expected: &Value, actual: &Value, param_type: ParamType) -> bool {
    match param_type {
        ParamType::Int => match (expected.as_i64(), actual.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        ParamType::Float | ParamType::Double => match (expected.as_f64(), actual.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        ParamType::Char | ParamType::String => match (expected.as_str(), actual.as_str()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        ParamType::Bool => match (expected.as_bool(), actual.as_bool()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => {
            let elem = match param_type.element_type() {
                Some(e) => e,
                None => return false,
            };
            match (expected.as_array(), actual.as_array()) {
                (Some(a), Some(b)) => {
                    a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y, elem))
                }
                _ => false,
            }
        }
    }
}

/// Compare an expected map against an actual map under a schema. Only keys
/// declared in `expected` are checked; an empty map always matches.
pub fn expected_matches(
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
    schema: &ParameterSchema,
) -> bool {
    expected.iter().all(|(key, want)| {
        let param_type = if key == "return_value" {
            schema.function_type.as_param_type()
        } else {
            schema
                .params
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, ty)| *ty)
        };
        match (param_type, actual.get(key)) {
            (Some(ty), Some(got)) => values_equal(want, got, ty),
            _ => false,
        }
    })
}

/// Round-trip a parameter through the wire representation
pub fn round_trip_param(param: &Parameter) -> Result<Parameter> {
    let bytes = serde_json::to_vec(param).context("failed to serialize parameter")?;
    serde_json::from_slice(&bytes).context("failed to parse parameter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompilerSettings;
    use serde_json::json;

    fn submission_c() -> Submission {
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
    fn test_encode_config_defaults() {
        let config = encode_config(&submission_c());
        assert_eq!(config.c_standard, Some(CStandard::C99));
        assert_eq!(config.cpp_standard, None);
        assert_eq!(config.compiler_flags.as_deref(), Some("-Wall -Wextra"));
    }

    #[test]
    fn test_encode_config_merges_optimization() {
        let mut sub = submission_c();
        sub.language = Language::Cpp;
        sub.compiler_settings = Some(CompilerSettings {
            standard: Some(Standard::Cpp(CppStandard::Cpp20)),
            flags: Some("-Wall".into()),
            optimization: Some("-O3".into()),
        });
        let config = encode_config(&sub);
        assert_eq!(config.cpp_standard, Some(CppStandard::Cpp20));
        assert_eq!(config.compiler_flags.as_deref(), Some("-Wall -O3"));
    }

    #[test]
    fn test_config_document_shape() {
        let config = encode_config(&submission_c());
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["solve_params"][0]["name"], json!("a"));
        assert_eq!(value["solve_params"][0]["type"], json!("int"));
        assert_eq!(value["solve_params"][0]["input_value"], json!(3));
        assert_eq!(value["function_type"], json!("int"));
        assert_eq!(value["c_standard"], json!("c99"));
        assert!(value.get("cpp_standard").is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let config = encode_config(&submission_c());
        let bytes = config_to_bytes(&config).unwrap();
        let parsed: TestConfig = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.schema(), config.schema());
        assert_eq!(parsed.expected, config.expected);
    }

    #[test]
    fn test_param_round_trip_preserves_order() {
        let param = Parameter {
            name: "v".into(),
            param_type: ParamType::VectorInt,
            input_value: json!([3, 1, 2]),
        };
        let back = round_trip_param(&param).unwrap();
        assert_eq!(back.input_value, json!([3, 1, 2]));
    }

    #[test]
    fn test_value_conforms() {
        assert!(value_conforms(&json!(1), ParamType::Int));
        assert!(!value_conforms(&json!(1.5), ParamType::Int));
        assert!(value_conforms(&json!(1.5), ParamType::Double));
        assert!(value_conforms(&json!("x"), ParamType::Char));
        assert!(!value_conforms(&json!("xy"), ParamType::Char));
        assert!(value_conforms(&json!([1, 2]), ParamType::ArrayInt));
        assert!(!value_conforms(&json!([1, "a"]), ParamType::ArrayInt));
        assert!(value_conforms(&json!([]), ParamType::VectorString));
        assert!(!value_conforms(&json!(null), ParamType::Int));
    }

    #[test]
    fn test_values_equal_exact_ints_and_floats() {
        assert!(values_equal(&json!(6), &json!(6), ParamType::Int));
        assert!(!values_equal(&json!(6), &json!(7), ParamType::Int));
        assert!(values_equal(&json!(2.5), &json!(2.5), ParamType::Double));
        assert!(!values_equal(
            &json!(0.1),
            &json!(0.10000000000000002),
            ParamType::Double
        ));
    }

    #[test]
    fn test_values_equal_arrays_are_ordered() {
        assert!(values_equal(
            &json!([1, 2, 3]),
            &json!([1, 2, 3]),
            ParamType::VectorInt
        ));
        assert!(!values_equal(
            &json!([1, 2, 3]),
            &json!([3, 2, 1]),
            ParamType::VectorInt
        ));
        assert!(!values_equal(
            &json!([1, 2]),
            &json!([1, 2, 3]),
            ParamType::VectorInt
        ));
    }

    #[test]
    fn test_expected_matches_ignores_unmentioned_params() {
        let schema = ParameterSchema {
            params: vec![("a".into(), ParamType::Int), ("b".into(), ParamType::Int)],
            function_type: FunctionType::Int,
        };
        let expected = json!({"a": 6}).as_object().unwrap().clone();
        let actual = json!({"a": 6, "b": 999, "return_value": 0})
            .as_object()
            .unwrap()
            .clone();
        assert!(expected_matches(&expected, &actual, &schema));
    }

    #[test]
    fn test_expected_matches_checks_return_value() {
        let schema = ParameterSchema {
            params: vec![],
            function_type: FunctionType::Int,
        };
        let expected = json!({"return_value": 42}).as_object().unwrap().clone();
        let good = json!({"return_value": 42}).as_object().unwrap().clone();
        let bad = json!({"return_value": 41}).as_object().unwrap().clone();
        assert!(expected_matches(&expected, &good, &schema));
        assert!(!expected_matches(&expected, &bad, &schema));
    }

    #[test]
    fn test_empty_expected_always_matches() {
        let schema = ParameterSchema {
            params: vec![("a".into(), ParamType::Int)],
            function_type: FunctionType::Void,
        };
        assert!(expected_matches(
            &Map::new(),
            &json!({"a": 1}).as_object().unwrap().clone(),
            &schema
        ));
    }

    #[test]
    fn test_parse_result_document() {
        let raw = br#"{
            "status": "SUCCESS",
            "stdout": "a: 6\n",
            "stderr": "",
            "exit_code": 0,
            "compile_time_ms": 312,
            "time_ms": 4,
            "cpu_utime": 0.002,
            "cpu_stime": 0.001,
            "maxrss_mb": 1.5,
            "actual": {"a": 6, "return_value": 0},
            "expected": {"a": 6},
            "match": true
        }"#;
        let doc = parse_result(raw).unwrap();
        assert_eq!(doc.status, "SUCCESS");
        assert_eq!(doc.compile_time_ms, 312);
        assert_eq!(doc.matched, Some(true));
        assert_eq!(doc.actual.unwrap()["a"], json!(6));
    }

    #[test]
    fn test_parse_result_rejects_malformed() {
        assert!(parse_result(b"not json").is_err());
    }
}

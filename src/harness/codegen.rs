//! Test driver generation
//!
//! Synthesizes a `test_main` translation unit around the user's `solve`
//! entry point from the parameter schema: declarations in config order,
//! a prototype with the exact implied signature, the call, and one
//! `name: <literal>` result line per parameter plus `return_value`.
//!
//! C passes every parameter by pointer; C++ by reference, with
//! `std::vector`/`std::string` for the sequence types. Sequence lengths are
//! fixed at generation time from the initial values.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::codec::{SolveParam, TestConfig};
use crate::types::{FunctionType, Language, ParamType};

/// Shared quoting helper emitted into every driver; prints a JSON string
/// body with `"` and `\` escaped
const PRINT_QUOTED: &str = r#"static void print_quoted(const char *value) {
    const char *p;
    putchar('"');
    for (p = value; *p; ++p) {
        if (*p == '"' || *p == '\\') {
            putchar('\\');
        }
        putchar(*p);
    }
    putchar('"');
}"#;

/// Generate the driver source for a configuration
pub fn generate_driver(config: &TestConfig, language: Language) -> Result<String> {
    match language {
        Language::C => generate_c(config),
        Language::Cpp => generate_cpp(config),
    }
}

/// Source file name of the generated driver
pub fn driver_file(language: Language) -> &'static str {
    match language {
        Language::C => "test_main.c",
        Language::Cpp => "test_main.cpp",
    }
}

fn generate_c(config: &TestConfig) -> Result<String> {
    let mut out = String::new();
    out.push_str("#include <stdbool.h>\n");
    out.push_str("#include <stddef.h>\n");
    out.push_str("#include <stdio.h>\n\n");
    out.push_str(PRINT_QUOTED);
    out.push_str("\n\n");

    // prototype with the signature implied by the schema
    let params: Vec<String> = config
        .solve_params
        .iter()
        .map(|p| format!("{} *{}", c_element_type(p.param_type), p.name))
        .collect();
    out.push_str(&format!(
        "{} solve({});\n\n",
        c_return_type(config.function_type),
        if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        }
    ));

    out.push_str("int main(void) {\n");
    // loop counter first so the driver stays valid under c89
    if config
        .solve_params
        .iter()
        .any(|p| p.param_type.is_sequence())
    {
        out.push_str("    size_t i_;\n");
    }
    for param in &config.solve_params {
        out.push_str(&c_declaration(param)?);
    }

    // call: scalars by address, sequences decay to pointers
    let args: Vec<String> = config
        .solve_params
        .iter()
        .map(|p| {
            if p.param_type.is_sequence() || p.param_type == ParamType::String {
                p.name.clone()
            } else {
                format!("&{}", p.name)
            }
        })
        .collect();
    let call = format!("solve({})", args.join(", "));
    match config.function_type {
        FunctionType::Void => out.push_str(&format!("    {};\n", call)),
        FunctionType::String => out.push_str(&format!("    const char *ret = {};\n", call)),
        ty => out.push_str(&format!("    {} ret = {};\n", c_return_type(ty), call)),
    }

    for param in &config.solve_params {
        out.push_str(&print_statements(param, Language::C)?);
    }
    out.push_str(&return_print(config.function_type, Language::C));
    out.push_str("    return 0;\n}\n");
    Ok(out)
}

fn generate_cpp(config: &TestConfig) -> Result<String> {
    let mut out = String::new();
    out.push_str("#include <cstdio>\n");
    out.push_str("#include <string>\n");
    out.push_str("#include <vector>\n\n");
    out.push_str(PRINT_QUOTED);
    out.push_str("\n\n");

    let params: Vec<String> = config
        .solve_params
        .iter()
        .map(|p| format!("{} &{}", cpp_type(p.param_type), p.name))
        .collect();
    out.push_str(&format!(
        "{} solve({});\n\n",
        cpp_return_type(config.function_type),
        params.join(", ")
    ));

    out.push_str("int main() {\n");
    for param in &config.solve_params {
        out.push_str(&cpp_declaration(param)?);
    }

    let args: Vec<String> = config
        .solve_params
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let call = format!("solve({})", args.join(", "));
    match config.function_type {
        FunctionType::Void => out.push_str(&format!("    {};\n", call)),
        ty => out.push_str(&format!("    {} ret = {};\n", cpp_return_type(ty), call)),
    }

    for param in &config.solve_params {
        out.push_str(&print_statements(param, Language::Cpp)?);
    }
    out.push_str(&return_print(config.function_type, Language::Cpp));
    out.push_str("    return 0;\n}\n");
    Ok(out)
}

/// C element type behind the parameter pointer
fn c_element_type(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::Int | ParamType::ArrayInt => "int",
        ParamType::Float | ParamType::ArrayFloat => "float",
        ParamType::Double => "double",
        ParamType::Char | ParamType::ArrayChar | ParamType::String => "char",
        ParamType::Bool => "bool",
        // vector tags never reach C codegen; the facade rejects them
        _ => "int",
    }
}

fn c_return_type(function_type: FunctionType) -> &'static str {
    match function_type {
        FunctionType::Int => "int",
        FunctionType::Float => "float",
        FunctionType::Double => "double",
        FunctionType::Char => "char",
        FunctionType::String => "const char *",
        FunctionType::Bool => "bool",
        FunctionType::Void => "void",
    }
}

fn cpp_type(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::Int => "int",
        ParamType::Float => "float",
        ParamType::Double => "double",
        ParamType::Char => "char",
        ParamType::Bool => "bool",
        ParamType::String => "std::string",
        ParamType::ArrayInt | ParamType::VectorInt => "std::vector<int>",
        ParamType::ArrayFloat | ParamType::VectorFloat => "std::vector<float>",
        ParamType::VectorDouble => "std::vector<double>",
        ParamType::ArrayChar => "std::vector<char>",
        ParamType::VectorString => "std::vector<std::string>",
    }
}

fn cpp_return_type(function_type: FunctionType) -> &'static str {
    match function_type {
        FunctionType::String => "std::string",
        other => c_return_type(other),
    }
}

/// Minimum capacity of the C string buffer, so user code can grow the value
const C_STRING_CAPACITY: usize = 4096;

fn c_declaration(param: &SolveParam) -> Result<String> {
    let name = &param.name;
    let value = &param.input_value;
    let line = match param.param_type {
        ParamType::Int => format!("    int {} = {};\n", name, int_literal(value, name)?),
        ParamType::Float => format!("    float {} = {};\n", name, float_literal(value, name, true)?),
        ParamType::Double => {
            format!("    double {} = {};\n", name, float_literal(value, name, false)?)
        }
        ParamType::Char => format!("    char {} = {};\n", name, char_literal(value, name)?),
        ParamType::Bool => format!("    bool {} = {};\n", name, bool_literal(value, name)?),
        ParamType::String => {
            let text = value
                .as_str()
                .with_context(|| format!("parameter {} is not a string", name))?;
            let capacity = C_STRING_CAPACITY.max(text.len() + 1);
            format!(
                "    char {}[{}] = {};\n",
                name,
                capacity,
                string_literal(text)
            )
        }
        ParamType::ArrayInt => c_array(name, value, "int", |v| int_literal(v, name))?,
        ParamType::ArrayFloat => c_array(name, value, "float", |v| float_literal(v, name, true))?,
        ParamType::ArrayChar => c_array(name, value, "char", |v| char_literal(v, name))?,
        other => anyhow::bail!("parameter {} has type {:?}, unsupported in C", name, other),
    };
    Ok(line)
}

fn c_array(
    name: &str,
    value: &Value,
    element: &str,
    literal: impl Fn(&Value) -> Result<String>,
) -> Result<String> {
    let items = value
        .as_array()
        .with_context(|| format!("parameter {} is not an array", name))?;
    let literals = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
    // zero-length containers still need one storage slot in C
    let line = if literals.is_empty() {
        format!("    {} {}[1] = {{0}};\n", element, name)
    } else {
        format!(
            "    {} {}[{}] = {{{}}};\n",
            element,
            name,
            literals.len(),
            literals.join(", ")
        )
    };
    Ok(line)
}

fn cpp_declaration(param: &SolveParam) -> Result<String> {
    let name = &param.name;
    let value = &param.input_value;
    let line = match param.param_type {
        ParamType::Int => format!("    int {} = {};\n", name, int_literal(value, name)?),
        ParamType::Float => format!("    float {} = {};\n", name, float_literal(value, name, true)?),
        ParamType::Double => {
            format!("    double {} = {};\n", name, float_literal(value, name, false)?)
        }
        ParamType::Char => format!("    char {} = {};\n", name, char_literal(value, name)?),
        ParamType::Bool => format!("    bool {} = {};\n", name, bool_literal(value, name)?),
        ParamType::String => {
            let text = value
                .as_str()
                .with_context(|| format!("parameter {} is not a string", name))?;
            format!("    std::string {} = {};\n", name, string_literal(text))
        }
        ty => {
            let items = value
                .as_array()
                .with_context(|| format!("parameter {} is not an array", name))?;
            let element = ty
                .element_type()
                .with_context(|| format!("parameter {} is not a sequence", name))?;
            let literals = items
                .iter()
                .map(|v| match element {
                    ParamType::Int => int_literal(v, name),
                    ParamType::Float => float_literal(v, name, true),
                    ParamType::Double => float_literal(v, name, false),
                    ParamType::Char => char_literal(v, name),
                    ParamType::String => Ok(string_literal(v.as_str().unwrap_or_default())),
                    _ => anyhow::bail!("unsupported element type"),
                })
                .collect::<Result<Vec<_>>>()?;
            format!(
                "    {} {}{{{}}};\n",
                cpp_type(ty),
                name,
                literals.join(", ")
            )
        }
    };
    Ok(line)
}

/// Result-line statements for one parameter
fn print_statements(param: &SolveParam, language: Language) -> Result<String> {
    let name = &param.name;
    let stmt = match param.param_type {
        ParamType::Int => format!("    printf(\"{}: %d\\n\", {});\n", name, name),
        ParamType::Float => {
            format!("    printf(\"{}: %.9g\\n\", (double){});\n", name, name)
        }
        ParamType::Double => format!("    printf(\"{}: %.17g\\n\", {});\n", name, name),
        ParamType::Bool => format!(
            "    printf(\"{}: %s\\n\", {} ? \"true\" : \"false\");\n",
            name, name
        ),
        ParamType::Char => format!(
            "    {{ char tmp_[2] = {{{}, 0}}; printf(\"{}: \"); print_quoted(tmp_); putchar('\\n'); }}\n",
            name, name
        ),
        ParamType::String => match language {
            Language::C => format!(
                "    printf(\"{}: \"); print_quoted({}); putchar('\\n');\n",
                name, name
            ),
            Language::Cpp => format!(
                "    printf(\"{}: \"); print_quoted({}.c_str()); putchar('\\n');\n",
                name, name
            ),
        },
        ty => sequence_print(name, &param.input_value, ty, language)?,
    };
    Ok(stmt)
}

/// Loop printing a JSON array result line for a sequence parameter
fn sequence_print(
    name: &str,
    value: &Value,
    param_type: ParamType,
    language: Language,
) -> Result<String> {
    let element = param_type
        .element_type()
        .with_context(|| format!("parameter {} is not a sequence", name))?;

    let (header, bound, index) = match language {
        // C arrays have their length fixed at generation time
        Language::C => {
            let len = value.as_array().map(|a| a.len()).unwrap_or(0);
            ("for (i_ = 0;", len.to_string(), format!("{}[i_]", name))
        }
        Language::Cpp => (
            "for (size_t i_ = 0;",
            format!("{}.size()", name),
            format!("{}[i_]", name),
        ),
    };

    let item = match element {
        ParamType::Int => format!("printf(\"%d\", {});", index),
        ParamType::Float => format!("printf(\"%.9g\", (double){});", index),
        ParamType::Double => format!("printf(\"%.17g\", {});", index),
        ParamType::Char => format!(
            "{{ char tmp_[2] = {{{}, 0}}; print_quoted(tmp_); }}",
            index
        ),
        ParamType::String => format!("print_quoted({}.c_str());", index),
        _ => anyhow::bail!("unsupported element type for {}", name),
    };

    Ok(format!(
        "    printf(\"{}: [\");\n    {} i_ < {}; ++i_) {{ if (i_) printf(\", \"); {} }}\n    printf(\"]\\n\");\n",
        name, header, bound, item
    ))
}

fn return_print(function_type: FunctionType, language: Language) -> String {
    match function_type {
        FunctionType::Void => String::new(),
        FunctionType::Int => "    printf(\"return_value: %d\\n\", ret);\n".to_string(),
        FunctionType::Float => {
            "    printf(\"return_value: %.9g\\n\", (double)ret);\n".to_string()
        }
        FunctionType::Double => "    printf(\"return_value: %.17g\\n\", ret);\n".to_string(),
        FunctionType::Bool => {
            "    printf(\"return_value: %s\\n\", ret ? \"true\" : \"false\");\n".to_string()
        }
        FunctionType::Char => {
            "    { char tmp_[2] = {ret, 0}; printf(\"return_value: \"); print_quoted(tmp_); putchar('\\n'); }\n"
                .to_string()
        }
        FunctionType::String => match language {
            Language::C => {
                "    printf(\"return_value: \"); print_quoted(ret ? ret : \"\"); putchar('\\n');\n"
                    .to_string()
            }
            Language::Cpp => {
                "    printf(\"return_value: \"); print_quoted(ret.c_str()); putchar('\\n');\n"
                    .to_string()
            }
        },
    }
}

fn int_literal(value: &Value, name: &str) -> Result<String> {
    value
        .as_i64()
        .map(|v| v.to_string())
        .with_context(|| format!("parameter {} is not an integer", name))
}

fn float_literal(value: &Value, name: &str, single: bool) -> Result<String> {
    let v = value
        .as_f64()
        .with_context(|| format!("parameter {} is not a number", name))?;
    Ok(if single {
        format!("{:?}f", v)
    } else {
        format!("{:?}", v)
    })
}

fn bool_literal(value: &Value, name: &str) -> Result<String> {
    value
        .as_bool()
        .map(|v| if v { "true".into() } else { "false".into() })
        .with_context(|| format!("parameter {} is not a bool", name))
}

fn char_literal(value: &Value, name: &str) -> Result<String> {
    let text = value
        .as_str()
        .with_context(|| format!("parameter {} is not a char", name))?;
    let c = text
        .chars()
        .next()
        .with_context(|| format!("parameter {} is an empty char", name))?;
    if !c.is_ascii() {
        anyhow::bail!("parameter {} holds a non-ASCII char", name);
    }
    Ok(match c {
        '\'' => "'\\''".to_string(),
        '\\' => "'\\\\'".to_string(),
        '\n' => "'\\n'".to_string(),
        '\t' => "'\\t'".to_string(),
        c if (c as u32) < 0x20 => format!("'\\{:03o}'", c as u32),
        c => format!("'{}'", c),
    })
}

fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            // non-ASCII characters keep their original UTF-8 bytes
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

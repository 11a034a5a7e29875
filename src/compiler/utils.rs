//! Helpers for emitting WGSL snippets: literal formatting, identifier
//! sanitizing and implicit/explicit type conversion of expressions.

use crate::compiler::types::{Scalar, ShaderType, can_convert};
use crate::error::{CompileError, Result};
use crate::graph::Literal;

/// Format a float for WGSL. Always keeps a fractional part so the literal
/// stays an `f32` (`1.0`, never `1`).
pub fn fmt_f32(v: f32) -> String {
    let s = v.to_string();
    if s.contains('.') { s } else { format!("{s}.0") }
}

fn fmt_component(scalar: Scalar, v: f64) -> String {
    match scalar {
        Scalar::Float => fmt_f32(v as f32),
        Scalar::Int => format!("{}i", v as i32),
        Scalar::Uint => format!("{}u", v.max(0.0) as u32),
        Scalar::Bool => (v != 0.0).to_string(),
    }
}

/// WGSL literal for a constant value. Matrices list their components in
/// column-major order.
pub fn fmt_literal(literal: &Literal) -> String {
    let ty = literal.ty();
    let Some(scalar) = ty.scalar() else {
        return format!("{}()", wgsl_type(ty));
    };
    let parts: Vec<String> = literal
        .components()
        .iter()
        .map(|v| fmt_component(scalar, *v))
        .collect();
    match ty {
        ShaderType::Scalar(_) => parts.into_iter().next().unwrap_or_default(),
        _ => format!("{}({})", wgsl_type(ty), parts.join(", ")),
    }
}

/// `1` of the given component kind, used by loop updates and padding.
pub fn one_literal(scalar: Scalar) -> String {
    fmt_component(scalar, 1.0)
}

pub fn zero_literal(scalar: Scalar) -> String {
    fmt_component(scalar, 0.0)
}

/// WGSL spelling of a type. Struct types need the graph's declarations and
/// are resolved by the backend instead.
pub fn wgsl_type(ty: ShaderType) -> String {
    match ty {
        ShaderType::Void => String::new(),
        ShaderType::Scalar(s) => s.wgsl().to_string(),
        ShaderType::Vector(s, n) => vector_ctor(s, n as usize),
        ShaderType::Matrix(n) => format!("mat{n}x{n}f"),
        ShaderType::Texture2D => "texture_2d<f32>".to_string(),
        ShaderType::Struct(id) => format!("Struct{}", id.0),
        ShaderType::Array { scalar, width, len } => {
            let elem = if width == 1 {
                scalar.wgsl().to_string()
            } else {
                vector_ctor(scalar, width as usize)
            };
            format!("array<{elem}, {len}>")
        }
    }
}

pub fn vector_ctor(scalar: Scalar, n: usize) -> String {
    match scalar {
        Scalar::Float => format!("vec{n}f"),
        Scalar::Int => format!("vec{n}i"),
        Scalar::Uint => format!("vec{n}u"),
        Scalar::Bool => format!("vec{n}<bool>"),
    }
}

const RESERVED: &[&str] = &[
    "alias", "array", "bitcast", "bool", "break", "case", "const", "continue", "continuing",
    "default", "discard", "else", "enable", "f16", "f32", "false", "fn", "for", "function", "i32",
    "if", "in", "let", "loop", "mat2x2f", "mat3x3f", "mat4x4f", "out", "override", "private",
    "ptr", "return", "sampler", "select", "storage", "struct", "switch", "true", "type", "u32",
    "uniform", "var", "vec2f", "vec3f", "vec4f", "vin", "while", "workgroup",
];

/// Sanitize a string to be a valid WGSL identifier.
pub fn sanitize_wgsl_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'n');
    }
    while out.starts_with("__") {
        out.remove(0);
    }
    if out == "_" || RESERVED.contains(&out.as_str()) {
        out.push_str("_v");
    }
    out
}

/// Whether a snippet can take a postfix (`.x`, `[i]`) without parentheses.
pub fn is_atomic(snippet: &str) -> bool {
    let s = snippet.trim();
    if s.is_empty() {
        return false;
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !s.starts_with(|c: char| c.is_ascii_digit())
    {
        return true;
    }
    // f(...) or (...) where the opening paren closes at the very end
    let open = match s.find('(') {
        Some(i) => i,
        None => return is_indexed_path(s),
    };
    let head = &s[..open];
    if !head
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '<' || c == '>')
    {
        return false;
    }
    closes_at_end(s, open)
}

fn is_indexed_path(s: &str) -> bool {
    let Some(open) = s.find('[') else {
        return false;
    };
    if !s[..open]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return false;
    }
    let mut depth = 0usize;
    let mut chars = s[open..].chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !matches!(chars.peek(), None | Some('[')) {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn closes_at_end(s: &str, open: usize) -> bool {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn is_number(s: &str) -> bool {
    let s = s.strip_suffix(['i', 'u']).unwrap_or(s);
    !s.is_empty() && s.parse::<f64>().is_ok()
}

/// Parenthesize a snippet unless it is already atomic.
pub fn wrap(snippet: &str) -> String {
    if is_atomic(snippet) {
        snippet.to_string()
    } else {
        format!("({snippet})")
    }
}

/// Parenthesize a snippet used as an infix operand. Unsigned literals need no
/// parentheses here.
pub fn wrap_operand(snippet: &str) -> String {
    if is_atomic(snippet) || (is_number(snippet) && !snippet.starts_with('-')) {
        snippet.to_string()
    } else {
        format!("({snippet})")
    }
}

fn convert_scalar(snippet: &str, from: Scalar, to: Scalar) -> String {
    if from == to {
        return snippet.to_string();
    }
    match to {
        Scalar::Bool => format!("({} != {})", wrap_operand(snippet), zero_literal(from)),
        _ => format!("{}({snippet})", to.wgsl()),
    }
}

/// Implicit conversion of `snippet` from `from` to `to`. Only widening is
/// allowed; anything that would drop components or precision is an error.
pub fn convert_snippet(snippet: &str, from: ShaderType, to: ShaderType) -> Result<String> {
    if to == ShaderType::Void || can_convert(from, to) {
        return coerce_snippet(snippet, from, to);
    }
    Err(CompileError::type_resolution(format!(
        "cannot implicitly convert {from} to {to}; only widening conversions are allowed"
    )))
}

/// Explicit conversion. Besides widening this performs the narrowing the
/// compiler asks for itself (swizzle truncation, truthiness, matrix column
/// selection).
pub fn coerce_snippet(snippet: &str, from: ShaderType, to: ShaderType) -> Result<String> {
    if from == to || to == ShaderType::Void {
        return Ok(snippet.to_string());
    }
    match (from, to) {
        (ShaderType::Scalar(a), ShaderType::Scalar(b)) => Ok(convert_scalar(snippet, a, b)),
        (ShaderType::Scalar(a), ShaderType::Vector(b, n)) => {
            let s = convert_scalar(snippet, a, b);
            Ok(format!("{}({s})", vector_ctor(b, n as usize)))
        }
        (ShaderType::Vector(a, _), ShaderType::Scalar(b)) => {
            Ok(convert_scalar(&format!("{}.x", wrap(snippet)), a, b))
        }
        (ShaderType::Vector(a, n), ShaderType::Vector(b, m)) => {
            let (n, m) = (n as usize, m as usize);
            let resized = if m < n {
                format!("{}.{}", wrap(snippet), &"xyzw"[..m])
            } else if m > n {
                let pad: Vec<String> = (n..m)
                    .map(|i| {
                        if i == 3 {
                            one_literal(a)
                        } else {
                            zero_literal(a)
                        }
                    })
                    .collect();
                format!("{}({snippet}, {})", vector_ctor(a, m), pad.join(", "))
            } else {
                snippet.to_string()
            };
            if a == b {
                Ok(resized)
            } else {
                Ok(format!("{}({resized})", vector_ctor(b, m)))
            }
        }
        (ShaderType::Matrix(n), ShaderType::Matrix(m)) => {
            let base = wrap(snippet);
            let (n, m) = (n as usize, m as usize);
            let cols: Vec<String> = (0..m)
                .map(|i| {
                    if i >= n {
                        let unit: Vec<&str> =
                            (0..m).map(|j| if i == j { "1.0" } else { "0.0" }).collect();
                        format!("vec{m}f({})", unit.join(", "))
                    } else if m < n {
                        format!("{base}[{i}].{}", &"xyzw"[..m])
                    } else {
                        let zeros = vec!["0.0"; m - n].join(", ");
                        format!("vec{m}f({base}[{i}], {zeros})")
                    }
                })
                .collect();
            Ok(format!("mat{m}x{m}f({})", cols.join(", ")))
        }
        _ => Err(CompileError::type_resolution(format!(
            "cannot convert {from} to {to}"
        ))),
    }
}

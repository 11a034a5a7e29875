//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Parse and validate WGSL source code.
///
/// Uniformity analysis is skipped: sampling after a `discard` or inside a
/// data-dependent branch is accepted, as browsers and wgpu accept it with a
/// warning.
///
/// # Returns
/// The parsed naga Module on success, or an error carrying the numbered
/// source on failure.
///
/// # Example
/// ```ignore
/// let wgsl = "fn main() -> vec4f { return vec4f(1.0); }";
/// match validate_wgsl(wgsl) {
///     Ok(module) => println!("Valid WGSL"),
///     Err(e) => eprintln!("Invalid WGSL: {}", e),
/// }
/// ```
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse failed:\n{}", format_naga_error(source, &e)))?;

    let flags = naga::valid::ValidationFlags::all()
        .difference(naga::valid::ValidationFlags::CONTROL_FLOW_UNIFORMITY);
    naga::valid::Validator::new(flags, naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| anyhow!("WGSL validation failed: {e:?}\n{}", numbered(source)))?;

    Ok(module)
}

/// Validate WGSL and name what generated it.
///
/// # Arguments
/// * `source` - The WGSL source code to validate
/// * `context` - Description of what generated this WGSL (e.g., "material phong")
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{} generated invalid WGSL", context))
}

fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = String::new();
    output.push_str(&format!("  {}\n", error.emit_to_string(source)));
    output.push_str(&numbered(source));
    output
}

/// Source with line numbers for easier debugging.
fn numbered(source: &str) -> String {
    let mut output = String::from("\nGenerated WGSL:\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_wgsl() {
        let source = r#"
@vertex
fn vs_main(@location(0) position: vec3f) -> @builtin(position) vec4f {
    return vec4f(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4f {
    return vec4f(1.0, 0.0, 0.0, 1.0);
}
"#;
        assert!(validate_wgsl(source).is_ok());
    }

    #[test]
    fn test_invalid_wgsl_syntax() {
        let source = "fn invalid() -> { return vec4f(1.0); }";
        assert!(validate_wgsl(source).is_err());
    }

    #[test]
    fn test_invalid_wgsl_type_error() {
        let source = r#"
@fragment
fn fs_main() -> @location(0) vec4f {
    let x: vec4f = 1.0;
    return x;
}
"#;
        assert!(validate_wgsl(source).is_err());
    }

    #[test]
    fn test_validate_with_context() {
        let result = validate_wgsl_with_context("invalid wgsl", "test material");
        let err_msg = format!("{:#}", result.unwrap_err());
        assert!(err_msg.contains("test material"));
        assert!(err_msg.contains("   1 | invalid wgsl"));
    }
}

//! Shader type system: type names, component lengths, operator result types,
//! implicit conversions and swizzle resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Primitive component kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Bool,
    Int,
    Uint,
    Float,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::Int => "int",
            Scalar::Uint => "uint",
            Scalar::Float => "float",
        }
    }

    /// WGSL scalar type name.
    pub fn wgsl(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::Int => "i32",
            Scalar::Uint => "u32",
            Scalar::Float => "f32",
        }
    }

    fn vector_prefix(self) -> &'static str {
        match self {
            Scalar::Bool => "bvec",
            Scalar::Int => "ivec",
            Scalar::Uint => "uvec",
            Scalar::Float => "vec",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Scalar::Int | Scalar::Uint)
    }

    /// Ordering used when two operands of equal length disagree on kind.
    fn rank(self) -> u8 {
        match self {
            Scalar::Bool => 0,
            Scalar::Int => 1,
            Scalar::Uint => 2,
            Scalar::Float => 3,
        }
    }

    fn widens_to(self, to: Scalar) -> bool {
        self == to
            || matches!(
                (self, to),
                (Scalar::Bool, _) | (Scalar::Int, Scalar::Float) | (Scalar::Uint, Scalar::Float)
            )
    }
}

/// Handle of a struct declared on a [`crate::graph::NodeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub ty: ShaderType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub members: Vec<StructMember>,
}

impl StructDecl {
    pub fn member(&self, name: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Type of a node's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ShaderType {
    Void,
    Scalar(Scalar),
    /// Vector of 2..=4 components.
    Vector(Scalar, u8),
    /// Square float matrix of dimension 2..=4.
    Matrix(u8),
    Texture2D,
    Struct(StructId),
    /// Fixed-size array of scalars or vectors.
    Array { scalar: Scalar, width: u8, len: u32 },
}

impl ShaderType {
    pub const BOOL: ShaderType = ShaderType::Scalar(Scalar::Bool);
    pub const INT: ShaderType = ShaderType::Scalar(Scalar::Int);
    pub const UINT: ShaderType = ShaderType::Scalar(Scalar::Uint);
    pub const FLOAT: ShaderType = ShaderType::Scalar(Scalar::Float);
    pub const VEC2: ShaderType = ShaderType::Vector(Scalar::Float, 2);
    pub const VEC3: ShaderType = ShaderType::Vector(Scalar::Float, 3);
    pub const VEC4: ShaderType = ShaderType::Vector(Scalar::Float, 4);
    pub const MAT2: ShaderType = ShaderType::Matrix(2);
    pub const MAT3: ShaderType = ShaderType::Matrix(3);
    pub const MAT4: ShaderType = ShaderType::Matrix(4);

    /// Scalar for `len == 1`, vector otherwise.
    pub fn vector(scalar: Scalar, len: usize) -> Result<ShaderType> {
        match len {
            1 => Ok(ShaderType::Scalar(scalar)),
            2..=4 => Ok(ShaderType::Vector(scalar, len as u8)),
            _ => Err(CompileError::type_resolution(format!(
                "no {} type with {len} components",
                scalar.name()
            ))),
        }
    }

    /// Parse a type name. Accepts the graph's own names (`vec3`, `ivec2`,
    /// `mat4`, `color`, `float[4]`, ...) and WGSL spellings (`vec3f`, `f32`).
    pub fn parse(name: &str) -> Result<ShaderType> {
        let name = name.trim();
        if let Some((elem, rest)) = name.split_once('[') {
            let len: u32 = rest
                .strip_suffix(']')
                .and_then(|n| n.trim().parse().ok())
                .ok_or_else(|| unknown_type(name))?;
            return match ShaderType::parse(elem)? {
                ShaderType::Scalar(s) => Ok(ShaderType::Array {
                    scalar: s,
                    width: 1,
                    len,
                }),
                ShaderType::Vector(s, w) => Ok(ShaderType::Array {
                    scalar: s,
                    width: w,
                    len,
                }),
                _ => Err(unknown_type(name)),
            };
        }
        if let Some(id) = name.strip_prefix("struct:") {
            let id = id.parse().map_err(|_| unknown_type(name))?;
            return Ok(ShaderType::Struct(StructId(id)));
        }

        let ty = match name {
            "void" => ShaderType::Void,
            "bool" => ShaderType::BOOL,
            "int" | "i32" => ShaderType::INT,
            "uint" | "u32" => ShaderType::UINT,
            "float" | "f32" => ShaderType::FLOAT,
            "color" => ShaderType::VEC3,
            "texture" | "texture2d" | "texture_2d<f32>" => ShaderType::Texture2D,
            _ => return parse_composite(name).ok_or_else(|| unknown_type(name)),
        };
        Ok(ty)
    }

    /// Canonical type name, the inverse of [`ShaderType::parse`].
    pub fn name(self) -> String {
        match self {
            ShaderType::Void => "void".to_string(),
            ShaderType::Scalar(s) => s.name().to_string(),
            ShaderType::Vector(s, n) => format!("{}{n}", s.vector_prefix()),
            ShaderType::Matrix(n) => format!("mat{n}"),
            ShaderType::Texture2D => "texture".to_string(),
            ShaderType::Struct(id) => format!("struct:{}", id.0),
            ShaderType::Array { scalar, width, len } => {
                let elem = ShaderType::Vector(scalar, width);
                let elem = if width == 1 {
                    ShaderType::Scalar(scalar)
                } else {
                    elem
                };
                format!("{}[{len}]", elem.name())
            }
        }
    }

    /// Number of scalar components; 0 for non-numeric types.
    pub fn length(self) -> usize {
        match self {
            ShaderType::Scalar(_) => 1,
            ShaderType::Vector(_, n) => n as usize,
            ShaderType::Matrix(n) => (n as usize) * (n as usize),
            _ => 0,
        }
    }

    /// Primitive component type.
    pub fn scalar(self) -> Option<Scalar> {
        match self {
            ShaderType::Scalar(s) | ShaderType::Vector(s, _) => Some(s),
            ShaderType::Array { scalar, .. } => Some(scalar),
            ShaderType::Matrix(_) => Some(Scalar::Float),
            _ => None,
        }
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, ShaderType::Matrix(_))
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ShaderType::Scalar(_) | ShaderType::Vector(..) | ShaderType::Matrix(_)
        )
    }

    /// Scalars and vectors.
    pub fn is_vector_like(self) -> bool {
        matches!(self, ShaderType::Scalar(_) | ShaderType::Vector(..))
    }

    /// Same shape with a different component kind (scalars and vectors only).
    pub fn with_scalar(self, scalar: Scalar) -> ShaderType {
        match self {
            ShaderType::Scalar(_) => ShaderType::Scalar(scalar),
            ShaderType::Vector(_, n) => ShaderType::Vector(scalar, n),
            other => other,
        }
    }

    /// Type of `self[i]`.
    pub fn element(self) -> Option<ShaderType> {
        match self {
            ShaderType::Vector(s, _) => Some(ShaderType::Scalar(s)),
            ShaderType::Matrix(n) => Some(ShaderType::Vector(Scalar::Float, n)),
            ShaderType::Array { scalar, width, .. } => {
                Some(ShaderType::vector(scalar, width as usize).ok()?)
            }
            _ => None,
        }
    }
}

fn parse_composite(name: &str) -> Option<ShaderType> {
    // WGSL spellings: vec3f, vec2i, vec4u, vec3<bool>, mat4x4f
    if let Some(rest) = name.strip_prefix("mat") {
        let n: u8 = match rest.len() {
            1 => rest.parse().ok()?,
            _ => {
                let rest = rest.strip_suffix('f').unwrap_or(rest);
                let (c, r) = rest.split_once('x')?;
                if c != r {
                    return None;
                }
                c.parse().ok()?
            }
        };
        return (2..=4).contains(&n).then_some(ShaderType::Matrix(n));
    }
    let (scalar, rest) = if let Some(r) = name.strip_prefix("bvec") {
        (Scalar::Bool, r)
    } else if let Some(r) = name.strip_prefix("ivec") {
        (Scalar::Int, r)
    } else if let Some(r) = name.strip_prefix("uvec") {
        (Scalar::Uint, r)
    } else if let Some(r) = name.strip_prefix("vec") {
        match r.split_at_checked(1) {
            Some((n, "f")) => (Scalar::Float, n),
            Some((n, "i")) => (Scalar::Int, n),
            Some((n, "u")) => (Scalar::Uint, n),
            Some((n, "<bool>")) => (Scalar::Bool, n),
            Some((n, "")) => (Scalar::Float, n),
            _ => return None,
        }
    } else {
        return None;
    };
    let n: u8 = rest.parse().ok()?;
    (2..=4).contains(&n).then_some(ShaderType::Vector(scalar, n))
}

fn unknown_type(name: &str) -> CompileError {
    CompileError::type_resolution(format!("unknown type name '{name}'"))
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for ShaderType {
    type Error = CompileError;

    fn try_from(value: String) -> Result<Self> {
        ShaderType::parse(&value)
    }
}

impl From<ShaderType> for String {
    fn from(value: ShaderType) -> Self {
        value.name()
    }
}

/// Component length of a named type.
pub fn type_length(name: &str) -> Result<usize> {
    Ok(ShaderType::parse(name)?.length())
}

/// Primitive component type of a named type.
pub fn component_type(name: &str) -> Result<Scalar> {
    let ty = ShaderType::parse(name)?;
    ty.scalar()
        .ok_or_else(|| CompileError::type_resolution(format!("'{name}' has no component type")))
}

pub fn is_matrix(name: &str) -> Result<bool> {
    Ok(ShaderType::parse(name)?.is_matrix())
}

/// Binary operators understood by the operator node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 19] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Rem,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::Less,
        BinaryOp::LessEqual,
        BinaryOp::Greater,
        BinaryOp::GreaterEqual,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRight,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^^",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::ShiftLeft
                | BinaryOp::ShiftRight
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::ShiftLeft | BinaryOp::ShiftRight)
    }
}

/// Type both operands of a component-wise operation are formatted to: the
/// longer operand, with the higher-ranked component kind.
pub fn common_type(a: ShaderType, b: ShaderType) -> Result<ShaderType> {
    if !a.is_vector_like() || !b.is_vector_like() {
        return Err(CompileError::type_resolution(format!(
            "no common type for {a} and {b}"
        )));
    }
    let (sa, sb) = (a.scalar(), b.scalar());
    let scalar = match (sa, sb) {
        (Some(x), Some(y)) if x.rank() >= y.rank() => x,
        (_, Some(y)) => y,
        _ => Scalar::Float,
    };
    ShaderType::vector(scalar, a.length().max(b.length()))
}

/// Result type of `a op b`.
pub fn binary_result_type(op: BinaryOp, a: ShaderType, b: ShaderType) -> Result<ShaderType> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(CompileError::type_resolution(format!(
            "operator '{}' is not defined for {a} and {b}",
            op.symbol()
        )));
    }
    if op.is_comparison() || op.is_logical() {
        if a.is_matrix() || b.is_matrix() {
            return Err(CompileError::type_resolution(format!(
                "operator '{}' is not defined for matrices",
                op.symbol()
            )));
        }
        return ShaderType::vector(Scalar::Bool, a.length().max(b.length()));
    }
    if op.is_bitwise() {
        let scalar = match a.scalar() {
            Some(Scalar::Uint) => Scalar::Uint,
            Some(Scalar::Int) | Some(Scalar::Bool) => Scalar::Int,
            _ => {
                return Err(CompileError::type_resolution(format!(
                    "bitwise operator '{}' needs integer operands, got {a}",
                    op.symbol()
                )));
            }
        };
        if a.is_matrix() || b.is_matrix() {
            return Err(CompileError::type_resolution(
                "bitwise operators are not defined for matrices",
            ));
        }
        return ShaderType::vector(scalar, a.length());
    }

    if a.scalar() == Some(Scalar::Bool) || b.scalar() == Some(Scalar::Bool) {
        return Err(CompileError::type_resolution(format!(
            "arithmetic operator '{}' is not defined for booleans",
            op.symbol()
        )));
    }
    match (a, b) {
        (ShaderType::Matrix(n), ShaderType::Vector(_, m))
        | (ShaderType::Vector(_, m), ShaderType::Matrix(n)) => {
            if op != BinaryOp::Mul || n != m {
                return Err(CompileError::type_resolution(format!(
                    "cannot apply '{}' to {a} and {b}",
                    op.symbol()
                )));
            }
            Ok(ShaderType::Vector(Scalar::Float, n))
        }
        (ShaderType::Scalar(_), ShaderType::Matrix(n))
        | (ShaderType::Matrix(n), ShaderType::Scalar(_)) => Ok(ShaderType::Matrix(n)),
        (ShaderType::Matrix(n), ShaderType::Matrix(m)) => Ok(ShaderType::Matrix(n.max(m))),
        _ => common_type(a, b),
    }
}

/// Whether `from` implicitly widens to `to`.
pub fn can_convert(from: ShaderType, to: ShaderType) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (ShaderType::Scalar(a), ShaderType::Scalar(b)) => a.widens_to(b),
        (ShaderType::Scalar(a), ShaderType::Vector(b, _)) => a.widens_to(b),
        (ShaderType::Vector(a, n), ShaderType::Vector(b, m)) => m >= n && a.widens_to(b),
        (ShaderType::Matrix(n), ShaderType::Matrix(m)) => m >= n,
        _ => false,
    }
}

/// The wider of two branch types. `Void` loses to any value type; ties keep `a`.
pub fn wider(a: ShaderType, b: ShaderType) -> ShaderType {
    match (a, b) {
        (ShaderType::Void, other) | (other, ShaderType::Void) => other,
        _ if b.length() > a.length() => b,
        _ if b.length() == a.length()
            && a.is_vector_like()
            && b.is_vector_like()
            && b.scalar().map(Scalar::rank) > a.scalar().map(Scalar::rank) =>
        {
            b
        }
        _ => a,
    }
}

/// A resolved component selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Swizzle {
    /// Selection normalized to `xyzw`.
    pub components: String,
    pub ty: ShaderType,
    /// Selects every component in order; no code is needed.
    pub identity: bool,
}

const SWIZZLE_SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];

/// Resolve a selector such as `xy`, `rgb` or `st` against `source`.
pub fn resolve_swizzle(source: ShaderType, selector: &str) -> Result<Swizzle> {
    let Some(scalar) = source.scalar().filter(|_| source.is_vector_like()) else {
        return Err(CompileError::type_resolution(format!(
            "cannot swizzle {source}"
        )));
    };
    if selector.is_empty() || selector.len() > 4 {
        return Err(CompileError::type_resolution(format!(
            "invalid swizzle '{selector}'"
        )));
    }
    let set = SWIZZLE_SETS
        .iter()
        .find(|set| selector.chars().all(|c| set.contains(c)))
        .ok_or_else(|| {
            CompileError::type_resolution(format!("invalid swizzle '{selector}'"))
        })?;

    let mut components = String::with_capacity(selector.len());
    let mut identity = selector.len() == source.length();
    for (i, c) in selector.chars().enumerate() {
        let idx = set.find(c).unwrap_or(0);
        if idx >= source.length() {
            return Err(CompileError::type_resolution(format!(
                "swizzle '{selector}' reads past the end of {source}"
            )));
        }
        identity &= idx == i;
        components.push(b"xyzw"[idx] as char);
    }
    Ok(Swizzle {
        ty: ShaderType::vector(scalar, selector.len())?,
        components,
        identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_lengths() {
        assert_eq!(type_length("float").unwrap(), 1);
        assert_eq!(type_length("vec3").unwrap(), 3);
        assert_eq!(type_length("color").unwrap(), 3);
        assert_eq!(type_length("mat4").unwrap(), 16);
        assert_eq!(type_length("texture").unwrap(), 0);
        assert_eq!(component_type("ivec2").unwrap(), Scalar::Int);
        assert_eq!(component_type("mat3").unwrap(), Scalar::Float);
        assert!(is_matrix("mat3x3f").unwrap());
        assert_eq!(ShaderType::parse("vec4f").unwrap(), ShaderType::VEC4);
        assert_eq!(
            ShaderType::parse("vec2<bool>").unwrap(),
            ShaderType::Vector(Scalar::Bool, 2)
        );
        assert_eq!(
            ShaderType::parse("vec3[8]").unwrap(),
            ShaderType::Array {
                scalar: Scalar::Float,
                width: 3,
                len: 8
            }
        );
    }

    #[test]
    fn unknown_names_are_errors() {
        for name in ["vec5", "float3", "", "mat2x3f", "texture3d"] {
            let err = ShaderType::parse(name).unwrap_err();
            assert!(matches!(err, CompileError::TypeResolution { .. }), "{name}");
        }
    }

    #[test]
    fn names_round_trip() {
        for name in ["void", "bool", "uvec4", "bvec2", "mat2", "float[4]", "vec2[3]", "struct:1"] {
            assert_eq!(ShaderType::parse(name).unwrap().name(), name);
        }
    }

    #[test]
    fn operator_results() {
        use ShaderType as T;
        assert_eq!(binary_result_type(BinaryOp::Add, T::FLOAT, T::VEC3).unwrap(), T::VEC3);
        assert_eq!(binary_result_type(BinaryOp::Mul, T::MAT4, T::VEC4).unwrap(), T::VEC4);
        assert_eq!(binary_result_type(BinaryOp::Mul, T::VEC3, T::MAT3).unwrap(), T::VEC3);
        assert_eq!(binary_result_type(BinaryOp::Mul, T::FLOAT, T::MAT3).unwrap(), T::MAT3);
        assert_eq!(
            binary_result_type(BinaryOp::Less, T::VEC2, T::FLOAT).unwrap(),
            T::Vector(Scalar::Bool, 2)
        );
        assert_eq!(binary_result_type(BinaryOp::And, T::BOOL, T::BOOL).unwrap(), T::BOOL);
        assert_eq!(
            binary_result_type(BinaryOp::ShiftLeft, T::Vector(Scalar::Uint, 3), T::INT).unwrap(),
            T::Vector(Scalar::Uint, 3)
        );
        assert_eq!(binary_result_type(BinaryOp::Add, T::INT, T::FLOAT).unwrap(), T::FLOAT);
        assert!(binary_result_type(BinaryOp::Mul, T::MAT2, T::VEC4).is_err());
        assert!(binary_result_type(BinaryOp::Add, T::Texture2D, T::FLOAT).is_err());
    }

    #[test]
    fn conversions_widen_only() {
        use ShaderType as T;
        assert!(can_convert(T::FLOAT, T::VEC3));
        assert!(can_convert(T::VEC2, T::VEC4));
        assert!(can_convert(T::INT, T::FLOAT));
        assert!(can_convert(T::MAT3, T::MAT4));
        assert!(!can_convert(T::VEC4, T::VEC3));
        assert!(!can_convert(T::FLOAT, T::INT));
        assert!(!can_convert(T::VEC3, T::FLOAT));
        assert!(!can_convert(T::FLOAT, T::MAT3));
    }

    #[test]
    fn swizzles_with_aliases() {
        let s = resolve_swizzle(ShaderType::VEC4, "rgb").unwrap();
        assert_eq!(s.components, "xyz");
        assert_eq!(s.ty, ShaderType::VEC3);
        assert!(!s.identity);

        let s = resolve_swizzle(ShaderType::VEC2, "st").unwrap();
        assert!(s.identity);

        let s = resolve_swizzle(ShaderType::VEC3, "zyx").unwrap();
        assert_eq!(s.components, "zyx");
        assert!(!s.identity);

        assert!(resolve_swizzle(ShaderType::VEC2, "xyz").is_err());
        assert!(resolve_swizzle(ShaderType::VEC4, "xg").is_err());
        assert!(resolve_swizzle(ShaderType::MAT3, "x").is_err());
    }

    #[test]
    fn wider_prefers_longer_then_float() {
        assert_eq!(wider(ShaderType::FLOAT, ShaderType::VEC3), ShaderType::VEC3);
        assert_eq!(wider(ShaderType::INT, ShaderType::FLOAT), ShaderType::FLOAT);
        assert_eq!(wider(ShaderType::Void, ShaderType::VEC2), ShaderType::VEC2);
    }
}

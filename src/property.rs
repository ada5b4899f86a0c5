//! Property definitions and inferred-type widening.
//!
//! While a class schema is unlocked, every observed value may widen the
//! property type along a monotone lattice: `Integer < Real < String`, and
//! each scalar type has a list counterpart that is entered as soon as the
//! same source element occurs more than once within one feature. Once the
//! schema is locked the type is frozen.

use core::fmt;

/// Inferred (or sidecar-declared) type of a feature property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    /// Noch kein Wert analysiert.
    #[default]
    Untyped,
    String,
    Integer,
    Real,
    StringList,
    IntegerList,
    RealList,
}

impl PropertyType {
    /// Sidecar spelling of the type (the `<Type>` element of a `PropertyDefn`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untyped => "Untyped",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::StringList => "StringList",
            Self::IntegerList => "IntegerList",
            Self::RealList => "RealList",
        }
    }

    /// Parses the sidecar spelling. Unknown spellings map to `String`
    /// rather than failing the whole sidecar load.
    pub fn parse(s: &str) -> Self {
        match s {
            "Untyped" => Self::Untyped,
            "String" => Self::String,
            "Integer" => Self::Integer,
            "Real" => Self::Real,
            "StringList" => Self::StringList,
            "IntegerList" => Self::IntegerList,
            "RealList" => Self::RealList,
            _ => Self::String,
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Self::StringList | Self::IntegerList | Self::RealList)
    }

    /// Skalarer Anteil (Liste → Elementtyp).
    fn scalar(&self) -> PropertyType {
        match self {
            Self::StringList => Self::String,
            Self::IntegerList => Self::Integer,
            Self::RealList => Self::Real,
            other => *other,
        }
    }

    fn to_list(self) -> PropertyType {
        match self {
            Self::String | Self::Untyped => Self::StringList,
            Self::Integer => Self::IntegerList,
            Self::Real => Self::RealList,
            list => list,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema entry for one feature property.
///
/// `src_element` is the "|"-joined element path that identifies the source
/// inside the feature (e.g. `surface|type`); `field_name` is the unique
/// relational column name derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmlPropertyDefn {
    field_name: String,
    src_element: String,
    ptype: PropertyType,
}

impl GmlPropertyDefn {
    pub fn new(field_name: impl Into<String>, src_element: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            src_element: src_element.into(),
            ptype: PropertyType::Untyped,
        }
    }

    pub fn field_name(&self) -> &str { &self.field_name }
    pub fn src_element(&self) -> &str { &self.src_element }
    pub fn property_type(&self) -> PropertyType { self.ptype }

    /// Setzt den Typ direkt (Sidecar-Load oder ALWAYS_STRING).
    pub fn set_type(&mut self, ptype: PropertyType) { self.ptype = ptype; }

    /// Widens the inferred type from the occurrences of this property on
    /// the feature currently being completed. `values` holds every
    /// occurrence in document order; more than one occurrence promotes to
    /// the list counterpart. The widening is monotone: a type never
    /// narrows again.
    pub fn analyse_value(&mut self, values: &[String]) {
        let Some(latest) = values.last() else { return };
        let observed = classify_value(latest);
        let scalar = join_scalar(self.ptype.scalar(), observed);
        let list = self.ptype.is_list() || values.len() > 1;
        self.ptype = if list { scalar.to_list() } else { scalar };
    }
}

/// Kleinste obere Schranke im Skalar-Gitter Integer < Real < String.
fn join_scalar(a: PropertyType, b: PropertyType) -> PropertyType {
    use PropertyType::*;
    match (a, b) {
        (Untyped, x) | (x, Untyped) => x,
        (String, _) | (_, String) => String,
        (Real, _) | (_, Real) => Real,
        _ => Integer,
    }
}

/// Bestimmt den Werttyp eines einzelnen Strings.
///
/// Leere Werte zaehlen als String; ein fuehrendes Vorzeichen ist erlaubt.
/// `parse::<f64>()` allein reicht nicht, weil es auch "inf"/"NaN"
/// akzeptiert, die in GML-Attributen gewoehnliche Strings sind.
fn classify_value(value: &str) -> PropertyType {
    let v = value.trim();
    if v.is_empty() {
        return PropertyType::String;
    }
    let digits = v.strip_prefix(['+', '-']).unwrap_or(v);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return PropertyType::Integer;
    }
    let numeric_shape = digits
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if numeric_shape && v.parse::<f64>().is_ok() {
        return PropertyType::Real;
    }
    PropertyType::String
}

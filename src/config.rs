//! Reader configuration record.
//!
//! The reader core never touches the process environment; everything it
//! needs arrives through [`ReaderConfig`]. [`ReaderConfig::from_env`] is the
//! thin convenience layer that maps the documented `GML_*` variables onto
//! the record for CLI use.
//!
//! # Beispiel
//!
//! ```
//! use rgml::ReaderConfig;
//!
//! let config = ReaderConfig::default()
//!     .with_invert_axis_order_if_lat_long(true)
//!     .with_consider_epsg_as_urn(true);
//!
//! assert!(config.invert_axis_order_if_lat_long());
//! assert!(!config.fetch_all_geometries());
//! ```

/// Options controlling feature extraction and schema inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub(crate) fetch_all_geometries: bool,
    pub(crate) always_string_fields: bool,
    pub(crate) invert_axis_order_if_lat_long: bool,
    pub(crate) consider_epsg_as_urn: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            // Nur das erste Geometrie-Subtree pro Feature wird behalten.
            fetch_all_geometries: false,
            // Typ-Inferenz aktiv; ALWAYS_STRING unterdrueckt sie.
            always_string_fields: false,
            invert_axis_order_if_lat_long: false,
            consider_epsg_as_urn: false,
        }
    }
}

impl ReaderConfig {
    // --- Getter ---

    /// Accumulate every geometry sub-tree of a feature, not only the first.
    pub fn fetch_all_geometries(&self) -> bool { self.fetch_all_geometries }
    /// Suppress type inference; new properties always get type `String`.
    pub fn always_string_fields(&self) -> bool { self.always_string_fields }
    /// Swap X/Y for lat/long-ordered CRSes at extent finalization.
    pub fn invert_axis_order_if_lat_long(&self) -> bool { self.invert_axis_order_if_lat_long }
    /// Rewrite `EPSG:n` identifiers as `urn:ogc:def:crs:EPSG::n`.
    pub fn consider_epsg_as_urn(&self) -> bool { self.consider_epsg_as_urn }

    // --- Builder-Setter (Fluent API) ---

    /// Setzt fetch_all_geometries.
    pub fn with_fetch_all_geometries(mut self, val: bool) -> Self { self.fetch_all_geometries = val; self }
    /// Setzt always_string_fields.
    pub fn with_always_string_fields(mut self, val: bool) -> Self { self.always_string_fields = val; self }
    /// Setzt invert_axis_order_if_lat_long.
    pub fn with_invert_axis_order_if_lat_long(mut self, val: bool) -> Self { self.invert_axis_order_if_lat_long = val; self }
    /// Setzt consider_epsg_as_urn.
    pub fn with_consider_epsg_as_urn(mut self, val: bool) -> Self { self.consider_epsg_as_urn = val; self }

    // --- Mutable Setter ---

    /// Setzt fetch_all_geometries.
    pub fn set_fetch_all_geometries(&mut self, val: bool) { self.fetch_all_geometries = val; }
    /// Setzt always_string_fields.
    pub fn set_always_string_fields(&mut self, val: bool) { self.always_string_fields = val; }
    /// Setzt invert_axis_order_if_lat_long.
    pub fn set_invert_axis_order_if_lat_long(&mut self, val: bool) { self.invert_axis_order_if_lat_long = val; }
    /// Setzt consider_epsg_as_urn.
    pub fn set_consider_epsg_as_urn(&mut self, val: bool) { self.consider_epsg_as_urn = val; }

    /// Builds a config from the documented environment variables:
    ///
    /// | Variable | Wirkung |
    /// |---|---|
    /// | `GML_FETCH_ALL_GEOMETRIES` | boolean |
    /// | `GML_FIELDTYPES=ALWAYS_STRING` | suppress inference |
    /// | `GML_INVERT_AXIS_ORDER_IF_LAT_LONG` | boolean |
    /// | `GML_CONSIDER_EPSG_AS_URN` | boolean |
    pub fn from_env() -> Self {
        Self {
            fetch_all_geometries: env_boolean("GML_FETCH_ALL_GEOMETRIES"),
            always_string_fields: std::env::var("GML_FIELDTYPES")
                .is_ok_and(|v| v.eq_ignore_ascii_case("ALWAYS_STRING")),
            invert_axis_order_if_lat_long: env_boolean("GML_INVERT_AXIS_ORDER_IF_LAT_LONG"),
            consider_epsg_as_urn: env_boolean("GML_CONSIDER_EPSG_AS_URN"),
        }
    }
}

/// YES/TRUE/ON/1 zaehlen als wahr, alles andere als falsch.
fn env_boolean(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| {
        v.eq_ignore_ascii_case("YES")
            || v.eq_ignore_ascii_case("TRUE")
            || v.eq_ignore_ascii_case("ON")
            || v == "1"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ist_konservativ() {
        let c = ReaderConfig::default();
        assert!(!c.fetch_all_geometries());
        assert!(!c.always_string_fields());
        assert!(!c.invert_axis_order_if_lat_long());
        assert!(!c.consider_epsg_as_urn());
    }

    #[test]
    fn builder_setter_chain() {
        let c = ReaderConfig::default()
            .with_fetch_all_geometries(true)
            .with_always_string_fields(true);
        assert!(c.fetch_all_geometries());
        assert!(c.always_string_fields());
        assert!(!c.consider_epsg_as_urn());
    }

    #[test]
    fn mutable_setter() {
        let mut c = ReaderConfig::default();
        c.set_invert_axis_order_if_lat_long(true);
        assert!(c.invert_axis_order_if_lat_long());
    }
}

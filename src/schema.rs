//! Feature classes: the schema side of the reader.
//!
//! A feature class is created on the first matching feature element (while
//! the class list is unlocked) or loaded from a schema sidecar. It owns the
//! ordered property definitions and the per-class aggregates filled in by
//! the prescan pass: feature count, merged geometry type, extents and SRS.

use log::debug;

use crate::geometry::{Envelope, GEOM_UNKNOWN};
use crate::property::GmlPropertyDefn;

/// Schema entry for one feature type.
#[derive(Debug, Clone, PartialEq)]
pub struct GmlFeatureClass {
    name: String,
    element_name: String,
    properties: Vec<GmlPropertyDefn>,
    schema_locked: bool,
    /// -1 solange unbekannt, sonst die Prescan-Zaehlung.
    feature_count: i64,
    geometry_type: i32,
    extents: Option<Envelope>,
    srs_name: Option<String>,
    /// Wird falsch sobald zwei Features widersprechende srsName tragen;
    /// danach bleibt `srs_name` leer.
    srs_consistent: bool,
}

impl GmlFeatureClass {
    /// Creates a class whose name and matching element name are both
    /// `element_name` (the inference path).
    pub fn new(element_name: impl Into<String>) -> Self {
        let element_name = element_name.into();
        Self {
            name: element_name.clone(),
            element_name,
            properties: Vec::new(),
            schema_locked: false,
            feature_count: -1,
            geometry_type: GEOM_UNKNOWN,
            extents: None,
            srs_name: None,
            srs_consistent: true,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn element_name(&self) -> &str { &self.element_name }

    /// Setzt den Klassennamen (Sidecar-Load; dort darf Name ≠ ElementPath sein).
    pub fn set_name(&mut self, name: impl Into<String>) { self.name = name.into(); }
    pub fn set_element_name(&mut self, element_name: impl Into<String>) {
        self.element_name = element_name.into();
    }

    // --- Properties ---

    pub fn property_count(&self) -> usize { self.properties.len() }
    pub fn property(&self, index: usize) -> Option<&GmlPropertyDefn> {
        self.properties.get(index)
    }
    pub fn properties(&self) -> &[GmlPropertyDefn] { &self.properties }

    pub(crate) fn property_mut(&mut self, index: usize) -> Option<&mut GmlPropertyDefn> {
        self.properties.get_mut(index)
    }

    /// Index der Property mit exakt diesem `src_element`-Pfad.
    pub fn property_index_by_src(&self, src_element: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.src_element() == src_element)
    }

    /// Index der Property mit diesem Feldnamen (case-insensitiv).
    pub fn property_index_by_name(&self, field_name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.field_name().eq_ignore_ascii_case(field_name))
    }

    /// Appends a property definition. Returns the new index, or `None`
    /// when a property with the same field name already exists (the
    /// definition is dropped, as duplicate columns would be ambiguous).
    pub fn add_property(&mut self, defn: GmlPropertyDefn) -> Option<usize> {
        if self.property_index_by_name(defn.field_name()).is_some() {
            debug!(
                "duplicate property '{}' dropped on class '{}'",
                defn.field_name(),
                self.name
            );
            return None;
        }
        self.properties.push(defn);
        Some(self.properties.len() - 1)
    }

    // --- Schema lock ---

    pub fn is_schema_locked(&self) -> bool { self.schema_locked }
    pub fn set_schema_locked(&mut self, locked: bool) { self.schema_locked = locked; }

    // --- Prescan aggregates ---

    /// -1 when unknown, otherwise the number of features tallied by prescan.
    pub fn feature_count(&self) -> i64 { self.feature_count }
    pub fn set_feature_count(&mut self, count: i64) { self.feature_count = count; }

    pub fn geometry_type(&self) -> i32 { self.geometry_type }
    pub fn set_geometry_type(&mut self, code: i32) { self.geometry_type = code; }

    /// Envelope over all non-empty geometries seen so far; absent until the
    /// first one is folded in.
    pub fn extents(&self) -> Option<&Envelope> { self.extents.as_ref() }
    pub fn set_extents(&mut self, extents: Envelope) { self.extents = Some(extents); }

    /// Faltet ein Feature-Envelope in die Klassen-Extents (Vereinigung).
    pub fn merge_extents(&mut self, envelope: &Envelope) {
        match &mut self.extents {
            Some(total) => total.merge(envelope),
            None => self.extents = Some(*envelope),
        }
    }

    // --- SRS ---

    pub fn srs_name(&self) -> Option<&str> { self.srs_name.as_deref() }
    pub fn set_srs_name(&mut self, srs_name: Option<String>) { self.srs_name = srs_name; }

    /// Merges the SRS of one more feature into the class. Once two
    /// features disagree (including present vs. absent), the class SRS is
    /// cleared and stays cleared.
    pub fn merge_srs_name(&mut self, srs_name: Option<&str>) {
        if !self.srs_consistent {
            return;
        }
        match (&self.srs_name, srs_name) {
            (None, Some(incoming)) => self.srs_name = Some(incoming.to_string()),
            (None, None) => {}
            (Some(current), incoming) => {
                if incoming != Some(current.as_str()) {
                    self.srs_consistent = false;
                    self.srs_name = None;
                }
            }
        }
    }
}

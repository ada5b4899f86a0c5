//! SAX event handler: the hierarchical state machine of the reader.
//!
//! Reacts to `startElement` / `endElement` / `characters` from the
//! tokenizer driver and decides, against the top read-state frame, whether
//! an element opens a feature, starts a geometry sub-tree, carries a
//! CityGML generic attribute, is an attribute value, or is mere structure.
//! The class/feature mutations themselves live on [`ReaderCore`]; this
//! module only keeps the handler-local accumulation state between events.

use quick_xml::escape::escape;

use crate::geometry::{is_geometry_element, local_name};
use crate::reader::ReaderCore;

/// Handler-lokaler Zustand zwischen zwei SAX-Events.
#[derive(Debug, Default)]
pub(crate) struct SaxHandler {
    /// Aktive Geometrie-Akkumulation, sonst None.
    geometry: Option<GeometryAccumulator>,
    /// Zeichenpuffer des gerade offenen Attribut-Elements.
    cur_field: Option<String>,
    /// Aktives CityGML-Generic-Attribute (`stringAttribute` u.a.).
    citygml: Option<CityGmlAttr>,
}

/// Zustand innerhalb eines CityGML `stringAttribute`/`intAttribute`/
/// `doubleAttribute` Elements: der `name`-Attributwert wird zum
/// `src_element`, der Wert steht im `<value>`-Kind.
#[derive(Debug)]
struct CityGmlAttr {
    src_element: String,
    depth: usize,
}

impl SaxHandler {
    pub(crate) fn reset(&mut self) {
        self.geometry = None;
        self.cur_field = None;
        self.citygml = None;
    }

    pub(crate) fn start_element(
        &mut self,
        core: &mut ReaderCore,
        name: &str,
        attrs: &[(String, String)],
    ) {
        if let Some(geom) = &mut self.geometry {
            geom.start_element(name, attrs);
            return;
        }

        if let Some(citygml) = &mut self.citygml {
            citygml.depth += 1;
            if local_name(name) == "value" {
                self.cur_field = Some(String::new());
            }
            return;
        }

        if core.is_feature_element(name) {
            core.push_feature(name, attrs);
            return;
        }

        let has_feature = core.states.top_feature().is_some();

        if has_feature && is_geometry_element(name) {
            let mut geom = GeometryAccumulator::default();
            geom.start_element(name, attrs);
            self.geometry = Some(geom);
            return;
        }

        if has_feature
            && let Some(attr_name) = core.citygml_generic_attribute(name, attrs)
        {
            self.citygml = Some(CityGmlAttr { src_element: attr_name, depth: 0 });
            return;
        }

        if has_feature && core.is_attribute_element(name) {
            // Ein bereits offener Puffer gehoert einem Container-Element;
            // sein Text ist keine Property (nur Blaetter zaehlen).
            self.cur_field = Some(String::new());
        }

        if let Some(frame) = core.states.top_mut() {
            frame.push_segment(name);
        }
    }

    pub(crate) fn end_element(&mut self, core: &mut ReaderCore, name: &str) {
        if let Some(geom) = &mut self.geometry {
            geom.end_element(name);
            if geom.is_closed() {
                let fragment = self.geometry.take().map(GeometryAccumulator::into_fragment);
                if let Some(fragment) = fragment {
                    core.attach_geometry(fragment);
                }
            }
            return;
        }

        if let Some(citygml) = &mut self.citygml {
            if citygml.depth == 0 {
                // das Attribut-Element selbst schliesst
                self.citygml = None;
                return;
            }
            citygml.depth -= 1;
            if let Some(value) = self.cur_field.take() {
                let src_element = citygml.src_element.clone();
                core.set_feature_property(&src_element, value.trim());
            }
            return;
        }

        if let Some(value) = self.cur_field.take() {
            let path = core
                .states
                .top()
                .map(|frame| frame.path().to_string())
                .unwrap_or_default();
            core.set_feature_property(&path, value.trim());
            if let Some(frame) = core.states.top_mut() {
                frame.trim_last_segment();
            }
            return;
        }

        let closes_feature = core
            .states
            .top()
            .is_some_and(|frame| frame.feature.is_some() && frame.path_length() == 0);
        if closes_feature {
            core.complete_feature();
            return;
        }

        if let Some(frame) = core.states.top_mut() {
            frame.trim_last_segment();
        }
    }

    pub(crate) fn characters(&mut self, text: &str) {
        if let Some(geom) = &mut self.geometry {
            geom.text(text);
            return;
        }
        if let Some(field) = &mut self.cur_field {
            field.push_str(text);
        }
    }
}

// ============================================================================
// Geometry sub-tree accumulation
// ============================================================================

/// Re-serializes the events of a geometry sub-tree into a raw XML
/// fragment, parallel to the read-state path (which it never touches).
#[derive(Debug, Default)]
struct GeometryAccumulator {
    buf: String,
    depth: usize,
    closed: bool,
}

impl GeometryAccumulator {
    fn start_element(&mut self, name: &str, attrs: &[(String, String)]) {
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape(value.as_str()));
            self.buf.push('"');
        }
        self.buf.push('>');
        self.depth += 1;
    }

    fn end_element(&mut self, name: &str) {
        self.depth -= 1;
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
        if self.depth == 0 {
            self.closed = true;
        }
    }

    fn text(&mut self, text: &str) {
        self.buf.push_str(&escape(text));
    }

    fn is_closed(&self) -> bool { self.closed }

    fn into_fragment(self) -> String { self.buf }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Der Akkumulator muss den Subtree unveraendert (modulo Leerelement-
    /// Schreibweise) reproduzieren.
    #[test]
    fn akkumulator_reserialisiert_subtree() {
        let mut geom = GeometryAccumulator::default();
        geom.start_element("gml:Point", &[("srsName".into(), "EPSG:4326".into())]);
        geom.start_element("gml:pos", &[]);
        geom.text("1 2");
        geom.end_element("gml:pos");
        geom.end_element("gml:Point");

        assert!(geom.is_closed());
        assert_eq!(
            geom.into_fragment(),
            "<gml:Point srsName=\"EPSG:4326\"><gml:pos>1 2</gml:pos></gml:Point>"
        );
    }

    #[test]
    fn akkumulator_escaped_sonderzeichen() {
        let mut geom = GeometryAccumulator::default();
        geom.start_element("Point", &[("a".into(), "x<y".into())]);
        geom.text("1 & 2");
        geom.end_element("Point");
        let frag = geom.into_fragment();
        assert!(frag.contains("x&lt;y"), "{frag}");
        assert!(frag.contains("1 &amp; 2"), "{frag}");
    }

    #[test]
    fn akkumulator_erst_bei_wurzel_geschlossen() {
        let mut geom = GeometryAccumulator::default();
        geom.start_element("Polygon", &[]);
        geom.start_element("exterior", &[]);
        geom.end_element("exterior");
        assert!(!geom.is_closed());
        geom.end_element("Polygon");
        assert!(geom.is_closed());
    }
}

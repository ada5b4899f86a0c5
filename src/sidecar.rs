//! Schema sidecar: load/save the class registry as a `GMLFeatureClassList`
//! XML document (the `.gfs` format).
//!
//! Loading walks a DOM (roxmltree) because sidecars are small and the
//! structure is fixed; saving streams through a quick-xml `Writer` into a
//! temp file that is renamed over the target on success, so a crashed
//! write never leaves a torn sidecar behind.

use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::BytesText;
use roxmltree::{Document, Node};

use crate::FastHashSet;
use crate::error::{Error, Result};
use crate::geometry::{Envelope, GEOM_UNKNOWN};
use crate::property::{GmlPropertyDefn, PropertyType};
use crate::schema::GmlFeatureClass;

/// Loads every `GMLFeatureClass` from a sidecar file. Each loaded class
/// comes back schema-locked; the caller locks the class list.
pub fn load_classes(path: &Path) -> Result<Vec<GmlFeatureClass>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::open_failed(path, &e))?;
    let doc = Document::parse(&text).map_err(|e| Error::SidecarParse(e.to_string()))?;

    let root = doc.root_element();
    if root.tag_name().name() != "GMLFeatureClassList" {
        return Err(Error::NotAFeatureClassList(path.display().to_string()));
    }

    let mut classes = Vec::new();
    let mut seen: FastHashSet<String> = FastHashSet::default();
    for node in root.children().filter(Node::is_element) {
        if node.tag_name().name() == "GMLFeatureClass" {
            let class = class_from_xml(&node)?;
            if !seen.insert(class.name().to_ascii_lowercase()) {
                return Err(Error::SidecarParse(format!(
                    "duplicate GMLFeatureClass '{}'",
                    class.name()
                )));
            }
            classes.push(class);
        }
    }
    Ok(classes)
}

fn child_text(node: &Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::to_string)
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| Error::SidecarParse(format!("unparseable {what}: '{text}'")))
}

fn class_from_xml(node: &Node) -> Result<GmlFeatureClass> {
    let name = child_text(node, "Name")
        .ok_or_else(|| Error::SidecarParse("GMLFeatureClass without Name".into()))?;
    // Ohne ElementPath matcht die Klasse ueber ihren Namen.
    let element_path = child_text(node, "ElementPath").unwrap_or_else(|| name.clone());

    let mut class = GmlFeatureClass::new(element_path);
    class.set_name(name);

    if let Some(text) = child_text(node, "GeometryType") {
        class.set_geometry_type(parse_number::<i32>(&text, "GeometryType")?);
    }
    if let Some(srs) = child_text(node, "SRSName") {
        class.set_srs_name(Some(srs));
    }

    if let Some(info) = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "DatasetSpecificInfo")
    {
        if let Some(text) = child_text(&info, "FeatureCount") {
            class.set_feature_count(parse_number::<i64>(&text, "FeatureCount")?);
        }
        let corners = [
            child_text(&info, "ExtentXMin"),
            child_text(&info, "ExtentXMax"),
            child_text(&info, "ExtentYMin"),
            child_text(&info, "ExtentYMax"),
        ];
        if let [Some(x_min), Some(x_max), Some(y_min), Some(y_max)] = corners {
            class.set_extents(Envelope {
                min_x: parse_number(&x_min, "ExtentXMin")?,
                max_x: parse_number(&x_max, "ExtentXMax")?,
                min_y: parse_number(&y_min, "ExtentYMin")?,
                max_y: parse_number(&y_max, "ExtentYMax")?,
            });
        }
    }

    for prop in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "PropertyDefn")
    {
        let field_name = child_text(&prop, "Name")
            .ok_or_else(|| Error::SidecarParse("PropertyDefn without Name".into()))?;
        let src_element = child_text(&prop, "ElementPath").unwrap_or_else(|| field_name.clone());
        let mut defn = GmlPropertyDefn::new(field_name, src_element);
        if let Some(text) = child_text(&prop, "Type") {
            defn.set_type(PropertyType::parse(text.trim()));
        }
        class.add_property(defn);
    }

    class.set_schema_locked(true);
    Ok(class)
}

/// Serializes the class registry as a `GMLFeatureClassList` document and
/// writes it atomically (tmp + rename).
pub fn save_classes(classes: &[GmlFeatureClass], path: &Path) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);

    writer
        .create_element("GMLFeatureClassList")
        .write_inner_content(|w| {
            for class in classes {
                class_to_xml(w, class)?;
            }
            Ok(())
        })
        .map_err(|e| Error::IoError(e.to_string()))?;
    buf.push(b'\n');

    // Erst .tmp schreiben, bei Erfolg umbenennen.
    let tmp_path = path.with_extension("gfs.tmp");
    std::fs::write(&tmp_path, &buf).map_err(|e| Error::IoError(e.to_string()))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::IoError(e.to_string()));
    }
    Ok(())
}

fn class_to_xml<W: std::io::Write>(
    writer: &mut Writer<W>,
    class: &GmlFeatureClass,
) -> std::io::Result<()> {
    writer
        .create_element("GMLFeatureClass")
        .write_inner_content(|w| {
            text_element(w, "Name", class.name())?;
            text_element(w, "ElementPath", class.element_name())?;
            if class.geometry_type() != GEOM_UNKNOWN {
                text_element(w, "GeometryType", &class.geometry_type().to_string())?;
            }
            if let Some(srs) = class.srs_name() {
                text_element(w, "SRSName", srs)?;
            }

            if class.feature_count() >= 0 || class.extents().is_some() {
                w.create_element("DatasetSpecificInfo").write_inner_content(|w| {
                    if class.feature_count() >= 0 {
                        text_element(w, "FeatureCount", &class.feature_count().to_string())?;
                    }
                    if let Some(env) = class.extents() {
                        text_element(w, "ExtentXMin", &env.min_x.to_string())?;
                        text_element(w, "ExtentXMax", &env.max_x.to_string())?;
                        text_element(w, "ExtentYMin", &env.min_y.to_string())?;
                        text_element(w, "ExtentYMax", &env.max_y.to_string())?;
                    }
                    Ok(())
                })?;
            }

            for prop in class.properties() {
                w.create_element("PropertyDefn").write_inner_content(|w| {
                    text_element(w, "Name", prop.field_name())?;
                    text_element(w, "ElementPath", prop.src_element())?;
                    text_element(w, "Type", prop.property_type().as_str())?;
                    Ok(())
                })?;
            }
            Ok(())
        })?;
    Ok(())
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> std::io::Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

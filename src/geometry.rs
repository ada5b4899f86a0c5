//! Geometry-type codes, type merging, and fragment analysis.
//!
//! The reader itself never constructs geometry objects; it snips raw GML
//! sub-trees out of the document (see `handler`). This module provides the
//! consumed side of the geometry-builder contract: enough analysis of a
//! fragment list to answer `type()`, `is_empty()`, `envelope()` and to
//! extract the `srsName` carried on the outermost geometry element —
//! everything the prescan aggregation needs.
//!
//! Coordinate syntax covered: GML 3 `pos`/`posList`/`lowerCorner`/
//! `upperCorner` (whitespace-separated, `srsDimension`-aware) and GML 2
//! `coordinates` (comma inside a tuple, whitespace between tuples) plus
//! `coord` with `X`/`Y` children.

use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::FastHashSet;

// ============================================================================
// Geometry type codes
// ============================================================================

/// Noch keine Geometrie beobachtet oder widerspruechliche Typen.
pub const GEOM_UNKNOWN: i32 = 0;
pub const GEOM_POINT: i32 = 1;
pub const GEOM_LINESTRING: i32 = 2;
pub const GEOM_POLYGON: i32 = 3;
pub const GEOM_MULTIPOINT: i32 = 4;
pub const GEOM_MULTILINESTRING: i32 = 5;
pub const GEOM_MULTIPOLYGON: i32 = 6;
pub const GEOM_COLLECTION: i32 = 7;
/// Klasse ohne Geometrie.
pub const GEOM_NONE: i32 = 100;

/// Folds two geometry type codes into the most specific common code.
///
/// Equal codes keep themselves, `GEOM_NONE` yields to the other side,
/// anything else collapses to `GEOM_UNKNOWN`.
pub fn merge_geometry_types(main: i32, extra: i32) -> i32 {
    if main == extra {
        main
    } else if main == GEOM_NONE {
        extra
    } else if extra == GEOM_NONE {
        main
    } else {
        GEOM_UNKNOWN
    }
}

/// Human-readable spelling used by the sidecar and the CLI.
pub fn geometry_type_name(code: i32) -> &'static str {
    match code {
        GEOM_POINT => "Point",
        GEOM_LINESTRING => "LineString",
        GEOM_POLYGON => "Polygon",
        GEOM_MULTIPOINT => "MultiPoint",
        GEOM_MULTILINESTRING => "MultiLineString",
        GEOM_MULTIPOLYGON => "MultiPolygon",
        GEOM_COLLECTION => "GeometryCollection",
        GEOM_NONE => "None",
        _ => "Unknown",
    }
}

/// GML-Geometriewurzeln (GML 2 und GML 3 Vokabular).
static GEOMETRY_ELEMENTS: LazyLock<FastHashSet<&'static str>> = LazyLock::new(|| {
    [
        "Point",
        "LineString",
        "Polygon",
        "MultiPoint",
        "MultiLineString",
        "MultiPolygon",
        "MultiGeometry",
        "GeometryCollection",
        "Box",
        "Envelope",
        "Curve",
        "MultiCurve",
        "Surface",
        "MultiSurface",
        "CompositeSurface",
        "PolygonPatch",
        "Solid",
        "TopoCurve",
        "TopoSurface",
    ]
    .into_iter()
    .collect()
});

/// True when `name` (with any namespace prefix stripped) is a GML geometry
/// root at which the handler starts sub-tree accumulation.
pub(crate) fn is_geometry_element(name: &str) -> bool {
    GEOMETRY_ELEMENTS.contains(local_name(name))
}

/// Element name ohne Namespace-Prefix.
pub(crate) fn local_name(name: &str) -> &str {
    match memchr::memchr(b':', name.as_bytes()) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn type_code_for_root(local: &str) -> i32 {
    match local {
        "Point" => GEOM_POINT,
        "LineString" | "Curve" | "TopoCurve" => GEOM_LINESTRING,
        "Polygon" | "Surface" | "CompositeSurface" | "PolygonPatch" | "Box" | "Envelope"
        | "TopoSurface" => GEOM_POLYGON,
        "MultiPoint" => GEOM_MULTIPOINT,
        "MultiLineString" | "MultiCurve" => GEOM_MULTILINESTRING,
        "MultiPolygon" | "MultiSurface" => GEOM_MULTIPOLYGON,
        _ => GEOM_COLLECTION,
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Punkt-Envelope.
    pub fn of_point(x: f64, y: f64) -> Self {
        Self { min_x: x, max_x: x, min_y: y, max_y: y }
    }

    /// Erweitert das Envelope um einen Punkt (koordinatenweises min/max).
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Vereinigung zweier Envelopes.
    pub fn merge(&mut self, other: &Envelope) {
        self.expand(other.min_x, other.min_y);
        self.expand(other.max_x, other.max_y);
    }

    /// Vertauscht die X- und Y-Achse (lat/long-Korrektur).
    pub fn swapped_axes(&self) -> Envelope {
        Envelope {
            min_x: self.min_y,
            max_x: self.max_y,
            min_y: self.min_x,
            max_y: self.max_x,
        }
    }
}

// ============================================================================
// Fragment analysis (consumed geometry-builder contract)
// ============================================================================

/// Analysis result over one feature's geometry fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct GmlGeometry {
    type_code: i32,
    envelope: Option<Envelope>,
    srs_name: Option<String>,
}

impl GmlGeometry {
    /// Aggregierter Geometrietyp-Code.
    pub fn geometry_type(&self) -> i32 { self.type_code }

    /// True when no coordinate was found in any fragment.
    pub fn is_empty(&self) -> bool { self.envelope.is_none() }

    /// Bounding envelope over all parsed coordinates.
    pub fn envelope(&self) -> Option<&Envelope> { self.envelope.as_ref() }

    /// First `srsName` attribute found on a fragment root (document order).
    pub fn srs_name(&self) -> Option<&str> { self.srs_name.as_deref() }
}

/// Builds the aggregate geometry view over a feature's fragment list.
///
/// Returns `None` for an empty list. More than one fragment aggregates as
/// a collection. Unparseable fragments contribute no coordinates but do
/// not fail the analysis (broken geometry is tolerated like other
/// real-world GML noise).
pub fn build_geometry_from_fragments(fragments: &[String]) -> Option<GmlGeometry> {
    if fragments.is_empty() {
        return None;
    }

    let mut type_code: Option<i32> = None;
    let mut envelope: Option<Envelope> = None;
    let mut srs_name: Option<String> = None;

    for fragment in fragments {
        let info = analyse_fragment(fragment);
        type_code = Some(match type_code {
            None => info.type_code,
            // Mehrere Subtrees pro Feature → Sammlung.
            Some(_) => GEOM_COLLECTION,
        });
        if let Some(env) = info.envelope {
            match &mut envelope {
                Some(total) => total.merge(&env),
                None => envelope = Some(env),
            }
        }
        if srs_name.is_none() {
            srs_name = info.srs_name;
        }
    }

    Some(GmlGeometry {
        type_code: type_code.unwrap_or(GEOM_UNKNOWN),
        envelope,
        srs_name,
    })
}

/// Welche Koordinatensyntax der aktuelle Textknoten traegt.
#[derive(Clone, Copy)]
enum CoordMode {
    Inactive,
    /// `pos`/`posList`/`lowerCorner`/`upperCorner`: whitespace-separated,
    /// `dim` Werte pro Tupel.
    PosLike { dim: usize },
    /// GML 2 `coordinates`: Komma im Tupel, Whitespace zwischen Tupeln.
    Coordinates,
    /// `<X>`-Kind von `coord`.
    AxisX,
    /// `<Y>`-Kind von `coord`.
    AxisY,
}

struct FragmentInfo {
    type_code: i32,
    envelope: Option<Envelope>,
    srs_name: Option<String>,
}

fn analyse_fragment(fragment: &str) -> FragmentInfo {
    let mut reader = Reader::from_str(fragment);
    let mut info = FragmentInfo {
        type_code: GEOM_UNKNOWN,
        envelope: None,
        srs_name: None,
    };
    let mut saw_root = false;
    let mut mode = CoordMode::Inactive;
    let mut pending_x: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let raw = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let local = local_name(&raw).to_string();
                if !saw_root {
                    saw_root = true;
                    info.type_code = type_code_for_root(&local);
                }

                let mut dim = 2usize;
                for attr in e.attributes().with_checks(false).flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    match local_name(&key) {
                        "srsName" if info.srs_name.is_none() => {
                            if let Ok(v) = attr.unescape_value() {
                                info.srs_name = Some(v.into_owned());
                            }
                        }
                        "srsDimension" => {
                            if let Ok(v) = attr.unescape_value()
                                && let Ok(d) = v.trim().parse::<usize>()
                                && d >= 2
                            {
                                dim = d;
                            }
                        }
                        _ => {}
                    }
                }

                mode = match local.as_str() {
                    "pos" | "posList" | "lowerCorner" | "upperCorner" => {
                        CoordMode::PosLike { dim }
                    }
                    "coordinates" => CoordMode::Coordinates,
                    "X" => CoordMode::AxisX,
                    "Y" => CoordMode::AxisY,
                    _ => CoordMode::Inactive,
                };
            }
            Ok(Event::Text(t)) => {
                // Koordinaten enthalten keine Entities — Rohbytes reichen.
                let text = String::from_utf8_lossy(t.as_ref());
                match mode {
                    CoordMode::PosLike { dim } => {
                        let values: Vec<f64> = text
                            .split_ascii_whitespace()
                            .filter_map(|tok| tok.parse::<f64>().ok())
                            .collect();
                        for tuple in values.chunks(dim) {
                            if let [x, y, ..] = tuple {
                                expand(&mut info.envelope, *x, *y);
                            }
                        }
                    }
                    CoordMode::Coordinates => {
                        for tuple in text.split_ascii_whitespace() {
                            let mut axes = tuple.split(',');
                            if let (Some(xs), Some(ys)) = (axes.next(), axes.next())
                                && let (Ok(x), Ok(y)) = (xs.parse::<f64>(), ys.parse::<f64>())
                            {
                                expand(&mut info.envelope, x, y);
                            }
                        }
                    }
                    CoordMode::AxisX => {
                        pending_x = text.trim().parse::<f64>().ok();
                    }
                    CoordMode::AxisY => {
                        if let (Some(x), Ok(y)) = (pending_x.take(), text.trim().parse::<f64>()) {
                            expand(&mut info.envelope, x, y);
                        }
                    }
                    CoordMode::Inactive => {}
                }
            }
            Ok(Event::End(_)) => mode = CoordMode::Inactive,
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    info
}

fn expand(envelope: &mut Option<Envelope>, x: f64, y: f64) {
    match envelope {
        Some(env) => env.expand(x, y),
        None => *envelope = Some(Envelope::of_point(x, y)),
    }
}

//! rgml – streaming GML reader: features + inferred schema
//!
//! # Beispiel
//!
//! ```
//! use rgml::{GmlReader, ReaderConfig};
//!
//! let xml = r#"<root><featureMember>
//!     <City><name>Aachen</name></City>
//! </featureMember></root>"#;
//!
//! let mut reader = GmlReader::new(ReaderConfig::default());
//! reader.set_source_buffer(xml);
//!
//! let feature = reader.next_feature().unwrap().unwrap();
//! let class = reader.class(feature.class_index()).unwrap();
//! assert_eq!(class.name(), "City");
//! assert_eq!(class.property(0).unwrap().field_name(), "name");
//! assert_eq!(feature.value(0), Some("Aachen"));
//! ```

pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
mod handler;
pub mod property;
pub mod reader;
pub mod schema;
pub mod sidecar;
pub mod srs;
mod state;

pub use error::{Error, Result};

/// HashSet mit ahash (schneller, nicht DoS-resistent — für interne Datenstrukturen).
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

// Public API: Reader
pub use config::ReaderConfig;
pub use reader::GmlReader;

// Public API: Datenmodell
pub use feature::GmlFeature;
pub use property::{GmlPropertyDefn, PropertyType};
pub use schema::GmlFeatureClass;

// Public API: Geometrie-Analyse
pub use geometry::{
    Envelope, GEOM_COLLECTION, GEOM_LINESTRING, GEOM_MULTILINESTRING, GEOM_MULTIPOINT,
    GEOM_MULTIPOLYGON, GEOM_NONE, GEOM_POINT, GEOM_POLYGON, GEOM_UNKNOWN, GmlGeometry,
    build_geometry_from_fragments, geometry_type_name, merge_geometry_types,
};

// Public API: SRS-Utilities
pub use srs::{is_srs_lat_long_order, normalize_srs_name, strip_axis_order_hint};

// Public API: Sidecar
pub use sidecar::{load_classes, save_classes};

//! Reader engine: owns the tokenizer driver, the class registry, the
//! read-state stack and the pending-feature queue, and bridges the
//! push-style SAX events into the pull-style [`GmlReader::next_feature`].
//!
//! Der Treiber liest gepuffert (8 KiB) aus der Quelle und dispatcht
//! Events bis mindestens ein Feature in der Queue liegt — so hat jeder
//! `next_feature`-Aufruf begrenzte Latenz. Features werden in der
//! Reihenfolge ihrer schliessenden Tags emittiert.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;
use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};

use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::feature::GmlFeature;
use crate::geometry::{
    GEOM_NONE, GEOM_UNKNOWN, build_geometry_from_fragments, local_name, merge_geometry_types,
};
use crate::handler::SaxHandler;
use crate::property::{GmlPropertyDefn, PropertyType};
use crate::schema::GmlFeatureClass;
use crate::sidecar;
use crate::srs::{is_srs_lat_long_order, normalize_srs_name, strip_axis_order_hint};
use crate::state::ReadStateStack;

/// Lesepuffergroesse des Datei-Treibers.
const READ_BUFFER_BYTES: usize = 8 * 1024;

// ============================================================================
// ReaderCore: shared mutable state between engine and SAX handler
// ============================================================================

/// Everything the SAX decision trees mutate: registry, read-state stack,
/// pending queue, filter and configuration.
pub(crate) struct ReaderCore {
    pub(crate) config: ReaderConfig,
    pub(crate) classes: Vec<GmlFeatureClass>,
    pub(crate) class_list_locked: bool,
    pub(crate) filtered_class_name: Option<String>,
    pub(crate) pending: VecDeque<GmlFeature>,
    pub(crate) states: ReadStateStack,
}

impl ReaderCore {
    fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            class_list_locked: false,
            filtered_class_name: None,
            pending: VecDeque::new(),
            states: ReadStateStack::default(),
        }
    }

    /// Based on context and the element name: does this element open a new
    /// feature? The containment patterns cover standard GML feature
    /// collections plus the containers seen in the wild (OpenLS geocoding
    /// and routing, MapServer WMS GetFeatureInfo, Polish TBD GML).
    pub(crate) fn is_feature_element(&self, element: &str) -> bool {
        let Some(state) = self.states.top() else { return false };
        let last = state.last_component();

        let container = if last == "dane" {
            // Polish TBD GML
            true
        } else if last == "GeocodeResponseList" && element == "GeocodedAddress" {
            true
        } else if last == "DetermineRouteResponse" {
            // Die Kinder von RouteInstructionsList sollen einzelne Features
            // werden, nicht die Liste selbst.
            if element == "RouteInstructionsList" {
                return false;
            }
            true
        } else if element == "RouteInstruction" && last == "RouteInstructionsList" {
            true
        } else if last.ends_with("_layer") && element.ends_with("_feature") {
            // GML-Antwort eines MapServer WMS GetFeatureInfo Requests
            true
        } else {
            ends_with_ci(last, "member") || ends_with_ci(last, "members")
        };
        if !container {
            return false;
        }

        // Bei ungesperrter Klassenliste reicht der Container-Kontext.
        if !self.class_list_locked {
            return true;
        }
        self.classes
            .iter()
            .any(|c| c.element_name().eq_ignore_ascii_case(element))
    }

    /// Creates a feature for the named element (creating the class first if
    /// the registry does not know it yet), extracts the feature id, and
    /// pushes a fresh read-state frame that owns the feature.
    pub(crate) fn push_feature(&mut self, element: &str, attrs: &[(String, String)]) {
        let class_index = match self
            .classes
            .iter()
            .position(|c| c.element_name().eq_ignore_ascii_case(element))
        {
            Some(i) => i,
            None => {
                debug_assert!(!self.class_list_locked);
                self.classes.push(GmlFeatureClass::new(element));
                self.classes.len() - 1
            }
        };

        let mut feature = GmlFeature::new(class_index);
        // fid (GML 2) hat Vorrang vor gml:id (GML 3).
        if let Some(fid) = attr_value(attrs, "fid").or_else(|| attr_value(attrs, "gml:id")) {
            feature.set_fid(fid);
        }
        self.states.push(Some(feature));
    }

    /// CityGML generics: `stringAttribute`/`intAttribute`/`doubleAttribute`
    /// with a `name` attribute act as a property whose source element is
    /// that name. Returns the name, or `None` when the element is no such
    /// attribute (or the locked schema does not know it).
    pub(crate) fn citygml_generic_attribute(
        &self,
        element: &str,
        attrs: &[(String, String)],
    ) -> Option<String> {
        if !matches!(
            local_name(element),
            "stringAttribute" | "intAttribute" | "doubleAttribute"
        ) {
            return None;
        }
        let feature = self.states.top_feature()?;
        let name = attr_value(attrs, "name")?;

        let class = &self.classes[feature.class_index()];
        if !class.is_schema_locked() || class.property_index_by_src(&name).is_some() {
            Some(name)
        } else {
            None
        }
    }

    /// While the schema is unlocked any element under a feature is a
    /// candidate attribute; locked schemas match the "|"-joined path
    /// against the known property source elements.
    pub(crate) fn is_attribute_element(&self, element: &str) -> bool {
        let Some(feature) = self.states.top_feature() else {
            return false;
        };
        let class = &self.classes[feature.class_index()];
        if !class.is_schema_locked() {
            return true;
        }

        let state = self.states.top().expect("feature implies frame");
        let path = if state.path_length() == 0 {
            element.to_string()
        } else {
            format!("{}|{}", state.path(), element)
        };
        class.property_index_by_src(&path).is_some()
    }

    /// Installs a property value on the current feature, appending the
    /// property to the class first when the schema still allows it.
    pub(crate) fn set_feature_property(&mut self, src_element: &str, value: &str) {
        let Some(feature) = self.states.top_feature_mut() else {
            return;
        };
        let Some(class) = self.classes.get_mut(feature.class_index()) else {
            return;
        };

        let index = match class.property_index_by_src(src_element) {
            Some(i) => i,
            None => {
                if class.is_schema_locked() {
                    debug!("property '{src_element}' missing from locked schema, dropped");
                    return;
                }

                // Standard-Feldname: letztes Pfadsegment; bei Kollision der
                // volle Pfad; danach '_' anhaengen bis eindeutig.
                let mut field_name = match src_element.rsplit_once('|') {
                    Some((_, tail)) => tail.to_string(),
                    None => src_element.to_string(),
                };
                if field_name != src_element
                    && class.property_index_by_name(&field_name).is_some()
                {
                    field_name = src_element.to_string();
                }
                while class.property_index_by_name(&field_name).is_some() {
                    field_name.push('_');
                }

                let mut defn = GmlPropertyDefn::new(field_name, src_element);
                if self.config.always_string_fields {
                    defn.set_type(PropertyType::String);
                }
                match class.add_property(defn) {
                    Some(i) => i,
                    None => return,
                }
            }
        };

        feature.set_property(index, value);

        if !class.is_schema_locked()
            && !self.config.always_string_fields
            && let Some(defn) = class.property_mut(index)
        {
            defn.analyse_value(feature.values(index));
        }
    }

    /// Attaches a completed geometry sub-tree to the current feature.
    /// Without `fetch_all_geometries` only the first sub-tree survives.
    pub(crate) fn attach_geometry(&mut self, fragment: String) {
        let fetch_all = self.config.fetch_all_geometries;
        let Some(feature) = self.states.top_feature_mut() else {
            // Geometrie ausserhalb eines Features (z.B. boundedBy der
            // Collection) — verwerfen.
            return;
        };
        if !fetch_all && !feature.geometry_fragments().is_empty() {
            return;
        }
        feature.add_geometry(fragment);
    }

    /// Closes the topmost feature: pops its frame and hands the feature to
    /// the pending queue (or drops it when a class filter is active and
    /// does not match).
    pub(crate) fn complete_feature(&mut self) {
        let Some(frame) = self.states.pop() else { return };
        let Some(feature) = frame.feature else { return };

        if let Some(filter) = &self.filtered_class_name
            && self.classes[feature.class_index()].name() != filter.as_str()
        {
            return;
        }
        self.pending.push_back(feature);
    }
}

/// Case-insensitiver Suffix-Test.
fn ends_with_ci(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

fn attr_value(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

// ============================================================================
// Event sources and driver
// ============================================================================

/// Abstraction over the tokenizer backends: buffered file reading and
/// in-memory buffers share one driver loop.
trait EventSource {
    fn read_event<'b>(
        &mut self,
        buf: &'b mut Vec<u8>,
    ) -> std::result::Result<Event<'b>, quick_xml::Error>;
    /// Byte-Offset des Tokenizers in der Quelle.
    fn position(&self) -> u64;
    /// Zeile/Spalte (1-basiert) zum Byte-Offset. Nur im Fehlerpfad benutzt;
    /// darf die Quelle erneut lesen.
    fn line_col(&self, offset: u64) -> (u64, u64);
}

struct FileSource {
    reader: Reader<BufReader<File>>,
    path: PathBuf,
}

impl FileSource {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::open_failed(path, &e))?;
        let buffered = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        let mut reader = Reader::from_reader(buffered);
        reader.config_mut().trim_text(false);
        Ok(Self { reader, path: path.to_path_buf() })
    }
}

impl EventSource for FileSource {
    fn read_event<'b>(
        &mut self,
        buf: &'b mut Vec<u8>,
    ) -> std::result::Result<Event<'b>, quick_xml::Error> {
        self.reader.read_event_into(buf)
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position()
    }

    fn line_col(&self, offset: u64) -> (u64, u64) {
        let Ok(file) = File::open(&self.path) else {
            return (1, offset + 1);
        };
        let mut prefix = Vec::with_capacity(offset as usize);
        let took = file.take(offset).read_to_end(&mut prefix);
        if took.is_err() {
            return (1, offset + 1);
        }
        line_col_of_prefix(&prefix)
    }
}

struct BufferSource {
    reader: Reader<Cursor<Vec<u8>>>,
}

impl BufferSource {
    fn new(data: Vec<u8>) -> Self {
        let mut reader = Reader::from_reader(Cursor::new(data));
        reader.config_mut().trim_text(false);
        Self { reader }
    }
}

impl EventSource for BufferSource {
    fn read_event<'b>(
        &mut self,
        buf: &'b mut Vec<u8>,
    ) -> std::result::Result<Event<'b>, quick_xml::Error> {
        self.reader.read_event_into(buf)
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position()
    }

    fn line_col(&self, offset: u64) -> (u64, u64) {
        let data = self.reader.get_ref().get_ref();
        let end = (offset as usize).min(data.len());
        line_col_of_prefix(&data[..end])
    }
}

/// Zeile/Spalte des Bytes direkt hinter `prefix` (beides 1-basiert).
fn line_col_of_prefix(prefix: &[u8]) -> (u64, u64) {
    let line = 1 + memchr::memchr_iter(b'\n', prefix).count() as u64;
    let line_start = memchr::memrchr(b'\n', prefix).map_or(0, |p| p + 1);
    (line, (prefix.len() - line_start) as u64 + 1)
}

/// Treiberschleife ueber einer Event-Quelle.
struct EventDriver {
    source: Box<dyn EventSource>,
    buf: Vec<u8>,
    eof: bool,
}

impl EventDriver {
    fn new(source: Box<dyn EventSource>) -> Self {
        Self { source, buf: Vec::new(), eof: false }
    }

    /// Dispatches tokenizer events into the handler until at least one
    /// feature sits in the pending queue or the document ends.
    fn dispatch(&mut self, core: &mut ReaderCore, handler: &mut SaxHandler) -> Result<()> {
        while core.pending.is_empty() && !self.eof {
            self.buf.clear();
            let step = match self.source.read_event(&mut self.buf) {
                Ok(Event::Start(e)) => match decode_start(&e) {
                    Ok((name, attrs)) => {
                        handler.start_element(core, &name, &attrs);
                        Ok(())
                    }
                    Err(message) => Err(message),
                },
                Ok(Event::Empty(e)) => match decode_start(&e) {
                    Ok((name, attrs)) => {
                        handler.start_element(core, &name, &attrs);
                        handler.end_element(core, &name);
                        Ok(())
                    }
                    Err(message) => Err(message),
                },
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    handler.end_element(core, &name);
                    Ok(())
                }
                Ok(Event::Text(t)) => {
                    let raw = String::from_utf8_lossy(t.as_ref()).into_owned();
                    match unescape(&raw) {
                        Ok(text) => {
                            handler.characters(&text);
                            Ok(())
                        }
                        Err(e) => Err(e.to_string()),
                    }
                }
                Ok(Event::CData(t)) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    handler.characters(&text);
                    Ok(())
                }
                Ok(Event::GeneralRef(e)) => {
                    // Zeichenreferenzen und vordefinierte Entities werden
                    // aufgeloest; unbekannte Entities still toleriert.
                    let name = String::from_utf8_lossy(e.as_ref()).into_owned();
                    if let Some(ch) = resolve_char_reference(&name) {
                        handler.characters(&ch.to_string());
                    } else if let Some(text) = resolve_predefined_entity(&name) {
                        handler.characters(text);
                    }
                    Ok(())
                }
                Ok(Event::Eof) => {
                    self.eof = true;
                    Ok(())
                }
                // Decl, Comment, PI, DocType tragen keine Feature-Information.
                Ok(_) => Ok(()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(message) = step {
                return Err(self.parse_error(message));
            }
        }
        Ok(())
    }

    fn parse_error(&self, message: String) -> Error {
        let offset = self.source.position();
        let (line, column) = self.source.line_col(offset);
        Error::XmlParse { message, line, column }
    }
}

/// Zerlegt ein Start-Element in Namen und (entschaerfte) Attribute.
fn decode_start(e: &BytesStart<'_>) -> std::result::Result<(String, Vec<(String, String)>), String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|er| er.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|er| er.to_string())?
            .into_owned();
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

/// `#49` (dezimal) oder `#x31` (hexadezimal), ohne `&` und `;`.
fn resolve_char_reference(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code_point = if let Some(hex) = digits.strip_prefix('x') {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code_point)
}

// ============================================================================
// GmlReader: the public pull interface
// ============================================================================

enum SourceKind {
    File(PathBuf),
    Buffer(Vec<u8>),
}

/// Streaming GML reader with pull-style feature access.
///
/// One instance is one logical parse cursor; it is not shareable across
/// threads. Separate documents want separate readers.
pub struct GmlReader {
    core: ReaderCore,
    handler: SaxHandler,
    driver: Option<EventDriver>,
    source: Option<SourceKind>,
    read_started: bool,
    stop_parsing: bool,
    global_srs_name: Option<String>,
    can_use_global_srs: bool,
}

impl GmlReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            core: ReaderCore::new(config),
            handler: SaxHandler::default(),
            driver: None,
            source: None,
            read_started: false,
            stop_parsing: false,
            global_srs_name: None,
            can_use_global_srs: false,
        }
    }

    // --- Source ---

    /// Stores the source path. The file is opened lazily when parsing
    /// begins.
    pub fn set_source(&mut self, path: impl Into<PathBuf>) {
        self.source = Some(SourceKind::File(path.into()));
    }

    /// In-memory source (tests, network payloads).
    pub fn set_source_buffer(&mut self, data: impl Into<Vec<u8>>) {
        self.source = Some(SourceKind::Buffer(data.into()));
    }

    /// Der konfigurierte Quellpfad, falls die Quelle eine Datei ist.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            Some(SourceKind::File(p)) => Some(p),
            _ => None,
        }
    }

    // --- Class registry ---

    pub fn class_count(&self) -> usize {
        self.core.classes.len()
    }

    pub fn class(&self, index: usize) -> Option<&GmlFeatureClass> {
        self.core.classes.get(index)
    }

    /// Lineare, case-insensitive Suche ueber die Registry.
    pub fn class_by_name(&self, name: &str) -> Option<&GmlFeatureClass> {
        self.core
            .classes
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Registers a class and returns its stable index. Registering a name
    /// twice is a programmer error.
    pub fn add_class(&mut self, class: GmlFeatureClass) -> usize {
        debug_assert!(
            self.class_by_name(class.name()).is_none(),
            "duplicate feature class '{}'",
            class.name()
        );
        self.core.classes.push(class);
        self.core.classes.len() - 1
    }

    pub fn clear_classes(&mut self) {
        self.core.classes.clear();
    }

    pub fn is_class_list_locked(&self) -> bool {
        self.core.class_list_locked
    }

    /// While locked, only elements matching a registered class are
    /// recognized as features.
    pub fn set_class_list_locked(&mut self, locked: bool) {
        self.core.class_list_locked = locked;
    }

    // --- Filter / SRS ---

    /// Only features of this class are surfaced; `None` clears the filter.
    pub fn set_filtered_class_name(&mut self, name: Option<&str>) {
        self.core.filtered_class_name = name.map(str::to_string);
    }

    pub fn filtered_class_name(&self) -> Option<&str> {
        self.core.filtered_class_name.as_deref()
    }

    /// Sets the document-global SRS. The first value wins; `EPSG:n` is
    /// rewritten to the URN form when the EPSG-as-URN policy is on.
    pub fn set_global_srs_name(&mut self, name: &str) {
        if self.global_srs_name.is_none() {
            self.global_srs_name =
                Some(normalize_srs_name(name, self.core.config.consider_epsg_as_urn));
        }
    }

    pub fn global_srs_name(&self) -> Option<&str> {
        self.global_srs_name.as_deref()
    }

    // --- Parsing ---

    /// Pulls the next feature in document order (order of closing tags).
    ///
    /// Returns `Ok(None)` at end of document — and, sticky, after any
    /// tokenizer error (which is returned exactly once). `reset_reading`
    /// is the only supported restart.
    pub fn next_feature(&mut self) -> Result<Option<GmlFeature>> {
        if self.stop_parsing {
            return Ok(None);
        }
        if !self.read_started {
            self.setup_parser()?;
            self.read_started = true;
        }

        loop {
            if let Some(feature) = self.core.pending.pop_front() {
                return Ok(Some(feature));
            }
            let Some(driver) = self.driver.as_mut() else {
                return Ok(None);
            };
            if driver.eof {
                return Ok(None);
            }
            if let Err(e) = driver.dispatch(&mut self.core, &mut self.handler) {
                self.stop_parsing = true;
                return Err(e);
            }
        }
    }

    /// Rewinds to the start of the source and clears the class filter.
    /// Also clears the sticky stop flag set by a tokenizer error.
    pub fn reset_reading(&mut self) {
        self.cleanup_parser();
        self.core.filtered_class_name = None;
        self.stop_parsing = false;
    }

    /// Opens the source, attaches the handler and pushes the empty initial
    /// read-state frame.
    fn setup_parser(&mut self) -> Result<()> {
        self.cleanup_parser();
        debug_assert_eq!(self.core.states.depth(), 0);
        let source: Box<dyn EventSource> = match &self.source {
            Some(SourceKind::File(path)) => Box::new(FileSource::open(path)?),
            Some(SourceKind::Buffer(data)) => Box::new(BufferSource::new(data.clone())),
            None => {
                return Err(Error::OpenFailed {
                    path: String::new(),
                    message: "no source configured".into(),
                });
            }
        };
        self.driver = Some(EventDriver::new(source));
        self.handler.reset();
        self.core.states.push(None);
        Ok(())
    }

    /// Pops all frames, destroys queued features and releases the
    /// tokenizer. Idempotent.
    fn cleanup_parser(&mut self) {
        self.core.states.clear();
        self.core.pending.clear();
        self.handler.reset();
        self.driver = None;
        self.read_started = false;
    }

    // --- Prescan (schema inference pass) ---

    /// Drives the document to EOF, aggregating per-class feature counts
    /// and — with `get_extents` — geometry types, SRS and envelopes.
    /// Returns whether any class was found.
    pub fn prescan_for_schema(&mut self, get_extents: bool) -> Result<bool> {
        if self.source.is_none() {
            return Ok(false);
        }

        self.set_class_list_locked(false);
        self.clear_classes();
        self.cleanup_parser();
        self.stop_parsing = false;
        self.can_use_global_srs = true;

        loop {
            let feature = match self.next_feature() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    self.cleanup_parser();
                    return Err(e);
                }
            };

            let consider_epsg_as_urn = self.core.config.consider_epsg_as_urn;
            let class = &mut self.core.classes[feature.class_index()];
            class.set_feature_count(class.feature_count().max(0) + 1);

            if !get_extents {
                continue;
            }
            let Some(geometry) = build_geometry_from_fragments(feature.geometry_fragments())
            else {
                continue;
            };

            let srs_name = geometry
                .srs_name()
                .map(|s| normalize_srs_name(s, consider_epsg_as_urn));
            if srs_name.is_some() {
                // Sobald ein Feature seinen eigenen srsName traegt, ist der
                // globale SRS-Shortcut nicht mehr verlaesslich.
                self.can_use_global_srs = false;
            }
            let class = &mut self.core.classes[feature.class_index()];
            class.merge_srs_name(srs_name.as_deref());

            let mut merged = class.geometry_type();
            if class.feature_count() == 1 && merged == GEOM_UNKNOWN {
                merged = GEOM_NONE;
            }
            class.set_geometry_type(merge_geometry_types(merged, geometry.geometry_type()));

            if !geometry.is_empty()
                && let Some(envelope) = geometry.envelope()
            {
                class.merge_extents(envelope);
            }
        }

        self.finalize_extents();
        self.cleanup_parser();
        Ok(self.class_count() > 0)
    }

    /// Extent-Fixup nach dem Prescan: fuer lat/long-geordnete SRS werden
    /// die Achsen getauscht und der Achsen-Hinweis aus dem Namen entfernt.
    fn finalize_extents(&mut self) {
        if !self.core.config.invert_axis_order_if_lat_long {
            return;
        }
        for class in &mut self.core.classes {
            let srs_name = if self.can_use_global_srs {
                self.global_srs_name.clone()
            } else {
                class.srs_name().map(str::to_string)
            };
            if !is_srs_lat_long_order(srs_name.as_deref()) {
                continue;
            }
            let srs_name = srs_name.expect("lat/long order implies a name");
            class.set_srs_name(Some(strip_axis_order_hint(&srs_name)));
            // Die Extents wurden vor Kenntnis des SRS berechnet; bei
            // globalem SRS sind sie noch in Dokument-(lat/long)-Ordnung.
            if self.can_use_global_srs
                && let Some(envelope) = class.extents().copied()
            {
                class.set_extents(envelope.swapped_axes());
            }
        }
    }

    // --- Schema sidecar ---

    /// Loads a `GMLFeatureClassList` sidecar, locks every loaded class and
    /// the class list.
    pub fn load_classes(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let classes = sidecar::load_classes(path.as_ref())?;
        for class in classes {
            debug_assert!(
                self.class_by_name(class.name()).is_none(),
                "duplicate feature class '{}' in sidecar",
                class.name()
            );
            self.core.classes.push(class);
        }
        self.set_class_list_locked(true);
        Ok(())
    }

    /// Serializes the class registry as a sidecar file (atomic write).
    pub fn save_classes(&self, path: impl AsRef<Path>) -> Result<()> {
        sidecar::save_classes(&self.core.classes, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(xml: &str) -> GmlReader {
        let mut reader = GmlReader::new(ReaderConfig::default());
        reader.set_source_buffer(xml);
        reader
    }

    fn drain(reader: &mut GmlReader) -> Vec<GmlFeature> {
        let mut out = Vec::new();
        while let Some(f) = reader.next_feature().unwrap() {
            out.push(f);
        }
        out
    }

    #[test]
    fn einzelnes_feature_mit_inferenz() {
        let xml = "<root><featureMember><Point_fc><name>a</name>\
                   <geometryProperty><Point><pos>1 2</pos></Point></geometryProperty>\
                   </Point_fc></featureMember></root>";
        let mut reader = reader_over(xml);

        let feature = reader.next_feature().unwrap().unwrap();
        assert_eq!(reader.class_count(), 1);
        let class = reader.class(feature.class_index()).unwrap();
        assert_eq!(class.name(), "Point_fc");
        assert_eq!(class.property_count(), 1);
        assert_eq!(class.property(0).unwrap().field_name(), "name");
        assert_eq!(
            class.property(0).unwrap().property_type(),
            PropertyType::String
        );
        assert_eq!(feature.value(0), Some("a"));
        assert_eq!(feature.geometry_fragments().len(), 1);
        assert!(feature.geometry_fragments()[0].contains("<pos>1 2</pos>"));

        assert!(reader.next_feature().unwrap().is_none());
    }

    #[test]
    fn pfadbasierte_attribute() {
        let xml = "<root><featureMember><Road>\
                   <surface><type>asphalt</type></surface>\
                   </Road></featureMember></root>";
        let mut reader = reader_over(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        let class = reader.class(feature.class_index()).unwrap();
        assert_eq!(class.property_count(), 1);
        assert_eq!(class.property(0).unwrap().src_element(), "surface|type");
        assert_eq!(feature.value(0), Some("asphalt"));
    }

    #[test]
    fn citygml_generic_attribute() {
        let xml = "<root><cityObjectMember><Building>\
                   <stringAttribute name=\"owner\"><value>Acme</value></stringAttribute>\
                   </Building></cityObjectMember></root>";
        let mut reader = reader_over(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        let class = reader.class(feature.class_index()).unwrap();
        assert_eq!(class.property(0).unwrap().src_element(), "owner");
        assert_eq!(feature.value(0), Some("Acme"));
    }

    #[test]
    fn fid_und_gml_id() {
        let xml = "<root><featureMember><A fid=\"f1\"/></featureMember>\
                   <featureMember><B gml:id=\"g2\"></B></featureMember></root>";
        let mut reader = reader_over(xml);
        let features = drain(&mut reader);
        assert_eq!(features[0].fid(), Some("f1"));
        assert_eq!(features[1].fid(), Some("g2"));
    }

    #[test]
    fn openls_route_instructions() {
        let xml = "<DetermineRouteResponse><RouteInstructionsList>\
                   <RouteInstruction><Instruction>left</Instruction></RouteInstruction>\
                   <RouteInstruction><Instruction>right</Instruction></RouteInstruction>\
                   </RouteInstructionsList></DetermineRouteResponse>";
        let mut reader = reader_over(xml);
        let features = drain(&mut reader);
        assert_eq!(features.len(), 2);
        for f in &features {
            assert_eq!(reader.class(f.class_index()).unwrap().name(), "RouteInstruction");
        }
        assert_eq!(features[0].value(0), Some("left"));
        assert_eq!(features[1].value(0), Some("right"));
    }

    #[test]
    fn wms_getfeatureinfo_muster() {
        let xml = "<root><roads_layer><roads_feature><name>B1</name></roads_feature>\
                   </roads_layer></root>";
        let mut reader = reader_over(xml);
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(
            reader.class(features[0].class_index()).unwrap().name(),
            "roads_feature"
        );
    }

    #[test]
    fn polnisches_tbd_dane() {
        let xml = "<root><dane><Parcel><nr>7</nr></Parcel></dane></root>";
        let mut reader = reader_over(xml);
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(reader.class(features[0].class_index()).unwrap().name(), "Parcel");
    }

    /// Emissionsreihenfolge = Reihenfolge der schliessenden Tags.
    #[test]
    fn reihenfolge_der_schliessenden_tags() {
        let xml = "<root>\
                   <featureMember><A fid=\"1\"/></featureMember>\
                   <featureMember><B fid=\"2\"/></featureMember>\
                   <featureMember><A fid=\"3\"/></featureMember>\
                   </root>";
        let mut reader = reader_over(xml);
        let fids: Vec<String> = drain(&mut reader)
            .iter()
            .map(|f| f.fid().unwrap().to_string())
            .collect();
        assert_eq!(fids, ["1", "2", "3"]);
    }

    #[test]
    fn filter_laesst_nur_eine_klasse_durch() {
        let xml = "<root>\
                   <featureMember><A fid=\"1\"/></featureMember>\
                   <featureMember><B fid=\"2\"/></featureMember>\
                   <featureMember><A fid=\"3\"/></featureMember>\
                   </root>";
        let mut reader = reader_over(xml);
        reader.set_filtered_class_name(Some("A"));
        let features = drain(&mut reader);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| {
            reader.class(f.class_index()).unwrap().name() == "A"
        }));
    }

    #[test]
    fn gesperrte_klassenliste_ignoriert_fremde() {
        let mut reader = reader_over(
            "<root><featureMember><A/></featureMember>\
             <featureMember><B/></featureMember></root>",
        );
        reader.add_class(GmlFeatureClass::new("A"));
        reader.set_class_list_locked(true);
        let features = drain(&mut reader);
        assert_eq!(features.len(), 1);
        assert_eq!(reader.class_count(), 1);
    }

    /// Gesperrtes Schema: unbekannte Properties werden verworfen,
    /// property_count waechst nie.
    #[test]
    fn gesperrtes_schema_verwirft_unbekannte_properties() {
        let mut class = GmlFeatureClass::new("A");
        class.add_property(GmlPropertyDefn::new("known", "known"));
        class.set_schema_locked(true);

        let mut reader = reader_over(
            "<root><featureMember><A><known>1</known><unknown>2</unknown></A>\
             </featureMember></root>",
        );
        reader.add_class(class);
        reader.set_class_list_locked(true);

        let feature = reader.next_feature().unwrap().unwrap();
        let class = reader.class(0).unwrap();
        assert_eq!(class.property_count(), 1);
        assert_eq!(feature.value(0), Some("1"));
        // Typ bleibt eingefroren trotz Integer-Wert
        assert_eq!(class.property(0).unwrap().property_type(), PropertyType::Untyped);
    }

    #[test]
    fn kollision_erzeugt_vollpfad_feldnamen() {
        let xml = "<root><featureMember><A>\
                   <name>x</name><sub><name>y</name></sub>\
                   </A></featureMember></root>";
        let mut reader = reader_over(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        let class = reader.class(feature.class_index()).unwrap();
        assert_eq!(class.property_count(), 2);
        assert_eq!(class.property(0).unwrap().field_name(), "name");
        assert_eq!(class.property(1).unwrap().field_name(), "sub|name");
        assert_eq!(feature.value(0), Some("x"));
        assert_eq!(feature.value(1), Some("y"));
    }

    #[test]
    fn mehrfachvorkommen_wird_listentyp() {
        let xml = "<root><featureMember><A>\
                   <tag>1</tag><tag>2</tag>\
                   </A></featureMember></root>";
        let mut reader = reader_over(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        let class = reader.class(feature.class_index()).unwrap();
        assert_eq!(class.property_count(), 1);
        assert_eq!(
            class.property(0).unwrap().property_type(),
            PropertyType::IntegerList
        );
        assert_eq!(feature.values(0), &["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn nur_erste_geometrie_ohne_fetch_all() {
        let xml = "<root><featureMember><A>\
                   <geom><Point><pos>1 1</pos></Point></geom>\
                   <geom2><Point><pos>2 2</pos></Point></geom2>\
                   </A></featureMember></root>";
        let mut reader = reader_over(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        assert_eq!(feature.geometry_fragments().len(), 1);
        assert!(feature.geometry_fragments()[0].contains("1 1"));
    }

    #[test]
    fn fetch_all_geometries_sammelt_alle() {
        let xml = "<root><featureMember><A>\
                   <geom><Point><pos>1 1</pos></Point></geom>\
                   <geom2><Point><pos>2 2</pos></Point></geom2>\
                   </A></featureMember></root>";
        let mut reader = GmlReader::new(
            ReaderConfig::default().with_fetch_all_geometries(true),
        );
        reader.set_source_buffer(xml);
        let feature = reader.next_feature().unwrap().unwrap();
        assert_eq!(feature.geometry_fragments().len(), 2);
    }

    #[test]
    fn always_string_unterdrueckt_inferenz() {
        let mut reader = GmlReader::new(
            ReaderConfig::default().with_always_string_fields(true),
        );
        reader.set_source_buffer(
            "<root><featureMember><A><n>42</n></A></featureMember></root>",
        );
        let _ = reader.next_feature().unwrap().unwrap();
        assert_eq!(
            reader.class(0).unwrap().property(0).unwrap().property_type(),
            PropertyType::String
        );
    }

    #[test]
    fn tokenizer_fehler_ist_sticky() {
        let mut reader = reader_over("<root><featureMember><A></B></featureMember></root>");
        let err = loop {
            match reader.next_feature() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a parse error"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, Error::XmlParse { .. }), "{err}");
        // danach dauerhaft keine Features mehr, ohne weiteren Fehler
        assert!(reader.next_feature().unwrap().is_none());
        assert!(reader.next_feature().unwrap().is_none());
    }

    #[test]
    fn reset_reading_startet_neu() {
        let xml = "<root><featureMember><A fid=\"1\"/></featureMember></root>";
        let mut reader = reader_over(xml);
        assert_eq!(drain(&mut reader).len(), 1);

        reader.set_filtered_class_name(Some("Z"));
        reader.reset_reading();
        assert!(reader.filtered_class_name().is_none());
        assert_eq!(drain(&mut reader).len(), 1);
    }

    #[test]
    fn fehlende_quelle() {
        let mut reader = GmlReader::new(ReaderConfig::default());
        let err = reader.next_feature().unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }

    #[test]
    fn offnen_schlaegt_fehl() {
        let mut reader = GmlReader::new(ReaderConfig::default());
        reader.set_source("/nonexistent/nowhere.gml");
        let err = reader.next_feature().unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }

    #[test]
    fn source_path_nur_fuer_dateiquellen() {
        let mut reader = GmlReader::new(ReaderConfig::default());
        assert!(reader.source_path().is_none());

        reader.set_source("/data/cities.gml");
        assert_eq!(reader.source_path(), Some(Path::new("/data/cities.gml")));

        // Puffer-Quellen haben keinen Pfad
        reader.set_source_buffer("<root/>");
        assert!(reader.source_path().is_none());
    }

    #[test]
    fn global_srs_epsg_als_urn() {
        let mut reader = GmlReader::new(
            ReaderConfig::default().with_consider_epsg_as_urn(true),
        );
        reader.set_global_srs_name("EPSG:4326");
        assert_eq!(
            reader.global_srs_name(),
            Some("urn:ogc:def:crs:EPSG::4326")
        );
        // der erste Wert gewinnt
        reader.set_global_srs_name("EPSG:25832");
        assert_eq!(
            reader.global_srs_name(),
            Some("urn:ogc:def:crs:EPSG::4326")
        );
    }

    #[test]
    fn verschachtelte_features() {
        // aeusseres Feature enthaelt ein members-Element mit innerem Feature
        let xml = "<root><featureMember><Outer>\
                   <innerMembers><Inner><n>1</n></Inner></innerMembers>\
                   <name>o</name>\
                   </Outer></featureMember></root>";
        let mut reader = reader_over(xml);
        let features = drain(&mut reader);
        assert_eq!(features.len(), 2);
        // inneres Feature schliesst zuerst
        assert_eq!(reader.class(features[0].class_index()).unwrap().name(), "Inner");
        assert_eq!(reader.class(features[1].class_index()).unwrap().name(), "Outer");
    }

    #[test]
    fn zeilen_spalten_berechnung() {
        assert_eq!(line_col_of_prefix(b""), (1, 1));
        assert_eq!(line_col_of_prefix(b"abc"), (1, 4));
        assert_eq!(line_col_of_prefix(b"a\nbc"), (2, 3));
        assert_eq!(line_col_of_prefix(b"a\nb\n"), (3, 1));
    }

    #[test]
    fn suffix_test_case_insensitiv() {
        assert!(ends_with_ci("gml:featureMember", "member"));
        assert!(ends_with_ci("wfs:FeatureMembers", "members"));
        assert!(!ends_with_ci("member", "members"));
        assert!(!ends_with_ci("x", "member"));
    }
}

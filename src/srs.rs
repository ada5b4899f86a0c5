//! Spatial-reference-name utilities (pragmatic subset).
//!
//! Full CRS parsing lives outside the reader; this module covers only what
//! schema aggregation needs: normalizing `EPSG:n` identifiers to the OGC
//! URN form, classifying URNs whose authority order is latitude/longitude,
//! and rewriting an identifier so it no longer requests that order once
//! the extents have been swapped.

/// OGC-URN-Prefix fuer EPSG-Codes.
const EPSG_URN_PREFIX: &str = "urn:ogc:def:crs:EPSG:";

/// Normalizes an SRS name according to the EPSG-as-URN policy:
/// `EPSG:4326` becomes `urn:ogc:def:crs:EPSG::4326`. Other names pass
/// through unchanged.
pub fn normalize_srs_name(name: &str, consider_epsg_as_urn: bool) -> String {
    if consider_epsg_as_urn
        && let Some(code) = name.strip_prefix("EPSG:")
    {
        return format!("urn:ogc:def:crs:EPSG::{code}");
    }
    name.to_string()
}

/// True when the identifier requests latitude/longitude axis order.
///
/// The URN form defers to the EPSG registry, where geographic CRSes are
/// lat/long. We recognize the classic 4-digit geographic band
/// (4000–4999, which includes 4326); the plain `EPSG:n` authority form and
/// non-EPSG names keep conventional x/y order.
pub fn is_srs_lat_long_order(name: Option<&str>) -> bool {
    let Some(name) = name else { return false };
    let Some(rest) = name.strip_prefix(EPSG_URN_PREFIX) else {
        return false;
    };
    // Nach dem Prefix folgt optional eine Versionsangabe: "urn:ogc:def:crs:EPSG:6.6:4326".
    let code = rest.rsplit(':').next().unwrap_or(rest);
    matches!(code.parse::<u32>(), Ok(n) if (4000..5000).contains(&n))
}

/// Rewrites an identifier after the extent axes were swapped, so it no
/// longer carries the lat/long axis hint: the URN form collapses back to
/// the plain `EPSG:<code>` authority form. Names without a hint pass
/// through unchanged.
pub fn strip_axis_order_hint(name: &str) -> String {
    if let Some(rest) = name.strip_prefix(EPSG_URN_PREFIX) {
        let code = rest.rsplit(':').next().unwrap_or(rest);
        return format!("EPSG:{code}");
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_wird_urn() {
        assert_eq!(
            normalize_srs_name("EPSG:4326", true),
            "urn:ogc:def:crs:EPSG::4326"
        );
    }

    #[test]
    fn epsg_ohne_flag_unveraendert() {
        assert_eq!(normalize_srs_name("EPSG:4326", false), "EPSG:4326");
    }

    #[test]
    fn urn_bleibt_urn() {
        assert_eq!(
            normalize_srs_name("urn:ogc:def:crs:EPSG::31467", true),
            "urn:ogc:def:crs:EPSG::31467"
        );
    }

    #[test]
    fn urn_4326_ist_lat_long() {
        assert!(is_srs_lat_long_order(Some("urn:ogc:def:crs:EPSG::4326")));
    }

    /// Versionierte URN-Form aus aelteren WFS-Antworten.
    #[test]
    fn versionierte_urn_ist_lat_long() {
        assert!(is_srs_lat_long_order(Some("urn:ogc:def:crs:EPSG:6.6:4326")));
    }

    #[test]
    fn projizierter_code_ist_nicht_lat_long() {
        assert!(!is_srs_lat_long_order(Some("urn:ogc:def:crs:EPSG::31467")));
    }

    #[test]
    fn authority_form_ist_nicht_lat_long() {
        assert!(!is_srs_lat_long_order(Some("EPSG:4326")));
    }

    #[test]
    fn none_ist_nicht_lat_long() {
        assert!(!is_srs_lat_long_order(None));
    }

    #[test]
    fn hint_strip_auf_authority_form() {
        assert_eq!(
            strip_axis_order_hint("urn:ogc:def:crs:EPSG::4326"),
            "EPSG:4326"
        );
        assert_eq!(
            strip_axis_order_hint("urn:ogc:def:crs:EPSG:6.6:4326"),
            "EPSG:4326"
        );
    }

    #[test]
    fn hint_strip_ohne_urn_unveraendert() {
        assert_eq!(strip_axis_order_hint("EPSG:25832"), "EPSG:25832");
    }
}

//! rgml CLI — GML inspection: schema prescan and feature dump.

use clap::{Args, Parser, Subcommand};
use rgml::{GmlReader, ReaderConfig, geometry_type_name};
use std::process;

#[derive(Parser)]
#[command(name = "rgml", about = "Streaming GML reader: schema prescan and feature dump")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the document, infer the schema and write a .gfs sidecar
    Prescan(PrescanArgs),
    /// Stream features to stdout
    Features(FeaturesArgs),
}

#[derive(Args)]
struct PrescanArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Output sidecar (default: input with .gfs extension)
    #[arg(short, long)]
    output: Option<String>,

    /// Skip geometry analysis (no extents, types, SRS)
    #[arg(long)]
    no_extents: bool,
}

#[derive(Args)]
struct FeaturesArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Load a .gfs sidecar instead of inferring the schema
    #[arg(short, long)]
    schema: Option<String>,

    /// Only emit features of this class
    #[arg(long)]
    class: Option<String>,

    /// Stop after N features
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct CommonArgs {
    /// Input GML file
    #[arg(short, long)]
    input: String,

    /// Swap X/Y for lat/long-ordered CRSes
    #[arg(long)]
    invert_axis_order: bool,

    /// Rewrite EPSG:n identifiers as OGC URNs
    #[arg(long)]
    epsg_as_urn: bool,

    /// Keep every geometry of a feature, not only the first
    #[arg(long)]
    all_geometries: bool,

    /// Suppress type inference; all properties become String
    #[arg(long)]
    always_string: bool,

    /// Document-global SRS name (e.g. EPSG:4326)
    #[arg(long)]
    srs: Option<String>,
}

impl CommonArgs {
    /// Umgebung als Basis, CLI-Flags schalten zu.
    fn to_config(&self) -> ReaderConfig {
        let mut config = ReaderConfig::from_env();
        if self.invert_axis_order {
            config.set_invert_axis_order_if_lat_long(true);
        }
        if self.epsg_as_urn {
            config.set_consider_epsg_as_urn(true);
        }
        if self.all_geometries {
            config.set_fetch_all_geometries(true);
        }
        if self.always_string {
            config.set_always_string_fields(true);
        }
        config
    }

    fn build_reader(&self) -> GmlReader {
        let mut reader = GmlReader::new(self.to_config());
        reader.set_source(&self.input);
        if let Some(srs) = &self.srs {
            reader.set_global_srs_name(srs);
        }
        reader
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Prescan(args) => run_prescan(args),
        Command::Features(args) => run_features(args),
    }
}

fn run_prescan(args: PrescanArgs) -> Result<(), String> {
    let mut reader = args.common.build_reader();

    let found = reader
        .prescan_for_schema(!args.no_extents)
        .map_err(|e| format!("Prescan-Fehler: {e}"))?;
    if !found {
        return Err("keine Feature-Klassen im Dokument gefunden".into());
    }

    for i in 0..reader.class_count() {
        let class = reader.class(i).expect("index in range");
        println!(
            "{}: {} features, {} properties, geometry {}",
            class.name(),
            class.feature_count(),
            class.property_count(),
            geometry_type_name(class.geometry_type()),
        );
        if let Some(srs) = class.srs_name() {
            println!("  srs: {srs}");
        }
        if let Some(env) = class.extents() {
            println!(
                "  extents: ({}, {}) - ({}, {})",
                env.min_x, env.min_y, env.max_x, env.max_y
            );
        }
    }

    let output = resolve_output_path(args.output.as_deref(), &args.common.input)?;
    reader
        .save_classes(&output)
        .map_err(|e| format!("Schreibfehler '{output}': {e}"))?;
    println!("Schema nach '{output}' geschrieben");
    Ok(())
}

fn run_features(args: FeaturesArgs) -> Result<(), String> {
    let mut reader = args.common.build_reader();

    if let Some(schema) = &args.schema {
        reader
            .load_classes(schema)
            .map_err(|e| format!("Schema-Lade-Fehler: {e}"))?;
    }
    reader.set_filtered_class_name(args.class.as_deref());

    let limit = args.limit.unwrap_or(u64::MAX);
    let mut emitted = 0u64;
    while emitted < limit {
        let feature = match reader.next_feature() {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return Err(format!("Lesefehler: {e}")),
        };
        let class = reader
            .class(feature.class_index())
            .ok_or("interner Fehler: Feature ohne Klasse")?;

        let fid = feature.fid().unwrap_or("-");
        println!("{} [{fid}]", class.name());
        for (i, prop) in class.properties().iter().enumerate() {
            let values = feature.values(i);
            if values.is_empty() {
                continue;
            }
            println!("  {} = {}", prop.field_name(), values.join(", "));
        }
        for fragment in feature.geometry_fragments() {
            println!("  geometry: {fragment}");
        }
        emitted += 1;
    }
    println!("{emitted} features");
    Ok(())
}

/// Leitet den Sidecar-Pfad aus der Eingabedatei ab (Extension → .gfs).
fn resolve_output_path(explicit: Option<&str>, input: &str) -> Result<String, String> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    let path = std::path::Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "ungueltiger Eingabepfad".to_string())?;
    let parent = path.parent().unwrap_or_else(|| std::path::Path::new(""));
    Ok(parent.join(format!("{stem}.gfs")).to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("CLI parse failed")
    }

    #[test]
    fn prescan_default_output_von_input() {
        assert_eq!(
            resolve_output_path(None, "/data/cities.gml").unwrap(),
            "/data/cities.gfs"
        );
        assert_eq!(resolve_output_path(Some("x.gfs"), "in.gml").unwrap(), "x.gfs");
    }

    #[test]
    fn to_config_mappt_flags() {
        let cli = parse_cli(&[
            "rgml", "prescan", "-i", "in.gml",
            "--invert-axis-order", "--epsg-as-urn", "--all-geometries",
        ]);
        let Command::Prescan(args) = cli.command else {
            panic!("expected prescan command");
        };
        let config = args.common.to_config();
        assert!(config.invert_axis_order_if_lat_long());
        assert!(config.consider_epsg_as_urn());
        assert!(config.fetch_all_geometries());
        assert!(!config.always_string_fields());
    }

    #[test]
    fn features_mappt_filter_und_limit() {
        let cli = parse_cli(&[
            "rgml", "features", "-i", "in.gml", "--class", "Road", "--limit", "5",
        ]);
        let Command::Features(args) = cli.command else {
            panic!("expected features command");
        };
        assert_eq!(args.class.as_deref(), Some("Road"));
        assert_eq!(args.limit, Some(5));
    }

    #[test]
    fn prescan_no_extents_flag() {
        let cli = parse_cli(&["rgml", "prescan", "-i", "in.gml", "--no-extents"]);
        let Command::Prescan(args) = cli.command else {
            panic!("expected prescan command");
        };
        assert!(args.no_extents);
    }
}

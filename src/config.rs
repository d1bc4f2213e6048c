use chrono::NaiveDate;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::date_range::{DateRange, parse_date};

pub const DEFAULT_OUTPUT: &str = "heatmap.html";

#[derive(Parser, Debug)]
#[command(
    name = "geo-heatmap",
    version,
    about = "Render location-history exports as an interactive heatmap"
)]
pub struct Cli {
    /// Takeout JSON/KML, GPX, a takeout-*.zip or an Apple Health export.zip
    /// (directories are searched recursively)
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Path of the heatmap HTML output file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Earliest date to include
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub min_date: Option<NaiveDate>,

    /// Latest date to include
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub max_date: Option<NaiveDate>,

    /// Read JSON exports incrementally instead of loading them whole
    #[arg(short, long)]
    pub stream: bool,

    /// Tile set name (e.g. OpenStreetMap, StamenTerrain, CartoDBPositron)
    /// or a {z}/{x}/{y} URL template
    #[arg(short, long, default_value = "OpenStreetMap")]
    pub map: MapTiles,

    #[arg(long, default_value_t = 6)]
    pub zoom_start: u8,

    /// Radius of each heatmap point in pixels
    #[arg(long, default_value_t = 7)]
    pub radius: u32,

    #[arg(long, default_value_t = 4)]
    pub blur: u32,

    /// Opacity the heat starts at
    #[arg(long, default_value_t = 0.2)]
    pub min_opacity: f64,

    /// Zoom level at which points reach full intensity
    #[arg(long, default_value_t = 4)]
    pub max_zoom: u8,

    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

/// How inputs are read. Shared by every parser in a run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub range: DateRange,
    pub streaming: bool,
    pub show_progress: bool,
}

impl IngestOptions {
    pub fn progress_bar(&self, len: u64, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len).with_style(style).with_message(message)
    }
}

/// Rendering parameters; they never influence aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapOptions {
    pub tiles: MapTiles,
    pub zoom_start: u8,
    pub radius: u32,
    pub blur: u32,
    pub min_opacity: f64,
    pub max_zoom: u8,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        HeatmapOptions {
            tiles: MapTiles::OpenStreetMap,
            zoom_start: 6,
            radius: 7,
            blur: 4,
            min_opacity: 0.2,
            max_zoom: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub ingest: IngestOptions,
    pub heatmap: HeatmapOptions,
}

impl From<Cli> for RunConfig {
    fn from(cli: Cli) -> Self {
        let range = DateRange::new(cli.min_date, cli.max_date);
        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                log::warn!("--min-date {min} is after --max-date {max}; nothing will match");
            }
        }
        RunConfig {
            inputs: cli.files,
            output: cli.output,
            ingest: IngestOptions {
                range,
                streaming: cli.stream,
                show_progress: !cli.quiet,
            },
            heatmap: HeatmapOptions {
                tiles: cli.map,
                zoom_start: cli.zoom_start,
                radius: cli.radius,
                blur: cli.blur,
                min_opacity: cli.min_opacity,
                max_zoom: cli.max_zoom,
            },
        }
    }
}

/// Base layer of the rendered map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTiles {
    OpenStreetMap,
    StamenTerrain,
    StamenToner,
    StamenWatercolor,
    CartoDbPositron,
    CartoDbDarkMatter,
    Custom(String),
}

const OSM_ATTRIBUTION: &str =
    r#"&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors"#;
const STAMEN_ATTRIBUTION: &str = r#"&copy; <a href="https://stadiamaps.com/">Stadia Maps</a> &copy; <a href="https://stamen.com/">Stamen Design</a> &copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors"#;
const CARTO_ATTRIBUTION: &str = r#"&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors &copy; <a href="https://carto.com/attributions">CARTO</a>"#;

impl MapTiles {
    pub fn url_template(&self) -> &str {
        match self {
            MapTiles::OpenStreetMap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            MapTiles::StamenTerrain => "https://tiles.stadiamaps.com/tiles/stamen_terrain/{z}/{x}/{y}{r}.png",
            MapTiles::StamenToner => "https://tiles.stadiamaps.com/tiles/stamen_toner/{z}/{x}/{y}{r}.png",
            MapTiles::StamenWatercolor => "https://tiles.stadiamaps.com/tiles/stamen_watercolor/{z}/{x}/{y}.jpg",
            MapTiles::CartoDbPositron => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
            MapTiles::CartoDbDarkMatter => "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
            MapTiles::Custom(template) => template,
        }
    }

    pub fn attribution(&self) -> &str {
        match self {
            MapTiles::OpenStreetMap | MapTiles::Custom(_) => OSM_ATTRIBUTION,
            MapTiles::StamenTerrain | MapTiles::StamenToner | MapTiles::StamenWatercolor => STAMEN_ATTRIBUTION,
            MapTiles::CartoDbPositron | MapTiles::CartoDbDarkMatter => CARTO_ATTRIBUTION,
        }
    }
}

impl FromStr for MapTiles {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("{z}") && s.contains("{x}") && s.contains("{y}") {
            return Ok(MapTiles::Custom(s.to_string()));
        }
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "openstreetmap" | "osm" => Ok(MapTiles::OpenStreetMap),
            "stamenterrain" => Ok(MapTiles::StamenTerrain),
            "stamentoner" => Ok(MapTiles::StamenToner),
            "stamenwatercolor" => Ok(MapTiles::StamenWatercolor),
            "cartodbpositron" => Ok(MapTiles::CartoDbPositron),
            "cartodbdarkmatter" => Ok(MapTiles::CartoDbDarkMatter),
            _ => Err(format!(
                "unknown map tiles {s:?}; use OpenStreetMap, StamenTerrain, StamenToner, \
                 StamenWatercolor, CartoDBPositron, CartoDBDarkMatter or a {{z}}/{{x}}/{{y}} URL template"
            )),
        }
    }
}

impl fmt::Display for MapTiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapTiles::OpenStreetMap => "OpenStreetMap",
            MapTiles::StamenTerrain => "StamenTerrain",
            MapTiles::StamenToner => "StamenToner",
            MapTiles::StamenWatercolor => "StamenWatercolor",
            MapTiles::CartoDbPositron => "CartoDBPositron",
            MapTiles::CartoDbDarkMatter => "CartoDBDarkMatter",
            MapTiles::Custom(template) => template,
        };
        f.write_str(name)
    }
}

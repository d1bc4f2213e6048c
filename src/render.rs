use serde::Serialize;

use crate::aggregator::{Aggregator, WeightedPoint};
use crate::config::HeatmapOptions;
use crate::hashable_point::CoordinateKey;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const LEAFLET_HEAT_JS: &str = "https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js";

/// Options object handed to `L.heatLayer`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeatLayerOptions {
    min_opacity: f64,
    max_zoom: u8,
    max: u64,
    radius: u32,
    blur: u32,
}

/// Everything the page needs: the weighted points, the centre and the
/// rendering options.
pub struct Heatmap<'a> {
    pub points: Vec<WeightedPoint>,
    pub center: CoordinateKey,
    pub max_count: u64,
    pub options: &'a HeatmapOptions,
}

impl<'a> Heatmap<'a> {
    /// Centred on the hottest coordinate, or on (0, 0) when nothing was
    /// aggregated.
    pub fn from_aggregator(aggregator: &Aggregator, options: &'a HeatmapOptions) -> Self {
        let (center, max_count) = aggregator.hottest().unwrap_or_default();
        Heatmap {
            points: aggregator.weighted_points(),
            center,
            max_count,
            options,
        }
    }

    pub fn to_html(&self) -> Result<String, serde_json::Error> {
        let data: Vec<(f64, f64, u64)> = self
            .points
            .iter()
            .map(|p| (p.latitude, p.longitude, p.count))
            .collect();
        let points_json = serde_json::to_string(&data)?;
        let layer_options = serde_json::to_string(&HeatLayerOptions {
            min_opacity: self.options.min_opacity.clamp(0.0, 1.0),
            max_zoom: self.options.max_zoom,
            max: self.max_count.max(1),
            radius: self.options.radius,
            blur: self.options.blur,
        })?;
        let tile_url = serde_json::to_string(self.options.tiles.url_template())?;
        let attribution = serde_json::to_string(self.options.tiles.attribution())?;

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Location history heatmap</title>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link rel="stylesheet" href="{LEAFLET_CSS}" />
    <script src="{LEAFLET_JS}"></script>
    <script src="{LEAFLET_HEAT_JS}"></script>
    <style>html, body, #map {{ width: 100%; height: 100%; margin: 0; padding: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
    const points = {points_json};
    const map = L.map('map').setView([{lat:.6}, {lon:.6}], {zoom});
    L.tileLayer({tile_url}, {{ attribution: {attribution} }}).addTo(map);
    L.heatLayer(points, {layer_options}).addTo(map);
</script>
</body>
</html>
"#,
            lat = self.center.latitude(),
            lon = self.center.longitude(),
            zoom = self.options.zoom_start,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapTiles;

    #[test]
    fn page_contains_points_center_and_options() {
        let mut agg = Aggregator::new();
        agg.update(CoordinateKey::new(52.52, 13.405));
        agg.update(CoordinateKey::new(52.52, 13.405));
        let options = HeatmapOptions::default();

        let html = Heatmap::from_aggregator(&agg, &options).to_html().unwrap();

        assert!(html.contains("const points = [[52.52,13.405,2]];"), "{html}");
        assert!(html.contains("setView([52.520000, 13.405000], 6)"), "{html}");
        assert!(html.contains(r#""minOpacity":0.2"#));
        assert!(html.contains(r#""maxZoom":4"#));
        assert!(html.contains(r#""max":2"#));
        assert!(html.contains(r#""radius":7"#));
        assert!(html.contains(r#""blur":4"#));
        assert!(html.contains("tile.openstreetmap.org"));
    }

    #[test]
    fn empty_aggregation_centres_on_the_origin() {
        let agg = Aggregator::new();
        let options = HeatmapOptions {
            tiles: MapTiles::CartoDbDarkMatter,
            ..HeatmapOptions::default()
        };

        let heatmap = Heatmap::from_aggregator(&agg, &options);
        assert!(heatmap.points.is_empty());
        assert_eq!(heatmap.center, CoordinateKey::default());

        let html = heatmap.to_html().unwrap();
        assert!(html.contains("const points = [];"));
        assert!(html.contains("setView([0.000000, 0.000000], 6)"));
        assert!(html.contains("dark_all"));
    }
}

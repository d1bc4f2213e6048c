use super::{DocumentFormat, RawSample, SampleFilter, gpx};
use chrono::NaiveDate;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;
use zip::ZipArchive;

use crate::config::IngestOptions;
use crate::date_range::DATE_FORMAT;
use crate::error::{Error, ParseError};

pub const TAKEOUT_PREFIX: &str = "Takeout/";
pub const WORKOUT_ROUTES_PREFIX: &str = "apple_health_export/workout-routes/";

/// `data-english-name` of the Takeout service tile that holds location history.
const LOCATION_HISTORY_MARKER: &str = "LOCATION_HISTORY";

// workout routes are read in batches so memory stays bounded
const ROUTE_CHUNK_SIZE: usize = 64;

static H1_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>").expect("h1 tag pattern is valid"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});
static ROUTE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("date pattern is valid"));

/// Known export layouts, recognised from the member listing alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLayout {
    /// Google Takeout: `Takeout/*.html` manifests (exactly one is expected).
    Takeout { manifests: Vec<String> },
    /// Apple Health: one GPX per workout under `workout-routes/`.
    AppleHealth { routes: Vec<String> },
}

pub fn classify(names: &[String]) -> Option<ArchiveLayout> {
    let manifests: Vec<String> = names
        .iter()
        .filter(|name| is_takeout_manifest(name))
        .cloned()
        .collect();
    if !manifests.is_empty() {
        return Some(ArchiveLayout::Takeout { manifests });
    }

    let routes: Vec<String> = names
        .iter()
        .filter(|name| name.starts_with(WORKOUT_ROUTES_PREFIX) && name.ends_with(".gpx"))
        .cloned()
        .collect();
    if !routes.is_empty() {
        return Some(ArchiveLayout::AppleHealth { routes });
    }
    None
}

fn is_takeout_manifest(name: &str) -> bool {
    name.strip_prefix(TAKEOUT_PREFIX)
        .is_some_and(|rest| !rest.contains('/') && rest.ends_with(".html"))
}

/// Folder names announced by the Takeout manifest for location history, read
/// from `<h1 data-english-name="LOCATION_HISTORY" data-folder-name="...">`.
/// Duplicates collapse; any other markup is ignored.
pub fn location_folder_names(html: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    for tag in H1_TAG.find_iter(html) {
        let mut english_name = None;
        let mut folder_name = None;
        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
            match &attr[1] {
                "data-english-name" => english_name = Some(value),
                "data-folder-name" => folder_name = Some(value),
                _ => {}
            }
        }
        if english_name == Some(LOCATION_HISTORY_MARKER) {
            if let Some(folder) = folder_name {
                let folder = quick_xml::escape::unescape(folder)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| folder.to_string());
                names.insert(folder.trim().to_string());
            }
        }
    }
    names.into_iter().collect()
}

/// The `YYYY-MM-DD` fragment Apple Health puts in route file names
/// (`route_2020-05-14_6.43pm.gpx`).
pub fn route_date(member: &str) -> Option<NaiveDate> {
    let file_name = member.rsplit('/').next().unwrap_or(member);
    ROUTE_DATE
        .find(file_name)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), DATE_FORMAT).ok())
}

fn member_label(archive: &Path, member: &str) -> String {
    format!("{member} in {}", archive.display())
}

/// Resolves what kind of export `path` holds and feeds its samples to `out`.
pub fn ingest_archive(
    path: &Path,
    options: &IngestOptions,
    out: &mut SampleFilter<'_>,
) -> Result<(), Error> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|source| Error::Zip {
        archive: path.to_path_buf(),
        source,
    })?;
    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();

    match classify(&names) {
        Some(ArchiveLayout::Takeout { manifests }) => {
            ingest_takeout(&mut archive, path, &names, &manifests, options, out)
        }
        Some(ArchiveLayout::AppleHealth { routes }) => {
            ingest_workout_routes(&mut archive, path, &routes, options, out)
        }
        None => Err(Error::UnsupportedArchive {
            archive: path.to_path_buf(),
        }),
    }
}

fn exactly_one<T: Clone>(archive: &Path, pattern: String, found: &[T]) -> Result<T, Error> {
    match found {
        [one] => Ok(one.clone()),
        _ => Err(Error::AmbiguousArchive {
            archive: archive.to_path_buf(),
            pattern,
            found: found.len(),
        }),
    }
}

fn ingest_takeout<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    names: &[String],
    manifests: &[String],
    options: &IngestOptions,
    out: &mut SampleFilter<'_>,
) -> Result<(), Error> {
    let manifest = exactly_one(path, format!("{TAKEOUT_PREFIX}*.html"), manifests)?;

    let mut html = String::new();
    archive
        .by_name(&manifest)
        .map_err(|source| Error::Zip {
            archive: path.to_path_buf(),
            source,
        })?
        .read_to_string(&mut html)
        .map_err(|e| Error::parse(member_label(path, &manifest), ParseError::Io(e)))?;

    let folder = exactly_one(
        path,
        format!("a {LOCATION_HISTORY_MARKER} data-folder-name in {manifest}"),
        &location_folder_names(&html),
    )?;

    let data_prefix = format!("{TAKEOUT_PREFIX}{folder}/{folder}.");
    let candidates: Vec<String> = names
        .iter()
        .filter(|name| name.starts_with(&data_prefix))
        .cloned()
        .collect();
    let data_member = exactly_one(path, format!("{data_prefix}*"), &candidates)?;
    log::info!("Reading location data file from zip archive: {data_member:?}");

    let format = match data_member.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => DocumentFormat::Json,
        Some("kml") => DocumentFormat::Kml,
        _ => {
            return Err(Error::UnsupportedFormat {
                archive: path.to_path_buf(),
                member: data_member.clone(),
            });
        }
    };
    let parser = format.parser(options.streaming);

    let mut member = archive.by_name(&data_member).map_err(|source| Error::Zip {
        archive: path.to_path_buf(),
        source,
    })?;
    log::debug!("Running {} on {data_member}", parser.name());
    parser
        .parse(&mut member, out)
        .map_err(|source| Error::parse(member_label(path, &data_member), source))
}

/// Route members are pulled out of the archive sequentially, parsed in
/// parallel, then handed to `out` in archive order.
fn ingest_workout_routes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    routes: &[String],
    options: &IngestOptions,
    out: &mut SampleFilter<'_>,
) -> Result<(), Error> {
    let range = *out.range();
    let selected: Vec<&String> = routes
        .iter()
        .filter(|name| route_date(name).is_none_or(|date| range.contains(date)))
        .collect();
    log::info!(
        "{} of {} workout routes fall inside the date range",
        selected.len(),
        routes.len()
    );

    let bar = options.progress_bar(selected.len() as u64, "workout routes");
    for chunk in selected.chunks(ROUTE_CHUNK_SIZE) {
        let mut members = Vec::with_capacity(chunk.len());
        for name in chunk {
            let mut bytes = Vec::new();
            archive
                .by_name(name)
                .map_err(|source| Error::Zip {
                    archive: path.to_path_buf(),
                    source,
                })?
                .read_to_end(&mut bytes)
                .map_err(|e| Error::parse(member_label(path, name), ParseError::Io(e)))?;
            members.push((name.as_str(), bytes));
        }

        let parsed: Vec<Vec<RawSample>> = members
            .into_par_iter()
            .progress_with(bar.clone())
            .map(|(name, bytes)| {
                gpx::read_samples(&bytes, &range).map_err(|source| Error::parse(member_label(path, name), source))
            })
            .collect::<Result<_, _>>()?;

        for sample in parsed.into_iter().flatten() {
            out.push(sample);
        }
    }
    bar.finish_and_clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::date_range::{DateRange, parse_date};
    use crate::hashable_point::CoordinateKey;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    const MANIFEST: &str = r#"<html><body>
        <div id="service-tile-LOCATION_HISTORY">
          <button><div class="service_summary"><div>
            <h1 class="data-folder-name" data-english-name="LOCATION_HISTORY" data-folder-name="Location History">
              Location History
            </h1>
          </div></div></button>
        </div>
        <div id="service-tile-MAPS">
          <h1 class="data-folder-name" data-english-name="MAPS" data-folder-name="Maps">Maps</h1>
        </div>
    </body></html>"#;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_zip(dir: &Path, file_name: &str, members: &[(&str, &str)]) -> std::path::PathBuf {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let path = dir.join(file_name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn route(lat: f64, lon: f64, time: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Apple Health Export" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Route</name><trkseg>
    <trkpt lat="{lat}" lon="{lon}"><time>{time}</time></trkpt>
  </trkseg></trk>
</gpx>"#
        )
    }

    fn ingest(path: &Path, range: &DateRange) -> Result<Aggregator, Error> {
        ingest_with(path, range, false)
    }

    fn ingest_with(path: &Path, range: &DateRange, streaming: bool) -> Result<Aggregator, Error> {
        let options = IngestOptions {
            streaming,
            ..IngestOptions::default()
        };
        let mut agg = Aggregator::new();
        let mut filter = SampleFilter::new(range, &mut agg);
        ingest_archive(path, &options, &mut filter)?;
        Ok(agg)
    }

    #[test]
    fn classify_takeout_and_apple_health() {
        let takeout = names(&[
            "Takeout/archive_browser.html",
            "Takeout/Location History/Location History.json",
        ]);
        assert_eq!(
            classify(&takeout),
            Some(ArchiveLayout::Takeout {
                manifests: names(&["Takeout/archive_browser.html"])
            })
        );

        let health = names(&[
            "apple_health_export/export.xml",
            "apple_health_export/workout-routes/route_2020-05-14_6.43pm.gpx",
            "apple_health_export/workout-routes/notes.txt",
        ]);
        assert_eq!(
            classify(&health),
            Some(ArchiveLayout::AppleHealth {
                routes: names(&["apple_health_export/workout-routes/route_2020-05-14_6.43pm.gpx"])
            })
        );

        assert_eq!(classify(&names(&["photos/cat.jpg", "Takeout/My Activity/a.html"])), None);
    }

    #[test]
    fn folder_name_comes_from_the_location_history_marker() {
        assert_eq!(location_folder_names(MANIFEST), vec!["Location History".to_string()]);

        let localized = r#"<h1 data-folder-name='Standortverlauf &amp; Zeitachse' data-english-name='LOCATION_HISTORY'>"#;
        assert_eq!(
            location_folder_names(localized),
            vec!["Standortverlauf & Zeitachse".to_string()]
        );

        assert!(location_folder_names("<h1 data-english-name=\"MAPS\">").is_empty());
    }

    #[test]
    fn route_dates_come_from_the_file_name() {
        assert_eq!(
            route_date("apple_health_export/workout-routes/route_2020-05-14_6.43pm.gpx"),
            Some(parse_date("2020-05-14").unwrap())
        );
        assert_eq!(route_date("apple_health_export/workout-routes/route.gpx"), None);
    }

    #[test]
    fn takeout_json_is_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let data = r#"{"locations": [
            {"timestampMs": "1546300800000", "latitudeE7": 525200000, "longitudeE7": 134050000},
            {"timestampMs": "1546300800000", "latitudeE7": 525200000, "longitudeE7": 134050000}
        ]}"#;
        let path = write_zip(
            dir.path(),
            "takeout-20200101.zip",
            &[
                ("Takeout/archive_browser.html", MANIFEST),
                ("Takeout/Location History/Location History.json", data),
            ],
        );

        let agg = ingest(&path, &DateRange::unbounded()).unwrap();
        assert_eq!(agg.hottest(), Some((CoordinateKey::new(52.52, 13.405), 2)));
    }

    #[test]
    fn takeout_json_streams_like_it_loads() {
        let dir = tempfile::tempdir().unwrap();
        let data = r#"{"locations": [
            {"timestampMs": "1546300800000", "latitudeE7": 525200000, "longitudeE7": 134050000},
            {"timestampMs": "1546387200000", "latitudeE7": 525200004, "longitudeE7": 134049996},
            {"timestampMs": "1551398400000", "latitudeE7": 488566000, "longitudeE7": 23522000}
        ]}"#;
        let path = write_zip(
            dir.path(),
            "takeout.zip",
            &[
                ("Takeout/archive_browser.html", MANIFEST),
                ("Takeout/Location History/Location History.json", data),
            ],
        );

        let january = DateRange::new(None, Some(parse_date("2019-01-31").unwrap()));
        for range in [DateRange::unbounded(), january] {
            let batch = ingest_with(&path, &range, false).unwrap();
            let streamed = ingest_with(&path, &range, true).unwrap();
            assert_eq!(batch.counts(), streamed.counts(), "{range:?}");
            assert_eq!(batch.hottest(), streamed.hottest(), "{range:?}");
        }

        let streamed = ingest_with(&path, &january, true).unwrap();
        assert_eq!(streamed.total_samples(), 2);
        assert_eq!(streamed.hottest(), Some((CoordinateKey::new(52.52, 13.405), 2)));
    }

    #[test]
    fn takeout_kml_is_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let data = r#"<kml xmlns:gx="http://www.google.com/kml/ext/2.2"><gx:Track>
            <when>2014-01-01T00:00:00Z</when><gx:coord>13.405 52.52 0</gx:coord>
        </gx:Track></kml>"#;
        let path = write_zip(
            dir.path(),
            "takeout.zip",
            &[
                ("Takeout/archive_browser.html", MANIFEST),
                ("Takeout/Location History/Location History.kml", data),
            ],
        );

        let agg = ingest(&path, &DateRange::unbounded()).unwrap();
        assert_eq!(agg.count(&CoordinateKey::new(52.52, 13.405)), 1);
    }

    #[test]
    fn takeout_with_unsupported_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(
            dir.path(),
            "takeout.zip",
            &[
                ("Takeout/archive_browser.html", MANIFEST),
                ("Takeout/Location History/Location History.csv", "lat,lon\n1,2\n"),
            ],
        );

        match ingest(&path, &DateRange::unbounded()) {
            Err(Error::UnsupportedFormat { member, .. }) => {
                assert_eq!(member, "Takeout/Location History/Location History.csv")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn takeout_without_data_file_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(dir.path(), "takeout.zip", &[("Takeout/archive_browser.html", MANIFEST)]);

        let err = ingest(&path, &DateRange::unbounded()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousArchive { found: 0, .. }), "{err}");
    }

    #[test]
    fn takeout_with_two_manifests_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(
            dir.path(),
            "takeout.zip",
            &[
                ("Takeout/archive_browser.html", MANIFEST),
                ("Takeout/index.html", MANIFEST),
            ],
        );

        let err = ingest(&path, &DateRange::unbounded()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousArchive { found: 2, .. }), "{err}");
    }

    #[test]
    fn unknown_archive_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(dir.path(), "holiday.zip", &[("photos/cat.jpg", "meow")]);

        match ingest(&path, &DateRange::unbounded()) {
            Err(Error::UnsupportedArchive { archive }) => assert_eq!(archive, path),
            other => panic!("expected UnsupportedArchive, got {other:?}"),
        }
    }

    #[test]
    fn workout_routes_are_filtered_by_file_name_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let may = route(52.52, 13.405, "2020-05-14T18:43:00Z");
        let june = route(48.8566, 2.3522, "2020-06-01T07:00:00Z");
        let undated = route(52.52, 13.405, "2020-05-20T07:00:00Z");
        let path = write_zip(
            dir.path(),
            "export.zip",
            &[
                ("apple_health_export/export.xml", "<HealthData/>"),
                ("apple_health_export/workout-routes/route_2020-05-14_6.43pm.gpx", may.as_str()),
                ("apple_health_export/workout-routes/route_2020-06-01_7.00am.gpx", june.as_str()),
                ("apple_health_export/workout-routes/route.gpx", undated.as_str()),
            ],
        );

        let all = ingest(&path, &DateRange::unbounded()).unwrap();
        assert_eq!(all.total_samples(), 3);
        assert_eq!(all.hottest(), Some((CoordinateKey::new(52.52, 13.405), 2)));

        let may_only = DateRange::new(
            Some(parse_date("2020-05-01").unwrap()),
            Some(parse_date("2020-05-31").unwrap()),
        );
        let filtered = ingest(&path, &may_only).unwrap();
        assert_eq!(filtered.total_samples(), 2);
        assert_eq!(filtered.count(&CoordinateKey::new(48.8566, 2.3522)), 0);
    }

    #[test]
    fn broken_workout_route_names_the_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(
            dir.path(),
            "export.zip",
            &[("apple_health_export/workout-routes/route_2020-05-14_6.43pm.gpx", "<gpx")],
        );

        match ingest(&path, &DateRange::unbounded()) {
            Err(Error::Parse { source_name, .. }) => {
                assert!(source_name.contains("route_2020-05-14_6.43pm.gpx"), "{source_name}")
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}

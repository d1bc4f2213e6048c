pub mod archive;
pub mod gpx;
pub mod json;
pub mod kml;

use geo::Point;
use std::io::Read;
use std::path::Path;

use crate::date_range::{DateRange, Timestamp};
use crate::error::ParseError;

/// One location reading as it comes out of a parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub point: Point,
    pub timestamp: Option<Timestamp>,
}

impl RawSample {
    pub fn new(latitude: f64, longitude: f64, timestamp: Option<Timestamp>) -> Self {
        RawSample {
            point: Point::new(longitude, latitude),
            timestamp,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.point.y()
    }

    pub fn longitude(&self) -> f64 {
        self.point.x()
    }
}

/// Receives every sample that survived the date filter.
pub trait SampleSink {
    fn accept(&mut self, sample: RawSample);
}

impl SampleSink for Vec<RawSample> {
    fn accept(&mut self, sample: RawSample) {
        self.push(sample);
    }
}

/// Applies a [`DateRange`] in front of a sink and keeps per-source counters.
pub struct SampleFilter<'a> {
    range: &'a DateRange,
    sink: &'a mut dyn SampleSink,
    accepted: u64,
    rejected: u64,
}

impl<'a> SampleFilter<'a> {
    pub fn new(range: &'a DateRange, sink: &'a mut dyn SampleSink) -> Self {
        SampleFilter {
            range,
            sink,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn range(&self) -> &DateRange {
        self.range
    }

    pub fn push(&mut self, sample: RawSample) -> bool {
        if self.range.accepts(sample.timestamp.as_ref()) {
            self.sink.accept(sample);
            self.accepted += 1;
            true
        } else {
            self.rejected += 1;
            false
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

// turn one document into filtered samples
pub trait Parser {
    fn parse(&self, reader: &mut dyn Read, out: &mut SampleFilter<'_>) -> Result<(), ParseError>;

    fn name(&self) -> &'static str;
}

/// Single-document formats that have a [`Parser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Kml,
    Gpx,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "json" => Some(DocumentFormat::Json),
            "kml" => Some(DocumentFormat::Kml),
            "gpx" => Some(DocumentFormat::Gpx),
            _ => None,
        }
    }

    pub fn parser(self, streaming: bool) -> Box<dyn Parser> {
        match self {
            DocumentFormat::Json if streaming => Box::new(json::StreamingJsonParser),
            DocumentFormat::Json => Box::new(json::JsonParser),
            DocumentFormat::Kml => Box::new(kml::KmlParser),
            DocumentFormat::Gpx => Box::new(gpx::GpxParser),
        }
    }
}

/// What an input path is, judged by its (case-sensitive) extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Document {
        format: DocumentFormat,
        gzipped: bool,
    },
    Archive,
}

impl InputFormat {
    pub fn classify(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let (stem, extension) = file_name.rsplit_once('.')?;
        match extension {
            "zip" => Some(InputFormat::Archive),
            "gz" => {
                let (_, inner) = stem.rsplit_once('.')?;
                DocumentFormat::from_extension(inner).map(|format| InputFormat::Document {
                    format,
                    gzipped: true,
                })
            }
            other => DocumentFormat::from_extension(other).map(|format| InputFormat::Document {
                format,
                gzipped: false,
            }),
        }
    }
}

use super::{Parser, RawSample, SampleFilter};
use gpx::Gpx;
use std::io::{BufReader, Read};

use crate::date_range::{DateRange, Timestamp};
use crate::error::ParseError;

/// Track points (`trkpt`) of a GPX document. Waypoints and route points are
/// planned positions, not visits, and are not counted.
pub struct GpxParser;

impl Parser for GpxParser {
    fn parse(&self, reader: &mut dyn Read, out: &mut SampleFilter<'_>) -> Result<(), ParseError> {
        let gpx: Gpx = gpx::read(BufReader::new(reader))?;
        for sample in track_samples(&gpx, !out.range().is_unbounded())? {
            out.push(sample);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "GPX Parser"
    }
}

fn track_samples(gpx: &Gpx, read_timestamps: bool) -> Result<Vec<RawSample>, ParseError> {
    let mut samples = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for track_point in &segment.points {
                let timestamp = match &track_point.time {
                    Some(time) if read_timestamps => Some(Timestamp::parse_iso(&time.format()?)?),
                    _ => None,
                };
                samples.push(RawSample {
                    point: track_point.point(),
                    timestamp,
                });
            }
        }
    }
    Ok(samples)
}

/// Parses a whole in-memory GPX document into unfiltered samples. Timestamps
/// are only carried when `range` has a bound to check them against.
pub fn read_samples(bytes: &[u8], range: &DateRange) -> Result<Vec<RawSample>, ParseError> {
    let gpx: Gpx = gpx::read(bytes)?;
    track_samples(&gpx, !range.is_unbounded())
}

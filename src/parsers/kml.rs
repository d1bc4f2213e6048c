use super::{Parser, RawSample, SampleFilter};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{BufReader, Read};

use crate::date_range::Timestamp;
use crate::error::ParseError;
use crate::hashable_point::round6;

/// Google location-history KML. Points live in `gx:coord` ("lon lat [alt]")
/// and are matched by position with the `when` elements of the same track.
pub struct KmlParser;

impl Parser for KmlParser {
    fn parse(&self, reader: &mut dyn Read, out: &mut SampleFilter<'_>) -> Result<(), ParseError> {
        let (coords, whens) = collect_track(reader)?;
        log::debug!("{} gx:coord and {} when elements", coords.len(), whens.len());
        let read_timestamps = !out.range().is_unbounded();

        for (i, coord) in coords.iter().enumerate() {
            let Some((latitude, longitude)) = parse_coord(coord) else {
                continue;
            };
            let timestamp = whens
                .get(i)
                .filter(|_| read_timestamps)
                .map(|when| Timestamp::parse_date_prefix(when))
                .transpose()?;
            out.push(RawSample::new(latitude, longitude, timestamp));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "KML Parser"
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    Coord,
    When,
}

impl Capture {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"gx:coord" => Some(Capture::Coord),
            b"when" => Some(Capture::When),
            _ => None,
        }
    }
}

/// Text content of every `gx:coord` and `when` element, in document order.
fn collect_track(reader: &mut dyn Read) -> Result<(Vec<String>, Vec<String>), ParseError> {
    let mut reader = Reader::from_reader(BufReader::new(reader));
    let mut buf = Vec::new();
    let mut coords = Vec::new();
    let mut whens = Vec::new();
    let mut capture: Option<Capture> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if let Some(kind) = Capture::from_tag(e.name().as_ref()) {
                    capture = Some(kind);
                    text.clear();
                }
            }
            Event::Empty(e) => match Capture::from_tag(e.name().as_ref()) {
                Some(Capture::Coord) => coords.push(String::new()),
                Some(Capture::When) => whens.push(String::new()),
                None => {}
            },
            Event::Text(e) if capture.is_some() => text.push_str(&e.unescape()?),
            Event::CData(e) if capture.is_some() => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(e) => {
                let closing = Capture::from_tag(e.name().as_ref());
                if closing.is_some() && closing == capture {
                    let value = std::mem::take(&mut text).trim().to_string();
                    match closing {
                        Some(Capture::Coord) => coords.push(value),
                        Some(Capture::When) => whens.push(value),
                        None => {}
                    }
                    capture = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((coords, whens))
}

/// KML orders axes longitude first; returns (latitude, longitude).
fn parse_coord(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.split_whitespace();
    let longitude: f64 = parts.next()?.parse().ok()?;
    let latitude: f64 = parts.next()?.parse().ok()?;
    Some((round6(latitude), round6(longitude)))
}

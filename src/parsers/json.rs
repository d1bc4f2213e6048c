use super::{Parser, RawSample, SampleFilter};
use serde::de::{self, DeserializeSeed, Deserializer as _, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use std::fmt;
use std::io::{BufReader, Read};

use crate::date_range::Timestamp;
use crate::error::ParseError;
use crate::hashable_point::round6;

const LOCATIONS_KEY: &str = "locations";

/// Which timestamp field a location-history export uses. Older exports carry
/// `timestampMs`, newer ones an ISO-8601 `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKey {
    Timestamp,
    TimestampMs,
}

impl TimestampKey {
    /// Decided once per file from the first record.
    pub fn detect(first_record: &Value) -> Self {
        if first_record.get("timestamp").is_some() {
            TimestampKey::Timestamp
        } else {
            TimestampKey::TimestampMs
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            TimestampKey::Timestamp => "timestamp",
            TimestampKey::TimestampMs => "timestampMs",
        }
    }

    fn parse(self, value: &Value) -> Result<Option<Timestamp>, ParseError> {
        let timestamp = match (self, value) {
            (_, Value::Null) => return Ok(None),
            (TimestampKey::Timestamp, Value::String(raw)) => Timestamp::parse_iso(raw)?,
            (TimestampKey::TimestampMs, Value::String(raw)) => Timestamp::parse_millis(raw)?,
            (TimestampKey::TimestampMs, Value::Number(n)) => match n.as_i64() {
                Some(millis) => Timestamp::from_millis(millis)?,
                None => return Err(ParseError::Timestamp(n.to_string())),
            },
            (_, other) => return Err(ParseError::Timestamp(other.to_string())),
        };
        Ok(Some(timestamp))
    }
}

fn e7_to_degrees(value: i64) -> f64 {
    round6(value as f64 / 1e7)
}

/// Records without both `latitudeE7` and `longitudeE7` yield `None`.
/// Timestamps are only read when `key` is set.
pub fn sample_from_record(
    record: &Value,
    key: Option<TimestampKey>,
) -> Result<Option<RawSample>, ParseError> {
    let (Some(lat_e7), Some(lon_e7)) = (
        record.get("latitudeE7").and_then(Value::as_i64),
        record.get("longitudeE7").and_then(Value::as_i64),
    ) else {
        return Ok(None);
    };

    let timestamp = match key {
        Some(key) => match record.get(key.field()) {
            Some(value) => key.parse(value)?,
            None => None,
        },
        None => None,
    };

    Ok(Some(RawSample::new(
        e7_to_degrees(lat_e7),
        e7_to_degrees(lon_e7),
        timestamp,
    )))
}

/// Loads the whole document, then walks `locations`.
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, reader: &mut dyn Read, out: &mut SampleFilter<'_>) -> Result<(), ParseError> {
        let document: Value = serde_json::from_reader(BufReader::new(reader))?;
        let locations = document
            .get(LOCATIONS_KEY)
            .and_then(Value::as_array)
            .ok_or(ParseError::MissingLocations)?;

        let Some(first) = locations.first() else {
            return Ok(());
        };
        // without bounds nothing is filtered, so timestamps are never parsed
        let key = (!out.range().is_unbounded()).then(|| TimestampKey::detect(first));
        log::debug!(
            "{} records, timestamps in `{}`",
            locations.len(),
            key.map_or("(ignored)", TimestampKey::field)
        );

        for record in locations {
            if let Some(sample) = sample_from_record(record, key)? {
                out.push(sample);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "JSON Parser"
    }
}

/// Same output as [`JsonParser`], but only one element of `locations` is held
/// in memory at a time.
pub struct StreamingJsonParser;

impl Parser for StreamingJsonParser {
    fn parse(&self, reader: &mut dyn Read, out: &mut SampleFilter<'_>) -> Result<(), ParseError> {
        let mut state = StreamState {
            read_timestamps: !out.range().is_unbounded(),
            out,
            key: None,
            failure: None,
        };
        let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(reader));

        let found = match (&mut deserializer).deserialize_map(Document(&mut state)) {
            Ok(found) => found,
            Err(e) => return Err(state.failure.take().unwrap_or(ParseError::Json(e))),
        };
        deserializer.end()?;

        if !found {
            return Err(ParseError::MissingLocations);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Streaming JSON Parser"
    }
}

struct StreamState<'s, 'a> {
    out: &'s mut SampleFilter<'a>,
    read_timestamps: bool,
    key: Option<TimestampKey>,
    // typed error stashed while serde only carries a message
    failure: Option<ParseError>,
}

impl StreamState<'_, '_> {
    fn ingest(&mut self, record: &Value) -> Result<(), ParseError> {
        let key = self
            .read_timestamps
            .then(|| *self.key.get_or_insert_with(|| TimestampKey::detect(record)));
        if let Some(sample) = sample_from_record(record, key)? {
            self.out.push(sample);
        }
        Ok(())
    }
}

/// Top-level object: feeds `locations` through [`Locations`] and skips
/// every other key. Yields whether `locations` was seen.
struct Document<'r, 's, 'a>(&'r mut StreamState<'s, 'a>);

impl<'de> Visitor<'de> for Document<'_, '_, '_> {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a location history object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<bool, A::Error> {
        let state = self.0;
        let mut found = false;
        while let Some(key) = map.next_key::<String>()? {
            if key == LOCATIONS_KEY {
                map.next_value_seed(Locations(&mut *state))?;
                found = true;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

struct Locations<'r, 's, 'a>(&'r mut StreamState<'s, 'a>);

impl<'de> DeserializeSeed<'de> for Locations<'_, '_, '_> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Locations<'_, '_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of location records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let state = self.0;
        while let Some(record) = seq.next_element::<Value>()? {
            if let Err(e) = state.ingest(&record) {
                let message = e.to_string();
                state.failure = Some(e);
                return Err(de::Error::custom(message));
            }
        }
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use crate::aggregator::Aggregator;
use crate::config::{IngestOptions, RunConfig};
use crate::error::Error;
use crate::hashable_point::CoordinateKey;
use crate::io::{expand_inputs, open_input, write_output};
use crate::parsers::{InputFormat, SampleFilter, archive};
use crate::render::Heatmap;

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    pub accepted_samples: u64,
    pub distinct_points: usize,
    pub hottest: Option<(CoordinateKey, u64)>,
    pub output: PathBuf,
}

/// Feeds one input file into `aggregator`, dispatching on its extension.
/// Returns the number of samples that passed the date filter.
pub fn ingest_file(
    path: &Path,
    options: &IngestOptions,
    aggregator: &mut Aggregator,
) -> Result<u64, Error> {
    let format = InputFormat::classify(path).ok_or_else(|| Error::UnsupportedExtension {
        path: path.to_path_buf(),
    })?;
    let mut out = SampleFilter::new(&options.range, aggregator);

    match format {
        InputFormat::Archive => archive::ingest_archive(path, options, &mut out)?,
        InputFormat::Document { format, gzipped } => {
            let parser = format.parser(options.streaming);
            log::debug!("Running {} on {}", parser.name(), path.display());
            let mut reader = open_input(path, gzipped)?;
            parser
                .parse(&mut reader, &mut out)
                .map_err(|source| Error::parse(path.display().to_string(), source))?;
        }
    }

    log::info!(
        "✓ {}: {} samples accepted, {} outside the date range",
        path.display(),
        out.accepted(),
        out.rejected()
    );
    Ok(out.accepted())
}

/// Aggregates every input in order, searching directories for supported
/// files. The first failing input aborts the whole run.
pub fn ingest(inputs: &[PathBuf], options: &IngestOptions) -> Result<Aggregator, Error> {
    ingest_files(&expand_inputs(inputs)?, options)
}

pub fn ingest_files(files: &[PathBuf], options: &IngestOptions) -> Result<Aggregator, Error> {
    let mut aggregator = Aggregator::new();

    let bar = options.progress_bar(files.len() as u64, "files");
    for (i, path) in files.iter().enumerate() {
        log::info!("({}/{}) Loading data from {}", i + 1, files.len(), path.display());
        ingest_file(path, options, &mut aggregator)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(aggregator)
}

/// Parse, aggregate, render and save.
pub fn run(config: &RunConfig) -> Result<RunSummary, Error> {
    let files = expand_inputs(&config.inputs)?;
    let aggregator = ingest_files(&files, &config.ingest)?;
    log::info!(
        "Aggregated {} samples into {} distinct coordinates",
        aggregator.total_samples(),
        aggregator.distinct_points()
    );
    if aggregator.is_empty() {
        log::warn!("No location samples matched; the heatmap will be empty");
    }

    log::info!("Generating heatmap");
    let html = Heatmap::from_aggregator(&aggregator, &config.heatmap)
        .to_html()
        .map_err(|e| Error::Write {
            path: config.output.clone(),
            source: e.into(),
        })?;

    log::info!("Saving map to {}", config.output.display());
    write_output(&config.output, &html)?;

    Ok(RunSummary {
        files: files.len(),
        accepted_samples: aggregator.total_samples(),
        distinct_points: aggregator.distinct_points(),
        hottest: aggregator.hottest(),
        output: config.output.clone(),
    })
}

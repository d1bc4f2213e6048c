use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Error;
use crate::parsers::InputFormat;

/// Opens a document for reading, decompressing `.gz` inputs on the fly.
pub fn open_input(path: &Path, gzipped: bool) -> Result<Box<dyn Read>, Error> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    if gzipped {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Replaces every directory in `inputs` with the supported files below it, in
/// file-name order. Plain file arguments are passed through untouched so that
/// unsupported ones still fail later.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let before = files.len();
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io {
                path: e.path().map_or_else(|| input.clone(), Path::to_path_buf),
                source: e.into(),
            })?;
            if entry.file_type().is_file() && InputFormat::classify(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }
        log::info!(
            "Found {} supported files in {}",
            files.len() - before,
            input.display()
        );
    }
    Ok(files)
}

/// Writes the rendered artifact, creating missing parent directories.
pub fn write_output(path: &Path, contents: &str) -> Result<(), Error> {
    let write_error = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

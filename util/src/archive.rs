//! CSV archiving functionality
//!
//! An [`Archiver`] writes rows into a CSV file in the session's archive
//! directory. Rows are named values, the names of the first row becoming the
//! header (see [`Archiver::write_named_row`]).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,

    /// Column names of the named rows written so far
    columns: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file: {0}")]
    CreateError(std::io::Error),

    #[error("Cannot write to the archive: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error),

    #[error("The archiver has no open file")]
    NotInitialised,

    #[error("Row has columns {found:?} but the archive was started with {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(session: &Session, path: P) -> Result<Self, ArchiveError> {
        Self::from_full_path(session.arch_root.join(path))
    }

    /// Create a new archiver writing to the given path, truncating any
    /// existing file.
    pub fn from_full_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let file = File::create(path).map_err(ArchiveError::CreateError)?;

        // Headers are written by hand in `write_named_row`
        let w = WriterBuilder::new().has_headers(false).from_writer(file);

        Ok(Self {
            writer: Some(w),
            columns: None,
        })
    }

    /// Write a row of named values.
    ///
    /// The names of the first row become the header of the file. Every
    /// following row must carry the same names in the same order.
    pub fn write_named_row<'a, I>(&mut self, row: I) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let w = self.writer.as_mut().ok_or(ArchiveError::NotInitialised)?;

        let (names, values): (Vec<String>, Vec<String>) = row
            .into_iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .unzip();

        match self.columns {
            Some(ref expected) => {
                if *expected != names {
                    return Err(ArchiveError::ColumnMismatch {
                        expected: expected.clone(),
                        found: names,
                    });
                }
            }
            None => {
                w.write_record(&names)?;
                self.columns = Some(names);
            }
        }

        w.write_record(&values)?;
        w.flush().map_err(ArchiveError::FlushError)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_named_rows() {
        let path = std::env::temp_dir().join("util_archive_test_named_rows.csv");

        {
            let mut arch = Archiver::from_full_path(&path).unwrap();
            arch.write_named_row(vec![("time_s", 0.0), ("com_z", 0.5)])
                .unwrap();
            arch.write_named_row(vec![("time_s", 0.1), ("com_z", 0.25)])
                .unwrap();

            assert!(arch
                .write_named_row(vec![("time_s", 0.2)])
                .is_err());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["time_s,com_z", "0,0.5", "0.1,0.25"]);

        std::fs::remove_file(&path).ok();
    }
}

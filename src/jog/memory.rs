//! # Stored Points Persistence
//!
//! Memory slots survive restarts in a small text file, one line per set slot:
//!
//! ```text
//!  0:  120.00   80.50    2.00
//!  3:   10.00   10.00   15.00
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::vector::{Axis, AxisVector};
use crate::error::{JogError, Result};

/// Where memory slots are loaded from and saved to.
#[cfg_attr(test, mockall::automock)]
pub trait MemoryStore: Send {
    /// Stored points for `slots` slots; unset slots are `None`.
    fn load(&self, slots: usize) -> Result<Vec<Option<AxisVector>>>;

    /// Replace the persisted table.
    fn save(&mut self, points: &[Option<AxisVector>]) -> Result<()>;
}

/// Memory slots are kept for the session only.
#[derive(Debug, Default)]
pub struct NoStore;

impl MemoryStore for NoStore {
    fn load(&self, slots: usize) -> Result<Vec<Option<AxisVector>>> {
        Ok(vec![None; slots])
    }

    fn save(&mut self, _points: &[Option<AxisVector>]) -> Result<()> {
        Ok(())
    }
}

/// Text file of stored points.
#[derive(Debug, Clone)]
pub struct PointsFile {
    path: PathBuf,
}

impl PointsFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Format the points table, skipping unset slots.
#[must_use]
pub fn format_points(points: &[Option<AxisVector>]) -> String {
    let mut out = String::new();
    for (slot, point) in points.iter().enumerate() {
        if let Some(p) = point {
            let _ = write!(out, "{:2}:", slot);
            for (_, value) in p.iter() {
                let _ = write!(out, " {:7.2}", value);
            }
            out.push('\n');
        }
    }
    out
}

/// Parse a points table for `slots` slots.
///
/// Malformed lines and slot numbers out of range are skipped. A point with
/// a negative X marks its slot as unset.
#[must_use]
pub fn parse_points(text: &str, slots: usize) -> Vec<Option<AxisVector>> {
    let mut points = vec![None; slots];
    for line in text.lines() {
        match parse_line(line) {
            Some((slot, point)) if slot < slots => {
                points[slot] = (point[Axis::X] >= 0.0).then_some(point);
            }
            Some((slot, _)) => debug!("Ignoring stored point for slot {}", slot),
            None if line.trim().is_empty() => {}
            None => debug!("Ignoring malformed stored point: '{}'", line),
        }
    }
    points
}

fn parse_line(line: &str) -> Option<(usize, AxisVector)> {
    let (slot, coords) = line.split_once(':')?;
    let slot = slot.trim().parse().ok()?;
    let mut values = coords.split_whitespace().map(str::parse::<f32>);
    let x = values.next()?.ok()?;
    let y = values.next()?.ok()?;
    let z = values.next()?.ok()?;
    Some((slot, AxisVector::new(x, y, z)))
}

impl MemoryStore for PointsFile {
    fn load(&self, slots: usize) -> Result<Vec<Option<AxisVector>>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(parse_points(&text, slots)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![None; slots]),
            Err(e) => Err(JogError::Persistence(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&mut self, points: &[Option<AxisVector>]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let persist = || -> std::io::Result<()> {
            fs::write(&tmp, format_points(points))?;
            fs::rename(&tmp, &self.path)
        };
        persist().map_err(|e| {
            JogError::Persistence(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_matches_fixed_columns() {
        let text = format_points(&[
            Some(AxisVector::new(120.0, 80.5, 2.0)),
            None,
            Some(AxisVector::new(1.234, 0.0, 300.0)),
        ]);
        assert_eq!(text, " 0:  120.00   80.50    2.00\n 2:    1.23    0.00  300.00\n");
    }

    #[test]
    fn test_parse_skips_bad_lines_and_slots() {
        let text = " 0:  1.00 2.00 3.00\n\
                    garbage\n\
                    9: 4 5 6\n\
                    1: 7 8\n\
                    \n\
                    2:10 11 12\n";
        let points = parse_points(text, 3);
        assert_eq!(
            points,
            vec![
                Some(AxisVector::new(1.0, 2.0, 3.0)),
                None,
                Some(AxisVector::new(10.0, 11.0, 12.0)),
            ]
        );
    }

    #[test]
    fn test_negative_x_is_unset() {
        let text = " 0:   -1.00    2.00    3.00\n 1:    0.00   -2.00   -3.00\n";
        assert_eq!(
            parse_points(text, 2),
            vec![None, Some(AxisVector::new(0.0, -2.0, -3.0))]
        );
    }

    #[test]
    fn test_missing_file_is_all_unset() {
        let dir = TempDir::new().unwrap();
        let store = PointsFile::new(dir.path().join("points"));
        assert_eq!(store.load(4).unwrap(), vec![None; 4]);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut store = PointsFile::new(dir.path().join("points"));
        let points = vec![None, Some(AxisVector::new(10.0, 20.25, 3.5))];

        store.save(&points).unwrap();
        assert_eq!(store.load(2).unwrap(), points);
        // the temporary file is renamed into place
        assert!(!dir.path().join("points.tmp").exists());
        // fewer slots configured than stored
        assert_eq!(store.load(1).unwrap(), vec![None]);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = PointsFile::new(dir.path().join("nope").join("points"));
        let result = store.save(&[Some(AxisVector::ZERO)]);
        assert!(matches!(result, Err(JogError::Persistence(_))));
    }

    #[test]
    fn test_no_store() {
        let mut store = NoStore;
        store.save(&[Some(AxisVector::ZERO)]).unwrap();
        assert_eq!(store.load(2).unwrap(), vec![None, None]);
    }
}

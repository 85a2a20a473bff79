// pgm.rs - Binary PGM (P5) files as the image store

use crate::error::ImageError;
use crate::grid::Grid;
use crate::image::ImageStore;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reads `<input_dir>/<name>.pgm`, writes `<output_dir>/<name>.pgm`.
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir.join(format!("{name}.pgm"))
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.pgm"))
    }
}

impl ImageStore for PgmStore {
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Grid, ImageError> {
        let path = self.input_path(name);
        let bytes = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ImageError::NotFound {
                name: name.to_owned(),
            },
            _ => ImageError::Io { path, source },
        })?;
        decode(name, &bytes, width, height)
    }

    fn store(&mut self, name: &str, grid: &Grid) -> Result<(), ImageError> {
        let path = self.output_path(name);
        write_file(&path, &encode(grid)).map_err(|source| ImageError::Io { path, source })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, bytes)
}

/// `P5` header followed by one byte per cell, 255 for alive.
pub fn encode(grid: &Grid) -> Vec<u8> {
    let mut bytes = format!("P5\n{} {}\n255\n", grid.width(), grid.height()).into_bytes();
    bytes.extend(grid.to_bytes());
    bytes
}

/// Parses a `P5` image that must be exactly `width` x `height`. The header is
/// checked before anything is allocated.
pub fn decode(name: &str, bytes: &[u8], width: usize, height: usize) -> Result<Grid, ImageError> {
    let malformed = |reason: &str| ImageError::Malformed {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    let mut header = Header { bytes, pos: 0 };
    if header.token() != Some(b"P5".as_slice()) {
        return Err(malformed("not a binary PGM (missing P5 magic)"));
    }
    let actual_width = header.number().ok_or_else(|| malformed("bad width"))?;
    let actual_height = header.number().ok_or_else(|| malformed("bad height"))?;
    let max_value = header.number().ok_or_else(|| malformed("bad maximum value"))?;
    if !(1..=255).contains(&max_value) {
        return Err(malformed("only 8-bit images are supported"));
    }
    if (actual_width, actual_height) != (width, height) {
        return Err(ImageError::DimensionMismatch {
            name: name.to_owned(),
            width,
            height,
            actual_width,
            actual_height,
        });
    }

    // Exactly one whitespace byte separates the header from the raster.
    let start = header.pos + 1;
    let end = width
        .checked_mul(height)
        .and_then(|cells| cells.checked_add(start))
        .ok_or_else(|| malformed("width x height does not fit in memory"))?;
    let raster = bytes
        .get(start..end)
        .ok_or_else(|| malformed("raster is shorter than width x height"))?;
    Ok(Grid::from_bytes(width, height, raster))
}

struct Header<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    /// Next whitespace-separated token, skipping `#` comments.
    fn token(&mut self) -> Option<&'a [u8]> {
        loop {
            match self.bytes.get(self.pos)? {
                byte if byte.is_ascii_whitespace() => self.pos += 1,
                b'#' => {
                    while self.bytes.get(self.pos).is_some_and(|&byte| byte != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|byte| !byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
        Some(&self.bytes[start..self.pos])
    }

    fn number(&mut self) -> Option<usize> {
        std::str::from_utf8(self.token()?).ok()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn header_comments_are_skipped() {
        let mut bytes = b"P5\n# made by hand\n3 2\n# still header\n255\n".to_vec();
        bytes.extend([0, 255, 0, 1, 0, 0]);
        let grid = decode("x", &bytes, 3, 2).unwrap();
        assert_eq!(grid, Grid::from_ascii(&[".#.", "#.."]));
    }

    #[test]
    fn short_raster_is_malformed() {
        let bytes = b"P5 4 4 255\n\x00\x00".to_vec();
        assert!(matches!(decode("x", &bytes, 4, 4), Err(ImageError::Malformed { .. })));
    }

    #[test]
    fn ascii_pgm_is_rejected() {
        assert!(matches!(decode("x", b"P2 1 1 255\n0", 1, 1), Err(ImageError::Malformed { .. })));
    }

    #[test]
    fn oversized_header_is_an_error() {
        let bytes = format!("P5 {} 2 255\n", usize::MAX).into_bytes();
        assert!(matches!(
            decode("x", &bytes, 2, 2),
            Err(ImageError::DimensionMismatch { actual_width: usize::MAX, actual_height: 2, .. })
        ));
        assert!(matches!(decode("x", &bytes, usize::MAX, 2), Err(ImageError::Malformed { .. })));
        assert!(matches!(decode("x", b"P5 4000000000 0 255\n", 2, 2), Err(ImageError::DimensionMismatch { .. })));
    }

    #[test]
    fn encoded_grid_decodes_to_itself() {
        let grid = Grid::from_ascii(&["#..#", ".##.", "...."]);
        assert_eq!(decode("x", &encode(&grid), 4, 3).unwrap(), grid);
    }

    #[test]
    fn store_writes_where_load_reads() {
        let dir = env::temp_dir().join(format!("conway_halo_pgm_{}", std::process::id()));
        let mut store = PgmStore::new(&dir, &dir);
        let grid = Grid::from_ascii(&["#.", ".#"]);

        store.store("2x2", &grid).unwrap();
        assert_eq!(store.load("2x2", 2, 2).unwrap(), grid);
        assert!(matches!(store.load("2x2", 3, 3), Err(ImageError::DimensionMismatch { .. })));
        assert!(matches!(store.load("9x9", 9, 9), Err(ImageError::NotFound { .. })));

        let _ = fs::remove_dir_all(&dir);
    }
}

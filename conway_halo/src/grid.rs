// grid.rs - Toroidal grid types for Conway's Game of Life

use std::fmt;

/// Byte written to images for a live cell. Any nonzero byte reads as alive.
pub const ALIVE: u8 = 0xFF;
pub const DEAD: u8 = 0x00;

/// One row of cells, `true` = alive.
pub type Row = Vec<bool>;

/// Position of a single cell: `x` is the column, `y` the row. Orders
/// row-major, like [`Grid::alive_cells`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub y: usize,
    pub x: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Wraps a possibly negative index onto `0..len`.
#[inline]
pub fn wrap(index: isize, len: usize) -> usize {
    index.rem_euclid(len as isize) as usize
}

/// The Life rule.
#[inline]
pub fn next_state(alive: bool, neighbours: u8) -> bool {
    match (alive, neighbours) {
        (true, 2) | (true, 3) => true,   // Survival
        (false, 3)            => true,   // Birth
        _                     => false,  // Death or stays dead
    }
}

/// Rectangular grid of cells whose edges wrap around in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    rows: Vec<Row>,
}

impl Grid {
    /// All-dead grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            rows: vec![vec![false; width]; height],
        }
    }

    /// Builds a grid from rows in top-to-bottom order.
    ///
    /// # Panics
    /// If the rows are not all the same width.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        assert!(
            rows.iter().all(|row| row.len() == width),
            "all rows must have the same width"
        );
        Self { width, rows }
    }

    /// Builds a grid with exactly the given cells alive. Coordinates wrap.
    pub fn from_cells(width: usize, height: usize, cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut grid = Self::new(width, height);
        for cell in cells {
            grid.set(cell.x % width, cell.y % height, true);
        }
        grid
    }

    /// Reads `width * height` image bytes in row-major order, nonzero = alive.
    /// Missing trailing bytes are dead cells.
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Self {
        let mut grid = Self::new(width, height);
        for (index, &value) in bytes.iter().take(width * height).enumerate() {
            grid.rows[index / width][index % width] = value != DEAD;
        }
        grid
    }

    /// Parses rows of `#` (alive) and `.` (dead).
    ///
    /// # Panics
    /// On any other character or ragged rows.
    pub fn from_ascii(lines: &[&str]) -> Self {
        let rows = lines
            .iter()
            .map(|line| {
                line.bytes()
                    .map(|byte| match byte {
                        b'#' => true,
                        b'.' => false,
                        _ => panic!("pattern rows may only contain '.' or '#'"),
                    })
                    .collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row `y`, wrapping toroidally.
    pub fn row(&self, y: isize) -> &Row {
        &self.rows[wrap(y, self.height())]
    }

    /// Cell state with toroidal wraparound on both axes.
    pub fn get_wrapped(&self, x: isize, y: isize) -> bool {
        self.row(y)[wrap(x, self.width)]
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.rows[y][x] = alive;
    }

    /// Image bytes in row-major order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.rows
            .iter()
            .flatten()
            .map(|&alive| if alive { ALIVE } else { DEAD })
            .collect()
    }

    /// Live cells in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(_, &alive)| alive)
                    .map(move |(x, _)| Cell::new(x, y))
            })
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.rows.iter().map(|row| count_alive(row)).sum()
    }

    /// Live neighbours of `(x, y)` among its 8 toroidal neighbours.
    pub fn live_neighbours(&self, x: usize, y: usize) -> u8 {
        let (x, y) = (x as isize, y as isize);
        let mut count = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) != (0, 0) && self.get_wrapped(x + dx, y + dy) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Whole-grid single-threaded step. Reference for the banded engine.
    pub fn next_generation(&self) -> Grid {
        let rows = (0..self.height())
            .map(|y| {
                (0..self.width)
                    .map(|x| next_state(self.rows[y][x], self.live_neighbours(x, y)))
                    .collect()
            })
            .collect();
        Grid {
            width: self.width,
            rows,
        }
    }
}

pub fn count_alive(row: &[bool]) -> usize {
    row.iter().filter(|&&alive| alive).count()
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            for &alive in row {
                f.write_str(if alive { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_handles_both_edges() {
        assert_eq!(wrap(-1, 5), 4);
        assert_eq!(wrap(5, 5), 0);
        assert_eq!(wrap(2, 5), 2);
        assert_eq!(wrap(-6, 5), 4);
    }

    #[test]
    fn neighbours_wrap_across_corners() {
        let grid = Grid::from_ascii(&[
            "#...",
            "....",
            "....",
            "...#",
        ]);
        // (0,0) and (3,3) touch diagonally through the corner
        assert_eq!(grid.live_neighbours(0, 0), 1);
        assert_eq!(grid.live_neighbours(3, 3), 1);
        assert_eq!(grid.live_neighbours(1, 1), 1);
        assert_eq!(grid.live_neighbours(2, 2), 1);
    }

    #[test]
    fn bytes_round_trip_keeps_nonzero_as_alive() {
        let grid = Grid::from_bytes(3, 2, &[0, 1, 0, 0xFF, 0, 7]);
        assert_eq!(grid.alive_cells(), vec![Cell::new(1, 0), Cell::new(0, 1), Cell::new(2, 1)]);
        assert_eq!(grid.to_bytes(), vec![0, ALIVE, 0, ALIVE, 0, ALIVE]);
    }

    #[test]
    fn cells_sort_row_major() {
        let grid = Grid::from_ascii(&[
            "...#",
            "#...",
            ".#..",
        ]);
        let mut cells = vec![Cell::new(1, 2), Cell::new(0, 1), Cell::new(3, 0)];
        cells.sort();
        assert_eq!(cells, grid.alive_cells());
    }

    #[test]
    fn isolated_cell_dies() {
        let grid = Grid::from_cells(5, 5, [Cell::new(2, 2)]);
        assert_eq!(grid.next_generation().alive_count(), 0);
    }

    #[test]
    fn block_is_still() {
        let grid = Grid::from_ascii(&[
            "......",
            ".##...",
            ".##...",
            "......",
        ]);
        assert_eq!(grid.next_generation(), grid);
    }

    #[test]
    fn display_uses_hash_and_dot() {
        let grid = Grid::from_ascii(&["#.", ".#"]);
        assert_eq!(grid.to_string(), "#.\n.#\n");
    }
}

// partition.rs - Splitting the grid into horizontal bands, one per worker

use crate::grid::{Grid, Row};

/// Rows owned by one worker: `start..start + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub index: usize,
    pub start: usize,
    pub height: usize,
}

impl Band {
    pub fn end(&self) -> usize {
        self.start + self.height
    }

    /// The band's rows with one halo row above and one below, copied from
    /// `grid` with toroidal wraparound. This is what a worker starts from.
    pub fn rows_with_halos(&self, grid: &Grid) -> Vec<Row> {
        let first = self.start as isize - 1;
        (0..self.height + 2)
            .map(|offset| grid.row(first + offset as isize).clone())
            .collect()
    }
}

/// Rows per worker. The first `height % workers` workers get one extra row.
///
/// # Panics
/// If `workers` is zero.
pub fn band_heights(height: usize, workers: usize) -> Vec<usize> {
    assert!(workers > 0, "at least one worker is required");
    let base = height / workers;
    let big_workers = height % workers;
    (0..workers)
        .map(|index| if index < big_workers { base + 1 } else { base })
        .collect()
}

/// Bands in ring order, laid out by prefix sums of [`band_heights`].
pub fn bands(height: usize, workers: usize) -> Vec<Band> {
    let mut start = 0;
    band_heights(height, workers)
        .into_iter()
        .enumerate()
        .map(|(index, band_height)| {
            let band = Band {
                index,
                start,
                height: band_height,
            };
            start += band_height;
            band
        })
        .collect()
}

/// Concatenates band interiors in ring order back into a grid.
pub fn assemble(bands: impl IntoIterator<Item = Vec<Row>>) -> Grid {
    Grid::from_rows(bands.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns;

    #[test]
    fn remainder_goes_to_the_first_workers() {
        assert_eq!(band_heights(10, 3), vec![4, 3, 3]);
        assert_eq!(band_heights(11, 3), vec![4, 4, 3]);
        assert_eq!(band_heights(12, 3), vec![4, 4, 4]);
        assert_eq!(band_heights(5, 5), vec![1, 1, 1, 1, 1]);
        assert_eq!(band_heights(7, 1), vec![7]);
    }

    #[test]
    fn bands_are_contiguous() {
        let bands = bands(16, 5);
        assert_eq!(bands[0].start, 0);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
        assert_eq!(bands.last().unwrap().end(), 16);
    }

    #[test]
    fn halos_wrap_at_grid_edges() {
        let mut grid = Grid::new(8, 6);
        patterns::apply_random_pattern(&mut grid, 3);
        let bands = bands(6, 2);

        let first = bands[0].rows_with_halos(&grid);
        assert_eq!(first.len(), 5);
        assert_eq!(first[0], grid.rows()[5]);
        assert_eq!(&first[1..4], &grid.rows()[0..3]);
        assert_eq!(first[4], grid.rows()[3]);

        let last = bands[1].rows_with_halos(&grid);
        assert_eq!(last[0], grid.rows()[2]);
        assert_eq!(last[4], grid.rows()[0]);
    }

    #[test]
    fn single_band_halos_are_its_own_edges() {
        let mut grid = Grid::new(4, 3);
        patterns::apply_random_pattern(&mut grid, 11);
        let rows = bands(3, 1)[0].rows_with_halos(&grid);
        assert_eq!(rows[0], grid.rows()[2]);
        assert_eq!(rows[4], grid.rows()[0]);
    }
}

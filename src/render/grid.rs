/// Fixed-size two-dimensional buffer stored row-major, so `(i, j)` lives at
/// `i * cols + j`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    cells: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Clone> Grid<T> {
    pub fn new(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            cells: vec![fill; rows * cols],
            rows,
            cols,
        }
    }
}

impl<T> Grid<T> {
    #[cfg(test)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[cfg(test)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.rows, "row {} out of {}", i, self.rows);
        debug_assert!(j < self.cols, "column {} out of {}", j, self.cols);
        i * self.cols + j
    }

    #[cfg(test)]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.cells[self.offset(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let offset = self.offset(i, j);
        self.cells[offset] = value;
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_row_major() {
        let mut grid = Grid::new(2, 3, 0);
        for i in 0..2 {
            for j in 0..3 {
                grid.set(i, j, i * 10 + j);
            }
        }
        assert_eq!(grid.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(*grid.get(1, 2), 12);
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "column 3 out of 3")]
    fn column_overflow_is_caught() {
        let grid = Grid::new(2, 3, 0u8);
        grid.get(0, 3);
    }
}

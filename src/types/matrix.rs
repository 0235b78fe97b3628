use derive_more as d;
use rayon::iter::{Enumerate, IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;
use std::ops::{Index, IndexMut};

/// Row-major 2D grid. Score maps and summed-area tables are stored in one of these.
#[derive(d::AsRef, d::AsMut, Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    #[as_ref]
    #[as_mut]
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T> Matrix<T> {
    pub fn new(rows: usize, cols: usize, init: T) -> Matrix<T>
    where
        T: Copy,
    {
        Matrix {
            data: vec![init; rows * cols],
            rows,
            cols,
        }
    }

    // Uses the default function of T to create a (symbolically) empty Matrix
    pub fn new_default(rows: usize, cols: usize) -> Matrix<T>
    where
        T: Default + Copy,
    {
        Matrix::new(rows, cols, T::default())
    }

    /// Builds a matrix from row-major data.
    /// Returns `None` when the length disagrees with the shape.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Option<Matrix<T>> {
        (data.len() == rows * cols).then_some(Matrix { data, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Yields `(row, col, value)` in row-major order.
    pub fn indexed_iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let cols = self.cols.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (i / cols, i % cols, v))
    }

    pub fn transposed(&self) -> Matrix<T>
    where
        T: Copy,
    {
        let mut data = Vec::with_capacity(self.data.len());
        for col in 0..self.cols {
            for row in 0..self.rows {
                data.push(self.data[row * self.cols + col]);
            }
        }
        Matrix {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }
}

impl<T: Send + Sync> Matrix<T> {
    pub fn par_iter_rows_mut(&mut self) -> impl ParallelIterator<Item = &mut [T]> {
        let cols = self.cols.max(1);
        self.data.par_chunks_mut(cols)
    }

    pub fn par_enumerate_rows_mut(&mut self) -> Enumerate<rayon::slice::ChunksMut<'_, T>> {
        let cols = self.cols.max(1);
        self.data.par_chunks_mut(cols).enumerate()
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (row, col) = index;
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (row, col) = index;
        &mut self.data[row * self.cols + col]
    }
}

use crate::config::SPECIES_COUNT;
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub cols: usize,
    pub rows: usize,
}

impl GridDimensions {
    /// Each axis is scaled, rounded, then lifted to the next power of two independently.
    pub fn from_viewport(width: u32, height: u32, scale: f64) -> Self {
        Self {
            cols: ceil_power_of_two((width as f64 * scale).round() as usize),
            rows: ceil_power_of_two((height as f64 * scale).round() as usize),
        }
    }

    pub fn new(cols: usize, rows: usize) -> Self {
        debug_assert!(cols.is_power_of_two() && rows.is_power_of_two());
        Self { cols, rows }
    }

    pub fn col_mask(&self) -> usize {
        self.cols - 1
    }

    pub fn row_mask(&self) -> usize {
        self.rows - 1
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Cell index for signed coordinates, wrapped toroidally.
    #[inline]
    pub fn wrapped_index(&self, x: i64, y: i64) -> usize {
        let cx = (x as usize) & self.col_mask();
        let cy = (y as usize) & self.row_mask();
        cy * self.cols + cx
    }
}

pub fn ceil_power_of_two(value: usize) -> usize {
    value.max(1).next_power_of_two()
}

/// Double-buffered toroidal trail intensities, one u8 plane per species.
///
/// Dimensions are powers of two so neighbor and sensor lookups wrap with
/// `coord & (dim - 1)`. Each buffer is laid out plane-major: species `s` occupies
/// `[s * cells, (s + 1) * cells)`. Exactly one buffer is current at any time.
#[derive(Clone, Debug)]
pub struct TrailField {
    dims: GridDimensions,
    buffers: [Vec<u8>; 2],
    current: usize,
    generation: u64,
}

impl TrailField {
    pub fn new(dims: GridDimensions) -> Self {
        let len = dims.cell_count() * SPECIES_COUNT;
        Self {
            dims,
            buffers: [vec![0; len], vec![0; len]],
            current: 0,
            generation: 0,
        }
    }

    pub fn dims(&self) -> GridDimensions {
        self.dims
    }

    /// Bumped on every reallocation so snapshots can tell which buffers they came from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current(&self) -> &[u8] {
        &self.buffers[self.current]
    }

    pub fn plane(&self, species: usize) -> &[u8] {
        let cells = self.dims.cell_count();
        &self.current()[species * cells..(species + 1) * cells]
    }

    pub fn get(&self, species: usize, x: usize, y: usize) -> u8 {
        self.plane(species)[y * self.dims.cols + x]
    }

    pub fn set(&mut self, species: usize, x: usize, y: usize, value: u8) {
        let cells = self.dims.cell_count();
        let idx = species * cells + y * self.dims.cols + x;
        self.buffers[self.current][idx] = value;
    }

    pub fn total(&self) -> u64 {
        self.current().iter().map(|&v| v as u64).sum()
    }

    /// Zero both buffers and make the first one current.
    pub fn clear(&mut self) {
        for buf in &mut self.buffers {
            buf.fill(0);
        }
        self.current = 0;
    }

    /// Reallocate at new dimensions. Trail content is not migrated.
    pub fn reallocate(&mut self, dims: GridDimensions) {
        let len = dims.cell_count() * SPECIES_COUNT;
        self.dims = dims;
        self.buffers = [vec![0; len], vec![0; len]];
        self.current = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Read/write halves for one tick: (current, next).
    pub fn source_and_dest(&mut self) -> (&[u8], &mut [u8]) {
        let [a, b] = &mut self.buffers;
        if self.current == 0 {
            (a.as_slice(), b.as_mut_slice())
        } else {
            (b.as_slice(), a.as_mut_slice())
        }
    }

    /// Make the buffer just written the current one.
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Copy of the current buffer that outlives later ticks and reallocations.
    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            dims: self.dims,
            generation: self.generation,
            data: Arc::from(self.current()),
        }
    }
}

/// Immutable copy of one field buffer, shared with export workers.
#[derive(Clone, Debug)]
pub struct FieldSnapshot {
    pub dims: GridDimensions,
    pub generation: u64,
    pub data: Arc<[u8]>,
}

impl FieldSnapshot {
    pub fn plane(&self, species: usize) -> &[u8] {
        let cells = self.dims.cell_count();
        &self.data[species * cells..(species + 1) * cells]
    }
}

/// Blur every plane with its 3x3 toroidal mean, blend by `diffuse_weight`, subtract
/// `decay_rate`, clamp to [0, 255], and write into `dest`.
///
/// Only `source` is read and only `dest` is written, so rows run in parallel.
pub fn diffuse_decay(
    source: &[u8],
    dest: &mut [u8],
    dims: GridDimensions,
    decay_rate: f32,
    diffuse_weight: f32,
) {
    let cols = dims.cols;
    let cells = dims.cell_count();
    debug_assert_eq!(source.len(), dest.len());
    debug_assert_eq!(source.len() % cells, 0);

    dest.par_chunks_mut(cols)
        .enumerate()
        .for_each(|(row_idx, out_row)| {
            let plane_base = (row_idx / dims.rows) * cells;
            let y = row_idx % dims.rows;
            let plane = &source[plane_base..plane_base + cells];
            let up = ((y + dims.rows - 1) & dims.row_mask()) * cols;
            let mid = y * cols;
            let down = ((y + 1) & dims.row_mask()) * cols;

            for (x, out) in out_row.iter_mut().enumerate() {
                let left = (x + cols - 1) & dims.col_mask();
                let right = (x + 1) & dims.col_mask();
                let sum = plane[up + left] as u32
                    + plane[up + x] as u32
                    + plane[up + right] as u32
                    + plane[mid + left] as u32
                    + plane[mid + x] as u32
                    + plane[mid + right] as u32
                    + plane[down + left] as u32
                    + plane[down + x] as u32
                    + plane[down + right] as u32;
                let original = plane[mid + x] as f32;
                let blurred = sum as f32 / 9.0;
                // original*(1-w) + blurred*w, written so a uniform field is exact.
                let diffused = original + (blurred - original) * diffuse_weight;
                *out = (diffused - decay_rate).clamp(0.0, 255.0) as u8;
            }
        });
}

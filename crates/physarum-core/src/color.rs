use crate::config::{ColorPreset, SPECIES_COUNT};
use crate::field::GridDimensions;
use rayon::prelude::*;

pub const BACKGROUND: [u8; 3] = [0x0a, 0x0a, 0x0f];
pub const GAMMA: f32 = 2.2;

/// Low, mid and high stops of a preset gradient.
pub fn gradient_stops(preset: ColorPreset) -> [[u8; 3]; 3] {
    match preset {
        ColorPreset::Neon => [[0x1a, 0x00, 0x33], [0xff, 0x00, 0xff], [0x00, 0xff, 0xff]],
        ColorPreset::Ocean => [[0x00, 0x1a, 0x33], [0x00, 0x66, 0xcc], [0x66, 0xff, 0xff]],
        ColorPreset::Ember => [[0x33, 0x00, 0x00], [0xff, 0x44, 0x00], [0xff, 0xcc, 0x00]],
        ColorPreset::Toxic => [[0x0a, 0x1a, 0x00], [0x66, 0xff, 0x00], [0xee, 0xff, 0x99]],
        ColorPreset::Void => [[0x0d, 0x00, 0x1a], [0x55, 0x00, 0xaa], [0xe0, 0xcc, 0xff]],
        ColorPreset::Sunset => [[0x2a, 0x0a, 0x3a], [0xff, 0x5e, 0x62], [0xff, 0xd3, 0x6e]],
        ColorPreset::Forest => [[0x05, 0x1a, 0x05], [0x2e, 0x8b, 0x57], [0xc8, 0xff, 0x9e]],
        ColorPreset::Arctic => [[0x0a, 0x1a, 0x2a], [0x88, 0xcc, 0xff], [0xff, 0xff, 0xff]],
        ColorPreset::Lava => [[0x1a, 0x00, 0x00], [0xcc, 0x22, 0x00], [0xff, 0xaa, 0x33]],
        ColorPreset::Plasma => [[0x0d, 0x08, 0x87], [0xcc, 0x47, 0x78], [0xf0, 0xf9, 0x21]],
        ColorPreset::Aurora => [[0x00, 0x1a, 0x1a], [0x00, 0xff, 0x99], [0xaa, 0x66, 0xff]],
        ColorPreset::Fire => [[0x33, 0x00, 0x00], [0xff, 0x66, 0x00], [0xff, 0xff, 0x66]],
    }
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

/// Gradient color for a curved intensity `t` in [0, 1].
fn gradient(stops: &[[u8; 3]; 3], t: f32) -> [f32; 3] {
    let (from, to, local) = if t < 0.5 {
        (&stops[0], &stops[1], t * 2.0)
    } else {
        (&stops[1], &stops[2], (t - 0.5) * 2.0)
    };
    std::array::from_fn(|c| lerp(from[c], to[c], local))
}

/// Trail intensity to RGBA. Every species gets a 256-entry table of premultiplied colors,
/// so a frame costs three lookups and a blend per cell.
#[derive(Clone, Debug)]
pub struct ColorMapper {
    presets: [ColorPreset; SPECIES_COUNT],
    /// `weight[v] = (v / 255)^2.2`, shared by every species.
    weight: [f32; 256],
    /// `weight[v] * gradient(weight[v])` per species.
    premultiplied: [[[f32; 3]; 256]; SPECIES_COUNT],
}

impl ColorMapper {
    pub fn new(presets: [ColorPreset; SPECIES_COUNT]) -> Self {
        let weight: [f32; 256] = std::array::from_fn(|v| (v as f32 / 255.0).powf(GAMMA));
        let premultiplied = presets.map(|preset| {
            let stops = gradient_stops(preset);
            std::array::from_fn(|v| gradient(&stops, weight[v]).map(|c| c * weight[v]))
        });
        Self {
            presets,
            weight,
            premultiplied,
        }
    }

    pub fn presets(&self) -> [ColorPreset; SPECIES_COUNT] {
        self.presets
    }

    /// Composite one cell: `bg * (1 - min(1, sum w)) + sum w_i * c_i`.
    #[inline]
    pub fn shade(&self, values: [u8; SPECIES_COUNT]) -> [u8; 4] {
        let mut total_weight = 0.0f32;
        let mut rgb = [0.0f32; 3];
        for (species, &v) in values.iter().enumerate() {
            total_weight += self.weight[v as usize];
            let c = &self.premultiplied[species][v as usize];
            rgb[0] += c[0];
            rgb[1] += c[1];
            rgb[2] += c[2];
        }
        let keep = 1.0 - total_weight.min(1.0);
        let channel = |i: usize| (BACKGROUND[i] as f32 * keep + rgb[i]).round().min(255.0) as u8;
        [channel(0), channel(1), channel(2), 255]
    }

    /// Fill `out` (RGBA, `cols * rows * 4` bytes) from a plane-major trail buffer.
    pub fn render(&self, field: &[u8], dims: GridDimensions, out: &mut [u8]) {
        let cols = dims.cols;
        let cells = dims.cell_count();
        debug_assert_eq!(field.len(), cells * SPECIES_COUNT);
        debug_assert_eq!(out.len(), cells * 4);
        out.par_chunks_mut(cols * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let base = y * cols;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let idx = base + x;
                    let values = std::array::from_fn(|s| field[s * cells + idx]);
                    px.copy_from_slice(&self.shade(values));
                }
            });
    }
}

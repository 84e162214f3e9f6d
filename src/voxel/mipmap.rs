use rayon::prelude::*;

use super::VoxelLevel;

/// Halves a level with a 2x2x2 box filter over all four channels.
///
/// Output slabs (one z slice each) are filled in parallel.
pub fn downsample(source: &VoxelLevel) -> VoxelLevel {
    let dim = (source.dim() / 2).max(1);
    let slab = (dim as usize).pow(2);
    let mut texels = vec![[0u8; 4]; slab * dim as usize];

    texels
        .par_chunks_mut(slab)
        .enumerate()
        .for_each(|(z, slice)| {
            let z = z as u32;
            for y in 0..dim {
                for x in 0..dim {
                    let mut sum = [0u32; 4];
                    for (dx, dy, dz) in CHILDREN {
                        let child = source.texel(2 * x + dx, 2 * y + dy, 2 * z + dz);
                        for (acc, value) in sum.iter_mut().zip(child) {
                            *acc += value as u32;
                        }
                    }
                    slice[(x + y * dim) as usize] = sum.map(|s| ((s + 4) / 8) as u8);
                }
            }
        });

    VoxelLevel::from_texels(dim, texels)
}

const CHILDREN: [(u32, u32, u32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// The base level followed by every coarser level down to 1x1x1.
pub(crate) fn build_chain(base: VoxelLevel) -> Vec<VoxelLevel> {
    let mut levels = vec![base];
    while let Some(last) = levels.last().filter(|level| level.dim() > 1) {
        let next = downsample(last);
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_level(dim: u32) -> VoxelLevel {
        let mut level = VoxelLevel::empty(dim);
        let mut state = 0x2545_f491_u32;
        for z in 0..dim {
            for y in 0..dim {
                for x in 0..dim {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    if state % 3 == 0 {
                        let bytes = state.to_le_bytes();
                        level.set(x, y, z, [bytes[0], bytes[1], bytes[2], 255]);
                    }
                }
            }
        }
        level
    }

    #[test]
    fn coarse_alpha_is_the_rounded_child_average() {
        let fine = pseudo_random_level(8);
        let coarse = downsample(&fine);
        assert_eq!(coarse.dim(), 4);
        for z in 0..4 {
            for y in 0..4 {
                for x in 0..4 {
                    let sum: u32 = CHILDREN
                        .iter()
                        .map(|(dx, dy, dz)| {
                            fine.texel(2 * x + dx, 2 * y + dy, 2 * z + dz)[3] as u32
                        })
                        .sum();
                    let expected = ((sum + 4) / 8) as u8;
                    assert_eq!(coarse.texel(x, y, z)[3], expected);
                    if sum == 0 {
                        assert_eq!(coarse.texel(x, y, z), [0; 4]);
                    }
                }
            }
        }
    }

    #[test]
    fn chain_ends_at_a_single_texel() {
        let chain = build_chain(pseudo_random_level(16));
        let dims: Vec<u32> = chain.iter().map(VoxelLevel::dim).collect();
        assert_eq!(dims, vec![16, 8, 4, 2, 1]);
    }

    #[test]
    fn empty_levels_stay_empty() {
        let chain = build_chain(VoxelLevel::empty(8));
        assert!(chain.iter().all(|level| level.occupied_count() == 0));
    }

    #[test]
    fn a_full_block_stays_opaque() {
        let mut fine = VoxelLevel::empty(2);
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    fine.set(x, y, z, [40, 80, 120, 255]);
                }
            }
        }
        assert_eq!(downsample(&fine).texel(0, 0, 0), [40, 80, 120, 255]);
    }
}

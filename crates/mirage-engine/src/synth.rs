use crate::light::{pack_column_light, ColumnLight, LightMode};
use crate::overlay::EffectiveOverlay;
use crate::snapshot::ColumnSnapshot;
use crate::state_cache::BinaryStateCache;
use mirage_common::{BlockPos, ChunkPos, LightOverride, MirageError, Result};
use mirage_protocol::{ChunkDataPacket, ChunkSection, UpdateLightPacket};
use std::sync::Arc;

/// One finished column transfer unit: the block data packet and its
/// matching light packet.
#[derive(Debug, Clone)]
pub struct ColumnUnit {
    pub chunk: ChunkPos,
    pub chunk_data: ChunkDataPacket,
    pub light: UpdateLightPacket,
}

/// Turns a world snapshot plus a viewer's overlay into a column unit.
/// Side-effect free apart from the binary state memo, so it is safe to
/// call from any worker thread.
#[derive(Clone)]
pub struct ChunkSynthesizer {
    state_cache: Arc<BinaryStateCache>,
    light_mode: LightMode,
    default_biome: i32,
    world_sections: usize,
}

impl ChunkSynthesizer {
    pub fn new(
        state_cache: Arc<BinaryStateCache>,
        light_mode: LightMode,
        default_biome: i32,
        world_sections: usize,
    ) -> Self {
        Self {
            state_cache,
            light_mode,
            default_biome,
            world_sections,
        }
    }

    /// Synthesizes the column for `chunk`. The overlay map may be absent
    /// (viewer has nothing there); the result is then the plain world
    /// content.
    pub fn synthesize(
        &self,
        chunk: ChunkPos,
        snapshot: &ColumnSnapshot,
        overlay: Option<&EffectiveOverlay>,
        light_overrides: &[(BlockPos, LightOverride)],
    ) -> Result<ColumnUnit> {
        if snapshot.chunk() != chunk {
            return Err(MirageError::Synthesis(format!(
                "snapshot for {} handed to synthesis of {}",
                snapshot.chunk(),
                chunk
            )));
        }
        if snapshot.section_count() != self.world_sections {
            return Err(MirageError::Synthesis(format!(
                "snapshot has {} sections, world height is {} for chunk {}",
                snapshot.section_count(),
                self.world_sections,
                chunk
            )));
        }

        // Section indices an overlay entry forces into existence even when
        // the world has no blocks there.
        let mut overlay_sections = vec![false; self.world_sections];
        if let Some(overlay) = overlay {
            for pos in overlay.keys() {
                let sy = pos.section_y();
                if (0..self.world_sections as i32).contains(&sy) {
                    overlay_sections[sy as usize] = true;
                }
            }
        }

        let (base_x, base_z) = chunk.origin();
        let mut primary_bit_mask = 0i32;
        let mut sections = Vec::new();

        for sy in 0..self.world_sections {
            let world_section = snapshot.section(sy);
            if world_section.is_none() && !overlay_sections[sy] {
                continue;
            }

            let mut section = ChunkSection::new();
            for y in 0..16usize {
                for z in 0..16usize {
                    for x in 0..16usize {
                        let index = (y << 8) | (z << 4) | x;
                        let world_value = world_section
                            .map(|s| s.block_at(index))
                            .unwrap_or_default();

                        let effective = overlay
                            .and_then(|o| {
                                o.get(&BlockPos::new(
                                    base_x + x as i32,
                                    (sy * 16 + y) as i32,
                                    base_z + z as i32,
                                ))
                            })
                            .copied()
                            .unwrap_or(world_value);

                        if effective.is_air() {
                            continue;
                        }
                        let id = self.state_cache.encode(effective);
                        section.set_block_id(x, y, z, id);
                    }
                }
            }
            section.recalculate_block_count();

            primary_bit_mask |= 1 << sy;
            sections.push((sy, section));
        }

        let light = pack_column_light(snapshot, self.light_mode, light_overrides);
        let light_packet = self.build_light_packet(chunk, &light)?;

        // Attach packed light to each carried section.
        let sections = sections
            .into_iter()
            .map(|(sy, mut section)| {
                if let Some(arr) = &light.block_arrays[sy] {
                    section.set_block_light(arr.clone());
                }
                section.set_sky_light(light.sky_arrays[sy].clone());
                section
            })
            .collect();

        let chunk_data = ChunkDataPacket {
            chunk_x: chunk.x,
            chunk_z: chunk.z,
            full_chunk: true,
            primary_bit_mask,
            biomes: Some(vec![self.default_biome; 1024]),
            sections,
        };

        Ok(ColumnUnit {
            chunk,
            chunk_data,
            light: light_packet,
        })
    }

    fn build_light_packet(&self, chunk: ChunkPos, light: &ColumnLight) -> Result<UpdateLightPacket> {
        let mut sky_light_mask = 0i32;
        let mut block_light_mask = 0i32;
        let mut empty_sky_light_mask = 0i32;
        let mut empty_block_light_mask = 0i32;
        let mut sky_light_arrays = Vec::new();
        let mut block_light_arrays = Vec::new();

        for (sy, array) in light.sky_arrays.iter().enumerate() {
            match array {
                Some(array) => {
                    sky_light_mask |= 1 << sy;
                    sky_light_arrays.push(array.clone());
                }
                None => empty_sky_light_mask |= 1 << sy,
            }
        }
        for (sy, array) in light.block_arrays.iter().enumerate() {
            match array {
                Some(array) => {
                    block_light_mask |= 1 << sy;
                    block_light_arrays.push(array.clone());
                }
                None => empty_block_light_mask |= 1 << sy,
            }
        }

        UpdateLightPacket::new(
            chunk.x,
            chunk.z,
            true,
            sky_light_mask,
            block_light_mask,
            empty_sky_light_mask,
            empty_block_light_mask,
            sky_light_arrays,
            block_light_arrays,
        )
        .map_err(|e| MirageError::Synthesis(format!("light packet for {}: {}", chunk, e)))
    }
}

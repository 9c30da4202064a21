use crate::snapshot::{ColumnSnapshot, SECTION_VOLUME};
use mirage_common::{BlockPos, ChunkPos, LightOverride, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How column illumination is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightMode {
    /// Read both channels from the world snapshot, clamped to [0,15].
    Copy,
    /// Send no arrays and flag every section empty; the client recomputes.
    Empty,
    /// Copy, then overwrite nibbles at overridden positions.
    Merged,
}

/// Packed light arrays for one column: one optional 2048-byte array per
/// section and channel. `None` means the section goes into the empty mask.
#[derive(Debug, Clone)]
pub struct ColumnLight {
    pub block_arrays: Vec<Option<Vec<u8>>>,
    pub sky_arrays: Vec<Option<Vec<u8>>>,
}

/// Packs 4096 raw per-voxel values into 2048 nibble-packed bytes. Even
/// voxel index goes to the low nibble. Values are clamped to [0,15]; raw
/// world data may legitimately exceed the range, overrides never reach
/// here unvalidated.
pub fn pack_nibbles(raw: &[u8]) -> Vec<u8> {
    debug_assert_eq!(raw.len(), SECTION_VOLUME);
    let mut packed = vec![0u8; SECTION_VOLUME / 2];
    for (i, &value) in raw.iter().enumerate() {
        set_nibble(&mut packed, i, value.min(15));
    }
    packed
}

pub fn nibble_at(packed: &[u8], index: usize) -> u8 {
    let byte = packed[index / 2];
    if index % 2 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

pub fn set_nibble(packed: &mut [u8], index: usize, value: u8) {
    let byte = &mut packed[index / 2];
    if index % 2 == 0 {
        *byte = (*byte & 0xF0) | (value & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | ((value & 0x0F) << 4);
    }
}

/// Produces a column's packed light arrays for the given mode. Overrides
/// are applied only in `Merged` mode, using the same section/byte/nibble
/// index computation as the copy path so the two never drift.
pub fn pack_column_light(
    snapshot: &ColumnSnapshot,
    mode: LightMode,
    overrides: &[(BlockPos, LightOverride)],
) -> ColumnLight {
    let section_count = snapshot.section_count();
    let mut light = ColumnLight {
        block_arrays: vec![None; section_count],
        sky_arrays: vec![None; section_count],
    };

    if mode == LightMode::Empty {
        return light;
    }

    for sy in 0..section_count {
        if let Some(section) = snapshot.section(sy) {
            light.block_arrays[sy] = Some(pack_nibbles(section.block_light_raw()));
            light.sky_arrays[sy] = Some(pack_nibbles(section.sky_light_raw()));
        }
    }

    if mode == LightMode::Merged {
        for (pos, value) in overrides {
            if pos.chunk() != snapshot.chunk() {
                continue;
            }
            let sy = pos.section_y();
            if sy < 0 || sy as usize >= section_count {
                continue;
            }
            let sy = sy as usize;
            let index = pos.section_index();

            if let Some(level) = value.block {
                let array = light.block_arrays[sy]
                    .get_or_insert_with(|| vec![0u8; SECTION_VOLUME / 2]);
                set_nibble(array, index, level.value());
            }
            if let Some(level) = value.sky {
                let array =
                    light.sky_arrays[sy].get_or_insert_with(|| vec![0u8; SECTION_VOLUME / 2]);
                set_nibble(array, index, level.value());
            }
        }
    }

    light
}

/// Per-scope lighting overrides. A scope is either a layer name or a
/// region name; the engine does not care which. Scopes are kept ordered so
/// that when two scopes touch the same position the resolution is
/// deterministic (later scope name wins per channel).
#[derive(Debug, Default)]
pub struct LightOverrideStore {
    scopes: BTreeMap<String, HashMap<BlockPos, LightOverride>>,
}

impl LightOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates both channels before touching any state.
    pub fn set(
        &mut self,
        scope: &str,
        pos: BlockPos,
        block: Option<u8>,
        sky: Option<u8>,
    ) -> Result<()> {
        let value = LightOverride::new(block, sky)?;
        if value.is_empty() {
            self.clear(scope, pos);
            return Ok(());
        }
        self.scopes
            .entry(scope.to_owned())
            .or_default()
            .insert(pos, value);
        Ok(())
    }

    pub fn clear(&mut self, scope: &str, pos: BlockPos) {
        if let Some(positions) = self.scopes.get_mut(scope) {
            positions.remove(&pos);
            if positions.is_empty() {
                self.scopes.remove(scope);
            }
        }
    }

    /// Drops every override a scope owns.
    pub fn clear_scope(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }

    pub fn get(&self, scope: &str, pos: BlockPos) -> Option<LightOverride> {
        self.scopes.get(scope).and_then(|m| m.get(&pos)).copied()
    }

    /// Effective overrides for one chunk, merged across scopes per channel.
    pub fn for_chunk(&self, chunk: ChunkPos) -> Vec<(BlockPos, LightOverride)> {
        let mut merged: HashMap<BlockPos, LightOverride> = HashMap::new();
        for positions in self.scopes.values() {
            for (pos, value) in positions {
                if pos.chunk() != chunk {
                    continue;
                }
                let entry = merged.entry(*pos).or_default();
                if value.block.is_some() {
                    entry.block = value.block;
                }
                if value.sky.is_some() {
                    entry.sky = value.sky;
                }
            }
        }
        let mut result: Vec<_> = merged.into_iter().collect();
        result.sort_by_key(|(pos, _)| (pos.y, pos.z, pos.x));
        result
    }

    pub fn clear_all(&mut self) {
        self.scopes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SectionSnapshot;
    use assert_matches::assert_matches;
    use mirage_common::{BlockState, MirageError};

    #[test]
    fn nibble_round_trip_is_lossless() {
        let mut packed = vec![0u8; 2048];
        for value in 0..=15u8 {
            for index in [0usize, 1, 7, 4094, 4095] {
                set_nibble(&mut packed, index, value);
                assert_eq!(nibble_at(&packed, index), value);
            }
        }
    }

    #[test]
    fn neighbouring_nibbles_are_independent() {
        let mut packed = vec![0u8; 2048];
        set_nibble(&mut packed, 10, 3);
        set_nibble(&mut packed, 11, 15);
        assert_eq!(nibble_at(&packed, 10), 3);
        assert_eq!(nibble_at(&packed, 11), 15);
        // Both live in byte 5
        assert_eq!(packed[5], 0xF3);
    }

    #[test]
    fn copy_mode_packs_present_sections_only() {
        let mut snapshot = ColumnSnapshot::empty(ChunkPos::new(0, 0), 16);
        snapshot.put_section(2, SectionSnapshot::filled(BlockState::default(), 7, 15));

        let light = pack_column_light(&snapshot, LightMode::Copy, &[]);
        assert!(light.block_arrays[0].is_none());
        let packed = light.block_arrays[2].as_ref().unwrap();
        assert_eq!(nibble_at(packed, 0), 7);
        assert_eq!(nibble_at(light.sky_arrays[2].as_ref().unwrap(), 4095), 15);
    }

    #[test]
    fn empty_mode_carries_no_arrays() {
        let mut snapshot = ColumnSnapshot::empty(ChunkPos::new(0, 0), 16);
        snapshot.put_section(0, SectionSnapshot::filled(BlockState::default(), 9, 9));
        let light = pack_column_light(&snapshot, LightMode::Empty, &[]);
        assert!(light.block_arrays.iter().all(|a| a.is_none()));
        assert!(light.sky_arrays.iter().all(|a| a.is_none()));
    }

    #[test]
    fn merged_mode_overwrites_only_the_target_nibble() {
        let mut snapshot = ColumnSnapshot::empty(ChunkPos::new(0, 4), 16);
        snapshot.put_section(4, SectionSnapshot::filled(BlockState::default(), 3, 0));

        let pos = BlockPos::new(10, 64, 74);
        let ovr = LightOverride::new(Some(15), None).unwrap();
        let light = pack_column_light(&snapshot, LightMode::Merged, &[(pos, ovr)]);

        let packed = light.block_arrays[4].as_ref().unwrap();
        let index = pos.section_index();
        assert_eq!(nibble_at(packed, index), 15);
        // The neighbour sharing the byte keeps its copied value.
        let neighbour = index ^ 1;
        assert_eq!(nibble_at(packed, neighbour), 3);
        // Sky channel untouched by a block-only override.
        assert_eq!(nibble_at(light.sky_arrays[4].as_ref().unwrap(), index), 0);
    }

    #[test]
    fn merged_mode_synthesizes_array_for_absent_section() {
        let snapshot = ColumnSnapshot::empty(ChunkPos::new(0, 0), 16);
        let pos = BlockPos::new(1, 33, 1);
        let ovr = LightOverride::new(Some(12), Some(4)).unwrap();
        let light = pack_column_light(&snapshot, LightMode::Merged, &[(pos, ovr)]);

        let index = pos.section_index();
        assert_eq!(nibble_at(light.block_arrays[2].as_ref().unwrap(), index), 12);
        assert_eq!(nibble_at(light.sky_arrays[2].as_ref().unwrap(), index), 4);
    }

    #[test]
    fn store_rejects_out_of_range_without_side_effects() {
        let mut store = LightOverrideStore::new();
        let pos = BlockPos::new(0, 64, 0);
        assert_matches!(
            store.set("ore", pos, Some(16), None),
            Err(MirageError::InvalidInput(_))
        );
        assert_eq!(store.get("ore", pos), None);
    }

    #[test]
    fn store_set_get_clear() {
        let mut store = LightOverrideStore::new();
        let pos = BlockPos::new(3, 70, -9);
        store.set("region", pos, Some(15), Some(2)).unwrap();
        let value = store.get("region", pos).unwrap();
        assert_eq!(value.block.unwrap().value(), 15);
        assert_eq!(value.sky.unwrap().value(), 2);

        store.clear("region", pos);
        assert_eq!(store.get("region", pos), None);
    }

    #[test]
    fn chunk_query_merges_scopes_per_channel() {
        let mut store = LightOverrideStore::new();
        let pos = BlockPos::new(0, 10, 0);
        store.set("a", pos, Some(5), None).unwrap();
        store.set("b", pos, None, Some(9)).unwrap();

        let merged = store.for_chunk(pos.chunk());
        assert_eq!(merged.len(), 1);
        let (_, value) = merged[0];
        assert_eq!(value.block.unwrap().value(), 5);
        assert_eq!(value.sky.unwrap().value(), 9);
    }
}

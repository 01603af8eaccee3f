//! Block identifiers and the immutable block registry.

use std::collections::HashMap;

/// 16-bit numeric block identifier.
pub type BlockId = u16;

pub const AIR: BlockId = 0;
pub const STONE: BlockId = 1;
pub const GRASS_BLOCK: BlockId = 2;
pub const DIRT: BlockId = 3;
pub const COBBLESTONE: BlockId = 4;
pub const BEDROCK: BlockId = 7;
pub const WATER: BlockId = 8;
pub const LAVA: BlockId = 10;

/// Descriptive record for one block kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub id: BlockId,
    pub name: &'static str,
    pub solid: bool,
    pub transparent: bool,
    pub hardness: f32,
    pub resistance: f32,
    pub light_level: u8,
    pub collidable: bool,
}

impl BlockInfo {
    fn solid(id: BlockId, name: &'static str, hardness: f32, resistance: f32) -> Self {
        Self {
            id,
            name,
            solid: true,
            transparent: false,
            hardness,
            resistance,
            light_level: 0,
            collidable: true,
        }
    }

    fn fluid(id: BlockId, name: &'static str, light_level: u8) -> Self {
        Self {
            id,
            name,
            solid: false,
            transparent: true,
            hardness: 100.0,
            resistance: 100.0,
            light_level,
            collidable: false,
        }
    }
}

/// Mapping id ↔ block record. Populated once at start, immutable afterwards.
pub struct BlockRegistry {
    blocks: HashMap<BlockId, BlockInfo>,
    by_name: HashMap<&'static str, BlockId>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            blocks: HashMap::new(),
            by_name: HashMap::new(),
        };

        registry.insert(BlockInfo {
            id: AIR,
            name: "minecraft:air",
            solid: false,
            transparent: true,
            hardness: 0.0,
            resistance: 0.0,
            light_level: 0,
            collidable: false,
        });
        registry.insert(BlockInfo::solid(STONE, "minecraft:stone", 1.5, 6.0));
        registry.insert(BlockInfo::solid(GRASS_BLOCK, "minecraft:grass_block", 0.6, 0.6));
        registry.insert(BlockInfo::solid(DIRT, "minecraft:dirt", 0.5, 0.5));
        registry.insert(BlockInfo::solid(COBBLESTONE, "minecraft:cobblestone", 2.0, 6.0));
        registry.insert(BlockInfo::solid(BEDROCK, "minecraft:bedrock", -1.0, 3_600_000.0));
        registry.insert(BlockInfo::fluid(WATER, "minecraft:water", 0));
        registry.insert(BlockInfo::fluid(LAVA, "minecraft:lava", 15));

        registry
    }

    fn insert(&mut self, info: BlockInfo) {
        self.by_name.insert(info.name, info.id);
        self.blocks.insert(info.id, info);
    }

    pub fn info(&self, id: BlockId) -> Option<&BlockInfo> {
        self.blocks.get(&id)
    }

    pub fn id_by_name(&self, name: &str) -> BlockId {
        self.by_name.get(name).copied().unwrap_or(AIR)
    }

    pub fn is_valid(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        self.info(id).map(|i| i.solid).unwrap_or(false)
    }

    pub fn light_level(&self, id: BlockId) -> u8 {
        self.info(id).map(|i| i.light_level).unwrap_or(0)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! World generators. Only the flat generator produces terrain; everything
//! else is delegated to region persistence.

use ferrum_proto::types::ChunkPos;

use crate::block;
use crate::chunk::{Chunk, WORLD_MIN_Y};

/// Terrain generator selected by the `world.generator` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Bedrock floor, stone to y=60, dirt to y=63, grass at y=64.
    Flat,
    /// Nothing but air.
    Void,
}

impl Generator {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "void" => Generator::Void,
            _ => Generator::Flat,
        }
    }

    pub fn generate(&self, position: ChunkPos) -> Chunk {
        let chunk = Chunk::new(position);
        match self {
            Generator::Flat => generate_flat(&chunk),
            Generator::Void => {}
        }
        chunk.set_loaded(true);
        chunk.set_dirty(true);
        chunk
    }
}

fn generate_flat(chunk: &Chunk) {
    for x in 0..16 {
        for z in 0..16 {
            chunk.set_block(x, WORLD_MIN_Y, z, block::BEDROCK);
            for y in (WORLD_MIN_Y + 1)..=60 {
                chunk.set_block(x, y, z, block::STONE);
            }
            for y in 61..=63 {
                chunk.set_block(x, y, z, block::DIRT);
            }
            chunk.set_block(x, 64, z, block::GRASS_BLOCK);
        }
    }
}

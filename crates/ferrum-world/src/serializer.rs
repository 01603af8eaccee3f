//! Network serialization of chunk columns for the ChunkData packet.

use ferrum_proto::buffer::PacketBuffer;

use crate::chunk::{Chunk, BLOCKS_PER_SECTION};

/// Serialize a chunk column into ChunkData payload bytes.
///
/// Per section: i16 block count (0 for absent/empty sections), a
/// direct-palette header (15 bits per entry, empty palette), VarInt 4096,
/// then the block ids in YZX order, then sky-light and block-light nibble
/// arrays. A 4x4x4 biome grid of plains closes the payload.
pub fn serialize_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut buf = PacketBuffer::with_capacity(64 * 1024);

    chunk.with_sections(|sections| {
        for section in sections {
            let section = match section {
                Some(section) if !section.is_empty() => section,
                _ => {
                    buf.write_i16(0);
                    continue;
                }
            };

            buf.write_i16(section.block_count);

            // Direct palette: 15 bits per entry, no palette entries.
            buf.write_u8(15);
            buf.write_varint(0);

            buf.write_varint(BLOCKS_PER_SECTION as i32);
            for i in 0..BLOCKS_PER_SECTION {
                let y = (i / 256) % 16;
                let z = (i / 16) % 16;
                let x = i % 16;
                buf.write_u64(section.get_block(x as i32, y as i32, z as i32) as u64);
            }

            buf.write_bytes(&section.sky_light);
            buf.write_bytes(&section.block_light);
        }
    });

    for _ in 0..1024 {
        buf.write_varint(1);
    }

    buf.into_bytes().to_vec()
}

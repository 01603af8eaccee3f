//! Region-file persistence.
//!
//! Chunks group into 32x32 regions stored as `r.<rx>.<rz>.mca` under
//! `<world>/region/`. Each file starts with a 4 KiB location table (1024
//! entries of `sector_offset:24 | sector_count:8`, big-endian) and a 4 KiB
//! timestamp table, followed by 4 KiB-aligned chunk payloads. A location of
//! zero means "not stored".

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrum_proto::buffer::PacketBuffer;
use ferrum_proto::types::ChunkPos;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkSection, BLOCKS_PER_SECTION, SECTIONS_PER_CHUNK};
use crate::error::WorldError;

const SECTOR_BYTES: usize = 4096;
const HEADER_BYTES: usize = 2 * SECTOR_BYTES;
const ENTRIES: usize = 1024;

struct RegionFile {
    file: File,
    locations: [u32; ENTRIES],
    timestamps: [u32; ENTRIES],
}

impl RegionFile {
    fn open(path: PathBuf) -> Result<Self, WorldError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut locations = [0u32; ENTRIES];
        let mut timestamps = [0u32; ENTRIES];

        if file.metadata()?.len() < HEADER_BYTES as u64 {
            // Fresh file: reserve the header so payloads start at sector 2.
            file.set_len(HEADER_BYTES as u64)?;
        } else {
            let mut header = [0u8; HEADER_BYTES];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            for i in 0..ENTRIES {
                locations[i] = u32::from_be_bytes(header[i * 4..i * 4 + 4].try_into().unwrap());
                let off = SECTOR_BYTES + i * 4;
                timestamps[i] = u32::from_be_bytes(header[off..off + 4].try_into().unwrap());
            }
        }

        Ok(Self {
            file,
            locations,
            timestamps,
        })
    }

    fn write_header(&mut self) -> Result<(), WorldError> {
        let mut header = [0u8; HEADER_BYTES];
        for i in 0..ENTRIES {
            header[i * 4..i * 4 + 4].copy_from_slice(&self.locations[i].to_be_bytes());
            let off = SECTOR_BYTES + i * 4;
            header[off..off + 4].copy_from_slice(&self.timestamps[i].to_be_bytes());
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Table index of a chunk within its region.
fn chunk_index(position: ChunkPos) -> usize {
    (((position.z & 31) << 5) | (position.x & 31)) as usize
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Region-file backed chunk persistence for one world directory.
pub struct RegionStore {
    region_dir: PathBuf,
    files: Mutex<HashMap<(i32, i32), RegionFile>>,
}

impl RegionStore {
    pub fn open(world_dir: impl Into<PathBuf>) -> Result<Self, WorldError> {
        let region_dir = world_dir.into().join("region");
        std::fs::create_dir_all(&region_dir)?;
        Ok(Self {
            region_dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    fn region_path(&self, rx: i32, rz: i32) -> PathBuf {
        self.region_dir.join(format!("r.{rx}.{rz}.mca"))
    }

    /// Persist a chunk and clear its dirty flag. A clean chunk is a no-op.
    pub fn save_chunk(&self, chunk: &Chunk) -> Result<(), WorldError> {
        if !chunk.is_dirty() {
            return Ok(());
        }

        let position = chunk.position();
        let (rx, rz) = position.region();
        let index = chunk_index(position);
        let payload = encode_chunk(chunk);

        let sector_count = payload.len().div_ceil(SECTOR_BYTES);
        if sector_count > 0xFF {
            return Err(WorldError::PayloadTooLarge(payload.len()));
        }

        let mut files = self.files.lock().unwrap();
        let region = match files.entry((rx, rz)) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(RegionFile::open(self.region_path(rx, rz))?)
            }
        };

        let end = region.file.seek(SeekFrom::End(0))?;
        let sector_offset = (end as usize) / SECTOR_BYTES;
        region.file.write_all(&payload)?;
        let padding = (SECTOR_BYTES - payload.len() % SECTOR_BYTES) % SECTOR_BYTES;
        if padding > 0 {
            region.file.write_all(&vec![0u8; padding])?;
        }

        region.locations[index] = ((sector_offset as u32) << 8) | (sector_count as u32 & 0xFF);
        region.timestamps[index] = unix_seconds();
        region.write_header()?;

        chunk.set_dirty(false);
        debug!("Saved chunk {position} to r.{rx}.{rz}.mca");
        Ok(())
    }

    /// Load a chunk, or `None` when the coordinate is not stored.
    pub fn load_chunk(&self, position: ChunkPos) -> Result<Option<Chunk>, WorldError> {
        let (rx, rz) = position.region();
        let path = self.region_path(rx, rz);

        let mut files = self.files.lock().unwrap();
        let region = match files.entry((rx, rz)) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                if !path.exists() {
                    return Ok(None);
                }
                e.insert(RegionFile::open(path)?)
            }
        };

        let location = region.locations[chunk_index(position)];
        if location == 0 {
            return Ok(None);
        }
        let sector_offset = (location >> 8) & 0xFF_FFFF;
        let sector_count = location & 0xFF;
        if sector_offset == 0 || sector_count == 0 {
            return Ok(None);
        }

        region
            .file
            .seek(SeekFrom::Start(sector_offset as u64 * SECTOR_BYTES as u64))?;
        let mut data = vec![0u8; sector_count as usize * SECTOR_BYTES];
        region.file.read_exact(&mut data)?;
        drop(files);

        let chunk = decode_chunk(position, &data)?;
        Ok(Some(chunk))
    }

    /// Persist every dirty chunk in the iterator; errors are logged and the
    /// chunk stays dirty for a later retry. Returns the saved count.
    pub fn save_all<'a>(&self, chunks: impl Iterator<Item = &'a Chunk>) -> usize {
        let mut saved = 0;
        for chunk in chunks {
            if !chunk.is_dirty() {
                continue;
            }
            match self.save_chunk(chunk) {
                Ok(()) => saved += 1,
                Err(e) => warn!("Failed to save chunk {}: {e}", chunk.position()),
            }
        }
        saved
    }
}

/// On-disk chunk payload: i32 section count, then per section a presence
/// byte and, when present, i16 block count, 4096 big-endian block ids,
/// block-light nibbles, sky-light nibbles.
fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut buf = PacketBuffer::with_capacity(64 * 1024);
    chunk.with_sections(|sections| {
        buf.write_i32(sections.len() as i32);
        for section in sections {
            let Some(section) = section else {
                buf.write_u8(0);
                continue;
            };
            buf.write_u8(1);
            buf.write_i16(section.block_count);
            for i in 0..BLOCKS_PER_SECTION {
                let y = (i / 256) % 16;
                let z = (i / 16) % 16;
                let x = i % 16;
                buf.write_u16(section.get_block(x as i32, y as i32, z as i32));
            }
            buf.write_bytes(&section.block_light);
            buf.write_bytes(&section.sky_light);
        }
    });
    buf.into_bytes().to_vec()
}

fn decode_chunk(position: ChunkPos, data: &[u8]) -> Result<Chunk, WorldError> {
    let mut buf = PacketBuffer::from_bytes(data);
    let chunk = Chunk::new(position);

    let section_count = buf.read_i32()?;
    for index in 0..section_count.clamp(0, SECTIONS_PER_CHUNK as i32) {
        if buf.read_u8()? == 0 {
            continue;
        }
        // The stored count is redundant; the section recounts on write.
        let _stored_count = buf.read_i16()?;

        let mut section = ChunkSection::new();
        for i in 0..BLOCKS_PER_SECTION {
            let y = (i / 256) % 16;
            let z = (i / 16) % 16;
            let x = i % 16;
            section.set_block(x as i32, y as i32, z as i32, buf.read_u16()?);
        }
        let block_light = buf.read_bytes(BLOCKS_PER_SECTION / 2)?.to_vec();
        let sky_light = buf.read_bytes(BLOCKS_PER_SECTION / 2)?.to_vec();
        section.block_light.copy_from_slice(&block_light);
        section.sky_light.copy_from_slice(&sky_light);

        chunk.put_section(index as usize, section);
    }

    chunk.set_loaded(true);
    chunk.set_dirty(false);
    Ok(chunk)
}

//! Block cache storing the blocks learned from the server, used as traversal oracle
//! for the path finder.

use std::collections::HashMap;
use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use glam::IVec3;

use tracing::{debug, trace};

use redstone::path::Traversal;
use redstone::proto::{self, InPacket, ChunkDataPacket};


/// Chunk size in both X and Z coordinates.
pub const CHUNK_WIDTH: usize = 16;
/// Number of 16 blocks high sections in a chunk column.
pub const SECTION_COUNT: usize = 16;
/// Chunk height.
pub const CHUNK_HEIGHT: usize = SECTION_COUNT * CHUNK_WIDTH;
/// Number of blocks in a section.
const SECTION_SIZE: usize = CHUNK_WIDTH * CHUNK_WIDTH * CHUNK_WIDTH;

/// The air block id.
pub const AIR: u16 = 0;


/// Calculate the index in a section's array for the given position, only the 4 lower
/// bits of each coordinate are used. This is the `yyyy zzzz xxxx` layout of the chunk
/// data packet.
#[inline]
fn calc_index(pos: IVec3) -> usize {
    let x = pos.x as u32 & 0b1111;
    let z = pos.z as u32 & 0b1111;
    let y = pos.y as u32 & 0b1111;
    ((y << 8) | (z << 4) | x) as usize
}

/// Return true if an entity can move through the given block.
pub fn is_passable(id: u16) -> bool {
    matches!(id,
        AIR
        | 6             // sapling
        | 8..=11        // water and lava
        | 27 | 28 | 66  // rails
        | 30..=32       // web, tall grass, dead bush
        | 37..=40       // flowers and mushrooms
        | 50 | 51       // torch, fire
        | 55            // redstone
        | 59            // wheat
        | 63 | 68       // signs
        | 65            // ladder
        | 69 | 70 | 72  // lever, pressure plates
        | 75..=77       // redstone torches, button
        | 78            // snow layer
        | 83            // reed
        | 90            // portal
        | 93 | 94       // repeaters
        | 106           // vine
        | 111           // lily pad
        | 115           // nether wart
    )
}


/// Error while loading a chunk data packet.
#[derive(thiserror::Error, Debug)]
pub enum ChunkDataError {
    #[error("chunk data decompression: {0}")]
    Decompress(io::Error),
    #[error("chunk data is missing section {0}")]
    Truncated(u8),
}


/// A chunk column, only storing the block ids of its sections.
#[derive(Debug, Clone, Default)]
struct Chunk {
    sections: [Option<Box<[u16]>>; SECTION_COUNT],
}

impl Chunk {

    fn get_block(&self, pos: IVec3) -> u16 {
        match &self.sections[(pos.y as usize) >> 4] {
            Some(section) => section[calc_index(pos)],
            None => AIR,
        }
    }

    fn set_block(&mut self, pos: IVec3, id: u16) {
        let section = self.sections[(pos.y as usize) >> 4]
            .get_or_insert_with(|| vec![AIR; SECTION_SIZE].into_boxed_slice());
        section[calc_index(pos)] = id;
    }

}


/// The blocks known to the client, indexed by chunk. Positions in unknown chunks or
/// outside of the height range are considered air.
#[derive(Debug, Default)]
pub struct BlockCache {
    /// Chunks mapped to the block coordinates of their origin.
    chunks: HashMap<(i32, i32), Chunk>,
}

impl BlockCache {

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunk columns currently allocated.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_chunk_loaded(&self, pos: IVec3) -> bool {
        self.chunks.contains_key(&proto::chunk_id(pos.x, pos.z))
    }

    /// Get the block id at the given position, air if unknown.
    pub fn get_block(&self, pos: IVec3) -> u16 {
        if pos.y < 0 || pos.y >= CHUNK_HEIGHT as i32 {
            return AIR;
        }
        self.chunks.get(&proto::chunk_id(pos.x, pos.z))
            .map(|chunk| chunk.get_block(pos))
            .unwrap_or(AIR)
    }

    /// Set the block at the given position, the chunk is allocated if needed. Positions
    /// outside of the height range are ignored.
    pub fn set_block(&mut self, pos: IVec3, id: u16) {
        if pos.y < 0 || pos.y >= CHUNK_HEIGHT as i32 {
            return;
        }
        self.chunks.entry(proto::chunk_id(pos.x, pos.z))
            .or_default()
            .set_block(pos, id);
    }

    /// Handle a packet received from the server, only packets related to blocks are
    /// processed, others are ignored.
    pub fn handle(&mut self, packet: &InPacket) -> Result<(), ChunkDataError> {
        match packet {
            InPacket::ChunkAllocation(packet) => {
                let chunk_id = packet.chunk_id();
                if packet.mode {
                    self.chunks.entry(chunk_id).or_default();
                } else if self.chunks.remove(&chunk_id).is_some() {
                    trace!("freed chunk {chunk_id:?}");
                }
            }
            InPacket::ChunkData(packet) => self.load_chunk_data(packet)?,
            InPacket::BlockChange(packet) => {
                self.set_block(packet.pos(), packet.block as u16);
            }
            InPacket::MultiBlockChange(packet) => {
                for (pos, block, _metadata) in packet.changes() {
                    self.set_block(pos, block);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Decompress the block ids of every section present in the packet. A ground-up
    /// continuous packet also clears the sections it doesn't carry.
    pub fn load_chunk_data(&mut self, packet: &ChunkDataPacket) -> Result<(), ChunkDataError> {

        let mut decoder = ZlibDecoder::new(&packet.compressed_data[..]);
        let mut sections: [Option<Box<[u16]>>; SECTION_COUNT] = Default::default();

        for index in 0..SECTION_COUNT {

            if packet.primary_bit_map & (1 << index) == 0 {
                continue;
            }

            let mut bytes = vec![0u8; SECTION_SIZE];
            decoder.read_exact(&mut bytes).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => ChunkDataError::Truncated(index as u8),
                _ => ChunkDataError::Decompress(e),
            })?;

            sections[index] = Some(bytes.into_iter().map(u16::from).collect());

        }

        let chunk_id = packet.chunk_id();
        let chunk = self.chunks.entry(chunk_id).or_default();

        for (index, section) in sections.into_iter().enumerate() {
            if section.is_some() || packet.ground_up_continuous {
                chunk.sections[index] = section;
            }
        }

        debug!("loaded chunk {chunk_id:?}, sections: {:016b}", packet.primary_bit_map);
        Ok(())

    }

}

impl Traversal for BlockCache {

    fn is_solid(&self, pos: IVec3) -> bool {
        !is_passable(self.get_block(pos))
    }

}


#[cfg(test)]
mod tests {

    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use redstone::proto::{BlockChangePacket, ChunkAllocationPacket, MultiBlockChangePacket};
    use redstone::path::PathFinder;

    use super::*;

    const STONE: u16 = 1;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// A section filled with stone on its first layer only.
    fn floor_section() -> Vec<u8> {
        let mut section = vec![0u8; SECTION_SIZE];
        section[..256].fill(STONE as u8);
        section
    }

    fn chunk_data(cx: i32, cz: i32, ground_up_continuous: bool, primary_bit_map: u16, data: &[u8]) -> InPacket {
        InPacket::ChunkData(ChunkDataPacket {
            cx,
            cz,
            ground_up_continuous,
            primary_bit_map,
            add_bit_map: 0,
            compressed_data: compress(data),
        })
    }

    #[test]
    fn unknown_is_air() {
        let cache = BlockCache::new();
        assert_eq!(cache.get_block(IVec3::new(3, 64, -7)), AIR);
        assert!(!cache.is_solid(IVec3::new(3, 64, -7)));
        assert!(!cache.is_solid(IVec3::new(0, -1, 0)));
        assert!(!cache.is_solid(IVec3::new(0, 256, 0)));
    }

    #[test]
    fn chunk_data_section() {

        let mut cache = BlockCache::new();
        // Second section only, so the floor is at y = 16.
        cache.handle(&chunk_data(1, -1, true, 0b10, &floor_section())).unwrap();

        assert_eq!(cache.chunk_count(), 1);
        assert_eq!(cache.get_block(IVec3::new(16, 16, -16)), STONE);
        assert_eq!(cache.get_block(IVec3::new(31, 16, -1)), STONE);
        assert_eq!(cache.get_block(IVec3::new(20, 17, -5)), AIR);
        assert_eq!(cache.get_block(IVec3::new(20, 0, -5)), AIR);
        assert!(cache.is_solid(IVec3::new(20, 16, -5)));
        // Neighbor chunk is still unknown.
        assert!(!cache.is_solid(IVec3::new(32, 16, -5)));

    }

    #[test]
    fn chunk_data_section_order() {

        let mut data = floor_section();
        let mut upper = vec![0u8; SECTION_SIZE];
        upper[calc_index(IVec3::new(2, 3, 4))] = 4;
        data.extend_from_slice(&upper);

        let mut cache = BlockCache::new();
        cache.handle(&chunk_data(0, 0, true, 0b101, &data)).unwrap();

        assert_eq!(cache.get_block(IVec3::new(0, 0, 0)), STONE);
        assert_eq!(cache.get_block(IVec3::new(2, 35, 4)), 4);
        assert_eq!(cache.get_block(IVec3::new(2, 19, 4)), AIR);

    }

    #[test]
    fn chunk_data_partial_update() {

        let mut cache = BlockCache::new();
        cache.handle(&chunk_data(0, 0, true, 0b1, &floor_section())).unwrap();

        let mut upper = vec![0u8; SECTION_SIZE];
        upper[0] = 3;
        cache.handle(&chunk_data(0, 0, false, 0b10, &upper)).unwrap();
        assert_eq!(cache.get_block(IVec3::new(0, 0, 0)), STONE);
        assert_eq!(cache.get_block(IVec3::new(0, 16, 0)), 3);

        // Ground-up continuous replaces the whole column.
        cache.handle(&chunk_data(0, 0, true, 0b10, &upper)).unwrap();
        assert_eq!(cache.get_block(IVec3::new(0, 0, 0)), AIR);
        assert_eq!(cache.get_block(IVec3::new(0, 16, 0)), 3);

    }

    #[test]
    fn chunk_data_truncated() {
        let mut cache = BlockCache::new();
        let err = cache.handle(&chunk_data(0, 0, true, 0b11, &floor_section())).unwrap_err();
        assert!(matches!(err, ChunkDataError::Truncated(1)));
        assert_eq!(cache.chunk_count(), 0);
    }

    #[test]
    fn chunk_data_corrupted() {
        let mut cache = BlockCache::new();
        let packet = InPacket::ChunkData(ChunkDataPacket {
            cx: 0,
            cz: 0,
            ground_up_continuous: true,
            primary_bit_map: 1,
            add_bit_map: 0,
            compressed_data: vec![0xFF; 32],
        });
        let err = cache.handle(&packet).unwrap_err();
        assert!(matches!(err, ChunkDataError::Decompress(_)));
    }

    #[test]
    fn block_changes() {

        let mut cache = BlockCache::new();

        cache.handle(&InPacket::BlockChange(BlockChangePacket {
            x: -1, y: 70, z: 5, block: 1, metadata: 0,
        })).unwrap();
        assert_eq!(cache.get_block(IVec3::new(-1, 70, 5)), STONE);
        assert!(cache.is_chunk_loaded(IVec3::new(-16, 0, 0)));

        let changes: [(IVec3, u16, u8); 2] = [
            (IVec3::new(-3, 10, 2), 20, 0),
            (IVec3::new(-16, 11, 15), 4, 0),
        ];
        cache.handle(&InPacket::MultiBlockChange(MultiBlockChangePacket::from_changes(&changes))).unwrap();
        assert_eq!(cache.get_block(IVec3::new(-3, 10, 2)), 20);
        assert_eq!(cache.get_block(IVec3::new(-16, 11, 15)), 4);

    }

    #[test]
    fn allocation() {

        let mut cache = BlockCache::new();
        let alloc = |mode| InPacket::ChunkAllocation(ChunkAllocationPacket { cx: 2, cz: 3, mode });

        cache.handle(&alloc(true)).unwrap();
        assert!(cache.is_chunk_loaded(IVec3::new(32, 0, 48)));

        cache.set_block(IVec3::new(33, 5, 50), STONE);
        cache.handle(&alloc(false)).unwrap();
        assert!(!cache.is_chunk_loaded(IVec3::new(32, 0, 48)));
        assert_eq!(cache.get_block(IVec3::new(33, 5, 50)), AIR);

    }

    #[test]
    fn passable_blocks() {
        assert!(is_passable(AIR));
        assert!(is_passable(50));
        assert!(is_passable(9));
        assert!(!is_passable(STONE));
        assert!(!is_passable(54));
    }

    #[test]
    fn path_over_floor() {

        let mut cache = BlockCache::new();
        cache.handle(&chunk_data(0, 0, true, 0b1, &floor_section())).unwrap();
        // A wall on the floor, along the Z axis.
        for z in 0..16 {
            cache.set_block(IVec3::new(5, 1, z), STONE);
        }

        let path = PathFinder::new(&cache)
            .find_path(IVec3::new(2, 1, 2), IVec3::new(8, 1, 2))
            .unwrap();

        assert_eq!(path.last(), Some(&IVec3::new(8, 1, 2)));
        assert!(path.iter().all(|&pos| !cache.is_solid(pos)));
        assert!(path.iter().any(|pos| pos.y >= 2));

    }

}

//! Network protocol definition, both client-bound and server-bound packets.
//!
//! Every packet starts with its one-byte id (tid) that is dispatched through a static
//! [`Registry`] to the decoder of the packet's layout. Both directions can be read and
//! written, so captured traffic of either side can be decoded and re-encoded.

use std::io::{self, Cursor, Read, Write};

use glam::{DVec3, IVec3, Vec2};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::io::{ReadJavaExt, WriteJavaExt, new_invalid_data_err};
use crate::item::{self, ItemStack};
use crate::registry::{Registry, UnrecognizedType};


/// Window id used in set slot packets to address the cursor.
pub const CURSOR_WINDOW_ID: i8 = -1;
/// Slot id used in set slot packets to address the cursor.
pub const CURSOR_SLOT: i16 = -1;
/// Window id of the player inventory, always open.
pub const INVENTORY_WINDOW_ID: i8 = 0;


/// Function decoding the body of a packet, the id being already read.
type PacketReader<P> = fn(&mut dyn Read) -> io::Result<P>;

/// Marker for packets sent by the server, received by the client.
#[derive(Debug)]
pub enum ClientBound {}

/// Marker for packets sent by the client, received by the server.
#[derive(Debug)]
pub enum ServerBound {}

/// Internal trait for the body layout of a packet in a given direction `D`, most
/// packets have the same layout in both directions.
trait Body<D>: Sized {
    fn read(read: &mut dyn Read) -> io::Result<Self>;
    fn write(&self, write: &mut dyn Write) -> io::Result<()>;
}


/// Internal macro to define a packet enumeration for a direction, with its registry of
/// decoders and its encoder.
macro_rules! packets {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $dir:ty {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident($packet:ty) = $id:literal
            ),* $(,)?
        }
    ) => {

        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $($(#[$variant_meta])* $variant($packet),)*
        }

        impl $name {

            /// The packet id (tid) of this packet.
            pub fn id(&self) -> u8 {
                match self {
                    $(Self::$variant(_) => $id,)*
                }
            }

            /// Read a whole packet from the given reader, the reader is left just after
            /// the last byte of the packet.
            pub fn read(read: &mut impl Read) -> Result<Self, ProtoError> {

                static REGISTRY: Lazy<Registry<PacketReader<$name>>> = Lazy::new(|| {
                    let mut registry = Registry::<PacketReader<$name>>::new(stringify!($name));
                    $(registry.register($id, |read| {
                        Ok($name::$variant(<$packet as Body<$dir>>::read(read)?))
                    });)*
                    registry
                });

                let tid = read.read_java_ubyte()?;
                let reader = REGISTRY.get(tid)?;
                Ok(reader(read)?)

            }

            /// Write the whole packet, including its id.
            pub fn write(&self, write: &mut impl Write) -> io::Result<()> {
                write.write_java_ubyte(self.id())?;
                match self {
                    $(Self::$variant(packet) => <$packet as Body<$dir>>::write(packet, write),)*
                }
            }

            /// Decode a single packet at the start of the given buffer, returning the
            /// packet and the number of bytes it was made of.
            pub fn decode(bytes: &[u8]) -> Result<(Self, usize), ProtoError> {
                let mut cursor = Cursor::new(bytes);
                let packet = Self::read(&mut cursor)?;
                Ok((packet, cursor.position() as usize))
            }

            /// Encode this packet into a new buffer.
            pub fn encode(&self) -> io::Result<Vec<u8>> {
                let mut buf = Vec::new();
                self.write(&mut buf)?;
                Ok(buf)
            }

        }

    };
}

packets! {
    /// A packet received by the client (client-bound).
    pub enum InPacket: ClientBound {
        /// Sent periodically, the client should answer with the same id.
        KeepAlive(KeepAlivePacket) = 0,
        /// Answer to the client's login request, if successful.
        Login(LoginPacket) = 1,
        /// Answer to the client's handshake with the connection hash.
        Handshake(HandshakePacket) = 2,
        /// A chat message.
        Chat(ChatPacket) = 3,
        /// Teleport the client's player.
        PositionLook(PositionLookPacket) = 13,
        /// Allocate or free a chunk column before sending its data.
        ChunkAllocation(ChunkAllocationPacket) = 50,
        /// Compressed data of a chunk column.
        ChunkData(ChunkDataPacket) = 51,
        /// Many blocks changed in the same chunk.
        MultiBlockChange(MultiBlockChangePacket) = 52,
        /// A single block changed.
        BlockChange(BlockChangePacket) = 53,
        /// Force the client to open a window.
        OpenWindow(OpenWindowPacket) = 100,
        /// Force the client to close a window.
        CloseWindow(CloseWindowPacket) = 101,
        /// Change a single slot of a window, or the cursor.
        SetSlot(SetSlotPacket) = 103,
        /// Set all slots of a window.
        SetWindowItems(SetWindowItemsPacket) = 104,
        /// Accept or reject a window click of the client.
        ConfirmTransaction(ConfirmTransactionPacket) = 106,
        /// The server kicks the client.
        Disconnect(DisconnectPacket) = 255,
    }
}

packets! {
    /// A packet sent by the client (server-bound).
    pub enum OutPacket: ServerBound {
        /// Answer to a server keep alive, with the same id.
        KeepAlive(KeepAlivePacket) = 0,
        /// Login request, the entity id field holds the protocol version.
        Login(LoginPacket) = 1,
        /// First packet of a connection, with `username;host:port`.
        Handshake(HandshakePacket) = 2,
        /// A chat message or command.
        Chat(ChatPacket) = 3,
        /// The client's player is moving and rotating.
        PositionLook(PositionLookPacket) = 13,
        /// The client's player change its hand slot in the hotbar.
        HeldItemChange(HeldItemChangePacket) = 16,
        /// The client closed a window.
        CloseWindow(CloseWindowPacket) = 101,
        /// The client clicked a window slot.
        ClickWindow(ClickWindowPacket) = 102,
        /// Acknowledge a transaction rejected by the server.
        ConfirmTransaction(ConfirmTransactionPacket) = 106,
        /// The client is quitting.
        Disconnect(DisconnectPacket) = 255,
    }
}


/// Error while decoding a packet, this is a fatal framing fault for the connection.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// The stream ended before the packet was complete, or a field is invalid.
    #[error("decode error: {0}")]
    Decode(#[from] io::Error),
    /// The packet id has no registered layout.
    #[error("{0}")]
    UnrecognizedType(#[from] UnrecognizedType),
}

impl ProtoError {

    /// Return true if this error is caused by a packet that is not yet fully received,
    /// the caller may retry when more bytes are available.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtoError::Decode(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }

}


/// Return the chunk id of a block position: its X and Z coordinates rounded down to the
/// origin of the containing 16x16 chunk column.
#[inline]
pub fn chunk_id(x: i32, z: i32) -> (i32, i32) {
    (x.div_euclid(16) * 16, z.div_euclid(16) * 16)
}


/// Packet 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlivePacket {
    pub id: i32,
}

/// Packet 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPacket {
    /// Entity id of the player when sent by the server, protocol version when sent by
    /// the client.
    pub entity_id: i32,
    /// Username when sent by the client, unused by the server.
    pub username: String,
    pub level_type: String,
    pub mode: i32,
    pub dimension: i32,
    pub difficulty: i8,
    pub world_height: u8,
    pub max_players: u8,
}

/// Packet 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub data: String,
}

/// Maximum length of a chat message, in UTF-16 code units.
pub const CHAT_MAX_LEN: usize = 119;

/// Packet 3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPacket {
    pub message: String,
}

/// Packet 13
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLookPacket {
    /// Position of the player's feet.
    pub pos: DVec3,
    /// Y position of the player's eyes.
    pub stance: f64,
    /// Yaw and pitch.
    pub look: Vec2,
    pub on_ground: bool,
}

/// Packet 16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldItemChangePacket {
    /// Index in the hotbar, in range 0..9.
    pub slot: i16,
}

/// Packet 50
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAllocationPacket {
    pub cx: i32,
    pub cz: i32,
    /// True to allocate, false to free.
    pub mode: bool,
}

/// Packet 51
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDataPacket {
    pub cx: i32,
    pub cz: i32,
    pub ground_up_continuous: bool,
    /// Bit mask of the 16-block high sections present in the data.
    pub primary_bit_map: u16,
    /// Bit mask of the sections with extended block ids.
    pub add_bit_map: u16,
    /// Deflate compressed payload, opaque to the codec.
    pub compressed_data: Vec<u8>,
}

/// Packet 52
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiBlockChangePacket {
    pub cx: i32,
    pub cz: i32,
    pub records: Vec<MultiBlockRecord>,
}

/// A block change of a [`MultiBlockChangePacket`], with chunk-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiBlockRecord {
    /// X coordinate in range 0..16.
    pub x: u8,
    pub y: u8,
    /// Z coordinate in range 0..16.
    pub z: u8,
    /// Block id, 12 bits.
    pub block: u16,
    /// Block metadata, 4 bits.
    pub metadata: u8,
}

/// Packet 53
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockChangePacket {
    pub x: i32,
    pub y: u8,
    pub z: i32,
    pub block: u8,
    pub metadata: u8,
}

/// Packet 100
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenWindowPacket {
    pub window_id: i8,
    /// Kind of window, 0 for chests.
    pub kind: u8,
    /// Title of the window, like `container.chest` or `container.chestDouble`.
    pub title: String,
    /// Number of slots of the window, excluding the player inventory.
    pub slot_count: u8,
}

/// Packet 101
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseWindowPacket {
    pub window_id: i8,
}

/// Packet 102
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickWindowPacket {
    pub window_id: i8,
    pub slot: i16,
    pub button: MouseButton,
    /// Transaction id, also called action number, used to confirm the click.
    pub transaction_id: i16,
    pub shift: bool,
    /// The item in the slot before the click.
    pub item: Option<ItemStack>,
}

/// The mouse button of a window click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Packet 103
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSlotPacket {
    /// If `window_id = -1` and `slot = -1`, this is the window cursor.
    pub window_id: i8,
    pub slot: i16,
    pub item: Option<ItemStack>,
}

/// Packet 104
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetWindowItemsPacket {
    pub window_id: i8,
    /// Items of each slot, indexed by slot id.
    pub items: Vec<Option<ItemStack>>,
}

/// Packet 106
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmTransactionPacket {
    pub window_id: i8,
    pub transaction_id: i16,
    pub accepted: bool,
}

/// Packet 255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    /// The reason for being kicked or disconnection.
    pub reason: String,
}


impl ChunkAllocationPacket {

    /// Block coordinates of the chunk's origin.
    pub fn chunk_id(&self) -> (i32, i32) {
        (self.cx * 16, self.cz * 16)
    }

}

impl ChunkDataPacket {

    /// Block coordinates of the chunk's origin.
    pub fn chunk_id(&self) -> (i32, i32) {
        (self.cx * 16, self.cz * 16)
    }

}

impl BlockChangePacket {

    pub fn pos(&self) -> IVec3 {
        IVec3::new(self.x, self.y as i32, self.z)
    }

    pub fn chunk_id(&self) -> (i32, i32) {
        chunk_id(self.x, self.z)
    }

}

impl MultiBlockChangePacket {

    /// Build a packet from absolute block changes, every position must be in the same
    /// chunk as the first one, the chunk is taken from the first change.
    pub fn from_changes(changes: &[(IVec3, u16, u8)]) -> Self {

        let (cx, cz) = changes.first()
            .map(|&(pos, _, _)| (pos.x.div_euclid(16), pos.z.div_euclid(16)))
            .unwrap_or_default();

        let records = changes.iter().map(|&(pos, block, metadata)| {
            debug_assert_eq!(chunk_id(pos.x, pos.z), (cx * 16, cz * 16));
            MultiBlockRecord {
                x: pos.x.rem_euclid(16) as u8,
                y: pos.y as u8,
                z: pos.z.rem_euclid(16) as u8,
                block: block & 0xFFF,
                metadata: metadata & 0xF,
            }
        }).collect();

        Self { cx, cz, records }

    }

    pub fn chunk_id(&self) -> (i32, i32) {
        (self.cx * 16, self.cz * 16)
    }

    /// Iterate over the block changes with absolute positions, the chunk origin being
    /// applied back on the chunk-local coordinates.
    pub fn changes(&self) -> impl Iterator<Item = (IVec3, u16, u8)> + '_ {
        let (ox, oz) = self.chunk_id();
        self.records.iter().map(move |record| {
            let pos = IVec3::new(ox + record.x as i32, record.y as i32, oz + record.z as i32);
            (pos, record.block, record.metadata)
        })
    }

}


impl<D> Body<D> for KeepAlivePacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { id: read.read_java_int()? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_int(self.id)
    }

}

impl<D> Body<D> for LoginPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            entity_id: read.read_java_int()?,
            username: read.read_java_string16(16)?,
            level_type: read.read_java_string16(16)?,
            mode: read.read_java_int()?,
            dimension: read.read_java_int()?,
            difficulty: read.read_java_byte()?,
            world_height: read.read_java_ubyte()?,
            max_players: read.read_java_ubyte()?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_int(self.entity_id)?;
        write.write_java_string16(&self.username)?;
        write.write_java_string16(&self.level_type)?;
        write.write_java_int(self.mode)?;
        write.write_java_int(self.dimension)?;
        write.write_java_byte(self.difficulty)?;
        write.write_java_ubyte(self.world_height)?;
        write.write_java_ubyte(self.max_players)
    }

}

impl<D> Body<D> for HandshakePacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { data: read.read_java_string16(64)? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_string16(&self.data)
    }

}

impl<D> Body<D> for ChatPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { message: read.read_java_string16(CHAT_MAX_LEN)? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        // Longer messages are refused by the server. Never split a surrogate pair.
        let mut units = 0;
        let end = self.message.char_indices()
            .find(|&(_, c)| {
                units += c.len_utf16();
                units > CHAT_MAX_LEN
            })
            .map_or(self.message.len(), |(index, _)| index);
        write.write_java_string16(&self.message[..end])
    }

}

/// The server sends the stance before the Y coordinate.
impl Body<ClientBound> for PositionLookPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        let x = read.read_java_double()?;
        let stance = read.read_java_double()?;
        let y = read.read_java_double()?;
        let z = read.read_java_double()?;
        let yaw = read.read_java_float()?;
        let pitch = read.read_java_float()?;
        let on_ground = read.read_java_boolean()?;
        Ok(Self {
            pos: DVec3::new(x, y, z),
            stance,
            look: Vec2::new(yaw, pitch),
            on_ground,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_double(self.pos.x)?;
        write.write_java_double(self.stance)?;
        write.write_java_double(self.pos.y)?;
        write.write_java_double(self.pos.z)?;
        write.write_java_float(self.look.x)?;
        write.write_java_float(self.look.y)?;
        write.write_java_boolean(self.on_ground)
    }

}

impl Body<ServerBound> for PositionLookPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        let x = read.read_java_double()?;
        let y = read.read_java_double()?;
        let stance = read.read_java_double()?;
        let z = read.read_java_double()?;
        let yaw = read.read_java_float()?;
        let pitch = read.read_java_float()?;
        let on_ground = read.read_java_boolean()?;
        Ok(Self {
            pos: DVec3::new(x, y, z),
            stance,
            look: Vec2::new(yaw, pitch),
            on_ground,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_double(self.pos.x)?;
        write.write_java_double(self.pos.y)?;
        write.write_java_double(self.stance)?;
        write.write_java_double(self.pos.z)?;
        write.write_java_float(self.look.x)?;
        write.write_java_float(self.look.y)?;
        write.write_java_boolean(self.on_ground)
    }

}

impl<D> Body<D> for HeldItemChangePacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { slot: read.read_java_short()? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_short(self.slot)
    }

}

impl<D> Body<D> for ChunkAllocationPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            cx: read.read_java_int()?,
            cz: read.read_java_int()?,
            mode: read.read_java_boolean()?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_int(self.cx)?;
        write.write_java_int(self.cz)?;
        write.write_java_boolean(self.mode)
    }

}

impl<D> Body<D> for ChunkDataPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {

        let cx = read.read_java_int()?;
        let cz = read.read_java_int()?;
        let ground_up_continuous = read.read_java_boolean()?;
        let primary_bit_map = read.read_java_ushort()?;
        let add_bit_map = read.read_java_ushort()?;
        let compressed_len = read.read_java_int()?;
        let _unused = read.read_java_int()?;

        let compressed_len = usize::try_from(compressed_len)
            .map_err(|_| new_invalid_data_err("negative compressed length"))?;

        Ok(Self {
            cx,
            cz,
            ground_up_continuous,
            primary_bit_map,
            add_bit_map,
            compressed_data: read.read_java_bytes(compressed_len)?,
        })

    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {

        let compressed_len = i32::try_from(self.compressed_data.len())
            .map_err(|_| new_invalid_data_err("compressed data too big"))?;

        write.write_java_int(self.cx)?;
        write.write_java_int(self.cz)?;
        write.write_java_boolean(self.ground_up_continuous)?;
        write.write_java_ushort(self.primary_bit_map)?;
        write.write_java_ushort(self.add_bit_map)?;
        write.write_java_int(compressed_len)?;
        write.write_java_int(0)?;
        write.write_all(&self.compressed_data)

    }

}

impl<D> Body<D> for MultiBlockChangePacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {

        let cx = read.read_java_int()?;
        let cz = read.read_java_int()?;
        let count = read.read_java_short()?;
        let byte_len = read.read_java_int()?;

        if count < 0 {
            return Err(new_invalid_data_err("negative record count"));
        } else if byte_len != count as i32 * 4 {
            return Err(new_invalid_data_err("record count and data length mismatch"));
        }

        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let xz = read.read_java_ubyte()?;
            let y = read.read_java_ubyte()?;
            let block_metadata = read.read_java_ushort()?;
            records.push(MultiBlockRecord {
                x: xz & 0xF,
                y,
                z: xz >> 4,
                block: block_metadata >> 4,
                metadata: (block_metadata & 0xF) as u8,
            });
        }

        Ok(Self { cx, cz, records })

    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {

        let count = i16::try_from(self.records.len())
            .map_err(|_| new_invalid_data_err("too much records"))?;

        write.write_java_int(self.cx)?;
        write.write_java_int(self.cz)?;
        write.write_java_short(count)?;
        write.write_java_int(count as i32 * 4)?;

        for record in &self.records {
            write.write_java_ubyte((record.x & 0xF) | (record.z << 4))?;
            write.write_java_ubyte(record.y)?;
            write.write_java_ushort((record.block << 4) | (record.metadata & 0xF) as u16)?;
        }

        Ok(())

    }

}

impl<D> Body<D> for BlockChangePacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            x: read.read_java_int()?,
            y: read.read_java_ubyte()?,
            z: read.read_java_int()?,
            block: read.read_java_ubyte()?,
            metadata: read.read_java_ubyte()?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_int(self.x)?;
        write.write_java_ubyte(self.y)?;
        write.write_java_int(self.z)?;
        write.write_java_ubyte(self.block)?;
        write.write_java_ubyte(self.metadata)
    }

}

impl<D> Body<D> for OpenWindowPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            window_id: read.read_java_byte()?,
            kind: read.read_java_ubyte()?,
            title: read.read_java_string16(32)?,
            slot_count: read.read_java_ubyte()?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_byte(self.window_id)?;
        write.write_java_ubyte(self.kind)?;
        write.write_java_string16(&self.title)?;
        write.write_java_ubyte(self.slot_count)
    }

}

impl<D> Body<D> for CloseWindowPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { window_id: read.read_java_byte()? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_byte(self.window_id)
    }

}

impl<D> Body<D> for ClickWindowPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            window_id: read.read_java_byte()?,
            slot: read.read_java_short()?,
            button: match read.read_java_byte()? {
                0 => MouseButton::Left,
                1 => MouseButton::Right,
                _ => return Err(new_invalid_data_err("invalid mouse button")),
            },
            transaction_id: read.read_java_short()?,
            shift: read.read_java_boolean()?,
            item: item::read_slot(read)?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_byte(self.window_id)?;
        write.write_java_short(self.slot)?;
        write.write_java_byte(match self.button {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
        })?;
        write.write_java_short(self.transaction_id)?;
        write.write_java_boolean(self.shift)?;
        item::write_slot(write, self.item.as_ref())
    }

}

impl<D> Body<D> for SetSlotPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            window_id: read.read_java_byte()?,
            slot: read.read_java_short()?,
            item: item::read_slot(read)?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_byte(self.window_id)?;
        write.write_java_short(self.slot)?;
        item::write_slot(write, self.item.as_ref())
    }

}

impl<D> Body<D> for SetWindowItemsPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {

        let window_id = read.read_java_byte()?;
        let count = read.read_java_short()?;
        if count < 0 {
            return Err(new_invalid_data_err("negative item count"));
        }

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(item::read_slot(read)?);
        }

        Ok(Self { window_id, items })

    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {

        let count = i16::try_from(self.items.len())
            .map_err(|_| new_invalid_data_err("too much items"))?;

        write.write_java_byte(self.window_id)?;
        write.write_java_short(count)?;
        for item in &self.items {
            item::write_slot(write, item.as_ref())?;
        }

        Ok(())

    }

}

impl<D> Body<D> for ConfirmTransactionPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self {
            window_id: read.read_java_byte()?,
            transaction_id: read.read_java_short()?,
            accepted: read.read_java_boolean()?,
        })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_byte(self.window_id)?;
        write.write_java_short(self.transaction_id)?;
        write.write_java_boolean(self.accepted)
    }

}

impl<D> Body<D> for DisconnectPacket {

    fn read(read: &mut dyn Read) -> io::Result<Self> {
        Ok(Self { reason: read.read_java_string16(256)? })
    }

    fn write(&self, write: &mut dyn Write) -> io::Result<()> {
        write.write_java_string16(&self.reason)
    }

}


/// Construction of packets from raw bytes laid out field by field, like a server would
/// produce them, without going through the typed encoder.
#[cfg(test)]
pub(crate) mod test_support {

    use byteorder::{WriteBytesExt, BE};

    use super::*;

    /// Decode a client-bound packet from its body, prefixed with the given id, and
    /// check that the whole body was consumed.
    pub fn receive(id: u8, body: &[u8]) -> InPacket {
        let mut bytes = vec![id];
        bytes.extend_from_slice(body);
        let (packet, len) = InPacket::decode(&bytes).unwrap();
        assert_eq!(len, bytes.len(), "packet {id} not fully consumed");
        packet
    }

    pub fn block_change(pos: [i32; 3], block: u8, metadata: u8) -> BlockChangePacket {
        let mut body = Vec::new();
        body.write_i32::<BE>(pos[0]).unwrap();
        body.write_u8(pos[1] as u8).unwrap();
        body.write_i32::<BE>(pos[2]).unwrap();
        body.write_u8(block).unwrap();
        body.write_u8(metadata).unwrap();
        match receive(53, &body) {
            InPacket::BlockChange(packet) => packet,
            packet => panic!("unexpected packet: {packet:?}"),
        }
    }

    pub fn chunk_allocation(chunk_id: [i32; 2], mode: bool) -> ChunkAllocationPacket {
        let mut body = Vec::new();
        body.write_i32::<BE>(chunk_id[0] / 16).unwrap();
        body.write_i32::<BE>(chunk_id[1] / 16).unwrap();
        body.write_u8(mode as u8).unwrap();
        match receive(50, &body) {
            InPacket::ChunkAllocation(packet) => packet,
            packet => panic!("unexpected packet: {packet:?}"),
        }
    }

    pub fn multi_block_change(changes: &[([i32; 3], u16, u8)]) -> MultiBlockChangePacket {

        let blocks = changes.iter()
            .map(|&(pos, block, metadata)| block_change(pos, block as u8, metadata))
            .collect::<Vec<_>>();

        let (chunk_x, chunk_z) = blocks[0].chunk_id();

        let mut body = Vec::new();
        body.write_i32::<BE>(chunk_x / 16).unwrap();
        body.write_i32::<BE>(chunk_z / 16).unwrap();
        body.write_u16::<BE>(blocks.len() as u16).unwrap();
        body.write_i32::<BE>(4 * blocks.len() as i32).unwrap();
        for block in &blocks {
            body.write_u8(((block.x % 16) + ((block.z % 16) << 4)) as u8).unwrap();
            body.write_u8(block.y).unwrap();
            body.write_i16::<BE>(((block.block as i16) << 4) + (block.metadata & 0xF) as i16).unwrap();
        }

        match receive(52, &body) {
            InPacket::MultiBlockChange(packet) => packet,
            packet => panic!("unexpected packet: {packet:?}"),
        }

    }

    pub fn chunk_data(
        chunk_id: [i32; 2],
        ground_up_continuous: bool,
        primary_bit_map: u16,
        add_bit_map: u16,
        compressed: &[u8],
    ) -> ChunkDataPacket {

        let mut body = Vec::new();
        body.write_i32::<BE>(chunk_id[0] / 16).unwrap();
        body.write_i32::<BE>(chunk_id[1] / 16).unwrap();
        body.write_u8(ground_up_continuous as u8).unwrap();
        body.write_u16::<BE>(primary_bit_map).unwrap();
        body.write_u16::<BE>(add_bit_map).unwrap();
        body.write_i32::<BE>(compressed.len() as i32).unwrap();
        body.write_i32::<BE>(0).unwrap();
        body.extend_from_slice(compressed);

        match receive(51, &body) {
            InPacket::ChunkData(packet) => packet,
            packet => panic!("unexpected packet: {packet:?}"),
        }

    }

    pub fn open_window(window_id: i8, kind: u8, title: &str, slot_count: u8) -> InPacket {
        InPacket::OpenWindow(OpenWindowPacket {
            window_id,
            kind,
            title: title.to_string(),
            slot_count,
        })
    }

    pub fn close_window(window_id: i8) -> InPacket {
        InPacket::CloseWindow(CloseWindowPacket { window_id })
    }

    pub fn set_window_items(window_id: i8, items: Vec<Option<ItemStack>>) -> InPacket {
        InPacket::SetWindowItems(SetWindowItemsPacket { window_id, items })
    }

    pub fn set_slot(window_id: i8, slot: i16, item: Option<ItemStack>) -> InPacket {
        InPacket::SetSlot(SetSlotPacket { window_id, slot, item })
    }

    pub fn confirm_transaction(window_id: i8, transaction_id: i16, accepted: bool) -> InPacket {
        InPacket::ConfirmTransaction(ConfirmTransactionPacket { window_id, transaction_id, accepted })
    }

}


#[cfg(test)]
mod tests {

    use std::io::Write;

    use flate2::Compression;
    use flate2::read::ZlibDecoder;
    use flate2::write::ZlibEncoder;

    use super::test_support::*;
    use super::*;

    /// Piston block id.
    const PISTON: u16 = 33;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decompress(data: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut decoded).unwrap();
        decoded
    }

    #[test]
    fn chunk_id_rounding() {
        assert_eq!(chunk_id(70, 900), (64, 896));
        assert_eq!(chunk_id(0, 15), (0, 0));
        assert_eq!(chunk_id(-1, -16), (-16, -16));
        assert_eq!(chunk_id(-17, 16), (-32, 16));
    }

    #[test]
    fn block_change() {
        let bc = super::test_support::block_change([70, 80, 900], 44, 3);
        assert_eq!(bc.x, 70);
        assert_eq!(bc.y, 80);
        assert_eq!(bc.z, 900);
        assert_eq!(bc.chunk_id(), (64, 896));
        assert_eq!(bc.block, 44);
        assert_eq!(bc.metadata, 3);
        assert_eq!(bc.pos(), IVec3::new(70, 80, 900));
    }

    #[test]
    fn chunk_allocation() {

        let ca = super::test_support::chunk_allocation([7 * 16, 8 * 16], true);
        assert!(ca.mode);
        assert_eq!(ca.chunk_id(), (7 * 16, 8 * 16));

        let ca = super::test_support::chunk_allocation([7 * 16, 8 * 16], false);
        assert!(!ca.mode);

    }

    #[test]
    fn multi_block_change() {

        let mbc = super::test_support::multi_block_change(&[
            ([10, 1, 23], PISTON, 0),
            ([10, 2, 23], PISTON, 1),
            ([10, 3, 23], PISTON, 2),
            ([10, 4, 23], PISTON, 3),
        ]);

        assert_eq!(mbc.chunk_id(), (0, 16));
        assert_eq!(mbc.records[0], MultiBlockRecord { x: 10, y: 1, z: 7, block: PISTON, metadata: 0 });
        assert_eq!(mbc.changes().collect::<Vec<_>>(), [
            (IVec3::new(10, 1, 23), PISTON, 0),
            (IVec3::new(10, 2, 23), PISTON, 1),
            (IVec3::new(10, 3, 23), PISTON, 2),
            (IVec3::new(10, 4, 23), PISTON, 3),
        ]);

        let rebuilt = MultiBlockChangePacket::from_changes(&mbc.changes().collect::<Vec<_>>());
        assert_eq!(rebuilt, mbc);

    }

    #[test]
    fn multi_block_change_length_mismatch() {
        // One record announced with 8 bytes of data.
        let body = [0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 8, 0, 0, 0, 0];
        let err = InPacket::decode(&[&[52u8][..], &body[..]].concat()).unwrap_err();
        assert!(matches!(err, ProtoError::Decode(_)));
        assert!(!err.is_incomplete());
    }

    #[test]
    fn chunk_data() {

        let data = (0..=255u8).collect::<Vec<_>>();
        let compressed = compress(&data);

        let p = super::test_support::chunk_data([96, 256], true, 0xFFFF, 5, &compressed);
        assert!(p.ground_up_continuous);
        assert_eq!(p.primary_bit_map, 0xFFFF);
        assert_eq!(p.add_bit_map, 5);
        assert_eq!(decompress(&p.compressed_data), data);
        assert_eq!(p.chunk_id(), (96, 256));

        let q = super::test_support::chunk_data([96, 256], true, 6, 0xAAAA, &compressed);
        assert!(q.ground_up_continuous);
        assert_eq!(q.primary_bit_map, 6);
        assert_eq!(q.add_bit_map, 0xAAAA);
        assert_eq!(decompress(&q.compressed_data), data);
        assert_eq!(q.chunk_id(), (96, 256));

    }

    #[test]
    fn inbound_reencode() {

        let packets = [
            InPacket::ChunkData(super::test_support::chunk_data([-32, 48], false, 3, 0, &compress(b"abc"))),
            InPacket::BlockChange(super::test_support::block_change([-5, 255, 17], 1, 15)),
            InPacket::OpenWindow(OpenWindowPacket {
                window_id: 7,
                kind: 0,
                title: "container.chestDouble".to_string(),
                slot_count: 54,
            }),
            InPacket::SetWindowItems(SetWindowItemsPacket {
                window_id: 0,
                items: vec![None, Some(ItemStack::new(360, 2)), Some(ItemStack::new(267, 1).with_damage(12))],
            }),
            InPacket::SetSlot(SetSlotPacket {
                window_id: CURSOR_WINDOW_ID,
                slot: CURSOR_SLOT,
                item: None,
            }),
            InPacket::PositionLook(PositionLookPacket {
                pos: DVec3::new(8.5, 70.0, -3.25),
                stance: 71.62,
                look: Vec2::new(90.0, -10.0),
                on_ground: true,
            }),
        ];

        for packet in packets {
            let bytes = packet.encode().unwrap();
            let (decoded, len) = InPacket::decode(&bytes).unwrap();
            assert_eq!(len, bytes.len());
            assert_eq!(decoded, packet);
            assert_eq!(decoded.encode().unwrap(), bytes);
        }

    }

    fn string16(s: &str) -> Vec<u8> {
        let mut bytes = (s.encode_utf16().count() as i16).to_be_bytes().to_vec();
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn inbound_frames() {

        let frames = [
            (
                [&[0u8][..], &12345i32.to_be_bytes()].concat(),
                InPacket::KeepAlive(KeepAlivePacket { id: 12345 }),
            ),
            (
                [
                    &[1u8][..],
                    &42i32.to_be_bytes(),
                    &string16(""),
                    &string16("DEFAULT"),
                    &0i32.to_be_bytes(),
                    &(-1i32).to_be_bytes(),
                    &[2u8, 128, 20],
                ].concat(),
                InPacket::Login(LoginPacket {
                    entity_id: 42,
                    username: String::new(),
                    level_type: "DEFAULT".to_string(),
                    mode: 0,
                    dimension: -1,
                    difficulty: 2,
                    world_height: 128,
                    max_players: 20,
                }),
            ),
            (
                [&[2u8][..], &string16("-")].concat(),
                InPacket::Handshake(HandshakePacket { data: "-".to_string() }),
            ),
            (
                [&[3u8][..], &string16("<Notch> héllo 😀")].concat(),
                InPacket::Chat(ChatPacket { message: "<Notch> héllo 😀".to_string() }),
            ),
            (
                [&[50u8][..], &(-3i32).to_be_bytes(), &7i32.to_be_bytes(), &[1u8]].concat(),
                InPacket::ChunkAllocation(ChunkAllocationPacket { cx: -3, cz: 7, mode: true }),
            ),
            (
                [
                    &[52u8][..],
                    &0i32.to_be_bytes(),
                    &1i32.to_be_bytes(),
                    &2i16.to_be_bytes(),
                    &8i32.to_be_bytes(),
                    &[0x7Au8, 1, 0x02, 0x10],
                    &[0x7Au8, 2, 0x02, 0x11],
                ].concat(),
                InPacket::MultiBlockChange(MultiBlockChangePacket::from_changes(&[
                    (IVec3::new(10, 1, 23), PISTON, 0),
                    (IVec3::new(10, 2, 23), PISTON, 1),
                ])),
            ),
            (
                vec![101, 7],
                InPacket::CloseWindow(CloseWindowPacket { window_id: 7 }),
            ),
            (
                vec![106, 7, 0, 12, 0],
                InPacket::ConfirmTransaction(ConfirmTransactionPacket {
                    window_id: 7,
                    transaction_id: 12,
                    accepted: false,
                }),
            ),
            (
                [&[255u8][..], &string16("Kicked by an operator.")].concat(),
                InPacket::Disconnect(DisconnectPacket { reason: "Kicked by an operator.".to_string() }),
            ),
        ];

        for (bytes, packet) in frames {
            let (decoded, len) = InPacket::decode(&bytes).unwrap();
            assert_eq!(len, bytes.len());
            assert_eq!(decoded, packet);
            assert_eq!(decoded.encode().unwrap(), bytes);
        }

    }

    #[test]
    fn chat_truncated_to_utf16_units() {

        // Each emoji takes two units, cutting at 119 units would split a pair.
        let packet = OutPacket::Chat(ChatPacket { message: "😀".repeat(100) });
        let bytes = packet.encode().unwrap();
        assert_eq!(&bytes[1..3], &118i16.to_be_bytes());

        let (decoded, len) = OutPacket::decode(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded, OutPacket::Chat(ChatPacket { message: "😀".repeat(59) }));

        let packet = OutPacket::Chat(ChatPacket { message: "a".repeat(200) });
        let bytes = packet.encode().unwrap();
        assert_eq!(&bytes[1..3], &119i16.to_be_bytes());
        assert!(OutPacket::decode(&bytes).is_ok());

    }

    #[test]
    fn outbound_round_trip() {

        let packets = [
            OutPacket::KeepAlive(KeepAlivePacket { id: -42 }),
            OutPacket::Login(LoginPacket {
                entity_id: 17,
                username: "redstone".to_string(),
                level_type: String::new(),
                mode: 0,
                dimension: 0,
                difficulty: 0,
                world_height: 0,
                max_players: 0,
            }),
            OutPacket::Handshake(HandshakePacket { data: "redstone;localhost:25565".to_string() }),
            OutPacket::Chat(ChatPacket { message: "hello".to_string() }),
            OutPacket::HeldItemChange(HeldItemChangePacket { slot: 4 }),
            OutPacket::CloseWindow(CloseWindowPacket { window_id: 3 }),
            OutPacket::ClickWindow(ClickWindowPacket {
                window_id: 0,
                slot: 36,
                button: MouseButton::Left,
                transaction_id: 1,
                shift: false,
                item: Some(ItemStack::new(1, 30)),
            }),
            OutPacket::ConfirmTransaction(ConfirmTransactionPacket {
                window_id: 2,
                transaction_id: 7,
                accepted: true,
            }),
            OutPacket::PositionLook(PositionLookPacket {
                pos: DVec3::new(1.0, 64.0, 2.0),
                stance: 65.62,
                look: Vec2::ZERO,
                on_ground: false,
            }),
            OutPacket::Disconnect(DisconnectPacket { reason: "Quitting".to_string() }),
        ];

        for packet in packets {
            let bytes = packet.encode().unwrap();
            assert_eq!(bytes[0], packet.id());
            assert_eq!(OutPacket::decode(&bytes).unwrap(), (packet, bytes.len()));
        }

    }

    #[test]
    fn position_look_direction() {

        let packet = PositionLookPacket {
            pos: DVec3::new(0.0, 64.0, 0.0),
            stance: 65.0,
            look: Vec2::ZERO,
            on_ground: true,
        };

        let client_bound = InPacket::PositionLook(packet.clone()).encode().unwrap();
        let server_bound = OutPacket::PositionLook(packet).encode().unwrap();
        assert_eq!(&client_bound[9..17], &65.0f64.to_be_bytes());
        assert_eq!(&server_bound[9..17], &64.0f64.to_be_bytes());

    }

    #[test]
    fn truncated_packet() {

        let bytes = OutPacket::ClickWindow(ClickWindowPacket {
            window_id: 0,
            slot: 9,
            button: MouseButton::Right,
            transaction_id: 3,
            shift: true,
            item: None,
        }).encode().unwrap();

        let err = OutPacket::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_incomplete());

    }

    #[test]
    fn unrecognized_packet() {
        let err = InPacket::decode(&[0x42, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtoError::UnrecognizedType(UnrecognizedType { tid: 0x42, context: "InPacket" })));
        assert_eq!(err.to_string(), "unrecognized type of InPacket: 66");
    }

}

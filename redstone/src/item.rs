//! Item stacks as transferred in window slots.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::io::{ReadJavaExt, WriteJavaExt, new_invalid_data_err};


/// Maximum stack size used for merging stacks client-side.
pub const MAX_STACK_SIZE: u16 = 64;


/// An item stack defines the actual number of items, their damage value and an optional
/// opaque tag (gzip compressed NBT of enchantments) that the codec never inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStack {
    /// The item id.
    pub id: u16,
    /// The stack size.
    pub size: u16,
    /// The damage value of the stack, also used as metadata for blocks.
    pub damage: u16,
    /// Compressed tag data, only present for enchantable items.
    pub tag: Option<Arc<[u8]>>,
}

impl ItemStack {

    /// Create a stack of the given item without damage.
    pub fn new(id: u16, size: u16) -> Self {
        Self { id, size, damage: 0, tag: None }
    }

    pub fn with_size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    pub fn with_damage(mut self, damage: u16) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<Arc<[u8]>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Return true if both stacks are of the same kind and therefore could be merged,
    /// regardless of their size.
    pub fn is_same_kind(&self, other: &ItemStack) -> bool {
        self.id == other.id && self.damage == other.damage && self.tag == other.tag
    }

}


/// Return true if the given item id carries a tag in its slot wire form, this concerns
/// every item that can be enchanted: tools, weapons, armors, bow, fishing rod and shears.
pub fn has_tag_data(id: u16) -> bool {
    matches!(id, 256..=259 | 261 | 267..=279 | 283..=286 | 290..=294 | 298..=317 | 346 | 359)
}

/// Read the content of a slot, `None` if the slot is empty.
pub fn read_slot(read: &mut (impl Read + ?Sized)) -> io::Result<Option<ItemStack>> {

    let id = read.read_java_short()?;
    if id < 0 {
        return Ok(None);
    }

    let id = id as u16;
    let size = read.read_java_ubyte()? as u16;
    let damage = read.read_java_short()? as u16;

    let mut tag = None;
    if has_tag_data(id) {
        let len = read.read_java_short()?;
        if len >= 0 {
            tag = Some(Arc::from(read.read_java_bytes(len as usize)?));
        }
    }

    Ok(Some(ItemStack { id, size, damage, tag }))

}

/// Write the content of a slot, `None` being an empty slot.
pub fn write_slot(write: &mut (impl Write + ?Sized), stack: Option<&ItemStack>) -> io::Result<()> {

    let Some(stack) = stack else {
        return write.write_java_short(-1);
    };

    let size = u8::try_from(stack.size).map_err(|_| new_invalid_data_err("stack size overflow"))?;

    write.write_java_short(stack.id as i16)?;
    write.write_java_ubyte(size)?;
    write.write_java_short(stack.damage as i16)?;

    if has_tag_data(stack.id) {
        match &stack.tag {
            Some(tag) => {
                let len = i16::try_from(tag.len()).map_err(|_| new_invalid_data_err("tag too big"))?;
                write.write_java_short(len)?;
                write.write_all(tag)?;
            }
            None => write.write_java_short(-1)?,
        }
    }

    Ok(())

}


#[cfg(test)]
mod tests {

    use std::io::Cursor;

    use super::*;

    fn round_trip(stack: Option<ItemStack>) -> (Vec<u8>, Option<ItemStack>) {
        let mut buf = Vec::new();
        write_slot(&mut buf, stack.as_ref()).unwrap();
        let mut cursor = Cursor::new(&buf[..]);
        let read = read_slot(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, buf.len());
        (buf, read)
    }

    #[test]
    fn empty_slot() {
        let (buf, read) = round_trip(None);
        assert_eq!(buf, [0xFF, 0xFF]);
        assert_eq!(read, None);
    }

    #[test]
    fn plain_slot() {
        // Melon slices carry no tag.
        let stack = ItemStack::new(360, 2).with_damage(1);
        let (buf, read) = round_trip(Some(stack.clone()));
        assert_eq!(buf, [0x01, 0x68, 2, 0, 1]);
        assert_eq!(read, Some(stack));
    }

    #[test]
    fn enchantable_slot() {

        // An iron shovel without enchantments still writes the tag length.
        let shovel = ItemStack::new(256, 1);
        let (buf, read) = round_trip(Some(shovel.clone()));
        assert_eq!(buf, [0x01, 0x00, 1, 0, 0, 0xFF, 0xFF]);
        assert_eq!(read, Some(shovel));

        let sword = ItemStack::new(276, 1).with_tag(vec![0x1F, 0x8B, 0x08]);
        let (buf, read) = round_trip(Some(sword.clone()));
        assert_eq!(&buf[5..], &[0, 3, 0x1F, 0x8B, 0x08]);
        assert_eq!(read, Some(sword));

    }

}

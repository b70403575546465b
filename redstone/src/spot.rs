//! Container model: spot identities, ordered arrays of spots and the arena owning the
//! content of every spot.
//!
//! A spot is a single container slot. Windows never own item stacks directly, they
//! only hold [`SpotArray`]s of [`SpotId`], so the same logical slot (like a hotbar
//! slot) can appear in several windows while keeping a single content.

use std::collections::HashMap;
use std::ops::{Add, Index, Range};

use crate::item::ItemStack;


/// Identity of a spot, allocated by [`Spots`] and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpotId(u64);

/// An ordered sequence of spot identities. Equality compares identities, never
/// contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpotArray(Vec<SpotId>);

impl SpotArray {

    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<SpotId> {
        self.0.get(index).copied()
    }

    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = SpotId> + '_ {
        self.0.iter().copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[SpotId] {
        &self.0
    }

    /// Return a new array with the spots in the given contiguous range.
    ///
    /// # Panics
    ///
    /// If the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> SpotArray {
        Self(self.0[range].to_vec())
    }

    /// Return the trailing `count` spots, or all of them if the array is shorter.
    pub fn last(&self, count: usize) -> SpotArray {
        let start = self.0.len().saturating_sub(count);
        Self(self.0[start..].to_vec())
    }

    /// Concatenate this array with another one into a new array.
    pub fn concat(&self, other: &SpotArray) -> SpotArray {
        let mut spots = Vec::with_capacity(self.0.len() + other.0.len());
        spots.extend_from_slice(&self.0);
        spots.extend_from_slice(&other.0);
        Self(spots)
    }

    /// Return a new array without the spots that are present in the other one, order
    /// is kept.
    pub fn without(&self, other: &SpotArray) -> SpotArray {
        self.iter().filter(|&spot| !other.contains(spot)).collect()
    }

    #[inline]
    pub fn contains(&self, spot: SpotId) -> bool {
        self.0.contains(&spot)
    }

    /// Return the index of the given spot in this array.
    #[inline]
    pub fn position(&self, spot: SpotId) -> Option<usize> {
        self.0.iter().position(|&s| s == spot)
    }

    /// Return true if the same spot identity appears more than once.
    pub fn has_duplicates(&self) -> bool {
        let mut sorted = self.0.clone();
        sorted.sort_unstable();
        sorted.windows(2).any(|w| w[0] == w[1])
    }

    /// List the content of each spot, in order.
    pub fn items(&self, spots: &Spots) -> Vec<Option<ItemStack>> {
        self.iter().map(|spot| spots.get(spot).cloned()).collect()
    }

}

impl From<Vec<SpotId>> for SpotArray {
    fn from(value: Vec<SpotId>) -> Self {
        Self(value)
    }
}

impl FromIterator<SpotId> for SpotArray {
    fn from_iter<T: IntoIterator<Item = SpotId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SpotArray {
    type Item = SpotId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, SpotId>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl Index<usize> for SpotArray {
    type Output = SpotId;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Add<&SpotArray> for &SpotArray {
    type Output = SpotArray;
    fn add(self, rhs: &SpotArray) -> Self::Output {
        self.concat(rhs)
    }
}

impl Add for SpotArray {
    type Output = SpotArray;
    fn add(mut self, rhs: SpotArray) -> Self::Output {
        self.0.extend(rhs.0);
        self
    }
}


/// The arena owning the content of every allocated spot.
#[derive(Debug, Default)]
pub struct Spots {
    /// Next identity to allocate.
    next_id: u64,
    /// Content of each live spot, `None` when the spot is empty.
    contents: HashMap<SpotId, Option<ItemStack>>,
}

impl Spots {

    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new empty spot.
    pub fn alloc(&mut self) -> SpotId {
        let id = SpotId(self.next_id);
        self.next_id += 1;
        self.contents.insert(id, None);
        id
    }

    /// Allocate an array of `count` new empty spots.
    pub fn alloc_array(&mut self, count: usize) -> SpotArray {
        (0..count).map(|_| self.alloc()).collect()
    }

    /// Release all spots of the given array, their content is lost and any later
    /// access to them is a no-op.
    pub fn release(&mut self, array: &SpotArray) {
        for spot in array {
            self.contents.remove(&spot);
        }
    }

    /// Return true if the spot is still allocated.
    pub fn contains(&self, spot: SpotId) -> bool {
        self.contents.contains_key(&spot)
    }

    /// Get the content of a spot, `None` if it is empty or released.
    pub fn get(&self, spot: SpotId) -> Option<&ItemStack> {
        self.contents.get(&spot)?.as_ref()
    }

    /// Set the content of a spot and return the previous content. Setting a released
    /// spot does nothing.
    pub fn set(&mut self, spot: SpotId, stack: Option<ItemStack>) -> Option<ItemStack> {
        match self.contents.get_mut(&spot) {
            Some(content) => std::mem::replace(content, stack),
            None => None,
        }
    }

    /// Number of live spots.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn alloc_unique() {
        let mut spots = Spots::new();
        let a = spots.alloc_array(36);
        let b = spots.alloc_array(4);
        assert_eq!(spots.len(), 40);
        assert!(!a.has_duplicates());
        assert!(!(&a + &b).has_duplicates());
        assert!((&a + &a).has_duplicates());
        assert!(a.iter().all(|spot| spots.get(spot).is_none()));
    }

    #[test]
    fn identity_not_content() {

        let mut spots = Spots::new();
        let a = spots.alloc();
        let b = spots.alloc();
        spots.set(a, Some(ItemStack::new(1, 64)));
        spots.set(b, Some(ItemStack::new(1, 64)));

        assert_eq!(spots.get(a), spots.get(b));
        assert_ne!(a, b);
        assert!(!SpotArray::from(vec![a, b]).has_duplicates());

    }

    #[test]
    fn ranges() {

        let mut spots = Spots::new();
        let regular = spots.alloc_array(36);
        let hotbar = regular.last(9);

        assert_eq!(hotbar.len(), 9);
        assert_eq!(hotbar, regular.slice(27..36));
        assert_eq!(hotbar[0], regular[27]);
        assert_eq!(regular.without(&hotbar), regular.slice(0..27));
        assert_eq!(regular.without(&hotbar) + hotbar.clone(), regular);
        assert_eq!(regular.position(hotbar[8]), Some(35));
        assert_eq!(hotbar.position(regular[0]), None);
        assert!(regular.contains(hotbar[4]));
        assert_eq!(regular.last(100), regular);

    }

    #[test]
    fn set_and_release() {

        let mut spots = Spots::new();
        let array = spots.alloc_array(3);
        let melon = ItemStack::new(360, 2);

        assert_eq!(spots.set(array[1], Some(melon.clone())), None);
        assert_eq!(array.items(&spots), [None, Some(melon.clone()), None]);
        assert_eq!(spots.set(array[1], None), Some(melon.clone()));

        spots.set(array[2], Some(melon.clone()));
        spots.release(&array);
        assert!(spots.is_empty());
        assert!(!spots.contains(array[2]));
        assert_eq!(spots.get(array[2]), None);
        assert_eq!(spots.set(array[2], Some(melon)), None);
        assert_eq!(spots.get(array[2]), None);

        // Identities are not reused after release.
        let fresh = spots.alloc();
        assert!(!array.contains(fresh));

    }

}

//! Window layouts, each window exposes its full ordered list of spots, the index of a
//! spot in this list being its slot id on the wire.

use once_cell::sync::Lazy;
use tracing::debug;

use crate::registry::{Registry, UnrecognizedType};
use crate::spot::{SpotArray, SpotId, Spots};


/// Number of regular spots in the player inventory.
pub const REGULAR_COUNT: usize = 36;
/// Number of hotbar spots, the trailing regular spots.
pub const HOTBAR_COUNT: usize = 9;

/// Window kind of chests, small or large.
pub const CHEST_KIND: u8 = 0;
/// Window kind of crafting tables.
pub const WORKBENCH_KIND: u8 = 1;
/// Window kind of furnaces.
pub const FURNACE_KIND: u8 = 2;
/// Window kind of dispensers.
pub const DISPENSER_KIND: u8 = 3;


/// The 2x2 crafting grid of the player inventory, with its output.
#[derive(Debug, Clone)]
pub struct InventoryCrafting {
    output: SpotId,
    /// Row-major input spots.
    inputs: SpotArray,
}

impl InventoryCrafting {

    pub fn new(spots: &mut Spots) -> Self {
        Self {
            output: spots.alloc(),
            inputs: spots.alloc_array(4),
        }
    }

    pub fn output_spot(&self) -> SpotId {
        self.output
    }

    /// Get an input spot by its row and column, both in range 0..2.
    ///
    /// # Panics
    ///
    /// If the row or column is out of range.
    pub fn input_spot(&self, row: usize, col: usize) -> SpotId {
        assert!(row < 2 && col < 2, "invalid crafting input {row},{col}");
        self.inputs[row * 2 + col]
    }

    pub fn input_spots(&self) -> &SpotArray {
        &self.inputs
    }

    pub fn upper_left(&self) -> SpotId {
        self.input_spot(0, 0)
    }

    pub fn upper_right(&self) -> SpotId {
        self.input_spot(0, 1)
    }

    pub fn lower_left(&self) -> SpotId {
        self.input_spot(1, 0)
    }

    pub fn lower_right(&self) -> SpotId {
        self.input_spot(1, 1)
    }

    /// The output spot followed by the input spots.
    pub fn spots(&self) -> SpotArray {
        &SpotArray::from(vec![self.output]) + &self.inputs
    }

}


/// The player inventory: armor and regular spots, the hotbar being the trailing 9
/// regular spots.
#[derive(Debug, Clone)]
pub struct Inventory {
    /// Helmet, chestplate, leggings and boots.
    armor: SpotArray,
    regular: SpotArray,
}

impl Inventory {

    pub fn new(spots: &mut Spots) -> Self {
        Self {
            armor: spots.alloc_array(4),
            regular: spots.alloc_array(REGULAR_COUNT),
        }
    }

    pub fn helmet_spot(&self) -> SpotId {
        self.armor[0]
    }

    pub fn chestplate_spot(&self) -> SpotId {
        self.armor[1]
    }

    pub fn leggings_spot(&self) -> SpotId {
        self.armor[2]
    }

    pub fn boots_spot(&self) -> SpotId {
        self.armor[3]
    }

    pub fn armor_spots(&self) -> &SpotArray {
        &self.armor
    }

    pub fn regular_spots(&self) -> &SpotArray {
        &self.regular
    }

    pub fn hotbar_spots(&self) -> SpotArray {
        self.regular.last(HOTBAR_COUNT)
    }

    /// Regular spots that are not in the hotbar.
    pub fn storage_spots(&self) -> SpotArray {
        self.regular.slice(0..REGULAR_COUNT - HOTBAR_COUNT)
    }

    /// Armor spots followed by regular spots.
    pub fn spots(&self) -> SpotArray {
        &self.armor + &self.regular
    }

}


/// The window of the player inventory, always open with id 0.
#[derive(Debug, Clone)]
pub struct InventoryWindow {
    crafting: InventoryCrafting,
    inventory: Inventory,
    spots: SpotArray,
}

impl InventoryWindow {

    pub fn new(spots: &mut Spots) -> Self {

        let crafting = InventoryCrafting::new(spots);
        let inventory = Inventory::new(spots);

        let spots = crafting.spots()
            + inventory.armor_spots().clone()
            + inventory.storage_spots()
            + inventory.hotbar_spots();

        Self { crafting, inventory, spots }

    }

    pub fn crafting(&self) -> &InventoryCrafting {
        &self.crafting
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn spots(&self) -> &SpotArray {
        &self.spots
    }

}


/// A chest window with 27 or 54 chest spots, followed by the player's regular spots.
#[derive(Debug, Clone)]
pub struct ChestWindow {
    chest: SpotArray,
    inventory: SpotArray,
    spots: SpotArray,
}

impl ChestWindow {

    pub fn new(spots: &mut Spots, inventory: &Inventory, size: usize) -> Self {
        let chest = spots.alloc_array(size);
        let window_spots = &(&chest + &inventory.storage_spots()) + &inventory.hotbar_spots();
        Self {
            chest,
            inventory: inventory.regular_spots().clone(),
            spots: window_spots,
        }
    }

    pub fn chest_spots(&self) -> &SpotArray {
        &self.chest
    }

    /// The player's 36 regular spots.
    pub fn inventory_spots(&self) -> &SpotArray {
        &self.inventory
    }

    pub fn spots(&self) -> &SpotArray {
        &self.spots
    }

}


/// Any other window, its container spots followed by the player's regular spots.
#[derive(Debug, Clone)]
pub struct GenericWindow {
    kind: u8,
    container: SpotArray,
    inventory: SpotArray,
    spots: SpotArray,
}

impl GenericWindow {

    pub fn new(spots: &mut Spots, inventory: &Inventory, kind: u8, slot_count: usize) -> Self {
        let container = spots.alloc_array(slot_count);
        let window_spots = &(&container + &inventory.storage_spots()) + &inventory.hotbar_spots();
        Self {
            kind,
            container,
            inventory: inventory.regular_spots().clone(),
            spots: window_spots,
        }
    }

    pub fn kind(&self) -> u8 {
        self.kind
    }

    pub fn container_spots(&self) -> &SpotArray {
        &self.container
    }

    pub fn inventory_spots(&self) -> &SpotArray {
        &self.inventory
    }

    pub fn spots(&self) -> &SpotArray {
        &self.spots
    }

}


/// Constructor of a window of a registered kind.
type WindowProducer = fn(&mut Spots, &Inventory, usize) -> Window;

static WINDOWS: Lazy<Registry<WindowProducer>> = Lazy::new(|| {
    Registry::<WindowProducer>::new("Window")
        .with(CHEST_KIND, |spots, inventory, slot_count| {
            if slot_count != 27 && slot_count != 54 {
                debug!("unusual chest size: {slot_count}");
            }
            Window::Chest(ChestWindow::new(spots, inventory, slot_count))
        })
        .with(WORKBENCH_KIND, |spots, inventory, slot_count| {
            Window::Generic(GenericWindow::new(spots, inventory, WORKBENCH_KIND, slot_count))
        })
        .with(FURNACE_KIND, |spots, inventory, slot_count| {
            Window::Generic(GenericWindow::new(spots, inventory, FURNACE_KIND, slot_count))
        })
        .with(DISPENSER_KIND, |spots, inventory, slot_count| {
            Window::Generic(GenericWindow::new(spots, inventory, DISPENSER_KIND, slot_count))
        })
});


/// A window known by the client.
#[derive(Debug, Clone)]
pub enum Window {
    Inventory(InventoryWindow),
    Chest(ChestWindow),
    Generic(GenericWindow),
}

impl Window {

    /// Create a window of the given kind with `slot_count` container spots, the player
    /// inventory spots are shared with the given inventory. No spot is allocated if the
    /// kind is not registered.
    pub fn create(kind: u8, spots: &mut Spots, inventory: &Inventory, slot_count: usize) -> Result<Self, UnrecognizedType> {
        let producer = WINDOWS.get(kind)?;
        Ok(producer(spots, inventory, slot_count))
    }

    /// The full ordered list of spots, indexed by slot id.
    pub fn spots(&self) -> &SpotArray {
        match self {
            Window::Inventory(window) => &window.spots,
            Window::Chest(window) => &window.spots,
            Window::Generic(window) => &window.spots,
        }
    }

    /// Spots owned by this window only, released when the window is closed.
    pub fn own_spots(&self) -> SpotArray {
        match self {
            Window::Inventory(window) => window.spots.clone(),
            Window::Chest(window) => window.chest.clone(),
            Window::Generic(window) => window.container.clone(),
        }
    }

    /// Return the slot id of the given spot in this window.
    pub fn spot_id(&self, spot: SpotId) -> Option<i16> {
        self.spots().position(spot).map(|index| index as i16)
    }

    /// Return the spot of the given slot id in this window.
    pub fn spot(&self, slot: i16) -> Option<SpotId> {
        usize::try_from(slot).ok().and_then(|index| self.spots().get(index))
    }

    pub fn as_inventory(&self) -> Option<&InventoryWindow> {
        match self {
            Window::Inventory(window) => Some(window),
            _ => None,
        }
    }

    pub fn as_chest(&self) -> Option<&ChestWindow> {
        match self {
            Window::Chest(window) => Some(window),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&GenericWindow> {
        match self {
            Window::Generic(window) => Some(window),
            _ => None,
        }
    }

}

impl From<InventoryWindow> for Window {
    fn from(value: InventoryWindow) -> Self {
        Self::Inventory(value)
    }
}

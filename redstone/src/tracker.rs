//! Client-side tracking of server windows.
//!
//! The server is authoritative on every window content, the tracker applies snapshots
//! and slot updates as they come and applies the client's own clicks optimistically,
//! each click being kept as a pending action until the server accepts or rejects its
//! transaction. Rejected actions are rolled back to the contents they had before.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, instrument, warn};

use crate::item::{ItemStack, MAX_STACK_SIZE};
use crate::proto::{self, InPacket, OutPacket, MouseButton, CURSOR_WINDOW_ID, INVENTORY_WINDOW_ID};
use crate::registry::UnrecognizedType;
use crate::spot::{SpotArray, SpotId, Spots};
use crate::window::{Inventory, InventoryWindow, Window};


/// An optimistic action sent to the server and not yet fully confirmed.
#[derive(Debug, Clone)]
pub struct PendingAction {
    /// Transaction ids of every click packet of this action, in sending order.
    transaction_ids: Vec<i16>,
    /// Number of transactions already confirmed or rejected.
    resolved: usize,
    window_id: i8,
    /// The clicked slot, `None` for swaps that click two slots.
    slot: Option<i16>,
    /// Content of each modified spot before the action.
    previous: Vec<(SpotId, Option<ItemStack>)>,
    /// Content of the cursor before the action.
    previous_cursor: Option<ItemStack>,
    /// Set once one transaction of the action has been rejected.
    rolled_back: bool,
}

impl PendingAction {

    pub fn transaction_ids(&self) -> &[i16] {
        &self.transaction_ids
    }

    pub fn window_id(&self) -> i8 {
        self.window_id
    }

    pub fn slot(&self) -> Option<i16> {
        self.slot
    }

    /// Return true if the action has already been undone after a rejection, it is
    /// kept until all of its transactions are answered.
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// The next transaction the server is expected to answer.
    fn next_transaction_id(&self) -> Option<i16> {
        self.transaction_ids.get(self.resolved).copied()
    }

    fn is_resolved(&self) -> bool {
        self.resolved >= self.transaction_ids.len()
    }

}


/// A window with its loading state.
#[derive(Debug)]
struct TrackedWindow {
    id: i8,
    window: Window,
    /// Set when the first snapshot of the window has been received.
    snapshot: bool,
    /// Slots that the server is expected to correct after the snapshot.
    awaiting: BTreeSet<i16>,
}

impl TrackedWindow {

    fn new(id: i8, window: Window) -> Self {
        Self {
            id,
            window,
            snapshot: false,
            awaiting: BTreeSet::new(),
        }
    }

    fn is_loaded(&self) -> bool {
        self.snapshot && self.awaiting.is_empty()
    }

}


/// Tracker of the player inventory window, the optional secondary window, the cursor
/// and the pending actions.
#[derive(Debug)]
pub struct WindowTracker {
    /// Content of every spot, including the cursor.
    spots: Spots,
    /// The inventory window, always present with id 0.
    inventory: TrackedWindow,
    /// The secondary window currently open, if any.
    open: Option<TrackedWindow>,
    /// The spot of the item held by the mouse cursor.
    cursor: SpotId,
    /// Actions waiting for the server's answer, oldest first.
    pending: VecDeque<PendingAction>,
    /// Transaction id of the next click.
    next_transaction_id: i16,
    /// Index of the wielded spot in the hotbar.
    wielded: usize,
    /// Packets to send to the server.
    outbox: Vec<OutPacket>,
}

impl Default for WindowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowTracker {

    pub fn new() -> Self {

        let mut spots = Spots::new();
        let cursor = spots.alloc();
        let inventory = InventoryWindow::new(&mut spots);

        Self {
            spots,
            inventory: TrackedWindow::new(INVENTORY_WINDOW_ID, Window::Inventory(inventory)),
            open: None,
            cursor,
            pending: VecDeque::new(),
            next_transaction_id: 1,
            wielded: 0,
            outbox: Vec::new(),
        }

    }

    /// Handle a packet received from the server, packets that are unrelated to windows
    /// are ignored. This only fails if the server opens a window of unknown kind.
    #[instrument(skip_all)]
    pub fn handle(&mut self, packet: &InPacket) -> Result<(), UnrecognizedType> {
        match packet {
            InPacket::OpenWindow(packet) => self.open(packet.window_id, packet.kind, packet.slot_count)?,
            InPacket::CloseWindow(packet) => {
                self.close(packet.window_id);
            }
            InPacket::SetWindowItems(packet) => self.apply_snapshot(packet.window_id, &packet.items),
            InPacket::SetSlot(packet) => self.apply_slot_update(packet.window_id, packet.slot, packet.item.clone()),
            InPacket::ConfirmTransaction(packet) => self.apply_confirm(packet.window_id, packet.transaction_id, packet.accepted),
            _ => {}
        }
        Ok(())
    }

    /// Replace every spot of a window with the given items, indexed by slot id. Every
    /// non-empty item is then awaited as a slot update before the window is loaded, as
    /// well as the missing items if the list is shorter than the window.
    pub fn apply_snapshot(&mut self, window_id: i8, items: &[Option<ItemStack>]) {

        let Some((tracked, spots)) = self.window_and_spots(window_id) else {
            debug!("ignored snapshot of unknown window {window_id}");
            return;
        };

        let window_spots = tracked.window.spots();
        if items.len() > window_spots.len() {
            warn!("snapshot of window {window_id} has {} items for {} slots", items.len(), window_spots.len());
        }

        tracked.awaiting.clear();
        for (index, spot) in window_spots.iter().enumerate() {
            let item = items.get(index).cloned().flatten();
            if item.is_some() || index >= items.len() {
                tracked.awaiting.insert(index as i16);
            }
            spots.set(spot, item);
        }

        tracked.snapshot = true;
        if tracked.is_loaded() {
            debug!("window {window_id} loaded");
        } else {
            debug!("window {window_id} awaiting {} slots", tracked.awaiting.len());
        }

    }

    /// Set the content of a single slot, or of the cursor if the window id is the
    /// cursor's one. Unknown windows and slots are ignored.
    pub fn apply_slot_update(&mut self, window_id: i8, slot: i16, item: Option<ItemStack>) {

        if window_id == CURSOR_WINDOW_ID {
            self.spots.set(self.cursor, item);
            return;
        }

        let Some((tracked, spots)) = self.window_and_spots(window_id) else {
            debug!("ignored slot update of unknown window {window_id}");
            return;
        };

        let Some(spot) = tracked.window.spot(slot) else {
            debug!("ignored slot update of unknown slot {slot} in window {window_id}");
            return;
        };

        spots.set(spot, item);

        if tracked.awaiting.remove(&slot) && tracked.is_loaded() {
            debug!("window {window_id} loaded");
        }

    }

    /// Open a secondary window of the given kind, replacing any other secondary window.
    /// Nothing changes if the kind is unknown.
    pub fn open(&mut self, window_id: i8, kind: u8, slot_count: u8) -> Result<(), UnrecognizedType> {

        if window_id == INVENTORY_WINDOW_ID {
            warn!("cannot open a window with the inventory window id");
            return Ok(());
        }

        let inventory = inventory_of(&self.inventory.window).inventory();
        let window = Window::create(kind, &mut self.spots, inventory, slot_count as usize)?;

        if let Some(previous) = self.open.take() {
            debug!("window {} replaced by window {window_id}", previous.id);
            self.forget(previous);
        }

        debug!("opened window {window_id} of kind {kind} with {slot_count} slots");
        self.open = Some(TrackedWindow::new(window_id, window));
        Ok(())

    }

    /// Close the secondary window if it has the given id, without notifying the
    /// server. Returns true if a window was closed.
    pub fn close(&mut self, window_id: i8) -> bool {

        if window_id == INVENTORY_WINDOW_ID {
            debug!("ignored close of the inventory window");
            return false;
        }

        match self.open.take_if(|tracked| tracked.id == window_id) {
            Some(tracked) => {
                debug!("closed window {window_id}");
                self.forget(tracked);
                true
            }
            None => {
                debug!("ignored close of unknown window {window_id}");
                false
            }
        }

    }

    /// Close the secondary window and notify the server. Returns true if a window was
    /// open.
    pub fn close_window(&mut self) -> bool {
        let Some(tracked) = self.open.take() else { return false };
        self.outbox.push(OutPacket::CloseWindow(proto::CloseWindowPacket {
            window_id: tracked.id,
        }));
        self.forget(tracked);
        true
    }

    /// Give up on every pending action and close the secondary window if any. Late
    /// answers to the forgotten transactions are then ignored as unexpected.
    pub fn resync(&mut self) {
        if !self.pending.is_empty() {
            debug!("forgot {} pending actions", self.pending.len());
            self.pending.clear();
        }
        self.close_window();
    }

    /// Left click on a spot of the usable window: the stack is picked into the empty
    /// cursor, the cursor is dropped into the empty spot, merged into a compatible stack
    /// or exchanged with a different stack. The click is applied immediately and sent
    /// to the server. Returns false if nothing has been sent, because the spot is not
    /// in the usable window or because the click would change nothing.
    pub fn left_click(&mut self, spot: SpotId) -> bool {

        let Some((window_id, slot)) = self.usable_slot(spot) else {
            debug!("cannot click a spot outside of the usable window");
            return false;
        };

        let previous = self.spots.get(spot).cloned();
        let previous_cursor = self.cursor().cloned();
        let Some(transaction_id) = self.click(window_id, slot, spot) else {
            return false;
        };

        self.pending.push_back(PendingAction {
            transaction_ids: vec![transaction_id],
            resolved: 0,
            window_id,
            slot: Some(slot),
            previous: vec![(spot, previous)],
            previous_cursor,
            rolled_back: false,
        });

        true

    }

    /// Exchange the content of two spots of the usable window, through successive left
    /// clicks tracked as a single pending action. The cursor must be empty.
    ///
    /// Returns true if the spots are exchanged, or if they already have the same
    /// content. Returns false if a spot is not in the usable window or if the cursor
    /// holds an item. Two different stacks of the same kind (such as 30 and 16 flints)
    /// are never exchanged and return false, because the clicks would merge them.
    pub fn swap(&mut self, a: SpotId, b: SpotId) -> bool {

        let (Some((window_id, slot_a)), Some((_, slot_b))) = (self.usable_slot(a), self.usable_slot(b)) else {
            debug!("cannot swap spots outside of the usable window");
            return false;
        };

        if self.cursor().is_some() {
            debug!("cannot swap spots while the cursor holds an item");
            return false;
        }

        let item_a = self.spots.get(a).cloned();
        let item_b = self.spots.get(b).cloned();
        match (&item_a, &item_b) {
            _ if a == b => return true,
            (None, None) => return true,
            (Some(stack_a), Some(stack_b)) if stack_a == stack_b => return true,
            (Some(stack_a), Some(stack_b)) if stack_a.is_same_kind(stack_b) => return false,
            _ => {}
        }

        let mut transaction_ids = Vec::with_capacity(3);
        for (spot, slot) in [(a, slot_a), (b, slot_b), (a, slot_a)] {
            transaction_ids.extend(self.click(window_id, slot, spot));
        }

        self.pending.push_back(PendingAction {
            transaction_ids,
            resolved: 0,
            window_id,
            slot: None,
            previous: vec![(a, item_a), (b, item_b)],
            previous_cursor: None,
            rolled_back: false,
        });

        true

    }

    /// Apply the server's answer to the oldest pending transaction. A rejected action
    /// is rolled back and the rejection is acknowledged to the server.
    pub fn apply_confirm(&mut self, window_id: i8, transaction_id: i16, accepted: bool) {

        let Some(action) = self.pending.front_mut() else {
            warn!("unexpected transaction {transaction_id} of window {window_id}, nothing pending");
            return;
        };

        if action.next_transaction_id() != Some(transaction_id) {
            warn!("unexpected transaction {transaction_id} of window {window_id}, expected {:?}", action.next_transaction_id());
            return;
        }

        action.resolved += 1;

        if accepted {
            debug!("transaction {transaction_id} accepted");
        } else {

            debug!("transaction {transaction_id} rejected");

            if !action.rolled_back {
                action.rolled_back = true;
                for (spot, stack) in &action.previous {
                    self.spots.set(*spot, stack.clone());
                }
                self.spots.set(self.cursor, action.previous_cursor.clone());
            }

            self.outbox.push(OutPacket::ConfirmTransaction(proto::ConfirmTransactionPacket {
                window_id,
                transaction_id,
                accepted: true,
            }));

        }

        if action.is_resolved() {
            self.pending.pop_front();
        }

    }

    /// Return true if no action is waiting for the server's answer.
    pub fn synced(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &PendingAction> + '_ {
        self.pending.iter()
    }

    /// The window that can be clicked: the secondary window once loaded, else the
    /// inventory window once loaded.
    pub fn usable_window(&self) -> Option<&Window> {
        self.usable().map(|tracked| &tracked.window)
    }

    pub fn usable_window_id(&self) -> Option<i8> {
        self.usable().map(|tracked| tracked.id)
    }

    pub fn inventory_window(&self) -> &InventoryWindow {
        inventory_of(&self.inventory.window)
    }

    /// The player inventory, only once the inventory window is loaded.
    pub fn inventory(&self) -> Option<&Inventory> {
        self.inventory.is_loaded().then(|| self.inventory_window().inventory())
    }

    /// The chest spots of the usable window, if it is a chest.
    pub fn chest_spots(&self) -> Option<&SpotArray> {
        self.usable_window()?.as_chest().map(|chest| chest.chest_spots())
    }

    /// Every open window with its id, the inventory window first.
    pub fn open_windows(&self) -> impl Iterator<Item = (i8, &Window)> + '_ {
        std::iter::once(&self.inventory)
            .chain(self.open.as_ref())
            .map(|tracked| (tracked.id, &tracked.window))
    }

    pub fn window(&self, window_id: i8) -> Option<&Window> {
        self.open_windows().find(|&(id, _)| id == window_id).map(|(_, window)| window)
    }

    pub fn is_loaded(&self, window_id: i8) -> bool {
        if window_id == INVENTORY_WINDOW_ID {
            self.inventory.is_loaded()
        } else {
            self.open.as_ref().is_some_and(|tracked| tracked.id == window_id && tracked.is_loaded())
        }
    }

    /// Content of a spot.
    pub fn item(&self, spot: SpotId) -> Option<&ItemStack> {
        self.spots.get(spot)
    }

    pub fn cursor(&self) -> Option<&ItemStack> {
        self.spots.get(self.cursor)
    }

    pub fn cursor_spot(&self) -> SpotId {
        self.cursor
    }

    /// The hotbar spot currently in hand.
    pub fn wielded_spot(&self) -> SpotId {
        self.inventory_window().inventory().hotbar_spots()[self.wielded]
    }

    pub fn wielded_item(&self) -> Option<&ItemStack> {
        self.spots.get(self.wielded_spot())
    }

    /// Hold the given hotbar spot in hand, returns false if this spot is not in the
    /// hotbar. The server is notified only if the wielded spot changes.
    pub fn wield(&mut self, spot: SpotId) -> bool {

        let Some(index) = self.inventory_window().inventory().hotbar_spots().position(spot) else {
            return false;
        };

        if index != self.wielded {
            self.wielded = index;
            self.outbox.push(OutPacket::HeldItemChange(proto::HeldItemChangePacket {
                slot: index as i16,
            }));
        }

        true

    }

    /// Hold in hand the first hotbar stack matching the predicate, the currently
    /// wielded stack is preferred. Returns false if no hotbar stack matches.
    pub fn wield_item(&mut self, pred: impl Fn(&ItemStack) -> bool) -> bool {

        if self.wielded_item().is_some_and(&pred) {
            return true;
        }

        let hotbar = self.inventory_window().inventory().hotbar_spots();
        let found = hotbar.iter().find(|&spot| self.spots.get(spot).is_some_and(&pred));
        match found {
            Some(spot) => self.wield(spot),
            None => false,
        }

    }

    /// Packets waiting to be sent to the server.
    pub fn outbox(&self) -> &[OutPacket] {
        &self.outbox
    }

    /// Take all packets waiting to be sent to the server.
    pub fn drain_outbox(&mut self) -> std::vec::Drain<'_, OutPacket> {
        self.outbox.drain(..)
    }

    fn usable(&self) -> Option<&TrackedWindow> {
        self.open.as_ref()
            .filter(|tracked| tracked.is_loaded())
            .or_else(|| self.inventory.is_loaded().then_some(&self.inventory))
    }

    /// Release the spots of a window that is no longer open, and drop its pending
    /// actions because the server never answers them.
    fn forget(&mut self, tracked: TrackedWindow) {
        self.spots.release(&tracked.window.own_spots());
        let before = self.pending.len();
        self.pending.retain(|action| action.window_id != tracked.id);
        if self.pending.len() != before {
            debug!("dropped {} pending actions of window {}", before - self.pending.len(), tracked.id);
        }
    }

    /// Window id and slot id of a spot of the usable window.
    fn usable_slot(&self, spot: SpotId) -> Option<(i8, i16)> {
        let tracked = self.usable()?;
        Some((tracked.id, tracked.window.spot_id(spot)?))
    }

    fn window_and_spots(&mut self, window_id: i8) -> Option<(&mut TrackedWindow, &mut Spots)> {
        let tracked = if window_id == INVENTORY_WINDOW_ID {
            &mut self.inventory
        } else {
            self.open.as_mut().filter(|tracked| tracked.id == window_id)?
        };
        Some((tracked, &mut self.spots))
    }

    fn alloc_transaction_id(&mut self) -> i16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = id.checked_add(1).unwrap_or(1);
        id
    }

    /// Apply a left click to the spot and queue its packet, returning the transaction
    /// id, or `None` if the click changes nothing.
    fn click(&mut self, window_id: i8, slot: i16, spot: SpotId) -> Option<i16> {

        let before = self.spots.get(spot).cloned();
        let (new_stack, new_cursor) = left_click_transfer(before.as_ref(), self.spots.get(self.cursor))?;
        self.spots.set(spot, new_stack);
        self.spots.set(self.cursor, new_cursor);

        let transaction_id = self.alloc_transaction_id();
        self.outbox.push(OutPacket::ClickWindow(proto::ClickWindowPacket {
            window_id,
            slot,
            button: MouseButton::Left,
            transaction_id,
            shift: false,
            item: before,
        }));

        Some(transaction_id)

    }

}


/// Return the inventory window of the tracker's inventory slot.
fn inventory_of(window: &Window) -> &InventoryWindow {
    match window {
        Window::Inventory(window) => window,
        _ => unreachable!("tracker inventory is not an inventory window"),
    }
}

/// Compute the content of a spot and of the cursor after a left click on that spot,
/// `None` if the click changes nothing.
fn left_click_transfer(
    stack: Option<&ItemStack>,
    cursor: Option<&ItemStack>,
) -> Option<(Option<ItemStack>, Option<ItemStack>)> {
    match (stack, cursor) {
        (None, None) => None,
        (Some(stack), None) => Some((None, Some(stack.clone()))),
        (None, Some(cursor)) => Some((Some(cursor.clone()), None)),
        (Some(stack), Some(cursor)) if stack.is_same_kind(cursor) => {
            if stack.size >= MAX_STACK_SIZE {
                return None;
            }
            let drop_size = cursor.size.min(MAX_STACK_SIZE - stack.size);
            let new_cursor = (cursor.size > drop_size).then(|| cursor.clone().with_size(cursor.size - drop_size));
            Some((Some(stack.clone().with_size(stack.size + drop_size)), new_cursor))
        }
        (Some(stack), Some(cursor)) => Some((Some(cursor.clone()), Some(stack.clone()))),
    }
}

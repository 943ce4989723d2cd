//! Profile data carried by a logged-in player: stats, inventory and friends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::hash::Hash;
use crate::point::Point;

pub const MAX_LEVEL: u8 = 99;
pub const INVENTORY_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatKind {
    Attack,
    Defense,
    Strength,
    Hitpoints,
    Magic,
    Archery,
}

impl StatKind {
    pub const ALL: [StatKind; 6] = [
        StatKind::Attack,
        StatKind::Defense,
        StatKind::Strength,
        StatKind::Hitpoints,
        StatKind::Magic,
        StatKind::Archery,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            StatKind::Attack => "Attack",
            StatKind::Defense => "Defense",
            StatKind::Strength => "Strength",
            StatKind::Hitpoints => "Hitpoints",
            StatKind::Magic => "Magic",
            StatKind::Archery => "Archery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub kind: StatKind,
    pub experience: u64,
    /// Boosted or drained level; hitpoints uses this as current health.
    pub current: i16,
}

impl Stat {
    /// Fresh stat at full strength for the given experience.
    pub fn new(kind: StatKind, experience: u64) -> Self {
        Self {
            kind,
            experience,
            current: level_for_experience(experience) as i16,
        }
    }

    pub fn level(&self) -> u8 {
        level_for_experience(self.experience)
    }

    /// Adds experience and reports whether the level changed.
    pub fn add_experience(&mut self, amount: u64) -> bool {
        let before = self.level();
        self.experience = self.experience.saturating_add(amount);
        self.level() != before
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.level())
    }
}

pub fn level_for_experience(experience: u64) -> u8 {
    let level = ((experience / 100) as f64).sqrt().floor() as u64 + 1;
    level.min(MAX_LEVEL as u64) as u8
}

pub fn experience_for_level(level: u8) -> u64 {
    let level = level.clamp(1, MAX_LEVEL) as u64;
    100 * (level - 1) * (level - 1)
}

/// One stat per kind, stored in kind order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatList {
    stats: Vec<Stat>,
}

impl StatList {
    pub fn new(stats: Vec<Stat>) -> Self {
        Self { stats }
    }

    /// A complete set with one stat per kind.
    pub fn is_complete(&self) -> bool {
        self.stats.len() == StatKind::ALL.len()
            && self
                .stats
                .iter()
                .zip(StatKind::ALL)
                .all(|(stat, kind)| stat.kind == kind)
    }

    pub fn get(&self, kind: StatKind) -> Option<&Stat> {
        self.stats.get(kind as usize).filter(|s| s.kind == kind)
    }

    pub fn get_mut(&mut self, kind: StatKind) -> Option<&mut Stat> {
        self.stats.get_mut(kind as usize).filter(|s| s.kind == kind)
    }

    pub fn set(&mut self, stat: Stat) {
        if let Some(slot) = self.get_mut(stat.kind) {
            *slot = stat;
        }
    }

    fn level_of(&self, kind: StatKind) -> u32 {
        self.get(kind).map(|s| s.level() as u32).unwrap_or(1)
    }

    pub fn combat_level(&self) -> u32 {
        let offence = self.level_of(StatKind::Attack)
            + self.level_of(StatKind::Defense)
            + self.level_of(StatKind::Strength)
            + self.level_of(StatKind::Magic)
            + self.level_of(StatKind::Archery);

        (offence / 2 + self.level_of(StatKind::Hitpoints)) / 3
    }

    pub fn skill_total(&self) -> u32 {
        self.stats.iter().map(|s| s.level() as u32).sum()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stat> {
        self.stats.iter()
    }
}

impl Default for StatList {
    /// Starting stats for a new account: level 1 everywhere except 10 hitpoints.
    fn default() -> Self {
        let stats = StatKind::ALL
            .iter()
            .map(|&kind| match kind {
                StatKind::Hitpoints => Stat::new(kind, experience_for_level(10)),
                _ => Stat::new(kind, 0),
            })
            .collect();

        Self { stats }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipSlot {
    None,
    Head,
    Body,
    Weapon,
}

/// Static item properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub stackable: bool,
    pub equip_slot: EquipSlot,
    /// Hitpoints restored when eaten; zero for inedible items.
    pub heals: u8,
}

pub const UNKNOWN_ITEM: ItemDefinition = ItemDefinition {
    name: "Unknown Item",
    description: "An unknown item.",
    stackable: false,
    equip_slot: EquipSlot::None,
    heals: 0,
};

const ITEM_CATALOG: &[(u16, ItemDefinition)] = &[
    (
        0,
        ItemDefinition {
            name: "Coins",
            description: "Lovely money!",
            stackable: true,
            equip_slot: EquipSlot::None,
            heals: 0,
        },
    ),
    (
        1,
        ItemDefinition {
            name: "Bread",
            description: "Nice crusty bread.",
            stackable: false,
            equip_slot: EquipSlot::None,
            heals: 4,
        },
    ),
    (
        2,
        ItemDefinition {
            name: "Cooked Fish",
            description: "Smells good.",
            stackable: false,
            equip_slot: EquipSlot::None,
            heals: 7,
        },
    ),
    (
        3,
        ItemDefinition {
            name: "Leather Cap",
            description: "A simple leather cap.",
            stackable: false,
            equip_slot: EquipSlot::Head,
            heals: 0,
        },
    ),
    (
        4,
        ItemDefinition {
            name: "Iron Helm",
            description: "A sturdy iron helmet.",
            stackable: false,
            equip_slot: EquipSlot::Head,
            heals: 0,
        },
    ),
    (
        5,
        ItemDefinition {
            name: "Leather Tunic",
            description: "Offers a little protection.",
            stackable: false,
            equip_slot: EquipSlot::Body,
            heals: 0,
        },
    ),
    (
        6,
        ItemDefinition {
            name: "Bronze Sword",
            description: "A blunt bronze sword.",
            stackable: false,
            equip_slot: EquipSlot::Weapon,
            heals: 0,
        },
    ),
    (
        7,
        ItemDefinition {
            name: "Shortbow",
            description: "A bow made from oak.",
            stackable: false,
            equip_slot: EquipSlot::Weapon,
            heals: 0,
        },
    ),
    (
        8,
        ItemDefinition {
            name: "Rune Stone",
            description: "It hums quietly.",
            stackable: true,
            equip_slot: EquipSlot::None,
            heals: 0,
        },
    ),
];

pub fn item_definition(id: u16) -> &'static ItemDefinition {
    ITEM_CATALOG
        .iter()
        .find(|(item_id, _)| *item_id == id)
        .map(|(_, def)| def)
        .unwrap_or(&UNKNOWN_ITEM)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u16,
    pub amount: u64,
    pub equipped: bool,
}

impl Item {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            amount: 1,
            equipped: false,
        }
    }

    pub fn with_amount(id: u16, amount: u64) -> Self {
        Self {
            id,
            amount,
            equipped: false,
        }
    }

    pub fn definition(&self) -> &'static ItemDefinition {
        item_definition(self.id)
    }

    pub fn name(&self) -> &'static str {
        self.definition().name
    }

    pub fn description(&self) -> &'static str {
        self.definition().description
    }

    pub fn is_edible(&self) -> bool {
        self.definition().heals > 0
    }

    pub fn is_equipable(&self) -> bool {
        self.definition().equip_slot != EquipSlot::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: Vec<Item>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Appends an item, returning its slot, or `None` when full.
    pub fn add(&mut self, item: Item) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.items.push(item);
        Some(self.items.len() - 1)
    }

    /// Removes a slot, shifting later items down.
    pub fn remove(&mut self, slot: usize) -> Option<Item> {
        (slot < self.items.len()).then(|| self.items.remove(slot))
    }

    pub fn get(&self, slot: usize) -> Option<&Item> {
        self.items.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Item> {
        self.items.get_mut(slot)
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= INVENTORY_SIZE
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: Hash,
    pub username: String,
    #[serde(skip)]
    pub online: bool,
}

impl Friend {
    pub fn new(id: Hash, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            online: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendList {
    friends: BTreeMap<Hash, Friend>,
}

impl FriendList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a friend entry.
    pub fn add(&mut self, friend: Friend) {
        self.friends.insert(friend.id, friend);
    }

    pub fn remove(&mut self, id: &Hash) -> Option<Friend> {
        self.friends.remove(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Friend> {
        self.friends.get(id)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.friends.contains_key(id)
    }

    /// Updates the transient online flag. Returns whether it changed, so
    /// strangers and repeats report false.
    pub fn set_online(&mut self, id: &Hash, online: bool) -> bool {
        match self.friends.get_mut(id) {
            Some(friend) if friend.online != online => {
                friend.online = online;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Friend> {
        self.friends.values()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: Hash,
    pub credential: Hash,
    pub username: String,
    pub location: Point,
    pub inventory: Inventory,
    pub stats: StatList,
    pub friends: FriendList,
    pub registered: u64,
    pub last_session: u64,
}

impl PlayerProfile {
    pub fn new(username: &str, password: &str, location: Point) -> Self {
        let id = Hash::account(username);
        let now = now_millis();

        Self {
            id,
            credential: Hash::credential(&id, password),
            username: username.to_string(),
            location,
            inventory: Inventory::new(),
            stats: StatList::default(),
            friends: FriendList::new(),
            registered: now,
            last_session: now,
        }
    }

    /// Checks the shape constraints a profile must satisfy before play.
    pub fn is_corrupt(&self) -> bool {
        !self.stats.is_complete() || self.inventory.len() > INVENTORY_SIZE
    }
}

impl fmt::Display for PlayerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player[id = {}, username = '{}']", self.id, self.username)
    }
}

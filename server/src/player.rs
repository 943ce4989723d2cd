//! A logged-in player: profile, walking path, interest set and outbound queue.

use log::{debug, warn};
use shared::model::{Friend, Item, PlayerProfile, Stat, StatKind};
use shared::{Entity, EntityList, Hash, Path, PacketBuilder, PacketType, Point, TileMap};
use shared::VIEW_DISTANCE;
use std::collections::BTreeMap;

use crate::network::Outbox;

/// What one player knows about another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub id: Hash,
    pub username: String,
    pub location: Point,
}

impl Entity for PlayerView {
    fn id(&self) -> Hash {
        self.id
    }

    fn location(&self) -> Point {
        self.location
    }
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.profile.id,
            username: player.profile.username.clone(),
            location: player.profile.location,
        }
    }
}

#[derive(Debug)]
pub struct Player {
    profile: PlayerProfile,
    path: Option<Path>,
    known: EntityList<PlayerView>,
    outbox: Outbox,
}

impl Entity for Player {
    fn id(&self) -> Hash {
        self.profile.id
    }

    fn location(&self) -> Point {
        self.profile.location
    }
}

impl Player {
    pub fn new(profile: PlayerProfile, outbox: Outbox) -> Self {
        Self {
            profile,
            path: None,
            known: EntityList::new(),
            outbox,
        }
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut PlayerProfile {
        &mut self.profile
    }

    pub fn into_profile(self) -> PlayerProfile {
        self.profile
    }

    pub fn username(&self) -> &str {
        &self.profile.username
    }

    pub fn known(&self) -> &EntityList<PlayerView> {
        &self.known
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn set_path(&mut self, path: Path) {
        self.path = (!path.is_empty()).then_some(path);
    }

    pub fn is_walking(&self) -> bool {
        self.path.is_some()
    }

    /// Takes the next step of the current path.
    ///
    /// The step is checked against the map again since the path may be stale.
    /// An illegal step drops the rest of the path. Returns whether the player
    /// moved.
    pub fn step<M: TileMap + ?Sized>(&mut self, map: &M) -> bool {
        let Some(path) = self.path.as_mut() else {
            return false;
        };

        let Some(next) = path.pop_next() else {
            self.path = None;
            return false;
        };

        let from = self.profile.location;
        if !map.is_valid_step(from, next) {
            warn!(
                "{} cannot step from {} to {}, dropping path",
                self.profile, from, next
            );
            self.path = None;
            return false;
        }

        self.profile.location.set(next);
        if !path.has_next() {
            self.path = None;
        }
        true
    }

    /// Brings the interest set in line with `world` and emits the difference.
    ///
    /// `world` must hold post-movement positions of every online player,
    /// this one included.
    pub fn synchronize(&mut self, world: &BTreeMap<Hash, PlayerView>) {
        let here = self.profile.location;

        for id in self.known.ids() {
            let visible = world
                .get(&id)
                .map_or(false, |view| view.location.distance_to(here) <= VIEW_DISTANCE);
            if !visible {
                self.known.remove(&id);
            }
        }

        for view in world.values() {
            match self.known.get(&view.id).map(|known| known.location) {
                Some(location) if location != view.location => {
                    let location = view.location;
                    self.known.update(&view.id, |known| known.location.set(location));
                }
                Some(_) => {}
                None if view.location.distance_to(here) <= VIEW_DISTANCE => {
                    self.known.add(view.clone());
                }
                None => {}
            }
        }

        let me = self.profile.id;

        let added: Vec<&PlayerView> = self.known.new_entities().filter(|v| v.id != me).collect();
        if !added.is_empty() {
            let mut builder = PacketBuilder::new(PacketType::PlayersAddResponse);
            builder.put_u16(added.len() as u16);
            for view in added {
                builder
                    .put_hash(&view.id)
                    .put_string(&view.username)
                    .put_point(view.location);
            }
            self.outbox.send(builder);
        }

        let removed: Vec<&Hash> = self.known.removed_ids().filter(|id| **id != me).collect();
        if !removed.is_empty() {
            let mut builder = PacketBuilder::new(PacketType::PlayersRemoveResponse);
            builder.put_u16(removed.len() as u16);
            for id in removed {
                builder.put_hash(id);
            }
            self.outbox.send(builder);
        }

        if self.known.has_updated_entities() {
            let updated: Vec<&PlayerView> = self.known.updated_entities().collect();
            let mut builder = PacketBuilder::new(PacketType::PlayersUpdateResponse);
            builder.put_u16(updated.len() as u16);
            for view in updated {
                builder.put_hash(&view.id).put_point(view.location);
            }
            self.outbox.send(builder);
        }

        self.known.reset();
    }

    /// Uses the item in `slot`: eat it, toggle its equipped state or describe it.
    pub fn use_item(&mut self, slot: usize) {
        let Some(item) = self.profile.inventory.get(slot).copied() else {
            warn!("{} used empty inventory slot {}", self.profile, slot);
            return;
        };

        if item.is_edible() {
            self.eat(slot, item);
        } else if item.is_equipable() {
            self.toggle_equipped(slot, item);
        } else {
            self.send_message(item.description());
        }
    }

    fn eat(&mut self, slot: usize, item: Item) {
        self.profile.inventory.remove(slot);
        self.send_inventory_remove(slot);

        let heals = item.definition().heals as i16;
        let mut message = format!("You eat the {}", item.name().to_lowercase());

        if let Some(hitpoints) = self.profile.stats.get_mut(StatKind::Hitpoints) {
            let max = hitpoints.level() as i16;
            if hitpoints.current < max {
                hitpoints.current = (hitpoints.current + heals).min(max);
                let stat = *hitpoints;
                message.push_str(", it heals some health");
                self.send_stat(&stat);
            }
        }

        message.push('.');
        self.send_message(&message);
    }

    fn toggle_equipped(&mut self, slot: usize, item: Item) {
        let equip = !item.equipped;
        let equip_slot = item.definition().equip_slot;

        if equip {
            let others: Vec<usize> = self
                .profile
                .inventory
                .iter()
                .enumerate()
                .filter(|(i, other)| {
                    *i != slot && other.equipped && other.definition().equip_slot == equip_slot
                })
                .map(|(i, _)| i)
                .collect();

            for other in others {
                if let Some(other_item) = self.profile.inventory.get_mut(other) {
                    other_item.equipped = false;
                    let other_item = *other_item;
                    self.send_inventory_update(other, &other_item);
                }
            }
        }

        if let Some(item) = self.profile.inventory.get_mut(slot) {
            item.equipped = equip;
            let item = *item;
            debug!("{} equipped = {} for {}", item.name(), equip, self.profile);
            self.send_inventory_update(slot, &item);
        }
    }

    pub fn send(&self, packet: PacketBuilder) {
        self.outbox.send(packet);
    }

    pub fn send_message(&self, text: &str) {
        let mut builder = PacketBuilder::new(PacketType::MessageResponse);
        builder.put_string(text);
        self.send(builder);
    }

    pub fn send_chat(&self, sender: &Hash, text: &str) {
        let mut builder = PacketBuilder::new(PacketType::ChatResponse);
        builder.put_hash(sender).put_string(text);
        self.send(builder);
    }

    pub fn send_friend_login(&self, friend: &Hash, online: bool) {
        let mut builder = PacketBuilder::new(PacketType::FriendLoginResponse);
        builder.put_hash(friend).put_bool(online);
        self.send(builder);
    }

    pub fn send_friend_add(&self, friend: &Friend) {
        let mut builder = PacketBuilder::new(PacketType::FriendAddResponse);
        builder.put_friend(friend);
        self.send(builder);
    }

    pub fn send_friend_remove(&self, friend: &Hash) {
        let mut builder = PacketBuilder::new(PacketType::FriendRemoveResponse);
        builder.put_hash(friend);
        self.send(builder);
    }

    pub fn send_friend_message(&self, sender: &str, text: &str) {
        let mut builder = PacketBuilder::new(PacketType::FriendMessageResponse);
        builder.put_string(sender).put_string(text);
        self.send(builder);
    }

    pub fn send_inventory_add(&self, item: &Item) {
        let mut builder = PacketBuilder::new(PacketType::InventoryAddResponse);
        builder.put_item(item);
        self.send(builder);
    }

    pub fn send_inventory_remove(&self, slot: usize) {
        let mut builder = PacketBuilder::new(PacketType::InventoryRemoveResponse);
        builder.put_u8(slot as u8);
        self.send(builder);
    }

    pub fn send_inventory_update(&self, slot: usize, item: &Item) {
        let mut builder = PacketBuilder::new(PacketType::InventoryUpdateResponse);
        builder
            .put_u8(slot as u8)
            .put_u64(item.amount)
            .put_bool(item.equipped);
        self.send(builder);
    }

    pub fn send_stat(&self, stat: &Stat) {
        let mut builder = PacketBuilder::new(PacketType::StatUpdateResponse);
        builder.put_stat(stat);
        self.send(builder);
    }
}

//! Authoritative world state and the per-tick synchronization pass.

use log::{debug, error, info, warn};
use shared::model::{now_millis, PlayerProfile};
use shared::{Entity, EntityList, Hash, LoginError, LoginRequest, TileMap};
use std::collections::BTreeMap;

use crate::persistence::{ProfileStore, StoreError};
use crate::player::{Player, PlayerView};

pub struct WorldManager {
    map: Box<dyn TileMap + Send + Sync>,
    players: EntityList<Player>,
    store: Box<dyn ProfileStore + Send + Sync>,
}

impl WorldManager {
    pub fn new(
        map: impl TileMap + Send + Sync + 'static,
        store: impl ProfileStore + Send + Sync + 'static,
    ) -> Self {
        Self {
            map: Box::new(map),
            players: EntityList::new(),
            store: Box::new(store),
        }
    }

    pub fn map(&self) -> &dyn TileMap {
        self.map.as_ref()
    }

    pub fn store(&self) -> &dyn ProfileStore {
        self.store.as_ref()
    }

    pub fn player(&self, id: &Hash) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &Hash) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn is_online(&self, id: &Hash) -> bool {
        self.players.contains(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Resolves a decrypted login request to a profile ready for play.
    pub fn login(&self, request: &LoginRequest) -> Result<PlayerProfile, LoginError> {
        let profile = match self.store.load_profile(&request.account, &request.credential) {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(LoginError::InvalidCredentials),
            Err(e) => {
                error!("Profile lookup for {} failed: {}", request.account, e);
                return Err(LoginError::CorruptProfile);
            }
        };

        if self.players.contains(&profile.id) {
            return Err(LoginError::AlreadyLoggedIn);
        }

        if profile.is_corrupt() {
            error!("Corrupt profile found for user: {}", profile.id);
            return Err(LoginError::CorruptProfile);
        }

        if self.map.tile_at(profile.location).is_none() {
            error!("{} is located off the map at {}", profile, profile.location);
            return Err(LoginError::CorruptProfile);
        }

        let mut profile = profile;
        let presence: Vec<(Hash, bool)> = profile
            .friends
            .iter()
            .map(|friend| (friend.id, self.players.contains(&friend.id)))
            .collect();
        for (id, online) in presence {
            profile.friends.set_online(&id, online);
        }

        Ok(profile)
    }

    pub fn add_player(&mut self, player: Player) -> bool {
        let profile = player.profile().to_string();
        let added = self.players.add(player);
        if added {
            info!("{} entered the world ({} online)", profile, self.players.len());
        } else {
            warn!("{} is already in the world", profile);
        }
        added
    }

    /// Takes a player out of the world and saves their profile.
    pub fn remove_player(&mut self, id: &Hash) -> Option<PlayerProfile> {
        let player = self.players.remove(id)?;
        let mut profile = player.into_profile();
        profile.last_session = now_millis();

        if let Err(e) = self.store.save_profile(&profile) {
            error!("Failed to save {}: {}", profile, e);
        }

        info!("{} left the world ({} online)", profile, self.players.len());
        Some(profile)
    }

    /// Saves and removes everyone, for shutdown.
    pub fn logout_all(&mut self) {
        for id in self.players.ids() {
            self.remove_player(&id);
        }
        self.players.reset();
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }

    /// One synchronization pass: movement, then interest sets, then friend
    /// presence, then the world diff is cleared.
    pub fn update(&mut self) {
        for id in self.players.ids() {
            let moved = match self.players.get_mut(&id) {
                Some(player) => player.step(self.map.as_ref()),
                None => false,
            };
            if moved {
                self.players.mark_updated(&id);
            }
        }

        let snapshot: BTreeMap<Hash, PlayerView> = self
            .players
            .iter()
            .map(|player| (player.id(), PlayerView::from(player)))
            .collect();

        for player in self.players.iter_mut() {
            player.synchronize(&snapshot);
        }

        self.notify_presence();
        self.players.reset();
    }

    fn notify_presence(&mut self) {
        let logged_in: Vec<Hash> = self.players.new_entities().map(|p| p.id()).collect();
        let logged_out: Vec<Hash> = self.players.removed_ids().copied().collect();

        if logged_in.is_empty() && logged_out.is_empty() {
            return;
        }

        for player in self.players.iter_mut() {
            for (ids, online) in [(&logged_in, true), (&logged_out, false)] {
                for id in ids {
                    if player.profile_mut().friends.set_online(id, online) {
                        debug!("Telling {} that {} is online = {}", player.profile(), id, online);
                        player.send_friend_login(id, online);
                    }
                }
            }
        }
    }
}

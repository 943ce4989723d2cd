use log::{debug, info};
use shared::model::{Friend, Stat};
use shared::pathfinder::find_path;
use shared::{
    Entity, EntityList, Hash, Packet, PacketType, Path, Point, ProtocolError, SessionProfile,
    TileMap,
};
use std::collections::VecDeque;

const LOG_CAPACITY: usize = 100;

/// Another player as the server last described them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlayer {
    pub id: Hash,
    pub username: String,
    pub location: Point,
}

impl Entity for RemotePlayer {
    fn id(&self) -> Hash {
        self.id
    }

    fn location(&self) -> Point {
        self.location
    }
}

/// A line of public chat, private message or server notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Chat { from: String, text: String },
    Private { from: String, text: String },
    Notice(String),
}

/// The client's local view of the world, driven entirely by server messages.
///
/// The diff sets of `players` record what changed since the caller last
/// called [`ClientWorld::reset`], so a renderer can redraw only that.
pub struct ClientWorld {
    profile: SessionProfile,
    map: Box<dyn TileMap + Send + Sync>,
    players: EntityList<RemotePlayer>,
    log: VecDeque<LogLine>,
}

impl ClientWorld {
    pub fn new(profile: SessionProfile, map: impl TileMap + Send + Sync + 'static) -> Self {
        Self {
            profile,
            map: Box::new(map),
            players: EntityList::new(),
            log: VecDeque::new(),
        }
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn location(&self) -> Point {
        self.profile.location
    }

    pub fn players(&self) -> &EntityList<RemotePlayer> {
        &self.players
    }

    pub fn log(&self) -> impl Iterator<Item = &LogLine> {
        self.log.iter()
    }

    /// Clears the player diff once it has been drawn.
    pub fn reset(&mut self) {
        self.players.reset();
    }

    /// Path to `target` for a walk request, if the local map has one.
    pub fn walk_to(&self, target: Point) -> Option<Path> {
        let path = find_path(self.map.as_ref(), self.profile.location, target, 0);
        match &path {
            Some(path) => debug!("Walking to {} via {}", target, path),
            None => debug!("No path from {} to {}", self.profile.location, target),
        }
        path.filter(|path| !path.is_empty())
    }

    fn display_name(&self, id: &Hash) -> String {
        if *id == self.profile.id {
            return self.profile.username.clone();
        }
        self.players
            .get(id)
            .map(|p| p.username.clone())
            .or_else(|| self.profile.friends.get(id).map(|f| f.username.clone()))
            .unwrap_or_else(|| id.to_hex()[..8].to_string())
    }

    fn push_log(&mut self, line: LogLine) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Applies one inbound message to the local state.
    pub fn apply(&mut self, mut packet: Packet) -> Result<(), ProtocolError> {
        match packet.kind() {
            PacketType::PlayersAddResponse => {
                for _ in 0..packet.get_u16()? {
                    let player = RemotePlayer {
                        id: packet.get_hash()?,
                        username: packet.get_string()?,
                        location: packet.get_point()?,
                    };
                    debug!("{} appeared at {}", player.username, player.location);
                    self.players.add(player);
                }
            }
            PacketType::PlayersRemoveResponse => {
                for _ in 0..packet.get_u16()? {
                    let id = packet.get_hash()?;
                    self.players.remove(&id);
                }
            }
            PacketType::PlayersUpdateResponse => {
                for _ in 0..packet.get_u16()? {
                    let id = packet.get_hash()?;
                    let location = packet.get_point()?;
                    if id == self.profile.id {
                        self.profile.location.set(location);
                    } else {
                        self.players.update(&id, |p| p.location.set(location));
                    }
                }
            }
            PacketType::ChatResponse => {
                let from = self.display_name(&packet.get_hash()?);
                let text = packet.get_string()?;
                info!("{}: {}", from, text);
                self.push_log(LogLine::Chat { from, text });
            }
            PacketType::MessageResponse => {
                let text = packet.get_string()?;
                info!("{}", text);
                self.push_log(LogLine::Notice(text));
            }
            PacketType::FriendLoginResponse => {
                let id = packet.get_hash()?;
                let online = packet.get_bool()?;
                self.profile.friends.set_online(&id, online);
                let name = self.display_name(&id);
                let state = if online { "logged in" } else { "logged out" };
                self.push_log(LogLine::Notice(format!("{} has {}.", name, state)));
            }
            PacketType::FriendAddResponse => {
                let friend: Friend = packet.get_friend()?;
                info!("Added {} to friends", friend.username);
                self.profile.friends.add(friend);
            }
            PacketType::FriendRemoveResponse => {
                let id = packet.get_hash()?;
                self.profile.friends.remove(&id);
            }
            PacketType::FriendMessageResponse => {
                let from = packet.get_string()?;
                let text = packet.get_string()?;
                info!("From {}: {}", from, text);
                self.push_log(LogLine::Private { from, text });
            }
            PacketType::InventoryAddResponse => {
                let item = packet.get_item()?;
                if self.profile.inventory.add(item).is_none() {
                    debug!("Inventory full, dropped {}", item.name());
                }
            }
            PacketType::InventoryRemoveResponse => {
                let slot = packet.get_u8()? as usize;
                self.profile.inventory.remove(slot);
            }
            PacketType::InventoryUpdateResponse => {
                let slot = packet.get_u8()? as usize;
                let amount = packet.get_u64()?;
                let equipped = packet.get_bool()?;
                if let Some(item) = self.profile.inventory.get_mut(slot) {
                    item.amount = amount;
                    item.equipped = equipped;
                }
            }
            PacketType::StatUpdateResponse => {
                let stat: Stat = packet.get_stat()?;
                self.profile.stats.set(stat);
            }

            kind @ (PacketType::LoginSend
            | PacketType::LoginResponse
            | PacketType::PingSend
            | PacketType::ChatSend
            | PacketType::UseItemSend
            | PacketType::FriendAddSend
            | PacketType::FriendMessageSend
            | PacketType::FriendRemoveSend
            | PacketType::WalkToSend) => {
                return Err(ProtocolError::Unexpected {
                    kind,
                    state: "authenticated",
                });
            }
        }
        Ok(())
    }
}

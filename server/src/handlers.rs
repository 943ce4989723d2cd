//! Dispatch of authenticated client messages.
//!
//! Runs on the tick only. Any payload read failure is returned to the caller,
//! which closes the connection.

use log::{debug, warn};
use shared::{Entity, Hash, Packet, PacketType, ProtocolError, CHAT_RADIUS};

use crate::world::WorldManager;

pub fn handle_packet(
    world: &mut WorldManager,
    player: &Hash,
    mut packet: Packet,
) -> Result<(), ProtocolError> {
    if !world.is_online(player) {
        debug!("Dropping {:?} for offline player {}", packet.kind(), player);
        return Ok(());
    }

    match packet.kind() {
        PacketType::PingSend => Ok(()),
        PacketType::ChatSend => handle_chat(world, player, &mut packet),
        PacketType::WalkToSend => handle_walk(world, player, &mut packet),
        PacketType::UseItemSend => handle_use_item(world, player, &mut packet),
        PacketType::FriendAddSend => handle_friend_add(world, player, &mut packet),
        PacketType::FriendRemoveSend => handle_friend_remove(world, player, &mut packet),
        PacketType::FriendMessageSend => handle_friend_message(world, player, &mut packet),

        kind @ (PacketType::LoginSend
        | PacketType::LoginResponse
        | PacketType::ChatResponse
        | PacketType::MessageResponse
        | PacketType::FriendLoginResponse
        | PacketType::FriendAddResponse
        | PacketType::FriendMessageResponse
        | PacketType::FriendRemoveResponse
        | PacketType::PlayersAddResponse
        | PacketType::PlayersRemoveResponse
        | PacketType::PlayersUpdateResponse
        | PacketType::InventoryAddResponse
        | PacketType::InventoryRemoveResponse
        | PacketType::InventoryUpdateResponse
        | PacketType::StatUpdateResponse) => Err(ProtocolError::Unexpected {
            kind,
            state: "authenticated",
        }),
    }
}

fn handle_chat(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let text = packet.get_string()?;

    let Some(sender) = world.player(id) else {
        return Ok(());
    };
    let here = sender.location();

    // Everyone the sender knows about within range; visibility is symmetric
    // at equal view distance, so these also know the sender.
    let recipients: Vec<Hash> = sender
        .known()
        .iter()
        .filter(|view| view.id != *id && view.location.distance_to(here) <= CHAT_RADIUS)
        .map(|view| view.id)
        .collect();

    for recipient in recipients {
        if let Some(player) = world.player(&recipient) {
            player.send_chat(id, &text);
        }
    }
    Ok(())
}

fn handle_walk(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let path = packet.get_path()?;
    if path.is_empty() {
        return Ok(());
    }

    if let Some(player) = world.player_mut(id) {
        debug!("{} walking {}", player.profile(), path);
        player.set_path(path);
    }
    Ok(())
}

fn handle_use_item(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let slot = packet.get_u8()? as usize;
    if let Some(player) = world.player_mut(id) {
        player.use_item(slot);
    }
    Ok(())
}

fn handle_friend_add(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let username = packet.get_string()?;

    let Some(mut friend) = world.store().find_friend(&username) else {
        if let Some(player) = world.player(id) {
            player.send_message(&format!("Unable to add {}, no such player found.", username));
        }
        return Ok(());
    };
    friend.online = world.is_online(&friend.id);

    if let Some(player) = world.player_mut(id) {
        player.profile_mut().friends.add(friend.clone());
        player.send_friend_add(&friend);
    }
    Ok(())
}

fn handle_friend_remove(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let friend = packet.get_hash()?;

    if let Some(player) = world.player_mut(id) {
        if player.profile_mut().friends.remove(&friend).is_some() {
            player.send_friend_remove(&friend);
        }
    }
    Ok(())
}

fn handle_friend_message(world: &mut WorldManager, id: &Hash, packet: &mut Packet) -> Result<(), ProtocolError> {
    let friend_id = packet.get_hash()?;
    let text = packet.get_string()?;

    let Some(sender) = world.player(id) else {
        return Ok(());
    };
    let Some(friend) = sender.profile().friends.get(&friend_id) else {
        warn!("{} messaged {} who is not a friend", sender.profile(), friend_id);
        return Ok(());
    };

    match world.player(&friend_id) {
        Some(recipient) => recipient.send_friend_message(sender.username(), &text),
        None => sender.send_message(&format!(
            "Message not delivered, {} appears to be offline.",
            friend.username
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Outbound, Outbox};
    use crate::persistence::MemoryStore;
    use crate::player::Player;
    use shared::model::{Friend, Inventory, Item};
    use shared::{GridMap, LoginRequest, PacketBuilder, Path, Point};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        world: WorldManager,
    }

    impl Fixture {
        fn new(accounts: &[(&str, Point)]) -> Self {
            let mut store = MemoryStore::new();
            for (name, spawn) in accounts {
                store.register(name, "pw", *spawn).unwrap();
            }
            Self {
                world: WorldManager::new(GridMap::open(128, 128, 32), store),
            }
        }

        fn enter(&mut self, name: &str) -> (Hash, UnboundedReceiver<Outbound>) {
            let account = Hash::account(name);
            let request = LoginRequest {
                account,
                credential: Hash::credential(&account, "pw"),
                client_seed: 0,
                server_seed: 0,
            };
            let profile = self.world.login(&request).unwrap();
            let (outbox, rx, _closed) = Outbox::new();
            self.world.add_player(Player::new(profile, outbox));
            (account, rx)
        }

        fn handle(&mut self, id: &Hash, builder: PacketBuilder) -> Result<(), ProtocolError> {
            handle_packet(&mut self.world, id, builder.into_packet())
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Outbound::Packet(builder) = message {
                packets.push(builder.into_packet());
            }
        }
        packets
    }

    fn chat(text: &str) -> PacketBuilder {
        let mut builder = PacketBuilder::new(PacketType::ChatSend);
        builder.put_string(text);
        builder
    }

    #[test]
    fn test_chat_reaches_nearby_players_only() {
        let mut fixture = Fixture::new(&[
            ("alice", Point::new(10, 10)),
            ("bob", Point::new(20, 10)),
            ("carol", Point::new(60, 10)),
        ]);
        let (alice, mut alice_rx) = fixture.enter("alice");
        let (_bob, mut bob_rx) = fixture.enter("bob");
        let (_carol, mut carol_rx) = fixture.enter("carol");
        fixture.world.update();
        for rx in [&mut alice_rx, &mut bob_rx, &mut carol_rx] {
            drain(rx);
        }

        fixture.handle(&alice, chat("hello")).unwrap();

        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut carol_rx).is_empty());

        let mut received = drain(&mut bob_rx).into_iter().next().unwrap();
        assert_eq!(received.kind(), PacketType::ChatResponse);
        assert_eq!(received.get_hash().unwrap(), alice);
        assert_eq!(received.get_string().unwrap(), "hello");
    }

    #[test]
    fn test_walk_sets_path() {
        let mut fixture = Fixture::new(&[("alice", Point::new(10, 10))]);
        let (alice, _rx) = fixture.enter("alice");

        let mut builder = PacketBuilder::new(PacketType::WalkToSend);
        builder.put_path(&Path::new());
        fixture.handle(&alice, builder).unwrap();
        assert!(!fixture.world.player(&alice).unwrap().is_walking());

        let path: Path = [Point::new(11, 10)].into_iter().collect();
        let mut builder = PacketBuilder::new(PacketType::WalkToSend);
        builder.put_path(&path);
        fixture.handle(&alice, builder).unwrap();
        assert!(fixture.world.player(&alice).unwrap().is_walking());
    }

    #[test]
    fn test_use_item_eats() {
        let mut fixture = Fixture::new(&[("alice", Point::new(10, 10))]);
        let (alice, mut rx) = fixture.enter("alice");
        fixture
            .world
            .player_mut(&alice)
            .unwrap()
            .profile_mut()
            .inventory = Inventory::from_items(vec![Item::new(1)]);

        let mut builder = PacketBuilder::new(PacketType::UseItemSend);
        builder.put_u8(0);
        fixture.handle(&alice, builder).unwrap();

        assert!(fixture.world.player(&alice).unwrap().profile().inventory.is_empty());
        assert_eq!(drain(&mut rx)[0].kind(), PacketType::InventoryRemoveResponse);
    }

    #[test]
    fn test_friend_add_and_remove() {
        let mut fixture = Fixture::new(&[("alice", Point::new(10, 10)), ("bob", Point::new(0, 0))]);
        let (alice, mut rx) = fixture.enter("alice");
        let (bob, _bob_rx) = fixture.enter("bob");

        let mut builder = PacketBuilder::new(PacketType::FriendAddSend);
        builder.put_string("nobody");
        fixture.handle(&alice, builder).unwrap();
        let mut message = drain(&mut rx).into_iter().next().unwrap();
        assert_eq!(
            message.get_string().unwrap(),
            "Unable to add nobody, no such player found."
        );

        let mut builder = PacketBuilder::new(PacketType::FriendAddSend);
        builder.put_string("BOB");
        fixture.handle(&alice, builder).unwrap();
        let mut added = drain(&mut rx).into_iter().next().unwrap();
        assert_eq!(added.kind(), PacketType::FriendAddResponse);
        let friend = added.get_friend().unwrap();
        assert_eq!(friend.id, bob);
        assert!(friend.online);

        let mut builder = PacketBuilder::new(PacketType::FriendRemoveSend);
        builder.put_hash(&bob);
        fixture.handle(&alice, builder).unwrap();
        let mut removed = drain(&mut rx).into_iter().next().unwrap();
        assert_eq!(removed.kind(), PacketType::FriendRemoveResponse);
        assert_eq!(removed.get_hash().unwrap(), bob);
        assert!(fixture.world.player(&alice).unwrap().profile().friends.is_empty());
    }

    #[test]
    fn test_friend_message_delivery() {
        let mut fixture = Fixture::new(&[
            ("alice", Point::new(10, 10)),
            ("bob", Point::new(0, 0)),
            ("carol", Point::new(0, 0)),
        ]);
        let (alice, mut alice_rx) = fixture.enter("alice");
        let (bob, mut bob_rx) = fixture.enter("bob");
        let carol = Hash::account("carol");

        {
            let friends = &mut fixture.world.player_mut(&alice).unwrap().profile_mut().friends;
            friends.add(Friend::new(bob, "bob"));
            friends.add(Friend::new(carol, "carol"));
        }

        let mut builder = PacketBuilder::new(PacketType::FriendMessageSend);
        builder.put_hash(&bob).put_string("hi bob");
        fixture.handle(&alice, builder).unwrap();

        let mut delivered = drain(&mut bob_rx).into_iter().next().unwrap();
        assert_eq!(delivered.kind(), PacketType::FriendMessageResponse);
        assert_eq!(delivered.get_string().unwrap(), "alice");
        assert_eq!(delivered.get_string().unwrap(), "hi bob");

        let mut builder = PacketBuilder::new(PacketType::FriendMessageSend);
        builder.put_hash(&carol).put_string("hi carol");
        fixture.handle(&alice, builder).unwrap();

        let mut bounced = drain(&mut alice_rx).into_iter().next().unwrap();
        assert_eq!(
            bounced.get_string().unwrap(),
            "Message not delivered, carol appears to be offline."
        );

        let mut builder = PacketBuilder::new(PacketType::FriendMessageSend);
        builder.put_hash(&Hash::account("stranger")).put_string("hello?");
        fixture.handle(&alice, builder).unwrap();
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_server_kinds_are_violations() {
        let mut fixture = Fixture::new(&[("alice", Point::new(10, 10))]);
        let (alice, _rx) = fixture.enter("alice");

        for kind in [PacketType::LoginSend, PacketType::ChatResponse, PacketType::StatUpdateResponse] {
            assert!(fixture.handle(&alice, PacketBuilder::new(kind)).is_err());
        }
        fixture.handle(&alice, PacketBuilder::new(PacketType::PingSend)).unwrap();
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut fixture = Fixture::new(&[("alice", Point::new(10, 10))]);
        let (alice, _rx) = fixture.enter("alice");

        let mut builder = PacketBuilder::new(PacketType::FriendMessageSend);
        builder.put_u16(3);
        assert!(matches!(
            fixture.handle(&alice, builder),
            Err(ProtocolError::PayloadUnderflow { .. })
        ));
    }
}

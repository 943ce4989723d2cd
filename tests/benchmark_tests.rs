//! Performance benchmarks for the hot paths of a tick

use server::network::Outbox;
use server::persistence::MemoryStore;
use server::player::Player;
use server::world::WorldManager;
use shared::model::PlayerProfile;
use shared::pathfinder::find_path;
use shared::{
    Entity, EntityList, GridMap, Hash, Isaac, PacketBuilder, PacketDecoder, PacketEncoder,
    PacketType, Point,
};
use std::time::Instant;

/// Benchmarks path search across an open sector
#[test]
fn benchmark_pathfinding_open_map() {
    let map = GridMap::open(256, 256, 32);
    let start = Point::new(100, 100);
    let target = Point::new(120, 115);

    let iterations = 1_000;
    let begin = Instant::now();

    for _ in 0..iterations {
        let path = find_path(&map, start, target, 0);
        assert!(path.is_some());
    }

    let duration = begin.elapsed();
    println!(
        "Pathfinding (open): {} searches in {:?} ({:.2} μs/search)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Benchmarks path search that has to route around a long wall
#[test]
fn benchmark_pathfinding_around_wall() {
    let mut map = GridMap::open(256, 256, 32);
    for y in 90..125 {
        map.set_walkable(110, y, false);
    }
    let start = Point::new(100, 110);
    let target = Point::new(120, 110);

    let iterations = 1_000;
    let begin = Instant::now();

    for _ in 0..iterations {
        let path = find_path(&map, start, target, 0).unwrap();
        assert_eq!(path.last(), Some(target));
    }

    let duration = begin.elapsed();
    println!(
        "Pathfinding (wall): {} searches in {:?} ({:.2} μs/search)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 20);
}

/// Benchmarks framing with obfuscated type tags in both directions
#[test]
fn benchmark_codec_throughput() {
    let mut encoder = PacketEncoder::new();
    let mut decoder = PacketDecoder::new();
    encoder.enable_obfuscation(0xC0FFEE);
    decoder.enable_obfuscation(0xC0FFEE);

    let mut chat = PacketBuilder::new(PacketType::ChatSend);
    chat.put_string("the quick brown fox jumps over the lazy dog");

    let iterations = 100_000;
    let begin = Instant::now();
    let mut buffer = Vec::with_capacity(64 * 1024);

    for _ in 0..iterations {
        encoder.encode(&chat, &mut buffer).unwrap();
        let packet = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(packet.kind(), PacketType::ChatSend);
    }

    let duration = begin.elapsed();
    println!(
        "Codec: {} round trips in {:?} ({:.2} ns/packet)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(buffer.is_empty());
    assert!(duration.as_secs() < 5);
}

/// Benchmarks raw keystream generation
#[test]
fn benchmark_isaac() {
    let mut isaac = Isaac::new(42);

    let iterations = 1_000_000;
    let begin = Instant::now();
    let mut acc = 0u32;

    for _ in 0..iterations {
        acc ^= isaac.next_u32();
    }

    let duration = begin.elapsed();
    println!(
        "ISAAC: {} words in {:?} ({:.2} ns/word, checksum {:08x})",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        acc
    );

    assert!(duration.as_secs() < 5);
}

#[derive(Debug, Clone)]
struct Marker {
    id: Hash,
    location: Point,
}

impl Entity for Marker {
    fn id(&self) -> Hash {
        self.id
    }

    fn location(&self) -> Point {
        self.location
    }
}

/// Benchmarks the add/update/remove/reset cycle of a diff list
#[test]
fn benchmark_entity_list_cycle() {
    let markers: Vec<Marker> = (0..500)
        .map(|i| Marker {
            id: Hash::account(&format!("marker{}", i)),
            location: Point::new(i % 64, i / 64),
        })
        .collect();

    let iterations = 200;
    let begin = Instant::now();

    for _ in 0..iterations {
        let mut list = EntityList::new();
        for marker in &markers {
            list.add(marker.clone());
        }
        list.reset();

        for marker in markers.iter().step_by(2) {
            list.mark_updated(&marker.id);
        }
        for marker in markers.iter().skip(1).step_by(2) {
            list.remove(&marker.id);
        }
        assert_eq!(list.len(), 250);
        list.reset();
    }

    let duration = begin.elapsed();
    println!(
        "EntityList: {} cycles of {} entities in {:?}",
        iterations,
        markers.len(),
        duration
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks full world ticks with a crowd of walking players
#[test]
fn benchmark_world_update() {
    let mut world = WorldManager::new(GridMap::open(128, 128, 32), MemoryStore::new());
    let mut receivers = Vec::new();

    for i in 0..100 {
        let location = Point::new(20 + (i % 10) * 4, 20 + (i / 10) * 4);
        let profile = PlayerProfile::new(&format!("player{}", i), "pw", location);
        let (outbox, rx, _closed) = Outbox::new();
        receivers.push(rx);

        let mut player = Player::new(profile, outbox);
        let path = find_path(&GridMap::open(128, 128, 32), location, location.offset(10, 5), 0);
        player.set_path(path.unwrap_or_default());
        assert!(world.add_player(player));
    }

    let ticks = 20;
    let begin = Instant::now();

    for _ in 0..ticks {
        world.update();
        for rx in receivers.iter_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    let duration = begin.elapsed();
    println!(
        "World update: {} ticks with {} players in {:?} ({:.2} ms/tick)",
        ticks,
        world.len(),
        duration,
        duration.as_millis() as f64 / ticks as f64
    );

    assert!(duration.as_secs() < 10);
}

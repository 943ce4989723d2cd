//! Bounded A* search over a [`TileMap`].
//!
//! The search only considers tiles inside a square window of side
//! `2 * radius` around the start. Nodes live in a flat vector sized to that
//! window and are thrown away when the query returns.

use log::trace;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::map::TileMap;
use crate::point::{Path, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    cost: f64,
    parent: Option<usize>,
    state: NodeState,
    version: u32,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            cost: f64::INFINITY,
            parent: None,
            state: NodeState::Unvisited,
            version: 0,
        }
    }
}

/// Heap entry. Stale entries are skipped by comparing `version`.
#[derive(Debug)]
struct OpenEntry {
    estimate: f64,
    seq: u64,
    index: usize,
    version: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the max-heap pops the lowest estimate; ties go to the
    // earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct PathFinder<'a, M: TileMap + ?Sized> {
    map: &'a M,
    start: Point,
    radius: i32,
}

impl<'a, M: TileMap + ?Sized> PathFinder<'a, M> {
    /// Search window radius defaults to the map's sector size.
    pub fn new(map: &'a M, start: Point) -> Self {
        Self::with_radius(map, start, map.sector_size())
    }

    pub fn with_radius(map: &'a M, start: Point, radius: i32) -> Self {
        Self {
            map,
            start,
            radius: radius.max(0),
        }
    }

    fn side(&self) -> i32 {
        self.radius * 2
    }

    fn index(&self, p: Point) -> Option<usize> {
        let ix = p.x - self.start.x + self.radius;
        let iy = p.y - self.start.y + self.radius;
        let side = self.side();

        if ix < 0 || iy < 0 || ix >= side || iy >= side {
            return None;
        }
        Some((iy * side + ix) as usize)
    }

    fn point(&self, index: usize) -> Point {
        let side = self.side() as usize;
        let ix = (index % side) as i32;
        let iy = (index / side) as i32;
        Point::new(
            self.start.x + ix - self.radius,
            self.start.y + iy - self.radius,
        )
    }

    /// Whether `p` falls inside the search window.
    pub fn in_window(&self, p: Point) -> bool {
        self.index(p).is_some()
    }

    /// Path to `target`, or to the first tile found within `close` tiles of
    /// it. The start tile is not included; `None` means no such path exists
    /// inside the window.
    pub fn find_path(&self, target: Point, close: u32) -> Option<Path> {
        match self.map.tile_at(target) {
            Some(tile) if tile.walkable || close > 0 => {}
            _ => return None,
        }

        self.index(target)?;
        let start_index = self.index(self.start)?;
        let close = close as f64;

        let side = self.side() as usize;
        let mut nodes = vec![Node::default(); side * side];
        let mut open = BinaryHeap::new();
        let mut seq = 0u64;

        nodes[start_index].cost = 0.0;
        nodes[start_index].state = NodeState::Open;
        open.push(OpenEntry {
            estimate: self.start.distance_to(target),
            seq,
            index: start_index,
            version: 0,
        });

        let mut reached = None;

        while let Some(entry) = open.pop() {
            let node = nodes[entry.index];
            if node.state != NodeState::Open || node.version != entry.version {
                continue;
            }

            let current = self.point(entry.index);
            if current == target || current.distance_to(target) <= close {
                reached = Some(entry.index);
                break;
            }

            nodes[entry.index].state = NodeState::Closed;

            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }

                    let next = current.offset(dx, dy);
                    let Some(next_index) = self.index(next) else {
                        continue;
                    };

                    if !self.map.is_valid_step(current, next) {
                        continue;
                    }

                    let cost = node.cost + current.distance_to(next);
                    let candidate = &mut nodes[next_index];

                    // Unvisited nodes have infinite cost, so one comparison
                    // covers first visits and cheaper open paths. A closed
                    // node that improves is reopened.
                    if cost < candidate.cost {
                        candidate.cost = cost;
                        candidate.parent = Some(entry.index);
                        candidate.state = NodeState::Open;
                        candidate.version = candidate.version.wrapping_add(1);

                        seq += 1;
                        open.push(OpenEntry {
                            estimate: cost + next.distance_to(target),
                            seq,
                            index: next_index,
                            version: candidate.version,
                        });
                    }
                }
            }
        }

        let Some(reached) = reached else {
            trace!("No path from {} to {}", self.start, target);
            return None;
        };

        let mut path = Path::new();
        let mut cursor = reached;
        while cursor != start_index {
            path.prepend(self.point(cursor));
            match nodes[cursor].parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }

        trace!("Found {} from {}", path, self.start);
        Some(path)
    }
}

/// Shorthand for a search with the default radius.
pub fn find_path<M: TileMap + ?Sized>(
    map: &M,
    start: Point,
    target: Point,
    close: u32,
) -> Option<Path> {
    PathFinder::new(map, start).find_path(target, close)
}

/// Summed Euclidean step cost of walking `path` from `start`.
pub fn path_cost(start: Point, path: &Path) -> f64 {
    let mut previous = start;
    let mut total = 0.0;
    for &step in path {
        total += previous.distance_to(step);
        previous = step;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridMap;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_diagonal_on_open_grid() {
        let map = GridMap::open(5, 5, 8);
        let start = Point::new(0, 0);
        let finder = PathFinder::new(&map, start);

        let path = finder.find_path(Point::new(4, 4), 0).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(Point::new(4, 4)));
        assert_approx_eq!(path_cost(start, &path), 4.0 * 2f64.sqrt());
        assert!(path.iter().all(|&p| finder.in_window(p)));
    }

    #[test]
    fn test_straight_line() {
        let map = GridMap::open(10, 10, 8);
        let path = find_path(&map, Point::new(1, 5), Point::new(6, 5), 0).unwrap();

        let expected: Vec<_> = (2..=6).map(|x| Point::new(x, 5)).collect();
        assert_eq!(path.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_start_equals_target() {
        let map = GridMap::open(5, 5, 8);
        let path = find_path(&map, Point::new(2, 2), Point::new(2, 2), 0).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_target_outside_window() {
        let map = GridMap::open(64, 64, 4);
        assert!(find_path(&map, Point::new(0, 0), Point::new(10, 0), 0).is_none());
        // The window spans [start - r, start + r).
        assert!(find_path(&map, Point::new(10, 10), Point::new(14, 10), 0).is_none());
        assert!(find_path(&map, Point::new(10, 10), Point::new(6, 10), 0).is_some());
    }

    #[test]
    fn test_unwalkable_target() {
        let mut map = GridMap::open(8, 8, 8);
        map.set_walkable(5, 5, false);

        assert!(find_path(&map, Point::new(1, 1), Point::new(5, 5), 0).is_none());
        let path = find_path(&map, Point::new(1, 1), Point::new(5, 5), 1).unwrap();
        let end = path.last().unwrap();
        assert!(end.distance_to(Point::new(5, 5)) <= 1.0);
        assert!(map.tile_at(end).map_or(false, |t| t.walkable));
    }

    #[test]
    fn test_off_map_target() {
        let map = GridMap::open(5, 5, 8);
        assert!(find_path(&map, Point::new(0, 0), Point::new(7, 7), 0).is_none());
    }

    #[test]
    fn test_routes_around_wall() {
        let mut map = GridMap::open(7, 7, 8);
        // Vertical barrier between columns 2 and 3, open only at row 6.
        for y in 0..6 {
            map.set_v_wall(3, y, 1);
        }

        let start = Point::new(1, 1);
        let path = find_path(&map, start, Point::new(5, 1), 0).unwrap();
        assert_eq!(path.last(), Some(Point::new(5, 1)));

        let mut previous = start;
        for &step in &path {
            assert!(map.is_valid_step(previous, step), "{} -> {}", previous, step);
            previous = step;
        }
        assert!(path.iter().any(|p| p.y == 6));
    }

    #[test]
    fn test_enclosed_target_is_unreachable() {
        let mut map = GridMap::open(9, 9, 8);
        for (x, y) in [(3, 3), (4, 3), (5, 3), (3, 4), (5, 4), (3, 5), (4, 5), (5, 5)] {
            map.set_walkable(x, y, false);
        }

        assert!(find_path(&map, Point::new(0, 0), Point::new(4, 4), 0).is_none());
    }

    #[test]
    fn test_close_enough_stops_early() {
        let map = GridMap::open(10, 10, 8);
        let path = find_path(&map, Point::new(0, 0), Point::new(6, 0), 2).unwrap();
        assert_eq!(path.last(), Some(Point::new(4, 0)));
    }

    /// Cheapest cost from `start` to every tile, by relaxing every legal step
    /// until nothing improves.
    fn reference_costs(map: &GridMap, start: Point) -> Vec<Vec<f64>> {
        let (w, h) = (map.width(), map.height());
        let mut cost = vec![vec![f64::INFINITY; w as usize]; h as usize];
        cost[start.y as usize][start.x as usize] = 0.0;

        let mut changed = true;
        while changed {
            changed = false;
            for y in 0..h {
                for x in 0..w {
                    let from = Point::new(x, y);
                    let base = cost[y as usize][x as usize];
                    if base.is_infinite() {
                        continue;
                    }
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let to = from.offset(dx, dy);
                            if !map.is_valid_step(from, to) {
                                continue;
                            }
                            let candidate = base + from.distance_to(to);
                            let slot = &mut cost[to.y as usize][to.x as usize];
                            if candidate + 1e-9 < *slot {
                                *slot = candidate;
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        cost
    }

    fn assert_optimal(map: &GridMap, start: Point, target: Point) {
        let path = find_path(map, start, target, 0).unwrap();
        assert_eq!(path.last(), Some(target));

        let mut previous = start;
        for &step in &path {
            assert!(map.is_valid_step(previous, step), "{} -> {}", previous, step);
            previous = step;
        }

        let best = reference_costs(map, start)[target.y as usize][target.x as usize];
        assert_approx_eq!(path_cost(start, &path), best);
    }

    #[test]
    fn test_detour_through_pocket_is_optimal() {
        let mut map = GridMap::open(12, 12, 16);
        // A cup open towards the start: the straight diagonal run leads into
        // it, and the real route bends around its rim.
        for x in 4..=8 {
            map.set_walkable(x, 8, false);
        }
        for y in 4..=8 {
            map.set_walkable(8, y, false);
        }

        assert_optimal(&map, Point::new(1, 1), Point::new(10, 10));
        assert_optimal(&map, Point::new(6, 6), Point::new(10, 10));
    }

    #[test]
    fn test_walls_and_blocked_corners_are_optimal() {
        let mut map = GridMap::open(12, 12, 16);
        for y in 0..9 {
            map.set_v_wall(4, y, 1);
        }
        for x in 5..12 {
            map.set_h_wall(x, 5, 1);
        }
        map.set_h_wall(5, 5, 0);
        map.set_walkable(7, 2, false);
        map.set_walkable(2, 9, false);

        assert_optimal(&map, Point::new(1, 1), Point::new(10, 2));
        assert_optimal(&map, Point::new(10, 10), Point::new(1, 1));
        assert_optimal(&map, Point::new(6, 1), Point::new(6, 8));
    }
}

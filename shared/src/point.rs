use serde::{Deserialize, Serialize};
use std::collections::vec_deque::{self, VecDeque};
use std::fmt;

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Moves this point in place so the owner keeps the same location value.
    pub fn set(&mut self, other: Point) {
        self.x = other.x;
        self.y = other.y;
    }

    /// Euclidean distance in tiles.
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Remaining steps from (but not including) the current position to the
/// target (inclusive). Consumed one step per movement tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    steps: VecDeque<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, step: Point) {
        self.steps.push_front(step);
    }

    pub fn append(&mut self, step: Point) {
        self.steps.push_back(step);
    }

    pub fn has_next(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn peek_next(&self) -> Option<Point> {
        self.steps.front().copied()
    }

    pub fn pop_next(&mut self) -> Option<Point> {
        self.steps.pop_front()
    }

    pub fn last(&self) -> Option<Point> {
        self.steps.back().copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Point> {
        self.steps.iter()
    }
}

impl FromIterator<Point> for Path {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Point;
    type IntoIter = vec_deque::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.peek_next(), self.last()) {
            (Some(next), Some(target)) => write!(
                f,
                "path[length = {}, next = {}, target = {}]",
                self.len(),
                next,
                target
            ),
            _ => write!(f, "path[length = 0]"),
        }
    }
}

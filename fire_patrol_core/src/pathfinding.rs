use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    Position,
    map::{Grid, GridMap},
};

/// Cells from (but excluding) the start up to and including the goal.
pub type Path = Vec<Position>;

/// Open-set entry, ordered so that `BinaryHeap` pops the lowest estimate first
/// and, among equal estimates, the earliest discovered cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier {
    estimate: usize,
    order: usize,
    position: Position,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search over the 4-connected grid with unit edge weights and a
/// Manhattan-distance heuristic.
///
/// Returns `Some(vec![])` when `start == goal` and `None` when the goal cannot
/// be reached (or is itself an obstacle / out of bounds).
pub fn find_path(map: &GridMap, start: Position, goal: Position) -> Option<Path> {
    if start == goal {
        return Some(Vec::new());
    }
    if !map.is_passable(goal) || !map.contains(start) {
        return None;
    }

    let (width, height) = (map.width(), map.height());
    let mut cost_so_far: Grid<Option<usize>> = Grid::filled(width, height, None);
    let mut came_from: Grid<Option<Position>> = Grid::filled(width, height, None);
    let mut closed: Grid<bool> = Grid::filled(width, height, false);
    let mut frontier = BinaryHeap::new();
    let mut discovered = 0;

    cost_so_far[start] = Some(0);
    frontier.push(Frontier {
        estimate: start.manhattan_distance(&goal),
        order: discovered,
        position: start,
    });

    while let Some(Frontier {
        position: current, ..
    }) = frontier.pop()
    {
        if current == goal {
            return Some(reconstruct(&came_from, start, goal));
        }
        if closed[current] {
            continue;
        }
        closed[current] = true;

        let Some(current_cost) = cost_so_far[current] else {
            continue;
        };
        let new_cost = current_cost + 1;
        for neighbor in map.neighbors(current) {
            if closed[neighbor] {
                continue;
            }
            if cost_so_far[neighbor].is_none_or(|known| new_cost < known) {
                cost_so_far[neighbor] = Some(new_cost);
                came_from[neighbor] = Some(current);
                discovered += 1;
                frontier.push(Frontier {
                    estimate: new_cost + neighbor.manhattan_distance(&goal),
                    order: discovered,
                    position: neighbor,
                });
            }
        }
    }

    None
}

fn reconstruct(came_from: &Grid<Option<Position>>, start: Position, goal: Position) -> Path {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(previous) = came_from[current] {
        if previous == start {
            break;
        }
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use proptest::prelude::*;

    use super::*;
    use crate::GRID_SIZE;

    const BASE: Position = Position::new(0, 9);

    /// Breadth-first distances from `start`, the reference for optimality.
    fn bfs_distances(map: &GridMap, start: Position) -> Grid<Option<usize>> {
        let mut distances = Grid::filled(map.width(), map.height(), None);
        let mut queue = VecDeque::from([start]);
        distances[start] = Some(0);
        while let Some(current) = queue.pop_front() {
            let next = distances[current].map(|d| d + 1);
            for neighbor in map.neighbors(current) {
                if distances[neighbor].is_none() {
                    distances[neighbor] = next;
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }

    fn assert_valid_path(map: &GridMap, start: Position, goal: Position, path: &[Position]) {
        let mut previous = start;
        for step in path {
            assert!(map.is_passable(*step), "{step:?} is not passable");
            assert_eq!(previous.manhattan_distance(step), 1);
            previous = *step;
        }
        assert_eq!(previous, goal);
    }

    #[test]
    fn straight_line_on_empty_map() {
        let map = GridMap::new([], BASE).unwrap();
        let path = find_path(&map, BASE, Position::new(0, 5)).unwrap();
        assert_eq!(
            path,
            vec![
                Position::new(0, 8),
                Position::new(0, 7),
                Position::new(0, 6),
                Position::new(0, 5)
            ]
        );
    }

    #[test]
    fn goal_equal_to_start_is_empty_path() {
        let map = GridMap::new([], BASE).unwrap();
        assert_eq!(find_path(&map, BASE, BASE), Some(vec![]));
    }

    #[test]
    fn opposite_corner_takes_eighteen_steps() {
        let map = GridMap::new([], BASE).unwrap();
        let goal = Position::new(9, 0);
        let path = find_path(&map, BASE, goal).unwrap();
        assert_eq!(path.len(), 18);
        assert_valid_path(&map, BASE, goal, &path);
    }

    #[test]
    fn detours_around_a_wall() {
        // Vertical wall at x = 5 with a single gap at y = 0.
        let wall: Vec<Position> = (1..GRID_SIZE).map(|y| Position::new(5, y)).collect();
        let map = GridMap::new(wall, BASE).unwrap();
        let start = Position::new(4, 9);
        let goal = Position::new(6, 9);
        let path = find_path(&map, start, goal).unwrap();
        assert_eq!(path.len(), 9 + 2 + 9);
        assert_valid_path(&map, start, goal, &path);
    }

    #[test]
    fn enclosed_goal_is_unreachable() {
        let goal = Position::new(5, 5);
        let ring = [
            Position::new(4, 5),
            Position::new(6, 5),
            Position::new(5, 4),
            Position::new(5, 6),
        ];
        let map = GridMap::new(ring, BASE).unwrap();
        assert_eq!(find_path(&map, BASE, goal), None);
        assert_eq!(find_path(&map, BASE, Position::new(4, 5)), None);
    }

    fn obstacle_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
        proptest::collection::vec((0..GRID_SIZE, 0..GRID_SIZE), 0..40)
    }

    proptest! {
        #[test]
        fn path_length_matches_bfs(
            cells in obstacle_strategy(),
            start in (0..GRID_SIZE, 0..GRID_SIZE),
        ) {
            let obstacles: Vec<Position> = cells
                .into_iter()
                .map(|(x, y)| Position::new(x, y))
                .filter(|p| *p != BASE)
                .collect();
            let map = GridMap::new(obstacles, BASE).unwrap();
            let start = Position::new(start.0, start.1);
            prop_assume!(map.is_passable(start));

            let distances = bfs_distances(&map, start);
            for (goal, distance) in distances.enumerate() {
                let path = find_path(&map, start, goal);
                match distance {
                    Some(distance) => {
                        let path = path.expect("reachable goal must have a path");
                        prop_assert_eq!(path.len(), *distance);
                        assert_valid_path(&map, start, goal, &path);
                    }
                    None => prop_assert!(path.is_none()),
                }
            }
        }
    }
}

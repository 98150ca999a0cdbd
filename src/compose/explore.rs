use std::collections::{HashMap, VecDeque};

use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::bytecode::Program;
use crate::compose::ComposeError;
use crate::runtime::channel::{self, Receiver, Sender};
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm::Vm;

/// Decides the next command for a probed program and digests its replies.
pub trait ExplorationPolicy {
    /// The next command to send, or `None` once exploration is complete.
    fn next_move(&mut self) -> Option<i64>;

    /// Handles the status the program answered the last command with.
    fn observe(&mut self, status: i64) -> Result<(), ComposeError>;
}

type ExploreTask = JoinHandle<Result<Vm<Receiver, Sender>, RuntimeError>>;

/// Sends one command at a time and waits for exactly one status in reply,
/// until `policy` has nothing left to ask. The VM is then cancelled.
///
/// Returns the number of commands answered.
pub async fn explore<P: ExplorationPolicy>(
    program: &Program,
    policy: &mut P,
) -> Result<usize, ComposeError> {
    let (commands, input) = channel::channel();
    let (output, mut statuses) = channel::channel();
    let task = Vm::with_io(program.clone(), input, output).spawn();

    let mut moves = 0;
    while let Some(command) = policy.next_move() {
        let Some(status) = exchange(&commands, &mut statuses, command).await else {
            return Err(ended_early(task).await);
        };
        trace!(command, status, "probe");
        moves += 1;

        if let Err(e) = policy.observe(status) {
            task.abort();
            return Err(e);
        }
    }

    // The program loops forever; stop it here.
    task.abort();
    match task.await {
        Ok(Ok(_)) => {}
        Ok(Err(source)) => return Err(ComposeError::Vm { index: 0, source }),
        Err(e) if e.is_cancelled() => debug!("explored vm cancelled"),
        Err(e) => return Err(e.into()),
    }

    info!(moves, "exploration finished");
    Ok(moves)
}

async fn exchange(commands: &Sender, statuses: &mut Receiver, command: i64) -> Option<i64> {
    commands.send(command).await.ok()?;
    statuses.receive().await
}

/// Why the VM stopped answering before the policy was done.
async fn ended_early(task: ExploreTask) -> ComposeError {
    match task.await {
        Ok(Ok(_)) => ComposeError::Disconnected,
        Ok(Err(source)) => ComposeError::Vm { index: 0, source },
        Err(e) => e.into(),
    }
}

// =============================================================================
// Maze exploration
// =============================================================================

pub type Position = (i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Movement command understood by the maze program.
    pub fn code(self) -> i64 {
        match self {
            Direction::North => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::East => 4,
        }
    }

    pub fn turn_right(self) -> Self {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    pub fn turn_left(self) -> Self {
        match self {
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
            Direction::East => Direction::North,
        }
    }

    /// The neighbour of `from` in this direction. North is negative y.
    pub fn step(self, (x, y): Position) -> Position {
        match self {
            Direction::North => (x, y - 1),
            Direction::South => (x, y + 1),
            Direction::West => (x - 1, y),
            Direction::East => (x + 1, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Open,
    Target,
    Unknown,
}

impl Tile {
    pub fn is_passable(self) -> bool {
        matches!(self, Tile::Open | Tile::Target)
    }
}

/// Maps a maze by probing it with movement commands.
///
/// Replies are 0 (wall, the droid stays), 1 (moved) and 2 (moved onto the
/// target). Every neighbour of a visited cell is queued as unknown; the
/// explorer heads for unknown cells, preferring straight ahead then turning
/// right, and otherwise keeps a hand on the right wall. It is done once no
/// unknown cell is left.
#[derive(Debug, Clone)]
pub struct MazeExplorer {
    tiles: HashMap<Position, Tile>,
    position: Position,
    facing: Direction,
}

impl Default for MazeExplorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MazeExplorer {
    /// Starts at the origin facing north.
    pub fn new() -> Self {
        let mut explorer = MazeExplorer {
            tiles: HashMap::from([((0, 0), Tile::Open)]),
            position: (0, 0),
            facing: Direction::North,
        };
        explorer.surround();
        explorer
    }

    pub fn tiles(&self) -> &HashMap<Position, Tile> {
        &self.tiles
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn target(&self) -> Option<Position> {
        self.tiles
            .iter()
            .find(|(_, tile)| **tile == Tile::Target)
            .map(|(pos, _)| *pos)
    }

    fn tile(&self, pos: Position) -> Tile {
        self.tiles.get(&pos).copied().unwrap_or(Tile::Unknown)
    }

    fn surround(&mut self) {
        for direction in Direction::ALL {
            self.tiles
                .entry(direction.step(self.position))
                .or_insert(Tile::Unknown);
        }
    }

    fn is_done(&self) -> bool {
        !self.tiles.values().any(|tile| *tile == Tile::Unknown)
    }

    /// Picks the cell to try next from the current position.
    fn choose(&self) -> Position {
        let mut direction = self.facing;
        for _ in 0..4 {
            let cell = direction.step(self.position);
            if self.tiles.get(&cell) == Some(&Tile::Unknown) {
                return cell;
            }
            direction = direction.turn_right();
        }

        let right = self.facing.turn_right().step(self.position);
        let ahead = self.facing.step(self.position);
        let left = self.facing.turn_left().step(self.position);
        if self.tiles.get(&right) != Some(&Tile::Wall) {
            right
        } else if self.tiles.get(&ahead) != Some(&Tile::Wall) {
            ahead
        } else if self.tiles.get(&left) != Some(&Tile::Wall) {
            left
        } else {
            self.facing.turn_right().turn_right().step(self.position)
        }
    }

    /// Shortest passable distance from `start` to every reachable known cell.
    pub fn distances_from(&self, start: Position) -> HashMap<Position, usize> {
        let mut distances = HashMap::new();
        if !self.tile(start).is_passable() {
            return distances;
        }

        let mut queue = VecDeque::from([(start, 0)]);
        distances.insert(start, 0);

        while let Some((pos, distance)) = queue.pop_front() {
            for direction in Direction::ALL {
                let next = direction.step(pos);
                if self.tile(next).is_passable() && !distances.contains_key(&next) {
                    distances.insert(next, distance + 1);
                    queue.push_back((next, distance + 1));
                }
            }
        }

        distances
    }
}

impl ExplorationPolicy for MazeExplorer {
    fn next_move(&mut self) -> Option<i64> {
        if self.is_done() {
            None
        } else {
            Some(self.facing.code())
        }
    }

    fn observe(&mut self, status: i64) -> Result<(), ComposeError> {
        let probed = self.facing.step(self.position);
        match status {
            0 => {
                self.tiles.insert(probed, Tile::Wall);
            }
            1 => {
                self.tiles.insert(probed, Tile::Open);
                self.position = probed;
            }
            2 => {
                self.tiles.insert(probed, Tile::Target);
                self.position = probed;
            }
            other => return Err(ComposeError::UnexpectedStatus(other)),
        }
        self.surround();

        let next = self.choose();
        while self.facing.step(self.position) != next {
            self.facing = self.facing.turn_right();
        }
        Ok(())
    }
}

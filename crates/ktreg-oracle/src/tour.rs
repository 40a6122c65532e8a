use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Knight move offsets in exploration order.
///
/// The order is part of the contract: the solver returns the first tour found
/// by depth-first search over these offsets, so reordering them changes which
/// of the many valid tours is reported. The hardware walks the same order.
pub const KNIGHT_OFFSETS: [(isize, isize); 8] = [
    (1, 2),
    (-1, 2),
    (-2, 1),
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
    (2, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    fn offset(self, (dx, dy): (isize, isize)) -> Option<Cell> {
        Some(Cell {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }
}

impl From<(usize, usize)> for Cell {
    fn from((x, y): (usize, usize)) -> Self {
        Cell { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// `rows` bounds `x`, `cols` bounds `y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Board {
    pub rows: usize,
    pub cols: usize,
}

impl Board {
    pub const STANDARD: Board = Board { rows: 5, cols: 5 };

    /// Largest board the oracle will search. Backtracking past a few thousand
    /// squares never finishes in practice, and the visited set is sized from it.
    pub const MAX_CELLS: usize = 4096;

    pub fn new(rows: usize, cols: usize) -> Result<Self, TourError> {
        let board = Self { rows, cols };
        board.validate()?;
        Ok(board)
    }

    fn validate(&self) -> Result<usize, TourError> {
        let (rows, cols) = (self.rows, self.cols);
        if rows == 0 || cols == 0 {
            return Err(TourError::EmptyGrid { rows, cols });
        }
        match rows.checked_mul(cols) {
            Some(n) if n <= Self::MAX_CELLS => Ok(n),
            _ => Err(TourError::BoardTooLarge {
                rows,
                cols,
                max: Self::MAX_CELLS,
            }),
        }
    }

    pub fn cells(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.rows && cell.y < self.cols
    }

    fn index(&self, cell: Cell) -> usize {
        cell.x * self.cols + cell.y
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::STANDARD
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TourError {
    #[error("board must have at least one row and column, got {rows}x{cols}")]
    EmptyGrid { rows: usize, cols: usize },
    #[error("a {rows}x{cols} board exceeds the {max}-square search limit")]
    BoardTooLarge { rows: usize, cols: usize, max: usize },
    #[error("start {start} is outside the {rows}x{cols} board")]
    StartOutOfBounds {
        start: Cell,
        rows: usize,
        cols: usize,
    },
    #[error("no knight's tour of the {rows}x{cols} board starts at {start}")]
    Infeasible {
        start: Cell,
        rows: usize,
        cols: usize,
    },
}

/// A complete Hamiltonian knight path; `path[0]` is the start square.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tour {
    pub board: Board,
    pub path: Vec<Cell>,
}

impl Tour {
    pub fn start(&self) -> Cell {
        self.path[0]
    }

    /// The squares reached by moving, i.e. what the hardware logs.
    pub fn moves(&self) -> &[Cell] {
        &self.path[1..]
    }
}

struct OracleState {
    board: Board,
    visited: Vec<bool>,
    path: Vec<Cell>,
    // Next offset to try from each square on `path`, index-aligned with it.
    cursors: Vec<usize>,
}

impl OracleState {
    fn new(board: Board, cells: usize) -> Self {
        Self {
            board,
            visited: vec![false; cells],
            path: Vec::with_capacity(cells),
            cursors: Vec::with_capacity(cells),
        }
    }

    fn enter(&mut self, cell: Cell) {
        self.visited[self.board.index(cell)] = true;
        self.path.push(cell);
        self.cursors.push(0);
    }

    fn retreat(&mut self) {
        if let Some(cell) = self.path.pop() {
            self.visited[self.board.index(cell)] = false;
        }
        self.cursors.pop();
    }

    /// Advances the top cursor to the next open neighbour of the top square.
    fn next_step(&mut self) -> Option<Cell> {
        let cell = *self.path.last()?;
        let board = self.board;
        let cursor = self.cursors.last_mut()?;
        while *cursor < KNIGHT_OFFSETS.len() {
            let offset = KNIGHT_OFFSETS[*cursor];
            *cursor += 1;
            let Some(next) = cell.offset(offset) else {
                continue;
            };
            if board.contains(next) && !self.visited[board.index(next)] {
                return Some(next);
            }
        }
        None
    }

    fn search(&mut self, start: Cell, cells: usize) -> bool {
        self.enter(start);
        while !self.path.is_empty() {
            if self.path.len() == cells {
                return true;
            }
            match self.next_step() {
                Some(next) => self.enter(next),
                None => self.retreat(),
            }
        }
        false
    }
}

/// Depth-first backtracking search for the first tour from `start`.
///
/// Neighbours are tried in [`KNIGHT_OFFSETS`] order. The search keeps its own
/// stack, so board size is bounded by [`Board::MAX_CELLS`] rather than by
/// thread stack depth.
pub fn solve(board: Board, start: Cell) -> Result<Tour, TourError> {
    let cells = board.validate()?;
    if !board.contains(start) {
        return Err(TourError::StartOutOfBounds {
            start,
            rows: board.rows,
            cols: board.cols,
        });
    }

    let mut state = OracleState::new(board, cells);
    if state.search(start, cells) {
        Ok(Tour {
            board,
            path: state.path,
        })
    } else {
        Err(TourError::Infeasible {
            start,
            rows: board.rows,
            cols: board.cols,
        })
    }
}

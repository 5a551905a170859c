use serde::{Deserialize, Serialize};

/// A player's mark. The inviter always plays `X` and moves first.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    X,
    O,
}

/// Per-recipient outcome reported in a `game_over` message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner(Symbol),
    Draw,
}

/// 3 rows, 3 columns, 2 diagonals.
const WIN_PATTERNS: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// The 9-cell board, serialized as an array of `"X"` / `"O"` / null.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Board([Option<Symbol>; 9]);

impl Board {
    pub fn cell(&self, position: usize) -> Option<Symbol> {
        self.0[position]
    }

    /// Marks a cell. The engine validates emptiness before calling.
    pub fn set(&mut self, position: usize, symbol: Symbol) {
        self.0[position] = Some(symbol);
    }

    /// Scans all eight triples, then checks for a full board.
    /// `None` means the game continues.
    pub fn outcome(&self) -> Option<Outcome> {
        for [a, b, c] in WIN_PATTERNS {
            if let Some(mark) = self.0[a] {
                if self.0[b] == Some(mark) && self.0[c] == Some(mark) {
                    return Some(Outcome::Winner(mark));
                }
            }
        }
        if self.0.iter().all(Option::is_some) {
            Some(Outcome::Draw)
        } else {
            None
        }
    }
}

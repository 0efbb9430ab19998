/// Playfield grid
use super::tetromino::{Piece, TetrominoKind};

pub const COLS: usize = 10;
pub const ROWS: usize = 20;

#[derive(Debug, Clone)]
pub struct Board {
    cells: Vec<[Option<TetrominoKind>; COLS]>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            cells: vec![[None; COLS]; ROWS],
        }
    }
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<TetrominoKind> {
        self.cells.get(y).and_then(|row| row.get(x).copied().flatten())
    }

    /// Whether `piece` overlaps a wall, the floor or a settled block
    ///
    /// Cells above the top edge only collide with the walls.
    pub fn collides(&self, piece: &Piece) -> bool {
        piece.cells().any(|(x, y)| {
            if x < 0 || x >= COLS as i32 || y >= ROWS as i32 {
                return true;
            }
            y >= 0 && self.cells[y as usize][x as usize].is_some()
        })
    }

    /// Write `piece` into the grid; cells above the top edge are dropped
    pub fn place(&mut self, piece: &Piece) {
        for (x, y) in piece.cells() {
            if (0..ROWS as i32).contains(&y) && (0..COLS as i32).contains(&x) {
                self.cells[y as usize][x as usize] = Some(piece.kind());
            }
        }
    }

    /// Remove full rows, shift the rest down; returns how many were removed
    pub fn clear_lines(&mut self) -> u32 {
        let before = self.cells.len();
        self.cells.retain(|row| row.iter().any(Option::is_none));
        let cleared = before - self.cells.len();

        let mut refilled = vec![[None; COLS]; cleared];
        refilled.append(&mut self.cells);
        self.cells = refilled;

        cleared as u32
    }

    pub fn filled_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Height of the stack, counted from the floor
    pub fn stack_height(&self) -> usize {
        self.cells
            .iter()
            .position(|row| row.iter().any(Option::is_some))
            .map_or(0, |top| ROWS - top)
    }

    #[cfg(test)]
    pub(crate) fn fill_row(&mut self, y: usize, gap: std::ops::Range<usize>) {
        for x in 0..COLS {
            self.cells[y][x] = if gap.contains(&x) { None } else { Some(TetrominoKind::O) };
        }
    }
}

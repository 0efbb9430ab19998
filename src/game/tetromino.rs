/// The seven tetrominoes
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TetrominoKind {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
}

impl TetrominoKind {
    pub const ALL: [TetrominoKind; 7] = [
        TetrominoKind::I,
        TetrominoKind::J,
        TetrominoKind::L,
        TetrominoKind::O,
        TetrominoKind::S,
        TetrominoKind::T,
        TetrominoKind::Z,
    ];

    /// Uniform pick, no bag
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    fn shape(self) -> Vec<Vec<bool>> {
        let rows: &[&str] = match self {
            TetrominoKind::I => &["....", "####", "....", "...."],
            TetrominoKind::J => &["#..", "###", "..."],
            TetrominoKind::L => &["..#", "###", "..."],
            TetrominoKind::O => &["##", "##"],
            TetrominoKind::S => &[".##", "##.", "..."],
            TetrominoKind::T => &[".#.", "###", "..."],
            TetrominoKind::Z => &["##.", ".##", "..."],
        };
        rows.iter()
            .map(|row| row.chars().map(|c| c == '#').collect())
            .collect()
    }
}

/// A tetromino with its position on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    kind: TetrominoKind,
    matrix: Vec<Vec<bool>>,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    pub fn new(kind: TetrominoKind) -> Self {
        Self {
            kind,
            matrix: kind.shape(),
            x: 0,
            y: 0,
        }
    }

    pub fn kind(&self) -> TetrominoKind {
        self.kind
    }

    /// Side length of the square shape matrix
    pub fn size(&self) -> usize {
        self.matrix.len()
    }

    /// Copy rotated a quarter turn clockwise about the matrix centre
    pub fn rotated(&self) -> Self {
        let n = self.matrix.len();
        let matrix = (0..n)
            .map(|row| (0..n).map(|col| self.matrix[n - 1 - col][row]).collect())
            .collect();
        Self {
            matrix,
            ..self.clone()
        }
    }

    /// Occupied board cells as (x, y)
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.matrix.iter().enumerate().flat_map(move |(dy, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(dx, _)| (self.x + dx as i32, self.y + dy as i32))
        })
    }
}

/// Game session
///
/// Owns the board, the falling piece and the score. Inputs and gravity ticks
/// advance the game; every transition the audio cares about is published on
/// the event bus.
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::board::{Board, COLS};
use super::tetromino::{Piece, TetrominoKind};
use crate::messaging::{EventBus, GameEvent};

/// Points for clearing 0..=4 rows at once
pub const SCORE_TABLE: [u32; 5] = [0, 100, 300, 700, 1500];

/// Score per level; level N ends at N * LEVEL_STEP
pub const LEVEL_STEP: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Title,
    Playing,
    GameOver,
}

/// Player actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Start,
    Left,
    Right,
    Rotate,
    SoftDrop,
    HardDrop,
    TogglePause,
    ToggleMute,
    Restart,
    Exit,
}

pub struct Session {
    board: Board,
    current: Piece,
    next: TetrominoKind,
    score: u32,
    level: u32,
    lines: u32,
    paused: bool,
    screen: Screen,
    rng: StdRng,
    bus: EventBus,
}

impl Session {
    pub fn new(bus: EventBus, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let current = Self::spawn(TetrominoKind::random(&mut rng));
        let next = TetrominoKind::random(&mut rng);

        Self {
            board: Board::new(),
            current,
            next,
            score: 0,
            level: 1,
            lines: 0,
            paused: false,
            screen: Screen::Title,
            rng,
            bus,
        }
    }

    /// Show the title screen
    pub fn enter_title(&mut self) {
        self.screen = Screen::Title;
        self.bus.publish(GameEvent::TitleEntered);
    }

    pub fn handle_input(&mut self, input: Input) {
        match (self.screen, input) {
            (_, Input::ToggleMute) => {
                self.bus.publish(GameEvent::MuteToggled);
            }
            (Screen::Title, Input::Start) => {
                self.new_game();
                self.bus.publish(GameEvent::StartRequested);
            }
            (Screen::GameOver, Input::Restart) => {
                self.new_game();
                self.bus.publish(GameEvent::Restarted);
            }
            (Screen::Playing | Screen::GameOver, Input::Exit) => {
                self.new_game();
                self.screen = Screen::Title;
                self.bus.publish(GameEvent::Exited);
            }
            (Screen::Playing, Input::TogglePause) => {
                self.paused = !self.paused;
                tracing::info!("Game {}", if self.paused { "paused" } else { "resumed" });
                self.bus.publish(GameEvent::PauseChanged {
                    paused: self.paused,
                });
            }
            (Screen::Playing, _) if self.paused => {}
            (Screen::Playing, Input::Left) => self.shift(-1),
            (Screen::Playing, Input::Right) => self.shift(1),
            (Screen::Playing, Input::Rotate) => {
                let rotated = self.current.rotated();
                if !self.board.collides(&rotated) {
                    self.current = rotated;
                }
            }
            (Screen::Playing, Input::SoftDrop) => self.move_down(),
            (Screen::Playing, Input::HardDrop) => {
                while !self.board.collides(&self.current) {
                    self.current.y += 1;
                }
                self.current.y -= 1;
                self.lock_piece();
            }
            _ => {}
        }
    }

    /// One gravity step; does nothing unless a game is running
    pub fn tick(&mut self) {
        if self.screen == Screen::Playing && !self.paused {
            self.move_down();
        }
    }

    /// Time between gravity steps at the current level
    pub fn gravity_interval(&self) -> Duration {
        let millis = 1000 * (48 - 5 * i64::from(self.level)) / 60;
        Duration::from_millis(millis.max(50) as u64)
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_piece(&self) -> &Piece {
        &self.current
    }

    pub fn next_piece(&self) -> TetrominoKind {
        self.next
    }

    fn new_game(&mut self) {
        self.board = Board::new();
        self.current = Self::spawn(TetrominoKind::random(&mut self.rng));
        self.next = TetrominoKind::random(&mut self.rng);
        self.score = 0;
        self.level = 1;
        self.lines = 0;
        self.paused = false;
        self.screen = Screen::Playing;
    }

    fn spawn(kind: TetrominoKind) -> Piece {
        let mut piece = Piece::new(kind);
        piece.x = (COLS / 2) as i32 - (piece.size() / 2) as i32;
        piece.y = 0;
        piece
    }

    fn shift(&mut self, dx: i32) {
        self.current.x += dx;
        if self.board.collides(&self.current) {
            self.current.x -= dx;
        }
    }

    fn move_down(&mut self) {
        self.current.y += 1;
        if self.board.collides(&self.current) {
            self.current.y -= 1;
            self.lock_piece();
        }
    }

    fn lock_piece(&mut self) {
        self.board.place(&self.current);

        let cleared = self.board.clear_lines();
        if cleared > 0 {
            self.lines += cleared;
            self.score += SCORE_TABLE[cleared.min(4) as usize];
            self.bus.publish(GameEvent::LinesCleared {
                count: cleared,
                score: self.score,
            });

            if self.score >= self.level * LEVEL_STEP {
                self.level += 1;
                tracing::info!("Level {}", self.level);
                self.bus.publish(GameEvent::LevelUp { level: self.level });
            }
        }

        let next = std::mem::replace(&mut self.next, TetrominoKind::random(&mut self.rng));
        self.current = Self::spawn(next);

        if self.board.collides(&self.current) {
            self.screen = Screen::GameOver;
            tracing::info!("Game over: score {}, level {}, lines {}", self.score, self.level, self.lines);
            self.bus.publish(GameEvent::GameOver {
                score: self.score,
                level: self.level,
            });
        }
    }
}

/// Random player for headless runs
///
/// Each piece gets a random number of quarter turns and a random column,
/// then is hard-dropped. Plays badly, which keeps demo games short.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::board::COLS;
use super::session::{Input, Screen, Session};

pub struct Autopilot {
    rng: StdRng,
    plan: Vec<Input>,
}

impl Autopilot {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            plan: Vec::new(),
        }
    }

    /// Next input for `session`, or `None` when not playing
    pub fn next_input(&mut self, session: &Session) -> Option<Input> {
        if session.screen() != Screen::Playing || session.is_paused() {
            self.plan.clear();
            return None;
        }

        if self.plan.is_empty() {
            self.plan_piece(session);
        }
        self.plan.pop()
    }

    fn plan_piece(&mut self, session: &Session) {
        let turns = self.rng.gen_range(0..4);
        let target = self.rng.gen_range(0..COLS as i32);
        let shift = target - session.current_piece().x;

        // Built in reverse: popped from the end
        self.plan.push(Input::HardDrop);
        let step = if shift < 0 { Input::Left } else { Input::Right };
        self.plan.extend(std::iter::repeat(step).take(shift.unsigned_abs() as usize));
        self.plan.extend(std::iter::repeat(Input::Rotate).take(turns));
    }
}

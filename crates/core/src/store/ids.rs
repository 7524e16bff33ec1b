use chrono::Utc;
use rand::Rng;
use std::sync::Mutex;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Generates 20-character record keys whose byte order matches creation
/// order: 8 characters of millisecond time, then 12 random characters that
/// are incremented instead of re-rolled when the clock has not advanced.
pub struct PushIdGenerator {
    state: Mutex<PushIdState>,
}

struct PushIdState {
    last_millis: i64,
    last_random: [u8; RANDOM_CHARS],
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushIdState {
                last_millis: i64::MIN,
                last_random: [0; RANDOM_CHARS],
            }),
        }
    }

    pub fn generate(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // A clock that steps backwards keeps the previous timestamp so keys
        // stay monotonic.
        if now <= state.last_millis {
            increment(&mut state.last_random);
        } else {
            state.last_millis = now;
            let mut rng = rand::thread_rng();
            for slot in state.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time_chars = [0u8; TIME_CHARS];
        let mut millis = state.last_millis.max(0) as u64;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(millis % 64) as usize];
            millis /= 64;
        }
        id.extend(time_chars.iter().map(|&c| c as char));
        id.extend(
            state
                .last_random
                .iter()
                .map(|&index| PUSH_CHARS[index as usize] as char),
        );
        id
    }
}

fn increment(random: &mut [u8; RANDOM_CHARS]) {
    for slot in random.iter_mut().rev() {
        if *slot == 63 {
            *slot = 0;
        } else {
            *slot += 1;
            return;
        }
    }
}
